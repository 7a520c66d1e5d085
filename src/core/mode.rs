use serde::Serialize;
use std::fmt;

use crate::error::{Error, Result};

/// Cloudflare hosting target for the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    /// Cloudflare Workers (service mode).
    #[default]
    Workers,
    /// Cloudflare Pages (static-site mode).
    Pages,
}

impl DeployMode {
    /// Accepts the menu numbers as well as the names: `1`/`workers`, `2`/`pages`.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "workers" => Ok(DeployMode::Workers),
            "2" | "pages" => Ok(DeployMode::Pages),
            other => Err(Error::validation_invalid_argument(
                "deploy",
                format!("Unknown deployment type '{}'", other),
                Some(value.to_string()),
                Some(vec![
                    "1".to_string(),
                    "workers".to_string(),
                    "2".to_string(),
                    "pages".to_string(),
                ]),
            )
            .with_hint("Use --deploy 1 (Workers) or --deploy 2 (Pages)")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeployMode::Workers => "workers",
            DeployMode::Pages => "pages",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DeployMode::Workers => "Cloudflare Workers",
            DeployMode::Pages => "Cloudflare Pages",
        }
    }

    /// File the downloaded worker script is saved as under `src/`.
    ///
    /// Pages only picks up an advanced-mode worker named `_worker.js`.
    pub fn artifact_file_name(&self) -> &'static str {
        match self {
            DeployMode::Workers => "worker.js",
            DeployMode::Pages => "_worker.js",
        }
    }
}

impl fmt::Display for DeployMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
