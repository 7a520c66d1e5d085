//! `wrangler.toml` generation.

use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;

use crate::error::{Error, Result};
use crate::mode::DeployMode;
use crate::namespace::ProvisionedResource;
use crate::secrets::GeneratedSecrets;
use crate::utils::io;

pub const KV_BINDING: &str = "KV";
pub const COMPATIBILITY_FLAGS: &[&str] = &["nodejs_compat"];

/// Field order here is the order written to disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub name: String,
    pub compatibility_date: String,
    pub compatibility_flags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers_dev: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages_build_output_dir: Option<String>,
    pub kv_namespaces: Vec<KvBinding>,
    pub vars: ManifestVars,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KvBinding {
    pub binding: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestVars {
    #[serde(rename = "UUID")]
    pub uuid: String,
    #[serde(rename = "TR_PASS")]
    pub trojan_password: String,
    #[serde(rename = "PROXY_IP")]
    pub proxy_ip: String,
    #[serde(rename = "FALLBACK")]
    pub fallback: String,
    #[serde(rename = "SUB_PATH")]
    pub sub_path: String,
}

/// Compatibility date is the day before `generated_on`.
pub fn build(
    secrets: &GeneratedSecrets,
    resource: &ProvisionedResource,
    mode: DeployMode,
    generated_on: NaiveDate,
) -> Manifest {
    let compatibility_date = generated_on
        .pred_opt()
        .unwrap_or(generated_on)
        .format("%Y-%m-%d")
        .to_string();

    let (main, workers_dev, pages_build_output_dir) = match mode {
        DeployMode::Workers => (Some("src/worker.js".to_string()), Some(true), None),
        DeployMode::Pages => (None, None, Some("src".to_string())),
    };

    Manifest {
        name: secrets.project_name.clone(),
        compatibility_date,
        compatibility_flags: COMPATIBILITY_FLAGS.iter().map(|f| f.to_string()).collect(),
        main,
        workers_dev,
        pages_build_output_dir,
        kv_namespaces: vec![KvBinding {
            binding: KV_BINDING.to_string(),
            id: resource.namespace_id.clone(),
        }],
        vars: ManifestVars {
            uuid: secrets.instance_id.to_string(),
            trojan_password: secrets.auth_token.clone(),
            proxy_ip: secrets.proxy_host.clone(),
            fallback: secrets.fallback_host.clone(),
            sub_path: secrets.subscription_path.clone(),
        },
    }
}

pub fn render(manifest: &Manifest) -> Result<String> {
    toml::to_string(manifest)
        .map_err(|e| Error::internal_unexpected(format!("Failed to render wrangler.toml: {}", e)))
}

/// Render and atomically write the manifest. Returns the written content.
pub fn write(path: &Path, manifest: &Manifest) -> Result<String> {
    let content = render(manifest)?;
    io::write_file_atomic(path, &content, &format!("write {}", path.display()))?;
    Ok(content)
}
