//! KV namespace provisioning. Each run creates a fresh namespace for the panel.

use serde::Serialize;
use std::path::Path;

use crate::defaults::Defaults;
use crate::error::{Error, Result};
use crate::extract::OutputExtractor;
use crate::toolchain::WranglerCli;
use crate::utils::command::CommandRunner;
use crate::utils::random::{random_string, PositionRule, LOWER_ALNUM};
use crate::utils::retry::retry;

pub const NAMESPACE_PREFIX: &str = "bpb-panel-kv-";
const SUFFIX_LEN: usize = 8;

/// Output fragments that point at a network hiccup rather than a real failure.
pub const TRANSIENT_MARKERS: &[&str] = &["fetch failed", "timed out"];

/// KV namespace created for this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedResource {
    pub namespace_id: String,
    pub title: String,
}

pub fn namespace_title() -> String {
    format!(
        "{}{}",
        NAMESPACE_PREFIX,
        random_string(LOWER_ALNUM, SUFFIX_LEN, PositionRule::NoLeadingDigit)
    )
}

fn is_hex(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Create a fresh KV namespace, retrying every failure up to the budget.
///
/// Namespaces from earlier runs are left in place.
pub fn create_namespace(
    runner: &dyn CommandRunner,
    cli: &WranglerCli,
    work_dir: &Path,
    extractor: &dyn OutputExtractor,
    defaults: &Defaults,
) -> Result<ProvisionedResource> {
    retry(defaults.retry.policy(), "KV namespace creation", |attempt| {
        let title = namespace_title();
        log_status!("namespace", "Attempt {}: creating KV namespace '{}'", attempt, title);

        let argv = cli.argv(&["kv", "namespace", "create", &title]);
        let result = runner.run(work_dir, &argv, defaults.timeouts.command())?;

        if !result.succeeded {
            if result.mentions_any(TRANSIENT_MARKERS) {
                log_status!("namespace", "Transient network failure while creating '{}'", title);
            } else {
                log_status!(
                    "namespace",
                    "Creating '{}' failed: {}",
                    title,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            return Err(Error::namespace_create_failed(&title, result.failure_details()));
        }

        let namespace_id = extractor
            .identifier(&result.combined_output)
            .ok_or_else(|| Error::output_parse_failed("KV namespace id", &result.combined_output))?;

        if !is_hex(&namespace_id) {
            return Err(Error::output_parse_failed(
                "hexadecimal KV namespace id",
                &result.combined_output,
            ));
        }

        log_status!("namespace", "KV namespace '{}' created with id {}", title, namespace_id);
        Ok(ProvisionedResource {
            namespace_id,
            title,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::builtin_defaults;
    use crate::error::ErrorCode;
    use crate::extract::WranglerExtractor;
    use crate::testing::ScriptedRunner;
    use crate::utils::command::CommandResult;

    const CREATED: &str = "🌀 Creating namespace with title \"bpb-panel-kv-abcdefgh\"\n✨ Success!\n{\n  \"kv_namespaces\": [\n    {\n      \"binding\": \"bpb_panel_kv\",\n      \"id\": \"deadbeefdeadbeefdeadbeefdeadbeef\"\n    }\n  ]\n}\n";

    fn fast_defaults() -> Defaults {
        let mut d = builtin_defaults();
        d.retry.delay_secs = 0;
        d
    }

    fn create(runner: &ScriptedRunner) -> Result<ProvisionedResource> {
        create_namespace(
            runner,
            &WranglerCli::npx(),
            Path::new("."),
            &WranglerExtractor,
            &fast_defaults(),
        )
    }

    #[test]
    fn title_has_prefix_and_suffix_rules() {
        let title = namespace_title();
        let suffix = title.strip_prefix(NAMESPACE_PREFIX).unwrap();
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.chars().all(|c| LOWER_ALNUM.contains(c)));
        assert!(!suffix.starts_with(|c: char| c.is_ascii_digit()));
    }

    #[test]
    fn creates_namespace_and_extracts_id() {
        let runner = ScriptedRunner::new().on("kv namespace create", CREATED);
        let resource = create(&runner).unwrap();
        assert_eq!(resource.namespace_id, "deadbeefdeadbeefdeadbeefdeadbeef");
        assert!(resource.title.starts_with(NAMESPACE_PREFIX));
        assert!(runner.calls()[0].ends_with(&resource.title));
    }

    #[test]
    fn every_attempt_uses_a_fresh_title() {
        let runner = ScriptedRunner::new().on_seq(
            "kv namespace create",
            vec![
                Ok(CommandResult::failure("", "fetch failed", Some(1), "exited with status 1")),
                Ok(CommandResult::success("", CREATED)),
            ],
        );
        create(&runner).unwrap();
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0], calls[1]);
    }

    #[test]
    fn unrecognized_failures_are_retried_too() {
        let runner = ScriptedRunner::new().on_seq(
            "kv namespace create",
            vec![
                Ok(CommandResult::failure("", "A namespace with this title already exists", Some(1), "exit 1")),
                Ok(CommandResult::success("", CREATED)),
            ],
        );
        assert!(create(&runner).is_ok());
    }

    #[test]
    fn missing_id_is_a_parse_failure() {
        let runner = ScriptedRunner::new().on("kv namespace create", "Success!");
        let err = create(&runner).unwrap_err();
        assert_eq!(err.code, ErrorCode::OutputParseFailed);
        assert_eq!(runner.count("kv namespace create"), 3);
    }

    #[test]
    fn non_hex_id_is_rejected() {
        let runner = ScriptedRunner::new().on("kv namespace create", r#"{"id":"not-hex!"}"#);
        assert_eq!(create(&runner).unwrap_err().code, ErrorCode::OutputParseFailed);
    }

    #[test]
    fn exhaustion_surfaces_last_output() {
        let runner = ScriptedRunner::new().on_fail("kv namespace create", "Authentication error");
        let err = create(&runner).unwrap_err();
        assert_eq!(err.code, ErrorCode::NamespaceCreateFailed);
        assert_eq!(err.details["output"], "Authentication error");
    }
}
