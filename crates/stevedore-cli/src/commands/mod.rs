pub mod completions;
pub mod export;
pub mod import;
pub mod info;

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use stevedore_core::{CoreError, StageOutcome};
use stevedore_remote::{HttpControlPlane, RemoteConfig};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_BUNDLE_ERROR: u8 = 2;
pub const EXIT_REMOTE_ERROR: u8 = 3;
pub const EXIT_PARTIAL_IMPORT: u8 = 4;

/// Control-plane endpoint and credentials taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct RemoteArgs {
    pub url: Option<String>,
    pub token: Option<String>,
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_outcome(outcome: &StageOutcome) -> String {
    use console::Style;
    match outcome {
        StageOutcome::Completed => Style::new().green().apply_to("done").to_string(),
        StageOutcome::Skipped(reason) => Style::new()
            .dim()
            .apply_to(format!("skipped ({reason})"))
            .to_string(),
    }
}

pub fn make_control_plane(remote: &RemoteArgs) -> Result<HttpControlPlane, String> {
    let mut config = if let Some(ref url) = remote.url {
        RemoteConfig::new(url)
    } else {
        RemoteConfig::load_default().map_err(|e| format!("no --remote and no config: {e}"))?
    };
    if let Some(ref token) = remote.token {
        config = config.with_token(token);
    }
    Ok(HttpControlPlane::new(config))
}

/// Exit code for a failed export or import.
pub fn exit_code_for(err: &CoreError) -> u8 {
    if let CoreError::Import(failure) = err {
        if failure.report.completed().next().is_some() {
            return EXIT_PARTIAL_IMPORT;
        }
    }
    match err.root_cause() {
        CoreError::Bundle(_) => EXIT_BUNDLE_ERROR,
        CoreError::Remote(_) | CoreError::Timeout { .. } => EXIT_REMOTE_ERROR,
        _ => EXIT_FAILURE,
    }
}

/// Print `err` the way `main` prints its own errors and pick the exit code.
pub fn report_error(err: &CoreError) -> u8 {
    eprintln!("error: {err}");
    exit_code_for(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stevedore_bundle::BundleError;
    use stevedore_core::{ImportFailure, ImportReport, Stage, StageRecord};
    use stevedore_remote::RemoteError;

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_FAILURE,
            EXIT_BUNDLE_ERROR,
            EXIT_REMOTE_ERROR,
            EXIT_PARTIAL_IMPORT,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn bundle_errors_map_through_stage_labels() {
        let err = CoreError::Stage {
            stage: "package".to_owned(),
            source: Box::new(CoreError::Bundle(BundleError::MissingEntry(
                "app.json".to_owned(),
            ))),
        };
        assert_eq!(exit_code_for(&err), EXIT_BUNDLE_ERROR);
    }

    #[test]
    fn remote_and_timeout_errors_map_to_remote() {
        let err = CoreError::Remote(RemoteError::Http("err1".to_owned()));
        assert_eq!(exit_code_for(&err), EXIT_REMOTE_ERROR);
        let err = CoreError::Timeout {
            app: "app1".to_owned(),
            waited: Duration::from_secs(1),
            last_status: None,
        };
        assert_eq!(exit_code_for(&err), EXIT_REMOTE_ERROR);
        assert_eq!(
            exit_code_for(&CoreError::AppNotFound("app1".to_owned())),
            EXIT_FAILURE
        );
    }

    #[test]
    fn import_failure_after_progress_is_partial() {
        let failure = |stages: Vec<StageRecord>| {
            CoreError::from(ImportFailure {
                report: ImportReport {
                    app: "app2".to_owned(),
                    stages,
                    ..ImportReport::default()
                },
                stage: Stage::ImportBuild,
                error: CoreError::Remote(RemoteError::Http("err1".to_owned())),
            })
        };

        let partial = failure(vec![StageRecord {
            stage: Stage::CreateApp,
            outcome: StageOutcome::Completed,
        }]);
        assert_eq!(exit_code_for(&partial), EXIT_PARTIAL_IMPORT);
        assert_eq!(exit_code_for(&failure(Vec::new())), EXIT_REMOTE_ERROR);
    }

    #[test]
    fn make_control_plane_with_url_and_token() {
        let plane = make_control_plane(&RemoteArgs {
            url: Some("http://localhost:5443/".to_owned()),
            token: Some("secret".to_owned()),
        })
        .unwrap();
        assert_eq!(plane.config().url, "http://localhost:5443");
        assert_eq!(plane.config().auth_token.as_deref(), Some("secret"));
    }

    #[test]
    fn colorize_outcome_mentions_reason() {
        let s = colorize_outcome(&StageOutcome::Skipped(stevedore_core::SkipReason::NoBuild));
        assert!(s.contains("bundle has no build"));
    }

    #[test]
    fn spinner_creates_progress_bar() {
        let pb = spinner("testing...");
        spin_ok(&pb, "done");
        let pb = spinner("testing...");
        spin_fail(&pb, "failed");
    }
}
