use super::{
    colorize_outcome, json_pretty, make_control_plane, report_error, spin_fail, spin_ok, spinner,
    RemoteArgs, EXIT_SUCCESS,
};
use std::path::Path;
use stevedore_bundle::UnpackedBundle;
use stevedore_core::{CoreError, ImportReport, Importer, PollOptions, SystemClock};

pub fn run(
    bundle_path: &Path,
    target: &str,
    remote: &RemoteArgs,
    options: PollOptions,
    json: bool,
) -> Result<u8, String> {
    // Decode and verify before touching the control plane.
    let bundle = match std::fs::read(bundle_path)
        .map_err(CoreError::from)
        .and_then(|data| UnpackedBundle::from_archive(&data).map_err(CoreError::from))
    {
        Ok(b) => b,
        Err(e) => return Ok(report_error(&e)),
    };
    let plane = make_control_plane(remote)?;
    let clock = SystemClock;
    let importer = Importer::new(&plane, &clock, options);

    let pb = spinner(&format!("importing {} as {target}…", bundle_path.display()));
    match importer.import(&bundle, target) {
        Ok(report) => {
            spin_ok(&pb, "import complete");
            if json {
                println!("{}", json_pretty(&report)?);
            } else {
                print_stages(&report);
                println!("imported {} as {target}", bundle.descriptor().name);
            }
            Ok(EXIT_SUCCESS)
        }
        Err(failure) => {
            spin_fail(&pb, &format!("import failed at {}", failure.stage));
            if json {
                let payload = serde_json::json!({
                    "failed_stage": failure.stage,
                    "error": failure.error.to_string(),
                    "report": failure.report,
                });
                println!("{}", json_pretty(&payload)?);
            } else {
                print_stages(&failure.report);
            }
            Ok(report_error(&CoreError::from(failure)))
        }
    }
}

fn print_stages(report: &ImportReport) {
    for record in &report.stages {
        println!("  {:<28} {}", record.stage.to_string(), colorize_outcome(&record.outcome));
    }
}
