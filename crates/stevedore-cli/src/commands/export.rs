use super::{
    json_pretty, make_control_plane, report_error, spin_fail, spin_ok, spinner, RemoteArgs,
    EXIT_SUCCESS,
};
use std::path::{Path, PathBuf};
use stevedore_core::Exporter;

pub fn run(app: &str, output: Option<&Path>, remote: &RemoteArgs, json: bool) -> Result<u8, String> {
    let plane = make_control_plane(remote)?;
    let dest = output.map_or_else(|| PathBuf::from(format!("{app}.tgz")), Path::to_path_buf);

    let pb = spinner(&format!("exporting {app}…"));
    let report = match Exporter::new(&plane).export_to_file(app, &dest) {
        Ok(r) => r,
        Err(e) => {
            spin_fail(&pb, "export failed");
            return Ok(report_error(&e));
        }
    };
    spin_ok(&pb, "export complete");

    if json {
        let payload = serde_json::json!({
            "bundle": dest.display().to_string(),
            "report": report,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("exported {app} to {} ({} bytes)", dest.display(), report.archive_bytes);
        match (&report.release, &report.build) {
            (Some(release), Some(build)) => println!("  release: {release} (build {build})"),
            (Some(release), None) => println!("  release: {release}"),
            _ => println!("  release: none"),
        }
        for resource in &report.resources {
            println!("  resource: {} ({} bytes)", resource.name, resource.bytes);
        }
    }
    Ok(EXIT_SUCCESS)
}
