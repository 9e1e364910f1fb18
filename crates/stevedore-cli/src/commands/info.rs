use super::{json_pretty, report_error, EXIT_SUCCESS};
use std::path::Path;
use stevedore_bundle::UnpackedBundle;
use stevedore_core::{plan_import, BundleSummary, CoreError};
use stevedore_types::Environment;

/// Describe a bundle and the import plan it would produce. Offline.
pub fn run(bundle_path: &Path, json: bool) -> Result<u8, String> {
    let bundle = match std::fs::read(bundle_path)
        .map_err(CoreError::from)
        .and_then(|data| UnpackedBundle::from_archive(&data).map_err(CoreError::from))
    {
        Ok(b) => b,
        Err(e) => return Ok(report_error(&e)),
    };

    let descriptor = bundle.descriptor();
    // Only variable names are shown; values may be secrets.
    let env_keys: Vec<String> = match bundle.env() {
        Some(blob) => Environment::parse(blob)
            .entries()
            .iter()
            .map(|(k, _)| k.clone())
            .collect(),
        None => Vec::new(),
    };
    let plan = plan_import(&BundleSummary::of(&bundle));

    if json {
        let payload = serde_json::json!({
            "app": descriptor,
            "env": bundle.env().map(|_| &env_keys),
            "build": bundle.has_build(),
            "resources": bundle.resources(),
            "manifest": bundle.manifest(),
            "plan": plan,
        });
        println!("{}", json_pretty(&payload)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("app:        {}", descriptor.name);
    println!(
        "generation: {}",
        descriptor.generation().unwrap_or("(none)")
    );
    if !descriptor.release.is_empty() {
        println!("release:    {}", descriptor.release);
    }
    println!("build:      {}", if bundle.has_build() { "yes" } else { "no" });
    match bundle.env() {
        Some(_) => println!("env:        {}", env_keys.join(", ")),
        None => println!("env:        (none)"),
    }
    println!("parameters: {}", descriptor.parameters.len());
    for (key, value) in &descriptor.parameters {
        println!("  {key}={value}");
    }
    println!("resources:  {}", bundle.resources().len());
    for name in bundle.resources() {
        println!("  {name}");
    }
    match bundle.manifest() {
        Some(m) => println!(
            "manifest:   format v{}, exported {} from {}",
            m.format_version, m.exported_at, m.source_app
        ),
        None => println!("manifest:   (none, checksums not verified)"),
    }
    println!("import plan:");
    for planned in &plan {
        match planned.skip {
            Some(reason) => println!("  {:<28} skip ({reason})", planned.stage.to_string()),
            None => println!("  {}", planned.stage),
        }
    }
    Ok(EXIT_SUCCESS)
}
