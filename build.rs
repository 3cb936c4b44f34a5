use chrono::Utc;
use rustc_version::version_meta;
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

const SCHEMA_VERSION: u32 = 1;
const TEMPLATE_PATH: &str = "schema/extraction_template.json";

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed={TEMPLATE_PATH}");
    println!("cargo:rerun-if-env-changed=GIT_COMMIT");

    let template = fs::read_to_string(TEMPLATE_PATH).unwrap_or_else(|err| {
        panic!("Failed to read extraction template '{TEMPLATE_PATH}': {err}");
    });
    let template: serde_json::Value = serde_json::from_str(&template).unwrap_or_else(|err| {
        panic!("Extraction template must be valid JSON: {err}");
    });
    let field_count = template["fields"]
        .as_array()
        .map(Vec::len)
        .unwrap_or_else(|| panic!("Extraction template must list its fields"));

    let rustc = version_meta().expect("failed to obtain rustc version");
    let timestamp = Utc::now().to_rfc3339();
    let package_version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "unknown".into());
    let git_commit = env::var("GIT_COMMIT").ok().or_else(|| {
        if let Ok(output) = std::process::Command::new("git")
            .args(["rev-parse", "HEAD"])
            .output()
        {
            if output.status.success() {
                return Some(String::from_utf8_lossy(&output.stdout).trim().to_string());
            }
        }
        None
    });

    let build_info = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "package_version": package_version,
        "rustc_version": rustc.short_version_string,
        "build_timestamp_utc": timestamp,
        "extraction_field_count": field_count,
        "source_commit": git_commit,
    });

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));
    let dest = out_dir.join("build_info.rs");
    let mut file = fs::File::create(dest).expect("failed to create build_info.rs");
    writeln!(
        file,
        "pub const BUILD_INFO_JSON: &str = r#\"{}\"#;",
        build_info
    )
    .unwrap();
}
