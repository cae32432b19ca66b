//! End-to-end tests driving the `jam` binary.

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn jam(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_jam"))
        .args(args)
        .env("JAM_LOG", "warn")
        .output()
        .expect("run jam")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_pack_requires_buildpack() {
    let output = jam(&["pack", "--version", "1.2.3", "--output", "out.tgz"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("missing required flag --buildpack"));
}

#[test]
fn test_pack_requires_output() {
    let output = jam(&["pack", "--buildpack", "buildpack.toml", "--version", "1.2.3"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("missing required flag --output"));
}

#[test]
fn test_pack_requires_version() {
    let output = jam(&["pack", "--buildpack", "buildpack.toml", "--output", "out.tgz"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("missing required flag --version"));
}

#[test]
fn test_update_dependencies_requires_buildpack_file() {
    let output = jam(&["update-dependencies"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("missing required flag --buildpack-file"));
}

#[test]
fn test_unknown_command_fails() {
    let output = jam(&["publish"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_pack_failure_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let buildpack = dir.path().join("buildpack.toml");
    let out = dir.path().join("out.tgz");
    let output = jam(&[
        "pack",
        "--buildpack",
        path_str(&buildpack),
        "--version",
        "1.2.3",
        "--output",
        path_str(&out),
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).starts_with("error: "));
    assert!(!out.exists());
}

#[test]
fn test_pack_offline_from_local_payload() {
    let source = TempDir::new().unwrap();
    let payload = b"local-payload";
    let sha = hex::encode(Sha256::digest(payload));

    fs::create_dir(source.path().join("payloads")).unwrap();
    fs::write(source.path().join("payloads/dep.tgz"), payload).unwrap();
    fs::write(
        source.path().join("buildpack.toml"),
        format!(
            r#"api = "0.7"

[buildpack]
id = "some-buildpack-id"
name = "some-buildpack-name"

[metadata]
include-files = ["buildpack.toml"]

[[metadata.dependencies]]
id = "some-dep"
version = "1.2.3"
stacks = ["some-stack"]
uri = "file:///payloads/dep.tgz"
checksum = "sha256:{sha}"
"#
        ),
    )
    .unwrap();

    let out = TempDir::new().unwrap();
    let tarball = out.path().join("buildpack.tgz");
    let output = jam(&[
        "pack",
        "--buildpack",
        path_str(&source.path().join("buildpack.toml")),
        "--version",
        "2.0.0",
        "--output",
        path_str(&tarball),
        "--offline",
    ]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));

    let mut archive = tar::Archive::new(GzDecoder::new(fs::File::open(&tarball).unwrap()));
    let mut manifest = None;
    let mut cached = None;
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().into_owned();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        if name == "buildpack.toml" {
            manifest = Some(content);
        } else if name == format!("dependencies/{sha}") {
            cached = Some(content);
        }
    }

    assert_eq!(cached.as_deref(), Some("local-payload"));
    let manifest: toml::Value = toml::from_str(&manifest.unwrap()).unwrap();
    assert_eq!(manifest["buildpack"]["version"].as_str(), Some("2.0.0"));
    assert_eq!(
        manifest["metadata"]["dependencies"][0]["uri"].as_str(),
        Some(format!("file:///dependencies/{sha}").as_str())
    );
}
