//! Integration tests for the command-line interface

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("datalab-provisioning").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("parse"));
}

#[test]
fn test_parse_prints_command_fields() {
    cli()
        .arg("parse")
        .arg(r#"docker run -i -e "conf_resource=edge" -e "request_id=abc" --action create docker.datalab-edge:latest"#)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""action": "create""#))
        .stdout(predicate::str::contains(r#""resource_type": "edge""#))
        .stdout(predicate::str::contains(r#""image_type": "edge""#))
        .stdout(predicate::str::contains(r#""request_id": "abc""#));
}

#[test]
fn test_parse_rejects_unbalanced_quotes() {
    cli()
        .arg("parse")
        .arg(r#"docker run -e "conf_resource=edge"#)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_build_masks_credentials() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("provisioning.toml");
    std::fs::write(
        &config,
        r#"
response_directory = "/srv/datalab/response"
self_service_url = "http://localhost:8080"
image_prefix = "docker.datalab"
"#,
    )
    .unwrap();

    let request = temp.path().join("request.json");
    std::fs::write(
        &request,
        r#"{
            "user": "alice",
            "action": "git_creds",
            "resource": "exploratory",
            "image": "jupyter",
            "exploratory_name": "nb-1",
            "body": {"git_creds": [{"hostname": "github.com", "password": "hunter2"}]}
        }"#,
    )
    .unwrap();

    cli()
        .arg("--config")
        .arg(&config)
        .arg("build")
        .arg(&request)
        .arg("--request-id")
        .arg("req-9")
        .assert()
        .success()
        .stdout(predicate::str::contains("--action git_creds"))
        .stdout(predicate::str::contains("docker.datalab-jupyter:latest"))
        .stdout(predicate::str::contains("/srv/datalab/response:/response"))
        .stdout(predicate::str::contains("request_id=req-9"))
        .stdout(predicate::str::contains("hunter2").not());
}

#[test]
fn test_missing_explicit_config_fails() {
    let temp = TempDir::new().unwrap();
    let request = temp.path().join("request.json");
    std::fs::write(&request, "{}").unwrap();

    cli()
        .arg("--config")
        .arg(temp.path().join("absent.toml"))
        .arg("build")
        .arg(&request)
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_invalid_request_file_fails() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("provisioning.toml");
    std::fs::write(&config, "").unwrap();
    let request = temp.path().join("request.json");
    std::fs::write(&request, r#"{"user": "alice"}"#).unwrap();

    cli()
        .arg("--config")
        .arg(&config)
        .arg("build")
        .arg(&request)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid request"));
}
