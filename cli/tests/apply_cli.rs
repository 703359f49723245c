use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const POLICY_MANIFEST: &str = r#"
resource:
  pomeriumzero_policy:
    allow:
      name: allow-corp
      description: corp users
      enforced: false
      explanation: ""
      namespace_id: ns-1
      ppl: '{"allow":{"or":[{"domain":{"is":"corp.example.com"}}]}}'
      remediation: ""
"#;

fn pzctl_cmd(server: &MockServer, dir: &Path) -> Command {
    let mut cmd = offline_cmd(dir);
    cmd.arg("--base-url")
        .arg(server.base_url())
        .arg("--api-token")
        .arg("api-token");
    cmd
}

fn offline_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("pzctl").expect("pzctl binary");
    cmd.env_remove("POMERIUM_ZERO_API_TOKEN")
        .env_remove("POMERIUM_ZERO_BASE_URL")
        .arg("--config")
        .arg(dir.join("config.json"));
    cmd
}

fn mock_session(server: &MockServer) {
    server.mock(|when, then| {
        when.method(POST)
            .path("/token")
            .json_body_obj(&serde_json::json!({"refreshToken": "api-token"}));
        then.status(200)
            .json_body_obj(&serde_json::json!({"idToken": "id-token"}));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/organizations")
            .header("authorization", "Bearer id-token");
        then.status(200)
            .json_body_obj(&serde_json::json!([{"id": "org-1", "name": "Example"}]));
    });
}

fn write_manifest(dir: &Path, body: &str) -> PathBuf {
    let f = dir.join("zero.yaml");
    fs::write(&f, body).expect("write manifest");
    f
}

fn write_state(dir: &Path, resources: serde_json::Value) -> PathBuf {
    let f = dir.join("pzctl.state.json");
    let state = serde_json::json!({
        "version": 1,
        "lineage": "6a1f3c52-0d4e-4b8e-9a51-3f0e2b7c9d10",
        "serial": 4,
        "resources": resources
    });
    fs::write(&f, serde_json::to_vec_pretty(&state).expect("json")).expect("write state");
    f
}

fn policy_state() -> serde_json::Value {
    serde_json::json!({
        "pomeriumzero_policy.allow": {
            "type": "pomeriumzero_policy",
            "name": "allow",
            "attributes": {
                "id": "p-1",
                "name": "allow-corp",
                "description": "corp users",
                "enforced": false,
                "explanation": "",
                "namespace_id": "ns-1",
                "ppl": "{\"allow\":{\"or\":[{\"domain\":{\"is\":\"corp.example.com\"}}]}}",
                "remediation": ""
            },
            "dependencies": []
        }
    })
}

#[test]
fn validate_accepts_manifest_without_network() {
    let tmp = tempdir().expect("tempdir");
    let f = write_manifest(tmp.path(), POLICY_MANIFEST);

    offline_cmd(tmp.path())
        .args(["validate", "-f", f.to_str().expect("path")])
        .assert()
        .success()
        .stdout(contains("Success! The manifest is valid (1 objects)."));
}

#[test]
fn validate_reports_missing_arguments_with_exit_2() {
    let tmp = tempdir().expect("tempdir");
    let f = write_manifest(
        tmp.path(),
        "resource:\n  pomeriumzero_policy:\n    allow:\n      name: allow-corp\n",
    );

    offline_cmd(tmp.path())
        .args(["validate", "-f", f.to_str().expect("path")])
        .assert()
        .code(2)
        .stderr(contains("Missing required argument"))
        .stderr(contains("pomeriumzero_policy.allow"));
}

#[test]
fn plan_on_empty_state_shows_create() {
    let server = MockServer::start();
    mock_session(&server);
    let tmp = tempdir().expect("tempdir");
    let f = write_manifest(tmp.path(), POLICY_MANIFEST);
    let state = tmp.path().join("pzctl.state.json");

    pzctl_cmd(&server, tmp.path())
        .args([
            "plan",
            "-f",
            f.to_str().expect("path"),
            "--state",
            state.to_str().expect("path"),
        ])
        .assert()
        .success()
        .stdout(contains("+ pomeriumzero_policy.allow"))
        .stdout(contains("(known after apply)"))
        .stdout(contains("Plan: 1 to add, 0 to change, 0 to destroy."));

    assert!(!state.exists(), "plan must not write state");
}

#[test]
fn apply_creates_policy_and_records_state() {
    let server = MockServer::start();
    mock_session(&server);
    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/organizations/org-1/policies")
            .header("authorization", "Bearer id-token")
            .json_body_obj(&serde_json::json!({
                "name": "allow-corp",
                "description": "corp users",
                "enforced": false,
                "explanation": "",
                "namespaceId": "ns-1",
                "ppl": {"allow": {"or": [{"domain": {"is": "corp.example.com"}}]}},
                "remediation": ""
            }));
        then.status(201).json_body_obj(&serde_json::json!({
            "id": "p-1",
            "name": "allow-corp",
            "namespaceId": "ns-1"
        }));
    });
    let tmp = tempdir().expect("tempdir");
    let f = write_manifest(tmp.path(), POLICY_MANIFEST);
    let state = tmp.path().join("pzctl.state.json");

    pzctl_cmd(&server, tmp.path())
        .args([
            "apply",
            "-f",
            f.to_str().expect("path"),
            "--state",
            state.to_str().expect("path"),
        ])
        .assert()
        .success()
        .stdout(contains("pomeriumzero_policy.allow: Creating..."))
        .stdout(contains(
            "Apply complete! Resources: 1 added, 0 changed, 0 destroyed.",
        ));

    create.assert();
    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&state).expect("state")).expect("json");
    assert_eq!(
        written["resources"]["pomeriumzero_policy.allow"]["attributes"]["id"],
        "p-1"
    );
}

#[test]
fn apply_failure_exits_3_and_keeps_state_empty() {
    let server = MockServer::start();
    mock_session(&server);
    server.mock(|when, then| {
        when.method(POST).path("/organizations/org-1/policies");
        then.status(500).body("boom");
    });
    let tmp = tempdir().expect("tempdir");
    let f = write_manifest(tmp.path(), POLICY_MANIFEST);
    let state = tmp.path().join("pzctl.state.json");

    pzctl_cmd(&server, tmp.path())
        .args([
            "apply",
            "-f",
            f.to_str().expect("path"),
            "--state",
            state.to_str().expect("path"),
        ])
        .assert()
        .code(3)
        .stderr(contains("pomeriumzero_policy.allow"))
        .stderr(contains("unexpected status code: 500"));

    assert!(!state.exists());
}

#[test]
fn rejected_token_exits_4() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(401).body("invalid refresh token");
    });
    let tmp = tempdir().expect("tempdir");
    let f = write_manifest(tmp.path(), POLICY_MANIFEST);

    pzctl_cmd(&server, tmp.path())
        .current_dir(tmp.path())
        .args(["plan", "-f", f.to_str().expect("path")])
        .assert()
        .code(4)
        .stderr(contains("Unable to Authenticate to Pomerium Zero"));
}

#[test]
fn missing_token_is_a_validation_failure() {
    let tmp = tempdir().expect("tempdir");
    let f = write_manifest(tmp.path(), POLICY_MANIFEST);

    offline_cmd(tmp.path())
        .current_dir(tmp.path())
        .args(["--base-url", "http://127.0.0.1:9", "plan", "-f"])
        .arg(&f)
        .assert()
        .code(2)
        .stderr(contains("Missing API Token Configuration"));
}

#[test]
fn destroy_deletes_everything_in_state() {
    let server = MockServer::start();
    mock_session(&server);
    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/organizations/org-1/policies/p-1");
        then.status(204);
    });
    let tmp = tempdir().expect("tempdir");
    let f = write_manifest(tmp.path(), POLICY_MANIFEST);
    let state = write_state(tmp.path(), policy_state());

    pzctl_cmd(&server, tmp.path())
        .args([
            "destroy",
            "-f",
            f.to_str().expect("path"),
            "--state",
            state.to_str().expect("path"),
        ])
        .assert()
        .success()
        .stdout(contains("pomeriumzero_policy.allow: Destroying..."))
        .stdout(contains("Destroy complete! Resources: 1 destroyed."));

    delete.assert();
    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&state).expect("state")).expect("json");
    assert_eq!(written["resources"], serde_json::json!({}));
    assert_eq!(written["serial"], 5);
}

#[test]
fn state_commands_list_show_and_forget() {
    let tmp = tempdir().expect("tempdir");
    let mut resources = policy_state();
    resources["pomeriumzero_route.app"] = serde_json::json!({
        "type": "pomeriumzero_route",
        "name": "app",
        "attributes": {
            "id": "r-1",
            "name": "app",
            "from": "https://app.example.com",
            "kubernetes_service_account_token": "sa-token"
        },
        "dependencies": ["pomeriumzero_policy.allow"]
    });
    let state = write_state(tmp.path(), resources);
    let state_arg = state.to_str().expect("path");

    offline_cmd(tmp.path())
        .args(["state", "list", "--state", state_arg])
        .assert()
        .success()
        .stdout("pomeriumzero_policy.allow\npomeriumzero_route.app\n");

    offline_cmd(tmp.path())
        .args(["state", "show", "pomeriumzero_route.app", "--state", state_arg])
        .assert()
        .success()
        .stdout(contains("(sensitive value)"))
        .stdout(contains("\"https://app.example.com\""))
        .stdout(contains("sa-token").not());

    offline_cmd(tmp.path())
        .args(["state", "rm", "pomeriumzero_route.app", "--state", state_arg])
        .assert()
        .success()
        .stdout(contains("Removed pomeriumzero_route.app"));

    offline_cmd(tmp.path())
        .args(["state", "list", "--state", state_arg])
        .assert()
        .success()
        .stdout("pomeriumzero_policy.allow\n");
}

#[test]
fn save_auth_writes_config_for_later_runs() {
    let server = MockServer::start();
    mock_session(&server);
    server.mock(|when, then| {
        when.method(GET).path("/organizations/org-1/clusters");
        then.status(200).json_body_obj(&serde_json::json!([]));
    });
    let tmp = tempdir().expect("tempdir");

    pzctl_cmd(&server, tmp.path())
        .args(["--save-auth", "clusters", "list"])
        .assert()
        .success();

    let saved: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(tmp.path().join("config.json")).expect("config"),
    )
    .expect("json");
    assert_eq!(saved["api_token"], "api-token");
    assert_eq!(saved["base_url"], server.base_url());

    offline_cmd(tmp.path())
        .args(["clusters", "list"])
        .assert()
        .success()
        .stdout(contains("[]"));
}
