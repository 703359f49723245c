use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::str::contains;
use std::path::Path;
use tempfile::tempdir;

fn pzctl_cmd(server: &MockServer, dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("pzctl").expect("pzctl binary");
    cmd.env_remove("POMERIUM_ZERO_API_TOKEN")
        .env_remove("POMERIUM_ZERO_BASE_URL")
        .arg("--config")
        .arg(dir.join("config.json"))
        .arg("--base-url")
        .arg(server.base_url())
        .arg("--api-token")
        .arg("api-token");
    cmd
}

fn mock_session(server: &MockServer) {
    server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(200)
            .json_body_obj(&serde_json::json!({"idToken": "id-token"}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/organizations");
        then.status(200)
            .json_body_obj(&serde_json::json!([{"id": "org-1"}]));
    });
}

fn mock_clusters(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(GET)
            .path("/organizations/org-1/clusters")
            .header("authorization", "Bearer id-token");
        then.status(200).json_body_obj(&serde_json::json!([
            {"id": "c-1", "name": "dev", "namespaceId": "ns-dev"},
            {"id": "c-2", "name": "prod", "namespaceId": "ns-prod", "fqdn": "prod.example.com"}
        ]));
    })
}

#[test]
fn clusters_get_finds_by_name() {
    let server = MockServer::start();
    mock_session(&server);
    let clusters = mock_clusters(&server);
    let tmp = tempdir().expect("tempdir");

    pzctl_cmd(&server, tmp.path())
        .args(["clusters", "get", "prod"])
        .assert()
        .success()
        .stdout(contains("\"id\": \"c-2\""))
        .stdout(contains("\"namespaceId\": \"ns-prod\""));

    clusters.assert();
}

#[test]
fn clusters_get_unknown_name_fails() {
    let server = MockServer::start();
    mock_session(&server);
    mock_clusters(&server);
    let tmp = tempdir().expect("tempdir");

    pzctl_cmd(&server, tmp.path())
        .args(["clusters", "get", "staging"])
        .assert()
        .code(1)
        .stderr(contains(
            "Cluster not found: No cluster found with name: staging",
        ));
}

#[test]
fn policies_get_searches_namespace_descendants() {
    let server = MockServer::start();
    mock_session(&server);
    let list = server.mock(|when, then| {
        when.method(GET)
            .path("/organizations/org-1/policies")
            .query_param("namespaceId", "ns 1")
            .query_param("includeDescendants", "true");
        then.status(200).json_body_obj(&serde_json::json!([
            {"id": "p-1", "name": "deny-all"},
            {"id": "p-2", "name": "allow-corp"}
        ]));
    });
    let tmp = tempdir().expect("tempdir");

    pzctl_cmd(&server, tmp.path())
        .args(["policies", "get", "--namespace-id", "ns 1", "allow-corp"])
        .assert()
        .success()
        .stdout(contains("\"id\": \"p-2\""));

    list.assert();
}

#[test]
fn schema_prints_one_type_or_everything() {
    let tmp = tempdir().expect("tempdir");
    let mut cmd = Command::cargo_bin("pzctl").expect("pzctl binary");
    cmd.arg("--config")
        .arg(tmp.path().join("config.json"))
        .args(["schema", "pomeriumzero_route"])
        .assert()
        .success()
        .stdout(contains("\"kubernetes_service_account_token\""))
        .stdout(contains("\"sensitive\": true"));

    let mut cmd = Command::cargo_bin("pzctl").expect("pzctl binary");
    cmd.arg("--config")
        .arg(tmp.path().join("config.json"))
        .arg("schema")
        .assert()
        .success()
        .stdout(contains("\"resource_schemas\""))
        .stdout(contains("\"pomeriumzero_cluster_settings\""))
        .stdout(contains("\"data_source_schemas\""));

    let mut cmd = Command::cargo_bin("pzctl").expect("pzctl binary");
    cmd.arg("--config")
        .arg(tmp.path().join("config.json"))
        .args(["schema", "pomeriumzero_nope"])
        .assert()
        .code(1)
        .stderr(contains("unknown resource or data source type"));
}
