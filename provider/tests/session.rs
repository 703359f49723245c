mod common;

use httpmock::prelude::*;
use pomerium_zero_provider::{Error, ProviderConfig, Provider, Session};
use serde_json::json;

use common::*;

#[tokio::test]
async fn connect_exchanges_token_and_resolves_organization() {
    let server = zero_server().await;

    let session = Provider::new()
        .configure(&config(&server))
        .await
        .expect("configure");

    assert_eq!(session.organization_id(), ORG);
    assert_eq!(session.org_path("routes"), "organizations/org-1/routes");
}

#[tokio::test]
async fn missing_token_fails_before_any_request() {
    let err = Session::connect(&ProviderConfig::default().with_base_url("http://127.0.0.1:9"))
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("Missing API Token Configuration"));
}

#[tokio::test]
async fn rejected_token_is_an_authentication_error() {
    let server = MockServer::start_async().await;
    let token = server
        .mock_async(|when, then| {
            when.method(POST).path("/token");
            then.status(401).body("invalid refresh token");
        })
        .await;

    let err = Session::connect(&ProviderConfig::new("bad").with_base_url(server.base_url()))
        .await
        .unwrap_err();

    token.assert_async().await;
    assert!(err.is_transport_or_auth());
    let text = err.to_string();
    assert!(text.starts_with("Unable to Authenticate to Pomerium Zero"), "{text}");
    assert!(text.contains("invalid refresh token"), "{text}");
}

#[tokio::test]
async fn more_than_one_organization_is_rejected() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/token");
            then.status(200).json_body_obj(&json!({"idToken": ID_TOKEN}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/organizations");
            then.status(200)
                .json_body_obj(&json!([{"id": "org-1"}, {"id": "org-2"}]));
        })
        .await;

    let err = Session::connect(&config(&server)).await.unwrap_err();
    assert!(matches!(err, Error::Session { summary: "Unable to Fetch Organization ID", .. }));
    assert!(err
        .to_string()
        .contains("unexpected number of organizations returned: 2"));
}
