#![allow(dead_code)]

use httpmock::prelude::*;
use pomerium_zero_provider::{Attributes, ProviderConfig, Session};
use serde_json::{json, Value};

pub const ORG: &str = "org-1";
pub const API_TOKEN: &str = "api-token";
pub const ID_TOKEN: &str = "id-token";

/// A mock API that accepts `API_TOKEN` and has exactly one organization.
pub async fn zero_server() -> MockServer {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/token")
                .header("content-type", "application/json")
                .json_body_obj(&json!({"refreshToken": API_TOKEN}));
            then.status(200).json_body_obj(&json!({"idToken": ID_TOKEN}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/organizations")
                .header("authorization", format!("Bearer {}", ID_TOKEN));
            then.status(200)
                .json_body_obj(&json!([{"id": ORG, "name": "Example"}]));
        })
        .await;
    server
}

pub fn config(server: &MockServer) -> ProviderConfig {
    ProviderConfig::new(API_TOKEN).with_base_url(server.base_url())
}

pub async fn session(server: &MockServer) -> Session {
    Session::connect(&config(server)).await.expect("session")
}

pub fn org_path(rest: &str) -> String {
    format!("/organizations/{}/{}", ORG, rest)
}

pub fn attrs(value: Value) -> Attributes {
    value.as_object().cloned().expect("object")
}
