//! Shared mock FMC setup for integration tests
#![allow(dead_code)]

use serde_json::{json, Value};
use std::time::Duration;
use terraform_provider_fmc::client::{FmcClient, AUTH_PATH, VERSION_PATH};
use terraform_provider_fmc::config::{ClientSettings, Credentials};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const DOMAIN_UUID: &str = "e276abec-e0f2-11e3-8169-6d9ed49b625f";
pub const TENANT_UUID: &str = "5c9ac7e8-73ea-11ee-b962-0242ac120002";
pub const ACCESS_TOKEN: &str = "access-1";
pub const REFRESH_TOKEN: &str = "refresh-1";

/// Login response as FMC sends it: everything in headers, empty body
pub fn login_response(access_token: &str) -> ResponseTemplate {
    let domains = json!([
        {"name": "Global", "uuid": DOMAIN_UUID},
        {"name": "Global/Tenant", "uuid": TENANT_UUID}
    ]);
    ResponseTemplate::new(204)
        .insert_header("X-auth-access-token", access_token)
        .insert_header("X-auth-refresh-token", REFRESH_TOKEN)
        .insert_header("DOMAIN_UUID", DOMAIN_UUID)
        .insert_header("DOMAINS", domains.to_string().as_str())
}

/// Mock FMC that accepts logins
pub async fn fmc_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(AUTH_PATH))
        .respond_with(login_response(ACCESS_TOKEN))
        .mount(&server)
        .await;
    server
}

pub async fn mock_version(server: &MockServer, version: &str) {
    Mock::given(method("GET"))
        .and(path(VERSION_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"items": [{"serverVersion": version}]})),
        )
        .mount(server)
        .await;
}

/// Password settings without throttling and with short backoff
pub fn settings(server: &MockServer) -> ClientSettings {
    let mut settings = ClientSettings::new(
        &server.uri(),
        Credentials::Password {
            username: "admin".to_string(),
            password: "Cisco123".to_string(),
        },
    );
    settings.reqs_per_minute = 0;
    settings.backoff_min = Duration::from_millis(5);
    settings.backoff_max = Duration::from_millis(20);
    settings
}

pub async fn logged_in_client(server: &MockServer) -> FmcClient {
    let client = FmcClient::new(settings(server)).unwrap();
    client.login().await.unwrap();
    client
}

/// Domain config path, as the client builds it
pub fn config_path(suffix: &str) -> String {
    format!("/api/fmc_config/v1/domain/{}{}", DOMAIN_UUID, suffix)
}

/// FMC error envelope
pub fn fmc_error(description: &str) -> Value {
    json!({
        "error": {
            "category": "FRAMEWORK",
            "messages": [{"description": description}],
            "severity": "ERROR"
        }
    })
}
