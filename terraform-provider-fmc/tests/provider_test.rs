// RPC level tests: the provider drives its own runtime, so the mock FMC
// is set up from a separate one.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use terraform_provider_fmc::resources::HOSTS_PATH;
use terraform_provider_fmc::FmcProvider;
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    runtime: Runtime,
    server: MockServer,
    provider: FmcProvider,
}

impl Harness {
    fn new(version: &str) -> Self {
        let runtime = Runtime::new().unwrap();
        let server = runtime.block_on(async {
            let server = fmc_server().await;
            mock_version(&server, version).await;
            server
        });
        Self {
            runtime,
            server,
            provider: FmcProvider::new().unwrap(),
        }
    }

    fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    fn call(&self, method: &str, params: Value) -> Value {
        let request = json!({"jsonrpc": "2.0", "id": 7, "method": method, "params": params});
        let response: Value =
            serde_json::from_str(&self.provider.handle_request(&request.to_string())).unwrap();
        assert_eq!(response["id"], json!(7));
        response["result"].clone()
    }

    fn configure(&self) -> Value {
        self.call(
            "ConfigureProvider",
            json!({"config": {
                "url": self.server.uri(),
                "username": "admin",
                "password": "Cisco123",
                "retries": 0,
                "reqs_per_minute": 0
            }}),
        )
    }
}

#[test]
fn test_configure_logs_in() {
    let harness = Harness::new("7.4.1 (build 172)");

    let result = harness.configure();

    assert_eq!(result["diagnostics"], json!([]));
}

#[test]
fn test_configure_rejected_credentials() {
    let harness = Harness::new("7.4.1");
    let server = harness.runtime.block_on(MockServer::start());
    harness.runtime.block_on(
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server),
    );

    let result = harness.call(
        "ConfigureProvider",
        json!({"config": {"url": server.uri(), "username": "admin", "password": "wrong"}}),
    );

    assert_eq!(result["diagnostics"][0]["summary"], json!("Authentication failed"));
}

#[test]
fn test_old_server_blocks_apply() {
    let harness = Harness::new("7.2.0");
    harness.configure();

    let result = harness.call(
        "ApplyResourceChange",
        json!({
            "type_name": "fmc_dynamic_objects",
            "prior_state": null,
            "planned_state": {"items": {"tags": {"object_type": "IP"}}}
        }),
    );

    assert_eq!(
        result["diagnostics"][0]["summary"],
        json!("fmc_dynamic_objects requires FMC version 7.4.0 or later")
    );
    assert_eq!(result["new_state"], Value::Null);
}

#[test]
fn test_hosts_plan_and_apply() {
    let harness = Harness::new("7.4.1");
    harness.configure();
    harness.mount(
        Mock::given(method("POST"))
            .and(path(config_path(HOSTS_PATH).as_str()))
            .and(query_param("bulk", "true"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "items": [{"id": "id-web", "name": "web", "type": "Host", "value": "10.0.0.1"}]
            }))),
    );

    let plan = harness.call(
        "PlanResourceChange",
        json!({
            "type_name": "fmc_hosts",
            "prior_state": null,
            "proposed_new_state": {
                "items": {"web": {"ip": "10.0.0.1", "description": null, "overridable": null}}
            }
        }),
    );
    assert_eq!(plan["planned_state"]["items"]["web"]["type"], json!("Host"));
    assert_eq!(plan["requires_replace"], json!([]));

    let applied = harness.call(
        "ApplyResourceChange",
        json!({
            "type_name": "fmc_hosts",
            "prior_state": null,
            "planned_state": plan["planned_state"]
        }),
    );

    assert_eq!(applied["diagnostics"], json!([]));
    assert_eq!(applied["new_state"]["id"], json!(DOMAIN_UUID));
    assert_eq!(applied["new_state"]["items"]["web"]["id"], json!("id-web"));
}

#[test]
fn test_host_data_source_by_name() {
    let harness = Harness::new("7.4.1");
    harness.configure();
    harness.mount(
        Mock::given(method("GET"))
            .and(path(config_path(HOSTS_PATH).as_str()))
            .and(query_param("filter", "nameOrValue:web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"id": "id-web2", "name": "web2", "type": "Host", "value": "10.0.0.2"},
                    {"id": "id-web", "name": "web", "type": "Host", "value": "10.0.0.1",
                     "description": "frontend", "overridable": false}
                ],
                "paging": {"offset": 0, "limit": 1000, "count": 2, "pages": 1}
            }))),
    );

    let result = harness.call(
        "ReadDataSource",
        json!({"type_name": "fmc_host", "config": {"name": "web"}}),
    );

    assert_eq!(result["diagnostics"], json!([]));
    assert_eq!(result["state"]["id"], json!("id-web"));
    assert_eq!(result["state"]["ip"], json!("10.0.0.1"));
    assert_eq!(result["state"]["description"], json!("frontend"));
}
