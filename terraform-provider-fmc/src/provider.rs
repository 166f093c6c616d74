//! Terraform Provider Implementation
//!
//! Implements the Terraform Plugin Protocol for Cisco FMC.

use crate::client::FmcClient;
use crate::config::ProviderConfig;
use crate::data_sources::{get_all_data_sources, DataSource};
use crate::import::ImportId;
use crate::resources::{get_all_resources, ApplyError, Resource, ResourceState};
use crate::schema::{
    Diagnostic, ProviderSchema, RpcRequest, RpcResponse, SchemaAttribute, SchemaBlock,
};
use crate::version::FmcVersion;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio::runtime::Runtime;

/// Client and server facts established by `ConfigureProvider`
#[derive(Clone)]
struct Session {
    client: FmcClient,
    /// `None` when the version could not be read; gating is skipped then
    version: Option<FmcVersion>,
}

/// FMC Terraform Provider
pub struct FmcProvider {
    session: RwLock<Option<Session>>,
    resources: HashMap<String, Box<dyn Resource>>,
    data_sources: HashMap<String, Box<dyn DataSource>>,
    runtime: Runtime,
}

fn state_param(params: &Value, key: &str) -> Option<ResourceState> {
    params.get(key).and_then(ResourceState::from_value)
}

/// Missing and null are the same value in Terraform state
fn attribute_changed(prior: &ResourceState, planned: &ResourceState, key: &str) -> bool {
    prior.get(key).unwrap_or(&Value::Null) != planned.get(key).unwrap_or(&Value::Null)
}

fn state_value(state: Option<&ResourceState>) -> Value {
    match state {
        Some(state) if !state.is_empty() => json!(state.values),
        _ => Value::Null,
    }
}

impl FmcProvider {
    /// Create a new provider
    pub fn new() -> std::io::Result<Self> {
        let resources = get_all_resources()
            .into_iter()
            .map(|r| (r.type_name().to_string(), r))
            .collect();
        let data_sources = get_all_data_sources()
            .into_iter()
            .map(|d| (d.type_name().to_string(), d))
            .collect();

        Ok(Self {
            session: RwLock::new(None),
            resources,
            data_sources,
            runtime: Runtime::new()?,
        })
    }

    /// Get provider schema
    fn get_schema(&self) -> ProviderSchema {
        let provider_block = SchemaBlock::new()
            .with_attribute(
                "url",
                SchemaAttribute::string()
                    .with_description("URL of the FMC instance, e.g. https://fmc.example.com. Can also be set with FMC_URL")
                    .optional(),
            )
            .with_attribute(
                "username",
                SchemaAttribute::string()
                    .with_description("Username for the FMC instance. Can also be set with FMC_USERNAME")
                    .optional(),
            )
            .with_attribute(
                "password",
                SchemaAttribute::string()
                    .with_description("Password for the FMC instance. Can also be set with FMC_PASSWORD")
                    .optional()
                    .sensitive(),
            )
            .with_attribute(
                "token",
                SchemaAttribute::string()
                    .with_description("API token for cloud-delivered FMC (alternative to username/password). Can also be set with FMC_TOKEN")
                    .optional()
                    .sensitive(),
            )
            .with_attribute(
                "domain",
                SchemaAttribute::string()
                    .with_description("Default FMC domain for all resources. Can also be set with FMC_DOMAIN")
                    .optional(),
            )
            .with_attribute(
                "insecure",
                SchemaAttribute::bool()
                    .with_description("Skip TLS certificate verification. Can also be set with FMC_INSECURE")
                    .optional()
                    .with_default(json!(false)),
            )
            .with_attribute(
                "retries",
                SchemaAttribute::number()
                    .with_description("Number of retries for REST API calls. Can also be set with FMC_RETRIES")
                    .optional(),
            )
            .with_attribute(
                "reqs_per_minute",
                SchemaAttribute::number()
                    .with_description("Maximum number of requests per minute, 0 disables throttling. Can also be set with FMC_REQS_PER_MINUTE")
                    .optional(),
            )
            .with_description("Cisco Secure Firewall Management Center provider");

        let mut schema = ProviderSchema::new(provider_block);
        for (name, resource) in &self.resources {
            schema = schema.with_resource(name, resource.schema());
        }
        for (name, data_source) in &self.data_sources {
            schema = schema.with_data_source(name, data_source.schema());
        }
        schema
    }

    /// Configure the provider
    fn configure(&self, config: ProviderConfig) -> Vec<Diagnostic> {
        let settings = match config.resolve() {
            Ok(settings) => settings,
            Err(message) => return vec![Diagnostic::error(&message)],
        };

        let client = match FmcClient::new(settings) {
            Ok(client) => client,
            Err(e) => {
                return vec![Diagnostic::error("Failed to create FMC client").with_detail(&e.to_string())]
            }
        };

        let mut diagnostics = Vec::new();
        let version = self.runtime.block_on(async {
            if let Err(e) = client.login().await {
                return Err(e);
            }
            Ok(client.server_version().await)
        });

        let version = match version {
            Ok(Ok(version)) => {
                tracing::info!("Connected to FMC {}", version);
                Some(version)
            }
            Ok(Err(e)) => {
                diagnostics.push(
                    Diagnostic::warning("Could not read the FMC version, version checks are disabled")
                        .with_detail(&e.to_string()),
                );
                None
            }
            Err(e) => {
                diagnostics.push(Diagnostic::error("Authentication failed").with_detail(&e.to_string()));
                return diagnostics;
            }
        };

        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(Session { client, version });
        diagnostics
    }

    /// Get the configured session
    fn get_session(&self) -> Result<Session, Diagnostic> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Diagnostic::error("Provider not configured"))
    }

    /// Error when the server is older than the resource needs
    fn check_version(&self, resource: &dyn Resource, session: &Session) -> Option<Diagnostic> {
        let required = resource.min_version()?;
        let actual = session.version?;
        if actual < required {
            Some(
                Diagnostic::error(&format!(
                    "{} requires FMC version {} or later",
                    resource.type_name(),
                    required
                ))
                .with_detail(&format!("Connected FMC runs version {}", actual)),
            )
        } else {
            None
        }
    }

    fn resource(&self, params: &Value) -> Result<&dyn Resource, Diagnostic> {
        let type_name = params
            .get("type_name")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        self.resources
            .get(type_name)
            .map(|r| r.as_ref())
            .ok_or_else(|| Diagnostic::error(&format!("Unknown resource type: {}", type_name)))
    }

    /// Handle an RPC request
    pub fn handle_request(&self, input: &str) -> String {
        let request: RpcRequest = match serde_json::from_str(input) {
            Ok(r) => r,
            Err(e) => {
                return serde_json::to_string(&RpcResponse::error(
                    0,
                    -32700,
                    &format!("Parse error: {}", e),
                ))
                .unwrap_or_default();
            }
        };
        tracing::debug!("RPC {} (id {})", request.method, request.id);

        let response = match request.method.as_str() {
            "GetProviderSchema" => self.handle_get_schema(request.id),
            "ConfigureProvider" => self.handle_configure(request.id, &request.params),
            "ValidateResourceConfig" => {
                self.handle_validate_resource(request.id, &request.params)
            }
            "PlanResourceChange" => self.handle_plan_resource(request.id, &request.params),
            "ApplyResourceChange" => self.handle_apply_resource(request.id, &request.params),
            "ReadResource" => self.handle_read_resource(request.id, &request.params),
            "ImportResourceState" => self.handle_import_resource(request.id, &request.params),
            "ReadDataSource" => self.handle_read_data_source(request.id, &request.params),
            "StopProvider" => RpcResponse::success(request.id, json!({})),
            _ => RpcResponse::error(
                request.id,
                -32601,
                &format!("Method not found: {}", request.method),
            ),
        };

        serde_json::to_string(&response).unwrap_or_else(|e| {
            serde_json::to_string(&RpcResponse::error(
                request.id,
                -32603,
                &format!("Serialization error: {}", e),
            ))
            .unwrap_or_default()
        })
    }

    /// Handle GetProviderSchema
    fn handle_get_schema(&self, id: i64) -> RpcResponse {
        let schema = self.get_schema();
        RpcResponse::success(id, serde_json::to_value(schema).unwrap_or_default())
    }

    /// Handle ConfigureProvider
    fn handle_configure(&self, id: i64, params: &Value) -> RpcResponse {
        let config: ProviderConfig = match params.get("config").filter(|c| !c.is_null()) {
            Some(config) => match serde_json::from_value(config.clone()) {
                Ok(config) => config,
                Err(e) => {
                    return RpcResponse::diagnostics(
                        id,
                        &[Diagnostic::error("Invalid provider configuration").with_detail(&e.to_string())],
                    )
                }
            },
            None => ProviderConfig::default(),
        };

        RpcResponse::diagnostics(id, &self.configure(config))
    }

    /// Handle ValidateResourceConfig
    fn handle_validate_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.resource(params) {
            Ok(r) => r,
            Err(diag) => return RpcResponse::diagnostics(id, &[diag]),
        };

        let config = state_param(params, "config").unwrap_or_default();
        RpcResponse::diagnostics(id, &resource.validate(&config))
    }

    /// Handle PlanResourceChange
    fn handle_plan_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.resource(params) {
            Ok(r) => r,
            Err(diag) => return RpcResponse::diagnostics(id, &[diag]),
        };

        let prior_state = state_param(params, "prior_state");
        let Some(proposed_state) = state_param(params, "proposed_new_state") else {
            // destroy
            return RpcResponse::success(id, json!({"planned_state": null, "diagnostics": []}));
        };

        match resource.plan_change(prior_state.as_ref(), &proposed_state) {
            Ok(planned) => {
                let requires_replace: Vec<Vec<&str>> = match &prior_state {
                    Some(prior) => resource
                        .requires_replace()
                        .iter()
                        .filter(|key| attribute_changed(prior, &planned, key))
                        .map(|key| vec![*key])
                        .collect(),
                    None => Vec::new(),
                };

                RpcResponse::success(
                    id,
                    json!({
                        "planned_state": planned.values,
                        "requires_replace": requires_replace,
                        "diagnostics": []
                    }),
                )
            }
            Err(diagnostics) => RpcResponse::diagnostics(id, &diagnostics),
        }
    }

    /// Handle ApplyResourceChange
    fn handle_apply_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.resource(params) {
            Ok(r) => r,
            Err(diag) => return RpcResponse::diagnostics(id, &[diag]),
        };

        let session = match self.get_session() {
            Ok(s) => s,
            Err(diag) => return RpcResponse::diagnostics(id, &[diag]),
        };

        let prior_state = state_param(params, "prior_state");
        let planned_state = state_param(params, "planned_state");

        if planned_state.is_some() {
            if let Some(diag) = self.check_version(resource, &session) {
                return RpcResponse::success(
                    id,
                    json!({"new_state": state_value(prior_state.as_ref()), "diagnostics": [diag]}),
                );
            }
        }

        let client = &session.client;
        let result = self.runtime.block_on(async {
            match (&prior_state, &planned_state) {
                (Some(prior), None) => resource.delete(client, prior).await.map(|_| None),
                (None, Some(planned)) => resource.create(client, planned).await.map(Some),
                (Some(prior), Some(planned)) => resource.update(client, prior, planned).await.map(Some),
                (None, None) => Ok(None),
            }
        });

        match result {
            Ok(new_state) => RpcResponse::success(
                id,
                json!({
                    "new_state": state_value(new_state.as_ref()),
                    "diagnostics": []
                }),
            ),
            Err(ApplyError {
                diagnostics,
                partial_state,
            }) => {
                // record what was done before the failure
                let new_state = match partial_state {
                    Some(partial) => state_value(Some(&partial)),
                    None => state_value(prior_state.as_ref()),
                };
                RpcResponse::success(
                    id,
                    json!({
                        "new_state": new_state,
                        "diagnostics": diagnostics
                    }),
                )
            }
        }
    }

    /// Handle ReadResource
    fn handle_read_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.resource(params) {
            Ok(r) => r,
            Err(diag) => return RpcResponse::diagnostics(id, &[diag]),
        };

        let session = match self.get_session() {
            Ok(s) => s,
            Err(diag) => return RpcResponse::diagnostics(id, &[diag]),
        };

        let current_state = state_param(params, "current_state").unwrap_or_default();

        let result = self
            .runtime
            .block_on(async { resource.read(&session.client, &current_state).await });

        match result {
            // an empty state means the resource no longer exists
            Ok(state) => RpcResponse::success(
                id,
                json!({
                    "new_state": state_value(Some(&state)),
                    "diagnostics": []
                }),
            ),
            Err(diagnostics) => RpcResponse::diagnostics(id, &diagnostics),
        }
    }

    /// Handle ImportResourceState
    fn handle_import_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.resource(params) {
            Ok(r) => r,
            Err(diag) => return RpcResponse::diagnostics(id, &[diag]),
        };
        let raw_id = params.get("id").and_then(|v| v.as_str()).unwrap_or("");

        let session = match self.get_session() {
            Ok(s) => s,
            Err(diag) => return RpcResponse::diagnostics(id, &[diag]),
        };

        let import_state = match ImportId::parse(raw_id)
            .map_err(|e| vec![Diagnostic::error(&e.to_string())])
            .and_then(|parsed| resource.import_state(&parsed))
        {
            Ok(state) => state,
            Err(diagnostics) => return RpcResponse::diagnostics(id, &diagnostics),
        };

        let result = self
            .runtime
            .block_on(async { resource.read(&session.client, &import_state).await });

        match result {
            Ok(state) if state.is_empty() => RpcResponse::diagnostics(
                id,
                &[Diagnostic::error(&format!("Resource {} not found", raw_id))],
            ),
            Ok(state) => RpcResponse::success(
                id,
                json!({
                    "imported_resources": [{
                        "type_name": resource.type_name(),
                        "state": state.values
                    }],
                    "diagnostics": []
                }),
            ),
            Err(diagnostics) => RpcResponse::diagnostics(id, &diagnostics),
        }
    }

    /// Handle ReadDataSource
    fn handle_read_data_source(&self, id: i64, params: &Value) -> RpcResponse {
        let type_name = params
            .get("type_name")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let Some(data_source) = self.data_sources.get(type_name) else {
            return RpcResponse::diagnostics(
                id,
                &[Diagnostic::error(&format!("Unknown data source type: {}", type_name))],
            );
        };

        let session = match self.get_session() {
            Ok(s) => s,
            Err(diag) => return RpcResponse::diagnostics(id, &[diag]),
        };

        let config = state_param(params, "config").unwrap_or_default();
        let result = self
            .runtime
            .block_on(async { data_source.read(&session.client, &config).await });

        match result {
            Ok(state) => RpcResponse::success(
                id,
                json!({
                    "state": state.values,
                    "diagnostics": []
                }),
            ),
            Err(diagnostics) => RpcResponse::diagnostics(id, &diagnostics),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> FmcProvider {
        FmcProvider::new().unwrap()
    }

    fn call(provider: &FmcProvider, method: &str, params: Value) -> Value {
        let request = json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params});
        serde_json::from_str(&provider.handle_request(&request.to_string())).unwrap()
    }

    #[test]
    fn test_provider_creation() {
        let provider = provider();
        assert!(provider.resources.contains_key("fmc_hosts"));
        assert!(provider.data_sources.contains_key("fmc_host"));
    }

    #[test]
    fn test_provider_schema() {
        let schema = provider().get_schema();

        assert!(schema.provider.attributes.contains_key("url"));
        assert!(schema.provider.attributes["password"].sensitive);
        assert!(schema.provider.attributes["token"].sensitive);
        assert!(schema.resource_schemas.contains_key("fmc_prefilter_policy"));
        assert!(schema.data_source_schemas.contains_key("fmc_dynamic_object"));
    }

    #[test]
    fn test_handle_unknown_method() {
        let response = call(&provider(), "UnknownMethod", json!({}));
        assert_eq!(response["error"]["code"], json!(-32601));
    }

    #[test]
    fn test_apply_requires_configuration() {
        let response = call(
            &provider(),
            "ApplyResourceChange",
            json!({"type_name": "fmc_host", "planned_state": {"name": "h"}}),
        );
        assert_eq!(
            response["result"]["diagnostics"][0]["summary"],
            json!("Provider not configured")
        );
    }

    #[test]
    fn test_validate_reports_missing_attributes() {
        let response = call(
            &provider(),
            "ValidateResourceConfig",
            json!({"type_name": "fmc_host", "config": {"name": "web", "ip": null}}),
        );
        let diagnostics = response["result"]["diagnostics"].as_array().unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0]["attribute"], json!(["ip"]));
    }

    #[test]
    fn test_plan_marks_replacement() {
        let response = call(
            &provider(),
            "PlanResourceChange",
            json!({
                "type_name": "fmc_dynamic_object_mappings",
                "prior_state": {"id": "a", "dynamic_object_id": "a", "mappings": []},
                "proposed_new_state": {"dynamic_object_id": "b", "mappings": []}
            }),
        );
        assert_eq!(
            response["result"]["requires_replace"],
            json!([["dynamic_object_id"]])
        );
    }

    #[test]
    fn test_plan_after_import_keeps_resource() {
        // imported state has no domain key, config sends domain = null
        let items = json!({"web": {"id": "h1", "ip": "10.0.0.1", "description": null, "overridable": false}});
        let response = call(
            &provider(),
            "PlanResourceChange",
            json!({
                "type_name": "fmc_hosts",
                "prior_state": {"id": "dom", "items": items},
                "proposed_new_state": {"domain": null, "items": items}
            }),
        );
        assert_eq!(response["result"]["requires_replace"], json!([]));
    }

    #[test]
    fn test_plan_destroy() {
        let response = call(
            &provider(),
            "PlanResourceChange",
            json!({
                "type_name": "fmc_host",
                "prior_state": {"id": "1"},
                "proposed_new_state": null
            }),
        );
        assert_eq!(response["result"]["planned_state"], Value::Null);
    }

    #[test]
    fn test_version_gate_message() {
        let provider = provider();
        let client = FmcClient::new(crate::config::ClientSettings::new(
            "http://127.0.0.1:1",
            crate::config::Credentials::Token("t".to_string()),
        ))
        .unwrap();
        let session = Session {
            client,
            version: Some(FmcVersion::new(7, 2, 0)),
        };

        let resource = provider.resources["fmc_dynamic_objects"].as_ref();
        let diag = provider.check_version(resource, &session).unwrap();
        assert_eq!(diag.summary, "fmc_dynamic_objects requires FMC version 7.4.0 or later");

        let resource = provider.resources["fmc_hosts"].as_ref();
        assert!(provider.check_version(resource, &session).is_none());
    }
}
