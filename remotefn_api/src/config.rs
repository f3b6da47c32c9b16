// SPDX-FileCopyrightText: © 2024 The remotefn authors
// SPDX-License-Identifier: MIT

use crate::error::RemoteFnError;
use crate::value::DataType;

/// The REST payload styles a service can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RestMethod {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "POST-JSON")]
    PostJson,
    #[serde(rename = "POST-JSON-MF")]
    PostJsonMultipart,
}

impl RestMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestMethod::Get => "GET",
            RestMethod::PostJson => "POST-JSON",
            RestMethod::PostJsonMultipart => "POST-JSON-MF",
        }
    }
}

impl std::fmt::Display for RestMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a service call goes: a REST endpoint, or a local routine registered
/// in the function registry under its class and method names.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceTarget {
    #[serde(rename_all = "camelCase")]
    Rest { url: String, method: RestMethod },
    #[serde(rename_all = "camelCase")]
    Local {
        class_name: String,
        method_name: String,
    },
}

/// Declarative description of one input argument.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentConfig {
    /// The key under which the invocation binds this argument.
    pub key: String,
    /// The rendered name; may contain `{otherArgKey}` placeholders that are
    /// substituted with the referenced arguments' resolved values.
    pub argument_name: String,
    /// A row missing a mandatory argument is excluded from its batch payload.
    #[serde(default = "default_true")]
    pub mandatory: bool,
    /// Marker string: everything up to and including its last occurrence is
    /// removed from the lexical form before the value is used.
    #[serde(default)]
    pub strip: Option<String>,
    /// Fallback used when neither a constant nor a row binding resolves.
    #[serde(default)]
    pub default_value: Option<serde_json::Value>,
    /// Rows sharing the values of all batch-group arguments are planned into
    /// the same batch.
    #[serde(default)]
    pub forms_batch_group: bool,
}

/// Declarative description of one output binding.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    /// Dot path under the selected result element.
    #[serde(default)]
    pub path: Option<String>,
    pub data_type: DataType,
}

/// How the batched result maps back onto individual rows.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultConfig {
    /// Output key that binds the whole selected element as a JSON object.
    #[serde(default)]
    pub result_name: Option<String>,
    /// Dot path traversed into the result before any per-row selection.
    #[serde(default)]
    pub output_property: Option<String>,
    /// Argument key whose per-row value correlates the row with one element
    /// of a batched result.
    #[serde(default)]
    pub correlation_input: Option<String>,
    /// Dot path under a result element holding its correlation id.
    #[serde(default)]
    pub result_id_property: Option<String>,
    /// Dot path under an asynchronously delivered payload holding the
    /// invocation id it answers.
    #[serde(default)]
    pub callback_property: Option<String>,
    #[serde(default)]
    pub outputs: std::collections::HashMap<String, OutputConfig>,
}

/// One configured authentication header attached to every REST request.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    pub auth_key: String,
    pub auth_code: String,
}

/// Immutable description of one function signature: its target, arguments,
/// result mapping and batching behavior. One instance per signature, shared
/// by all invocations of it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub name: String,
    pub target: ServiceTarget,
    #[serde(default)]
    pub arguments: Vec<ArgumentConfig>,
    #[serde(default)]
    pub result: ResultConfig,
    /// Maximum rows per batch; 1 means no batching unless batch-group
    /// arguments are declared.
    #[serde(default = "default_batch")]
    pub batch: u64,
    /// Dot path to the JSON body leaf holding the rendered input; required
    /// for batched POST bodies.
    #[serde(default)]
    pub input_property: Option<String>,
    #[serde(default)]
    pub authentication: Option<AuthConfig>,
    /// Dot path where the generated invocation id is injected into the body.
    #[serde(default)]
    pub invocation_id_property: Option<String>,
    /// Dot path where the advertised callback address is injected into the
    /// body.
    #[serde(default)]
    pub callback_property: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_batch() -> u64 {
    1
}

impl ServiceConfig {
    pub fn argument(&self, key: &str) -> Option<&ArgumentConfig> {
        self.arguments.iter().find(|argument| argument.key == key)
    }

    pub fn batch_group_arguments(&self) -> Vec<&ArgumentConfig> {
        self.arguments.iter().filter(|argument| argument.forms_batch_group).collect()
    }

    /// Checks for missing or contradictory settings. A failure here aborts
    /// the invocation before any batch is dispatched.
    pub fn validate(&self) -> Result<(), RemoteFnError> {
        if self.batch == 0 {
            return Err(RemoteFnError::Configuration(format!(
                "service '{}': batch must be at least 1",
                self.name
            )));
        }
        if let ServiceTarget::Rest { method, .. } = &self.target {
            match method {
                RestMethod::PostJson | RestMethod::PostJsonMultipart => {
                    if self.batch > 1 && self.input_property.is_none() {
                        return Err(RemoteFnError::Configuration(format!(
                            "service '{}': cannot use batch mode without inputProperty",
                            self.name
                        )));
                    }
                }
                RestMethod::Get => {
                    if self.invocation_id_property.is_some() || self.callback_property.is_some() {
                        return Err(RemoteFnError::Configuration(format!(
                            "service '{}': invocationIdProperty/callbackProperty require a JSON body method",
                            self.name
                        )));
                    }
                }
            }
        }
        if let Some(correlation) = &self.result.correlation_input {
            if self.argument(correlation).is_none() {
                return Err(RemoteFnError::Configuration(format!(
                    "service '{}': correlationInput '{}' does not name a declared argument",
                    self.name, correlation
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rest_config(method: RestMethod, batch: u64, input_property: Option<&str>) -> ServiceConfig {
        ServiceConfig {
            name: "test".to_string(),
            target: ServiceTarget::Rest {
                url: "http://localhost:8080/api".to_string(),
                method,
            },
            arguments: vec![ArgumentConfig {
                key: "a".to_string(),
                argument_name: "a".to_string(),
                mandatory: true,
                strip: None,
                default_value: None,
                forms_batch_group: false,
            }],
            result: ResultConfig::default(),
            batch,
            input_property: input_property.map(|p| p.to_string()),
            authentication: None,
            invocation_id_property: None,
            callback_property: None,
        }
    }

    #[test]
    fn test_validate_batch_mode_requires_input_property() {
        assert!(rest_config(RestMethod::PostJson, 2, None).validate().is_err());
        assert!(rest_config(RestMethod::PostJson, 2, Some("data")).validate().is_ok());
        assert!(rest_config(RestMethod::PostJson, 1, None).validate().is_ok());
    }

    #[test]
    fn test_validate_correlation_input_must_be_declared() {
        let mut config = rest_config(RestMethod::PostJson, 1, None);
        config.result.correlation_input = Some("nope".to_string());
        assert!(config.validate().is_err());
        config.result.correlation_input = Some("a".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_get_rejects_body_injection_properties() {
        let mut config = rest_config(RestMethod::Get, 1, None);
        config.callback_property = Some("callback".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            name = "issue"
            batch = 2
            inputProperty = "inputs"

            [target.rest]
            url = "https://prognosis.example/api"
            method = "POST-JSON"

            [[arguments]]
            key = "vin"
            argumentName = "vehicleId"
            strip = "urn:vin:"

            [[arguments]]
            key = "span"
            argumentName = "observationSpan"
            mandatory = false

            [result]
            outputProperty = "predictions"
            correlationInput = "vin"
            resultIdProperty = "vehicleId"

            [result.outputs.remaining]
            path = "remainingDistance"
            dataType = "int"
        "#;
        let config: ServiceConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.batch, 2);
        assert_eq!(config.arguments.len(), 2);
        assert_eq!(config.arguments[0].strip.as_deref(), Some("urn:vin:"));
        assert!(config.arguments[0].mandatory);
        assert!(!config.arguments[1].mandatory);
        assert_eq!(
            config.result.outputs.get("remaining").unwrap().data_type,
            DataType::Int
        );
        assert!(config.validate().is_ok());
        match &config.target {
            ServiceTarget::Rest { method, .. } => assert_eq!(*method, RestMethod::PostJson),
            ServiceTarget::Local { .. } => panic!("expected a rest target"),
        }
    }
}
