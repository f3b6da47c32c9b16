// SPDX-FileCopyrightText: © 2024 The remotefn authors
// SPDX-License-Identifier: MIT

use crate::convert;
use crate::demux;
use crate::planner;
use crate::render;
use remotefn_api::binding::{BindingHost, InputBinding};
use remotefn_api::config::{RestMethod, ServiceConfig, ServiceTarget};
use remotefn_api::error::RemoteFnError;
use remotefn_api::report::InvocationReport;
use remotefn_http::{RenderedBody, RenderedRequest, ResultNode};

/// Everything an invocation needs besides its own bindings: the shared HTTP
/// client, the callback registry, the local-function registry and the
/// callback endpoint advertised to remote services.
pub struct EngineContext {
    pub client: reqwest::Client,
    pub callbacks: std::sync::Arc<remotefn_callback::CallbackRegistry>,
    pub functions: std::sync::Arc<remotefn_api::function::FunctionRegistry>,
    pub callback_address: Option<String>,
    pub callback_timeout: std::time::Duration,
}

impl EngineContext {
    pub fn new(callback_address: Option<String>, callback_timeout: std::time::Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            callbacks: std::sync::Arc::new(remotefn_callback::CallbackRegistry::new()),
            functions: std::sync::Arc::new(remotefn_api::function::FunctionRegistry::new()),
            callback_address,
            callback_timeout,
        }
    }
}

/// One function call over a binding host. Created per query-time call site,
/// executed once, discarded after the rows are bound.
///
/// A single invocation may still dispatch several requests, one per planned
/// batch; batches run sequentially and their worst status code becomes the
/// invocation's aggregate status.
pub struct Invocation {
    pub service: std::sync::Arc<ServiceConfig>,
    /// Unique invocation key; batch invocation ids derive from it.
    pub key: String,
    /// Argument key to constant-or-variable input binding.
    pub inputs: std::collections::HashMap<String, InputBinding>,
    /// Row variable to output key.
    pub outputs: Vec<(String, String)>,
    /// 0 until a batch touches it, otherwise the worst code seen.
    pub status: u16,
    pub started: Option<chrono::DateTime<chrono::Utc>>,
    pub finished: Option<chrono::DateTime<chrono::Utc>>,
}

impl Invocation {
    pub fn new(
        service: std::sync::Arc<ServiceConfig>,
        inputs: std::collections::HashMap<String, InputBinding>,
        outputs: Vec<(String, String)>,
    ) -> Self {
        Self {
            service,
            key: format!("urn:uuid:{}", uuid::Uuid::new_v4()),
            inputs,
            outputs,
            status: 0,
            started: None,
            finished: None,
        }
    }

    /// Execute all batches and bind the outputs onto the host's rows.
    ///
    /// Only configuration errors abort the invocation; every other failure
    /// is scoped to its row or batch, logged and folded into the aggregate
    /// status of the returned report.
    pub async fn execute(
        &mut self,
        ctx: &EngineContext,
        host: &mut BindingHost,
    ) -> Result<InvocationReport, RemoteFnError> {
        self.service.validate()?;
        let started = chrono::Utc::now();
        self.started = Some(started);
        log::debug!(
            "Starting invocation '{}' of service '{}' over {} rows",
            self.key,
            self.service.name,
            host.len()
        );

        let service = self.service.clone();
        let result = match &service.target {
            ServiceTarget::Rest { .. } => self.execute_rest(ctx, host).await,
            ServiceTarget::Local {
                class_name,
                method_name,
            } => self.execute_local(ctx, host, class_name, method_name),
        };

        let finished = chrono::Utc::now();
        self.finished = Some(finished);
        result?;
        Ok(InvocationReport {
            status: self.status,
            started,
            finished,
        })
    }

    async fn execute_rest(&mut self, ctx: &EngineContext, host: &mut BindingHost) -> Result<(), RemoteFnError> {
        let service = self.service.clone();
        let method = match &service.target {
            ServiceTarget::Rest { method, .. } => *method,
            ServiceTarget::Local { .. } => {
                return Err(RemoteFnError::Configuration(format!(
                    "service '{}' has no REST target",
                    service.name
                )))
            }
        };

        let batches = planner::produce_batches(&service, &self.inputs, host);
        for (batch_index, batch) in batches.iter().enumerate() {
            let invocation_id = format!("{}&batch={}", self.key, batch_index);
            let rendered = match method {
                RestMethod::Get => render::render_query_request(&service, &self.inputs, host, batch),
                RestMethod::PostJson | RestMethod::PostJsonMultipart => render::render_json_request(
                    &service,
                    &self.inputs,
                    host,
                    batch,
                    &invocation_id,
                    ctx.callback_address.as_deref(),
                ),
            };
            let rendered = match rendered {
                Ok(rendered) => rendered,
                Err(err @ RemoteFnError::Configuration(_)) => return Err(err),
                Err(err) => {
                    log::warn!("Could not render batch {}: {}", batch_index, err);
                    self.status = self.status.max(500);
                    continue;
                }
            };
            self.status = self.status.max(rendered.status);
            if rendered.usable_rows.is_empty() {
                log::debug!("No usable rows in batch {}, skipping dispatch", batch_index);
                continue;
            }

            let token = if method != RestMethod::Get
                && service.callback_property.is_some()
                && ctx.callback_address.is_some()
            {
                match &service.result.callback_property {
                    Some(property) => Some(ctx.callbacks.register(property, &invocation_id).await),
                    None => None,
                }
            } else {
                None
            };

            log::debug!("Performing {} {}", rendered.request.method, rendered.request.url);
            let response = match send_request(&ctx.client, &rendered.request).await {
                Ok(response) => response,
                Err(err) => {
                    log::warn!(
                        "Got an exception {} when invoking {}, ignoring",
                        err,
                        rendered.request.url
                    );
                    self.status = self.status.max(500);
                    if let Some(token) = token {
                        ctx.callbacks.revoke(&token).await;
                    }
                    continue;
                }
            };

            let code = response.status().as_u16();
            if !(200..300).contains(&code) {
                log::warn!(
                    "Got an unsuccessful status {} from invoking {}, ignoring",
                    code,
                    rendered.request.url
                );
                self.status = self.status.max(code);
                if let Some(token) = token {
                    ctx.callbacks.revoke(&token).await;
                }
                continue;
            }

            // In callback mode the immediate body only matters for its
            // status code; the real result arrives through the registry.
            let result = match token {
                Some(token) => match ctx.callbacks.wait(token, ctx.callback_timeout).await {
                    Ok(payload) => ResultNode::Json(payload),
                    Err(err) => {
                        log::warn!("{}", err);
                        self.status = self.status.max(500);
                        continue;
                    }
                },
                None => match parse_response(response).await {
                    Ok(node) => node,
                    Err(err) => {
                        log::warn!(
                            "Got an exception {} when processing invocation results of {}, ignoring",
                            err,
                            rendered.request.url
                        );
                        self.status = self.status.max(500);
                        continue;
                    }
                },
            };

            let bound = demux::bind_batch_outputs(
                &service,
                &self.inputs,
                &self.outputs,
                &result,
                host,
                &rendered.usable_rows,
            );
            self.status = self.status.max(bound);
        }
        Ok(())
    }

    fn execute_local(
        &mut self,
        ctx: &EngineContext,
        host: &mut BindingHost,
        class_name: &str,
        method_name: &str,
    ) -> Result<(), RemoteFnError> {
        let service = self.service.clone();
        let function = ctx.functions.resolve(class_name, method_name).ok_or_else(|| {
            RemoteFnError::Configuration(format!(
                "no local function registered for '{}::{}'",
                class_name, method_name
            ))
        })?;

        // Parameter-to-argument matching is per signature, not per row: a
        // parameter is satisfied by the first argument whose rendered name
        // contains the parameter name.
        let mut mapping = Vec::new();
        for parameter in function.parameters() {
            let argument = service
                .arguments
                .iter()
                .find(|argument| argument.argument_name.contains(&parameter.name))
                .ok_or_else(|| {
                    RemoteFnError::Configuration(format!(
                        "no argument of service '{}' satisfies parameter '{}'",
                        service.name, parameter.name
                    ))
                })?;
            mapping.push((parameter.clone(), argument.clone()));
        }

        for row_index in 0..host.len() {
            let mut arguments = Vec::new();
            let mut complete = true;
            for (parameter, argument) in &mapping {
                let value = render::resolve_value(&self.inputs, &argument.key, &host.rows()[row_index]);
                match value {
                    Some(value) => match convert::to_host(value, parameter.kind, argument.strip.as_deref()) {
                        Ok(host_value) => arguments.push(host_value),
                        Err(err) => {
                            log::warn!("Could not convert argument '{}': {}", argument.key, err);
                            self.status = self.status.max(500);
                            complete = false;
                            break;
                        }
                    },
                    None => {
                        log::warn!(
                            "Argument '{}' has no binding for row {}, skipping the row",
                            argument.key,
                            row_index
                        );
                        self.status = self.status.max(500);
                        complete = false;
                        break;
                    }
                }
            }
            if !complete {
                continue;
            }

            match function.invoke(arguments) {
                Ok(result) => {
                    let node = ResultNode::Json(result);
                    let bound = demux::bind_batch_outputs(
                        &service,
                        &self.inputs,
                        &self.outputs,
                        &node,
                        host,
                        &[row_index],
                    );
                    self.status = self.status.max(bound);
                }
                Err(err) => {
                    log::warn!(
                        "Invocation of '{}::{}' resulted in exception {}",
                        class_name,
                        method_name,
                        err
                    );
                    self.status = self.status.max(500);
                }
            }
        }
        Ok(())
    }
}

async fn send_request(client: &reqwest::Client, request: &RenderedRequest) -> Result<reqwest::Response, reqwest::Error> {
    let mut builder = match request.method {
        RestMethod::Get => client.get(&request.url),
        RestMethod::PostJson | RestMethod::PostJsonMultipart => client.post(&request.url),
    };
    for (key, value) in &request.headers {
        builder = builder.header(key, value);
    }
    builder = match &request.body {
        RenderedBody::None => builder,
        RenderedBody::Json(body) => builder.json(body),
        RenderedBody::MultipartJson(parts) => {
            let mut form = reqwest::multipart::Form::new();
            for (field, value) in parts {
                let part = reqwest::multipart::Part::text(value.to_string())
                    .file_name(format!("{}.json", field))
                    .mime_str("application/json")?;
                form = form.part(field.clone(), part);
            }
            builder.multipart(form)
        }
    };
    builder.send().await
}

async fn parse_response(response: reqwest::Response) -> anyhow::Result<ResultNode> {
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());
    let bytes = response.bytes().await?;
    remotefn_http::parse_body(remotefn_http::classify_content_type(content_type.as_deref()), &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use remotefn_api::binding::SolutionRow;
    use remotefn_api::config::{ArgumentConfig, OutputConfig, ResultConfig};
    use remotefn_api::function::{LocalFunction, ParameterSpec};
    use remotefn_api::value::{DataType, HostKind, HostValue, TypedValue};

    struct Multiplier;

    impl LocalFunction for Multiplier {
        fn parameters(&self) -> &[ParameterSpec] {
            static PARAMETERS: std::sync::OnceLock<Vec<ParameterSpec>> = std::sync::OnceLock::new();
            PARAMETERS.get_or_init(|| {
                vec![
                    ParameterSpec::new("value", HostKind::Int),
                    ParameterSpec::new("factor", HostKind::Int),
                ]
            })
        }

        fn invoke(&self, arguments: Vec<HostValue>) -> anyhow::Result<serde_json::Value> {
            match (arguments.first(), arguments.get(1)) {
                (Some(HostValue::Int(value)), Some(HostValue::Int(factor))) => {
                    Ok(serde_json::json!({"product": value * factor}))
                }
                other => anyhow::bail!("unexpected arguments {:?}", other),
            }
        }
    }

    fn local_service() -> ServiceConfig {
        ServiceConfig {
            name: "multiply".to_string(),
            target: ServiceTarget::Local {
                class_name: "math.Calculator".to_string(),
                method_name: "multiply".to_string(),
            },
            arguments: vec![
                ArgumentConfig {
                    key: "value".to_string(),
                    argument_name: "value".to_string(),
                    mandatory: true,
                    strip: None,
                    default_value: None,
                    forms_batch_group: false,
                },
                ArgumentConfig {
                    key: "factor".to_string(),
                    argument_name: "factor".to_string(),
                    mandatory: true,
                    strip: None,
                    default_value: None,
                    forms_batch_group: false,
                },
            ],
            result: ResultConfig {
                outputs: [(
                    "product".to_string(),
                    OutputConfig {
                        path: Some("product".to_string()),
                        data_type: DataType::Int,
                    },
                )]
                .into_iter()
                .collect(),
                ..Default::default()
            },
            batch: 1,
            input_property: None,
            authentication: None,
            invocation_id_property: None,
            callback_property: None,
        }
    }

    fn local_context() -> EngineContext {
        let mut functions = remotefn_api::function::FunctionRegistry::new();
        functions.register("math.Calculator", "multiply", std::sync::Arc::new(Multiplier));
        EngineContext {
            functions: std::sync::Arc::new(functions),
            ..EngineContext::new(None, std::time::Duration::from_secs(1))
        }
    }

    fn inputs() -> std::collections::HashMap<String, InputBinding> {
        [
            ("value".to_string(), InputBinding::Variable("v".to_string())),
            ("factor".to_string(), InputBinding::Constant(TypedValue::int(3))),
        ]
        .into_iter()
        .collect()
    }

    fn row(value: i32) -> SolutionRow {
        [("v".to_string(), TypedValue::int(value))].into_iter().collect()
    }

    #[tokio::test]
    async fn test_local_invocation_binds_each_row() {
        let ctx = local_context();
        let mut invocation = Invocation::new(
            std::sync::Arc::new(local_service()),
            inputs(),
            vec![("out".to_string(), "product".to_string())],
        );
        let mut host = BindingHost::from_rows(vec![row(2), row(5)]);

        let report = invocation.execute(&ctx, &mut host).await.unwrap();

        assert_eq!(report.status, 0);
        assert!(report.is_success());
        assert_eq!(host.rows()[0].get("out"), Some(&TypedValue::int(6)));
        assert_eq!(host.rows()[1].get("out"), Some(&TypedValue::int(15)));
    }

    #[tokio::test]
    async fn test_local_row_failures_do_not_abort_siblings() {
        let ctx = local_context();
        let mut invocation = Invocation::new(
            std::sync::Arc::new(local_service()),
            inputs(),
            vec![("out".to_string(), "product".to_string())],
        );
        let bad_row: SolutionRow = [("v".to_string(), TypedValue::string("not-a-number"))]
            .into_iter()
            .collect();
        let mut host = BindingHost::from_rows(vec![bad_row, row(4)]);

        let report = invocation.execute(&ctx, &mut host).await.unwrap();

        assert_eq!(report.status, 500);
        assert!(host.rows()[0].get("out").is_none());
        assert_eq!(host.rows()[1].get("out"), Some(&TypedValue::int(12)));
    }

    #[tokio::test]
    async fn test_unregistered_local_function_is_a_configuration_error() {
        let ctx = EngineContext::new(None, std::time::Duration::from_secs(1));
        let mut invocation = Invocation::new(
            std::sync::Arc::new(local_service()),
            inputs(),
            vec![("out".to_string(), "product".to_string())],
        );
        let mut host = BindingHost::from_rows(vec![row(1)]);

        match invocation.execute(&ctx, &mut host).await {
            Err(RemoteFnError::Configuration(message)) => assert!(message.contains("math.Calculator")),
            other => panic!("expected a configuration error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_empty_host_completes_trivially() {
        let ctx = local_context();
        let mut invocation = Invocation::new(
            std::sync::Arc::new(local_service()),
            inputs(),
            vec![("out".to_string(), "product".to_string())],
        );
        let mut host = BindingHost::new();

        let report = invocation.execute(&ctx, &mut host).await.unwrap();
        assert_eq!(report.status, 0);
    }

    #[tokio::test]
    async fn test_invalid_configuration_aborts_before_dispatch() {
        let mut service = local_service();
        service.batch = 0;
        let ctx = local_context();
        let mut invocation = Invocation::new(
            std::sync::Arc::new(service),
            inputs(),
            vec![("out".to_string(), "product".to_string())],
        );
        let mut host = BindingHost::from_rows(vec![row(1)]);
        assert!(matches!(
            invocation.execute(&ctx, &mut host).await,
            Err(RemoteFnError::Configuration(_))
        ));
    }
}
