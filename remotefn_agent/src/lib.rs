// SPDX-FileCopyrightText: © 2024 The remotefn authors
// SPDX-License-Identifier: MIT

use remotefn_api::binding::{BindingHost, InputBinding};
use remotefn_api::config::ServiceConfig;
use remotefn_api::function::FunctionRegistry;
use remotefn_api::report::InvocationReport;
use remotefn_engine::{EngineContext, Invocation};

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct RemoteFnAgentSettings {
    /// URL the callback receiver binds to.
    pub callback_bind_url: String,
    /// Callback address advertised to remote services; usually the bind URL
    /// as reachable from the outside.
    pub callback_advertised_url: String,
    pub callback_timeout_ms: u64,
    /// Service configuration files (TOML) loaded at startup.
    pub services: Vec<String>,
}

pub fn remotefn_agent_default_conf() -> String {
    String::from(
        r##"callback_bind_url = "http://127.0.0.1:7200"
callback_advertised_url = "http://127.0.0.1:7200"
callback_timeout_ms = 30000
services = []
"##,
    )
}

/// The running host: loaded service configurations, the engine context and
/// the callback receiver task.
pub struct Agent {
    context: EngineContext,
    services: std::collections::HashMap<String, std::sync::Arc<ServiceConfig>>,
    receiver: tokio::task::JoinHandle<()>,
}

impl Agent {
    /// Load the configured services, start the callback receiver and wire
    /// the engine context. `functions` holds the local routines callable
    /// through `local` service targets.
    pub async fn new(settings: &RemoteFnAgentSettings, functions: FunctionRegistry) -> anyhow::Result<Self> {
        let mut services = std::collections::HashMap::new();
        for path in &settings.services {
            let config: ServiceConfig = toml::from_str(&std::fs::read_to_string(path)?)?;
            config.validate()?;
            log::info!("Loaded service '{}' from {}", config.name, path);
            services.insert(config.name.clone(), std::sync::Arc::new(config));
        }

        let callbacks = std::sync::Arc::new(remotefn_callback::CallbackRegistry::new());
        let receiver =
            remotefn_callback::receiver::receiver_task(callbacks.clone(), &settings.callback_bind_url).await?;

        Ok(Self {
            context: EngineContext {
                client: reqwest::Client::new(),
                callbacks,
                functions: std::sync::Arc::new(functions),
                callback_address: Some(settings.callback_advertised_url.clone()),
                callback_timeout: std::time::Duration::from_millis(settings.callback_timeout_ms),
            },
            services,
            receiver,
        })
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    pub fn service(&self, name: &str) -> Option<std::sync::Arc<ServiceConfig>> {
        self.services.get(name).cloned()
    }

    /// Execute one invocation of a named service over a binding host.
    pub async fn invoke(
        &self,
        service_name: &str,
        inputs: std::collections::HashMap<String, InputBinding>,
        outputs: Vec<(String, String)>,
        host: &mut BindingHost,
    ) -> anyhow::Result<InvocationReport> {
        let service = self
            .service(service_name)
            .ok_or_else(|| anyhow::anyhow!("no service configured under '{}'", service_name))?;
        let mut invocation = Invocation::new(service, inputs, outputs);
        let report = invocation.execute(&self.context, host).await?;
        log::info!(
            "Invocation '{}' of service '{}' finished with status {} after {} ms",
            invocation.key,
            service_name,
            report.status,
            report.duration().num_milliseconds()
        );
        Ok(report)
    }

    /// Stop the receiver and revoke all pending callback tokens.
    pub async fn shutdown(self) {
        self.receiver.abort();
        self.context.callbacks.shutdown().await;
    }
}

/// Entry point of the agent daemon: host the callback receiver until the
/// process is stopped.
pub async fn remotefn_agent_main(settings: RemoteFnAgentSettings) {
    let agent = match Agent::new(&settings, FunctionRegistry::new()).await {
        Ok(agent) => agent,
        Err(err) => {
            panic!("could not start the remotefn agent: {}", err)
        }
    };
    log::info!(
        "remotefn agent up, {} service(s), callbacks on {}",
        agent.services.len(),
        settings.callback_bind_url
    );
    let Agent { receiver, .. } = agent;
    if let Err(err) = receiver.await {
        log::error!("callback receiver terminated: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remotefn_api::value::TypedValue;

    #[test]
    fn test_default_conf_parses() {
        let settings: RemoteFnAgentSettings = toml::from_str(&remotefn_agent_default_conf()).unwrap();
        assert_eq!(settings.callback_timeout_ms, 30000);
        assert!(settings.services.is_empty());
    }

    #[tokio::test]
    async fn test_agent_loads_service_files_and_rejects_unknown_services() {
        let service_file = std::env::temp_dir().join(format!("remotefn-service-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &service_file,
            r#"
                name = "echo"

                [target.local]
                className = "test.Echo"
                methodName = "echo"

                [[arguments]]
                key = "a"
                argumentName = "a"
            "#,
        )
        .unwrap();

        let settings = RemoteFnAgentSettings {
            callback_bind_url: "http://127.0.0.1:0".to_string(),
            callback_advertised_url: "http://127.0.0.1:0".to_string(),
            callback_timeout_ms: 1000,
            services: vec![service_file.to_string_lossy().to_string()],
        };
        let agent = Agent::new(&settings, FunctionRegistry::new()).await.unwrap();
        assert!(agent.service("echo").is_some());
        assert!(agent.service("missing").is_none());

        let mut host = BindingHost::from_rows(vec![[("v".to_string(), TypedValue::int(1))]
            .into_iter()
            .collect()]);
        let result = agent
            .invoke("missing", std::collections::HashMap::new(), vec![], &mut host)
            .await;
        assert!(result.is_err());

        agent.shutdown().await;
        std::fs::remove_file(&service_file).unwrap();
    }
}
