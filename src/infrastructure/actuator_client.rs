// Actuator (context broker) client
use crate::application::ports::Actuator;
use crate::domain::command::CommandRequest;
use crate::domain::error::MonitorError;
use crate::infrastructure::config::ActuatorConfig;
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ActuatorClient {
    http: reqwest::Client,
    base_url: String,
    fiware_service: String,
    fiware_service_path: String,
}

impl ActuatorClient {
    pub fn new(config: &ActuatorConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("Failed to build actuator HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            fiware_service: config.fiware_service.clone(),
            fiware_service_path: config.fiware_service_path.clone(),
        })
    }

    fn attrs_url(&self, entity_id: &str) -> String {
        format!("{}/entities/{}/attrs", self.base_url, entity_id)
    }
}

/// `{"on": {"type": "command", "value": ""}}`
fn command_body(command: &CommandRequest) -> Value {
    let mut body = Map::new();
    body.insert(
        command.command_name().to_string(),
        json!({ "type": "command", "value": "" }),
    );
    Value::Object(body)
}

#[async_trait]
impl Actuator for ActuatorClient {
    async fn send(&self, command: &CommandRequest) -> Result<(), MonitorError> {
        let url = self.attrs_url(&command.target_entity_id);

        tracing::debug!(%url, command = command.command_name(), "sending actuator command");
        let response = self
            .http
            .patch(&url)
            .header("fiware-service", &self.fiware_service)
            .header("fiware-servicepath", &self.fiware_service_path)
            .json(&command_body(command))
            .send()
            .await
            .map_err(|e| MonitorError::Actuator {
                status: None,
                body: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MonitorError::Actuator {
                status: Some(status.as_u16()),
                body,
            });
        }

        Ok(())
    }
}
