// Historical-data (STH) client
use crate::application::ports::TimeseriesSource;
use crate::domain::error::MonitorError;
use crate::domain::metric::{Metric, RawSample};
use crate::infrastructure::config::{AttributeNames, UpstreamConfig};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TimeseriesClient {
    http: reqwest::Client,
    base_url: String,
    entity_type: String,
    entity_id: String,
    fiware_service: String,
    fiware_service_path: String,
    attributes: AttributeNames,
}

impl TimeseriesClient {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("Failed to build upstream HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            entity_type: config.entity_type.clone(),
            entity_id: config.entity_id.clone(),
            fiware_service: config.fiware_service.clone(),
            fiware_service_path: config.fiware_service_path.clone(),
            attributes: config.attributes.clone(),
        })
    }

    fn attribute_url(&self, metric: Metric) -> String {
        format!(
            "{}/STH/v1/contextEntities/type/{}/id/{}/attributes/{}",
            self.base_url,
            self.entity_type,
            self.entity_id,
            self.attributes.name(metric)
        )
    }
}

#[async_trait]
impl TimeseriesSource for TimeseriesClient {
    async fn fetch(&self, metric: Metric, last_n: usize) -> Result<Vec<RawSample>, MonitorError> {
        let url = self.attribute_url(metric);
        let upstream_error = |status: Option<u16>, reason: String| MonitorError::Upstream {
            url: url.clone(),
            status,
            reason,
        };

        tracing::debug!(%metric, %url, last_n, "requesting samples");
        let response = self
            .http
            .get(&url)
            .query(&[("lastN", last_n)])
            .header("fiware-service", &self.fiware_service)
            .header("fiware-servicepath", &self.fiware_service_path)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| upstream_error(None, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(upstream_error(
                Some(status.as_u16()),
                format!("status {}: {}", status, body),
            ));
        }

        let body = response.bytes().await.map_err(|e| upstream_error(None, e.to_string()))?;
        let envelope: Value = serde_json::from_slice(&body).map_err(|e| MonitorError::MalformedResponse {
            path: "$".to_string(),
            reason: e.to_string(),
        })?;

        let samples = parse_envelope(&envelope)?;
        tracing::debug!(%metric, count = samples.len(), "received samples");
        Ok(samples)
    }

    fn endpoint(&self, metric: Metric) -> String {
        self.attribute_url(metric)
    }
}

/// Extract the `values` array of the first attribute of the first context
/// response. Any missing step is reported with its path, never skipped.
pub fn parse_envelope(envelope: &Value) -> Result<Vec<RawSample>, MonitorError> {
    let values = JsonPath::root(envelope)
        .key("contextResponses")?
        .index(0)?
        .key("contextElement")?
        .key("attributes")?
        .index(0)?
        .key("values")?;

    let count = values.array_len()?;
    (0..count)
        .map(|i| -> Result<RawSample, MonitorError> {
            let entry = values.index(i)?;
            Ok(RawSample::new(
                i,
                entry.key("attrValue")?.text()?,
                entry.key("recvTime")?.text()?,
            ))
        })
        .collect()
}

struct JsonPath<'a> {
    value: &'a Value,
    path: String,
}

impl<'a> JsonPath<'a> {
    fn root(value: &'a Value) -> Self {
        Self {
            value,
            path: String::new(),
        }
    }

    fn key(&self, key: &str) -> Result<JsonPath<'a>, MonitorError> {
        let path = if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        };
        match self.value.as_object().and_then(|o| o.get(key)) {
            Some(value) => Ok(JsonPath { value, path }),
            None => Err(malformed(path, "missing key")),
        }
    }

    fn index(&self, index: usize) -> Result<JsonPath<'a>, MonitorError> {
        let path = format!("{}[{}]", self.path, index);
        match self.value.as_array().and_then(|a| a.get(index)) {
            Some(value) => Ok(JsonPath { value, path }),
            None => Err(malformed(path, "missing element")),
        }
    }

    fn array_len(&self) -> Result<usize, MonitorError> {
        self.value
            .as_array()
            .map(Vec::len)
            .ok_or_else(|| malformed(self.path.clone(), "expected an array"))
    }

    fn text(&self) -> Result<String, MonitorError> {
        match self.value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            _ => Err(malformed(self.path.clone(), "expected a string or number")),
        }
    }
}

fn malformed(path: String, reason: &str) -> MonitorError {
    MonitorError::MalformedResponse {
        path,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::fake_server;
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    fn envelope(values: Value) -> Value {
        json!({
            "contextResponses": [{
                "contextElement": {
                    "attributes": [{ "name": "temperature", "values": values }],
                    "id": "urn:ngsi-ld:Lamp:001",
                    "isPattern": false
                },
                "statusCode": { "code": "200", "reasonPhrase": "OK" }
            }]
        })
    }

    fn expect_path(result: Result<Vec<RawSample>, MonitorError>, expected: &str) {
        match result {
            Err(MonitorError::MalformedResponse { path, .. }) => assert_eq!(path, expected),
            other => panic!("expected malformed response at {}, got {:?}", expected, other),
        }
    }

    #[test]
    fn test_parse_envelope_values() {
        let body = envelope(json!([
            { "_id": "a", "attrType": "Float", "attrValue": "21.5", "recvTime": "2024-03-01T10:15:30.123Z" },
            { "_id": "b", "attrType": "Float", "attrValue": 22, "recvTime": "2024-03-01T10:15:40.123Z" }
        ]));

        let samples = parse_envelope(&body).unwrap();

        assert_eq!(
            samples,
            vec![
                RawSample::new(0, "21.5", "2024-03-01T10:15:30.123Z"),
                RawSample::new(1, "22", "2024-03-01T10:15:40.123Z"),
            ]
        );
    }

    #[test]
    fn test_empty_values_is_not_an_error() {
        assert!(parse_envelope(&envelope(json!([]))).unwrap().is_empty());
    }

    #[test]
    fn test_missing_keys_name_their_path() {
        expect_path(parse_envelope(&json!({})), "contextResponses");
        expect_path(parse_envelope(&json!({ "contextResponses": [] })), "contextResponses[0]");
        expect_path(
            parse_envelope(&json!({ "contextResponses": [{ "contextElement": {} }] })),
            "contextResponses[0].contextElement.attributes",
        );
        expect_path(
            parse_envelope(&json!({ "contextResponses": [{ "contextElement": { "attributes": [{}] } }] })),
            "contextResponses[0].contextElement.attributes[0].values",
        );
        expect_path(
            parse_envelope(&envelope(json!([{ "attrValue": "1" }]))),
            "contextResponses[0].contextElement.attributes[0].values[0].recvTime",
        );
    }

    #[test]
    fn test_wrong_types_are_malformed() {
        expect_path(
            parse_envelope(&envelope(json!({ "attrValue": "1" }))),
            "contextResponses[0].contextElement.attributes[0].values",
        );
        expect_path(
            parse_envelope(&envelope(json!([{ "attrValue": null, "recvTime": "2024-03-01T10:15:30Z" }]))),
            "contextResponses[0].contextElement.attributes[0].values[0].attrValue",
        );
    }

    fn client(base_url: String) -> TimeseriesClient {
        let mut config = UpstreamConfig::default();
        config.base_url = format!("{}/", base_url);
        config.entity_id = "lamp1".to_string();
        config.attributes.humidity = "umity".to_string();
        TimeseriesClient::new(&config).unwrap()
    }

    async fn sth_handler(
        Path((entity_type, entity_id, attribute)): Path<(String, String, String)>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> impl IntoResponse {
        let service = headers.get("fiware-service").and_then(|v| v.to_str().ok());
        let service_path = headers.get("fiware-servicepath").and_then(|v| v.to_str().ok());
        if service != Some("smart") || service_path != Some("/") {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": "missing fiware headers" })));
        }
        if entity_type != "Lamp" || entity_id != "lamp1" || attribute != "umity" {
            return (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown attribute" })));
        }
        let last_n: usize = query.get("lastN").and_then(|n| n.parse().ok()).unwrap_or(0);
        let values: Vec<Value> = (0..last_n)
            .map(|i| json!({ "attrValue": format!("{}", 40 + i), "recvTime": format!("2024-03-01T10:15:{:02}Z", i) }))
            .collect();
        (StatusCode::OK, Json(envelope(Value::Array(values))))
    }

    fn sth_router() -> Router {
        Router::new().route(
            "/STH/v1/contextEntities/type/:entity_type/id/:entity_id/attributes/:attribute",
            get(sth_handler),
        )
    }

    #[tokio::test]
    async fn test_fetch_against_endpoint() {
        let client = client(fake_server::spawn(sth_router()).await);

        let samples = client.fetch(Metric::Humidity, 3).await.unwrap();

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[2], RawSample::new(2, "42", "2024-03-01T10:15:02Z"));
    }

    #[tokio::test]
    async fn test_bad_status_is_upstream_error() {
        let base_url = fake_server::spawn(sth_router()).await;
        let client = client(base_url.clone());

        match client.fetch(Metric::Temperature, 3).await {
            Err(MonitorError::Upstream { url, status, .. }) => {
                assert_eq!(status, Some(404));
                assert_eq!(
                    url,
                    format!("{}/STH/v1/contextEntities/type/Lamp/id/lamp1/attributes/temperature", base_url)
                );
            }
            other => panic!("expected upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let router = Router::new().route(
            "/STH/v1/contextEntities/type/:entity_type/id/:entity_id/attributes/:attribute",
            get(|| async { "<html>maintenance</html>" }),
        );
        let client = client(fake_server::spawn(router).await);

        expect_path(client.fetch(Metric::Luminosity, 1).await, "$");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_upstream_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = client(format!("http://{}", addr));

        assert!(matches!(
            client.fetch(Metric::Luminosity, 1).await,
            Err(MonitorError::Upstream { status: None, .. })
        ));
    }
}
