use crate::application::poll_loop::{PollSettings, SeriesAggregation};
use crate::domain::metric::Metric;
use crate::domain::threshold::ThresholdRule;
use chrono_tz::Tz;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub actuator: ActuatorConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_rules")]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub entity_type: String,
    pub entity_id: String,
    pub fiware_service: String,
    pub fiware_service_path: String,
    pub request_timeout_ms: u64,
    pub attributes: AttributeNames,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8666".to_string(),
            entity_type: "Lamp".to_string(),
            entity_id: "urn:ngsi-ld:Lamp:001".to_string(),
            fiware_service: "smart".to_string(),
            fiware_service_path: "/".to_string(),
            request_timeout_ms: 5_000,
            attributes: AttributeNames::default(),
        }
    }
}

/// Upstream attribute name for each metric.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AttributeNames {
    pub luminosity: String,
    pub temperature: String,
    pub humidity: String,
}

impl AttributeNames {
    pub fn name(&self, metric: Metric) -> &str {
        match metric {
            Metric::Luminosity => &self.luminosity,
            Metric::Temperature => &self.temperature,
            Metric::Humidity => &self.humidity,
        }
    }
}

impl Default for AttributeNames {
    fn default() -> Self {
        Self {
            luminosity: Metric::Luminosity.to_string(),
            temperature: Metric::Temperature.to_string(),
            humidity: Metric::Humidity.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ActuatorConfig {
    pub base_url: String,
    pub entity_id: String,
    pub fiware_service: String,
    pub fiware_service_path: String,
    pub request_timeout_ms: u64,
    pub retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1026/v2".to_string(),
            entity_id: "urn:ngsi-ld:Lamp:001".to_string(),
            fiware_service: "smart".to_string(),
            fiware_service_path: "/".to_string(),
            request_timeout_ms: 5_000,
            retries: 0,
            retry_backoff_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_seconds: u64,
    pub last_n: usize,
    pub series_cap: Option<usize>,
    pub aggregation: SeriesAggregation,
    pub shutdown_grace_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 10,
            last_n: 10,
            series_cap: None,
            aggregation: SeriesAggregation::Latest,
            shutdown_grace_ms: 2_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    pub timezone: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timezone: "Europe/Lisbon".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8050".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuleConfig {
    pub metric: Metric,
    pub lower: f64,
    pub upper: f64,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_rules() -> Vec<RuleConfig> {
    [
        (Metric::Luminosity, 0.0, 30.0),
        (Metric::Temperature, 15.0, 25.0),
        (Metric::Humidity, 30.0, 50.0),
    ]
    .into_iter()
    .map(|(metric, lower, upper)| RuleConfig {
        metric,
        lower,
        upper,
        message: None,
    })
    .collect()
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Missing(&'static str),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("rule for {metric} has non-finite bounds")]
    NonFiniteBounds { metric: Metric },

    #[error("rule for {metric} has lower bound {lower} above upper bound {upper}")]
    InvertedBounds { metric: Metric, lower: f64, upper: f64 },

    #[error("unknown timezone {0:?}")]
    UnknownTimezone(String),

    #[error("invalid bind address {0:?}")]
    InvalidBind(String),
}

/// Configuration checked and converted into runtime values.
#[derive(Debug, Clone)]
pub struct Settings {
    pub zone: Tz,
    pub rules: Vec<ThresholdRule>,
    pub poll: PollSettings,
    pub series_cap: Option<usize>,
    pub bind: SocketAddr,
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        require("upstream.base_url", &self.upstream.base_url)?;
        require("upstream.entity_type", &self.upstream.entity_type)?;
        require("upstream.entity_id", &self.upstream.entity_id)?;
        require("actuator.base_url", &self.actuator.base_url)?;
        require("actuator.entity_id", &self.actuator.entity_id)?;
        for metric in Metric::ALL {
            require("upstream.attributes", self.upstream.attributes.name(metric))?;
        }

        positive("polling.interval_seconds", self.polling.interval_seconds)?;
        positive("polling.last_n", self.polling.last_n as u64)?;
        positive("upstream.request_timeout_ms", self.upstream.request_timeout_ms)?;
        positive("actuator.request_timeout_ms", self.actuator.request_timeout_ms)?;
        if let Some(cap) = self.polling.series_cap {
            positive("polling.series_cap", cap as u64)?;
        }

        let rules = self
            .rules
            .iter()
            .map(RuleConfig::to_rule)
            .collect::<Result<Vec<_>, _>>()?;

        let zone = self
            .display
            .timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(self.display.timezone.clone()))?;

        let bind = self
            .server
            .bind
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidBind(self.server.bind.clone()))?;

        let poll = PollSettings {
            interval: Duration::from_secs(self.polling.interval_seconds),
            last_n: self.polling.last_n,
            fetch_timeout: Duration::from_millis(self.upstream.request_timeout_ms),
            dispatch_timeout: Duration::from_millis(self.actuator.request_timeout_ms),
            actuator_retries: self.actuator.retries,
            retry_backoff: Duration::from_millis(self.actuator.retry_backoff_ms),
            shutdown_grace: Duration::from_millis(self.polling.shutdown_grace_ms),
            aggregation: self.polling.aggregation,
            target_entity_id: self.actuator.entity_id.clone(),
        };

        Ok(Settings {
            zone,
            rules,
            poll,
            series_cap: self.polling.series_cap,
            bind,
        })
    }
}

impl RuleConfig {
    fn to_rule(&self) -> Result<ThresholdRule, ConfigError> {
        if !self.lower.is_finite() || !self.upper.is_finite() {
            return Err(ConfigError::NonFiniteBounds { metric: self.metric });
        }
        if self.lower > self.upper {
            return Err(ConfigError::InvertedBounds {
                metric: self.metric,
                lower: self.lower,
                upper: self.upper,
            });
        }

        let rule = ThresholdRule::new(self.metric, self.lower, self.upper);
        Ok(match &self.message {
            Some(message) => rule.with_message(message.clone()),
            None => rule,
        })
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(field));
    }
    Ok(())
}

fn positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Zero(field));
    }
    Ok(())
}

/// Load `config/monitor.*` (optional) layered with `MONITOR__SECTION__KEY`
/// environment overrides.
pub fn load_monitor_config() -> anyhow::Result<MonitorConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/monitor").required(false))
        .add_source(
            config::Environment::with_prefix("MONITOR")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
