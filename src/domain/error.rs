// Error taxonomy shared by the poll cycle
use crate::domain::metric::Metric;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Bad status, transport failure or timeout from the historical-data endpoint.
    #[error("upstream request to {url} failed: {reason}")]
    Upstream {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("malformed upstream response at {path}: {reason}")]
    MalformedResponse { path: String, reason: String },

    #[error("unrecognised timestamp {raw:?}")]
    TimestampFormat { raw: String },

    /// Bad status, transport failure or timeout from the control endpoint.
    #[error("actuator command failed (status {}): {body}", format_status(.status))]
    Actuator { status: Option<u16>, body: String },

    #[error("incomplete cycle, missing {}", format_metrics(.missing))]
    IncompleteCycle { missing: Vec<Metric> },
}

fn format_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

fn format_metrics(metrics: &[Metric]) -> String {
    metrics
        .iter()
        .map(Metric::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
