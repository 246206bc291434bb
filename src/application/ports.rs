// Ports the poll loop drives: the historical-data source and the actuator
use crate::domain::command::CommandRequest;
use crate::domain::error::MonitorError;
use crate::domain::metric::{Metric, RawSample};
use async_trait::async_trait;

#[async_trait]
pub trait TimeseriesSource: Send + Sync {
    /// Fetch the `last_n` most recent raw samples of one metric.
    ///
    /// An empty vector means the upstream has no data yet; it is not an error.
    async fn fetch(&self, metric: Metric, last_n: usize) -> Result<Vec<RawSample>, MonitorError>;

    /// Where `metric` is fetched from, for diagnostics.
    fn endpoint(&self, metric: Metric) -> String;
}

#[async_trait]
pub trait Actuator: Send + Sync {
    async fn send(&self, command: &CommandRequest) -> Result<(), MonitorError>;
}
