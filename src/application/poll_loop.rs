// Poll loop - fetch, normalize, store, evaluate and dispatch on every tick
use crate::application::ports::{Actuator, TimeseriesSource};
use crate::application::series_store::SeriesStore;
use crate::domain::command::CommandRequest;
use crate::domain::error::MonitorError;
use crate::domain::metric::{Metric, RawSample, Sample};
use crate::domain::threshold::{AlertDecision, CommandedState, ThresholdRule, evaluate};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// How the fetched window of a metric becomes the one sample stored per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesAggregation {
    /// The freshest sample of the window.
    #[default]
    Latest,
    /// Mean of the whole window, stamped with the freshest sample's instants.
    WindowMean,
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub last_n: usize,
    pub fetch_timeout: Duration,
    pub dispatch_timeout: Duration,
    pub actuator_retries: u32,
    pub retry_backoff: Duration,
    pub shutdown_grace: Duration,
    pub aggregation: SeriesAggregation,
    pub target_entity_id: String,
}

/// Outcome of a single cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub present: Vec<Metric>,
    pub failures: Vec<(Metric, MonitorError)>,
    pub decision: AlertDecision,
    pub append: Result<(), MonitorError>,
    /// Cycles held by the store once this cycle is done.
    pub series_len: usize,
    /// `None` when no metric produced data, so nothing was commanded.
    pub dispatch: Option<Result<(), MonitorError>>,
}

impl CycleReport {
    fn log(&self) {
        for (metric, err) in &self.failures {
            tracing::warn!(%metric, error = %err, "metric absent this cycle");
        }
        if let Err(err) = &self.append {
            tracing::warn!(error = %err, "series append skipped");
        }
        for violation in &self.decision.violations {
            tracing::info!(metric = %violation.rule.metric, value = violation.observed, "{}", violation.message);
        }
        match &self.dispatch {
            Some(Ok(())) => tracing::info!(
                present = self.present.len(),
                state = self.decision.commanded_state.command_name(),
                alerts = ?self.decision.messages(),
                series_len = self.series_len,
                "cycle complete"
            ),
            Some(Err(err)) => tracing::warn!(error = %err, "actuator dispatch failed"),
            None => tracing::warn!("no metric returned data, actuator not commanded"),
        }
    }
}

pub struct PollLoop {
    source: Arc<dyn TimeseriesSource>,
    actuator: Arc<dyn Actuator>,
    store: SeriesStore,
    rules: Vec<ThresholdRule>,
    settings: PollSettings,
}

impl PollLoop {
    pub fn new(
        source: Arc<dyn TimeseriesSource>,
        actuator: Arc<dyn Actuator>,
        store: SeriesStore,
        rules: Vec<ThresholdRule>,
        settings: PollSettings,
    ) -> Self {
        Self {
            source,
            actuator,
            store,
            rules,
            settings,
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    /// Run cycles on every tick until `shutdown` turns true or its sender is
    /// dropped. A cycle still in flight at shutdown gets `shutdown_grace` to
    /// finish before it is abandoned.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let grace = self.settings.shutdown_grace;

        tracing::info!(
            interval = ?self.settings.interval,
            last_n = self.settings.last_n,
            rules = self.rules.len(),
            "poll loop started"
        );

        loop {
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        report = self.run_cycle() => report.log(),
                        _ = abandon_after(&mut shutdown, grace) => {
                            tracing::warn!(?grace, "abandoning in-flight cycle");
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("poll loop stopped");
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        let this = &*self;
        let fetches = Metric::ALL.map(|metric| async move { (metric, this.fetch_window(metric).await) });
        let results = futures::future::join_all(fetches).await;
        let received_at = Utc::now();

        let mut failures = Vec::new();
        let mut windows: BTreeMap<Metric, Vec<Sample>> = BTreeMap::new();
        for (metric, outcome) in results {
            match outcome.and_then(|raw| normalize_window(metric, &raw, received_at)) {
                Ok(samples) if samples.is_empty() => {
                    tracing::debug!(%metric, "no data yet");
                }
                Ok(samples) => {
                    windows.insert(metric, samples);
                }
                Err(err) => failures.push((metric, err)),
            }
        }

        let mut latest = BTreeMap::new();
        let mut cycle_samples = BTreeMap::new();
        for (metric, samples) in &windows {
            let Some(fresh) = freshest(samples) else {
                continue;
            };
            latest.insert(*metric, fresh.value);
            cycle_samples.insert(*metric, self.cycle_sample(samples, fresh));
        }

        let decision = evaluate(&latest, &self.rules);
        let append = self.store.append_cycle(&cycle_samples);
        let dispatch = if latest.is_empty() {
            None
        } else {
            Some(self.dispatch(decision.commanded_state).await)
        };

        CycleReport {
            present: latest.keys().copied().collect(),
            failures,
            decision,
            append,
            series_len: self.store.snapshot().len(),
            dispatch,
        }
    }

    async fn fetch_window(&self, metric: Metric) -> Result<Vec<RawSample>, MonitorError> {
        let timeout = self.settings.fetch_timeout;
        tracing::debug!(%metric, last_n = self.settings.last_n, "fetching");

        match tokio::time::timeout(timeout, self.source.fetch(metric, self.settings.last_n)).await {
            Ok(result) => result,
            Err(_) => Err(MonitorError::Upstream {
                url: self.source.endpoint(metric),
                status: None,
                reason: format!("timed out after {:?}", timeout),
            }),
        }
    }

    fn cycle_sample(&self, samples: &[Sample], latest: &Sample) -> Sample {
        match self.settings.aggregation {
            SeriesAggregation::Latest => latest.clone(),
            SeriesAggregation::WindowMean => {
                let mean = samples.iter().map(|s| s.value).sum::<f64>() / samples.len() as f64;
                Sample {
                    value: mean,
                    ..latest.clone()
                }
            }
        }
    }

    async fn dispatch(&self, state: CommandedState) -> Result<(), MonitorError> {
        let command = CommandRequest::new(self.settings.target_entity_id.clone(), state);
        let mut attempt = 0;

        loop {
            let outcome = match tokio::time::timeout(self.settings.dispatch_timeout, self.actuator.send(&command)).await {
                Ok(result) => result,
                Err(_) => Err(MonitorError::Actuator {
                    status: None,
                    body: format!("timed out after {:?}", self.settings.dispatch_timeout),
                }),
            };

            match outcome {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.settings.actuator_retries => {
                    attempt += 1;
                    tracing::warn!(error = %err, attempt, "retrying actuator command");
                    tokio::time::sleep(self.settings.retry_backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn normalize_window(metric: Metric, raw: &[RawSample], received_at: DateTime<Utc>) -> Result<Vec<Sample>, MonitorError> {
    raw.iter()
        .map(|r| Sample::from_raw(metric, r, received_at))
        .collect()
}

fn freshest(samples: &[Sample]) -> Option<&Sample> {
    samples.iter().max_by_key(|s| s.observed_at)
}

/// Resolves once shutdown is requested or nobody can request it any more.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn abandon_after(shutdown: &mut watch::Receiver<bool>, grace: Duration) {
    wait_for_shutdown(shutdown).await;
    tokio::time::sleep(grace).await;
}
