// Cycle-aligned in-memory series shared with the chart renderer
use crate::domain::error::MonitorError;
use crate::domain::metric::{Metric, Sample};
use crate::domain::timestamp;
use chrono::DateTime;
use chrono_tz::Tz;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;

/// Immutable view of the series at the end of some cycle.
///
/// Every metric sequence has the same length as `timestamps`.
#[derive(Debug, Clone)]
pub struct SeriesSnapshot {
    zone: Tz,
    timestamps: VecDeque<DateTime<Tz>>,
    series: BTreeMap<Metric, VecDeque<Sample>>,
}

impl SeriesSnapshot {
    fn empty(zone: Tz) -> Self {
        Self {
            zone,
            timestamps: VecDeque::new(),
            series: Metric::ALL.into_iter().map(|m| (m, VecDeque::new())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    pub fn timestamps(&self) -> impl Iterator<Item = &DateTime<Tz>> {
        self.timestamps.iter()
    }

    pub fn samples(&self, metric: Metric) -> impl Iterator<Item = &Sample> {
        self.series.get(&metric).into_iter().flatten()
    }

    pub fn values(&self, metric: Metric) -> Vec<f64> {
        self.samples(metric).map(|s| s.value).collect()
    }
}

/// Read handle for tasks other than the poll loop.
#[derive(Debug, Clone)]
pub struct SeriesReader {
    receiver: watch::Receiver<Arc<SeriesSnapshot>>,
}

impl SeriesReader {
    pub fn snapshot(&self) -> Arc<SeriesSnapshot> {
        self.receiver.borrow().clone()
    }
}

/// Single-writer series store. Writes go through `&mut self`, so only the
/// owner (the poll loop) can append.
///
/// The published snapshot is the only copy of the series. An append updates
/// it in place unless a reader still holds it, in which case that reader
/// keeps its version and the append works on a fresh copy.
#[derive(Debug)]
pub struct SeriesStore {
    cap: Option<usize>,
    publisher: watch::Sender<Arc<SeriesSnapshot>>,
}

impl SeriesStore {
    pub fn new(cap: Option<usize>, zone: Tz) -> Self {
        let (publisher, _) = watch::channel(Arc::new(SeriesSnapshot::empty(zone)));
        Self { cap, publisher }
    }

    pub fn reader(&self) -> SeriesReader {
        SeriesReader {
            receiver: self.publisher.subscribe(),
        }
    }

    pub fn snapshot(&self) -> Arc<SeriesSnapshot> {
        self.publisher.borrow().clone()
    }

    /// Append one sample per metric, or nothing at all.
    ///
    /// The cycle's display timestamp is the freshest `observed_at` among the
    /// samples, projected into the store's zone.
    pub fn append_cycle(&mut self, samples: &BTreeMap<Metric, Sample>) -> Result<(), MonitorError> {
        let missing: Vec<Metric> = Metric::ALL
            .into_iter()
            .filter(|m| !samples.contains_key(m))
            .collect();
        if !missing.is_empty() {
            return Err(MonitorError::IncompleteCycle { missing });
        }

        let Some(observed_at) = samples.values().map(|s| s.observed_at).max() else {
            return Err(MonitorError::IncompleteCycle {
                missing: Metric::ALL.to_vec(),
            });
        };

        let cap = self.cap;
        self.publisher.send_modify(|published| {
            let state = Arc::make_mut(published);
            state.timestamps.push_back(timestamp::project(observed_at, state.zone));
            for (metric, sample) in samples {
                state.series.entry(*metric).or_default().push_back(sample.clone());
            }

            if let Some(cap) = cap {
                while state.timestamps.len() > cap {
                    state.timestamps.pop_front();
                    for series in state.series.values_mut() {
                        series.pop_front();
                    }
                }
            }
        });
        Ok(())
    }
}
