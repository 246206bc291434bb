// HTTP request handlers
use crate::application::series_store::SeriesSnapshot;
use crate::domain::metric::Metric;
use crate::presentation::app_state::AppState;
use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

/// Cycle-aligned series as the chart consumes it: every array has the same
/// length and index `i` of each belongs to the same cycle.
#[derive(Debug, Serialize, PartialEq)]
pub struct SeriesView {
    pub timezone: String,
    pub timestamps: Vec<String>,
    pub luminosity: Vec<f64>,
    pub temperature: Vec<f64>,
    pub humidity: Vec<f64>,
}

impl From<&SeriesSnapshot> for SeriesView {
    fn from(snapshot: &SeriesSnapshot) -> Self {
        Self {
            timezone: snapshot.zone().name().to_string(),
            timestamps: snapshot.timestamps().map(|t| t.to_rfc3339()).collect(),
            luminosity: snapshot.values(Metric::Luminosity),
            temperature: snapshot.values(Metric::Temperature),
            humidity: snapshot.values(Metric::Humidity),
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Latest published series snapshot
pub async fn get_series(State(state): State<Arc<AppState>>) -> Json<SeriesView> {
    let snapshot = state.series.snapshot();
    Json(SeriesView::from(snapshot.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::series_store::SeriesStore;
    use crate::domain::metric::Sample;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_get_series_reflects_store() {
        let mut store = SeriesStore::new(None, chrono_tz::Europe::Lisbon);
        let state = Arc::new(AppState { series: store.reader() });

        let Json(empty) = get_series(State(state.clone())).await;
        assert!(empty.timestamps.is_empty());

        let at = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        let samples: BTreeMap<Metric, Sample> = [(Metric::Luminosity, 10.0), (Metric::Temperature, 30.0), (Metric::Humidity, 40.0)]
            .into_iter()
            .map(|(m, v)| (m, Sample::new(m, v, at, at)))
            .collect();
        store.append_cycle(&samples).unwrap();

        let Json(view) = get_series(State(state)).await;
        assert_eq!(
            view,
            SeriesView {
                timezone: "Europe/Lisbon".to_string(),
                timestamps: vec!["2024-07-01T13:00:00+01:00".to_string()],
                luminosity: vec![10.0],
                temperature: vec![30.0],
                humidity: vec![40.0],
            }
        );
    }

    #[tokio::test]
    async fn test_health_check() {
        assert_eq!(health_check().await, "ok");
    }
}
