// Application state for HTTP handlers
use crate::application::series_store::SeriesReader;

#[derive(Clone)]
pub struct AppState {
    pub series: SeriesReader,
}
