// Application layer - Poll cycle orchestration and series state
pub mod poll_loop;
pub mod ports;
pub mod series_store;
