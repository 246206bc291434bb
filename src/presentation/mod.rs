// Presentation layer - Read-only HTTP surface for the chart renderer
pub mod app_state;
pub mod handlers;
