// Domain layer - Sensor readings, thresholds and actuator commands
pub mod command;
pub mod error;
pub mod metric;
pub mod threshold;
pub mod timestamp;
