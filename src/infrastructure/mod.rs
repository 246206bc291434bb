// Infrastructure layer - External dependencies and adapters
pub mod actuator_client;
pub mod config;
pub mod sth_client;

#[cfg(test)]
pub mod fake_server;
