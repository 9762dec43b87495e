pub mod api_connection;
pub mod cli;
pub mod config;
pub mod error;
pub mod estimation;
pub mod food_log;
pub mod logging;
pub mod targets;
