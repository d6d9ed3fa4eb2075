pub mod config;
pub mod command;

mod server;
pub use server::*;

mod tracing_config;
pub use tracing_config::build_subscriber;
