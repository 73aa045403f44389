pub mod config;
pub mod handlers;
pub mod observability;
pub mod server;
pub mod state;

pub use config::{AppConfig, BootstrapConfig, LoggingConfig, ServerConfig};
pub use observability::{apply_logging, init_tracing};
pub use server::{ServerBuilder, WardenServer, build_app};
pub use state::AppState;
