pub mod server;

pub use server::{ConfigError, ServerConfig, ToolConfig};
