pub mod proxy_handlers;

pub use proxy_handlers::{call_tool_handler, list_tools_handler, proxy_routes};
