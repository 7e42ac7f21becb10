use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Cannot determine working directory: {0}")]
    WorkingDir(#[from] std::io::Error),
}

/// Settings consumed by the tool catalog
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Relative tool paths resolve against this directory
    pub workspace_root: PathBuf,
    pub docs_dir: PathBuf,
    pub akashic_cli: String,
    pub node_bin: String,
    pub formatter: String,
    pub audio_converter: String,
    pub zip_bin: String,
    /// Hosts `import_assets` may download from
    pub asset_import_hosts: Vec<String>,
    pub max_read_bytes: u64,
}

impl ToolConfig {
    /// Defaults rooted at `workspace_root`
    pub fn with_workspace(workspace_root: PathBuf) -> Self {
        Self {
            docs_dir: workspace_root.join("docs"),
            workspace_root,
            akashic_cli: "akashic".to_string(),
            node_bin: "node".to_string(),
            formatter: "prettier".to_string(),
            audio_converter: "complete-audio".to_string(),
            zip_bin: "zip".to_string(),
            asset_import_hosts: vec!["raw.githubusercontent.com".to_string()],
            max_read_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Prefix of the streaming and message endpoints, `""` or `/segment...`
    pub base_path: String,
    pub sse_keep_alive: Duration,
    pub bridge_handshake_timeout: Duration,
    pub tools: ToolConfig,
}

impl ServerConfig {
    pub fn new(tools: ToolConfig) -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8080,
            base_path: String::new(),
            sse_keep_alive: Duration::from_secs(30),
            bridge_handshake_timeout: Duration::from_secs(10),
            tools,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let workspace_root = match env::var("AKASHIC_WORKSPACE") {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => env::current_dir()?,
        };

        let mut tools = ToolConfig::with_workspace(workspace_root);
        if let Some(docs) = env_string("AKASHIC_DOCS_DIR") {
            let docs = PathBuf::from(docs);
            tools.docs_dir = if docs.is_absolute() {
                docs
            } else {
                tools.workspace_root.join(docs)
            };
        }
        if let Some(cli) = env_string("AKASHIC_CLI") {
            tools.akashic_cli = cli;
        }
        if let Some(node) = env_string("NODE_BIN") {
            tools.node_bin = node;
        }
        if let Some(formatter) = env_string("FORMATTER_CMD") {
            tools.formatter = formatter;
        }
        if let Some(converter) = env_string("AUDIO_CONVERTER_CMD") {
            tools.audio_converter = converter;
        }
        if let Some(zip) = env_string("ZIP_CMD") {
            tools.zip_bin = zip;
        }
        if let Some(hosts) = env_string("ASSET_IMPORT_HOSTS") {
            tools.asset_import_hosts = parse_host_list(&hosts);
        }
        if let Some(max) = env_parse::<u64>("MAX_READ_BYTES")? {
            tools.max_read_bytes = max;
        }

        let mut config = ServerConfig::new(tools);

        if let Some(host) = env_string("HOST") {
            config.host = host.parse().map_err(|_| ConfigError::InvalidValue {
                key: "HOST",
                value: host,
            })?;
        }
        if let Some(port) = env_parse::<u16>("PORT")? {
            config.port = port;
        }
        if let Some(base) = env_string("MCP_BASE_PATH") {
            config.base_path = normalize_base_path(&base);
        }
        if let Some(secs) = env_parse::<u64>("SSE_KEEP_ALIVE_SECS")? {
            config.sse_keep_alive = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = env_parse::<u64>("BRIDGE_HANDSHAKE_TIMEOUT_SECS")? {
            config.bridge_handshake_timeout = Duration::from_secs(secs.max(1));
        }

        Ok(config)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    pub fn sse_path(&self) -> String {
        format!("{}/sse", self.base_path)
    }

    pub fn messages_path(&self) -> String {
        format!("{}/messages", self.base_path)
    }
}

/// Leading slash, no trailing slash, `""` for the root
pub fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

fn parse_host_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|host| host.trim().to_ascii_lowercase())
        .filter(|host| !host.is_empty())
        .collect()
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env_string(key) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(None),
    }
}
