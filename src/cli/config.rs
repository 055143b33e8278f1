//! CLI state kept as JSON files under `~/.config/docflow/cli`
//! (or `DOCFLOW_CLI_CONFIG_DIR`): `server.json` with registered servers and
//! `env.json` with the current selection and token.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub hostname: String,
    pub port: u16,
    pub protocol: String,
    pub description: String,
    pub added_at: DateTime<Utc>,
    pub last_ping: Option<DateTime<Utc>>,
    pub status: ServerStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Up,
    Down,
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub servers: BTreeMap<String, ServerInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub current_server: Option<String>,
    pub current_tenant: Option<String>,
    pub current_user: Option<String>,
    pub token: Option<String>,
}

impl ServerInfo {
    pub fn new(hostname: String, port: u16, protocol: String, description: String) -> Self {
        Self {
            hostname,
            port,
            protocol,
            description,
            added_at: Utc::now(),
            last_ping: None,
            status: ServerStatus::Unknown,
        }
    }

    /// Parse `http://host:port`, `https://host` or a bare `host[:port]`
    pub fn parse(url: &str, description: String) -> anyhow::Result<Self> {
        let with_scheme = if url.contains("://") {
            url.to_string()
        } else {
            format!("http://{}", url)
        };

        let parsed = url::Url::parse(&with_scheme).map_err(|e| anyhow::anyhow!("Invalid server URL '{}': {}", url, e))?;
        let hostname = parsed
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("Server URL '{}' has no host", url))?
            .to_string();
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| anyhow::anyhow!("Server URL '{}' has no port", url))?;

        Ok(Self::new(hostname, port, parsed.scheme().to_string(), description))
    }

    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.hostname, self.port)
    }

    pub fn update_ping(&mut self, status: ServerStatus) {
        self.last_ping = Some(Utc::now());
        self.status = status;
    }
}

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    let config_dir = if let Ok(custom_dir) = std::env::var("DOCFLOW_CLI_CONFIG_DIR") {
        PathBuf::from(custom_dir)
    } else {
        let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME environment variable not set"))?;
        PathBuf::from(home).join(".config").join("docflow").join("cli")
    };

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

fn load<T: DeserializeOwned + Default>(file_name: &str) -> anyhow::Result<T> {
    let file = get_config_dir()?.join(file_name);
    if !file.exists() {
        return Ok(T::default());
    }

    let content = fs::read_to_string(&file)?;
    serde_json::from_str(&content).map_err(|e| anyhow::anyhow!("Corrupt {}: {}", file.display(), e))
}

fn save<T: Serialize>(file_name: &str, value: &T) -> anyhow::Result<()> {
    let file = get_config_dir()?.join(file_name);
    fs::write(file, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

pub fn load_server_config() -> anyhow::Result<ServerConfig> {
    load("server.json")
}

pub fn save_server_config(config: &ServerConfig) -> anyhow::Result<()> {
    save("server.json", config)
}

pub fn load_environment_config() -> anyhow::Result<EnvironmentConfig> {
    load("env.json")
}

pub fn save_environment_config(config: &EnvironmentConfig) -> anyhow::Result<()> {
    save("env.json", config)
}

/// The selected server, or an error telling the user how to pick one
pub fn current_server() -> anyhow::Result<(String, ServerInfo)> {
    let env_config = load_environment_config()?;
    let name = env_config
        .current_server
        .ok_or_else(|| anyhow::anyhow!("No current server set. Use 'docflow server use <name>' first"))?;

    let servers = load_server_config()?;
    let info = servers
        .servers
        .get(&name)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Current server '{}' not found in configuration", name))?;

    Ok((name, info))
}

pub async fn ping_server(server_info: &ServerInfo) -> ServerStatus {
    let client = reqwest::Client::new();
    let url = format!("{}/health", server_info.url());

    match client.get(&url).timeout(std::time::Duration::from_secs(5)).send().await {
        Ok(response) if response.status().is_success() => ServerStatus::Up,
        _ => ServerStatus::Down,
    }
}
