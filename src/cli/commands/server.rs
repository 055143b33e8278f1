use clap::Subcommand;
use serde_json::json;

use crate::cli::client::ApiClient;
use crate::cli::config::*;
use crate::cli::utils::*;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum ServerCommands {
    #[command(about = "Register remote server")]
    Add {
        #[arg(help = "Server URL")]
        url: String,
        #[arg(help = "Server name (defaults to the host name)")]
        name: Option<String>,
        #[arg(long, default_value = "", help = "Free-form description")]
        description: String,
    },

    #[command(about = "List all servers with their last known status")]
    List,

    #[command(about = "Show currently selected server")]
    Current,

    #[command(about = "Switch to server (persistent selection)")]
    Use {
        #[arg(help = "Server name to switch to")]
        name: String,
    },

    #[command(about = "Remove server from registry")]
    Delete {
        #[arg(help = "Server name to delete")]
        name: String,
    },

    #[command(about = "Health check specific server (defaults to current server)")]
    Ping {
        #[arg(help = "Server name to ping")]
        name: Option<String>,
    },

    #[command(about = "Health check all registered servers")]
    PingAll,

    #[command(about = "Show server information from API root endpoint")]
    Info {
        #[arg(help = "Server name")]
        name: Option<String>,
    },
}

fn status_text(status: ServerStatus) -> &'static str {
    match status {
        ServerStatus::Up => "UP",
        ServerStatus::Down => "DOWN",
        ServerStatus::Unknown => "UNKNOWN",
    }
}

fn target_server(name: Option<String>) -> anyhow::Result<(String, ServerInfo)> {
    let name = resolve_target_item(name, || Ok(load_environment_config()?.current_server), "server")?;
    let info = load_server_config()?
        .servers
        .get(&name)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Server '{}' not found", name))?;
    Ok((name, info))
}

/// Ping and persist the new status
async fn ping_and_record(name: &str) -> anyhow::Result<ServerInfo> {
    let mut config = load_server_config()?;
    let info = config
        .servers
        .get_mut(name)
        .ok_or_else(|| anyhow::anyhow!("Server '{}' not found", name))?;

    let status = ping_server(info).await;
    info.update_ping(status);
    let updated = info.clone();
    save_server_config(&config)?;
    Ok(updated)
}

pub async fn handle(cmd: ServerCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ServerCommands::Add { url, name, description } => {
            let info = ServerInfo::parse(&url, description)?;
            let name = name.unwrap_or_else(|| info.hostname.clone());

            let mut config = load_server_config()?;
            if config.servers.contains_key(&name) {
                return Err(anyhow::anyhow!("Server '{}' already exists", name));
            }
            let server_url = info.url();
            config.servers.insert(name.clone(), info);
            save_server_config(&config)?;

            let mut env_config = load_environment_config()?;
            if env_config.current_server.is_none() {
                env_config.current_server = Some(name.clone());
                save_environment_config(&env_config)?;
            }

            output_success(
                &output_format,
                &format!("Server '{}' added ({})", name, server_url),
                Some(json!({ "server": name, "url": server_url })),
            )
        }
        ServerCommands::List => {
            let config = load_server_config()?;
            let env_config = load_environment_config()?;

            if config.servers.is_empty() {
                return output_empty_collection(&output_format, "servers", "No servers configured");
            }

            match output_format {
                OutputFormat::Json => {
                    let servers: Vec<_> = config
                        .servers
                        .iter()
                        .map(|(name, info)| {
                            json!({
                                "name": name,
                                "url": info.url(),
                                "description": info.description,
                                "status": info.status,
                                "last_ping": info.last_ping,
                                "current": env_config.current_server.as_ref() == Some(name)
                            })
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&json!({ "servers": servers }))?);
                }
                OutputFormat::Text => {
                    println!("{:<16} {:<36} {:<8} {}", "NAME", "URL", "STATUS", "DESCRIPTION");
                    println!("{}", "-".repeat(80));
                    for (name, info) in &config.servers {
                        let marker = if env_config.current_server.as_ref() == Some(name) { "*" } else { " " };
                        println!(
                            "{}{:<15} {:<36} {:<8} {}",
                            marker,
                            name,
                            info.url(),
                            status_text(info.status),
                            info.description
                        );
                    }
                }
            }
            Ok(())
        }
        ServerCommands::Current => {
            let (name, info) = current_server()?;
            output_value(
                &output_format,
                &json!({ "server": name, "url": info.url(), "status": status_text(info.status) }),
            )
        }
        ServerCommands::Use { name } => {
            if !load_server_config()?.servers.contains_key(&name) {
                return Err(anyhow::anyhow!("{} '{}' not found", capitalize("server"), name));
            }

            let mut env_config = load_environment_config()?;
            if env_config.current_server.as_deref() != Some(name.as_str()) {
                // Tokens are server specific
                env_config.token = None;
                env_config.current_user = None;
            }
            env_config.current_server = Some(name.clone());
            save_environment_config(&env_config)?;

            output_success(
                &output_format,
                &format!("Switched to server '{}'", name),
                Some(json!({ "current_server": name })),
            )
        }
        ServerCommands::Delete { name } => {
            let mut config = load_server_config()?;
            if config.servers.remove(&name).is_none() {
                return Err(anyhow::anyhow!("Server '{}' not found", name));
            }
            save_server_config(&config)?;

            let mut env_config = load_environment_config()?;
            if env_config.current_server.as_deref() == Some(name.as_str()) {
                env_config.current_server = None;
                env_config.token = None;
                save_environment_config(&env_config)?;
            }

            output_success(&output_format, &format!("Server '{}' deleted", name), None)
        }
        ServerCommands::Ping { name } => {
            let (name, _) = target_server(name)?;
            let info = ping_and_record(&name).await?;
            output_value(
                &output_format,
                &json!({ "server": name, "url": info.url(), "status": status_text(info.status) }),
            )
        }
        ServerCommands::PingAll => {
            let names: Vec<String> = load_server_config()?.servers.keys().cloned().collect();
            if names.is_empty() {
                return output_empty_collection(&output_format, "servers", "No servers configured");
            }

            let mut results = Vec::new();
            for name in names {
                let info = ping_and_record(&name).await?;
                if let OutputFormat::Text = output_format {
                    println!("{:<16} {:<36} {}", name, info.url(), status_text(info.status));
                }
                results.push(json!({ "name": name, "url": info.url(), "status": info.status }));
            }

            if let OutputFormat::Json = output_format {
                println!("{}", serde_json::to_string_pretty(&json!({ "servers": results }))?);
            }
            Ok(())
        }
        ServerCommands::Info { name } => {
            let (_, info) = target_server(name)?;
            let client = ApiClient::new(info.url(), None, None);
            let data = client.get("/").await?;
            output_value(&output_format, &data)
        }
    }
}
