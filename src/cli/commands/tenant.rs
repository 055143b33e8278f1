//! Tenant administration through `/api/root/tenant`. Needs a root token.

use clap::Subcommand;
use serde_json::{json, Map, Value};

use crate::cli::client::ApiClient;
use crate::cli::utils::*;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum TenantCommands {
    #[command(about = "List tenants")]
    List {
        #[arg(long, help = "Include soft-deleted tenants")]
        all: bool,
        #[arg(long, help = "Check each tenant database")]
        health: bool,
    },

    #[command(about = "Show tenant information")]
    Show {
        #[arg(help = "Tenant identifier or id")]
        tenant: String,
    },

    #[command(about = "Register a tenant (provisions its database unless one is given)")]
    Create {
        #[arg(help = "Tenant identifier")]
        identifier: String,
        #[arg(help = "Display name")]
        name: String,
        #[arg(long, help = "Existing database on the shared server")]
        database: Option<String>,
        #[arg(long, help = "Explicit connection string")]
        connection_string: Option<String>,
    },

    #[command(about = "Update tenant settings")]
    Update {
        #[arg(help = "Tenant identifier or id")]
        tenant: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        database: Option<String>,
        #[arg(long)]
        connection_string: Option<String>,
    },

    #[command(about = "Soft-delete tenant")]
    Delete {
        #[arg(help = "Tenant identifier or id")]
        tenant: String,
    },

    #[command(about = "Restore soft-deleted tenant")]
    Restore {
        #[arg(help = "Tenant identifier or id")]
        tenant: String,
    },

    #[command(about = "Check tenant database connectivity")]
    Health {
        #[arg(help = "Tenant identifier or id")]
        tenant: String,
    },

    #[command(about = "Apply pending migrations (one tenant, or all with --all)")]
    Migrate {
        #[arg(help = "Tenant identifier or id")]
        tenant: Option<String>,
        #[arg(long, conflicts_with = "tenant")]
        all: bool,
    },
}

fn print_tenants(output_format: &OutputFormat, tenants: &Value) -> anyhow::Result<()> {
    let rows = tenants.as_array().cloned().unwrap_or_default();
    if rows.is_empty() {
        return output_empty_collection(output_format, "tenants", "No tenants found");
    }

    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(tenants)?),
        OutputFormat::Text => {
            println!("{:<20} {:<28} {:<8} {}", "IDENTIFIER", "NAME", "ACTIVE", "HEALTH");
            println!("{}", "-".repeat(70));
            for tenant in rows {
                let health = match tenant["health"]["healthy"].as_bool() {
                    Some(true) => "up",
                    Some(false) => "down",
                    None => "-",
                };
                println!(
                    "{:<20} {:<28} {:<8} {}",
                    tenant["identifier"].as_str().unwrap_or(""),
                    tenant["name"].as_str().unwrap_or(""),
                    tenant["is_active"].as_bool().unwrap_or(false),
                    health
                );
            }
        }
    }
    Ok(())
}

/// PATCH body holding only the options that were given
fn update_body(name: Option<String>, database: Option<String>, connection_string: Option<String>) -> Value {
    let mut body = Map::new();
    for (key, value) in [("name", name), ("database_name", database), ("connection_string", connection_string)] {
        if let Some(value) = value {
            body.insert(key.to_string(), Value::String(value));
        }
    }
    Value::Object(body)
}

pub async fn handle(cmd: TenantCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let client = ApiClient::from_environment()?;

    match cmd {
        TenantCommands::List { all, health } => {
            let tenants = client
                .get(&format!("/api/root/tenant?include_inactive={}&include_health={}", all, health))
                .await?;
            print_tenants(&output_format, &tenants)
        }
        TenantCommands::Show { tenant } => {
            let data = client.get(&format!("/api/root/tenant/{}", tenant)).await?;
            output_value(&output_format, &data)
        }
        TenantCommands::Create {
            identifier,
            name,
            database,
            connection_string,
        } => {
            let body = json!({
                "identifier": identifier,
                "name": name,
                "database_name": database,
                "connection_string": connection_string,
            });
            let data = client.post("/api/root/tenant", Some(&body)).await?;
            output_success(
                &output_format,
                &format!(
                    "Tenant '{}' created (migrations: {})",
                    data["identifier"].as_str().unwrap_or(&identifier),
                    data["migration"]["status"].as_str().unwrap_or("unknown")
                ),
                Some(json!({ "tenant": data })),
            )
        }
        TenantCommands::Update {
            tenant,
            name,
            database,
            connection_string,
        } => {
            let body = update_body(name, database, connection_string);
            if body.as_object().map_or(true, Map::is_empty) {
                return Err(anyhow::anyhow!("Nothing to update: pass --name, --database or --connection-string"));
            }
            let data = client.patch(&format!("/api/root/tenant/{}", tenant), &body).await?;
            output_success(&output_format, &format!("Tenant '{}' updated", tenant), Some(json!({ "tenant": data })))
        }
        TenantCommands::Delete { tenant } => {
            client.delete(&format!("/api/root/tenant/{}", tenant)).await?;
            output_success(&output_format, &format!("Tenant '{}' deactivated", tenant), None)
        }
        TenantCommands::Restore { tenant } => {
            client.put(&format!("/api/root/tenant/{}", tenant)).await?;
            output_success(&output_format, &format!("Tenant '{}' restored", tenant), None)
        }
        TenantCommands::Health { tenant } => {
            let data = client.get(&format!("/api/root/tenant/{}/health", tenant)).await?;
            output_value(&output_format, &data["health"])
        }
        TenantCommands::Migrate { tenant, all } => {
            let data = match (tenant, all) {
                (Some(tenant), _) => client.post(&format!("/api/root/tenant/{}/migrate", tenant), None::<&()>).await?,
                (None, true) => client.post("/api/root/migrate", None::<&()>).await?,
                (None, false) => return Err(anyhow::anyhow!("Name a tenant or pass --all")),
            };
            output_value(&output_format, &data)
        }
    }
}
