use clap::Subcommand;
use serde_json::json;

use crate::cli::client::ApiClient;
use crate::cli::config::*;
use crate::cli::utils::*;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Obtain a token through the development login")]
    Login {
        #[arg(help = "Tenant identifier")]
        tenant: String,
        #[arg(help = "User email")]
        email: String,
    },

    #[command(about = "Forget the stored token")]
    Logout,

    #[command(about = "Show current authentication status")]
    Status,

    #[command(about = "Show current user information")]
    Whoami,

    #[command(about = "Store an existing token (e.g. from the identity provider or 'docflow token mint')")]
    Use {
        #[arg(help = "Bearer token")]
        token: String,
        #[arg(long, help = "Tenant to send with requests")]
        tenant: Option<String>,
    },
}

pub async fn handle(cmd: AuthCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        AuthCommands::Login { tenant, email } => {
            let (server, info) = current_server()?;
            let client = ApiClient::new(info.url(), None, None);
            let data = client
                .post("/auth/login", Some(&json!({ "tenant": tenant, "email": email })))
                .await?;

            let token = data["token"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("Login response did not contain a token"))?;

            let mut env_config = load_environment_config()?;
            env_config.token = Some(token.to_string());
            env_config.current_tenant = data["tenant"].as_str().map(str::to_string).or(Some(tenant));
            env_config.current_user = Some(email.clone());
            save_environment_config(&env_config)?;

            output_success(
                &output_format,
                &format!("Logged in to '{}' as {}", server, email),
                Some(json!({ "server": server, "tenant": env_config.current_tenant, "user": email })),
            )
        }
        AuthCommands::Logout => {
            let mut env_config = load_environment_config()?;
            env_config.token = None;
            env_config.current_user = None;
            save_environment_config(&env_config)?;
            output_success(&output_format, "Logged out", None)
        }
        AuthCommands::Status => {
            let env_config = load_environment_config()?;
            output_value(
                &output_format,
                &json!({
                    "server": env_config.current_server,
                    "tenant": env_config.current_tenant,
                    "user": env_config.current_user,
                    "authenticated": env_config.token.is_some(),
                }),
            )
        }
        AuthCommands::Whoami => {
            let client = ApiClient::from_environment()?;
            let me = client.get("/api/me").await?;
            output_value(&output_format, &me)
        }
        AuthCommands::Use { token, tenant } => {
            let mut env_config = load_environment_config()?;
            env_config.token = Some(token);
            if tenant.is_some() {
                env_config.current_tenant = tenant;
            }
            save_environment_config(&env_config)?;
            output_success(&output_format, "Token stored", None)
        }
    }
}
