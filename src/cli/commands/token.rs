//! Token minting for bootstrap and scripting. Signs with the local
//! `JWT_SECRET`, which must match the server's.

use clap::Subcommand;
use serde_json::json;

use crate::auth::{decode_jwt, generate_jwt, Claims, ROOT_ACCESS};
use crate::cli::utils::*;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum TokenCommands {
    #[command(about = "Sign a token")]
    Mint {
        #[arg(help = "Subject: the user's external id or email")]
        sub: String,
        #[arg(long, help = "Tenant claim")]
        tenant: Option<String>,
        #[arg(long, help = "Grant root access")]
        root: bool,
    },

    #[command(about = "Verify a token and print its claims")]
    Decode {
        #[arg(help = "Bearer token")]
        token: String,
    },
}

pub async fn handle(cmd: TokenCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        TokenCommands::Mint { sub, tenant, root } => {
            let access = root.then(|| ROOT_ACCESS.to_string());
            let claims = Claims::new(sub, tenant, access);
            let token = generate_jwt(&claims)?;

            match output_format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&json!({ "token": token, "claims": claims }))?)
                }
                OutputFormat::Text => println!("{}", token),
            }
            Ok(())
        }
        TokenCommands::Decode { token } => {
            let claims = decode_jwt(&token)?;
            output_value(&output_format, &serde_json::to_value(&claims)?)
        }
    }
}
