//! Migrations run straight against the databases named by `DATABASE_URL`,
//! without going through a running server.

use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::database::DatabaseManager;
use crate::tenancy::{
    migrate_iam, migrate_one, migrate_tenants, MigrationReport, MigrationStatus, PgTenantStore, SqlxTenantMigrate,
    TenantMigrationOutcome, TenantStore,
};

#[derive(Subcommand)]
pub enum MigrateCommands {
    #[command(about = "Apply the registry migrations to the IAM database")]
    Iam,

    #[command(about = "Migrate one tenant database")]
    Tenant {
        #[arg(help = "Tenant identifier or id")]
        tenant: String,
    },

    #[command(about = "Migrate every active tenant database")]
    All,
}

fn status_text(status: MigrationStatus) -> &'static str {
    match status {
        MigrationStatus::Migrated => "migrated",
        MigrationStatus::UpToDate => "up to date",
        MigrationStatus::Skipped => "skipped",
        MigrationStatus::Failed => "FAILED",
    }
}

fn print_outcome(outcome: &TenantMigrationOutcome) {
    print!("{:<24} {:<12}", outcome.identifier, status_text(outcome.status));
    if !outcome.applied.is_empty() {
        print!(" applied {:?}", outcome.applied);
    }
    if let Some(error) = &outcome.error {
        print!(" {}", error);
    }
    println!();
}

fn print_report(output_format: &OutputFormat, report: &MigrationReport) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            for outcome in &report.outcomes {
                print_outcome(outcome);
            }
            println!(
                "{} tenant(s): {} migrated, {} up to date, {} skipped, {} failed",
                report.total, report.migrated, report.up_to_date, report.skipped, report.failed
            );
        }
    }
    Ok(())
}

pub async fn handle(cmd: MigrateCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let result = run(cmd, &output_format).await;
    DatabaseManager::close_all().await;
    result
}

async fn run(cmd: MigrateCommands, output_format: &OutputFormat) -> anyhow::Result<()> {
    match cmd {
        MigrateCommands::Iam => {
            migrate_iam().await?;
            output_success(output_format, "IAM database migrated", None)
        }
        MigrateCommands::Tenant { tenant } => {
            let store = PgTenantStore::new(DatabaseManager::iam_pool().await?);
            let found = store
                .try_get(&tenant)
                .await
                .ok_or_else(|| anyhow::anyhow!("Tenant '{}' not found", tenant))?;

            let outcome = migrate_one(&found, &SqlxTenantMigrate).await;
            match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&json!(outcome))?),
                OutputFormat::Text => print_outcome(&outcome),
            }

            if outcome.status == MigrationStatus::Failed {
                return Err(anyhow::anyhow!("Migration failed for tenant '{}'", found.identifier));
            }
            Ok(())
        }
        MigrateCommands::All => {
            let store = PgTenantStore::new(DatabaseManager::iam_pool().await?);
            let tenants = store.get_all().await;
            let report = migrate_tenants(&tenants, &SqlxTenantMigrate).await;
            print_report(output_format, &report)?;

            if !report.is_success() {
                return Err(anyhow::anyhow!("{} tenant(s) failed to migrate", report.failed));
            }
            Ok(())
        }
    }
}
