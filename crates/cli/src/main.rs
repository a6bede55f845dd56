//! Atelier CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run schema migrations and create both session tables
//! atelier-cli migrate
//!
//! # Create an admin account (password from ADMIN_PASSWORD or stdin)
//! atelier-cli admin create -e admin@example.com -n "Admin Name"
//!
//! # Give an existing account admin rights
//! atelier-cli admin promote -e someone@example.com
//!
//! # Run a scheduled job once
//! atelier-cli jobs run webhook-retry
//!
//! # Insert a small demo catalog
//! atelier-cli seed
//! ```
//!
//! All commands read `DATABASE_URL` (a `.env` file is honoured).

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "atelier-cli")]
#[command(author, version, about = "Atelier CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage admin users
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Run scheduled jobs by hand
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },
    /// Seed the database with a demo catalog
    Seed,
}

#[derive(Subcommand)]
enum AdminAction {
    /// Create a new admin user
    Create {
        /// Admin email address
        #[arg(short, long)]
        email: String,

        /// Admin display name
        #[arg(short, long)]
        name: String,
    },
    /// Grant admin rights to an existing account
    Promote {
        /// Account email address
        #[arg(short, long)]
        email: String,
    },
}

#[derive(Subcommand)]
enum JobsAction {
    /// Run one job to completion
    Run {
        /// Job name (`abandoned-carts`, `sessions`, `webhook-retry`,
        /// `payment-reconciliation`)
        job: String,
    },
    /// List job names
    List,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Admin { action } => match action {
            AdminAction::Create { email, name } => {
                commands::admin::create_user(&email, &name).await?;
            }
            AdminAction::Promote { email } => {
                commands::admin::promote(&email).await?;
            }
        },
        Commands::Jobs { action } => match action {
            JobsAction::Run { job } => commands::jobs::run(&job).await?,
            JobsAction::List => commands::jobs::list(),
        },
        Commands::Seed => commands::seed::demo_catalog().await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_job_run() {
        let cli = Cli::try_parse_from(["atelier-cli", "jobs", "run", "sessions"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Jobs {
                action: JobsAction::Run { job }
            }) if job == "sessions"
        ));
    }
}
