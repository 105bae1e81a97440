//! AMTS CLI - database migrations and account management.
//!
//! # Usage
//!
//! ```bash
//! # Apply pending migrations
//! amts-cli migrate
//!
//! # Create a staff account (password from `AMTS_SEED_PASSWORD` if omitted)
//! amts-cli user create -e ops@example.com -n "Ops Lead" -r super_admin
//!
//! # Change the role of an existing account
//! amts-cli user promote -e ops@example.com -r admin
//! ```
//!
//! Every command reads `DATABASE_URL` from the environment or `.env`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use amts_core::{SubscriptionTier, UserRole};
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "amts-cli")]
#[command(author, version, about = "AMTS CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a new account
    Create {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Role (`user`, `admin`, `super_admin`)
        #[arg(short, long, default_value = "admin")]
        role: UserRole,

        /// Subscription tier (`free`, `starter`, `professional`, `enterprise`)
        #[arg(short, long, default_value = "free")]
        tier: SubscriptionTier,

        /// Initial password
        #[arg(short, long, env = "AMTS_SEED_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Change the role of an existing account
    Promote {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// New role (`user`, `admin`, `super_admin`)
        #[arg(short, long)]
        role: UserRole,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Before parsing so `.env` can supply `AMTS_SEED_PASSWORD`
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Create {
                email,
                name,
                role,
                tier,
                password,
            } => {
                commands::user::create(&email, name, &password, role, tier).await?;
            }
            UserAction::Promote { email, role } => {
                commands::user::promote(&email, role).await?;
            }
        },
    }
    Ok(())
}
