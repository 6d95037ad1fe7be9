//! Command-line interface
//!
//! 除 `serve` 外的子命令都是一次性进程：连数据库、干活、退出。

use clap::{Parser, Subcommand};
use colored::Colorize;

use crate::config::StaticConfig;
use crate::services::UserService;
use crate::storage::StorageFactory;

#[derive(Parser)]
#[command(
    name = "qrify",
    version,
    about = "QR code generation and scan tracking service"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default when no subcommand is given)
    Serve,
    /// Administrative operations
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Create an admin account (prompts for the password)
    Create {
        /// Email address for the new admin
        #[arg(long)]
        email: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate the configuration file and report problems
    Check {
        /// Path to the config file
        #[arg(long, default_value = "config.toml")]
        path: String,
    },
    /// Print a sample config.toml with default values
    Generate,
}

/// `qrify admin create --email ...`
pub async fn run_admin_create(email: &str) -> anyhow::Result<()> {
    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;

    if password != confirm {
        anyhow::bail!("passwords do not match");
    }

    let storage = StorageFactory::create().await?;
    let service = UserService::new(storage);
    let user = service.create_admin(email, &password).await?;

    println!(
        "{} admin account created: {} ({})",
        "success:".green().bold(),
        user.email,
        user.id
    );
    Ok(())
}

/// `qrify config check`
pub fn run_config_check(path: &str) -> anyhow::Result<()> {
    if !std::path::Path::new(path).exists() {
        println!(
            "{} {} not found, checking defaults plus QRIFY__* environment variables",
            "note:".cyan().bold(),
            path
        );
    }

    let config = StaticConfig::load_from(path);
    let mut errors = 0usize;

    if config.auth.jwt_secret.is_empty() {
        println!(
            "{} auth.jwt_secret is empty, tokens cannot be signed",
            "error:".red().bold()
        );
        errors += 1;
    } else if config.auth.jwt_secret.len() < 32 {
        println!(
            "{} auth.jwt_secret is shorter than 32 bytes",
            "warning:".yellow().bold()
        );
    }

    let url = &config.database.database_url;
    let known_scheme = [
        "sqlite:",
        "mysql://",
        "mariadb://",
        "postgres://",
        "postgresql://",
    ]
    .iter()
    .any(|scheme| url.starts_with(scheme));
    if !known_scheme {
        println!(
            "{} database.database_url '{}' has an unrecognized scheme \
             (expected sqlite://, mysql://, mariadb:// or postgres://)",
            "error:".red().bold(),
            url
        );
        errors += 1;
    }

    if config.server.public_url.ends_with('/') {
        println!(
            "{} server.public_url ends with '/', short URLs will contain '//'",
            "warning:".yellow().bold()
        );
    }

    if !config.auth.cookie_secure {
        println!(
            "{} auth.cookie_secure is disabled, do not use this in production",
            "warning:".yellow().bold()
        );
    }

    if config.billing.razorpay_key_id.is_empty() || config.billing.razorpay_key_secret.is_empty() {
        println!(
            "{} Razorpay credentials are not set, order creation will fail",
            "warning:".yellow().bold()
        );
    }
    if config.billing.razorpay_webhook_secret.is_empty() {
        println!(
            "{} billing.razorpay_webhook_secret is not set, webhooks will be rejected",
            "warning:".yellow().bold()
        );
    }

    if errors > 0 {
        anyhow::bail!("configuration has {} error(s)", errors);
    }
    println!("{} configuration OK", "success:".green().bold());
    Ok(())
}

/// `qrify config generate`
pub fn run_config_generate() {
    println!("{}", StaticConfig::generate_sample_config());
}
