use clap::Parser;

use qrify::cli::{AdminCommands, Cli, Commands, ConfigCommands};
use qrify::config::{get_config, init_config};
use qrify::system::init_logging;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // config 子命令不初始化日志，保持 stdout 干净
    if let Some(Commands::Config { command }) = &cli.command {
        return match command {
            ConfigCommands::Check { path } => qrify::cli::run_config_check(path),
            ConfigCommands::Generate => {
                qrify::cli::run_config_generate();
                Ok(())
            }
        };
    }

    init_config();
    let _log_guard = init_logging(&get_config());

    match cli.command {
        None | Some(Commands::Serve) => qrify::runtime::modes::run_server().await,
        Some(Commands::Admin {
            command: AdminCommands::Create { email },
        }) => qrify::cli::run_admin_create(&email).await,
        Some(Commands::Config { .. }) => unreachable!(),
    }
}
