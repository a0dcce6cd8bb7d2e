use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use rigcheck_cli::cli::{Cli, Commands, ConfigAction, ConfigArgs};
use rigcheck_cli::commands;
use rigcheck_cli::error::CliError;
use rigcheck_cli::logging::init_tracing;
use rigcheck_cli::output::OutputWriter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let writer = OutputWriter::new(cli.output);

    let loaded = match commands::load_config(&cli.config, cli.log_level.as_deref()).await {
        Ok(loaded) => loaded,
        Err(e) => {
            let e = match cli.command {
                Commands::Config(ConfigArgs {
                    action: ConfigAction::Validate,
                }) => commands::config::report_invalid(&cli.config, e, &writer),
                _ => e,
            };
            exit_with(e);
        }
    };

    init_tracing(&loaded.config.general)?;
    tracing::debug!(config = loaded.source_label(), "rigcheck starting");

    if let Err(e) = commands::dispatch(cli.command, loaded, &cli.config, &writer).await {
        exit_with(e);
    }
    Ok(())
}

fn exit_with(error: CliError) -> ! {
    eprintln!("{} {}", "error:".red().bold(), error);
    std::process::exit(error.exit_code());
}
