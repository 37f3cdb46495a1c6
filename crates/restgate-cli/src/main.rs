//! Restgate CLI - command-line front end for the rate-limit aware REST core
//!
//! Loads configuration, initializes logging and issues a single verb call
//! through `restgate-core`.

mod cli;
mod config;
mod error;
mod handlers;
mod logging;
mod output;

use std::process;

use cli::Cli;
use colored::control;
use config::Config;
use error::Result;
use logging::{redaction, timing::Timer, LoggingConfig};
use output::OutputWriter;
use tracing::instrument;

#[tokio::main]
async fn main() {
    // A missing .env file is not an error
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();

    control::set_override(cli.use_color());

    if let Err(e) = init_logging(&cli) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let use_color = cli.use_color();
    match run(cli).await {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("{}", error::format_error(&e, use_color));

            if e.should_show_help() {
                eprintln!("\nFor more information, try '--help'");
            }

            process::exit(e.exit_code());
        }
    }
}

/// Main application logic
#[instrument(skip(cli), fields(command = ?cli.command))]
async fn run(cli: Cli) -> Result<()> {
    let _timer = Timer::new("cli_execution");

    let config = {
        let _config_timer = Timer::new("config_loading");
        Config::resolve(&cli)?
    };

    let mut shown = serde_json::to_value(&config)?;
    redaction::redact_json_value(&mut shown);
    tracing::debug!(config = %shown, "Effective configuration");

    let mut output = OutputWriter::new(config.output_format(), cli.use_color(), cli.quiet);

    let (method, args) = cli.command.into_parts();
    handlers::handle_request(method, args, &config, &mut output).await
}

/// Initialize the logging system
fn init_logging(cli: &Cli) -> Result<()> {
    let mut logging_config = LoggingConfig::from_verbosity(cli.verbosity_level());
    logging_config.merge_with_env();

    if cli.quiet {
        logging_config.level = "error".to_string();
        logging_config.console = false;
    }

    logging::init_logging(logging_config)
}
