use anyhow::Result;
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use sietrack::cli::calc::CalcCommand;
use sietrack::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for sietrack::AppCommand {
    fn from(cmd: Commands) -> sietrack::AppCommand {
        match cmd {
            Commands::Refresh => sietrack::AppCommand::Refresh,
            Commands::Show => sietrack::AppCommand::Show,
            Commands::History { ids, start, end } => {
                sietrack::AppCommand::History { ids, start, end }
            }
            Commands::Calc { calc } => sietrack::AppCommand::Calc(calc),
            Commands::Watch => sietrack::AppCommand::Watch,
            Commands::CheckVolatility => sietrack::AppCommand::CheckVolatility,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Fetch the latest value of every tracked indicator
    Refresh,
    /// Display the cached indicators
    Show,
    /// Fetch the history of one or more indicators
    History {
        #[arg(required = true)]
        ids: Vec<String>,
        /// First date (YYYY-MM-DD), defaults to a year before the end
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Conversions and rates from cached values
    Calc {
        #[command(subcommand)]
        calc: CalcCommand,
    },
    /// Refresh and watch volatility on a schedule until Ctrl-C
    Watch,
    /// Compare the watched exchange rate with its last reading
    CheckVolatility,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match &cli.config_path {
            Some(path) => sietrack::cli::setup::setup_at_path(path),
            None => sietrack::cli::setup::setup(),
        },
        Some(cmd) => sietrack::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
