//! SmartFlow CLI entry point.
//!
//! Binary name: `smartflow`
//!
//! Parses CLI arguments, sets up tracing, opens the configured state store,
//! then dispatches to the command handler. Any error is printed to stderr and
//! the process exits with status 1.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;
use console::style;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = smartflow_observe::tracing_setup::init_tracing(cli.log_filter(), cli.otel) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    let outcome = run(cli).await;
    smartflow_observe::tracing_setup::shutdown_tracing();

    if let Err(e) = outcome {
        eprintln!("{} {e:#}", style("Error:").red().bold());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "smartflow", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(cli.storage).await?;

    match &cli.command {
        Commands::Run(args) => {
            cli::run::run_workflow(&state, args, cli.json, cli.quiet).await?;
        }
        Commands::Logs { workflow_id } => {
            cli::logs::show_logs(&state, workflow_id, cli.json).await?;
        }
        Commands::State { workflow_id } => {
            cli::workflows::show_state(&state, workflow_id, cli.json).await?;
        }
        Commands::List => {
            cli::workflows::list_workflows(&state, cli.json).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
