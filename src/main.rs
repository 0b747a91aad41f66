// ABOUTME: Entry point for the promoter CLI application.
// ABOUTME: Parses arguments, wires Ctrl-C to cancellation, and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use promoter::cancel::{CancelToken, cancellation};
use promoter::config::Overrides;
use promoter::error::Result;
use promoter::output::Output;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let (canceller, cancel) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; cancelling promotion");
            canceller.cancel();
        }
    });

    let output = Output::new(cli.output);
    let code = match run(cli, output.clone(), cancel).await {
        Ok(code) => code,
        Err(e) => {
            match e.hint() {
                Some(hint) => output.error(&format!("{e}\n  hint: {hint}")),
                None => output.error(&e.to_string()),
            }
            1
        }
    };

    // Exit explicitly: a pending stdin prompt would otherwise hold the runtime open.
    std::process::exit(code);
}

async fn run(cli: Cli, output: Output, cancel: CancelToken) -> Result<i32> {
    match cli.command {
        Commands::Init { app, image, force } => {
            commands::init(app.as_deref(), image.as_deref(), force, output)
        }
        Commands::Promote {
            tag,
            image,
            to,
            approve,
            approval_file,
            approval_timeout,
            health_attempts,
            health_interval,
            force,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let options = commands::PromoteOptions {
                tag,
                image,
                destination: to,
                approve,
                approval_file,
                overrides: Overrides {
                    health_attempts,
                    health_interval,
                    approval_timeout,
                },
                force,
            };
            commands::promote(config, options, output, cancel).await
        }
        Commands::Status => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::status(config, output).await
        }
        Commands::Rollback { environment, force } => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::rollback(config, environment, force, output).await
        }
    }
}
