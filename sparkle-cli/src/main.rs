mod cli;
mod commands;
mod config;
mod error;

use std::process;

use clap::Parser;
use sparkle_engine::{CancellationToken, SubmissionParams};
use tracing::{Level, error, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{
    cli::{Args, Commands},
    commands::{CommandExecutor, SubmitRequest},
    config::AppConfig,
    error::Result,
};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet);

    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping");
            ctrl_c.cancel();
        }
    });

    if let Commands::Completions { shell } = args.command {
        use clap::CommandFactory;
        use clap_complete::generate;

        let mut cmd = Args::command();
        let bin_name = cmd.get_name().to_string();
        generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
        return Ok(());
    }

    let config = AppConfig::load(args.config.as_deref())?;
    let executor = CommandExecutor::new(config, token);

    match args.command {
        Commands::Submit {
            cluster,
            file,
            class_name,
            name,
            conf,
            follow,
            args,
        } => {
            let mut params = SubmissionParams::new(file).args(args);
            params.class_name = class_name;
            params.name = name;
            params.conf = conf.into_iter().collect();
            executor
                .submit(SubmitRequest {
                    cluster,
                    params,
                    follow,
                })
                .await?;
        }
        Commands::Status { cluster, id } => executor.status(&cluster, &id).await?,
        Commands::Logs {
            cluster,
            id,
            driver,
        } => executor.logs(&cluster, &id, driver).await?,
        Commands::Kill { cluster, id } => executor.kill(&cluster, &id).await?,
        Commands::Clusters => executor.list_clusters(),
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(verbose)
                .with_writer(std::io::stderr),
        )
        .init();
}
