mod cli;
mod commands;
mod config;
mod error;
mod output;

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use unimux_api::Client;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Crates whose level `-v` raises. Everything else stays at `warn`.
const LOG_TARGETS: [&str; 3] = ["unimux", "unimux_api", "unimux_config"];

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    install_logging(cli.global.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

/// `RUST_LOG` wins when set. Otherwise `-v` steps our own crates through
/// info, debug and trace while reqwest and hyper stay quiet.
///
/// Everything is written to stderr; stdout carries only rendered responses.
fn install_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives: Vec<String> = LOG_TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect();
        EnvFilter::new(format!("warn,{}", directives.join(",")))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let global = cli.global;

    match cli.command {
        Command::Config(args) => commands::config_cmd::handle(args, &global),
        Command::Completions(args) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "unimux", &mut std::io::stdout());
            Ok(())
        }
        verb => {
            let resolved = config::resolve(&global)?;
            let client = Client::new(resolved.client)?;

            tracing::debug!(
                command = ?verb,
                backend = %client.kind(),
                site = %resolved.site,
                "running"
            );
            commands::dispatch(verb, &client, &resolved.site, &global).await
        }
    }
}
