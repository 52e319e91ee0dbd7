//! netorcai: generic turn-based game orchestrator.
//!
//! Binds the engine, wires the interactive control channel (stdin lines
//! `start` and `quit`) and SIGINT, then runs until the game completes or
//! a quit order arrives. Exit codes: 0 on clean completion, help or
//! version; 1 on invalid arguments, bind failure, fatal game logic
//! errors or SIGINT.

mod cli;

use clap::error::ErrorKind;
use clap::Parser;
use netorcai_server::{Control, Engine};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::Args;

#[tokio::main]
async fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    init_logging(&args);

    let config = match args.into_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    let engine = match Engine::bind(config).await {
        Ok(engine) => engine,
        Err(err) => {
            tracing::error!(error = %err, "Cannot listen for TCP connections");
            std::process::exit(1);
        }
    };

    let control = engine.control();
    tokio::spawn(control_loop(control.clone()));
    tokio::spawn(sigint_loop(control));

    let code = engine.run().await;
    std::process::exit(code);
}

fn init_logging(args: &Args) {
    let level = if args.debug {
        tracing::Level::TRACE
    } else if args.verbose {
        tracing::Level::DEBUG
    } else if args.quiet {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    };

    let builder = tracing_subscriber::fmt().with_max_level(level);
    if args.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Reads control commands from standard input until EOF.
async fn control_loop(control: Control) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match line.trim() {
            "start" => {
                control.start_game().await;
            }
            "quit" => {
                control.quit();
                return;
            }
            "" => {}
            other => {
                tracing::warn!(command = other, "Unknown control command");
            }
        }
    }
}

/// Treats SIGINT as an abort: cleanup, then exit code 1.
async fn sigint_loop(control: Control) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("SIGINT received, aborting");
        control.abort();
    }
}
