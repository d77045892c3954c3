//! Bindwire - rate-limited two-way binding between page controls and a
//! remote session.

#![allow(dead_code)]

mod channel;
mod cli;
mod config;
mod core;
mod dom;
mod driver;
mod limiter;
mod logger;
mod session;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::BindConfig;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = BindConfig::load(&cli.config)?;

    match &cli.command {
        Commands::Inspect { page, json } => cli::inspect::inspect_page(&config, page, *json),
        Commands::Replay {
            page,
            script,
            session,
        } => cli::replay::replay_page(&config, page, script, session),
        Commands::Serve {
            page,
            interface,
            port,
            session,
        } => cli::serve::serve_page(&config, page, *interface, *port, session),
    }
}
