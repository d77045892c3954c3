//! Command-line interface definitions.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{ColorChoice, Parser, Subcommand};

use crate::session::EchoPolicy;

/// Two-way value binding between page controls and a remote session
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: bindwire.toml)
    #[arg(short = 'C', long, global = true, default_value = "bindwire.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List the controls a page binds, with driver, policy and initial value
    #[command(visible_alias = "i")]
    Inspect {
        /// HTML page to scan
        #[arg(value_hint = clap::ValueHint::FilePath)]
        page: PathBuf,

        /// Print bindings as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Run a scripted session under virtual time and print what is sent
    #[command(visible_alias = "r")]
    Replay {
        /// HTML page to bind
        #[arg(value_hint = clap::ValueHint::FilePath)]
        page: PathBuf,

        /// Script of timed edits (`-` reads stdin)
        #[arg(value_hint = clap::ValueHint::FilePath)]
        script: PathBuf,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Bind a page and exchange values with one WebSocket peer
    #[command(visible_alias = "s")]
    Serve {
        /// HTML page to bind
        #[arg(value_hint = clap::ValueHint::FilePath)]
        page: PathBuf,

        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long)]
        interface: Option<IpAddr>,

        /// Port number to listen on
        #[arg(short, long)]
        port: Option<u16>,

        #[command(flatten)]
        session: SessionArgs,
    },
}

/// Session overrides shared by Replay and Serve
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// Echo policy for server-pushed values (mirror, skip-unchanged, suppress)
    #[arg(short, long)]
    pub echo: Option<EchoPolicy>,

    /// Hold values until `submit`
    #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub defer: Option<bool>,
}
