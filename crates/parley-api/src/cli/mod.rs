//! CLI command definitions for the `parley` binary.
//!
//! Uses clap derive macros. `bridge` and `chat` run the two servers; `tools`
//! is a client-side check against a running bridge.

pub mod tools;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Tool bridge and chat streaming server.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to config.toml (defaults to the platform config directory).
    #[arg(long, global = true, env = "PARLEY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the tool bridge server (/sse, /messages, /health).
    Bridge {
        /// Host to bind to.
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on.
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Run the chat API server (/api/chat, /health).
    Chat {
        /// Host to bind to.
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on.
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// List the tools a running bridge exposes.
    Tools {
        /// Streaming endpoint of the bridge (defaults to `chat.bridge_url`).
        #[arg(long)]
        url: Option<String>,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_bridge_overrides_and_global_flags() {
        let cli = Cli::try_parse_from(["parley", "bridge", "--port", "4001", "-vv", "--json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.json);
        match cli.command {
            Commands::Bridge { host, port } => {
                assert!(host.is_none());
                assert_eq!(port, Some(4001));
            }
            _ => panic!("expected bridge command"),
        }
    }

    #[test]
    fn parses_tools_url() {
        let cli = Cli::try_parse_from(["parley", "tools", "--url", "http://127.0.0.1:3001/sse"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Tools { url: Some(ref u) } if u == "http://127.0.0.1:3001/sse"
        ));
    }
}
