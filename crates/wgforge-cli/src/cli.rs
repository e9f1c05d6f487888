//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// wgforge - WireGuard topology and configuration generator.
#[derive(Parser, Debug, Clone)]
#[command(name = "wgforge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Key store database file.
    #[arg(short, long, env = "WGFORGE_DB", default_value = "wg_keys.json")]
    pub db: PathBuf,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build per-node WireGuard configuration files.
    Build {
        /// Topology document (YAML or JSON).
        document: PathBuf,

        /// Output directory for the generated `.conf` files.
        #[arg(short, long, default_value = "out")]
        output: PathBuf,
    },

    /// Validate a document and report the resolved peer tables.
    Check {
        /// Topology document (YAML or JSON).
        document: PathBuf,
    },

    /// Key store maintenance.
    Keys {
        /// Keys subcommand to execute.
        #[command(subcommand)]
        command: KeysCommands,
    },
}

/// Key store subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum KeysCommands {
    /// List stored keys.
    List,

    /// Remove a node's keypair and its preshared keys.
    Remove {
        /// The node whose material to remove.
        node: String,
    },
}
