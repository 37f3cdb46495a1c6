//! Command-line interface argument parsing and definitions
//!
//! This module defines the CLI structure using clap's derive API.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use is_terminal::IsTerminal;
use restgate_core::http::Method;
use serde::{Deserialize, Serialize};

/// Restgate CLI - issue rate-limit aware REST calls
///
/// Calls are paced against the per-route limits the server reports, and
/// failures are decoded into readable errors.
#[derive(Parser, Debug)]
#[command(
    name = "restgate",
    version,
    author,
    about,
    long_about = None,
    propagate_version = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Enable verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "RESTGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Authorization token (overrides config and RESTGATE_TOKEN)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// API host (overrides config and RESTGATE_BASE_URL)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Calls allowed in flight at once
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Output format for results [default: human]
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// The verb to issue
    #[command(subcommand)]
    pub command: Commands,
}

/// Available verbs
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read a resource (served from cache when repeated)
    Get(RequestArgs),

    /// Create a resource
    Post(RequestArgs),

    /// Replace a resource
    Put(RequestArgs),

    /// Modify a resource
    Patch(RequestArgs),

    /// Remove a resource
    Delete(RequestArgs),
}

/// Arguments shared by every verb
#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// Route below the versioned API prefix, e.g. /channels/123/messages
    #[arg(value_name = "ROUTE")]
    pub route: String,

    /// JSON body, inline or as @FILE
    #[arg(long, value_name = "JSON|@FILE")]
    pub json: Option<String>,

    /// File to upload as an attachment (switches the body to multipart)
    #[arg(long = "file", value_name = "PATH")]
    pub files: Vec<PathBuf>,

    /// Extra request header
    #[arg(long = "header", value_name = "NAME:VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Audit-log reason attached to the call
    #[arg(long)]
    pub reason: Option<String>,
}

/// Output format options
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Human-readable formatted output
    Human,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
    /// Pretty-printed JSON output
    JsonPretty,
}

impl Commands {
    /// Split into the HTTP method and its arguments
    pub fn into_parts(self) -> (Method, RequestArgs) {
        match self {
            Commands::Get(args) => (Method::GET, args),
            Commands::Post(args) => (Method::POST, args),
            Commands::Put(args) => (Method::PUT, args),
            Commands::Patch(args) => (Method::PATCH, args),
            Commands::Delete(args) => (Method::DELETE, args),
        }
    }
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective verbosity level (considering quiet flag)
    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }

    /// Check if colored output should be used
    pub fn use_color(&self) -> bool {
        !self.no_color && std::io::stdout().is_terminal()
    }
}

fn parse_header(raw: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("header name cannot be empty".to_string());
    }
    Ok((name.to_string(), value.trim().to_string()))
}
