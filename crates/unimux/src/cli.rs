//! Clap derive structures for the `unimux` CLI.
//!
//! Defines the command tree, global flags, and shared value types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// unimux -- one command line for every UniFi API variant
#[derive(Debug, Parser)]
#[command(
    name = "unimux",
    version,
    about = "Query and change UniFi controllers through one API, whichever backend serves it",
    long_about = "Talks to the UniFi cloud API (stable or early access) or a local\n\
        gateway's integration API with the same commands. Responses are always\n\
        normalized to {data, meta}.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration profile to use
    #[arg(long, short = 'p', env = "UNIMUX_PROFILE", global = true)]
    pub profile: Option<String>,

    /// API variant (overrides profile)
    #[arg(long, short = 'b', env = "UNIMUX_BACKEND", global = true)]
    pub backend: Option<BackendArg>,

    /// Cloud API base URL (overrides profile)
    #[arg(long, env = "UNIMUX_URL", global = true)]
    pub url: Option<String>,

    /// Gateway host for the local-gateway backend (overrides profile)
    #[arg(long, short = 'H', env = "UNIMUX_HOST", global = true)]
    pub host: Option<String>,

    /// Gateway HTTPS port
    #[arg(long, env = "UNIMUX_PORT", global = true)]
    pub port: Option<u16>,

    /// Site id, or "default"
    #[arg(long, short = 's', env = "UNIMUX_SITE", global = true)]
    pub site: Option<String>,

    /// API key
    #[arg(long, env = "UNIMUX_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Accept self-signed gateway certificates
    #[arg(long, short = 'k', env = "UNIMUX_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "UNIMUX_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Bypass the response cache
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "UNIMUX_OUTPUT",
        default_value = "json",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

// ── Value Enums ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    /// api.ui.com/v1
    CloudStable,
    /// api.ui.com/ea
    CloudEarlyAccess,
    /// Gateway integration API behind /proxy/network
    LocalGateway,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read a resource collection or a single resource
    #[command(alias = "ls")]
    Get(GetArgs),

    /// Create a resource (POST)
    Create(WriteArgs),

    /// Replace a resource (PUT)
    Update(WriteArgs),

    /// Delete a resource
    #[command(alias = "rm")]
    Delete(DeleteArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Resource type, e.g. devices, clients, networks, sites
    pub resource: String,

    /// Resource id; omit to list the collection
    #[arg(long)]
    pub id: Option<String>,

    /// Query parameter as key=value (repeatable)
    #[arg(long = "param", short = 'P', value_parser = parse_key_val)]
    pub params: Vec<(String, String)>,

    /// Cache this response for SECS instead of the configured TTL
    #[arg(long, value_name = "SECS")]
    pub ttl: Option<u64>,
}

#[derive(Debug, Args)]
pub struct WriteArgs {
    /// Resource type
    pub resource: String,

    /// Resource id
    #[arg(long)]
    pub id: Option<String>,

    /// JSON body, or @path to read it from a file
    #[arg(long, short = 'd')]
    pub data: String,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Resource type
    pub resource: String,

    /// Resource id
    #[arg(long)]
    pub id: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Show the effective configuration (secrets redacted)
    Show,

    /// Write a config file with one profile built from the global flags
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

/// Parse `key=value` into a pair.
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_owned(), value.to_owned()))
}
