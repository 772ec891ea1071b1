use clap::Parser;
use std::path::PathBuf;

/// Automatically set processes' CPU priority and affinity by process name
#[derive(Parser, Debug, Default)]
#[command(name = "procprio", version, about)]
pub struct Cli {
    /// Comma-delimited list of app(s) to prioritize; replaces the defaults
    #[arg(short = 'g', long, value_name = "LIST")]
    pub good: Option<String>,

    /// Comma-delimited list of app(s) to deprioritize; replaces the defaults
    #[arg(short = 'b', long, value_name = "LIST")]
    pub bad: Option<String>,

    /// Comma-delimited list of app(s) to prioritize; appended to the defaults
    #[arg(short = 'G', long, value_name = "LIST")]
    pub append_good: Option<String>,

    /// Comma-delimited list of app(s) to deprioritize; appended to the defaults
    #[arg(short = 'B', long, value_name = "LIST")]
    pub append_bad: Option<String>,

    /// Seconds between priority/affinity updates [default: 60]
    #[arg(short, long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Configuration file [default: <config dir>/procprio.toml]
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print debug information
    #[arg(short, long)]
    pub verbose: bool,
}
