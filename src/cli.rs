use clap::{ArgAction, Parser};
use std::time::Duration;

/// layerpack - Prisma Lambda layer builder
#[derive(Parser, Debug)]
#[command(name = "layerpack")]
#[command(about = "Build the Prisma client Lambda layer archive for the current project")]
#[command(version)]
#[command(after_help = "Example:\n  layerpack .env.develop\n\n\
Run from the project root: expects prisma/schema.prisma and layers/api_prisma_layer/nodejs/.")]
pub struct Cli {
    /// Environment file, relative to the project root (e.g. .env.develop)
    pub env_file: String,

    /// Show what would be done without touching the filesystem or running tools
    #[arg(long)]
    pub dry_run: bool,

    /// Seconds each external tool may run before it is terminated (0 disables)
    #[arg(long, value_name = "SECS", default_value_t = 900)]
    pub timeout: u64,

    /// Print the build report (or plan) as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Per-tool timeout, `None` when disabled
    pub fn tool_timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }

    /// Default log filter for the requested verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
