//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "logdropd")]
#[command(version, about = "Crash-tolerant HTTP log collector")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file (default: logdrop.toml/.yaml/.yml/.json in the working directory)
    #[arg(short, long, env = "LOGDROP_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Base directory holding cache/, staging/ and logs/
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the ingestion server and the aggregation workers (default)
    Run,

    /// Run only the ingestion server
    Serve {
        /// Address to listen on
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run only the aggregation workers
    Collect {
        /// Number of workers in this process
        #[arg(short, long)]
        workers: Option<usize>,

        /// Make one pass per worker and exit
        #[arg(long)]
        once: bool,
    },

    /// Count matching lines in the aggregated logs
    Count(CountArgs),
}

#[derive(Args, Debug, PartialEq, Eq)]
pub struct CountArgs {
    /// Start of range, YYYYMMDD[-HH[MM[SS]]]
    pub since: String,

    /// End of range (default: end of `since`)
    pub until: Option<String>,

    /// Level or level range, e.g. 40 or 30-50
    #[arg(short, long)]
    pub levels: Option<String>,

    /// Facility to include (repeatable; default: all)
    #[arg(short, long = "facility")]
    pub facilities: Vec<String>,

    /// Print the matching lines instead of counting them
    #[arg(long)]
    pub lines: bool,
}

impl CountArgs {
    /// The same `since/until/levels/facility...` form the HTTP route takes
    pub fn query_path(&self) -> String {
        let mut segments = vec![
            self.since.clone(),
            self.until.clone().unwrap_or_default(),
            self.levels.clone().unwrap_or_default(),
        ];
        segments.extend(self.facilities.iter().cloned());
        segments.join("/")
    }
}
