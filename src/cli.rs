//! Command line arguments and logging setup shared by the binaries.

use crate::config::{default_threads, PopulationMode, SearchOptions, TreeOptions};
use clap::Parser;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Live, size-sorted view of a directory tree
#[derive(Parser, Debug, Clone)]
#[command(
    name = "treesize",
    version,
    about = "Live, size-sorted view of a directory tree",
    after_help = "EXAMPLES:\n    \
        treesize /var\n    \
        treesize ~/projects --search .log --json\n    \
        treesize-tui / --threads 32"
)]
pub struct CliArgs {
    /// Directory to measure
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: PathBuf,

    /// Only list entries whose name contains this text
    #[arg(short, long, value_name = "TEXT")]
    pub search: Option<String>,

    /// Worker threads shared by the whole tree
    #[arg(short = 't', long, default_value_t = default_threads(), value_name = "NUM")]
    pub threads: usize,

    /// Read directories only when expanded instead of measuring everything
    #[arg(long)]
    pub lazy: bool,

    /// Case-insensitive search
    #[arg(short = 'i', long)]
    pub ignore_case: bool,

    /// Report matching directories as well as files
    #[arg(long)]
    pub include_dirs: bool,

    /// Populate unexplored directories one at a time during search
    #[arg(long)]
    pub serial_search: bool,

    /// Stop reading a directory at its first unreadable entry instead of skipping it
    #[arg(long)]
    pub strict: bool,

    /// Print JSON instead of a text listing
    #[arg(long)]
    pub json: bool,

    /// Maximum number of entries to print
    #[arg(short = 'n', long, default_value = "25", value_name = "NUM")]
    pub limit: usize,

    /// Give up waiting for sizes after this many seconds
    #[arg(long, default_value = "600", value_name = "SECS")]
    pub timeout_secs: u64,

    /// Write logs to this file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Debug logging
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl CliArgs {
    pub fn tree_options(&self) -> TreeOptions {
        TreeOptions {
            population: if self.lazy {
                PopulationMode::Lazy
            } else {
                PopulationMode::Eager
            },
            ignore_inaccessible: !self.strict,
            parallel_search: !self.serial_search,
            threads: self.threads.max(1),
        }
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            case_sensitive: !self.ignore_case,
            include_directories: self.include_dirs,
        }
    }
}

fn log_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("treesize=debug,warn")
        } else {
            EnvFilter::new("warn")
        }
    })
}

/// Log to `log_file` if given, otherwise to stderr.
pub fn setup_logging(verbose: bool, log_file: Option<&Path>) -> io::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose))
        .with_target(false)
        .with_file(false)
        .with_line_number(false);

    match log_file {
        Some(path) => {
            let file = File::create(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(io::stderr).init(),
    }
    Ok(())
}
