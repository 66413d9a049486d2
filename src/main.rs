//! treesize - print a size-sorted listing of a directory or search results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, warn};
use treesize::children::size_key;
use treesize::cli::{setup_logging, CliArgs};
use treesize::{Node, PopulationMode, View, ViewCoordinator};

#[derive(Debug, Serialize)]
struct NodeSummary {
    name: String,
    path: String,
    is_directory: bool,
    size: Option<u64>,
    size_display: String,
    size_final: bool,
    last_write: String,
}

impl NodeSummary {
    fn of(node: &Node) -> Self {
        Self {
            name: node.name().to_string(),
            path: node.full_path().display().to_string(),
            is_directory: node.is_directory(),
            size: node.size(),
            size_display: node.size_string(),
            size_final: node.is_size_final(),
            last_write: node.last_write_time_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Report {
    root: NodeSummary,
    search: Option<String>,
    entries: Vec<NodeSummary>,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();
    setup_logging(args.verbose, args.log_file.as_deref()).context("Failed to set up logging")?;

    let deadline = Instant::now() + Duration::from_secs(args.timeout_secs);
    let views = ViewCoordinator::new(args.tree_options(), args.search_options())
        .context("Failed to start worker pool")?;
    let (_, events) = views.subscribe_channel();
    views
        .refresh(&args.path, args.search.as_deref())
        .with_context(|| format!("Failed to open {}", args.path.display()))?;

    let view = loop {
        let event = events
            .recv_deadline(deadline)
            .context("Timed out waiting for the view")?;
        if !matches!(event.view, View::Searching { .. }) {
            break event.view;
        }
    };

    let remaining = deadline.saturating_duration_since(Instant::now());
    let (root, entries) = match view {
        View::Tree(root) => {
            let entries = settle_tree(&root, args.tree_options().population, remaining);
            (root, entries)
        }
        View::Results { root, results, .. } => {
            if args.tree_options().population == PopulationMode::Eager && root.wait_final(remaining) {
                results.sort_by_cached_key(|node| size_key(node.size()));
            }
            (root, results.snapshot())
        }
        View::Searching { .. } => bail!("Search did not finish"),
    };

    let report = Report {
        root: NodeSummary::of(&root),
        search: args
            .search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(String::from),
        entries: entries
            .iter()
            .take(args.limit)
            .map(|node| NodeSummary::of(node))
            .collect(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_listing(&report, entries.len());
    }
    Ok(())
}

/// Wait for the tree to settle and return the sorted top-level entries.
fn settle_tree(root: &Arc<Node>, population: PopulationMode, timeout: Duration) -> Vec<Arc<Node>> {
    match population {
        PopulationMode::Eager => {
            if !root.wait_final(timeout) {
                warn!(path = %root.full_path().display(), "Sizes still being calculated, listing is partial");
            }
        }
        PopulationMode::Lazy => {
            root.set_expanded(true);
            if !root.wait_populated(timeout) {
                warn!(path = %root.full_path().display(), "Directory listing incomplete");
            }
        }
    }

    match root.children() {
        Some(children) => {
            children.wait_sorted(Duration::from_secs(5));
            children.snapshot()
        }
        None => Vec::new(),
    }
}

fn print_listing(report: &Report, total: usize) {
    println!("{}  {}", report.root.size_display, report.root.path);
    if let Some(term) = report.search.as_deref() {
        println!("{} match(es) for \"{}\"", total, term);
    }
    for entry in &report.entries {
        let name = if report.search.is_some() {
            entry.path.as_str()
        } else {
            entry.name.as_str()
        };
        let suffix = if entry.is_directory { "/" } else { "" };
        println!("{:>12}  {}{}", entry.size_display, name, suffix);
    }
    if total > report.entries.len() {
        println!("... {} more", total - report.entries.len());
    }
}
