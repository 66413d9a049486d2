use crate::cancel::CancelToken;
use crate::children::size_key;
use crate::config::SearchOptions;
use crate::node::Node;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const POPULATION_POLL: Duration = Duration::from_millis(25);

/// Result of a search: cancelled is distinct from an empty match list.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Completed(Vec<Arc<Node>>),
    Cancelled,
}

impl SearchOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SearchOutcome::Cancelled)
    }

    pub fn into_results(self) -> Option<Vec<Arc<Node>>> {
        match self {
            SearchOutcome::Completed(results) => Some(results),
            SearchOutcome::Cancelled => None,
        }
    }
}

struct Matcher {
    needle: String,
    case_sensitive: bool,
}

impl Matcher {
    fn new(term: &str, case_sensitive: bool) -> Self {
        let needle = if case_sensitive {
            term.to_string()
        } else {
            term.to_lowercase()
        };
        Self {
            needle,
            case_sensitive,
        }
    }

    fn matches(&self, name: &str) -> bool {
        if self.case_sensitive {
            name.contains(&self.needle)
        } else {
            name.to_lowercase().contains(&self.needle)
        }
    }
}

/// Collect the descendants of `root` whose name contains `term`, sorted
/// biggest-first. The root itself is never a match.
///
/// Cancellation is checked at every dequeue and while waiting on a directory
/// read; population already committed to the tree is left in place.
pub fn search(
    root: &Arc<Node>,
    term: &str,
    options: &SearchOptions,
    cancel: &CancelToken,
) -> SearchOutcome {
    let matcher = Matcher::new(term, options.case_sensitive);
    let parallel = root.context().options().parallel_search;

    let mut queue = VecDeque::from([Arc::clone(root)]);
    let mut loading: VecDeque<Arc<Node>> = VecDeque::new();
    let mut found = Vec::new();
    let mut visited = 0usize;

    loop {
        let node = match queue.pop_front() {
            Some(node) => node,
            None => match loading.pop_front() {
                Some(directory) => {
                    if !await_population(&directory, cancel) {
                        return cancelled(term, visited);
                    }
                    enqueue_children(&directory, &mut queue);
                    continue;
                }
                None => break,
            },
        };

        if cancel.is_cancelled() {
            return cancelled(term, visited);
        }
        visited += 1;

        let eligible = !node.is_directory() || options.include_directories;
        if eligible && !Arc::ptr_eq(&node, root) && matcher.matches(node.name()) {
            found.push(Arc::clone(&node));
        }

        if !node.is_directory() {
            continue;
        }
        if node.is_populated() {
            enqueue_children(&node, &mut queue);
        } else if parallel {
            node.ensure_populated();
            loading.push_back(node);
        } else {
            if !populate_in_place(&node, cancel) {
                return cancelled(term, visited);
            }
            enqueue_children(&node, &mut queue);
        }
    }

    found.sort_by_cached_key(|node| size_key(node.size()));
    debug!(term, visited, matches = found.len(), "Search completed");
    SearchOutcome::Completed(found)
}

fn enqueue_children(directory: &Node, queue: &mut VecDeque<Arc<Node>>) {
    if let Some(children) = directory.children() {
        queue.extend(children.snapshot());
    }
}

fn await_population(directory: &Node, cancel: &CancelToken) -> bool {
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        if directory.wait_populated(POPULATION_POLL) {
            return true;
        }
    }
}

/// Read `directory` on this thread, or wait for a read already in flight.
fn populate_in_place(directory: &Node, cancel: &CancelToken) -> bool {
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        if directory.populate_blocking(POPULATION_POLL) {
            return true;
        }
    }
}

fn cancelled(term: &str, visited: usize) -> SearchOutcome {
    debug!(term, visited, "Search cancelled");
    SearchOutcome::Cancelled
}
