//! Options for walking, tree construction and search.

use serde::{Deserialize, Serialize};

/// How a walk distributes directory reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parallelism {
    /// Read directories on the consuming thread.
    Serial,
    /// Read directories on a dedicated pool with this many threads.
    Pool(usize),
}

/// Worker count used when none is configured: twice the cores, clamped.
pub fn default_threads() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    (cores * 2).clamp(4, 64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkOptions {
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Skip entries whose read fails instead of yielding the error.
    pub ignore_inaccessible: bool,
    pub parallelism: Parallelism,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            ignore_inaccessible: true,
            parallelism: Parallelism::Serial,
        }
    }
}

/// When a directory node reads its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PopulationMode {
    /// As soon as the node is constructed. The whole subtree is measured.
    #[default]
    Eager,
    /// On the first explicit `ensure_populated` (expansion, search visit).
    Lazy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeOptions {
    pub population: PopulationMode,
    pub ignore_inaccessible: bool,
    /// Let search keep traversing while unexplored directories populate.
    pub parallel_search: bool,
    /// Worker threads shared by every node of one tree.
    pub threads: usize,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            population: PopulationMode::Eager,
            ignore_inaccessible: true,
            parallel_search: true,
            threads: default_threads(),
        }
    }
}

impl TreeOptions {
    /// Options used for the single-level directory read behind each node.
    pub fn child_walk(&self) -> WalkOptions {
        WalkOptions {
            recursive: false,
            ignore_inaccessible: self.ignore_inaccessible,
            parallelism: Parallelism::Serial,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    /// Directories whose name matches are reported alongside files.
    pub include_directories: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            include_directories: false,
        }
    }
}
