//! treesize - live, size-sorted view of a filesystem subtree
//!
//! A directory tree is built while it is still being walked: every node
//! measures itself in the background, directories sum their children as they
//! finish, and every child list stays sorted biggest-first as sizes arrive.
//!
//! # Architecture
//!
//! ```text
//!  walker ──► EntryDescriptor ──► Node ──owns──► ChildSet ──owns──► Node ...
//!                                  ▲                │
//!                                  └── weak ────────┘  size change: resort
//!                                                      + recompute parent
//! ```
//!
//! - [`walker`]: lazy, optionally parallel enumeration (jwalk)
//! - [`node`]: size aggregation state machine, one-shot population
//! - [`collection`]: lock-guarded list with ordered change events
//! - [`children`]: biggest-first child list, resorted through a
//!   [`scheduler::CoalescingScheduler`]
//! - [`search`]: cancellable breadth-first name search
//! - [`view`]: current root / search results for a consumer

pub mod cancel;
pub mod children;
pub mod cli;
pub mod collection;
pub mod config;
pub mod context;
pub mod entry;
pub mod error;
pub mod format;
pub mod node;
pub mod notify;
pub mod scheduler;
pub mod search;
pub mod view;
pub mod walker;

pub use cancel::CancelToken;
pub use children::{compare_sizes, ChildSet};
pub use collection::{CollectionChange, ObservableList};
pub use config::{Parallelism, PopulationMode, SearchOptions, TreeOptions, WalkOptions};
pub use context::TreeContext;
pub use entry::EntryDescriptor;
pub use error::{Result, TreeError};
pub use format::format_bytes;
pub use node::{Node, NodeId, SizeChange, SizeState};
pub use scheduler::CoalescingScheduler;
pub use search::{search, SearchOutcome};
pub use view::{View, ViewCoordinator, ViewEvent, ViewTicket};
