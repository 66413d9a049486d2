use crate::children::ChildSet;
use crate::config::PopulationMode;
use crate::context::TreeContext;
use crate::entry::EntryDescriptor;
use crate::error::Result;
use crate::format::format_bytes;
use crate::notify::{Observers, SubscriptionId};
use crate::scheduler::CoalescingScheduler;
use crate::walker;
use chrono::{DateTime, Local};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique node identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

/// Size aggregation progress of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeState {
    /// Nothing measured yet.
    Pending,
    /// Directory children are being read or are not all final.
    Measuring,
    /// The published size is complete.
    Final,
}

/// Published on every change of a node's size value or finality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeChange {
    pub node: NodeId,
    pub previous: Option<u64>,
    pub current: Option<u64>,
    pub finalized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Population {
    NotStarted,
    InFlight,
    Done,
}

struct SizeCell {
    state: SizeState,
    value: Option<u64>,
}

pub struct Node {
    id: NodeId,
    descriptor: EntryDescriptor,
    ctx: Arc<TreeContext>,
    me: Weak<Node>,
    parent: Weak<Node>,
    children: Option<ChildSet>,
    size: Mutex<SizeCell>,
    size_settled: Condvar,
    population: Mutex<Population>,
    population_done: Condvar,
    aggregate: Option<CoalescingScheduler>,
    size_observers: Observers<SizeChange>,
    expanded: AtomicBool,
}

impl Node {
    /// Create the root of a tree and start measuring it.
    pub fn new_root(descriptor: EntryDescriptor, ctx: Arc<TreeContext>) -> Arc<Node> {
        let node = Self::build(descriptor, ctx, Weak::new());
        node.start();
        node
    }

    /// Create the root for the directory or file at `path`.
    pub fn from_path<P: AsRef<Path>>(path: P, ctx: Arc<TreeContext>) -> Result<Arc<Node>> {
        let descriptor = EntryDescriptor::from_path(path)?;
        Ok(Self::new_root(descriptor, ctx))
    }

    fn build(descriptor: EntryDescriptor, ctx: Arc<TreeContext>, parent: Weak<Node>) -> Arc<Node> {
        let is_directory = descriptor.is_directory;
        Arc::new_cyclic(|me| Node {
            id: NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)),
            children: is_directory.then(|| ChildSet::new(me.clone(), Arc::clone(ctx.pool()))),
            aggregate: is_directory.then(|| CoalescingScheduler::new(Arc::clone(ctx.pool()))),
            descriptor,
            ctx,
            me: me.clone(),
            parent,
            size: Mutex::new(SizeCell {
                state: SizeState::Pending,
                value: None,
            }),
            size_settled: Condvar::new(),
            population: Mutex::new(Population::NotStarted),
            population_done: Condvar::new(),
            size_observers: Observers::new(),
            expanded: AtomicBool::new(false),
        })
    }

    /// Launch the node's own measurement: files read their length, eager
    /// directories start reading their children.
    fn start(self: &Arc<Self>) {
        if self.is_directory() {
            if self.ctx.options().population == PopulationMode::Eager {
                self.ensure_populated();
            }
            return;
        }

        let weak = Arc::downgrade(self);
        self.ctx.pool().spawn(move || {
            if let Some(node) = weak.upgrade() {
                node.measure_file();
            }
        });
    }

    fn measure_file(&self) {
        let length = match self.descriptor.size_bytes {
            Some(length) => Some(length),
            None => match std::fs::symlink_metadata(&self.descriptor.full_path) {
                Ok(metadata) => Some(metadata.len()),
                Err(err) => {
                    debug!(path = %self.descriptor.full_path.display(), error = %err, "File length unavailable");
                    None
                }
            },
        };
        self.publish(SizeState::Final, length);
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn descriptor(&self) -> &EntryDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn full_path(&self) -> &Path {
        &self.descriptor.full_path
    }

    pub fn is_directory(&self) -> bool {
        self.descriptor.is_directory
    }

    pub fn last_write_time(&self) -> SystemTime {
        self.descriptor.last_write_time
    }

    pub fn last_write_time_string(&self) -> String {
        DateTime::<Local>::from(self.descriptor.last_write_time)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }

    pub fn parent(&self) -> Option<Arc<Node>> {
        self.parent.upgrade()
    }

    pub fn context(&self) -> &Arc<TreeContext> {
        &self.ctx
    }

    /// Child collection; `None` for files.
    pub fn children(&self) -> Option<&ChildSet> {
        self.children.as_ref()
    }

    /// Best known size. `None` until a first value has been published.
    pub fn size(&self) -> Option<u64> {
        self.size.lock().value
    }

    /// The size only while it is final: `None` while pending or measuring.
    pub fn final_size(&self) -> Option<u64> {
        match self.size_snapshot() {
            (SizeState::Final, value) => value,
            _ => None,
        }
    }

    pub fn size_state(&self) -> SizeState {
        self.size.lock().state
    }

    pub fn is_size_final(&self) -> bool {
        self.size_state() == SizeState::Final
    }

    fn size_snapshot(&self) -> (SizeState, Option<u64>) {
        let cell = self.size.lock();
        (cell.state, cell.value)
    }

    pub fn size_string(&self) -> String {
        match self.size_snapshot() {
            (_, Some(bytes)) => format_bytes(bytes),
            (SizeState::Final, None) => "Unavailable".to_string(),
            (_, None) => "Calculating…".to_string(),
        }
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded.load(Ordering::Relaxed)
    }

    /// Expanding a directory populates it if that has not happened yet.
    pub fn set_expanded(&self, expanded: bool) {
        self.expanded.store(expanded, Ordering::Relaxed);
        if expanded {
            self.ensure_populated();
        }
    }

    pub fn subscribe_size<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&SizeChange) + Send + Sync + 'static,
    {
        self.size_observers.subscribe(handler)
    }

    pub fn unsubscribe_size(&self, id: SubscriptionId) -> bool {
        self.size_observers.unsubscribe(id)
    }

    pub fn size_subscriber_count(&self) -> usize {
        self.size_observers.len()
    }

    /// Block until the size is final. Returns false on timeout.
    pub fn wait_final(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cell = self.size.lock();
        while cell.state != SizeState::Final {
            if self.size_settled.wait_until(&mut cell, deadline).timed_out() {
                return cell.state == SizeState::Final;
            }
        }
        true
    }

    pub fn is_populated(&self) -> bool {
        match self.children {
            Some(_) => *self.population.lock() == Population::Done,
            None => true,
        }
    }

    /// Block until the children have been read. Files are always populated.
    ///
    /// Does not start population; call [`Node::ensure_populated`] first.
    pub fn wait_populated(&self, timeout: Duration) -> bool {
        if self.children.is_none() {
            return true;
        }
        let deadline = Instant::now() + timeout;
        let mut population = self.population.lock();
        while *population != Population::Done {
            if self
                .population_done
                .wait_until(&mut population, deadline)
                .timed_out()
            {
                return *population == Population::Done;
            }
        }
        true
    }

    /// Start reading the children on the pool, once.
    ///
    /// Safe to call from any thread any number of times; only the first call
    /// starts a read and every caller observes that same read.
    pub fn ensure_populated(&self) {
        if !self.claim_population() {
            return;
        }
        let weak = self.me.clone();
        self.ctx.pool().spawn(move || {
            if let Some(node) = weak.upgrade() {
                node.populate_from_disk();
            }
        });
    }

    /// Populate on the calling thread if nobody has started yet, otherwise
    /// wait for the read in flight. Returns false on timeout.
    pub fn populate_blocking(&self, timeout: Duration) -> bool {
        if self.claim_population() {
            self.populate_from_disk();
            return true;
        }
        self.wait_populated(timeout)
    }

    /// Populate from an already enumerated listing instead of the filesystem.
    ///
    /// Returns false, ignoring `entries`, if population had already started.
    pub fn populate_from<I>(&self, entries: I) -> bool
    where
        I: IntoIterator<Item = Result<EntryDescriptor>>,
    {
        if !self.claim_population() {
            return false;
        }
        self.fill_children(entries);
        true
    }

    fn claim_population(&self) -> bool {
        if self.children.is_none() {
            return false;
        }
        {
            let mut population = self.population.lock();
            if *population != Population::NotStarted {
                return false;
            }
            *population = Population::InFlight;
        }
        let mut cell = self.size.lock();
        if cell.state == SizeState::Pending {
            cell.state = SizeState::Measuring;
        }
        true
    }

    fn populate_from_disk(&self) {
        let options = self.ctx.options().child_walk();
        let entries = walker::enumerate(&self.descriptor.full_path, &options);
        self.fill_children(entries);
    }

    fn fill_children<I>(&self, entries: I)
    where
        I: IntoIterator<Item = Result<EntryDescriptor>>,
    {
        let Some(children) = self.children.as_ref() else {
            return;
        };
        let path = &self.descriptor.full_path;
        let ignore_inaccessible = self.ctx.options().ignore_inaccessible;
        debug!(path = %path.display(), "Populating directory");

        for entry in entries {
            if self.ctx.is_cancelled() {
                debug!(path = %path.display(), "Population cancelled");
                break;
            }
            match entry {
                Ok(descriptor) => {
                    let child = Node::build(descriptor, Arc::clone(&self.ctx), self.me.clone());
                    children.add(Arc::clone(&child));
                    child.start();
                }
                Err(err) if ignore_inaccessible && err.is_inaccessible() => {
                    debug!(path = %path.display(), error = %err, "Skipping inaccessible child");
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Directory read failed, keeping entries read so far");
                    break;
                }
            }
        }

        {
            let mut population = self.population.lock();
            *population = Population::Done;
            self.population_done.notify_all();
        }
        debug!(path = %path.display(), children = children.len(), "Directory populated");
        self.request_recompute();
    }

    /// Ask for the aggregate to be recomputed. Never blocks the caller.
    pub(crate) fn request_recompute(&self) {
        let Some(aggregate) = self.aggregate.as_ref() else {
            return;
        };
        let weak = self.me.clone();
        aggregate.submit(move || {
            if let Some(node) = weak.upgrade() {
                node.recompute();
            }
        });
    }

    /// Sum the children if all of them are final; otherwise mark the
    /// directory as measuring and keep the last published value.
    fn recompute(&self) {
        let Some(children) = self.children.as_ref() else {
            return;
        };
        let populated = *self.population.lock() == Population::Done;

        let (total, all_final) = children.list().with_items(|items| {
            items.iter().fold((0u64, true), |(total, all_final), child| {
                let (state, value) = child.size_snapshot();
                (
                    total.saturating_add(value.unwrap_or(0)),
                    all_final && state == SizeState::Final,
                )
            })
        });

        if populated && all_final {
            self.publish(SizeState::Final, Some(total));
        } else {
            let value = self.size();
            self.publish(SizeState::Measuring, value);
        }
    }

    fn publish(&self, state: SizeState, value: Option<u64>) {
        let change = {
            let mut cell = self.size.lock();
            let previous = cell.value;
            let was_final = cell.state == SizeState::Final;
            cell.state = state;
            cell.value = value;
            self.size_settled.notify_all();

            let finalized = state == SizeState::Final;
            (previous != value || was_final != finalized).then_some(SizeChange {
                node: self.id,
                previous,
                current: value,
                finalized,
            })
        };

        if let Some(change) = change {
            self.size_observers.emit(&change);
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (state, value) = self.size_snapshot();
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("path", &self.descriptor.full_path)
            .field("is_directory", &self.descriptor.is_directory)
            .field("state", &state)
            .field("size", &value)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::config::{PopulationMode, TreeOptions};
    use crate::error::TreeError;
    use std::fs;
    use std::io;

    const WAIT: Duration = Duration::from_secs(10);

    fn context(population: PopulationMode) -> Arc<TreeContext> {
        let options = TreeOptions {
            population,
            threads: 4,
            ..TreeOptions::default()
        };
        TreeContext::new(options, CancelToken::new()).unwrap()
    }

    fn child_sizes(node: &Node) -> Vec<Option<u64>> {
        node.children()
            .unwrap()
            .snapshot()
            .iter()
            .map(|child| child.size())
            .collect()
    }

    #[test]
    fn test_file_node_finalizes_with_length() {
        let ctx = context(PopulationMode::Eager);
        let node = Node::new_root(EntryDescriptor::file("/virtual/a.bin", Some(512)), ctx);
        assert!(node.wait_final(WAIT));
        assert_eq!(node.size(), Some(512));
        assert_eq!(node.size_string(), "512B");
        assert!(node.children().is_none());
        assert!(node.is_populated());
    }

    #[test]
    fn test_unreadable_file_is_final_without_size() {
        let ctx = context(PopulationMode::Eager);
        let node = Node::new_root(EntryDescriptor::file("/no/such/file.bin", None), ctx);
        assert!(node.wait_final(WAIT));
        assert_eq!(node.size(), None);
        assert_eq!(node.size_string(), "Unavailable");
    }

    #[test]
    fn test_inaccessible_entry_is_skipped_and_sum_stabilizes() {
        let ctx = context(PopulationMode::Lazy);
        let root = Node::new_root(EntryDescriptor::directory("/virtual"), ctx);
        assert_eq!(root.size_state(), SizeState::Pending);
        assert_eq!(root.size_string(), "Calculating…");

        let denied = TreeError::io(
            "/virtual/locked",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(root.populate_from(vec![
            Ok(EntryDescriptor::file("/virtual/ten", Some(10))),
            Ok(EntryDescriptor::file("/virtual/twenty", Some(20))),
            Err(denied),
        ]));

        assert!(root.wait_final(WAIT));
        assert_eq!(root.size(), Some(30));
        assert!(root.children().unwrap().wait_sorted(WAIT));
        assert_eq!(child_sizes(&root), vec![Some(20), Some(10)]);
    }

    #[test]
    fn test_strict_read_stops_at_error_and_still_finalizes() {
        let options = TreeOptions {
            population: PopulationMode::Lazy,
            ignore_inaccessible: false,
            threads: 4,
            ..TreeOptions::default()
        };
        let ctx = TreeContext::new(options, CancelToken::new()).unwrap();
        let root = Node::new_root(EntryDescriptor::directory("/virtual"), ctx);

        let denied = TreeError::io(
            "/virtual/locked",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(root.populate_from(vec![
            Ok(EntryDescriptor::file("/virtual/ten", Some(10))),
            Err(denied),
            Ok(EntryDescriptor::file("/virtual/twenty", Some(20))),
        ]));

        assert!(root.wait_final(WAIT));
        assert_eq!(root.final_size(), Some(10));
        assert_eq!(root.children().unwrap().len(), 1);
    }

    #[test]
    fn test_populate_blocking_reads_on_caller_thread() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), vec![0u8; 3]).unwrap();
        fs::write(dir.path().join("b"), vec![0u8; 4]).unwrap();

        let root = Node::from_path(dir.path(), context(PopulationMode::Lazy)).unwrap();
        assert!(root.populate_blocking(WAIT));
        assert!(root.is_populated());
        assert_eq!(root.children().unwrap().len(), 2);

        assert!(root.populate_blocking(WAIT));
        assert_eq!(root.children().unwrap().len(), 2);
        assert!(root.wait_final(WAIT));
        assert_eq!(root.size(), Some(7));
    }

    #[test]
    fn test_failed_child_does_not_wedge_parent() {
        let ctx = context(PopulationMode::Lazy);
        let root = Node::new_root(EntryDescriptor::directory("/virtual"), ctx);
        root.populate_from(vec![
            Ok(EntryDescriptor::file("/virtual/ok", Some(7))),
            Ok(EntryDescriptor::file("/virtual/vanished", None)),
        ]);
        assert!(root.wait_final(WAIT));
        assert_eq!(root.size(), Some(7));
    }

    #[test]
    fn test_population_runs_once() {
        let ctx = context(PopulationMode::Lazy);
        let root = Node::new_root(EntryDescriptor::directory("/virtual"), ctx);
        assert!(root.populate_from(vec![Ok(EntryDescriptor::file("/virtual/a", Some(1)))]));
        assert!(!root.populate_from(vec![Ok(EntryDescriptor::file("/virtual/b", Some(2)))]));
        root.ensure_populated();
        assert_eq!(root.children().unwrap().len(), 1);
    }

    #[test]
    fn test_eager_directory_aggregates_recursively() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), vec![0u8; 100]).unwrap();
        fs::create_dir_all(dir.path().join("sub/inner")).unwrap();
        fs::write(dir.path().join("sub/b"), vec![0u8; 250]).unwrap();
        fs::write(dir.path().join("sub/inner/c"), vec![0u8; 50]).unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();

        let root = Node::from_path(dir.path(), context(PopulationMode::Eager)).unwrap();
        assert!(root.wait_final(WAIT));
        assert_eq!(root.size(), Some(400));

        let children = root.children().unwrap();
        assert!(children.wait_sorted(WAIT));
        let names: Vec<String> = children
            .snapshot()
            .iter()
            .map(|child| child.name().to_string())
            .collect();
        assert_eq!(names, vec!["sub", "a", "empty"]);

        let sub = children.snapshot()[0].clone();
        assert_eq!(sub.size(), Some(300));
        assert!(Arc::ptr_eq(&sub.parent().unwrap(), &root));
    }

    #[test]
    fn test_lazy_directory_waits_for_expansion() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), vec![0u8; 64]).unwrap();

        let root = Node::from_path(dir.path(), context(PopulationMode::Lazy)).unwrap();
        assert!(!root.is_populated());
        assert!(!root.wait_final(Duration::from_millis(50)));
        assert_eq!(root.final_size(), None);

        root.set_expanded(true);
        assert!(root.is_expanded());
        assert!(root.wait_populated(WAIT));
        assert!(root.wait_final(WAIT));
        assert_eq!(root.final_size(), Some(64));
    }

    #[test]
    fn test_child_added_after_final_recomputes() {
        let ctx = context(PopulationMode::Lazy);
        let root = Node::new_root(EntryDescriptor::directory("/virtual"), Arc::clone(&ctx));
        root.populate_from(vec![Ok(EntryDescriptor::file("/virtual/a", Some(5)))]);
        assert!(root.wait_final(WAIT));
        assert_eq!(root.size(), Some(5));

        let (_, changes) = {
            let (tx, rx) = crossbeam_channel::unbounded();
            let id = root.subscribe_size(move |change| {
                let _ = tx.send(*change);
            });
            (id, rx)
        };

        let late = Node::build(
            EntryDescriptor::file("/virtual/late", Some(6)),
            ctx,
            Arc::downgrade(&root),
        );
        root.children().unwrap().add(Arc::clone(&late));
        late.start();

        let deadline = Instant::now() + WAIT;
        while root.size() != Some(11) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(root.wait_final(WAIT));
        assert_eq!(root.size(), Some(11));

        let last = changes.try_iter().last().unwrap();
        assert_eq!(last.current, Some(11));
        assert!(last.finalized);
    }
}
