use crate::cancel::CancelToken;
use crate::collection::ObservableList;
use crate::config::{SearchOptions, TreeOptions};
use crate::context::TreeContext;
use crate::entry::EntryDescriptor;
use crate::error::{Result, TreeError};
use crate::node::Node;
use crate::notify::{Observers, SubscriptionId};
use crate::search::{search, SearchOutcome};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// What the consumer should currently display.
#[derive(Clone)]
pub enum View {
    /// The directory tree itself, sorted and measured live.
    Tree(Arc<Node>),
    /// A search was started; results are not ready yet.
    Searching { root: Arc<Node>, term: String },
    /// Finished search results, biggest first.
    Results {
        root: Arc<Node>,
        term: String,
        results: Arc<ObservableList<Arc<Node>>>,
    },
}

impl View {
    pub fn root(&self) -> &Arc<Node> {
        match self {
            View::Tree(root) => root,
            View::Searching { root, .. } | View::Results { root, .. } => root,
        }
    }
}

/// Published each time a view becomes current.
#[derive(Clone)]
pub struct ViewEvent {
    pub generation: u64,
    pub view: View,
}

/// Returned by [`ViewCoordinator::refresh`]; identifies one refresh.
#[derive(Debug, Clone)]
pub struct ViewTicket {
    pub generation: u64,
    pub cancel: CancelToken,
}

struct Active {
    generation: u64,
    cancel: CancelToken,
    view: Option<View>,
}

pub struct ViewCoordinator {
    options: TreeOptions,
    /// Shared by every tree this coordinator builds.
    pool: Arc<ThreadPool>,
    search_options: SearchOptions,
    active: Mutex<Active>,
    observers: Observers<ViewEvent>,
}

impl ViewCoordinator {
    pub fn new(options: TreeOptions, search_options: SearchOptions) -> Result<Arc<Self>> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(options.threads.max(1))
            .thread_name(|i| format!("treesize-worker-{i}"))
            .build()?;
        Ok(Arc::new(Self {
            options,
            pool: Arc::new(pool),
            search_options,
            active: Mutex::new(Active {
                generation: 0,
                cancel: CancelToken::new(),
                view: None,
            }),
            observers: Observers::new(),
        }))
    }

    /// Start a new view over `root_path`, cancelling the previous one.
    ///
    /// Without a search term (or with an empty one) the new tree is published
    /// immediately. With a term, `Searching` is published now and the results
    /// follow from a background thread unless a newer refresh supersedes them.
    pub fn refresh<P: AsRef<Path>>(
        self: &Arc<Self>,
        root_path: P,
        search_term: Option<&str>,
    ) -> Result<ViewTicket> {
        let root_path = root_path.as_ref();
        let descriptor = EntryDescriptor::from_path(root_path)?;
        if !descriptor.is_directory {
            return Err(TreeError::NotADirectory(root_path.to_path_buf()));
        }

        let cancel = CancelToken::new();
        let generation = {
            let mut active = self.active.lock();
            active.cancel.cancel();
            active.generation += 1;
            active.cancel = cancel.clone();
            active.generation
        };

        let ctx = TreeContext::with_pool(Arc::clone(&self.pool), self.options, cancel.clone());
        let root = Node::new_root(descriptor, ctx);
        let term = search_term.map(str::trim).filter(|term| !term.is_empty());
        info!(path = %root_path.display(), generation, search = term.unwrap_or(""), "Refreshing view");

        match term {
            None => self.publish(generation, View::Tree(root)),
            Some(term) => {
                let term = term.to_string();
                self.publish(
                    generation,
                    View::Searching {
                        root: Arc::clone(&root),
                        term: term.clone(),
                    },
                );
                self.spawn_search(generation, root, term, cancel.clone());
            }
        }

        Ok(ViewTicket { generation, cancel })
    }

    fn spawn_search(self: &Arc<Self>, generation: u64, root: Arc<Node>, term: String, cancel: CancelToken) {
        let coordinator = Arc::downgrade(self);
        let options = self.search_options;
        let spawned = thread::Builder::new()
            .name("treesize-search".into())
            .spawn(move || {
                let outcome = search(&root, &term, &options, &cancel);
                let Some(coordinator) = coordinator.upgrade() else {
                    return;
                };
                match outcome {
                    SearchOutcome::Completed(found) => {
                        let results = Arc::new(ObservableList::new());
                        results.add_range(found, Some(&cancel));
                        coordinator.publish(generation, View::Results { root, term, results });
                    }
                    SearchOutcome::Cancelled => {
                        debug!(generation, term = %term, "Search superseded");
                    }
                }
            });
        if let Err(err) = spawned {
            warn!(error = %err, "Failed to start search thread");
        }
    }

    /// Make `view` current if `generation` is still the latest refresh.
    ///
    /// Events are emitted under the coordinator lock so subscribers see views
    /// in the order they became current; handlers must not call back into
    /// the coordinator.
    fn publish(&self, generation: u64, view: View) {
        let mut active = self.active.lock();
        if active.generation != generation || active.cancel.is_cancelled() {
            debug!(generation, current = active.generation, "Dropping stale view");
            return;
        }
        active.view = Some(view.clone());
        self.observers.emit(&ViewEvent { generation, view });
    }

    /// Cancel the current refresh without starting another.
    pub fn cancel_current(&self) {
        self.active.lock().cancel.cancel();
    }

    pub fn current(&self) -> Option<View> {
        self.active.lock().view.clone()
    }

    pub fn generation(&self) -> u64 {
        self.active.lock().generation
    }

    pub fn subscribe_channel(&self) -> (SubscriptionId, Receiver<ViewEvent>) {
        self.observers.subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }
}
