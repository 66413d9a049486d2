use crate::cancel::CancelToken;
use crate::config::TreeOptions;
use crate::error::Result;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;

/// State shared by every node of one tree: the worker pool, the options it
/// was built with and the cancellation token of the refresh that built it.
pub struct TreeContext {
    pool: Arc<ThreadPool>,
    options: TreeOptions,
    cancel: CancelToken,
}

impl TreeContext {
    pub fn new(options: TreeOptions, cancel: CancelToken) -> Result<Arc<Self>> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(options.threads.max(1))
            .thread_name(|i| format!("treesize-worker-{i}"))
            .build()?;
        Ok(Self::with_pool(Arc::new(pool), options, cancel))
    }

    /// Share an existing pool, e.g. across the trees of successive refreshes.
    pub fn with_pool(pool: Arc<ThreadPool>, options: TreeOptions, cancel: CancelToken) -> Arc<Self> {
        Arc::new(Self {
            pool,
            options,
            cancel,
        })
    }

    pub fn pool(&self) -> &Arc<ThreadPool> {
        &self.pool
    }

    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
