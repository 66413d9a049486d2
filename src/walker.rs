use crate::config::{Parallelism, WalkOptions};
use crate::entry::EntryDescriptor;
use crate::error::{Result, TreeError};
use std::path::Path;
use tracing::debug;

type DirEntry = jwalk::DirEntry<((), ())>;

/// Lazy sequence of entries below a root, produced as directory reads complete.
///
/// The root itself is never yielded. In pool mode the order across entries is
/// unspecified; sort after collecting if order matters.
pub struct Walk {
    inner: Box<dyn Iterator<Item = jwalk::Result<DirEntry>>>,
    ignore_inaccessible: bool,
    skipped: u64,
}

/// Enumerate the entries under `root`.
pub fn enumerate<P: AsRef<Path>>(root: P, options: &WalkOptions) -> Walk {
    let parallelism = match options.parallelism {
        Parallelism::Serial => jwalk::Parallelism::Serial,
        Parallelism::Pool(threads) => jwalk::Parallelism::RayonNewPool(threads.max(1)),
    };

    let walker = jwalk::WalkDir::new(root.as_ref())
        .skip_hidden(false)
        .follow_links(false)
        .sort(false)
        .min_depth(1)
        .max_depth(if options.recursive { usize::MAX } else { 1 })
        .parallelism(parallelism)
        .into_iter();

    Walk {
        inner: Box::new(walker),
        ignore_inaccessible: options.ignore_inaccessible,
        skipped: 0,
    }
}

impl Walk {
    /// Entries dropped so far because they could not be read.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl Iterator for Walk {
    type Item = Result<EntryDescriptor>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let result = self
                .inner
                .next()?
                .map_err(TreeError::from)
                .and_then(describe);

            match result {
                Ok(entry) => return Some(Ok(entry)),
                Err(err) if self.ignore_inaccessible && err.is_inaccessible() => {
                    self.skipped += 1;
                    debug!(error = %err, "Skipping inaccessible entry");
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

fn describe(entry: DirEntry) -> Result<EntryDescriptor> {
    let path = entry.path();
    let metadata = entry.metadata()?;
    Ok(EntryDescriptor::from_metadata(path, &metadata))
}
