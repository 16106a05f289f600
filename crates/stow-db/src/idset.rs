//! Lazily loaded set of committed item ids.
//!
//! The set is seeded once from a load function (in practice: the adapter's
//! file listing) the first time any method needs it, then mutated in memory.
//! Concurrent first accesses share one load. A failed load leaves the set
//! unloaded so a later call can retry.
//!
//! Ids keep insertion order. Iteration walks the live set one element at a
//! time, so removing an element that has not been reached yet means it is
//! never visited, and removing one already visited is harmless.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::ops::Bound;
use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::FutureExt;
use stow_types::ItemId;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::DbResult;

type Loader = Box<dyn Fn() -> BoxFuture<'static, DbResult<Vec<ItemId>>> + Send + Sync>;

/// Insertion-ordered ids. Each id gets a monotonically increasing position,
/// which is what iteration cursors point at.
#[derive(Default)]
struct OrderedIds {
    next_position: u64,
    by_position: BTreeMap<u64, ItemId>,
    positions: HashMap<ItemId, u64>,
}

impl OrderedIds {
    fn insert(&mut self, id: ItemId) {
        if self.positions.contains_key(&id) {
            return;
        }
        let position = self.next_position;
        self.next_position += 1;
        self.positions.insert(id.clone(), position);
        self.by_position.insert(position, id);
    }

    fn remove(&mut self, id: &str) -> bool {
        match self.positions.remove(id) {
            Some(position) => {
                self.by_position.remove(&position);
                true
            }
            None => false,
        }
    }

    fn after(&self, cursor: Option<u64>) -> Option<(u64, ItemId)> {
        let lower = match cursor {
            Some(position) => Bound::Excluded(position),
            None => Bound::Unbounded,
        };
        self.by_position
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(position, id)| (*position, id.clone()))
    }
}

impl FromIterator<ItemId> for OrderedIds {
    fn from_iter<T: IntoIterator<Item = ItemId>>(iter: T) -> Self {
        let mut ids = Self::default();
        for id in iter {
            ids.insert(id);
        }
        ids
    }
}

/// A set of item ids that is loaded on first use.
pub struct IdSet {
    loader: Loader,
    ids: OnceCell<Mutex<OrderedIds>>,
}

impl IdSet {
    /// Create an unloaded set. `loader` runs at most once successfully, on
    /// the first call to any other method.
    pub fn new<F, Fut>(loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DbResult<Vec<ItemId>>> + Send + 'static,
    {
        Self {
            loader: Box::new(move || loader().boxed()),
            ids: OnceCell::new(),
        }
    }

    /// Returns `true` once the initial load has completed.
    pub fn is_loaded(&self) -> bool {
        self.ids.initialized()
    }

    async fn backing(&self) -> DbResult<&Mutex<OrderedIds>> {
        self.ids
            .get_or_try_init(|| async {
                let ids = (self.loader)().await?;
                debug!(count = ids.len(), "loaded id set");
                Ok(Mutex::new(ids.into_iter().collect()))
            })
            .await
    }

    /// Add an id. Adding an id that is already present keeps its position.
    pub async fn add(&self, id: ItemId) -> DbResult<()> {
        let ids = self.backing().await?;
        ids.lock().expect("lock poisoned").insert(id);
        Ok(())
    }

    /// Remove an id. Removing an absent id is not an error.
    pub async fn remove(&self, id: &str) -> DbResult<()> {
        let ids = self.backing().await?;
        ids.lock().expect("lock poisoned").remove(id);
        Ok(())
    }

    /// Whether `id` is in the set.
    pub async fn includes(&self, id: &str) -> DbResult<bool> {
        let ids = self.backing().await?;
        let contains = ids.lock().expect("lock poisoned").positions.contains_key(id);
        Ok(contains)
    }

    /// Number of ids in the set.
    pub async fn len(&self) -> DbResult<usize> {
        let ids = self.backing().await?;
        let len = ids.lock().expect("lock poisoned").positions.len();
        Ok(len)
    }

    /// A cursor over the live set, in insertion order.
    pub fn cursor(&self) -> IdCursor<'_> {
        IdCursor {
            set: self,
            position: None,
        }
    }

    /// Visit every id sequentially. The next id is not fetched until the
    /// future returned by `callback` has completed; an error from the
    /// callback stops the iteration and is returned.
    pub async fn each<F, Fut>(&self, mut callback: F) -> DbResult<()>
    where
        F: FnMut(ItemId) -> Fut,
        Fut: Future<Output = DbResult<()>>,
    {
        let mut cursor = self.cursor();
        while let Some(id) = cursor.next().await? {
            callback(id).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for IdSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .ids
            .get()
            .map(|ids| ids.lock().expect("lock poisoned").positions.len());
        f.debug_struct("IdSet")
            .field("loaded", &self.is_loaded())
            .field("count", &count)
            .finish()
    }
}

/// Position in an [`IdSet`] iteration.
///
/// The cursor remembers the last position it returned, not a snapshot of the
/// set, so it observes removals made between calls to [`next`](Self::next).
pub struct IdCursor<'a> {
    set: &'a IdSet,
    position: Option<u64>,
}

impl IdCursor<'_> {
    /// The next id after the last one returned, if any.
    pub async fn next(&mut self) -> DbResult<Option<ItemId>> {
        let ids = self.set.backing().await?;
        let next = ids.lock().expect("lock poisoned").after(self.position);
        Ok(next.map(|(position, id)| {
            self.position = Some(position);
            id
        }))
    }
}
