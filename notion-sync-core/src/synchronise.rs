//! High-level pipeline: mirrors one collection into a directory of markdown files.
//!
//! [`CollectionSync`] keeps one [`RowSync`] per row id it has seen. Each
//! [`CollectionSync::reconcile_all`] pulls a full snapshot from the [`Source`], diffs the
//! snapshot's ids against the tracked ones, disposes units whose rows vanished, creates
//! units for new rows and then reconciles every tracked unit.
//!
//! # Ordering
//! Rows link to each other, and a link is only emitted when the target row is tracked
//! and published. So all additions are inserted, and all statuses refreshed, before any
//! row renders: link resolution always sees the post-diff row set.
//!
//! # Error Handling
//! A failed snapshot or file operation ends the cycle with a [`SyncError`]. Units stay
//! tracked with their last successful state, so the next cycle retries them.

use chrono::{Local, NaiveDate};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::contract::{
    ChangeNotice, RenderContext, Source, SubscriptionHandle, SubscriptionTarget,
};
use crate::error::{Result, SyncError};
use crate::model::{Row, RowId};
use crate::render::MarkdownRenderer;
use crate::row_sync::{RowOutcome, RowSync};
use crate::slug::slug_for;
use crate::status::is_published;

pub const DEFAULT_LINK_PREFIX: &str = "/posts/";

/// Summary of one reconciliation cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SynchroniseReport {
    pub added: Vec<RowId>,
    pub removed: Vec<RowId>,
    pub written: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
    pub unchanged: usize,
}

impl SynchroniseReport {
    /// True when the cycle touched neither the tracked set nor the filesystem.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.written.is_empty()
            && self.deleted.is_empty()
    }
}

/// Link resolution against the rows of the tracked collection.
///
/// Holds the latest snapshot of every tracked row, so that a reference embedded in one
/// page is judged by the referenced row's current status, not by a stale copy.
pub struct CollectionContext {
    collection_id: String,
    link_prefix: String,
    rows: HashMap<RowId, Row>,
    today: NaiveDate,
}

impl CollectionContext {
    pub fn new(collection_id: impl Into<String>, link_prefix: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            link_prefix: link_prefix.into(),
            rows: HashMap::new(),
            today: Local::now().date_naive(),
        }
    }
}

impl RenderContext for CollectionContext {
    fn contains_row(&self, row: &Row) -> bool {
        // Rows of nested collections are not direct children, even when published.
        if row.collection_id != self.collection_id {
            return false;
        }
        self.rows
            .get(&row.id)
            .is_some_and(|tracked| is_published(tracked, self.today))
    }

    fn link_for(&self, row: &Row) -> String {
        let row = self.rows.get(&row.id).unwrap_or(row);
        format!("{}{}", self.link_prefix, slug_for(row))
    }
}

enum Mode {
    OneShot,
    Watch {
        notices: mpsc::Sender<ChangeNotice>,
        collection: SubscriptionHandle,
    },
}

pub struct CollectionSync<S: Source> {
    source: S,
    collection_id: String,
    destination: PathBuf,
    context: CollectionContext,
    known: BTreeMap<RowId, RowSync>,
    mode: Mode,
}

impl<S: Source> CollectionSync<S> {
    pub fn new(source: S, collection_id: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self::with_link_prefix(source, collection_id, destination, DEFAULT_LINK_PREFIX)
    }

    pub fn with_link_prefix(
        source: S,
        collection_id: impl Into<String>,
        destination: impl Into<PathBuf>,
        link_prefix: impl Into<String>,
    ) -> Self {
        let collection_id = collection_id.into();
        Self {
            source,
            context: CollectionContext::new(collection_id.clone(), link_prefix),
            collection_id,
            destination: destination.into(),
            known: BTreeMap::new(),
            mode: Mode::OneShot,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn is_watching(&self) -> bool {
        matches!(self.mode, Mode::Watch { .. })
    }

    /// Ids of the rows currently tracked.
    pub fn known_ids(&self) -> impl Iterator<Item = &RowId> {
        self.known.keys()
    }

    /// The file currently owned by a tracked row.
    pub fn file_for(&self, id: &RowId) -> Option<&Path> {
        self.known.get(id).and_then(RowSync::filename)
    }

    /// Create the destination directory, first removing it and its contents when `clean` is set.
    pub fn prepare_destination(&self, clean: bool) -> Result<()> {
        let path = &self.destination;
        if clean {
            match std::fs::remove_dir_all(path) {
                Ok(()) => info!(path = %path.display(), "Removed destination for a clean sync"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(SyncError::Destination {
                        path: path.clone(),
                        source: e,
                    })
                }
            }
        }
        std::fs::create_dir_all(path).map_err(|e| SyncError::Destination {
            path: path.clone(),
            source: e,
        })
    }

    /// Switch to watch mode: subscribe to the collection now, and to each row as it is
    /// reconciled. Rows already tracked are subscribed immediately.
    pub fn start_watching(&mut self, notices: mpsc::Sender<ChangeNotice>) {
        if self.is_watching() {
            return;
        }
        let collection = self.source.subscribe(
            SubscriptionTarget::Collection(self.collection_id.clone()),
            notices.clone(),
        );
        for (id, unit) in self.known.iter_mut() {
            let handle = self
                .source
                .subscribe(SubscriptionTarget::Row(id.clone()), notices.clone());
            unit.set_subscription(handle);
        }
        info!(collection_id = %self.collection_id, rows = self.known.len(), "Watching collection");
        self.mode = Mode::Watch {
            notices,
            collection,
        };
    }

    /// Unregister every subscription and forget all tracked rows. Files are left in place.
    pub fn stop_watching(&mut self) {
        if let Mode::Watch { collection, .. } = std::mem::replace(&mut self.mode, Mode::OneShot) {
            self.source.unsubscribe(collection);
        }
        for unit in self.known.values_mut() {
            if let Some(handle) = unit.take_subscription() {
                self.source.unsubscribe(handle);
            }
        }
        self.known.clear();
        self.context.rows.clear();
        info!(collection_id = %self.collection_id, "Stopped watching collection");
    }

    /// One reconciliation cycle. See the module docs for the ordering guarantees.
    pub async fn reconcile_all(&mut self) -> Result<SynchroniseReport> {
        info!(collection_id = %self.collection_id, "[SYNC] Pulling collection snapshot");
        let rows = self
            .source
            .get_rows(&self.collection_id)
            .await
            .map_err(|e| {
                error!(collection_id = %self.collection_id, error = %e, "[SYNC][ERROR] Snapshot pull failed");
                SyncError::Source(e)
            })?;

        let mut snapshot: BTreeMap<RowId, Row> = BTreeMap::new();
        for row in rows {
            if let Some(previous) = snapshot.insert(row.id.clone(), row) {
                warn!(row_id = %previous.id, "Duplicate row id in snapshot, keeping the last one");
            }
        }

        let current_ids: BTreeSet<RowId> = snapshot.keys().cloned().collect();
        let previous_ids: BTreeSet<RowId> = self.known.keys().cloned().collect();
        let added: Vec<RowId> = current_ids.difference(&previous_ids).cloned().collect();
        let removed: Vec<RowId> = previous_ids.difference(&current_ids).cloned().collect();
        debug!(added = ?added, removed = ?removed, "[SYNC] Diffed snapshot against tracked rows");

        let mut report = SynchroniseReport {
            added: added.clone(),
            removed: removed.clone(),
            ..Default::default()
        };

        for id in &removed {
            if let Some(unit) = self.known.get_mut(id) {
                info!(row_id = %id, file = ?unit.filename(), "[SYNC] Row left the collection, removing");
                if let Some(path) = unit.dispose(&self.source)? {
                    report.deleted.push(path);
                }
            }
            self.known.remove(id);
            self.context.rows.remove(id);
        }

        for (id, row) in snapshot {
            match self.known.get_mut(&id) {
                Some(unit) => unit.refresh(row),
                None => {
                    info!(row_id = %id, slug = %slug_for(&row), "[SYNC] Tracking new row");
                    self.known.insert(id, RowSync::new(&self.destination, row));
                }
            }
        }

        if let Mode::Watch { notices, .. } = &self.mode {
            for id in &added {
                if let Some(unit) = self.known.get_mut(id) {
                    let handle = self
                        .source
                        .subscribe(SubscriptionTarget::Row(id.clone()), notices.clone());
                    unit.set_subscription(handle);
                }
            }
        }

        // Statuses first, so every link below is judged against fresh data.
        let today = Local::now().date_naive();
        self.context.today = today;
        for (id, unit) in self.known.iter_mut() {
            unit.update_status(&self.source, today).await;
            self.context.rows.insert(id.clone(), unit.row().clone());
        }

        let renderer = MarkdownRenderer::new(&self.context);
        for unit in self.known.values_mut() {
            let result = unit.sync_file(&renderer, today)?;
            report.deleted.extend(result.renamed_from);
            match result.outcome {
                RowOutcome::Written(path) => report.written.push(path),
                RowOutcome::Removed(path) => report.deleted.push(path),
                RowOutcome::Unchanged(_) => report.unchanged += 1,
                RowOutcome::Absent => {}
            }
        }

        info!(
            added = report.added.len(),
            removed = report.removed.len(),
            written = report.written.len(),
            deleted = report.deleted.len(),
            unchanged = report.unchanged,
            "[SYNC] Reconciliation complete"
        );
        Ok(report)
    }
}
