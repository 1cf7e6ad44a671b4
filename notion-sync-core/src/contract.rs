//! # contract: the seams between the engine and the outside world
//!
//! - [`Source`] is the remote collection the engine mirrors. The real implementation
//!   talks to Notion over HTTP; tests use the generated [`MockSource`].
//! - [`RenderContext`] answers the two questions the markdown renderer cannot answer
//!   by itself: whether a referenced row is in scope, and where it links to.
//!
//! The `Source` trait is annotated for `mockall` so consumers can generate deterministic
//! mocks for unit and integration tests (exported under the default `test-export-mocks` feature).

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::model::{PropertyValue, Row, RowId};

/// Error type for the Source trait (simple boxed error, as transport errors vary by client).
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// What a change subscription is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionTarget {
    Collection(String),
    Row(RowId),
}

/// Opaque token returned by [`Source::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub Uuid);

impl SubscriptionHandle {
    pub fn new() -> Self {
        SubscriptionHandle(Uuid::new_v4())
    }
}

impl Default for SubscriptionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Signal that something under `target` changed. Carries no payload; the engine re-pulls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice {
    pub target: SubscriptionTarget,
}

/// The remote document collection being mirrored.
///
/// Implementors must return full snapshots from [`Source::get_rows`]: every row of the
/// collection with its schema, property values and page content.
///
/// Notifications are delivered with `try_send` on the bounded sender given to
/// [`Source::subscribe`]; a full channel means a reconcile is already queued, so the notice
/// may be dropped.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Source: Send + Sync {
    /// Pull a full snapshot of the rows of a collection.
    async fn get_rows(&self, collection_id: &str) -> Result<Vec<Row>, SourceError>;

    /// Write a single property value back onto a row.
    async fn set_property(
        &self,
        row_id: &RowId,
        property_id: &str,
        value: PropertyValue,
    ) -> Result<(), SourceError>;

    /// Register for change notifications on a collection or row.
    fn subscribe(
        &self,
        target: SubscriptionTarget,
        notices: mpsc::Sender<ChangeNotice>,
    ) -> SubscriptionHandle;

    /// Drop a registration made by [`Source::subscribe`]. Unknown handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}

/// Capabilities the markdown renderer needs to turn row references into links.
pub trait RenderContext {
    /// True iff `row` is a direct, currently published row of the tracked collection.
    fn contains_row(&self, row: &Row) -> bool;

    /// Public link target for a row.
    fn link_for(&self, row: &Row) -> String;
}
