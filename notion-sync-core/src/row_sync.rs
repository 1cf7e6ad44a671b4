//! Per-row file ownership.
//!
//! A [`RowSync`] owns at most one file: the one named after its row's current slug.
//! Each [`RowSync::reconcile`] recomputes the row's status and file name, moves the
//! file when the name changed, and then either writes the rendered page or makes sure
//! no file is left behind.

use chrono::NaiveDate;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::contract::{RenderContext, Source, SubscriptionHandle};
use crate::error::{Result, SyncError};
use crate::model::Row;
use crate::render::MarkdownRenderer;
use crate::slug::file_path_for;
use crate::status::{apply_status, classify, is_published};

/// What a reconcile did to the row's file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// The file was (re)written.
    Written(PathBuf),
    /// The file already held the rendered content.
    Unchanged(PathBuf),
    /// The row is not published and its file was removed.
    Removed(PathBuf),
    /// The row is not published and had no file.
    Absent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowReconcile {
    pub outcome: RowOutcome,
    /// File removed because the slug changed.
    pub renamed_from: Option<PathBuf>,
}

pub struct RowSync {
    destination: PathBuf,
    row: Row,
    filename: Option<PathBuf>,
    last_written: Option<String>,
    subscription: Option<SubscriptionHandle>,
}

impl RowSync {
    pub fn new(destination: impl Into<PathBuf>, row: Row) -> Self {
        Self {
            destination: destination.into(),
            row,
            filename: None,
            last_written: None,
            subscription: None,
        }
    }

    pub fn row(&self) -> &Row {
        &self.row
    }

    /// The file this unit currently owns, if it has computed one.
    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// Swap in a newer snapshot of the same row.
    pub fn refresh(&mut self, row: Row) {
        debug_assert_eq!(row.id, self.row.id);
        self.row = row;
    }

    pub fn set_subscription(&mut self, handle: SubscriptionHandle) {
        self.subscription = Some(handle);
    }

    pub fn take_subscription(&mut self) -> Option<SubscriptionHandle> {
        self.subscription.take()
    }

    /// Classify the row and mirror the result onto its status property.
    pub async fn update_status<S>(&mut self, source: &S, today: NaiveDate)
    where
        S: Source + ?Sized,
    {
        let status = classify(&self.row, today);
        apply_status(source, &mut self.row, status).await;
    }

    pub async fn reconcile<S, C>(
        &mut self,
        source: &S,
        renderer: &MarkdownRenderer<'_, C>,
        today: NaiveDate,
    ) -> Result<RowReconcile>
    where
        S: Source + ?Sized,
        C: RenderContext + ?Sized,
    {
        self.update_status(source, today).await;
        self.sync_file(renderer, today)
    }

    /// Steps after the status update: rename, then write or remove.
    pub fn sync_file<C>(
        &mut self,
        renderer: &MarkdownRenderer<'_, C>,
        today: NaiveDate,
    ) -> Result<RowReconcile>
    where
        C: RenderContext + ?Sized,
    {
        let target = file_path_for(&self.destination, &self.row);

        let mut renamed_from = None;
        if let Some(previous) = self.filename.clone().filter(|previous| *previous != target) {
            if remove_file(&previous)? {
                info!(row_id = %self.row.id, from = %previous.display(), to = %target.display(), "Row renamed, removed old file");
                renamed_from = Some(previous);
            }
            self.last_written = None;
        }
        self.filename = Some(target.clone());

        let outcome = if is_published(&self.row, today) {
            let content = format!(
                "{}\n\n{}",
                front_matter(&self.row),
                renderer.render_row(&self.row, true)
            );
            if self.last_written.as_deref() == Some(content.as_str()) && target.exists() {
                debug!(row_id = %self.row.id, path = %target.display(), "File up to date");
                RowOutcome::Unchanged(target)
            } else {
                std::fs::write(&target, &content).map_err(|e| SyncError::Write {
                    path: target.clone(),
                    source: e,
                })?;
                info!(row_id = %self.row.id, path = %target.display(), "Wrote file");
                self.last_written = Some(content);
                RowOutcome::Written(target)
            }
        } else {
            self.last_written = None;
            if remove_file(&target)? {
                info!(row_id = %self.row.id, path = %target.display(), "Row no longer published, removed file");
                RowOutcome::Removed(target)
            } else {
                RowOutcome::Absent
            }
        };

        Ok(RowReconcile {
            outcome,
            renamed_from,
        })
    }

    /// Stop tracking: unsubscribe and delete the owned file. Returns the path if one was removed.
    ///
    /// On error the unit keeps its file name so a later dispose can retry.
    pub fn dispose<S>(&mut self, source: &S) -> Result<Option<PathBuf>>
    where
        S: Source + ?Sized,
    {
        if let Some(handle) = self.subscription.take() {
            source.unsubscribe(handle);
        }
        let Some(path) = self.filename.clone() else {
            return Ok(None);
        };
        let removed = remove_file(&path)?;
        self.filename = None;
        self.last_written = None;
        Ok(removed.then_some(path))
    }
}

/// Front-matter header: decorated title and comma-joined tags.
pub fn front_matter(row: &Row) -> String {
    format!(
        "---\ntitle: {}\ntags: {}\n---",
        row.decorated_title(),
        row.tags().join(", ")
    )
}

/// Remove a file, treating "not found" as success. Returns whether a file was removed.
fn remove_file(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SyncError::Remove {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
