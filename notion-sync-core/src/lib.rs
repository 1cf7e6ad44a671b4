#![doc = "notion-sync-core: the incremental synchronisation engine behind notion-sync."]

//! This crate holds the data model, the source contract, the markdown renderer and the
//! reconciliation engine that mirrors a Notion collection into a directory of markdown files.
//! It has no knowledge of the HTTP transport; see the `notion-sync` crate for the client and CLI.
//!
//! # Usage
//! Build a [`synchronise::CollectionSync`] over any [`contract::Source`] and call
//! [`synchronise::CollectionSync::reconcile_all`], or hand it to [`watch::watch`] for a
//! long-running mirror.

pub mod config;
pub mod contract;
pub mod error;
pub mod model;
pub mod render;
pub mod row_sync;
pub mod slug;
pub mod status;
pub mod synchronise;
pub mod watch;
