//! Deterministic file names for rows.
//!
//! A slug is `<YYYY>-<MM>-<DD>-<title words joined by '-'>`. Undated rows use the
//! `0000-00-00` sentinel so they sort first and keep a stable name. The slug depends
//! only on the title and publish date, never on the row id, so editing either one
//! moves the row to a new file.

use std::path::{Path, PathBuf};

use crate::model::Row;

const UNDATED: &str = "0000-00-00";

pub fn slug_for(row: &Row) -> String {
    let date = match row.publish_date() {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => UNDATED.to_string(),
    };

    std::iter::once(date)
        .chain(row.title.split_whitespace().map(|word| word.replace(['/', '\\'], "-")))
        .collect::<Vec<_>>()
        .join("-")
}

/// `<destination>/<slug>.md`
pub fn file_path_for(destination: &Path, row: &Row) -> PathBuf {
    destination.join(format!("{}.md", slug_for(row)))
}
