//! Publish status of a row, derived from its publish date and mirrored onto its
//! "Status" property.

use chrono::NaiveDate;
use std::fmt;
use tracing::{debug, warn};

use crate::contract::Source;
use crate::model::{PropertyValue, Row, STATUS_PROPERTY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Unpublished,
    Pending,
    Published,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unpublished => "Unpublished",
            Status::Pending => "Pending",
            Status::Published => "Published",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify(row: &Row, today: NaiveDate) -> Status {
    match row.publish_date() {
        None => Status::Unpublished,
        Some(date) if date > today => Status::Pending,
        Some(_) => Status::Published,
    }
}

/// Write `status` into the row's "Status" property, locally and on the source.
///
/// Rows without a "Status" schema entry are left untouched. The remote write is skipped
/// when the stored value already matches, and a failed remote write is only logged: the
/// next snapshot will still carry the stale value, so the write is retried next cycle.
pub async fn apply_status<S>(source: &S, row: &mut Row, status: Status)
where
    S: Source + ?Sized,
{
    let Some(entry) = row.schema_entry(STATUS_PROPERTY) else {
        return;
    };
    let property_id = entry.id.clone();

    let current = row.get_property(&property_id).and_then(PropertyValue::as_text);
    if current == Some(status.as_str()) {
        return;
    }

    debug!(row_id = %row.id, from = ?current, to = %status, "Updating row status");
    let value = PropertyValue::Select(status.as_str().to_string());
    if let Err(e) = source
        .set_property(&row.id, &property_id, value.clone())
        .await
    {
        warn!(row_id = %row.id, error = %e, "Failed to write status back to source");
    }
    row.set_property(property_id, value);
}

/// Whether the row should currently have a file.
///
/// Reads the stored "Status" property; rows whose schema has no such entry fall back to
/// the classification of their publish date.
pub fn is_published(row: &Row, today: NaiveDate) -> bool {
    match row.schema_entry(STATUS_PROPERTY) {
        Some(entry) => row
            .get_property(&entry.id)
            .and_then(PropertyValue::as_text)
            .is_some_and(|stored| stored == Status::Published.as_str()),
        None => classify(row, today) == Status::Published,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockSource;
    use crate::model::PropertySchema;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn row_with_date(date: Option<NaiveDate>, with_status: bool) -> Row {
        let mut row = Row::new("row", "collection", "Title");
        row.schema.push(PropertySchema::new("pd", "Publish Date", "date"));
        if with_status {
            row.schema.push(PropertySchema::new("st", "Status", "select"));
        }
        if let Some(start) = date {
            row.set_property("pd", PropertyValue::Date { start, end: None });
        }
        row
    }

    #[test]
    fn classify_boundaries() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 6, d);
        assert_eq!(classify(&row_with_date(None, false), today()), Status::Unpublished);
        assert_eq!(classify(&row_with_date(day(16), false), today()), Status::Pending);
        assert_eq!(classify(&row_with_date(day(15), false), today()), Status::Published);
        assert_eq!(classify(&row_with_date(day(1), false), today()), Status::Published);
    }

    #[test]
    fn is_published_prefers_stored_status() {
        let mut row = row_with_date(NaiveDate::from_ymd_opt(2024, 1, 1), true);
        assert!(!is_published(&row, today()), "no stored status yet");

        row.set_property("st", PropertyValue::Select("Published".into()));
        assert!(is_published(&row, today()));

        let undated = row_with_date(None, false);
        assert!(!is_published(&undated, today()));
        let dated = row_with_date(NaiveDate::from_ymd_opt(2024, 1, 1), false);
        assert!(is_published(&dated, today()));
    }

    #[tokio::test]
    async fn apply_status_writes_once_and_skips_when_current() {
        let mut source = MockSource::new();
        source
            .expect_set_property()
            .withf(|id, prop, value| {
                id.as_str() == "row"
                    && prop == "st"
                    && *value == PropertyValue::Select("Published".into())
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut row = row_with_date(NaiveDate::from_ymd_opt(2024, 1, 1), true);
        apply_status(&source, &mut row, Status::Published).await;
        apply_status(&source, &mut row, Status::Published).await;

        assert!(is_published(&row, today()));
    }

    #[tokio::test]
    async fn apply_status_without_status_entry_is_noop() {
        let source = MockSource::new();
        let mut row = row_with_date(None, false);
        apply_status(&source, &mut row, Status::Unpublished).await;
        assert!(row.properties.is_empty());
    }

    #[tokio::test]
    async fn failed_write_back_still_updates_snapshot() {
        let mut source = MockSource::new();
        source
            .expect_set_property()
            .returning(|_, _, _| Err("offline".into()));

        let mut row = row_with_date(NaiveDate::from_ymd_opt(2024, 7, 1), true);
        apply_status(&source, &mut row, Status::Pending).await;

        assert_eq!(
            row.get_property("st"),
            Some(&PropertyValue::Select("Pending".into()))
        );
    }
}
