//! Conversion of Notion record maps into the core data model.
//!
//! Everything here is pure: it takes the JSON the API returned and builds [`Row`]s and
//! [`Block`]s. Block types this crate does not know about become [`BlockKind::Unknown`].

use chrono::NaiveDate;
use notion_sync_core::model::{Block, BlockKind, PropertySchema, PropertyValue, Row, RowId};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;

/// Deepest block nesting followed when building a page tree.
pub const MAX_BLOCK_DEPTH: usize = 64;

pub type Records = HashMap<String, Value>;

/// The record inside a record-map entry. Newer responses wrap it in a second `value`.
pub fn record_value(entry: &Value) -> Option<&Value> {
    let value = entry.get("value")?;
    match value.get("value") {
        Some(inner) if inner.is_object() => Some(inner),
        _ => Some(value),
    }
}

/// Collect all records of one table (`block`, `collection`, ...) from a response.
pub fn collect_records(response: &Value, table: &str, into: &mut Records) {
    let Some(map) = response
        .get("recordMap")
        .and_then(|m| m.get(table))
        .and_then(Value::as_object)
    else {
        return;
    };
    for (id, entry) in map {
        if let Some(value) = record_value(entry) {
            into.insert(id.clone(), value.clone());
        }
    }
}

fn id_regex() -> &'static regex::Regex {
    static ID: OnceLock<regex::Regex> = OnceLock::new();
    ID.get_or_init(|| {
        regex::Regex::new(
            r"(?i)[0-9a-f]{8}-?[0-9a-f]{4}-?[0-9a-f]{4}-?[0-9a-f]{4}-?[0-9a-f]{12}",
        )
        .expect("static id pattern is valid")
    })
}

/// Normalise a 32-hex id (dashed or not) to lowercase 8-4-4-4-12 form.
pub fn normalize_id(raw: &str) -> Option<String> {
    let hex: String = raw.chars().filter(|c| *c != '-').collect::<String>().to_lowercase();
    if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    ))
}

/// Split a collection-view URL (or bare id) into its page id and optional `?v=` view id.
pub fn parse_sync_root(sync_root: &str) -> Option<(String, Option<String>)> {
    let (path, query) = match sync_root.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (sync_root, None),
    };
    // Page URLs end in `Title-<32 hex>`; the title itself may contain hex-looking words.
    let segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or(path);
    let page_id = segment
        .get(segment.len().saturating_sub(32)..)
        .and_then(normalize_id)
        .or_else(|| {
            id_regex()
                .find_iter(segment)
                .last()
                .and_then(|m| normalize_id(m.as_str()))
        })?;
    let view_id = query.and_then(|query| {
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "v")
            .and_then(|(_, value)| normalize_id(value))
    });
    Some((page_id, view_id))
}

/// Plain text of a rich-text property: the concatenated segment strings.
pub fn plain_text(raw: &Value) -> String {
    raw.as_array()
        .map(|segments| {
            segments
                .iter()
                .filter_map(|segment| segment.get(0).and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

/// Rich text with inline formatting rendered as markdown.
pub fn rich_text_to_markdown(raw: &Value) -> String {
    let Some(segments) = raw.as_array() else {
        return String::new();
    };
    let mut out = String::new();
    for segment in segments {
        let Some(text) = segment.get(0).and_then(Value::as_str) else {
            continue;
        };
        let annotations: Vec<&Value> = segment
            .get(1)
            .and_then(Value::as_array)
            .map(|a| a.iter().collect())
            .unwrap_or_default();
        let has = |code: &str| {
            annotations
                .iter()
                .find(|a| a.get(0).and_then(Value::as_str) == Some(code))
                .copied()
        };
        // Mentions and inline dates carry a placeholder glyph with no useful text.
        if has("p").is_some() || has("u").is_some() {
            continue;
        }
        if let Some(date) = has("d") {
            out.push_str(date.get(1).and_then(|d| d.get("start_date")).and_then(Value::as_str).unwrap_or(""));
            continue;
        }

        let mut piece = text.to_string();
        if has("c").is_some() {
            piece = format!("`{piece}`");
        }
        if has("b").is_some() {
            piece = format!("**{piece}**");
        }
        if has("i").is_some() {
            piece = format!("_{piece}_");
        }
        if has("s").is_some() {
            piece = format!("~~{piece}~~");
        }
        if let Some(url) = has("a").and_then(|a| a.get(1)).and_then(Value::as_str) {
            piece = format!("[{piece}]({url})");
        }
        out.push_str(&piece);
    }
    out
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// Decode one property value according to its schema type.
pub fn parse_property(kind: &str, raw: &Value) -> PropertyValue {
    match kind {
        "date" => {
            let date = raw
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|segment| segment.get(1).and_then(Value::as_array))
                .flatten()
                .find(|a| a.get(0).and_then(Value::as_str) == Some("d"))
                .and_then(|a| a.get(1));
            match date.and_then(|d| d.get("start_date")).and_then(Value::as_str).and_then(parse_date) {
                Some(start) => PropertyValue::Date {
                    start,
                    end: date
                        .and_then(|d| d.get("end_date"))
                        .and_then(Value::as_str)
                        .and_then(parse_date),
                },
                None => PropertyValue::Empty,
            }
        }
        "select" | "status" => PropertyValue::Select(plain_text(raw)),
        "multi_select" => PropertyValue::MultiSelect(
            plain_text(raw)
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        "checkbox" => PropertyValue::Checkbox(plain_text(raw) == "Yes"),
        _ => PropertyValue::Text(plain_text(raw)),
    }
}

/// Encode a property value in Notion's rich-text storage form.
pub fn encode_property(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Text(text) | PropertyValue::Select(text) => json!([[text]]),
        PropertyValue::MultiSelect(values) => json!([[values.join(",")]]),
        PropertyValue::Date { start, end } => {
            let mut date = json!({
                "type": if end.is_some() { "daterange" } else { "date" },
                "start_date": start.format("%Y-%m-%d").to_string(),
            });
            if let Some(end) = end {
                date["end_date"] = json!(end.format("%Y-%m-%d").to_string());
            }
            json!([["‣", [["d", date]]]])
        }
        PropertyValue::Checkbox(checked) => json!([[if *checked { "Yes" } else { "No" }]]),
        PropertyValue::Empty => json!([]),
    }
}

/// Schema of a collection record, as `(property id, name, type)` entries.
pub fn parse_schema(collection: &Value) -> Vec<PropertySchema> {
    collection
        .get("schema")
        .and_then(Value::as_object)
        .map(|schema| {
            schema
                .iter()
                .map(|(id, entry)| {
                    PropertySchema::new(
                        id.clone(),
                        entry.get("name").and_then(Value::as_str).unwrap_or_default(),
                        entry.get("type").and_then(Value::as_str).unwrap_or_default(),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

fn property<'a>(record: &'a Value, name: &str) -> Option<&'a Value> {
    record.get("properties").and_then(|p| p.get(name))
}

fn format_field<'a>(record: &'a Value, name: &str) -> Option<&'a Value> {
    record.get("format").and_then(|f| f.get(name))
}

fn is_alive(record: &Value) -> bool {
    record.get("alive").and_then(Value::as_bool).unwrap_or(true)
}

/// Row header (id, collection, title, icon) of a page record, without properties or content.
pub fn row_stub(id: &str, record: &Value) -> Row {
    let collection_id = match record.get("parent_table").and_then(Value::as_str) {
        Some("collection") => record
            .get("parent_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    };
    let mut row = Row::new(
        RowId::from(id),
        collection_id,
        property(record, "title").map(plain_text).unwrap_or_default(),
    );
    row.icon = format_field(record, "page_icon")
        .and_then(Value::as_str)
        .map(str::to_string);
    row
}

/// A full row: header, schema-typed property values and the page's block tree.
pub fn build_row(id: &str, record: &Value, schema: &[PropertySchema], records: &Records) -> Row {
    let mut row = row_stub(id, record);
    row.schema = schema.to_vec();
    for entry in schema {
        if let Some(raw) = property(record, &entry.id) {
            row.set_property(entry.id.clone(), parse_property(&entry.kind, raw));
        }
    }
    row.children = child_blocks(record, records, 0);
    row
}

fn child_blocks(parent: &Value, records: &Records, depth: usize) -> Vec<Block> {
    if depth >= MAX_BLOCK_DEPTH {
        warn!(depth, "Block tree too deep, ignoring further children");
        return Vec::new();
    }
    parent
        .get("content")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .filter_map(|child_id| match records.get(child_id) {
            Some(record) => build_block(child_id, record, records, depth + 1),
            None => {
                warn!(block_id = child_id, "Block missing from record map, skipping");
                None
            }
        })
        .collect()
}

/// Build one block (and its subtree) from its record. Deleted blocks yield `None`.
pub fn build_block(id: &str, record: &Value, records: &Records, depth: usize) -> Option<Block> {
    if !is_alive(record) {
        return None;
    }
    let kind_name = record.get("type").and_then(Value::as_str).unwrap_or("unknown");
    let title = || property(record, "title").map(rich_text_to_markdown).unwrap_or_default();

    let kind = match kind_name {
        "text" => BlockKind::Text { title: title() },
        "header" => BlockKind::Header { title: title() },
        "sub_header" => BlockKind::SubHeader { title: title() },
        "sub_sub_header" => BlockKind::SubSubHeader { title: title() },
        "bulleted_list" => BlockKind::BulletedListItem { title: title() },
        "numbered_list" => BlockKind::NumberedListItem { title: title() },
        "column_list" => BlockKind::ColumnList,
        "column" => BlockKind::Column {
            ratio: format_field(record, "column_ratio").and_then(Value::as_f64),
        },
        "image" => BlockKind::Image {
            source: format_field(record, "display_source")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| property(record, "source").map(plain_text))
                .unwrap_or_default(),
        },
        "code" => BlockKind::Code {
            title: property(record, "title").map(plain_text).unwrap_or_default(),
            language: property(record, "language")
                .map(plain_text)
                .map(|language| match language.to_lowercase().as_str() {
                    "plain text" => String::new(),
                    other => other.to_string(),
                })
                .unwrap_or_default(),
        },
        "quote" => BlockKind::Quote { title: title() },
        "to_do" => BlockKind::Todo {
            title: title(),
            checked: property(record, "checked").map(plain_text).as_deref() == Some("Yes"),
        },
        "divider" => BlockKind::Divider,
        // Page content belongs to the page itself; only its header is needed for a link.
        "page" => {
            return Some(Block::new(id, BlockKind::CollectionRow(Box::new(row_stub(id, record)))))
        }
        "alias" => {
            let target = format_field(record, "alias_pointer")
                .and_then(|p| p.get("id"))
                .and_then(Value::as_str)?;
            let stub = match records.get(target) {
                Some(target_record) => row_stub(target, target_record),
                None => {
                    warn!(block_id = id, target, "Link target not loaded, dropping link");
                    return None;
                }
            };
            return Some(Block::new(id, BlockKind::CollectionRow(Box::new(stub))));
        }
        "collection_view" | "collection_view_page" => BlockKind::CollectionView,
        other => BlockKind::Unknown {
            kind: other.to_string(),
            title: property(record, "title").map(plain_text),
        },
    };

    Some(Block::new(id, kind).with_children(child_blocks(record, records, depth)))
}

/// Ids of link targets (`alias` blocks) that are not in `records` yet.
pub fn missing_alias_targets(records: &Records) -> Vec<String> {
    let mut missing: Vec<String> = records
        .values()
        .filter(|record| record.get("type").and_then(Value::as_str) == Some("alias"))
        .filter_map(|record| format_field(record, "alias_pointer"))
        .filter_map(|p| p.get("id").and_then(Value::as_str))
        .filter(|id| !records.contains_key(*id))
        .map(str::to_string)
        .collect();
    missing.sort();
    missing.dedup();
    missing
}
