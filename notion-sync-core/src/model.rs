//! Data model for the mirrored collection: rows, their schema and property values,
//! and the block tree that makes up each row's page body.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;

pub const PUBLISH_DATE_PROPERTY: &str = "Publish Date";
pub const STATUS_PROPERTY: &str = "Status";
pub const TAGS_PROPERTY: &str = "Tags";

/// Opaque, collection-scoped row identifier. Never derived from titles or slugs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(String);

impl RowId {
    pub fn new(id: impl Into<String>) -> Self {
        RowId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowId {
    fn from(id: &str) -> Self {
        RowId(id.to_string())
    }
}

impl From<String> for RowId {
    fn from(id: String) -> Self {
        RowId(id)
    }
}

/// One entry of a collection schema.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySchema {
    pub id: String,
    pub name: String,
    /// Notion property type, e.g. `date`, `select`, `multi_select`, `text`.
    pub kind: String,
}

impl PropertySchema {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Select(String),
    MultiSelect(Vec<String>),
    Date {
        start: NaiveDate,
        end: Option<NaiveDate>,
    },
    Checkbox(bool),
    Empty,
}

impl PropertyValue {
    /// The plain string form of text-like values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) | PropertyValue::Select(s) => Some(s),
            _ => None,
        }
    }
}

/// A record of the tracked collection, together with its page content.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: RowId,
    /// Id of the collection this row belongs to.
    pub collection_id: String,
    pub title: String,
    pub icon: Option<String>,
    pub schema: Vec<PropertySchema>,
    pub properties: HashMap<String, PropertyValue>,
    pub children: Vec<Block>,
}

impl Row {
    pub fn new(id: impl Into<RowId>, collection_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            collection_id: collection_id.into(),
            title: title.into(),
            icon: None,
            schema: Vec::new(),
            properties: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn get_property(&self, property_id: &str) -> Option<&PropertyValue> {
        self.properties.get(property_id)
    }

    pub fn set_property(&mut self, property_id: impl Into<String>, value: PropertyValue) {
        self.properties.insert(property_id.into(), value);
    }

    /// Schema entries matching both a property name and type.
    pub fn schema_entries<'a>(
        &'a self,
        name: &'a str,
        kind: &'a str,
    ) -> impl Iterator<Item = &'a PropertySchema> + 'a {
        self.schema
            .iter()
            .filter(move |entry| entry.name == name && entry.kind == kind)
    }

    /// The first schema entry with the given name, regardless of type.
    pub fn schema_entry(&self, name: &str) -> Option<&PropertySchema> {
        self.schema.iter().find(|entry| entry.name == name)
    }

    /// Latest non-empty start date across all "Publish Date" date properties.
    pub fn publish_date(&self) -> Option<NaiveDate> {
        self.schema_entries(PUBLISH_DATE_PROPERTY, "date")
            .filter_map(|entry| match self.get_property(&entry.id) {
                Some(PropertyValue::Date { start, .. }) => Some(*start),
                _ => None,
            })
            .max()
    }

    /// Tags from every "Tags" multi-select property, in schema order.
    pub fn tags(&self) -> Vec<String> {
        self.schema_entries(TAGS_PROPERTY, "multi_select")
            .filter_map(|entry| match self.get_property(&entry.id) {
                Some(PropertyValue::MultiSelect(values)) => Some(values.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Title prefixed with the icon, if there is one.
    pub fn decorated_title(&self) -> String {
        match &self.icon {
            Some(icon) => format!("{} {}", icon, self.title),
            None => self.title.clone(),
        }
    }
}

/// One node of a page's document tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: String,
    pub kind: BlockKind,
    pub children: Vec<Block>,
}

impl Block {
    pub fn new(id: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            id: id.into(),
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Block>) -> Self {
        self.children = children;
        self
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            BlockKind::Unknown {
                kind,
                title: Some(title),
            } => write!(f, "<{} (id={}, title={})>", kind, self.id, title),
            BlockKind::Unknown { kind, title: None } => write!(f, "<{} (id={})>", kind, self.id),
            other => write!(f, "<{} (id={})>", other.name(), self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Text { title: String },
    Header { title: String },
    SubHeader { title: String },
    SubSubHeader { title: String },
    BulletedListItem { title: String },
    NumberedListItem { title: String },
    ColumnList,
    Column { ratio: Option<f64> },
    Image { source: String },
    Code { title: String, language: String },
    Quote { title: String },
    Todo { title: String, checked: bool },
    Divider,
    /// A page of a collection embedded in another page's content.
    CollectionRow(Box<Row>),
    /// An inline table/board view of a collection. Not rendered.
    CollectionView,
    /// Any block type this crate does not know about.
    Unknown { kind: String, title: Option<String> },
}

impl BlockKind {
    pub fn name(&self) -> &str {
        match self {
            BlockKind::Text { .. } => "text",
            BlockKind::Header { .. } => "header",
            BlockKind::SubHeader { .. } => "sub_header",
            BlockKind::SubSubHeader { .. } => "sub_sub_header",
            BlockKind::BulletedListItem { .. } => "bulleted_list",
            BlockKind::NumberedListItem { .. } => "numbered_list",
            BlockKind::ColumnList => "column_list",
            BlockKind::Column { .. } => "column",
            BlockKind::Image { .. } => "image",
            BlockKind::Code { .. } => "code",
            BlockKind::Quote { .. } => "quote",
            BlockKind::Todo { .. } => "to_do",
            BlockKind::Divider => "divider",
            BlockKind::CollectionRow(_) => "page",
            BlockKind::CollectionView => "collection_view",
            BlockKind::Unknown { kind, .. } => kind,
        }
    }
}
