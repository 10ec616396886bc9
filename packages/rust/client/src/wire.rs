//! Wire types and payload builders for the store's REST API.
//!
//! External records are duck-typed JSON; every nested optional lookup goes
//! through an explicit accessor function returning a typed default, never an
//! inline chained lookup at a call site.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use threadsync_shared::{
    Annotation, Author, Block, DiscussionId, DocStatus, NewWorkItem, Node, NodeKind,
    TargetRecord, WorkCategory, WorkItem, WorkStatus,
};

/// Property name of the records table holding the discussion key.
pub const DISCUSSION_PROP: &str = "Discussion";
/// Property name of the records table referencing the source document.
pub const SOURCE_PROP: &str = "Source";
/// Select property carrying document / work-item status.
pub const STATUS_PROP: &str = "Status";
/// Select property carrying the work-item category.
pub const CATEGORY_PROP: &str = "Category";
/// Rich-text property listing the backlog ids a work item aggregates.
pub const RELATED_PROP: &str = "Related";

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

/// A content block as returned by `GET /v1/blocks/{id}/children`.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockObject {
    pub id: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub has_children: bool,
    /// Kind-specific payload keyed by the type tag.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// Paginated list envelope shared by children/comments/query endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ListEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

/// A comment as returned by `GET /v1/comments`.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentObject {
    pub id: String,
    pub discussion_id: String,
    pub created_time: DateTime<Utc>,
    pub created_by: UserRef,
    #[serde(default = "Vec::new")]
    pub rich_text: Vec<Value>,
}

/// Minimal user reference embedded in comments.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A table row (page) as returned by a database query.
#[derive(Debug, Clone, Deserialize)]
pub struct PageObject {
    pub id: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
}

/// Id-only envelope returned by create endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedObject {
    pub id: String,
}

/// Table (database) schema as returned by `GET /v1/databases/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseObject {
    pub id: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Accessors (typed defaults, no inline deep lookups elsewhere)
// ---------------------------------------------------------------------------

/// Join the `plain_text` of a rich-text array. Empty rich text yields an
/// empty string, never an error.
pub fn rich_text_plain(items: &[Value]) -> String {
    items
        .iter()
        .filter_map(|item| item.get("plain_text").and_then(Value::as_str))
        .collect()
}

/// Text content of a block, pulled from its kind-specific payload.
pub fn block_plain_text(block: &BlockObject) -> String {
    let rich_text = block
        .payload
        .get(&block.type_tag)
        .and_then(|payload| payload.get("rich_text"))
        .and_then(Value::as_array);
    match rich_text {
        Some(items) => rich_text_plain(items),
        None => String::new(),
    }
}

/// Plain text of a rich-text or title property of a page. Missing or
/// malformed properties yield an empty string.
pub fn prop_plain_text(props: &Map<String, Value>, name: &str) -> String {
    let Some(prop) = props.get(name) else {
        return String::new();
    };
    let Some(type_tag) = prop.get("type").and_then(Value::as_str) else {
        return String::new();
    };
    match prop.get(type_tag).and_then(Value::as_array) {
        Some(items) => rich_text_plain(items),
        None => String::new(),
    }
}

/// Selected option name of a select property, if any.
pub fn prop_select(props: &Map<String, Value>, name: &str) -> Option<String> {
    props
        .get(name)?
        .get("select")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

/// Text of whichever page property has the `title` type.
pub fn title_text(props: &Map<String, Value>) -> String {
    for (name, prop) in props {
        if prop.get("type").and_then(Value::as_str) == Some("title") {
            return prop_plain_text(props, name);
        }
    }
    String::new()
}

/// Name of the schema property declared with the given type, if any.
pub fn schema_property_of_type<'a>(db: &'a DatabaseObject, type_tag: &str) -> Option<&'a str> {
    db.properties
        .iter()
        .find(|(_, prop)| prop.get("type").and_then(Value::as_str) == Some(type_tag))
        .map(|(name, _)| name.as_str())
}

/// Declared type of a named schema property, if present.
pub fn schema_property_type<'a>(db: &'a DatabaseObject, name: &str) -> Option<&'a str> {
    db.properties
        .get(name)
        .and_then(|prop| prop.get("type"))
        .and_then(Value::as_str)
}

// ---------------------------------------------------------------------------
// Wire → domain conversions
// ---------------------------------------------------------------------------

impl From<&BlockObject> for Node {
    fn from(block: &BlockObject) -> Self {
        Node {
            id: block.id.clone(),
            kind: NodeKind::from_tag(&block.type_tag),
            text: block_plain_text(block),
            has_children: block.has_children,
        }
    }
}

impl From<&CommentObject> for Annotation {
    fn from(comment: &CommentObject) -> Self {
        Annotation {
            id: comment.id.clone(),
            discussion_id: DiscussionId(comment.discussion_id.clone()),
            author: Author {
                id: comment.created_by.id.clone(),
                name: comment.created_by.name.clone(),
            },
            created_at: comment.created_time,
            text: rich_text_plain(&comment.rich_text),
        }
    }
}

/// Interpret a queried table row as a work item of a known category.
/// Unknown status names default to `NotStarted` (unresolved, the safe side
/// of the guard invariant).
pub fn work_item_from_page(page: &PageObject, category: WorkCategory) -> WorkItem {
    let status = match prop_select(&page.properties, STATUS_PROP).as_deref() {
        Some("Done") => WorkStatus::Done,
        Some("In progress") => WorkStatus::InProgress,
        _ => WorkStatus::NotStarted,
    };
    let related = prop_plain_text(&page.properties, RELATED_PROP);

    WorkItem {
        id: page.id.clone(),
        title: title_text(&page.properties),
        category,
        status,
        related_ids: related
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        created_at: page.created_time.unwrap_or_else(Utc::now),
    }
}

// ---------------------------------------------------------------------------
// Payload builders
// ---------------------------------------------------------------------------

/// Rich-text array wrapping a single text run.
pub fn rich_text_value(text: &str) -> Value {
    json!([{ "type": "text", "text": { "content": text } }])
}

/// Wire form of one rendered content block.
pub fn block_value(block: &Block) -> Value {
    match block {
        Block::Heading(text) => json!({
            "object": "block",
            "type": "heading_2",
            "heading_2": { "rich_text": rich_text_value(text) },
        }),
        Block::Text(text) => json!({
            "object": "block",
            "type": "paragraph",
            "paragraph": { "rich_text": rich_text_value(text) },
        }),
        Block::Quote(text) => json!({
            "object": "block",
            "type": "quote",
            "quote": { "rich_text": rich_text_value(text) },
        }),
    }
}

/// Create-page payload for one target record.
pub fn record_create_payload(table_id: &str, title_prop: &str, record: &TargetRecord) -> Value {
    let children: Vec<Value> = record.blocks.iter().map(block_value).collect();
    json!({
        "parent": { "database_id": table_id },
        "properties": {
            title_prop: { "title": rich_text_value(&record.title) },
            DISCUSSION_PROP: { "rich_text": rich_text_value(record.discussion_id.as_str()) },
            SOURCE_PROP: { "rich_text": rich_text_value(&record.source_document.name) },
        },
        "children": children,
    })
}

/// Create-page payload for one work item.
pub fn work_item_create_payload(table_id: &str, title_prop: &str, item: &NewWorkItem) -> Value {
    let children: Vec<Value> = item.blocks.iter().map(block_value).collect();
    json!({
        "parent": { "database_id": table_id },
        "properties": {
            title_prop: { "title": rich_text_value(&item.title) },
            STATUS_PROP: { "select": { "name": WorkStatus::NotStarted.as_str() } },
            CATEGORY_PROP: { "select": { "name": item.category.as_str() } },
            RELATED_PROP: { "rich_text": rich_text_value(&item.related_ids.join(", ")) },
        },
        "children": children,
    })
}

/// Patch payload flipping a source document's status flag.
pub fn status_update_payload(status: DocStatus) -> Value {
    json!({
        "properties": {
            STATUS_PROP: { "select": { "name": status.as_str() } },
        },
    })
}

/// Query payload for open (status ≠ Done) work items of a category,
/// most recent first.
pub fn open_work_items_query(category: WorkCategory) -> Value {
    json!({
        "filter": {
            "and": [
                { "property": CATEGORY_PROP, "select": { "equals": category.as_str() } },
                { "property": STATUS_PROP, "select": { "does_not_equal": WorkStatus::Done.as_str() } },
            ],
        },
        "sorts": [{ "timestamp": "created_time", "direction": "descending" }],
    })
}
