//! Core domain types for ThreadSync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DiscussionId
// ---------------------------------------------------------------------------

/// Stable identity of an annotation thread. This is the sync's idempotence
/// key: the target store must never hold two records with the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscussionId(pub String);

impl DiscussionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DiscussionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DiscussionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// The kind of a document content node, with a uniform plain-text projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Paragraph,
    Heading1,
    Heading2,
    Heading3,
    BulletedListItem,
    NumberedListItem,
    Quote,
    Callout,
    Todo,
    /// Any node kind the sync does not model. Carries the wire type tag.
    Other(String),
}

impl NodeKind {
    /// Parse a wire type tag into a kind. Unknown tags are preserved.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "paragraph" => Self::Paragraph,
            "heading_1" => Self::Heading1,
            "heading_2" => Self::Heading2,
            "heading_3" => Self::Heading3,
            "bulleted_list_item" => Self::BulletedListItem,
            "numbered_list_item" => Self::NumberedListItem,
            "quote" => Self::Quote,
            "callout" => Self::Callout,
            "to_do" => Self::Todo,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether this kind exposes readable text content.
    pub fn is_textual(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

/// One element of a document's content tree. Immutable snapshot per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Store-assigned node identifier.
    pub id: String,
    /// Node kind (paragraph, heading, list item, ...).
    pub kind: NodeKind,
    /// Concatenated plain text of the node's rich text, possibly empty.
    pub text: String,
    /// Whether the node has children to descend into.
    pub has_children: bool,
}

impl Node {
    /// Uniform plain-text projection used when quoting the node in a record.
    /// Unrecognized kinds render as a bracketed type tag.
    pub fn plain_text(&self) -> String {
        match &self.kind {
            NodeKind::Other(tag) => format!("[{tag}]"),
            _ => self.text.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Annotation
// ---------------------------------------------------------------------------

/// The author of an annotation as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Store-assigned user identifier.
    pub id: String,
    /// Display name, absent for bot/guest authors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Author {
    /// Display name with a truncated anonymous fallback.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => {
                let short: String = self.id.chars().take(8).collect();
                format!("user-{short}")
            }
        }
    }
}

/// A user comment attached to exactly one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    /// Store-assigned annotation identifier.
    pub id: String,
    /// Thread identity shared by replies.
    pub discussion_id: DiscussionId,
    /// Comment author.
    pub author: Author,
    /// Creation time, the thread's member ordering key.
    pub created_at: DateTime<Utc>,
    /// Plain text of the comment body, possibly empty.
    pub text: String,
}

// ---------------------------------------------------------------------------
// Documents and threads
// ---------------------------------------------------------------------------

/// Back-reference to the source document a thread was found in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Store-assigned document (page) identifier.
    pub id: String,
    /// Human-readable document name from configuration.
    pub name: String,
}

/// Processing status flag carried by each source document's row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocStatus {
    Unprocessed,
    Processed,
}

impl DocStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unprocessed => "Unprocessed",
            Self::Processed => "Processed",
        }
    }
}

/// A group of annotations sharing a discussion identity, accepted for sync.
///
/// Invariants: `members` is sorted by `created_at` ascending (stable), and at
/// least one member's trimmed text carries a recognized prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    /// Thread identity, unique across the target store.
    pub discussion_id: DiscussionId,
    /// First chronologically prefixed member's text, prefix stripped.
    pub title: String,
    /// Members ordered by creation time ascending.
    pub members: Vec<Annotation>,
    /// Node the thread is attached to.
    pub source_node: Node,
    /// Document the node belongs to.
    pub source_document: DocumentRef,
}

// ---------------------------------------------------------------------------
// Rendered output
// ---------------------------------------------------------------------------

/// A structured content block of a rendered record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum Block {
    /// Section header.
    Heading(String),
    /// Plain paragraph.
    Text(String),
    /// Quoted source-node content.
    Quote(String),
}

/// The structured row created in the target store for one accepted thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetRecord {
    /// Record title (the thread title).
    pub title: String,
    /// Unique key; see [`DiscussionId`].
    pub discussion_id: DiscussionId,
    /// Back-reference to the source document.
    pub source_document: DocumentRef,
    /// Ordered content blocks.
    pub blocks: Vec<Block>,
}

// ---------------------------------------------------------------------------
// Work items
// ---------------------------------------------------------------------------

/// Work item lifecycle status. Transition to `Done` is performed by a human,
/// never by this pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    NotStarted,
    InProgress,
    Done,
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::InProgress => "In progress",
            Self::Done => "Done",
        }
    }

    /// Unresolved means the task guard must not create another item.
    pub fn is_unresolved(&self) -> bool {
        !matches!(self, Self::Done)
    }
}

/// Work item category. The at-most-one-unresolved invariant is scoped per
/// category; categories never share guard state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkCategory {
    /// Threads discovered but awaiting a human pass.
    ThreadBacklog,
    /// Synced records still lacking a classification.
    ClassificationBacklog,
}

impl WorkCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThreadBacklog => "pending-thread backlog",
            Self::ClassificationBacklog => "pending-classification backlog",
        }
    }

    pub const ALL: [WorkCategory; 2] = [Self::ThreadBacklog, Self::ClassificationBacklog];
}

impl std::fmt::Display for WorkCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An aggregate follow-up task tracked in the work-item store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Store-assigned identifier.
    pub id: String,
    /// Item title.
    pub title: String,
    /// Guard scope.
    pub category: WorkCategory,
    /// Lifecycle status.
    pub status: WorkStatus,
    /// Identifiers of the backlog entries the item aggregates.
    #[serde(default)]
    pub related_ids: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a new work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkItem {
    pub title: String,
    pub category: WorkCategory,
    /// Body content blocks (bounded preview of the backlog).
    pub blocks: Vec<Block>,
    pub related_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Run outputs
// ---------------------------------------------------------------------------

/// Summary of a completed sync run, consumed by the CLI/reporting layer.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Candidate threads discovered this run (pre-dedup).
    pub processed: usize,
    /// Records successfully written this run.
    pub written: usize,
    /// Non-fatal failures as `(context, message)` pairs.
    pub errors: Vec<(String, String)>,
    /// Total run duration.
    #[serde(serialize_with = "serialize_duration_ms", rename = "duration_ms")]
    pub duration: std::time::Duration,
    /// False only when the run aborted fatally.
    pub success: bool,
}

fn serialize_duration_ms<S: serde::Serializer>(
    d: &std::time::Duration,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u128(d.as_millis())
}

/// Payload handed to the email-dispatch collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub body_markdown: String,
    pub body_html: String,
}
