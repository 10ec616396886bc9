//! Capability interface to the external document/annotation store and the
//! tabular target store.
//!
//! Consumers are generic over [`DocStore`]; the concrete implementations are
//! [`HttpDocStore`] (REST, production) and [`MemDocStore`] (in-memory, tests
//! and dry runs).

pub mod http;
pub mod mem;
pub mod wire;

use std::collections::HashSet;

use threadsync_shared::{
    Annotation, DiscussionId, DocStatus, NewWorkItem, Node, Result, TargetRecord, WorkCategory,
    WorkItem,
};

pub use http::HttpDocStore;
pub use mem::MemDocStore;

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items of this page.
    pub items: Vec<T>,
    /// Cursor to request the next page with.
    pub next_cursor: Option<String>,
    /// Whether another page exists.
    pub has_more: bool,
}

impl<T> Page<T> {
    /// A final page holding all remaining items.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
            has_more: false,
        }
    }
}

/// Capability interface over both external stores.
///
/// All operations suspend; there is no interior concurrency. Implementations
/// must be safe to call sequentially from a single control flow.
#[allow(async_fn_in_trait)]
pub trait DocStore {
    /// Verify the target tables satisfy the sync contract and bind the
    /// schema-discovered title properties. Fatal when it fails; must be
    /// called before any write.
    async fn validate_schema(&self) -> Result<()>;

    /// One page of a node's direct children.
    async fn list_children(&self, node_id: &str, cursor: Option<String>) -> Result<Page<Node>>;

    /// All annotations attached to a node.
    async fn list_annotations(&self, node_id: &str) -> Result<Vec<Annotation>>;

    /// Discussion ids of every record already present in the target table.
    async fn existing_discussions(&self) -> Result<HashSet<DiscussionId>>;

    /// Create one record; returns the store-assigned id.
    async fn create_record(&self, record: &TargetRecord) -> Result<String>;

    /// Flip the status flag on a source document.
    async fn update_document_status(&self, document_id: &str, status: DocStatus) -> Result<()>;

    /// Work items of a category with status ≠ Done, most recent first.
    async fn open_work_items(&self, category: WorkCategory) -> Result<Vec<WorkItem>>;

    /// Create one work item; returns the store-assigned id.
    async fn create_work_item(&self, item: &NewWorkItem) -> Result<String>;
}
