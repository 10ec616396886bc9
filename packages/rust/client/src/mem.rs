//! In-memory [`DocStore`] used by tests across the workspace.
//!
//! Trees, annotations, and failures are scripted up front; writes are
//! captured for assertions. Created records immediately join the existing
//! discussion set, so repeated runs observe their own writes.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::Utc;

use threadsync_shared::{
    Annotation, DiscussionId, DocStatus, NewWorkItem, Node, Result, TargetRecord,
    ThreadSyncError, WorkCategory, WorkItem, WorkStatus,
};

use crate::{DocStore, Page};

#[derive(Default)]
struct MemState {
    children: HashMap<String, Vec<Node>>,
    annotations: HashMap<String, Vec<Annotation>>,
    failing_children: HashSet<String>,
    failing_annotations: HashSet<String>,
    failing_records: HashSet<DiscussionId>,
    existing: HashSet<DiscussionId>,
    records: Vec<TargetRecord>,
    statuses: HashMap<String, DocStatus>,
    work_items: Vec<WorkItem>,
    created_work_items: Vec<NewWorkItem>,
    next_id: u64,
}

/// Scriptable in-memory store.
pub struct MemDocStore {
    state: Mutex<MemState>,
    child_page_size: usize,
    schema_valid: bool,
}

impl Default for MemDocStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemDocStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemState::default()),
            child_page_size: usize::MAX,
            schema_valid: true,
        }
    }

    /// Serve children in pages of `n` to exercise pagination.
    pub fn with_child_page_size(mut self, n: usize) -> Self {
        self.child_page_size = n.max(1);
        self
    }

    /// Make `validate_schema` fail.
    pub fn with_invalid_schema(mut self) -> Self {
        self.schema_valid = false;
        self
    }

    // -- scripting ----------------------------------------------------------

    pub fn add_child(&self, parent_id: &str, node: Node) {
        let mut state = self.state.lock().expect("mem state");
        state.children.entry(parent_id.to_string()).or_default().push(node);
    }

    pub fn add_annotation(&self, node_id: &str, annotation: Annotation) {
        let mut state = self.state.lock().expect("mem state");
        state
            .annotations
            .entry(node_id.to_string())
            .or_default()
            .push(annotation);
    }

    pub fn fail_children_of(&self, node_id: &str) {
        let mut state = self.state.lock().expect("mem state");
        state.failing_children.insert(node_id.to_string());
    }

    pub fn fail_annotations_of(&self, node_id: &str) {
        let mut state = self.state.lock().expect("mem state");
        state.failing_annotations.insert(node_id.to_string());
    }

    pub fn fail_record(&self, id: DiscussionId) {
        let mut state = self.state.lock().expect("mem state");
        state.failing_records.insert(id);
    }

    pub fn seed_existing(&self, id: DiscussionId) {
        let mut state = self.state.lock().expect("mem state");
        state.existing.insert(id);
    }

    pub fn seed_work_item(&self, item: WorkItem) {
        let mut state = self.state.lock().expect("mem state");
        state.work_items.push(item);
    }

    // -- assertions ---------------------------------------------------------

    pub fn created_records(&self) -> Vec<TargetRecord> {
        self.state.lock().expect("mem state").records.clone()
    }

    pub fn created_work_items(&self) -> Vec<NewWorkItem> {
        self.state
            .lock()
            .expect("mem state")
            .created_work_items
            .clone()
    }

    pub fn all_work_items(&self) -> Vec<WorkItem> {
        self.state.lock().expect("mem state").work_items.clone()
    }

    pub fn status_of(&self, document_id: &str) -> Option<DocStatus> {
        self.state
            .lock()
            .expect("mem state")
            .statuses
            .get(document_id)
            .copied()
    }
}

impl DocStore for MemDocStore {
    async fn validate_schema(&self) -> Result<()> {
        if self.schema_valid {
            Ok(())
        } else {
            Err(ThreadSyncError::schema(
                "records table has no title-type property",
            ))
        }
    }

    async fn list_children(&self, node_id: &str, cursor: Option<String>) -> Result<Page<Node>> {
        let state = self.state.lock().expect("mem state");
        if state.failing_children.contains(node_id) {
            return Err(ThreadSyncError::Network(format!(
                "children of {node_id}: HTTP 502"
            )));
        }

        let all = state.children.get(node_id).cloned().unwrap_or_default();
        let offset: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let end = all.len().min(offset.saturating_add(self.child_page_size));
        let has_more = end < all.len();

        Ok(Page {
            items: all[offset.min(all.len())..end].to_vec(),
            next_cursor: has_more.then(|| end.to_string()),
            has_more,
        })
    }

    async fn list_annotations(&self, node_id: &str) -> Result<Vec<Annotation>> {
        let state = self.state.lock().expect("mem state");
        if state.failing_annotations.contains(node_id) {
            return Err(ThreadSyncError::Network(format!(
                "comments of {node_id}: HTTP 502"
            )));
        }
        Ok(state.annotations.get(node_id).cloned().unwrap_or_default())
    }

    async fn existing_discussions(&self) -> Result<HashSet<DiscussionId>> {
        Ok(self.state.lock().expect("mem state").existing.clone())
    }

    async fn create_record(&self, record: &TargetRecord) -> Result<String> {
        let mut state = self.state.lock().expect("mem state");
        if state.failing_records.contains(&record.discussion_id) {
            return Err(ThreadSyncError::Store(format!(
                "create record {}: HTTP 500",
                record.discussion_id
            )));
        }
        state.existing.insert(record.discussion_id.clone());
        state.records.push(record.clone());
        state.next_id += 1;
        Ok(format!("rec-{}", state.next_id))
    }

    async fn update_document_status(&self, document_id: &str, status: DocStatus) -> Result<()> {
        let mut state = self.state.lock().expect("mem state");
        state.statuses.insert(document_id.to_string(), status);
        Ok(())
    }

    async fn open_work_items(&self, category: WorkCategory) -> Result<Vec<WorkItem>> {
        let state = self.state.lock().expect("mem state");
        let mut items: Vec<WorkItem> = state
            .work_items
            .iter()
            .filter(|item| item.category == category && item.status.is_unresolved())
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn create_work_item(&self, item: &NewWorkItem) -> Result<String> {
        let mut state = self.state.lock().expect("mem state");
        state.next_id += 1;
        let id = format!("work-{}", state.next_id);
        state.work_items.push(WorkItem {
            id: id.clone(),
            title: item.title.clone(),
            category: item.category,
            status: WorkStatus::NotStarted,
            related_ids: item.related_ids.clone(),
            created_at: Utc::now(),
        });
        state.created_work_items.push(item.clone());
        Ok(id)
    }
}
