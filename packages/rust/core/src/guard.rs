//! Task guard: at most one unresolved work item per category.
//!
//! Evaluated fresh on every run per category; all state lives in the
//! external store. When an unresolved item exists the guard emits a warning
//! notification and creates nothing — that branch is a success, not an
//! error.

use tracing::{info, instrument, warn};

use threadsync_client::DocStore;
use threadsync_shared::{Block, NewWorkItem, Result, WorkCategory, WorkItem};

use crate::notify::{Notifier, build_notification};

/// One pending entry the guard may aggregate into a work item.
#[derive(Debug, Clone)]
pub struct BacklogEntry {
    /// Identity carried into the work item's related ids.
    pub id: String,
    /// Human-readable line embedded in the preview.
    pub title: String,
}

/// Guard state derived from the store's open work items.
#[derive(Debug, Clone)]
pub enum GuardState {
    /// No unresolved item; creating one is allowed.
    NoUnresolvedTask,
    /// An unresolved item exists (the most recent one).
    UnresolvedTaskExists(WorkItem),
}

/// Result of one guard evaluation for one category.
#[derive(Debug, Clone)]
pub struct GuardOutcome {
    pub category: WorkCategory,
    /// Id of the created work item, if the guard allowed creation.
    pub created_item: Option<String>,
    /// Whether the (warning or reminder) notification was accepted.
    pub notified: bool,
}

impl GuardOutcome {
    /// Whether this run created a follow-up task for the category.
    pub fn task_created(&self) -> bool {
        self.created_item.is_some()
    }
}

/// Query the store and derive the guard state for a category.
pub async fn evaluate<S: DocStore>(store: &S, category: WorkCategory) -> Result<GuardState> {
    let open = store.open_work_items(category).await?;
    match open.into_iter().next() {
        // Items arrive most-recent first.
        Some(item) => Ok(GuardState::UnresolvedTaskExists(item)),
        None => Ok(GuardState::NoUnresolvedTask),
    }
}

/// Run the guard for one category over the current backlog.
///
/// An empty backlog is a no-op: nothing to aggregate, nothing to announce.
#[instrument(skip_all, fields(category = %category, backlog = backlog.len()))]
pub async fn run_guard<S: DocStore, N: Notifier>(
    store: &S,
    notifier: &N,
    category: WorkCategory,
    backlog: &[BacklogEntry],
    preview_limit: usize,
) -> Result<GuardOutcome> {
    if backlog.is_empty() {
        return Ok(GuardOutcome {
            category,
            created_item: None,
            notified: false,
        });
    }

    match evaluate(store, category).await? {
        GuardState::UnresolvedTaskExists(open) => {
            warn!(
                open_item = %open.id,
                open_title = %open.title,
                backlog = backlog.len(),
                "unresolved work item exists, skipping creation"
            );

            let notification = build_notification(
                format!("[threadsync] 未完成任务提醒：{category}"),
                format!(
                    "上一个任务 **{}** 尚未完成，本次不再创建新任务。\n\n当前积压 {} 条。",
                    open.title,
                    backlog.len()
                ),
            );
            let notified = notifier.send(&notification).await;

            Ok(GuardOutcome {
                category,
                created_item: None,
                notified,
            })
        }
        GuardState::NoUnresolvedTask => {
            let item = build_work_item(category, backlog, preview_limit);
            let id = store.create_work_item(&item).await?;
            info!(item_id = %id, backlog = backlog.len(), "created aggregate work item");

            let notification = build_notification(
                format!("[threadsync] 新任务：{category}"),
                reminder_body(backlog, preview_limit),
            );
            let notified = notifier.send(&notification).await;

            Ok(GuardOutcome {
                category,
                created_item: Some(id),
                notified,
            })
        }
    }
}

/// Aggregate the backlog into one work item, embedding a bounded preview.
fn build_work_item(
    category: WorkCategory,
    backlog: &[BacklogEntry],
    preview_limit: usize,
) -> NewWorkItem {
    let mut blocks = Vec::with_capacity(preview_limit + 2);
    blocks.push(Block::Heading(format!("{category}（{} 条）", backlog.len())));

    for entry in backlog.iter().take(preview_limit) {
        blocks.push(Block::Text(format!("{}（{}）", entry.title, entry.id)));
    }
    let remainder = backlog.len().saturating_sub(preview_limit);
    if remainder > 0 {
        blocks.push(Block::Text(format!("……另有 {remainder} 条")));
    }

    NewWorkItem {
        title: format!("{category}：待处理 {} 条", backlog.len()),
        category,
        blocks,
        related_ids: backlog.iter().map(|e| e.id.clone()).collect(),
    }
}

fn reminder_body(backlog: &[BacklogEntry], preview_limit: usize) -> String {
    let mut body = format!("共 {} 条待处理：\n\n", backlog.len());
    for entry in backlog.iter().take(preview_limit) {
        body.push_str(&format!("- {}\n", entry.title));
    }
    let remainder = backlog.len().saturating_sub(preview_limit);
    if remainder > 0 {
        body.push_str(&format!("\n……另有 {remainder} 条\n"));
    }
    body
}
