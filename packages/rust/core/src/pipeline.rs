//! End-to-end sync run: walk → aggregate → dedup → render → write → guard.
//!
//! Single logical control flow; every external operation suspends back into
//! it. Writes happen strictly one thread at a time in discovery order, with
//! a fixed inter-write delay for the store's rate limits. Partial progress
//! is never rolled back.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use threadsync_aggregate::{collect_threads, dedup_threads, uncategorized_count};
use threadsync_client::DocStore;
use threadsync_render::render_thread;
use threadsync_shared::{
    DocStatus, DocumentEntry, DocumentRef, Result, SyncConfig, SyncReport, Thread, WorkCategory,
};
use threadsync_walker::walk_tree;

use crate::guard::{BacklogEntry, GuardOutcome, run_guard};
use crate::notify::Notifier;

/// Result of one full sync run.
#[derive(Debug)]
pub struct SyncOutcome {
    /// Batch summary consumed by the reporting/CLI layer.
    pub report: SyncReport,
    /// Guard evaluation per work-item category.
    pub guards: Vec<GuardOutcome>,
}

impl SyncOutcome {
    /// Whether any guard created a follow-up task this run.
    pub fn action_task_created(&self) -> bool {
        self.guards.iter().any(GuardOutcome::task_created)
    }
}

/// Progress callback for reporting sync status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each record write attempt.
    fn record_written(&self, discussion_id: &str, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, report: &SyncReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn record_written(&self, _discussion_id: &str, _current: usize, _total: usize) {}
    fn done(&self, _report: &SyncReport) {}
}

/// Run the full sync over the configured source documents.
///
/// Only schema validation failures abort the run; every other failure is
/// recorded in the report and the batch continues.
#[instrument(skip_all, fields(run_id = %Uuid::now_v7(), documents = documents.len()))]
pub async fn run_sync<S: DocStore, N: Notifier>(
    store: &S,
    notifier: &N,
    documents: &[DocumentEntry],
    config: &SyncConfig,
    progress: &dyn ProgressReporter,
) -> Result<SyncOutcome> {
    let start = Instant::now();
    let mut errors: Vec<(String, String)> = Vec::new();

    // --- Phase 1: schema gate (fatal, before any write) ---
    progress.phase("Validating target schema");
    store.validate_schema().await?;

    // --- Phase 2: walk + aggregate per document ---
    let mut candidates: Vec<Thread> = Vec::new();

    for document in documents {
        progress.phase(&format!("Scanning {}", document.name));
        let doc_ref = DocumentRef {
            id: document.id.clone(),
            name: document.name.clone(),
        };

        let walk = walk_tree(store, &document.id).await;
        for (node_id, message) in walk.errors {
            errors.push((format!("walk {node_id}"), message));
        }

        let aggregation = collect_threads(store, &walk.nodes, &doc_ref).await;
        for (node_id, message) in aggregation.errors {
            errors.push((format!("annotations {node_id}"), message));
        }

        candidates.extend(aggregation.threads);
    }

    let processed = candidates.len();
    info!(candidates = processed, "aggregation complete");

    // --- Phase 3: dedup against the target store ---
    progress.phase("Deduplicating");
    let pending: Vec<Thread> = match store.existing_discussions().await {
        Ok(existing) => dedup_threads(candidates, &existing),
        Err(e) => {
            // Without the existing key set the dedup invariant cannot be
            // upheld, so no writes happen this run.
            warn!(error = %e, "could not load existing discussions, skipping all writes");
            errors.push(("query existing records".into(), e.to_string()));
            Vec::new()
        }
    };

    // --- Phase 4: sequential rate-limited writes ---
    progress.phase("Writing records");
    let mut written_threads: Vec<Thread> = Vec::new();
    let mut writes_per_document: HashMap<String, usize> = HashMap::new();
    let total = pending.len();

    for (i, thread) in pending.into_iter().enumerate() {
        if config.dry_run {
            info!(discussion = %thread.discussion_id, "dry run, skipping write");
            continue;
        }
        if i > 0 {
            tokio::time::sleep(config.write_delay).await;
        }

        let record = render_thread(&thread);
        match store.create_record(&record).await {
            Ok(record_id) => {
                progress.record_written(thread.discussion_id.as_str(), i + 1, total);
                info!(
                    discussion = %thread.discussion_id,
                    record = %record_id,
                    "record written"
                );
                *writes_per_document
                    .entry(thread.source_document.id.clone())
                    .or_default() += 1;
                written_threads.push(thread);
            }
            Err(e) => {
                warn!(discussion = %thread.discussion_id, error = %e, "write failed, continuing");
                errors.push((format!("write {}", thread.discussion_id), e.to_string()));
            }
        }
    }

    // --- Phase 5: flip document status where at least one write landed ---
    if !config.dry_run {
        progress.phase("Updating document status");
        let touched: HashSet<&String> = writes_per_document.keys().collect();
        for document in documents {
            if !touched.contains(&document.id) {
                continue;
            }
            if let Err(e) = store
                .update_document_status(&document.id, DocStatus::Processed)
                .await
            {
                warn!(document = %document.id, error = %e, "status update failed");
                errors.push((format!("status {}", document.id), e.to_string()));
            }
        }
    }

    // --- Phase 6: task guards per category ---
    let mut guards = Vec::new();
    if !config.dry_run {
        progress.phase("Evaluating task guards");
        for category in WorkCategory::ALL {
            let backlog = backlog_for(category, &written_threads);
            match run_guard(store, notifier, category, &backlog, config.backlog_preview).await {
                Ok(outcome) => guards.push(outcome),
                Err(e) => {
                    warn!(category = %category, error = %e, "guard evaluation failed");
                    errors.push((format!("guard {category}"), e.to_string()));
                }
            }
        }
    }

    let report = SyncReport {
        processed,
        written: written_threads.len(),
        errors,
        duration: start.elapsed(),
        success: true,
    };

    progress.done(&report);
    info!(
        processed = report.processed,
        written = report.written,
        errors = report.errors.len(),
        duration_ms = report.duration.as_millis(),
        "sync complete"
    );

    Ok(SyncOutcome { report, guards })
}

/// Backlog entries a category's guard aggregates this run.
///
/// The thread backlog covers every record written this run; the
/// classification backlog only those whose threads still contain
/// uncategorized members.
fn backlog_for(category: WorkCategory, written: &[Thread]) -> Vec<BacklogEntry> {
    written
        .iter()
        .filter(|thread| match category {
            WorkCategory::ThreadBacklog => true,
            WorkCategory::ClassificationBacklog => uncategorized_count(thread) > 0,
        })
        .map(|thread| BacklogEntry {
            id: thread.discussion_id.to_string(),
            title: thread.title.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NoopNotifier;
    use chrono::{TimeZone, Utc};
    use threadsync_client::MemDocStore;
    use threadsync_shared::{Annotation, Author, DiscussionId, Node, NodeKind, ThreadSyncError};

    fn node(id: &str, text: &str, has_children: bool) -> Node {
        Node {
            id: id.into(),
            kind: NodeKind::Paragraph,
            text: text.into(),
            has_children,
        }
    }

    fn annotation(id: &str, discussion: &str, minute: u32, text: &str) -> Annotation {
        Annotation {
            id: id.into(),
            discussion_id: DiscussionId::from(discussion),
            author: Author {
                id: format!("author-{id}"),
                name: Some("李雷".into()),
            },
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, minute, 0).unwrap(),
            text: text.into(),
        }
    }

    fn documents() -> Vec<DocumentEntry> {
        vec![DocumentEntry {
            id: "doc-1".into(),
            name: "术语表".into(),
        }]
    }

    fn config() -> SyncConfig {
        SyncConfig {
            write_delay: std::time::Duration::ZERO,
            backlog_preview: 10,
            dry_run: false,
        }
    }

    /// One node with a full Q/A/→ discussion.
    fn seed_scenario(store: &MemDocStore) {
        store.add_child("doc-1", node("n1", "缓存", false));
        store.add_annotation("n1", annotation("c1", "d1", 1, "Q: 什么是缓存?"));
        store.add_annotation("n1", annotation("c2", "d1", 2, "A: 一种加速访问的临时存储"));
        store.add_annotation("n1", annotation("c3", "d1", 3, "→: 补充示例"));
    }

    #[tokio::test]
    async fn syncs_discussion_into_one_record() {
        let store = MemDocStore::new();
        seed_scenario(&store);

        let outcome = run_sync(&store, &NoopNotifier, &documents(), &config(), &SilentProgress)
            .await
            .expect("sync runs");

        assert_eq!(outcome.report.processed, 1);
        assert_eq!(outcome.report.written, 1);
        assert!(outcome.report.success);

        let records = store.created_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "什么是缓存?");
        assert_eq!(records[0].blocks.len(), 5);
        assert_eq!(store.status_of("doc-1"), Some(DocStatus::Processed));
        // All members are classified, so only the thread backlog fires.
        assert!(outcome.action_task_created());
        assert_eq!(store.created_work_items().len(), 1);
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let store = MemDocStore::new();
        seed_scenario(&store);

        let first = run_sync(&store, &NoopNotifier, &documents(), &config(), &SilentProgress)
            .await
            .expect("first run");
        assert_eq!(first.report.written, 1);

        // No new annotations between runs.
        let second = run_sync(&store, &NoopNotifier, &documents(), &config(), &SilentProgress)
            .await
            .expect("second run");
        assert_eq!(second.report.written, 0);
        assert_eq!(second.report.processed, first.report.processed);
        assert_eq!(store.created_records().len(), 1);
    }

    #[tokio::test]
    async fn discussion_ids_never_duplicate_across_runs() {
        let store = MemDocStore::new();
        seed_scenario(&store);
        store.add_child("doc-1", node("n2", "索引", false));
        store.add_annotation("n2", annotation("c4", "d2", 4, "Q: 什么是索引?"));

        for _ in 0..3 {
            run_sync(&store, &NoopNotifier, &documents(), &config(), &SilentProgress)
                .await
                .expect("run");
        }

        let ids: Vec<String> = store
            .created_records()
            .iter()
            .map(|r| r.discussion_id.to_string())
            .collect();
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(ids.len(), unique.len());
        assert_eq!(unique.len(), 2);
    }

    #[tokio::test]
    async fn schema_failure_aborts_before_any_write() {
        let store = MemDocStore::new().with_invalid_schema();
        seed_scenario(&store);

        let err = run_sync(&store, &NoopNotifier, &documents(), &config(), &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, ThreadSyncError::Schema { .. }));
        assert!(store.created_records().is_empty());
        assert_eq!(store.status_of("doc-1"), None);
    }

    #[tokio::test]
    async fn write_failure_is_recorded_and_batch_continues() {
        let store = MemDocStore::new();
        seed_scenario(&store);
        store.add_child("doc-1", node("n2", "索引", false));
        store.add_annotation("n2", annotation("c4", "d2", 4, "Q: 什么是索引?"));
        store.fail_record(DiscussionId::from("d1"));

        let outcome = run_sync(&store, &NoopNotifier, &documents(), &config(), &SilentProgress)
            .await
            .expect("sync runs");

        assert_eq!(outcome.report.processed, 2);
        assert_eq!(outcome.report.written, 1);
        assert!(outcome.report.success);
        assert!(
            outcome
                .report
                .errors
                .iter()
                .any(|(context, _)| context == "write d1")
        );
        // One write landed, so the document still flips to Processed.
        assert_eq!(store.status_of("doc-1"), Some(DocStatus::Processed));
    }

    #[tokio::test]
    async fn document_with_zero_writes_stays_unprocessed() {
        let store = MemDocStore::new();
        seed_scenario(&store);
        store.fail_record(DiscussionId::from("d1"));

        let outcome = run_sync(&store, &NoopNotifier, &documents(), &config(), &SilentProgress)
            .await
            .expect("sync runs");

        assert_eq!(outcome.report.written, 0);
        assert_eq!(store.status_of("doc-1"), None);
        // Nothing written means no backlog, so no work item either.
        assert!(store.created_work_items().is_empty());
    }

    #[tokio::test]
    async fn tolerates_partial_tree_failures() {
        let store = MemDocStore::new();
        seed_scenario(&store);
        store.add_child("doc-1", node("broken", "", true));
        store.fail_children_of("broken");
        store.add_child("doc-1", node("n3", "后记", false));
        store.fail_annotations_of("n3");

        let outcome = run_sync(&store, &NoopNotifier, &documents(), &config(), &SilentProgress)
            .await
            .expect("sync runs");

        assert_eq!(outcome.report.written, 1);
        assert_eq!(outcome.report.errors.len(), 2);
        assert!(outcome.report.success);
    }

    #[tokio::test]
    async fn classification_backlog_only_for_uncategorized_members() {
        let store = MemDocStore::new();
        seed_scenario(&store);
        store.add_child("doc-1", node("n2", "索引", false));
        store.add_annotation("n2", annotation("c4", "d2", 4, "Q: 什么是索引?"));
        store.add_annotation("n2", annotation("c5", "d2", 5, "随口一提"));

        let outcome = run_sync(&store, &NoopNotifier, &documents(), &config(), &SilentProgress)
            .await
            .expect("sync runs");
        assert_eq!(outcome.report.written, 2);

        let items = store.created_work_items();
        assert_eq!(items.len(), 2);
        let classification = items
            .iter()
            .find(|i| i.category == WorkCategory::ClassificationBacklog)
            .expect("classification item");
        // Only d2 has an uncategorized member.
        assert_eq!(classification.related_ids, vec!["d2".to_string()]);
        let thread_backlog = items
            .iter()
            .find(|i| i.category == WorkCategory::ThreadBacklog)
            .expect("thread item");
        assert_eq!(thread_backlog.related_ids.len(), 2);
    }

    #[tokio::test]
    async fn unresolved_work_item_suppresses_task_creation() {
        let store = MemDocStore::new();
        seed_scenario(&store);
        store.seed_work_item(threadsync_shared::WorkItem {
            id: "w-open".into(),
            title: "还没做完".into(),
            category: WorkCategory::ThreadBacklog,
            status: threadsync_shared::WorkStatus::InProgress,
            related_ids: vec![],
            created_at: Utc::now(),
        });

        let outcome = run_sync(&store, &NoopNotifier, &documents(), &config(), &SilentProgress)
            .await
            .expect("sync runs");

        assert_eq!(outcome.report.written, 1);
        assert!(!outcome.action_task_created());
        assert!(store.created_work_items().is_empty());
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let store = MemDocStore::new();
        seed_scenario(&store);
        let mut cfg = config();
        cfg.dry_run = true;

        let outcome = run_sync(&store, &NoopNotifier, &documents(), &cfg, &SilentProgress)
            .await
            .expect("sync runs");

        assert_eq!(outcome.report.processed, 1);
        assert_eq!(outcome.report.written, 0);
        assert!(store.created_records().is_empty());
        assert!(store.created_work_items().is_empty());
        assert_eq!(store.status_of("doc-1"), None);
    }
}
