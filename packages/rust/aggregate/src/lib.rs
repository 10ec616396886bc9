//! Comment aggregation and deduplication.
//!
//! Annotations are fetched per node with the same tolerant-continue policy
//! as the tree walk, grouped into discussion threads, and filtered down to
//! valid ones (at least one recognized prefix). Dedup against the target
//! store's discussion keys is a pure function and the pipeline's single
//! idempotence checkpoint.

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument, warn};

use threadsync_client::DocStore;
use threadsync_shared::{
    Annotation, DiscussionId, DocumentRef, Node, Thread, classify, split_prefixed,
};

/// Result of aggregating one document's annotations.
#[derive(Debug, Default)]
pub struct Aggregation {
    /// Valid threads in discovery order.
    pub threads: Vec<Thread>,
    /// Nodes whose annotation fetch failed, as `(node_id, message)` pairs.
    pub errors: Vec<(String, String)>,
}

/// Fetch annotations for every node and group them into threads.
///
/// A node whose fetch fails is treated as having zero annotations. An empty
/// node set yields zero threads; neither case is an error.
#[instrument(skip_all, fields(document = %document.name, nodes = nodes.len()))]
pub async fn collect_threads<S: DocStore>(
    store: &S,
    nodes: &[Node],
    document: &DocumentRef,
) -> Aggregation {
    let mut annotated: Vec<(Node, Annotation)> = Vec::new();
    let mut errors = Vec::new();

    for node in nodes {
        match store.list_annotations(&node.id).await {
            Ok(annotations) => {
                for annotation in annotations {
                    annotated.push((node.clone(), annotation));
                }
            }
            Err(e) => {
                warn!(node_id = %node.id, error = %e, "annotation fetch failed, treating as empty");
                errors.push((node.id.clone(), e.to_string()));
            }
        }
    }

    let threads = group_into_threads(annotated, document);
    debug!(
        threads = threads.len(),
        errors = errors.len(),
        "aggregation complete"
    );

    Aggregation { threads, errors }
}

/// Group `(node, annotation)` pairs into valid threads.
///
/// Groups keep first-seen order; members are stable-sorted by `created_at`
/// ascending, so fetch order breaks ties. A group becomes a thread only if
/// at least one member carries a recognized prefix, and the title comes from
/// the first *chronological* prefixed member.
pub fn group_into_threads(
    annotated: Vec<(Node, Annotation)>,
    document: &DocumentRef,
) -> Vec<Thread> {
    struct Draft {
        discussion_id: DiscussionId,
        source_node: Node,
        members: Vec<Annotation>,
    }

    let mut drafts: Vec<Draft> = Vec::new();
    let mut index: HashMap<DiscussionId, usize> = HashMap::new();

    for (node, annotation) in annotated {
        match index.get(&annotation.discussion_id) {
            Some(&i) => drafts[i].members.push(annotation),
            None => {
                index.insert(annotation.discussion_id.clone(), drafts.len());
                drafts.push(Draft {
                    discussion_id: annotation.discussion_id.clone(),
                    source_node: node,
                    members: vec![annotation],
                });
            }
        }
    }

    drafts
        .into_iter()
        .filter_map(|mut draft| {
            // Stable sort: ties keep original fetch order.
            draft.members.sort_by_key(|m| m.created_at);

            let title = draft
                .members
                .iter()
                .find_map(|m| split_prefixed(&m.text))
                .map(|(_, rest)| rest.to_string())?;

            Some(Thread {
                discussion_id: draft.discussion_id,
                title,
                members: draft.members,
                source_node: draft.source_node,
                source_document: document.clone(),
            })
        })
        .collect()
}

/// Keep only threads whose discussion id is absent from the target store.
///
/// Pure, synchronous, total. Re-running the pipeline with no new annotations
/// therefore produces zero writes.
pub fn dedup_threads(threads: Vec<Thread>, existing: &HashSet<DiscussionId>) -> Vec<Thread> {
    threads
        .into_iter()
        .filter(|thread| !existing.contains(&thread.discussion_id))
        .collect()
}

/// Count members of a thread that are still uncategorized.
pub fn uncategorized_count(thread: &Thread) -> usize {
    thread
        .members
        .iter()
        .filter(|m| !classify(&m.text).is_recognized())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use threadsync_client::MemDocStore;
    use threadsync_shared::{Author, NodeKind};

    fn node(id: &str) -> Node {
        Node {
            id: id.into(),
            kind: NodeKind::Paragraph,
            text: format!("text of {id}"),
            has_children: false,
        }
    }

    fn annotation(id: &str, discussion: &str, minute: u32, text: &str) -> Annotation {
        Annotation {
            id: id.into(),
            discussion_id: DiscussionId::from(discussion),
            author: Author {
                id: format!("author-{id}"),
                name: None,
            },
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, minute, 0).unwrap(),
            text: text.into(),
        }
    }

    fn doc() -> DocumentRef {
        DocumentRef {
            id: "doc-1".into(),
            name: "术语表".into(),
        }
    }

    #[test]
    fn groups_by_discussion_and_sorts_by_time() {
        let n = node("n1");
        let annotated = vec![
            (n.clone(), annotation("c2", "d1", 2, "A: 一种加速访问的临时存储")),
            (n.clone(), annotation("c1", "d1", 1, "Q: 什么是缓存?")),
            (n.clone(), annotation("c3", "d2", 3, "Q: 另一个问题")),
        ];

        let threads = group_into_threads(annotated, &doc());
        assert_eq!(threads.len(), 2);
        // First-seen group order is preserved.
        assert_eq!(threads[0].discussion_id.as_str(), "d1");
        // Members sorted chronologically regardless of fetch order.
        assert_eq!(threads[0].members[0].id, "c1");
        assert_eq!(threads[0].members[1].id, "c2");
        assert_eq!(threads[0].title, "什么是缓存?");
        assert_eq!(threads[1].title, "另一个问题");
    }

    #[test]
    fn member_ordering_is_non_decreasing() {
        let n = node("n1");
        let annotated = vec![
            (n.clone(), annotation("c3", "d1", 5, "→ later")),
            (n.clone(), annotation("c1", "d1", 1, "Q: q")),
            (n.clone(), annotation("c2", "d1", 3, "A: a")),
        ];
        let threads = group_into_threads(annotated, &doc());
        let times: Vec<_> = threads[0].members.iter().map(|m| m.created_at).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn ties_keep_fetch_order() {
        let n = node("n1");
        let annotated = vec![
            (n.clone(), annotation("first", "d1", 1, "Q: same minute")),
            (n.clone(), annotation("second", "d1", 1, "plain reply")),
        ];
        let threads = group_into_threads(annotated, &doc());
        assert_eq!(threads[0].members[0].id, "first");
        assert_eq!(threads[0].members[1].id, "second");
    }

    #[test]
    fn title_comes_from_first_chronological_prefixed_member() {
        let n = node("n1");
        // Fetched out of order; the unprefixed member is oldest.
        let annotated = vec![
            (n.clone(), annotation("c3", "d1", 3, "Q: the real title")),
            (n.clone(), annotation("c1", "d1", 1, "context without prefix")),
            (n.clone(), annotation("c2", "d1", 2, "A: an early answer")),
        ];
        let threads = group_into_threads(annotated, &doc());
        // c2 (A-prefixed) is chronologically first among prefixed members.
        assert_eq!(threads[0].title, "an early answer");
    }

    #[test]
    fn unprefixed_group_is_not_a_thread() {
        let n = node("n1");
        let annotated = vec![
            (n.clone(), annotation("c1", "d1", 1, "just chatter")),
            (n.clone(), annotation("c2", "d1", 2, "more chatter")),
        ];
        assert!(group_into_threads(annotated, &doc()).is_empty());
    }

    #[test]
    fn dedup_is_pure_and_keeps_order() {
        let n = node("n1");
        let threads = group_into_threads(
            vec![
                (n.clone(), annotation("c1", "d1", 1, "Q: one")),
                (n.clone(), annotation("c2", "d2", 2, "Q: two")),
                (n.clone(), annotation("c3", "d3", 3, "Q: three")),
            ],
            &doc(),
        );

        let existing: HashSet<DiscussionId> = [DiscussionId::from("d2")].into();
        let kept = dedup_threads(threads, &existing);
        let ids: Vec<&str> = kept.iter().map(|t| t.discussion_id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d3"]);

        // Nothing new: everything filtered.
        let all: HashSet<DiscussionId> = ["d1", "d3"].map(DiscussionId::from).into();
        let again = dedup_threads(kept, &all);
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn failed_annotation_fetch_treated_as_empty() {
        let store = MemDocStore::new();
        store.add_annotation("n1", annotation("c1", "d1", 1, "Q: survives"));
        store.add_annotation("n2", annotation("c2", "d2", 2, "Q: lost"));
        store.fail_annotations_of("n2");

        let nodes = vec![node("n1"), node("n2")];
        let aggregation = collect_threads(&store, &nodes, &doc()).await;

        assert_eq!(aggregation.threads.len(), 1);
        assert_eq!(aggregation.threads[0].discussion_id.as_str(), "d1");
        assert_eq!(aggregation.errors.len(), 1);
        assert_eq!(aggregation.errors[0].0, "n2");
    }

    #[tokio::test]
    async fn empty_node_set_yields_zero_threads() {
        let store = MemDocStore::new();
        let aggregation = collect_threads(&store, &[], &doc()).await;
        assert!(aggregation.threads.is_empty());
        assert!(aggregation.errors.is_empty());
    }
}
