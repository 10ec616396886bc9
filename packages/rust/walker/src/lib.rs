//! Tree walker: flattens a document's content tree into a node list.
//!
//! Traversal is an explicit worklist of pending node ids processed
//! iteratively — never recursion — so depth is unbounded without stack
//! growth. Each level is paged until the store reports `has_more == false`.
//! A failed subtree fetch is logged and skipped; a partial result is
//! acceptable and expected under API flakiness.

use std::collections::VecDeque;

use tracing::{debug, instrument, warn};

use threadsync_client::DocStore;
use threadsync_shared::Node;

/// Result of one tree walk. Never an error: failures degrade to a smaller
/// node set plus per-subtree error records.
#[derive(Debug, Default)]
pub struct WalkOutcome {
    /// Every descendant node reached from the root.
    pub nodes: Vec<Node>,
    /// Subtrees that could not be fetched, as `(node_id, message)` pairs.
    pub errors: Vec<(String, String)>,
}

/// Enumerate all descendant nodes of `root_id`, unboundedly deep.
#[instrument(skip_all, fields(root_id = %root_id))]
pub async fn walk_tree<S: DocStore>(store: &S, root_id: &str) -> WalkOutcome {
    let mut outcome = WalkOutcome::default();
    let mut pending: VecDeque<String> = VecDeque::from([root_id.to_string()]);

    while let Some(node_id) = pending.pop_front() {
        let mut cursor: Option<String> = None;

        loop {
            let page = match store.list_children(&node_id, cursor.take()).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(node_id = %node_id, error = %e, "subtree fetch failed, skipping");
                    outcome.errors.push((node_id.clone(), e.to_string()));
                    break;
                }
            };

            for child in page.items {
                if child.has_children {
                    pending.push_back(child.id.clone());
                }
                outcome.nodes.push(child);
            }

            if !page.has_more {
                break;
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                // Store claimed more pages but gave no cursor; stop here.
                warn!(node_id = %node_id, "has_more without next_cursor, stopping pagination");
                break;
            }
        }
    }

    debug!(
        nodes = outcome.nodes.len(),
        errors = outcome.errors.len(),
        "walk complete"
    );
    outcome
}
