//! Content renderer: one accepted thread → one target record.
//!
//! Block order is fixed and reproduced exactly:
//! section header, Q members, A members, one quoted source-node block,
//! → members, then uncategorized members with author and timestamp.
//! Rendering never fails; malformed or empty annotation text renders as an
//! empty content string.

use threadsync_shared::{
    Annotation, AnnotationClass, Block, TargetRecord, Thread, classify, split_prefixed,
};

/// Header text of the rendered discussion section.
const SECTION_HEADER: &str = "讨论";

/// Timestamp format used for uncategorized members.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Render a thread into the target record written to the tabular store.
pub fn render_thread(thread: &Thread) -> TargetRecord {
    let mut blocks = Vec::with_capacity(thread.members.len() + 2);

    blocks.push(Block::Heading(SECTION_HEADER.to_string()));

    push_classified(&mut blocks, thread, AnnotationClass::Question);
    push_classified(&mut blocks, thread, AnnotationClass::Answer);

    blocks.push(Block::Quote(thread.source_node.plain_text()));

    push_classified(&mut blocks, thread, AnnotationClass::FollowUp);

    for member in &thread.members {
        if classify(&member.text) == AnnotationClass::Other {
            blocks.push(Block::Text(uncategorized_line(member)));
        }
    }

    TargetRecord {
        title: thread.title.clone(),
        discussion_id: thread.discussion_id.clone(),
        source_document: thread.source_document.clone(),
        blocks,
    }
}

/// Append one text block per member of the given class, in member order,
/// prefix stripped and re-emitted in canonical display form.
fn push_classified(blocks: &mut Vec<Block>, thread: &Thread, class: AnnotationClass) {
    for member in &thread.members {
        match split_prefixed(&member.text) {
            Some((got, rest)) if got == class => {
                blocks.push(Block::Text(format!("{}{rest}", class.display_prefix())));
            }
            _ => {}
        }
    }
}

/// Uncategorized members keep their content unmodified, prefixed with the
/// author's display name and a formatted timestamp.
fn uncategorized_line(member: &Annotation) -> String {
    format!(
        "{}（{}）：{}",
        member.author.display_name(),
        member.created_at.format(TIMESTAMP_FORMAT),
        member.text
    )
}
