use margin_core::{
    Action, Comment, Confirmation, Document, EditorId, MarkManager, SelectionKind, Source,
    ThreadId, ThreadStore, formats_of, ids_of,
};
use pretty_assertions::assert_eq;

const MAIN: EditorId = EditorId::new(0);

fn ids(raw: &[&str]) -> Vec<ThreadId> {
    raw.iter().map(|s| ThreadId::from(*s)).collect()
}

fn mark(manager: &mut MarkManager, doc: &mut Document, id: &str, index: usize, len: usize) {
    let created = manager.create_with_id(id.into(), MAIN, doc, index, len, SelectionKind::Text);
    assert!(created.anchored, "thread {id} should anchor");
}

#[test]
fn test_newest_id_is_prepended() {
    let mut doc = Document::from_text("overlapping threads");
    let mut manager = MarkManager::new();
    mark(&mut manager, &mut doc, "t1", 0, 11);
    mark(&mut manager, &mut doc, "t2", 0, 11);
    mark(&mut manager, &mut doc, "t3", 4, 3);

    assert_eq!(ids_of(doc.mark_at(0)), ids(&["t2", "t1"]).as_slice());
    assert_eq!(ids_of(doc.mark_at(5)), ids(&["t3", "t2", "t1"]).as_slice());
    assert_eq!(ids_of(doc.mark_at(12)), &[] as &[ThreadId]);
}

#[test]
fn test_partial_overlap_splits_runs() {
    let mut doc = Document::from_text("abcdefgh");
    let mut manager = MarkManager::new();
    mark(&mut manager, &mut doc, "a", 0, 5);
    mark(&mut manager, &mut doc, "b", 3, 5);

    let shape: Vec<(usize, usize, Vec<ThreadId>)> = doc
        .marked_spans()
        .into_iter()
        .map(|span| (span.index, span.len, Vec::from(span.mark)))
        .collect();
    assert_eq!(
        shape,
        vec![
            (0, 3, ids(&["a"])),
            (3, 2, ids(&["b", "a"])),
            (5, 3, ids(&["b"])),
        ]
    );
}

#[test]
fn test_removing_last_id_clears_attribute() {
    let mut doc = Document::from_text("abcdef");
    let mut manager = MarkManager::new();
    mark(&mut manager, &mut doc, "solo", 1, 3);

    let touched = manager.remove_from(&"solo".into(), MAIN, &mut doc);
    assert_eq!(touched, 1);
    assert!(doc.mark_at(2).is_none());
    assert!(doc.marked_spans().is_empty());
    assert_eq!(formats_of(doc.mark_at(2), &margin_core::ShowAll), None);
}

#[test]
fn test_removing_one_of_many_keeps_order() {
    let mut doc = Document::from_text("abcdef");
    let mut manager = MarkManager::new();
    for id in ["x", "y", "z"] {
        mark(&mut manager, &mut doc, id, 0, 6);
    }
    assert_eq!(ids_of(doc.mark_at(0)), ids(&["z", "y", "x"]).as_slice());

    manager.remove_from(&"y".into(), MAIN, &mut doc);
    assert_eq!(ids_of(doc.mark_at(0)), ids(&["z", "x"]).as_slice());
    // The runs stay coalesced into one.
    assert_eq!(doc.marked_spans().len(), 1);
}

#[test]
fn test_filtered_view_hides_unconfirmed_and_resolved() {
    let mut doc = Document::from_text("shared anchor");
    let mut manager = MarkManager::new();
    let mut store = ThreadStore::new();

    for id in ["draft", "posting", "live", "done"] {
        mark(&mut manager, &mut doc, id, 0, 6);
        store.reduce(&Action::CreateNewCommentThread {
            id: id.into(),
            index: 0,
            length: 6,
        });
    }

    // "posting": first comment in flight.
    let (_, dispatched) = store.prepare_submit(&"posting".into(), 1, "hi").unwrap();
    store.reduce(&dispatched);

    // "live" and "done": confirmed, then "done" resolved.
    for id in ["live", "done"] {
        let (submission, dispatched) = store.prepare_submit(&id.into(), 1, "hi").unwrap();
        store.reduce(&dispatched);
        store.reduce(&submission.settle(Ok(Confirmation {
            thread_id: format!("srv-{id}").into(),
            comment_id: format!("c-{id}"),
        })));
    }
    store.reduce(&Action::ResolveThread { id: "srv-done".into() });

    let raw = ids_of(doc.mark_at(0)).to_vec();
    assert_eq!(raw, ids(&["done", "live", "posting", "draft"]));
    assert_eq!(formats_of(doc.mark_at(0), &store), Some(ids(&["live"])));
}

#[test]
fn test_inserted_text_inside_run_inherits_mark() {
    let mut doc = Document::from_text("abcdef");
    let mut manager = MarkManager::new();
    mark(&mut manager, &mut doc, "t", 1, 4);

    doc.insert_text(3, "XY", Source::User).unwrap();
    assert_eq!(ids_of(doc.mark_at(3)), ids(&["t"]).as_slice());

    doc.insert_text(1, "<", Source::User).unwrap();
    assert!(doc.mark_at(1).is_none());
}

#[test]
fn test_comment_helper_reports_mentions() {
    let comment = Comment::local(7, "ping <@U12> and <@U3>", 0);
    assert_eq!(comment.mentioned_user_ids(), vec![12, 3]);
}
