use margin_core::{
    Action, CommentWorkspace, Confirmation, Document, EditorId, EmbedSize, EmbedSpec,
    FixedGeometry, MAIN_EDITOR, MarginConfig, Mark, MarkState, PointerEvent, PointerKind, Rect,
    SelectionKind, Source, SubmitError, ThreadId, ThreadStatus, Viewport,
};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const SUB_EDITOR: EditorId = EditorId::new(7);

fn workspace() -> CommentWorkspace<FixedGeometry> {
    let mut ws = CommentWorkspace::new(FixedGeometry::new(), MarginConfig::default());
    ws.open_document(
        MAIN_EDITOR,
        Document::from_text("Quarterly report\nRevenue grew in every region.\nCosts were flat."),
    );
    ws.open_document(SUB_EDITOR, Document::from_text("Embedded table caption"));
    ws.set_viewport(Viewport {
        scroll_top: 0.0,
        height: 800.0,
    });
    ws
}

fn record(ws: &mut CommentWorkspace<FixedGeometry>) -> Arc<Mutex<Vec<Action>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    ws.subscribe(move |action| sink.lock().unwrap().push(action.clone()));
    log
}

/// Create a thread and carry it through a successful first comment.
fn confirmed_thread(
    ws: &mut CommentWorkspace<FixedGeometry>,
    editor: EditorId,
    index: usize,
    len: usize,
    server_id: &str,
) -> ThreadId {
    let created = ws.create_thread(editor, index, len, SelectionKind::Text).unwrap();
    let submission = ws.submit_comment(&created.id, 1, "looks good").unwrap();
    ws.settle_submission(
        &submission,
        Ok(Confirmation {
            thread_id: server_id.into(),
            comment_id: format!("{server_id}-c1"),
        }),
    );
    created.id
}

#[test]
fn test_full_thread_lifecycle_is_dispatched() {
    let mut ws = workspace();
    let log = record(&mut ws);

    let mark = confirmed_thread(&mut ws, MAIN_EDITOR, 17, 7, "srv-1");
    assert!(ws.resolve_thread(&"srv-1".into()));

    let kinds: Vec<&'static str> = log
        .lock()
        .unwrap()
        .iter()
        .map(|action| match action {
            Action::CreateNewCommentThread { .. } => "create",
            Action::SelectCommentThread { .. } => "select",
            Action::DeselectCommentThread => "deselect",
            Action::NewCommentDispatched { .. } => "dispatched",
            Action::NewCommentPosted { .. } => "posted",
            Action::ResolveThread { .. } => "resolve",
            _ => "other",
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["create", "select", "dispatched", "posted", "deselect", "resolve"]
    );
    assert!(ws.document(MAIN_EDITOR).unwrap().marked_spans().is_empty());
    assert!(!ws.marks().anchors().contains(&mark));
    assert!(ws.store().threads().is_empty());
}

#[test]
fn test_selection_is_shared_across_editors() {
    let mut ws = workspace();
    let in_main = confirmed_thread(&mut ws, MAIN_EDITOR, 0, 9, "a");
    let in_sub = confirmed_thread(&mut ws, SUB_EDITOR, 0, 8, "b");

    // Creating the second thread moved the selection to it.
    assert_eq!(ws.router().state_of(&in_main), MarkState::None);
    assert_eq!(ws.run_state_at(SUB_EDITOR, 2), MarkState::Selected);

    ws.pointer(&PointerEvent::new(PointerKind::Click, in_main.clone()));
    assert_eq!(ws.run_state_at(MAIN_EDITOR, 2), MarkState::Selected);
    assert_eq!(ws.run_state_at(SUB_EDITOR, 2), MarkState::None);
    assert_eq!(ws.store().selected_mark(), Some(&in_main));

    ws.pointer(&PointerEvent::new(PointerKind::Enter, in_sub.clone()));
    assert_eq!(ws.run_state_at(SUB_EDITOR, 2), MarkState::Highlighted);
    ws.clear_selection();
    assert_eq!(ws.router().selected(), None);
}

#[test]
fn test_select_scrolls_viewport() {
    let mut ws = workspace();
    let mark = confirmed_thread(&mut ws, MAIN_EDITOR, 17, 7, "srv");
    ws.clear_selection();
    ws.geometry_mut()
        .set_anchor(mark.clone(), Rect::new(1000.0, 40.0, 56.0, 18.0));

    ws.select(&mark);
    let expected = 1000.0 - 0.31 * 800.0;
    assert!((ws.viewport().scroll_top - expected).abs() < 1e-9);
}

#[test]
fn test_failed_submission_is_retried() {
    let mut ws = workspace();
    let created = ws.create_thread(MAIN_EDITOR, 0, 9, SelectionKind::Text).unwrap();
    let submission = ws.submit_comment(&created.id, 3, "draft text").unwrap();
    ws.settle_submission(&submission, Err(SubmitError::Backend("offline".into())));
    assert_eq!(ws.store().thread(&created.id).unwrap().status(), ThreadStatus::Error);

    // The mark is still hidden: the thread does not exist on the backend.
    assert_eq!(ws.visible_ids_at(MAIN_EDITOR, 1), None);

    let retry = ws.retry_comment(&created.id).unwrap();
    assert_eq!(retry.body, "draft text");
    ws.settle_submission(
        &retry,
        Ok(Confirmation {
            thread_id: "srv".into(),
            comment_id: "c".into(),
        }),
    );
    assert_eq!(
        ws.visible_ids_at(MAIN_EDITOR, 1),
        Some(vec![created.id.clone()])
    );
}

#[test]
fn test_embed_thread_and_large_embed_collapse() {
    let mut ws = workspace();
    let key = ws
        .edit(MAIN_EDITOR, |doc| {
            doc.insert_block_embed(17, EmbedSpec::new("chart", EmbedSize::Large), Source::User)
        })
        .unwrap()
        .unwrap();

    let on_embed = ws.create_thread_on_embed(MAIN_EDITOR, key).unwrap();
    let beside = confirmed_thread(&mut ws, MAIN_EDITOR, 0, 9, "beside");
    ws.clear_selection();

    ws.geometry_mut()
        .set_embed(key, Rect::new(200.0, 0.0, 600.0, 400.0))
        .set_anchor(on_embed.id.clone(), Rect::new(200.0, 0.0, 600.0, 400.0))
        .set_anchor(beside.clone(), Rect::new(20.0, 0.0, 60.0, 18.0));

    let cards = ws.layout();
    let collapsed: Vec<(ThreadId, bool)> = cards.iter().map(|c| (c.mark_id.clone(), c.collapsed)).collect();
    assert_eq!(collapsed, vec![(beside, false), (on_embed.id.clone(), true)]);

    ws.select(&on_embed.id);
    let cards = ws.layout();
    assert!(cards.iter().all(|c| !c.collapsed));
}

#[test]
fn test_anchor_deleted_by_edit_drops_from_layout() {
    let mut ws = workspace();
    let mark = confirmed_thread(&mut ws, MAIN_EDITOR, 17, 7, "srv");
    ws.geometry_mut()
        .set_anchor(mark.clone(), Rect::new(40.0, 0.0, 50.0, 18.0));
    assert_eq!(ws.layout().len(), 1);

    ws.edit(MAIN_EDITOR, |doc| doc.delete(17, 8, Source::User))
        .unwrap()
        .unwrap();
    assert!(!ws.marks().anchors().contains(&mark));

    // The renderer no longer reports the anchor either.
    ws.geometry_mut().remove_anchor(&mark);
    assert!(ws.layout().is_empty());
    assert!(ws.store().has_thread(&mark));
}

#[test]
fn test_set_threads_strips_resolved_marks() {
    let mut ws = workspace();
    let mark = confirmed_thread(&mut ws, MAIN_EDITOR, 0, 9, "srv");
    let mut snapshot = ws.store().thread(&mark).unwrap().clone();
    snapshot.resolved = true;

    ws.set_threads(vec![snapshot]);
    assert!(!ws.store().has_thread(&mark));
    assert!(ws.document(MAIN_EDITOR).unwrap().marked_spans().is_empty());
}

#[test]
fn test_marks_without_a_thread_render_unmarked() {
    let mut ws = workspace();
    let orphan = Mark::new([ThreadId::from("orphan")]).unwrap();
    ws.edit(MAIN_EDITOR, |doc| doc.format_text(0, 9, Some(&orphan), Source::Api))
        .unwrap()
        .unwrap();
    assert_eq!(ws.visible_ids_at(MAIN_EDITOR, 2), None);
    assert_eq!(ws.run_state_at(MAIN_EDITOR, 2), MarkState::None);

    // A confirmed thread that drops out of the backend snapshot stops rendering.
    let mark = confirmed_thread(&mut ws, MAIN_EDITOR, 17, 7, "srv");
    assert_eq!(ws.visible_ids_at(MAIN_EDITOR, 18), Some(vec![mark.clone()]));
    ws.set_threads(Vec::new());
    assert!(ws.store().threads().is_empty());
    assert_eq!(ws.visible_ids_at(MAIN_EDITOR, 18), None);
}

#[test]
fn test_reflow_is_debounced_for_resizes() {
    let mut ws = workspace();
    let start = Instant::now() + Duration::from_secs(1);
    // Drain whatever opening the documents requested.
    assert!(ws.take_reflow(start).is_some());
    assert!(ws.take_reflow(start).is_none());

    ws.window_resized(start);
    ws.window_resized(start + Duration::from_millis(100));
    assert!(ws.take_reflow(start + Duration::from_millis(200)).is_none());
    assert!(ws.take_reflow(start + Duration::from_millis(260)).is_some());

    ws.panel_resized();
    assert!(ws.take_reflow(start + Duration::from_millis(261)).is_some());
}

#[test]
fn test_closing_a_document_forgets_its_anchors() {
    let mut ws = workspace();
    let mark = confirmed_thread(&mut ws, SUB_EDITOR, 0, 8, "srv");
    assert_eq!(ws.marks().anchors().editors(&mark), vec![SUB_EDITOR]);
    assert!(ws.close_document(SUB_EDITOR).is_some());
    assert!(!ws.marks().anchors().contains(&mark));
}
