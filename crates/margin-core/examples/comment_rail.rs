//! Walk a document through the comment flow and print the resulting rail.

use margin_core::mentions::{Member, to_plain_text, tokenize};
use margin_core::{
    CommentWorkspace, Confirmation, Document, FixedGeometry, MAIN_EDITOR, MarginConfig, Rect,
    SelectionKind, Viewport,
};

fn main() {
    let mut ws = CommentWorkspace::new(FixedGeometry::new(), MarginConfig::default());
    ws.open_document(
        MAIN_EDITOR,
        Document::from_text("Launch plan\nShip the beta on Friday.\nTell support on Monday."),
    );
    ws.set_viewport(Viewport {
        scroll_top: 0.0,
        height: 900.0,
    });
    ws.subscribe(|action| println!("action: {action:?}"));

    let members = vec![Member::new(2, "Ada"), Member::new(3, "Grace")];
    let mut marks = Vec::new();
    for (n, (index, len)) in [(12usize, 4usize), (21, 6), (36, 7)].into_iter().enumerate() {
        let Some(created) = ws.create_thread(MAIN_EDITOR, index, len, SelectionKind::Text) else {
            continue;
        };
        let body = format!("Thoughts, <@U{}>?", 2 + n % 2);
        if let Some(submission) = ws.submit_comment(&created.id, 1, &body) {
            ws.settle_submission(
                &submission,
                Ok(Confirmation {
                    thread_id: format!("srv-{n}").into(),
                    comment_id: format!("c-{n}"),
                }),
            );
        }
        ws.geometry_mut().set_anchor(
            created.id.clone(),
            Rect::new(40.0 + n as f64 * 20.0, 60.0, 80.0, 18.0),
        );
        marks.push(created.id);
    }

    for card in ws.layout() {
        let excerpt = ws.anchor_excerpt(&card.mark_id, 12).unwrap_or_default();
        let body = ws
            .store()
            .thread(&card.mark_id)
            .and_then(|thread| thread.comments().first().map(|c| c.comment.clone()))
            .unwrap_or_default();
        let rendered = to_plain_text(&tokenize(&body, &members));
        println!(
            "{:>7.1}px  {:<14} {}  {}",
            card.top,
            format!("\"{excerpt}\""),
            if card.collapsed { "(collapsed)" } else { "" },
            rendered
        );
    }
    println!("{} threads anchored", marks.len());
}
