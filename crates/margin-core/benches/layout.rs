use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use margin_core::{
    Document, EditorId, FixedGeometry, MarginConfig, MarkManager, Rect, ScrollOffsets,
    SelectionKind, ThreadAnchor, ThreadId, layout,
};

fn dense_threads(count: usize) -> (Vec<ThreadAnchor>, FixedGeometry) {
    let mut geometry = FixedGeometry::new();
    let threads: Vec<ThreadAnchor> = (0..count)
        .map(|i| {
            let id = format!("thread-{i:05}");
            // Anchors every 24px: most cards collide with their neighbours.
            geometry.set_anchor(id.as_str(), Rect::new(i as f64 * 24.0, 80.0, 120.0, 18.0));
            ThreadAnchor::new(id.as_str(), id.as_str())
        })
        .collect();
    (threads, geometry)
}

fn bench_layout_pass(c: &mut Criterion) {
    let (threads, geometry) = dense_threads(1_000);
    let config = MarginConfig::default();
    let selected = ThreadId::from("thread-00500");

    c.bench_function("layout/1k_threads_no_selection", |b| {
        b.iter(|| {
            let out = layout(
                black_box(&threads),
                None,
                &[],
                ScrollOffsets::default(),
                &geometry,
                &config,
            );
            black_box(out.len());
        })
    });

    c.bench_function("layout/1k_threads_selected_middle", |b| {
        b.iter(|| {
            let out = layout(
                black_box(&threads),
                Some(&selected),
                &[],
                ScrollOffsets::default(),
                &geometry,
                &config,
            );
            black_box(out.len());
        })
    });
}

fn bench_overlapping_marks(c: &mut Criterion) {
    let text = "the quick brown fox jumps over the lazy dog\n".repeat(500);
    c.bench_function("marks/200_overlapping_threads", |b| {
        b.iter_batched(
            || Document::from_text(&text),
            |mut doc| {
                let mut manager = MarkManager::new();
                for i in 0..200 {
                    let index = (i * 97) % (doc.len() - 200);
                    manager.create(EditorId::new(0), &mut doc, index, 150, SelectionKind::Text);
                }
                black_box(doc.marked_spans().len());
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_layout_pass, bench_overlapping_marks);
criterion_main!(benches);
