//! Outbound link scan benchmark.
//!
//! Measures starting and stopping outbound tracking over documents with a
//! growing number of links, half of them off-site.
//!
//! Run with: cargo bench --bench outbound_scan
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use plausible_tracker::tracker::outbound::outbound_anchors;
use plausible_tracker::{EventData, RecordingTransport, Tracker, Window};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const LINK_COUNTS: &[usize] = &[100, 1_000, 10_000];

// ============================================================================
// Fixtures
// ============================================================================

fn document_with_links(count: usize) -> Window {
    let window = Window::new("https://example.com/").expect("window");
    let document = window.document();
    let root = document.root();

    for section_index in 0..count / 10 {
        let section = document.create_element("section");
        root.append_child(&section).expect("append section");
        for link_index in 0..10 {
            let href = if link_index % 2 == 0 {
                format!("/page/{section_index}/{link_index}")
            } else {
                format!("https://site{link_index}.example.org/{section_index}")
            };
            section
                .append_child(&document.create_anchor(&href))
                .expect("append link");
        }
    }
    window
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("outbound_scan");

    for &count in LINK_COUNTS {
        let window = document_with_links(count);
        let host = window.location().host();
        let root = window.document().root();

        group.bench_with_input(BenchmarkId::new("qualify", count), &count, |b, _| {
            b.iter(|| black_box(outbound_anchors(&root, &host).len()));
        });
    }

    group.finish();
}

fn bench_start_stop(c: &mut Criterion) {
    let mut group = c.benchmark_group("outbound_start_stop");
    group.sample_size(20);

    for &count in LINK_COUNTS {
        let window = document_with_links(count);
        let tracker = Tracker::new(
            window,
            EventData::new(),
            Arc::new(RecordingTransport::new()),
        )
        .expect("tracker");

        group.bench_with_input(BenchmarkId::new("start_stop", count), &count, |b, _| {
            b.iter(|| {
                let watcher = tracker.enable_auto_outbound_tracking(None, None);
                black_box(watcher.tracked_count());
                watcher.stop();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_scan, bench_start_stop);
criterion_main!(benches);
