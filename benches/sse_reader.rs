//! SSE decoding benchmarks for gemprobe.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use gemprobe::SseReader;
use std::time::Instant;

/// Generate a realistic Gemini SSE response body.
fn generate_sse_payload(events: usize, text_per_event: usize) -> Vec<u8> {
    let mut data = Vec::new();
    for _ in 0..events {
        let event = format!(
            "data: {{\"candidates\":[{{\"content\":{{\"parts\":[{{\"text\":\"{}\"}}]}}}}]}}\n\n",
            "x".repeat(text_per_event)
        );
        data.extend_from_slice(event.as_bytes());
    }
    data
}

fn benchmark_whole_buffer(c: &mut Criterion) {
    let data = generate_sse_payload(1000, 50);

    let mut group = c.benchmark_group("sse_decode");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("decode_1000_events", |b| {
        b.iter(|| {
            let mut reader = SseReader::new(Instant::now());
            reader.push_chunk(black_box(&data));
            let outcome = reader.finish();
            black_box(outcome.event_count);
        });
    });

    group.finish();
}

fn benchmark_network_chunks(c: &mut Criterion) {
    // Typical TCP segment sizing: events arrive split across reads.
    let data = generate_sse_payload(100, 100);
    let chunks: Vec<&[u8]> = data.chunks(1024).collect();

    let mut group = c.benchmark_group("sse_decode_chunked");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("1kb_network_chunks", |b| {
        b.iter(|| {
            let mut reader = SseReader::new(Instant::now());
            for chunk in &chunks {
                reader.push_chunk(black_box(chunk));
            }
            black_box(reader.finish().text.len());
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_whole_buffer, benchmark_network_chunks);
criterion_main!(benches);
