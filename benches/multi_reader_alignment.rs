//! Benchmarks for multi-signal reads
//!
//! Measures aligned reads across signals of equal and mixed rates, with values
//! and with shared-resolution domain output.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use signal_reader::test_utils::{init_tracing, send_ramp, time_signal};
use signal_reader::{MultiReader, SampleType};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

const OUTPUT: usize = 256;

fn bench_aligned_reads(c: &mut Criterion) {
    init_tracing();
    let mut group = c.benchmark_group("multi_read");

    // ticks per sample on a 1 kHz tick grid
    let layouts: [(&str, &[i64]); 3] =
        [("2x_equal", &[1, 1]), ("4x_equal", &[1, 1, 1, 1]), ("mixed_1k_250", &[1, 4])];
    for (name, ticks) in layouts {
        let signals: Vec<Arc<_>> = ticks
            .iter()
            .enumerate()
            .map(|(i, t)| time_signal(&format!("ai{i}"), *t, "2024-01-01T00:00:00Z").unwrap())
            .collect();
        let mut reader =
            MultiReader::builder(&signals).domain_read_type(SampleType::Int64).build().unwrap();
        let slowest = ticks.iter().copied().max().unwrap_or(1);
        let mut next: Vec<i64> = vec![0; ticks.len()];

        group.throughput(Throughput::Elements((OUTPUT * ticks.len()) as u64));
        group.bench_function(BenchmarkId::new("values_and_domain", name), |b| {
            let mut values = vec![0.0f64; OUTPUT * ticks.len()];
            let mut domain = vec![0i64; OUTPUT * ticks.len()];
            b.iter(|| {
                for (index, signal) in signals.iter().enumerate() {
                    let count = OUTPUT as i64 * slowest / ticks[index];
                    send_ramp::<f64>(signal, next[index], count, ticks[index]).unwrap();
                    next[index] += count;
                }
                let outcome = reader
                    .read_with_domain(&mut values, &mut domain, OUTPUT, Duration::ZERO)
                    .unwrap();
                black_box(outcome.count)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_aligned_reads);
criterion_main!(benches);
