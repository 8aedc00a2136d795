use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ddos_traffic_monitor::core::{analyze_window, HeuristicScorer, PacketObservation, Protocol};
use std::time::Duration;

fn synthetic_window(packets: usize, sources: usize) -> Vec<PacketObservation> {
    let protocols = [Protocol::Tcp, Protocol::Udp, Protocol::Icmp, Protocol::Other];
    (0..packets)
        .map(|i| {
            let src = i % sources;
            PacketObservation::new(
                format!("10.{}.{}.{}", src / 65536 % 256, src / 256 % 256, src % 256),
                64 + (i % 1400) as u64,
                protocols[i % protocols.len()],
            )
        })
        .collect()
}

fn window_analysis_benchmark(c: &mut Criterion) {
    let window = synthetic_window(10_000, 500);

    c.bench_function("analyze_window_10k_packets_500_sources", |b| {
        b.iter(|| {
            analyze_window(
                black_box(&window),
                &HeuristicScorer,
                Duration::from_secs(5),
                0,
            )
        })
    });
}

criterion_group!(benches, window_analysis_benchmark);
criterion_main!(benches);
