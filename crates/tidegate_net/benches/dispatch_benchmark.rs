//! Benchmark for the tick-loop dispatch path.
//!
//! TARGET: 1,000 packets per tick well under 1 ms
//!
//! Run with: cargo bench --package tidegate_net --bench dispatch_benchmark

#![allow(missing_docs)]

use std::time::{Duration, Instant};

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tidegate_net::link::ServerEngineLink;
use tidegate_net::packet::IncomingPacket;
use tidegate_net::scratch::ScratchBuffer;
use tidegate_net::{
    BridgeConfig, BridgeResult, ConnectionId, NativePeerId, ServerBridge, ServerEngine,
    ServerListener, ServerParams,
};

const PACKETS_PER_TICK: usize = 1_000;

/// Engine that keeps its queue ends so the benchmark can fill them.
#[derive(Default)]
struct HeldEngine {
    link: Option<ServerEngineLink>,
}

impl ServerEngine for HeldEngine {
    fn start(&mut self, link: ServerEngineLink, _params: &ServerParams) -> BridgeResult<()> {
        self.link = Some(link);
        Ok(())
    }

    fn stop(&mut self) {}

    fn is_alive(&self) -> bool {
        self.link.is_some()
    }
}

#[derive(Default)]
struct Counter {
    packets: usize,
    bytes: usize,
}

impl ServerListener for Counter {
    fn on_connected(&mut self, _connection: ConnectionId) {}

    fn on_data(&mut self, _connection: ConnectionId, payload: &[u8], _channel: u8) {
        self.packets += 1;
        self.bytes += black_box(payload).len();
    }

    fn on_disconnected(&mut self, _connection: ConnectionId) {}
}

fn fill(link: &ServerEngineLink, payload_len: usize) {
    for i in 0..PACKETS_PER_TICK {
        let _ = link.incoming.enqueue(IncomingPacket {
            peer: NativePeerId((i % 64) as u32),
            channel: (i % 2) as u8,
            payload: vec![0x5A; payload_len],
        });
    }
}

fn benchmark_dispatch(c: &mut Criterion) {
    let mut server = ServerBridge::new(BridgeConfig::default(), HeldEngine::default());
    if server.start().is_err() {
        return;
    }

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(PACKETS_PER_TICK as u64));

    for payload_len in [64usize, 1_200] {
        group.bench_function(format!("tick_{PACKETS_PER_TICK}x{payload_len}b"), |b| {
            b.iter_custom(|iters| {
                let mut elapsed = Duration::ZERO;
                for _ in 0..iters {
                    if let Some(link) = server.engine().link.as_ref() {
                        fill(link, payload_len);
                    }
                    let mut counter = Counter::default();
                    let start = Instant::now();
                    server.tick(&mut counter);
                    server.finish_frame();
                    elapsed += start.elapsed();
                    black_box((counter.packets, counter.bytes));
                }
                elapsed
            });
        });
    }

    group.finish();
}

fn benchmark_staging(c: &mut Criterion) {
    let mut scratch = ScratchBuffer::default();

    c.bench_function("stage_shared_1200b", |b| {
        b.iter_batched(
            || vec![1u8; 1_200],
            |payload| black_box(scratch.stage(payload).len()),
            BatchSize::SmallInput,
        );
    });

    c.bench_function("stage_oversized_64kb", |b| {
        b.iter_batched(
            || vec![1u8; 64 * 1024],
            |payload| black_box(scratch.stage(payload).len()),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, benchmark_dispatch, benchmark_staging);
criterion_main!(benches);
