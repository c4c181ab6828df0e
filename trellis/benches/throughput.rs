//! Throughput benchmarks: messages per second over in-process sockets.
//!
//! Sockets are set up once per message size; each iteration moves
//! MESSAGE_COUNT messages through the reactor.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use trellis::prelude::*;

const MESSAGE_SIZES: &[usize] = &[64, 1024, 16384];
const MESSAGE_COUNT: usize = 1_000;

fn req_rep_throughput(c: &mut Criterion) {
    trellis::dev_tracing::init_tracing();
    let mut group = c.benchmark_group("throughput/mem/req_rep");
    group.sample_size(20);

    for &size in MESSAGE_SIZES {
        let reactor = Rc::new(Reactor::new());
        let registry = Registry::new(MemContext::new(), reactor.clone());
        let address = format!("inproc://req-rep-{size}");
        let _server = RepConnection::open(
            &registry,
            vec![Endpoint::bind(address.clone())],
            &SocketOptions::default(),
            Rc::new(|conn: &RepConnection, id: CorrelationId, payload: Vec<Bytes>| {
                conn.reply(id, payload).ok();
            }),
        )
        .unwrap();
        let client = ReqConnection::open(
            &registry,
            vec![Endpoint::connect(address)],
            &SocketOptions::default(),
            ReqConfig::default().with_id_batch_size(64),
        )
        .unwrap();
        let payload = Bytes::from(vec![0u8; size]);

        group.throughput(Throughput::Bytes((size * MESSAGE_COUNT) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let replies: Vec<ReplyFuture> = (0..MESSAGE_COUNT)
                    .map(|_| client.send_request(black_box(payload.clone())).unwrap())
                    .collect();
                let results = reactor
                    .run_until(
                        futures::future::join_all(replies),
                        Some(Duration::from_secs(10)),
                    )
                    .unwrap();
                black_box(results);
            });
        });

        registry.shutdown().unwrap();
    }
    group.finish();
}

fn push_pull_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput/mem/push_pull");
    group.sample_size(20);

    for &size in MESSAGE_SIZES {
        let reactor = Rc::new(Reactor::new());
        let registry = Registry::new(MemContext::new(), reactor.clone());
        let address = format!("inproc://push-pull-{size}");
        let counter = Rc::new(Cell::new(0usize));
        let sink = reactor.clone();
        let _pull = PullConnection::open(
            &registry,
            vec![Endpoint::bind(address.clone())],
            &SocketOptions::default(),
            Rc::new(move |_: &PullConnection, _: Message| {
                counter.set(counter.get() + 1);
                if counter.get() % MESSAGE_COUNT == 0 {
                    sink.stop();
                }
            }),
        )
        .unwrap();
        let push = PushConnection::open(
            &registry,
            vec![Endpoint::connect(address)],
            &SocketOptions::default().with_high_water_mark(256),
        )
        .unwrap();
        let payload = Bytes::from(vec![0u8; size]);

        group.throughput(Throughput::Bytes((size * MESSAGE_COUNT) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                for _ in 0..MESSAGE_COUNT {
                    push.push(black_box(payload.clone())).unwrap();
                }
                reactor.run_for(Duration::from_secs(10));
            });
        });

        registry.shutdown().unwrap();
    }
    group.finish();
}

criterion_group!(benches, req_rep_throughput, push_pull_throughput);
criterion_main!(benches);
