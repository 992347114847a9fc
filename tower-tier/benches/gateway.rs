use std::convert::Infallible;
use std::sync::Arc;

use criterion::BenchmarkGroup;
use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::measurement::WallTime;
use futures::stream::FuturesUnordered;
use futures::stream::StreamExt;
use http::Request;
use http::Response;
use tier_limit::BucketEngine;
use tier_limit::EngineSlot;
use tier_limit::MemoryStore;
use tower::BoxError;
use tower::Layer;
use tower::ServiceExt;
use tower::service_fn;
use tower::util::BoxCloneSyncService;
use tower_tier::AdmissionGateway;
use tower_tier::AdmissionLayer;

// --- HELPERS & TYPES ---

type BenchService = BoxCloneSyncService<Request<()>, Response<String>, Infallible>;

async fn noop_handler(_req: Request<()>) -> Result<Response<String>, Infallible> {
    Ok(Response::new("ok".to_string()))
}

fn gateway_svc(rt: &tokio::runtime::Runtime, slot: Option<EngineSlot>) -> BenchService {
    let slot = slot.unwrap_or_else(|| {
        let engine = rt
            .block_on(BucketEngine::initialize(Arc::new(MemoryStore::new())))
            .unwrap();
        EngineSlot::ready(engine)
    });
    BoxCloneSyncService::new(AdmissionLayer::new(AdmissionGateway::new(slot)).layer(service_fn(noop_handler)))
}

fn request(credential: &str) -> Request<()> {
    Request::builder()
        .uri("/api/data")
        .header("x-api-key", credential)
        .body(())
        .unwrap()
}

/// Generic runner for single-call overhead benchmarks
fn bench_overhead(
    group: &mut BenchmarkGroup<WallTime>,
    rt: &tokio::runtime::Runtime,
    id: &str,
    svc: BenchService,
) {
    group.bench_function(id, |b| {
        b.to_async(rt).iter(|| {
            let s = svc.clone();
            async move { black_box(s.oneshot(request("enterprise_bench")).await) }
        });
    });
}

/// Generic runner for burst/contention benchmarks
fn bench_burst(
    group: &mut BenchmarkGroup<WallTime>,
    rt: &tokio::runtime::Runtime,
    id: &str,
    svc: BenchService,
) {
    group.bench_function(id, |b| {
        b.to_async(rt).iter(|| {
            let svc = svc.clone();
            async move {
                let mut calls = (0..100)
                    .map(|i| svc.clone().oneshot(request(&format!("premium_{}", i % 10))))
                    .collect::<FuturesUnordered<_>>();
                while let Some(res) = calls.next().await {
                    let _ = black_box(res);
                }
            }
        });
    });
}

fn run_all_benches(c: &mut Criterion) -> Result<(), BoxError> {
    let rt = tokio::runtime::Runtime::new()?;

    let mut group = c.benchmark_group("Gateway");
    bench_overhead(&mut group, &rt, "overhead-memory", gateway_svc(&rt, None));
    bench_overhead(
        &mut group,
        &rt,
        "overhead-degraded",
        gateway_svc(&rt, Some(EngineSlot::empty())),
    );
    bench_burst(&mut group, &rt, "burst-memory", gateway_svc(&rt, None));
    group.finish();
    Ok(())
}

fn benches(c: &mut Criterion) {
    run_all_benches(c).unwrap();
}

criterion_group!(gateway_benches, benches);
criterion_main!(gateway_benches);
