//! Performance benchmarks for notification passes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use realtime_records::{
    Document, DocumentKey, MemoryStore, NotificationCache, NotificationConfig,
    NotificationService, Unsubscriber,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn create_service(documents: i64) -> NotificationService {
    let store = Arc::new(MemoryStore::new());
    let users = store.get_or_create("users");
    for i in 0..documents {
        users
            .insert(Document::new(i, json!({"name": format!("user-{}", i)})))
            .unwrap();
    }

    let service = NotificationService::new(NotificationConfig::default()).unwrap();
    service.initialize(store);
    service
}

/// Benchmark marking the cache from a single writer
fn bench_marks(c: &mut Criterion) {
    c.bench_function("mark_document_changed", |b| {
        let cache = NotificationCache::new();
        let mut i = 0i64;
        b.iter(|| {
            cache.mark_document_changed("users", &DocumentKey::from(i % 1024));
            i += 1;
        });
    });
}

/// Benchmark a pass where only a few of many document subscriptions match
fn bench_selective_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("selective_pass");

    for subscriptions in [10i64, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("document_subscriptions", subscriptions),
            &subscriptions,
            |b, &count| {
                let service = create_service(count);
                let unsubscribers: Vec<Unsubscriber> = (0..count)
                    .map(|key| {
                        service
                            .builder()
                            .collection::<Value>("users")
                            .id(key)
                            .subscribe(|doc| {
                                black_box(doc);
                            })
                            .unwrap()
                    })
                    .collect();

                b.iter(|| {
                    service.mark_document_changed("users", &DocumentKey::from(0));
                    black_box(service.notify_all().unwrap());
                    service.wait_idle(Duration::from_secs(5));
                });

                for unsubscriber in unsubscribers {
                    unsubscriber.release();
                }
            },
        );
    }

    group.finish();
}

/// Benchmark a broadcast pass that materializes every collection subscription
fn bench_broadcast_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast_pass");

    for documents in [10i64, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("documents", documents),
            &documents,
            |b, &count| {
                let service = create_service(count);
                let unsubscribers: Vec<Unsubscriber> = (0..16)
                    .map(|_| {
                        service
                            .builder()
                            .collection::<Value>("users")
                            .subscribe(|docs| {
                                black_box(docs.len());
                            })
                            .unwrap()
                    })
                    .collect();

                b.iter(|| {
                    service.mark_broadcast("users");
                    black_box(service.notify_all().unwrap());
                    service.wait_idle(Duration::from_secs(5));
                });

                for unsubscriber in unsubscribers {
                    unsubscriber.release();
                }
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_marks,
    bench_selective_pass,
    bench_broadcast_pass
);
criterion_main!(benches);
