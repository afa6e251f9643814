use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use blitzcache::sizer::{HeapSize, SizeBudget};
use blitzcache::{BlitzCache, CacheConfig};

struct Payload(Vec<u8>);

impl HeapSize for Payload {
    fn heap_size(&self, budget: &mut SizeBudget, depth: usize) -> u64 {
        self.0.heap_size(budget, depth)
    }
}

fn single_flight_contention(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("single_key_8_way_contention", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let cache = Arc::new(BlitzCache::<&'static str, Payload>::new(CacheConfig::default()));
                let mut handles = Vec::with_capacity(8);
                for _ in 0..8 {
                    let cache = cache.clone();
                    handles.push(tokio::spawn(async move {
                        cache
                            .get_async(
                                "hot-key",
                                || async {
                                    tokio::time::sleep(Duration::from_micros(200)).await;
                                    Ok(Payload(vec![0u8; 256]))
                                },
                                Some(Duration::from_secs(1)),
                            )
                            .await
                    }));
                }
                for h in handles {
                    black_box(h.await.unwrap().unwrap());
                }
            })
        });
    });
}

fn distinct_keys_no_contention(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("distinct_keys_no_contention", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let cache = Arc::new(BlitzCache::<u64, Payload>::new(CacheConfig::default()));
                let mut handles = Vec::with_capacity(64);
                for key in 0..64u64 {
                    let cache = cache.clone();
                    handles.push(tokio::spawn(async move {
                        cache
                            .get_async(key, || async { Ok(Payload(vec![0u8; 32])) }, Some(Duration::from_secs(1)))
                            .await
                    }));
                }
                for h in handles {
                    black_box(h.await.unwrap().unwrap());
                }
            })
        });
    });
}

criterion_group!(benches, single_flight_contention, distinct_keys_no_contention);
criterion_main!(benches);
