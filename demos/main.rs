//! Small end-to-end demo: runs a handful of concurrent `Get`s against a
//! shared key to show single-flight collapse, then prints a statistics
//! snapshot as JSON.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use blitzcache::sizer::{HeapSize, SizeBudget};
use blitzcache::{BlitzCache, CacheConfig};

#[derive(Parser, Debug)]
#[command(name = "blitzcache-demo", about = "Exercises BlitzCache single-flight and statistics")]
struct Args {
    /// Number of concurrent callers racing for the same key.
    #[arg(long, default_value_t = 8)]
    concurrency: usize,

    /// Simulated producer latency in milliseconds.
    #[arg(long, default_value_t = 50)]
    producer_latency_ms: u64,

    /// Entry TTL in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    ttl_ms: u64,
}

struct Quote {
    symbol: String,
    price_cents: u64,
}

impl HeapSize for Quote {
    fn heap_size(&self, budget: &mut SizeBudget, depth: usize) -> u64 {
        self.symbol.heap_size(budget, depth)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = CacheConfig::default().with_default_ttl(Duration::from_millis(args.ttl_ms));
    let cache = Arc::new(BlitzCache::<String, Quote>::new(config));
    cache.initialize_statistics();

    let mut handles = Vec::new();
    for i in 0..args.concurrency {
        let cache = cache.clone();
        let latency = args.producer_latency_ms;
        handles.push(tokio::spawn(async move {
            let quote = cache
                .get_async(
                    "AAPL".to_string(),
                    || async move {
                        tokio::time::sleep(Duration::from_millis(latency)).await;
                        Ok(Quote { symbol: "AAPL".to_string(), price_cents: 19_042 })
                    },
                    None,
                )
                .await?;
            tracing::info!(caller = i, price_cents = quote.price_cents, "received quote");
            Ok::<_, blitzcache::CacheError>(())
        }));
    }

    for handle in handles {
        handle.await??;
    }

    let snapshot = cache.statistics().expect("statistics were initialized above");
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    cache.dispose();
    Ok(())
}
