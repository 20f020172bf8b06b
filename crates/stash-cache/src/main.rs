use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use stash_cache::config::loader::load_config;
use stash_cache::{CacheManager, CacheResult, CacheValue};
use uuid::Uuid;

/// Drive a synthetic request workload through the cache manager.
#[derive(Debug, Parser)]
#[command(name = "stash", version, about)]
struct Cli {
    /// Path to a TOML configuration file (defaults to ./stash.toml if present)
    #[arg(short, long, env = "STASH_CONFIG")]
    config: Option<PathBuf>,

    /// Total number of simulated requests
    #[arg(long, default_value_t = 10_000)]
    requests: usize,

    /// Number of concurrent request workers
    #[arg(long, default_value_t = 16)]
    concurrency: usize,

    /// Number of distinct product keys in the global keyspace
    #[arg(long, default_value_t = 500)]
    products: usize,

    /// Invalidate `product:*` every N requests (0 = never)
    #[arg(long, default_value_t = 1_000)]
    invalidate_every: usize,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.as_ref().map(|p| p.to_string_lossy().to_string());
    let cfg = load_config(config_path.as_deref())
        .map_err(anyhow::Error::msg)
        .context("failed to load configuration")?;

    stash_cache::observability::init_tracing(&cfg.logging);

    let cache = Arc::new(CacheManager::start(cfg.cache.clone())?);
    tracing::info!(
        requests = cli.requests,
        concurrency = cli.concurrency,
        "Starting workload"
    );

    let started = Instant::now();
    let next = Arc::new(AtomicUsize::new(0));
    let mut workers = Vec::with_capacity(cli.concurrency);
    for _ in 0..cli.concurrency.max(1) {
        let cache = Arc::clone(&cache);
        let next = Arc::clone(&next);
        let (total, products, invalidate_every) =
            (cli.requests, cli.products.max(1), cli.invalidate_every);
        workers.push(tokio::spawn(async move {
            loop {
                let n = next.fetch_add(1, Ordering::Relaxed);
                if n >= total {
                    break;
                }
                handle_request(&cache, n, products, invalidate_every)?;
                tokio::task::yield_now().await;
            }
            CacheResult::Ok(())
        }));
    }
    for worker in workers {
        worker.await.context("worker panicked")??;
    }
    let elapsed = started.elapsed();

    let report = json!({
        "elapsed_ms": elapsed.as_millis() as u64,
        "requests": cli.requests,
        "counter": cache.get("stats:requests")?.and_then(|v| v.as_integer()),
        "stats": cache.stats(),
        "sweep": cache.sweep_now(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    cache.shutdown().await;
    Ok(())
}

/// One simulated request: read-through product lookup, per-request scratch
/// data, a request counter and periodic invalidation.
fn handle_request(
    cache: &CacheManager,
    n: usize,
    products: usize,
    invalidate_every: usize,
) -> CacheResult<()> {
    let request_id = Uuid::new_v4().to_string();
    let scratch = cache.request_cache(&request_id);
    scratch.set("sequence", n as i64)?;

    let product_id = n % products;
    let key = format!("product:{product_id}");
    let product = match cache.get(&key)? {
        Some(hit) => (*hit).clone(),
        None => {
            let loaded = CacheValue::from(json!({
                "id": product_id,
                "name": format!("Product {product_id}"),
            }));
            cache.set(&key, loaded.clone(), Some(Duration::from_secs(5)))?;
            loaded
        }
    };
    scratch.set("product", product)?;

    cache.increment("stats:requests", 1)?;
    if invalidate_every > 0 && n > 0 && n % invalidate_every == 0 {
        cache.invalidate("product:*")?;
    }

    tracing::trace!(request_id = %request_id, bytes = scratch.size(), "request handled");
    cache.clear_request_cache(&request_id);
    Ok(())
}
