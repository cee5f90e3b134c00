//! TandemDB benchmark driver.
//!
//! Loads a raw little-endian 32-bit signed integer stream, inserts every
//! integer into a dual tree with an incrementing value, then runs point
//! query passes (sequential, random-with-misses, and MRU-steered) and
//! reports timings and hit counts.
//!
//! ```bash
//! tandem-bench workload.bin
//! tandem-bench workload.bin --data-dir /tmp/tandem --heap-size 16 -v
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use bytes::Buf;
use clap::Parser;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use tandem_common::config::{DualTreeConfig, StoreConfig};
use tandem_engine::DualTree;
use tandem_storage::BlockManager;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// TandemDB load/query benchmark
#[derive(Parser, Debug)]
#[command(
    name = "tandem-bench",
    version,
    about = "Load a raw i32 stream into a dual tree and measure queries"
)]
struct Args {
    /// Input file: a flat stream of little-endian 32-bit signed integers
    input: PathBuf,

    /// Directory for the block files (created if missing, must be empty)
    #[arg(long, default_value = "./tandem-data")]
    data_dir: PathBuf,

    /// Page cache capacity in blocks
    #[arg(long, default_value_t = 10_000)]
    blocks_in_memory: usize,

    /// Staging heap capacity (0 disables staging)
    #[arg(long, default_value_t = 16)]
    heap_size: usize,

    /// MRU predictor window (0 disables the predictor)
    #[arg(long, default_value_t = 10)]
    query_buffer_size: usize,

    /// Enable fsync on block writes
    #[arg(long)]
    fsync: bool,

    /// Enable verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let data = load_integers(&args.input)?;
    if data.is_empty() {
        bail!("input file {} holds no integers", args.input.display());
    }
    info!("loaded {} integers from {}", data.len(), args.input.display());

    let store_config = StoreConfig {
        data_dir: args.data_dir.clone(),
        blocks_in_memory: args.blocks_in_memory,
        fsync_enabled: args.fsync,
    };
    let tree_config = DualTreeConfig {
        heap_size: args.heap_size,
        query_buffer_size: args.query_buffer_size,
        ..Default::default()
    };

    let store = Arc::new(BlockManager::new(&store_config)?);
    let mut tree = DualTree::<i32, i32>::create(store, &tree_config)?;

    // Load phase
    let start = Instant::now();
    for (idx, &key) in data.iter().enumerate() {
        tree.insert(key, idx as i32)?;
    }
    let load_time = start.elapsed();

    println!("--------------------------------------------------------------------------");
    println!("Data load time (us): {}", load_time.as_micros());
    println!("Sorted tree size:    {}", tree.sorted_tree_size());
    println!("Unsorted tree size:  {}", tree.unsorted_tree_size());
    println!("Staged tuples:       {}", tree.staged_size());
    println!("Sorted tree height:  {}", tree.sorted_tree().height());
    println!("Leaf capacity:       {}", tree.sorted_tree().leaf_capacity());
    println!("--------------------------------------------------------------------------");

    let random_queries = generate_point_queries(&data);

    // Sequential workload, plain query
    let start = Instant::now();
    let mut hits = 0usize;
    for &key in &data {
        if tree.query(&key)? {
            hits += 1;
        }
    }
    report("Naive query, sequential workload", start, hits, data.len());

    // Random workload (with misses), plain query
    let start = Instant::now();
    let mut hits = 0usize;
    for &key in &random_queries {
        if tree.query(&key)? {
            hits += 1;
        }
    }
    report("Naive query, random workload", start, hits, random_queries.len());

    // Sequential workload, MRU query
    let start = Instant::now();
    let mut hits = 0usize;
    for &key in &data {
        if tree.mru_query(&key)? {
            hits += 1;
        }
    }
    report("MRU query, sequential workload", start, hits, data.len());

    // Random workload, MRU query
    let start = Instant::now();
    let mut hits = 0usize;
    for &key in &random_queries {
        if tree.mru_query(&key)? {
            hits += 1;
        }
    }
    report("MRU query, random workload", start, hits, random_queries.len());
    println!("--------------------------------------------------------------------------");

    tree.flush()?;
    info!("flushed to {}", args.data_dir.display());
    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("tandem_bench=debug")
    } else {
        EnvFilter::new("tandem_bench=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

/// Reads the input file as a flat little-endian i32 stream.
fn load_integers(path: &PathBuf) -> Result<Vec<i32>> {
    let raw = std::fs::read(path)
        .with_context(|| format!("reading input file {}", path.display()))?;

    let mut buf = &raw[..];
    let mut data = Vec::with_capacity(buf.len() / 4);
    while buf.remaining() >= 4 {
        data.push(buf.get_i32_le());
    }
    Ok(data)
}

/// The loaded keys plus ~10% keys above the loaded range, shuffled.
fn generate_point_queries(data: &[i32]) -> Vec<i32> {
    let mut queries: Vec<i32> = data.to_vec();

    let n = data.len() as i32;
    let miss_count = data.len() / 10;
    let mut rng = rand::thread_rng();
    for _ in 0..miss_count {
        queries.push(rng.gen_range(n..=n.saturating_mul(2).max(n + 1)));
    }

    queries.shuffle(&mut rng);
    queries
}

fn report(label: &str, start: Instant, hits: usize, total: usize) {
    println!(
        "{:<36} {:>10} us, {} hits out of {}",
        label,
        start.elapsed().as_micros(),
        hits,
        total
    );
}
