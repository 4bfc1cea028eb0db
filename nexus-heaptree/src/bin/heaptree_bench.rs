//! Throughput driver: insert, level-order walk, and delete-all over N nodes.
//!
//! Run with:
//!   cargo run --release --features cli --bin heaptree-bench -- --count 1000000

use std::hint::black_box;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use nexus_heaptree::{BoundedStorage, BoxedStorage, HeapLink, HeapTree, Linked, Storage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "heaptree-bench", about = "Time heap tree insert, walk and delete")]
struct Args {
    /// Number of nodes.
    #[arg(long, default_value_t = 1_000_000)]
    count: usize,

    /// RNG seed; random when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Log every node with its relations during the walk.
    #[arg(long)]
    dump: bool,

    /// Skip the full invariant check between phases.
    #[arg(long)]
    no_validate: bool,
}

#[derive(Debug)]
struct BenchNode {
    num: u32,
    data: u32,
    link: HeapLink,
}

impl Linked<u32> for BenchNode {
    fn link(&self) -> &HeapLink {
        &self.link
    }

    fn link_mut(&mut self) -> &mut HeapLink {
        &mut self.link
    }
}

type Nodes = BoxedStorage<BenchNode>;
type Tree = HeapTree<BenchNode, Nodes>;

fn by_data(a: &BenchNode, b: &BenchNode) -> std::cmp::Ordering {
    a.data.cmp(&b.data)
}

fn report(phase: &str, elapsed: Duration, count: usize) {
    let per_op = elapsed.as_nanos() as f64 / count.max(1) as f64;
    info!(phase, elapsed = ?elapsed, ns_per_op = format_args!("{per_op:.1}"), "phase done");
}

fn dump(storage: &Nodes, node: &BenchNode) {
    let num = |key: Option<u32>| key.and_then(|k| storage.get(k)).map_or(0, |n| n.num);
    info!(
        num = node.num,
        parent = num(node.link.parent()),
        left = num(node.link.left()),
        right = num(node.link.right()),
        data = format_args!("{:#010x}", node.data),
    );
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    anyhow::ensure!(args.count > 0, "--count must be at least 1");

    let seed = args.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    info!(count = args.count, seed, "generating nodes");

    let mut storage = Nodes::with_capacity(args.count);
    let mut tree = Tree::new();

    let start = Instant::now();
    for num in 1..=args.count as u32 {
        let node = BenchNode {
            num,
            data: rng.gen(),
            link: HeapLink::new(),
        };
        let key = storage
            .try_insert(node)
            .map_err(|_| anyhow::anyhow!("storage full at node {num}"))?;
        tree.link_by(&mut storage, key, by_data);
    }
    report("insert", start.elapsed(), args.count);
    info!(depth = tree.depth(&storage), "heap depth");

    if !args.no_validate {
        tree.validate_by(&storage, by_data).context("tree invalid after inserts")?;
    }

    let start = Instant::now();
    let mut visited = 0usize;
    for node in tree.iter(&storage) {
        if args.dump {
            dump(&storage, node);
        }
        black_box(node);
        visited += 1;
    }
    report("levelorder", start.elapsed(), visited);
    info!(total = visited, "walked");

    let start = Instant::now();
    let drained = tree.len();
    while let Some(key) = tree.pop_key_by(&mut storage, by_data) {
        black_box(storage.remove(key));
    }
    report("delete", start.elapsed(), drained);

    if !args.no_validate {
        tree.validate_by(&storage, by_data).context("tree invalid after delete")?;
    }
    anyhow::ensure!(storage.is_empty(), "{} nodes left in storage", storage.len());

    Ok(())
}
