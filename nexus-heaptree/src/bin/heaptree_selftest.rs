//! Self-test driver: exercises every iteration form on a small random tree.
//!
//! Run with:
//!   cargo run --features cli --bin heaptree-selftest -- --count 10 --seed 7
//!
//! Set `RUST_LOG=debug` to see every visited node.

use anyhow::{ensure, Context};
use clap::Parser;
use nexus_heaptree::{BoundedStorage, BoxedStorage, HeapLink, HeapTree, Linked, Storage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "heaptree-selftest", about = "Walk and drain a random heap tree")]
struct Args {
    /// Number of nodes to insert.
    #[arg(long, default_value_t = 10)]
    count: usize,

    /// RNG seed; random when omitted.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug)]
struct TestNode {
    num: u16,
    link: HeapLink,
}

impl Linked<u32> for TestNode {
    fn link(&self) -> &HeapLink {
        &self.link
    }

    fn link_mut(&mut self) -> &mut HeapLink {
        &mut self.link
    }
}

type Nodes = BoxedStorage<TestNode>;
type Tree = HeapTree<TestNode, Nodes>;

fn by_num(a: &TestNode, b: &TestNode) -> std::cmp::Ordering {
    a.num.cmp(&b.num)
}

fn num(storage: &Nodes, key: u32) -> u16 {
    storage.get(key).map_or(0, |node| node.num)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    ensure!(args.count > 0, "--count must be at least 1");

    let seed = args.seed.unwrap_or_else(rand::random);
    info!(count = args.count, seed, "starting heap tree self-test");
    let mut rng = StdRng::seed_from_u64(seed);

    let mut storage = Nodes::with_capacity(args.count);
    let mut tree = Tree::new();

    for _ in 0..args.count {
        let node = TestNode {
            num: rng.gen(),
            link: HeapLink::new(),
        };
        let key = storage
            .try_insert(node)
            .map_err(|_| anyhow::anyhow!("storage full"))?;
        tree.try_link_by(&mut storage, key, by_num)
            .context("linking a fresh node")?;
    }
    tree.validate_by(&storage, by_num)
        .context("tree invalid after inserts")?;

    walk(&tree, &storage)?;
    drain(&mut tree, &mut storage)?;

    info!("self-test passed");
    Ok(())
}

/// Fresh walk broken off halfway, then continue-after and resume-from.
fn walk(tree: &Tree, storage: &Nodes) -> anyhow::Result<()> {
    let all: Vec<u32> = tree.keys(storage).collect();
    ensure!(all.len() == tree.len(), "walk visited {} of {} nodes", all.len(), tree.len());

    let half = all.len() / 2;
    let mut last = None;
    for (count, key) in tree.keys(storage).enumerate() {
        debug!(num = num(storage, key), "for_each");
        last = Some(key);
        if count == half {
            break;
        }
    }
    let last = last.context("walk yielded nothing")?;

    let continued: Vec<u32> = tree.keys_after(storage, last).collect();
    for &key in &continued {
        debug!(num = num(storage, key), "for_each_continue");
    }
    ensure!(continued == all[half + 1..], "continue-after diverged from the full walk");

    let resumed: Vec<u32> = tree.keys_from(storage, last).collect();
    for &key in &resumed {
        debug!(num = num(storage, key), "for_each_from");
    }
    ensure!(resumed == all[half..], "resume-from diverged from the full walk");

    let entries: Vec<u16> = tree.iter(storage).map(|node| node.num).collect();
    let by_key: Vec<u16> = all.iter().map(|&key| num(storage, key)).collect();
    ensure!(entries == by_key, "entry walk diverged from key walk");

    info!(nodes = all.len(), "iteration checks passed");
    Ok(())
}

/// Deletes the root until empty, checking sorted order.
fn drain(tree: &mut Tree, storage: &mut Nodes) -> anyhow::Result<()> {
    let mut previous = 0u16;
    while let Some(root) = tree.peek_key() {
        let value = num(storage, root);
        debug!(num = value, "delete");
        ensure!(value >= previous, "popped {value} after {previous}");
        previous = value;

        tree.try_unlink_by(storage, root, by_num)
            .context("unlinking the root")?;
        ensure!(
            storage.get(root).is_some_and(|node| node.link.is_poisoned()),
            "removed node was not poisoned"
        );
        tree.validate_by(storage, by_num)
            .context("tree invalid after delete")?;
    }

    info!("drained in order");
    Ok(())
}
