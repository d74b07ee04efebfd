//! Demo binary: builds a small pipeline in code and pushes packets
//! through it.
//!
//! Building pipelines from an RPC/config surface is out of scope (spec
//! §1); this binary exists to exercise the dataflow runtime and the two
//! module implementations end to end without one.

use bess_core::packet::testing::HeapPool;
use bess_core::registry::BuilderRegistry;
use bess_core::{Packet, PacketBatch, Pipeline, DROP_GATE};
use bess_modules::{IpLookupBuilder, L2ForwardBuilder};
use clap::Parser;
use serde_json::json;

/// Runs a demo pipeline exercising the L2 and IP forwarders.
#[derive(Parser, Debug)]
#[command(about = "Runs a small demo pipeline over a handful of packets")]
struct Args {
    /// Number of IPv4 filler packets to push through the lookup leg.
    #[arg(long, default_value_t = 4)]
    count: u32,

    /// Emit debug-level tracing instead of info-level.
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let subscriber = tracing_subscriber::FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("tracing subscriber already set");
}

fn ethernet_frame(dst_mac: [u8; 6]) -> Packet {
    let mut data = vec![0u8; 14];
    data[..6].copy_from_slice(&dst_mac);
    Packet::from_bytes(&data, 128)
}

fn ipv4_frame(dst_ip: [u8; 4]) -> Packet {
    let mut data = vec![0u8; 34];
    data[30..34].copy_from_slice(&dst_ip);
    Packet::from_bytes(&data, 128)
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut registry = BuilderRegistry::new();
    registry.register(Box::new(L2ForwardBuilder)).expect("register L2Forward");
    registry.register(Box::new(IpLookupBuilder)).expect("register IPLookup");

    let mut pipeline = Pipeline::new();
    let l2 = pipeline.create(&registry, "L2Forward", None).expect("create l2 forwarder");
    let lpm = pipeline.create(&registry, "IPLookup", None).expect("create ip lookup");

    pipeline.init_module(l2, json!({ "size": 16, "bucket": 4, "default_gate": DROP_GATE })).expect("init l2 forwarder");
    pipeline.init_module(lpm, json!({ "default_gate": DROP_GATE })).expect("init ip lookup");

    let known_mac = "02:00:00:00:00:01";
    pipeline
        .run_command(l2, "add", json!({ "entries": [{ "mac": known_mac, "gate": 0 }] }))
        .expect("add l2 entry");
    pipeline
        .run_command(lpm, "add", json!({ "prefix": [10, 0, 0, 0], "prefix_len": 8, "next_hop": 0 }))
        .expect("add lpm rule");

    // No gates are connected: both legs run standalone, their one output
    // gate free of any peer, so every delivered packet is freed back to
    // the pool once `process_batch` returns (spec §5, a delivered packet
    // is always either forwarded or freed, never both or neither).
    pipeline.compile_metadata();

    let mut pool = HeapPool::default();

    let known_mac_bytes = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
    let mut l2_batch = PacketBatch::new();
    l2_batch.push(ethernet_frame(known_mac_bytes)).expect("batch has room");
    l2_batch.push(ethernet_frame([0xff, 0xff, 0xff, 0xff, 0xff, 0xff])).expect("batch has room");
    pipeline.deliver(&mut pool, l2, 0, l2_batch);

    let mut lpm_batch = PacketBatch::new();
    for _ in 0..args.count {
        lpm_batch.push(ipv4_frame([10, 0, 0, 1])).expect("batch has room");
    }
    lpm_batch.push(ipv4_frame([192, 168, 0, 1])).expect("batch has room");
    pipeline.deliver(&mut pool, lpm, 0, lpm_batch);

    tracing::info!(desc = %pipeline.describe(l2), "l2_forward");
    tracing::info!(desc = %pipeline.describe(lpm), "ip_lookup");
    tracing::info!(freed = pool.freed_count(), "packets freed");
}
