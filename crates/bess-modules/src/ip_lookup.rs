//! `IPLookup`: IPv4 longest-prefix-match forwarding, spec §4.5.

use bess_core::constants::DROP_GATE;
use bess_core::module::{Dispatch, Module, TaskArg, TaskResult};
use bess_core::registry::ModuleBuilder;
use bess_core::{Error, ErrorKind, Packet, PacketBatch};
use bess_lpm::{DEFAULT_MAX_RULES, DEFAULT_NUMBER_TBL8S, LpmTable};
use serde::Deserialize;
use serde_json::Value;

const ETH_HDR_LEN: usize = 14;
const IPV4_DST_OFFSET: usize = 16;
const IPV4_DST_END: usize = ETH_HDR_LEN + IPV4_DST_OFFSET + 4;

/// `init` config: table sizing plus the gate packets go to on a miss.
#[derive(Debug, Clone, Deserialize)]
pub struct IpLookupConfig {
    #[serde(default = "default_max_rules")]
    pub max_rules: u32,
    #[serde(default = "default_number_tbl8s")]
    pub number_tbl8s: u32,
    #[serde(default = "default_gate_default")]
    pub default_gate: u16,
}

fn default_max_rules() -> u32 {
    DEFAULT_MAX_RULES
}

fn default_number_tbl8s() -> u32 {
    DEFAULT_NUMBER_TBL8S
}

fn default_gate_default() -> u16 {
    DROP_GATE
}

/// Wire format note: `prefix` is 4 plain octets (e.g. `[10, 0, 0, 0]` for
/// `10.0.0.0`), not a pre-swapped integer. Converting via
/// `u32::from_ne_bytes` gives exactly the raw-native-load representation
/// [`LpmTable::add`] expects, the same convention the packet-parsing hot
/// path uses — no separate byte-order step for the control plane to get
/// right.
#[derive(Deserialize)]
struct AddArgs {
    prefix: [u8; 4],
    prefix_len: u8,
    next_hop: u16,
}

#[derive(Deserialize)]
struct DeleteArgs {
    prefix: [u8; 4],
    prefix_len: u8,
}

#[derive(Deserialize)]
struct SetDefaultGateArgs {
    gate: u16,
}

fn parse_args<T: for<'de> Deserialize<'de>>(arg: Value) -> Result<T, Error> {
    serde_json::from_value(arg).map_err(|e| Error::new(ErrorKind::InvalidArg, e.to_string()))
}

/// Reads the destination IPv4 address of an Ethernet+IPv4 packet as the
/// same raw-native-load representation [`LpmTable::lookup`] expects.
fn read_dst(pkt: &Packet) -> Option<u32> {
    let data = pkt.data();
    if data.len() < IPV4_DST_END {
        return None;
    }
    let bytes: [u8; 4] = data[ETH_HDR_LEN + IPV4_DST_OFFSET..IPV4_DST_END].try_into().ok()?;
    Some(u32::from_ne_bytes(bytes))
}

/// IPv4 forwarder over a [`LpmTable`].
pub struct IpLookupModule {
    table: Option<LpmTable>,
    default_gate: u16,
}

impl Default for IpLookupModule {
    fn default() -> Self {
        Self { table: None, default_gate: DROP_GATE }
    }
}

impl IpLookupModule {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn table_mut(&mut self) -> Result<&mut LpmTable, Error> {
        self.table.as_mut().ok_or_else(|| Error::new(ErrorKind::InvalidArg, "ip lookup not initialized"))
    }
}

impl Module for IpLookupModule {
    fn init(&mut self, config: Value) -> Result<(), Error> {
        let cfg: IpLookupConfig = parse_args(config)?;
        self.table = Some(LpmTable::new(cfg.max_rules, cfg.number_tbl8s));
        self.default_gate = cfg.default_gate;
        Ok(())
    }

    fn process_batch(&mut self, _igate: u16, batch: PacketBatch) -> Dispatch {
        let default_gate = self.default_gate;
        let Some(table) = self.table.as_ref() else {
            return Dispatch::Split { gates: vec![DROP_GATE; batch.len()], batch };
        };

        let packets = batch.as_slice();
        let mut gates = Vec::with_capacity(packets.len());
        let mut chunk = packets.chunks_exact(4);
        for group in &mut chunk {
            // `lookup_x4` needs a value for every slot even where the
            // packet is malformed; route those through `DROP_GATE`'s
            // numeric slot and overwrite with the real gate afterward.
            let mut ips = [0u32; 4];
            let mut present = [true; 4];
            for (i, pkt) in group.iter().enumerate() {
                match read_dst(pkt) {
                    Some(ip) => ips[i] = ip,
                    None => present[i] = false,
                }
            }
            let hit = table.lookup_x4(ips, default_gate);
            for i in 0..4 {
                gates.push(if present[i] { hit[i] } else { default_gate });
            }
        }
        for pkt in chunk.remainder() {
            let gate = read_dst(pkt)
                .map(|ip| table.lookup(ip))
                .and_then(|(hit, next_hop)| hit.then_some(next_hop))
                .unwrap_or(default_gate);
            gates.push(gate);
        }

        Dispatch::Split { gates, batch }
    }

    fn run_task(&mut self, _arg: TaskArg) -> (TaskResult, Option<Dispatch>) {
        (TaskResult::default(), None)
    }

    fn get_desc(&self) -> String {
        match &self.table {
            Some(table) => {
                let stats = table.stats();
                format!(
                    "rules={}/{} tbl8_groups={}/{} default_gate={}",
                    stats.rules, stats.max_rules, stats.tbl8_groups_used, stats.tbl8_groups_total, self.default_gate
                )
            }
            None => "uninitialized".to_string(),
        }
    }

    fn run_command(&mut self, name: &str, arg: Value) -> Result<Value, Error> {
        match name {
            "add" => {
                let args: AddArgs = parse_args(arg)?;
                let prefix_be = u32::from_ne_bytes(args.prefix);
                self.table_mut()?.add(prefix_be, args.prefix_len, args.next_hop)?;
                tracing::debug!(prefix = ?args.prefix, prefix_len = args.prefix_len, next_hop = args.next_hop, "lpm::add");
                Ok(Value::Null)
            }
            "delete" => {
                let args: DeleteArgs = parse_args(arg)?;
                let prefix_be = u32::from_ne_bytes(args.prefix);
                self.table_mut()?.delete(prefix_be, args.prefix_len)?;
                tracing::debug!(prefix = ?args.prefix, prefix_len = args.prefix_len, "lpm::delete");
                Ok(Value::Null)
            }
            "set_default_gate" => {
                let args: SetDefaultGateArgs = parse_args(arg)?;
                self.default_gate = args.gate;
                Ok(Value::Null)
            }
            other => Err(Error::new(ErrorKind::InvalidArg, format!("unknown command `{other}`"))),
        }
    }
}

/// Factory registered under the class name `"IPLookup"`.
#[derive(Debug, Default)]
pub struct IpLookupBuilder;

impl ModuleBuilder for IpLookupBuilder {
    fn class_name(&self) -> &'static str {
        "IPLookup"
    }

    fn help(&self) -> &'static str {
        "IPv4 longest-prefix-match forwarder backed by a DIR-24-8 table"
    }

    fn num_igates(&self) -> Option<u16> {
        Some(1)
    }

    fn build(&self) -> Box<dyn Module> {
        Box::new(IpLookupModule::new())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn ipv4_packet(dst: [u8; 4]) -> Packet {
        let mut data = vec![0u8; IPV4_DST_END];
        data[ETH_HDR_LEN + IPV4_DST_OFFSET..IPV4_DST_END].copy_from_slice(&dst);
        Packet::from_bytes(&data, 16)
    }

    #[test]
    fn s2_hierarchy_resolves_to_longest_prefix() {
        let mut module = IpLookupModule::new();
        module.init(json!({ "default_gate": 9 })).unwrap();
        module.run_command("add", json!({ "prefix": [10, 0, 0, 0], "prefix_len": 8, "next_hop": 1 })).unwrap();
        module.run_command("add", json!({ "prefix": [10, 1, 0, 0], "prefix_len": 16, "next_hop": 2 })).unwrap();

        let mut batch = PacketBatch::new();
        batch.push(ipv4_packet([10, 1, 2, 3])).unwrap();
        batch.push(ipv4_packet([10, 2, 0, 1])).unwrap();
        batch.push(ipv4_packet([11, 0, 0, 1])).unwrap();

        match module.process_batch(0, batch) {
            Dispatch::Split { gates, .. } => assert_eq!(gates, vec![2, 1, 9]),
            _ => panic!("expected a split dispatch"),
        }
    }

    #[test]
    fn handles_batches_not_a_multiple_of_four() {
        let mut module = IpLookupModule::new();
        module.init(json!({ "default_gate": 5 })).unwrap();
        module.run_command("add", json!({ "prefix": [10, 0, 0, 0], "prefix_len": 8, "next_hop": 1 })).unwrap();

        let mut batch = PacketBatch::new();
        for _ in 0..6 {
            batch.push(ipv4_packet([10, 0, 0, 1])).unwrap();
        }
        match module.process_batch(0, batch) {
            Dispatch::Split { gates, .. } => assert_eq!(gates, vec![1; 6]),
            _ => panic!("expected a split dispatch"),
        }
    }
}
