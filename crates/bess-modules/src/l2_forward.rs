//! `L2Forward`: exact-match MAC forwarding, spec §4.6.

use bess_core::constants::DROP_GATE;
use bess_core::module::{Dispatch, Module, TaskArg, TaskResult};
use bess_core::registry::ModuleBuilder;
use bess_core::{Error, ErrorKind, PacketBatch};
use bess_l2::{BucketWidth, CuckooTable};
use serde::Deserialize;
use serde_json::Value;

use crate::mac;

/// `init` config: table shape plus the gate packets go to on a miss.
#[derive(Debug, Clone, Deserialize)]
pub struct L2ForwardConfig {
    pub size: u32,
    pub bucket: u8,
    #[serde(default = "default_gate_default")]
    pub default_gate: u16,
}

fn default_gate_default() -> u16 {
    DROP_GATE
}

#[derive(Deserialize)]
struct MacGate {
    mac: String,
    gate: u16,
}

#[derive(Deserialize)]
struct AddArgs {
    entries: Vec<MacGate>,
}

#[derive(Deserialize)]
struct DeleteArgs {
    macs: Vec<String>,
}

#[derive(Deserialize)]
struct LookupArgs {
    macs: Vec<String>,
}

#[derive(Deserialize)]
struct SetDefaultGateArgs {
    gate: u16,
}

#[derive(Deserialize)]
struct PopulateArgs {
    base: String,
    count: u32,
    gate_count: u16,
}

fn bucket_width(n: u8) -> Result<BucketWidth, Error> {
    match n {
        1 => Ok(BucketWidth::One),
        2 => Ok(BucketWidth::Two),
        4 => Ok(BucketWidth::Four),
        other => Err(Error::new(ErrorKind::InvalidArg, format!("unsupported l2 table bucket width {other}"))),
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(arg: Value) -> Result<T, Error> {
    serde_json::from_value(arg).map_err(|e| Error::new(ErrorKind::InvalidArg, e.to_string()))
}

/// Exact-match MAC forwarder over a [`CuckooTable`].
pub struct L2ForwardModule {
    table: Option<CuckooTable>,
    default_gate: u16,
}

impl Default for L2ForwardModule {
    fn default() -> Self {
        Self { table: None, default_gate: DROP_GATE }
    }
}

impl L2ForwardModule {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn table_mut(&mut self) -> Result<&mut CuckooTable, Error> {
        self.table.as_mut().ok_or_else(|| Error::new(ErrorKind::InvalidArg, "l2 forwarder not initialized"))
    }

    fn table(&self) -> Result<&CuckooTable, Error> {
        self.table.as_ref().ok_or_else(|| Error::new(ErrorKind::InvalidArg, "l2 forwarder not initialized"))
    }
}

impl Module for L2ForwardModule {
    fn init(&mut self, config: Value) -> Result<(), Error> {
        let cfg: L2ForwardConfig = parse_args(config)?;
        let table = CuckooTable::new(cfg.size, bucket_width(cfg.bucket)?)?;
        self.table = Some(table);
        self.default_gate = cfg.default_gate;
        Ok(())
    }

    fn process_batch(&mut self, _igate: u16, batch: PacketBatch) -> Dispatch {
        let default_gate = self.default_gate;
        let Some(table) = self.table.as_ref() else {
            return Dispatch::Split { gates: vec![DROP_GATE; batch.len()], batch };
        };
        let gates = batch
            .as_slice()
            .iter()
            .map(|pkt| {
                mac::read_dst(pkt.data()).and_then(|addr| table.lookup(addr)).unwrap_or(default_gate)
            })
            .collect();
        Dispatch::Split { gates, batch }
    }

    fn run_task(&mut self, _arg: TaskArg) -> (TaskResult, Option<Dispatch>) {
        (TaskResult::default(), None)
    }

    fn get_desc(&self) -> String {
        match &self.table {
            Some(table) => format!("entries={} default_gate={}", table.len(), self.default_gate),
            None => "uninitialized".to_string(),
        }
    }

    fn run_command(&mut self, name: &str, arg: Value) -> Result<Value, Error> {
        match name {
            "add" => {
                let args: AddArgs = parse_args(arg)?;
                for entry in args.entries {
                    let addr = mac::parse(&entry.mac)?;
                    self.table_mut()?.insert(addr, entry.gate)?;
                    tracing::debug!(mac = %mac::format(addr), gate = entry.gate, "l2::add");
                }
                Ok(Value::Null)
            }
            "delete" => {
                let args: DeleteArgs = parse_args(arg)?;
                for mac_str in args.macs {
                    let addr = mac::parse(&mac_str)?;
                    self.table_mut()?.delete(addr)?;
                    tracing::debug!(mac = %mac::format(addr), "l2::delete");
                }
                Ok(Value::Null)
            }
            "lookup" => {
                let args: LookupArgs = parse_args(arg)?;
                let table = self.table()?;
                let results: Vec<Value> = args
                    .macs
                    .into_iter()
                    .map(|mac_str| {
                        mac::parse(&mac_str)
                            .ok()
                            .and_then(|addr| table.lookup(addr))
                            .map_or(Value::Null, Value::from)
                    })
                    .collect();
                Ok(Value::Array(results))
            }
            "set_default_gate" => {
                let args: SetDefaultGateArgs = parse_args(arg)?;
                self.default_gate = args.gate;
                Ok(Value::Null)
            }
            "populate" => {
                let args: PopulateArgs = parse_args(arg)?;
                if args.gate_count == 0 {
                    return Err(Error::new(ErrorKind::InvalidArg, "gate_count must be nonzero"));
                }
                let base = mac::parse(&args.base)?;
                let table = self.table_mut()?;
                for i in 0..u64::from(args.count) {
                    let gate = (i % u64::from(args.gate_count)) as u16;
                    table.insert(base + i, gate)?;
                }
                tracing::debug!(base = %args.base, count = args.count, gate_count = args.gate_count, "l2::populate");
                Ok(Value::Null)
            }
            // The legacy command table bound `clear` to the `add` handler
            // by copy-paste; route it to a real clear instead (spec §9).
            "clear" => {
                self.table_mut()?.flush();
                tracing::debug!("l2::clear");
                Ok(Value::Null)
            }
            other => Err(Error::new(ErrorKind::InvalidArg, format!("unknown command `{other}`"))),
        }
    }
}

/// Factory registered under the class name `"L2Forward"`.
#[derive(Debug, Default)]
pub struct L2ForwardBuilder;

impl ModuleBuilder for L2ForwardBuilder {
    fn class_name(&self) -> &'static str {
        "L2Forward"
    }

    fn help(&self) -> &'static str {
        "Exact-match L2 (MAC) forwarder backed by a cuckoo hash table"
    }

    fn num_igates(&self) -> Option<u16> {
        Some(1)
    }

    fn build(&self) -> Box<dyn Module> {
        Box::new(L2ForwardModule::new())
    }
}

#[cfg(test)]
mod tests {
    use bess_core::Packet;
    use serde_json::json;

    use super::*;

    fn frame_with_dst(mac_str: &str) -> Packet {
        let dst = mac::parse(mac_str).unwrap().to_be_bytes();
        let mut data = vec![0u8; 14];
        data[..6].copy_from_slice(&dst[2..8]);
        Packet::from_bytes(&data, 16)
    }

    #[test]
    fn s1_known_mac_routes_to_its_gate_others_to_default() {
        let mut module = L2ForwardModule::new();
        module.init(json!({ "size": 4, "bucket": 4, "default_gate": 9 })).unwrap();
        module.run_command("add", json!({ "entries": [{ "mac": "01:23:45:67:89:ab", "gate": 7 }] })).unwrap();

        let mut batch = PacketBatch::new();
        batch.push(frame_with_dst("01:23:45:67:89:ab")).unwrap();
        batch.push(frame_with_dst("ff:ff:ff:ff:ff:ff")).unwrap();

        match module.process_batch(0, batch) {
            Dispatch::Split { gates, .. } => assert_eq!(gates, vec![7, 9]),
            _ => panic!("expected a split dispatch"),
        }
    }

    #[test]
    fn clear_command_actually_clears_instead_of_adding() {
        let mut module = L2ForwardModule::new();
        module.init(json!({ "size": 4, "bucket": 4 })).unwrap();
        module.run_command("add", json!({ "entries": [{ "mac": "01:23:45:67:89:ab", "gate": 1 }] })).unwrap();
        module.run_command("clear", Value::Null).unwrap();
        let looked_up =
            module.run_command("lookup", json!({ "macs": ["01:23:45:67:89:ab"] })).unwrap();
        assert_eq!(looked_up, json!([null]));
    }

    #[test]
    fn populate_round_robins_across_gates() {
        let mut module = L2ForwardModule::new();
        module.init(json!({ "size": 16, "bucket": 4 })).unwrap();
        module
            .run_command("populate", json!({ "base": "00:00:00:00:00:00", "count": 4, "gate_count": 2 }))
            .unwrap();
        let looked_up = module
            .run_command(
                "lookup",
                json!({ "macs": ["00:00:00:00:00:00","00:00:00:00:00:01","00:00:00:00:00:02","00:00:00:00:00:03"] }),
            )
            .unwrap();
        assert_eq!(looked_up, json!([0, 1, 0, 1]));
    }

    #[test]
    fn delete_then_lookup_is_a_miss() {
        let mut module = L2ForwardModule::new();
        module.init(json!({ "size": 4, "bucket": 4 })).unwrap();
        module.run_command("add", json!({ "entries": [{ "mac": "01:23:45:67:89:ab", "gate": 3 }] })).unwrap();
        module.run_command("delete", json!({ "macs": ["01:23:45:67:89:ab"] })).unwrap();
        let looked_up =
            module.run_command("lookup", json!({ "macs": ["01:23:45:67:89:ab"] })).unwrap();
        assert_eq!(looked_up, json!([null]));
    }
}
