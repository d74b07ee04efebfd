//! The dataflow runtime's module/gate graph and dispatch primitives, spec
//! §4.1.
//!
//! Connectivity and dispatch intentionally avoid recursion through `&mut
//! self`: a module instance is temporarily taken out of its slot while its
//! `process_batch` runs, and any batches it hands back are pushed onto a
//! work queue rather than dispatched via a direct recursive call. This
//! keeps the borrow checker happy without reaching for `RefCell`, and
//! incidentally turns what the original recursive C++ call chain does into
//! an explicit, boundedly-deep breadth-first walk of the graph for one
//! input batch.

use std::collections::{HashMap, VecDeque};

use bess_metadata::{CompiledAttrs, ModuleGraph, ModuleRef, Offset};

use crate::constants::{DROP_GATE, MAX_GATES};
use crate::error::{Error, ErrorKind};
use crate::gate::{GateId, InputGate, OutputGate, check_gate_index};
use crate::module::{Dispatch, Module};
use crate::names::ModuleName;
use crate::packet::{Packet, PacketPool};
use crate::registry::{BuilderRegistry, generate_name, snake_case};
use bess_metadata::AttrDesc;

struct ModuleSlot {
    name: ModuleName,
    /// `None` only while this module's `process_batch`/`run_task` is
    /// executing (taken out to avoid an aliased `&mut self` recursion).
    module: Option<Box<dyn Module>>,
    igates: Vec<Option<InputGate>>,
    ogates: Vec<Option<OutputGate>>,
    attr_offset: Vec<Offset>,
}

/// The dataflow graph: instantiated modules plus their gate wiring.
///
/// Non-goal per spec §1: single default pipeline, no multi-pipeline
/// support, so one process owns exactly one of these.
#[derive(Default)]
pub struct Pipeline {
    modules: Vec<Option<ModuleSlot>>,
    names: HashMap<ModuleName, usize>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiates a module of `class_name` from `registry`, optionally
    /// under an explicit `name`; generates `{snake_case(template)}{n}` for
    /// the lowest non-colliding `n` when `name` is `None` (spec §4.1).
    pub fn create(
        &mut self,
        registry: &BuilderRegistry,
        class_name: &str,
        name: Option<ModuleName>,
    ) -> Result<usize, Error> {
        let builder = registry.get(class_name).ok_or_else(|| {
            Error::new(ErrorKind::NotFound, format!("unknown module class `{class_name}`"))
        })?;

        let name = match name {
            Some(n) => n,
            None => generate_name(&snake_case(builder.name_template()), &self.names),
        };

        if self.names.contains_key(&name) {
            return Err(Error::new(ErrorKind::AlreadyExists, format!("module `{name}` already exists")));
        }

        let index = self.modules.len();
        self.modules.push(Some(ModuleSlot {
            name: name.clone(),
            module: Some(builder.build()),
            igates: Vec::new(),
            ogates: Vec::new(),
            attr_offset: Vec::new(),
        }));
        let _ = self.names.insert(name.clone(), index);
        tracing::info!(module = %name, class = class_name, index, "created module");
        Ok(index)
    }

    /// Looks up a module's index by name.
    #[must_use]
    pub fn find(&self, name: &ModuleName) -> Option<usize> {
        self.names.get(name).copied()
    }

    /// Calls `init` on a module with the given config.
    pub fn init_module(&mut self, module: usize, config: serde_json::Value) -> Result<(), Error> {
        let slot = self.slot_mut(module)?;
        let mut m = slot.module.take().expect("module not already taken");
        let result = m.init(config);
        self.slot_mut(module).expect("module still exists").module = Some(m);
        result
    }

    /// Runs a control-plane command against one module (spec §9, "Dynamic
    /// dispatch on modules").
    pub fn run_command(&mut self, module: usize, name: &str, arg: serde_json::Value) -> Result<serde_json::Value, Error> {
        let slot = self.slot_mut(module)?;
        let mut m = slot.module.take().expect("module not already taken");
        let result = m.run_command(name, arg);
        self.slot_mut(module).expect("module still exists").module = Some(m);
        result
    }

    /// Human-readable control-plane status string for one module.
    #[must_use]
    pub fn describe(&self, module: usize) -> String {
        self.slot(module)
            .ok()
            .and_then(|s| s.module.as_ref())
            .map_or_else(String::new, |m| m.get_desc())
    }

    /// Destroys every module: disconnects all gates, calls each module's
    /// `deinit`, and empties the registry of instances (the class
    /// registry itself is a separate, longer-lived object).
    pub fn teardown_all(&mut self) {
        for slot in self.modules.iter_mut().flatten() {
            for og in slot.ogates.iter_mut().flatten() {
                og.peer = None;
            }
            for ig in slot.igates.iter_mut().flatten() {
                ig.upstream.clear();
            }
            if let Some(mut m) = slot.module.take() {
                m.deinit();
            }
        }
        self.modules.clear();
        self.names.clear();
        tracing::info!("pipeline torn down");
    }

    fn slot_mut(&mut self, module: usize) -> Result<&mut ModuleSlot, Error> {
        self.modules
            .get_mut(module)
            .and_then(|s| s.as_mut())
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("no such module index {module}")))
    }

    fn slot(&self, module: usize) -> Result<&ModuleSlot, Error> {
        self.modules
            .get(module)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("no such module index {module}")))
    }

    /// Wires `src`'s output gate `src_ogate` to `dst`'s input gate
    /// `dst_igate` (spec §4.1, "Connectivity").
    pub fn connect(&mut self, src: usize, src_ogate: u16, dst: usize, dst_igate: u16) -> Result<(), Error> {
        check_gate_index(src_ogate)?;
        check_gate_index(dst_igate)?;
        self.slot(dst)?; // validate destination exists before mutating source

        {
            let src_slot = self.slot_mut(src)?;
            grow(&mut src_slot.ogates, src_ogate as usize);
            if let Some(Some(existing)) = src_slot.ogates.get(src_ogate as usize) {
                if existing.peer.is_some() {
                    return Err(Error::new(
                        ErrorKind::AlreadyExists,
                        format!("output gate {src_ogate} of module {} is already connected", src_slot.name),
                    ));
                }
            }
            src_slot.ogates[src_ogate as usize] = Some(OutputGate {
                peer: Some(GateId::input(dst, dst_igate)),
            });
        }

        let dst_slot = self.slot_mut(dst)?;
        grow(&mut dst_slot.igates, dst_igate as usize);
        dst_slot.igates[dst_igate as usize]
            .get_or_insert_with(InputGate::default)
            .upstream
            .push(GateId::output(src, src_ogate));

        tracing::info!(src, src_ogate, dst, dst_igate, "connected gates");
        Ok(())
    }

    /// Removes exactly one link previously made by [`Self::connect`].
    pub fn disconnect(&mut self, src: usize, src_ogate: u16, dst: usize, dst_igate: u16) -> Result<(), Error> {
        let had_peer = {
            let src_slot = self.slot_mut(src)?;
            let Some(Some(og)) = src_slot.ogates.get_mut(src_ogate as usize) else {
                return Err(Error::new(ErrorKind::NotFound, "output gate is not connected"));
            };
            let matches = og.peer == Some(GateId::input(dst, dst_igate));
            if matches {
                og.peer = None;
            }
            matches
        };
        if !had_peer {
            return Err(Error::new(ErrorKind::NotFound, "no such link to disconnect"));
        }

        let dst_slot = self.slot_mut(dst)?;
        if let Some(Some(ig)) = dst_slot.igates.get_mut(dst_igate as usize) {
            let target = GateId::output(src, src_ogate);
            let before = ig.upstream.len();
            ig.upstream.retain(|g| *g != target);
            debug_assert_eq!(ig.upstream.len(), before - 1);
        }
        tracing::info!(src, src_ogate, dst, dst_igate, "disconnected gates");
        Ok(())
    }

    /// Runs `batch` through `module`'s input gate `igate` and every
    /// downstream module it is forwarded to, until all packets are either
    /// delivered to a sink or freed.
    pub fn deliver(&mut self, pool: &mut dyn PacketPool, module: usize, igate: u16, batch: crate::batch::PacketBatch) {
        let mut queue: VecDeque<(usize, u16, crate::batch::PacketBatch)> = VecDeque::new();
        queue.push_back((module, igate, batch));

        while let Some((m, ig, b)) = queue.pop_front() {
            if b.is_empty() {
                continue;
            }
            let Ok(slot) = self.slot_mut(m) else {
                pool.free_bulk(b.into_vec());
                continue;
            };
            let Some(mut module_impl) = slot.module.take() else {
                pool.free_bulk(b.into_vec());
                continue;
            };
            let result = module_impl.process_batch(ig, b);
            // Module is guaranteed to still exist: we just had a mutable
            // reference to its slot and nothing else can remove modules
            // mid-dispatch (spec §5: single-threaded run-to-completion).
            self.slot_mut(m).expect("module present").module = Some(module_impl);
            self.enqueue_dispatch(pool, &mut queue, m, result);
        }
    }

    fn enqueue_dispatch(
        &mut self,
        pool: &mut dyn PacketPool,
        queue: &mut VecDeque<(usize, u16, crate::batch::PacketBatch)>,
        from: usize,
        result: Dispatch,
    ) {
        match result {
            Dispatch::None => {}
            Dispatch::Next(batch) => self.enqueue_choose(pool, queue, from, 0, batch),
            Dispatch::Choose { gate, batch } => self.enqueue_choose(pool, queue, from, gate, batch),
            Dispatch::Split { gates, batch } => self.enqueue_split(pool, queue, from, &gates, batch),
        }
    }

    /// `run_choose`: forward the whole batch to one gate, or free it if
    /// the gate is `DROP_GATE` or has no peer.
    fn enqueue_choose(
        &mut self,
        pool: &mut dyn PacketPool,
        queue: &mut VecDeque<(usize, u16, crate::batch::PacketBatch)>,
        from: usize,
        gate: u16,
        batch: crate::batch::PacketBatch,
    ) {
        if batch.is_empty() {
            return;
        }
        if gate == DROP_GATE {
            pool.free_bulk(batch.into_vec());
            return;
        }
        let peer = self
            .modules
            .get(from)
            .and_then(|s| s.as_ref())
            .and_then(|s| s.ogates.get(gate as usize))
            .and_then(|g| g.as_ref())
            .and_then(|og| og.peer);
        match peer {
            Some(gid) => queue.push_back((gid.module, gid.index, batch)),
            None => pool.free_bulk(batch.into_vec()),
        }
    }

    /// `run_split`: stable-partition the batch by a per-packet gate
    /// assignment, preserving each packet's relative order within its
    /// destination gate (spec §5, property #7).
    fn enqueue_split(
        &mut self,
        pool: &mut dyn PacketPool,
        queue: &mut VecDeque<(usize, u16, crate::batch::PacketBatch)>,
        from: usize,
        gates: &[u16],
        batch: crate::batch::PacketBatch,
    ) {
        debug_assert_eq!(gates.len(), batch.len(), "Dispatch::Split gate count must match batch size");

        let mut buckets: HashMap<u16, Vec<Packet>> = HashMap::new();
        let mut order: Vec<u16> = Vec::new();
        for (i, pkt) in batch.into_vec().into_iter().enumerate() {
            // A module that hands back a short gate array is a module bug;
            // route the uncovered tail to DROP_GATE rather than silently
            // leaking it (every packet delivered is forwarded or freed,
            // never neither, spec §8 property #8).
            let gate = gates.get(i).copied().unwrap_or(DROP_GATE);
            if !buckets.contains_key(&gate) {
                order.push(gate);
            }
            buckets.entry(gate).or_default().push(pkt);
        }
        for gate in order {
            let pkts = buckets.remove(&gate).unwrap_or_default();
            let sub = crate::batch::PacketBatch::from_iter_capped(pkts);
            self.enqueue_choose(pool, queue, from, gate, sub);
        }
    }

    /// Runs the metadata compiler over the frozen graph and publishes the
    /// resolved offsets into each module's `attr_offset` table (spec §4.2,
    /// step 8). Must be called with the data plane quiesced (spec §5).
    pub fn compile_metadata(&mut self) {
        let compiled = bess_metadata::compile(self);
        for (idx, slot) in self.modules.iter_mut().enumerate() {
            let Some(slot) = slot else { continue };
            let Some(module) = slot.module.as_ref() else { continue };
            let attrs = module.declared_attrs();
            slot.attr_offset = attrs
                .iter()
                .map(|a| compiled.offset(idx, a.name.as_str()).unwrap_or(Offset::NoRead))
                .collect();
        }
        tracing::info!(modules = self.modules.len(), "metadata compilation complete");
    }

    /// The resolved offset table for one module, in the same order as its
    /// `declared_attrs()`.
    #[must_use]
    pub fn attr_offsets(&self, module: usize) -> Option<&[Offset]> {
        self.modules.get(module).and_then(|s| s.as_ref()).map(|s| s.attr_offset.as_slice())
    }

    fn module_attrs(&self, module: usize) -> &[AttrDesc] {
        self.modules
            .get(module)
            .and_then(|s| s.as_ref())
            .and_then(|s| s.module.as_ref())
            .map(|m| m.declared_attrs())
            .unwrap_or(&[])
    }
}

fn grow<T>(v: &mut Vec<Option<T>>, index: usize) {
    if v.len() <= index {
        v.resize_with(index + 1, || None);
    }
}

impl ModuleGraph for Pipeline {
    fn modules(&self) -> Vec<ModuleRef> {
        self.modules
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i))
            .collect()
    }

    fn attrs(&self, module: ModuleRef) -> &[AttrDesc] {
        self.module_attrs(module)
    }

    fn downstream(&self, module: ModuleRef) -> Vec<ModuleRef> {
        let Ok(slot) = self.slot(module) else { return Vec::new() };
        slot.ogates
            .iter()
            .flatten()
            .filter_map(|og| og.peer.map(|p| p.module))
            .collect()
    }

    fn upstream(&self, module: ModuleRef) -> Vec<ModuleRef> {
        let Ok(slot) = self.slot(module) else { return Vec::new() };
        slot.igates
            .iter()
            .flatten()
            .flat_map(|ig| ig.upstream.iter().map(|g| g.module))
            .collect()
    }
}

/// Reserved gate index constant re-exported for convenience at call sites
/// that build a `Dispatch::Choose`/`Dispatch::Split` directly.
pub const DROP: u16 = DROP_GATE;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::TaskArg;
    use crate::packet::testing::HeapPool;
    use serde_json::Value;

    struct PassThrough {
        next_gate: u16,
    }

    impl Module for PassThrough {
        fn init(&mut self, _config: Value) -> Result<(), Error> {
            Ok(())
        }
        fn process_batch(&mut self, _igate: u16, batch: crate::batch::PacketBatch) -> Dispatch {
            Dispatch::Choose { gate: self.next_gate, batch }
        }
        fn run_task(&mut self, _arg: TaskArg) -> (crate::module::TaskResult, Option<Dispatch>) {
            (crate::module::TaskResult::default(), None)
        }
    }

    struct PassThroughBuilder;
    impl crate::registry::ModuleBuilder for PassThroughBuilder {
        fn class_name(&self) -> &'static str {
            "PassThrough"
        }
        fn build(&self) -> Box<dyn Module> {
            Box::new(PassThrough { next_gate: 0 })
        }
    }

    struct SplitModule;
    impl Module for SplitModule {
        fn init(&mut self, _config: Value) -> Result<(), Error> {
            Ok(())
        }
        fn process_batch(&mut self, _igate: u16, batch: crate::batch::PacketBatch) -> Dispatch {
            let gates: Vec<u16> = (0..batch.len() as u16).map(|i| i % 2).collect();
            Dispatch::Split { gates, batch }
        }
    }

    struct SplitBuilder;
    impl crate::registry::ModuleBuilder for SplitBuilder {
        fn class_name(&self) -> &'static str {
            "Split"
        }
        fn build(&self) -> Box<dyn Module> {
            Box::new(SplitModule)
        }
    }

    struct SinkModule {
        received: std::rc::Rc<std::cell::RefCell<Vec<Vec<u8>>>>,
    }
    impl Module for SinkModule {
        fn init(&mut self, _config: Value) -> Result<(), Error> {
            Ok(())
        }
        fn process_batch(&mut self, _igate: u16, batch: crate::batch::PacketBatch) -> Dispatch {
            for pkt in batch.as_slice() {
                self.received.borrow_mut().push(pkt.data().to_vec());
            }
            Dispatch::None
        }
    }

    fn tagged_packet(tag: u8) -> Packet {
        Packet::from_bytes(&[tag], 16)
    }

    #[test]
    fn name_generation_fills_gap() {
        let mut registry = BuilderRegistry::new();
        registry.register(Box::new(PassThroughBuilder)).unwrap();
        let mut pipeline = Pipeline::new();
        for explicit in ["pass_through0", "pass_through1", "pass_through3"] {
            let idx = pipeline.create(&registry, "PassThrough", Some(ModuleName::from(explicit.to_string()))).unwrap();
            let _ = idx;
        }
        let idx = pipeline.create(&registry, "PassThrough", None).unwrap();
        assert_eq!(pipeline.modules[idx].as_ref().unwrap().name.as_str(), "pass_through2");
    }

    #[test]
    fn connect_rejects_double_use_of_same_output_gate() {
        let mut registry = BuilderRegistry::new();
        registry.register(Box::new(PassThroughBuilder)).unwrap();
        let mut pipeline = Pipeline::new();
        let a = pipeline.create(&registry, "PassThrough", None).unwrap();
        let b = pipeline.create(&registry, "PassThrough", None).unwrap();
        let c = pipeline.create(&registry, "PassThrough", None).unwrap();
        pipeline.connect(a, 0, b, 0).unwrap();
        let err = pipeline.connect(a, 0, c, 0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::AlreadyExists);
    }

    #[test]
    fn disconnect_removes_exactly_one_link() {
        let mut registry = BuilderRegistry::new();
        registry.register(Box::new(PassThroughBuilder)).unwrap();
        let mut pipeline = Pipeline::new();
        let a = pipeline.create(&registry, "PassThrough", None).unwrap();
        let b = pipeline.create(&registry, "PassThrough", None).unwrap();
        pipeline.connect(a, 0, b, 0).unwrap();
        pipeline.disconnect(a, 0, b, 0).unwrap();
        assert!(pipeline.disconnect(a, 0, b, 0).is_err());
    }

    #[test]
    fn drop_gate_frees_every_packet_exactly_once() {
        let mut registry = BuilderRegistry::new();
        registry.register(Box::new(PassThroughBuilder)).unwrap();
        let mut pipeline = Pipeline::new();
        let a = pipeline.create(&registry, "PassThrough", None).unwrap();
        {
            let slot = pipeline.modules[a].as_mut().unwrap();
            slot.module = Some(Box::new(PassThrough { next_gate: DROP_GATE }));
        }
        let mut pool = HeapPool::default();
        let mut batch = crate::batch::PacketBatch::new();
        for t in 0..5u8 {
            batch.push(tagged_packet(t)).unwrap();
        }
        pipeline.deliver(&mut pool, a, 0, batch);
        assert_eq!(pool.freed_count(), 5);
    }

    #[test]
    fn run_split_preserves_order_within_each_gate() {
        let mut registry = BuilderRegistry::new();
        registry.register(Box::new(SplitBuilder)).unwrap();
        let mut pipeline = Pipeline::new();
        let src = pipeline.create(&registry, "Split", None).unwrap();

        let received_even = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let received_odd = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));

        let even = pipeline.modules.len();
        pipeline.modules.push(Some(ModuleSlot {
            name: ModuleName::from("even".to_string()),
            module: Some(Box::new(SinkModule { received: received_even.clone() })),
            igates: Vec::new(),
            ogates: Vec::new(),
            attr_offset: Vec::new(),
        }));
        let _ = pipeline.names.insert(ModuleName::from("even".to_string()), even);

        let odd = pipeline.modules.len();
        pipeline.modules.push(Some(ModuleSlot {
            name: ModuleName::from("odd".to_string()),
            module: Some(Box::new(SinkModule { received: received_odd.clone() })),
            igates: Vec::new(),
            ogates: Vec::new(),
            attr_offset: Vec::new(),
        }));
        let _ = pipeline.names.insert(ModuleName::from("odd".to_string()), odd);

        pipeline.connect(src, 0, even, 0).unwrap();
        pipeline.connect(src, 1, odd, 0).unwrap();

        let mut pool = HeapPool::default();
        let mut batch = crate::batch::PacketBatch::new();
        for t in 0..8u8 {
            batch.push(tagged_packet(t)).unwrap();
        }
        pipeline.deliver(&mut pool, src, 0, batch);

        assert_eq!(
            received_even.borrow().iter().map(|p| p[0]).collect::<Vec<_>>(),
            vec![0, 2, 4, 6]
        );
        assert_eq!(
            received_odd.borrow().iter().map(|p| p[0]).collect::<Vec<_>>(),
            vec![1, 3, 5, 7]
        );
    }
}
