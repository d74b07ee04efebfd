//! The scope-component algorithm, spec §4.2.
//!
//! Terminology below follows the spec steps 1-9 directly so the two can be
//! read side by side.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::graph::{ModuleGraph, ModuleRef};
use crate::offset::Offset;
use crate::{METADATA_TOTAL, align_ceil_pow2};

type ComponentId = usize;

struct Component {
    attr_name: String,
    size: u8,
    modules: BTreeSet<ModuleRef>,
    degree: usize,
    offset: Option<Offset>,
    invalid: bool,
}

impl Component {
    fn new(attr_name: String, size: u8) -> Self {
        Self {
            attr_name,
            size,
            modules: BTreeSet::new(),
            degree: 0,
            offset: None,
            invalid: false,
        }
    }
}

/// Result of a compilation pass: the resolved offset for every
/// `(module, attribute-name)` pair that appeared in the graph.
#[derive(Debug, Default, Clone)]
pub struct CompiledAttrs {
    offsets: HashMap<(ModuleRef, String), Offset>,
}

impl CompiledAttrs {
    /// The resolved offset for `module`'s attribute named `attr`, if that
    /// module declared it.
    #[must_use]
    pub fn offset(&self, module: ModuleRef, attr: &str) -> Option<Offset> {
        self.offsets.get(&(module, attr.to_owned())).copied()
    }
}

struct Compiler<'g> {
    graph: &'g dyn ModuleGraph,
    total_bytes: u16,
    components: Vec<Component>,
    /// `(module, attr name) -> component id`, spec's `scope_id`.
    scope_of: HashMap<(ModuleRef, String), ComponentId>,
}

/// Runs the metadata compiler over `graph`, assigning a byte offset (or
/// sentinel) to every declared attribute.
#[must_use]
pub fn compile(graph: &dyn ModuleGraph) -> CompiledAttrs {
    let mut c = Compiler {
        graph,
        total_bytes: METADATA_TOTAL,
        components: Vec::new(),
        scope_of: HashMap::new(),
    };
    c.run()
}

impl<'g> Compiler<'g> {
    fn attr_desc(&self, m: ModuleRef, name: &str) -> Option<&crate::descriptor::AttrDesc> {
        self.graph.attrs(m).iter().find(|a| a.name.as_str() == name)
    }

    fn run(&mut self) -> CompiledAttrs {
        // Step 2: seed from writers.
        for m in self.graph.modules() {
            let write_attrs: Vec<(String, u8)> = self
                .graph
                .attrs(m)
                .iter()
                .filter(|a| a.mode.writes())
                .map(|a| (a.name.to_string(), a.size))
                .collect();
            for (name, size) in write_attrs {
                self.identify_single_component(m, &name, size);
            }
        }

        // Step 6: degree computation - all pairs whose module sets intersect.
        let n = self.components.len();
        for i in 0..n {
            for j in (i + 1)..n {
                if !self.components[i].modules.is_disjoint(&self.components[j].modules) {
                    self.components[i].degree += 1;
                    self.components[j].degree += 1;
                }
            }
        }

        // Step 7: offset assignment, components visited by descending degree.
        let mut order: Vec<ComponentId> = (0..n).collect();
        order.sort_by(|&a, &b| self.components[b].degree.cmp(&self.components[a].degree));

        for comp_id in order {
            self.assign(comp_id);
        }

        // Step 8: publish.
        let mut result = CompiledAttrs::default();
        for comp in &self.components {
            let offset = comp.offset.unwrap_or(Offset::NoRead);
            for &m in &comp.modules {
                if let Some(desc) = self.attr_desc(m, &comp.attr_name) {
                    let published = if comp.invalid {
                        if desc.mode.writes() && !desc.mode.reads() {
                            Offset::NoWrite
                        } else {
                            Offset::NoRead
                        }
                    } else {
                        offset
                    };
                    result
                        .offsets
                        .entry((m, comp.attr_name.clone()))
                        .or_insert(published);
                }
            }
        }

        // Step 9: orphan warnings for anything that never got touched above
        // (a writer whose component was never scoped to a reader at all, or
        // conversely a reader that never appeared in any writer's sweep).
        for m in self.graph.modules() {
            for a in self.graph.attrs(m) {
                let entry = result
                    .offsets
                    .entry((m, a.name.to_string()))
                    .or_insert(if a.mode.reads() {
                        Offset::NoRead
                    } else {
                        Offset::NoWrite
                    });
                match (*entry, a.mode) {
                    (Offset::NoWrite, mode) if mode.writes() && !mode.reads() => {
                        tracing::warn!(module = m, attr = %a.name, "write attribute is never read downstream");
                    }
                    (Offset::NoRead, mode) if mode.reads() && !mode.writes() => {
                        tracing::warn!(module = m, attr = %a.name, "read attribute has no reachable writer");
                    }
                    _ => {}
                }
            }
        }

        result
    }

    /// Step 2 helper: allocate a new component and run the downstream sweep
    /// from writer `m`.
    fn identify_single_component(&mut self, m: ModuleRef, attr: &str, size: u8) -> ComponentId {
        if let Some(&id) = self.scope_of.get(&(m, attr.to_owned())) {
            return id;
        }
        let id = self.components.len();
        self.components.push(Component::new(attr.to_owned(), size));
        let mut visited = HashSet::new();
        self.identify_component(m, attr, size, id, &mut visited);
        id
    }

    /// Step 3.
    fn identify_component(
        &mut self,
        m: ModuleRef,
        attr: &str,
        size: u8,
        comp_id: ComponentId,
        visited: &mut HashSet<ModuleRef>,
    ) {
        self.scope_of.insert((m, attr.to_owned()), comp_id);
        self.components[comp_id].modules.insert(m);
        visited.insert(m);
        for og in self.graph.downstream(m) {
            self.traverse_downstream(og, attr, size, comp_id, visited);
        }
    }

    /// Step 4.
    fn traverse_downstream(
        &mut self,
        m: ModuleRef,
        attr: &str,
        size: u8,
        comp_id: ComponentId,
        visited: &mut HashSet<ModuleRef>,
    ) {
        if visited.contains(&m) {
            return; // cycle guard
        }
        if let Some(desc) = self.attr_desc(m, attr) {
            if desc.mode.reads() {
                visited.insert(m);
                self.scope_of.insert((m, attr.to_owned()), comp_id);
                self.components[comp_id].modules.insert(m);
                let downstream = self.graph.downstream(m);
                for child in downstream {
                    self.traverse_downstream(child, attr, size, comp_id, visited);
                }
                let found_writer = self.traverse_upstream(m, attr, size, comp_id);
                if !found_writer {
                    self.components[comp_id].invalid = true;
                }
                return;
            }
            if desc.mode == crate::descriptor::AttrMode::Write {
                // A different writer: the reader beyond here belongs to a
                // component rooted at this writer, not ours.
                return;
            }
        }
        visited.insert(m);
        for child in self.graph.downstream(m) {
            self.traverse_downstream(child, attr, size, comp_id, visited);
        }
    }

    /// Step 5. Returns whether a writer was found anywhere in this subtree.
    ///
    /// Runs against its own fresh visit set rather than the downstream
    /// sweep's `visited`: the reader this is called from is always already
    /// in that set (it was just inserted by the caller), so reusing it
    /// would make every upstream walk bail on its very first module.
    /// Mirrors `metadata.cc`'s reset of the visited marker before
    /// `TraverseUpstream`.
    fn traverse_upstream(&mut self, m: ModuleRef, attr: &str, size: u8, comp_id: ComponentId) -> bool {
        let mut seen = HashSet::new();
        self.traverse_upstream_inner(m, attr, size, comp_id, &mut seen)
    }

    fn traverse_upstream_inner(
        &mut self,
        m: ModuleRef,
        attr: &str,
        size: u8,
        comp_id: ComponentId,
        seen: &mut HashSet<ModuleRef>,
    ) -> bool {
        self.components[comp_id].modules.insert(m);
        if seen.contains(&m) {
            return false;
        }
        seen.insert(m);

        if let Some(desc) = self.attr_desc(m, attr) {
            if desc.mode.writes() {
                self.identify_single_component(m, attr, size);
                return true;
            }
        }

        let ups = self.graph.upstream(m);
        if ups.is_empty() {
            return false;
        }
        let mut found = false;
        for um in ups {
            if self.traverse_upstream_inner(um, attr, size, comp_id, seen) {
                found = true;
            }
        }
        found
    }

    /// Step 7 for one component.
    fn assign(&mut self, comp_id: ComponentId) {
        if self.components[comp_id].invalid {
            self.components[comp_id].offset = Some(Offset::NoRead);
            return;
        }
        if self.components[comp_id].modules.len() <= 1 {
            self.components[comp_id].offset = Some(Offset::NoWrite);
            return;
        }

        let size = self.components[comp_id].size;
        let align = align_ceil_pow2(size);
        let mine = &self.components[comp_id].modules;

        // Gather occupied ranges from already-assigned components that
        // share at least one module with this one.
        let mut occupied: Vec<(u16, u16)> = Vec::new();
        for other_id in 0..self.components.len() {
            if other_id == comp_id {
                continue;
            }
            let other = &self.components[other_id];
            let Some(Offset::Assigned(off)) = other.offset else {
                continue;
            };
            if !mine.is_disjoint(&other.modules) {
                occupied.push((off, other.size as u16));
            }
        }
        occupied.sort_unstable_by_key(|&(off, _)| off);

        let mut offset = 0u16;
        loop {
            offset = round_up(offset, align);
            let conflict = occupied
                .iter()
                .find(|&&(o_off, o_size)| ranges_overlap(offset, size as u16, o_off, o_size));
            match conflict {
                Some(&(o_off, o_size)) => offset = o_off + o_size,
                None => break,
            }
        }

        self.components[comp_id].offset = Some(
            if offset as u32 + size as u32 > self.total_bytes as u32 {
                Offset::NoSpace
            } else {
                Offset::Assigned(offset)
            },
        );
    }
}

fn round_up(offset: u16, align: u16) -> u16 {
    if align == 0 {
        return offset;
    }
    offset.div_ceil(align) * align
}

fn ranges_overlap(a_off: u16, a_size: u16, b_off: u16, b_size: u16) -> bool {
    a_off < b_off + b_size && b_off < a_off + a_size
}
