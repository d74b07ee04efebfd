//! End-to-end scenarios S3 and S4 from spec §8, run against a hand-built
//! mock graph (no dataflow runtime dependency).

use bess_metadata::{AttrDesc, AttrMode, ModuleGraph, ModuleRef, Offset, compile};

/// A fixed graph of modules wired by fixed adjacency lists, declared once
/// at construction time (the metadata compiler only ever sees a frozen
/// snapshot of the graph, per spec §5).
struct FixedGraph {
    attrs: Vec<Vec<AttrDesc>>,
    down: Vec<Vec<ModuleRef>>,
    up: Vec<Vec<ModuleRef>>,
}

impl ModuleGraph for FixedGraph {
    fn modules(&self) -> Vec<ModuleRef> {
        (0..self.attrs.len()).collect()
    }

    fn attrs(&self, module: ModuleRef) -> &[AttrDesc] {
        &self.attrs[module]
    }

    fn downstream(&self, module: ModuleRef) -> Vec<ModuleRef> {
        self.down[module].clone()
    }

    fn upstream(&self, module: ModuleRef) -> Vec<ModuleRef> {
        self.up[module].clone()
    }
}

/// S3: `W1[writes A] -> R1[reads A] -> W2[writes B] -> R2[reads B]`, A and B
/// both 4 bytes. Their live ranges don't overlap so they may share offset 0.
#[test]
fn s3_metadata_reuse_shares_offset() {
    let graph = FixedGraph {
        attrs: vec![
            vec![AttrDesc::new("A", 4, AttrMode::Write)], // W1 = 0
            vec![AttrDesc::new("A", 4, AttrMode::Read)],  // R1 = 1
            vec![AttrDesc::new("B", 4, AttrMode::Write)], // W2 = 2
            vec![AttrDesc::new("B", 4, AttrMode::Read)],  // R2 = 3
        ],
        down: vec![vec![1], vec![2], vec![3], vec![]],
        up: vec![vec![], vec![0], vec![1], vec![2]],
    };

    let compiled = compile(&graph);
    let a0 = compiled.offset(0, "A").unwrap();
    let a1 = compiled.offset(1, "A").unwrap();
    let b2 = compiled.offset(2, "B").unwrap();
    let b3 = compiled.offset(3, "B").unwrap();

    assert_eq!(a0, a1, "both ends of the A scope must see the same offset");
    assert_eq!(b2, b3, "both ends of the B scope must see the same offset");
    assert_eq!(a0, Offset::Assigned(0));
    assert_eq!(b2, Offset::Assigned(0), "disjoint-lifetime attrs may reuse byte 0");
}

/// S4: `W[writes A and B] -> R1[reads A] -> R2[reads B]`, A and B both 4
/// bytes, both live simultaneously at W so they must get distinct offsets.
#[test]
fn s4_metadata_conflict_gets_distinct_offsets() {
    let graph = FixedGraph {
        attrs: vec![
            vec![
                AttrDesc::new("A", 4, AttrMode::Write),
                AttrDesc::new("B", 4, AttrMode::Write),
            ], // W = 0
            vec![AttrDesc::new("A", 4, AttrMode::Read)], // R1 = 1
            vec![AttrDesc::new("B", 4, AttrMode::Read)], // R2 = 2
        ],
        down: vec![vec![1], vec![2], vec![]],
        up: vec![vec![], vec![0], vec![1]],
    };

    let compiled = compile(&graph);
    let a = compiled.offset(0, "A").unwrap().assigned().unwrap();
    let b = compiled.offset(0, "B").unwrap().assigned().unwrap();

    assert_ne!(a, b);
    assert_eq!(a.min(b), 0);
    assert_eq!(a.max(b), 4);
}

/// Invariant 2: a reader whose only reachable writer is behind no gate path
/// (i.e. no writer reachable at all) gets `NO_READ`.
#[test]
fn orphan_reader_gets_no_read() {
    let graph = FixedGraph {
        attrs: vec![vec![AttrDesc::new("A", 4, AttrMode::Read)]],
        down: vec![vec![]],
        up: vec![vec![]],
    };
    let compiled = compile(&graph);
    assert_eq!(compiled.offset(0, "A"), Some(Offset::NoRead));
}

/// A write attribute with no downstream reader at all gets `NO_WRITE`.
#[test]
fn orphan_writer_gets_no_write() {
    let graph = FixedGraph {
        attrs: vec![vec![AttrDesc::new("A", 4, AttrMode::Write)]],
        down: vec![vec![]],
        up: vec![vec![]],
    };
    let compiled = compile(&graph);
    assert_eq!(compiled.offset(0, "A"), Some(Offset::NoWrite));
}
