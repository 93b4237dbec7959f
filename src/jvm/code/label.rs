use crate::jvm::verifier::VType;
use crate::jvm::Error;
use bitflags::bitflags;
use std::collections::HashSet;
use std::fmt;

/// Position in the code of one method
///
/// Labels are handles into the [`LabelGraph`] of the method that created them, so they are cheap
/// to copy around and meaningless outside that method.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Label(pub(crate) usize);

impl fmt::Debug for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}

bitflags! {
    #[derive(Default)]
    pub struct LabelFlags: u8 {
        /// Block needs a stack map frame (jump or handler target, or code after an
        /// unconditional jump)
        const TARGET = 0x01;

        /// Block was found to be reachable from the method entry
        const REACHABLE = 0x02;
    }
}

/// Control flow edge out of a basic block
#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    pub kind: EdgeKind,

    /// Label of the block the edge leads to (not necessarily placed yet)
    pub successor: Label,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EdgeKind {
    /// Jump or fall through
    Normal,

    /// Exception edge when only the maximum stack size is computed
    Exception,

    /// Exception edge when frames are computed, carrying the type of the caught exception
    ExceptionFrame(VType),
}

#[derive(Debug, Default)]
struct LabelData {
    /// Bytecode position, once the label is placed
    position: Option<u32>,

    /// Final offset, once the graph is resolved
    offset: Option<u32>,
    flags: LabelFlags,
    edges: Vec<Edge>,

    /// Label of the block this label starts, when it was placed at an empty block
    alias: Option<Label>,

    /// Position in the placement chain (only for block leaders)
    chain_index: Option<usize>,
}

/// Labels of one method body and the control flow graph between their basic blocks
///
/// A label placed at a new position starts a basic block, and the blocks form a chain in
/// placement order. A label placed where the current block is still empty does not start a
/// block of its own: it is an alias for that block. Edges and flags always belong to blocks, so
/// they are recorded on the label that starts the block.
#[derive(Debug, Default)]
pub struct LabelGraph {
    labels: Vec<LabelData>,

    /// Block leaders, in placement order
    chain: Vec<Label>,
}

impl LabelGraph {
    pub fn new() -> LabelGraph {
        LabelGraph::default()
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.labels.len());
        self.labels.push(LabelData::default());
        label
    }

    /// Number of labels created
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Place a label at a bytecode position, returning whether it starts a new basic block
    pub fn place(&mut self, label: Label, position: u32) -> Result<bool, Error> {
        let data = self.data_mut(label)?;
        if data.position.is_some() {
            return Err(Error::DuplicateLabel(label));
        }
        data.position = Some(position);

        if let Some(&leader) = self.chain.last() {
            if self.labels[leader.0].position == Some(position) {
                let data = &mut self.labels[label.0];
                data.alias = Some(leader);
                let flags = data.flags;
                let edges = std::mem::take(&mut data.edges);
                self.labels[leader.0].flags |= flags;
                self.labels[leader.0].edges.extend(edges);
                return Ok(false);
            }
        }

        self.labels[label.0].chain_index = Some(self.chain.len());
        self.chain.push(label);
        Ok(true)
    }

    /// Assign every placed label its final offset
    pub fn resolve(&mut self) {
        for data in &mut self.labels {
            data.offset = data.position;
        }
    }

    /// Final offset of a label
    pub fn offset(&self, label: Label) -> Result<u32, Error> {
        self.labels
            .get(label.0)
            .and_then(|data| data.offset)
            .ok_or(Error::UnresolvedLabel(label))
    }

    /// Position of a label, if it has been placed
    pub fn position(&self, label: Label) -> Option<u32> {
        self.labels.get(label.0).and_then(|data| data.position)
    }

    /// Label starting the basic block that a label belongs to
    pub fn block_of(&self, label: Label) -> Label {
        self.labels
            .get(label.0)
            .and_then(|data| data.alias)
            .unwrap_or(label)
    }

    /// Block leaders, in placement order
    pub fn blocks(&self) -> &[Label] {
        &self.chain
    }

    /// Block placed right after the block of this label
    pub fn next_block(&self, label: Label) -> Option<Label> {
        let leader = self.block_of(label);
        let index = self.labels.get(leader.0)?.chain_index?;
        self.chain.get(index + 1).copied()
    }

    /// Add an edge out of the block of `from`
    pub fn add_edge(&mut self, from: Label, kind: EdgeKind, successor: Label) -> Result<(), Error> {
        let leader = self.block_of(from);
        self.data_mut(leader)?.edges.push(Edge { kind, successor });
        Ok(())
    }

    /// Edges out of the block of this label
    pub fn edges(&self, label: Label) -> &[Edge] {
        match self.labels.get(self.block_of(label).0) {
            Some(data) => &data.edges,
            None => &[],
        }
    }

    pub fn flags(&self, label: Label) -> LabelFlags {
        self.labels
            .get(self.block_of(label).0)
            .map(|data| data.flags)
            .unwrap_or_default()
    }

    /// Set flags on the block of this label (or on the label itself, until it is placed)
    pub fn set_flags(&mut self, label: Label, flags: LabelFlags) {
        let leader = self.block_of(label);
        if let Some(data) = self.labels.get_mut(leader.0) {
            data.flags |= flags;
        }
    }

    /// Blocks reachable from a block by following edges
    pub fn reachable_from(&self, entry: Label) -> HashSet<Label> {
        let mut reachable = HashSet::new();
        let mut to_visit = vec![self.block_of(entry)];
        while let Some(block) = to_visit.pop() {
            if !reachable.insert(block) {
                continue;
            }
            for edge in self.edges(block) {
                let successor = self.block_of(edge.successor);
                if !reachable.contains(&successor) {
                    to_visit.push(successor);
                }
            }
        }
        reachable
    }

    fn data_mut(&mut self, label: Label) -> Result<&mut LabelData, Error> {
        self.labels
            .get_mut(label.0)
            .ok_or(Error::UnresolvedLabel(label))
    }
}
