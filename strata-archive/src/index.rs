//! The per-contig hierarchical bin index and the linear block index.
//!
//! Bins form a complete 4-ary tree, at most seven levels below the root,
//! held in a flat arena addressed by u32 slot ids. Nodes are laid out in
//! depth-first preorder, so a node's slot id doubles as its bin number.
//! The linear index is a flat per-contig vector of fixed-width entries
//! supporting single-pass block iteration without any tree walk.

use strata_base::{ByteBuffer, ByteCursor, Error, Result};

use crate::header::ContigDescriptor;

/// Leaf bins aim at this many bases of span.
const TARGET_LEAF_SPAN: u64 = 2500;
const MAX_LEVELS: u8 = 7;
const NO_CHILD: u32 = u32::MAX;

/// One linear-index entry per block.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct IndexEntry {
    pub block_id: u64,
    pub contig: i32,
    pub n_variants: u32,
    pub byte_offset: u64,
    pub byte_offset_end: u64,
    pub min_position: u64,
    pub max_position: u64,
    pub min_bin: i32,
    pub max_bin: i32,
}

impl Default for IndexEntry {
    fn default() -> Self {
        IndexEntry {
            block_id: 0,
            contig: -1,
            n_variants: 0,
            byte_offset: 0,
            byte_offset_end: 0,
            min_position: 0,
            max_position: 0,
            min_bin: i32::MAX,
            max_bin: 0,
        }
    }
}

impl IndexEntry {
    fn write(&self, buf: &mut ByteBuffer) {
        buf.put(self.block_id);
        buf.put(self.contig);
        buf.put(self.n_variants);
        buf.put(self.byte_offset);
        buf.put(self.byte_offset_end);
        buf.put(self.min_position);
        buf.put(self.max_position);
        buf.put(self.min_bin);
        buf.put(self.max_bin);
    }

    fn read(cur: &mut ByteCursor<'_>) -> Result<Self> {
        Ok(IndexEntry {
            block_id: cur.get::<u64>()?,
            contig: cur.get::<i32>()?,
            n_variants: cur.get::<u32>()?,
            byte_offset: cur.get::<u64>()?,
            byte_offset_end: cur.get::<u64>()?,
            min_position: cur.get::<u64>()?,
            max_position: cur.get::<u64>()?,
            min_bin: cur.get::<i32>()?,
            max_bin: cur.get::<i32>()?,
        })
    }

    /// Does the block's position span intersect `[pos_min, pos_max]`?
    pub fn intersects(&self, pos_min: u64, pos_max: u64) -> bool {
        self.min_position <= pos_max && pos_min <= self.max_position
    }
}

#[derive(Clone, Debug)]
struct BinNode {
    start: u64,
    span: u64,
    children: [u32; 4],
    ids: Vec<u32>,
}

/// The bin tree for one contig.
#[derive(Clone, Debug)]
pub struct ContigIndex {
    pub contig: u32,
    pub length: u64,
    pub levels: u8,
    nodes: Vec<BinNode>,
}

/// Levels chosen so the widest leaf stays near the target span: start at
/// the deepest tree and step down while leaves are finer than the target.
fn choose_levels(length: u64) -> u8 {
    let bins_lowest = 4u64.pow(MAX_LEVELS as u32);
    let used = length.div_ceil(bins_lowest).max(1) * bins_lowest;
    if used / bins_lowest >= TARGET_LEAF_SPAN {
        return MAX_LEVELS;
    }
    for level in (1..=MAX_LEVELS).rev() {
        if used / 4u64.pow(level as u32) > TARGET_LEAF_SPAN {
            return level;
        }
    }
    1
}

impl ContigIndex {
    pub fn new(contig: u32, length: u64) -> Self {
        let levels = choose_levels(length);
        let bins_lowest = 4u64.pow(levels as u32);
        let rounded = length.div_ceil(bins_lowest).max(1) * bins_lowest;
        let mut nodes = Vec::new();
        build_preorder(&mut nodes, 0, rounded, 0, levels);
        ContigIndex {
            contig,
            length,
            levels,
            nodes,
        }
    }

    pub fn n_bins(&self) -> usize {
        self.nodes.len()
    }

    /// Walk down while both endpoints fall into the same child; append
    /// the block id to the deepest such bin. Returns the bin number.
    pub fn add(&mut self, block_id: u32, pos_min: u64, pos_max: u64) -> u32 {
        let mut slot = 0u32;
        'descend: loop {
            let node = &self.nodes[slot as usize];
            for &child in &node.children {
                if child == NO_CHILD {
                    break;
                }
                let c = &self.nodes[child as usize];
                if pos_min >= c.start && pos_max < c.start + c.span {
                    slot = child;
                    continue 'descend;
                }
            }
            break;
        }
        let ids = &mut self.nodes[slot as usize].ids;
        if ids.last() != Some(&block_id) {
            ids.push(block_id);
        }
        slot
    }

    /// Collect block ids from every bin intersecting the interval, at
    /// every level. Callers still owe exact position filtering.
    pub fn query(&self, pos_min: u64, pos_max: u64) -> Vec<u32> {
        let mut out = Vec::new();
        let mut stack = vec![0u32];
        while let Some(slot) = stack.pop() {
            let node = &self.nodes[slot as usize];
            if pos_min >= node.start + node.span || pos_max < node.start {
                continue;
            }
            out.extend_from_slice(&node.ids);
            for &child in &node.children {
                if child != NO_CHILD {
                    stack.push(child);
                }
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    fn write(&self, buf: &mut ByteBuffer) {
        buf.put(self.contig);
        buf.put(self.length);
        buf.put(self.levels);
        let populated: Vec<(u32, &Vec<u32>)> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.ids.is_empty())
            .map(|(slot, n)| (slot as u32, &n.ids))
            .collect();
        buf.put(populated.len() as u32);
        for (slot, ids) in populated {
            buf.put(slot);
            buf.put(ids.len() as u32);
            for &id in ids {
                buf.put(id);
            }
        }
    }

    fn read(cur: &mut ByteCursor<'_>) -> Result<Self> {
        let contig = cur.get::<u32>()?;
        let length = cur.get::<u64>()?;
        let levels = cur.get::<u8>()?;
        if levels == 0 || levels > MAX_LEVELS {
            return Err(Error::truncated(format!("bad index level count {levels}")));
        }
        let mut index = ContigIndex::new(contig, length);
        if index.levels != levels {
            return Err(Error::truncated("index level count does not match length"));
        }
        let populated = cur.get::<u32>()? as usize;
        for _ in 0..populated {
            let slot = cur.get::<u32>()? as usize;
            let count = cur.get::<u32>()? as usize;
            let ids = cur.get_vec::<u32>(count)?;
            let node = index
                .nodes
                .get_mut(slot)
                .ok_or_else(|| Error::truncated("index bin slot out of range"))?;
            node.ids = ids;
        }
        Ok(index)
    }
}

fn build_preorder(nodes: &mut Vec<BinNode>, start: u64, span: u64, level: u8, max_level: u8) {
    let slot = nodes.len();
    nodes.push(BinNode {
        start,
        span,
        children: [NO_CHILD; 4],
        ids: Vec::new(),
    });
    if level == max_level {
        return;
    }
    let child_span = span / 4;
    for i in 0..4u64 {
        let child_slot = nodes.len() as u32;
        nodes[slot].children[i as usize] = child_slot;
        build_preorder(
            nodes,
            start + i * child_span,
            child_span,
            level + 1,
            max_level,
        );
    }
}

/// The archive-wide index: one bin tree per contig plus the linear lists.
#[derive(Clone, Default, Debug)]
pub struct VariantIndex {
    contigs: Vec<ContigIndex>,
    linear: Vec<Vec<IndexEntry>>,
}

impl VariantIndex {
    pub fn new() -> Self {
        VariantIndex::default()
    }

    pub fn setup(contigs: &[ContigDescriptor]) -> Self {
        VariantIndex {
            contigs: contigs
                .iter()
                .map(|c| ContigIndex::new(c.id, c.length))
                .collect(),
            linear: vec![Vec::new(); contigs.len()],
        }
    }

    pub fn n_contigs(&self) -> usize {
        self.contigs.len()
    }

    pub fn contig(&self, contig: i32) -> Result<&ContigIndex> {
        usize::try_from(contig)
            .ok()
            .and_then(|c| self.contigs.get(c))
            .ok_or_else(|| Error::contig_range(format!("contig {contig} not in the index")))
    }

    /// Index one record of a block; returns the bin it landed in.
    pub fn add_record(
        &mut self,
        contig: i32,
        pos_min: u64,
        pos_max: u64,
        block_id: u32,
    ) -> Result<u32> {
        let index = usize::try_from(contig)
            .ok()
            .and_then(|c| self.contigs.get_mut(c))
            .ok_or_else(|| Error::contig_range(format!("contig {contig} not in the index")))?;
        Ok(index.add(block_id, pos_min, pos_max))
    }

    /// Record one finished block in the linear index.
    pub fn push_block(&mut self, entry: IndexEntry) -> Result<()> {
        let contig = usize::try_from(entry.contig)
            .ok()
            .and_then(|c| self.linear.get_mut(c))
            .ok_or_else(|| {
                Error::contig_range(format!("contig {} not in the index", entry.contig))
            })?;
        contig.push(entry);
        Ok(())
    }

    /// All linear entries in block-id (write) order.
    pub fn linear_entries(&self) -> Vec<IndexEntry> {
        let mut entries: Vec<IndexEntry> = self.linear.iter().flatten().copied().collect();
        entries.sort_by_key(|e| e.block_id);
        entries
    }

    pub fn n_blocks(&self) -> usize {
        self.linear.iter().map(|l| l.len()).sum()
    }

    /// Superset query through the bins, narrowed by the linear entries'
    /// exact position spans.
    pub fn query(&self, contig: i32, pos_min: u64, pos_max: u64) -> Result<Vec<IndexEntry>> {
        let tree = self.contig(contig)?;
        let ids = tree.query(pos_min, pos_max);
        let linear = &self.linear[contig as usize];
        let mut out = Vec::new();
        for id in ids {
            if let Some(entry) = linear.iter().find(|e| e.block_id == id as u64) {
                if entry.intersects(pos_min, pos_max) {
                    out.push(*entry);
                }
            }
        }
        out.sort_by_key(|e| e.block_id);
        out.dedup_by_key(|e| e.block_id);
        Ok(out)
    }

    pub fn write(&self, buf: &mut ByteBuffer) {
        buf.put(self.contigs.len() as u32);
        for contig in &self.contigs {
            contig.write(buf);
        }
        for linear in &self.linear {
            buf.put(linear.len() as u32);
            for entry in linear {
                entry.write(buf);
            }
        }
    }

    pub fn read(cur: &mut ByteCursor<'_>) -> Result<Self> {
        let n_contigs = cur.get::<u32>()? as usize;
        let mut contigs = Vec::with_capacity(n_contigs);
        for _ in 0..n_contigs {
            contigs.push(ContigIndex::read(cur)?);
        }
        let mut linear = Vec::with_capacity(n_contigs);
        for _ in 0..n_contigs {
            let count = cur.get::<u32>()? as usize;
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                entries.push(IndexEntry::read(cur)?);
            }
            linear.push(entries);
        }
        Ok(VariantIndex { contigs, linear })
    }
}
