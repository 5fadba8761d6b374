//! Pattern dictionaries: the distinct sets of INFO, FORMAT, or FILTER ids
//! that co-occur on records, deduplicated per block and referenced by a
//! 16-bit local id. Id 0 is always the empty pattern.

use std::collections::HashMap;

use strata_base::{ByteBuffer, ByteCursor, Error, Result};

const MAX_PATTERNS: usize = u16::MAX as usize + 1;

#[derive(Clone, Default, Debug)]
pub struct PatternDictionary {
    patterns: Vec<Vec<u32>>,
    by_hash: HashMap<u64, Vec<u16>>,
}

impl PatternDictionary {
    pub fn new() -> Self {
        let mut dict = PatternDictionary::default();
        // Reserve id 0 for the empty pattern.
        dict.patterns.push(Vec::new());
        dict.by_hash.insert(hash_ids(&[]), vec![0]);
        dict
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.len() <= 1
    }

    /// Intern the id-set of one record and return its local pattern id.
    /// The vector is sorted before hashing so id order on the record does
    /// not split patterns.
    pub fn intern(&mut self, ids: &[u32]) -> Result<u16> {
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let hash = hash_ids(&sorted);
        if let Some(candidates) = self.by_hash.get(&hash) {
            for &id in candidates {
                if self.patterns[id as usize] == sorted {
                    return Ok(id);
                }
            }
        }

        if self.patterns.len() >= MAX_PATTERNS {
            return Err(Error::pattern_overflow(format!(
                "more than {} distinct patterns in one block",
                MAX_PATTERNS - 1
            )));
        }
        let id = self.patterns.len() as u16;
        self.patterns.push(sorted);
        self.by_hash.entry(hash).or_default().push(id);
        Ok(id)
    }

    pub fn get(&self, id: u16) -> Option<&[u32]> {
        self.patterns.get(id as usize).map(|p| p.as_slice())
    }

    /// All global ids referenced by any pattern in this block.
    pub fn referenced_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.patterns.iter().flatten().copied().collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Length-prefixed list of length-prefixed id vectors.
    pub fn write(&self, buf: &mut ByteBuffer) {
        buf.put(self.patterns.len() as u32);
        for pattern in &self.patterns {
            buf.put(pattern.len() as u32);
            for &id in pattern {
                buf.put(id);
            }
        }
    }

    pub fn read(cur: &mut ByteCursor<'_>) -> Result<Self> {
        let count = cur.get::<u32>()? as usize;
        if count == 0 || count > MAX_PATTERNS {
            return Err(Error::truncated(format!("bad pattern count {count}")));
        }
        let mut dict = PatternDictionary {
            patterns: Vec::with_capacity(count),
            by_hash: HashMap::new(),
        };
        for id in 0..count {
            let len = cur.get::<u32>()? as usize;
            let pattern = cur.get_vec::<u32>(len)?;
            dict.by_hash
                .entry(hash_ids(&pattern))
                .or_default()
                .push(id as u16);
            dict.patterns.push(pattern);
        }
        if !dict.patterns[0].is_empty() {
            return Err(Error::truncated("pattern id 0 is not the empty pattern"));
        }
        Ok(dict)
    }
}

fn hash_ids(ids: &[u32]) -> u64 {
    let mut bytes = Vec::with_capacity(ids.len() * 4);
    for &id in ids {
        bytes.extend_from_slice(&id.to_le_bytes());
    }
    rapidhash::rapidhash(&bytes)
}
