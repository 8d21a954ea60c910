//! The phrase table: a read-only, memory-mapped index from syllable-id codes
//! to phrase entries.
//!
//! On disk the table is a little-endian arena addressed by signed 32-bit
//! offsets relative to the file base (0 is null). The index has up to four
//! levels: a dense head array over the first syllable, sorted trunk arrays
//! for the second and third, and a tail array whose nodes carry the extra
//! code beyond the indexed prefix. Every dereference is bounds-checked
//! against the mapped region; a bad offset yields an empty result, never a
//! wild read.

use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use crate::spelling::{Code, SyllableId, INDEX_CODE_MAX_LENGTH, TAIL_SENTINEL};
use crate::syllabifier::SyllableGraph;
use crate::vocabulary::{Syllabary, Vocabulary};

pub const TABLE_FORMAT: &str = "Rime::Table/1.0";
pub const TABLE_FORMAT_PREFIX: &str = "Rime::Table/";

const FORMAT_MAX_LENGTH: usize = 32;
const METADATA_SIZE: usize = 52;
const HEAD_NODE_SIZE: i64 = 12;
const TRUNK_NODE_SIZE: i64 = 16;
const TAIL_NODE_SIZE: i64 = 20;
const ENTRY_SIZE: i64 = 12;
const STRING_REF_SIZE: i64 = 8;

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("table file too small ({0} bytes)")]
    Truncated(usize),
    #[error("format mismatch: {0:?}")]
    Format(String),
    #[error("metadata offset out of range")]
    BadMetadata,
}

/// End position -> accessors contributing entries there.
pub type TableQueryResult = std::collections::BTreeMap<usize, Vec<TableAccessor>>;

pub struct Table {
    mmap: Mmap,
    dict_file_checksum: u32,
    num_syllables: usize,
    num_entries: usize,
    syllabary_off: i32,
    index_off: i32,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("num_syllables", &self.num_syllables)
            .field("num_entries", &self.num_entries)
            .field("dict_file_checksum", &self.dict_file_checksum)
            .finish()
    }
}

impl Table {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
        let file = File::open(path.as_ref())?;
        let mmap = unsafe { Mmap::map(&file)? };
        if mmap.len() < METADATA_SIZE {
            return Err(TableError::Truncated(mmap.len()));
        }
        if !mmap[..FORMAT_MAX_LENGTH].starts_with(TABLE_FORMAT_PREFIX.as_bytes()) {
            let found = String::from_utf8_lossy(
                &mmap[..FORMAT_MAX_LENGTH.min(mmap.len())],
            )
            .trim_end_matches('\0')
            .to_string();
            return Err(TableError::Format(found));
        }
        let le_u32 = |off: usize| u32::from_le_bytes(mmap[off..off + 4].try_into().unwrap());
        let le_i32 = |off: usize| i32::from_le_bytes(mmap[off..off + 4].try_into().unwrap());
        let dict_file_checksum = le_u32(32);
        let num_syllables = le_i32(36);
        let num_entries = le_i32(40);
        let syllabary_off = le_i32(44);
        let index_off = le_i32(48);
        if num_syllables < 0
            || syllabary_off < METADATA_SIZE as i32
            || index_off < METADATA_SIZE as i32
            || syllabary_off as usize >= mmap.len()
            || index_off as usize >= mmap.len()
        {
            return Err(TableError::BadMetadata);
        }
        tracing::debug!(
            path = %path.as_ref().display(),
            num_syllables,
            num_entries,
            "loaded table"
        );
        Ok(Table {
            mmap,
            dict_file_checksum,
            num_syllables: num_syllables as usize,
            num_entries: num_entries.max(0) as usize,
            syllabary_off,
            index_off,
        })
    }

    pub fn dict_file_checksum(&self) -> u32 {
        self.dict_file_checksum
    }

    pub fn num_syllables(&self) -> usize {
        self.num_syllables
    }

    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    pub fn get_syllable_by_id(&self, syllable_id: SyllableId) -> Option<&str> {
        if syllable_id < 0 {
            return None;
        }
        let size = self.read_u32(self.syllabary_off as i64)? as usize;
        let id = syllable_id as usize;
        if id >= size {
            return None;
        }
        self.read_str(self.syllabary_off as i64 + 4 + STRING_REF_SIZE * id as i64)
    }

    pub fn get_syllabary(&self) -> Syllabary {
        let mut result = Syllabary::new();
        for id in 0..self.num_syllables as SyllableId {
            if let Some(s) = self.get_syllable_by_id(id) {
                result.insert(s.to_string());
            }
        }
        result
    }

    /// Entries whose code is exactly one syllable.
    pub fn query_words(table: &Arc<Table>, syllable_id: SyllableId) -> TableAccessor {
        TableVisitor::new(table.clone()).access(syllable_id)
    }

    /// Entries whose code equals `code` (walking the tail level for codes
    /// longer than the indexed prefix).
    pub fn query_phrases(table: &Arc<Table>, code: &[SyllableId]) -> TableAccessor {
        if code.is_empty() {
            return TableAccessor::empty();
        }
        let mut visitor = TableVisitor::new(table.clone());
        for i in 0..INDEX_CODE_MAX_LENGTH {
            if code.len() == i + 1 {
                return visitor.access(code[i]);
            }
            if !visitor.walk(code[i], 1.0) {
                return TableAccessor::empty();
            }
        }
        visitor.access(TAIL_SENTINEL)
    }

    /// Breadth-first query over a syllable graph from `start_pos`.
    ///
    /// Accessors over indexed levels are filed under the end position of the
    /// edge that produced them; tail accessors are filed under the position
    /// the visitor has reached, their extra codes to be matched by the
    /// caller.
    pub fn query(
        table: &Arc<Table>,
        graph: &SyllableGraph,
        start_pos: usize,
    ) -> TableQueryResult {
        let mut result = TableQueryResult::new();
        if start_pos >= graph.interpreted_length {
            return result;
        }
        let mut queue: VecDeque<(usize, TableVisitor)> = VecDeque::new();
        queue.push_back((start_pos, TableVisitor::new(table.clone())));
        while let Some((current_pos, mut visitor)) = queue.pop_front() {
            let index = match graph.indices.get(&current_pos) {
                Some(index) => index,
                None => continue,
            };
            if visitor.level() == INDEX_CODE_MAX_LENGTH {
                let accessor = visitor.access(TAIL_SENTINEL);
                if !accessor.exhausted() {
                    result.entry(current_pos).or_default().push(accessor);
                }
                continue;
            }
            for (&syllable_id, spellings) in index {
                let accessor = visitor.access(syllable_id);
                for props in spellings {
                    let end_pos = props.end_pos;
                    if !accessor.exhausted() {
                        result.entry(end_pos).or_default().push(accessor.clone());
                    }
                    if end_pos < graph.interpreted_length
                        && visitor.walk(syllable_id, props.credibility)
                    {
                        queue.push_back((end_pos, visitor.clone()));
                        visitor.backdate();
                    }
                }
            }
        }
        result
    }

    // bounds-checked raw reads

    fn slice(&self, off: i64, len: usize) -> Option<&[u8]> {
        if off < 0 {
            return None;
        }
        let off = off as usize;
        let end = off.checked_add(len)?;
        if end > self.mmap.len() {
            tracing::warn!(off, len, "table dereference out of mapped region");
            return None;
        }
        Some(&self.mmap[off..end])
    }

    fn read_u32(&self, off: i64) -> Option<u32> {
        self.slice(off, 4)
            .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
    }

    fn read_i32(&self, off: i64) -> Option<i32> {
        self.slice(off, 4)
            .map(|b| i32::from_le_bytes(b.try_into().unwrap()))
    }

    fn read_f32(&self, off: i64) -> Option<f32> {
        self.slice(off, 4)
            .map(|b| f32::from_le_bytes(b.try_into().unwrap()))
    }

    /// Resolve a `{length, offset}` string reference.
    fn read_str(&self, off: i64) -> Option<&str> {
        let len = self.read_u32(off)? as usize;
        if len == 0 {
            return Some("");
        }
        let bytes_off = self.read_i32(off + 4)?;
        let bytes = self.slice(bytes_off as i64, len)?;
        std::str::from_utf8(bytes).ok()
    }

    /// Binary search a trunk index for `key`; returns the node offset.
    fn find_trunk_node(&self, trunk_off: i32, key: SyllableId) -> Option<i64> {
        let size = self.read_u32(trunk_off as i64)? as usize;
        let base = trunk_off as i64 + 4;
        let mut lo = 0usize;
        let mut hi = size;
        while lo < hi {
            let mid = (lo + hi) / 2;
            let k = self.read_i32(base + TRUNK_NODE_SIZE * mid as i64)?;
            if k < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        let node = base + TRUNK_NODE_SIZE * lo as i64;
        if lo < size && self.read_i32(node)? == key {
            Some(node)
        } else {
            None
        }
    }
}

/// Walks the table index level by level while the graph query advances
/// through syllables, carrying the running credibility product.
#[derive(Clone)]
pub struct TableVisitor {
    table: Arc<Table>,
    level: usize,
    index_code: Code,
    credibility: Vec<f64>,
    lv2: Option<i32>,
    lv3: Option<i32>,
    lv4: Option<i32>,
}

impl TableVisitor {
    pub fn new(table: Arc<Table>) -> Self {
        TableVisitor {
            table,
            level: 0,
            index_code: Code::new(),
            credibility: vec![1.0],
            lv2: None,
            lv3: None,
            lv4: None,
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// Entries terminating at the current level for `syllable_id`
    /// (the tail sentinel at the deepest level).
    pub fn access(&self, syllable_id: SyllableId) -> TableAccessor {
        let credibility = *self.credibility.last().unwrap_or(&1.0);
        let table = &self.table;
        match self.level {
            0 => {
                if syllable_id < 0 || syllable_id as usize >= table.num_syllables {
                    return TableAccessor::empty();
                }
                let node = table.index_off as i64 + HEAD_NODE_SIZE * syllable_id as i64;
                self.entries_accessor(node, syllable_id, credibility)
            }
            1 | 2 => {
                let trunk = if self.level == 1 { self.lv2 } else { self.lv3 };
                let trunk = match trunk {
                    Some(off) => off,
                    None => return TableAccessor::empty(),
                };
                match table.find_trunk_node(trunk, syllable_id) {
                    // entry list sits after the key field
                    Some(node) => self.entries_accessor(node + 4, syllable_id, credibility),
                    None => TableAccessor::empty(),
                }
            }
            _ => {
                let tail = match self.lv4 {
                    Some(off) => off,
                    None => return TableAccessor::empty(),
                };
                let size = table.read_u32(tail as i64).unwrap_or(0);
                TableAccessor {
                    table: Some(self.table.clone()),
                    index_code: self.index_code.clone(),
                    source: AccessorSource::Tail(tail as i64 + 4),
                    size,
                    cursor: 0,
                    credibility,
                }
            }
        }
    }

    fn entries_accessor(
        &self,
        entries_ref: i64,
        syllable_id: SyllableId,
        credibility: f64,
    ) -> TableAccessor {
        let size = self.table.read_u32(entries_ref).unwrap_or(0);
        let off = self.table.read_i32(entries_ref + 4).unwrap_or(0);
        if size == 0 || off == 0 {
            return TableAccessor::empty();
        }
        let mut code = self.index_code.clone();
        code.push(syllable_id);
        TableAccessor {
            table: Some(self.table.clone()),
            index_code: code,
            source: AccessorSource::Entries(off as i64),
            size,
            cursor: 0,
            credibility,
        }
    }

    /// Descend one level through `syllable_id`, multiplying `credibility`
    /// into the running product. Returns false when there is no deeper level.
    pub fn walk(&mut self, syllable_id: SyllableId, credibility: f64) -> bool {
        let table = &self.table;
        let next = match self.level {
            0 => {
                if syllable_id < 0 || syllable_id as usize >= table.num_syllables {
                    return false;
                }
                let node = table.index_off as i64 + HEAD_NODE_SIZE * syllable_id as i64;
                table.read_i32(node + 8).unwrap_or(0)
            }
            1 | 2 => {
                let trunk = if self.level == 1 { self.lv2 } else { self.lv3 };
                let trunk = match trunk {
                    Some(off) => off,
                    None => return false,
                };
                match table.find_trunk_node(trunk, syllable_id) {
                    Some(node) => table.read_i32(node + 12).unwrap_or(0),
                    None => return false,
                }
            }
            _ => return false,
        };
        if next <= 0 {
            return false;
        }
        match self.level {
            0 => self.lv2 = Some(next),
            1 => self.lv3 = Some(next),
            _ => self.lv4 = Some(next),
        }
        self.level += 1;
        self.index_code.push(syllable_id);
        let running = *self.credibility.last().unwrap_or(&1.0);
        self.credibility.push(running * credibility);
        true
    }

    /// Undo the last [`walk`](Self::walk) so the visitor can be reused for a
    /// sibling spelling.
    pub fn backdate(&mut self) -> bool {
        if self.level == 0 {
            return false;
        }
        self.level -= 1;
        if self.index_code.len() > self.level {
            self.index_code.pop();
            self.credibility.pop();
        }
        true
    }
}

#[derive(Clone, Copy)]
enum AccessorSource {
    Null,
    /// Offset of an `Entry` array.
    Entries(i64),
    /// Offset of a `TailIndexNode` array.
    Tail(i64),
}

/// Forward cursor over the entries reachable at one index node, carrying a
/// credibility multiplier to apply to entry weights at read time.
#[derive(Clone)]
pub struct TableAccessor {
    table: Option<Arc<Table>>,
    index_code: Code,
    source: AccessorSource,
    size: u32,
    cursor: u32,
    credibility: f64,
}

impl TableAccessor {
    pub fn empty() -> Self {
        TableAccessor {
            table: None,
            index_code: Code::new(),
            source: AccessorSource::Null,
            size: 0,
            cursor: 0,
            credibility: 1.0,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.cursor >= self.size
    }

    pub fn remaining(&self) -> usize {
        self.size.saturating_sub(self.cursor) as usize
    }

    pub fn credibility(&self) -> f64 {
        self.credibility
    }

    pub fn index_code(&self) -> &Code {
        &self.index_code
    }

    pub fn is_tail(&self) -> bool {
        matches!(self.source, AccessorSource::Tail(_))
    }

    /// Text and raw weight of the current entry.
    pub fn entry(&self) -> Option<(String, f64)> {
        if self.exhausted() {
            return None;
        }
        let table = self.table.as_ref()?;
        let entry_off = match self.source {
            AccessorSource::Null => return None,
            AccessorSource::Entries(base) => base + ENTRY_SIZE * self.cursor as i64,
            AccessorSource::Tail(base) => base + TAIL_NODE_SIZE * self.cursor as i64 + 8,
        };
        let text = table.read_str(entry_off)?.to_string();
        let weight = table.read_f32(entry_off + 8)? as f64;
        Some((text, weight))
    }

    /// The code positions beyond the indexed prefix (tail nodes only).
    pub fn extra_code(&self) -> Option<Code> {
        let base = match self.source {
            AccessorSource::Tail(base) if !self.exhausted() => base,
            _ => return None,
        };
        let table = self.table.as_ref()?;
        let node = base + TAIL_NODE_SIZE * self.cursor as i64;
        let len = table.read_u32(node)? as usize;
        let off = table.read_i32(node + 4)? as i64;
        let mut code = Code::with_capacity(len);
        for i in 0..len {
            code.push(table.read_i32(off + 4 * i as i64)?);
        }
        Some(code)
    }

    /// Full code of the current entry: index code plus any extra code.
    pub fn code(&self) -> Code {
        match self.extra_code() {
            Some(extra) => {
                let mut code = self.index_code.clone();
                code.extend(extra);
                code
            }
            None => self.index_code.clone(),
        }
    }

    /// A one-entry accessor pinned to the current position, with the full
    /// code resolved. Used to lift tail nodes into per-end-position chunks.
    pub fn current_as_single(&self) -> Option<TableAccessor> {
        if self.exhausted() {
            return None;
        }
        let entry_off = match self.source {
            AccessorSource::Null => return None,
            AccessorSource::Entries(base) => base + ENTRY_SIZE * self.cursor as i64,
            AccessorSource::Tail(base) => base + TAIL_NODE_SIZE * self.cursor as i64 + 8,
        };
        Some(TableAccessor {
            table: self.table.clone(),
            index_code: self.code(),
            source: AccessorSource::Entries(entry_off),
            size: 1,
            cursor: 0,
            credibility: self.credibility,
        })
    }

    pub fn next(&mut self) -> bool {
        if self.exhausted() {
            return false;
        }
        self.cursor += 1;
        !self.exhausted()
    }
}

/// Serializes a syllabary and vocabulary into the on-disk table layout.
pub struct TableWriter {
    buf: Vec<u8>,
}

impl TableWriter {
    /// Build the complete table image.
    pub fn build(
        syllabary: &Syllabary,
        vocabulary: &Vocabulary,
        num_entries: usize,
        dict_file_checksum: u32,
    ) -> Vec<u8> {
        let mut writer = TableWriter {
            buf: vec![0; METADATA_SIZE],
        };
        let syllabary_off = writer.write_syllabary(syllabary);
        let index_off = writer.write_head_index(vocabulary, syllabary.len());

        let format = TABLE_FORMAT.as_bytes();
        writer.buf[..format.len()].copy_from_slice(format);
        writer.patch_u32(32, dict_file_checksum);
        writer.patch_i32(36, syllabary.len() as i32);
        writer.patch_i32(40, num_entries as i32);
        writer.patch_i32(44, syllabary_off);
        writer.patch_i32(48, index_off);
        writer.buf
    }

    /// Build and write to `path`.
    pub fn save<P: AsRef<Path>>(
        path: P,
        syllabary: &Syllabary,
        vocabulary: &Vocabulary,
        num_entries: usize,
        dict_file_checksum: u32,
    ) -> Result<(), TableError> {
        let image = Self::build(syllabary, vocabulary, num_entries, dict_file_checksum);
        std::fs::write(path, image)?;
        Ok(())
    }

    fn align4(&mut self) {
        while self.buf.len() % 4 != 0 {
            self.buf.push(0);
        }
    }

    fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn patch_u32(&mut self, off: usize, v: u32) {
        self.buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
    }

    fn patch_i32(&mut self, off: usize, v: i32) {
        self.buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
    }

    fn write_string(&mut self, s: &str) -> (u32, i32) {
        if s.is_empty() {
            return (0, 0);
        }
        let off = self.buf.len() as i32;
        self.buf.extend_from_slice(s.as_bytes());
        (s.len() as u32, off)
    }

    fn write_syllabary(&mut self, syllabary: &Syllabary) -> i32 {
        let refs: Vec<(u32, i32)> = syllabary.iter().map(|s| self.write_string(s)).collect();
        self.align4();
        let off = self.buf.len() as i32;
        self.put_u32(refs.len() as u32);
        for (len, str_off) in refs {
            self.put_u32(len);
            self.put_i32(str_off);
        }
        off
    }

    fn write_entry_list(&mut self, entries: &[crate::dictionary::DictEntry]) -> (u32, i32) {
        if entries.is_empty() {
            return (0, 0);
        }
        let texts: Vec<(u32, i32)> = entries.iter().map(|e| self.write_string(&e.text)).collect();
        self.align4();
        let off = self.buf.len() as i32;
        for (entry, (len, text_off)) in entries.iter().zip(texts) {
            self.put_u32(len);
            self.put_i32(text_off);
            self.put_f32(entry.weight as f32);
        }
        (entries.len() as u32, off)
    }

    fn write_head_index(&mut self, vocabulary: &Vocabulary, num_syllables: usize) -> i32 {
        let mut nodes = Vec::with_capacity(num_syllables);
        for syllable_id in 0..num_syllables as SyllableId {
            match vocabulary.get(&syllable_id) {
                Some(page) => {
                    let entries = self.write_entry_list(&page.entries);
                    let next = match &page.next_level {
                        Some(level) => self.write_trunk_index(2, level),
                        None => 0,
                    };
                    nodes.push((entries, next));
                }
                None => nodes.push(((0, 0), 0)),
            }
        }
        self.align4();
        let off = self.buf.len() as i32;
        for ((size, entries_off), next) in nodes {
            self.put_u32(size);
            self.put_i32(entries_off);
            self.put_i32(next);
        }
        off
    }

    fn write_trunk_index(&mut self, depth: usize, vocabulary: &Vocabulary) -> i32 {
        let mut nodes = Vec::new();
        for (&key, page) in vocabulary.iter() {
            if key == TAIL_SENTINEL {
                continue;
            }
            let entries = self.write_entry_list(&page.entries);
            let next = match &page.next_level {
                Some(level) if depth < INDEX_CODE_MAX_LENGTH => {
                    self.write_trunk_index(depth + 1, level)
                }
                Some(level) => self.write_tail_index(level),
                None => 0,
            };
            nodes.push((key, entries, next));
        }
        self.align4();
        let off = self.buf.len() as i32;
        self.put_u32(nodes.len() as u32);
        for (key, (size, entries_off), next) in nodes {
            self.put_i32(key);
            self.put_u32(size);
            self.put_i32(entries_off);
            self.put_i32(next);
        }
        off
    }

    fn write_tail_index(&mut self, vocabulary: &Vocabulary) -> i32 {
        let page = match vocabulary.get(&TAIL_SENTINEL) {
            Some(page) => page,
            None => return 0,
        };
        let mut rows = Vec::with_capacity(page.entries.len());
        for entry in &page.entries {
            let extra: &[SyllableId] = entry
                .code
                .get(INDEX_CODE_MAX_LENGTH..)
                .unwrap_or(&[]);
            self.align4();
            let extra_off = if extra.is_empty() {
                0
            } else {
                let off = self.buf.len() as i32;
                for &syllable_id in extra {
                    self.put_i32(syllable_id);
                }
                off
            };
            let text = self.write_string(&entry.text);
            rows.push((extra.len() as u32, extra_off, text, entry.weight as f32));
        }
        self.align4();
        let off = self.buf.len() as i32;
        self.put_u32(rows.len() as u32);
        for (extra_len, extra_off, (text_len, text_off), weight) in rows {
            self.put_u32(extra_len);
            self.put_i32(extra_off);
            self.put_u32(text_len);
            self.put_i32(text_off);
            self.put_f32(weight);
        }
        off
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::DictEntry;
    use crate::prism::Prism;
    use crate::syllabifier::Syllabifier;

    fn entry(text: &str, code: &[SyllableId], weight: f64) -> DictEntry {
        DictEntry {
            text: text.to_string(),
            code: code.to_vec(),
            weight,
            ..Default::default()
        }
    }

    /// syllabary: ha=0, hao=1, ma=2
    fn build_sample(dir: &std::path::Path) -> Arc<Table> {
        let mut syllabary = Syllabary::new();
        for s in ["ha", "hao", "ma"] {
            syllabary.insert(s.to_string());
        }
        let mut vocabulary = Vocabulary::new();
        let entries = [
            entry("哈", &[0], 1.0),
            entry("好", &[1], 1.0),
            entry("号", &[1], 0.5),
            entry("吗", &[2], 1.0),
            entry("好吗", &[1, 2], 2.0),
            entry("妈妈好吗", &[2, 2, 1, 2], 0.25),
        ];
        for e in &entries {
            vocabulary
                .locate_entries(&e.code)
                .unwrap()
                .push(e.clone());
        }
        vocabulary.sort_homophones();
        let path = dir.join("sample.table.bin");
        TableWriter::save(&path, &syllabary, &vocabulary, entries.len(), 7).expect("save");
        Arc::new(Table::load(&path).expect("load"))
    }

    #[test]
    fn metadata_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let table = build_sample(dir.path());
        assert_eq!(table.num_syllables(), 3);
        assert_eq!(table.num_entries(), 6);
        assert_eq!(table.dict_file_checksum(), 7);
        assert_eq!(table.get_syllable_by_id(0), Some("ha"));
        assert_eq!(table.get_syllable_by_id(1), Some("hao"));
        assert_eq!(table.get_syllable_by_id(2), Some("ma"));
        assert_eq!(table.get_syllable_by_id(3), None);
        assert_eq!(table.get_syllable_by_id(-1), None);
    }

    #[test]
    fn query_words_returns_homophones_weight_descending() {
        let dir = tempfile::tempdir().unwrap();
        let table = build_sample(dir.path());
        let mut accessor = Table::query_words(&table, 1);
        let (text, weight) = accessor.entry().unwrap();
        assert_eq!((text.as_str(), weight), ("好", 1.0));
        assert!(accessor.next());
        let (text, weight) = accessor.entry().unwrap();
        assert_eq!((text.as_str(), weight), ("号", 0.5));
        assert!(!accessor.next());
        assert!(accessor.exhausted());
    }

    #[test]
    fn query_phrases_walks_the_trunk() {
        let dir = tempfile::tempdir().unwrap();
        let table = build_sample(dir.path());
        let accessor = Table::query_phrases(&table, &[1, 2]);
        let (text, weight) = accessor.entry().unwrap();
        assert_eq!((text.as_str(), weight), ("好吗", 2.0));
        assert_eq!(accessor.code(), vec![1, 2]);
        assert!(Table::query_phrases(&table, &[0, 2]).exhausted());
        assert!(Table::query_phrases(&table, &[]).exhausted());
    }

    #[test]
    fn long_codes_come_back_from_the_tail() {
        let dir = tempfile::tempdir().unwrap();
        let table = build_sample(dir.path());
        let accessor = Table::query_phrases(&table, &[2, 2, 1, 2]);
        assert!(accessor.is_tail());
        let (text, _) = accessor.entry().unwrap();
        assert_eq!(text, "妈妈好吗");
        assert_eq!(accessor.extra_code().unwrap(), vec![2]);
        assert_eq!(accessor.code(), vec![2, 2, 1, 2]);

        let single = accessor.current_as_single().unwrap();
        assert_eq!(single.remaining(), 1);
        assert_eq!(single.code(), vec![2, 2, 1, 2]);
        assert_eq!(single.entry().unwrap().0, "妈妈好吗");
    }

    #[test]
    fn graph_query_collects_entries_per_end_position() {
        let dir = tempfile::tempdir().unwrap();
        let table = build_sample(dir.path());
        let prism = Prism::build(["ha", "hao", "ma"]).unwrap();
        let syllabifier = Syllabifier::new("'", false);
        let mut graph = SyllableGraph::default();
        syllabifier.build_syllable_graph("hao'ma", &prism, &mut graph);

        let result = Table::query(&table, &graph, 0);
        // "hao" ends at 4 (delimiter consumed), "hao ma" at 6
        let at4: Vec<String> = result[&4]
            .iter()
            .map(|a| a.entry().unwrap().0)
            .collect();
        assert_eq!(at4, vec!["好".to_string()]);
        let at6: Vec<String> = result[&6]
            .iter()
            .map(|a| a.entry().unwrap().0)
            .collect();
        assert_eq!(at6, vec!["好吗".to_string()]);
    }

    #[test]
    fn load_rejects_bad_magic_and_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.table.bin");
        std::fs::write(&bad, vec![0u8; 128]).unwrap();
        assert!(matches!(Table::load(&bad), Err(TableError::Format(_))));

        let short = dir.path().join("short.table.bin");
        std::fs::write(&short, b"Rime::Table/").unwrap();
        assert!(matches!(Table::load(&short), Err(TableError::Truncated(_))));
    }
}
