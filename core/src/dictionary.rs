//! Dictionary: pairs a prism with a phrase table for query-time lookups, and
//! compiles both from a text source.
//!
//! Open tables and prisms are shared process-wide through weak registries
//! keyed by file path, so every dictionary instance over the same files maps
//! them once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use once_cell::sync::Lazy;

use crate::prism::Prism;
use crate::spelling::{Code, RawCode, SyllableId};
use crate::syllabifier::SyllableGraph;
use crate::table::{Table, TableAccessor, TableWriter};
use crate::vocabulary::{Syllabary, Vocabulary};

/// A phrase entry materialized from a dictionary or user dictionary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DictEntry {
    pub text: String,
    pub comment: String,
    pub preedit: String,
    pub code: Code,
    pub weight: f64,
    pub commit_count: i32,
    pub consumed_input_length: usize,
}

impl DictEntry {
    /// Order for homophones sharing a code: weight descending, text
    /// ascending.
    pub fn cmp_homophones(a: &DictEntry, b: &DictEntry) -> std::cmp::Ordering {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.text.cmp(&b.text))
    }
}

/// Rolling checksum used to tie prism and table files to the dictionary
/// source they were compiled from.
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_mul(31).wrapping_add(b as u32))
}

struct Chunk {
    accessor: TableAccessor,
    consumed_input_length: usize,
}

/// Lazily yields [`DictEntry`] values in effective-weight descending order,
/// where the effective weight is `credibility × table weight`.
#[derive(Default)]
pub struct DictEntryIterator {
    chunks: Vec<Chunk>,
}

impl DictEntryIterator {
    pub fn new() -> Self {
        DictEntryIterator::default()
    }

    pub fn add_chunk(&mut self, accessor: TableAccessor, consumed_input_length: usize) {
        if !accessor.exhausted() {
            self.chunks.push(Chunk {
                accessor,
                consumed_input_length,
            });
        }
    }

    pub fn exhausted(&self) -> bool {
        self.chunks.is_empty()
    }

    fn best_chunk(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, chunk) in self.chunks.iter().enumerate() {
            let weight = match chunk.accessor.entry() {
                Some((_, w)) => w * chunk.accessor.credibility(),
                None => continue,
            };
            match best {
                Some((_, w)) if w >= weight => {}
                _ => best = Some((i, weight)),
            }
        }
        best.map(|(i, _)| i)
    }

    pub fn peek(&self) -> Option<DictEntry> {
        let chunk = &self.chunks[self.best_chunk()?];
        let (text, weight) = chunk.accessor.entry()?;
        Some(DictEntry {
            text,
            code: chunk.accessor.code(),
            weight: weight * chunk.accessor.credibility(),
            consumed_input_length: chunk.consumed_input_length,
            ..Default::default()
        })
    }

    pub fn next(&mut self) -> bool {
        let index = match self.best_chunk() {
            Some(index) => index,
            None => return false,
        };
        if !self.chunks[index].accessor.next() {
            self.chunks.remove(index);
        }
        !self.exhausted()
    }
}

/// End position -> iterator over the entries terminating there.
pub type DictEntryCollector = std::collections::BTreeMap<usize, DictEntryIterator>;

/// Deepest graph position reachable by matching `extra` from `current_pos`,
/// or 0 when the extra code does not fit the graph.
fn match_extra_code(
    extra: &[SyllableId],
    depth: usize,
    graph: &SyllableGraph,
    current_pos: usize,
) -> usize {
    if depth >= extra.len() {
        return current_pos;
    }
    if current_pos >= graph.interpreted_length {
        return 0;
    }
    let index = match graph.indices.get(&current_pos) {
        Some(index) => index,
        None => return 0,
    };
    let spellings = match index.get(&extra[depth]) {
        Some(spellings) => spellings,
        None => return 0,
    };
    let mut best_match = 0;
    for props in spellings {
        let end = match_extra_code(extra, depth + 1, graph, props.end_pos);
        if end > best_match {
            best_match = end;
        }
    }
    best_match
}

static TABLE_POOL: Lazy<Mutex<HashMap<PathBuf, Weak<Table>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
static PRISM_POOL: Lazy<Mutex<HashMap<PathBuf, Weak<Prism>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn pooled_table(path: &Path) -> Option<Arc<Table>> {
    let mut pool = TABLE_POOL.lock().unwrap();
    if let Some(table) = pool.get(path).and_then(Weak::upgrade) {
        return Some(table);
    }
    match Table::load(path) {
        Ok(table) => {
            let table = Arc::new(table);
            pool.insert(path.to_path_buf(), Arc::downgrade(&table));
            Some(table)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "table not loaded");
            None
        }
    }
}

fn pooled_prism(path: &Path) -> Option<Arc<Prism>> {
    let mut pool = PRISM_POOL.lock().unwrap();
    if let Some(prism) = pool.get(path).and_then(Weak::upgrade) {
        return Some(prism);
    }
    match Prism::load(path) {
        Ok(prism) => {
            let prism = Arc::new(prism);
            pool.insert(path.to_path_buf(), Arc::downgrade(&prism));
            Some(prism)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "prism not loaded");
            None
        }
    }
}

#[derive(Debug)]
pub struct Dictionary {
    name: String,
    prism_path: PathBuf,
    table_path: PathBuf,
    prism: Option<Arc<Prism>>,
    table: Option<Arc<Table>>,
}

impl Dictionary {
    pub fn new(name: &str, data_dir: &Path) -> Self {
        Dictionary {
            name: name.to_string(),
            prism_path: data_dir.join(format!("{name}.prism.bin")),
            table_path: data_dir.join(format!("{name}.table.bin")),
            prism: None,
            table: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exists(&self) -> bool {
        self.prism_path.exists() && self.table_path.exists()
    }

    pub fn loaded(&self) -> bool {
        self.prism.is_some() && self.table.is_some()
    }

    pub fn prism(&self) -> Option<&Arc<Prism>> {
        self.prism.as_ref()
    }

    pub fn table(&self) -> Option<&Arc<Table>> {
        self.table.as_ref()
    }

    /// Map the prism and table read-only. A failure leaves the dictionary
    /// unloaded; queries then return empty results.
    pub fn load(&mut self) -> bool {
        self.prism = pooled_prism(&self.prism_path);
        self.table = pooled_table(&self.table_path);
        if !self.loaded() {
            self.prism = None;
            self.table = None;
        }
        self.loaded()
    }

    pub fn unload(&mut self) {
        self.prism = None;
        self.table = None;
    }

    /// Delete the compiled files. Refused while loaded.
    pub fn remove(&mut self) -> bool {
        if self.loaded() {
            tracing::warn!(name = %self.name, "refusing to remove a loaded dictionary");
            return false;
        }
        let _ = std::fs::remove_file(&self.prism_path);
        let _ = std::fs::remove_file(&self.table_path);
        true
    }

    /// Compile a dictionary source into prism and table files.
    ///
    /// The source is one entry per line: `text<TAB>code[<TAB>weight]`, the
    /// code being space-separated spellings. Malformed lines are skipped.
    pub fn compile(&mut self, source_file: &Path) -> anyhow::Result<()> {
        let source = std::fs::read(source_file)?;
        let dict_file_checksum = checksum(&source);
        let text = String::from_utf8(source)?;

        struct RawEntry {
            text: String,
            raw_code: RawCode,
            weight: f64,
        }
        let mut raw_entries = Vec::new();
        let mut syllabary = Syllabary::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t');
            let (word, code_str) = match (fields.next(), fields.next()) {
                (Some(w), Some(c)) if !w.is_empty() && !c.is_empty() => (w, c),
                _ => {
                    tracing::warn!(lineno = lineno + 1, "skipping malformed entry");
                    continue;
                }
            };
            let weight = fields
                .next()
                .and_then(|w| w.parse::<f64>().ok())
                .unwrap_or(1.0);
            let raw_code = RawCode::from_joined(code_str);
            for spelling in &raw_code.0 {
                syllabary.insert(spelling.clone());
            }
            raw_entries.push(RawEntry {
                text: word.to_string(),
                raw_code,
                weight,
            });
        }
        anyhow::ensure!(!raw_entries.is_empty(), "no entries in {:?}", source_file);

        let mut prism = Prism::build(syllabary.iter().map(String::as_str))?;
        prism.set_dict_file_checksum(dict_file_checksum);
        prism.save(&self.prism_path)?;

        let syllable_to_id: HashMap<&str, SyllableId> = syllabary
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i as SyllableId))
            .collect();
        let mut vocabulary = Vocabulary::new();
        let num_entries = raw_entries.len();
        for raw in raw_entries {
            let code: Code = raw
                .raw_code
                .0
                .iter()
                .map(|s| syllable_to_id[s.as_str()])
                .collect();
            let entries = vocabulary
                .locate_entries(&code)
                .ok_or_else(|| anyhow::anyhow!("entry '{}' has an empty code", raw.text))?;
            entries.push(DictEntry {
                text: raw.text,
                code,
                weight: raw.weight,
                ..Default::default()
            });
        }
        vocabulary.sort_homophones();
        TableWriter::save(
            &self.table_path,
            &syllabary,
            &vocabulary,
            num_entries,
            dict_file_checksum,
        )?;
        tracing::debug!(name = %self.name, num_entries, "compiled dictionary");
        self.load();
        anyhow::ensure!(self.loaded(), "compiled dictionary failed to load");
        Ok(())
    }

    /// Entries reachable from `start_pos` in the graph, grouped by end
    /// position. Tail entries are placed at the end position their extra
    /// code actually reaches.
    pub fn lookup(
        &self,
        graph: &SyllableGraph,
        start_pos: usize,
    ) -> Option<DictEntryCollector> {
        let table = self.table.as_ref()?;
        let result = Table::query(table, graph, start_pos);
        if result.is_empty() {
            return None;
        }
        let mut collector = DictEntryCollector::new();
        for (end_pos, accessors) in result {
            for accessor in accessors {
                if accessor.is_tail() {
                    let mut accessor = accessor;
                    loop {
                        if let Some(extra) = accessor.extra_code() {
                            let actual_end = match_extra_code(&extra, 0, graph, end_pos);
                            if actual_end > 0 {
                                if let Some(single) = accessor.current_as_single() {
                                    collector
                                        .entry(actual_end)
                                        .or_default()
                                        .add_chunk(single, actual_end - start_pos);
                                }
                            }
                        }
                        if !accessor.next() {
                            break;
                        }
                    }
                } else {
                    collector
                        .entry(end_pos)
                        .or_default()
                        .add_chunk(accessor, end_pos - start_pos);
                }
            }
        }
        collector.retain(|_, iter| !iter.exhausted());
        if collector.is_empty() {
            None
        } else {
            Some(collector)
        }
    }

    /// Single-syllable lookup by spelling string: prefix matches of
    /// `str_code` (longest first), or keys completing it when `predictive`.
    pub fn lookup_words(&self, str_code: &str, predictive: bool) -> DictEntryIterator {
        let mut result = DictEntryIterator::new();
        let (prism, table) = match (&self.prism, &self.table) {
            (Some(p), Some(t)) => (p, t),
            _ => return result,
        };
        if predictive {
            for m in prism.expand_search(str_code, 0) {
                let accessor = Table::query_words(table, m.value);
                result.add_chunk(accessor, str_code.len());
            }
        } else {
            for m in prism.common_prefix_search(str_code).into_iter().rev() {
                let accessor = Table::query_words(table, m.value);
                result.add_chunk(accessor, m.length);
            }
        }
        result
    }

    /// Resolve a code back to its spellings through the syllabary.
    pub fn decode(&self, code: &[SyllableId]) -> Option<RawCode> {
        let table = self.table.as_ref()?;
        let mut result = RawCode::default();
        for &syllable_id in code {
            result
                .0
                .push(table.get_syllable_by_id(syllable_id)?.to_string());
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syllabifier::Syllabifier;
    use std::io::Write;

    fn compile_sample(dir: &Path) -> Dictionary {
        let source = dir.join("sample.dict.tsv");
        let mut f = std::fs::File::create(&source).unwrap();
        writeln!(f, "# test dictionary").unwrap();
        writeln!(f, "哈\tha").unwrap();
        writeln!(f, "好\thao").unwrap();
        writeln!(f, "号\thao\t0.5").unwrap();
        writeln!(f, "吗\tma").unwrap();
        writeln!(f, "好吗\thao ma\t2.0").unwrap();
        writeln!(f, "妈妈好吗\tma ma hao ma\t0.25").unwrap();
        drop(f);
        let mut dict = Dictionary::new("sample", dir);
        dict.compile(&source).expect("compile");
        dict
    }

    #[test]
    fn compile_then_lookup_words() {
        let dir = tempfile::tempdir().unwrap();
        let dict = compile_sample(dir.path());
        assert!(dict.exists());
        assert!(dict.loaded());

        // effective weight descending; the longest prefix wins ties
        let mut iter = dict.lookup_words("hao", false);
        assert_eq!(iter.peek().unwrap().text, "好");
        assert!(iter.next());
        let second = iter.peek().unwrap();
        assert_eq!(second.text, "哈");
        assert_eq!(second.consumed_input_length, 2);
        assert!(iter.next());
        assert_eq!(iter.peek().unwrap().text, "号");
        assert!(!iter.next());
    }

    #[test]
    fn predictive_lookup_expands_the_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let dict = compile_sample(dir.path());
        let iter = dict.lookup_words("h", true);
        let mut texts = Vec::new();
        let mut iter = iter;
        while let Some(entry) = iter.peek() {
            texts.push(entry.text);
            if !iter.next() {
                break;
            }
        }
        assert!(texts.contains(&"哈".to_string()));
        assert!(texts.contains(&"好".to_string()));
    }

    #[test]
    fn graph_lookup_places_tail_entries_at_their_real_end() {
        let dir = tempfile::tempdir().unwrap();
        let dict = compile_sample(dir.path());
        let syllabifier = Syllabifier::default();
        let mut graph = SyllableGraph::default();
        syllabifier.build_syllable_graph("mamahaoma", &dict.prism().unwrap(), &mut graph);

        let collector = dict.lookup(&graph, 0).expect("entries");
        let deep = collector.get(&9).expect("tail entry at end 9");
        assert_eq!(deep.peek().unwrap().text, "妈妈好吗");
        assert_eq!(deep.peek().unwrap().code.len(), 4);
    }

    #[test]
    fn decode_round_trips_codes() {
        let dir = tempfile::tempdir().unwrap();
        let dict = compile_sample(dir.path());
        // syllabary sorted: ha=0, hao=1, ma=2
        let raw = dict.decode(&[1, 2]).unwrap();
        assert_eq!(raw.to_joined(), "hao ma");
        assert!(dict.decode(&[99]).is_none());
    }

    #[test]
    fn same_files_share_one_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let dict = compile_sample(dir.path());
        let mut second = Dictionary::new("sample", dir.path());
        assert!(second.load());
        assert!(Arc::ptr_eq(dict.table().unwrap(), second.table().unwrap()));
        assert!(Arc::ptr_eq(dict.prism().unwrap(), second.prism().unwrap()));
    }

    #[test]
    fn missing_files_stay_unloaded() {
        let dir = tempfile::tempdir().unwrap();
        let mut dict = Dictionary::new("nonexistent", dir.path());
        assert!(!dict.exists());
        assert!(!dict.load());
        assert!(dict.lookup_words("a", false).exhausted());
    }
}
