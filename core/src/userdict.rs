//! UserDictionary: learned phrases over a [`UserDb`], looked up by
//! depth-first search along the syllable graph and ranked by a
//! forgetting-curve frequency model.
//!
//! Records are keyed `"<spelling> <spelling> ...\t<text>"` (each spelling
//! followed by one space) and valued `"c=<commits> d=<decayed> t=<tick>"`.
//! The global tick advances once per accepted commit; every 50 ticks the db
//! is snapshotted next to itself.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::dictionary::DictEntry;
use crate::prism::Prism;
use crate::spelling::Code;
use crate::syllabifier::SyllableGraph;
use crate::table::Table;
use crate::userdb::{UserDb, UserDbAccessor, TICK_KEY};

pub type TickCount = u64;

/// End position -> learned entries terminating there, weight descending.
pub type UserDictEntryCollector = BTreeMap<usize, Vec<DictEntry>>;

const BACKUP_INTERVAL: TickCount = 50;
const WEIGHT_EPSILON: f64 = 1e-30;
/// Ticks for a stored expectation to halve.
const DECAY_HALF_LIFE: f64 = 200.0;

/// Decay a stored expectation from `last_tick` to `present_tick`; a positive
/// commit adds one fresh observation.
pub fn formula_d(commit: i32, present_tick: f64, dee: f64, last_tick: f64) -> f64 {
    let elapsed = (present_tick - last_tick).max(0.0);
    let decayed = dee * (-elapsed * std::f64::consts::LN_2 / DECAY_HALF_LIFE).exp();
    if commit > 0 {
        decayed + 1.0
    } else {
        decayed
    }
}

/// Effective weight of an entry: half the lifetime commit ratio, half the
/// saturating decayed expectation. Falls monotonically as the present tick
/// grows; clamped into `[ε, 1]`.
pub fn formula_p(_s: f64, ratio: f64, _present_tick: f64, dee: f64) -> f64 {
    let p = ratio / 2.0 + dee / (2.0 * (dee + 1.0));
    if !p.is_finite() {
        return WEIGHT_EPSILON;
    }
    p.clamp(WEIGHT_EPSILON, 1.0)
}

/// Parse a `"c=.. d=.. t=.."` value. Unknown tokens are ignored; a malformed
/// number invalidates the record.
fn unpack_user_dict_value(value: &str) -> Option<(i32, f64, TickCount)> {
    let mut commits = 0i32;
    let mut dee = 0f64;
    let mut tick = 0 as TickCount;
    for token in value.split(' ') {
        let (k, v) = match token.split_once('=') {
            Some(kv) => kv,
            None => continue,
        };
        let parsed = match k {
            "c" => v.parse::<i32>().map(|n| commits = n).is_ok(),
            "d" => v.parse::<f64>().map(|n| dee = n).is_ok(),
            "t" => v.parse::<TickCount>().map(|n| tick = n).is_ok(),
            _ => true,
        };
        if !parsed {
            tracing::warn!(token, "bad user dict value token");
            return None;
        }
    }
    Some((commits, dee, tick))
}

struct DfsState {
    depth_limit: usize,
    present_tick: TickCount,
    code: Code,
    credibility: Vec<f64>,
    collector: UserDictEntryCollector,
    accessor: UserDbAccessor,
    key: String,
    value: String,
}

impl DfsState {
    fn is_exact_match(&self, prefix: &str) -> bool {
        self.key.len() > prefix.len()
            && self.key.starts_with(prefix)
            && self.key.as_bytes()[prefix.len()] == b'\t'
    }

    fn is_prefix_match(&self, prefix: &str) -> bool {
        self.key.starts_with(prefix)
    }

    fn set_record(&mut self, record: Option<(String, String)>) -> bool {
        match record {
            Some((key, value)) => {
                self.key = key;
                self.value = value;
                true
            }
            None => {
                self.key.clear();
                self.value.clear();
                false
            }
        }
    }

    fn next_entry(&mut self) -> bool {
        let record = self.accessor.next_after(&self.key);
        self.set_record(record)
    }

    fn forward_scan(&mut self, prefix: &str) -> bool {
        let record = self.accessor.seek(prefix);
        self.set_record(record)
    }

    fn save_entry(&mut self, pos: usize) {
        let text = match self.key.split_once('\t') {
            Some((_, text)) => text.to_string(),
            None => return,
        };
        let (commit_count, dee, last_tick) = match unpack_user_dict_value(&self.value) {
            Some(v) => v,
            None => return, // logged; skip the record and carry on
        };
        if commit_count < 0 {
            return; // marked deleted
        }
        let present = self.present_tick as f64;
        let dee = formula_d(0, present, dee, last_tick as f64);
        let credibility = *self.credibility.last().unwrap_or(&1.0);
        let weight =
            formula_p(0.0, commit_count as f64 / present, present, dee) * credibility;
        self.collector.entry(pos).or_default().push(DictEntry {
            text,
            code: self.code.clone(),
            weight,
            commit_count,
            ..Default::default()
        });
    }
}

pub struct UserDictionary {
    db: Arc<UserDb>,
    table: Option<Arc<Table>>,
    prism: Option<Arc<Prism>>,
    tick: Mutex<TickCount>,
}

impl std::fmt::Debug for UserDictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDictionary")
            .field("db", &self.db)
            .field("tick", &self.tick.lock().unwrap())
            .finish()
    }
}

impl UserDictionary {
    pub fn new(db: Arc<UserDb>) -> Self {
        UserDictionary {
            db,
            table: None,
            prism: None,
            tick: Mutex::new(0),
        }
    }

    /// Borrow the syllabary (and spelling map) of the dictionary this user
    /// dictionary serves.
    pub fn attach(&mut self, table: Arc<Table>, prism: Arc<Prism>) {
        self.table = Some(table);
        self.prism = Some(prism);
    }

    pub fn loaded(&self) -> bool {
        self.table.is_some() && self.prism.is_some()
    }

    pub fn tick(&self) -> TickCount {
        *self.tick.lock().unwrap()
    }

    /// Fetch the stored tick, initializing the db on first use.
    pub fn load(&self) -> bool {
        if self.fetch_tick_count() {
            return true;
        }
        self.initialize()
    }

    fn initialize(&self) -> bool {
        *self.tick.lock().unwrap() = 0;
        self.db.update(TICK_KEY, "0").is_ok()
    }

    fn fetch_tick_count(&self) -> bool {
        // an earlier format wrote the tick into the empty key
        let value = match self.db.fetch(TICK_KEY).or_else(|| self.db.fetch("")) {
            Some(value) => value,
            None => return false,
        };
        match value.parse::<TickCount>() {
            Ok(tick) => {
                *self.tick.lock().unwrap() = tick;
                true
            }
            Err(_) => {
                tracing::warn!(value, "unreadable tick count");
                false
            }
        }
    }

    fn update_tick_count(&self, increment: TickCount) -> TickCount {
        let mut tick = self.tick.lock().unwrap();
        *tick += increment;
        if *tick % BACKUP_INTERVAL == 0 {
            let backup = self.backup_path();
            match self.db.snapshot_to(&backup) {
                Ok(n) => {
                    tracing::debug!(records = n, path = %backup.display(), "user db snapshot")
                }
                Err(e) => tracing::warn!(error = %e, "user db snapshot failed"),
            }
        }
        if let Err(e) = self.db.update(TICK_KEY, &tick.to_string()) {
            tracing::warn!(error = %e, "failed to store tick");
        }
        *tick
    }

    fn backup_path(&self) -> PathBuf {
        let mut path = self.db.path().as_os_str().to_owned();
        path.push(".snapshot.tsv");
        PathBuf::from(path)
    }

    /// Space-join the spellings of `code`, each followed by one space.
    /// The trailing space keeps an exact code sorting before its extensions.
    pub fn translate_code_to_string(&self, code: &[i32]) -> Option<String> {
        let table = self.table.as_ref()?;
        let mut result = String::new();
        for &syllable_id in code {
            match table.get_syllable_by_id(syllable_id) {
                Some(spelling) => {
                    result.push_str(spelling);
                    result.push(' ');
                }
                None => {
                    tracing::warn!(syllable_id, "cannot translate syllable id");
                    return None;
                }
            }
        }
        Some(result)
    }

    /// Depth-first lookup of learned phrases along the graph from
    /// `start_pos`, grouped by end position and sorted by weight.
    /// `depth_limit` caps the phrase length in syllables (0 = unlimited).
    pub fn lookup(
        &self,
        graph: &SyllableGraph,
        start_pos: usize,
        depth_limit: usize,
        initial_credibility: f64,
    ) -> Option<UserDictEntryCollector> {
        if !self.loaded() || start_pos >= graph.interpreted_length {
            return None;
        }
        self.fetch_tick_count();
        let accessor = self.db.accessor()?;
        let mut state = DfsState {
            depth_limit,
            present_tick: self.tick() + 1,
            code: Code::new(),
            credibility: vec![initial_credibility],
            collector: UserDictEntryCollector::new(),
            accessor,
            key: String::new(),
            value: String::new(),
        };
        state.forward_scan(" "); // skip "\x01/..." metadata
        self.dfs_lookup(graph, start_pos, "", &mut state);
        if state.collector.is_empty() {
            return None;
        }
        let mut collector = state.collector;
        for entries in collector.values_mut() {
            entries.sort_by(DictEntry::cmp_homophones);
        }
        Some(collector)
    }

    /// Returns false to terminate the whole lookup (the cursor ran off the
    /// end of the store), true when this subtree is finished.
    fn dfs_lookup(
        &self,
        graph: &SyllableGraph,
        current_pos: usize,
        current_prefix: &str,
        state: &mut DfsState,
    ) -> bool {
        let edges = match graph.edges.get(&current_pos) {
            Some(edges) => edges,
            None => return true,
        };
        for (&end_vertex_pos, spellings) in edges {
            for (&syllable_id, props) in spellings {
                state.code.push(syllable_id);
                let running = state.credibility.last().copied().unwrap_or(1.0);
                state.credibility.push(running * props.credibility);
                let prefix = match self.translate_code_to_string(&state.code) {
                    Some(prefix) => prefix,
                    None => {
                        state.code.pop();
                        state.credibility.pop();
                        continue;
                    }
                };
                // 'a b c |' may sit past the cursor: skip ahead
                if prefix.as_str() > state.key.as_str() && !state.forward_scan(&prefix) {
                    return false;
                }
                // consume every "<prefix>\t<text>" record
                while state.is_exact_match(&prefix) {
                    state.save_entry(end_vertex_pos);
                    if !state.next_entry() {
                        return false;
                    }
                }
                if (state.depth_limit == 0 || state.code.len() < state.depth_limit)
                    && state.is_prefix_match(&prefix)
                    && !self.dfs_lookup(graph, end_vertex_pos, &prefix, state)
                {
                    return false;
                }
                state.code.pop();
                state.credibility.pop();
                // nothing else under the current prefix
                if !state.is_prefix_match(current_prefix) {
                    return true;
                }
            }
            // rewind for the sibling edges
            state.forward_scan(current_prefix);
        }
        true
    }

    /// Record a commit (`commit > 0`) or mark an entry deleted
    /// (`commit < 0`). Every call advances the global tick.
    pub fn update_entry(&self, entry: &DictEntry, commit: i32) -> bool {
        let code_str = match self.translate_code_to_string(&entry.code) {
            Some(code_str) => code_str,
            None => return false,
        };
        if commit == 0 {
            return true;
        }
        let key = format!("{}\t{}", code_str, entry.text);
        let (mut commit_count, dee, last_tick) = self
            .db
            .fetch(&key)
            .and_then(|v| unpack_user_dict_value(&v))
            .unwrap_or((0, 0.0, 0));
        if commit > 0 {
            commit_count += commit;
        } else {
            commit_count = (-commit_count).min(-1);
        }
        let tick = self.update_tick_count(1);
        let dee = formula_d(commit, tick as f64, dee, last_tick as f64);
        let value = format!("c={} d={} t={}", commit_count, dee, tick);
        self.db.update(&key, &value).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Dictionary;
    use crate::syllabifier::Syllabifier;
    use std::io::Write;
    use std::path::Path;

    fn fixture(dir: &Path) -> (Dictionary, UserDictionary) {
        let source = dir.join("u.dict.tsv");
        let mut f = std::fs::File::create(&source).unwrap();
        writeln!(f, "好\thao").unwrap();
        writeln!(f, "吗\tma").unwrap();
        writeln!(f, "好吗\thao ma\t2.0").unwrap();
        drop(f);
        let mut dict = Dictionary::new("u", dir);
        dict.compile(&source).unwrap();

        let db = UserDb::shared(dir.join("u.userdb")).unwrap();
        let mut user_dict = UserDictionary::new(db);
        user_dict.attach(
            dict.table().unwrap().clone(),
            dict.prism().unwrap().clone(),
        );
        assert!(user_dict.load());
        (dict, user_dict)
    }

    fn graph_for(dict: &Dictionary, input: &str) -> SyllableGraph {
        let mut graph = SyllableGraph::default();
        Syllabifier::default().build_syllable_graph(
            input,
            dict.prism().unwrap(),
            &mut graph,
        );
        graph
    }

    fn entry_of(dict: &Dictionary, text: &str, spellings: &str) -> DictEntry {
        let prism = dict.prism().unwrap();
        DictEntry {
            text: text.to_string(),
            code: spellings
                .split(' ')
                .map(|s| prism.get_value(s).unwrap())
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn keys_carry_trailing_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let (dict, user_dict) = fixture(dir.path());
        let entry = entry_of(&dict, "好吗", "hao ma");
        let key = user_dict.translate_code_to_string(&entry.code).unwrap();
        assert_eq!(key, "hao ma ");
    }

    #[test]
    fn update_then_lookup_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (dict, user_dict) = fixture(dir.path());
        let entry = entry_of(&dict, "好吗", "hao ma");
        assert!(user_dict.update_entry(&entry, 1));

        let graph = graph_for(&dict, "haoma");
        let collector = user_dict.lookup(&graph, 0, 0, 1.0).expect("entries");
        let found = &collector[&5];
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "好吗");
        assert!(found[0].commit_count >= 1);
        assert!(found[0].weight > 0.0);
    }

    #[test]
    fn negative_update_hides_the_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (dict, user_dict) = fixture(dir.path());
        let entry = entry_of(&dict, "好吗", "hao ma");
        user_dict.update_entry(&entry, 1);
        user_dict.update_entry(&entry, -1);

        let graph = graph_for(&dict, "haoma");
        assert!(user_dict.lookup(&graph, 0, 0, 1.0).is_none());
    }

    #[test]
    fn depth_limit_caps_phrase_length() {
        let dir = tempfile::tempdir().unwrap();
        let (dict, user_dict) = fixture(dir.path());
        user_dict.update_entry(&entry_of(&dict, "好吗", "hao ma"), 1);

        let graph = graph_for(&dict, "haoma");
        assert!(user_dict.lookup(&graph, 0, 1, 1.0).is_none());
        assert!(user_dict.lookup(&graph, 0, 2, 1.0).is_some());
    }

    #[test]
    fn ticks_persist_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let (dict, user_dict) = fixture(dir.path());
        let entry = entry_of(&dict, "好", "hao");
        user_dict.update_entry(&entry, 1);
        user_dict.update_entry(&entry, 1);
        assert_eq!(user_dict.tick(), 2);

        let reopened =
            UserDictionary::new(UserDb::shared(dir.path().join("u.userdb")).unwrap());
        assert!(reopened.load());
        assert_eq!(reopened.tick(), 2);
    }

    #[test]
    fn backup_fires_every_fifty_ticks() {
        let dir = tempfile::tempdir().unwrap();
        let (dict, user_dict) = fixture(dir.path());
        let entry = entry_of(&dict, "好", "hao");
        for _ in 0..BACKUP_INTERVAL {
            user_dict.update_entry(&entry, 1);
        }
        assert!(dir.path().join("u.userdb.snapshot.tsv").exists());
    }

    #[test]
    fn decay_is_monotonic_in_the_present_tick() {
        let commits = 3.0;
        let stored_dee = 2.0;
        let last_tick = 10.0;
        let weight_at = |present: f64| {
            let dee = formula_d(0, present, stored_dee, last_tick);
            formula_p(0.0, commits / present, present, dee)
        };
        let mut previous = weight_at(11.0);
        for present in [20.0, 50.0, 200.0, 1000.0] {
            let w = weight_at(present);
            assert!(w <= previous, "weight must not grow as ticks pass");
            assert!(w >= WEIGHT_EPSILON);
            previous = w;
        }
    }

    #[test]
    fn malformed_values_are_skipped() {
        assert_eq!(unpack_user_dict_value("c=2 d=0.5 t=9"), Some((2, 0.5, 9)));
        assert_eq!(unpack_user_dict_value(""), Some((0, 0.0, 0)));
        assert!(unpack_user_dict_value("c=x d=0.5 t=9").is_none());
    }
}
