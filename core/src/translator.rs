//! The romanization translator: turns an `abc` segment into a lazy stream
//! of phrase candidates, merging dictionary and user-dictionary results and
//! synthesizing a best-effort sentence when no phrase covers the input.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashSet;

use crate::candidate::{Candidate, KIND_PHRASE, KIND_RAW};
use crate::context::ContextListener;
use crate::dictionary::{DictEntry, DictEntryCollector, Dictionary};
use crate::engine::{EngineEnv, Translator};
use crate::schema::apply_preedit_format;
use crate::segmentation::{Segment, SegmentStatus};
use crate::spelling::{Code, SyllableId};
use crate::syllabifier::{Syllabifier, SyllableGraph};
use crate::translation::{Translation, UniqueTranslation};
use crate::userdb::UserDb;
use crate::userdict::{UserDictEntryCollector, UserDictionary};

const MAX_SENTENCE_MAKING_HOMOPHONES: usize = 1;
const MAX_SYLLABLES_IN_SENTENCE_MAKING_USER_PHRASES: usize = 5;
const SENTENCE_EPSILON: f64 = 1e-30;
const SENTENCE_PENALTY: f64 = 1e-8;

pub struct R10nTranslator {
    dict: Arc<Dictionary>,
    user_dict: Option<Arc<UserDictionary>>,
    delimiters: String,
    enable_completion: bool,
    preedit_format: Vec<String>,
}

impl R10nTranslator {
    pub fn construct(env: &EngineEnv) -> Option<Box<dyn Translator>> {
        Some(Box::new(Self::new(env)?))
    }

    pub fn new(env: &EngineEnv) -> Option<R10nTranslator> {
        let name = &env.schema.translator.dictionary;
        if name.is_empty() {
            tracing::warn!("no dictionary configured for the translator");
            return None;
        }
        // user data may shadow the shared compiled dictionary
        let data_dir = if Dictionary::new(name, env.user_data_dir).exists() {
            env.user_data_dir
        } else {
            env.shared_data_dir
        };
        let mut dict = Dictionary::new(name, data_dir);
        if !dict.load() {
            tracing::warn!(name = %name, "dictionary not loaded");
        }
        let dict = Arc::new(dict);

        let user_dict = if env.schema.translator.enable_user_dict {
            match UserDb::shared(env.user_data_dir.join(format!("{name}.userdb"))) {
                Ok(db) => {
                    let mut user_dict = UserDictionary::new(db);
                    if let (Some(table), Some(prism)) = (dict.table(), dict.prism()) {
                        user_dict.attach(table.clone(), prism.clone());
                    }
                    user_dict.load();
                    Some(Arc::new(user_dict))
                }
                Err(e) => {
                    tracing::warn!(error = %e, "user db unavailable");
                    None
                }
            }
        } else {
            None
        };

        let mut delimiters = env.schema.speller.delimiter.clone();
        if delimiters.is_empty() {
            delimiters = " ".to_string();
        }
        Some(R10nTranslator {
            dict,
            user_dict,
            delimiters,
            enable_completion: env.schema.translator.enable_completion,
            preedit_format: env.schema.translator.preedit_format.clone(),
        })
    }

    pub fn user_dict(&self) -> Option<&Arc<UserDictionary>> {
        self.user_dict.as_ref()
    }
}

impl Translator for R10nTranslator {
    fn query(&self, input: &str, segment: &Segment) -> Option<Box<dyn Translation>> {
        if !segment.has_tag("abc") || !self.dict.loaded() {
            return None;
        }
        let slice = input.get(segment.start..segment.end)?;
        let translation = R10nTranslation::evaluate(
            slice,
            segment.start,
            &self.dict,
            self.user_dict.as_deref(),
            &self.delimiters,
            self.enable_completion,
            &self.preedit_format,
        )?;
        Some(Box::new(translation))
    }

    /// Learn one entry per contiguous block of phrase candidates when the
    /// composition commits.
    fn commit_observer(&self) -> Option<ContextListener> {
        let user_dict = self.user_dict.clone()?;
        Some(Box::new(move |ctx| {
            let mut text = String::new();
            let mut code = Code::new();
            for segment in ctx.composition().segments() {
                let candidate = segment.get_selected_candidate();
                let is_phrase = candidate
                    .as_ref()
                    .map_or(false, |c| c.kind == KIND_PHRASE);
                if let (true, Some(candidate)) = (is_phrase, &candidate) {
                    text.push_str(candidate.text());
                    code.extend_from_slice(&candidate.entry.code);
                }
                if (!is_phrase || segment.status >= SegmentStatus::Confirmed)
                    && !text.is_empty()
                {
                    user_dict.update_entry(
                        &DictEntry {
                            text: std::mem::take(&mut text),
                            code: std::mem::take(&mut code),
                            ..Default::default()
                        },
                        1,
                    );
                }
            }
            if !text.is_empty() {
                user_dict.update_entry(
                    &DictEntry {
                        text,
                        code,
                        ..Default::default()
                    },
                    1,
                );
            }
        }))
    }
}

/// The candidate stream for one segment. Dictionary and user-dictionary
/// results are merged longest-covering first; on equal length the
/// user-dictionary side wins. Texts repeat only once.
struct R10nTranslation {
    input: String,
    start: usize,
    delimiters: String,
    preedit_format: Vec<String>,
    graph: SyllableGraph,
    phrase: DictEntryCollector,
    user_phrase: UserDictEntryCollector,
    phrase_keys: Vec<usize>,
    phrase_pos: usize,
    user_keys: Vec<usize>,
    user_pos: usize,
    user_index: usize,
    seen: AHashSet<String>,
    cache: RefCell<Option<Arc<Candidate>>>,
}

impl R10nTranslation {
    #[allow(clippy::too_many_arguments)]
    fn evaluate(
        input: &str,
        start: usize,
        dict: &Arc<Dictionary>,
        user_dict: Option<&UserDictionary>,
        delimiters: &str,
        enable_completion: bool,
        preedit_format: &[String],
    ) -> Option<R10nTranslation> {
        let prism = dict.prism()?;
        let syllabifier = Syllabifier::new(delimiters, enable_completion);
        let mut graph = SyllableGraph::default();
        let consumed = syllabifier.build_syllable_graph(input, prism, &mut graph);
        if consumed == 0 {
            return None;
        }

        let phrase = dict.lookup(&graph, 0).unwrap_or_default();
        let mut user_phrase = user_dict
            .and_then(|u| u.lookup(&graph, 0, 0, 1.0))
            .unwrap_or_default();
        if phrase.is_empty() && user_phrase.is_empty() {
            return None;
        }

        // make a sentence when no phrase covers the interpreted input
        let translated_len = phrase
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0)
            .max(user_phrase.keys().next_back().copied().unwrap_or(0));
        if translated_len < consumed && graph.edges.len() >= 2 {
            if let Some(sentence) = make_sentence(dict, user_dict, &graph) {
                user_phrase.entry(consumed).or_default().push(sentence);
            }
        }

        let phrase_keys: Vec<usize> = phrase.keys().rev().copied().collect();
        let user_keys: Vec<usize> = user_phrase.keys().rev().copied().collect();
        Some(R10nTranslation {
            input: input.to_string(),
            start,
            delimiters: delimiters.to_string(),
            preedit_format: preedit_format.to_vec(),
            graph,
            phrase,
            user_phrase,
            phrase_keys,
            phrase_pos: 0,
            user_keys,
            user_pos: 0,
            user_index: 0,
            seen: AHashSet::new(),
            cache: RefCell::new(None),
        })
    }

    fn user_len(&self) -> usize {
        self.user_keys.get(self.user_pos).copied().unwrap_or(0)
    }

    fn phrase_len(&self) -> usize {
        self.phrase_keys.get(self.phrase_pos).copied().unwrap_or(0)
    }

    fn current_entry(&self) -> Option<(DictEntry, usize)> {
        let user_len = self.user_len();
        let phrase_len = self.phrase_len();
        if user_len > 0 && user_len >= phrase_len {
            let entries = self.user_phrase.get(&user_len)?;
            entries
                .get(self.user_index)
                .map(|entry| (entry.clone(), user_len))
        } else if phrase_len > 0 {
            let iter = self.phrase.get(&phrase_len)?;
            iter.peek().map(|entry| (entry, phrase_len))
        } else {
            None
        }
    }

    fn advance(&mut self) {
        self.cache.get_mut().take();
        let user_len = self.user_len();
        let phrase_len = self.phrase_len();
        if user_len > 0 && user_len >= phrase_len {
            self.user_index += 1;
            let drained = self
                .user_phrase
                .get(&user_len)
                .map_or(true, |entries| self.user_index >= entries.len());
            if drained {
                self.user_pos += 1;
                self.user_index = 0;
            }
        } else if phrase_len > 0 {
            let drained = self
                .phrase
                .get_mut(&phrase_len)
                .map_or(true, |iter| !iter.next());
            if drained {
                self.phrase_pos += 1;
            }
        }
    }

    /// Reconstruct the delimited spelling for a candidate's code by walking
    /// the graph, preferring longer edges.
    fn delimit_syllables(&self, code: &[SyllableId], end_pos: usize) -> Option<String> {
        let mut output = String::new();
        if self.delimit_dfs(code, 0, 0, end_pos, &mut output) {
            Some(output)
        } else {
            None
        }
    }

    fn delimit_dfs(
        &self,
        code: &[SyllableId],
        depth: usize,
        current_pos: usize,
        end_pos: usize,
        output: &mut String,
    ) -> bool {
        if depth == code.len() {
            return current_pos == end_pos;
        }
        let edges = match self.graph.edges.get(&current_pos) {
            Some(edges) => edges,
            None => return false,
        };
        for (&end_vertex_pos, spellings) in edges.iter().rev() {
            if end_vertex_pos > end_pos || !spellings.contains_key(&code[depth]) {
                continue;
            }
            let len = output.len();
            if depth > 0 && !output.is_empty() {
                let last = output.chars().last().unwrap();
                if !self.delimiters.contains(last) {
                    output.push(self.delimiters.chars().next().unwrap_or(' '));
                }
            }
            output.push_str(&self.input[current_pos..end_vertex_pos]);
            if self.delimit_dfs(code, depth + 1, end_vertex_pos, end_pos, output) {
                return true;
            }
            output.truncate(len);
        }
        false
    }
}

impl Translation for R10nTranslation {
    fn peek(&self) -> Option<Arc<Candidate>> {
        if let Some(candidate) = self.cache.borrow().clone() {
            return Some(candidate);
        }
        let (mut entry, len) = self.current_entry()?;
        if entry.preedit.is_empty() {
            if let Some(preedit) = self.delimit_syllables(&entry.code, len) {
                entry.preedit = apply_preedit_format(&self.preedit_format, &preedit);
            }
        }
        let candidate =
            Candidate::new(KIND_PHRASE, self.start, self.start + len, entry).shared();
        *self.cache.borrow_mut() = Some(candidate.clone());
        Some(candidate)
    }

    fn next(&mut self) -> Option<Arc<Candidate>> {
        let current = self.peek()?;
        self.seen.insert(current.text().to_string());
        self.advance();
        // skip texts already emitted
        while let Some(upcoming) = self.peek() {
            if self.seen.contains(upcoming.text()) {
                self.advance();
            } else {
                break;
            }
        }
        Some(current)
    }
}

/// Forward dynamic programming over a one-homophone-per-node word graph.
fn make_sentence(
    dict: &Dictionary,
    user_dict: Option<&UserDictionary>,
    graph: &SyllableGraph,
) -> Option<DictEntry> {
    let total_length = graph.interpreted_length;
    let mut word_graph: BTreeMap<usize, BTreeMap<usize, Vec<DictEntry>>> = BTreeMap::new();
    for &start in graph.edges.keys() {
        let mut words = user_dict
            .and_then(|u| {
                u.lookup(
                    graph,
                    start,
                    MAX_SYLLABLES_IN_SENTENCE_MAKING_USER_PHRASES,
                    1.0,
                )
            })
            .unwrap_or_default();
        if let Some(phrase) = dict.lookup(graph, start) {
            for (end, iter) in phrase {
                let entries = words.entry(end).or_default();
                if entries.is_empty() {
                    if let Some(entry) = iter.peek() {
                        entries.push(entry);
                    }
                }
            }
        }
        word_graph.insert(start, words);
    }

    let mut sentences: BTreeMap<usize, DictEntry> = BTreeMap::new();
    sentences.insert(
        0,
        DictEntry {
            weight: 1.0,
            ..Default::default()
        },
    );
    for (&start_pos, words) in &word_graph {
        let base = match sentences.get(&start_pos) {
            Some(sentence) => sentence.clone(),
            None => continue,
        };
        for (&end_pos, entries) in words {
            // a single word covering everything is not a sentence
            if start_pos == 0 && end_pos == total_length {
                continue;
            }
            for entry in entries.iter().take(MAX_SENTENCE_MAKING_HOMOPHONES) {
                let mut sentence = base.clone();
                sentence.code.extend_from_slice(&entry.code);
                sentence.text.push_str(&entry.text);
                sentence.weight *= entry.weight.max(SENTENCE_EPSILON) * SENTENCE_PENALTY;
                let improved = sentences
                    .get(&end_pos)
                    .map_or(true, |existing| existing.weight < sentence.weight);
                if improved {
                    sentences.insert(end_pos, sentence);
                }
            }
        }
    }
    sentences
        .remove(&total_length)
        .filter(|sentence| !sentence.text.is_empty())
}

/// Offers the raw input back as a candidate, so a session without a usable
/// dictionary still converts to something.
pub struct EchoTranslator;

impl EchoTranslator {
    pub fn construct(_env: &EngineEnv) -> Option<Box<dyn Translator>> {
        Some(Box::new(EchoTranslator))
    }
}

impl Translator for EchoTranslator {
    fn query(&self, input: &str, segment: &Segment) -> Option<Box<dyn Translation>> {
        let slice = input.get(segment.start..segment.end)?;
        if slice.is_empty() {
            return None;
        }
        let candidate = Candidate::new(
            KIND_RAW,
            segment.start,
            segment.end,
            DictEntry {
                text: slice.to_string(),
                ..Default::default()
            },
        )
        .shared();
        Some(Box::new(UniqueTranslation::new(candidate)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use std::io::Write;
    use std::path::Path;

    fn write_dict(dir: &Path, lines: &[&str]) {
        let source = dir.join("r10n_test.dict.tsv");
        let mut f = std::fs::File::create(&source).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        drop(f);
        let mut dict = Dictionary::new("r10n_test", dir);
        dict.compile(&source).unwrap();
    }

    fn translator(dir: &Path) -> R10nTranslator {
        let schema = Schema::from_toml_str(
            r#"
            [translator]
            dictionary = "r10n_test"
            "#,
        )
        .unwrap();
        let env = EngineEnv {
            schema: &schema,
            shared_data_dir: dir,
            user_data_dir: dir,
        };
        R10nTranslator::new(&env).expect("translator")
    }

    fn texts(translation: &mut dyn Translation) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(candidate) = translation.next() {
            out.push(candidate.text().to_string());
        }
        out
    }

    #[test]
    fn longer_phrases_rank_before_shorter_ones() {
        let dir = tempfile::tempdir().unwrap();
        write_dict(
            dir.path(),
            &["好\thao", "号\thao\t0.5", "吗\tma", "好吗\thao ma\t2.0"],
        );
        let translator = translator(dir.path());
        let segment = Segment::with_tag(0, 5, "abc");
        let mut translation = translator.query("haoma", &segment).expect("translation");
        // phrases start at the segment start; homophones follow table weight
        assert_eq!(texts(translation.as_mut()), vec!["好吗", "好", "号"]);
    }

    #[test]
    fn no_consecutive_duplicate_texts() {
        let dir = tempfile::tempdir().unwrap();
        write_dict(
            dir.path(),
            &["好\thao", "好\tha o", "吗\tma", "好吗\thao ma"],
        );
        let translator = translator(dir.path());
        let segment = Segment::with_tag(0, 5, "abc");
        let mut translation = translator.query("haoma", &segment).expect("translation");
        let emitted = texts(translation.as_mut());
        for pair in emitted.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
        assert_eq!(
            emitted.iter().filter(|t| t.as_str() == "好").count(),
            1
        );
    }

    #[test]
    fn sentence_covers_input_when_no_phrase_does() {
        let dir = tempfile::tempdir().unwrap();
        write_dict(dir.path(), &["好\thao", "吗\tma"]);
        let translator = translator(dir.path());
        let segment = Segment::with_tag(0, 5, "abc");
        let mut translation = translator.query("haoma", &segment).expect("translation");
        let first = translation.next().expect("sentence");
        assert_eq!(first.text(), "好吗");
        assert_eq!(first.entry.code.len(), 2);
        assert_eq!((first.start, first.end), (0, 5));
    }

    #[test]
    fn learned_phrases_outrank_the_table() {
        let dir = tempfile::tempdir().unwrap();
        write_dict(
            dir.path(),
            &["好\thao", "吗\tma", "好吗\thao ma\t2.0", "好马\thao ma\t3.0"],
        );
        let translator = translator(dir.path());
        let user_dict = translator.user_dict().unwrap();
        let prism = translator.dict.prism().unwrap();
        let entry = DictEntry {
            text: "好吗".to_string(),
            code: vec![
                prism.get_value("hao").unwrap(),
                prism.get_value("ma").unwrap(),
            ],
            ..Default::default()
        };
        for _ in 0..3 {
            user_dict.update_entry(&entry, 1);
        }

        let segment = Segment::with_tag(0, 5, "abc");
        let mut translation = translator.query("haoma", &segment).expect("translation");
        let first = translation.next().unwrap();
        // the user-dictionary branch wins the length tie over 好马 (3.0)
        assert_eq!(first.text(), "好吗");
        assert!(first.entry.commit_count >= 1);
    }

    #[test]
    fn preedit_is_reconstructed_with_delimiters() {
        let dir = tempfile::tempdir().unwrap();
        write_dict(dir.path(), &["好吗\thao ma\t2.0", "好\thao", "吗\tma"]);
        let translator = translator(dir.path());
        let segment = Segment::with_tag(0, 5, "abc");
        let translation = translator.query("haoma", &segment).expect("translation");
        let first = translation.peek().unwrap();
        assert_eq!(first.text(), "好吗");
        assert_eq!(first.preedit(), "hao ma");
    }

    #[test]
    fn non_abc_segments_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_dict(dir.path(), &["好\thao"]);
        let translator = translator(dir.path());
        let segment = Segment::new(0, 3);
        assert!(translator.query("hao", &segment).is_none());
    }

    #[test]
    fn echo_translator_offers_the_raw_input() {
        let schema = Schema::default();
        let env = EngineEnv {
            schema: &schema,
            shared_data_dir: Path::new("."),
            user_data_dir: Path::new("."),
        };
        let echo = EchoTranslator::construct(&env).unwrap();
        let segment = Segment::with_tag(0, 3, "abc");
        let mut translation = echo.query("abc", &segment).unwrap();
        let candidate = translation.next().unwrap();
        assert_eq!(candidate.text(), "abc");
        assert_eq!(candidate.kind, KIND_RAW);
        assert!(translation.next().is_none());
    }
}
