//! Build-time vocabulary: a nested tree of dictionary entries keyed by
//! syllable id, mirroring the level structure of the phrase table.
//!
//! Codes longer than [`INDEX_CODE_MAX_LENGTH`] collapse into a single page
//! keyed by the tail sentinel; the table writer turns that page into the
//! tail index.

use std::collections::{BTreeMap, BTreeSet};

use crate::dictionary::DictEntry;
use crate::spelling::{SyllableId, INDEX_CODE_MAX_LENGTH, TAIL_SENTINEL};

/// The sorted set of spellings a dictionary was compiled from.
pub type Syllabary = BTreeSet<String>;

pub type DictEntryList = Vec<DictEntry>;

#[derive(Debug, Default)]
pub struct VocabularyPage {
    pub entries: DictEntryList,
    pub next_level: Option<Box<Vocabulary>>,
}

#[derive(Debug, Default)]
pub struct Vocabulary {
    pages: BTreeMap<SyllableId, VocabularyPage>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Vocabulary::default()
    }

    pub fn get(&self, key: &SyllableId) -> Option<&VocabularyPage> {
        self.pages.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SyllableId, &VocabularyPage)> {
        self.pages.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Locate (creating levels as needed) the entry list a code belongs to.
    ///
    /// Returns `None` only for an empty code.
    pub fn locate_entries(&mut self, code: &[SyllableId]) -> Option<&mut DictEntryList> {
        if code.is_empty() {
            return None;
        }
        let mut vocabulary = self;
        let n = code.len();
        for (i, &syllable_id) in code.iter().enumerate() {
            if i == INDEX_CODE_MAX_LENGTH {
                // everything beyond the indexed prefix shares the tail page
                let page = vocabulary.pages.entry(TAIL_SENTINEL).or_default();
                return Some(&mut page.entries);
            }
            let page = vocabulary.pages.entry(syllable_id).or_default();
            if i == n - 1 {
                return Some(&mut page.entries);
            }
            vocabulary = page.next_level.get_or_insert_with(Default::default);
        }
        None
    }

    /// Sort every entry list by weight descending, text ascending.
    pub fn sort_homophones(&mut self) {
        for page in self.pages.values_mut() {
            page.entries.sort_by(DictEntry::cmp_homophones);
            if let Some(next) = &mut page.next_level {
                next.sort_homophones();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str, code: &[SyllableId], weight: f64) -> DictEntry {
        DictEntry {
            text: text.to_string(),
            code: code.to_vec(),
            weight,
            ..Default::default()
        }
    }

    #[test]
    fn short_codes_nest_by_syllable() {
        let mut vocabulary = Vocabulary::new();
        vocabulary
            .locate_entries(&[1])
            .unwrap()
            .push(entry("一", &[1], 1.0));
        vocabulary
            .locate_entries(&[1, 2])
            .unwrap()
            .push(entry("一二", &[1, 2], 1.0));

        assert_eq!(vocabulary.get(&1).unwrap().entries.len(), 1);
        let next = vocabulary.get(&1).unwrap().next_level.as_ref().unwrap();
        assert_eq!(next.get(&2).unwrap().entries.len(), 1);
    }

    #[test]
    fn long_codes_collapse_into_the_tail_page() {
        let mut vocabulary = Vocabulary::new();
        vocabulary
            .locate_entries(&[1, 2, 3, 4, 5])
            .unwrap()
            .push(entry("长词", &[1, 2, 3, 4, 5], 1.0));

        let lv2 = vocabulary.get(&1).unwrap().next_level.as_ref().unwrap();
        let lv3 = lv2.get(&2).unwrap().next_level.as_ref().unwrap();
        let lv4 = lv3.get(&3).unwrap().next_level.as_ref().unwrap();
        let tail = lv4.get(&TAIL_SENTINEL).unwrap();
        assert_eq!(tail.entries.len(), 1);
        assert_eq!(tail.entries[0].code, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn empty_code_has_no_home() {
        let mut vocabulary = Vocabulary::new();
        assert!(vocabulary.locate_entries(&[]).is_none());
    }

    #[test]
    fn homophones_sort_by_weight_then_text() {
        let mut vocabulary = Vocabulary::new();
        let list = vocabulary.locate_entries(&[7]).unwrap();
        list.push(entry("乙", &[7], 1.0));
        list.push(entry("甲", &[7], 2.0));
        list.push(entry("丙", &[7], 1.0));
        vocabulary.sort_homophones();

        let texts: Vec<&str> = vocabulary
            .get(&7)
            .unwrap()
            .entries
            .iter()
            .map(|e| e.text.as_str())
            .collect();
        assert_eq!(texts, vec!["甲", "丙", "乙"]);
    }
}
