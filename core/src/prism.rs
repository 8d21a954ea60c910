//! Prism: a persisted map from spelling strings to syllable ids, with the
//! prefix and expansion queries the syllabifier is built on.
//!
//! The automaton is an [`fst::Map`]; the container file adds a format string
//! and the checksum of the dictionary source the prism was compiled from,
//! serialized with bincode.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use fst::{IntoStreamer, Map, MapBuilder, Streamer};
use serde::{Deserialize, Serialize};

use crate::spelling::{SpellingProperties, SpellingType, SyllableId};

const PRISM_FORMAT: &str = "R10n::Prism/1.0";

#[derive(Debug, thiserror::Error)]
pub enum PrismError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad prism container: {0}")]
    Container(#[from] Box<bincode::ErrorKind>),
    #[error("format mismatch: expected {PRISM_FORMAT}, found {0}")]
    Format(String),
    #[error("automaton error: {0}")]
    Fst(#[from] fst::Error),
}

/// A key found by [`Prism::common_prefix_search`] or [`Prism::expand_search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub value: SyllableId,
    /// Byte length of the matched key.
    pub length: usize,
}

#[derive(Serialize, Deserialize)]
struct PrismContainer {
    format: String,
    dict_file_checksum: u32,
    fst_bytes: Vec<u8>,
}

/// Read-only after construction; share it behind an `Arc`.
pub struct Prism {
    map: Map<Vec<u8>>,
    dict_file_checksum: u32,
}

impl std::fmt::Debug for Prism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prism")
            .field("keys", &self.map.len())
            .field("dict_file_checksum", &self.dict_file_checksum)
            .finish()
    }
}

impl Prism {
    /// Build from spellings in sorted order, assigning values `0..n`.
    pub fn build<'a, I>(sorted_spellings: I) -> Result<Self, PrismError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self::build_with_values(
            sorted_spellings
                .into_iter()
                .enumerate()
                .map(|(i, s)| (s, i as SyllableId)),
        )
    }

    /// Build from explicit `(spelling, value)` pairs in sorted key order.
    pub fn build_with_values<'a, I>(pairs: I) -> Result<Self, PrismError>
    where
        I: IntoIterator<Item = (&'a str, SyllableId)>,
    {
        let mut builder = MapBuilder::memory();
        for (spelling, value) in pairs {
            builder.insert(spelling, value as u64)?;
        }
        let bytes = builder.into_inner()?;
        Ok(Prism {
            map: Map::new(bytes)?,
            dict_file_checksum: 0,
        })
    }

    pub fn set_dict_file_checksum(&mut self, checksum: u32) {
        self.dict_file_checksum = checksum;
    }

    pub fn dict_file_checksum(&self) -> u32 {
        self.dict_file_checksum
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PrismError> {
        let container = PrismContainer {
            format: PRISM_FORMAT.to_string(),
            dict_file_checksum: self.dict_file_checksum,
            fst_bytes: self.map.as_fst().as_bytes().to_vec(),
        };
        let mut f = File::create(path)?;
        f.write_all(&bincode::serialize(&container)?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PrismError> {
        let mut buf = Vec::new();
        File::open(path.as_ref())?.read_to_end(&mut buf)?;
        let container: PrismContainer = bincode::deserialize(&buf)?;
        if container.format != PRISM_FORMAT {
            return Err(PrismError::Format(container.format));
        }
        tracing::debug!(path = %path.as_ref().display(), "loaded prism");
        Ok(Prism {
            map: Map::new(container.fst_bytes)?,
            dict_file_checksum: container.dict_file_checksum,
        })
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn get_value(&self, key: &str) -> Option<SyllableId> {
        self.map.get(key).map(|v| v as SyllableId)
    }

    /// Every key that is a prefix of `query`, shortest first.
    pub fn common_prefix_search(&self, query: &str) -> Vec<Match> {
        let fst = self.map.as_fst();
        let mut node = fst.root();
        let mut out = fst::raw::Output::zero();
        let mut matches = Vec::new();
        for (i, &b) in query.as_bytes().iter().enumerate() {
            let t = match node.find_input(b) {
                Some(t) => t,
                None => break,
            };
            let transition = node.transition(t);
            out = out.cat(transition.out);
            node = fst.node(transition.addr);
            if node.is_final() {
                matches.push(Match {
                    value: out.cat(node.final_output()).value() as SyllableId,
                    length: i + 1,
                });
            }
        }
        matches
    }

    /// Up to `limit` keys starting with `query`, shortest first.
    /// A `limit` of zero means unlimited.
    pub fn expand_search(&self, query: &str, limit: usize) -> Vec<Match> {
        let mut matches = Vec::new();
        let mut stream = self.map.range().ge(query).into_stream();
        while let Some((key, value)) = stream.next() {
            if !key.starts_with(query.as_bytes()) {
                break;
            }
            matches.push(Match {
                value: value as SyllableId,
                length: key.len(),
            });
        }
        matches.sort_by_key(|m| m.length);
        if limit > 0 && matches.len() > limit {
            matches.truncate(limit);
        }
        matches
    }

    /// Resolve a prism value to the syllables it spells.
    ///
    /// No spelling algebra is configured, so a value stands for exactly one
    /// syllable of its own id, with `Normal` type and full credibility.
    pub fn query_spelling(&self, value: SyllableId) -> SpellingAccessor {
        SpellingAccessor {
            items: vec![(
                value,
                SpellingProperties {
                    end_pos: 0,
                    kind: SpellingType::Normal,
                    credibility: 1.0,
                },
            )]
            .into_iter(),
        }
    }
}

/// Iterator over the `(syllable_id, properties)` pairs a spelling evaluates to.
pub struct SpellingAccessor {
    items: std::vec::IntoIter<(SyllableId, SpellingProperties)>,
}

impl Iterator for SpellingAccessor {
    type Item = (SyllableId, SpellingProperties);

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next()
    }
}
