//! libr10n-core
//!
//! The core of a Chinese-style romanization input method: raw key events in,
//! ranked candidate phrases out, with a learning user dictionary biasing
//! future ranking.
//!
//! The query pipeline: the [`Syllabifier`] turns the typed letters into a
//! [`SyllableGraph`] using the [`Prism`]; the [`Dictionary`] (a [`Table`]
//! mmap plus the prism) and the [`UserDictionary`] are looked up along the
//! graph; the romanization translator merges both result sets, making a
//! sentence by dynamic programming when nothing covers the input; the
//! [`Menu`] pages the ranked candidates; the [`Context`] tracks the
//! composition, and commits feed back into the user dictionary.
//!
//! Public API:
//! - `Service` / `Traits` - session management for the host glue
//! - `Engine` - the processor/segmentor/translator/filter pipelines
//! - `Dictionary`, `Table`, `Prism` - compiled, shared, read-only lookups
//! - `UserDb`, `UserDictionary` - persistent learning
//! - `Schema` - typed schema configuration

pub mod spelling;
pub use spelling::{Code, RawCode, SpellingProperties, SpellingType, SyllableId};

pub mod prism;
pub use prism::Prism;

pub mod syllabifier;
pub use syllabifier::{Syllabifier, SyllableGraph};

pub mod vocabulary;
pub use vocabulary::{Syllabary, Vocabulary};

pub mod table;
pub use table::{Table, TableAccessor, TableVisitor, TableWriter};

pub mod dictionary;
pub use dictionary::{DictEntry, DictEntryCollector, DictEntryIterator, Dictionary};

pub mod userdb;
pub use userdb::{UserDb, UserDbAccessor};

pub mod userdict;
pub use userdict::{TickCount, UserDictEntryCollector, UserDictionary};

pub mod candidate;
pub use candidate::Candidate;

pub mod translation;
pub use translation::{Translation, UniqueTranslation};

pub mod menu;
pub use menu::{Menu, Page};

pub mod segmentation;
pub use segmentation::{Segment, SegmentStatus, Segmentation};

pub mod composition;
pub use composition::{Composition, Preedit};

pub mod context;
pub use context::Context;

pub mod key_event;
pub use key_event::KeyEvent;

pub mod schema;
pub use schema::Schema;

pub mod engine;
pub use engine::{Engine, Filter, ProcessResult, Processor, Segmentor, Translator};

pub mod processors;
pub mod segmentors;
pub mod translator;

pub mod service;
pub use service::{ContextSnapshot, Service, SessionId, Status, Traits};
