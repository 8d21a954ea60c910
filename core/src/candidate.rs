//! A candidate: one selectable conversion of a span of input.

use std::sync::Arc;

use crate::dictionary::DictEntry;

/// Kind tag for candidates produced by the romanization translator.
pub const KIND_PHRASE: &str = "zh";
/// Kind tag for raw-input echo candidates.
pub const KIND_RAW: &str = "raw";

#[derive(Debug, Clone)]
pub struct Candidate {
    /// Kind tag, the primary sort key between translations.
    pub kind: String,
    /// Span of the input this candidate converts (byte positions).
    pub start: usize,
    pub end: usize,
    pub entry: DictEntry,
}

impl Candidate {
    pub fn new(kind: &str, start: usize, end: usize, entry: DictEntry) -> Self {
        Candidate {
            kind: kind.to_string(),
            start,
            end,
            entry,
        }
    }

    pub fn text(&self) -> &str {
        &self.entry.text
    }

    pub fn comment(&self) -> &str {
        &self.entry.comment
    }

    pub fn preedit(&self) -> &str {
        &self.entry.preedit
    }

    pub fn weight(&self) -> f64 {
        self.entry.weight
    }

    pub fn shared(self) -> Arc<Candidate> {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_exposes_its_entry() {
        let cand = Candidate::new(
            KIND_PHRASE,
            0,
            5,
            DictEntry {
                text: "好吗".into(),
                weight: 2.0,
                ..Default::default()
            },
        );
        assert_eq!(cand.text(), "好吗");
        assert_eq!(cand.weight(), 2.0);
        assert_eq!(cand.kind, KIND_PHRASE);
        assert_eq!((cand.start, cand.end), (0, 5));
    }
}
