//! A translation is a lazy, ordered stream of candidates.

use std::sync::Arc;

use crate::candidate::Candidate;

pub trait Translation {
    /// The candidate the stream currently offers, if any.
    fn peek(&self) -> Option<Arc<Candidate>>;

    /// Take the current candidate and advance.
    fn next(&mut self) -> Option<Arc<Candidate>>;

    fn exhausted(&self) -> bool {
        self.peek().is_none()
    }
}

/// A translation of exactly one candidate.
pub struct UniqueTranslation {
    candidate: Option<Arc<Candidate>>,
}

impl UniqueTranslation {
    pub fn new(candidate: Arc<Candidate>) -> Self {
        UniqueTranslation {
            candidate: Some(candidate),
        }
    }
}

impl Translation for UniqueTranslation {
    fn peek(&self) -> Option<Arc<Candidate>> {
        self.candidate.clone()
    }

    fn next(&mut self) -> Option<Arc<Candidate>> {
        self.candidate.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::KIND_RAW;
    use crate::dictionary::DictEntry;

    #[test]
    fn unique_translation_yields_once() {
        let cand = Candidate::new(
            KIND_RAW,
            0,
            1,
            DictEntry {
                text: "a".into(),
                ..Default::default()
            },
        )
        .shared();
        let mut t = UniqueTranslation::new(cand);
        assert!(!t.exhausted());
        assert_eq!(t.peek().unwrap().text(), "a");
        assert_eq!(t.next().unwrap().text(), "a");
        assert!(t.exhausted());
        assert!(t.next().is_none());
    }
}
