//! Core spelling types shared by the prism, syllabifier, table and
//! dictionaries: syllable ids, codes, and per-spelling properties.

/// Identifier of a syllable in the syllabary.
///
/// Non-negative values index the syllabary array; `-1` is reserved as the
/// tail sentinel inside the phrase table.
pub type SyllableId = i32;

/// Sentinel syllable id addressing the tail level of the table index.
pub const TAIL_SENTINEL: SyllableId = -1;

/// An ordered sequence of syllable ids identifying a phrase.
pub type Code = Vec<SyllableId>;

/// The number of leading code positions kept in the table's indexed levels;
/// positions at or beyond this length live in the tail level as extra code.
pub const INDEX_CODE_MAX_LENGTH: usize = 3;

/// Build the index code (first [`INDEX_CODE_MAX_LENGTH`] positions) of a code.
pub fn index_code_of(code: &[SyllableId]) -> Code {
    code[..code.len().min(INDEX_CODE_MAX_LENGTH)].to_vec()
}

/// A code in human-readable form: one spelling string per syllable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCode(pub Vec<String>);

impl RawCode {
    /// Join the spellings with single spaces.
    pub fn to_joined(&self) -> String {
        self.0.join(" ")
    }

    /// Split a whitespace-separated code string.
    pub fn from_joined(code: &str) -> Self {
        RawCode(code.split_whitespace().map(str::to_string).collect())
    }
}

/// How a spelling relates to the syllable it stands for.
///
/// The order is significant: a smaller type is preferred, and the
/// syllabifier prunes spellings whose type is worse than the best type that
/// reaches the end of the interpreted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SpellingType {
    Normal,
    Fuzzy,
    Abbreviation,
    Completion,
    Ambiguous,
    Invalid,
}

/// Properties attached to one spelling on one edge of the syllable graph.
#[derive(Debug, Clone, PartialEq)]
pub struct SpellingProperties {
    /// Exclusive end position of the edge carrying this spelling, after any
    /// trailing delimiters have been consumed.
    pub end_pos: usize,
    pub kind: SpellingType,
    /// Prior in `(0, 1]`, multiplied along a path.
    pub credibility: f64,
}

impl Default for SpellingProperties {
    fn default() -> Self {
        SpellingProperties {
            end_pos: 0,
            kind: SpellingType::Normal,
            credibility: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spelling_type_preference_order() {
        assert!(SpellingType::Normal < SpellingType::Fuzzy);
        assert!(SpellingType::Fuzzy < SpellingType::Abbreviation);
        assert!(SpellingType::Abbreviation < SpellingType::Completion);
        assert!(SpellingType::Completion < SpellingType::Ambiguous);
        assert!(SpellingType::Ambiguous < SpellingType::Invalid);
    }

    #[test]
    fn raw_code_round_trip() {
        let raw = RawCode::from_joined("hao  ma");
        assert_eq!(raw.0, vec!["hao".to_string(), "ma".to_string()]);
        assert_eq!(raw.to_joined(), "hao ma");
    }

    #[test]
    fn index_code_truncates_at_limit() {
        assert_eq!(index_code_of(&[1, 2]), vec![1, 2]);
        assert_eq!(index_code_of(&[1, 2, 3, 4, 5]), vec![1, 2, 3]);
    }
}
