//! Built-in segmentors.

use crate::engine::{EngineEnv, Segmentor};
use crate::segmentation::{Segment, Segmentation};

/// Recognizes a run of alphabet letters (with embedded delimiters) as one
/// segment tagged `abc`, the segment the romanization translator serves.
pub struct AbcSegmentor {
    alphabet: String,
    delimiter: String,
}

impl AbcSegmentor {
    pub fn construct(env: &EngineEnv) -> Box<dyn Segmentor> {
        Box::new(AbcSegmentor {
            alphabet: env.schema.speller.alphabet.clone(),
            delimiter: env.schema.speller.delimiter.clone(),
        })
    }
}

impl Segmentor for AbcSegmentor {
    fn proceed(&mut self, segmentation: &mut Segmentation) -> bool {
        let input = segmentation.input().to_string();
        let bytes = input.as_bytes();
        let j = segmentation.get_current_start_position();
        let mut k = j;
        while k < bytes.len() {
            let ch = bytes[k] as char;
            let is_letter = self.alphabet.contains(ch);
            let is_delimiter = k != j && self.delimiter.contains(ch);
            if !is_letter && !is_delimiter {
                break;
            }
            k += 1;
        }
        if j < k {
            segmentation.add_segment(Segment::with_tag(j, k, "abc"));
        }
        // this round may continue
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    fn segmentor() -> Box<dyn Segmentor> {
        let schema = Schema::default();
        let env = EngineEnv {
            schema: &schema,
            shared_data_dir: std::path::Path::new("."),
            user_data_dir: std::path::Path::new("."),
        };
        AbcSegmentor::construct(&env)
    }

    #[test]
    fn recognizes_a_letter_run() {
        let mut abc = segmentor();
        let mut seg = Segmentation::new("hao'ma".to_string());
        abc.proceed(&mut seg);
        assert_eq!(seg.segments().len(), 1);
        let segment = &seg.segments()[0];
        assert_eq!((segment.start, segment.end), (0, 6));
        assert!(segment.has_tag("abc"));
    }

    #[test]
    fn stops_at_non_alphabet_input() {
        let mut abc = segmentor();
        let mut seg = Segmentation::new("hao123".to_string());
        abc.proceed(&mut seg);
        assert_eq!(seg.segments()[0].end, 3);
    }

    #[test]
    fn a_leading_delimiter_starts_nothing() {
        let mut abc = segmentor();
        let mut seg = Segmentation::new("'hao".to_string());
        abc.proceed(&mut seg);
        assert!(seg.is_empty());
    }
}
