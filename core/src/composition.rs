//! Composition: the segmentation being edited, with preedit and commit-text
//! rendering over the selected candidates.

use std::ops::{Deref, DerefMut};

use crate::segmentation::{Segmentation, SegmentStatus};

/// Caret glyph inserted into the rendered preedit.
pub const CARET: &str = "\u{2039}";

/// What the host shows while composing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preedit {
    pub text: String,
    pub cursor_pos: usize,
    pub sel_start: usize,
    pub sel_end: usize,
}

#[derive(Debug, Default)]
pub struct Composition {
    segmentation: Segmentation,
}

impl Deref for Composition {
    type Target = Segmentation;

    fn deref(&self) -> &Segmentation {
        &self.segmentation
    }
}

impl DerefMut for Composition {
    fn deref_mut(&mut self) -> &mut Segmentation {
        &mut self.segmentation
    }
}

impl From<Segmentation> for Composition {
    fn from(segmentation: Segmentation) -> Self {
        Composition { segmentation }
    }
}

impl Composition {
    pub fn new() -> Self {
        Composition::default()
    }

    pub fn into_segmentation(self) -> Segmentation {
        self.segmentation
    }

    /// Whether the last (non-placeholder) segment carries a selection.
    pub fn has_finished_composition(&self) -> bool {
        let segments = self.segments();
        if segments.is_empty() {
            return false;
        }
        let mut k = segments.len() - 1;
        if k > 0 && segments[k].start == segments[k].end {
            k -= 1;
        }
        segments[k].status >= SegmentStatus::Selected
    }

    /// Render the preedit: converted text for settled segments, the
    /// highlighted segment as its candidate's preedit (or raw input), the
    /// unconverted tail, and the caret glyph at the cursor.
    pub fn get_preedit(&self) -> Preedit {
        let mut preedit = Preedit::default();
        let segments = self.segments();
        if segments.is_empty() {
            return preedit;
        }
        let input = self.input();
        let mut text_len = 0;
        let mut end = 0;
        for (i, segment) in segments.iter().enumerate() {
            let start = end;
            let candidate = match segment.get_selected_candidate() {
                Some(candidate) => candidate,
                None => continue,
            };
            end = candidate.end;
            if i < segments.len() - 1 {
                preedit.text.push_str(candidate.text());
                text_len = preedit.text.len();
            } else {
                // highlight the active segment
                preedit.sel_start = text_len;
                if !candidate.preedit().is_empty() {
                    preedit.text.push_str(candidate.preedit());
                } else {
                    preedit.text.push_str(&input[start..end.min(input.len())]);
                }
                text_len = preedit.text.len();
                preedit.sel_end = text_len;
            }
        }
        if input.len() > end {
            preedit.text.push_str(&input[end..]);
        }
        let trailing = self.get_current_end_position().saturating_sub(end);
        preedit.cursor_pos = text_len + trailing;
        if preedit.cursor_pos < preedit.text.len() {
            preedit.text.insert_str(preedit.cursor_pos, CARET);
        } else {
            preedit.cursor_pos = preedit.text.len();
            preedit.text.push_str(CARET);
        }
        preedit
    }

    /// Concatenated text to commit: each segment's selected candidate, or
    /// its raw input span when nothing was selected.
    pub fn get_commit_text(&self) -> String {
        let input = self.input();
        let mut result = String::new();
        for segment in self.segments() {
            match segment.get_selected_candidate() {
                Some(candidate) => result.push_str(candidate.text()),
                None => {
                    if segment.end > segment.start && segment.end <= input.len() {
                        result.push_str(&input[segment.start..segment.end]);
                    }
                }
            }
        }
        result
    }

    pub fn get_debug_text(&self) -> String {
        let mut result = String::new();
        for (i, segment) in self.segments().iter().enumerate() {
            if i > 0 {
                result.push('|');
            }
            match segment.get_selected_candidate() {
                Some(candidate) => result.push_str(candidate.text()),
                None => result.push_str(&format!("[{}..{})", segment.start, segment.end)),
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{Candidate, KIND_PHRASE};
    use crate::dictionary::DictEntry;
    use crate::menu::Menu;
    use crate::segmentation::Segment;
    use crate::translation::UniqueTranslation;

    fn segment_with_candidate(start: usize, end: usize, text: &str) -> Segment {
        let mut segment = Segment::new(start, end);
        let mut menu = Menu::new(Vec::new());
        let cand = Candidate::new(
            KIND_PHRASE,
            start,
            end,
            DictEntry {
                text: text.to_string(),
                weight: 1.0,
                ..Default::default()
            },
        )
        .shared();
        menu.add_translation(Box::new(UniqueTranslation::new(cand)));
        segment.menu = Some(menu);
        segment.status = SegmentStatus::Guess;
        segment
    }

    #[test]
    fn empty_composition_is_unfinished() {
        let comp = Composition::new();
        assert!(!comp.has_finished_composition());
        assert_eq!(comp.get_commit_text(), "");
        assert_eq!(comp.get_preedit(), Preedit::default());
    }

    #[test]
    fn commit_text_prefers_candidates_and_falls_back_to_input() {
        let mut seg = Segmentation::new("haoma".to_string());
        seg.segments_mut().push(segment_with_candidate(0, 3, "好"));
        seg.segments_mut().push(Segment::new(3, 5));
        let comp: Composition = seg.into();
        assert_eq!(comp.get_commit_text(), "好ma");
    }

    #[test]
    fn preedit_highlights_the_last_segment() {
        let mut seg = Segmentation::new("haoma".to_string());
        let mut first = segment_with_candidate(0, 3, "好");
        first.status = SegmentStatus::Confirmed;
        seg.segments_mut().push(first);
        seg.segments_mut().push(segment_with_candidate(3, 5, "吗"));
        let comp: Composition = seg.into();
        let preedit = comp.get_preedit();
        assert!(preedit.text.starts_with("好"));
        assert_eq!(preedit.sel_start, "好".len());
        assert_eq!(&preedit.text["好".len()..preedit.sel_end], "ma");
        assert!(preedit.text.ends_with(CARET));
    }

    #[test]
    fn finished_composition_skips_the_placeholder() {
        let mut seg = Segmentation::new("hao".to_string());
        let mut segment = segment_with_candidate(0, 3, "好");
        segment.status = SegmentStatus::Selected;
        seg.segments_mut().push(segment);
        seg.forward();
        let comp: Composition = seg.into();
        assert!(comp.has_finished_composition());
    }
}
