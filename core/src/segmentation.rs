//! Segmentation: the editing view of the input as an ordered list of
//! segments, each with a selection status, tags, and (once translated) a
//! menu of candidates.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::candidate::Candidate;
use crate::menu::Menu;

/// Selection state of a segment. `Void → Guess → Selected → Confirmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SegmentStatus {
    Void,
    Guess,
    Selected,
    Confirmed,
}

#[derive(Debug)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
    pub status: SegmentStatus,
    pub selected_index: usize,
    pub tags: BTreeSet<String>,
    pub menu: Option<Menu>,
}

impl Segment {
    pub fn new(start: usize, end: usize) -> Self {
        Segment {
            start,
            end,
            status: SegmentStatus::Void,
            selected_index: 0,
            tags: BTreeSet::new(),
            menu: None,
        }
    }

    pub fn with_tag(start: usize, end: usize, tag: &str) -> Self {
        let mut segment = Segment::new(start, end);
        segment.tags.insert(tag.to_string());
        segment
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn get_candidate_at(&self, index: usize) -> Option<Arc<Candidate>> {
        self.menu.as_ref()?.get_candidate_at(index)
    }

    pub fn get_selected_candidate(&self) -> Option<Arc<Candidate>> {
        self.get_candidate_at(self.selected_index)
    }
}

/// The input string with the segments recognized over it so far.
#[derive(Debug, Default)]
pub struct Segmentation {
    input: String,
    segments: Vec<Segment>,
}

impl Segmentation {
    pub fn new(input: String) -> Self {
        Segmentation {
            input,
            segments: Vec::new(),
        }
    }

    pub fn with_segments(input: String, segments: Vec<Segment>) -> Self {
        Segmentation { input, segments }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: String) {
        self.input = input;
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segments_mut(&mut self) -> &mut Vec<Segment> {
        &mut self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn clear(&mut self) {
        self.input.clear();
        self.segments.clear();
    }

    /// Where the current (possibly still empty) segment starts.
    pub fn get_current_start_position(&self) -> usize {
        self.segments.last().map_or(0, |s| s.start)
    }

    pub fn get_current_end_position(&self) -> usize {
        self.segments.last().map_or(0, |s| s.end)
    }

    /// Append a segment recognized by a segmentor. A segment starting where
    /// the current trailing segment starts merges into it (two segmentors
    /// recognizing the same span contribute their tags to one segment).
    pub fn add_segment(&mut self, segment: Segment) {
        match self.segments.last_mut() {
            Some(last) if last.start == segment.start => {
                last.end = last.end.max(segment.end);
                last.tags.extend(segment.tags);
            }
            _ => self.segments.push(segment),
        }
    }

    /// Open a zero-width segment after the current one for the next round.
    pub fn forward(&mut self) -> bool {
        match self.segments.last() {
            Some(last) if last.start != last.end => {
                let end = last.end;
                self.segments.push(Segment::new(end, end));
                true
            }
            _ => false,
        }
    }

    /// Drop a trailing zero-width segment.
    pub fn trim(&mut self) -> bool {
        match self.segments.last() {
            Some(last) if last.start == last.end => {
                self.segments.pop();
                true
            }
            _ => false,
        }
    }

    pub fn has_finished_segmentation(&self) -> bool {
        self.get_current_end_position() >= self.input.len()
    }
}
