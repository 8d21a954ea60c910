//! Context: the per-session editing state (raw input, caret, composition,
//! options) and the selection state machine over it.
//!
//! Observers are ordered listener lists invoked synchronously in
//! registration order. Listeners are read-only; state changes that require
//! recomposition raise a dirty flag the engine drains after each processor
//! dispatch.

use std::collections::BTreeMap;

use crate::composition::{Composition, Preedit, CARET};
use crate::segmentation::SegmentStatus;

pub type ContextListener = Box<dyn Fn(&Context)>;
pub type OptionListener = Box<dyn Fn(&Context, &str)>;

#[derive(Default)]
pub struct Context {
    input: String,
    caret_pos: usize,
    composition: Composition,
    options: BTreeMap<String, bool>,
    prompt: String,
    pending_commit: String,
    dirty: bool,
    select_pending: bool,
    update_listeners: Vec<ContextListener>,
    select_listeners: Vec<ContextListener>,
    commit_listeners: Vec<ContextListener>,
    option_listeners: Vec<OptionListener>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("input", &self.input)
            .field("caret_pos", &self.caret_pos)
            .field("segments", &self.composition.segments().len())
            .finish()
    }
}

impl Context {
    pub fn new() -> Self {
        Context::default()
    }

    // ---- observers ----

    pub fn on_update(&mut self, listener: ContextListener) {
        self.update_listeners.push(listener);
    }

    pub fn on_select(&mut self, listener: ContextListener) {
        self.select_listeners.push(listener);
    }

    pub fn on_commit(&mut self, listener: ContextListener) {
        self.commit_listeners.push(listener);
    }

    pub fn on_option_update(&mut self, listener: OptionListener) {
        self.option_listeners.push(listener);
    }

    fn notify_update(&mut self) {
        self.dirty = true;
        for listener in &self.update_listeners {
            listener(self);
        }
    }

    fn notify_select(&mut self) {
        self.select_pending = true;
        for listener in &self.select_listeners {
            listener(self);
        }
    }

    /// The engine drains this after every processor dispatch.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    /// The engine drains this to run the post-select step.
    pub fn take_select_pending(&mut self) -> bool {
        std::mem::replace(&mut self.select_pending, false)
    }

    // ---- input editing ----

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, value: String) {
        self.input = value;
        self.caret_pos = self.input.len();
        self.notify_update();
    }

    pub fn caret_pos(&self) -> usize {
        self.caret_pos
    }

    pub fn set_caret_pos(&mut self, caret_pos: usize) {
        self.caret_pos = caret_pos.min(self.input.len());
        self.notify_update();
    }

    pub fn push_input(&mut self, ch: char) -> bool {
        if !ch.is_ascii() {
            return false;
        }
        if self.caret_pos >= self.input.len() {
            self.input.push(ch);
            self.caret_pos = self.input.len();
        } else {
            self.input.insert(self.caret_pos, ch);
            self.caret_pos += 1;
        }
        self.notify_update();
        true
    }

    pub fn pop_input(&mut self) -> bool {
        if self.caret_pos == 0 {
            return false;
        }
        self.caret_pos -= 1;
        self.input.remove(self.caret_pos);
        self.notify_update();
        true
    }

    pub fn delete_input(&mut self) -> bool {
        if self.caret_pos >= self.input.len() {
            return false;
        }
        self.input.remove(self.caret_pos);
        self.notify_update();
        true
    }

    pub fn clear(&mut self) {
        self.prompt.clear();
        self.input.clear();
        self.caret_pos = 0;
        self.composition.clear();
        self.notify_update();
    }

    pub fn is_composing(&self) -> bool {
        !self.input.is_empty()
    }

    pub fn has_menu(&self) -> bool {
        self.composition
            .segments()
            .last()
            .map_or(false, |s| s.menu.is_some())
    }

    // ---- composition ----

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    pub fn composition_mut(&mut self) -> &mut Composition {
        &mut self.composition
    }

    pub fn take_composition(&mut self) -> Composition {
        std::mem::take(&mut self.composition)
    }

    pub fn set_composition(&mut self, composition: Composition) {
        self.composition = composition;
    }

    pub fn get_commit_text(&self) -> String {
        if self.composition.is_empty() {
            return self.input.clone();
        }
        self.composition.get_commit_text()
    }

    /// The unconverted input as typed.
    pub fn get_script_text(&self) -> String {
        self.input.clone()
    }

    pub fn get_preedit(&self) -> Preedit {
        if !self.prompt.is_empty() {
            return Preedit {
                text: self.prompt.clone(),
                cursor_pos: self.prompt.len(),
                sel_start: 0,
                sel_end: self.prompt.len(),
            };
        }
        if self.composition.is_empty() && self.is_composing() {
            let mut text = self.input.clone();
            let cursor_pos = self.caret_pos;
            text.insert_str(cursor_pos, CARET);
            return Preedit {
                text,
                cursor_pos,
                sel_start: 0,
                sel_end: 0,
            };
        }
        self.composition.get_preedit()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn set_prompt(&mut self, prompt: String) {
        self.prompt = prompt;
    }

    // ---- selection state machine ----

    /// Highlight a candidate of the last segment without selecting it.
    pub fn highlight(&mut self, index: usize) -> bool {
        let ok = self
            .composition
            .segments()
            .last()
            .and_then(|s| s.get_candidate_at(index))
            .is_some();
        if !ok {
            return false;
        }
        if let Some(segment) = self.composition.segments_mut().last_mut() {
            segment.selected_index = index;
        }
        true
    }

    /// Select a candidate of the last segment by global index.
    pub fn select(&mut self, index: usize) -> bool {
        let ok = self
            .composition
            .segments()
            .last()
            .and_then(|s| s.get_candidate_at(index))
            .is_some();
        if !ok {
            return false;
        }
        let segment = self.composition.segments_mut().last_mut().unwrap();
        segment.selected_index = index;
        segment.status = SegmentStatus::Selected;
        self.notify_select();
        true
    }

    /// Promote the highlighted candidate of the last segment to selected.
    pub fn confirm_current_selection(&mut self) -> bool {
        let has_candidate = self
            .composition
            .segments()
            .last()
            .and_then(|s| s.get_selected_candidate())
            .is_some();
        if !has_candidate {
            return false;
        }
        self.composition.segments_mut().last_mut().unwrap().status = SegmentStatus::Selected;
        self.notify_select();
        true
    }

    /// After a selection: shrink the segment to the candidate it selected,
    /// and commit once the whole input is converted.
    pub fn finish_selection(&mut self) {
        let input_len = self.input.len();
        let mut resized = false;
        let mut finished = false;
        if let Some(segment) = self.composition.segments_mut().last_mut() {
            if segment.status >= SegmentStatus::Selected {
                if let Some(candidate) = segment.get_selected_candidate() {
                    if candidate.end < segment.end {
                        segment.end = candidate.end;
                        resized = true;
                    } else if segment.end >= input_len {
                        segment.status = SegmentStatus::Confirmed;
                        finished = true;
                    }
                }
            }
        }
        if resized {
            // re-segment and translate the tail
            self.dirty = true;
        } else if finished {
            self.commit();
        }
    }

    /// Mark the most recent selected segment confirmed.
    pub fn confirm_previous_selection(&mut self) -> bool {
        for segment in self.composition.segments_mut().iter_mut().rev() {
            if segment.status > SegmentStatus::Selected {
                return false;
            }
            if segment.status == SegmentStatus::Selected {
                segment.status = SegmentStatus::Confirmed;
                return true;
            }
        }
        false
    }

    /// Pop a trailing zero-width segment and reopen the one before it.
    pub fn reopen_previous_segment(&mut self) -> bool {
        if !self.composition.trim() {
            return false;
        }
        if let Some(segment) = self.composition.segments_mut().last_mut() {
            if segment.status >= SegmentStatus::Selected {
                segment.status = SegmentStatus::Void;
            }
        }
        self.notify_update();
        true
    }

    /// Rewind the most recent selected segment to void, discarding
    /// everything after it.
    pub fn reopen_previous_selection(&mut self) -> bool {
        let segments = self.composition.segments_mut();
        for i in (0..segments.len()).rev() {
            match segments[i].status {
                status if status > SegmentStatus::Selected => return false,
                SegmentStatus::Selected => {
                    segments[i].status = SegmentStatus::Void;
                    segments[i].menu = None;
                    segments.truncate(i + 1);
                    self.notify_update();
                    return true;
                }
                _ => continue,
            }
        }
        false
    }

    /// Drop segments that are not yet selected. Returns whether anything
    /// was dropped.
    pub fn clear_non_confirmed_composition(&mut self) -> bool {
        let segments = self.composition.segments_mut();
        let mut reverted = false;
        while segments
            .last()
            .map_or(false, |s| s.status < SegmentStatus::Selected)
        {
            segments.pop();
            reverted = true;
        }
        reverted
    }

    pub fn refresh_non_confirmed_composition(&mut self) -> bool {
        if self.clear_non_confirmed_composition() {
            self.notify_update();
            return true;
        }
        false
    }

    // ---- commit ----

    /// Fire the commit notification (composition intact), stash the commit
    /// text, then clear.
    pub fn commit(&mut self) -> bool {
        if !self.is_composing() {
            return false;
        }
        for listener in &self.commit_listeners {
            listener(self);
        }
        let text = self.get_commit_text();
        self.pending_commit.push_str(&text);
        self.clear();
        true
    }

    /// Commit the raw letters instead of the conversion.
    pub fn commit_raw_input(&mut self) -> bool {
        if !self.is_composing() {
            return false;
        }
        let text = self.get_script_text();
        self.pending_commit.push_str(&text);
        self.clear();
        true
    }

    /// Drain the committed text; empty when nothing was committed.
    pub fn take_pending_commit(&mut self) -> String {
        std::mem::take(&mut self.pending_commit)
    }

    pub fn has_pending_commit(&self) -> bool {
        !self.pending_commit.is_empty()
    }

    // ---- options ----

    pub fn set_option(&mut self, name: &str, value: bool) {
        self.options.insert(name.to_string(), value);
        for listener in &self.option_listeners {
            listener(self, name);
        }
    }

    pub fn get_option(&self, name: &str) -> bool {
        self.options.get(name).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn input_editing_tracks_the_caret() {
        let mut ctx = Context::new();
        ctx.push_input('h');
        ctx.push_input('a');
        ctx.push_input('o');
        assert_eq!(ctx.input(), "hao");
        assert_eq!(ctx.caret_pos(), 3);

        ctx.set_caret_pos(1);
        ctx.push_input('x');
        assert_eq!(ctx.input(), "hxao");
        ctx.pop_input();
        assert_eq!(ctx.input(), "hao");
        assert_eq!(ctx.caret_pos(), 1);
        ctx.delete_input();
        assert_eq!(ctx.input(), "ho");
        assert!(ctx.is_composing());
        ctx.clear();
        assert!(!ctx.is_composing());
    }

    #[test]
    fn update_listeners_fire_in_registration_order() {
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut ctx = Context::new();
        for i in 0..3 {
            let order = order.clone();
            ctx.on_update(Box::new(move |_| order.borrow_mut().push(i)));
        }
        ctx.push_input('a');
        assert_eq!(&*order.borrow(), &[0, 1, 2]);
    }

    #[test]
    fn commit_fires_before_the_context_clears() {
        let observed = Rc::new(Cell::new(false));
        let mut ctx = Context::new();
        {
            let observed = observed.clone();
            ctx.on_commit(Box::new(move |ctx| {
                observed.set(ctx.is_composing());
            }));
        }
        ctx.push_input('a');
        assert!(ctx.commit());
        // the observer saw the pre-clear state
        assert!(observed.get());
        assert!(!ctx.is_composing());
        assert_eq!(ctx.take_pending_commit(), "a");
        assert_eq!(ctx.take_pending_commit(), "");
    }

    #[test]
    fn committing_nothing_is_a_no_op() {
        let mut ctx = Context::new();
        assert!(!ctx.commit());
        assert!(!ctx.has_pending_commit());
    }

    #[test]
    fn options_default_to_false_and_notify() {
        let seen = Rc::new(std::cell::RefCell::new(String::new()));
        let mut ctx = Context::new();
        {
            let seen = seen.clone();
            ctx.on_option_update(Box::new(move |ctx, name| {
                seen.borrow_mut()
                    .push_str(&format!("{name}={} ", ctx.get_option(name)));
            }));
        }
        assert!(!ctx.get_option("ascii_mode"));
        ctx.set_option("ascii_mode", true);
        assert!(ctx.get_option("ascii_mode"));
        assert_eq!(&*seen.borrow(), "ascii_mode=true ");
    }

    #[test]
    fn dirty_flag_drains_once() {
        let mut ctx = Context::new();
        ctx.push_input('a');
        assert!(ctx.take_dirty());
        assert!(!ctx.take_dirty());
    }
}
