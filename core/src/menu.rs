//! Menu: merges the candidate streams of several translations into one
//! ranked, deduplicated, paged list.
//!
//! Candidates are pulled lazily: at each step the translation whose head
//! candidate compares smallest emits it. The default order is
//! `(kind, weight descending, text)`.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::sync::Arc;

use ahash::AHashSet;

use crate::candidate::Candidate;
use crate::engine::Filter;
use crate::translation::Translation;

/// Default candidate order: kind, then weight descending, then text.
pub fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    a.kind
        .cmp(&b.kind)
        .then_with(|| {
            b.weight()
                .partial_cmp(&a.weight())
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.text().cmp(b.text()))
}

/// One page of a menu.
#[derive(Debug, Clone)]
pub struct Page {
    pub page_size: usize,
    pub page_no: usize,
    pub is_last_page: bool,
    pub candidates: Vec<Arc<Candidate>>,
}

struct MenuInner {
    translations: Vec<Box<dyn Translation>>,
    filters: Vec<Arc<dyn Filter>>,
    candidates: Vec<Arc<Candidate>>,
    seen: AHashSet<String>,
}

impl MenuInner {
    /// Pull until `count` candidates are materialized or every source dries
    /// up. Returns the number materialized.
    fn prepare(&mut self, count: usize) -> usize {
        'pull: while self.candidates.len() < count {
            self.translations.retain(|t| !t.exhausted());
            let mut best: Option<usize> = None;
            for (i, translation) in self.translations.iter().enumerate() {
                let head = match translation.peek() {
                    Some(head) => head,
                    None => continue,
                };
                best = match best {
                    Some(j) => {
                        let other = self.translations[j].peek().unwrap();
                        if compare_candidates(&head, &other) == Ordering::Less {
                            Some(i)
                        } else {
                            Some(j)
                        }
                    }
                    None => Some(i),
                };
            }
            let index = match best {
                Some(index) => index,
                None => break,
            };
            let candidate = match self.translations[index].next() {
                Some(candidate) => candidate,
                None => continue,
            };
            if !self.seen.insert(candidate.text().to_string()) {
                continue;
            }
            let mut candidate = candidate;
            for filter in &self.filters {
                candidate = match filter.apply(candidate) {
                    Some(filtered) => filtered,
                    None => continue 'pull,
                };
            }
            self.candidates.push(candidate);
        }
        self.candidates.len()
    }
}

pub struct Menu {
    inner: RefCell<MenuInner>,
}

impl Menu {
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Menu {
            inner: RefCell::new(MenuInner {
                translations: Vec::new(),
                filters,
                candidates: Vec::new(),
                seen: AHashSet::new(),
            }),
        }
    }

    pub fn add_translation(&mut self, translation: Box<dyn Translation>) {
        self.inner.get_mut().translations.push(translation);
    }

    /// Materialize at least `count` candidates if available.
    pub fn prepare(&self, count: usize) -> usize {
        self.inner.borrow_mut().prepare(count)
    }

    /// Number of candidates materialized so far.
    pub fn candidate_count(&self) -> usize {
        self.inner.borrow().candidates.len()
    }

    pub fn get_candidate_at(&self, index: usize) -> Option<Arc<Candidate>> {
        let mut inner = self.inner.borrow_mut();
        inner.prepare(index + 1);
        inner.candidates.get(index).cloned()
    }

    /// Materialize a page window. Returns `None` when the page is beyond the
    /// available candidates.
    pub fn create_page(&self, page_size: usize, page_no: usize) -> Option<Page> {
        if page_size == 0 {
            return None;
        }
        let start = page_size * page_no;
        let mut inner = self.inner.borrow_mut();
        let prepared = inner.prepare(start + page_size + 1);
        if prepared <= start {
            return None;
        }
        let end = (start + page_size).min(prepared);
        Some(Page {
            page_size,
            page_no,
            is_last_page: prepared <= start + page_size,
            candidates: inner.candidates[start..end].to_vec(),
        })
    }
}

impl std::fmt::Debug for Menu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Menu")
            .field("candidates", &self.candidate_count())
            .finish()
    }
}
