//! Engine: wires the schema-configured pipelines (processors, segmentors,
//! translators, filters) around a [`Context`].
//!
//! Components are looked up by name in a process-wide registry, so schemas
//! can compose pipelines from built-in and externally registered parts.
//! After every processor dispatch the engine reacts to the context's state
//! changes: a selection is finished first, then a dirty input triggers
//! recomposition (segment, then translate).

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::candidate::Candidate;
use crate::composition::Composition;
use crate::context::Context;
use crate::key_event::KeyEvent;
use crate::menu::Menu;
use crate::schema::Schema;
use crate::segmentation::{Segmentation, SegmentStatus};
use crate::translation::Translation;

/// Outcome of a processor looking at a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    /// Explicitly not handled; stop the pipeline, give the key back.
    Rejected,
    /// Consumed.
    Accepted,
    /// Not interested; let the next processor try.
    Noop,
}

pub trait Processor {
    /// May rewrite `key` in place (key bindings) and return `Noop` to let
    /// the rest of the pipeline see the rewritten event.
    fn process_key(&mut self, ctx: &mut Context, key: &mut KeyEvent) -> ProcessResult;
}

pub trait Segmentor {
    /// Recognize a segment at the segmentation's current position.
    /// Returns false to stop this round of segmentors.
    fn proceed(&mut self, segmentation: &mut Segmentation) -> bool;
}

pub trait Translator {
    fn query(&self, input: &str, segment: &crate::segmentation::Segment)
        -> Option<Box<dyn Translation>>;

    /// An observer to run when the context commits, while the composition
    /// is still intact.
    fn commit_observer(&self) -> Option<crate::context::ContextListener> {
        None
    }
}

pub trait Filter {
    /// Transform or drop a candidate before it enters a menu page.
    fn apply(&self, candidate: Arc<Candidate>) -> Option<Arc<Candidate>>;
}

/// What a component constructor gets to look at.
pub struct EngineEnv<'a> {
    pub schema: &'a Schema,
    pub shared_data_dir: &'a Path,
    pub user_data_dir: &'a Path,
}

pub type ProcessorCtor = fn(&EngineEnv) -> Box<dyn Processor>;
pub type SegmentorCtor = fn(&EngineEnv) -> Box<dyn Segmentor>;
pub type TranslatorCtor = fn(&EngineEnv) -> Option<Box<dyn Translator>>;
pub type FilterCtor = fn(&EngineEnv) -> Option<Arc<dyn Filter>>;

#[derive(Default)]
struct ComponentRegistry {
    processors: HashMap<String, ProcessorCtor>,
    segmentors: HashMap<String, SegmentorCtor>,
    translators: HashMap<String, TranslatorCtor>,
    filters: HashMap<String, FilterCtor>,
}

static REGISTRY: Lazy<Mutex<ComponentRegistry>> =
    Lazy::new(|| Mutex::new(ComponentRegistry::default()));

pub fn register_processor(name: &str, ctor: ProcessorCtor) {
    REGISTRY
        .lock()
        .unwrap()
        .processors
        .insert(name.to_string(), ctor);
}

pub fn register_segmentor(name: &str, ctor: SegmentorCtor) {
    REGISTRY
        .lock()
        .unwrap()
        .segmentors
        .insert(name.to_string(), ctor);
}

pub fn register_translator(name: &str, ctor: TranslatorCtor) {
    REGISTRY
        .lock()
        .unwrap()
        .translators
        .insert(name.to_string(), ctor);
}

pub fn register_filter(name: &str, ctor: FilterCtor) {
    REGISTRY
        .lock()
        .unwrap()
        .filters
        .insert(name.to_string(), ctor);
}

/// Register the built-in components. Idempotent; called by engine and
/// service construction.
pub fn register_default_components() {
    register_processor("key_binder", crate::processors::KeyBinder::construct);
    register_processor("fluency_editor", crate::processors::FluencyEditor::construct);
    register_segmentor("abc_segmentor", crate::segmentors::AbcSegmentor::construct);
    register_translator("r10n_translator", crate::translator::R10nTranslator::construct);
    register_translator("echo_translator", crate::translator::EchoTranslator::construct);
}

pub struct Engine {
    schema: Schema,
    context: Context,
    processors: Vec<Box<dyn Processor>>,
    segmentors: Vec<Box<dyn Segmentor>>,
    translators: Vec<Box<dyn Translator>>,
    filters: Vec<Arc<dyn Filter>>,
}

impl Engine {
    pub fn new(schema: Schema, shared_data_dir: &Path, user_data_dir: &Path) -> Engine {
        register_default_components();
        let env = EngineEnv {
            schema: &schema,
            shared_data_dir,
            user_data_dir,
        };
        let registry = REGISTRY.lock().unwrap();

        let mut processors = Vec::new();
        for name in &schema.engine.processors {
            match registry.processors.get(name) {
                Some(ctor) => processors.push(ctor(&env)),
                None => tracing::warn!(name, "unknown processor"),
            }
        }
        let mut segmentors = Vec::new();
        for name in &schema.engine.segmentors {
            match registry.segmentors.get(name) {
                Some(ctor) => segmentors.push(ctor(&env)),
                None => tracing::warn!(name, "unknown segmentor"),
            }
        }
        let mut translators = Vec::new();
        for name in &schema.engine.translators {
            match registry.translators.get(name) {
                Some(ctor) => match ctor(&env) {
                    Some(translator) => translators.push(translator),
                    None => tracing::warn!(name, "translator not created"),
                },
                None => tracing::warn!(name, "unknown translator"),
            }
        }
        let mut filters = Vec::new();
        for name in &schema.engine.filters {
            match registry.filters.get(name) {
                Some(ctor) => match ctor(&env) {
                    Some(filter) => filters.push(filter),
                    None => tracing::warn!(name, "filter not created"),
                },
                None => tracing::warn!(name, "unknown filter"),
            }
        }
        drop(registry);

        let mut context = Context::new();
        for translator in &translators {
            if let Some(observer) = translator.commit_observer() {
                context.on_commit(observer);
            }
        }

        Engine {
            schema,
            context,
            processors,
            segmentors,
            translators,
            filters,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Run the key through the processor pipeline, then react to whatever
    /// the processors did to the context.
    pub fn process_key(&mut self, key: KeyEvent) -> bool {
        let mut key = key;
        let mut handled = false;
        for processor in &mut self.processors {
            match processor.process_key(&mut self.context, &mut key) {
                ProcessResult::Accepted => {
                    handled = true;
                    break;
                }
                ProcessResult::Rejected => {
                    handled = false;
                    break;
                }
                ProcessResult::Noop => continue,
            }
        }
        if self.context.take_select_pending() {
            self.context.finish_selection();
        }
        if self.context.take_dirty() {
            self.compose();
            // a selection may have triggered the recomposition that just ran
            self.context.take_dirty();
        }
        handled
    }

    /// Rebuild segmentation and menus after the input changed: keep the
    /// settled prefix, wipe non-confirmed segments, run segmentors until
    /// the cursor stops advancing, translate fresh segments.
    fn compose(&mut self) {
        let ctx = &mut self.context;
        ctx.clear_non_confirmed_composition();
        let input = ctx.input().to_string();
        let mut segmentation = ctx.take_composition().into_segmentation();
        segmentation.set_input(input.clone());
        // an edit may have invalidated settled segments past the new end
        while segmentation
            .segments()
            .last()
            .map_or(false, |s| s.end > input.len())
        {
            segmentation.segments_mut().pop();
        }
        // reopen a spot after the settled prefix so segmentors do not touch it
        segmentation.forward();

        if !input.is_empty() {
            loop {
                if segmentation.has_finished_segmentation() {
                    break;
                }
                let start = segmentation.get_current_start_position();
                let end = segmentation.get_current_end_position();
                for segmentor in &mut self.segmentors {
                    if !segmentor.proceed(&mut segmentation) {
                        break;
                    }
                }
                if start == segmentation.get_current_start_position()
                    && end == segmentation.get_current_end_position()
                {
                    break;
                }
                if !segmentation.has_finished_segmentation() {
                    segmentation.forward();
                }
            }
            segmentation.trim();

            for segment in segmentation.segments_mut() {
                if segment.status >= SegmentStatus::Selected
                    || segment.menu.is_some()
                    || segment.start == segment.end
                {
                    continue;
                }
                let mut menu = Menu::new(self.filters.clone());
                for translator in &self.translators {
                    if let Some(translation) = translator.query(&input, segment) {
                        menu.add_translation(translation);
                    }
                }
                if menu.prepare(1) > 0 {
                    segment.menu = Some(menu);
                    segment.status = SegmentStatus::Guess;
                    segment.selected_index = 0;
                }
            }
        }

        ctx.set_composition(Composition::from(segmentation));
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("schema_id", &self.schema.schema_id())
            .field("processors", &self.processors.len())
            .field("segmentors", &self.segmentors.len())
            .field("translators", &self.translators.len())
            .field("filters", &self.filters.len())
            .finish()
    }
}
