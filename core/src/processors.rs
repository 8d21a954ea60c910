//! Built-in processors: the fluency editor (composition editing keys) and
//! the key binder (schema-configured key rewrites).

use crate::context::Context;
use crate::engine::{EngineEnv, ProcessResult, Processor};
use crate::key_event::{keysym, KeyEvent};

/// Printable keys build up the composition; editing keys drive the
/// selection state machine; Space selects and commits once the whole input
/// is converted.
pub struct FluencyEditor {
    alphabet: String,
    delimiters: String,
    page_size: usize,
}

impl FluencyEditor {
    pub fn construct(env: &EngineEnv) -> Box<dyn Processor> {
        Box::new(FluencyEditor {
            alphabet: env.schema.speller.alphabet.clone(),
            delimiters: env.schema.speller.delimiter.clone(),
            page_size: env.schema.page_size(),
        })
    }

    fn current_highlight(ctx: &Context) -> Option<(usize, usize)> {
        let segment = ctx.composition().segments().last()?;
        let menu = segment.menu.as_ref()?;
        Some((segment.selected_index, menu.candidate_count()))
    }

    fn move_highlight(&self, ctx: &mut Context, delta: isize) -> bool {
        let (index, _) = match Self::current_highlight(ctx) {
            Some(state) => state,
            None => return false,
        };
        let target = index as isize + delta;
        if target < 0 {
            return false;
        }
        ctx.highlight(target as usize)
    }

    fn select_on_page(&self, ctx: &mut Context, digit: usize) -> bool {
        let (index, _) = match Self::current_highlight(ctx) {
            Some(state) => state,
            None => return false,
        };
        let page_start = index / self.page_size * self.page_size;
        ctx.select(page_start + digit - 1)
    }
}

impl Processor for FluencyEditor {
    fn process_key(&mut self, ctx: &mut Context, key: &mut KeyEvent) -> ProcessResult {
        if key.release() || key.ctrl() || key.alt() {
            return ProcessResult::Rejected;
        }
        let ch = key.keycode;

        if ch == keysym::XK_SPACE {
            if !ctx.is_composing() {
                return ProcessResult::Noop;
            }
            if !ctx.confirm_current_selection() {
                ctx.commit();
            }
            return ProcessResult::Accepted;
        }

        if ctx.is_composing() {
            match ch {
                keysym::XK_RETURN => {
                    if key.shift() {
                        ctx.commit_raw_input();
                    } else {
                        ctx.commit();
                    }
                    return ProcessResult::Accepted;
                }
                keysym::XK_BACKSPACE => {
                    let _ = ctx.reopen_previous_segment()
                        || ctx.reopen_previous_selection()
                        || ctx.pop_input();
                    return ProcessResult::Accepted;
                }
                keysym::XK_DELETE | keysym::XK_KP_DELETE => {
                    ctx.delete_input();
                    return ProcessResult::Accepted;
                }
                keysym::XK_ESCAPE => {
                    ctx.clear();
                    return ProcessResult::Accepted;
                }
                keysym::XK_UP => {
                    self.move_highlight(ctx, -1);
                    return ProcessResult::Accepted;
                }
                keysym::XK_DOWN => {
                    self.move_highlight(ctx, 1);
                    return ProcessResult::Accepted;
                }
                keysym::XK_PAGE_UP => {
                    self.move_highlight(ctx, -(self.page_size as isize));
                    return ProcessResult::Accepted;
                }
                keysym::XK_PAGE_DOWN => {
                    self.move_highlight(ctx, self.page_size as isize);
                    return ProcessResult::Accepted;
                }
                keysym::XK_LEFT => {
                    let pos = ctx.caret_pos();
                    ctx.set_caret_pos(pos.saturating_sub(1));
                    return ProcessResult::Accepted;
                }
                keysym::XK_RIGHT => {
                    let pos = ctx.caret_pos();
                    ctx.set_caret_pos(pos + 1);
                    return ProcessResult::Accepted;
                }
                keysym::XK_HOME => {
                    ctx.set_caret_pos(0);
                    return ProcessResult::Accepted;
                }
                keysym::XK_END => {
                    let len = ctx.input().len();
                    ctx.set_caret_pos(len);
                    return ProcessResult::Accepted;
                }
                _ => {}
            }
            if let Some(digit) = key
                .printable_char()
                .filter(|c| ('1'..='9').contains(c))
                .and_then(|c| c.to_digit(10))
            {
                if ctx.has_menu() && self.select_on_page(ctx, digit as usize) {
                    return ProcessResult::Accepted;
                }
            }
        }

        if let Some(printable) = key.printable_char() {
            let is_letter = self.alphabet.contains(printable);
            let is_delimiter = ctx.is_composing() && self.delimiters.contains(printable);
            if is_letter || is_delimiter {
                ctx.push_input(printable);
                ctx.confirm_previous_selection();
                return ProcessResult::Accepted;
            }
            if ctx.is_composing() && (0x20..0x7f).contains(&ch) {
                // other printable keys extend the raw input
                ctx.push_input(printable);
                return ProcessResult::Accepted;
            }
        }

        ProcessResult::Noop
    }
}

struct KeyBinding {
    when: String,
    pattern: KeyEvent,
    target: KeyEvent,
}

/// Rewrites matching key events according to the schema's
/// `key_binder/bindings` before the rest of the pipeline sees them.
pub struct KeyBinder {
    bindings: Vec<KeyBinding>,
}

impl KeyBinder {
    pub fn construct(env: &EngineEnv) -> Box<dyn Processor> {
        let mut bindings = Vec::new();
        for (i, binding) in env.schema.key_binder.bindings.iter().enumerate() {
            let pattern = KeyEvent::parse(&binding.accept);
            let target = KeyEvent::parse(&binding.send);
            match (pattern, target) {
                (Ok(pattern), Ok(target)) => bindings.push(KeyBinding {
                    when: binding.when.clone(),
                    pattern,
                    target,
                }),
                _ => tracing::warn!(index = i, "invalid key binding"),
            }
        }
        Box::new(KeyBinder { bindings })
    }

    fn condition_met(ctx: &Context, when: &str) -> bool {
        match when {
            "always" => true,
            "composing" => ctx.is_composing(),
            "has_menu" => ctx.has_menu() && !ctx.get_option("ascii_mode"),
            "paging" => ctx
                .composition()
                .segments()
                .last()
                .map_or(false, |s| s.has_tag("paging")),
            _ => false,
        }
    }
}

impl Processor for KeyBinder {
    fn process_key(&mut self, ctx: &mut Context, key: &mut KeyEvent) -> ProcessResult {
        for binding in &self.bindings {
            if *key == binding.pattern && Self::condition_met(ctx, &binding.when) {
                tracing::debug!(
                    from = %binding.pattern.repr(),
                    to = %binding.target.repr(),
                    "key binding applied"
                );
                *key = binding.target;
                break;
            }
        }
        ProcessResult::Noop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    fn env_schema(toml: &str) -> Schema {
        Schema::from_toml_str(toml).unwrap()
    }

    fn editor(schema: &Schema) -> Box<dyn Processor> {
        let env = EngineEnv {
            schema,
            shared_data_dir: std::path::Path::new("."),
            user_data_dir: std::path::Path::new("."),
        };
        FluencyEditor::construct(&env)
    }

    #[test]
    fn letters_feed_the_input() {
        let schema = env_schema("");
        let mut fluency = editor(&schema);
        let mut ctx = Context::new();
        for ch in ['h', 'a', 'o'] {
            let mut key = KeyEvent::new(ch as i32, 0);
            assert_eq!(
                fluency.process_key(&mut ctx, &mut key),
                ProcessResult::Accepted
            );
        }
        assert_eq!(ctx.input(), "hao");
    }

    #[test]
    fn non_alphabet_keys_pass_through_when_idle() {
        let schema = env_schema("");
        let mut fluency = editor(&schema);
        let mut ctx = Context::new();
        let mut key = KeyEvent::new('1' as i32, 0);
        assert_eq!(fluency.process_key(&mut ctx, &mut key), ProcessResult::Noop);
        let mut space = KeyEvent::new(keysym::XK_SPACE, 0);
        assert_eq!(
            fluency.process_key(&mut ctx, &mut space),
            ProcessResult::Noop
        );
    }

    #[test]
    fn escape_clears_and_backspace_pops() {
        let schema = env_schema("");
        let mut fluency = editor(&schema);
        let mut ctx = Context::new();
        let mut key = KeyEvent::new('a' as i32, 0);
        fluency.process_key(&mut ctx, &mut key);
        let mut backspace = KeyEvent::new(keysym::XK_BACKSPACE, 0);
        fluency.process_key(&mut ctx, &mut backspace);
        assert_eq!(ctx.input(), "");

        fluency.process_key(&mut ctx, &mut key);
        let mut escape = KeyEvent::new(keysym::XK_ESCAPE, 0);
        fluency.process_key(&mut ctx, &mut escape);
        assert!(!ctx.is_composing());
    }

    #[test]
    fn key_binder_rewrites_matching_keys() {
        let schema = env_schema(
            r#"
            [[key_binder.bindings]]
            when = "composing"
            accept = "Tab"
            send = "Page_Down"
            "#,
        );
        let env = EngineEnv {
            schema: &schema,
            shared_data_dir: std::path::Path::new("."),
            user_data_dir: std::path::Path::new("."),
        };
        let mut binder = KeyBinder::construct(&env);
        let mut ctx = Context::new();
        ctx.push_input('a');

        let mut key = KeyEvent::new(keysym::XK_TAB, 0);
        assert_eq!(binder.process_key(&mut ctx, &mut key), ProcessResult::Noop);
        assert_eq!(key.keycode, keysym::XK_PAGE_DOWN);

        // not composing: the binding no longer matches
        ctx.clear();
        let mut key = KeyEvent::new(keysym::XK_TAB, 0);
        binder.process_key(&mut ctx, &mut key);
        assert_eq!(key.keycode, keysym::XK_TAB);
    }
}
