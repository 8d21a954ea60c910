//! Service: the session boundary the host glue talks to.
//!
//! A session owns one engine; the service owns the sessions and translates
//! between raw key events / snapshots and the engine's state. All methods
//! are synchronous; a session must never be entered reentrantly.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::composition::Preedit;
use crate::engine::{register_default_components, Engine};
use crate::key_event::{parse_key_sequence, KeyEvent};
use crate::schema::Schema;

pub type SessionId = u64;

/// Sessions idle longer than this are considered stale.
const SESSION_LIFE_SPAN: Duration = Duration::from_secs(300);

/// Where the service finds schemas and dictionaries, and where user data
/// lives.
#[derive(Debug, Clone)]
pub struct Traits {
    pub shared_data_dir: PathBuf,
    pub user_data_dir: PathBuf,
    /// Schema loaded into new sessions: `<default_schema>.schema.toml`.
    pub default_schema: String,
}

/// Snapshot of the composition for the host UI.
#[derive(Debug, Clone, Default)]
pub struct CompositionSnapshot {
    pub is_composing: bool,
    pub preedit: String,
    pub cursor_pos: usize,
    pub sel_start: usize,
    pub sel_end: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CandidateSnapshot {
    pub text: String,
    pub comment: String,
}

#[derive(Debug, Clone, Default)]
pub struct MenuSnapshot {
    pub page_size: usize,
    pub page_no: usize,
    pub is_last_page: bool,
    pub highlighted_index: usize,
    pub candidates: Vec<CandidateSnapshot>,
}

#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    pub composition: CompositionSnapshot,
    pub menu: MenuSnapshot,
}

#[derive(Debug, Clone, Default)]
pub struct Status {
    pub schema_id: String,
    pub schema_name: String,
    pub is_disabled: bool,
    pub is_ascii_mode: bool,
    pub is_simplified: bool,
    pub is_composing: bool,
    pub is_full_shape: bool,
}

struct Session {
    engine: Engine,
    last_active: Instant,
}

pub struct Service {
    traits: Traits,
    sessions: HashMap<SessionId, Session>,
    next_session_id: SessionId,
}

impl Service {
    /// Initialize the service. Components register once per process.
    pub fn new(traits: Traits) -> Service {
        register_default_components();
        Service {
            traits,
            sessions: HashMap::new(),
            next_session_id: 1,
        }
    }

    pub fn traits(&self) -> &Traits {
        &self.traits
    }

    fn schema_path(&self) -> Option<PathBuf> {
        let file_name = format!("{}.schema.toml", self.traits.default_schema);
        let user = self.traits.user_data_dir.join(&file_name);
        if user.exists() {
            return Some(user);
        }
        let shared = self.traits.shared_data_dir.join(&file_name);
        if shared.exists() {
            return Some(shared);
        }
        None
    }

    /// Create a session over the default schema. A missing or unreadable
    /// schema is the one fatal condition here; a missing dictionary is not.
    pub fn create_session(&mut self) -> anyhow::Result<SessionId> {
        let path = self
            .schema_path()
            .ok_or_else(|| anyhow::anyhow!("schema '{}' not found", self.traits.default_schema))?;
        let schema = Schema::load(&path)?;
        let engine = Engine::new(
            schema,
            &self.traits.shared_data_dir,
            &self.traits.user_data_dir,
        );
        let id = self.next_session_id;
        self.next_session_id += 1;
        self.sessions.insert(
            id,
            Session {
                engine,
                last_active: Instant::now(),
            },
        );
        tracing::debug!(session_id = id, "created session");
        Ok(id)
    }

    pub fn destroy_session(&mut self, id: SessionId) -> bool {
        self.sessions.remove(&id).is_some()
    }

    pub fn find_session(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop sessions that have been idle past their life span.
    pub fn cleanup_stale_sessions(&mut self) -> usize {
        let before = self.sessions.len();
        let now = Instant::now();
        self.sessions
            .retain(|_, s| now.duration_since(s.last_active) < SESSION_LIFE_SPAN);
        before - self.sessions.len()
    }

    pub fn cleanup_all_sessions(&mut self) {
        self.sessions.clear();
    }

    fn session_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        let session = self.sessions.get_mut(&id)?;
        session.last_active = Instant::now();
        Some(session)
    }

    /// Feed one key event; true when the session consumed it.
    pub fn process_key(&mut self, id: SessionId, keycode: i32, mask: u32) -> bool {
        match self.session_mut(id) {
            Some(session) => session.engine.process_key(KeyEvent::new(keycode, mask)),
            None => false,
        }
    }

    /// Replay a textual key sequence. A parse error changes no state.
    pub fn simulate_key_sequence(&mut self, id: SessionId, sequence: &str) -> anyhow::Result<()> {
        let events = parse_key_sequence(sequence)?;
        let session = self
            .session_mut(id)
            .ok_or_else(|| anyhow::anyhow!("no such session: {id}"))?;
        for event in events {
            session.engine.process_key(event);
        }
        Ok(())
    }

    /// Committed text, if any; reading it resets the commit.
    pub fn get_commit(&mut self, id: SessionId) -> Option<String> {
        let session = self.session_mut(id)?;
        let text = session.engine.context_mut().take_pending_commit();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn get_context(&mut self, id: SessionId) -> Option<ContextSnapshot> {
        let session = self.sessions.get_mut(&id)?;
        let page_size = session.engine.schema().page_size();
        let ctx = session.engine.context();
        let mut snapshot = ContextSnapshot::default();

        if ctx.is_composing() {
            let Preedit {
                text,
                cursor_pos,
                sel_start,
                sel_end,
            } = ctx.get_preedit();
            snapshot.composition = CompositionSnapshot {
                is_composing: true,
                preedit: text,
                cursor_pos,
                sel_start,
                sel_end,
            };
        }

        if let Some(segment) = ctx.composition().segments().last() {
            if let Some(menu) = &segment.menu {
                let page_no = segment.selected_index / page_size;
                if let Some(page) = menu.create_page(page_size, page_no) {
                    snapshot.menu = MenuSnapshot {
                        page_size,
                        page_no,
                        is_last_page: page.is_last_page,
                        highlighted_index: segment.selected_index % page_size,
                        candidates: page
                            .candidates
                            .iter()
                            .map(|c| CandidateSnapshot {
                                text: c.text().to_string(),
                                comment: c.comment().to_string(),
                            })
                            .collect(),
                    };
                }
            }
        }
        Some(snapshot)
    }

    pub fn get_status(&mut self, id: SessionId) -> Option<Status> {
        let session = self.sessions.get_mut(&id)?;
        let schema = session.engine.schema();
        let ctx = session.engine.context();
        Some(Status {
            schema_id: schema.schema_id().to_string(),
            schema_name: schema.schema_name().to_string(),
            is_disabled: ctx.get_option("disabled"),
            is_ascii_mode: ctx.get_option("ascii_mode"),
            is_simplified: ctx.get_option("simplified"),
            is_composing: ctx.is_composing(),
            is_full_shape: ctx.get_option("full_shape"),
        })
    }

    /// Set a runtime option on a session (`ascii_mode`, `simplified`, ...).
    pub fn set_option(&mut self, id: SessionId, name: &str, value: bool) -> bool {
        match self.session_mut(id) {
            Some(session) => {
                session.engine.context_mut().set_option(name, value);
                true
            }
            None => false,
        }
    }

    /// Direct engine access for embedders that need more than snapshots.
    pub fn engine_mut(&mut self, id: SessionId) -> Option<&mut Engine> {
        self.session_mut(id).map(|s| &mut s.engine)
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.cleanup_all_sessions();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn traits(dir: &std::path::Path) -> Traits {
        Traits {
            shared_data_dir: dir.to_path_buf(),
            user_data_dir: dir.to_path_buf(),
            default_schema: "r10n_test".to_string(),
        }
    }

    fn write_schema(dir: &std::path::Path) {
        let mut f = std::fs::File::create(dir.join("r10n_test.schema.toml")).unwrap();
        writeln!(
            f,
            r#"
            [schema]
            schema_id = "r10n_test"
            name = "Test Schema"

            [translator]
            dictionary = "missing_dict"
            "#
        )
        .unwrap();
    }

    #[test]
    fn missing_schema_fails_session_creation() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = Service::new(traits(dir.path()));
        assert!(service.create_session().is_err());
    }

    #[test]
    fn sessions_are_created_found_and_destroyed() {
        let dir = tempfile::tempdir().unwrap();
        write_schema(dir.path());
        let mut service = Service::new(traits(dir.path()));
        let id = service.create_session().unwrap();
        assert!(service.find_session(id));
        assert!(!service.find_session(id + 1));
        assert!(service.destroy_session(id));
        assert!(!service.destroy_session(id));
    }

    #[test]
    fn without_a_dictionary_raw_letters_commit() {
        let dir = tempfile::tempdir().unwrap();
        write_schema(dir.path());
        let mut service = Service::new(traits(dir.path()));
        let id = service.create_session().unwrap();

        service.simulate_key_sequence(id, "hao{Return}").unwrap();
        assert_eq!(service.get_commit(id).as_deref(), Some("hao"));
        assert_eq!(service.get_commit(id), None);
    }

    #[test]
    fn malformed_key_sequence_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_schema(dir.path());
        let mut service = Service::new(traits(dir.path()));
        let id = service.create_session().unwrap();

        assert!(service.simulate_key_sequence(id, "ha{Oops").is_err());
        let status = service.get_status(id).unwrap();
        assert!(!status.is_composing);
    }

    #[test]
    fn status_reflects_schema_and_options() {
        let dir = tempfile::tempdir().unwrap();
        write_schema(dir.path());
        let mut service = Service::new(traits(dir.path()));
        let id = service.create_session().unwrap();

        let status = service.get_status(id).unwrap();
        assert_eq!(status.schema_id, "r10n_test");
        assert_eq!(status.schema_name, "Test Schema");
        assert!(!status.is_ascii_mode);

        service.set_option(id, "ascii_mode", true);
        assert!(service.get_status(id).unwrap().is_ascii_mode);
    }

    #[test]
    fn stale_sessions_are_cleaned_up_lazily() {
        let dir = tempfile::tempdir().unwrap();
        write_schema(dir.path());
        let mut service = Service::new(traits(dir.path()));
        let id = service.create_session().unwrap();
        // freshly created sessions are not stale
        assert_eq!(service.cleanup_stale_sessions(), 0);
        assert!(service.find_session(id));
    }
}
