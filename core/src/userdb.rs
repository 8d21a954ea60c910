//! UserDb: a persistent, byte-ordered key/value store for learned phrases,
//! backed by redb.
//!
//! Keys are UTF-8 strings sorted bytewise; the reserved `"\x01/..."` prefix
//! sorts strictly before every phrase key. The store supports the seekable
//! forward scans the user dictionary's depth-first lookup needs, and a plain
//! text snapshot (`key\tvalue` per line) for backup and transfer.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use once_cell::sync::Lazy;
use redb::{Database, ReadOnlyTable, TableDefinition};

const DATA: TableDefinition<'static, &'static str, &'static str> =
    TableDefinition::new("user_data");

/// Reserved key holding the monotonic commit tick.
pub const TICK_KEY: &str = "\x01/tick";
const DB_NAME_KEY: &str = "\x01/db_name";

#[derive(Debug, thiserror::Error)]
pub enum UserDbError {
    #[error("storage error: {0}")]
    Db(#[from] redb::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn db_err<E: Into<redb::Error>>(e: E) -> UserDbError {
    UserDbError::Db(e.into())
}

pub struct UserDb {
    db: Database,
    path: PathBuf,
}

impl std::fmt::Debug for UserDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDb").field("path", &self.path).finish()
    }
}

static DB_POOL: Lazy<Mutex<HashMap<PathBuf, Weak<UserDb>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

impl UserDb {
    /// Open (creating if missing) the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, UserDbError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        let db = Database::create(path).map_err(db_err)?;
        let userdb = UserDb {
            db,
            path: path.to_path_buf(),
        };
        if userdb.fetch(DB_NAME_KEY).is_none() {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            userdb.update(DB_NAME_KEY, &name)?;
        }
        Ok(userdb)
    }

    /// Open through the process-wide pool, so sessions naming the same db
    /// share one handle (writes are serialized by redb internally).
    pub fn shared<P: AsRef<Path>>(path: P) -> Result<Arc<UserDb>, UserDbError> {
        let path = path.as_ref().to_path_buf();
        let mut pool = DB_POOL.lock().unwrap();
        if let Some(db) = pool.get(&path).and_then(Weak::upgrade) {
            return Ok(db);
        }
        let db = Arc::new(UserDb::open(&path)?);
        pool.insert(path, Arc::downgrade(&db));
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fetch(&self, key: &str) -> Option<String> {
        let txn = self.db.begin_read().ok()?;
        let table = match txn.open_table(DATA) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "user db read failed");
                return None;
            }
        };
        table
            .get(key)
            .ok()
            .flatten()
            .map(|v| v.value().to_string())
    }

    pub fn update(&self, key: &str, value: &str) -> Result<(), UserDbError> {
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(DATA).map_err(db_err)?;
            table.insert(key, value).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    pub fn erase(&self, key: &str) -> Result<(), UserDbError> {
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(DATA).map_err(db_err)?;
            table.remove(key).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    /// A read snapshot with ordered seeks. The accessor sees the store as of
    /// its creation.
    pub fn accessor(&self) -> Option<UserDbAccessor> {
        let txn = self.db.begin_read().ok()?;
        match txn.open_table(DATA) {
            Ok(table) => Some(UserDbAccessor { table }),
            Err(redb::TableError::TableDoesNotExist(_)) => None,
            Err(e) => {
                tracing::warn!(error = %e, "user db accessor failed");
                None
            }
        }
    }

    /// Dump every record as `key\tvalue` lines. Returns the record count.
    pub fn snapshot_to<P: AsRef<Path>>(&self, path: P) -> Result<usize, UserDbError> {
        let accessor = match self.accessor() {
            Some(accessor) => accessor,
            None => {
                std::fs::write(path, b"")?;
                return Ok(0);
            }
        };
        let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
        let mut count = 0;
        let mut cursor: Option<String> = None;
        loop {
            let record = match &cursor {
                None => accessor.seek(""),
                Some(key) => accessor.next_after(key),
            };
            let (key, value) = match record {
                Some(kv) => kv,
                None => break,
            };
            writeln!(out, "{key}\t{value}")?;
            cursor = Some(key);
            count += 1;
        }
        out.flush()?;
        Ok(count)
    }

    /// Re-import a snapshot, most-committed entries first.
    pub fn restore_from<P: AsRef<Path>>(&self, path: P) -> Result<usize, UserDbError> {
        let file = std::fs::File::open(path)?;
        let mut records: Vec<(String, String, i32)> = Vec::new();
        for line in std::io::BufReader::new(file).lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            // the key itself may contain a tab; the value never does
            let (key, value) = match line.rsplit_once('\t') {
                Some(kv) => kv,
                None => {
                    tracing::warn!("skipping malformed snapshot line");
                    continue;
                }
            };
            let commits = value
                .split(' ')
                .find_map(|kv| kv.strip_prefix("c="))
                .and_then(|c| c.parse::<i32>().ok())
                .unwrap_or(i32::MAX);
            records.push((key.to_string(), value.to_string(), commits));
        }
        records.sort_by(|a, b| b.2.cmp(&a.2));
        let count = records.len();
        for (key, value, _) in records {
            self.update(&key, &value)?;
        }
        Ok(count)
    }
}

/// Point-in-time view of the store with ordered lookups.
pub struct UserDbAccessor {
    table: ReadOnlyTable<&'static str, &'static str>,
}

impl UserDbAccessor {
    /// First record whose key is `>= from`.
    pub fn seek(&self, from: &str) -> Option<(String, String)> {
        let mut range = self.table.range(from..).ok()?;
        let (k, v) = range.next()?.ok()?;
        Some((k.value().to_string(), v.value().to_string()))
    }

    /// First record whose key is strictly after `key`.
    pub fn next_after(&self, key: &str) -> Option<(String, String)> {
        let mut range = self
            .table
            .range::<&str>((Bound::Excluded(key), Bound::Unbounded))
            .ok()?;
        let (k, v) = range.next()?.ok()?;
        Some((k.value().to_string(), v.value().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp(dir: &Path, name: &str) -> UserDb {
        UserDb::open(dir.join(name)).expect("open")
    }

    #[test]
    fn fetch_update_erase_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp(dir.path(), "t.userdb");
        assert_eq!(db.fetch("hao \t好"), None);
        db.update("hao \t好", "c=1 d=0.5 t=3").unwrap();
        assert_eq!(db.fetch("hao \t好").as_deref(), Some("c=1 d=0.5 t=3"));
        db.erase("hao \t好").unwrap();
        assert_eq!(db.fetch("hao \t好"), None);
    }

    #[test]
    fn accessor_walks_in_byte_order() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp(dir.path(), "order.userdb");
        db.update("b \tB", "c=1 d=0 t=1").unwrap();
        db.update("a \tA", "c=1 d=0 t=1").unwrap();
        db.update("a b \tAB", "c=1 d=0 t=1").unwrap();

        let accessor = db.accessor().unwrap();
        // metadata sorts before the space that starts no phrase key
        let (first, _) = accessor.seek("").unwrap();
        assert_eq!(first, DB_NAME_KEY);
        let (k1, _) = accessor.seek(" ").unwrap();
        assert_eq!(k1, "a \tA");
        let (k2, _) = accessor.next_after(&k1).unwrap();
        assert_eq!(k2, "a b \tAB");
        let (k3, _) = accessor.next_after(&k2).unwrap();
        assert_eq!(k3, "b \tB");
        assert!(accessor.next_after(&k3).is_none());
    }

    #[test]
    fn tick_key_sorts_before_phrases() {
        assert!(TICK_KEY < "a");
        assert!(TICK_KEY < " ");
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp(dir.path(), "snap.userdb");
        db.update(TICK_KEY, "7").unwrap();
        db.update("hao \t好", "c=2 d=0.5 t=3").unwrap();
        db.update("hao ma \t好吗", "c=5 d=1.5 t=6").unwrap();
        let snapshot = dir.path().join("snap.txt");
        let dumped = db.snapshot_to(&snapshot).unwrap();
        assert_eq!(dumped, 4); // db_name + tick + 2 phrases

        let restored_db = open_temp(dir.path(), "restored.userdb");
        let restored = restored_db.restore_from(&snapshot).unwrap();
        assert_eq!(restored, 4);
        assert_eq!(
            restored_db.fetch("hao ma \t好吗").as_deref(),
            Some("c=5 d=1.5 t=6")
        );
        assert_eq!(restored_db.fetch(TICK_KEY).as_deref(), Some("7"));
    }

    #[test]
    fn shared_handles_are_pooled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.userdb");
        let a = UserDb::shared(&path).unwrap();
        let b = UserDb::shared(&path).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
