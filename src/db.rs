//! Database module for threadline
//!
//! Durable storage for conversation threads and their message logs.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    // ==================== Thread Operations ====================

    /// Register a thread with no messages. Existing threads are left alone.
    pub fn create_thread(&self, thread_id: &str) -> DbResult<()> {
        let conn = self.conn()?;
        ensure_thread(&conn, thread_id, &Utc::now())?;
        Ok(())
    }

    pub fn thread_exists(&self, thread_id: &str) -> DbResult<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM threads WHERE id = ?1)",
            params![thread_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Every thread id ever created, across all sessions
    pub fn list_thread_ids(&self) -> DbResult<BTreeSet<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM threads")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<BTreeSet<_>, _>>().map_err(DbError::from)
    }

    /// Thread metadata, most recently updated first
    pub fn list_threads(&self) -> DbResult<Vec<ThreadRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT t.id, t.created_at, t.updated_at,
                    (SELECT COUNT(*) FROM messages m WHERE m.thread_id = t.id) as message_count
             FROM threads t
             ORDER BY t.updated_at DESC, t.rowid DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(ThreadRecord {
                id: row.get(0)?,
                created_at: parse_datetime(&row.get::<_, String>(1)?),
                updated_at: parse_datetime(&row.get::<_, String>(2)?),
                message_count: row.get(3)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    // ==================== Message Operations ====================

    /// Append a message to the end of a thread, creating the thread if needed
    pub fn append(&self, thread_id: &str, message: &NewMessage) -> DbResult<Message> {
        let mut stored = self.append_turn(thread_id, std::slice::from_ref(message))?;
        Ok(stored.remove(0))
    }

    /// Append several messages in one transaction.
    ///
    /// Either every message lands, in order, or none does.
    pub fn append_turn(&self, thread_id: &str, messages: &[NewMessage]) -> DbResult<Vec<Message>> {
        let mut conn = self.conn()?;
        let now = Utc::now();
        let tx = conn.transaction()?;

        ensure_thread(&tx, thread_id, &now)?;

        let mut sequence_id: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sequence_id), 0) FROM messages WHERE thread_id = ?1",
            params![thread_id],
            |row| row.get(0),
        )?;

        let mut stored = Vec::with_capacity(messages.len());
        for message in messages {
            sequence_id += 1;
            let message_id = uuid::Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO messages (message_id, thread_id, sequence_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message_id,
                    thread_id,
                    sequence_id,
                    message.role.as_str(),
                    message.content,
                    now.to_rfc3339(),
                ],
            )?;
            stored.push(Message {
                message_id,
                thread_id: thread_id.to_string(),
                sequence_id,
                role: message.role,
                content: message.content.clone(),
                created_at: now,
            });
        }

        tx.execute(
            "UPDATE threads SET updated_at = ?1 WHERE id = ?2",
            params![now.to_rfc3339(), thread_id],
        )?;
        tx.commit()?;

        Ok(stored)
    }

    /// Full history of a thread in append order; empty for unknown threads
    pub fn get_history(&self, thread_id: &str) -> DbResult<Vec<Message>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT message_id, thread_id, sequence_id, role, content, created_at
             FROM messages WHERE thread_id = ?1 ORDER BY sequence_id ASC",
        )?;

        let rows = stmt.query_map(params![thread_id], parse_message_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// First user message of a thread, if any
    pub fn first_user_message(&self, thread_id: &str) -> DbResult<Option<Message>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT message_id, thread_id, sequence_id, role, content, created_at
             FROM messages WHERE thread_id = ?1 AND role = 'user'
             ORDER BY sequence_id ASC LIMIT 1",
            params![thread_id],
            parse_message_row,
        )
        .optional()
        .map_err(DbError::from)
    }
}

fn ensure_thread(conn: &Connection, thread_id: &str, now: &DateTime<Utc>) -> DbResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO threads (id, created_at, updated_at) VALUES (?1, ?2, ?2)",
        params![thread_id, now.to_rfc3339()],
    )?;
    Ok(())
}

/// Parse a message row from the database
fn parse_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let role_str: String = row.get(3)?;
    let role = Role::parse(&role_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown message role: {role_str}").into(),
        )
    })?;

    Ok(Message {
        message_id: row.get(0)?,
        thread_id: row.get(1)?,
        sequence_id: row.get(2)?,
        role,
        content: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_get_history() {
        let db = Database::open_in_memory().unwrap();

        let msg1 = db.append("thread-1", &NewMessage::user("Hello")).unwrap();
        let msg2 = db
            .append("thread-1", &NewMessage::assistant("Hi there!"))
            .unwrap();

        assert_eq!(msg1.sequence_id, 1);
        assert_eq!(msg2.sequence_id, 2);
        assert_eq!(msg1.role, Role::User);
        assert_eq!(msg2.role, Role::Assistant);

        let history = db.get_history("thread-1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "Hello");
        assert_eq!(history[1].content, "Hi there!");
    }

    fn message_count(db: &Database, thread_id: &str) -> i64 {
        db.list_threads()
            .unwrap()
            .into_iter()
            .find(|t| t.id == thread_id)
            .map(|t| t.message_count)
            .unwrap()
    }

    #[test]
    fn test_unknown_thread_has_empty_history() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_history("nope").unwrap().is_empty());
        assert!(!db.thread_exists("nope").unwrap());
        assert!(db.list_threads().unwrap().is_empty());
    }

    #[test]
    fn test_append_creates_thread() {
        let db = Database::open_in_memory().unwrap();
        db.append("fresh", &NewMessage::user("first")).unwrap();

        assert!(db.thread_exists("fresh").unwrap());
        let ids = db.list_thread_ids().unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["fresh".to_string()]);
    }

    #[test]
    fn test_create_thread_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.create_thread("t1").unwrap();
        db.create_thread("t1").unwrap();
        db.create_thread("t2").unwrap();

        let ids = db.list_thread_ids().unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("t1"));
        assert!(ids.contains("t2"));
        assert_eq!(message_count(&db, "t1"), 0);
    }

    #[test]
    fn test_append_turn_keeps_order_and_counts() {
        let db = Database::open_in_memory().unwrap();
        db.append("t", &NewMessage::user("one")).unwrap();

        let stored = db
            .append_turn(
                "t",
                &[NewMessage::user("two"), NewMessage::assistant("three")],
            )
            .unwrap();
        assert_eq!(stored[0].sequence_id, 2);
        assert_eq!(stored[1].sequence_id, 3);

        let contents: Vec<_> = db
            .get_history("t")
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
        assert_eq!(message_count(&db, "t"), 3);
    }

    #[test]
    fn test_history_is_per_thread() {
        let db = Database::open_in_memory().unwrap();
        db.append("a", &NewMessage::user("for a")).unwrap();
        db.append("b", &NewMessage::user("for b")).unwrap();
        db.append("a", &NewMessage::assistant("reply a")).unwrap();

        let a = db.get_history("a").unwrap();
        let b = db.get_history("b").unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].sequence_id, 1);
    }

    #[test]
    fn test_first_user_message_skips_assistant() {
        let db = Database::open_in_memory().unwrap();
        db.append("t", &NewMessage::assistant("greeting")).unwrap();
        db.append("t", &NewMessage::user("question")).unwrap();
        db.append("t", &NewMessage::user("follow-up")).unwrap();

        let first = db.first_user_message("t").unwrap().unwrap();
        assert_eq!(first.content, "question");
        assert!(db.first_user_message("empty").unwrap().is_none());
    }

    #[test]
    fn test_list_threads_most_recent_first() {
        let db = Database::open_in_memory().unwrap();
        db.create_thread("older").unwrap();
        db.create_thread("newer").unwrap();
        db.append("older", &NewMessage::user("bump")).unwrap();

        let threads = db.list_threads().unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].id, "older");
        assert_eq!(threads[0].message_count, 1);
    }

    #[test]
    fn test_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("threadline.db");

        {
            let db = Database::open(&path).unwrap();
            db.append("durable", &NewMessage::user("remember me")).unwrap();
            db.append("durable", &NewMessage::assistant("noted")).unwrap();
            db.create_thread("empty").unwrap();
        }

        let db = Database::open(&path).unwrap();
        let history = db.get_history("durable").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "remember me");
        assert_eq!(history[1].content, "noted");
        assert!(db.list_thread_ids().unwrap().contains("empty"));
    }
}
