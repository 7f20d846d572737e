//! Opaque JSON records keyed by name. Each key is independent; writing or
//! clearing one never touches another.

use anyhow::{Context, Result};
use chrono::Utc;
use log::warn;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};

use crate::db::Database;

pub(crate) fn read_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM kv_store WHERE key = ?1",
        params![key],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .with_context(|| format!("failed to read {key}"))
}

pub(crate) fn write_value(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, Utc::now().to_rfc3339()],
    )
    .with_context(|| format!("failed to write {key}"))?;
    Ok(())
}

pub(crate) fn delete_value(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])
        .with_context(|| format!("failed to delete {key}"))?;
    Ok(())
}

/// Decodes a stored record. An undecodable record reads as absent.
pub(crate) fn decode<T: DeserializeOwned>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("Ignoring undecodable record {key}: {err}");
            None
        }
    }
}

impl Database {
    pub async fn get_json<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let key = key.to_string();
        self.execute(move |conn| {
            let raw = read_value(conn, &key)?;
            Ok(decode(&key, raw))
        })
        .await
    }

    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let key = key.to_string();
        let serialized = serde_json::to_string(value)
            .with_context(|| format!("failed to serialize {key}"))?;
        self.execute(move |conn| write_value(conn, &key, &serialized))
            .await
    }

    pub async fn delete_key(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| delete_value(conn, &key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let db = Database::in_memory().unwrap();
        let a = Record { name: "a".into(), count: 1 };
        let b = Record { name: "b".into(), count: 2 };

        db.put_json("a", &a).await.unwrap();
        db.put_json("b", &b).await.unwrap();
        db.delete_key("a").await.unwrap();

        assert_eq!(db.get_json::<Record>("a").await.unwrap(), None);
        assert_eq!(db.get_json::<Record>("b").await.unwrap(), Some(b));
    }

    #[tokio::test]
    async fn put_overwrites_existing_value() {
        let db = Database::in_memory().unwrap();
        db.put_json("k", &Record { name: "old".into(), count: 1 }).await.unwrap();
        db.put_json("k", &Record { name: "new".into(), count: 2 }).await.unwrap();

        let stored: Record = db.get_json("k").await.unwrap().unwrap();
        assert_eq!(stored.name, "new");
    }

    #[tokio::test]
    async fn undecodable_record_reads_as_absent() {
        let db = Database::in_memory().unwrap();
        db.execute(|conn| write_value(conn, "k", "{broken")).await.unwrap();
        assert_eq!(db.get_json::<Record>("k").await.unwrap(), None);
    }
}
