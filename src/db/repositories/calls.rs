use anyhow::Result;
use async_trait::async_trait;
use rusqlite::{params, Row};
use tokio::sync::watch;

use crate::{
    db::{
        connection::Database,
        helpers::{parse_call_type, parse_datetime, parse_optional_kind, to_i64, to_u64},
    },
    models::{CallLogEntry, CallType, MissedCallRecord},
    ports::CallLog,
};

fn row_to_entry(row: &Row) -> Result<CallLogEntry> {
    let call_type: String = row.get("call_type")?;
    let timestamp: String = row.get("timestamp")?;
    let duration_secs: i64 = row.get("duration_secs")?;

    Ok(CallLogEntry {
        id: Some(row.get("id")?),
        phone_number: row.get("phone_number")?,
        contact_id: row.get("contact_id")?,
        contact_name: row.get("contact_name")?,
        contact_kind: parse_optional_kind(row.get("contact_kind")?)?,
        call_type: parse_call_type(&call_type)?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        duration_secs: to_u64(duration_secs, "duration_secs")?,
        is_read: row.get("is_read")?,
    })
}

fn row_to_missed(row: &Row) -> Result<MissedCallRecord> {
    let timestamp: String = row.get("timestamp")?;

    Ok(MissedCallRecord {
        id: row.get("id")?,
        phone_number: row.get("phone_number")?,
        contact_name: row.get("contact_name")?,
        contact_kind: parse_optional_kind(row.get("contact_kind")?)?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        is_read: row.get("is_read")?,
    })
}

impl Database {
    pub async fn insert_call(&self, entry: &CallLogEntry) -> Result<i64> {
        let record = entry.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO calls (phone_number, contact_id, contact_name, contact_kind, call_type, timestamp, duration_secs, is_read)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.phone_number,
                    record.contact_id,
                    record.contact_name,
                    record.contact_kind.map(|kind| kind.as_str()),
                    record.call_type.as_str(),
                    record.timestamp.to_rfc3339(),
                    to_i64(record.duration_secs)?,
                    record.is_read,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn recent_calls(&self, limit: u32) -> Result<Vec<CallLogEntry>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, phone_number, contact_id, contact_name, contact_kind, call_type, timestamp, duration_secs, is_read
                 FROM calls
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }
            Ok(entries)
        })
        .await
    }

    pub async fn unread_missed_calls(&self) -> Result<Vec<MissedCallRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, phone_number, contact_name, contact_kind, timestamp, is_read
                 FROM calls
                 WHERE call_type = ?1 AND is_read = 0
                 ORDER BY timestamp DESC, id DESC",
            )?;

            let mut rows = stmt.query(params![CallType::Missed.as_str()])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_missed(row)?);
            }
            Ok(records)
        })
        .await
    }

    pub async fn count_unread_missed(&self) -> Result<usize> {
        self.execute(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM calls WHERE call_type = ?1 AND is_read = 0",
                params![CallType::Missed.as_str()],
                |row| row.get(0),
            )?;
            Ok(to_u64(count, "count")? as usize)
        })
        .await
    }

    pub async fn mark_call_read(&self, id: i64) -> Result<bool> {
        self.execute(move |conn| {
            let changed = conn.execute(
                "UPDATE calls SET is_read = 1 WHERE id = ?1 AND is_read = 0",
                params![id],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    pub async fn mark_all_missed_read(&self) -> Result<usize> {
        self.execute(|conn| {
            let changed = conn.execute(
                "UPDATE calls SET is_read = 1 WHERE call_type = ?1 AND is_read = 0",
                params![CallType::Missed.as_str()],
            )?;
            Ok(changed)
        })
        .await
    }
}

/// [`CallLog`] over the calls table, publishing the unread missed count after
/// every write.
pub struct CallLogStore {
    db: Database,
    unread: watch::Sender<usize>,
}

impl CallLogStore {
    pub async fn open(db: Database) -> Result<Self> {
        let count = db.count_unread_missed().await?;
        let (unread, _) = watch::channel(count);
        Ok(Self { db, unread })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn refresh_unread(&self) -> Result<()> {
        let count = self.db.count_unread_missed().await?;
        self.unread.send_if_modified(|current| {
            if *current == count {
                return false;
            }
            *current = count;
            true
        });
        Ok(())
    }
}

#[async_trait]
impl CallLog for CallLogStore {
    async fn append(&self, entry: CallLogEntry) -> Result<i64> {
        let id = self.db.insert_call(&entry).await?;
        if entry.is_nag_eligible() {
            self.refresh_unread().await?;
        }
        Ok(id)
    }

    async fn unread_missed(&self) -> Result<Vec<MissedCallRecord>> {
        self.db.unread_missed_calls().await
    }

    async fn mark_read(&self, id: i64) -> Result<bool> {
        let changed = self.db.mark_call_read(id).await?;
        if changed {
            self.refresh_unread().await?;
        }
        Ok(changed)
    }

    async fn mark_all_missed_read(&self) -> Result<usize> {
        let changed = self.db.mark_all_missed_read().await?;
        self.refresh_unread().await?;
        Ok(changed)
    }

    fn watch_unread_count(&self) -> watch::Receiver<usize> {
        self.unread.subscribe()
    }
}
