use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::{
    db::connection::Database,
    models::{Contact, ContactKind},
    ports::ContactDirectory,
    utils::phone_number,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    pub name: String,
    pub phone_number: String,
    pub kind: ContactKind,
    #[serde(default)]
    pub auto_answer: bool,
    #[serde(default)]
    pub priority: i32,
}

fn row_to_contact(row: &Row) -> Result<Contact> {
    let kind: String = row.get("kind")?;

    Ok(Contact {
        id: row.get("id")?,
        name: row.get("name")?,
        phone_number: row.get("phone_number")?,
        kind: ContactKind::parse(&kind).context("failed to parse contact kind")?,
        auto_answer: row.get("auto_answer")?,
        priority: row.get("priority")?,
    })
}

impl Database {
    pub async fn insert_contact(&self, contact: &NewContact) -> Result<i64> {
        let record = contact.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO contacts (name, phone_number, kind, auto_answer, priority, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.name,
                    record.phone_number,
                    record.kind.as_str(),
                    record.auto_answer,
                    record.priority,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Highest priority first.
    pub async fn list_contacts(&self) -> Result<Vec<Contact>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, phone_number, kind, auto_answer, priority
                 FROM contacts
                 ORDER BY priority DESC, name ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut contacts = Vec::new();
            while let Some(row) = rows.next()? {
                contacts.push(row_to_contact(row)?);
            }
            Ok(contacts)
        })
        .await
    }

    /// Stored numbers keep whatever formatting the carer typed, so matching
    /// happens on normalized suffixes rather than in SQL.
    pub async fn find_contact(&self, number: &str) -> Result<Option<Contact>> {
        let contacts = self.list_contacts().await?;
        Ok(contacts
            .into_iter()
            .find(|contact| phone_number::is_match(&contact.phone_number, number)))
    }

    pub async fn delete_contact(&self, id: i64) -> Result<bool> {
        self.execute(move |conn| {
            let changed = conn.execute("DELETE FROM contacts WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
        .await
    }
}

#[async_trait]
impl ContactDirectory for Database {
    async fn lookup(&self, number: &str) -> Result<Option<Contact>> {
        self.find_contact(number).await
    }
}
