use std::collections::HashMap;

use crate::models::{AttemptRow, MailingRow, RecipientRow, StatsRow};
use crate::queries::{OptionalExt, recipient_from_row};
use crate::{Database, now_timestamp};
use anyhow::Result;
use rusqlite::{Connection, Row, Transaction};

/// Column values shared by mailing create and update.
pub struct MailingFields<'a> {
    pub start_time: &'a str,
    pub end_time: &'a str,
    pub status: &'a str,
    pub message_id: &'a str,
    pub recipient_ids: &'a [String],
}

impl Database {
    // -- Mailings --

    /// Inserts the mailing and its recipient links in one transaction.
    pub fn create_mailing(&self, id: &str, owner_id: &str, fields: &MailingFields<'_>) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO mailings (id, start_time, end_time, status, message_id, owner_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    id,
                    fields.start_time,
                    fields.end_time,
                    fields.status,
                    fields.message_id,
                    owner_id,
                    now_timestamp()
                ],
            )?;
            link_recipients(&tx, id, fields.recipient_ids)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Replaces every column and the recipient set. Returns false if the mailing is gone.
    pub fn update_mailing(&self, id: &str, fields: &MailingFields<'_>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE mailings SET start_time = ?2, end_time = ?3, status = ?4, message_id = ?5
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    fields.start_time,
                    fields.end_time,
                    fields.status,
                    fields.message_id
                ],
            )?;
            if changed == 0 {
                return Ok(false);
            }
            tx.execute("DELETE FROM mailing_recipients WHERE mailing_id = ?1", [id])?;
            link_recipients(&tx, id, fields.recipient_ids)?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn get_mailing(&self, id: &str) -> Result<Option<MailingRow>> {
        self.with_conn(|conn| {
            conn.query_row(&format!("{MAILING_SELECT} WHERE id = ?1"), [id], mailing_from_row)
                .optional()
        })
    }

    /// `owner = None` lists every mailing.
    pub fn list_mailings(&self, owner: Option<&str>) -> Result<Vec<MailingRow>> {
        self.with_conn(|conn| {
            let filter = if owner.is_some() { "WHERE owner_id = ?1" } else { "" };
            let mut stmt =
                conn.prepare(&format!("{MAILING_SELECT} {filter} ORDER BY created_at DESC"))?;
            let rows = match owner {
                None => stmt.query_map([], mailing_from_row)?,
                Some(owner_id) => stmt.query_map([owner_id], mailing_from_row)?,
            }
            .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn set_mailing_status(&self, id: &str, status: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("UPDATE mailings SET status = ?2 WHERE id = ?1", (id, status))?;
            Ok(changed > 0)
        })
    }

    /// Cascades to the mailing's attempts and recipient links, never to recipients.
    pub fn delete_mailing(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM mailings WHERE id = ?1", [id])? > 0))
    }

    /// Current recipient set of a mailing, ordered by email.
    pub fn get_mailing_recipients(&self, mailing_id: &str) -> Result<Vec<RecipientRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.email, r.full_name, r.comment, r.owner_id, r.created_at
                 FROM recipients r
                 JOIN mailing_recipients mr ON mr.recipient_id = r.id
                 WHERE mr.mailing_id = ?1
                 ORDER BY r.email",
            )?;
            let rows = stmt
                .query_map([mailing_id], recipient_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch recipient ids for a set of mailings, keyed by mailing id.
    pub fn get_recipient_ids_for_mailings(
        &self,
        mailing_ids: &[String],
    ) -> Result<HashMap<String, Vec<String>>> {
        if mailing_ids.is_empty() {
            return Ok(HashMap::new());
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=mailing_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT mr.mailing_id, mr.recipient_id FROM mailing_recipients mr
                 JOIN recipients r ON r.id = mr.recipient_id
                 WHERE mr.mailing_id IN ({})
                 ORDER BY r.email",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = mailing_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let mut map: HashMap<String, Vec<String>> = HashMap::new();
            let pairs = stmt.query_map(params.as_slice(), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for pair in pairs {
                let (mailing_id, recipient_id) = pair?;
                map.entry(mailing_id).or_default().push(recipient_id);
            }
            Ok(map)
        })
    }

    // -- Attempts --

    /// Append one attempt. `attempt_time` is stamped here and never changes.
    pub fn insert_attempt(
        &self,
        id: &str,
        mailing_id: &str,
        status: &str,
        server_response: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO mailing_attempts (id, mailing_id, attempt_time, status, server_response)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, mailing_id, now_timestamp(), status, server_response],
            )?;
            Ok(())
        })
    }

    /// Attempts for one mailing, newest first. `None` returns the whole log.
    pub fn list_attempts(&self, mailing_id: Option<&str>) -> Result<Vec<AttemptRow>> {
        self.with_conn(|conn| {
            let filter = if mailing_id.is_some() { "WHERE mailing_id = ?1" } else { "" };
            let mut stmt = conn.prepare(&format!(
                "{ATTEMPT_SELECT} {filter} ORDER BY attempt_time DESC, rowid DESC"
            ))?;
            let rows = match mailing_id {
                None => stmt.query_map([], attempt_from_row)?,
                Some(mailing_id) => stmt.query_map([mailing_id], attempt_from_row)?,
            }
            .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Statistics --

    /// Success/failure/total attempt counts per mailing, for `owner` or everyone.
    pub fn mailing_stats(&self, owner: Option<&str>) -> Result<Vec<StatsRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT m.id, m.status,
                        COALESCE(SUM(a.status = 'success'), 0),
                        COALESCE(SUM(a.status = 'failure'), 0),
                        COUNT(a.id)
                 FROM mailings m
                 LEFT JOIN mailing_attempts a ON a.mailing_id = m.id
                 {}
                 GROUP BY m.id
                 ORDER BY m.created_at DESC",
                if owner.is_some() { "WHERE m.owner_id = ?1" } else { "" }
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = match owner {
                None => stmt.query_map([], stats_from_row)?,
                Some(owner_id) => stmt.query_map([owner_id], stats_from_row)?,
            }
            .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// (total mailings, running mailings, distinct recipients) for one owner.
    pub fn home_summary(&self, owner_id: &str) -> Result<(i64, i64, i64)> {
        self.with_conn(|conn| summary(conn, owner_id))
    }
}

const MAILING_SELECT: &str =
    "SELECT id, start_time, end_time, status, message_id, owner_id, created_at FROM mailings";

const ATTEMPT_SELECT: &str =
    "SELECT id, mailing_id, attempt_time, status, server_response FROM mailing_attempts";

fn mailing_from_row(row: &Row<'_>) -> rusqlite::Result<MailingRow> {
    Ok(MailingRow {
        id: row.get(0)?,
        start_time: row.get(1)?,
        end_time: row.get(2)?,
        status: row.get(3)?,
        message_id: row.get(4)?,
        owner_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn attempt_from_row(row: &Row<'_>) -> rusqlite::Result<AttemptRow> {
    Ok(AttemptRow {
        id: row.get(0)?,
        mailing_id: row.get(1)?,
        attempt_time: row.get(2)?,
        status: row.get(3)?,
        server_response: row.get(4)?,
    })
}

fn stats_from_row(row: &Row<'_>) -> rusqlite::Result<StatsRow> {
    Ok(StatsRow {
        mailing_id: row.get(0)?,
        status: row.get(1)?,
        success: row.get(2)?,
        failure: row.get(3)?,
        total: row.get(4)?,
    })
}

fn link_recipients(tx: &Transaction<'_>, mailing_id: &str, recipient_ids: &[String]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT OR IGNORE INTO mailing_recipients (mailing_id, recipient_id) VALUES (?1, ?2)",
    )?;
    for recipient_id in recipient_ids {
        stmt.execute((mailing_id, recipient_id))?;
    }
    Ok(())
}

fn summary(conn: &Connection, owner_id: &str) -> Result<(i64, i64, i64)> {
    let (total, running): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(status = 'running'), 0) FROM mailings WHERE owner_id = ?1",
        [owner_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let recipients: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT mr.recipient_id) FROM mailing_recipients mr
         JOIN mailings m ON m.id = mr.mailing_id
         WHERE m.owner_id = ?1",
        [owner_id],
        |row| row.get(0),
    )?;
    Ok((total, running, recipients))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct Fixture {
        db: Database,
        owner: String,
        message: String,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let owner = Uuid::new_v4().to_string();
        db.create_user(&owner, "alice", None, "hash").unwrap();
        let message = Uuid::new_v4().to_string();
        db.insert_message(&message, "Hello", "Body", &owner).unwrap();
        Fixture { db, owner, message }
    }

    fn fields<'a>(message: &'a str, recipients: &'a [String]) -> MailingFields<'a> {
        MailingFields {
            start_time: "2026-01-01T09:00:00Z",
            end_time: "2026-01-02T09:00:00Z",
            status: "created",
            message_id: message,
            recipient_ids: recipients,
        }
    }

    #[test]
    fn deleting_a_mailing_cascades_to_attempts_and_links_only() {
        let f = fixture();
        let recipients = vec!["r1".to_string(), "r2".to_string()];
        f.db.insert_recipient("r1", "one@example.com", "One", None, &f.owner).unwrap();
        f.db.insert_recipient("r2", "two@example.com", "Two", None, &f.owner).unwrap();
        f.db.create_mailing("m1", &f.owner, &fields(&f.message, &recipients)).unwrap();
        f.db.insert_attempt("a1", "m1", "success", "Email sent successfully.").unwrap();
        f.db.insert_attempt("a2", "m1", "failure", "SMTP timeout").unwrap();

        assert!(f.db.delete_mailing("m1").unwrap());

        assert!(f.db.list_attempts(Some("m1")).unwrap().is_empty());
        assert!(f.db.get_recipient_ids_for_mailings(&["m1".to_string()]).unwrap().is_empty());
        assert_eq!(f.db.list_recipients(None).unwrap().len(), 2);
    }

    #[test]
    fn update_replaces_recipient_set() {
        let f = fixture();
        f.db.insert_recipient("r1", "one@example.com", "One", None, &f.owner).unwrap();
        f.db.insert_recipient("r2", "two@example.com", "Two", None, &f.owner).unwrap();
        f.db.create_mailing("m1", &f.owner, &fields(&f.message, &["r1".to_string()])).unwrap();

        let updated = f.db.update_mailing("m1", &fields(&f.message, &["r2".to_string()])).unwrap();
        assert!(updated);

        let emails: Vec<String> = f
            .db
            .get_mailing_recipients("m1")
            .unwrap()
            .into_iter()
            .map(|r| r.email)
            .collect();
        assert_eq!(emails, vec!["two@example.com".to_string()]);
        assert!(!f.db.update_mailing("missing", &fields(&f.message, &[])).unwrap());
    }

    #[test]
    fn stats_count_attempts_by_status() {
        let f = fixture();
        f.db.create_mailing("m1", &f.owner, &fields(&f.message, &[])).unwrap();
        f.db.create_mailing("m2", &f.owner, &fields(&f.message, &[])).unwrap();
        f.db.insert_attempt("a1", "m1", "success", "ok").unwrap();
        f.db.insert_attempt("a2", "m1", "success", "ok").unwrap();
        f.db.insert_attempt("a3", "m1", "failure", "boom").unwrap();

        let stats = f.db.mailing_stats(Some(&f.owner)).unwrap();
        let m1 = stats.iter().find(|s| s.mailing_id == "m1").unwrap();
        assert_eq!((m1.success, m1.failure, m1.total), (2, 1, 3));
        let m2 = stats.iter().find(|s| s.mailing_id == "m2").unwrap();
        assert_eq!((m2.success, m2.failure, m2.total), (0, 0, 0));

        assert!(f.db.mailing_stats(Some("someone-else")).unwrap().is_empty());
    }

    #[test]
    fn home_summary_counts_distinct_recipients() {
        let f = fixture();
        f.db.insert_recipient("r1", "one@example.com", "One", None, &f.owner).unwrap();
        let both = vec!["r1".to_string()];
        f.db.create_mailing("m1", &f.owner, &fields(&f.message, &both)).unwrap();
        f.db.create_mailing("m2", &f.owner, &fields(&f.message, &both)).unwrap();
        f.db.set_mailing_status("m2", "running").unwrap();

        assert_eq!(f.db.home_summary(&f.owner).unwrap(), (2, 1, 1));
    }
}
