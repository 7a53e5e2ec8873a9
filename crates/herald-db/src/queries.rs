use crate::models::{MessageRow, RecipientRow, UserRow};
use crate::{Database, now_timestamp};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row};
use uuid::Uuid;

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        email: Option<&str>,
        password_hash: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, username, email, password_hash, now_timestamp()],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Returns false when the user no longer exists.
    pub fn update_profile(
        &self,
        id: &str,
        username: &str,
        email: Option<&str>,
        phone_number: Option<&str>,
        country: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET username = ?2, email = ?3, phone_number = ?4, country = ?5 WHERE id = ?1",
                rusqlite::params![id, username, email, phone_number, country],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Groups --

    /// Create the group if missing. Returns true when it was created.
    pub fn ensure_group(&self, name: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO groups (id, name) VALUES (?1, ?2)",
                (Uuid::new_v4().to_string(), name),
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn add_user_to_group(&self, user_id: &str, group_name: &str) -> Result<()> {
        self.with_conn(|conn| {
            let group_id: String = conn
                .query_row("SELECT id FROM groups WHERE name = ?1", [group_name], |row| {
                    row.get(0)
                })
                .optional()?
                .ok_or_else(|| anyhow!("Group not found: {}", group_name))?;

            conn.execute(
                "INSERT OR IGNORE INTO user_groups (user_id, group_id) VALUES (?1, ?2)",
                (user_id, &group_id),
            )?;
            Ok(())
        })
    }

    pub fn get_user_groups(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.name FROM groups g
                 JOIN user_groups ug ON ug.group_id = g.id
                 WHERE ug.user_id = ?1
                 ORDER BY g.name",
            )?;
            let names = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(names)
        })
    }

    // -- Recipients --

    pub fn insert_recipient(
        &self,
        id: &str,
        email: &str,
        full_name: &str,
        comment: Option<&str>,
        owner_id: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO recipients (id, email, full_name, comment, owner_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, email, full_name, comment, owner_id, now_timestamp()],
            )?;
            Ok(())
        })
    }

    pub fn get_recipient(&self, id: &str) -> Result<Option<RecipientRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{RECIPIENT_SELECT} WHERE id = ?1"),
                [id],
                recipient_from_row,
            )
            .optional()
        })
    }

    pub fn get_recipient_by_email(&self, email: &str) -> Result<Option<RecipientRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{RECIPIENT_SELECT} WHERE email = ?1"),
                [email],
                recipient_from_row,
            )
            .optional()
        })
    }

    /// `visible_to = None` lists everything; otherwise rows the user owns or
    /// that sit on one of the user's mailings.
    pub fn list_recipients(&self, visible_to: Option<&str>) -> Result<Vec<RecipientRow>> {
        self.with_conn(|conn| match visible_to {
            None => {
                let mut stmt = conn.prepare(&format!("{RECIPIENT_SELECT} ORDER BY email"))?;
                let rows = stmt
                    .query_map([], recipient_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            }
            Some(user_id) => {
                let mut stmt = conn.prepare(&format!(
                    "{RECIPIENT_SELECT}
                     WHERE owner_id = ?1
                        OR id IN (SELECT mr.recipient_id FROM mailing_recipients mr
                                  JOIN mailings m ON m.id = mr.mailing_id
                                  WHERE m.owner_id = ?1)
                     ORDER BY email"
                ))?;
                let rows = stmt
                    .query_map([user_id], recipient_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            }
        })
    }

    pub fn update_recipient(
        &self,
        id: &str,
        email: &str,
        full_name: &str,
        comment: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE recipients SET email = ?2, full_name = ?3, comment = ?4 WHERE id = ?1",
                rusqlite::params![id, email, full_name, comment],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_recipient(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM recipients WHERE id = ?1", [id])? > 0))
    }

    /// Ids from `ids` that have no recipient row.
    pub fn missing_recipients(&self, ids: &[String]) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT 1 FROM recipients WHERE id = ?1")?;
            let mut missing = Vec::new();
            for id in ids {
                if !stmt.exists([id])? {
                    missing.push(id.clone());
                }
            }
            Ok(missing)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, id: &str, subject: &str, body: &str, owner_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, subject, body, owner_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, subject, body, owner_id, now_timestamp()],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            conn.query_row(&format!("{MESSAGE_SELECT} WHERE id = ?1"), [id], message_from_row)
                .optional()
        })
    }

    /// Same visibility rule as `list_recipients`.
    pub fn list_messages(&self, visible_to: Option<&str>) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| match visible_to {
            None => {
                let mut stmt = conn.prepare(&format!("{MESSAGE_SELECT} ORDER BY created_at DESC"))?;
                let rows = stmt
                    .query_map([], message_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            }
            Some(user_id) => {
                let mut stmt = conn.prepare(&format!(
                    "{MESSAGE_SELECT}
                     WHERE owner_id = ?1
                        OR id IN (SELECT message_id FROM mailings WHERE owner_id = ?1)
                     ORDER BY created_at DESC"
                ))?;
                let rows = stmt
                    .query_map([user_id], message_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            }
        })
    }

    pub fn update_message(&self, id: &str, subject: &str, body: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET subject = ?2, body = ?3 WHERE id = ?1",
                (id, subject, body),
            )?;
            Ok(changed > 0)
        })
    }

    /// Deleting a message also deletes the mailings that send it.
    pub fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM messages WHERE id = ?1", [id])? > 0))
    }
}

const RECIPIENT_SELECT: &str =
    "SELECT id, email, full_name, comment, owner_id, created_at FROM recipients";

const MESSAGE_SELECT: &str = "SELECT id, subject, body, owner_id, created_at FROM messages";

pub(crate) fn recipient_from_row(row: &Row<'_>) -> rusqlite::Result<RecipientRow> {
    Ok(RecipientRow {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        comment: row.get(3)?,
        owner_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        subject: row.get(1)?,
        body: row.get(2)?,
        owner_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is always one of our literals, never caller input.
    let mut stmt = conn.prepare(&format!(
        "SELECT id, username, email, password, phone_number, country, created_at
         FROM users WHERE {column} = ?1"
    ))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                phone_number: row.get(4)?,
                country: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
