use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE,
                email           TEXT,
                password        TEXT NOT NULL,
                phone_number    TEXT,
                country         TEXT,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE groups (
                id      TEXT PRIMARY KEY,
                name    TEXT NOT NULL UNIQUE
            );

            CREATE TABLE user_groups (
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                group_id    TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                PRIMARY KEY (user_id, group_id)
            );

            CREATE TABLE recipients (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL UNIQUE,
                full_name   TEXT NOT NULL,
                comment     TEXT,
                owner_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                subject     TEXT NOT NULL,
                body        TEXT NOT NULL,
                owner_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE mailings (
                id          TEXT PRIMARY KEY,
                start_time  TEXT NOT NULL,
                end_time    TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'created'
                            CHECK (status IN ('created', 'running', 'completed')),
                message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                owner_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_mailings_owner ON mailings(owner_id);

            CREATE TABLE mailing_recipients (
                mailing_id      TEXT NOT NULL REFERENCES mailings(id) ON DELETE CASCADE,
                recipient_id    TEXT NOT NULL REFERENCES recipients(id) ON DELETE CASCADE,
                PRIMARY KEY (mailing_id, recipient_id)
            );

            CREATE INDEX idx_mailing_recipients_recipient
                ON mailing_recipients(recipient_id);

            CREATE TABLE mailing_attempts (
                id              TEXT PRIMARY KEY,
                mailing_id      TEXT NOT NULL REFERENCES mailings(id) ON DELETE CASCADE,
                attempt_time    TEXT NOT NULL,
                status          TEXT NOT NULL CHECK (status IN ('success', 'failure')),
                server_response TEXT NOT NULL
            );

            CREATE INDEX idx_mailing_attempts_mailing
                ON mailing_attempts(mailing_id, attempt_time);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
