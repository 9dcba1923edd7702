use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (requests + notifications)");
        conn.execute_batch(
            "
            CREATE TABLE requests (
                id                  TEXT PRIMARY KEY,
                buyer_id            TEXT NOT NULL,
                qr_image_url        TEXT,
                delivery_location   TEXT NOT NULL,
                room                TEXT NOT NULL,
                tip                 INTEGER NOT NULL CHECK (tip >= 0),
                mode                TEXT NOT NULL CHECK (mode IN ('normal', 'urgent')),
                pickup_point        TEXT NOT NULL,
                status              TEXT NOT NULL DEFAULT 'pending',
                runner_id           TEXT,
                created_at          TEXT NOT NULL,
                accepted_at         TEXT,
                updated_at          TEXT NOT NULL
            );

            CREATE INDEX idx_requests_status
                ON requests(status, created_at);

            CREATE TABLE notifications (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                type        TEXT NOT NULL,
                message     TEXT NOT NULL,
                request_id  TEXT NOT NULL REFERENCES requests(id),
                status      TEXT,
                urgent      INTEGER NOT NULL DEFAULT 0,
                read        INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_notifications_user
                ON notifications(user_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
