use crate::models::{NotificationRow, RequestRow};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, Row};

const REQUEST_COLUMNS: &str = "id, buyer_id, qr_image_url, delivery_location, room, tip, mode, \
     pickup_point, status, runner_id, created_at, accepted_at, updated_at";

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, type, message, request_id, status, urgent, read, created_at";

impl Database {
    // -- Requests --

    pub fn insert_request(&self, row: &RequestRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO requests (id, buyer_id, qr_image_url, delivery_location, room, tip, mode,
                                       pickup_point, status, runner_id, created_at, accepted_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    row.id,
                    row.buyer_id,
                    row.qr_image_url,
                    row.delivery_location,
                    row.room,
                    row.tip,
                    row.mode,
                    row.pickup_point,
                    row.status,
                    row.runner_id,
                    row.created_at,
                    row.accepted_at,
                    row.updated_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_request(&self, id: &str) -> Result<Option<RequestRow>> {
        self.with_conn(|conn| query_request(conn, id))
    }

    /// Requests in `status`, urgent ones first, then oldest first.
    pub fn requests_with_status(&self, status: &str, limit: u32) -> Result<Vec<RequestRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {REQUEST_COLUMNS} FROM requests
                 WHERE status = ?1
                 ORDER BY (mode = 'urgent') DESC, created_at ASC, rowid ASC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![status, limit], request_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Conditional accept: assigns the runner only while the request is still
    /// `pending_status`. Returns `None` when the condition did not hold (or the
    /// id is unknown), so at most one caller ever gets a row back.
    pub fn accept_request(
        &self,
        id: &str,
        runner_id: &str,
        pending_status: &str,
        accepted_status: &str,
        now: &str,
    ) -> Result<Option<RequestRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "UPDATE requests
                 SET runner_id = ?2, status = ?4, accepted_at = ?5, updated_at = ?5
                 WHERE id = ?1 AND status = ?3
                 RETURNING {REQUEST_COLUMNS}"
            );
            conn.query_row(
                &sql,
                rusqlite::params![id, runner_id, pending_status, accepted_status, now],
                request_from_row,
            )
            .optional()
        })
    }

    /// Compare-and-set on `status`: writes `new_status` only if the stored
    /// status still equals `expected`.
    pub fn compare_and_set_status(
        &self,
        id: &str,
        expected: &str,
        new_status: &str,
        now: &str,
    ) -> Result<Option<RequestRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "UPDATE requests
                 SET status = ?3, updated_at = ?4
                 WHERE id = ?1 AND status = ?2
                 RETURNING {REQUEST_COLUMNS}"
            );
            conn.query_row(
                &sql,
                rusqlite::params![id, expected, new_status, now],
                request_from_row,
            )
            .optional()
        })
    }

    // -- Notifications --

    pub fn insert_notification(&self, row: &NotificationRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, type, message, request_id, status, urgent, read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    row.id,
                    row.user_id,
                    row.kind,
                    row.message,
                    row.request_id,
                    row.status,
                    row.urgent,
                    row.read,
                    row.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Notifications addressed to `user_id` or to the `broadcast` target, newest first.
    pub fn notifications_for_user(
        &self,
        user_id: &str,
        broadcast: &str,
        limit: u32,
    ) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                 WHERE user_id = ?1 OR user_id = ?2
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, broadcast, limit], notification_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false when no notification has that id.
    pub fn mark_notification_read(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("UPDATE notifications SET read = 1 WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }
}

fn query_request(conn: &Connection, id: &str) -> Result<Option<RequestRow>> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([id], request_from_row).optional()
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<RequestRow> {
    Ok(RequestRow {
        id: row.get(0)?,
        buyer_id: row.get(1)?,
        qr_image_url: row.get(2)?,
        delivery_location: row.get(3)?,
        room: row.get(4)?,
        tip: row.get(5)?,
        mode: row.get(6)?,
        pickup_point: row.get(7)?,
        status: row.get(8)?,
        runner_id: row.get(9)?,
        created_at: row.get(10)?,
        accepted_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        message: row.get(3)?,
        request_id: row.get(4)?,
        status: row.get(5)?,
        urgent: row.get(6)?,
        read: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
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
