/// Database row types: these map directly to SQLite rows.
/// Distinct from dashdrop-types models to keep the DB layer independent.

#[derive(Debug, Clone, PartialEq)]
pub struct RequestRow {
    pub id: String,
    pub buyer_id: String,
    pub qr_image_url: Option<String>,
    pub delivery_location: String,
    pub room: String,
    pub tip: i64,
    pub mode: String,
    pub pickup_point: String,
    pub status: String,
    pub runner_id: Option<String>,
    pub created_at: String,
    pub accepted_at: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub message: String,
    pub request_id: String,
    pub status: Option<String>,
    pub urgent: bool,
    pub read: bool,
    pub created_at: String,
}
