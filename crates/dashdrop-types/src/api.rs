use serde::{Deserialize, Serialize};

use crate::events::Collection;

// -- Result envelope --

/// Two-shape response body: `{ success: true, data }` or `{ success: false, error }`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResult<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for ApiResult<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

// -- Requests --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcceptRequestBody {
    pub runner_id: String,
}

/// Status arrives as free text so unknown values can be rejected with a proper error.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateStatusBody {
    pub status: String,
}

// -- Notifications --

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

// -- Realtime --

#[derive(Debug, Deserialize)]
pub struct RealtimeQuery {
    pub collection: Collection,
    pub user_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_omits_error() {
        let json = serde_json::to_value(ApiResult::ok(5)).unwrap();
        assert_eq!(json, serde_json::json!({ "success": true, "data": 5 }));
    }

    #[test]
    fn failure_omits_data() {
        let result: Result<u32, String> = Err("Request already accepted by another dasher".into());
        let json = serde_json::to_value(ApiResult::from(result)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "success": false,
                "error": "Request already accepted by another dasher"
            })
        );
    }
}
