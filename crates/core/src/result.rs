//! The tagged result returned by every mutation and query endpoint.
//!
//! ```json
//! { "status": "success", "message": "Order cancelled", "data": { "id": 42 } }
//! ```

use serde::{Deserialize, Serialize};

/// Outcome tag of an [`ActionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    Error,
    Unauthorized,
    ValidationError,
}

impl ActionStatus {
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// A user-facing result: a status tag, a message and optional payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult<T> {
    pub status: ActionStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ActionResult<T> {
    /// Successful result carrying `data`.
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: ActionStatus::Success,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Successful result without a payload.
    pub fn ok(message: impl Into<String>) -> Self {
        Self::tagged(ActionStatus::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::tagged(ActionStatus::Error, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::tagged(ActionStatus::Unauthorized, message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::tagged(ActionStatus::ValidationError, message)
    }

    fn tagged(status: ActionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_success_serializes_data() {
        let result = ActionResult::success("Added to wishlist", json!({ "added": true }));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({ "status": "success", "message": "Added to wishlist", "data": { "added": true } })
        );
    }

    #[test]
    fn test_error_omits_data() {
        let result: ActionResult<()> = ActionResult::validation_error("Quantity must be 1-99");
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({ "status": "validation_error", "message": "Quantity must be 1-99" })
        );
        assert!(!result.status.is_success());
    }

    #[test]
    fn test_deserialize_without_data() {
        let result: ActionResult<i32> =
            serde_json::from_str(r#"{"status":"unauthorized","message":"Sign in"}"#).unwrap();
        assert_eq!(result.status, ActionStatus::Unauthorized);
        assert_eq!(result.data, None);
    }
}
