use serde_json::Value;

use crate::{
    types::{ContentType, ResponseRecord},
    utils,
};

impl ResponseRecord {
    /// Wraps a response body. Bodies that parse as JSON are stored as JSON,
    /// anything else as text.
    pub fn new(status_code: u16, body: &str, url: &str, track_id: &str) -> Self {
        let (content, content_type) = match serde_json::from_str::<Value>(body) {
            Ok(json) => (json, ContentType::Json),
            Err(_) => (Value::String(body.to_string()), ContentType::Text),
        };

        Self {
            status_code,
            content,
            content_type,
            url: url.to_string(),
            track_id: track_id.to_string(),
            timestamp: utils::utc_timestamp(),
        }
    }

    /// Record for a request that never got a response. The status code is 0.
    pub fn from_error(error: &str, url: &str, track_id: &str) -> Self {
        Self {
            status_code: 0,
            content: Value::String(error.to_string()),
            content_type: ContentType::Text,
            url: url.to_string(),
            track_id: track_id.to_string(),
            timestamp: utils::utc_timestamp(),
        }
    }

    /// True when the status is not 200 or the content reports an error.
    pub fn is_error(&self) -> bool {
        if self.status_code != 200 {
            return true;
        }

        match &self.content {
            Value::Object(map) => map.contains_key("error"),
            Value::String(text) => text.contains("error"),
            Value::Array(items) => items.iter().any(|v| v.as_str() == Some("error")),
            _ => false,
        }
    }
}
