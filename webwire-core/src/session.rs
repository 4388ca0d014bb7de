// Session state: server-assigned id plus negotiated capabilities.
// Built once from a NEW_SESSION response and immutable afterwards.

use crate::error::WebDriverError;
use serde_json::{Map, Value};
use std::fmt;

/// Negotiated session capabilities (string key to JSON value).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Capabilities {
    entries: Map<String, Value>,
}

impl Capabilities {
    pub fn new() -> Self {
        Capabilities::default()
    }

    pub fn from_map(entries: Map<String, Value>) -> Self {
        Capabilities { entries }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    pub fn browser_name(&self) -> Option<&str> {
        self.get_str("browserName")
    }

    pub fn browser_version(&self) -> Option<&str> {
        self.get_str("browserVersion").or_else(|| self.get_str("version"))
    }

    pub fn platform(&self) -> Option<&str> {
        self.get_str("platformName").or_else(|| self.get_str("platform"))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.entries
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.entries
    }
}

impl From<Capabilities> for Value {
    fn from(caps: Capabilities) -> Value {
        Value::Object(caps.entries)
    }
}

/// A WebDriver session: the server-assigned id plus the capabilities the
/// remote end actually granted.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    id: String,
    capabilities: Capabilities,
}

impl Session {
    pub fn new(id: impl Into<String>, capabilities: Capabilities) -> Self {
        Session {
            id: id.into(),
            capabilities,
        }
    }

    /// Build a session from a NEW_SESSION response payload.
    ///
    /// Accepts both dialect shapes: W3C nests `{sessionId, capabilities}`
    /// under `value`, while the legacy protocol carries a top-level
    /// `sessionId` with `value` holding the capability map directly.
    pub fn from_new_session(payload: &Value) -> Result<Session, WebDriverError> {
        // Normalized executor output and raw W3C both look like this.
        if let Some(id) = payload.get("sessionId").and_then(Value::as_str) {
            let caps = payload
                .get("capabilities")
                .or_else(|| payload.get("value"))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            return Ok(Session::new(id, Capabilities::from_map(caps)));
        }

        if let Some(value) = payload.get("value") {
            if let Some(id) = value.get("sessionId").and_then(Value::as_str) {
                let caps = value
                    .get("capabilities")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                return Ok(Session::new(id, Capabilities::from_map(caps)));
            }
        }

        Err(WebDriverError::unknown(format!(
            "Unable to parse new session response: {}",
            payload
        )))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session({})", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_w3c_shape() {
        let payload = json!({
            "value": {
                "sessionId": "abc123",
                "capabilities": {"browserName": "firefox", "browserVersion": "128.0"}
            }
        });

        let session = Session::from_new_session(&payload).unwrap();
        assert_eq!(session.id(), "abc123");
        assert_eq!(session.capabilities().browser_name(), Some("firefox"));
        assert_eq!(session.capabilities().browser_version(), Some("128.0"));
    }

    #[test]
    fn test_from_legacy_shape() {
        let payload = json!({
            "sessionId": "legacy-1",
            "value": {"browserName": "chrome", "version": "42", "platform": "LINUX"}
        });

        let session = Session::from_new_session(&payload).unwrap();
        assert_eq!(session.id(), "legacy-1");
        assert_eq!(session.capabilities().browser_name(), Some("chrome"));
        assert_eq!(session.capabilities().browser_version(), Some("42"));
        assert_eq!(session.capabilities().platform(), Some("LINUX"));
    }

    #[test]
    fn test_missing_session_id() {
        let payload = json!({"value": {"browserName": "chrome"}});
        let err = Session::from_new_session(&payload).unwrap_err();
        assert!(err.message.contains("Unable to parse new session response"));
    }

    #[test]
    fn test_capabilities_accessors() {
        let mut caps = Capabilities::new();
        assert!(caps.is_empty());

        caps.set("browserName", "safari");
        caps.set("acceptInsecureCerts", true);

        assert_eq!(caps.browser_name(), Some("safari"));
        assert_eq!(caps.get("acceptInsecureCerts"), Some(&json!(true)));
        assert!(caps.get("missing").is_none());
    }
}
