// Closed error taxonomy for the WebDriver wire protocol, with decoders
// for both response dialects: the legacy JSON Wire Protocol (numeric
// `status`) and W3C WebDriver (string `error` code).

use serde_json::{json, Value};
use std::fmt;

/// The closed set of structured wire error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ElementNotSelectable,
    ElementNotVisible,
    InvalidArgument,
    InvalidCookieDomain,
    InvalidCoordinates,
    InvalidElementState,
    InvalidSelector,
    InvalidSessionId,
    JavascriptError,
    MoveTargetOutOfBounds,
    NoSuchAlert,
    NoSuchElement,
    NoSuchFrame,
    NoSuchWindow,
    ScriptTimeout,
    SessionNotCreated,
    StaleElementReference,
    Timeout,
    UnableToSetCookie,
    UnableToCaptureScreen,
    UnexpectedAlertOpen,
    UnknownCommand,
    UnknownError,
    UnknownMethod,
    UnsupportedOperation,
}

impl ErrorKind {
    /// The canonical W3C error code string for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::ElementNotSelectable => "element not selectable",
            ErrorKind::ElementNotVisible => "element not visible",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::InvalidCookieDomain => "invalid cookie domain",
            ErrorKind::InvalidCoordinates => "invalid coordinates",
            ErrorKind::InvalidElementState => "invalid element state",
            ErrorKind::InvalidSelector => "invalid selector",
            ErrorKind::InvalidSessionId => "invalid session id",
            ErrorKind::JavascriptError => "javascript error",
            ErrorKind::MoveTargetOutOfBounds => "move target out of bounds",
            ErrorKind::NoSuchAlert => "no such alert",
            ErrorKind::NoSuchElement => "no such element",
            ErrorKind::NoSuchFrame => "no such frame",
            ErrorKind::NoSuchWindow => "no such window",
            ErrorKind::ScriptTimeout => "script timeout",
            ErrorKind::SessionNotCreated => "session not created",
            ErrorKind::StaleElementReference => "stale element reference",
            ErrorKind::Timeout => "timeout",
            ErrorKind::UnableToSetCookie => "unable to set cookie",
            ErrorKind::UnableToCaptureScreen => "unable to capture screen",
            ErrorKind::UnexpectedAlertOpen => "unexpected alert open",
            ErrorKind::UnknownCommand => "unknown command",
            ErrorKind::UnknownError => "unknown error",
            ErrorKind::UnknownMethod => "unknown method",
            ErrorKind::UnsupportedOperation => "unsupported operation",
        }
    }

    /// Map a W3C error code string to a kind. Unrecognized strings map to
    /// `None`; the decoder substitutes `UnknownError` in that case.
    pub fn from_code(code: &str) -> Option<ErrorKind> {
        let kind = match code {
            "element not selectable" => ErrorKind::ElementNotSelectable,
            "element not visible" => ErrorKind::ElementNotVisible,
            "invalid argument" => ErrorKind::InvalidArgument,
            "invalid cookie domain" => ErrorKind::InvalidCookieDomain,
            // Older remote ends spell out "element" in the coordinates code.
            "invalid coordinates" | "invalid element coordinates" => {
                ErrorKind::InvalidCoordinates
            }
            "invalid element state" => ErrorKind::InvalidElementState,
            "invalid selector" => ErrorKind::InvalidSelector,
            "invalid session id" => ErrorKind::InvalidSessionId,
            "javascript error" => ErrorKind::JavascriptError,
            "move target out of bounds" => ErrorKind::MoveTargetOutOfBounds,
            "no such alert" => ErrorKind::NoSuchAlert,
            "no such element" => ErrorKind::NoSuchElement,
            "no such frame" => ErrorKind::NoSuchFrame,
            "no such window" => ErrorKind::NoSuchWindow,
            "script timeout" => ErrorKind::ScriptTimeout,
            "session not created" => ErrorKind::SessionNotCreated,
            "stale element reference" => ErrorKind::StaleElementReference,
            "timeout" => ErrorKind::Timeout,
            "unable to set cookie" => ErrorKind::UnableToSetCookie,
            "unable to capture screen" => ErrorKind::UnableToCaptureScreen,
            "unexpected alert open" => ErrorKind::UnexpectedAlertOpen,
            "unknown command" => ErrorKind::UnknownCommand,
            "unknown error" => ErrorKind::UnknownError,
            "unknown method" => ErrorKind::UnknownMethod,
            "unsupported operation" => ErrorKind::UnsupportedOperation,
            _ => return None,
        };
        Some(kind)
    }

    /// Map a legacy JSON Wire Protocol numeric status to a kind.
    /// Status 0 is success and never reaches the decoder.
    pub fn from_legacy_status(status: i64) -> ErrorKind {
        match status {
            6 => ErrorKind::InvalidSessionId,
            7 => ErrorKind::NoSuchElement,
            8 => ErrorKind::NoSuchFrame,
            9 => ErrorKind::UnknownCommand,
            10 => ErrorKind::StaleElementReference,
            11 => ErrorKind::ElementNotVisible,
            12 => ErrorKind::InvalidElementState,
            13 => ErrorKind::UnknownError,
            15 => ErrorKind::ElementNotSelectable,
            17 => ErrorKind::JavascriptError,
            19 => ErrorKind::InvalidSelector,
            21 => ErrorKind::Timeout,
            23 => ErrorKind::NoSuchWindow,
            24 => ErrorKind::InvalidCookieDomain,
            25 => ErrorKind::UnableToSetCookie,
            26 => ErrorKind::UnexpectedAlertOpen,
            27 => ErrorKind::NoSuchAlert,
            28 => ErrorKind::ScriptTimeout,
            29 => ErrorKind::InvalidCoordinates,
            32 => ErrorKind::InvalidSelector,
            33 => ErrorKind::SessionNotCreated,
            34 => ErrorKind::MoveTargetOutOfBounds,
            // Legacy XPath-specific selector failures.
            51 | 52 => ErrorKind::InvalidSelector,
            61 => ErrorKind::InvalidArgument,
            405 => ErrorKind::UnsupportedOperation,
            _ => ErrorKind::UnknownError,
        }
    }

    /// The HTTP status a conforming remote end would pair with this kind.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::ElementNotSelectable
            | ErrorKind::ElementNotVisible
            | ErrorKind::InvalidArgument
            | ErrorKind::InvalidCookieDomain
            | ErrorKind::InvalidCoordinates
            | ErrorKind::InvalidElementState
            | ErrorKind::InvalidSelector => 400,
            ErrorKind::InvalidSessionId
            | ErrorKind::NoSuchAlert
            | ErrorKind::NoSuchElement
            | ErrorKind::NoSuchFrame
            | ErrorKind::NoSuchWindow
            | ErrorKind::StaleElementReference
            | ErrorKind::UnknownCommand => 404,
            ErrorKind::UnknownMethod => 405,
            ErrorKind::ScriptTimeout | ErrorKind::Timeout => 408,
            ErrorKind::UnexpectedAlertOpen => 500,
            ErrorKind::MoveTargetOutOfBounds
            | ErrorKind::JavascriptError
            | ErrorKind::SessionNotCreated
            | ErrorKind::UnableToSetCookie
            | ErrorKind::UnableToCaptureScreen
            | ErrorKind::UnknownError
            | ErrorKind::UnsupportedOperation => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A structured error decoded from a wire-protocol error response.
///
/// Remote stacktraces are kept separate from the message so callers can
/// decide independently whether to display or log them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}: {}", kind.code(), message)]
pub struct WebDriverError {
    pub kind: ErrorKind,
    pub message: String,
    pub stacktrace: String,
    /// Alert text, populated only for `UnexpectedAlertOpen`.
    pub alert_text: Option<String>,
}

impl WebDriverError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        WebDriverError {
            kind,
            message: message.into(),
            stacktrace: String::new(),
            alert_text: None,
        }
    }

    pub fn with_stacktrace(mut self, stacktrace: impl Into<String>) -> Self {
        self.stacktrace = stacktrace.into();
        self
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownError, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn unknown_command(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownCommand, message)
    }

    pub fn unsupported_operation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedOperation, message)
    }

    pub fn unexpected_alert(message: impl Into<String>, alert_text: impl Into<String>) -> Self {
        WebDriverError {
            kind: ErrorKind::UnexpectedAlertOpen,
            message: message.into(),
            stacktrace: String::new(),
            alert_text: Some(alert_text.into()),
        }
    }
}

/// Decode a legacy (numeric status) error payload.
///
/// `value` is the response's `value` field; its `message` becomes the
/// error message. Unexpected-alert responses additionally carry the alert
/// text under `value.alert.text` (empty string when absent).
pub fn decode_legacy(status: i64, value: &Value) -> WebDriverError {
    let kind = ErrorKind::from_legacy_status(status);
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if kind == ErrorKind::UnexpectedAlertOpen {
        let alert_text = value
            .get("alert")
            .and_then(|a| a.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return WebDriverError::unexpected_alert(message, alert_text);
    }

    WebDriverError::new(kind, message)
}

/// Decode a W3C (string code) error payload.
///
/// Unrecognized code strings decode to `UnknownError`; `stacktrace`
/// defaults to the empty string when omitted.
pub fn decode_w3c(payload: &Value) -> WebDriverError {
    let code = payload.get("error").and_then(Value::as_str).unwrap_or("");
    let kind = ErrorKind::from_code(code).unwrap_or(ErrorKind::UnknownError);
    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let stacktrace = payload
        .get("stacktrace")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut err = WebDriverError::new(kind, message).with_stacktrace(stacktrace);
    if kind == ErrorKind::UnexpectedAlertOpen {
        let alert_text = payload
            .get("data")
            .and_then(|d| d.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        err.alert_text = Some(alert_text);
    }
    err
}

/// Check a response payload for a W3C-encoded error.
///
/// Returns `Err` only when an `error` field is present AND is a string;
/// a non-string `error` value is not an encoded error, so the payload
/// passes through untouched and the caller keeps the original response.
pub fn check_response(payload: &Value) -> Result<(), WebDriverError> {
    match payload.get("error") {
        Some(Value::String(_)) => Err(decode_w3c(payload)),
        _ => Ok(()),
    }
}

/// Encode a structured error back into the W3C `{error, message}` shape.
pub fn encode_error(err: &WebDriverError) -> Value {
    json!({
        "error": err.kind.code(),
        "message": err.message,
    })
}

/// Encode an arbitrary error-like value, defaulting to the unknown-error
/// code with a best-effort string coercion as the message.
pub fn encode_any(err: &dyn fmt::Display) -> Value {
    json!({
        "error": ErrorKind::UnknownError.code(),
        "message": err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KINDS: &[ErrorKind] = &[
        ErrorKind::ElementNotSelectable,
        ErrorKind::ElementNotVisible,
        ErrorKind::InvalidArgument,
        ErrorKind::InvalidCookieDomain,
        ErrorKind::InvalidCoordinates,
        ErrorKind::InvalidElementState,
        ErrorKind::InvalidSelector,
        ErrorKind::InvalidSessionId,
        ErrorKind::JavascriptError,
        ErrorKind::MoveTargetOutOfBounds,
        ErrorKind::NoSuchAlert,
        ErrorKind::NoSuchElement,
        ErrorKind::NoSuchFrame,
        ErrorKind::NoSuchWindow,
        ErrorKind::ScriptTimeout,
        ErrorKind::SessionNotCreated,
        ErrorKind::StaleElementReference,
        ErrorKind::Timeout,
        ErrorKind::UnableToSetCookie,
        ErrorKind::UnableToCaptureScreen,
        ErrorKind::UnexpectedAlertOpen,
        ErrorKind::UnknownCommand,
        ErrorKind::UnknownError,
        ErrorKind::UnknownMethod,
        ErrorKind::UnsupportedOperation,
    ];

    #[test]
    fn test_encode_decode_round_trip_all_kinds() {
        for &kind in ALL_KINDS {
            let original = WebDriverError::new(kind, format!("err for {}", kind.code()));
            let encoded = encode_error(&original);
            let decoded = decode_w3c(&encoded);

            assert_eq!(decoded.kind, original.kind, "kind {}", kind.code());
            assert_eq!(decoded.message, original.message);
        }
    }

    #[test]
    fn test_check_response_passes_non_string_error() {
        // `error` holding a non-string is a legitimate result value, not
        // an encoded error.
        let payload = serde_json::json!({"error": 42, "message": "not an error"});
        assert!(check_response(&payload).is_ok());

        let payload = serde_json::json!({"error": {"nested": true}});
        assert!(check_response(&payload).is_ok());
    }

    #[test]
    fn test_check_response_detects_string_error() {
        let payload = serde_json::json!({"error": "no such element", "message": "oops"});
        let err = check_response(&payload).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoSuchElement);
        assert_eq!(err.message, "oops");
    }

    #[test]
    fn test_unrecognized_code_decodes_to_unknown_error() {
        let payload = serde_json::json!({"error": "flux capacitor drained", "message": "m"});
        let err = decode_w3c(&payload);
        assert_eq!(err.kind, ErrorKind::UnknownError);
        assert_eq!(err.message, "m");
    }

    #[test]
    fn test_stacktrace_defaults_empty() {
        let payload = serde_json::json!({"error": "timeout", "message": "m"});
        let err = decode_w3c(&payload);
        assert_eq!(err.stacktrace, "");

        let payload =
            serde_json::json!({"error": "timeout", "message": "m", "stacktrace": "at foo()"});
        let err = decode_w3c(&payload);
        assert_eq!(err.stacktrace, "at foo()");
    }

    #[test]
    fn test_legacy_decode() {
        let value = serde_json::json!({"message": "element is gone"});
        let err = decode_legacy(10, &value);
        assert_eq!(err.kind, ErrorKind::StaleElementReference);
        assert_eq!(err.message, "element is gone");
    }

    #[test]
    fn test_legacy_unexpected_alert_extracts_text() {
        let value = serde_json::json!({
            "message": "alert open",
            "alert": {"text": "Are you sure?"}
        });
        let err = decode_legacy(26, &value);
        assert_eq!(err.kind, ErrorKind::UnexpectedAlertOpen);
        assert_eq!(err.alert_text.as_deref(), Some("Are you sure?"));

        // Missing alert payload yields an empty string, not None.
        let value = serde_json::json!({"message": "alert open"});
        let err = decode_legacy(26, &value);
        assert_eq!(err.alert_text.as_deref(), Some(""));
    }

    #[test]
    fn test_legacy_unknown_status() {
        let err = decode_legacy(9999, &serde_json::json!({"message": "?"}));
        assert_eq!(err.kind, ErrorKind::UnknownError);
    }

    #[test]
    fn test_coordinate_code_alias() {
        assert_eq!(
            ErrorKind::from_code("invalid element coordinates"),
            Some(ErrorKind::InvalidCoordinates)
        );
        assert_eq!(
            ErrorKind::from_code("invalid coordinates"),
            Some(ErrorKind::InvalidCoordinates)
        );
    }

    #[test]
    fn test_http_status_pairing() {
        assert_eq!(ErrorKind::InvalidArgument.http_status(), 400);
        assert_eq!(ErrorKind::NoSuchElement.http_status(), 404);
        assert_eq!(ErrorKind::StaleElementReference.http_status(), 404);
        assert_eq!(ErrorKind::UnknownMethod.http_status(), 405);
        assert_eq!(ErrorKind::Timeout.http_status(), 408);
        assert_eq!(ErrorKind::JavascriptError.http_status(), 500);

        // Every kind pairs with a real HTTP error status.
        for &kind in ALL_KINDS {
            let status = kind.http_status();
            assert!((400..=599).contains(&status), "{}: {status}", kind.code());
        }
    }

    #[test]
    fn test_encode_any_coerces() {
        let encoded = encode_any(&"something broke");
        assert_eq!(encoded["error"], "unknown error");
        assert_eq!(encoded["message"], "something broke");
    }

    #[test]
    fn test_display_format() {
        let err = WebDriverError::new(ErrorKind::NoSuchWindow, "window closed");
        assert_eq!(format!("{}", err), "no such window: window closed");
    }
}
