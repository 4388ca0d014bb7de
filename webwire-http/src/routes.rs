//! Command-to-HTTP route catalog and URL template expansion.

use crate::client::HttpMethod;
use serde_json::{Map, Value};
use webwire_core::{CommandName, WebDriverError};

/// HTTP binding for one command: verb plus a `:param` URL template.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRoute {
    pub method: HttpMethod,
    pub path: String,
}

impl CommandRoute {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        CommandRoute {
            method,
            path: path.into(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        CommandRoute::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        CommandRoute::new(HttpMethod::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        CommandRoute::new(HttpMethod::Delete, path)
    }
}

/// Expand a `:param` URL template from the parameter map, consuming every
/// parameter used in the path. Remaining entries become the request body.
pub fn build_path(
    template: &str,
    parameters: &mut Map<String, Value>,
) -> Result<String, WebDriverError> {
    let mut segments = Vec::new();
    for segment in template.split('/') {
        match segment.strip_prefix(':') {
            Some(key) => {
                let value = parameters.remove(key).ok_or_else(|| {
                    WebDriverError::invalid_argument(format!(
                        "Missing required parameter: {key}"
                    ))
                })?;
                segments.push(stringify(&value));
            }
            None => segments.push(segment.to_string()),
        }
    }
    Ok(segments.join("/"))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The built-in command catalog matching the W3C endpoint layout.
/// Individual routes can be overridden through the executor.
pub fn standard_routes() -> Vec<(CommandName, CommandRoute)> {
    use CommandName::*;

    vec![
        (NewSession, CommandRoute::post("/session")),
        (DescribeSession, CommandRoute::get("/session/:sessionId")),
        (Quit, CommandRoute::delete("/session/:sessionId")),
        (GetCurrentUrl, CommandRoute::get("/session/:sessionId/url")),
        (Get, CommandRoute::post("/session/:sessionId/url")),
        (GoBack, CommandRoute::post("/session/:sessionId/back")),
        (GoForward, CommandRoute::post("/session/:sessionId/forward")),
        (Refresh, CommandRoute::post("/session/:sessionId/refresh")),
        (GetTitle, CommandRoute::get("/session/:sessionId/title")),
        (GetPageSource, CommandRoute::get("/session/:sessionId/source")),
        (FindElement, CommandRoute::post("/session/:sessionId/element")),
        (FindElements, CommandRoute::post("/session/:sessionId/elements")),
        (
            FindChildElement,
            CommandRoute::post("/session/:sessionId/element/:id/element"),
        ),
        (
            FindChildElements,
            CommandRoute::post("/session/:sessionId/element/:id/elements"),
        ),
        (
            GetActiveElement,
            CommandRoute::get("/session/:sessionId/element/active"),
        ),
        (
            ClickElement,
            CommandRoute::post("/session/:sessionId/element/:id/click"),
        ),
        (
            ClearElement,
            CommandRoute::post("/session/:sessionId/element/:id/clear"),
        ),
        (
            SendKeysToElement,
            CommandRoute::post("/session/:sessionId/element/:id/value"),
        ),
        (
            GetElementText,
            CommandRoute::get("/session/:sessionId/element/:id/text"),
        ),
        (
            GetElementTagName,
            CommandRoute::get("/session/:sessionId/element/:id/name"),
        ),
        (
            GetElementAttribute,
            CommandRoute::get("/session/:sessionId/element/:id/attribute/:name"),
        ),
        (
            GetElementProperty,
            CommandRoute::get("/session/:sessionId/element/:id/property/:name"),
        ),
        (
            GetCssValue,
            CommandRoute::get("/session/:sessionId/element/:id/css/:propertyName"),
        ),
        (
            GetElementRect,
            CommandRoute::get("/session/:sessionId/element/:id/rect"),
        ),
        (
            IsElementEnabled,
            CommandRoute::get("/session/:sessionId/element/:id/enabled"),
        ),
        (
            IsElementSelected,
            CommandRoute::get("/session/:sessionId/element/:id/selected"),
        ),
        (
            IsElementDisplayed,
            CommandRoute::get("/session/:sessionId/element/:id/displayed"),
        ),
        (
            ExecuteScript,
            CommandRoute::post("/session/:sessionId/execute/sync"),
        ),
        (
            ExecuteAsyncScript,
            CommandRoute::post("/session/:sessionId/execute/async"),
        ),
        (GetAlertText, CommandRoute::get("/session/:sessionId/alert/text")),
        (SetAlertText, CommandRoute::post("/session/:sessionId/alert/text")),
        (AcceptAlert, CommandRoute::post("/session/:sessionId/alert/accept")),
        (
            DismissAlert,
            CommandRoute::post("/session/:sessionId/alert/dismiss"),
        ),
        (Screenshot, CommandRoute::get("/session/:sessionId/screenshot")),
        (
            TakeElementScreenshot,
            CommandRoute::get("/session/:sessionId/element/:id/screenshot"),
        ),
        (SetTimeout, CommandRoute::post("/session/:sessionId/timeouts")),
        (GetCookies, CommandRoute::get("/session/:sessionId/cookie")),
        (AddCookie, CommandRoute::post("/session/:sessionId/cookie")),
        (
            DeleteCookie,
            CommandRoute::delete("/session/:sessionId/cookie/:name"),
        ),
        (
            DeleteAllCookies,
            CommandRoute::delete("/session/:sessionId/cookie"),
        ),
        (SwitchToFrame, CommandRoute::post("/session/:sessionId/frame")),
        (
            SwitchToParentFrame,
            CommandRoute::post("/session/:sessionId/frame/parent"),
        ),
        (SwitchToWindow, CommandRoute::post("/session/:sessionId/window")),
        (
            GetWindowHandles,
            CommandRoute::get("/session/:sessionId/window/handles"),
        ),
        (
            GetCurrentWindowHandle,
            CommandRoute::get("/session/:sessionId/window"),
        ),
        (CloseWindow, CommandRoute::delete("/session/:sessionId/window")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use webwire_core::ErrorKind;

    #[test]
    fn test_build_path_consumes_parameters() {
        let mut params = Map::new();
        params.insert("sessionId".to_string(), json!("foo"));
        params.insert("id".to_string(), json!("bar"));
        params.insert("extra".to_string(), json!(1));

        let path =
            build_path("/session/:sessionId/element/:id/click", &mut params).unwrap();
        assert_eq!(path, "/session/foo/element/bar/click");
        assert!(!params.contains_key("sessionId"));
        assert!(!params.contains_key("id"));
        assert!(params.contains_key("extra"));
    }

    #[test]
    fn test_build_path_missing_parameter() {
        let mut params = Map::new();
        params.insert("sessionId".to_string(), json!("foo"));

        let err =
            build_path("/session/:sessionId/element/:id/click", &mut params).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert_eq!(err.message, "Missing required parameter: id");
    }

    #[test]
    fn test_build_path_non_string_values() {
        let mut params = Map::new();
        params.insert("id".to_string(), json!(42));
        let path = build_path("/thing/:id", &mut params).unwrap();
        assert_eq!(path, "/thing/42");
    }

    #[test]
    fn test_standard_catalog_covers_builtins() {
        let routes = standard_routes();
        let names: Vec<&CommandName> = routes.iter().map(|(name, _)| name).collect();
        assert!(names.contains(&&CommandName::NewSession));
        assert!(names.contains(&&CommandName::GetCurrentUrl));
        assert!(names.contains(&&CommandName::ClickElement));
        // Session-scoped routes all template the session id.
        for (name, route) in &routes {
            if !name.is_session_command() && *name != CommandName::NewSession {
                assert!(
                    route.path.contains(":sessionId"),
                    "{name} route {} lacks session id",
                    route.path
                );
            }
        }
    }
}
