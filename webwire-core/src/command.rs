// Command model: a named remote operation plus its named parameters,
// prior to wire encoding. Callers build `Command` values and hand them to
// the executor; they never touch raw HTTP.

use serde_json::{Map, Value};
use std::fmt;

/// Identifier for a remote WebDriver operation.
///
/// The built-in variants cover the standard catalog; `Custom` lets callers
/// register protocol extensions through the executor's route table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandName {
    NewSession,
    DescribeSession,
    Quit,
    GetCurrentUrl,
    Get,
    GoBack,
    GoForward,
    Refresh,
    GetTitle,
    GetPageSource,
    FindElement,
    FindElements,
    FindChildElement,
    FindChildElements,
    GetActiveElement,
    ClickElement,
    ClearElement,
    SendKeysToElement,
    GetElementText,
    GetElementTagName,
    GetElementAttribute,
    GetElementProperty,
    GetCssValue,
    GetElementRect,
    IsElementEnabled,
    IsElementSelected,
    IsElementDisplayed,
    ExecuteScript,
    ExecuteAsyncScript,
    GetAlertText,
    SetAlertText,
    AcceptAlert,
    DismissAlert,
    Screenshot,
    TakeElementScreenshot,
    SetTimeout,
    GetCookies,
    AddCookie,
    DeleteCookie,
    DeleteAllCookies,
    SwitchToFrame,
    SwitchToParentFrame,
    SwitchToWindow,
    GetWindowHandles,
    GetCurrentWindowHandle,
    CloseWindow,
    Custom(String),
}

impl CommandName {
    /// Stable string name for the operation, used for route lookup and logs.
    pub fn as_str(&self) -> &str {
        match self {
            CommandName::NewSession => "newSession",
            CommandName::DescribeSession => "describeSession",
            CommandName::Quit => "quit",
            CommandName::GetCurrentUrl => "getCurrentUrl",
            CommandName::Get => "get",
            CommandName::GoBack => "goBack",
            CommandName::GoForward => "goForward",
            CommandName::Refresh => "refresh",
            CommandName::GetTitle => "getTitle",
            CommandName::GetPageSource => "getPageSource",
            CommandName::FindElement => "findElement",
            CommandName::FindElements => "findElements",
            CommandName::FindChildElement => "findChildElement",
            CommandName::FindChildElements => "findChildElements",
            CommandName::GetActiveElement => "getActiveElement",
            CommandName::ClickElement => "clickElement",
            CommandName::ClearElement => "clearElement",
            CommandName::SendKeysToElement => "sendKeysToElement",
            CommandName::GetElementText => "getElementText",
            CommandName::GetElementTagName => "getElementTagName",
            CommandName::GetElementAttribute => "getElementAttribute",
            CommandName::GetElementProperty => "getElementProperty",
            CommandName::GetCssValue => "getCssValue",
            CommandName::GetElementRect => "getElementRect",
            CommandName::IsElementEnabled => "isElementEnabled",
            CommandName::IsElementSelected => "isElementSelected",
            CommandName::IsElementDisplayed => "isElementDisplayed",
            CommandName::ExecuteScript => "executeScript",
            CommandName::ExecuteAsyncScript => "executeAsyncScript",
            CommandName::GetAlertText => "getAlertText",
            CommandName::SetAlertText => "setAlertText",
            CommandName::AcceptAlert => "acceptAlert",
            CommandName::DismissAlert => "dismissAlert",
            CommandName::Screenshot => "screenshot",
            CommandName::TakeElementScreenshot => "takeElementScreenshot",
            CommandName::SetTimeout => "setTimeout",
            CommandName::GetCookies => "getCookies",
            CommandName::AddCookie => "addCookie",
            CommandName::DeleteCookie => "deleteCookie",
            CommandName::DeleteAllCookies => "deleteAllCookies",
            CommandName::SwitchToFrame => "switchToFrame",
            CommandName::SwitchToParentFrame => "switchToParentFrame",
            CommandName::SwitchToWindow => "switchToWindow",
            CommandName::GetWindowHandles => "getWindowHandles",
            CommandName::GetCurrentWindowHandle => "getCurrentWindowHandle",
            CommandName::CloseWindow => "closeWindow",
            CommandName::Custom(name) => name,
        }
    }

    /// Whether this command establishes or describes a session, i.e.
    /// its response must carry a session id.
    pub fn is_session_command(&self) -> bool {
        matches!(
            self,
            CommandName::NewSession | CommandName::DescribeSession
        )
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named remote operation plus a map of named parameters.
///
/// Parameter values are plain JSON at this layer; higher layers resolve
/// promised or element-typed arguments before building the `Command`.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: CommandName,
    parameters: Map<String, Value>,
}

impl Command {
    pub fn new(name: CommandName) -> Self {
        Command {
            name,
            parameters: Map::new(),
        }
    }

    /// Builder-style parameter setter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.parameters.insert(key.into(), value.into());
    }

    pub fn name(&self) -> &CommandName {
        &self.name
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    pub fn has_param(&self, key: &str) -> bool {
        self.parameters.contains_key(key)
    }

    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    pub fn into_parts(self) -> (CommandName, Map<String, Value>) {
        (self.name, self.parameters)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({} params)", self.name, self.parameters.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_name_strings() {
        assert_eq!(CommandName::NewSession.as_str(), "newSession");
        assert_eq!(CommandName::GetCurrentUrl.as_str(), "getCurrentUrl");
        assert_eq!(
            CommandName::Custom("vendorCommand".to_string()).as_str(),
            "vendorCommand"
        );
    }

    #[test]
    fn test_session_commands() {
        assert!(CommandName::NewSession.is_session_command());
        assert!(CommandName::DescribeSession.is_session_command());
        assert!(!CommandName::GetCurrentUrl.is_session_command());
    }

    #[test]
    fn test_command_parameters() {
        let cmd = Command::new(CommandName::Get)
            .with_param("sessionId", "s123")
            .with_param("url", "http://example.com");

        assert_eq!(cmd.name(), &CommandName::Get);
        assert_eq!(cmd.param("sessionId"), Some(&json!("s123")));
        assert_eq!(cmd.param("url"), Some(&json!("http://example.com")));
        assert!(cmd.param("missing").is_none());
        assert!(cmd.has_param("url"));
    }

    #[test]
    fn test_command_into_parts() {
        let cmd = Command::new(CommandName::FindElement)
            .with_param("using", "css selector")
            .with_param("value", "#main");

        let (name, params) = cmd.into_parts();
        assert_eq!(name, CommandName::FindElement);
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("using"), Some(&json!("css selector")));
    }

    #[test]
    fn test_custom_name_hashes_by_string() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(CommandName::Custom("x".to_string()), 1);
        assert_eq!(map.get(&CommandName::Custom("x".to_string())), Some(&1));
        assert_eq!(map.get(&CommandName::Custom("y".to_string())), None);
    }
}
