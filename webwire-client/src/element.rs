//! Client-side element handles and inbound wire-value decoding.

use crate::client::WebDriverClient;
use serde_json::Value;
use std::fmt;
use webwire_core::value::element_id_of;
use webwire_core::CommandName;
use webwire_flow::FlowError;

/// Handle to a server-side DOM element, bound to the session that
/// produced it.
#[derive(Clone)]
pub struct WebElement {
    id: String,
    driver: Option<WebDriverClient>,
}

impl WebElement {
    pub(crate) fn bound(driver: WebDriverClient, id: impl Into<String>) -> Self {
        WebElement {
            id: id.into(),
            driver: Some(driver),
        }
    }

    /// A handle carrying only the opaque id, not bound to any driver.
    /// Useful for re-encoding stored references; command methods fail.
    pub fn detached(id: impl Into<String>) -> Self {
        WebElement {
            id: id.into(),
            driver: None,
        }
    }

    /// The server-assigned opaque element id.
    pub fn id(&self) -> &str {
        &self.id
    }

    fn driver(&self) -> Result<&WebDriverClient, FlowError> {
        self.driver
            .as_ref()
            .ok_or_else(|| FlowError::custom("element is not bound to a driver"))
    }

    async fn command(&self, name: CommandName) -> Result<Value, FlowError> {
        let driver = self.driver()?;
        driver.element_command(name, &self.id).resolved().await
    }

    pub async fn click(&self) -> Result<(), FlowError> {
        self.command(CommandName::ClickElement).await.map(|_| ())
    }

    pub async fn clear(&self) -> Result<(), FlowError> {
        self.command(CommandName::ClearElement).await.map(|_| ())
    }

    pub async fn send_keys(&self, text: &str) -> Result<(), FlowError> {
        let driver = self.driver()?;
        let chars: Vec<String> = text.chars().map(|c| c.to_string()).collect();
        driver
            .element_command_with(CommandName::SendKeysToElement, &self.id, |cmd| {
                cmd.set_param("text", text);
                cmd.set_param("value", chars);
            })
            .resolved()
            .await
            .map(|_| ())
    }

    pub async fn text(&self) -> Result<String, FlowError> {
        self.command(CommandName::GetElementText)
            .await
            .map(as_string)
    }

    pub async fn tag_name(&self) -> Result<String, FlowError> {
        self.command(CommandName::GetElementTagName)
            .await
            .map(as_string)
    }

    /// DOM attribute value, `None` when the attribute is absent.
    pub async fn attribute(&self, name: &str) -> Result<Option<String>, FlowError> {
        let driver = self.driver()?;
        let value = driver
            .element_command_with(CommandName::GetElementAttribute, &self.id, |cmd| {
                cmd.set_param("name", name)
            })
            .resolved()
            .await?;
        Ok(value.as_str().map(String::from))
    }

    pub async fn property(&self, name: &str) -> Result<Option<String>, FlowError> {
        let driver = self.driver()?;
        let value = driver
            .element_command_with(CommandName::GetElementProperty, &self.id, |cmd| {
                cmd.set_param("name", name)
            })
            .resolved()
            .await?;
        Ok(value.as_str().map(String::from))
    }

    pub async fn css_value(&self, property: &str) -> Result<String, FlowError> {
        let driver = self.driver()?;
        driver
            .element_command_with(CommandName::GetCssValue, &self.id, |cmd| {
                cmd.set_param("propertyName", property)
            })
            .resolved()
            .await
            .map(as_string)
    }

    pub async fn is_enabled(&self) -> Result<bool, FlowError> {
        self.command(CommandName::IsElementEnabled)
            .await
            .map(|v| v.as_bool().unwrap_or(false))
    }

    pub async fn is_selected(&self) -> Result<bool, FlowError> {
        self.command(CommandName::IsElementSelected)
            .await
            .map(|v| v.as_bool().unwrap_or(false))
    }

    pub async fn is_displayed(&self) -> Result<bool, FlowError> {
        self.command(CommandName::IsElementDisplayed)
            .await
            .map(|v| v.as_bool().unwrap_or(false))
    }

    /// Base64-encoded PNG of this element.
    pub async fn screenshot(&self) -> Result<String, FlowError> {
        self.command(CommandName::TakeElementScreenshot)
            .await
            .map(as_string)
    }

    /// Locate a descendant of this element.
    pub async fn find_element(&self, by: crate::client::By) -> Result<WebElement, FlowError> {
        let driver = self.driver()?;
        let value = driver
            .element_command_with(CommandName::FindChildElement, &self.id, |cmd| {
                cmd.set_param("using", by.using.as_str());
                cmd.set_param("value", by.value.as_str());
            })
            .resolved()
            .await?;
        driver.element_from_value(&value)
    }
}

fn as_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl fmt::Debug for WebElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebElement")
            .field("id", &self.id)
            .field("bound", &self.driver.is_some())
            .finish()
    }
}

/// A decoded response value: wire element references become bound
/// [`WebElement`] handles, containers are walked recursively, everything
/// else passes through as plain JSON (including explicit `null`).
#[derive(Debug, Clone)]
pub enum WireValue {
    Element(WebElement),
    Array(Vec<WireValue>),
    Object(Vec<(String, WireValue)>),
    Json(Value),
}

impl WireValue {
    pub fn decode(value: Value, driver: &WebDriverClient) -> WireValue {
        if let Some(id) = element_id_of(&value) {
            return WireValue::Element(WebElement::bound(driver.clone(), id));
        }
        match value {
            Value::Array(items) => WireValue::Array(
                items
                    .into_iter()
                    .map(|item| WireValue::decode(item, driver))
                    .collect(),
            ),
            Value::Object(entries) => WireValue::Object(
                entries
                    .into_iter()
                    .map(|(key, item)| (key, WireValue::decode(item, driver)))
                    .collect(),
            ),
            other => WireValue::Json(other),
        }
    }

    pub fn as_element(&self) -> Option<&WebElement> {
        match self {
            WireValue::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            WireValue::Json(value) => Some(value),
            _ => None,
        }
    }
}
