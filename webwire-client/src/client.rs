//! The high-level driver client: schedules commands on a control flow,
//! injects the session id, and decodes results into typed handles.

use crate::args::{encode_args, Arg};
use crate::element::{WebElement, WireValue};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use webwire_core::value::element_id_of;
use webwire_core::{Capabilities, Command, CommandName, Dialect, Session, WebDriverError};
use webwire_flow::{ControlFlow, FlowError, PromiseHandle, TaskReturn};
use webwire_http::{ClientConfig, HttpClient, ReqwestClient, WireExecutor};

/// Element location strategy, expressed as the wire `using` string plus
/// its selector value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct By {
    pub using: String,
    pub value: String,
}

impl By {
    pub fn css(selector: impl Into<String>) -> Self {
        By {
            using: "css selector".to_string(),
            value: selector.into(),
        }
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        By {
            using: "xpath".to_string(),
            value: expression.into(),
        }
    }

    pub fn link_text(text: impl Into<String>) -> Self {
        By {
            using: "link text".to_string(),
            value: text.into(),
        }
    }

    pub fn tag_name(name: impl Into<String>) -> Self {
        By {
            using: "tag name".to_string(),
            value: name.into(),
        }
    }
}

struct DriverCore {
    executor: WireExecutor<Box<dyn HttpClient>>,
    flow: ControlFlow,
    session: Mutex<Option<Session>>,
}

impl DriverCore {
    fn session_id(&self) -> Option<String> {
        let guard = match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.as_ref().map(|s| s.id().to_string())
    }
}

/// WebDriver client. Cheap to clone; clones share the executor, control
/// flow and session.
#[derive(Clone)]
pub struct WebDriverClient {
    core: Arc<DriverCore>,
}

impl WebDriverClient {
    /// Connect to a remote end over HTTP with its own control flow.
    pub fn new(config: ClientConfig) -> Result<Self, WebDriverError> {
        let client = ReqwestClient::new(config)?;
        Ok(Self::with_client(Box::new(client)))
    }

    /// Build on an injected transport (tests, custom tunnels).
    pub fn with_client(client: Box<dyn HttpClient>) -> Self {
        Self::with_client_and_flow(client, ControlFlow::new())
    }

    /// Build on an injected transport sharing an existing flow, so two
    /// clients' command streams interleave deterministically.
    pub fn with_client_and_flow(client: Box<dyn HttpClient>, flow: ControlFlow) -> Self {
        WebDriverClient {
            core: Arc::new(DriverCore {
                executor: WireExecutor::new(client),
                flow,
                session: Mutex::new(None),
            }),
        }
    }

    pub fn flow(&self) -> ControlFlow {
        self.core.flow.clone()
    }

    pub fn dialect(&self) -> Dialect {
        self.core.executor.dialect()
    }

    pub fn session(&self) -> Option<Session> {
        let guard = match self.core.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone()
    }

    /// Schedule a command on the control flow. The session id is injected
    /// at run time if the command does not carry one, so commands queued
    /// before the session exists still resolve it correctly.
    pub fn schedule(&self, command: Command) -> PromiseHandle {
        let label = command.name().to_string();
        let core = self.core.clone();
        self.core.flow.execute(label, move |_| {
            let mut command = command;
            if !command.has_param("sessionId") {
                if let Some(id) = core.session_id() {
                    command.set_param("sessionId", id);
                }
            }
            debug!(command = %command, "dispatching");
            Ok(TaskReturn::Future(Box::pin(async move {
                core.executor
                    .execute(&command)
                    .await
                    .map_err(FlowError::from)
            })))
        })
    }

    pub(crate) fn element_command(&self, name: CommandName, element_id: &str) -> PromiseHandle {
        self.schedule(Command::new(name).with_param("id", element_id))
    }

    pub(crate) fn element_command_with(
        &self,
        name: CommandName,
        element_id: &str,
        fill: impl FnOnce(&mut Command),
    ) -> PromiseHandle {
        let mut command = Command::new(name).with_param("id", element_id);
        fill(&mut command);
        self.schedule(command)
    }

    pub(crate) fn element_from_value(&self, value: &Value) -> Result<WebElement, FlowError> {
        match element_id_of(value) {
            Some(id) => Ok(WebElement::bound(self.clone(), id)),
            None => Err(FlowError::custom(format!(
                "response does not contain an element reference: {value}"
            ))),
        }
    }

    /// Start a session. Capabilities are sent in both the W3C and legacy
    /// shapes so either server generation can negotiate.
    pub async fn new_session(&self, capabilities: Capabilities) -> Result<Session, FlowError> {
        let caps = Value::from(capabilities);
        let command = Command::new(CommandName::NewSession)
            .with_param("capabilities", json!({ "alwaysMatch": caps.clone() }))
            .with_param("desiredCapabilities", caps);

        // Record the session in a chained callback rather than after the
        // await: the callback runs with precedence, before any command
        // already queued behind NEW_SESSION, so those commands find the
        // session id when they inject it.
        let core = self.core.clone();
        let recorded = self.schedule(command).then(
            Some(Box::new(move |payload, _| {
                let session = Session::from_new_session(&payload).map_err(FlowError::from)?;
                let mut guard = match core.session.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                *guard = Some(session);
                Ok(TaskReturn::Done(payload))
            })),
            None,
        );

        let payload = recorded.resolved().await?;
        let session = Session::from_new_session(&payload).map_err(FlowError::from)?;
        info!(session = session.id(), dialect = ?self.dialect(), "session created");
        Ok(session)
    }

    /// End the session and forget it locally.
    pub async fn quit(&self) -> Result<(), FlowError> {
        self.schedule(Command::new(CommandName::Quit))
            .resolved()
            .await?;
        let mut guard = match self.core.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = None;
        Ok(())
    }

    pub async fn get(&self, url: &str) -> Result<(), FlowError> {
        self.schedule(Command::new(CommandName::Get).with_param("url", url))
            .resolved()
            .await
            .map(|_| ())
    }

    pub async fn current_url(&self) -> Result<String, FlowError> {
        self.string_command(CommandName::GetCurrentUrl).await
    }

    pub async fn title(&self) -> Result<String, FlowError> {
        self.string_command(CommandName::GetTitle).await
    }

    pub async fn page_source(&self) -> Result<String, FlowError> {
        self.string_command(CommandName::GetPageSource).await
    }

    /// Base64-encoded PNG of the viewport.
    pub async fn screenshot(&self) -> Result<String, FlowError> {
        self.string_command(CommandName::Screenshot).await
    }

    async fn string_command(&self, name: CommandName) -> Result<String, FlowError> {
        let value = self.schedule(Command::new(name)).resolved().await?;
        match value {
            Value::String(s) => Ok(s),
            other => Err(FlowError::custom(format!(
                "expected a string response, got: {other}"
            ))),
        }
    }

    pub async fn back(&self) -> Result<(), FlowError> {
        self.unit_command(CommandName::GoBack).await
    }

    pub async fn forward(&self) -> Result<(), FlowError> {
        self.unit_command(CommandName::GoForward).await
    }

    pub async fn refresh(&self) -> Result<(), FlowError> {
        self.unit_command(CommandName::Refresh).await
    }

    async fn unit_command(&self, name: CommandName) -> Result<(), FlowError> {
        self.schedule(Command::new(name)).resolved().await.map(|_| ())
    }

    pub async fn find_element(&self, by: By) -> Result<WebElement, FlowError> {
        let value = self
            .schedule(
                Command::new(CommandName::FindElement)
                    .with_param("using", by.using)
                    .with_param("value", by.value),
            )
            .resolved()
            .await?;
        self.element_from_value(&value)
    }

    pub async fn find_elements(&self, by: By) -> Result<Vec<WebElement>, FlowError> {
        let value = self
            .schedule(
                Command::new(CommandName::FindElements)
                    .with_param("using", by.using)
                    .with_param("value", by.value),
            )
            .resolved()
            .await?;
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| self.element_from_value(item))
                .collect(),
            other => Err(FlowError::custom(format!(
                "expected an element list, got: {other}"
            ))),
        }
    }

    /// Run a script in the page, marshaling arguments (elements, promises,
    /// containers) outbound and decoding element references inbound.
    pub async fn execute_script(
        &self,
        script: &str,
        args: Vec<Arg>,
    ) -> Result<WireValue, FlowError> {
        self.script_command(CommandName::ExecuteScript, script, args)
            .await
    }

    pub async fn execute_async_script(
        &self,
        script: &str,
        args: Vec<Arg>,
    ) -> Result<WireValue, FlowError> {
        self.script_command(CommandName::ExecuteAsyncScript, script, args)
            .await
    }

    async fn script_command(
        &self,
        name: CommandName,
        script: &str,
        args: Vec<Arg>,
    ) -> Result<WireValue, FlowError> {
        let encoded = encode_args(args, self.dialect()).await?;
        let value = self
            .schedule(
                Command::new(name)
                    .with_param("script", script)
                    .with_param("args", Value::Array(encoded)),
            )
            .resolved()
            .await?;
        Ok(WireValue::decode(value, self))
    }
}
