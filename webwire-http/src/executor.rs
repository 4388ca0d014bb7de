//! The wire executor: turns a [`Command`] into an HTTP request, sends it
//! through the injected client and decodes the response, detecting the
//! server's protocol dialect along the way.

use crate::client::{HttpClient, HttpMethod, WireRequest, WireResponse};
use crate::routes::{build_path, standard_routes, CommandRoute};
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, trace};
use webwire_core::{Command, CommandName, Dialect, WebDriverError};
use webwire_core::error::{check_response, decode_legacy};

/// HTTP client constructed on first use, optionally from a deferred
/// initialization future.
struct LazyClient<C> {
    cell: OnceCell<C>,
    init: Mutex<Option<BoxFuture<'static, Result<C, WebDriverError>>>>,
}

impl<C: HttpClient> LazyClient<C> {
    fn ready(client: C) -> Self {
        let cell = OnceCell::new();
        // A fresh cell accepts exactly one value.
        let _ = cell.set(client);
        LazyClient {
            cell,
            init: Mutex::new(None),
        }
    }

    fn deferred(fut: BoxFuture<'static, Result<C, WebDriverError>>) -> Self {
        LazyClient {
            cell: OnceCell::new(),
            init: Mutex::new(Some(fut)),
        }
    }

    async fn get(&self) -> Result<&C, WebDriverError> {
        self.cell
            .get_or_try_init(|| async {
                let fut = {
                    let mut slot = match self.init.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    slot.take()
                };
                match fut {
                    Some(fut) => fut.await,
                    None => Err(WebDriverError::unknown(
                        "HTTP client initialization failed previously",
                    )),
                }
            })
            .await
    }
}

/// Sends commands over HTTP and decodes wire responses.
///
/// The executor starts in the legacy JSON Wire Protocol dialect and
/// upgrades itself to W3C when a NEW_SESSION response has the W3C shape;
/// once upgraded it never downgrades.
pub struct WireExecutor<C: HttpClient> {
    client: LazyClient<C>,
    routes: DashMap<CommandName, CommandRoute>,
    w3c: AtomicBool,
}

impl<C: HttpClient> WireExecutor<C> {
    pub fn new(client: C) -> Self {
        Self::build(LazyClient::ready(client))
    }

    /// Construct with a client that is itself produced asynchronously;
    /// the future is awaited once, before the first request.
    pub fn with_deferred_client(
        fut: BoxFuture<'static, Result<C, WebDriverError>>,
    ) -> Self {
        Self::build(LazyClient::deferred(fut))
    }

    fn build(client: LazyClient<C>) -> Self {
        let routes = DashMap::new();
        for (name, route) in standard_routes() {
            routes.insert(name, route);
        }
        WireExecutor {
            client,
            routes,
            w3c: AtomicBool::new(false),
        }
    }

    /// Register or override the HTTP binding for a command name. Built-in
    /// routes can be redefined for protocol or vendor variations.
    pub fn define_command(
        &self,
        name: CommandName,
        method: HttpMethod,
        path: impl Into<String>,
    ) {
        self.routes.insert(name, CommandRoute::new(method, path));
    }

    /// The dialect negotiated so far.
    pub fn dialect(&self) -> Dialect {
        if self.w3c.load(Ordering::SeqCst) {
            Dialect::W3c
        } else {
            Dialect::Legacy
        }
    }

    /// Execute one command and return its decoded `value` payload (or the
    /// normalized `{sessionId, capabilities}` object for session commands).
    pub async fn execute(&self, command: &Command) -> Result<Value, WebDriverError> {
        let route = self
            .routes
            .get(command.name())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                WebDriverError::unknown_command(format!(
                    "Unrecognized command: {}",
                    command.name()
                ))
            })?;

        let mut parameters = command.parameters().clone();
        let path = build_path(&route.path, &mut parameters)?;
        let data = match route.method {
            HttpMethod::Post => Some(Value::Object(parameters)),
            HttpMethod::Get | HttpMethod::Delete => None,
        };

        debug!(command = %command.name(), method = %route.method, %path, "executing");
        let client = self.client.get().await?;
        let response = client
            .send(WireRequest::new(route.method, path, data))
            .await?;
        self.decode_response(command.name(), response)
    }

    fn decode_response(
        &self,
        name: &CommandName,
        response: WireResponse,
    ) -> Result<Value, WebDriverError> {
        let payload = match serde_json::from_str::<Value>(&response.body) {
            Ok(Value::Object(payload)) => payload,
            // A non-object JSON body on a success status is the result
            // itself.
            Ok(other) if response.is_success() => return Ok(other),
            // Anything else falls back to the raw text, CRLF-normalized;
            // non-2xx statuses become errors.
            _ => {
                let text = response.body.replace("\r\n", "\n");
                return if response.is_success() {
                    Ok(Value::String(text))
                } else if response.status == 404 {
                    Err(WebDriverError::unsupported_operation(text))
                } else {
                    Err(WebDriverError::unknown(text))
                };
            }
        };
        trace!(command = %name, status = response.status, "decoding payload");

        // Legacy servers report failure through a numeric status.
        if let Some(status) = payload.get("status").and_then(Value::as_i64) {
            if status != 0 {
                let value = payload.get("value").cloned().unwrap_or(Value::Null);
                return Err(decode_legacy(status, &value));
            }
        }
        check_response(&Value::Object(payload.clone()))?;

        if name.is_session_command() {
            return self.decode_session(name, payload);
        }
        Ok(payload.get("value").cloned().unwrap_or(Value::Null))
    }

    /// Normalize a session response to `{sessionId, capabilities}`,
    /// accepting both the flat legacy shape and the nested W3C one, and
    /// upgrade the dialect on a status-less NEW_SESSION response.
    fn decode_session(
        &self,
        name: &CommandName,
        payload: Map<String, Value>,
    ) -> Result<Value, WebDriverError> {
        let flat = payload.get("sessionId").and_then(Value::as_str);
        let nested = payload
            .get("value")
            .and_then(|v| v.get("sessionId"))
            .and_then(Value::as_str);

        let (session_id, capabilities) = match (flat, nested) {
            (Some(id), _) => {
                let caps = payload.get("value").cloned().unwrap_or(Value::Null);
                (id.to_string(), caps)
            }
            (None, Some(id)) => {
                let caps = payload
                    .get("value")
                    .and_then(|v| v.get("capabilities"))
                    .cloned()
                    .unwrap_or(Value::Null);
                (id.to_string(), caps)
            }
            (None, None) => {
                return Err(WebDriverError::unknown(format!(
                    "Unable to parse new session response: {}",
                    Value::Object(payload)
                )));
            }
        };

        // Only NEW_SESSION may flip the dialect, and only upward.
        if *name == CommandName::NewSession && !payload.contains_key("status") {
            if !self.w3c.swap(true, Ordering::SeqCst) {
                debug!("dialect upgraded to W3C");
            }
        }

        Ok(json!({
            "sessionId": session_id,
            "capabilities": capabilities,
        }))
    }
}
