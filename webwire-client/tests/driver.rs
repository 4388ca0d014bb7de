// Driver-level behavior against a scripted transport: session lifecycle,
// session-id injection, element handles, script argument marshaling.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use webwire_client::{Arg, By, WebDriverClient, WireValue};
use webwire_core::{Capabilities, Dialect, WebDriverError, ELEMENT_KEY_W3C};
use webwire_http::{HttpClient, WireRequest, WireResponse};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Hands out canned responses in order and records every request.
struct ScriptedClient {
    responses: Mutex<VecDeque<WireResponse>>,
    requests: Arc<Mutex<Vec<WireRequest>>>,
}

#[async_trait]
impl HttpClient for ScriptedClient {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, WebDriverError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| WebDriverError::unknown("no scripted response left"))
    }
}

fn json_response(body: Value) -> WireResponse {
    WireResponse::new(200, body.to_string())
}

fn scripted(responses: Vec<WireResponse>) -> (WebDriverClient, Arc<Mutex<Vec<WireRequest>>>) {
    init_tracing();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let client = ScriptedClient {
        responses: Mutex::new(responses.into()),
        requests: requests.clone(),
    };
    (WebDriverClient::with_client(Box::new(client)), requests)
}

fn w3c_session(id: &str) -> WireResponse {
    json_response(json!({
        "value": {"sessionId": id, "capabilities": {"browserName": "firefox"}}
    }))
}

#[tokio::test]
async fn new_session_stores_session_and_upgrades_dialect() {
    let (driver, _requests) = scripted(vec![w3c_session("s123")]);
    assert_eq!(driver.dialect(), Dialect::Legacy);

    let session = driver.new_session(Capabilities::new()).await.unwrap();
    assert_eq!(session.id(), "s123");
    assert_eq!(session.capabilities().browser_name(), Some("firefox"));
    assert_eq!(driver.dialect(), Dialect::W3c);
    assert_eq!(driver.session().unwrap().id(), "s123");
}

#[tokio::test]
async fn session_id_injected_into_later_commands() {
    let (driver, requests) = scripted(vec![
        w3c_session("s123"),
        json_response(json!({"value": "http://x"})),
    ]);
    driver.new_session(Capabilities::new()).await.unwrap();

    let url = driver.current_url().await.unwrap();
    assert_eq!(url, "http://x");

    let recorded = requests.lock().unwrap().clone();
    assert_eq!(recorded[1].path, "/session/s123/url");
}

#[tokio::test]
async fn commands_scheduled_before_session_resolve_it_at_run_time() {
    let (driver, requests) = scripted(vec![
        w3c_session("late"),
        json_response(json!({"value": "t"})),
    ]);

    // Both promises are queued on the flow before either runs; the title
    // command still sees the session id because injection happens when
    // the task body executes, after NEW_SESSION has settled.
    let session = driver.new_session(Capabilities::new());
    let title = driver.title();
    let (session, title) = tokio::join!(session, title);
    session.unwrap();
    assert_eq!(title.unwrap(), "t");

    let recorded = requests.lock().unwrap().clone();
    assert_eq!(recorded[1].path, "/session/late/title");
}

#[tokio::test]
async fn find_element_returns_bound_handle() {
    let (driver, requests) = scripted(vec![
        w3c_session("s1"),
        json_response(json!({"value": {ELEMENT_KEY_W3C: "el-9"}})),
        json_response(json!({"value": null})),
        json_response(json!({"value": "Log in"})),
    ]);
    driver.new_session(Capabilities::new()).await.unwrap();

    let element = driver.find_element(By::css("#login")).await.unwrap();
    assert_eq!(element.id(), "el-9");

    element.click().await.unwrap();
    let text = element.text().await.unwrap();
    assert_eq!(text, "Log in");

    let recorded = requests.lock().unwrap().clone();
    assert_eq!(recorded[1].path, "/session/s1/element");
    assert_eq!(
        recorded[1].data,
        Some(json!({"using": "css selector", "value": "#login"}))
    );
    assert_eq!(recorded[2].path, "/session/s1/element/el-9/click");
    assert_eq!(recorded[3].path, "/session/s1/element/el-9/text");
}

#[tokio::test]
async fn legacy_element_shape_is_accepted() {
    let (driver, _requests) = scripted(vec![
        json_response(json!({"sessionId": "s2", "status": 0, "value": {}})),
        json_response(json!({"status": 0, "value": {"ELEMENT": "legacy-el"}})),
    ]);
    driver.new_session(Capabilities::new()).await.unwrap();
    assert_eq!(driver.dialect(), Dialect::Legacy);

    let element = driver.find_element(By::xpath("//a")).await.unwrap();
    assert_eq!(element.id(), "legacy-el");
}

#[tokio::test]
async fn execute_script_marshals_elements_and_promises() {
    let (driver, requests) = scripted(vec![
        w3c_session("s3"),
        json_response(json!({"value": {ELEMENT_KEY_W3C: "el-1"}})),
        json_response(json!({"value": [{ELEMENT_KEY_W3C: "el-2"}, "plain"]})),
    ]);
    driver.new_session(Capabilities::new()).await.unwrap();
    let element = driver.find_element(By::css("div")).await.unwrap();

    let result = driver
        .execute_script(
            "return arguments;",
            vec![Arg::from(element), Arg::from("literal")],
        )
        .await
        .unwrap();

    // Outbound: the element handle became the W3C reference shape.
    let recorded = requests.lock().unwrap().clone();
    assert_eq!(
        recorded[2].data,
        Some(json!({
            "script": "return arguments;",
            "args": [{ELEMENT_KEY_W3C: "el-1"}, "literal"],
        }))
    );

    // Inbound: references decode into bound handles, primitives pass.
    match result {
        WireValue::Array(items) => {
            assert_eq!(items[0].as_element().unwrap().id(), "el-2");
            assert_eq!(items[1].as_json(), Some(&json!("plain")));
        }
        other => panic!("expected array, got {other:?}"),
    }
}

#[tokio::test]
async fn quit_clears_session() {
    let (driver, requests) = scripted(vec![
        w3c_session("s4"),
        json_response(json!({"value": null})),
    ]);
    driver.new_session(Capabilities::new()).await.unwrap();
    driver.quit().await.unwrap();

    assert!(driver.session().is_none());
    let recorded = requests.lock().unwrap().clone();
    assert_eq!(recorded[1].path, "/session/s4");
    assert_eq!(recorded[1].method, webwire_http::HttpMethod::Delete);
}

#[tokio::test]
async fn wire_error_surfaces_through_promise_chain() {
    let (driver, _requests) = scripted(vec![
        w3c_session("s5"),
        WireResponse::new(
            404,
            json!({"value": {}, "error": "no such element", "message": "oops"}).to_string(),
        ),
    ]);
    driver.new_session(Capabilities::new()).await.unwrap();

    let err = driver.find_element(By::css("#missing")).await.unwrap_err();
    match err {
        webwire_flow::FlowError::Wire(wire) => {
            assert_eq!(wire.kind, webwire_core::ErrorKind::NoSuchElement);
            assert_eq!(wire.message, "oops");
        }
        other => panic!("expected wire error, got {other:?}"),
    }
}

#[tokio::test]
async fn shared_flow_interleaves_two_clients_in_order() {
    let flow = webwire_flow::ControlFlow::new();
    let requests = Arc::new(Mutex::new(Vec::new()));

    let make = |responses: Vec<WireResponse>| {
        let client = ScriptedClient {
            responses: Mutex::new(responses.into()),
            requests: requests.clone(),
        };
        WebDriverClient::with_client_and_flow(Box::new(client), flow.clone())
    };
    let first = make(vec![json_response(json!({"value": "one"}))]);
    let second = make(vec![json_response(json!({"value": "two"}))]);

    let a = first.schedule(
        webwire_core::Command::new(webwire_core::CommandName::GetTitle)
            .with_param("sessionId", "a"),
    );
    let b = second.schedule(
        webwire_core::Command::new(webwire_core::CommandName::GetTitle)
            .with_param("sessionId", "b"),
    );

    assert_eq!(b.resolved().await.unwrap(), json!("two"));
    assert_eq!(a.resolved().await.unwrap(), json!("one"));

    let recorded = requests.lock().unwrap().clone();
    assert_eq!(recorded[0].path, "/session/a/title");
    assert_eq!(recorded[1].path, "/session/b/title");
}
