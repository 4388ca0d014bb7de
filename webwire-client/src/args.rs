//! Outbound argument marshaling: recursively encode caller arguments
//! into wire JSON, awaiting any embedded promises concurrently and
//! rewriting element handles into their wire reference shape.

use crate::element::WebElement;
use futures::future::{try_join_all, BoxFuture};
use serde_json::Value;
use webwire_core::value::element_ref;
use webwire_core::Dialect;
use webwire_flow::{FlowError, PromiseHandle};

/// An argument prior to wire encoding. Plain JSON passes through; element
/// handles and promises need rewriting, possibly nested inside containers.
#[derive(Debug)]
pub enum Arg {
    Json(Value),
    Element(WebElement),
    Promise(PromiseHandle),
    Array(Vec<Arg>),
    Object(Vec<(String, Arg)>),
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Json(value)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Json(Value::String(value.to_string()))
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Json(Value::String(value))
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Json(Value::Bool(value))
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Json(value.into())
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Json(value.into())
    }
}

impl From<WebElement> for Arg {
    fn from(element: WebElement) -> Self {
        Arg::Element(element)
    }
}

impl From<PromiseHandle> for Arg {
    fn from(promise: PromiseHandle) -> Self {
        Arg::Promise(promise)
    }
}

impl From<Vec<Arg>> for Arg {
    fn from(items: Vec<Arg>) -> Self {
        Arg::Array(items)
    }
}

/// Encode one argument. Boxed because container variants recurse.
pub fn encode_arg(arg: Arg, dialect: Dialect) -> BoxFuture<'static, Result<Value, FlowError>> {
    Box::pin(async move {
        match arg {
            Arg::Json(value) => Ok(value),
            Arg::Element(element) => Ok(element_ref(element.id(), dialect)),
            Arg::Promise(promise) => promise.resolved().await,
            Arg::Array(items) => {
                let encoded =
                    try_join_all(items.into_iter().map(|item| encode_arg(item, dialect)))
                        .await?;
                Ok(Value::Array(encoded))
            }
            Arg::Object(entries) => {
                let (keys, values): (Vec<String>, Vec<Arg>) = entries.into_iter().unzip();
                let encoded =
                    try_join_all(values.into_iter().map(|value| encode_arg(value, dialect)))
                        .await?;
                Ok(Value::Object(keys.into_iter().zip(encoded).collect()))
            }
        }
    })
}

/// Encode a full argument list, resolving embedded promises concurrently
/// and reassembling the original structure.
pub async fn encode_args(args: Vec<Arg>, dialect: Dialect) -> Result<Vec<Value>, FlowError> {
    try_join_all(args.into_iter().map(|arg| encode_arg(arg, dialect))).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use webwire_core::ELEMENT_KEY_W3C;
    use webwire_flow::{ControlFlow, TaskReturn};

    #[tokio::test]
    async fn test_plain_json_passes_through() {
        let encoded = encode_args(
            vec![Arg::from("hello"), Arg::from(3_i64), Arg::from(json!(null))],
            Dialect::Legacy,
        )
        .await
        .unwrap();
        assert_eq!(encoded, vec![json!("hello"), json!(3), Value::Null]);
    }

    #[tokio::test]
    async fn test_promises_resolved_and_structure_preserved() {
        let flow = ControlFlow::new();
        let a = flow.execute("a", |_| Ok(TaskReturn::Done(json!("first"))));
        let b = flow.execute("b", |_| Ok(TaskReturn::Done(json!("second"))));

        let encoded = encode_args(
            vec![
                Arg::Array(vec![Arg::Promise(a), Arg::from("static")]),
                Arg::Object(vec![
                    ("inner".to_string(), Arg::Promise(b)),
                    ("n".to_string(), Arg::from(7_i64)),
                ]),
            ],
            Dialect::W3c,
        )
        .await
        .unwrap();

        assert_eq!(encoded[0], json!(["first", "static"]));
        assert_eq!(encoded[1], json!({"inner": "second", "n": 7}));
    }

    #[tokio::test]
    async fn test_rejected_promise_fails_encoding() {
        let flow = ControlFlow::new();
        let bad = flow.execute("bad", |_| Err(webwire_flow::FlowError::custom("nope")));
        let err = encode_args(vec![Arg::Promise(bad)], Dialect::Legacy)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }

    #[tokio::test]
    async fn test_element_encodes_per_dialect() {
        let element = WebElement::detached("abc123");
        let w3c = encode_arg(Arg::Element(element.clone()), Dialect::W3c)
            .await
            .unwrap();
        assert_eq!(w3c, json!({ELEMENT_KEY_W3C: "abc123"}));

        let legacy = encode_arg(Arg::Element(element), Dialect::Legacy)
            .await
            .unwrap();
        assert_eq!(legacy, json!({"ELEMENT": "abc123"}));
    }
}
