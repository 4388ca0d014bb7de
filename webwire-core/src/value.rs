// Wire value helpers: the element-reference JSON shape in both dialect
// spellings, and JSON truthiness as the scheduler's wait conditions use it.

use serde_json::{json, Value};

/// W3C WebDriver element-reference key.
pub const ELEMENT_KEY_W3C: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Legacy JSON Wire Protocol element-reference key.
pub const ELEMENT_KEY_LEGACY: &str = "ELEMENT";

/// Which response/request shape a remote end speaks.
///
/// Sessions start `Legacy` and upgrade to `W3c` when a NEW_SESSION
/// response proves the remote end speaks the modern dialect; the upgrade
/// is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Legacy,
    W3c,
}

impl Dialect {
    /// The element-reference key this dialect emits on serialization.
    pub fn element_key(&self) -> &'static str {
        match self {
            Dialect::Legacy => ELEMENT_KEY_LEGACY,
            Dialect::W3c => ELEMENT_KEY_W3C,
        }
    }
}

/// Encode an element id as the wire reference shape for a dialect.
pub fn element_ref(id: &str, dialect: Dialect) -> Value {
    json!({ dialect.element_key(): id })
}

/// Extract the element id from a wire value, accepting both dialect
/// spellings. Returns `None` for anything that is not an element ref.
pub fn element_id_of(value: &Value) -> Option<&str> {
    let obj = value.as_object()?;
    obj.get(ELEMENT_KEY_W3C)
        .or_else(|| obj.get(ELEMENT_KEY_LEGACY))
        .and_then(Value::as_str)
}

/// Whether a wire value is an element reference in either spelling.
pub fn is_element_ref(value: &Value) -> bool {
    element_id_of(value).is_some()
}

/// JSON truthiness: `null`, `false`, `0`, `""` and `NaN` are falsy;
/// everything else (including empty arrays and objects) is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_element_ref_encoding() {
        let w3c = element_ref("abc", Dialect::W3c);
        assert_eq!(w3c, json!({ELEMENT_KEY_W3C: "abc"}));

        let legacy = element_ref("abc", Dialect::Legacy);
        assert_eq!(legacy, json!({"ELEMENT": "abc"}));
    }

    #[test]
    fn test_element_id_accepts_both_spellings() {
        assert_eq!(
            element_id_of(&json!({ELEMENT_KEY_W3C: "e1"})),
            Some("e1")
        );
        assert_eq!(element_id_of(&json!({"ELEMENT": "e2"})), Some("e2"));
        assert_eq!(element_id_of(&json!({"other": "x"})), None);
        assert_eq!(element_id_of(&json!("e3")), None);
    }

    #[test]
    fn test_w3c_key_preferred_when_both_present() {
        let both = json!({ELEMENT_KEY_W3C: "modern", "ELEMENT": "old"});
        assert_eq!(element_id_of(&both), Some("modern"));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
    }
}
