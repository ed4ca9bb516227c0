//! Actions and state values.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Anything that can be dispatched.
///
/// Auto-implemented for every `Clone + Debug + Send + Sync + 'static` type.
pub trait Action: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> Action for T where T: Clone + fmt::Debug + Send + Sync + 'static {}

/// Anything a reducer can produce.
///
/// `Default` is the state a store starts from when nothing is preloaded.
pub trait State: Clone + Default + Send + Sync + 'static {}

impl<T> State for T where T: Clone + Default + Send + Sync + 'static {}

/// Kind of the action dispatched once a bootstrapped app is fully wired.
pub const INIT: &str = "BROOK_INIT";

/// Marker for the init action. Action types used with
/// [`Bootstrap`](crate::Bootstrap) implement `From<Init>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Init;

/// A structurally tagged action: a `type` discriminator plus free-form payload.
///
/// Serializes flat, e.g. `{"type": "ADD_TODO", "text": "milk"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedAction {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

impl TaggedAction {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Map::new(),
        }
    }

    /// Add a payload field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }
}

impl From<Init> for TaggedAction {
    fn from(_: Init) -> Self {
        TaggedAction::new(INIT)
    }
}

impl fmt::Display for TaggedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_flat_with_type_field() {
        let action = TaggedAction::new("ADD_TODO").with("text", "milk").with("done", false);
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value, json!({"type": "ADD_TODO", "text": "milk", "done": false}));
    }

    #[test]
    fn test_deserializes_from_plain_object() {
        let action: TaggedAction =
            serde_json::from_value(json!({"type": "SET", "value": 3})).unwrap();
        assert!(action.is("SET"));
        assert_eq!(action.get("value"), Some(&json!(3)));
    }

    #[test]
    fn test_equality_is_structural() {
        let a = TaggedAction::new("X").with("n", 1);
        let b = TaggedAction::new("X").with("n", 1);
        assert_eq!(a, b);
        assert_ne!(a, TaggedAction::new("X").with("n", 2));
    }

    #[test]
    fn test_init_converts_to_init_kind() {
        let action = TaggedAction::from(Init);
        assert_eq!(action.kind(), INIT);
        assert!(action.payload().is_empty());
    }
}
