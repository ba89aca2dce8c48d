//! Payload documents exchanged between analyzers
//!
//! The `Payload` struct is a JSON object with a few well-known keys. The
//! pipeline treats it as opaque beyond routing; individual analyzers read
//! and write the keys they understand.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known payload keys shared by several analyzers
pub mod keys {
    /// Stock symbol under analysis (e.g., "000001", "AAPL")
    pub const SYMBOL: &str = "symbol";
    /// Score on a 0-100 scale produced by a scoring analyzer
    pub const SCORE: &str = "score";
    /// Directional signal ("buy", "sell" or "neutral")
    pub const SIGNAL: &str = "signal";
    /// Latest traded price
    pub const CURRENT_PRICE: &str = "current_price";
    /// Requester's risk profile
    pub const RISK_PROFILE: &str = "risk_profile";
}

/// Opaque key/value document passed into and out of analyzers
///
/// Keys are kept ordered so that serialized payloads are byte-for-byte
/// reproducible for identical content.
///
/// # Example
///
/// ```
/// use agent_core::Payload;
///
/// let payload = Payload::new()
///     .with_symbol("000001")
///     .with_score(72.0);
///
/// assert_eq!(payload.symbol(), Some("000001"));
/// assert_eq!(payload.score(), Some(72.0));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload {
    data: BTreeMap<String, serde_json::Value>,
}

impl Payload {
    /// Create a new empty payload
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a payload from a JSON object
    ///
    /// Anything other than an object is rejected.
    pub fn from_value(value: serde_json::Value) -> crate::Result<Self> {
        match value {
            serde_json::Value::Object(map) => Ok(Self {
                data: map.into_iter().collect(),
            }),
            other => Err(crate::Error::InvalidInput(format!(
                "payload must be a JSON object, got {other}"
            ))),
        }
    }

    /// Convert the payload into a JSON object value
    pub fn into_value(self) -> serde_json::Value {
        serde_json::Value::Object(self.data.into_iter().collect())
    }

    // =========== Builder Methods ===========

    /// Set an arbitrary key
    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Set the stock symbol
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.insert(keys::SYMBOL, serde_json::json!(symbol.into()));
        self
    }

    /// Set the 0-100 score
    pub fn with_score(mut self, score: f64) -> Self {
        self.insert(keys::SCORE, serde_json::json!(score));
        self
    }

    /// Set the directional signal
    pub fn with_signal(mut self, signal: impl Into<String>) -> Self {
        self.insert(keys::SIGNAL, serde_json::json!(signal.into()));
        self
    }

    // =========== Common Accessors ===========

    /// Get the stock symbol
    pub fn symbol(&self) -> Option<&str> {
        self.get(keys::SYMBOL).and_then(|v| v.as_str())
    }

    /// Get the score
    pub fn score(&self) -> Option<f64> {
        self.get_f64(keys::SCORE)
    }

    /// Get the directional signal
    pub fn signal(&self) -> Option<&str> {
        self.get(keys::SIGNAL).and_then(|v| v.as_str())
    }

    /// Get the latest traded price
    pub fn current_price(&self) -> Option<f64> {
        self.get_f64(keys::CURRENT_PRICE)
    }

    /// Get a numeric value
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(serde_json::Value::as_f64)
    }

    /// Get a nested payload stored under `key`
    pub fn get_payload(&self, key: &str) -> Option<Payload> {
        match self.get(key) {
            Some(serde_json::Value::Object(map)) => Some(Payload {
                data: map.clone().into_iter().collect(),
            }),
            _ => None,
        }
    }

    /// Get a string value or fail with an input-schema error
    pub fn require_str(&self, key: &str) -> crate::Result<&str> {
        self.get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| crate::Error::InvalidInput(format!("missing string field '{key}'")))
    }

    /// Get a numeric value or fail with an input-schema error
    pub fn require_f64(&self, key: &str) -> crate::Result<f64> {
        self.get_f64(key)
            .ok_or_else(|| crate::Error::InvalidInput(format!("missing numeric field '{key}'")))
    }

    // =========== Generic Key-Value Operations ===========

    /// Insert a value into the payload
    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    /// Get a value from the payload
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Insert a typed value into the payload
    ///
    /// Serializes the value to JSON before storing.
    pub fn insert_typed<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> crate::Result<()> {
        let json_value = serde_json::to_value(value).map_err(|e| {
            crate::Error::ProcessingFailed(format!("Failed to serialize payload value: {e}"))
        })?;
        self.data.insert(key.into(), json_value);
        Ok(())
    }

    /// Get a typed value from the payload
    ///
    /// Deserializes the JSON value into the specified type. A value that does
    /// not match the type is an input-schema error.
    pub fn get_typed<T: for<'de> Deserialize<'de>>(&self, key: &str) -> crate::Result<Option<T>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(value) => {
                let typed = serde_json::from_value(value.clone()).map_err(|e| {
                    crate::Error::InvalidInput(format!("Field '{key}' has unexpected shape: {e}"))
                })?;
                Ok(Some(typed))
            }
        }
    }

    /// Check if a key exists in the payload
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Remove a value from the payload
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.data.remove(key)
    }

    /// Iterate over keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Get the number of entries in the payload
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Merge another payload into this one (other values override)
    pub fn merge(&mut self, other: Payload) {
        self.data.extend(other.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct PriceBar {
        close: f64,
        volume: u64,
    }

    #[test]
    fn test_basic_operations() {
        let mut payload = Payload::new();
        assert!(payload.is_empty());

        payload.insert("key", serde_json::json!("value"));
        assert_eq!(payload.len(), 1);
        assert!(payload.contains_key("key"));
        assert_eq!(payload.get("key"), Some(&serde_json::json!("value")));

        payload.remove("key");
        assert!(payload.is_empty());
    }

    #[test]
    fn test_typed_insert_get() {
        let mut payload = Payload::new();
        let bar = PriceBar {
            close: 12.5,
            volume: 1_000,
        };

        payload.insert_typed("bar", &bar).unwrap();

        let retrieved: PriceBar = payload.get_typed("bar").unwrap().unwrap();
        assert_eq!(retrieved, bar);
    }

    #[test]
    fn test_get_typed_shape_mismatch_is_invalid_input() {
        let payload = Payload::new().with("bar", serde_json::json!("not a bar"));
        let result: crate::Result<Option<PriceBar>> = payload.get_typed("bar");
        assert!(matches!(result, Err(crate::Error::InvalidInput(_))));
    }

    #[test]
    fn test_get_typed_missing_key() {
        let payload = Payload::new();
        let result: crate::Result<Option<PriceBar>> = payload.get_typed("missing");
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_builder_chain() {
        let payload = Payload::new()
            .with_symbol("AAPL")
            .with_score(81.0)
            .with_signal("buy");

        assert_eq!(payload.symbol(), Some("AAPL"));
        assert_eq!(payload.score(), Some(81.0));
        assert_eq!(payload.signal(), Some("buy"));
    }

    #[test]
    fn test_nested_payload() {
        let inner = Payload::new().with_score(40.0);
        let outer = Payload::new().with("technical", inner.clone().into_value());

        assert_eq!(outer.get_payload("technical"), Some(inner));
        assert!(outer.get_payload("missing").is_none());
    }

    #[test]
    fn test_require_fields() {
        let payload = Payload::new().with_symbol("AAPL");
        assert_eq!(payload.require_str("symbol").unwrap(), "AAPL");
        assert!(payload.require_f64("current_price").is_err());
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(Payload::from_value(serde_json::json!([1, 2])).is_err());

        let payload = Payload::from_value(serde_json::json!({"score": 55})).unwrap();
        assert_eq!(payload.score(), Some(55.0));
    }

    #[test]
    fn test_merge() {
        let mut p1 = Payload::new().with_score(10.0);
        let p2 = Payload::new().with_score(20.0).with_symbol("AAPL");

        p1.merge(p2);
        assert_eq!(p1.score(), Some(20.0)); // overridden
        assert_eq!(p1.symbol(), Some("AAPL")); // merged
    }

    #[test]
    fn test_serialization_is_key_ordered() {
        let payload = Payload::new().with_symbol("AAPL").with_score(1.0);
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"score":1.0,"symbol":"AAPL"}"#);
    }
}
