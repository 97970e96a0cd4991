//! Carrier interfaces and the trace-context propagator.
//!
//! A carrier is any transport-level mapping of string keys to string
//! values, HTTP headers in this system. [`Injector`] and [`Extractor`]
//! abstract over writing to and reading from a carrier so the propagator
//! itself stays transport-agnostic.

use std::collections::HashMap;

mod trace_context;

pub use trace_context::TraceContextPropagator;

/// Injector provides an interface for adding fields to an underlying
/// carrier such as a `HashMap` or a header map.
pub trait Injector {
    /// Add a key and value to the underlying data.
    fn set(&mut self, key: &str, value: String);
}

/// Extractor provides an interface for reading fields from an underlying
/// carrier such as a `HashMap` or a header map.
pub trait Extractor {
    /// Get a value for a key from the underlying data.
    fn get(&self, key: &str) -> Option<&str>;

    /// Collect all the keys from the underlying data.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key and value in the HashMap. Keys are lowered for
    /// case-insensitive lookup.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Get a value for a key from the HashMap.
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    /// Collect all the keys from the HashMap.
    fn keys(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect::<Vec<_>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_map_carrier_is_case_insensitive() {
        let mut carrier = HashMap::new();
        Injector::set(&mut carrier, "HeaderName", "value".to_string());

        assert_eq!(
            Extractor::get(&carrier, "HEADERNAME"),
            Some("value"),
            "case insensitive extraction"
        );
        assert_eq!(Extractor::keys(&carrier), vec!["headername"]);
    }
}
