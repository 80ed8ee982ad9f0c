//! Feature vector
//!
//! Incoming feature maps keep the order in which the client sent them.
//! When the model publishes its expected feature list the map is re-ordered
//! to that list; otherwise (advisory mode) the supplied order is used as-is.

use std::collections::HashMap;
use std::fmt;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

/// Name -> value map that remembers insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    entries: Vec<(String, f64)>,
    index: HashMap<String, usize>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a value. Overwriting keeps the original position.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.index.get(&name) {
            Some(&pos) => self.entries[pos].1 = value,
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, value));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.index.get(name).map(|&pos| self.entries[pos].1)
    }

    /// Names in supplied order
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Values in supplied order
    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, value)| *value).collect()
    }

    /// Expected names that are not present, in expected order.
    pub fn missing(&self, expected: &[String]) -> Vec<String> {
        expected
            .iter()
            .filter(|name| !self.index.contains_key(name.as_str()))
            .cloned()
            .collect()
    }

    /// Re-order into `expected` order. Extra keys are dropped.
    /// Returns the missing names if the vector is incomplete.
    pub fn ordered(&self, expected: &[String]) -> Result<Vec<f64>, Vec<String>> {
        let missing = self.missing(expected);
        if !missing.is_empty() {
            return Err(missing);
        }

        Ok(expected
            .iter()
            .filter_map(|name| self.get(name))
            .collect())
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut vector = FeatureVector::new();
        for (name, value) in iter {
            vector.insert(name, value);
        }
        vector
    }
}

impl<'de> Deserialize<'de> for FeatureVector {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FeatureVectorVisitor;

        impl<'de> Visitor<'de> for FeatureVectorVisitor {
            type Value = FeatureVector;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of feature name to number")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut vector = FeatureVector::new();
                while let Some((name, value)) = access.next_entry::<String, f64>()? {
                    vector.insert(name, value);
                }
                Ok(vector)
            }
        }

        deserializer.deserialize_map(FeatureVectorVisitor)
    }
}
