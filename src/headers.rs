//! Ordered multi-value maps used for headers and query parameters.
//!
//! Keys are case-sensitive exactly as supplied. Values under one key keep their
//! insertion order, which matters for headers such as `Accept`. Key order is not
//! significant.

use std::collections::HashMap;

pub const ACCEPT: &str = "Accept";
pub const ACCEPT_CHARSET: &str = "Accept-Charset";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_LENGTH: &str = "Content-Length";

/// A map from a name to an ordered list of string values.
///
/// A name is never stored with an empty value list: removing the last value of
/// a name removes the name itself.
///
/// # Examples
///
/// ```
/// use rested::Headers;
///
/// let mut headers = Headers::new();
/// headers.add("Accept", "application/json");
/// headers.add("Accept", "text/plain");
///
/// assert_eq!(
///     headers.values("Accept").unwrap(),
///     ["application/json", "text/plain"]
/// );
///
/// headers.remove_value("Accept", "application/json");
/// headers.remove_value("Accept", "text/plain");
/// assert!(!headers.has("Accept"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiValueMap {
    entries: HashMap<String, Vec<String>>,
}

/// Header names to values.
pub type Headers = MultiValueMap;

/// Query parameter names to values.
pub type QueryParams = MultiValueMap;

impl MultiValueMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the values stored under `name`, in insertion order.
    pub fn values(&self, name: &str) -> Option<&[String]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Returns the first value stored under `name`.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.entries
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns `true` if at least one value is stored under `name`.
    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns all names that currently hold values.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterates over every name with its values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Iterates over every `(name, value)` pair, expanding multi-value entries.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(name, values)| {
            values
                .iter()
                .map(move |value| (name.as_str(), value.as_str()))
        })
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends `value` to the list stored under `name`, creating it if needed.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Drops every value stored under `name`. No-op for absent names.
    pub fn remove(&mut self, name: &str) -> &mut Self {
        self.entries.remove(name);
        self
    }

    /// Removes the first occurrence of `value` under `name`.
    ///
    /// The name is dropped once its list becomes empty. No-op for absent names
    /// or values.
    pub fn remove_value(&mut self, name: &str, value: &str) -> &mut Self {
        if let Some(values) = self.entries.get_mut(name) {
            if let Some(index) = values.iter().position(|v| v == value) {
                values.remove(index);
            }
            if values.is_empty() {
                self.entries.remove(name);
            }
        }
        self
    }

    /// Clears the map and reloads it from `entries`, copying every list.
    ///
    /// Entries with an empty value list are skipped.
    pub fn replace_all<'a, I>(&mut self, entries: I) -> &mut Self
    where
        I: IntoIterator<Item = (&'a String, &'a Vec<String>)>,
    {
        self.entries.clear();
        for (name, values) in entries {
            if !values.is_empty() {
                self.entries.insert(name.clone(), values.clone());
            }
        }
        self
    }
}

impl From<&HashMap<String, Vec<String>>> for MultiValueMap {
    fn from(map: &HashMap<String, Vec<String>>) -> Self {
        let mut headers = Self::new();
        headers.replace_all(map);
        headers
    }
}

impl<K, V> FromIterator<(K, V)> for MultiValueMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, value) in iter {
            map.add(name, value);
        }
        map
    }
}
