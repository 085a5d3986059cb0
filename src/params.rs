use std::ops::Index;

/// A single captured URL parameter, consisting of a key and a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub key: String,
    pub value: String,
}

impl Param {
    pub fn new(key: &str, value: &str) -> Param {
        Param {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// The ordered list of parameters captured by a route match.
///
/// Captures are appended in the order the lookup takes them, the first
/// capture is also the first entry. It is therefore safe to read values by
/// index. When the same key was captured more than once, [`get`](Params::get)
/// returns the most recent value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<Param>);

impl Params {
    pub fn new() -> Params {
        Params(Vec::new())
    }

    /// Returns the value of the last captured parameter with the given key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|param| param.key == key)
            .map(|param| param.value.as_str())
    }

    pub fn push(&mut self, key: &str, value: &str) {
        self.0.push(Param::new(key, value));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over `(key, value)` pairs in capture order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|p| (p.key.as_str(), p.value.as_str()))
    }

    /// Drops every capture recorded after `len` entries. Used to roll a
    /// lookup back when a speculative branch of the trie did not pan out.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    /// Removes all captures with the given key.
    pub(crate) fn remove(&mut self, key: &str) {
        self.0.retain(|param| param.key != key);
    }
}

impl Index<usize> for Params {
    type Output = str;

    fn index(&self, i: usize) -> &Self::Output {
        &self.0[i].value
    }
}
