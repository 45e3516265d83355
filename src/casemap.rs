//! IRC case-mapping functions and a case-mapped index.
//!
//! IRC compares nicknames and channel names case-insensitively, and some
//! servers treat extra characters as equivalent (e.g., `[` and `{`). The
//! server advertises its rule through ISUPPORT `CASEMAPPING`.

use std::collections::HashMap;

/// A server case-mapping rule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CaseMapping {
    /// Only `A-Z` fold to `a-z`.
    Ascii,
    /// ASCII plus `[]\~` fold to `{}|^`.
    #[default]
    Rfc1459,
    /// ASCII plus `[]\` fold to `{}|` (`~` and `^` stay distinct).
    Rfc1459Strict,
}

impl CaseMapping {
    /// Look up a mapping by its ISUPPORT name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ascii" => Some(Self::Ascii),
            "rfc1459" => Some(Self::Rfc1459),
            "rfc1459-strict" => Some(Self::Rfc1459Strict),
            _ => None,
        }
    }

    /// The ISUPPORT name of this mapping.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::Rfc1459 => "rfc1459",
            Self::Rfc1459Strict => "rfc1459-strict",
        }
    }

    /// Fold a single character.
    #[inline]
    pub fn lower_char(&self, c: char) -> char {
        match (self, c) {
            (_, 'A'..='Z') => c.to_ascii_lowercase(),
            (Self::Rfc1459 | Self::Rfc1459Strict, '[') => '{',
            (Self::Rfc1459 | Self::Rfc1459Strict, ']') => '}',
            (Self::Rfc1459 | Self::Rfc1459Strict, '\\') => '|',
            (Self::Rfc1459, '~') => '^',
            _ => c,
        }
    }

    /// Fold a whole string.
    pub fn to_lower(&self, s: &str) -> String {
        s.chars().map(|c| self.lower_char(c)).collect()
    }

    /// Compare two strings under this mapping.
    pub fn equals(&self, a: &str, b: &str) -> bool {
        a.len() == b.len()
            && a
                .chars()
                .zip(b.chars())
                .all(|(ca, cb)| self.lower_char(ca) == self.lower_char(cb))
    }
}

/// Convert a string to IRC lowercase using RFC 1459 case mapping.
pub fn irc_to_lower(s: &str) -> String {
    CaseMapping::Rfc1459.to_lower(s)
}

/// Compare two strings using RFC 1459 case-insensitive comparison.
pub fn irc_eq(a: &str, b: &str) -> bool {
    CaseMapping::Rfc1459.equals(a, b)
}

/// A map keyed by IRC names, comparing keys under a [`CaseMapping`].
///
/// The original spelling of each key is kept for display. The mapping can
/// be swapped mid-session with [`CaseMapMap::set_mapping`], which re-keys
/// every entry.
#[derive(Clone, Debug, Default)]
pub struct CaseMapMap<V> {
    mapping: CaseMapping,
    entries: HashMap<String, (String, V)>,
}

impl<V> CaseMapMap<V> {
    /// Create an empty map using `mapping`.
    pub fn new(mapping: CaseMapping) -> Self {
        Self {
            mapping,
            entries: HashMap::new(),
        }
    }

    /// The active mapping.
    pub fn mapping(&self) -> CaseMapping {
        self.mapping
    }

    /// Switch to a new mapping, re-keying all entries.
    ///
    /// Entries that collide under the new mapping collapse into one; the
    /// last one visited wins.
    pub fn set_mapping(&mut self, mapping: CaseMapping) {
        if mapping == self.mapping {
            return;
        }
        self.mapping = mapping;
        let old = std::mem::take(&mut self.entries);
        for (_, (key, value)) in old {
            self.entries.insert(mapping.to_lower(&key), (key, value));
        }
    }

    /// Insert or replace the value for `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        self.entries
            .insert(self.mapping.to_lower(&key), (key, value))
            .map(|(_, v)| v)
    }

    /// Get the value for `key`.
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(&self.mapping.to_lower(key)).map(|(_, v)| v)
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&self.mapping.to_lower(key))
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries
            .remove(&self.mapping.to_lower(key))
            .map(|(_, v)| v)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the keys in their original spelling.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|(k, _)| k.as_str())
    }

    /// Iterate over `(original key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v))
    }
}
