//! Declarative host-path access policy.
//!
//! A policy is a tree: every branch maps glob patterns to child nodes and
//! every leaf grants an [`AccessLevel`] to whatever the patterns on the way
//! down matched. In JSON5 a leaf is written as `"read"`, `"write"` or
//! `"device"`, a branch as an object, and alternatives sharing one value are
//! separated by `|` inside a single key:
//!
//! ```json5
//! {
//!   "etc": { "fonts": "read" },
//!   "wayland*|pulse": "read",
//! }
//! ```

use crate::error::PolicyError;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between alternatives in a serialized pattern key.
pub const ALTERNATIVE_SEPARATOR: char = '|';

/// How much of a host path is exposed to the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// Read-only bind mount.
    Read,

    /// Read-write bind mount.
    Write,

    /// Bind mount that keeps device nodes usable.
    Device,
}

impl AccessLevel {
    /// The sandbox executor flag that creates this kind of mount.
    pub fn bind_flag(self) -> &'static str {
        match self {
            Self::Read => "--ro-bind",
            Self::Write => "--bind",
            Self::Device => "--dev-bind",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "device" => Some(Self::Device),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Device => "device",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One or more alternative glob patterns sharing the same child node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatternKey(Vec<String>);

impl PatternKey {
    /// A key with a single pattern.
    pub fn one(pattern: impl Into<String>) -> Self {
        Self(vec![pattern.into()])
    }

    /// A key with several alternative patterns.
    pub fn any<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(patterns.into_iter().map(Into::into).collect())
    }

    /// Parse a serialized key, splitting on [`ALTERNATIVE_SEPARATOR`].
    pub fn parse(key: &str) -> Self {
        Self::any(key.split(ALTERNATIVE_SEPARATOR))
    }

    /// The alternatives, in declaration order.
    pub fn alternatives(&self) -> &[String] {
        &self.0
    }

    /// Check every alternative against the traversal rule.
    ///
    /// An alternative made only of separators would name the root itself,
    /// so it is rejected along with the empty one.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.0.is_empty() {
            return Err(PolicyError::EmptyKey);
        }
        if self.0.iter().any(|p| p.trim_matches('/').is_empty()) {
            return Err(PolicyError::EmptyAlternative {
                key: self.to_string(),
            });
        }
        self.0.iter().try_for_each(|p| check_pattern(p))
    }
}

impl From<&str> for PatternKey {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for PatternKey {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl fmt::Display for PatternKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = ALTERNATIVE_SEPARATOR.to_string();
        f.write_str(&self.0.join(&sep))
    }
}

/// Reject patterns that could climb out of the directory they are rooted at.
pub fn check_pattern(pattern: &str) -> Result<(), PolicyError> {
    let traverses = pattern.split('/').any(|segment| segment == "..")
        || pattern.contains("/../")
        || pattern.ends_with("/..");
    if traverses {
        return Err(PolicyError::PathTraversal {
            pattern: pattern.to_string(),
        });
    }
    Ok(())
}

/// A node of the access policy tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessNode {
    /// Grant this level to every matched path.
    Leaf(AccessLevel),

    /// Descend into each matched path with the child policy.
    Branch(Vec<(PatternKey, AccessNode)>),
}

impl AccessNode {
    /// Build a branch from `(pattern, child)` pairs, keeping their order.
    pub fn branch<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, AccessNode)>,
        K: Into<PatternKey>,
    {
        Self::Branch(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// A branch granting the same level to each of `patterns`.
    pub fn uniform<I, S>(level: AccessLevel, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Branch(
            patterns
                .into_iter()
                .map(|p| (PatternKey::one(p), Self::Leaf(level)))
                .collect(),
        )
    }

    /// Shorthand for a read-only leaf.
    pub fn read() -> Self {
        Self::Leaf(AccessLevel::Read)
    }

    /// Shorthand for a read-write leaf.
    pub fn write() -> Self {
        Self::Leaf(AccessLevel::Write)
    }

    /// Shorthand for a device leaf.
    pub fn device() -> Self {
        Self::Leaf(AccessLevel::Device)
    }

    /// Check the traversal rule over the whole tree.
    pub fn validate(&self) -> Result<(), PolicyError> {
        match self {
            Self::Leaf(_) => Ok(()),
            Self::Branch(entries) => entries.iter().try_for_each(|(key, child)| {
                key.validate()?;
                child.validate()
            }),
        }
    }
}

impl Default for AccessNode {
    fn default() -> Self {
        Self::Branch(Vec::new())
    }
}

impl Serialize for AccessNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Leaf(level) => serializer.serialize_str(level.name()),
            Self::Branch(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, child) in entries {
                    map.serialize_entry(&key.to_string(), child)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for AccessNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NodeVisitor)
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = AccessNode;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an access level or a map of path patterns")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        AccessLevel::from_name(v)
            .map(AccessNode::Leaf)
            .ok_or_else(|| E::unknown_variant(v, &["read", "write", "device"]))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::new();
        while let Some((key, child)) = map.next_entry::<String, AccessNode>()? {
            entries.push((PatternKey::parse(&key), child));
        }
        Ok(AccessNode::Branch(entries))
    }
}
