// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Hierarchical Message Types
//!
//! A [`MessageType`] is an immutable path of string segments that always starts
//! with the reserved [`ROOT_SEGMENT`]. Types double as dispatch filters: a
//! listener registered for `ROOT/SYSTEM` sees every `ROOT/SYSTEM/...` message.
//!
//! Children are produced by appending segments; a parent is never mutated.
//!
//! ```text
//! ROOT
//! └── SYSTEM
//!     ├── Reporting
//!     │   ├── Daemon
//!     │   └── Agent
//!     └── Kill
//!         └── Agents
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// First segment of every message type.
pub const ROOT_SEGMENT: &str = "ROOT";

/// Segment under which all control-plane types live.
pub const SYSTEM_SEGMENT: &str = "SYSTEM";

static ROOT: LazyLock<MessageType> = LazyLock::new(|| MessageType::new(Vec::<String>::new()));
static SYSTEM: LazyLock<MessageType> = LazyLock::new(|| MessageType::new([SYSTEM_SEGMENT]));

/// Immutable hierarchical message tag.
///
/// Equality is full-path equality. Ordering puts a strict prefix before any of its
/// extensions and is otherwise lexicographic per segment, which is exactly the
/// derived ordering on the segment vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct MessageType {
    path: Vec<String>,
}

/// Nested single-child encoding of a type path, used in saved configuration.
///
/// `ROOT/SYSTEM/Kill` exports as `{ name: SYSTEM, child: { name: Kill } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<Box<TypeNode>>,
}

impl MessageType {
    /// Builds `ROOT/<segments...>`. The input must not already start with ROOT.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut path = vec![ROOT_SEGMENT.to_string()];
        path.extend(segments.into_iter().map(Into::into));
        debug_assert!(path.len() < 2 || path[1] != ROOT_SEGMENT);
        Self { path }
    }

    /// The root of the hierarchy; parent of every type.
    pub fn root() -> Self {
        ROOT.clone()
    }

    /// `ROOT/SYSTEM`, parent of all control-plane types.
    pub fn system() -> Self {
        SYSTEM.clone()
    }

    /// Extends this type with `segments`, skipping a leading ROOT in the input.
    pub fn child<I, S>(&self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut iter = segments.into_iter().map(Into::into).peekable();
        if iter.peek().map(String::as_str) == Some(ROOT_SEGMENT) {
            iter.next();
        }
        let mut path = self.path.clone();
        path.extend(iter);
        Self { path }
    }

    /// Concatenates `other`'s segments (minus its ROOT) onto this type.
    pub fn child_type(&self, other: &MessageType) -> Self {
        self.child(other.path.iter().cloned())
    }

    /// Drops the last segment. ROOT has no parent.
    pub fn parent(&self) -> Option<Self> {
        if self.path.len() == 1 {
            return None;
        }
        Some(Self {
            path: self.path[..self.path.len() - 1].to_vec(),
        })
    }

    /// Whether `self` is an ancestor of, or equal to, `other`.
    pub fn is_parent(&self, other: &MessageType) -> bool {
        other.path.len() >= self.path.len()
            && self.path.iter().zip(&other.path).all(|(a, b)| a == b)
    }

    /// Whether this type lives under `ROOT/SYSTEM`.
    pub fn is_system(&self) -> bool {
        SYSTEM.is_parent(self)
    }

    pub fn is_root(&self) -> bool {
        self.path.len() == 1
    }

    /// Last segment (`ROOT` for the root itself).
    pub fn leaf(&self) -> &str {
        // path is never empty
        &self.path[self.path.len() - 1]
    }

    /// Full path including the leading ROOT.
    pub fn segments(&self) -> &[String] {
        &self.path
    }

    /// Number of segments below ROOT.
    pub fn depth(&self) -> usize {
        self.path.len() - 1
    }

    /// Exports the path (without ROOT) as a nested chain. ROOT exports to `None`.
    pub fn to_nested(&self) -> Option<TypeNode> {
        self.path[1..].iter().rev().fold(None, |child, name| {
            Some(TypeNode {
                name: name.clone(),
                child: child.map(Box::new),
            })
        })
    }

    /// Inverse of [`MessageType::to_nested`]. `None` imports as ROOT.
    pub fn from_nested(node: Option<&TypeNode>) -> Self {
        let mut segments = Vec::new();
        let mut cursor = node;
        while let Some(n) = cursor {
            segments.push(n.name.clone());
            cursor = n.child.as_deref();
        }
        Self::root().child(segments)
    }
}

impl TryFrom<Vec<String>> for MessageType {
    type Error = String;

    fn try_from(path: Vec<String>) -> Result<Self, Self::Error> {
        match path.first() {
            Some(first) if first == ROOT_SEGMENT => Ok(Self { path }),
            Some(first) => Err(format!(
                "message type must start with {}, found '{}'",
                ROOT_SEGMENT, first
            )),
            None => Err("message type path is empty".to_string()),
        }
    }
}

impl From<MessageType> for Vec<String> {
    fn from(t: MessageType) -> Self {
        t.path
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.join("/"))
    }
}
