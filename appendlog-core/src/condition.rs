//! Write conditions over a stream's version.
//!
//! A [`Condition`] is a small expression tree: comparison leaves
//! ([`Condition::Operation`]) combined by boolean nodes
//! ([`Condition::MultiOperation`]). The set of shapes is closed, so evaluation
//! is a total function of the tree and the actual version.
//!
//! [`WriteCondition`] is what callers hand to a write: either "any version"
//! (unconditional append) or a [`Condition`] on the stream version.
//!
//! # Example
//!
//! ```
//! use appendlog_core::condition::{Condition, WriteCondition};
//!
//! // Accept the write if the stream is at version 2 or 3.
//! let condition = WriteCondition::stream_version(Condition::and([
//!     Condition::gte(2),
//!     Condition::lt(4),
//! ]));
//! assert!(condition.is_fulfilled_by(3));
//! assert!(!condition.is_fulfilled_by(4));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Comparison applied by a leaf condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationName {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl OperationName {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
        }
    }
}

/// Boolean combinator applied to the children of a composite condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiOperationName {
    /// Every child holds. Empty is `true`.
    And,
    /// At least one child holds. Empty is `false`.
    Or,
    /// No child holds (NOR). Empty is `true`.
    ///
    /// With a single child this is ordinary negation; with several it is
    /// "none of them", not "not all of them".
    Not,
}

impl MultiOperationName {
    const fn as_str(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
        }
    }
}

/// Predicate over a stream version.
///
/// [`evaluate`](Self::evaluate), `Display` and drop walk the tree with a heap
/// stack, so nesting depth is bounded by memory. The derived `Clone`,
/// `PartialEq`, `Hash`, `Debug` and serde impls still recurse per level.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Compare the actual version against `operand`.
    Operation { op: OperationName, operand: u64 },
    /// Combine child conditions.
    MultiOperation {
        kind: MultiOperationName,
        children: Vec<Condition>,
    },
}

impl Condition {
    #[must_use]
    pub const fn eq(version: u64) -> Self {
        Self::op(OperationName::Eq, version)
    }

    #[must_use]
    pub const fn ne(version: u64) -> Self {
        Self::op(OperationName::Ne, version)
    }

    #[must_use]
    pub const fn lt(version: u64) -> Self {
        Self::op(OperationName::Lt, version)
    }

    #[must_use]
    pub const fn lte(version: u64) -> Self {
        Self::op(OperationName::Lte, version)
    }

    #[must_use]
    pub const fn gt(version: u64) -> Self {
        Self::op(OperationName::Gt, version)
    }

    #[must_use]
    pub const fn gte(version: u64) -> Self {
        Self::op(OperationName::Gte, version)
    }

    #[must_use]
    pub fn and(children: impl IntoIterator<Item = Self>) -> Self {
        Self::multi(MultiOperationName::And, children)
    }

    #[must_use]
    pub fn or(children: impl IntoIterator<Item = Self>) -> Self {
        Self::multi(MultiOperationName::Or, children)
    }

    /// True when none of `children` hold. See [`MultiOperationName::Not`].
    #[must_use]
    pub fn not(children: impl IntoIterator<Item = Self>) -> Self {
        Self::multi(MultiOperationName::Not, children)
    }

    const fn op(op: OperationName, operand: u64) -> Self {
        Self::Operation { op, operand }
    }

    fn multi(kind: MultiOperationName, children: impl IntoIterator<Item = Self>) -> Self {
        Self::MultiOperation {
            kind,
            children: children.into_iter().collect(),
        }
    }

    /// Evaluate the condition against the actual stream version.
    ///
    /// Children are evaluated left to right and evaluation stops as soon as a
    /// node's result is decided. Nesting depth is not limited by the call
    /// stack.
    #[must_use]
    pub fn evaluate(&self, actual: u64) -> bool {
        let (kind, children) = match self {
            Self::Operation { op, operand } => return op.compare(actual, *operand),
            Self::MultiOperation { kind, children } => (*kind, children),
        };

        let mut stack = vec![Frame::new(kind, children)];
        let mut holds = kind.identity();
        while let Some(frame) = stack.last_mut() {
            let child = if frame.kind.is_decided(frame.holds) {
                None
            } else {
                frame.children.next()
            };

            match child {
                Some(Self::Operation { op, operand }) => {
                    frame.holds = frame.kind.fold(frame.holds, op.compare(actual, *operand));
                }
                Some(Self::MultiOperation { kind, children }) => {
                    stack.push(Frame::new(*kind, children));
                }
                None => {
                    holds = frame.holds;
                    stack.pop();
                    if let Some(parent) = stack.last_mut() {
                        parent.holds = parent.kind.fold(parent.holds, holds);
                    }
                }
            }
        }
        holds
    }
}

/// A boolean node whose children are partly evaluated.
struct Frame<'a> {
    kind: MultiOperationName,
    children: std::slice::Iter<'a, Condition>,
    holds: bool,
}

impl<'a> Frame<'a> {
    fn new(kind: MultiOperationName, children: &'a [Condition]) -> Self {
        Self {
            kind,
            children: children.iter(),
            holds: kind.identity(),
        }
    }
}

impl OperationName {
    const fn compare(self, actual: u64, operand: u64) -> bool {
        match self {
            Self::Eq => actual == operand,
            Self::Ne => actual != operand,
            Self::Lt => actual < operand,
            Self::Lte => actual <= operand,
            Self::Gt => actual > operand,
            Self::Gte => actual >= operand,
        }
    }
}

impl MultiOperationName {
    /// Result of the node with no children.
    const fn identity(self) -> bool {
        match self {
            Self::And | Self::Not => true,
            Self::Or => false,
        }
    }

    const fn fold(self, holds: bool, child: bool) -> bool {
        match self {
            Self::And => holds && child,
            Self::Or => holds || child,
            Self::Not => holds && !child,
        }
    }

    /// Whether no further child can change `holds`.
    const fn is_decided(self, holds: bool) -> bool {
        match self {
            Self::And | Self::Not => !holds,
            Self::Or => holds,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        enum Token<'a> {
            Node(&'a Condition),
            Separator,
            Close,
        }

        let mut pending = vec![Token::Node(self)];
        while let Some(token) = pending.pop() {
            match token {
                Token::Node(Condition::Operation { op, operand }) => {
                    write!(f, "{}({operand})", op.as_str())?;
                }
                Token::Node(Condition::MultiOperation { kind, children }) => {
                    write!(f, "{}(", kind.as_str())?;
                    pending.push(Token::Close);
                    for (index, child) in children.iter().enumerate().rev() {
                        pending.push(Token::Node(child));
                        if index > 0 {
                            pending.push(Token::Separator);
                        }
                    }
                }
                Token::Separator => f.write_str(", ")?,
                Token::Close => f.write_str(")")?,
            }
        }
        Ok(())
    }
}

impl Drop for Condition {
    fn drop(&mut self) {
        // Unnest children onto a heap stack so dropping a deep tree does not
        // recurse.
        let Self::MultiOperation { children, .. } = self else {
            return;
        };
        let mut pending = std::mem::take(children);
        while let Some(mut child) = pending.pop() {
            if let Self::MultiOperation { children, .. } = &mut child {
                pending.append(children);
            }
        }
    }
}

/// Condition attached to a write.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "condition", rename_all = "snake_case")]
pub enum WriteCondition {
    /// Append regardless of the current version.
    #[default]
    AnyStreamVersion,
    /// Append only if the stream version satisfies the condition.
    StreamVersion(Condition),
}

impl WriteCondition {
    #[must_use]
    pub const fn any() -> Self {
        Self::AnyStreamVersion
    }

    #[must_use]
    pub const fn stream_version(condition: Condition) -> Self {
        Self::StreamVersion(condition)
    }

    /// Shortcut for the classic optimistic check: the stream must still be at
    /// `version`.
    #[must_use]
    pub const fn stream_version_eq(version: u64) -> Self {
        Self::StreamVersion(Condition::eq(version))
    }

    #[must_use]
    pub fn is_fulfilled_by(&self, version: u64) -> bool {
        match self {
            Self::AnyStreamVersion => true,
            Self::StreamVersion(condition) => condition.evaluate(version),
        }
    }

    #[must_use]
    pub const fn is_unconditional(&self) -> bool {
        matches!(self, Self::AnyStreamVersion)
    }
}

impl From<Condition> for WriteCondition {
    fn from(condition: Condition) -> Self {
        Self::StreamVersion(condition)
    }
}

impl fmt::Display for WriteCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnyStreamVersion => f.write_str("any stream version"),
            Self::StreamVersion(condition) => write!(f, "stream version {condition}"),
        }
    }
}
