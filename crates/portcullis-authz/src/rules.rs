//! Ordered rule sets.

use crate::condition::{CondFlags, Condition, MatchMode};
use crate::error::{ConditionError, Result};

/// The ordered conditions guarding one directory.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    conditions: Vec<Condition>,
}

impl RuleSet {
    /// Create an empty rule set (allows every logged-in session).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a condition.
    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    /// Builder form of [`push`](Self::push).
    pub fn with(mut self, condition: Condition) -> Self {
        self.push(condition);
        self
    }

    /// Append a require line: `name` must have one of `values`.
    ///
    /// The values become one OR clause of exact matches. An earlier require
    /// line for the same name is superseded: its conditions are kept in place
    /// but ignored.
    pub fn push_require<I, V>(&mut self, name: &str, values: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let mut added = Vec::new();
        for (i, value) in values.into_iter().enumerate() {
            let flags = CondFlags {
                or: i > 0,
                from_require: true,
                ..CondFlags::default()
            };
            added.push(Condition::new(name, value, MatchMode::Exact, flags)?);
        }
        if added.is_empty() {
            return Err(ConditionError::EmptyRequire(name.to_string()));
        }

        for existing in &mut self.conditions {
            if existing.flags().from_require && existing.name() == name {
                existing.set_ignore();
            }
        }
        self.conditions.extend(added);
        Ok(())
    }

    /// The conditions, in evaluation order.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Number of conditions (ignored ones included).
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Whether there are no conditions at all.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Split into clauses: each clause starts at a condition without the OR
    /// flag and takes every OR-flagged condition that directly follows.
    pub fn clauses(&self) -> Vec<&[Condition]> {
        let mut clauses = Vec::new();
        let mut start = 0;
        for (i, condition) in self.conditions.iter().enumerate() {
            if i > start && !condition.flags().or {
                clauses.push(&self.conditions[start..i]);
                start = i;
            }
        }
        if start < self.conditions.len() {
            clauses.push(&self.conditions[start..]);
        }
        clauses
    }
}

impl FromIterator<Condition> for RuleSet {
    fn from_iter<T: IntoIterator<Item = Condition>>(iter: T) -> Self {
        Self {
            conditions: iter.into_iter().collect(),
        }
    }
}
