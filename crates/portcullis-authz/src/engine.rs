//! Rule set evaluation.

use std::borrow::Cow;

use tracing::{debug, trace, warn};

use crate::condition::{self, Condition, MatchMode};
use crate::format::{self, Captures};
use crate::lookup::{AliasTable, AttributeLookup};
use crate::rules::RuleSet;

/// Evaluates rule sets against request attributes.
///
/// Evaluation never fails: anything that cannot be decided (a placeholder
/// without a value, a substituted regex that does not compile) counts as a
/// failed condition.
#[derive(Debug, Clone, Default)]
pub struct ConditionEngine {
    aliases: AliasTable,
}

impl ConditionEngine {
    /// Create an engine that resolves MAP conditions through `aliases`.
    pub fn new(aliases: AliasTable) -> Self {
        Self { aliases }
    }

    /// The alias table used for MAP conditions.
    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// Decide whether `lookup` satisfies `rules`.
    ///
    /// `format_context` supplies values for `%{name}` placeholders; it is
    /// usually the same attributes as `lookup`. An empty rule set allows.
    pub fn evaluate(
        &self,
        rules: &RuleSet,
        lookup: &dyn AttributeLookup,
        format_context: &dyn AttributeLookup,
    ) -> bool {
        let mut captures = Captures::new();

        for (index, clause) in rules.clauses().into_iter().enumerate() {
            let mut active = clause.iter().filter(|c| !c.flags().ignore).peekable();
            if active.peek().is_none() {
                trace!(clause = index, "clause has only ignored conditions");
                continue;
            }

            let satisfied =
                active.any(|c| self.check(c, lookup, format_context, &mut captures));
            if !satisfied {
                debug!(clause = index, "authorization clause failed");
                return false;
            }
        }
        true
    }

    fn check(
        &self,
        condition: &Condition,
        lookup: &dyn AttributeLookup,
        format_context: &dyn AttributeLookup,
        captures: &mut Captures,
    ) -> bool {
        let flags = condition.flags();
        let is_regex = matches!(condition.mode(), MatchMode::Regex { .. });

        let expanded: Cow<'_, str> = if flags.format {
            match format::substitute(condition.pattern(), format_context, captures, is_regex) {
                Some(p) => Cow::Owned(p),
                None => {
                    debug!(%condition, "unresolved placeholder, condition fails");
                    return false;
                }
            }
        } else {
            Cow::Borrowed(condition.pattern())
        };
        let pattern: &str = &expanded;

        let values = self.values_for(condition, lookup);

        let folded = match condition.mode() {
            MatchMode::Exact | MatchMode::Substring if flags.nocase => Some(pattern.to_lowercase()),
            _ => None,
        };

        let matched = match condition.mode() {
            MatchMode::Exact => match &folded {
                Some(folded) => values.iter().any(|v| v.to_lowercase() == *folded),
                None => values.iter().any(|v| *v == pattern),
            },
            MatchMode::Substring => match &folded {
                Some(folded) => values.iter().any(|v| v.to_lowercase().contains(folded.as_str())),
                None => values.iter().any(|v| v.contains(pattern)),
            },
            MatchMode::Regex { capture_refs } => {
                let late;
                let regex = match condition.compiled() {
                    Some(regex) => regex,
                    None => match condition::compile(pattern, flags.nocase) {
                        Ok(regex) => {
                            late = regex;
                            &late
                        }
                        Err(e) => {
                            warn!(%condition, error = %e, "substituted pattern is not a valid regex");
                            return false;
                        }
                    },
                };

                let hit = values.iter().find_map(|v| regex.captures(v));
                if let Some(caps) = &hit
                    && capture_refs
                {
                    captures.replace_from(regex, caps);
                }
                hit.is_some()
            }
        };

        let outcome = matched != flags.not;
        trace!(%condition, values = values.len(), matched, outcome, "condition evaluated");
        outcome
    }

    /// Values a condition is tested against. Absent and empty both yield an
    /// empty list.
    fn values_for<'a>(&self, condition: &Condition, lookup: &'a dyn AttributeLookup) -> Vec<&'a str> {
        if condition.is_user() {
            return lookup.user().into_iter().collect();
        }

        if condition.flags().map {
            let mut values = Vec::new();
            for stored in lookup.names() {
                if self.aliases.mapped_name(stored) == condition.name()
                    && let Some(found) = lookup.values(stored)
                {
                    values.extend(found.iter().map(String::as_str));
                }
            }
            return values;
        }

        lookup
            .values(condition.name())
            .map(|found| found.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

/// Evaluate `rules` with no alias table.
pub fn evaluate(
    rules: &RuleSet,
    lookup: &dyn AttributeLookup,
    format_context: &dyn AttributeLookup,
) -> bool {
    ConditionEngine::default().evaluate(rules, lookup, format_context)
}
