//! Authorization conditions for SAML sessions.
//!
//! A directory's access rules are an ordered list of [`Condition`]s. Each
//! condition tests one attribute (or the literal `user`) of the request; a
//! condition flagged OR joins the clause of the condition before it, and the
//! clauses are AND-ed together:
//!
//! ```text
//! cond dept  "^eng"   [REG]        ┐ clause 1
//! cond dept  "^sales" [REG,OR]     ┘
//! cond role  "admin"               ─ clause 2
//! ```
//!
//! Rules are built once from configuration ([`RuleSet`]) and evaluated per
//! request by a [`ConditionEngine`] against an [`AttributeLookup`].

mod condition;
mod engine;
mod error;
mod format;
mod lookup;
mod rules;

pub use condition::{CondFlags, Condition, MatchMode, USER_NAME};
pub use engine::{ConditionEngine, evaluate};
pub use error::{ConditionError, Result};
pub use format::{Captures, substitute};
pub use lookup::{Alias, AliasTable, AttributeLookup, RequestContext};
pub use rules::RuleSet;
