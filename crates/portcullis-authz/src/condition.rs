//! A single authorization condition.

use regex::{Regex, RegexBuilder};

use crate::error::{ConditionError, Result};

/// Condition name that refers to the session's principal instead of an
/// attribute.
pub const USER_NAME: &str = "user";

/// How a condition's pattern is compared against a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Full-string equality.
    #[default]
    Exact,
    /// The pattern occurs anywhere in the value.
    Substring,
    /// The pattern is a regular expression.
    Regex {
        /// Publish capture groups to later conditions of the same evaluation.
        capture_refs: bool,
    },
}

/// Independent condition flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CondFlags {
    /// Join the clause of the preceding condition.
    pub or: bool,
    /// Invert the outcome over the whole value list.
    pub not: bool,
    /// Case-insensitive comparison.
    pub nocase: bool,
    /// Compare against attribute names as mapped through the alias table.
    pub map: bool,
    /// Skip this condition.
    pub ignore: bool,
    /// Created by a require line (later require lines for the same name
    /// supersede it).
    pub from_require: bool,
    /// The pattern contains `%` placeholders substituted per request.
    pub format: bool,
}

/// One rule of a directory's authorization rule set.
#[derive(Debug, Clone)]
pub struct Condition {
    name: String,
    pattern: String,
    mode: MatchMode,
    flags: CondFlags,
    /// Pre-compiled regex for patterns that need no per-request substitution.
    compiled: Option<Regex>,
}

impl Condition {
    /// Build a condition, compiling its regex when it can be compiled up front.
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<String>,
        mode: MatchMode,
        flags: CondFlags,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConditionError::EmptyName);
        }
        let pattern = pattern.into();
        let compiled = match mode {
            MatchMode::Regex { .. } if !flags.format => Some(compile(&pattern, flags.nocase)?),
            _ => None,
        };
        Ok(Self {
            name,
            pattern,
            mode,
            flags,
            compiled,
        })
    }

    /// Plain case-sensitive equality test.
    pub fn exact(name: impl Into<String>, pattern: impl Into<String>) -> Result<Self> {
        Self::new(name, pattern, MatchMode::Exact, CondFlags::default())
    }

    /// Build a condition from directive-style arguments.
    ///
    /// `options` is a bracketed, comma-separated list drawn from `OR`, `NOT`,
    /// `REG`, `NC`, `MAP`, `REF` and `SUB`, e.g. `"[REG,NC]"`; an empty string
    /// means no options. A pattern containing `%` is treated as a format
    /// string.
    pub fn parse(name: &str, pattern: &str, options: &str) -> Result<Self> {
        let mut flags = CondFlags {
            format: pattern.contains('%'),
            ..CondFlags::default()
        };
        let (mut regex, mut capture_refs, mut substring) = (false, false, false);

        let inner = options.trim();
        let inner = inner
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(inner);

        for option in inner.split(',').map(str::trim).filter(|o| !o.is_empty()) {
            match option.to_ascii_uppercase().as_str() {
                "OR" => flags.or = true,
                "NOT" => flags.not = true,
                "REG" => regex = true,
                "NC" => flags.nocase = true,
                "MAP" => flags.map = true,
                "REF" => capture_refs = true,
                "SUB" => substring = true,
                _ => return Err(ConditionError::UnknownOption(option.to_string())),
            }
        }

        let mode = match (regex, substring, capture_refs) {
            (true, true, _) => {
                return Err(ConditionError::ConflictingOptions(
                    "REG and SUB cannot be combined".to_string(),
                ));
            }
            (false, _, true) => {
                return Err(ConditionError::ConflictingOptions(
                    "REF requires REG".to_string(),
                ));
            }
            (true, false, capture_refs) => MatchMode::Regex { capture_refs },
            (false, true, false) => MatchMode::Substring,
            (false, false, false) => MatchMode::Exact,
        };

        Self::new(name, pattern, mode, flags)
    }

    /// Attribute name (or [`USER_NAME`]).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pattern as configured, before any substitution.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Match mode.
    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Flags.
    pub fn flags(&self) -> CondFlags {
        self.flags
    }

    /// Whether this condition tests the principal rather than an attribute.
    pub fn is_user(&self) -> bool {
        self.name == USER_NAME
    }

    /// Set the OR flag.
    pub fn with_or(mut self) -> Self {
        self.flags.or = true;
        self
    }

    /// Set the NOT flag.
    pub fn negated(mut self) -> Self {
        self.flags.not = true;
        self
    }

    pub(crate) fn set_ignore(&mut self) {
        self.flags.ignore = true;
    }

    pub(crate) fn compiled(&self) -> Option<&Regex> {
        self.compiled.as_ref()
    }
}

/// Compile a pattern, honouring case-insensitivity.
pub(crate) fn compile(pattern: &str, nocase: bool) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(nocase)
        .build()
        .map_err(|source| ConditionError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut options = Vec::new();
        let flags = self.flags;
        if flags.or {
            options.push("OR");
        }
        if flags.not {
            options.push("NOT");
        }
        match self.mode {
            MatchMode::Regex { capture_refs } => {
                options.push("REG");
                if capture_refs {
                    options.push("REF");
                }
            }
            MatchMode::Substring => options.push("SUB"),
            MatchMode::Exact => {}
        }
        if flags.nocase {
            options.push("NC");
        }
        if flags.map {
            options.push("MAP");
        }
        if flags.ignore {
            options.push("IGN");
        }
        if flags.from_require {
            options.push("REQ");
        }
        if flags.format {
            options.push("FSTR");
        }
        write!(f, "{:?} {:?} [{}]", self.name, self.pattern, options.join(","))
    }
}
