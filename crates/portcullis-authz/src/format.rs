//! Per-request substitution of `%` placeholders in condition patterns.
//!
//! Placeholders:
//! - `%{name}`: first value of attribute `name` in the format context
//! - `%{$1}`, `%{$name}`: capture group published by an earlier `REF`
//!   condition of the same evaluation
//! - `%0` … `%9`: shorthand for `%{$0}` … `%{$9}`
//! - `%%`: a literal `%`

use std::collections::HashMap;

use regex::Regex;

use crate::lookup::AttributeLookup;

/// Capture groups published during one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    values: HashMap<String, String>,
}

impl Captures {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `$N` or `$name`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Number of published values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing has been published.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace the published groups with those of a new match.
    pub(crate) fn replace_from(&mut self, regex: &Regex, caps: &regex::Captures<'_>) {
        self.values.clear();
        for (i, m) in caps.iter().enumerate() {
            if let Some(m) = m {
                self.values.insert(format!("${i}"), m.as_str().to_string());
            }
        }
        for name in regex.capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                self.values.insert(format!("${name}"), m.as_str().to_string());
            }
        }
    }
}

/// Expand placeholders in `pattern`.
///
/// Returns `None` when a placeholder cannot be resolved or is malformed; the
/// caller treats such a condition as failed. With `escape` set, substituted
/// text is regex-escaped so attribute values match literally.
pub fn substitute(
    pattern: &str,
    context: &dyn AttributeLookup,
    captures: &Captures,
    escape: bool,
) -> Option<String> {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let value = match chars.peek().copied() {
            Some('%') => {
                chars.next();
                out.push('%');
                continue;
            }
            Some('{') => {
                chars.next();
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => key.push(ch),
                        None => return None,
                    }
                }
                resolve(&key, context, captures)?
            }
            Some(d) if d.is_ascii_digit() => {
                chars.next();
                captures.get(&format!("${d}"))?
            }
            _ => {
                out.push('%');
                continue;
            }
        };

        if escape {
            out.push_str(&regex::escape(value));
        } else {
            out.push_str(value);
        }
    }

    Some(out)
}

fn resolve<'a>(key: &str, context: &'a dyn AttributeLookup, captures: &'a Captures) -> Option<&'a str> {
    if key.starts_with('$') {
        captures.get(key)
    } else {
        context.first_value(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::RequestContext;

    fn ctx() -> RequestContext {
        RequestContext::new()
            .with_values("uid", ["alice"])
            .with_values("domain", ["example.com", "example.org"])
            .with_values("dotted", ["a.b"])
    }

    #[test]
    fn test_attribute_placeholder() {
        let s = substitute("%{uid}@%{domain}", &ctx(), &Captures::new(), false);
        assert_eq!(s.as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn test_literal_percent() {
        let s = substitute("100%% of %{uid}", &ctx(), &Captures::new(), false);
        assert_eq!(s.as_deref(), Some("100% of alice"));
        let s = substitute("50%", &ctx(), &Captures::new(), false);
        assert_eq!(s.as_deref(), Some("50%"));
    }

    #[test]
    fn test_missing_attribute_unresolved() {
        assert!(substitute("%{nope}", &ctx(), &Captures::new(), false).is_none());
        assert!(substitute("%{uid", &ctx(), &Captures::new(), false).is_none());
    }

    #[test]
    fn test_backrefs() {
        let re = Regex::new(r"^(?P<user>[^@]+)@(.+)$").unwrap();
        let caps = re.captures("bob@example.com").unwrap();
        let mut captures = Captures::new();
        captures.replace_from(&re, &caps);

        let s = substitute("%1/%2/%{$user}", &ctx(), &captures, false);
        assert_eq!(s.as_deref(), Some("bob/example.com/bob"));
        assert!(substitute("%7", &ctx(), &captures, false).is_none());
    }

    #[test]
    fn test_escape_for_regex() {
        let s = substitute("^%{dotted}$", &ctx(), &Captures::new(), true);
        assert_eq!(s.as_deref(), Some(r"^a\.b$"));
    }
}
