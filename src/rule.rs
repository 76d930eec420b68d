//! Pattern rules: regex match plus capture-group substitution.
//!
//! Path rewriting ([`PathRuleBackend`](crate::backend::PathRuleBackend)) and
//! thumbnail format selection ([`Thumbnailer`](crate::manipulator::Thumbnailer))
//! share this engine. A rule that does not match is not an error; it is the
//! "no rule applies" outcome and the caller decides what passthrough means.
//!
//! ## Template syntax
//!
//! | Reference | Meaning |
//! |---|---|
//! | `$1`, `${1}` | positional capture group |
//! | `${name}` | named capture group |
//! | `{1}` | positional capture group (format-string style) |
//! | `$$` | a literal `$` |
//!
//! Groups that did not participate in the match render as the empty string.
//! The rendered template is the whole result; it is not spliced back into
//! the input.

use regex::{Captures, Regex};

/// A single `pattern → template` rule.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pattern: Regex,
    template: String,
}

impl PatternRule {
    pub fn new(pattern: &str, template: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            template: template.into(),
        })
    }

    /// Render the template if the pattern matches `input`.
    pub fn apply(&self, input: &str) -> Option<String> {
        self.pattern
            .captures(input)
            .map(|caps| render(&self.template, &caps))
    }
}

/// An ordered rule list with first-match-wins semantics.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<PatternRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<PatternRule>) -> Self {
        Self { rules }
    }

    /// Render the template of the first rule whose pattern matches.
    ///
    /// Declaration order decides between overlapping patterns.
    pub fn first_match(&self, input: &str) -> Option<String> {
        self.rules.iter().find_map(|rule| rule.apply(input))
    }
}

impl FromIterator<PatternRule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = PatternRule>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

enum GroupRef<'t> {
    Index(usize),
    Name(&'t str),
}

/// Substitute capture groups from `caps` into `template`.
pub fn render(template: &str, caps: &Captures<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(|c| c == '$' || c == '{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("$$") {
            out.push('$');
            rest = &tail[2..];
            continue;
        }

        match parse_reference(tail) {
            Some((group, consumed)) => {
                out.push_str(group_value(caps, group));
                rest = &tail[consumed..];
            }
            None => {
                // Not a reference: '$' and '{' are both one byte.
                out.push_str(&tail[..1]);
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Parse a group reference at the start of `tail`, returning it together with
/// the number of bytes it spans.
fn parse_reference(tail: &str) -> Option<(GroupRef<'_>, usize)> {
    if let Some(after) = tail.strip_prefix("${") {
        let end = after.find('}')?;
        let name = &after[..end];
        if name.is_empty() {
            return None;
        }
        let group = match name.parse::<usize>() {
            Ok(index) => GroupRef::Index(index),
            Err(_) => GroupRef::Name(name),
        };
        return Some((group, end + 3));
    }

    if let Some(after) = tail.strip_prefix('$') {
        let digits = leading_digits(after);
        if digits == 0 {
            return None;
        }
        let index = after[..digits].parse().ok()?;
        return Some((GroupRef::Index(index), digits + 1));
    }

    let after = tail.strip_prefix('{')?;
    let digits = leading_digits(after);
    if digits == 0 || !after[digits..].starts_with('}') {
        return None;
    }
    let index = after[..digits].parse().ok()?;
    Some((GroupRef::Index(index), digits + 2))
}

fn leading_digits(s: &str) -> usize {
    s.bytes().take_while(u8::is_ascii_digit).count()
}

fn group_value<'h>(caps: &Captures<'h>, group: GroupRef<'_>) -> &'h str {
    let m = match group {
        GroupRef::Index(i) => caps.get(i),
        GroupRef::Name(n) => caps.name(n),
    };
    m.map(|m| m.as_str()).unwrap_or("")
}
