//! Shell-style variable substitution for `--set` values.
//!
//! Supported forms:
//! - `$VAR` and `${VAR}`
//! - `${VAR:-default}`: default when unset or empty
//! - `${VAR-default}`: default when unset
//! - `$$`: a literal `$`
//!
//! Unset variables expand to the empty string. Defaults are inserted
//! verbatim, they are not expanded again.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;

static SUBST_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\$(?:(?P<escape>\$)|\{(?P<braced>[A-Za-z_][A-Za-z0-9_]*)(?:(?P<op>:?-)(?P<default>[^}]*))?\}|(?P<simple>[A-Za-z_][A-Za-z0-9_]*))",
    )
    .expect("Valid regex pattern")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvsubstError {
    #[error("unterminated substitution at byte {0}")]
    Unterminated(usize),

    #[error("bad substitution at byte {0}")]
    BadSubstitution(usize),
}

/// Expand against the process environment.
pub fn expand_env(input: &str) -> Result<String, EnvsubstError> {
    expand_with(input, |name| std::env::var(name).ok())
}

/// Expand using `lookup` to resolve variable names.
pub fn expand_with<F>(input: &str, lookup: F) -> Result<String, EnvsubstError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut last = 0;

    for caps in SUBST_REGEX.captures_iter(input) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        check_literal(input, last, whole.start())?;
        out.push_str(&input[last..whole.start()]);
        out.push_str(&substitute(&caps, &lookup));
        last = whole.end();
    }
    check_literal(input, last, input.len())?;
    out.push_str(&input[last..]);

    Ok(out)
}

fn substitute<F>(caps: &Captures<'_>, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if caps.name("escape").is_some() {
        return "$".to_string();
    }
    if let Some(name) = caps.name("simple") {
        return lookup(name.as_str()).unwrap_or_default();
    }

    let name = caps.name("braced").map_or("", |m| m.as_str());
    let value = lookup(name);
    let default = caps.name("default").map_or("", |m| m.as_str());
    match caps.name("op").map(|m| m.as_str()) {
        Some(":-") => value
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string()),
        Some(_) => value.unwrap_or_else(|| default.to_string()),
        None => value.unwrap_or_default(),
    }
}

/// Text between matches may not start a `${` form the regex rejected.
fn check_literal(input: &str, start: usize, end: usize) -> Result<(), EnvsubstError> {
    let Some(offset) = input[start..end].find("${") else {
        return Ok(());
    };
    let position = start + offset;
    if input[position..].contains('}') {
        Err(EnvsubstError::BadSubstitution(position))
    } else {
        Err(EnvsubstError::Unterminated(position))
    }
}
