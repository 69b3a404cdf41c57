//! Identifier resolution shared by every backend.
//!
//! A full id (36 characters, 4 hyphens) is looked up exactly. Anything shorter
//! is a prefix: the backend collects every id of the entity kind and
//! [`classify_matches`] decides between not found, a unique match, and an
//! ambiguous prefix. An ambiguous prefix never resolves to one of its matches.

use super::{EntityKind, PersistenceError};

pub const FULL_ID_LEN: usize = 36;

pub fn is_full_id(id: &str) -> bool {
    id.len() == FULL_ID_LEN && id.bytes().filter(|b| *b == b'-').count() == 4
}

/// How a caller-supplied identifier must be looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    Exact(&'a str),
    Prefix(&'a str),
}

impl<'a> Lookup<'a> {
    pub fn parse(kind: EntityKind, id_or_prefix: &'a str) -> Result<Self, PersistenceError> {
        let trimmed = id_or_prefix.trim();
        if trimmed.is_empty() {
            return Err(PersistenceError::Validation(format!("empty {kind} id")));
        }
        if is_full_id(trimmed) {
            Ok(Lookup::Exact(trimmed))
        } else {
            Ok(Lookup::Prefix(trimmed))
        }
    }
}

/// Pick the single full-length candidate starting with `prefix`.
///
/// Candidates may be a superset (e.g. a case-insensitive SQL `LIKE`); they
/// are filtered again here with an exact, case-sensitive comparison.
pub fn classify_matches<I>(
    kind: EntityKind,
    prefix: &str,
    candidates: I,
) -> Result<String, PersistenceError>
where
    I: IntoIterator<Item = String>,
{
    let mut matches: Vec<String> = candidates
        .into_iter()
        .filter(|id| is_full_id(id) && id.starts_with(prefix))
        .collect();
    matches.sort();
    matches.dedup();

    match matches.len() {
        0 => Err(PersistenceError::not_found(kind, prefix)),
        1 => Ok(matches.remove(0)),
        n => Err(PersistenceError::Ambiguous {
            kind,
            prefix: prefix.to_string(),
            matches: n,
        }),
    }
}

/// `LIKE` pattern matching ids that start with `prefix`, escaped with `\`.
pub fn like_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
