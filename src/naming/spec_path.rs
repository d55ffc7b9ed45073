//! Property path lookup inside a resource `spec`.
//!
//! Paths are dot-separated keys with optional array indexing, for example
//! `properties.storageProfile.dataDisks[1].name`.

use crate::error::NamingError;
use serde_yaml::Value;

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

fn parse(path: &str) -> Result<Vec<Segment<'_>>, NamingError> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let (key, index) = split_brackets(part);
        segments.push(Segment::Key(key));

        if let Some(index) = index {
            let inner = &index[1..index.len() - 1];
            let idx = inner.parse::<usize>().map_err(|_| NamingError::InvalidPath {
                path: path.to_string(),
            })?;
            segments.push(Segment::Index(idx));
        }
    }
    Ok(segments)
}

/// Splits `name[3]` into `("name", Some("[3]"))`.
fn split_brackets(part: &str) -> (&str, Option<&str>) {
    if part.ends_with(']') {
        if let Some(open) = part.rfind('[') {
            return (&part[..open], Some(&part[open..]));
        }
    }
    (part, None)
}

/// Look up `path` in `root`. `Ok(None)` means the path does not exist.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Result<Option<&'a Value>, NamingError> {
    let mut current = root;
    for segment in parse(path)? {
        let next = match segment {
            Segment::Key(key) => current.as_mapping().and_then(|m| m.get(key)),
            Segment::Index(idx) => current.as_sequence().and_then(|s| s.get(idx)),
        };
        match next {
            Some(value) => current = value,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}
