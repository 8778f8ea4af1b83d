//! Dotted field keys: `data.<category path>.<field>[.<index>][_label]`.
//!
//! Every component that needs to know whether a key belongs to a collection
//! entry goes through [`decode`]; nothing else splits keys by hand.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

pub const ROOT: &str = "data";
pub const SEPARATOR: char = '.';
/// Suffix of the key that stores a selection's display label. It is glued to
/// the last segment so the label sits beside its value in the nested tree.
pub const SHADOW_SUFFIX: &str = "_label";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldKey(String);

impl FieldKey {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl AsRef<str> for FieldKey {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl From<FieldKey> for String {
    fn from(key: FieldKey) -> Self {
        key.0
    }
}

/// A key that addresses one field of one collection entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionKey {
    pub category_path: Vec<String>,
    pub field_name: String,
    pub index: u32,
    pub shadow: bool,
}

impl CollectionKey {
    pub fn category_path_matches(&self, path: &[String]) -> bool {
        self.category_path.as_slice() == path
    }
}

pub fn encode<S: AsRef<str>>(
    category_path: &[S],
    field_name: &str,
    index: Option<u32>,
) -> Result<FieldKey> {
    if index.is_some() && category_path.is_empty() {
        return Err(EngineError::EmptyCategoryPath(field_name.to_string()));
    }
    let mut out = String::from(ROOT);
    for segment in category_path {
        let segment = segment.as_ref();
        check_segment(segment)?;
        out.push(SEPARATOR);
        out.push_str(segment);
    }
    check_segment(field_name)?;
    out.push(SEPARATOR);
    out.push_str(field_name);
    if let Some(index) = index {
        if index == 0 {
            return Err(EngineError::InvalidIndex(index));
        }
        out.push(SEPARATOR);
        out.push_str(index.to_string().as_str());
    }
    Ok(FieldKey(out))
}

/// Returns `None` for keys without a trailing positive index. That is the
/// normal answer for static fields.
pub fn decode(key: &str) -> Option<CollectionKey> {
    let (key, shadow) = match key.strip_suffix(SHADOW_SUFFIX) {
        Some(base) => (base, true),
        None => (key, false),
    };
    let mut segments: Vec<&str> = key.split(SEPARATOR).collect();
    if segments.first() != Some(&ROOT) {
        return None;
    }
    // root, at least one category segment, field, index
    if segments.len() < 4 {
        return None;
    }
    let index = parse_index(segments.pop()?)?;
    let field_name = segments.pop()?;
    if field_name.is_empty() || segments[1..].iter().any(|segment| segment.is_empty()) {
        return None;
    }
    Some(CollectionKey {
        category_path: segments[1..].iter().map(|segment| segment.to_string()).collect(),
        field_name: field_name.to_string(),
        index,
        shadow,
    })
}

/// Replaces only the trailing index, keeping a shadow suffix in place.
pub fn with_index(key: &str, new_index: u32) -> Result<FieldKey> {
    if new_index == 0 {
        return Err(EngineError::InvalidIndex(new_index));
    }
    let Some(decoded) = decode(key) else {
        return Err(EngineError::NotIndexed(key.to_string()));
    };
    let encoded = encode(
        decoded.category_path.as_slice(),
        decoded.field_name.as_str(),
        Some(new_index),
    )?;
    if decoded.shadow {
        Ok(FieldKey(shadow_key(encoded.as_str())))
    } else {
        Ok(encoded)
    }
}

pub fn shadow_key(key: &str) -> String {
    format!("{key}{SHADOW_SUFFIX}")
}

pub fn is_shadow(key: &str) -> bool {
    key.len() > SHADOW_SUFFIX.len() && key.ends_with(SHADOW_SUFFIX)
}

/// Catalog keys carry a placeholder index; this strips it.
pub fn template_key(key: &str) -> String {
    match key.rsplit_once(SEPARATOR) {
        Some((head, tail)) if parse_index(tail).is_some() => head.to_string(),
        _ => key.to_string(),
    }
}

fn parse_index(segment: &str) -> Option<u32> {
    if segment.is_empty() || !segment.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    match segment.parse::<u32>() {
        Ok(0) | Err(_) => None,
        Ok(value) => Some(value),
    }
}

fn check_segment(segment: &str) -> Result<()> {
    if segment.is_empty() || segment.contains(SEPARATOR) {
        return Err(EngineError::InvalidSegment(segment.to_string()));
    }
    Ok(())
}
