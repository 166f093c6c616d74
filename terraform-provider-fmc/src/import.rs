//! Import ID parsing
//!
//! `terraform import` hands the provider a single string. FMC resources
//! accept a handful of shapes:
//!
//! * `<id>`
//! * `<domain>,<id>`
//! * `[name1,name2]` and `<domain>,[name1,name2]` for bulk resources
//! * `<parent_id>,[name1]` / `<domain>,<parent_id>,[name1]` for bulk
//!   resources that live under a parent object

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ImportError {
    #[error("Import ID is empty")]
    Empty,
    #[error("Unbalanced brackets in import ID '{0}'")]
    UnbalancedBrackets(String),
    #[error("Empty element in import ID '{0}'")]
    EmptyPart(String),
    #[error("Expected {expected}, got '{got}'")]
    UnexpectedFormat { expected: String, got: String },
}

/// One comma-separated element of an import ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportPart {
    Scalar(String),
    List(Vec<String>),
}

/// Parsed import ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportId {
    raw: String,
    parts: Vec<ImportPart>,
}

impl ImportId {
    /// Split an import ID into scalars and bracketed lists.
    pub fn parse(raw: &str) -> Result<Self, ImportError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ImportError::Empty);
        }

        let mut parts = Vec::new();
        let mut rest = trimmed;

        while !rest.is_empty() {
            rest = rest.trim_start();
            if let Some(inner) = rest.strip_prefix('[') {
                let end = inner
                    .find(']')
                    .ok_or_else(|| ImportError::UnbalancedBrackets(raw.to_string()))?;
                let list = &inner[..end];
                if list.contains('[') {
                    return Err(ImportError::UnbalancedBrackets(raw.to_string()));
                }
                let names: Vec<String> = list
                    .split(',')
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .collect();
                parts.push(ImportPart::List(names));

                rest = inner[end + 1..].trim_start();
                if rest.is_empty() {
                    break;
                }
                rest = rest
                    .strip_prefix(',')
                    .ok_or_else(|| ImportError::UnbalancedBrackets(raw.to_string()))?;
            } else {
                let (token, tail) = match rest.find(',') {
                    Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
                    None => (rest, None),
                };
                let token = token.trim();
                if token.contains(']') || token.contains('[') {
                    return Err(ImportError::UnbalancedBrackets(raw.to_string()));
                }
                if token.is_empty() {
                    return Err(ImportError::EmptyPart(raw.to_string()));
                }
                parts.push(ImportPart::Scalar(token.to_string()));
                match tail {
                    Some(t) if t.trim().is_empty() => {
                        return Err(ImportError::EmptyPart(raw.to_string()))
                    }
                    Some(t) => rest = t,
                    None => break,
                }
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    /// `<id>` or `<domain>,<id>`
    pub fn single(&self) -> Result<(Option<String>, String), ImportError> {
        match self.parts.as_slice() {
            [ImportPart::Scalar(id)] => Ok((None, id.clone())),
            [ImportPart::Scalar(domain), ImportPart::Scalar(id)] => {
                Ok((Some(domain.clone()), id.clone()))
            }
            _ => Err(self.unexpected("<id> or <domain>,<id>")),
        }
    }

    /// `[names]` or `<domain>,[names]`
    pub fn named_list(&self) -> Result<(Option<String>, Vec<String>), ImportError> {
        match self.parts.as_slice() {
            [ImportPart::List(names)] => Ok((None, names.clone())),
            [ImportPart::Scalar(domain), ImportPart::List(names)] => {
                Ok((Some(domain.clone()), names.clone()))
            }
            _ => Err(self.unexpected("[<name>,...] or <domain>,[<name>,...]")),
        }
    }

    /// `<parent_id>,[names]` or `<domain>,<parent_id>,[names]`
    pub fn parent_list(&self) -> Result<(Option<String>, String, Vec<String>), ImportError> {
        match self.parts.as_slice() {
            [ImportPart::Scalar(parent), ImportPart::List(names)] => {
                Ok((None, parent.clone(), names.clone()))
            }
            [ImportPart::Scalar(domain), ImportPart::Scalar(parent), ImportPart::List(names)] => {
                Ok((Some(domain.clone()), parent.clone(), names.clone()))
            }
            _ => Err(self.unexpected(
                "<parent_id>,[<name>,...] or <domain>,<parent_id>,[<name>,...]",
            )),
        }
    }

    fn unexpected(&self, expected: &str) -> ImportError {
        ImportError::UnexpectedFormat {
            expected: expected.to_string(),
            got: self.raw.clone(),
        }
    }
}
