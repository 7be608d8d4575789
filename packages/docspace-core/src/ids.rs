use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

const MAX_ID_LENGTH: usize = 256;

fn valid_id_component(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_ID_LENGTH
        && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '+'))
}

/// Identity of a storage space. One space owns one underlying store and is
/// never merged with another; typically a DID-shaped string.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SpaceId(String);

impl SpaceId {
    pub fn new(s: impl Into<String>) -> Result<Self, Error> {
        let s = s.into();
        if !valid_id_component(&s) {
            return Err(Error::InvalidRequest(format!("invalid space id: {s:?}")));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SpaceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Identifier of a logical document. Documents exist implicitly once any
/// branch under them is created.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct DocId(String);

impl DocId {
    pub fn new(s: impl Into<String>) -> Result<Self, Error> {
        let s = s.into();
        if !valid_id_component(&s) {
            return Err(Error::InvalidRequest(format!("invalid doc id: {s:?}")));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DocId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A `(document, branch name)` pair naming one branch.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BranchRef {
    #[serde(rename = "docId")]
    pub doc: DocId,
    pub branch: String,
}

impl BranchRef {
    pub fn new(doc: DocId, branch: impl Into<String>) -> Result<Self, Error> {
        let branch = branch.into();
        if !valid_id_component(&branch) {
            return Err(Error::InvalidRequest(format!("invalid branch name: {branch:?}")));
        }
        Ok(Self { doc, branch })
    }

    /// Stable opaque id for the branch, derived from its name so the same
    /// `(doc, branch)` always maps to the same id.
    pub fn branch_id(&self) -> String {
        crate::hash::branch_digest(self.doc.as_str(), &self.branch)
    }
}

impl fmt::Display for BranchRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.doc, self.branch)
    }
}
