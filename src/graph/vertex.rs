//! Vertex identifiers before and after relabeling.
//!
//! Sampling works on raw integer ids ([`Vertex`]). When fragments are handed
//! to the merger every vertex is rewritten to a [`LabeledVertex`]: the
//! fragment's alphabetic prefix followed by the original id, e.g. `ab17`.

use crate::scaler_error::ScalerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Raw vertex id as read from the input edge list.
pub type Vertex = u64;

/// Directed edge `(tail, head)` over raw vertex ids.
pub type Edge = (Vertex, Vertex);

/// Canonical bound set for vertex identifiers stored in a multigraph.
///
/// `Display` is required so fragments can be written as edge lists.
pub trait VertexLike: Copy + Eq + std::hash::Hash + Ord + fmt::Debug + fmt::Display {}
impl<T> VertexLike for T where T: Copy + Eq + std::hash::Hash + Ord + fmt::Debug + fmt::Display {}

/// A vertex rewritten into the disjoint namespace of one fragment.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LabeledVertex {
    fragment: u32,
    id: Vertex,
}

impl LabeledVertex {
    pub fn new(fragment: u32, id: Vertex) -> Self {
        Self { fragment, id }
    }

    /// Global index of the fragment this vertex belongs to.
    pub fn fragment(&self) -> u32 {
        self.fragment
    }

    /// Original vertex id inside the fragment.
    pub fn id(&self) -> Vertex {
        self.id
    }
}

impl fmt::Display for LabeledVertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_prefix(f, self.fragment as usize)?;
        write!(f, "{}", self.id)
    }
}

impl FromStr for LabeledVertex {
    type Err = ScalerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScalerError::InvalidLabel(s.to_string());
        let split = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let (prefix, digits) = s.split_at(split);
        let fragment = prefix_index(prefix).ok_or_else(invalid)?;
        let fragment = u32::try_from(fragment).map_err(|_| invalid())?;
        let id = digits.parse::<Vertex>().map_err(|_| invalid())?;
        Ok(Self { fragment, id })
    }
}

/// Alphabetic prefix of the fragment with global index `index`.
///
/// Bijective base-26: `0 → a`, `25 → z`, `26 → aa`, `27 → ab`, …
pub fn fragment_prefix(index: usize) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_prefix(&mut out, index);
    out
}

fn write_prefix(out: &mut impl fmt::Write, index: usize) -> fmt::Result {
    let mut letters = [0u8; 16];
    let mut len = 0;
    let mut n = index as u128 + 1;
    while n > 0 {
        n -= 1;
        letters[len] = b'a' + (n % 26) as u8;
        len += 1;
        n /= 26;
    }
    for &c in letters[..len].iter().rev() {
        out.write_char(c as char)?;
    }
    Ok(())
}

/// Inverse of [`fragment_prefix`]; `None` for empty or non-lowercase input.
pub fn prefix_index(prefix: &str) -> Option<usize> {
    if prefix.is_empty() {
        return None;
    }
    let mut acc: usize = 0;
    for c in prefix.bytes() {
        if !c.is_ascii_lowercase() {
            return None;
        }
        acc = acc
            .checked_mul(26)?
            .checked_add(usize::from(c - b'a') + 1)?;
    }
    Some(acc - 1)
}
