//! Shared grid-placement types.
//!
//! The cubed-sphere tile carries fields on four horizontal staggerings
//! (Arakawa C/D placements) and two vertical placements. These enums are
//! used when allocating fields and when building halo exchange
//! descriptors, so a field's placement is part of its type information
//! rather than an implicit convention.

use serde::{Deserialize, Serialize};

/// Horizontal placement of a field on the staggered tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Staggering {
    /// Cell centers (nx × ny points).
    Center,
    /// X-direction cell interfaces (nx+1 × ny points), e.g. `uc`.
    XEdge,
    /// Y-direction cell interfaces (nx × ny+1 points), e.g. `vc`.
    YEdge,
    /// Cell corners (nx+1 × ny+1 points), e.g. `divgd`.
    Corner,
}

impl Staggering {
    /// Extra compute points relative to the cell-center extents.
    #[inline]
    pub fn extra(self) -> (usize, usize) {
        match self {
            Staggering::Center => (0, 0),
            Staggering::XEdge => (1, 0),
            Staggering::YEdge => (0, 1),
            Staggering::Corner => (1, 1),
        }
    }
}

/// Vertical placement of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Levels {
    /// Layer midpoints (npz values per column).
    Layer,
    /// Layer interfaces (npz+1 values per column).
    Interface,
}

impl Levels {
    /// Number of vertical points for a column with `npz` layers.
    #[inline]
    pub fn count(self, npz: usize) -> usize {
        match self {
            Levels::Layer => npz,
            Levels::Interface => npz + 1,
        }
    }
}
