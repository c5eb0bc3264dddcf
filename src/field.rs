//! Typed field containers for the staggered tile.
//!
//! Fields are flat `Vec<f64>` buffers with a halo ring around the
//! horizontal compute domain. Indexing is tile-local and signed:
//! `(0, 0)` is the first compute cell, `(-n_halo, -n_halo)` the halo
//! corner. Any field consumed by a stencil across a cell boundary must
//! have been halo-exchanged since its last mutation (see the halo
//! module); the containers themselves do no synchronization.

use std::ops::{Index, IndexMut};

use crate::types::{Levels, Staggering};

/// A 3D field on the staggered tile: horizontal compute extents plus a
/// halo ring, times a vertical axis.
#[derive(Clone, Debug, PartialEq)]
pub struct Field3 {
    data: Vec<f64>,
    /// Horizontal compute extents (staggering included).
    nx: usize,
    ny: usize,
    /// Vertical point count (layers or interfaces).
    nz: usize,
    n_halo: usize,
    staggering: Staggering,
    levels: Levels,
}

impl Field3 {
    /// Allocate a zero-filled field.
    ///
    /// `nx`/`ny` are the *cell-center* compute extents; the actual
    /// horizontal extents follow from the staggering.
    pub fn zeros(
        nx: usize,
        ny: usize,
        npz: usize,
        n_halo: usize,
        staggering: Staggering,
        levels: Levels,
    ) -> Self {
        let (ex, ey) = staggering.extra();
        let nx = nx + ex;
        let ny = ny + ey;
        let nz = levels.count(npz);
        let len = (nx + 2 * n_halo) * (ny + 2 * n_halo) * nz;
        Self {
            data: vec![0.0; len],
            nx,
            ny,
            nz,
            n_halo,
            staggering,
            levels,
        }
    }

    /// Horizontal compute extents, staggering included.
    #[inline]
    pub fn extents(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    /// Number of vertical points.
    #[inline]
    pub fn nz(&self) -> usize {
        self.nz
    }

    /// Halo width.
    #[inline]
    pub fn n_halo(&self) -> usize {
        self.n_halo
    }

    /// Horizontal staggering this field was allocated with.
    #[inline]
    pub fn staggering(&self) -> Staggering {
        self.staggering
    }

    /// Vertical placement this field was allocated with.
    #[inline]
    pub fn levels(&self) -> Levels {
        self.levels
    }

    #[inline]
    fn offset(&self, i: isize, j: isize, k: usize) -> usize {
        let h = self.n_halo as isize;
        debug_assert!(i >= -h && i < self.nx as isize + h, "i={} out of range", i);
        debug_assert!(j >= -h && j < self.ny as isize + h, "j={} out of range", j);
        debug_assert!(k < self.nz, "k={} out of range", k);
        let ytot = self.ny + 2 * self.n_halo;
        (((i + h) as usize) * ytot + (j + h) as usize) * self.nz + k
    }

    /// Fill the whole buffer (halo included) with one value.
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Set every point (halo included) from `(i, j, k)`.
    pub fn assign(&mut self, mut f: impl FnMut(isize, isize, usize) -> f64) {
        let h = self.n_halo as isize;
        for i in -h..self.nx as isize + h {
            for j in -h..self.ny as isize + h {
                for k in 0..self.nz {
                    let v = f(i, j, k);
                    self[(i, j, k)] = v;
                }
            }
        }
    }

    /// Sum over the compute domain (halo excluded) at one level.
    pub fn interior_sum(&self, k: usize) -> f64 {
        let mut s = 0.0;
        for i in 0..self.nx as isize {
            for j in 0..self.ny as isize {
                s += self[(i, j, k)];
            }
        }
        s
    }

    /// Maximum absolute value over the whole buffer.
    pub fn max_abs(&self) -> f64 {
        self.data.iter().fold(0.0_f64, |m, v| m.max(v.abs()))
    }

    /// Raw data access, for exchange buffers and tests.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Raw mutable data access.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

impl Index<(isize, isize, usize)> for Field3 {
    type Output = f64;

    #[inline(always)]
    fn index(&self, (i, j, k): (isize, isize, usize)) -> &f64 {
        &self.data[self.offset(i, j, k)]
    }
}

impl IndexMut<(isize, isize, usize)> for Field3 {
    #[inline(always)]
    fn index_mut(&mut self, (i, j, k): (isize, isize, usize)) -> &mut f64 {
        let off = self.offset(i, j, k);
        &mut self.data[off]
    }
}

/// A 2D horizontal field (one value per column), same halo layout as
/// [`Field3`].
#[derive(Clone, Debug, PartialEq)]
pub struct Field2 {
    data: Vec<f64>,
    nx: usize,
    ny: usize,
    n_halo: usize,
}

impl Field2 {
    /// Allocate a zero-filled 2D field on cell centers.
    pub fn zeros(nx: usize, ny: usize, n_halo: usize) -> Self {
        Self::zeros_staggered(nx, ny, n_halo, Staggering::Center)
    }

    /// Allocate a zero-filled 2D field on the given staggering.
    pub fn zeros_staggered(nx: usize, ny: usize, n_halo: usize, staggering: Staggering) -> Self {
        let (ex, ey) = staggering.extra();
        let nx = nx + ex;
        let ny = ny + ey;
        let len = (nx + 2 * n_halo) * (ny + 2 * n_halo);
        Self {
            data: vec![0.0; len],
            nx,
            ny,
            n_halo,
        }
    }

    /// Horizontal compute extents.
    #[inline]
    pub fn extents(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    #[inline]
    fn offset(&self, i: isize, j: isize) -> usize {
        let h = self.n_halo as isize;
        debug_assert!(i >= -h && i < self.nx as isize + h, "i={} out of range", i);
        debug_assert!(j >= -h && j < self.ny as isize + h, "j={} out of range", j);
        let ytot = self.ny + 2 * self.n_halo;
        ((i + h) as usize) * ytot + (j + h) as usize
    }

    /// Fill the whole buffer with one value.
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Set every point (halo included) from `(i, j)`.
    pub fn assign(&mut self, mut f: impl FnMut(isize, isize) -> f64) {
        let h = self.n_halo as isize;
        for i in -h..self.nx as isize + h {
            for j in -h..self.ny as isize + h {
                let v = f(i, j);
                self[(i, j)] = v;
            }
        }
    }
}

impl Index<(isize, isize)> for Field2 {
    type Output = f64;

    #[inline(always)]
    fn index(&self, (i, j): (isize, isize)) -> &f64 {
        &self.data[self.offset(i, j)]
    }
}

impl IndexMut<(isize, isize)> for Field2 {
    #[inline(always)]
    fn index_mut(&mut self, (i, j): (isize, isize)) -> &mut f64 {
        let off = self.offset(i, j);
        &mut self.data[off]
    }
}

/// A vertical reference column (one value per level or interface),
/// shared by every grid point. Used for `ak`/`bk`, `dp_ref`, `pfull`.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnK {
    data: Vec<f64>,
}

impl ColumnK {
    /// Wrap an existing column.
    pub fn new(data: Vec<f64>) -> Self {
        Self { data }
    }

    /// Zero column with `n` points.
    pub fn zeros(n: usize) -> Self {
        Self { data: vec![0.0; n] }
    }

    /// Number of vertical points.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the column has no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Column values.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Mutable column values.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }
}

impl Index<usize> for ColumnK {
    type Output = f64;

    #[inline(always)]
    fn index(&self, k: usize) -> &f64 {
        &self.data[k]
    }
}

impl IndexMut<usize> for ColumnK {
    #[inline(always)]
    fn index_mut(&mut self, k: usize) -> &mut f64 {
        &mut self.data[k]
    }
}
