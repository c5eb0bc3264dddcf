//! Tile geometry: index bookkeeping and immutable metric terms.
//!
//! `GridIndexing` owns the compute-domain extents and halo width and is
//! the single source of truth for loop ranges. `GridData` holds the
//! per-rank metric terms (areas, spacings, Coriolis, hybrid vertical
//! coordinate); it is built once by the external initializer and
//! read-only for the life of the run.

use serde::{Deserialize, Serialize};

use crate::constants::P_REF;
use crate::error::ConfigError;
use crate::field::{ColumnK, Field2, Field3};
use crate::types::{Levels, Staggering};

/// Compute-domain extents and halo width for one rank's sub-domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridIndexing {
    /// Cell-center compute extent in x.
    pub nx: usize,
    /// Cell-center compute extent in y.
    pub ny: usize,
    /// Number of vertical layers.
    pub npz: usize,
    /// Halo width.
    pub n_halo: usize,
    /// True when this sub-domain has no tile-edge adjacency, which
    /// permits the fused interior transport variant.
    pub tile_interior: bool,
}

impl GridIndexing {
    /// Create indexing for one sub-domain, validating that the compute
    /// domain can support the halo width.
    pub fn new(nx: usize, ny: usize, npz: usize, n_halo: usize) -> Result<Self, ConfigError> {
        if nx < n_halo || ny < n_halo {
            return Err(ConfigError::DomainTooSmall { nx, ny, n_halo });
        }
        if npz < 2 {
            return Err(ConfigError::TooFewLayers(npz));
        }
        Ok(Self {
            nx,
            ny,
            npz,
            n_halo,
            tile_interior: false,
        })
    }

    /// Mark this sub-domain as tile-interior (no panel-edge adjacency).
    pub fn with_tile_interior(mut self, interior: bool) -> Self {
        self.tile_interior = interior;
        self
    }

    /// Allocate a zero field on this sub-domain.
    pub fn field(&self, staggering: Staggering, levels: Levels) -> Field3 {
        Field3::zeros(self.nx, self.ny, self.npz, self.n_halo, staggering, levels)
    }

    /// Allocate a zero 2D field on cell centers.
    pub fn field2(&self) -> Field2 {
        Field2::zeros(self.nx, self.ny, self.n_halo)
    }

    /// Signed iteration range over compute cells in x, widened by
    /// `lo`/`hi` halo cells.
    #[inline]
    pub fn x_range(&self, lo: isize, hi: isize) -> std::ops::Range<isize> {
        -lo..self.nx as isize + hi
    }

    /// Signed iteration range over compute cells in y, widened by
    /// `lo`/`hi` halo cells.
    #[inline]
    pub fn y_range(&self, lo: isize, hi: isize) -> std::ops::Range<isize> {
        -lo..self.ny as isize + hi
    }

    /// Full-domain range in x (compute plus the whole halo ring).
    #[inline]
    pub fn x_full(&self) -> std::ops::Range<isize> {
        self.x_range(self.n_halo as isize, self.n_halo as isize)
    }

    /// Full-domain range in y.
    #[inline]
    pub fn y_full(&self) -> std::ops::Range<isize> {
        self.y_range(self.n_halo as isize, self.n_halo as isize)
    }
}

/// Immutable per-rank metric terms. Uniform-spacing constructor below;
/// a real cubed-sphere build would fill these from the metric generator.
#[derive(Clone, Debug)]
pub struct GridData {
    /// Cell area (m²) on cell centers.
    pub area: Field2,
    /// Inverse cell area.
    pub rarea: Field2,
    /// Inverse corner-cell area (for corner-staggered divergence).
    pub rarea_c: Field2,
    /// Inverse cell-center grid spacing in x (1/m).
    pub rdxa: Field2,
    /// Inverse cell-center grid spacing in y (1/m).
    pub rdya: Field2,
    /// C-grid (interface-to-interface) spacing in x.
    pub dxc: Field2,
    /// C-grid spacing in y.
    pub dyc: Field2,
    /// Inverse of `dxc`.
    pub rdxc: Field2,
    /// Inverse of `dyc`.
    pub rdyc: Field2,
    /// Cell edge length in y, crossed by x-direction fluxes (m).
    pub dy_edge: Field2,
    /// Cell edge length in x, crossed by y-direction fluxes (m).
    pub dx_edge: Field2,
    /// Coriolis parameter at cell corners (1/s).
    pub fc: Field2,
    /// Hybrid coordinate coefficient, pressure part (Pa), npz+1 values.
    pub ak: ColumnK,
    /// Hybrid coordinate coefficient, sigma part, npz+1 values.
    pub bk: ColumnK,
    /// Model-top pressure (Pa).
    pub ptop: f64,
}

impl GridData {
    /// Build uniform metric terms for a rectangular tile: constant
    /// spacing, constant Coriolis. Sufficient for the doubly-periodic
    /// configuration the tests run on.
    pub fn uniform(idx: &GridIndexing, dx: f64, dy: f64, f0: f64, ak: ColumnK, bk: ColumnK) -> Self {
        assert_eq!(ak.len(), idx.npz + 1, "ak must have npz+1 interfaces");
        assert_eq!(bk.len(), idx.npz + 1, "bk must have npz+1 interfaces");
        let ptop = ak[0];
        let mut constant = |v: f64| {
            let mut f = idx.field2();
            f.fill(v);
            f
        };
        let area = constant(dx * dy);
        let rarea = constant(1.0 / (dx * dy));
        let rarea_c = constant(1.0 / (dx * dy));
        Self {
            area,
            rarea,
            rarea_c,
            rdxa: constant(1.0 / dx),
            rdya: constant(1.0 / dy),
            dxc: constant(dx),
            dyc: constant(dy),
            rdxc: constant(1.0 / dx),
            rdyc: constant(1.0 / dy),
            dy_edge: constant(dy),
            dx_edge: constant(dx),
            fc: constant(f0),
            ak,
            bk,
            ptop,
        }
    }

    /// Reference layer-mean pressure column (Pa) from the hybrid
    /// coordinate at the reference surface pressure.
    pub fn reference_pressure_column(&self) -> ColumnK {
        let npz = self.ak.len() - 1;
        let mut pfull = ColumnK::zeros(npz);
        for k in 0..npz {
            let p_lo = self.ak[k] + self.bk[k] * P_REF;
            let p_hi = self.ak[k + 1] + self.bk[k + 1] * P_REF;
            pfull[k] = 0.5 * (p_lo + p_hi);
        }
        pfull
    }
}

/// Immutable damping metrics.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DampingCoefficients {
    /// Minimum cell area over the whole grid (m²).
    pub da_min: f64,
    /// Minimum corner-cell area (m²).
    pub da_min_c: f64,
}

impl DampingCoefficients {
    /// Damping metrics for a uniform grid.
    pub fn uniform(dx: f64, dy: f64) -> Self {
        Self {
            da_min: dx * dy,
            da_min_c: dx * dy,
        }
    }
}

/// Build a plain sigma coordinate: `ak = ptop` at the top then 0, with
/// `bk` ramping linearly to 1. Handy for tests; real runs load tabulated
/// coefficients.
pub fn sigma_coordinate(npz: usize, ptop: f64) -> (ColumnK, ColumnK) {
    let mut ak = ColumnK::zeros(npz + 1);
    let mut bk = ColumnK::zeros(npz + 1);
    ak[0] = ptop;
    for k in 1..=npz {
        let s = k as f64 / npz as f64;
        ak[k] = ptop * (1.0 - s);
        bk[k] = s;
    }
    (ak, bk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexing_rejects_tiny_domain() {
        assert!(GridIndexing::new(2, 2, 4, 3).is_err());
        assert!(GridIndexing::new(4, 4, 4, 3).is_ok());
    }

    #[test]
    fn indexing_rejects_single_layer_column() {
        // The column solvers extrapolate the surface perturbation
        // pressure from the bottom two layers.
        assert_eq!(
            GridIndexing::new(4, 4, 1, 3).unwrap_err(),
            ConfigError::TooFewLayers(1)
        );
        assert!(GridIndexing::new(4, 4, 2, 3).is_ok());
    }

    #[test]
    fn uniform_grid_metrics() {
        let idx = GridIndexing::new(4, 4, 3, 3).unwrap();
        let (ak, bk) = sigma_coordinate(3, 100.0);
        let grid = GridData::uniform(&idx, 1000.0, 2000.0, 1.0e-4, ak, bk);
        assert_eq!(grid.area[(0, 0)], 2.0e6);
        assert!((grid.rarea[(2, 2)] - 0.5e-6).abs() < 1e-18);
        assert_eq!(grid.ptop, 100.0);
    }

    #[test]
    fn reference_pressure_is_monotone() {
        let idx = GridIndexing::new(4, 4, 10, 3).unwrap();
        let (ak, bk) = sigma_coordinate(10, 100.0);
        let grid = GridData::uniform(&idx, 1.0e3, 1.0e3, 0.0, ak, bk);
        let pfull = grid.reference_pressure_column();
        for k in 1..pfull.len() {
            assert!(pfull[k] > pfull[k - 1]);
        }
    }
}
