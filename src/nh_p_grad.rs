//! D-grid pressure gradient force, split into a hydrostatic part and a
//! nonhydrostatic perturbation.
//!
//! The full-step Riemann solve leaves `pkc` holding the full elastic
//! interface pressure and `pk3` the hydrostatic pressure to the kappa,
//! both halo-consistent (`pkc` exchanged, `pk3` recomputed in the halo
//! from `delp`). The force on the D-grid winds is evaluated with the
//! same vertical contour integral as the C-grid completion, but the
//! D-grid winds live on cell edges whose endpoints are corners, so
//! every input column is first interpolated from cell centers to
//! corners. The hydrostatic part differences `pk3` against the
//! geopotential with the kappa-space layer thickness as the weight;
//! the perturbation part differences `pp = pkc - pk3^(1/kappa)` with
//! the mass thickness as the weight.

use crate::constants::KAPPA;
use crate::field::Field3;
use crate::grid::{GridData, GridIndexing};
use crate::types::{Levels, Staggering};

pub struct NonHydrostaticPressureGradient {
    /// Geopotential at corners (m²/s²), interface levels.
    gz_b: Field3,
    /// Hydrostatic pressure to the kappa at corners.
    pk_b: Field3,
    /// Perturbation pressure at corners (Pa).
    pp_b: Field3,
    /// Pressure thickness at corners (Pa), layer levels.
    dp_b: Field3,
}

impl NonHydrostaticPressureGradient {
    pub fn new(idx: &GridIndexing) -> Self {
        Self {
            gz_b: idx.field(Staggering::Corner, Levels::Interface),
            pk_b: idx.field(Staggering::Corner, Levels::Interface),
            pp_b: idx.field(Staggering::Corner, Levels::Interface),
            dp_b: idx.field(Staggering::Corner, Levels::Layer),
        }
    }

    /// Apply the full-step pressure gradient force to `u` and `v`.
    ///
    /// `gz` is the geopotential (m²/s²) rebuilt from the exchanged
    /// heights; `pkc` and `pk3` must be halo-consistent to depth 2
    /// (the corner interpolation reaches one cell out from the widest
    /// wind point).
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &mut self,
        idx: &GridIndexing,
        grid: &GridData,
        dt: f64,
        u: &mut Field3,
        v: &mut Field3,
        pkc: &Field3,
        gz: &Field3,
        pk3: &Field3,
        delp: &Field3,
    ) {
        let (nx, ny) = (idx.nx as isize, idx.ny as isize);
        let corner4 =
            |q: &dyn Fn(isize, isize) -> f64, i: isize, j: isize| -> f64 {
                0.25 * (q(i - 1, j - 1) + q(i, j - 1) + q(i - 1, j) + q(i, j))
            };

        for k in 0..=idx.npz {
            for i in idx.x_range(0, 1) {
                for j in idx.y_range(0, 1) {
                    self.gz_b[(i, j, k)] = corner4(&|ci, cj| gz[(ci, cj, k)], i, j);
                    self.pk_b[(i, j, k)] = corner4(&|ci, cj| pk3[(ci, cj, k)], i, j);
                    // Perturbation: full minus hydrostatic, both of
                    // which are halo-consistent individually.
                    self.pp_b[(i, j, k)] = corner4(
                        &|ci, cj| pkc[(ci, cj, k)] - pk3[(ci, cj, k)].powf(1.0 / KAPPA),
                        i,
                        j,
                    );
                }
            }
        }
        for k in 0..idx.npz {
            for i in idx.x_range(0, 1) {
                for j in idx.y_range(0, 1) {
                    self.dp_b[(i, j, k)] = corner4(&|ci, cj| delp[(ci, cj, k)], i, j);
                }
            }
        }

        for k in 0..idx.npz {
            for i in 0..nx {
                for j in 0..ny + 1 {
                    let wk_l = self.pk_b[(i, j, k + 1)] - self.pk_b[(i, j, k)];
                    let wk_r = self.pk_b[(i + 1, j, k + 1)] - self.pk_b[(i + 1, j, k)];
                    let du_h = dt / (wk_l + wk_r)
                        * ((self.gz_b[(i, j, k + 1)] - self.gz_b[(i + 1, j, k)])
                            * (self.pk_b[(i + 1, j, k + 1)] - self.pk_b[(i, j, k)])
                            + (self.gz_b[(i, j, k)] - self.gz_b[(i + 1, j, k + 1)])
                                * (self.pk_b[(i, j, k + 1)] - self.pk_b[(i + 1, j, k)]));
                    let du_p = dt / (self.dp_b[(i, j, k)] + self.dp_b[(i + 1, j, k)])
                        * ((self.gz_b[(i, j, k + 1)] - self.gz_b[(i + 1, j, k)])
                            * (self.pp_b[(i + 1, j, k + 1)] - self.pp_b[(i, j, k)])
                            + (self.gz_b[(i, j, k)] - self.gz_b[(i + 1, j, k + 1)])
                                * (self.pp_b[(i, j, k + 1)] - self.pp_b[(i + 1, j, k)]));
                    u[(i, j, k)] += (du_h + du_p) * grid.rdxa[(i, j)];
                }
            }
            for i in 0..nx + 1 {
                for j in 0..ny {
                    let wk_l = self.pk_b[(i, j, k + 1)] - self.pk_b[(i, j, k)];
                    let wk_u = self.pk_b[(i, j + 1, k + 1)] - self.pk_b[(i, j + 1, k)];
                    let dv_h = dt / (wk_l + wk_u)
                        * ((self.gz_b[(i, j, k + 1)] - self.gz_b[(i, j + 1, k)])
                            * (self.pk_b[(i, j + 1, k + 1)] - self.pk_b[(i, j, k)])
                            + (self.gz_b[(i, j, k)] - self.gz_b[(i, j + 1, k + 1)])
                                * (self.pk_b[(i, j, k + 1)] - self.pk_b[(i, j + 1, k)]));
                    let dv_p = dt / (self.dp_b[(i, j, k)] + self.dp_b[(i, j + 1, k)])
                        * ((self.gz_b[(i, j, k + 1)] - self.gz_b[(i, j + 1, k)])
                            * (self.pp_b[(i, j + 1, k + 1)] - self.pp_b[(i, j, k)])
                            + (self.gz_b[(i, j, k)] - self.gz_b[(i, j + 1, k + 1)])
                                * (self.pp_b[(i, j, k + 1)] - self.pp_b[(i, j + 1, k)]));
                    v[(i, j, k)] += (dv_h + dv_p) * grid.rdya[(i, j)];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::GRAV;
    use crate::grid::sigma_coordinate;

    fn setup(npz: usize) -> (GridIndexing, GridData) {
        let idx = GridIndexing::new(6, 6, npz, 3).unwrap();
        let (ak, bk) = sigma_coordinate(npz, 100.0);
        let grid = GridData::uniform(&idx, 1.0e3, 1.0e3, 0.0, ak, bk);
        (idx, grid)
    }

    fn uniform_columns(
        idx: &GridIndexing,
        dp: f64,
        ptop: f64,
    ) -> (Field3, Field3, Field3, Field3) {
        let mut pkc = idx.field(Staggering::Center, Levels::Interface);
        let mut pk3 = idx.field(Staggering::Center, Levels::Interface);
        let mut gz = idx.field(Staggering::Center, Levels::Interface);
        let mut delp = idx.field(Staggering::Center, Levels::Layer);
        delp.fill(dp);
        pkc.assign(|_, _, k| ptop + dp * k as f64);
        pk3.assign(|_, _, k| (ptop + dp * k as f64).powf(KAPPA));
        gz.assign(|_, _, k| GRAV * 500.0 * (idx.npz - k) as f64);
        (pkc, pk3, gz, delp)
    }

    #[test]
    fn flat_state_exerts_no_force() {
        let (idx, grid) = setup(4);
        let (pkc, pk3, gz, delp) = uniform_columns(&idx, 1.0e4, 100.0);
        let mut u = idx.field(Staggering::YEdge, Levels::Layer);
        let mut v = idx.field(Staggering::XEdge, Levels::Layer);
        let mut op = NonHydrostaticPressureGradient::new(&idx);
        op.apply(&idx, &grid, 10.0, &mut u, &mut v, &pkc, &gz, &pk3, &delp);
        assert!(u.max_abs() < 1e-10);
        assert!(v.max_abs() < 1e-10);
    }

    #[test]
    fn pressure_rising_eastward_pushes_westward() {
        let (idx, grid) = setup(4);
        let (mut pkc, mut pk3, gz, delp) = uniform_columns(&idx, 1.0e4, 100.0);
        // Tilt the pressure field: higher pressure at larger x, same
        // heights. Perturbation stays zero; the hydrostatic part must
        // accelerate the flow toward low pressure.
        pkc.assign(|i, _, k| 100.0 + 1.0e4 * k as f64 + 10.0 * i as f64);
        pk3.assign(|i, _, k| (100.0 + 1.0e4 * k as f64 + 10.0 * i as f64).powf(KAPPA));
        let mut u = idx.field(Staggering::YEdge, Levels::Layer);
        let mut v = idx.field(Staggering::XEdge, Levels::Layer);
        let mut op = NonHydrostaticPressureGradient::new(&idx);
        op.apply(&idx, &grid, 10.0, &mut u, &mut v, &pkc, &gz, &pk3, &delp);
        for k in 0..4 {
            assert!(u[(2, 2, k)] < 0.0, "u[k={}] = {}", k, u[(2, 2, k)]);
        }
        // No y gradient, no y force.
        assert!(v.max_abs() < 1e-10);
    }

    #[test]
    fn perturbation_pressure_alone_exerts_force() {
        let (idx, grid) = setup(4);
        let (mut pkc, pk3, gz, delp) = uniform_columns(&idx, 1.0e4, 100.0);
        // Hydrostatic part flat; bump the full pressure in y only below
        // the top interface (the model top carries no perturbation).
        pkc.assign(|_, j, k| {
            let hydro = 100.0 + 1.0e4 * k as f64;
            if k == 0 {
                hydro
            } else {
                hydro + 5.0 * j as f64
            }
        });
        let mut u = idx.field(Staggering::YEdge, Levels::Layer);
        let mut v = idx.field(Staggering::XEdge, Levels::Layer);
        let mut op = NonHydrostaticPressureGradient::new(&idx);
        op.apply(&idx, &grid, 10.0, &mut u, &mut v, &pkc, &gz, &pk3, &delp);
        assert!(u.max_abs() < 1e-10);
        assert!(v[(2, 2, 2)] < 0.0);
    }
}
