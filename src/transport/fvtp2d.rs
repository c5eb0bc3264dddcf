//! Two-dimensional finite-volume transport operator.
//!
//! Computes directionally-split advective fluxes of a cell-mean scalar:
//! each direction is swept once on the raw field (inner sweep) and once
//! on the field already advected in the other direction (outer sweep),
//! and the two path orderings are averaged before scaling by the unit
//! flux. The unit flux is the area flux unless a mass flux is supplied,
//! in which case the output fluxes are mass fluxes of the scalar.
//!
//! Two variants exist: the general edge variant built from four 1D
//! operator applications, and a fused interior variant valid only away
//! from tile edges and only at reconstruction order 8. Both produce
//! identical fluxes where both apply.

use crate::error::{ConfigError, TransportError};
use crate::field::Field3;
use crate::grid::{DampingCoefficients, GridData, GridIndexing};
use crate::transport::delnflux::DelnFlux;
use crate::transport::ppm::{self, PpmOrder};
use crate::types::{Levels, Staggering};

/// A scalar together with the corner-filled views used for x and y
/// differencing. On a doubly-periodic tile the corners are already
/// valid after a halo exchange, so all three views alias the same
/// field; a cubed-sphere build substitutes rotated corner copies.
#[derive(Clone, Copy)]
pub struct CopiedCorners<'a> {
    pub base: &'a Field3,
    pub x_differentiable: &'a Field3,
    pub y_differentiable: &'a Field3,
}

impl<'a> CopiedCorners<'a> {
    /// All three views alias `q` (periodic corners are already filled).
    pub fn periodic(q: &'a Field3) -> Self {
        Self {
            base: q,
            x_differentiable: q,
            y_differentiable: q,
        }
    }
}

#[derive(Debug)]
enum Variant {
    /// Four 1D operator applications; the outer sweeps materialize
    /// their interface means before the path average.
    Edge { q_outer_x: Field3, q_outer_y: Field3 },
    /// Outer sweep, path average and unit-flux scaling fused into one
    /// loop per direction, with no outer scratch.
    Interior,
}

/// The transport operator. Owns its scratch fields; one instance per
/// transported quantity, reused every sub-step.
#[derive(Debug)]
pub struct FiniteVolumeTransport {
    order: PpmOrder,
    variant: Variant,
    delnflux: Option<DelnFlux>,
    q_adv_x: Field3,
    q_adv_y: Field3,
    q_i: Field3,
    q_j: Field3,
}

impl FiniteVolumeTransport {
    /// Build the operator. `nord`/`damp_c` enable the hyperdiffusive
    /// flux damper when both are given and `damp_c` exceeds the
    /// activation threshold.
    pub fn new(
        idx: &GridIndexing,
        damping: &DampingCoefficients,
        hord: i32,
        nord: Option<usize>,
        damp_c: Option<f64>,
    ) -> Result<Self, ConfigError> {
        Self::new_on(idx, damping, hord, nord, damp_c, Levels::Layer)
    }

    /// As [`new`](Self::new), on the given vertical placement (height
    /// transport operates on interface levels).
    pub fn new_on(
        idx: &GridIndexing,
        damping: &DampingCoefficients,
        hord: i32,
        nord: Option<usize>,
        damp_c: Option<f64>,
        levels: Levels,
    ) -> Result<Self, ConfigError> {
        let order = PpmOrder::new(hord)?;
        let variant = if idx.tile_interior {
            if order.get() != 8 {
                return Err(ConfigError::InteriorHordUnsupported(order.get()));
            }
            Variant::Interior
        } else {
            Variant::Edge {
                q_outer_x: idx.field(Staggering::XEdge, levels),
                q_outer_y: idx.field(Staggering::YEdge, levels),
            }
        };
        let delnflux = match (nord, damp_c) {
            (Some(nord), Some(damp_c)) if damp_c > 1.0e-4 => {
                Some(DelnFlux::new_on(idx, damping, nord, damp_c, levels)?)
            }
            _ => None,
        };
        Ok(Self {
            order,
            variant,
            delnflux,
            q_adv_x: idx.field(Staggering::XEdge, levels),
            q_adv_y: idx.field(Staggering::YEdge, levels),
            q_i: idx.field(Staggering::Center, levels),
            q_j: idx.field(Staggering::Center, levels),
        })
    }

    /// Whether the flux damper is active.
    pub fn damped(&self) -> bool {
        self.delnflux.is_some()
    }

    /// Compute fluxes of `q` through every compute-domain interface.
    ///
    /// `crx`/`cry` are Courant numbers on x/y interfaces, extended into
    /// the halo along the transverse direction; `x_area_flux` and
    /// `y_area_flux` the swept areas on the same staggering. When mass
    /// fluxes are supplied they replace the area fluxes as the unit
    /// flux. Damping a per-mass quantity requires `mass` whenever a
    /// mass flux is given.
    #[allow(clippy::too_many_arguments)]
    pub fn flux(
        &mut self,
        idx: &GridIndexing,
        grid: &GridData,
        q: CopiedCorners<'_>,
        crx: &Field3,
        cry: &Field3,
        x_area_flux: &Field3,
        y_area_flux: &Field3,
        fx: &mut Field3,
        fy: &mut Field3,
        x_mass_flux: Option<&Field3>,
        y_mass_flux: Option<&Field3>,
        mass: Option<&Field3>,
    ) -> Result<(), TransportError> {
        if self.delnflux.is_some()
            && mass.is_none()
            && (x_mass_flux.is_some() || y_mass_flux.is_some())
        {
            return Err(TransportError::MassFluxWithoutMass);
        }
        let x_unit_flux = x_mass_flux.unwrap_or(x_area_flux);
        let y_unit_flux = y_mass_flux.unwrap_or(y_area_flux);

        // The interior variant is order 8 on both sweeps by
        // construction, so the inner substitution is a no-op there.
        let inner = self.order.inner();
        let outer = self.order;

        let (nx, ny) = (idx.nx as isize, idx.ny as isize);
        for k in 0..self.q_i.nz() {
            // Inner sweeps on the raw (corner-filled) field.
            ppm::y_advected_mean(
                inner,
                q.y_differentiable,
                cry,
                &mut self.q_adv_y,
                idx.x_full(),
                idx.y_range(0, 1),
                k,
            );
            ppm::x_advected_mean(
                inner,
                q.x_differentiable,
                crx,
                &mut self.q_adv_x,
                idx.x_range(0, 1),
                idx.y_full(),
                k,
            );

            // Intermediate cell means after the transverse update.
            for i in idx.x_full() {
                for j in 0..ny {
                    let fyy_lo = y_area_flux[(i, j, k)] * self.q_adv_y[(i, j, k)];
                    let fyy_hi = y_area_flux[(i, j + 1, k)] * self.q_adv_y[(i, j + 1, k)];
                    self.q_i[(i, j, k)] = (q.y_differentiable[(i, j, k)] * grid.area[(i, j)]
                        + fyy_lo
                        - fyy_hi)
                        / (grid.area[(i, j)] + y_area_flux[(i, j, k)]
                            - y_area_flux[(i, j + 1, k)]);
                }
            }
            for i in 0..nx {
                for j in idx.y_full() {
                    let fxx_lo = x_area_flux[(i, j, k)] * self.q_adv_x[(i, j, k)];
                    let fxx_hi = x_area_flux[(i + 1, j, k)] * self.q_adv_x[(i + 1, j, k)];
                    self.q_j[(i, j, k)] = (q.x_differentiable[(i, j, k)] * grid.area[(i, j)]
                        + fxx_lo
                        - fxx_hi)
                        / (grid.area[(i, j)] + x_area_flux[(i, j, k)]
                            - x_area_flux[(i + 1, j, k)]);
                }
            }

            match &mut self.variant {
                Variant::Edge { q_outer_x, q_outer_y } => {
                    // Outer sweeps on the transverse-updated means.
                    ppm::x_advected_mean(
                        outer,
                        &self.q_i,
                        crx,
                        q_outer_x,
                        idx.x_range(0, 1),
                        idx.y_range(0, 0),
                        k,
                    );
                    ppm::y_advected_mean(
                        outer,
                        &self.q_j,
                        cry,
                        q_outer_y,
                        idx.x_range(0, 0),
                        idx.y_range(0, 1),
                        k,
                    );

                    // Average the two path orderings and scale by the
                    // unit flux.
                    for i in 0..nx + 1 {
                        for j in 0..ny {
                            fx[(i, j, k)] = 0.5
                                * (q_outer_x[(i, j, k)] + self.q_adv_x[(i, j, k)])
                                * x_unit_flux[(i, j, k)];
                        }
                    }
                    for i in 0..nx {
                        for j in 0..ny + 1 {
                            fy[(i, j, k)] = 0.5
                                * (q_outer_y[(i, j, k)] + self.q_adv_y[(i, j, k)])
                                * y_unit_flux[(i, j, k)];
                        }
                    }
                }
                Variant::Interior => {
                    // Fused lowering: the outer interface mean feeds the
                    // path average directly. Same arithmetic as the edge
                    // tail, so the variants stay bit-identical.
                    for i in 0..nx + 1 {
                        for j in 0..ny {
                            let stencil = [
                                self.q_i[(i - 3, j, k)],
                                self.q_i[(i - 2, j, k)],
                                self.q_i[(i - 1, j, k)],
                                self.q_i[(i, j, k)],
                                self.q_i[(i + 1, j, k)],
                                self.q_i[(i + 2, j, k)],
                            ];
                            let q_outer = ppm::advected_mean(outer, &stencil, crx[(i, j, k)]);
                            fx[(i, j, k)] = 0.5 * (q_outer + self.q_adv_x[(i, j, k)])
                                * x_unit_flux[(i, j, k)];
                        }
                    }
                    for i in 0..nx {
                        for j in 0..ny + 1 {
                            let stencil = [
                                self.q_j[(i, j - 3, k)],
                                self.q_j[(i, j - 2, k)],
                                self.q_j[(i, j - 1, k)],
                                self.q_j[(i, j, k)],
                                self.q_j[(i, j + 1, k)],
                                self.q_j[(i, j + 2, k)],
                            ];
                            let q_outer = ppm::advected_mean(outer, &stencil, cry[(i, j, k)]);
                            fy[(i, j, k)] = 0.5 * (q_outer + self.q_adv_y[(i, j, k)])
                                * y_unit_flux[(i, j, k)];
                        }
                    }
                }
            }
        }

        if let Some(damper) = self.delnflux.as_mut() {
            damper.accumulate(grid, idx, q.base, fx, fy, mass);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::sigma_coordinate;

    fn setup(nx: usize, ny: usize, interior: bool) -> (GridIndexing, GridData, DampingCoefficients) {
        let idx = GridIndexing::new(nx, ny, 2, 3)
            .unwrap()
            .with_tile_interior(interior);
        let (ak, bk) = sigma_coordinate(2, 100.0);
        let grid = GridData::uniform(&idx, 1.0e3, 1.0e3, 0.0, ak, bk);
        let damping = DampingCoefficients::uniform(1.0e3, 1.0e3);
        (idx, grid, damping)
    }

    fn courant_and_area_flux(
        idx: &GridIndexing,
        grid: &GridData,
        u0: f64,
        v0: f64,
        dt: f64,
    ) -> (Field3, Field3, Field3, Field3) {
        let mut crx = idx.field(Staggering::XEdge, Levels::Layer);
        let mut cry = idx.field(Staggering::YEdge, Levels::Layer);
        let mut xfx = idx.field(Staggering::XEdge, Levels::Layer);
        let mut yfx = idx.field(Staggering::YEdge, Levels::Layer);
        // The Courant/area-flux fields are edge-staggered (one extra
        // point) while the uniform metrics are center-staggered; clamp
        // into the metric extent, which is exact on a uniform grid.
        let h = idx.n_halo as isize;
        let (mx, my) = grid.rdxa.extents();
        let ci = move |i: isize| i.clamp(-h, mx as isize + h - 1);
        let cj = move |j: isize| j.clamp(-h, my as isize + h - 1);
        crx.assign(|i, j, _| dt * u0 * grid.rdxa[(ci(i), cj(j))]);
        cry.assign(|i, j, _| dt * v0 * grid.rdya[(ci(i), cj(j))]);
        xfx.assign(|i, j, _| dt * u0 * grid.dy_edge[(ci(i), cj(j))]);
        yfx.assign(|i, j, _| dt * v0 * grid.dx_edge[(ci(i), cj(j))]);
        (crx, cry, xfx, yfx)
    }

    #[test]
    fn interior_variant_rejects_non_monotone_order() {
        let (idx, _, damping) = setup(6, 6, true);
        let err = FiniteVolumeTransport::new(&idx, &damping, 5, None, None).unwrap_err();
        assert_eq!(err, ConfigError::InteriorHordUnsupported(5));
    }

    #[test]
    fn mass_flux_without_mass_is_an_error() {
        let (idx, grid, damping) = setup(6, 6, false);
        let mut op = FiniteVolumeTransport::new(&idx, &damping, 8, Some(1), Some(0.2)).unwrap();
        let q = idx.field(Staggering::Center, Levels::Layer);
        let (crx, cry, xfx, yfx) = courant_and_area_flux(&idx, &grid, 1.0, 0.0, 10.0);
        let mfx = idx.field(Staggering::XEdge, Levels::Layer);
        let mut fx = idx.field(Staggering::XEdge, Levels::Layer);
        let mut fy = idx.field(Staggering::YEdge, Levels::Layer);
        let err = op
            .flux(
                &idx,
                &grid,
                CopiedCorners::periodic(&q),
                &crx,
                &cry,
                &xfx,
                &yfx,
                &mut fx,
                &mut fy,
                Some(&mfx),
                None,
                None,
            )
            .unwrap_err();
        assert_eq!(err, TransportError::MassFluxWithoutMass);
    }

    #[test]
    fn constant_field_fluxes_equal_unit_flux_times_value() {
        let (idx, grid, damping) = setup(6, 6, false);
        let mut op = FiniteVolumeTransport::new(&idx, &damping, 8, None, None).unwrap();
        let mut q = idx.field(Staggering::Center, Levels::Layer);
        q.fill(2.0);
        let (crx, cry, xfx, yfx) = courant_and_area_flux(&idx, &grid, 3.0, -1.5, 20.0);
        let mut fx = idx.field(Staggering::XEdge, Levels::Layer);
        let mut fy = idx.field(Staggering::YEdge, Levels::Layer);
        op.flux(
            &idx,
            &grid,
            CopiedCorners::periodic(&q),
            &crx,
            &cry,
            &xfx,
            &yfx,
            &mut fx,
            &mut fy,
            None,
            None,
            None,
        )
        .unwrap();
        for i in 0..7 {
            for j in 0..6 {
                let expect = 2.0 * xfx[(i, j, 0)];
                assert!((fx[(i, j, 0)] - expect).abs() < 1e-12 * expect.abs().max(1.0));
            }
        }
        for i in 0..6 {
            for j in 0..7 {
                let expect = 2.0 * yfx[(i, j, 0)];
                assert!((fy[(i, j, 0)] - expect).abs() < 1e-12 * expect.abs().max(1.0));
            }
        }
    }

    #[test]
    fn edge_and_interior_variants_agree_at_order_8() {
        let (idx_e, grid, damping) = setup(8, 8, false);
        let idx_i = idx_e.with_tile_interior(true);
        let mut edge = FiniteVolumeTransport::new(&idx_e, &damping, 8, None, None).unwrap();
        let mut interior = FiniteVolumeTransport::new(&idx_i, &damping, 8, None, None).unwrap();
        let mut q = idx_e.field(Staggering::Center, Levels::Layer);
        let (nx, ny) = (8.0, 8.0);
        q.assign(|i, j, _| {
            let x = std::f64::consts::TAU * i as f64 / nx;
            let y = std::f64::consts::TAU * j as f64 / ny;
            1.0 + 0.3 * x.sin() * y.cos()
        });
        let (crx, cry, xfx, yfx) = courant_and_area_flux(&idx_e, &grid, 4.0, 2.0, 25.0);
        let mut fx_e = idx_e.field(Staggering::XEdge, Levels::Layer);
        let mut fy_e = idx_e.field(Staggering::YEdge, Levels::Layer);
        let mut fx_i = fx_e.clone();
        let mut fy_i = fy_e.clone();
        edge.flux(
            &idx_e,
            &grid,
            CopiedCorners::periodic(&q),
            &crx,
            &cry,
            &xfx,
            &yfx,
            &mut fx_e,
            &mut fy_e,
            None,
            None,
            None,
        )
        .unwrap();
        interior
            .flux(
                &idx_i,
                &grid,
                CopiedCorners::periodic(&q),
                &crx,
                &cry,
                &xfx,
                &yfx,
                &mut fx_i,
                &mut fy_i,
                None,
                None,
                None,
            )
            .unwrap();
        assert!(fx_e.max_abs() > 0.0);
        assert_eq!(fx_e, fx_i);
        assert_eq!(fy_e, fy_i);
    }

    #[test]
    fn order_10_fluxes_match_explicit_inner_8() {
        // Configured order 10 runs the inner sweep at order 8; on this
        // grid the outer order-10 constraint coincides with order 8, so
        // the fluxes must be identical to a plain order-8 operator.
        let (idx, grid, damping) = setup(8, 8, false);
        let mut op10 = FiniteVolumeTransport::new(&idx, &damping, 10, None, None).unwrap();
        let mut op8 = FiniteVolumeTransport::new(&idx, &damping, 8, None, None).unwrap();
        let mut q = idx.field(Staggering::Center, Levels::Layer);
        q.assign(|i, j, k| ((i * 3 + j * 5 + k as isize) % 7) as f64);
        let (crx, cry, xfx, yfx) = courant_and_area_flux(&idx, &grid, -2.0, 3.0, 15.0);
        let mut fx10 = idx.field(Staggering::XEdge, Levels::Layer);
        let mut fy10 = idx.field(Staggering::YEdge, Levels::Layer);
        let mut fx8 = fx10.clone();
        let mut fy8 = fy10.clone();
        op10.flux(
            &idx,
            &grid,
            CopiedCorners::periodic(&q),
            &crx,
            &cry,
            &xfx,
            &yfx,
            &mut fx10,
            &mut fy10,
            None,
            None,
            None,
        )
        .unwrap();
        op8.flux(
            &idx,
            &grid,
            CopiedCorners::periodic(&q),
            &crx,
            &cry,
            &xfx,
            &yfx,
            &mut fx8,
            &mut fy8,
            None,
            None,
            None,
        )
        .unwrap();
        assert_eq!(fx10, fx8);
        assert_eq!(fy10, fy8);
    }
}
