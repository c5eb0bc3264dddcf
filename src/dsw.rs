//! D-grid update stage: the full-step advance of the prognostic winds,
//! mass, potential temperature and vertical velocity.
//!
//! The C-grid winds frozen by the preceding half step act as the
//! advective winds: they set the Courant numbers and area fluxes for
//! every transported quantity. Mass (`delp`) is transported per-area;
//! `pt` and `w` ride on the mass fluxes as per-mass quantities, which
//! is what makes the flux damper demand the mass field. The momentum
//! update uses the rotational form (absolute vorticity against the
//! corner kinetic-energy gradient) plus divergence damping driven by
//! the corner divergence diagnostic; the kinetic energy removed by the
//! damping is accumulated into `heat_source` and `diss_est` for the
//! damping stage to redistribute after the sub-step loop.

use crate::error::{ConfigError, TransportError};
use crate::field::Field3;
use crate::grid::{DampingCoefficients, GridData, GridIndexing};
use crate::state::PrognosticState;
use crate::transport::{CopiedCorners, FiniteVolumeTransport};
use crate::types::{Levels, Staggering};

pub struct DGridUpdate {
    transport_delp: FiniteVolumeTransport,
    transport_pt: FiniteVolumeTransport,
    transport_w: Option<FiniteVolumeTransport>,
    d_con: f64,
    damp_div: f64,
    // Flux scratch, one pair per transported quantity.
    fx_dp: Field3,
    fy_dp: Field3,
    fx_pt: Field3,
    fy_pt: Field3,
    fx_w: Field3,
    fy_w: Field3,
    // Momentum scratch.
    ke: Field3,
    vort: Field3,
    du: Field3,
    dv: Field3,
}

impl DGridUpdate {
    /// `damp_div` is the dimensional divergence-damping coefficient
    /// (m², applied per sub-step); `damp_t`/`damp_w` the nondimensional
    /// flux-damper coefficients for `pt` and `w`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        idx: &GridIndexing,
        damping: &DampingCoefficients,
        hord_dp: i32,
        hord_tm: i32,
        hord_vt: i32,
        nord: usize,
        damp_t: f64,
        damp_w: f64,
        d_con: f64,
        damp_div: f64,
        hydrostatic: bool,
    ) -> Result<Self, ConfigError> {
        let transport_delp = FiniteVolumeTransport::new(idx, damping, hord_dp, None, None)?;
        let transport_pt =
            FiniteVolumeTransport::new(idx, damping, hord_tm, Some(nord), Some(damp_t))?;
        let transport_w = if hydrostatic {
            None
        } else {
            Some(FiniteVolumeTransport::new(
                idx,
                damping,
                hord_vt,
                Some(nord),
                Some(damp_w),
            )?)
        };
        let mk_x = || idx.field(Staggering::XEdge, Levels::Layer);
        let mk_y = || idx.field(Staggering::YEdge, Levels::Layer);
        Ok(Self {
            transport_delp,
            transport_pt,
            transport_w,
            d_con,
            damp_div,
            fx_dp: mk_x(),
            fy_dp: mk_y(),
            fx_pt: mk_x(),
            fy_pt: mk_y(),
            fx_w: mk_x(),
            fy_w: mk_y(),
            ke: idx.field(Staggering::Corner, Levels::Layer),
            vort: idx.field(Staggering::Center, Levels::Layer),
            du: idx.field(Staggering::YEdge, Levels::Layer),
            dv: idx.field(Staggering::XEdge, Levels::Layer),
        })
    }

    /// Number of finite-volume transport invocations one advance
    /// performs: mass and heat always, vertical momentum only when the
    /// stage was built nonhydrostatic.
    pub fn transport_operators(&self) -> u64 {
        if self.transport_w.is_some() {
            3
        } else {
            2
        }
    }

    /// One full sub-step. `crx`/`cry`/`xfx`/`yfx` are scheduler-owned
    /// temporaries, filled here and reused afterwards by the height
    /// update. Halos of `uc`/`vc`/`delp`/`pt`/`w`/`divgd` must be
    /// current.
    #[allow(clippy::too_many_arguments)]
    pub fn advance(
        &mut self,
        idx: &GridIndexing,
        grid: &GridData,
        dt: f64,
        state: &mut PrognosticState,
        crx: &mut Field3,
        cry: &mut Field3,
        xfx: &mut Field3,
        yfx: &mut Field3,
    ) -> Result<(), TransportError> {
        let (nx, ny) = (idx.nx as isize, idx.ny as isize);

        // Courant numbers and area fluxes from the frozen C-grid winds,
        // extended into the halo along the transverse direction.
        for k in 0..idx.npz {
            for i in idx.x_range(0, 1) {
                for j in idx.y_full() {
                    crx[(i, j, k)] = dt * state.uc[(i, j, k)] * grid.rdxa[(i, j)];
                    xfx[(i, j, k)] = dt * state.uc[(i, j, k)] * grid.dy_edge[(i, j)];
                }
            }
            for i in idx.x_full() {
                for j in idx.y_range(0, 1) {
                    cry[(i, j, k)] = dt * state.vc[(i, j, k)] * grid.rdya[(i, j)];
                    yfx[(i, j, k)] = dt * state.vc[(i, j, k)] * grid.dx_edge[(i, j)];
                }
            }
        }

        // Fluxes: mass per-area, then pt and w per-mass on the mass
        // fluxes.
        self.transport_delp.flux(
            idx,
            grid,
            CopiedCorners::periodic(&state.delp),
            crx,
            cry,
            xfx,
            yfx,
            &mut self.fx_dp,
            &mut self.fy_dp,
            None,
            None,
            None,
        )?;
        self.transport_pt.flux(
            idx,
            grid,
            CopiedCorners::periodic(&state.pt),
            crx,
            cry,
            xfx,
            yfx,
            &mut self.fx_pt,
            &mut self.fy_pt,
            Some(&self.fx_dp),
            Some(&self.fy_dp),
            Some(&state.delp),
        )?;
        if let Some(tw) = self.transport_w.as_mut() {
            tw.flux(
                idx,
                grid,
                CopiedCorners::periodic(&state.w),
                crx,
                cry,
                xfx,
                yfx,
                &mut self.fx_w,
                &mut self.fy_w,
                Some(&self.fx_dp),
                Some(&self.fy_dp),
                Some(&state.delp),
            )?;
        }

        let nonhydrostatic = self.transport_w.is_some();
        for k in 0..idx.npz {
            // Apply the transported updates cell by cell.
            for i in 0..nx {
                for j in 0..ny {
                    let ra = grid.rarea[(i, j)];
                    let dp_old = state.delp[(i, j, k)];
                    let div_dp = self.fx_dp[(i, j, k)] - self.fx_dp[(i + 1, j, k)]
                        + self.fy_dp[(i, j, k)]
                        - self.fy_dp[(i, j + 1, k)];
                    let dp_new = dp_old + ra * div_dp;
                    let div_pt = self.fx_pt[(i, j, k)] - self.fx_pt[(i + 1, j, k)]
                        + self.fy_pt[(i, j, k)]
                        - self.fy_pt[(i, j + 1, k)];
                    state.pt[(i, j, k)] =
                        (state.pt[(i, j, k)] * dp_old + ra * div_pt) / dp_new;
                    if nonhydrostatic {
                        let div_w = self.fx_w[(i, j, k)] - self.fx_w[(i + 1, j, k)]
                            + self.fy_w[(i, j, k)]
                            - self.fy_w[(i, j + 1, k)];
                        state.w[(i, j, k)] =
                            (state.w[(i, j, k)] * dp_old + ra * div_w) / dp_new;
                    }
                    state.delp[(i, j, k)] = dp_new;
                }
            }

            // Accumulate mass fluxes and Courant numbers for the
            // vertical remapping and tracer transport.
            for i in 0..nx + 1 {
                for j in 0..ny {
                    state.mfxd[(i, j, k)] += self.fx_dp[(i, j, k)];
                    state.cxd[(i, j, k)] += crx[(i, j, k)];
                }
            }
            for i in 0..nx {
                for j in 0..ny + 1 {
                    state.mfyd[(i, j, k)] += self.fy_dp[(i, j, k)];
                    state.cyd[(i, j, k)] += cry[(i, j, k)];
                }
            }

            // Rotational-form momentum update: relative vorticity at
            // centers, kinetic energy at corners.
            for i in idx.x_range(1, 1) {
                for j in idx.y_range(1, 1) {
                    self.vort[(i, j, k)] = (state.v[(i + 1, j, k)] - state.v[(i, j, k)])
                        * grid.rdxa[(i, j)]
                        - (state.u[(i, j + 1, k)] - state.u[(i, j, k)]) * grid.rdya[(i, j)];
                }
            }
            for i in idx.x_range(0, 1) {
                for j in idx.y_range(0, 1) {
                    let uab = 0.25
                        * (state.ua[(i - 1, j - 1, k)]
                            + state.ua[(i, j - 1, k)]
                            + state.ua[(i - 1, j, k)]
                            + state.ua[(i, j, k)]);
                    let vab = 0.25
                        * (state.va[(i - 1, j - 1, k)]
                            + state.va[(i, j - 1, k)]
                            + state.va[(i - 1, j, k)]
                            + state.va[(i, j, k)]);
                    self.ke[(i, j, k)] = 0.5 * (uab * uab + vab * vab);
                }
            }
            for i in 0..nx {
                for j in 0..ny + 1 {
                    let absv = 0.5 * (self.vort[(i, j - 1, k)] + self.vort[(i, j, k)])
                        + 0.5 * (grid.fc[(i, j)] + grid.fc[(i + 1, j)]);
                    let va_u = 0.5 * (state.va[(i, j - 1, k)] + state.va[(i, j, k)]);
                    state.u[(i, j, k)] += dt
                        * (absv * va_u
                            - (self.ke[(i + 1, j, k)] - self.ke[(i, j, k)])
                                * grid.rdxa[(i, j)]);
                }
            }
            for i in 0..nx + 1 {
                for j in 0..ny {
                    let absv = 0.5 * (self.vort[(i - 1, j, k)] + self.vort[(i, j, k)])
                        + 0.5 * (grid.fc[(i, j)] + grid.fc[(i, j + 1)]);
                    let ua_v = 0.5 * (state.ua[(i - 1, j, k)] + state.ua[(i, j, k)]);
                    state.v[(i, j, k)] += dt
                        * (-absv * ua_v
                            - (self.ke[(i, j + 1, k)] - self.ke[(i, j, k)])
                                * grid.rdya[(i, j)]);
                }
            }

            // Divergence damping, with the removed kinetic energy
            // booked into the damping accumulators.
            if self.damp_div > 0.0 {
                for i in 0..nx {
                    for j in 0..ny + 1 {
                        self.du[(i, j, k)] = self.damp_div
                            * (state.divgd[(i + 1, j, k)] - state.divgd[(i, j, k)])
                            * grid.rdxa[(i, j)];
                    }
                }
                for i in 0..nx + 1 {
                    for j in 0..ny {
                        self.dv[(i, j, k)] = self.damp_div
                            * (state.divgd[(i, j + 1, k)] - state.divgd[(i, j, k)])
                            * grid.rdya[(i, j)];
                    }
                }
                for i in 0..nx {
                    for j in 0..ny {
                        let dke_u = 0.5
                            * ((2.0 * state.u[(i, j, k)] + self.du[(i, j, k)])
                                * self.du[(i, j, k)]
                                + (2.0 * state.u[(i, j + 1, k)] + self.du[(i, j + 1, k)])
                                    * self.du[(i, j + 1, k)]);
                        let dke_v = 0.5
                            * ((2.0 * state.v[(i, j, k)] + self.dv[(i, j, k)])
                                * self.dv[(i, j, k)]
                                + (2.0 * state.v[(i + 1, j, k)] + self.dv[(i + 1, j, k)])
                                    * self.dv[(i + 1, j, k)]);
                        let dke = 0.5 * (dke_u + dke_v);
                        state.diss_est[(i, j, k)] -= dke;
                        if self.d_con > 1.0e-5 {
                            state.heat_source[(i, j, k)] -=
                                self.d_con * state.delp[(i, j, k)] * dke;
                        }
                    }
                }
                for i in 0..nx {
                    for j in 0..ny + 1 {
                        state.u[(i, j, k)] += self.du[(i, j, k)];
                    }
                }
                for i in 0..nx + 1 {
                    for j in 0..ny {
                        state.v[(i, j, k)] += self.dv[(i, j, k)];
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::sigma_coordinate;

    fn setup() -> (GridIndexing, GridData, DampingCoefficients, PrognosticState) {
        let idx = GridIndexing::new(6, 6, 2, 3).unwrap();
        let (ak, bk) = sigma_coordinate(2, 100.0);
        let grid = GridData::uniform(&idx, 1.0e3, 1.0e3, 0.0, ak, bk);
        let damping = DampingCoefficients::uniform(1.0e3, 1.0e3);
        let mut state = PrognosticState::zeros(&idx);
        state.delp.fill(1000.0);
        state.pt.fill(300.0);
        (idx, grid, damping, state)
    }

    fn temporaries(idx: &GridIndexing) -> (Field3, Field3, Field3, Field3) {
        (
            idx.field(Staggering::XEdge, Levels::Layer),
            idx.field(Staggering::YEdge, Levels::Layer),
            idx.field(Staggering::XEdge, Levels::Layer),
            idx.field(Staggering::YEdge, Levels::Layer),
        )
    }

    #[test]
    fn transport_operator_count_tracks_vertical_momentum() {
        let (idx, _, damping, _) = setup();
        let nonhydro =
            DGridUpdate::new(&idx, &damping, 8, 8, 8, 1, 0.0, 0.0, 0.0, 0.0, false).unwrap();
        assert_eq!(nonhydro.transport_operators(), 3);
        let hydro =
            DGridUpdate::new(&idx, &damping, 8, 8, 8, 1, 0.0, 0.0, 0.0, 0.0, true).unwrap();
        assert_eq!(hydro.transport_operators(), 2);
    }

    #[test]
    fn zero_winds_give_zero_fluxes_and_unchanged_mass() {
        let (idx, grid, damping, mut state) = setup();
        let mut stage =
            DGridUpdate::new(&idx, &damping, 8, 8, 8, 1, 0.0, 0.0, 0.0, 0.0, false).unwrap();
        let (mut crx, mut cry, mut xfx, mut yfx) = temporaries(&idx);
        stage
            .advance(&idx, &grid, 20.0, &mut state, &mut crx, &mut cry, &mut xfx, &mut yfx)
            .unwrap();
        assert_eq!(state.mfxd.max_abs(), 0.0);
        assert_eq!(state.mfyd.max_abs(), 0.0);
        assert_eq!(state.cxd.max_abs(), 0.0);
        for i in 0..6 {
            for j in 0..6 {
                assert_eq!(state.delp[(i, j, 0)], 1000.0);
                assert_eq!(state.pt[(i, j, 1)], 300.0);
            }
        }
    }

    #[test]
    fn mass_is_conserved_under_transport() {
        let (idx, grid, damping, mut state) = setup();
        // Periodic solid-body flow with a mass perturbation.
        state.delp.assign(|i, j, _| {
            1000.0 + 50.0 * ((i as f64) * 1.1).sin() * ((j as f64) * 0.7).cos()
        });
        state.uc.fill(5.0);
        state.vc.fill(-3.0);
        // Periodic wrap of delp so halos are consistent.
        let src = state.delp.clone();
        state.delp.assign(|i, j, k| {
            let iw = i.rem_euclid(6);
            let jw = j.rem_euclid(6);
            src[(iw, jw, k)]
        });
        let before: f64 = state.delp.interior_sum(0);
        let mut stage =
            DGridUpdate::new(&idx, &damping, 8, 8, 8, 1, 0.0, 0.0, 0.0, 0.0, false).unwrap();
        let (mut crx, mut cry, mut xfx, mut yfx) = temporaries(&idx);
        stage
            .advance(&idx, &grid, 10.0, &mut state, &mut crx, &mut cry, &mut xfx, &mut yfx)
            .unwrap();
        let after: f64 = state.delp.interior_sum(0);
        // Interior sum changes only through boundary fluxes, which the
        // periodic wrap makes antisymmetric: fluxes in equal fluxes out.
        assert!(
            (after - before).abs() < 1e-9 * before.abs(),
            "before {} after {}",
            before,
            after
        );
    }

    #[test]
    fn divergence_damping_books_heat() {
        let (idx, grid, damping, mut state) = setup();
        state.u.assign(|i, j, _| ((i + 2 * j) % 5) as f64 - 2.0);
        state.v.assign(|i, j, _| ((2 * i + j) % 7) as f64 - 3.0);
        state.divgd.assign(|i, j, _| ((i * j) % 3) as f64 * 1.0e-5);
        let mut stage =
            DGridUpdate::new(&idx, &damping, 8, 8, 8, 1, 0.0, 0.0, 1.0, 1.0e5, false).unwrap();
        let (mut crx, mut cry, mut xfx, mut yfx) = temporaries(&idx);
        stage
            .advance(&idx, &grid, 10.0, &mut state, &mut crx, &mut cry, &mut xfx, &mut yfx)
            .unwrap();
        assert!(state.heat_source.max_abs() > 0.0);
        assert!(state.diss_est.max_abs() > 0.0);
    }
}
