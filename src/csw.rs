//! C-grid update stage: the half-step advance of the staggered C-grid
//! winds and the provisional thermodynamic state.
//!
//! Each sub-step re-derives `uc`/`vc` from the D-grid winds, freezes a
//! copy as the advective winds `ut`/`vt`, transports `delp`/`pt` by the
//! half step with first-order upwinding into the provisional `delpc`/
//! `ptc`, computes the corner divergence diagnostic, and advances the
//! C-grid winds with the rotational-form momentum terms (Coriolis plus
//! relative vorticity against the kinetic-energy gradient). The
//! pressure-gradient completion runs separately, after the half-step
//! Riemann solve has produced consistent `pkc` and `gz`.

use crate::field::Field3;
use crate::grid::{GridData, GridIndexing};
use crate::state::PrognosticState;
use crate::types::{Levels, Staggering};

pub struct CGridUpdate {
    ke: Field3,
    vort: Field3,
    fx: Field3,
    fy: Field3,
}

impl CGridUpdate {
    pub fn new(idx: &GridIndexing) -> Self {
        Self {
            ke: idx.field(Staggering::Center, Levels::Layer),
            vort: idx.field(Staggering::Corner, Levels::Layer),
            fx: idx.field(Staggering::XEdge, Levels::Layer),
            fy: idx.field(Staggering::YEdge, Levels::Layer),
        }
    }

    /// One half-step advance. Writes `ut`/`vt` (frozen advective
    /// winds), `delpc`/`ptc` (provisional thermodynamic state, one halo
    /// ring wide), `divgd`, and advances `uc`/`vc` by the momentum
    /// terms. `u`/`v`/`delp`/`pt` halos must be current.
    #[allow(clippy::too_many_arguments)]
    pub fn advance(
        &mut self,
        idx: &GridIndexing,
        grid: &GridData,
        dt2: f64,
        state: &mut PrognosticState,
        ut: &mut Field3,
        vt: &mut Field3,
        delpc: &mut Field3,
        ptc: &mut Field3,
    ) {
        let h = idx.n_halo as isize;
        for k in 0..idx.npz {
            // Cell-center winds from the D-grid edges.
            for i in idx.x_full() {
                for j in idx.y_range(h, h - 1) {
                    state.ua[(i, j, k)] = 0.5 * (state.u[(i, j, k)] + state.u[(i, j + 1, k)]);
                }
            }
            for i in idx.x_range(h, h - 1) {
                for j in idx.y_full() {
                    state.va[(i, j, k)] = 0.5 * (state.v[(i, j, k)] + state.v[(i + 1, j, k)]);
                }
            }
            // Center-to-interface interpolation for the C-grid winds.
            for i in idx.x_range(2, 3) {
                for j in idx.y_range(2, 2) {
                    state.uc[(i, j, k)] =
                        0.5 * (state.ua[(i - 1, j, k)] + state.ua[(i, j, k)]);
                }
            }
            for i in idx.x_range(2, 2) {
                for j in idx.y_range(2, 3) {
                    state.vc[(i, j, k)] =
                        0.5 * (state.va[(i, j - 1, k)] + state.va[(i, j, k)]);
                }
            }
        }

        // Freeze the advective winds before the momentum terms move
        // uc/vc off them.
        ut.as_mut_slice().copy_from_slice(state.uc.as_slice());
        vt.as_mut_slice().copy_from_slice(state.vc.as_slice());

        for k in 0..idx.npz {
            // Corner divergence of the D-grid winds.
            for i in idx.x_range(0, 1) {
                for j in idx.y_range(0, 1) {
                    state.divgd[(i, j, k)] = grid.rarea_c[(i, j)]
                        * ((state.u[(i, j, k)] - state.u[(i - 1, j, k)]) * grid.dyc[(i, j)]
                            + (state.v[(i, j, k)] - state.v[(i, j - 1, k)]) * grid.dxc[(i, j)]);
                }
            }

            // Half-step upwind transport of delp and pt into the
            // provisional fields, one ring wide for the Riemann solve.
            for i in idx.x_range(1, 2) {
                for j in idx.y_range(2, 2) {
                    let xfx = dt2 * ut[(i, j, k)] * grid.dy_edge[(i, j)];
                    let up = if ut[(i, j, k)] > 0.0 { i - 1 } else { i };
                    self.fx[(i, j, k)] = xfx * state.delp[(up, j, k)];
                }
            }
            for i in idx.x_range(2, 2) {
                for j in idx.y_range(1, 2) {
                    let yfx = dt2 * vt[(i, j, k)] * grid.dx_edge[(i, j)];
                    let up = if vt[(i, j, k)] > 0.0 { j - 1 } else { j };
                    self.fy[(i, j, k)] = yfx * state.delp[(i, up, k)];
                }
            }
            for i in idx.x_range(1, 1) {
                for j in idx.y_range(1, 1) {
                    let up_x = |ii: isize| if ut[(ii, j, k)] > 0.0 { ii - 1 } else { ii };
                    let up_y = |jj: isize| if vt[(i, jj, k)] > 0.0 { jj - 1 } else { jj };
                    let div_dp = self.fx[(i, j, k)] - self.fx[(i + 1, j, k)]
                        + self.fy[(i, j, k)]
                        - self.fy[(i, j + 1, k)];
                    let div_pt = self.fx[(i, j, k)] * state.pt[(up_x(i), j, k)]
                        - self.fx[(i + 1, j, k)] * state.pt[(up_x(i + 1), j, k)]
                        + self.fy[(i, j, k)] * state.pt[(i, up_y(j), k)]
                        - self.fy[(i, j + 1, k)] * state.pt[(i, up_y(j + 1), k)];
                    let dp_new =
                        state.delp[(i, j, k)] + grid.rarea[(i, j)] * div_dp;
                    delpc[(i, j, k)] = dp_new;
                    ptc[(i, j, k)] = (state.pt[(i, j, k)] * state.delp[(i, j, k)]
                        + grid.rarea[(i, j)] * div_pt)
                        / dp_new;
                }
            }

            // Kinetic energy at centers, relative vorticity at corners.
            for i in idx.x_range(1, 1) {
                for j in idx.y_range(1, 1) {
                    let ua = state.ua[(i, j, k)];
                    let va = state.va[(i, j, k)];
                    self.ke[(i, j, k)] = 0.5 * (ua * ua + va * va);
                }
            }
            for i in idx.x_range(0, 2) {
                for j in idx.y_range(0, 2) {
                    self.vort[(i, j, k)] = grid.rarea_c[(i, j)]
                        * ((state.vc[(i, j, k)] - state.vc[(i - 1, j, k)]) * grid.dyc[(i, j)]
                            - (state.uc[(i, j, k)] - state.uc[(i, j - 1, k)])
                                * grid.dxc[(i, j)]);
                }
            }

            // Rotational-form momentum terms; pressure gradient applied
            // later by the completion stencil.
            for i in idx.x_range(0, 1) {
                for j in idx.y_range(0, 1) {
                    let va_uc = 0.5 * (state.va[(i - 1, j, k)] + state.va[(i, j, k)]);
                    let absv = 0.5 * (grid.fc[(i, j)] + grid.fc[(i, j + 1)])
                        + 0.5 * (self.vort[(i, j, k)] + self.vort[(i, j + 1, k)]);
                    state.uc[(i, j, k)] += dt2
                        * (absv * va_uc
                            - grid.rdxc[(i, j)]
                                * (self.ke[(i, j, k)] - self.ke[(i - 1, j, k)]));
                    let ua_vc = 0.5 * (state.ua[(i, j - 1, k)] + state.ua[(i, j, k)]);
                    let absv = 0.5 * (grid.fc[(i, j)] + grid.fc[(i + 1, j)])
                        + 0.5 * (self.vort[(i, j, k)] + self.vort[(i + 1, j, k)]);
                    state.vc[(i, j, k)] += dt2
                        * (-absv * ua_vc
                            - grid.rdyc[(i, j)]
                                * (self.ke[(i, j, k)] - self.ke[(i, j - 1, k)]));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{sigma_coordinate, GridData};

    fn setup(f0: f64) -> (GridIndexing, GridData, PrognosticState) {
        let idx = GridIndexing::new(6, 6, 2, 3).unwrap();
        let (ak, bk) = sigma_coordinate(2, 100.0);
        let grid = GridData::uniform(&idx, 1.0e3, 1.0e3, f0, ak, bk);
        let mut state = PrognosticState::zeros(&idx);
        state.delp.fill(1000.0);
        state.pt.fill(300.0);
        (idx, grid, state)
    }

    fn scratch(idx: &GridIndexing) -> (Field3, Field3, Field3, Field3) {
        (
            idx.field(Staggering::XEdge, Levels::Layer),
            idx.field(Staggering::YEdge, Levels::Layer),
            idx.field(Staggering::Center, Levels::Layer),
            idx.field(Staggering::Center, Levels::Layer),
        )
    }

    #[test]
    fn state_at_rest_stays_at_rest() {
        let (idx, grid, mut state) = setup(1.0e-4);
        let (mut ut, mut vt, mut delpc, mut ptc) = scratch(&idx);
        let mut stage = CGridUpdate::new(&idx);
        stage.advance(&idx, &grid, 10.0, &mut state, &mut ut, &mut vt, &mut delpc, &mut ptc);
        assert_eq!(state.uc.max_abs(), 0.0);
        assert_eq!(state.vc.max_abs(), 0.0);
        assert_eq!(state.divgd.max_abs(), 0.0);
        assert_eq!(delpc[(0, 0, 0)], 1000.0);
        assert_eq!(ptc[(3, 3, 1)], 300.0);
    }

    #[test]
    fn uniform_flow_gives_coriolis_turning_only() {
        let (idx, grid, mut state) = setup(1.0e-4);
        state.u.fill(10.0);
        let (mut ut, mut vt, mut delpc, mut ptc) = scratch(&idx);
        let mut stage = CGridUpdate::new(&idx);
        let dt2 = 10.0;
        stage.advance(&idx, &grid, dt2, &mut state, &mut ut, &mut vt, &mut delpc, &mut ptc);
        // uc inherits the uniform flow; vc turns anticyclonically.
        assert!((state.uc[(2, 2, 0)] - 10.0).abs() < 1e-12);
        let expect_vc = -dt2 * 1.0e-4 * 10.0;
        assert!((state.vc[(2, 2, 0)] - expect_vc).abs() < 1e-12);
        // Uniform flow is divergence-free and transports nothing.
        assert_eq!(state.divgd.max_abs(), 0.0);
        assert_eq!(delpc[(2, 2, 0)], 1000.0);
        // Frozen advective winds carry the pre-update values.
        assert_eq!(ut[(2, 2, 0)], 10.0);
        assert_eq!(vt[(2, 2, 0)], 0.0);
    }
}
