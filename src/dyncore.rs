//! The acoustic sub-step scheduler.
//!
//! One call to [`AcousticDynamics::step`] advances the prognostic state
//! by one vertical-remapping interval, split into `n_split` acoustic
//! sub-steps. Each sub-step advances the C-grid winds a half step,
//! completes them with the pressure gradient force, uses them as
//! advective winds for the full-step D-grid advance, runs the implicit
//! vertical elastic solve, and applies the D-grid pressure gradient.
//! Halo exchanges are issued asynchronously and waited on immediately
//! before the first stencil that consumes the exchanged data, so
//! communication overlaps with independent stencil work.
//!
//! The sub-step length is usually limited by horizontal sound-wave
//! propagation, hence "acoustic": the along-surface flux terms are
//! evaluated forward in time, the pressure gradient and elastic terms
//! backward in time for stability.

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::constants::{CNST_0P20, HUGE_R, KAPPA};
use crate::csw::CGridUpdate;
use crate::damping::{nk_heat_dissipation, HyperdiffusionDamping, RayleighDamping};
use crate::dsw::DGridUpdate;
use crate::error::{ConfigError, StepError};
use crate::exec::{StepMode, StepPath};
use crate::field::{ColumnK, Field2, Field3};
use crate::grid::{DampingCoefficients, GridData, GridIndexing};
use crate::halo::{Communicator, HaloSpec, ScalarExchange, VectorExchange};
use crate::nh_p_grad::NonHydrostaticPressureGradient;
use crate::riemann::{RiemannSolverC, RiemannSolverD, UpdateHeightOnCGrid, UpdateHeightOnDGrid};
use crate::state::PrognosticState;
use crate::stencils;
use crate::types::{Levels, Staggering};

/// Immutable integration parameters, fixed at model setup.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcousticConfig {
    /// Remap-interval length (s); each sub-step advances by
    /// `dt_remap / n_split`.
    pub dt_remap: f64,
    /// Acoustic sub-steps per remap interval.
    pub n_split: i32,
    /// Remap intervals per physics step.
    pub k_split: i32,
    /// Skip the elastic solves and vertical velocity entirely.
    pub hydrostatic: bool,
    /// Grid family; values below 4 duplicate interface wind points
    /// between neighbors and need an explicit synchronization on the
    /// final sub-step.
    pub grid_type: i32,
    /// Reconstruction order for mass transport.
    pub hord_dp: i32,
    /// Reconstruction order for heat and height transport.
    pub hord_tm: i32,
    /// Reconstruction order for vertical-momentum transport.
    pub hord_vt: i32,
    /// Hyperdiffusion order for the flux dampers (number of Laplacian
    /// sweeps; the halo width bounds `nord + 1`).
    pub nord: usize,
    /// Background divergence-damping coefficient (nondimensional,
    /// scaled by the minimum corner-cell area).
    pub d2_bg: f64,
    /// Background diffusion in the top sponge level.
    pub d2_bg_k1: f64,
    /// Background diffusion in the second sponge level.
    pub d2_bg_k2: f64,
    /// Fraction of damped kinetic energy converted to heat.
    pub d_con: f64,
    /// Fourth-order velocity-damping coefficient (policy input for the
    /// heat-dissipation depth).
    pub vtdm4: f64,
    /// Convert dissipated kinetic energy over the full column.
    pub convert_ke: bool,
    /// Flux-damper coefficient for heat transport.
    pub damp_t: f64,
    /// Flux-damper coefficient for vertical-momentum transport.
    pub damp_w: f64,
    /// Flux-damper coefficient for height transport.
    pub damp_vt: f64,
    /// Lower bound on interface pressure as a fraction of the
    /// hydrostatic value.
    pub p_fac: f64,
    /// Apply the Rayleigh sponge every sub-step.
    pub rf_fast: bool,
    /// Rayleigh damping timescale (s).
    pub tau: f64,
    /// Pressure (Pa) below which the Rayleigh sponge activates.
    pub rf_cutoff: f64,
    /// Cap on the per-step temperature adjustment, as a fraction of the
    /// sub-step length.
    pub delt_max: f64,
    /// Time-extrapolation weight for the pressure gradient. Only 0 is
    /// implemented.
    pub beta: f64,
    /// External-mode damping coefficient. Only 0 is implemented.
    pub d_ext: f64,
    /// Log-pressure vertical coordinate. Not implemented.
    pub use_logp: bool,
    /// Refresh the remap pressure diagnostics on every sub-step instead
    /// of only the final one, as inline vortex breeding requires.
    pub breed_vortex_inline: bool,
    /// Refresh the hydrostatic interface pressure on the final sub-step
    /// for the legacy omega diagnostic.
    pub use_old_omega: bool,
    /// Execution path for the elementwise glue passes.
    pub step_mode: StepMode,
}

impl Default for AcousticConfig {
    fn default() -> Self {
        Self {
            dt_remap: 225.0,
            n_split: 5,
            k_split: 1,
            hydrostatic: false,
            grid_type: 0,
            hord_dp: 8,
            hord_tm: 8,
            hord_vt: 8,
            nord: 2,
            d2_bg: 0.0,
            d2_bg_k1: 0.2,
            d2_bg_k2: 0.1,
            d_con: 1.0,
            vtdm4: 0.0,
            convert_ke: false,
            damp_t: 0.15,
            damp_w: 0.15,
            damp_vt: 0.15,
            p_fac: 0.05,
            rf_fast: false,
            tau: 4.32e5,
            rf_cutoff: 30.0e2,
            delt_max: 0.002,
            beta: 0.0,
            d_ext: 0.0,
            use_logp: false,
            breed_vortex_inline: false,
            use_old_omega: false,
            step_mode: StepMode::Interpreted,
        }
    }
}

impl AcousticConfig {
    /// Check for unimplemented or inconsistent options. Called by the
    /// scheduler constructor; failures are fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.d_ext != 0.0 {
            return Err(ConfigError::DExtNotImplemented(self.d_ext));
        }
        if self.beta != 0.0 {
            return Err(ConfigError::BetaNotImplemented(self.beta));
        }
        if self.use_logp {
            return Err(ConfigError::UseLogpNotImplemented);
        }
        if self.n_split < 1 {
            return Err(ConfigError::InvalidSplit(self.n_split));
        }
        if self.k_split < 1 {
            return Err(ConfigError::InvalidSplit(self.k_split));
        }
        Ok(())
    }

    pub fn with_n_split(mut self, n_split: i32) -> Self {
        self.n_split = n_split;
        self
    }

    pub fn with_dt_remap(mut self, dt_remap: f64) -> Self {
        self.dt_remap = dt_remap;
        self
    }

    pub fn with_hydrostatic(mut self, hydrostatic: bool) -> Self {
        self.hydrostatic = hydrostatic;
        self
    }

    pub fn with_transport_orders(mut self, hord_dp: i32, hord_tm: i32, hord_vt: i32) -> Self {
        self.hord_dp = hord_dp;
        self.hord_tm = hord_tm;
        self.hord_vt = hord_vt;
        self
    }

    pub fn with_divergence_damping(mut self, nord: usize, d2_bg: f64) -> Self {
        self.nord = nord;
        self.d2_bg = d2_bg;
        self
    }

    /// Enable the fast Rayleigh sponge.
    pub fn with_rayleigh(mut self, tau: f64, rf_cutoff: f64) -> Self {
        self.rf_fast = true;
        self.tau = tau;
        self.rf_cutoff = rf_cutoff;
        self
    }

    /// Refresh the remap pressure diagnostics every sub-step.
    pub fn with_breed_vortex_inline(mut self) -> Self {
        self.breed_vortex_inline = true;
        self
    }

    pub fn with_step_mode(mut self, step_mode: StepMode) -> Self {
        self.step_mode = step_mode;
        self
    }
}

/// Integration counters, for logging and regression checks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcousticStats {
    /// Completed acoustic sub-steps.
    pub sub_steps: u64,
    /// Completed remap intervals.
    pub remap_steps: u64,
    /// Finite-volume transport operator invocations.
    pub transport_updates: u64,
    /// Sub-steps that refreshed the remap pressure diagnostics
    /// (every sub-step under inline vortex breeding, otherwise one per
    /// remap interval).
    pub remap_diagnostic_updates: u64,
    /// Rayleigh and hyperdiffusion applications.
    pub damping_passes: u64,
}

/// Named halo exchange operations, built once per scheduler. Grouping
/// follows the consumption pattern of the sub-step loop: fields that
/// become stale together travel together.
struct HaloUpdaters {
    q_con_cappa: Box<dyn ScalarExchange + Send>,
    delp_pt: Box<dyn ScalarExchange + Send>,
    w: Box<dyn ScalarExchange + Send>,
    gz: Box<dyn ScalarExchange + Send>,
    zh: Box<dyn ScalarExchange + Send>,
    delp_pt_q_con: Box<dyn ScalarExchange + Send>,
    divgd: Box<dyn ScalarExchange + Send>,
    heat_source: Box<dyn ScalarExchange + Send>,
    /// Interface pressure travels 2 deep; that is all the corner
    /// interpolation of the pressure-gradient stage reads.
    pkc: Box<dyn ScalarExchange + Send>,
    u_v: Box<dyn VectorExchange + Send>,
    uc_vc: Box<dyn VectorExchange + Send>,
}

impl HaloUpdaters {
    fn new(comm: &dyn Communicator, idx: &GridIndexing) -> Self {
        let h = idx.n_halo;
        let center = HaloSpec::new(Staggering::Center, Levels::Layer, h);
        let center_if = HaloSpec::new(Staggering::Center, Levels::Interface, h);
        Self {
            q_con_cappa: comm.scalar_updater("q_con+cappa", vec![center; 2]),
            delp_pt: comm.scalar_updater("delp+pt", vec![center; 2]),
            w: comm.scalar_updater("w", vec![center]),
            gz: comm.scalar_updater("gz", vec![center_if]),
            zh: comm.scalar_updater("zh", vec![center_if]),
            delp_pt_q_con: comm.scalar_updater("delp+pt+q_con", vec![center; 3]),
            divgd: comm.scalar_updater(
                "divgd",
                vec![HaloSpec::new(Staggering::Corner, Levels::Layer, h)],
            ),
            heat_source: comm.scalar_updater("heat_source", vec![center]),
            pkc: comm.scalar_updater(
                "pkc",
                vec![HaloSpec::new(Staggering::Center, Levels::Interface, 2)],
            ),
            u_v: comm.vector_updater(
                "u+v",
                HaloSpec::new(Staggering::YEdge, Levels::Layer, h),
                HaloSpec::new(Staggering::XEdge, Levels::Layer, h),
            ),
            uc_vc: comm.vector_updater(
                "uc+vc",
                HaloSpec::new(Staggering::XEdge, Levels::Layer, h),
                HaloSpec::new(Staggering::YEdge, Levels::Layer, h),
            ),
        }
    }
}

/// Scratch fields owned by the scheduler, allocated once.
struct Temporaries {
    /// Frozen advective C-grid winds.
    ut: Field3,
    vt: Field3,
    /// Working interface heights (meters), C-grid phase.
    gz: Field3,
    /// Hydrostatic interface pressure for the legacy omega diagnostic.
    pem: Field3,
    /// Full interface pressure from the elastic solves.
    pkc: Field3,
    /// Provisional half-step pressure thickness.
    delpc: Field3,
    /// Provisional half-step potential temperature.
    ptc: Field3,
    /// Vertical-velocity scratch for the half-step solve; the updated
    /// values are a byproduct and discarded.
    w3: Field3,
    /// Courant numbers and area fluxes from the C-grid winds.
    crx: Field3,
    cry: Field3,
    xfx: Field3,
    yfx: Field3,
    /// Surface vertical motion, half step and full step.
    ws3: Field2,
    wsd: Field2,
}

impl Temporaries {
    fn new(idx: &GridIndexing) -> Self {
        Self {
            ut: idx.field(Staggering::XEdge, Levels::Layer),
            vt: idx.field(Staggering::YEdge, Levels::Layer),
            gz: idx.field(Staggering::Center, Levels::Interface),
            pem: idx.field(Staggering::Center, Levels::Interface),
            pkc: idx.field(Staggering::Center, Levels::Interface),
            delpc: idx.field(Staggering::Center, Levels::Layer),
            ptc: idx.field(Staggering::Center, Levels::Layer),
            w3: idx.field(Staggering::Center, Levels::Layer),
            crx: idx.field(Staggering::XEdge, Levels::Layer),
            cry: idx.field(Staggering::YEdge, Levels::Layer),
            xfx: idx.field(Staggering::XEdge, Levels::Layer),
            yfx: idx.field(Staggering::YEdge, Levels::Layer),
            ws3: idx.field2(),
            wsd: idx.field2(),
        }
    }
}

/// The Lagrangian acoustic dynamics driver.
pub struct AcousticDynamics {
    idx: GridIndexing,
    grid: GridData,
    config: AcousticConfig,
    comm: Box<dyn Communicator + Send>,
    step_path: Box<dyn StepPath + Send>,
    cgrid: CGridUpdate,
    dgrid: DGridUpdate,
    update_dz_c: UpdateHeightOnCGrid,
    update_dz_d: UpdateHeightOnDGrid,
    riemann_c: RiemannSolverC,
    riemann_d: RiemannSolverD,
    pressure_gradient: NonHydrostaticPressureGradient,
    rayleigh: Option<RayleighDamping>,
    hyperdiffusion: Option<HyperdiffusionDamping>,
    nk_heat: usize,
    halos: HaloUpdaters,
    tmp: Temporaries,
    /// Reference pressure-thickness column, invariant per run.
    dp_ref: ColumnK,
    /// Surface height (m) from the surface geopotential.
    zs: Field2,
    pk3_seeded: bool,
    stats: AcousticStats,
}

impl AcousticDynamics {
    /// Build the scheduler and all of its stages. `phis` is the surface
    /// geopotential (m²/s²).
    pub fn new(
        comm: Box<dyn Communicator + Send>,
        idx: GridIndexing,
        grid: GridData,
        damping: DampingCoefficients,
        config: AcousticConfig,
        phis: &Field2,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let dt = config.dt_remap / config.n_split as f64;

        let nk_heat = nk_heat_dissipation(
            config.convert_ke,
            config.vtdm4,
            config.d2_bg_k1,
            config.d2_bg_k2,
            idx.npz,
        );
        let hyperdiffusion = if nk_heat != 0 && config.d_con > 1.0e-5 {
            let nf_ke = (config.nord + 1).min(3);
            Some(HyperdiffusionDamping::new(
                &idx,
                nf_ke,
                CNST_0P20 * damping.da_min,
            ))
        } else {
            None
        };
        let rayleigh = if config.rf_fast {
            let pfull = grid.reference_pressure_column();
            Some(RayleighDamping::new(
                dt,
                config.tau,
                config.rf_cutoff,
                grid.ptop,
                &pfull,
            ))
        } else {
            None
        };

        let dgrid = DGridUpdate::new(
            &idx,
            &damping,
            config.hord_dp,
            config.hord_tm,
            config.hord_vt,
            config.nord,
            config.damp_t,
            config.damp_w,
            config.d_con,
            config.d2_bg * damping.da_min_c,
            config.hydrostatic,
        )?;
        let update_dz_d =
            UpdateHeightOnDGrid::new(&idx, &damping, config.hord_tm, config.nord, config.damp_vt)?;
        let (dp_ref, zs) = stencils::dp_ref_compute(&grid.ak, &grid.bk, phis);

        let halos = HaloUpdaters::new(comm.as_ref(), &idx);
        Ok(Self {
            cgrid: CGridUpdate::new(&idx),
            dgrid,
            update_dz_c: UpdateHeightOnCGrid::new(&idx),
            update_dz_d,
            riemann_c: RiemannSolverC::new(&idx, config.p_fac),
            riemann_d: RiemannSolverD::new(&idx, config.p_fac),
            pressure_gradient: NonHydrostaticPressureGradient::new(&idx),
            rayleigh,
            hyperdiffusion,
            nk_heat,
            halos,
            tmp: Temporaries::new(&idx),
            dp_ref,
            zs,
            pk3_seeded: false,
            stats: AcousticStats::default(),
            step_path: config.step_mode.build(),
            comm,
            idx,
            grid,
            config,
        })
    }

    pub fn stats(&self) -> &AcousticStats {
        &self.stats
    }

    pub fn config(&self) -> &AcousticConfig {
        &self.config
    }

    /// Reference pressure-thickness column from the hybrid coordinate.
    pub fn reference_layer_thickness(&self) -> &ColumnK {
        &self.dp_ref
    }

    /// Levels touched by the Rayleigh sponge, 0 when it is disabled.
    pub fn rayleigh_levels(&self) -> usize {
        self.rayleigh.as_ref().map_or(0, RayleighDamping::damped_levels)
    }

    /// Advance the state by one remap interval (`n_split` sub-steps).
    /// `n_map` counts remap intervals within the physics step from 1;
    /// the heat accumulators are zeroed on the first.
    pub fn step(&mut self, state: &mut PrognosticState, n_map: i32) -> Result<(), StepError> {
        let cfg = self.config;
        let end_step = n_map == cfg.k_split;
        let dt = cfg.dt_remap / cfg.n_split as f64;
        let dt2 = 0.5 * dt;
        let n_split = cfg.n_split as usize;
        let nonhydrostatic = !cfg.hydrostatic;

        if nonhydrostatic && !self.pk3_seeded {
            // The halo fill overwrites the seed everywhere it is read;
            // the sentinel flags any read that escapes the fill.
            state.pk3.fill(HUGE_R);
            self.pk3_seeded = true;
        }

        self.halos
            .q_con_cappa
            .start(&[&state.q_con, &state.cappa])?;
        self.halos.delp_pt.start(&[&state.delp, &state.pt])?;
        self.halos.u_v.start(&state.u, &state.v)?;
        self.halos
            .q_con_cappa
            .wait(&mut [&mut state.q_con, &mut state.cappa])?;

        self.step_path.zero_accumulators(
            &self.idx,
            &mut state.mfxd,
            &mut state.mfyd,
            &mut state.cxd,
            &mut state.cyd,
            &mut state.heat_source,
            &mut state.diss_est,
            n_map == 1,
        );

        debug!(
            "acoustic step: n_map={} n_split={} dt={:.3}s",
            n_map, n_split, dt
        );

        for it in 0..n_split {
            let remap_step = cfg.breed_vortex_inline || it == n_split - 1;
            trace!("sub-step {}/{} remap_step={}", it + 1, n_split, remap_step);

            if nonhydrostatic {
                self.halos.w.start(&[&state.w])?;
                if it == 0 {
                    stencils::set_gz(&self.idx, &self.zs, &state.delz, &mut self.tmp.gz);
                    self.halos.gz.start(&[&self.tmp.gz])?;
                }
            }
            if it == 0 {
                self.halos
                    .delp_pt
                    .wait(&mut [&mut state.delp, &mut state.pt])?;
            }
            if remap_step && end_step && cfg.use_old_omega {
                stencils::set_pem(&self.idx, &state.delp, &mut self.tmp.pem, self.grid.ptop);
            }

            self.halos.u_v.wait(&mut state.u, &mut state.v)?;
            if nonhydrostatic {
                self.halos.w.wait(&mut [&mut state.w])?;
            }

            // Half-step C-grid advance.
            self.cgrid.advance(
                &self.idx,
                &self.grid,
                dt2,
                state,
                &mut self.tmp.ut,
                &mut self.tmp.vt,
                &mut self.tmp.delpc,
                &mut self.tmp.ptc,
            );
            if cfg.nord > 0 {
                self.halos.divgd.start(&[&state.divgd])?;
            }

            if nonhydrostatic {
                if it == 0 {
                    self.halos.gz.wait(&mut [&mut self.tmp.gz])?;
                    stencils::copy_field(&self.tmp.gz, &mut state.zh);
                } else {
                    stencils::copy_field(&state.zh, &mut self.tmp.gz);
                }
                self.update_dz_c.update(
                    &self.idx,
                    &self.grid,
                    dt2,
                    &self.tmp.ut,
                    &self.tmp.vt,
                    &mut self.tmp.gz,
                    &self.zs,
                    &mut self.tmp.ws3,
                );
                stencils::copy_field(&state.w, &mut self.tmp.w3);
                self.riemann_c.solve(
                    &self.idx,
                    dt2,
                    self.grid.ptop,
                    &self.zs,
                    &self.tmp.ws3,
                    &state.cappa,
                    &self.tmp.ptc,
                    &state.q_con,
                    &self.tmp.delpc,
                    &mut self.tmp.gz,
                    &mut self.tmp.pkc,
                    &mut self.tmp.w3,
                );
            } else {
                stencils::hydrostatic_interface_state(
                    &self.idx,
                    &self.zs,
                    &self.tmp.delpc,
                    &self.tmp.ptc,
                    self.grid.ptop,
                    &mut self.tmp.pkc,
                    &mut self.tmp.gz,
                );
            }

            // Pressure-gradient completion of the C-grid winds, then
            // exchange them for the D-grid advance.
            stencils::p_grad_c(
                &self.idx,
                &self.grid.rdxc,
                &self.grid.rdyc,
                &mut state.uc,
                &mut state.vc,
                &self.tmp.delpc,
                &self.tmp.pkc,
                &self.tmp.gz,
                dt2,
                cfg.hydrostatic,
            );
            self.halos.uc_vc.start(&state.uc, &state.vc)?;
            if cfg.nord > 0 {
                self.halos.divgd.wait(&mut [&mut state.divgd])?;
            }
            self.halos.uc_vc.wait(&mut state.uc, &mut state.vc)?;

            // Full-step D-grid advance on the completed C-grid winds.
            self.dgrid.advance(
                &self.idx,
                &self.grid,
                dt,
                state,
                &mut self.tmp.crx,
                &mut self.tmp.cry,
                &mut self.tmp.xfx,
                &mut self.tmp.yfx,
            )?;
            self.stats.transport_updates += self.dgrid.transport_operators();

            self.halos.delp_pt_q_con.update(&mut [
                &mut state.delp,
                &mut state.pt,
                &mut state.q_con,
            ])?;

            if nonhydrostatic {
                self.update_dz_d.update(
                    &self.idx,
                    &self.grid,
                    dt,
                    &self.tmp.crx,
                    &self.tmp.cry,
                    &self.tmp.xfx,
                    &self.tmp.yfx,
                    &mut state.zh,
                    &self.zs,
                    &mut self.tmp.wsd,
                )?;
                self.stats.transport_updates += 1;
                self.riemann_d.solve(
                    &self.idx,
                    dt,
                    self.grid.ptop,
                    &self.zs,
                    &self.tmp.wsd,
                    &state.cappa,
                    &state.pt,
                    &state.q_con,
                    &state.delp,
                    &mut state.delz,
                    &mut state.zh,
                    &mut state.w,
                    &mut self.tmp.pkc,
                    &mut state.pk3,
                    &mut state.pe,
                    &mut state.peln,
                    &mut state.pk,
                    remap_step,
                );
                self.halos.zh.start(&[&state.zh])?;
                self.halos.pkc.start(&[&self.tmp.pkc])?;
                if remap_step {
                    stencils::edge_pe(&self.idx, &mut state.pe, &state.delp, self.grid.ptop);
                    self.stats.remap_diagnostic_updates += 1;
                }
                stencils::pk3_halo(&self.idx, &mut state.pk3, &state.delp, self.grid.ptop, KAPPA);
                self.halos.zh.wait(&mut [&mut state.zh])?;
                self.step_path
                    .geopotential_from_height(&self.idx, &state.zh, &mut self.tmp.gz);
                self.halos.pkc.wait(&mut [&mut self.tmp.pkc])?;
                self.pressure_gradient.apply(
                    &self.idx,
                    &self.grid,
                    dt,
                    &mut state.u,
                    &mut state.v,
                    &self.tmp.pkc,
                    &self.tmp.gz,
                    &state.pk3,
                    &state.delp,
                );
            }

            if let Some(rayleigh) = &self.rayleigh {
                let w = if nonhydrostatic {
                    Some(&mut state.w)
                } else {
                    None
                };
                rayleigh.apply(&self.idx, &mut state.u, &mut state.v, w);
                self.stats.damping_passes += 1;
            }

            if it != n_split - 1 {
                self.halos.u_v.start(&state.u, &state.v)?;
            } else if cfg.grid_type < 4 {
                self.comm
                    .synchronize_vector_interfaces(&mut state.u, &mut state.v);
            }
            self.stats.sub_steps += 1;
        }

        if let Some(hyperdiffusion) = self.hyperdiffusion.as_mut() {
            self.halos.heat_source.update(&mut [&mut state.heat_source])?;
            hyperdiffusion.apply(&self.idx, &self.grid, &mut state.heat_source);
            self.stats.damping_passes += 1;
            if nonhydrostatic {
                let delt_time_factor = (dt * cfg.delt_max).abs();
                stencils::temperature_adjust(
                    &self.idx,
                    &state.delp,
                    &state.delz,
                    &state.cappa,
                    &state.heat_source,
                    &mut state.pt,
                    delt_time_factor,
                    self.nk_heat,
                );
            }
        }
        self.stats.remap_steps += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::sigma_coordinate;
    use crate::halo::TileCommunicator;

    #[test]
    fn config_rejects_unimplemented_options() {
        let base = AcousticConfig::default();
        assert!(base.validate().is_ok());
        assert_eq!(
            AcousticConfig {
                d_ext: 0.02,
                ..base
            }
            .validate(),
            Err(ConfigError::DExtNotImplemented(0.02))
        );
        assert_eq!(
            AcousticConfig { beta: 0.4, ..base }.validate(),
            Err(ConfigError::BetaNotImplemented(0.4))
        );
        assert_eq!(
            AcousticConfig {
                use_logp: true,
                ..base
            }
            .validate(),
            Err(ConfigError::UseLogpNotImplemented)
        );
        assert_eq!(
            AcousticConfig {
                n_split: 0,
                ..base
            }
            .validate(),
            Err(ConfigError::InvalidSplit(0))
        );
    }

    #[test]
    fn heat_conversion_disabled_when_damping_negligible() {
        let idx = GridIndexing::new(8, 8, 4, 3).unwrap();
        let (ak, bk) = sigma_coordinate(4, 100.0);
        let grid = GridData::uniform(&idx, 1.0e3, 1.0e3, 0.0, ak, bk);
        let damping = DampingCoefficients::uniform(1.0e3, 1.0e3);
        let config = AcousticConfig {
            d2_bg_k1: 1.0e-4,
            ..AcousticConfig::default()
        };
        let phis = idx.field2();
        let dyn_core = AcousticDynamics::new(
            Box::new(TileCommunicator::new(8, 8)),
            idx,
            grid,
            damping,
            config,
            &phis,
        )
        .unwrap();
        assert_eq!(dyn_core.nk_heat, 0);
        assert!(dyn_core.hyperdiffusion.is_none());
    }
}
