//! Execution-path strategy for the scheduler's elementwise glue passes.
//!
//! The choice between the plain and the fused lowering is a
//! [`StepPath`] strategy selected once at construction; the scheduler
//! owns exactly one handle for the life of the run.
//!
//! Both variants are bit-identical: the compiled path only lowers the
//! index-based kernels to flat passes over the underlying buffers.

use serde::{Deserialize, Serialize};

use crate::field::Field3;
use crate::grid::GridIndexing;
use crate::stencils;

/// Which execution path the scheduler uses for its glue passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepMode {
    /// One loop per kernel, indexed access.
    #[default]
    Interpreted,
    /// Fused flat passes over the raw buffers.
    Compiled,
}

impl StepMode {
    /// Build the strategy object for this mode.
    pub fn build(self) -> Box<dyn StepPath + Send> {
        match self {
            StepMode::Interpreted => Box::new(InterpretedStep),
            StepMode::Compiled => Box::new(CompiledStep),
        }
    }
}

/// The glue passes the scheduler runs between stages. Implementations
/// must be numerically identical; only the lowering differs.
pub trait StepPath {
    /// Zero the per-remap-step accumulators (see
    /// [`stencils::zero_accumulators`]).
    #[allow(clippy::too_many_arguments)]
    fn zero_accumulators(
        &self,
        idx: &GridIndexing,
        mfxd: &mut Field3,
        mfyd: &mut Field3,
        cxd: &mut Field3,
        cyd: &mut Field3,
        heat_source: &mut Field3,
        diss_est: &mut Field3,
        first_timestep: bool,
    );

    /// Convert height to geopotential (see
    /// [`stencils::geopotential_from_height`]).
    fn geopotential_from_height(&self, idx: &GridIndexing, zh: &Field3, gz: &mut Field3);
}

/// Straightforward kernel-per-loop path.
pub struct InterpretedStep;

impl StepPath for InterpretedStep {
    fn zero_accumulators(
        &self,
        idx: &GridIndexing,
        mfxd: &mut Field3,
        mfyd: &mut Field3,
        cxd: &mut Field3,
        cyd: &mut Field3,
        heat_source: &mut Field3,
        diss_est: &mut Field3,
        first_timestep: bool,
    ) {
        stencils::zero_accumulators(idx, mfxd, mfyd, cxd, cyd, heat_source, diss_est, first_timestep);
    }

    fn geopotential_from_height(&self, idx: &GridIndexing, zh: &Field3, gz: &mut Field3) {
        stencils::geopotential_from_height(idx, zh, gz);
    }
}

/// Fused flat-buffer path.
pub struct CompiledStep;

impl StepPath for CompiledStep {
    fn zero_accumulators(
        &self,
        idx: &GridIndexing,
        mfxd: &mut Field3,
        mfyd: &mut Field3,
        cxd: &mut Field3,
        cyd: &mut Field3,
        heat_source: &mut Field3,
        diss_est: &mut Field3,
        first_timestep: bool,
    ) {
        for buf in [mfxd, mfyd, cxd, cyd] {
            buf.as_mut_slice().fill(0.0);
        }
        if first_timestep {
            // Interior-only zeroing cannot be flattened; same loop as
            // the interpreted kernel.
            for i in idx.x_range(0, 0) {
                for j in idx.y_range(0, 0) {
                    for k in 0..idx.npz {
                        heat_source[(i, j, k)] = 0.0;
                        diss_est[(i, j, k)] = 0.0;
                    }
                }
            }
        }
    }

    fn geopotential_from_height(&self, idx: &GridIndexing, zh: &Field3, gz: &mut Field3) {
        if idx.n_halo == 2 {
            // Range equals the full buffer: one flat multiply. The
            // parallel split is elementwise, so the lowering stays
            // bit-identical.
            let g = crate::constants::GRAV;
            #[cfg(feature = "parallel")]
            {
                use rayon::prelude::*;
                gz.as_mut_slice()
                    .par_chunks_mut(4096)
                    .zip(zh.as_slice().par_chunks(4096))
                    .for_each(|(dst, src)| {
                        for (d, s) in dst.iter_mut().zip(src) {
                            *d = s * g;
                        }
                    });
            }
            #[cfg(not(feature = "parallel"))]
            for (dst, src) in gz.as_mut_slice().iter_mut().zip(zh.as_slice()) {
                *dst = src * g;
            }
        } else {
            stencils::geopotential_from_height(idx, zh, gz);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Levels, Staggering};

    #[test]
    fn paths_agree_bitwise() {
        let idx = GridIndexing::new(4, 4, 3, 3).unwrap();
        let mk = || {
            let mut f = idx.field(Staggering::Center, Levels::Layer);
            f.assign(|i, j, k| (i + j) as f64 + 0.25 * k as f64);
            f
        };
        let mut a = [mk(), mk(), mk(), mk(), mk(), mk()];
        let mut b = a.clone();
        let [m1, m2, c1, c2, h, d] = &mut a;
        InterpretedStep.zero_accumulators(&idx, m1, m2, c1, c2, h, d, true);
        let [n1, n2, e1, e2, g, f] = &mut b;
        CompiledStep.zero_accumulators(&idx, n1, n2, e1, e2, g, f, true);
        assert_eq!(a, b);

        let mut zh = idx.field(Staggering::Center, Levels::Interface);
        zh.assign(|i, j, k| (i * 7 + j * 3) as f64 + k as f64);
        let mut gz1 = idx.field(Staggering::Center, Levels::Interface);
        let mut gz2 = gz1.clone();
        InterpretedStep.geopotential_from_height(&idx, &zh, &mut gz1);
        CompiledStep.geopotential_from_height(&idx, &zh, &mut gz2);
        assert_eq!(gz1, gz2);
    }
}
