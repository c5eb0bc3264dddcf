//! The mutable atmospheric state shared across sub-steps.
//!
//! One concrete struct: every consumer takes `&mut PrognosticState`
//! and reads or writes named fields directly. All fields share the
//! domain decomposition and halo width of the [`GridIndexing`] they
//! were allocated from; a field consumed by a stencil across a cell
//! boundary must have been halo-exchanged since its last mutation.

use crate::field::Field3;
use crate::grid::GridIndexing;
use crate::types::{Levels, Staggering};

/// Prognostic and accumulator fields, allocated once and mutated in
/// place for the life of the run.
#[derive(Clone, Debug)]
pub struct PrognosticState {
    /// D-grid x-wind, on y-interfaces (m/s).
    pub u: Field3,
    /// D-grid y-wind, on x-interfaces (m/s).
    pub v: Field3,
    /// Vertical velocity at cell centers (m/s), nonhydrostatic only.
    pub w: Field3,
    /// C-grid x-wind, on x-interfaces (m/s).
    pub uc: Field3,
    /// C-grid y-wind, on y-interfaces (m/s).
    pub vc: Field3,
    /// Cell-center x-wind diagnostic (m/s).
    pub ua: Field3,
    /// Cell-center y-wind diagnostic (m/s).
    pub va: Field3,
    /// Pressure thickness per layer (Pa).
    pub delp: Field3,
    /// Potential temperature (K).
    pub pt: Field3,
    /// Layer height increment (m, negative), nonhydrostatic only.
    pub delz: Field3,
    /// Interface heights (m), nonhydrostatic only.
    pub zh: Field3,
    /// Moist kappa per cell.
    pub cappa: Field3,
    /// Condensate fraction.
    pub q_con: Field3,
    /// Interface pressure (Pa).
    pub pe: Field3,
    /// Interface pressure to the kappa.
    pub pk: Field3,
    /// Log interface pressure.
    pub peln: Field3,
    /// Full interface pressure to the kappa for the nonhydrostatic
    /// pressure gradient.
    pub pk3: Field3,
    /// Accumulated heat source from damping (J/m² per layer).
    pub heat_source: Field3,
    /// Accumulated dissipation estimate.
    pub diss_est: Field3,
    /// Accumulated x mass flux (Pa m²), on x-interfaces.
    pub mfxd: Field3,
    /// Accumulated y mass flux (Pa m²), on y-interfaces.
    pub mfyd: Field3,
    /// Accumulated x Courant numbers, on x-interfaces.
    pub cxd: Field3,
    /// Accumulated y Courant numbers, on y-interfaces.
    pub cyd: Field3,
    /// Divergence on corners (1/s), for divergence damping.
    pub divgd: Field3,
}

impl PrognosticState {
    /// Allocate a zero state on the given sub-domain.
    pub fn zeros(idx: &GridIndexing) -> Self {
        let center = |levels| idx.field(Staggering::Center, levels);
        Self {
            u: idx.field(Staggering::YEdge, Levels::Layer),
            v: idx.field(Staggering::XEdge, Levels::Layer),
            w: center(Levels::Layer),
            uc: idx.field(Staggering::XEdge, Levels::Layer),
            vc: idx.field(Staggering::YEdge, Levels::Layer),
            ua: center(Levels::Layer),
            va: center(Levels::Layer),
            delp: center(Levels::Layer),
            pt: center(Levels::Layer),
            delz: center(Levels::Layer),
            zh: center(Levels::Interface),
            cappa: center(Levels::Layer),
            q_con: center(Levels::Layer),
            pe: center(Levels::Interface),
            pk: center(Levels::Interface),
            peln: center(Levels::Interface),
            pk3: center(Levels::Interface),
            heat_source: center(Levels::Layer),
            diss_est: center(Levels::Layer),
            mfxd: idx.field(Staggering::XEdge, Levels::Layer),
            mfyd: idx.field(Staggering::YEdge, Levels::Layer),
            cxd: idx.field(Staggering::XEdge, Levels::Layer),
            cyd: idx.field(Staggering::YEdge, Levels::Layer),
            divgd: idx.field(Staggering::Corner, Levels::Layer),
        }
    }
}
