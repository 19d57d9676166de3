//! Control algorithms behind the decision engine
//!
//! - `schedule`: time-of-day charge current baseline
//! - `boost`: battery boost protection against export and over-voltage
//! - `safety`: critical undervoltage and phase saturation checks
//! - `outlets`: priority-ranked switching of the managed loads
//!
//! Every controller is synchronous and I/O free; the engine calls them in a
//! fixed order once per cycle.

pub mod boost;
pub mod outlets;
pub mod safety;
pub mod schedule;

pub use boost::{BoostTrigger, ProtectionState};
pub use outlets::{OutletController, OutletRuntime, OutletState};
pub use safety::SafetyVerdict;
pub use schedule::ChargeBaseline;
