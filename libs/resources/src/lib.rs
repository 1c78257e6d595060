//! # sokovan-resources
//!
//! The resource slot model shared by the scheduler, allocator, and fair-share
//! calculator.
//!
//! ## Design Principles
//!
//! - A slot vector is an ordered map from slot name to a decimal quantity
//! - Quantities are arbitrary-precision decimals, never floats: repeated
//!   add/subtract on allocation paths must not drift
//! - Comparison is defined per-key over the union of names; a key absent
//!   from one side is treated as zero
//! - Serialization is a canonical string-keyed decimal map that round-trips
//!   exactly, including the "unlimited" sentinel quantity
//!
//! ## Invariants
//!
//! - Unknown slot names survive `normalize` only with a zero quantity
//! - Arithmetic never panics; subtraction may produce negative components
//!   (callers decide whether negative is an error)

mod error;
mod known;
mod slot;

pub use error::SlotError;
pub use known::{KnownSlotTypes, SlotUnit};
pub use slot::{ResourceSlot, SlotName, UNLIMITED};

/// Re-export the decimal type used for all quantities.
pub use rust_decimal::Decimal;
