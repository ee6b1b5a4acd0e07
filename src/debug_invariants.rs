//! Invariant checks shared by the partition map and the local multigraph.

use crate::scaler_error::ScalerError;

/// Trait for validating data structure invariants.
pub trait DebugInvariants {
    /// Validate invariants and return the first error encountered.
    fn validate_invariants(&self) -> Result<(), ScalerError>;

    /// Panic on a broken invariant in debug builds or when invariant checking
    /// is enabled; a no-op otherwise.
    fn debug_assert_invariants(&self) {
        #[cfg(any(
            debug_assertions,
            feature = "strict-invariants",
            feature = "check-invariants"
        ))]
        if let Err(e) = self.validate_invariants() {
            panic!("[invariants] {}: {e}", std::any::type_name::<Self>());
        }
    }
}
