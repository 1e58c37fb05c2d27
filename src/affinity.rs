//! CPU pinning for the per-component loops.
//!
//! Each pipeline stage is a dedicated OS thread that spins on its input
//! queue; pinning keeps it on one core so the spin stays cache-resident
//! and latency stays flat.

use tracing::warn;

/// Pins the current thread to `core`. Returns `false` (and logs) when the
/// core does not exist or affinity cannot be set; the loop then runs
/// unpinned, which is correct but slower.
pub fn pin_to_core(core: usize) -> bool {
    let Some(core_ids) = core_affinity::get_core_ids() else {
        warn!(core, "could not enumerate CPU cores; running unpinned");
        return false;
    };
    let Some(id) = core_ids.into_iter().find(|c| c.id == core) else {
        warn!(core, "requested core not present; running unpinned");
        return false;
    };
    core_affinity::set_for_current(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinning_to_core_zero_usually_works() {
        // Core 0 exists everywhere we run tests; a false return is still
        // acceptable behavior (containers may restrict affinity).
        let _ = pin_to_core(0);
    }

    #[test]
    fn pinning_to_absurd_core_fails_gracefully() {
        assert!(!pin_to_core(100_000));
    }
}
