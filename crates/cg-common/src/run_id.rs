//! Process-level run ID for tracking execution instances.
//!
//! Each process gets a unique ULID at startup; batch recomputes additionally
//! generate a fresh ULID per run so interrupted and resumed batches stay
//! distinguishable in the logs.

use once_cell::sync::Lazy;
use ulid::Ulid;

static RUN_ID: Lazy<String> = Lazy::new(|| Ulid::new().to_string());

/// Returns the process-level run ID (same value for the process lifetime,
/// time-ordered, 26 chars).
#[inline]
pub fn get() -> &'static str {
    &RUN_ID
}

/// Generates a fresh ULID, e.g. one per `recalc_all` batch.
#[inline]
pub fn generate() -> String {
    Ulid::new().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_same_value() {
        assert_eq!(get(), get());
        assert_eq!(get().len(), 26);
    }

    #[test]
    fn generate_returns_unique_sortable_values() {
        let a = generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = generate();
        assert_ne!(a, b);
        assert!(a < b, "ULIDs should be time-ordered");
    }
}
