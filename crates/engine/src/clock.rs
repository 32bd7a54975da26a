//! The engine-global monotonic clock (§3, §4.4).

use std::sync::atomic::{AtomicU64, Ordering};

static CLOCK: AtomicU64 = AtomicU64::new(0);

/// The current clock value, without advancing it. Used as a transaction's
/// `readVersion` at creation time.
pub fn current() -> u64 {
    CLOCK.load(Ordering::Acquire)
}

/// Advances the clock by one and returns the new value: the
/// `commitVersion = ++clock` step of Phase 3.
pub fn advance() -> u64 {
    CLOCK.fetch_add(1, Ordering::AcqRel) + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_is_monotone() {
        let a = advance();
        let b = advance();
        assert!(b > a);
        assert_eq!(current(), b);
    }
}
