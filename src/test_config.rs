//! Shared proptest settings.
//!
//! Codec and frame property tests run a few hundred cases each. Under Miri that takes far too
//! long, so every `proptest!` block in the crate takes its case count from here:
//!
//! ```ignore
//! use crate::test_config::miri_case_count;
//!
//! proptest! {
//!     #![proptest_config(ProptestConfig {
//!         cases: miri_case_count(),
//!         ..ProptestConfig::default()
//!     })]
//!     #[test]
//!     fn frame_roundtrip(raw in any::<i32>()) {
//!         // test body
//!     }
//! }
//! ```

/// Number of proptest cases: 5 under Miri, 256 otherwise.
#[must_use]
pub const fn miri_case_count() -> u32 {
    if cfg!(miri) {
        5
    } else {
        256
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miri_case_count_matches_build() {
        let expected = if cfg!(miri) { 5 } else { 256 };
        assert_eq!(miri_case_count(), expected);
    }
}
