//! Shared proptest strategies for schema tests.

use proptest::prelude::*;

/// Strategy for generating arbitrary column-like names.
pub fn arb_name() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,19}"
}

/// Strategy for generating finite, non-negative amounts.
pub fn arb_amount() -> impl Strategy<Value = f64> {
    0.0f64..1.0e7
}
