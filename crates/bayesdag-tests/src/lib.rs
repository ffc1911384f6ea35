//! Integration and property tests for bayesdag.
//!
//! All tests live under `tests/`; this library target is intentionally empty.
