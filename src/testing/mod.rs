//! Testability harness utilities.
//!
//! Deterministic signal synthesis and in-memory WAV encoding are shared by
//! the warm-up dry run, the CLI and the test suites; the stubs and the
//! reference species set let tests drive a full orchestrator without a
//! trained artifact or a live record store.

pub mod reference;
pub mod stubs;
pub mod synth;
pub mod wav;
