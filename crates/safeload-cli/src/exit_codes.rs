//! Exit codes for the `safeload` binary.
//!
//! These codes are part of the public contract. Failures that carry a
//! `GateError` or a `Rejection` use its own `exit_code()`:
//! 3 revoked, 4 verification failed, 5 trust service unreachable.

pub const SUCCESS: i32 = 0;
pub const CONFIG_ERROR: i32 = 1; // Bad arguments, unreadable input, policy unavailable
pub const DENIED: i32 = 4; // Download would be cancelled by the gate
