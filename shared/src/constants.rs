//! Engine defaults, declared once instead of re-derived at call sites.

/// Time-of-day at which a new allowance cycle begins when the operator
/// has not configured one.
pub const DEFAULT_RESET_TIME: &str = "00:00";

/// Allowance granted per reset cycle when neither the wheel config nor
/// the user record carries a value.
pub const DEFAULT_DAILY_SPINS: u32 = 3;

/// Minimum spacing between successful spins, in minutes. Zero disables
/// the cooldown entirely.
pub const DEFAULT_SPIN_COOLDOWN_MINUTES: u64 = 0;

/// Base shipping fee applied to non-empty orders, in VND.
pub const BASE_SHIPPING_FEE: u64 = 30_000;
