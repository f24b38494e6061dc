pub const BPS_SCALE: u32 = 10_000;
pub const BPS_SCALE_U128: u128 = 10_000u128;
pub const INDEX_SCALE_1E18: u128 = 1_000_000_000_000_000_000u128; // 1e18
pub const SECONDS_PER_YEAR: u128 = 365 * 24 * 60 * 60;
/// Safety ceiling on per-pool collateral factors (90%).
pub const MAX_COLLATERAL_FACTOR_BPS: u32 = 9_000;
