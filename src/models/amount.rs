//! Conversions between on-chain base units and human-readable decimal amounts.
//!
//! The token contract stores balances as unsigned integers scaled by a fixed
//! decimal exponent (6 for USDT on TRON). Comparisons are done on `Decimal`
//! values; the amount handed back to the chain is always floor-truncated so a
//! transfer can never exceed what was measured.
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Largest exponent accepted for a token. `10^18` still fits a `u64`, and
/// `Decimal` supports at most 28 fractional digits.
pub const MAX_DECIMALS: u32 = 18;

/// Convert a raw base-unit value into its decimal form.
///
/// Values beyond the 96-bit mantissa of `Decimal` (typically "infinite"
/// `uint256` approvals) saturate to `Decimal::MAX`.
pub fn from_base_units(raw: u128, decimals: u32) -> Decimal {
    i128::try_from(raw)
        .ok()
        .and_then(|v| Decimal::try_from_i128_with_scale(v, decimals).ok())
        .unwrap_or(Decimal::MAX)
}

/// Convert a decimal amount into base units, truncating toward zero.
///
/// Returns `None` for negative amounts or when `amount × 10^decimals` does
/// not fit.
pub fn to_base_units(amount: Decimal, decimals: u32) -> Option<u128> {
    if amount.is_sign_negative() || decimals > MAX_DECIMALS {
        return None;
    }
    let factor = Decimal::from(10u64.pow(decimals));
    amount.checked_mul(factor)?.floor().to_u128()
}
