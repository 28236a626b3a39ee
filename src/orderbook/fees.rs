//! Maker/taker fee schedule applied to every match.

use serde::{Deserialize, Serialize};

const BPS_DENOMINATOR: u128 = 10_000;

/// Maker and taker fees in basis points (1 bps = 0.01%).
///
/// Fees are charged on what each side receives: the seller pays in quote
/// units, the buyer in base units.
///
/// # Examples
///
/// ```
/// use exchange_core::orderbook::FeeSchedule;
///
/// let schedule = FeeSchedule::new(10, 20);
/// assert_eq!(schedule.fee(1_000_000, false), 2_000);
/// assert_eq!(schedule.fee(1_000_000, true), 1_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Fee for the resting side, in basis points.
    #[serde(default)]
    pub maker_fee_bps: u32,
    /// Fee for the incoming side, in basis points.
    #[serde(default)]
    pub taker_fee_bps: u32,
}

impl FeeSchedule {
    /// Create a new fee schedule
    #[must_use = "FeeSchedule does nothing unless used"]
    pub fn new(maker_fee_bps: u32, taker_fee_bps: u32) -> Self {
        Self {
            maker_fee_bps,
            taker_fee_bps,
        }
    }

    /// Schedule charging nothing.
    #[must_use]
    pub fn zero_fee() -> Self {
        Self::default()
    }

    /// Fee owed on `amount` units. Rounds toward zero.
    #[must_use = "Fee calculation result must be used"]
    #[inline]
    pub fn fee(&self, amount: u64, is_maker: bool) -> u64 {
        let bps = if is_maker {
            self.maker_fee_bps
        } else {
            self.taker_fee_bps
        };
        let fee = (amount as u128) * (bps as u128) / BPS_DENOMINATOR;
        u64::try_from(fee).unwrap_or(u64::MAX)
    }

    #[must_use]
    #[inline]
    pub fn is_zero_fee(&self) -> bool {
        self.maker_fee_bps == 0 && self.taker_fee_bps == 0
    }
}
