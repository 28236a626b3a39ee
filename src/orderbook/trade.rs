use super::order::{MarketId, Side};
use serde::{Deserialize, Serialize};

/// A single match between a resting maker and an incoming taker.
///
/// Trades are immutable once emitted. `seq_id` comes from the process-wide
/// trade counter; `event_seq_id` identifies the inbound command that produced
/// the trade within its book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Globally unique, strictly increasing trade id.
    pub seq_id: u64,
    /// Market of both orders.
    pub market_id: MarketId,
    /// Execution price: the maker's price.
    pub price: u64,
    /// Executed base amount.
    pub volume: u64,
    /// `price * volume` in quote units.
    pub quote_volume: u64,
    /// Sell order id.
    pub ask_id: u64,
    /// Buy order id.
    pub bid_id: u64,
    /// Sell order owner.
    pub ask_owner: u64,
    /// Buy order owner.
    pub bid_owner: u64,
    /// Side of the incoming order.
    pub taker_side: Side,
    /// Fee charged to the seller, in quote units.
    #[serde(default)]
    pub ask_fee_amount: u64,
    /// Fee charged to the buyer, in base units.
    #[serde(default)]
    pub bid_fee_amount: u64,
    /// Execution time, unix milliseconds.
    pub timestamp: u64,
    /// Sequence of the command that produced this trade.
    pub event_seq_id: u64,
}

impl Trade {
    /// Id of the order that was resting.
    #[inline]
    pub fn maker_id(&self) -> u64 {
        match self.taker_side {
            Side::Buy => self.ask_id,
            Side::Sell => self.bid_id,
        }
    }

    /// Id of the incoming order.
    #[inline]
    pub fn taker_id(&self) -> u64 {
        match self.taker_side {
            Side::Buy => self.bid_id,
            Side::Sell => self.ask_id,
        }
    }

    /// Whether any fee was charged.
    #[inline]
    pub fn has_fees(&self) -> bool {
        self.ask_fee_amount > 0 || self.bid_fee_amount > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_trade(taker_side: Side) -> Trade {
        Trade {
            seq_id: 1,
            market_id: "btcusdt".to_string(),
            price: 1_000,
            volume: 10,
            quote_volume: 10_000,
            ask_id: 11,
            bid_id: 22,
            ask_owner: 1,
            bid_owner: 2,
            taker_side,
            ask_fee_amount: 0,
            bid_fee_amount: 0,
            timestamp: 0,
            event_seq_id: 3,
        }
    }

    #[test]
    fn test_maker_and_taker_ids() {
        let buy = make_trade(Side::Buy);
        assert_eq!(buy.maker_id(), 11);
        assert_eq!(buy.taker_id(), 22);

        let sell = make_trade(Side::Sell);
        assert_eq!(sell.maker_id(), 22);
        assert_eq!(sell.taker_id(), 11);
        assert!(!sell.has_fees());
    }
}
