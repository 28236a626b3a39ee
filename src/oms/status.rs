//! Order status transition guard.

use crate::orderbook::OrderStatus;

/// Verdict of [`is_valid_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// Legal forward move.
    Ok,
    /// Target equals the current status.
    Same,
    /// Backward move between live statuses.
    Invalid,
    /// Current status is terminal.
    Terminal,
}

/// Position on the forward path `Untouched -> Pending -> PartiallyFilled ->
/// Filled`. `Cancelled` sits off the path.
fn rank(status: OrderStatus) -> Option<u8> {
    match status {
        OrderStatus::Untouched => Some(0),
        OrderStatus::Pending => Some(1),
        OrderStatus::PartiallyFilled => Some(2),
        OrderStatus::Filled => Some(3),
        OrderStatus::Cancelled => None,
    }
}

/// Classifies a move from `from` to `to`.
///
/// Any live status may move forward along the path or to `Cancelled`.
/// `Same` is checked first, so a terminal status compared with itself is
/// `Same` rather than `Terminal`.
pub fn is_valid_change(from: OrderStatus, to: OrderStatus) -> StatusChange {
    if from == to {
        return StatusChange::Same;
    }
    if from.is_terminal() {
        return StatusChange::Terminal;
    }
    match (rank(from), rank(to)) {
        (_, None) => StatusChange::Ok,
        (Some(a), Some(b)) if b > a => StatusChange::Ok,
        _ => StatusChange::Invalid,
    }
}
