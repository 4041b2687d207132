//! C3: PositionTracker. Signed net position with weighted-average entry,
//! mutated on fills and periodically overwritten by venue truth.
//! Exclusively owned by the tick loop (§5). Realized PnL is tracked
//! purely for the persisted-event record and metrics surface — it never
//! feeds back into the decision engine, which consumes position size only
//! (§4.3).

use rust_decimal::Decimal;

use quant_strategy::Side;

use crate::venue::types::VenuePosition;

#[derive(Debug, Clone, Default)]
pub struct PositionTracker {
    size: Decimal,
    entry_px: Decimal,
    realized_pnl: Decimal,
    last_update_ms: i64,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> Decimal {
        self.size
    }

    pub fn entry_px(&self) -> Decimal {
        self.entry_px
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    pub fn unrealized_pnl(&self, mark_px: Decimal) -> Decimal {
        (mark_px - self.entry_px) * self.size
    }

    /// Updates net size and the weighted-average entry price. A fill that
    /// extends the existing position (or opens from flat) blends into the
    /// average entry; a fill that reduces or flips the position realizes
    /// PnL on the closed portion first.
    pub fn apply_fill(&mut self, side: Side, price: Decimal, size: Decimal, ts_ms: i64) {
        let signed_delta = match side {
            Side::Buy => size,
            Side::Sell => -size,
        };
        let old_size = self.size;
        let new_size_if_simple = old_size + signed_delta;

        let extends_position = old_size == Decimal::ZERO
            || (old_size > Decimal::ZERO && signed_delta > Decimal::ZERO)
            || (old_size < Decimal::ZERO && signed_delta < Decimal::ZERO);

        if extends_position {
            let old_abs = old_size.abs();
            let total = old_abs + size;
            if total > Decimal::ZERO {
                self.entry_px = (self.entry_px * old_abs + price * size) / total;
            }
            self.size = new_size_if_simple;
        } else {
            let old_abs = old_size.abs();
            let closing_size = size.min(old_abs);
            let direction = if old_size > Decimal::ZERO { Decimal::ONE } else { -Decimal::ONE };
            self.realized_pnl += closing_size * (price - self.entry_px) * direction;

            let remaining_fill = size - closing_size;
            if remaining_fill > Decimal::ZERO {
                // Flipped through flat: the remainder opens a new position in the fill's direction.
                self.entry_px = price;
                self.size = match side {
                    Side::Buy => remaining_fill,
                    Side::Sell => -remaining_fill,
                };
            } else {
                self.size = new_size_if_simple;
                if self.size == Decimal::ZERO {
                    self.entry_px = Decimal::ZERO;
                }
            }
        }
        self.last_update_ms = ts_ms;
    }

    /// Overwrites with venue truth; reports flat when no venue position
    /// exists (§4.3).
    pub fn sync_from_venue(&mut self, position: Option<VenuePosition>, now_ms: i64) {
        match position {
            Some(p) => {
                self.size = p.size;
                self.entry_px = p.entry_px;
            }
            None => {
                self.size = Decimal::ZERO;
                self.entry_px = Decimal::ZERO;
            }
        }
        self.last_update_ms = now_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn opening_fill_sets_entry_price() {
        let mut pos = PositionTracker::new();
        pos.apply_fill(Side::Buy, dec!(100), dec!(1), 0);
        assert_eq!(pos.size(), dec!(1));
        assert_eq!(pos.entry_px(), dec!(100));
    }

    #[test]
    fn extending_fill_blends_weighted_average_entry() {
        let mut pos = PositionTracker::new();
        pos.apply_fill(Side::Buy, dec!(100), dec!(1), 0);
        pos.apply_fill(Side::Buy, dec!(110), dec!(1), 1);
        assert_eq!(pos.size(), dec!(2));
        assert_eq!(pos.entry_px(), dec!(105));
    }

    #[test]
    fn reducing_fill_realizes_pnl_without_moving_entry() {
        let mut pos = PositionTracker::new();
        pos.apply_fill(Side::Buy, dec!(100), dec!(2), 0);
        pos.apply_fill(Side::Sell, dec!(110), dec!(1), 1);
        assert_eq!(pos.size(), dec!(1));
        assert_eq!(pos.entry_px(), dec!(100));
        assert_eq!(pos.realized_pnl(), dec!(10));
    }

    #[test]
    fn flipping_fill_resets_entry_to_new_fill_price() {
        let mut pos = PositionTracker::new();
        pos.apply_fill(Side::Buy, dec!(100), dec!(1), 0);
        pos.apply_fill(Side::Sell, dec!(110), dec!(3), 1);
        assert_eq!(pos.size(), dec!(-2));
        assert_eq!(pos.entry_px(), dec!(110));
        assert_eq!(pos.realized_pnl(), dec!(10));
    }

    #[test]
    fn sync_from_venue_none_reports_flat() {
        let mut pos = PositionTracker::new();
        pos.apply_fill(Side::Buy, dec!(100), dec!(1), 0);
        pos.sync_from_venue(None, 5);
        assert_eq!(pos.size(), Decimal::ZERO);
        assert_eq!(pos.entry_px(), Decimal::ZERO);
    }
}
