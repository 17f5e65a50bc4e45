//! On-demand lookups behind the position details view.
//!
//! Everything here is a pure function of the current store contents and is
//! computed when a row is inspected, not on every store tick.

use crate::shared::store::LiveStore;
use crate::shared::types::{AnalyticsRecord, Position, Trade};

/// Entities that can be joined on token or pair address
pub trait AddressKeyed {
    fn token_address(&self) -> Option<&str>;
    fn pair_address(&self) -> Option<&str>;

    /// True when both sides share a pair address or a token address.
    fn shares_address_with<O>(&self, other: &O) -> bool
    where
        O: AddressKeyed + ?Sized,
    {
        let same = |a: Option<&str>, b: Option<&str>| matches!((a, b), (Some(a), Some(b)) if a == b);
        same(self.pair_address(), other.pair_address())
            || same(self.token_address(), other.token_address())
    }
}

macro_rules! impl_address_keyed {
    ($($entity:ty),*) => {
        $(
            impl AddressKeyed for $entity {
                fn token_address(&self) -> Option<&str> {
                    self.token_address.as_deref()
                }

                fn pair_address(&self) -> Option<&str> {
                    self.pair_address.as_deref()
                }
            }
        )*
    };
}

impl_address_keyed!(Position, Trade, AnalyticsRecord);

/// `(last - entry) / |entry| * 100`, or `None` if either is unknown or entry is zero.
pub fn percent_change(last: Option<f64>, entry: Option<f64>) -> Option<f64> {
    match (last, entry) {
        (Some(last), Some(entry)) if entry != 0.0 => {
            Some((last - entry) / entry.abs() * 100.0).filter(|pct| pct.is_finite())
        }
        _ => None,
    }
}

/// Prefer the store's enrichment, fall back to the raw price fields.
pub fn position_change_pct(position: &Position) -> Option<f64> {
    position
        .change_pct
        .or_else(|| percent_change(position.last_price, position.entry))
}

/// Most recently evaluated analytics record sharing a pair or token address.
pub fn best_analytics_for<'a, K>(
    entity: &K,
    analytics: impl IntoIterator<Item = &'a AnalyticsRecord>,
) -> Option<&'a AnalyticsRecord>
where
    K: AddressKeyed + ?Sized,
{
    analytics
        .into_iter()
        .filter(|record| record.shares_address_with(entity))
        .fold(None, |best: Option<&AnalyticsRecord>, record| match best {
            Some(best) if best.evaluated_at >= record.evaluated_at => Some(best),
            _ => Some(record),
        })
}

/// BUY trade on the position's pair whose execution time is closest to the
/// position opening. Trades with an unknown time only win when nothing else matches.
pub fn originating_buy_trade<'a>(
    position: &Position,
    trades: impl IntoIterator<Item = &'a Trade>,
) -> Option<&'a Trade> {
    let pair = position.pair_address.as_deref()?;

    trades
        .into_iter()
        .filter(|trade| trade.side.is_buy() && trade.pair_address.as_deref() == Some(pair))
        .min_by_key(|trade| match (trade.created_at, position.opened_at) {
            (Some(created), Some(opened)) => (created - opened).num_milliseconds().unsigned_abs(),
            _ => u64::MAX,
        })
}

/// Everything the details panel shows for one position
#[derive(Debug, Clone, PartialEq)]
pub struct PositionDetails {
    pub position: Position,
    pub change_pct: Option<f64>,
    pub analytics: Option<AnalyticsRecord>,
    pub entry_trade: Option<Trade>,
}

/// Resolve the details of the position keyed by `address` (token or pair).
pub fn position_details(store: &LiveStore, address: &str) -> Option<PositionDetails> {
    let position = store.position_by_address(address)?;

    Some(PositionDetails {
        change_pct: position_change_pct(position),
        analytics: best_analytics_for(position, store.analytics()).cloned(),
        entry_trade: originating_buy_trade(position, store.trades()).cloned(),
        position: position.clone(),
    })
}
