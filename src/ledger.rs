//! The stock ledger.
//!
//! Every successful stock create or update appends one [`StockTimeline`] row
//! describing the stock row as written. The append shares the caller's
//! transaction, so a write that is rolled back leaves no ledger entry and a
//! ledger failure undoes the stock write.

use crate::model::{NewStockTimeline, Stock, StockTimeline};
use crate::store::{StoreError, StoreTx};
use chrono::{DateTime, Utc};

/// Ledger row for `stock` as it stands at `now`.
pub fn timeline_entry_for(stock: &Stock, now: DateTime<Utc>) -> NewStockTimeline {
    NewStockTimeline {
        vending_machine: stock.vending_machine,
        product: stock.product,
        quantity: stock.quantity,
        timestamp: now,
    }
}

/// Append the ledger entry for a stock row that was just written in `tx`.
///
/// Called once per write, whether or not the quantity changed.
pub fn record_stock_write(
    tx: &mut dyn StoreTx,
    stock: &Stock,
) -> Result<StockTimeline, StoreError> {
    let entry = tx.insert_timeline(&timeline_entry_for(stock, Utc::now()))?;

    log::debug!(
        "stock {} ledger entry {}: machine {} product {} quantity {}",
        stock.id,
        entry.id,
        entry.vending_machine,
        entry.product,
        entry.quantity
    );
    #[cfg(feature = "metrics")]
    crate::metrics::METRICS.record_timeline_entry();

    Ok(entry)
}
