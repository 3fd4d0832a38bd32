//! `snipe attempt <item-id>` — run the purchase decision gate for one item.

use crate::cli::output;
use crate::model::PurchaseOutcome;
use crate::store::{NoCheckout, StaticFlags};
use anyhow::Result;
use std::sync::Arc;

/// Run the gate with the placeholder checkout and print the result.
pub async fn run(item_id: &str, max_price: f64, token: &str) -> Result<()> {
    let engine = super::engine_from_env()?;
    let flags = Arc::new(StaticFlags {
        sniping: engine.config.sniping_enabled,
    });
    let controller = engine.purchase_controller(flags, Arc::new(NoCheckout));

    let result = controller.attempt(item_id, max_price, token).await;
    if output::is_json() {
        output::print_json(&result);
    } else if !output::is_quiet() {
        println!("Item {}: {}", result.item_id, result.outcome.as_str());
        if !result.detail.is_empty() {
            println!("  {}", result.detail);
        }
    }

    if result.outcome == PurchaseOutcome::Success {
        Ok(())
    } else {
        anyhow::bail!("purchase not completed: {}", result.outcome.as_str())
    }
}
