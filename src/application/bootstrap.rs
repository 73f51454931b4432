use super::cart_store::CartStore;
use super::ledger::Ledger;
use super::registry::PaymentRegistry;
use super::workflow::{ConfirmationWorkflow, PaymentPolicy};
use crate::config::Settings;
use crate::domain::ports::{NotifierRef, SnapshotStoreRef};
use crate::error::Result;
use crate::infrastructure::in_memory::{InMemoryCatalog, StaticAdmins};
use std::sync::Arc;

/// Wires the payment core from settings and restores the last snapshot.
///
/// Payments restored in `awaiting_screenshot` get their expiry timers back.
pub async fn bootstrap(
    settings: &Settings,
    store: SnapshotStoreRef,
    notifier: NotifierRef,
) -> Result<ConfirmationWorkflow> {
    settings.validate()?;
    let snapshot = store.load().await?;

    let ledger = Arc::new(Ledger::new(store.clone()));
    ledger
        .restore(snapshot.accounts, snapshot.transactions)
        .await;

    let registry = Arc::new(PaymentRegistry::new(store));
    registry.restore(snapshot.pending_payments).await;

    let catalog = Arc::new(InMemoryCatalog::new(settings.catalog.clone()));
    let carts = Arc::new(CartStore::new(catalog));
    let admins = Arc::new(StaticAdmins::new(settings.admin_ids.iter().copied()));

    let workflow = ConfirmationWorkflow::new(
        ledger,
        carts,
        registry,
        notifier,
        admins,
        PaymentPolicy::from(settings),
    );
    workflow.resume().await;
    Ok(workflow)
}
