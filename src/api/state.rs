use std::sync::Arc;

use tokio::sync::watch;

use crate::ledger::{LedgerStore, SweepPhase};
use crate::observability::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub ident: Arc<str>,
    pub store: LedgerStore,
    pub metrics: Arc<Metrics>,
    pub sweeper_phase: watch::Receiver<SweepPhase>,
}

impl AppState {
    pub fn new(
        ident: impl Into<Arc<str>>,
        store: LedgerStore,
        metrics: Arc<Metrics>,
        sweeper_phase: watch::Receiver<SweepPhase>,
    ) -> Self {
        Self {
            ident: ident.into(),
            store,
            metrics,
            sweeper_phase,
        }
    }
}
