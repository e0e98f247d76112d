//! Process wiring: one store shared by the UDP listener, the retention
//! sweeper and the query API, torn down in order by [`Service::close`]

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::api::{self, AppState};
use crate::config::Config;
use crate::ingest::{Ingestor, UdpListener};
use crate::ledger::{LedgerError, LedgerStore, RetentionSweeper};
use crate::observability::Metrics;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Failed to bind {listener} listener on {addr}: {source}")]
    Bind {
        listener: &'static str,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub struct Service {
    store: LedgerStore,
    metrics: Arc<Metrics>,
    udp_addr: SocketAddr,
    api_addr: SocketAddr,
    listener: JoinHandle<()>,
    sweeper: JoinHandle<()>,
    api: JoinHandle<io::Result<()>>,
}

impl Service {
    /// Open the store, bind both listeners and start the background tasks
    pub async fn start(config: &Config) -> Result<Self, ServiceError> {
        let store = LedgerStore::open_with(&config.store.path, config.store_options())?;
        let metrics = Arc::new(Metrics::new());

        let udp = UdpListener::bind(
            config.udp.bind_addr,
            Ingestor::new(store.clone(), metrics.clone()),
        )
        .await
        .map_err(|source| ServiceError::Bind {
            listener: "UDP",
            addr: config.udp.bind_addr,
            source,
        })?;
        let udp_addr = udp.local_addr()?;

        let tcp = TcpListener::bind(config.api.bind_addr)
            .await
            .map_err(|source| ServiceError::Bind {
                listener: "API",
                addr: config.api.bind_addr,
                source,
            })?;
        let api_addr = tcp.local_addr()?;

        let sweeper = RetentionSweeper::new(
            store.clone(),
            config.retention_policy(),
            metrics.clone(),
        );
        let state = AppState::new(
            config.ident.as_str(),
            store.clone(),
            metrics.clone(),
            sweeper.subscribe(),
        );

        let api = tokio::spawn(api::serve(tcp, state, store.shutdown_token()));
        let sweeper = sweeper.spawn();
        let listener = udp.spawn();

        info!(
            ident = %config.ident,
            %udp_addr,
            %api_addr,
            path = %config.store.path.display(),
            "Service started"
        );

        Ok(Self {
            store,
            metrics,
            udp_addr,
            api_addr,
            listener,
            sweeper,
            api,
        })
    }

    pub fn udp_addr(&self) -> SocketAddr {
        self.udp_addr
    }

    pub fn api_addr(&self) -> SocketAddr {
        self.api_addr
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Stop ingestion and sweeping, drain the API, then flush the store
    pub async fn close(self) -> Result<(), ServiceError> {
        info!("Shutting down");
        self.store.shutdown_token().cancel();

        if let Err(err) = self.listener.await {
            error!(error = %err, "UDP listener task failed");
        }
        if let Err(err) = self.sweeper.await {
            error!(error = %err, "Retention sweeper task failed");
        }
        match self.api.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(error = %err, "Query API failed"),
            Err(err) => error!(error = %err, "Query API task failed"),
        }

        self.store.close()?;
        info!("Shutdown complete");
        Ok(())
    }
}
