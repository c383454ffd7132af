//! Client runner: one session from connect to close.
//!
//! Two activities share the socket by direction:
//! - this task connects, registers, then idles on a heartbeat until shutdown
//!   or until the receive side ends;
//! - the receive task decodes envelopes, and a pump task hands them to the
//!   dispatcher in receipt order and writes replies through the shared writer.
//!
//! Nothing here retries or reconnects; a closed or failed session ends `run`.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use pathlink_core::error::{PathlinkError, Result};

use crate::config::ClientConfig;
use crate::dispatch::Dispatcher;
use crate::obs::ClientMetrics;
use crate::services::{EchoHandler, StaticJsonHandler};
use crate::transport::{Inbound, Session, SessionOptions, SessionWriter};

#[derive(Clone)]
pub struct Client {
    cfg: Arc<ClientConfig>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<ClientMetrics>,
}

impl Client {
    /// Build a client whose handlers come from config: a static JSON reply
    /// where one is configured, echo otherwise.
    pub fn new(cfg: ClientConfig) -> Self {
        let metrics = Arc::new(ClientMetrics::default());
        let dispatcher = Dispatcher::new(Arc::clone(&metrics));

        for path in &cfg.client.paths {
            match cfg.client.static_responses.get(path) {
                Some(doc) => dispatcher.register(Arc::new(StaticJsonHandler::new(path.clone(), doc.clone()))),
                None => dispatcher.register(Arc::new(EchoHandler::new(path.clone()))),
            }
        }

        Self::with_dispatcher(cfg, dispatcher, metrics)
    }

    /// Build a client around caller-provided handlers.
    pub fn with_dispatcher(cfg: ClientConfig, dispatcher: Dispatcher, metrics: Arc<ClientMetrics>) -> Self {
        // registered paths <-> handlers sanity check
        let handled = dispatcher.registered_paths();
        for p in &cfg.client.paths {
            if !handled.contains(p) {
                tracing::warn!(path = %p, "registered path has no handler; requests will get UNKNOWN_PATH");
            }
        }

        Self {
            cfg: Arc::new(cfg),
            dispatcher: Arc::new(dispatcher),
            metrics,
        }
    }

    pub fn cfg(&self) -> &ClientConfig {
        &self.cfg
    }

    pub fn metrics(&self) -> Arc<ClientMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Run one session until `shutdown` flips to `true` (or its sender is
    /// dropped), the coordinator closes the stream, or a fatal error occurs.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let span = tracing::info_span!(
            "session",
            client_id = %self.cfg.client.id,
            coordinator = %format!("{}:{}", self.cfg.coordinator.host, self.cfg.coordinator.port),
        );
        self.run_session(shutdown).instrument(span).await
    }

    async fn run_session(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let cfg = &self.cfg;
        let mut session = Session::new(SessionOptions::from(cfg.as_ref()), Arc::clone(&self.metrics));

        session.connect(&cfg.coordinator.host, cfg.coordinator.port).await?;

        let started = async {
            session.register(&cfg.client.id, &cfg.client.paths).await?;
            let inbound = session.start_receiving()?;
            let writer = session
                .writer()
                .ok_or_else(|| PathlinkError::Internal("writer missing after register".into()))?;
            Ok::<_, PathlinkError>((inbound, writer))
        }
        .await;

        let (inbound, writer) = match started {
            Ok(v) => v,
            Err(e) => {
                session.close().await;
                return Err(e);
            }
        };

        let mut pump = tokio::spawn(
            pump_inbound(inbound, Arc::clone(&self.dispatcher), writer).in_current_span(),
        );
        let state = session.subscribe_state();

        let mut heartbeat = tokio::time::interval(cfg.session.heartbeat_interval());
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let outcome = loop {
            if *shutdown.borrow_and_update() {
                tracing::info!("shutdown requested");
                break Ok(());
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        tracing::info!("shutdown switch dropped");
                        break Ok(());
                    }
                }

                res = session.wait_receiver() => {
                    if res.is_ok() {
                        tracing::info!("coordinator closed the connection");
                    }
                    break res;
                }

                res = &mut pump => {
                    // A clean pump exit means the inbound channel closed; the
                    // receive task holds the reason.
                    match flatten(res) {
                        Ok(()) => break session.wait_receiver().await,
                        Err(e) => break Err(e),
                    }
                }

                _ = heartbeat.tick() => {
                    tracing::trace!(state = ?*state.borrow(), "heartbeat");
                }
            }
        };

        // The pump may hold the writer mid-send; stop it before closing.
        if !pump.is_finished() {
            pump.abort();
            let _ = pump.await;
        }
        session.close().await;

        if let Err(e) = &outcome {
            tracing::error!(kind = e.kind().as_str(), error = %e, "session ended with error");
        }
        tracing::debug!(metrics = %self.metrics.render(), "session metrics");
        outcome
    }
}

fn flatten(res: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    res.map_err(|e| PathlinkError::Internal(format!("pump task failed: {e}")))?
}

/// Deliver inbound envelopes to the dispatcher in order and write replies.
///
/// Ends when the receive loop closes the channel, or with `WriteError` when
/// a reply cannot be sent.
async fn pump_inbound(
    mut inbound: mpsc::Receiver<Inbound>,
    dispatcher: Arc<Dispatcher>,
    writer: SessionWriter,
) -> Result<()> {
    while let Some(item) = inbound.recv().await {
        let env = match item {
            Ok(env) => env,
            Err(e) => {
                tracing::trace!(kind = e.kind().as_str(), "skipping undecodable frame");
                continue;
            }
        };

        if let Some(reply) = dispatcher.on_envelope(env).await {
            writer.send(&reply).await?;
        }
    }
    Ok(())
}

/// Convenience for tests and embedders: spawn `run` with its own shutdown switch.
pub fn spawn(client: Client) -> (watch::Sender<bool>, JoinHandle<Result<()>>) {
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { client.run(rx).await });
    (tx, handle)
}
