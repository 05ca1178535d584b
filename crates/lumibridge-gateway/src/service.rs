//! Service loop.
//!
//! Owns the engine task. The engine is handed to a single spawned task
//! together with the two inbound channels, so every datagram and bus
//! command is serialized through one owner and the registry needs no lock.

use std::net::SocketAddr;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use lumibridge_core::io::{DatagramSink, EnvelopePublisher};
use lumibridge_core::BusCommand;

use crate::engine::ProtocolEngine;

/// Handle to the running engine task.
pub struct GatewayService {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl GatewayService {
    /// Spawn the engine task. Discovery is kicked off immediately.
    pub fn start<S, P>(
        engine: ProtocolEngine<S, P>,
        datagrams: mpsc::Receiver<(Vec<u8>, SocketAddr)>,
        commands: mpsc::Receiver<BusCommand>,
    ) -> Self
    where
        S: DatagramSink + 'static,
        P: EnvelopePublisher + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run(engine, datagrams, commands, shutdown_rx));
        Self {
            shutdown: shutdown_tx,
            handle,
        }
    }

    /// Stop the engine task and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}

async fn run<S: DatagramSink, P: EnvelopePublisher>(
    mut engine: ProtocolEngine<S, P>,
    mut datagrams: mpsc::Receiver<(Vec<u8>, SocketAddr)>,
    mut commands: mpsc::Receiver<BusCommand>,
    mut shutdown: oneshot::Receiver<()>,
) {
    engine.discover().await;
    loop {
        tokio::select! {
            received = datagrams.recv() => match received {
                Some((payload, source)) => engine.handle_datagram(&payload, source).await,
                None => break,
            },
            received = commands.recv() => match received {
                Some(command) => engine.handle_command(command).await,
                None => break,
            },
            _ = &mut shutdown => break,
        }
    }
    info!("gateway service stopped");
}
