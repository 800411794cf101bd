//! Runs one listener task per transport and routes commands to the engine.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::channel::{IncomingMessage, MessageStream, StopSignal, Transport, wait_for_stop};
use crate::engine::format::ACCESS_DENIED;
use crate::engine::{Command, CommandKind, Engine, parse_command};
use crate::error::ChannelError;

/// Owns the transports' listener tasks and their stop signal.
pub struct TransportManager {
    transports: Vec<Arc<dyn Transport>>,
    stop_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl TransportManager {
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            transports: Vec::new(),
            stop_tx,
            handles: Vec::new(),
        }
    }

    pub fn add(&mut self, transport: Arc<dyn Transport>) {
        self.transports.push(transport);
    }

    pub fn names(&self) -> Vec<&str> {
        self.transports.iter().map(|t| t.name()).collect()
    }

    /// Health-check and start every transport, then spawn its listener.
    pub async fn start(&mut self, engine: Arc<Engine>) -> Result<(), ChannelError> {
        for transport in &self.transports {
            if let Err(e) = transport.health_check().await {
                warn!(transport = transport.name(), error = %e, "Health check failed");
                return Err(e);
            }
            debug!(transport = transport.name(), "Health check passed");
            let stream = transport.start(self.stop_tx.subscribe()).await?;
            let handle = tokio::spawn(listen(
                Arc::clone(transport),
                Arc::clone(&engine),
                stream,
                self.stop_tx.subscribe(),
            ));
            info!(transport = transport.name(), "Transport listening");
            self.handles.push(handle);
        }
        Ok(())
    }

    /// Signal stop and wait for every listener to finish its current message.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Transport listener panicked");
            }
        }
        info!("All transports stopped");
    }
}

impl Default for TransportManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn listen(
    transport: Arc<dyn Transport>,
    engine: Arc<Engine>,
    mut stream: MessageStream,
    mut stop: StopSignal,
) {
    loop {
        tokio::select! {
            biased;
            _ = wait_for_stop(&mut stop) => break,
            next = stream.next() => match next {
                Some(msg) => {
                    handle_message(transport.as_ref(), &engine, &msg).await;
                }
                None => {
                    warn!(transport = transport.name(), "Message stream ended");
                    break;
                }
            },
        }
    }
    debug!(transport = transport.name(), "Listener exited");
}

/// Parse, gate, dispatch and reply to one inbound message.
///
/// Returns the reply that was sent, or `None` when the message was not a
/// command for us. Unrecognised slash words are ignored for every sender,
/// admins included, so other bots' commands in a shared room stay quiet.
pub async fn handle_message(
    transport: &dyn Transport,
    engine: &Engine,
    msg: &IncomingMessage,
) -> Option<String> {
    let (kind, args) = parse_command(&msg.text)?;
    if kind == CommandKind::Unknown {
        debug!(transport = transport.name(), user = %msg.user_id, "Ignoring unknown command");
        return None;
    }
    let cmd = Command::new(kind, args, transport.platform(), &msg.user_id, &msg.chat_id);

    let reply = if kind.requires_admin() && !transport.is_admin(&cmd.user_id) {
        warn!(
            transport = transport.name(),
            user = %cmd.user_id,
            command = ?kind,
            "Access denied"
        );
        ACCESS_DENIED.to_string()
    } else {
        engine.dispatch(&cmd).await
    };

    if let Err(e) = transport.respond(msg, &reply).await {
        warn!(transport = transport.name(), error = %e, "Failed to send reply");
    }
    Some(reply)
}
