//! CLI transport: stdin/stdout REPL for running commands locally.

use std::io::BufRead;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use super::channel::{IncomingMessage, MessageStream, StopSignal, Transport, receiver_stream};
use crate::engine::{Notifier, Platform};
use crate::error::ChannelError;

/// Identity given to every line typed at the terminal.
const LOCAL_USER: &str = "local";

type Input = Box<dyn BufRead + Send>;

/// Reads commands from stdin and writes replies to stdout. Whoever holds
/// the terminal is an admin.
///
/// Input is read on a detached OS thread: a blocking stdin read cannot be
/// cancelled, and a runtime-owned blocking task would hold up process exit
/// until the next line arrived.
pub struct CliTransport {
    input: Mutex<Option<Input>>,
}

impl CliTransport {
    pub fn new() -> Self {
        Self::with_input(Box::new(std::io::BufReader::new(std::io::stdin())))
    }

    /// Read commands from `input` instead of stdin.
    pub fn with_input(input: Input) -> Self {
        Self {
            input: Mutex::new(Some(input)),
        }
    }
}

impl Default for CliTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for CliTransport {
    fn name(&self) -> &str {
        "cli"
    }

    async fn send_notification(&self, text: &str) -> Result<(), ChannelError> {
        eprintln!("\n{text}\n");
        Ok(())
    }
}

#[async_trait]
impl Transport for CliTransport {
    fn platform(&self) -> Platform {
        Platform::Cli
    }

    fn is_admin(&self, _user_id: &str) -> bool {
        true
    }

    async fn start(&self, _stop: StopSignal) -> Result<MessageStream, ChannelError> {
        let input = self
            .input
            .lock()
            .ok()
            .and_then(|mut input| input.take())
            .ok_or_else(|| ChannelError::StartupFailed {
                name: "cli".into(),
                reason: "input already consumed".into(),
            })?;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        // Never joined; the listener stops on the stop signal and the
        // thread dies with the process.
        std::thread::Builder::new()
            .name("cli-input".into())
            .spawn(move || read_lines(input, tx))
            .map_err(|e| ChannelError::StartupFailed {
                name: "cli".into(),
                reason: e.to_string(),
            })?;

        Ok(receiver_stream(rx))
    }

    async fn respond(&self, _msg: &IncomingMessage, text: &str) -> Result<(), ChannelError> {
        println!("\n{text}\n");
        eprint!("> ");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

fn read_lines(input: Input, tx: UnboundedSender<IncomingMessage>) {
    eprint!("> ");
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Error reading stdin: {}", e);
                return;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            eprint!("> ");
            continue;
        }
        let msg = IncomingMessage::new("cli", LOCAL_USER, LOCAL_USER, line);
        if tx.send(msg).is_err() {
            return;
        }
    }
}
