//! In-memory [`ServerControl`] that records every call.

use super::{ServerControl, ServerLine};
use crate::utils::{PregenError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Broadcast(String),
    Stop,
    Execute(String),
    WaitForStart,
    Start,
}

pub struct RecordingHost {
    calls: Mutex<Vec<HostCall>>,
    failing: Mutex<Vec<HostCall>>,
    running: AtomicBool,
    generation: AtomicU64,
    echoes: Mutex<Vec<(String, String, mpsc::UnboundedSender<ServerLine>)>>,
}

impl RecordingHost {
    /// A host whose server is already running
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(Vec::new()),
            running: AtomicBool::new(true),
            generation: AtomicU64::new(1),
            echoes: Mutex::new(Vec::new()),
        }
    }

    /// A line printed by the server as launched right now
    pub fn line(&self, text: &str) -> ServerLine {
        ServerLine::new(self.generation(), text)
    }

    /// The next time `command` is executed, the current server prints `text` to `tx`
    pub fn echo_on_execute(
        &self,
        command: &str,
        text: &str,
        tx: mpsc::UnboundedSender<ServerLine>,
    ) {
        self.echoes
            .lock()
            .unwrap()
            .push((command.to_string(), text.to_string(), tx));
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::Broadcast(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &HostCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    /// Make the next occurrence of `call` fail
    pub fn fail_on(&self, call: HostCall) {
        self.failing.lock().unwrap().push(call);
    }

    fn record(&self, call: HostCall) -> Result<()> {
        self.calls.lock().unwrap().push(call.clone());
        let mut failing = self.failing.lock().unwrap();
        if let Some(index) = failing.iter().position(|c| *c == call) {
            failing.remove(index);
            return Err(PregenError::Process(format!("injected failure on {:?}", call)));
        }
        Ok(())
    }
}

#[async_trait]
impl ServerControl for RecordingHost {
    async fn broadcast(&self, message: &str) {
        let _ = self.record(HostCall::Broadcast(message.to_string()));
    }

    async fn stop(&self) -> Result<()> {
        self.record(HostCall::Stop)
    }

    async fn execute(&self, command: &str) -> Result<()> {
        self.record(HostCall::Execute(command.to_string()))?;
        let mut echoes = self.echoes.lock().unwrap();
        if let Some(index) = echoes.iter().position(|(trigger, _, _)| trigger == command) {
            let (_, text, tx) = echoes.remove(index);
            let _ = tx.send(self.line(&text));
        }
        Ok(())
    }

    async fn wait_for_start(&self) -> Result<()> {
        self.record(HostCall::WaitForStart)?;
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.record(HostCall::Start)?;
        self.running.store(true, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}
