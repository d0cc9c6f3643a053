//! NextGCore S1AP daemon
//!
//! Hosts the MME S1AP task: consumes SCTP and MME-APP messages from its
//! queue, runs the release guard timers, and checkpoints state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use nextgcore_s1apd::{ChannelSink, Fsm, S1apConfig, S1apTask, S1apTaskMessage};
use ogs_core::log::{level_from_str, ogs_log_init};
use ogs_dbi::InMemoryKvStore;
use ogs_s1ap::{MmeAppMessage, SctpDataReq};

/// Longest wait on the task queue before re-checking the running flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// NextGCore S1AP - MME S1AP task
#[derive(Parser, Debug)]
#[command(name = "nextgcore-s1apd")]
#[command(author = "NextGCore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MME S1AP task")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/nextgcore/s1ap.yaml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Disable color output
    #[arg(long)]
    no_color: bool,
}

/// Outbound queues of the S1AP task
struct Peers {
    sctp_rx: Receiver<SctpDataReq>,
    mme_app_rx: Receiver<MmeAppMessage>,
}

/// S1AP application state
pub struct S1apApp {
    running: Arc<AtomicBool>,
    task_tx: Sender<S1apTaskMessage>,
    task_rx: Receiver<S1apTaskMessage>,
    task: Option<S1apTask<ChannelSink>>,
    peers: Option<Peers>,
}

impl S1apApp {
    pub fn new() -> Self {
        let (task_tx, task_rx) = channel();
        Self {
            running: Arc::new(AtomicBool::new(true)),
            task_tx,
            task_rx,
            task: None,
            peers: None,
        }
    }

    /// Load configuration and bring the task to OPERATIONAL
    pub fn init(&mut self, config_path: &str) -> Result<()> {
        log::info!("Initializing S1AP task...");

        let config = S1apConfig::load(config_path)
            .with_context(|| format!("invalid configuration in {}", config_path))?;
        log::debug!("S1AP configuration loaded: {:?}", config);

        let (sink, sctp_rx, mme_app_rx) = ChannelSink::new();
        let store = Arc::new(InMemoryKvStore::new());
        let mut task = S1apTask::new(config, store, sink);
        task.init();
        log::debug!("S1AP task state: {}", task.state());

        self.task = Some(task);
        self.peers = Some(Peers { sctp_rx, mme_app_rx });
        log::info!("S1AP task initialized successfully");
        Ok(())
    }

    /// Queue handle for the SCTP and MME-APP tasks
    pub fn sender(&self) -> Sender<S1apTaskMessage> {
        self.task_tx.clone()
    }

    /// Main loop: messages first, then due timers
    pub fn run(&mut self) -> Result<()> {
        log::info!("S1AP task running...");
        let task = self.task.as_mut().context("S1AP task not initialized")?;

        while self.running.load(Ordering::SeqCst) {
            let wait = task.next_timeout().map_or(POLL_INTERVAL, |d| d.min(POLL_INTERVAL));
            match self.task_rx.recv_timeout(wait) {
                Ok(S1apTaskMessage::Terminate) => {
                    log::info!("Terminate requested");
                    break;
                }
                Ok(msg) => {
                    // Handler failures are logged by the task
                    let _ = task.handle_message(msg);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            task.process_timers();
            if let Some(peers) = &self.peers {
                drain_peers(peers);
            }
        }

        log::info!("S1AP main loop exited");
        Ok(())
    }

    pub fn shutdown(&mut self) {
        log::info!("Shutting down S1AP task...");
        if let Some(task) = self.task.as_mut() {
            task.fini();
            log::debug!("S1AP task state: {}", task.state());
        }
        self.peers = None;
        log::info!("S1AP shutdown complete");
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Running flag for signal handlers
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }
}

impl Default for S1apApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Without SCTP and MME-APP tasks in this process, outbound traffic is logged
fn drain_peers(peers: &Peers) {
    for req in peers.sctp_rx.try_iter() {
        log::debug!("SCTP <- {} assoc {} stream {}", req.pdu.name(), req.assoc_id, req.stream);
    }
    for msg in peers.mme_app_rx.try_iter() {
        log::debug!("MME-APP <- {}", msg.name());
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    ogs_log_init(level_from_str(&args.log_level), args.no_color);

    log::info!("NextGCore S1AP v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Configuration: {}", args.config);

    let mut app = S1apApp::new();

    let running = app.running_flag();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    app.init(&args.config)?;
    app.run()?;
    app.shutdown();

    log::info!("NextGCore S1AP terminated");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
