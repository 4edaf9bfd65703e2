//! Shutdown coordination driven by OS signals.
//!
//! The first terminating signal only flips the coordinator to
//! shutdown-requested; the event loop notices at its next iteration. A
//! second one, or any unexpected signal, ends the process at once.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{error, info};

const IDLE: u8 = 0;
const REQUESTED: u8 = 1;
const FORCE_EXIT: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownState {
    Idle,
    Requested,
    ForceExit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalClass {
    Terminating,
    Unexpected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalAction {
    ShutdownRequested,
    ForceExit,
}

#[derive(Clone, Debug, Default)]
pub struct ShutdownCoordinator {
    state: Arc<AtomicU8>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ShutdownState {
        match self.state.load(Ordering::Acquire) {
            IDLE => ShutdownState::Idle,
            REQUESTED => ShutdownState::Requested,
            _ => ShutdownState::ForceExit,
        }
    }

    pub fn is_requested(&self) -> bool {
        self.state() != ShutdownState::Idle
    }

    /// Requests a cooperative shutdown without counting as a signal.
    pub fn request(&self) {
        let _ = self
            .state
            .compare_exchange(IDLE, REQUESTED, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Lock-free transition; never blocks or allocates.
    pub fn on_signal(&self, class: SignalClass) -> SignalAction {
        if class == SignalClass::Terminating
            && self
                .state
                .compare_exchange(IDLE, REQUESTED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            return SignalAction::ShutdownRequested;
        }
        self.state.store(FORCE_EXIT, Ordering::Release);
        SignalAction::ForceExit
    }
}

fn watched_signals() -> [(SignalKind, &'static str, SignalClass); 7] {
    [
        (SignalKind::interrupt(), "SIGINT", SignalClass::Terminating),
        (SignalKind::terminate(), "SIGTERM", SignalClass::Terminating),
        (SignalKind::quit(), "SIGQUIT", SignalClass::Terminating),
        (
            SignalKind::from_raw(nix::libc::SIGABRT),
            "SIGABRT",
            SignalClass::Terminating,
        ),
        (SignalKind::hangup(), "SIGHUP", SignalClass::Unexpected),
        (SignalKind::user_defined1(), "SIGUSR1", SignalClass::Unexpected),
        (SignalKind::user_defined2(), "SIGUSR2", SignalClass::Unexpected),
    ]
}

/// Installs signal listeners feeding `coordinator`. Must run inside a
/// tokio runtime.
pub fn spawn_signal_listeners(
    coordinator: &ShutdownCoordinator,
) -> std::io::Result<Vec<JoinHandle<()>>> {
    let mut handles = Vec::new();
    for (kind, name, class) in watched_signals() {
        let mut stream = signal(kind)?;
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            while stream.recv().await.is_some() {
                match coordinator.on_signal(class) {
                    SignalAction::ShutdownRequested => {
                        info!(signal = name, "shutdown requested");
                    }
                    SignalAction::ForceExit => {
                        match class {
                            SignalClass::Terminating => {
                                error!(signal = name, "second termination signal, exiting now")
                            }
                            SignalClass::Unexpected => {
                                error!(signal = name, "exiting on unexpected signal")
                            }
                        }
                        std::process::exit(1);
                    }
                }
            }
        }));
    }
    Ok(handles)
}
