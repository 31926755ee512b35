//! Application orchestration for the Prahari daemon
//!
//! Wires the store, model, pager, and session together, installs the
//! shutdown signal handler, and runs the feed loop to completion. The
//! termination path checkpoints the database exactly once (inside the
//! session) before the process exits.

use crate::config::AppConfig;
use crate::error::Result;
use crate::model::LogisticModel;
use crate::pager::PagerClient;
use crate::session::Session;
use crate::store::PatientStore;
use log::info;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Main application structure
pub struct App {
    config: AppConfig,
    session: Session<LogisticModel>,
    shutdown: Arc<AtomicBool>,
    evaluate: bool,
}

impl App {
    /// Load the model, bootstrap patient state, and wire up the session.
    pub fn new(config: AppConfig, evaluate: bool) -> Result<Self> {
        info!("Loading model artifact from {}", config.model.path);
        let model = LogisticModel::from_file(&config.model.path)?;

        let store = PatientStore::bootstrap(&config.state)?;
        info!("Patient database ready ({} patients)", store.len());

        let pager = PagerClient::new(
            config.pager.address.clone(),
            config.pager.max_attempts,
            Duration::from_secs(config.pager.retry_delay_secs),
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let session = Session::new(
            config.feed.clone(),
            store,
            model,
            pager,
            Arc::clone(&shutdown),
        );

        Ok(Self {
            config,
            session,
            shutdown,
            evaluate,
        })
    }

    /// Run the feed session until shutdown or reconnect exhaustion.
    pub fn run(&mut self) -> Result<()> {
        self.setup_signal_handler()?;

        info!("Feed: {}", self.config.feed.address);
        info!("Pager: {}", self.config.pager.address);

        let result = self.session.run();

        if self.evaluate {
            let expected = self
                .config
                .model
                .expected_aki_csv
                .as_ref()
                .map(PathBuf::from);
            self.session.alerts().summarize(expected.as_deref());
        }

        info!("Prahari stopped");
        result
    }

    /// Install SIGINT/SIGTERM handling on a background thread. The flag is
    /// observed between frames; the session checkpoints before returning.
    fn setup_signal_handler(&self) -> Result<()> {
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let shutdown = Arc::clone(&self.shutdown);

        thread::Builder::new()
            .name("signal-handler".to_string())
            .spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    info!("Received signal {}, shutting down", signal);
                    shutdown.store(true, Ordering::Relaxed);
                }
            })?;
        Ok(())
    }
}
