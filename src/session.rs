//! Feed session controller
//!
//! Owns the connection to the hospital MLLP feed and the per-frame
//! pipeline: decode → parse → dispatch to admission/discharge/lab-result
//! handling → checkpoint → acknowledge. Strictly sequential, one frame at a
//! time, on the calling thread.
//!
//! # Resilience
//!
//! - Failed connects retry after a fixed delay against a process-lifetime
//!   budget; exhausting it is fatal (`Error::FeedExhausted`).
//! - A peer close or read error tears the connection down and re-enters the
//!   connect path under the same budget.
//! - Every failure inside the frame pipeline becomes a typed
//!   `FrameOutcome::Dropped` and the loop moves on. The frame is still
//!   acknowledged: unconditional ack keeps the upstream from blocking on a
//!   frame we chose to drop.
//! - The shutdown flag is checked between frames (reads time out every
//!   500 ms so the check is reached) and triggers a final checkpoint.

use crate::config::FeedConfig;
use crate::error::{Error, Result};
use crate::features;
use crate::hl7::{self, ParsedMessage};
use crate::metrics::{AlertLog, Metrics};
use crate::mllp;
use crate::model::AkiModel;
use crate::pager::{DispatchOutcome, PagerClient};
use crate::store::PatientStore;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often the metrics summary is logged while connected
const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Read timeout so the shutdown flag is observed between frames
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Why a frame was dropped instead of processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Malformed MLLP framing
    Framing(String),
    /// Missing or malformed HL7 field
    Parse(String),
    /// Lab result for a patient with no admission on record
    MissingDemographics(String),
    /// Model inference failed
    Inference(String),
}

/// Typed outcome of one inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// PAS admission applied to the store
    Admission { mrn: String },
    /// PAS discharge: deliberately a no-op (state is kept)
    Discharge { mrn: String },
    /// Lab result processed through the model
    LabResult { mrn: String, positive: bool },
    /// Frame dropped by the error boundary; still acknowledged
    Dropped(DropReason),
}

/// Synchronous feed session: socket lifecycle plus the frame pipeline
pub struct Session<M: AkiModel> {
    feed: FeedConfig,
    store: PatientStore,
    model: M,
    pager: PagerClient,
    metrics: Metrics,
    alerts: AlertLog,
    shutdown: Arc<AtomicBool>,
    /// Failed connect attempts, never reset (process-lifetime budget)
    connect_attempts: u32,
    connected_before: bool,
}

impl<M: AkiModel> Session<M> {
    pub fn new(
        feed: FeedConfig,
        store: PatientStore,
        model: M,
        pager: PagerClient,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            feed,
            store,
            model,
            pager,
            metrics: Metrics::new(),
            alerts: AlertLog::new(),
            shutdown,
            connect_attempts: 0,
            connected_before: false,
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn alerts(&self) -> &AlertLog {
        &self.alerts
    }

    /// Run until shutdown or reconnect-budget exhaustion.
    ///
    /// A final checkpoint and metrics summary happen on every exit path.
    pub fn run(&mut self) -> Result<()> {
        let result = self.connect_loop();
        self.metrics.log_summary();
        self.store.checkpoint()?;
        result
    }

    fn connect_loop(&mut self) -> Result<()> {
        while !self.shutdown.load(Ordering::Relaxed) {
            if self.connect_attempts >= self.feed.reconnect_budget {
                return Err(Error::FeedExhausted {
                    attempts: self.connect_attempts,
                });
            }

            match TcpStream::connect(&self.feed.address) {
                Ok(stream) => {
                    log::info!("Connected to feed at {}", self.feed.address);
                    if self.connected_before {
                        self.metrics.reconnections += 1;
                    }
                    self.connected_before = true;
                    self.read_loop(stream)?;
                }
                Err(e) => {
                    self.connect_attempts += 1;
                    log::warn!(
                        "Feed connect failed ({}/{}): {}",
                        self.connect_attempts,
                        self.feed.reconnect_budget,
                        e
                    );
                    std::thread::sleep(Duration::from_secs(self.feed.reconnect_delay_secs));
                }
            }
        }
        log::info!("Shutdown requested, leaving feed loop");
        Ok(())
    }

    /// Read frames until peer close, read error, or shutdown.
    ///
    /// Returning `Ok` re-enters the connect path; only checkpoint failures
    /// propagate as errors.
    fn read_loop(&mut self, mut stream: TcpStream) -> Result<()> {
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        let mut buffer = vec![0u8; self.feed.read_buffer];
        let mut last_stats = Instant::now();

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                return Ok(());
            }
            if last_stats.elapsed() >= STATS_INTERVAL {
                self.metrics.log_summary();
                last_stats = Instant::now();
            }

            let n = match stream.read(&mut buffer) {
                Ok(0) => {
                    log::info!("Feed closed the connection");
                    return Ok(());
                }
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => {
                    log::warn!("Feed read error: {}", e);
                    return Ok(());
                }
            };

            let received = Instant::now();
            match self.process_frame(&buffer[..n], received) {
                FrameOutcome::Dropped(reason) => {
                    log::warn!("Dropped frame: {:?}", reason);
                }
                outcome => log::debug!("Processed frame: {:?}", outcome),
            }

            // Checkpoint then ack, both unconditional per frame
            self.store.checkpoint()?;
            if let Err(e) = stream.write_all(&mllp::ack_frame()) {
                log::warn!("Ack write failed: {}", e);
                return Ok(());
            }
        }
    }

    /// The per-frame error boundary: every failure becomes a `Dropped`
    /// outcome and never escapes.
    fn process_frame(&mut self, raw: &[u8], received: Instant) -> FrameOutcome {
        let segments = match mllp::decode(raw) {
            Ok(segments) => segments,
            Err(e) => return self.drop_frame(DropReason::Framing(e.to_string())),
        };
        // Every successfully decoded frame counts, parseable or not
        self.metrics.total_messages += 1;

        let message = match hl7::parse(&segments) {
            Ok(message) => message,
            Err(e) => return self.drop_frame(DropReason::Parse(e.to_string())),
        };

        match message {
            ParsedMessage::Admission { mrn, sex, age } => {
                self.store.apply_admission(&mrn, sex, age);
                FrameOutcome::Admission { mrn }
            }
            ParsedMessage::Discharge { mrn } => FrameOutcome::Discharge { mrn },
            ParsedMessage::LabResult { mrn, value } => self.process_lab_result(mrn, value, received),
        }
    }

    fn process_lab_result(&mut self, mrn: String, value: f64, received: Instant) -> FrameOutcome {
        self.metrics.lab_results += 1;
        self.metrics.record_lab_value(value);

        // History append is unconditional; the frame can still be dropped
        // afterwards (missing demographics, inference failure)
        let record = self.store.apply_lab_result(&mrn, value);

        let vector = match features::build(&mrn, record) {
            Ok(vector) => vector,
            Err(Error::MissingDemographics(mrn)) => {
                return self.drop_frame(DropReason::MissingDemographics(mrn));
            }
            Err(e) => return self.drop_frame(DropReason::Parse(e.to_string())),
        };

        let label = match self.model.predict(&vector) {
            Ok(label) => label,
            Err(e) => return self.drop_frame(DropReason::Inference(e.to_string())),
        };

        let positive = label == 1;
        if positive {
            self.metrics.positive_predictions += 1;
            match self.pager.dispatch(&mrn) {
                DispatchOutcome::Delivered => {}
                DispatchOutcome::NonSuccess(status) => {
                    log::warn!("Pager returned {} for {}", status, mrn);
                    self.metrics.non_success_pages += 1;
                }
                DispatchOutcome::Unreachable { attempts } => {
                    log::error!("Missed alert for {}: pager unreachable after {} attempts", mrn, attempts);
                    self.metrics.missed_alerts += 1;
                }
            }
            let elapsed = received.elapsed().as_secs_f64();
            self.metrics.record_response_time(elapsed);
            self.alerts.record(&mrn, elapsed);
        }

        FrameOutcome::LabResult { mrn, positive }
    }

    fn drop_frame(&mut self, reason: DropReason) -> FrameOutcome {
        self.metrics.dropped_frames += 1;
        FrameOutcome::Dropped(reason)
    }
}
