//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (UART / USB-CDC in production, stderr on the host).

use log::{debug, info, warn};

use crate::app::events::{AppEvent, DiscardReason};
use crate::app::ports::{EventSink, UploadOutcome};

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(mode) => {
                info!("START | initial_mode={}", mode);
            }
            AppEvent::ModeChanged { from, to, provenance } => {
                info!("MODE  | {} -> {} ({})", from, to, provenance);
            }
            AppEvent::ModeConfirmed { mode, provenance } => {
                debug!("MODE  | {} confirmed ({})", mode, provenance);
            }
            AppEvent::AlarmChanged { from, to } => {
                info!("ALARM | {} -> {}", from, to);
            }
            AppEvent::AlarmClockSet { hour, minute } => {
                info!("ALARM | wake-up set to {:02}:{:02}", hour, minute);
            }
            AppEvent::WindowSealed { sequence, held_samples } => {
                if *held_samples > 0 {
                    warn!("WIN   | #{} sealed, {} held samples", sequence, held_samples);
                } else {
                    debug!("WIN   | #{} sealed", sequence);
                }
            }
            AppEvent::InferenceRequested { request, window } => {
                debug!("INFER | request {} for window #{}", request, window);
            }
            AppEvent::InferenceDiscarded { request, reason } => match request {
                Some(id) => info!("INFER | reply {} discarded: {}", id, reason),
                None => info!("INFER | fallback discarded: {}", reason),
            },
            AppEvent::UploadOutcome { window, outcome } => match outcome {
                UploadOutcome::Sent => debug!("UPLD  | window #{} sent", window),
                UploadOutcome::Pending { replaced: true } => {
                    warn!("UPLD  | window #{} replaced an undelivered window", window)
                }
                UploadOutcome::Pending { replaced: false } => {
                    debug!("UPLD  | window #{} pending", window)
                }
                UploadOutcome::Dropped => warn!("UPLD  | window #{} dropped", window),
            },
            AppEvent::RemoteDiscarded { sequence, reason } => {
                if *reason == DiscardReason::Stale {
                    debug!("CMD   | seq {} ignored: {}", sequence, reason);
                } else {
                    info!("CMD   | seq {} discarded: {}", sequence, reason);
                }
            }
            AppEvent::ConnectivityChanged(status) => {
                info!("NET   | {}", status);
            }
            AppEvent::StaleChanged(true) => {
                warn!("NET   | backend stale, keeping current mode");
            }
            AppEvent::StaleChanged(false) => {
                info!("NET   | backend fresh again");
            }
            AppEvent::PageChanged(page) => {
                debug!("UI    | page {:?}", page);
            }
            AppEvent::ConfigSaved => {
                info!("CFG   | saved");
            }
        }
    }
}
