//! Recording realtime transport.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a test panic

use crate::CallLog;
use std::sync::{Arc, Mutex};
use ticketflow_core::realtime::{
    BroadcastReport, RealtimeError, RealtimeFuture, RealtimeTransport,
};

/// Realtime transport that records every broadcast instead of sending it.
///
/// Reports every broadcast as delivered to `clients` clients (default 1).
#[derive(Clone, Debug)]
pub struct RecordingRealtime {
    broadcasts: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    failure: Arc<Mutex<Option<RealtimeError>>>,
    clients: usize,
    call_log: Option<CallLog>,
}

impl Default for RecordingRealtime {
    fn default() -> Self {
        Self {
            broadcasts: Arc::default(),
            failure: Arc::default(),
            clients: 1,
            call_log: None,
        }
    }
}

impl RecordingRealtime {
    /// Create a transport with one simulated client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record broadcasts as `"realtime.broadcast"` in `log`.
    #[must_use]
    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.call_log = Some(log);
        self
    }

    /// Fail every subsequent broadcast with `error` (`None` to recover).
    pub fn fail_with(&self, error: Option<RealtimeError>) {
        *self.failure.lock().unwrap() = error;
    }

    /// Every successful broadcast as `(action_type, payload)`.
    #[must_use]
    pub fn broadcasts(&self) -> Vec<(String, serde_json::Value)> {
        self.broadcasts.lock().unwrap().clone()
    }

    /// Successful broadcasts of `action_type`.
    #[must_use]
    pub fn payloads_of(&self, action_type: &str) -> Vec<serde_json::Value> {
        self.broadcasts
            .lock()
            .unwrap()
            .iter()
            .filter(|(kind, _)| kind == action_type)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

impl RealtimeTransport for RecordingRealtime {
    fn broadcast<'a>(
        &'a self,
        action_type: &'a str,
        payload: serde_json::Value,
    ) -> RealtimeFuture<'a> {
        Box::pin(async move {
            if let Some(log) = &self.call_log {
                log.record("realtime.broadcast");
            }
            let failure = self.failure.lock().unwrap().clone();
            if let Some(error) = failure {
                return Err(error);
            }
            self.broadcasts
                .lock()
                .unwrap()
                .push((action_type.to_string(), payload));
            Ok(BroadcastReport {
                delivered: self.clients,
                dropped: 0,
            })
        })
    }
}
