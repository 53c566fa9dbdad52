//! Service call correlation
//!
//! Every pending call owns a reply slot and the id of its deadline timer.
//! Whichever of response, deadline or connection loss comes first removes
//! the call, so each call is resolved exactly once.

use crate::core::scheduler::TimerId;
use crate::error::{BridgeError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// Reply slot for one service call
pub type ReplySlot = oneshot::Sender<Result<Value>>;

struct PendingCall {
    service: String,
    timeout: Duration,
    timer: TimerId,
    reply: ReplySlot,
}

#[derive(Default)]
pub struct CallCorrelator {
    pending: HashMap<String, PendingCall>,
    sequence: u64,
}

impl CallCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a call id unique for the lifetime of the process
    ///
    /// Wall-clock millis, a per-correlator sequence number and a random
    /// suffix: `service_call_1718000000000_42_9f3c2a1b`.
    pub fn next_id(&mut self) -> String {
        self.sequence += 1;
        format!(
            "service_call_{}_{}_{:08x}",
            chrono::Utc::now().timestamp_millis(),
            self.sequence,
            rand::random::<u32>()
        )
    }

    pub fn register(
        &mut self,
        id: String,
        service: &str,
        timeout: Duration,
        timer: TimerId,
        reply: ReplySlot,
    ) {
        self.pending.insert(
            id,
            PendingCall {
                service: service.to_string(),
                timeout,
                timer,
                reply,
            },
        );
    }

    /// Complete a call with the broker's `values`
    ///
    /// Returns the call's deadline timer so the caller can cancel it, or
    /// `None` if no call with this id is pending (duplicate or late reply).
    pub fn resolve(&mut self, id: &str, values: Value) -> Option<TimerId> {
        let Some(call) = self.pending.remove(id) else {
            debug!(id, "Ignoring response for unknown or completed call");
            return None;
        };
        debug!(id, service = %call.service, "Service call answered");
        // Receiver may be gone if the caller stopped waiting
        let _ = call.reply.send(Ok(values));
        Some(call.timer)
    }

    /// Fail a call whose deadline elapsed; `false` if it already completed
    pub fn expire(&mut self, id: &str) -> bool {
        let Some(call) = self.pending.remove(id) else {
            return false;
        };
        let _ = call.reply.send(Err(BridgeError::Timeout(format!(
            "service call {} to {} got no response within {:?}",
            id, call.service, call.timeout
        ))));
        true
    }

    /// Fail every outstanding call with `ConnectionLost`
    ///
    /// Returns the deadline timers to cancel.
    pub fn fail_all(&mut self, reason: &str) -> Vec<TimerId> {
        self.pending
            .drain()
            .map(|(id, call)| {
                let _ = call.reply.send(Err(BridgeError::ConnectionLost(format!(
                    "service call {} to {}: {}",
                    id, call.service, reason
                ))));
                call.timer
            })
            .collect()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
