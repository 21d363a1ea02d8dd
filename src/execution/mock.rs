// Scripted ledger client for exercising the settlement state machine
use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    error::LedgerError,
    execution::{BroadcastGate, LedgerClient, TransferRequest},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTransfer {
    pub request: TransferRequest,
    pub signature: String,
}

#[derive(Default)]
pub struct MockLedger {
    /// Failures returned by upcoming `transfer` calls, in order
    scripted_failures: Mutex<VecDeque<Option<LedgerError>>>,
    /// Transfers that reached the chain, including unconfirmed ones
    landed: Mutex<Vec<RecordedTransfer>>,
    attempts: Mutex<Vec<TransferRequest>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next transfer: `None` succeeds
    pub fn script(&self, outcome: Option<LedgerError>) {
        self.scripted_failures.lock().push_back(outcome);
    }

    pub fn landed(&self) -> Vec<RecordedTransfer> {
        self.landed.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Record a transfer that landed without the caller learning about it
    pub fn land_silently(&self, request: TransferRequest) -> String {
        let signature = format!("sig-{}", self.landed.lock().len() + 1);
        self.landed.lock().push(RecordedTransfer {
            request,
            signature: signature.clone(),
        });
        signature
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn transfer(
        &self,
        request: &TransferRequest,
        gate: &dyn BroadcastGate,
    ) -> Result<String, LedgerError> {
        self.attempts.lock().push(request.clone());
        // Give concurrent passes a chance to interleave
        tokio::task::yield_now().await;

        match gate.may_broadcast().await {
            Ok(true) => {}
            Ok(false) => return Err(LedgerError::Aborted("claim lost".to_string())),
            Err(e) => return Err(LedgerError::Aborted(e.to_string())),
        }

        let scripted = self.scripted_failures.lock().pop_front().flatten();
        match scripted {
            Some(LedgerError::Unconfirmed { reason, .. }) => {
                let signature = self.land_silently(request.clone());
                Err(LedgerError::Unconfirmed { signature, reason })
            }
            Some(err) => Err(err),
            None => Ok(self.land_silently(request.clone())),
        }
    }

    async fn find_transfer(&self, reference: &str) -> Result<Option<String>, LedgerError> {
        Ok(self
            .landed
            .lock()
            .iter()
            .find(|t| t.request.reference == reference)
            .map(|t| t.signature.clone()))
    }
}
