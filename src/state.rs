use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::transfer::TransferRepository;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    started_at_system: SystemTime,
    transfer: Arc<TransferRepository>,
}

impl AppState {
    pub fn new(transfer: Arc<TransferRepository>) -> Self {
        Self {
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
            transfer,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    pub fn transfer(&self) -> Arc<TransferRepository> {
        Arc::clone(&self.transfer)
    }
}
