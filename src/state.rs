use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ReclaimStats {
    pub total_reclaimed_lamports: u64,
    pub total_accounts_closed: u64,
    pub start_time: Instant,
    pub last_scan_time: Option<Instant>,
}

impl ReclaimStats {
    pub fn new() -> Self {
        Self {
            total_reclaimed_lamports: 0,
            total_accounts_closed: 0,
            start_time: Instant::now(),
            last_scan_time: None,
        }
    }

    pub fn record_scan(&mut self) {
        self.last_scan_time = Some(Instant::now());
    }

    pub fn record_claim(&mut self, accounts: u64, lamports: u64) {
        self.total_accounts_closed += accounts;
        self.total_reclaimed_lamports += lamports;
    }

    /// True when no scan has run yet or the last one is older than `interval`.
    pub fn scan_due(&self, interval: Duration) -> bool {
        match self.last_scan_time {
            None => true,
            Some(last) => last.elapsed() >= interval,
        }
    }
}

impl Default for ReclaimStats {
    fn default() -> Self {
        Self::new()
    }
}
