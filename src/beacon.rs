// rloraprs - Beacon Scheduler Module
// Interval gate for the periodic beacon

/// Whether a beacon is due. `last_beacon == 0` means none was sent yet.
/// Uses wrapping subtraction so a counter rollover neither fires early
/// nor starves the beacon.
pub fn due(now: u32, last_beacon: u32, period: u32) -> bool {
    last_beacon == 0 || now.wrapping_sub(last_beacon) >= period
}

pub struct BeaconScheduler {
    period_ms: u32,
    last_beacon: u32,
}

impl BeaconScheduler {
    pub fn new(period_ms: u32) -> Self {
        BeaconScheduler { period_ms, last_beacon: 0 }
    }

    pub fn is_due(&self, now: u32) -> bool {
        due(now, self.last_beacon, self.period_ms)
    }

    /// Records a firing, successful or not; the next one waits a full period.
    /// 0 means "never sent", so a firing at tick 0 is recorded as tick 1.
    pub fn mark_sent(&mut self, now: u32) {
        self.last_beacon = now.max(1);
    }

    #[cfg(test)]
    pub fn last_beacon(&self) -> u32 {
        self.last_beacon
    }
}
