// rloraprs - Frequency Correction Module
// Follows the transmitter by subtracting each received frame's frequency error

use crate::error::GatewayError;
use crate::transport::RadioTransport;

pub struct FrequencyCorrector {
    frequency: i64,
    enabled: bool,
}

impl FrequencyCorrector {
    pub fn new(frequency: i64, enabled: bool) -> Self {
        FrequencyCorrector { frequency, enabled }
    }

    pub fn frequency(&self) -> i64 {
        self.frequency
    }

    /// Retunes to `current - error`. No filtering: every reading is applied.
    /// The stored frequency only changes once the radio accepted it.
    /// Returns the new frequency, or `None` when correction is disabled.
    pub fn correct<R: RadioTransport>(&mut self, radio: &mut R, frequency_error: i64) -> Result<Option<i64>, GatewayError> {
        if !self.enabled {
            return Ok(None);
        }
        let target = self.frequency.checked_sub(frequency_error).ok_or_else(|| {
            GatewayError::Radio(format!("frequency error {} Hz out of range", frequency_error))
        })?;
        radio.set_frequency(target)?;
        self.frequency = target;
        Ok(Some(target))
    }
}
