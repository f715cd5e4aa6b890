// rloraprs - Transport Module
// Seams between the gateway loop and the radio, APRS-IS and KISS peers

use std::thread;
use std::time::{Duration, Instant};

use crate::error::GatewayError;

/// Per-packet link quality as measured by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SignalReport {
    pub rssi: f32,
    pub snr: f32,
    pub frequency_error: i64,
}

impl SignalReport {
    /// RSSI as reported to users: below 0 dB SNR the packet RSSI is
    /// corrected by the SNR, otherwise it is taken as-is.
    pub fn effective_rssi(&self) -> f32 {
        if self.snr < 0.0 { self.rssi + self.snr } else { self.rssi }
    }

    /// Suffix appended to the text form of a received frame.
    pub fn to_suffix(&self) -> String {
        format!(
            " rssi: {:.2}dBm, snr: {:.2}dB, err: {}Hz",
            self.effective_rssi(), self.snr, self.frequency_error
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RadioPacket {
    pub data: Vec<u8>,
    pub signal: SignalReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioParams {
    pub frequency: i64,
    pub bandwidth: u32,
    pub spreading_factor: u8,
    pub coding_rate: u8,
    pub tx_power: u8,
    pub sync_word: u8,
}

pub trait RadioTransport {
    fn begin(&mut self, params: &RadioParams) -> Result<(), GatewayError>;
    /// False once the link to the radio is lost; `begin` brings it back.
    fn is_ready(&self) -> bool;
    fn set_frequency(&mut self, frequency: i64) -> Result<(), GatewayError>;
    /// Non-blocking: returns a packet only once it has been fully received.
    fn receive(&mut self) -> Result<Option<RadioPacket>, GatewayError>;
    fn transmit(&mut self, data: &[u8]) -> Result<(), GatewayError>;
}

pub trait NetworkSocket {
    fn connect(&mut self, host: &str, port: u16) -> Result<(), GatewayError>;
    fn is_connected(&mut self) -> bool;
    fn available(&mut self) -> usize;
    fn read_byte(&mut self) -> Option<u8>;
    fn write_line(&mut self, line: &str) -> Result<(), GatewayError>;
    fn write_str(&mut self, text: &str) -> Result<(), GatewayError>;
    fn close(&mut self);
}

pub trait SerialChannel {
    fn begin(&mut self) -> Result<(), GatewayError>;
    fn is_open(&self) -> bool;
    fn available(&mut self) -> usize;
    fn read_byte(&mut self) -> Option<u8>;
    fn write_all(&mut self, data: &[u8]) -> Result<(), GatewayError>;
}

/// Wrapping millisecond counter plus a blocking delay.
pub trait Clock {
    fn millis(&self) -> u32;
    fn delay(&mut self, ms: u32);
}

pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn millis(&self) -> u32 {
        // Wraps like a hardware tick counter
        self.start.elapsed().as_millis() as u32
    }

    fn delay(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}

/// True once `interval` ms have passed since `since`, across counter wraps.
pub fn elapsed(now: u32, since: u32, interval: u32) -> bool {
    now.wrapping_sub(since) >= interval
}

/// Paces reconnect attempts from the tick loop: at most one per interval.
pub struct RetryGate {
    interval_ms: u32,
    last_attempt: Option<u32>,
}

impl RetryGate {
    pub fn new(interval_ms: u32) -> Self {
        RetryGate { interval_ms, last_attempt: None }
    }

    /// Whether an attempt may be made at `now`; if so it is recorded.
    pub fn try_attempt(&mut self, now: u32) -> bool {
        if let Some(last) = self.last_attempt {
            if !elapsed(now, last, self.interval_ms) {
                return false;
            }
        }
        self.last_attempt = Some(now);
        true
    }
}
