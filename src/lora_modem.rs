// rloraprs - LoRa Modem Module
// RadioTransport for a LoRa modem attached over a serial link
//
// The modem speaks KISS to the host. Command 0x00 carries packet data in
// both directions. Command 0x06 (SetHardware) carries ASCII KEY=VALUE
// settings from host to modem ("FREQ=433775000"), and from modem to host a
// signal report ("RSSI=-97.5 SNR=6.25 FERR=-812") that belongs to the data
// frame following it.

use crate::error::GatewayError;
use crate::kiss::{self, KissDecoder, CMD_DATA, CMD_SET_HARDWARE, MAX_FRAME_LEN};
use crate::transport::{RadioPacket, RadioParams, RadioTransport, SerialChannel, SignalReport};

const MODEM_COMMANDS: &[u8] = &[CMD_DATA, CMD_SET_HARDWARE];

pub struct SerialModem<S: SerialChannel> {
    serial: S,
    decoder: KissDecoder,
    pending_report: Option<SignalReport>,
}

impl<S: SerialChannel> SerialModem<S> {
    pub fn new(serial: S) -> Self {
        SerialModem {
            serial,
            decoder: KissDecoder::with_commands(MODEM_COMMANDS, MAX_FRAME_LEN),
            pending_report: None,
        }
    }

    fn send_setting(&mut self, key: &str, value: &str) -> Result<(), GatewayError> {
        let setting = format!("{}={}", key, value);
        self.serial.write_all(&kiss::encode_command(CMD_SET_HARDWARE, setting.as_bytes()))
    }

    #[cfg(test)]
    pub fn serial_mut(&mut self) -> &mut S {
        &mut self.serial
    }
}

/// Parses `RSSI=<f> SNR=<f> FERR=<i>`; unknown keys are ignored.
pub fn parse_signal_report(text: &str) -> Option<SignalReport> {
    let mut report = SignalReport::default();
    let mut seen = false;
    for field in text.split_whitespace() {
        let (key, value) = field.split_once('=')?;
        match key {
            "RSSI" => report.rssi = value.parse().ok()?,
            "SNR" => report.snr = value.parse().ok()?,
            "FERR" => report.frequency_error = value.parse().ok()?,
            _ => continue,
        }
        seen = true;
    }
    if seen { Some(report) } else { None }
}

impl<S: SerialChannel> RadioTransport for SerialModem<S> {
    fn begin(&mut self, params: &RadioParams) -> Result<(), GatewayError> {
        self.serial.begin()?;
        self.decoder.reset();
        self.pending_report = None;
        self.send_setting("FREQ", &params.frequency.to_string())?;
        self.send_setting("BW", &params.bandwidth.to_string())?;
        self.send_setting("SF", &params.spreading_factor.to_string())?;
        self.send_setting("CR", &params.coding_rate.to_string())?;
        self.send_setting("PWR", &params.tx_power.to_string())?;
        self.send_setting("SYNC", &format!("0x{:02X}", params.sync_word))?;
        self.send_setting("CRC", "1")
    }

    fn is_ready(&self) -> bool {
        self.serial.is_open()
    }

    fn set_frequency(&mut self, frequency: i64) -> Result<(), GatewayError> {
        if frequency <= 0 {
            return Err(GatewayError::Radio(format!("refusing frequency {} Hz", frequency)));
        }
        self.send_setting("FREQ", &frequency.to_string())
    }

    fn receive(&mut self) -> Result<Option<RadioPacket>, GatewayError> {
        while self.serial.available() > 0 {
            let Some(byte) = self.serial.read_byte() else { break };
            let Some(frame) = self.decoder.feed(byte)? else { continue };
            match frame.command {
                CMD_SET_HARDWARE => {
                    self.pending_report = parse_signal_report(&String::from_utf8_lossy(&frame.data));
                }
                _ => {
                    let signal = self.pending_report.take().unwrap_or_default();
                    return Ok(Some(RadioPacket { data: frame.data, signal }));
                }
            }
        }
        Ok(None)
    }

    fn transmit(&mut self, data: &[u8]) -> Result<(), GatewayError> {
        if data.is_empty() {
            return Err(GatewayError::Radio("empty packet".to_string()));
        }
        if data.len() > MAX_FRAME_LEN {
            return Err(GatewayError::CapacityExceeded { len: data.len(), capacity: MAX_FRAME_LEN });
        }
        self.serial.write_all(&kiss::encode(data))
    }
}
