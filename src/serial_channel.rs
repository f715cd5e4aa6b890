// rloraprs - Serial Channel Module
// Host serial ports for the KISS TNC peer and the LoRa modem link

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use serialport::SerialPort;

use crate::config::{FlowControl, Parity, SerialSettings, StopBits};
use crate::error::GatewayError;
use crate::logger::{Logger, LOG_ERROR, LOG_NOTICE};
use crate::transport::SerialChannel;

/// A port that fails a read or write is dropped; `begin` reopens it.
pub struct SerialPortChannel {
    settings: SerialSettings,
    port: Option<Box<dyn SerialPort>>,
    rx: VecDeque<u8>,
    logger: Arc<Logger>,
}

impl SerialPortChannel {
    pub fn new(settings: SerialSettings, logger: Arc<Logger>) -> Self {
        SerialPortChannel { settings, port: None, rx: VecDeque::new(), logger }
    }

    fn lose_port(&mut self, e: &dyn std::fmt::Display) {
        self.port = None;
        self.logger.log(&format!("Serial port {} lost: {}", self.settings.device, e), LOG_ERROR);
    }

    fn open(settings: &SerialSettings) -> Result<Box<dyn SerialPort>, GatewayError> {
        let mut port_builder = serialport::new(&settings.device, settings.baud_rate)
            .timeout(Duration::from_millis(10));

        port_builder = match settings.flow_control {
            FlowControl::None => port_builder.flow_control(serialport::FlowControl::None),
            FlowControl::Software => port_builder.flow_control(serialport::FlowControl::Software),
            FlowControl::Hardware => port_builder.flow_control(serialport::FlowControl::Hardware),
            FlowControl::DtrDsr => {
                #[cfg(target_os = "windows")]
                { port_builder.flow_control(serialport::FlowControl::Hardware) }
                #[cfg(not(target_os = "windows"))]
                { port_builder.flow_control(serialport::FlowControl::None) }
            }
        };

        port_builder = match settings.stop_bits {
            StopBits::One => port_builder.stop_bits(serialport::StopBits::One),
            StopBits::Two => port_builder.stop_bits(serialport::StopBits::Two),
        };

        port_builder = match settings.parity {
            Parity::None => port_builder.parity(serialport::Parity::None),
            Parity::Odd => port_builder.parity(serialport::Parity::Odd),
            Parity::Even => port_builder.parity(serialport::Parity::Even),
        };

        Ok(port_builder.open()?)
    }

    /// Moves bytes the driver already holds into `rx` without waiting.
    fn fill(&mut self) {
        let Some(port) = self.port.as_mut() else { return };
        let pending = match port.bytes_to_read() {
            Ok(n) => n as usize,
            Err(e) => {
                self.lose_port(&e);
                return;
            }
        };
        if pending == 0 { return; }
        let mut buffer = vec![0u8; pending.min(4096)];
        match port.read(&mut buffer) {
            Ok(n) => self.rx.extend(&buffer[..n]),
            Err(ref e) if e.kind() == ErrorKind::TimedOut => {}
            Err(e) => self.lose_port(&e),
        }
    }
}

impl SerialChannel for SerialPortChannel {
    fn begin(&mut self) -> Result<(), GatewayError> {
        if self.port.is_none() {
            self.port = Some(Self::open(&self.settings)?);
            self.rx.clear();
            self.logger.log(&format!("Serial port {} open", self.settings.device), LOG_NOTICE);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn available(&mut self) -> usize {
        self.fill();
        self.rx.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        if self.rx.is_empty() { self.fill(); }
        self.rx.pop_front()
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), GatewayError> {
        let port = self.port.as_mut().ok_or(GatewayError::NotConnected)?;
        if let Err(e) = port.write_all(data) {
            self.lose_port(&e);
            return Err(e.into());
        }
        Ok(())
    }
}
