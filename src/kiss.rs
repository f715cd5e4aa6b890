// rloraprs - KISS Framing Module
// Byte-level KISS decoder state machine and frame encoder

use crate::error::GatewayError;

pub const KISS_FEND: u8 = 0xC0;
pub const KISS_FESC: u8 = 0xDB;
pub const KISS_TFEND: u8 = 0xDC;
pub const KISS_TFESC: u8 = 0xDD;

pub const CMD_DATA: u8 = 0x00;
pub const CMD_SET_HARDWARE: u8 = 0x06;

/// Largest unescaped frame the decoder will accumulate.
pub const MAX_FRAME_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KissState {
    Idle,
    AwaitingCommand,
    ReceivingData,
    Escaped,
}

/// What the decoder must do with the byte that caused a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KissAction {
    None,
    Open(u8),
    Push(u8),
    Close,
    Discard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KissFrame {
    pub command: u8,
    pub data: Vec<u8>,
}

/// Pure transition function of the decoder.
///
/// `accepted` lists the command codes that open a frame; any other command
/// byte discards the frame.
pub fn transition(state: KissState, byte: u8, accepted: &[u8]) -> (KissState, KissAction) {
    match state {
        KissState::Idle => {
            if byte == KISS_FEND {
                (KissState::AwaitingCommand, KissAction::None)
            } else {
                (KissState::Idle, KissAction::None)
            }
        }
        KissState::AwaitingCommand => {
            if byte == KISS_FEND {
                (KissState::AwaitingCommand, KissAction::None)
            } else if accepted.contains(&byte) {
                (KissState::ReceivingData, KissAction::Open(byte))
            } else {
                (KissState::Idle, KissAction::Discard)
            }
        }
        KissState::ReceivingData => match byte {
            KISS_FESC => (KissState::Escaped, KissAction::None),
            KISS_FEND => (KissState::Idle, KissAction::Close),
            b => (KissState::ReceivingData, KissAction::Push(b)),
        },
        KissState::Escaped => match byte {
            KISS_TFEND => (KissState::ReceivingData, KissAction::Push(KISS_FEND)),
            KISS_TFESC => (KissState::ReceivingData, KissAction::Push(KISS_FESC)),
            _ => (KissState::Idle, KissAction::Discard),
        },
    }
}

/// Stateful KISS decoder. Lives as long as the peer it listens to.
pub struct KissDecoder {
    state: KissState,
    command: Option<u8>,
    buffer: Vec<u8>,
    capacity: usize,
    accepted: &'static [u8],
}

impl KissDecoder {
    /// Decoder for a TNC peer: only data frames are recognized.
    pub fn new() -> Self {
        Self::with_commands(&[CMD_DATA], MAX_FRAME_LEN)
    }

    pub fn with_commands(accepted: &'static [u8], capacity: usize) -> Self {
        KissDecoder {
            state: KissState::Idle,
            command: None,
            buffer: Vec::with_capacity(capacity),
            capacity,
            accepted,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> KissState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = KissState::Idle;
        self.command = None;
        self.buffer.clear();
    }

    /// Feed one byte. Returns a frame when a closing FEND completes one.
    ///
    /// Protocol violations reset the decoder silently. Overflowing the
    /// frame capacity also resets it but is reported as an error.
    pub fn feed(&mut self, byte: u8) -> Result<Option<KissFrame>, GatewayError> {
        let (next, action) = transition(self.state, byte, self.accepted);
        self.state = next;
        match action {
            KissAction::None => Ok(None),
            KissAction::Open(command) => {
                self.command = Some(command);
                self.buffer.clear();
                Ok(None)
            }
            KissAction::Push(b) => {
                if self.buffer.len() >= self.capacity {
                    let len = self.buffer.len() + 1;
                    self.reset();
                    return Err(GatewayError::CapacityExceeded { len, capacity: self.capacity });
                }
                self.buffer.push(b);
                Ok(None)
            }
            KissAction::Close => {
                let frame = self.command.take().map(|command| KissFrame {
                    command,
                    data: std::mem::take(&mut self.buffer),
                });
                self.reset();
                Ok(frame)
            }
            KissAction::Discard => {
                self.reset();
                Ok(None)
            }
        }
    }

    /// Feed a run of bytes, collecting complete frames. Oversized frames
    /// are dropped.
    #[cfg(test)]
    pub fn decode(&mut self, data: &[u8]) -> Vec<KissFrame> {
        data.iter()
            .filter_map(|&b| self.feed(b).ok().flatten())
            .collect()
    }
}

impl Default for KissDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps a raw radio frame as a KISS data frame.
pub fn encode(data: &[u8]) -> Vec<u8> {
    encode_command(CMD_DATA, data)
}

pub fn encode_command(command: u8, data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len() * 2 + 3);
    output.push(KISS_FEND);
    output.push(command);
    for &byte in data {
        match byte {
            KISS_FEND => {
                output.push(KISS_FESC);
                output.push(KISS_TFEND);
            }
            KISS_FESC => {
                output.push(KISS_FESC);
                output.push(KISS_TFESC);
            }
            b => output.push(b),
        }
    }
    output.push(KISS_FEND);
    output
}
