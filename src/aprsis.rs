// rloraprs - APRS-IS Connection Module
// Connection lifecycle for the APRS-IS uplink: login, reconnect, transient sends

use std::sync::Arc;

use crate::config::Config;
use crate::error::GatewayError;
use crate::logger::{Logger, LOG_DEBUG, LOG_ERROR, LOG_NOTICE, LOG_WARN};
use crate::transport::{Clock, NetworkSocket, RetryGate};

/// Longest APRS-IS line kept while waiting for its newline.
pub const MAX_LINE_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

pub struct AprsisConnection<N: NetworkSocket> {
    socket: N,
    host: String,
    port: u16,
    login: String,
    persistent: bool,
    retry: RetryGate,
    last_state: ConnectionState,
    line: Vec<u8>,
    overflowed: bool,
    logger: Arc<Logger>,
}

impl<N: NetworkSocket> AprsisConnection<N> {
    pub fn new(socket: N, config: &Config, logger: Arc<Logger>) -> Self {
        AprsisConnection {
            socket,
            host: config.aprs_host.clone(),
            port: config.aprs_port,
            login: config.login_line(),
            persistent: config.persistent_connection,
            retry: RetryGate::new(config.reconnect_delay_ms),
            last_state: ConnectionState::Disconnected,
            line: Vec::with_capacity(MAX_LINE_LEN),
            overflowed: false,
            logger,
        }
    }

    pub fn state(&mut self) -> ConnectionState {
        if self.socket.is_connected() { ConnectionState::Connected } else { ConnectionState::Disconnected }
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    #[cfg(test)]
    pub fn socket(&self) -> &N {
        &self.socket
    }

    #[cfg(test)]
    pub fn socket_mut(&mut self) -> &mut N {
        &mut self.socket
    }

    /// One connect attempt when disconnected; logs in on success.
    pub fn ensure_connected(&mut self) -> Result<(), GatewayError> {
        if self.socket.is_connected() {
            return Ok(());
        }
        self.logger.log(&format!("APRS-IS connecting to {}:{}...", self.host, self.port), LOG_NOTICE);
        self.line.clear();
        self.overflowed = false;
        if let Err(e) = self.socket.connect(&self.host, self.port) {
            self.logger.log(&format!("APRS-IS connect failed: {}", e), LOG_ERROR);
            return Err(e);
        }
        if let Err(e) = self.socket.write_str(&self.login) {
            self.logger.log(&format!("APRS-IS login failed: {}", e), LOG_ERROR);
            self.socket.close();
            return Err(e);
        }
        self.last_state = ConnectionState::Connected;
        self.logger.log("APRS-IS connected", LOG_NOTICE);
        Ok(())
    }

    /// Startup bring-up: retries forever with a fixed delay.
    pub fn connect_blocking<C: Clock>(&mut self, clock: &mut C, retry_delay_ms: u32) {
        while self.ensure_connected().is_err() {
            clock.delay(retry_delay_ms);
        }
    }

    /// Liveness check for persistent sessions. At most one connect attempt
    /// per `reconnect_delay_ms`, so a dead server never stalls the loop.
    pub fn maintain(&mut self, now: u32) {
        if !self.persistent || self.state() == ConnectionState::Connected {
            return;
        }
        if self.last_state == ConnectionState::Connected {
            self.logger.log("APRS-IS connection lost", LOG_WARN);
            self.last_state = ConnectionState::Disconnected;
        }
        if !self.retry.try_attempt(now) {
            return;
        }
        let _ = self.ensure_connected();
    }

    /// Sends one line. In transient mode the session is closed afterwards.
    /// Nothing is queued: if no connection can be made the line is dropped.
    pub fn send_line(&mut self, text: &str) -> Result<(), GatewayError> {
        self.ensure_connected()?;
        let result = self.socket.write_line(text);
        if let Err(ref e) = result {
            self.logger.log(&format!("APRS-IS write failed: {}", e), LOG_ERROR);
            self.socket.close();
        }
        if !self.persistent {
            self.socket.close();
        }
        if result.is_err() || !self.persistent {
            self.last_state = ConnectionState::Disconnected;
        }
        result
    }

    /// Drains available bytes up to the next newline. Returns one complete
    /// line (without CR/LF), or `None` if no full line is buffered yet.
    pub fn poll_line(&mut self) -> Option<String> {
        while self.socket.available() > 0 {
            let Some(byte) = self.socket.read_byte() else { break };
            match byte {
                b'\r' => continue,
                b'\n' => {
                    let overflowed = std::mem::replace(&mut self.overflowed, false);
                    let line = String::from_utf8_lossy(&self.line).into_owned();
                    self.line.clear();
                    if overflowed {
                        self.logger.log("APRS-IS line too long, dropped", LOG_DEBUG);
                        return None;
                    }
                    return Some(line);
                }
                b => {
                    if self.line.len() >= MAX_LINE_LEN {
                        self.overflowed = true;
                    } else {
                        self.line.push(b);
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{ManualClock, MockSocket};

    fn config(persistent: bool) -> Config {
        Config {
            callsign: "N0CALL".to_string(),
            aprs_pass: "12345".to_string(),
            persistent_connection: persistent,
            reconnect_delay_ms: 5_000,
            ..Config::default()
        }
    }

    fn connection(socket: MockSocket, persistent: bool) -> AprsisConnection<MockSocket> {
        AprsisConnection::new(socket, &config(persistent), Arc::new(Logger::silent()))
    }

    #[test]
    fn test_login_sent_once_per_connection() {
        let mut conn = connection(MockSocket::default(), true);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        conn.ensure_connected().unwrap();
        conn.ensure_connected().unwrap();
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(conn.socket().written.len(), 1);
        assert!(conn.socket().written[0].starts_with("user N0CALL pass 12345 vers rloraprs "));
        assert!(conn.socket().written[0].ends_with('\n'));
    }

    #[test]
    fn test_failed_connect_is_reported() {
        let socket = MockSocket { connect_failures: 1, ..MockSocket::default() };
        let mut conn = connection(socket, true);
        assert!(matches!(conn.ensure_connected(), Err(GatewayError::Connect { .. })));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.ensure_connected().is_ok());
    }

    #[test]
    fn test_connect_blocking_retries_with_fixed_delay() {
        let socket = MockSocket { connect_failures: 3, ..MockSocket::default() };
        let mut conn = connection(socket, true);
        let mut clock = ManualClock::default();
        conn.connect_blocking(&mut clock, 500);
        assert_eq!(clock.delays, vec![500, 500, 500]);
        assert_eq!(conn.socket().connect_calls, 4);
        assert_eq!(conn.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_transient_send_closes() {
        let mut conn = connection(MockSocket::default(), false);
        conn.send_line("N0CALL>APRS:>hello").unwrap();
        assert_eq!(conn.socket().lines, vec!["N0CALL>APRS:>hello".to_string()]);
        assert_eq!(conn.socket().closes, 1);
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        // Next send logs in again
        conn.send_line("N0CALL>APRS:>again").unwrap();
        assert_eq!(conn.socket().written.len(), 2);
    }

    #[test]
    fn test_persistent_send_stays_open() {
        let mut conn = connection(MockSocket::default(), true);
        conn.send_line("N0CALL>APRS:>one").unwrap();
        conn.send_line("N0CALL>APRS:>two").unwrap();
        assert_eq!(conn.socket().closes, 0);
        assert_eq!(conn.socket().connect_calls, 1);
    }

    #[test]
    fn test_send_dropped_when_unreachable() {
        let socket = MockSocket { connect_failures: 10, ..MockSocket::default() };
        let mut conn = connection(socket, true);
        assert!(conn.send_line("N0CALL>APRS:>lost").is_err());
        assert!(conn.socket().lines.is_empty());
        // Not queued for later
        conn.ensure_connected().unwrap_err();
        assert!(conn.socket().lines.is_empty());
    }

    #[test]
    fn test_maintain_is_rate_limited_across_wrap() {
        let socket = MockSocket { connect_failures: 2, ..MockSocket::default() };
        let mut conn = connection(socket, true);
        let start = u32::MAX - 1_000;
        conn.maintain(start);
        assert_eq!(conn.socket().connect_calls, 1);
        conn.maintain(start.wrapping_add(4_999));
        assert_eq!(conn.socket().connect_calls, 1);
        conn.maintain(start.wrapping_add(5_000));
        assert_eq!(conn.socket().connect_calls, 2);
        conn.maintain(start.wrapping_add(10_000));
        assert_eq!(conn.socket().connect_calls, 3);
        assert_eq!(conn.state(), ConnectionState::Connected);
        conn.maintain(start.wrapping_add(20_000));
        assert_eq!(conn.socket().connect_calls, 3);
    }

    #[test]
    fn test_maintain_notices_drop_and_reconnects() {
        let mut conn = connection(MockSocket::default(), true);
        conn.maintain(0);
        assert_eq!(conn.last_state, ConnectionState::Connected);
        conn.socket_mut().connected = false;
        conn.socket_mut().connect_failures = 1;
        conn.maintain(100);
        assert_eq!(conn.last_state, ConnectionState::Disconnected);
        assert_eq!(conn.socket().connect_calls, 1);
        conn.maintain(5_000);
        assert_eq!(conn.socket().connect_calls, 2);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        conn.maintain(10_000);
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(conn.last_state, ConnectionState::Connected);
        assert_eq!(conn.socket().written.len(), 2);
    }

    #[test]
    fn test_maintain_ignored_in_transient_mode() {
        let mut conn = connection(MockSocket::default(), false);
        conn.maintain(0);
        assert_eq!(conn.socket().connect_calls, 0);
    }

    #[test]
    fn test_poll_line_handles_partial_and_crlf() {
        let mut socket = MockSocket { connected: true, ..MockSocket::default() };
        socket.push_incoming("# aprsc 2.1\r\nN0CALL>AP");
        let mut conn = connection(socket, true);
        assert_eq!(conn.poll_line(), Some("# aprsc 2.1".to_string()));
        assert_eq!(conn.poll_line(), None);
        conn.socket.push_incoming("RS:>hi\r\n");
        assert_eq!(conn.poll_line(), Some("N0CALL>APRS:>hi".to_string()));
    }

    #[test]
    fn test_poll_line_one_per_call() {
        let mut socket = MockSocket { connected: true, ..MockSocket::default() };
        socket.push_incoming("a\nb\n");
        let mut conn = connection(socket, true);
        assert_eq!(conn.poll_line(), Some("a".to_string()));
        assert_eq!(conn.poll_line(), Some("b".to_string()));
        assert_eq!(conn.poll_line(), None);
    }

    #[test]
    fn test_poll_line_drops_oversized() {
        let mut socket = MockSocket { connected: true, ..MockSocket::default() };
        socket.push_incoming(&"x".repeat(MAX_LINE_LEN + 10));
        socket.push_incoming("\nok\n");
        let mut conn = connection(socket, true);
        assert_eq!(conn.poll_line(), None);
        assert_eq!(conn.poll_line(), Some("ok".to_string()));
    }
}
