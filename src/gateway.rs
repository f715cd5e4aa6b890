// rloraprs - Gateway Module
// The cooperative polling loop tying radio, APRS-IS and the KISS peer together

use std::sync::Arc;

use crate::aprsis::AprsisConnection;
use crate::ax25::{Callsign, Packet};
use crate::beacon::BeaconScheduler;
use crate::config::Config;
use crate::freq_correction::FrequencyCorrector;
use crate::kiss::{self, KissDecoder, MAX_FRAME_LEN};
use crate::logger::{hex_dump, Logger, LOG_DEBUG, LOG_ERROR, LOG_INFO, LOG_NOTICE, LOG_WARN};
use crate::routing::{route, Origin, RoutingFlags};
use crate::transport::{Clock, NetworkSocket, RadioPacket, RadioParams, RadioTransport, RetryGate, SerialChannel};

/// Owns every transport and all mutable runtime state. Only ever driven
/// from one thread, one `tick()` at a time.
pub struct Gateway<R, N, S, C>
where
    R: RadioTransport,
    N: NetworkSocket,
    S: SerialChannel,
    C: Clock,
{
    config: Config,
    logger: Arc<Logger>,
    flags: RoutingFlags,
    own_callsign: Option<Callsign>,
    radio: R,
    aprsis: Option<AprsisConnection<N>>,
    kiss_peer: Option<S>,
    clock: C,
    decoder: KissDecoder,
    beacon: BeaconScheduler,
    frequency: FrequencyCorrector,
    radio_retry: RetryGate,
    kiss_retry: RetryGate,
}

impl<R, N, S, C> Gateway<R, N, S, C>
where
    R: RadioTransport,
    N: NetworkSocket,
    S: SerialChannel,
    C: Clock,
{
    /// `kiss_peer` is `None` when no local KISS client is configured. The
    /// socket is only used when APRS-IS is needed at all.
    pub fn new(config: Config, logger: Arc<Logger>, radio: R, socket: N, kiss_peer: Option<S>, clock: C) -> Self {
        let own_callsign = match Callsign::parse(&config.callsign) {
            Ok(call) => Some(call),
            Err(e) => {
                logger.log(&format!("Own callsign is not valid: {}", e), LOG_ERROR);
                None
            }
        };
        let aprsis = if config.needs_aprsis() {
            Some(AprsisConnection::new(socket, &config, Arc::clone(&logger)))
        } else { None };
        Gateway {
            flags: RoutingFlags::from_config(&config),
            own_callsign,
            radio,
            aprsis,
            kiss_peer,
            clock,
            decoder: KissDecoder::new(),
            beacon: BeaconScheduler::new(config.beacon_period_ms()),
            frequency: FrequencyCorrector::new(config.radio.frequency, config.auto_correct_frequency),
            radio_retry: RetryGate::new(config.reconnect_delay_ms),
            kiss_retry: RetryGate::new(config.reconnect_delay_ms),
            config,
            logger,
        }
    }

    /// Brings up every required transport. Blocks, retrying forever with a
    /// fixed delay, until each one is ready: a dead transport stalls startup.
    pub fn start(&mut self) {
        let retry = self.config.retry_delay_ms;

        self.logger.log("LoRa init...", LOG_NOTICE);
        while let Err(e) = self.radio.begin(&self.config.radio) {
            self.logger.log(&format!("LoRa init failed, retrying: {}", e), LOG_WARN);
            self.clock.delay(retry);
        }
        self.logger.log(&format!("LoRa ready on {} Hz", self.config.radio.frequency), LOG_NOTICE);

        if let Some(peer) = self.kiss_peer.as_mut() {
            self.logger.log("KISS port init...", LOG_NOTICE);
            while let Err(e) = peer.begin() {
                self.logger.log(&format!("KISS port init failed, retrying: {}", e), LOG_WARN);
                self.clock.delay(retry);
            }
            self.logger.log("KISS port ready", LOG_NOTICE);
        }

        if let Some(aprsis) = self.aprsis.as_mut() {
            if aprsis.is_persistent() {
                aprsis.connect_blocking(&mut self.clock, retry);
            }
        }
    }

    /// One pass over all transports in fixed priority order.
    pub fn tick(&mut self) {
        self.poll_aprsis();
        self.poll_kiss_peer();
        self.poll_radio();
        self.poll_beacon();
    }

    pub fn run(&mut self) -> ! {
        loop {
            self.tick();
            self.clock.delay(self.config.poll_delay_ms);
        }
    }

    fn poll_aprsis(&mut self) {
        let now = self.clock.millis();
        let line = match self.aprsis.as_mut() {
            Some(aprsis) => {
                aprsis.maintain(now);
                aprsis.poll_line()
            }
            None => None,
        };
        if let Some(line) = line {
            self.on_aprsis_line(&line);
        }
    }

    fn on_aprsis_line(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        if line.starts_with('#') {
            self.logger.log(&format!("APRS-IS: {}", line), LOG_DEBUG);
            return;
        }
        self.logger.log(&format!("APRS-IS: {}", line), LOG_INFO);
        if !self.flags.is_to_rf {
            return;
        }
        match Packet::from_text(line) {
            Ok(packet) => {
                if route(Origin::Internet, true, false, &self.flags).radio {
                    self.send_to_radio(&packet);
                }
            }
            Err(e) => self.logger.log(&format!("Invalid payload from APRS-IS: {}", e), LOG_WARN),
        }
    }

    fn poll_kiss_peer(&mut self) {
        let now = self.clock.millis();
        let Some(peer) = self.kiss_peer.as_mut() else { return };
        if !peer.is_open() {
            if !self.kiss_retry.try_attempt(now) {
                return;
            }
            if let Err(e) = peer.begin() {
                self.logger.log(&format!("KISS port reopen failed: {}", e), LOG_WARN);
                return;
            }
            self.decoder.reset();
            self.logger.log("KISS port reopened", LOG_NOTICE);
        }
        while peer.available() > 0 {
            let Some(byte) = peer.read_byte() else { break };
            let frame = match self.decoder.feed(byte) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    self.logger.log(&format!("KISS frame dropped: {}", e), LOG_WARN);
                    continue;
                }
            };
            if !route(Origin::Serial, true, false, &self.flags).radio {
                continue;
            }
            if frame.data.is_empty() {
                self.logger.log("Empty KISS frame ignored", LOG_DEBUG);
                continue;
            }
            if self.config.dump_frames && self.logger.enabled(LOG_DEBUG) {
                self.logger.log(&hex_dump(&frame.data, "KISS -> LoRa"), LOG_DEBUG);
            }
            match self.radio.transmit(&frame.data) {
                Ok(()) => self.logger.log(&format!("KISS frame of {} bytes sent to LoRa", frame.data.len()), LOG_INFO),
                Err(e) => self.logger.log(&format!("LoRa transmit failed: {}", e), LOG_ERROR),
            }
        }
    }

    fn poll_radio(&mut self) {
        if !self.radio.is_ready() && !self.reopen_radio() {
            return;
        }
        match self.radio.receive() {
            Ok(Some(packet)) => self.on_radio_packet(packet),
            Ok(None) => {}
            Err(e) => self.logger.log(&format!("LoRa receive failed: {}", e), LOG_WARN),
        }
    }

    /// Reprograms a lost radio at the current, possibly corrected, frequency.
    fn reopen_radio(&mut self) -> bool {
        if !self.radio_retry.try_attempt(self.clock.millis()) {
            return false;
        }
        let params = RadioParams { frequency: self.frequency.frequency(), ..self.config.radio };
        match self.radio.begin(&params) {
            Ok(()) => {
                self.logger.log(&format!("LoRa link restored on {} Hz", params.frequency), LOG_NOTICE);
                true
            }
            Err(e) => {
                self.logger.log(&format!("LoRa reinit failed: {}", e), LOG_WARN);
                false
            }
        }
    }

    fn on_radio_packet(&mut self, packet: RadioPacket) {
        if self.config.dump_frames && self.logger.enabled(LOG_DEBUG) {
            self.logger.log(&hex_dump(&packet.data, "LoRa -> gateway"), LOG_DEBUG);
        }

        let mut frame = match Packet::from_binary(&packet.data) {
            Ok(frame) => frame,
            Err(e) => {
                self.logger.log(&format!("Invalid or unsupported payload from LoRa: {}", e), LOG_WARN);
                return;
            }
        };

        match self.frequency.correct(&mut self.radio, packet.signal.frequency_error) {
            Ok(Some(freq)) => self.logger.log(&format!("LoRa retuned to {} Hz", freq), LOG_DEBUG),
            Ok(None) => {}
            Err(e) => self.logger.log(&format!("Frequency correction failed: {}", e), LOG_WARN),
        }

        let suffix = if self.config.add_signal_report { Some(packet.signal.to_suffix()) } else { None };
        let text = frame.to_text(suffix.as_deref());
        self.logger.log(&text, LOG_NOTICE);

        let eligible = self.flags.may_digipeat()
            && self.own_callsign.as_ref().map_or(false, |own| frame.digirepeat(own));
        let routes = route(Origin::Radio, true, eligible, &self.flags);

        if routes.kiss {
            self.send_to_kiss_peer(&packet.data);
        }
        if routes.aprsis && self.send_to_aprsis(&text) {
            self.logger.log("Packet sent to APRS-IS", LOG_INFO);
        }
        if routes.radio && self.send_to_radio(&frame) {
            self.logger.log("Packet digirepeated", LOG_INFO);
        }
    }

    fn poll_beacon(&mut self) {
        if !self.config.needs_beacon() {
            return;
        }
        let now = self.clock.millis();
        if !self.beacon.is_due(now) {
            return;
        }
        match Packet::from_text(&self.config.beacon) {
            Ok(packet) => {
                let routes = route(Origin::Beacon, true, false, &self.flags);
                if routes.radio {
                    self.send_to_radio(&packet);
                }
                if routes.aprsis {
                    let text = packet.to_text(None);
                    self.send_to_aprsis(&text);
                }
                self.logger.log("Periodic beacon is sent", LOG_NOTICE);
            }
            Err(e) => self.logger.log(&format!("Beacon payload is invalid: {}", e), LOG_ERROR),
        }
        self.beacon.mark_sent(now);
    }

    fn send_to_radio(&mut self, packet: &Packet) -> bool {
        let data = match packet.to_binary(MAX_FRAME_LEN) {
            Ok(data) => data,
            Err(e) => {
                self.logger.log(&format!("Failed to serialize payload: {}", e), LOG_ERROR);
                return false;
            }
        };
        match self.radio.transmit(&data) {
            Ok(()) => true,
            Err(e) => {
                self.logger.log(&format!("LoRa transmit failed: {}", e), LOG_ERROR);
                false
            }
        }
    }

    fn send_to_aprsis(&mut self, text: &str) -> bool {
        let Some(aprsis) = self.aprsis.as_mut() else { return false };
        match aprsis.send_line(text) {
            Ok(()) => true,
            Err(e) => {
                self.logger.log(&format!("APRS-IS send dropped: {}", e), LOG_WARN);
                false
            }
        }
    }

    fn send_to_kiss_peer(&mut self, data: &[u8]) {
        let Some(peer) = self.kiss_peer.as_mut() else { return };
        if let Err(e) = peer.write_all(&kiss::encode(data)) {
            self.logger.log(&format!("KISS write failed: {}", e), LOG_WARN);
        }
    }

    #[cfg(test)]
    pub fn frequency(&self) -> i64 {
        self.frequency.frequency()
    }

    #[cfg(test)]
    pub fn last_beacon(&self) -> u32 {
        self.beacon.last_beacon()
    }

    #[cfg(test)]
    fn parts(&mut self) -> (&mut R, Option<&mut AprsisConnection<N>>, Option<&mut S>, &mut C) {
        (&mut self.radio, self.aprsis.as_mut(), self.kiss_peer.as_mut(), &mut self.clock)
    }
}
