// rloraprs - AX.25 Packet Module
// Binary and TNC2 text codec for AX.25 UI frames, plus digipeat path rewriting

use std::fmt;

use crate::error::GatewayError;

pub const AX25_CONTROL_UI: u8 = 0x03;
pub const AX25_PID_NO_LAYER3: u8 = 0xF0;
pub const MAX_DIGIPEATERS: usize = 8;

const ADDRESS_LEN: usize = 7;
const SSID_RESERVED_BITS: u8 = 0x60;
const SSID_LAST_ADDRESS: u8 = 0x01;
const SSID_COMMAND_OR_REPEATED: u8 = 0x80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callsign {
    call: String,
    ssid: u8,
}

impl Callsign {
    pub fn new(call: &str, ssid: u8) -> Result<Self, GatewayError> {
        let call = call.to_ascii_uppercase();
        if call.is_empty() || call.len() > 6 || !call.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(GatewayError::InvalidPacket(format!("bad callsign '{}'", call)));
        }
        if ssid > 15 {
            return Err(GatewayError::InvalidPacket(format!("bad SSID {} for {}", ssid, call)));
        }
        Ok(Callsign { call, ssid })
    }

    /// Parses `CALL` or `CALL-N`.
    pub fn parse(text: &str) -> Result<Self, GatewayError> {
        match text.split_once('-') {
            Some((call, ssid)) => {
                let ssid = ssid.parse::<u8>()
                    .map_err(|_| GatewayError::InvalidPacket(format!("bad SSID in '{}'", text)))?;
                Callsign::new(call, ssid)
            }
            None => Callsign::new(text, 0),
        }
    }

    #[cfg(test)]
    pub fn call(&self) -> &str {
        &self.call
    }

    #[cfg(test)]
    pub fn ssid(&self) -> u8 {
        self.ssid
    }

    /// `WIDEn-N` path alias: returns n when the callsign is one.
    fn wide_hops(&self) -> Option<u8> {
        let n = self.call.strip_prefix("WIDE")?;
        match n.parse::<u8>() {
            Ok(n) if (1..=7).contains(&n) => Some(n),
            _ => None,
        }
    }

    fn from_ax25_bytes(bytes: &[u8]) -> Result<(Self, u8), GatewayError> {
        let call: String = bytes[..6].iter().map(|&b| (b >> 1) as char).collect();
        let ssid_byte = bytes[6];
        // Only trailing padding; embedded spaces make the address invalid
        let callsign = Callsign::new(call.trim_end_matches(' '), (ssid_byte >> 1) & 0x0F)?;
        Ok((callsign, ssid_byte))
    }

    fn write_ax25_bytes(&self, out: &mut Vec<u8>, flags: u8) {
        let padded = format!("{:<6}", self.call);
        out.extend(padded.bytes().map(|b| b << 1));
        out.push(SSID_RESERVED_BITS | (self.ssid << 1) | flags);
    }
}

impl fmt::Display for Callsign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ssid == 0 { write!(f, "{}", self.call) }
        else { write!(f, "{}-{}", self.call, self.ssid) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub callsign: Callsign,
    pub repeated: bool,
}

/// An APRS UI frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub source: Callsign,
    pub destination: Callsign,
    pub path: Vec<PathEntry>,
    pub info: Vec<u8>,
}

impl Packet {
    /// Parses a raw AX.25 frame as received over the air.
    pub fn from_binary(data: &[u8]) -> Result<Self, GatewayError> {
        if data.len() < 2 * ADDRESS_LEN + 2 {
            return Err(GatewayError::InvalidPacket(format!("frame too short ({} bytes)", data.len())));
        }
        let (destination, _) = Callsign::from_ax25_bytes(&data[0..ADDRESS_LEN])?;
        let (source, source_ssid) = Callsign::from_ax25_bytes(&data[ADDRESS_LEN..2 * ADDRESS_LEN])?;
        let mut offset = 2 * ADDRESS_LEN;
        let mut path = Vec::new();
        let mut last = source_ssid & SSID_LAST_ADDRESS != 0;
        while !last {
            if offset + ADDRESS_LEN > data.len() {
                return Err(GatewayError::InvalidPacket("truncated address field".to_string()));
            }
            if path.len() == MAX_DIGIPEATERS {
                return Err(GatewayError::InvalidPacket("too many digipeaters".to_string()));
            }
            let (callsign, ssid_byte) = Callsign::from_ax25_bytes(&data[offset..offset + ADDRESS_LEN])?;
            path.push(PathEntry { callsign, repeated: ssid_byte & SSID_COMMAND_OR_REPEATED != 0 });
            last = ssid_byte & SSID_LAST_ADDRESS != 0;
            offset += ADDRESS_LEN;
        }
        if offset + 2 > data.len() {
            return Err(GatewayError::InvalidPacket("missing control/PID".to_string()));
        }
        let control = data[offset];
        let pid = data[offset + 1];
        if control != AX25_CONTROL_UI || pid != AX25_PID_NO_LAYER3 {
            return Err(GatewayError::InvalidPacket(format!(
                "unsupported frame (control 0x{:02x}, PID 0x{:02x})", control, pid
            )));
        }
        Ok(Packet { source, destination, path, info: data[offset + 2..].to_vec() })
    }

    /// Parses the TNC2 text form `SRC>DST[,DIGI[*]...]:info`.
    pub fn from_text(text: &str) -> Result<Self, GatewayError> {
        let (header, info) = text.split_once(':')
            .ok_or_else(|| GatewayError::InvalidPacket(format!("no info field in '{}'", text)))?;
        let (source, rest) = header.split_once('>')
            .ok_or_else(|| GatewayError::InvalidPacket(format!("no destination in '{}'", text)))?;
        let mut parts = rest.split(',');
        let destination = Callsign::parse(parts.next().unwrap_or(""))?;
        let mut path = Vec::new();
        for part in parts {
            if path.len() == MAX_DIGIPEATERS {
                return Err(GatewayError::InvalidPacket("too many digipeaters".to_string()));
            }
            let (call, repeated) = match part.strip_suffix('*') {
                Some(call) => (call, true),
                None => (part, false),
            };
            path.push(PathEntry { callsign: Callsign::parse(call)?, repeated });
        }
        if info.is_empty() {
            return Err(GatewayError::InvalidPacket("empty info field".to_string()));
        }
        Ok(Packet {
            source: Callsign::parse(source)?,
            destination,
            path,
            info: info.as_bytes().to_vec(),
        })
    }

    /// Encodes the frame for transmission. Fails rather than truncating
    /// when the encoded frame would not fit in `capacity` bytes.
    pub fn to_binary(&self, capacity: usize) -> Result<Vec<u8>, GatewayError> {
        let len = ADDRESS_LEN * (2 + self.path.len()) + 2 + self.info.len();
        if len > capacity {
            return Err(GatewayError::CapacityExceeded { len, capacity });
        }
        let mut out = Vec::with_capacity(len);
        self.destination.write_ax25_bytes(&mut out, SSID_COMMAND_OR_REPEATED);
        let source_flags = if self.path.is_empty() { SSID_LAST_ADDRESS } else { 0 };
        self.source.write_ax25_bytes(&mut out, source_flags);
        for (i, entry) in self.path.iter().enumerate() {
            let mut flags = if entry.repeated { SSID_COMMAND_OR_REPEATED } else { 0 };
            if i + 1 == self.path.len() { flags |= SSID_LAST_ADDRESS; }
            entry.callsign.write_ax25_bytes(&mut out, flags);
        }
        out.push(AX25_CONTROL_UI);
        out.push(AX25_PID_NO_LAYER3);
        out.extend_from_slice(&self.info);
        Ok(out)
    }

    /// TNC2 text form with an optional suffix appended to the info field.
    pub fn to_text(&self, suffix: Option<&str>) -> String {
        let mut text = format!("{}>{}", self.source, self.destination);
        for entry in &self.path {
            text.push(',');
            text.push_str(&entry.callsign.to_string());
            if entry.repeated { text.push('*'); }
        }
        text.push(':');
        text.push_str(&String::from_utf8_lossy(&self.info));
        if let Some(suffix) = suffix { text.push_str(suffix); }
        text
    }

    /// Rewrites the path when this station should digipeat the frame.
    /// Returns false and leaves the frame untouched otherwise.
    pub fn digirepeat(&mut self, own: &Callsign) -> bool {
        let Some(index) = self.path.iter().position(|e| !e.repeated) else {
            return false;
        };
        let entry = &mut self.path[index];
        if entry.callsign == *own {
            entry.repeated = true;
            return true;
        }
        if entry.callsign.wide_hops().is_some() && entry.callsign.ssid > 0 {
            if self.path.len() == MAX_DIGIPEATERS {
                return false;
            }
            let entry = &mut self.path[index];
            entry.callsign.ssid -= 1;
            if entry.callsign.ssid == 0 { entry.repeated = true; }
            self.path.insert(index, PathEntry { callsign: own.clone(), repeated: true });
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn own() -> Callsign {
        Callsign::parse("N0CALL-10").unwrap()
    }

    #[test]
    fn test_callsign_parse() {
        let call = Callsign::parse("n0call-7").unwrap();
        assert_eq!(call.call(), "N0CALL");
        assert_eq!(call.ssid(), 7);
        assert_eq!(call.to_string(), "N0CALL-7");
        assert_eq!(Callsign::parse("APRS").unwrap().to_string(), "APRS");
        assert!(Callsign::parse("TOOLONG1").is_err());
        assert!(Callsign::parse("N0CALL-16").is_err());
        assert!(Callsign::parse("N0-CALL-x").is_err());
        assert!(Callsign::parse("").is_err());
    }

    #[test]
    fn test_text_parse_and_render() {
        let text = "N0CALL-7>APRS,WIDE1*,WIDE2-1:!4903.50N/07201.75W-Test";
        let packet = Packet::from_text(text).unwrap();
        assert_eq!(packet.source.to_string(), "N0CALL-7");
        assert_eq!(packet.destination.to_string(), "APRS");
        assert_eq!(packet.path.len(), 2);
        assert!(packet.path[0].repeated);
        assert!(!packet.path[1].repeated);
        assert_eq!(packet.to_text(None), text);
        assert_eq!(
            packet.to_text(Some(" rssi: -90.00dBm")),
            format!("{} rssi: -90.00dBm", text)
        );
    }

    #[test]
    fn test_info_may_contain_colons() {
        let packet = Packet::from_text("N0CALL>APRS::N0CALL-1 :hello").unwrap();
        assert_eq!(packet.info, b":N0CALL-1 :hello".to_vec());
    }

    #[test]
    fn test_text_rejects_malformed() {
        assert!(Packet::from_text("garbage").is_err());
        assert!(Packet::from_text("N0CALL:no destination").is_err());
        assert!(Packet::from_text("N0CALL>APRS:").is_err());
        assert!(Packet::from_text("N0CALL>APRS,BAD-CALL-X:x").is_err());
    }

    #[test]
    fn test_binary_round_trip_preserves_path_flags() {
        let packet = Packet::from_text("N0CALL-7>APRS,N1ABC*,WIDE2-1:>status").unwrap();
        let binary = packet.to_binary(512).unwrap();
        assert_eq!(binary.len(), 4 * 7 + 2 + 7);
        let parsed = Packet::from_binary(&binary).unwrap();
        assert_eq!(parsed, packet);
    }

    #[test]
    fn test_binary_layout() {
        let packet = Packet::from_text("N0CALL>APRS:x").unwrap();
        let binary = packet.to_binary(512).unwrap();
        assert_eq!(&binary[0..6], &[b'A' << 1, b'P' << 1, b'R' << 1, b'S' << 1, b' ' << 1, b' ' << 1]);
        assert_eq!(binary[6], 0xE0);
        assert_eq!(binary[13], 0x61);
        assert_eq!(&binary[14..], &[AX25_CONTROL_UI, AX25_PID_NO_LAYER3, b'x']);
    }

    #[test]
    fn test_binary_rejects_non_ui() {
        let packet = Packet::from_text("N0CALL>APRS:x").unwrap();
        let mut binary = packet.to_binary(512).unwrap();
        binary[14] = 0x2F;
        assert!(Packet::from_binary(&binary).is_err());
        assert!(Packet::from_binary(&[0x82; 10]).is_err());
    }

    #[test]
    fn test_binary_rejects_embedded_space_in_address() {
        let packet = Packet::from_text("N0CAL>APRS:x").unwrap();
        let mut binary = packet.to_binary(512).unwrap();
        // Source "N0CAL " becomes "N0 CAL"
        binary[7..13].copy_from_slice(&[b'N' << 1, b'0' << 1, b' ' << 1, b'C' << 1, b'A' << 1, b'L' << 1]);
        assert!(Packet::from_binary(&binary).is_err());

        // Trailing padding alone is fine
        let parsed = Packet::from_binary(&packet.to_binary(512).unwrap()).unwrap();
        assert_eq!(parsed.source.to_string(), "N0CAL");
    }

    #[test]
    fn test_binary_rejects_truncated_path() {
        let packet = Packet::from_text("N0CALL>APRS,WIDE1-1:x").unwrap();
        let binary = packet.to_binary(512).unwrap();
        assert!(Packet::from_binary(&binary[..18]).is_err());
    }

    #[test]
    fn test_to_binary_capacity_is_checked() {
        let info = "x".repeat(600);
        let packet = Packet::from_text(&format!("N0CALL>APRS:{}", info)).unwrap();
        match packet.to_binary(512) {
            Err(GatewayError::CapacityExceeded { len, capacity }) => {
                assert_eq!(len, 14 + 2 + 600);
                assert_eq!(capacity, 512);
            }
            other => panic!("expected capacity error, got {:?}", other),
        }
    }

    #[test]
    fn test_digirepeat_own_callsign() {
        let mut packet = Packet::from_text("N1ABC>APRS,N0CALL-10,WIDE2-2:x").unwrap();
        assert!(packet.digirepeat(&own()));
        assert_eq!(packet.to_text(None), "N1ABC>APRS,N0CALL-10*,WIDE2-2:x");
    }

    #[test]
    fn test_digirepeat_used_own_callsign_is_ignored() {
        let mut packet = Packet::from_text("N1ABC>APRS,N0CALL-10*:x").unwrap();
        assert!(!packet.digirepeat(&own()));
        assert_eq!(packet.to_text(None), "N1ABC>APRS,N0CALL-10*:x");
    }

    #[test]
    fn test_digirepeat_wide_alias() {
        let mut packet = Packet::from_text("N1ABC>APRS,WIDE1-1:x").unwrap();
        assert!(packet.digirepeat(&own()));
        assert_eq!(packet.to_text(None), "N1ABC>APRS,N0CALL-10*,WIDE1*:x");

        let mut packet = Packet::from_text("N1ABC>APRS,N2XYZ*,WIDE2-2:x").unwrap();
        assert!(packet.digirepeat(&own()));
        assert_eq!(packet.to_text(None), "N1ABC>APRS,N2XYZ*,N0CALL-10*,WIDE2-1:x");
    }

    #[test]
    fn test_digirepeat_not_in_path() {
        let mut packet = Packet::from_text("N1ABC>APRS,N2XYZ:x").unwrap();
        let before = packet.clone();
        assert!(!packet.digirepeat(&own()));
        assert_eq!(packet, before);

        let mut packet = Packet::from_text("N1ABC>APRS:x").unwrap();
        assert!(!packet.digirepeat(&own()));
    }
}
