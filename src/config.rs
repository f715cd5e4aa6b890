// rloraprs - Configuration Module
// Key=value config file, CLI overrides, and the APRS-IS login line

use std::collections::HashMap;
use std::fs;

use crate::ax25::Callsign;
use crate::error::GatewayError;
use crate::transport::RadioParams;

pub const PRODUCT_NAME: &str = "rloraprs";
pub const PRODUCT_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DEFAULT_CONFIG_FILE: &str = "rloraprs.cfg";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlowControl {
    None,
    Software,
    Hardware,
    DtrDsr,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopBits {
    One,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SerialSettings {
    pub device: String,
    pub baud_rate: u32,
    pub flow_control: FlowControl,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub is_client: bool,
    pub callsign: String,
    pub aprs_host: String,
    pub aprs_port: u16,
    pub aprs_pass: String,
    pub aprs_filter: String,
    pub beacon: String,
    pub beacon_period_minutes: u32,
    pub radio: RadioParams,
    pub enable_rf_to_is: bool,
    pub enable_is_to_rf: bool,
    pub enable_repeater: bool,
    pub enable_beacon: bool,
    pub auto_correct_frequency: bool,
    pub add_signal_report: bool,
    pub persistent_connection: bool,
    pub kiss: Option<SerialSettings>,
    pub modem: SerialSettings,
    pub poll_delay_ms: u32,
    pub retry_delay_ms: u32,
    pub reconnect_delay_ms: u32,
    pub dump_frames: bool,
    pub log_level: u8,
    pub logfile: Option<String>,
    pub pidfile: Option<String>,
    pub log_to_console: bool,
    pub quiet_startup: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            is_client: false,
            callsign: String::new(),
            aprs_host: "rotate.aprs2.net".to_string(),
            aprs_port: 14580,
            aprs_pass: "-1".to_string(),
            aprs_filter: String::new(),
            beacon: String::new(),
            beacon_period_minutes: 20,
            radio: RadioParams {
                frequency: 433_775_000,
                bandwidth: 125_000,
                spreading_factor: 12,
                coding_rate: 7,
                tx_power: 20,
                sync_word: 0x34,
            },
            enable_rf_to_is: true,
            enable_is_to_rf: false,
            enable_repeater: false,
            enable_beacon: false,
            auto_correct_frequency: false,
            add_signal_report: false,
            persistent_connection: true,
            kiss: None,
            modem: SerialSettings {
                device: String::new(),
                baud_rate: 115_200,
                flow_control: FlowControl::None,
                stop_bits: StopBits::One,
                parity: Parity::None,
            },
            poll_delay_ms: 10,
            retry_delay_ms: 500,
            reconnect_delay_ms: 5000,
            dump_frames: false,
            log_level: 5,
            logfile: None,
            pidfile: None,
            log_to_console: true,
            quiet_startup: false,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, GatewayError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| GatewayError::Configuration(format!("Failed to read config file '{}': {}", path, e)))?;
        Self::parse_str(&contents)
    }

    pub fn parse_str(contents: &str) -> Result<Self, GatewayError> {
        let mut config_map = HashMap::new();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let mut value = value.trim();
                if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
                    value = &value[1..value.len()-1];
                }
                config_map.insert(key.to_string(), value.to_string());
            }
        }

        let mut config = Config::default();
        let get = |key: &str| config_map.get(key).map(|v| v.as_str());

        if let Some(v) = get("client_mode") { config.is_client = parse_flag("client_mode", v)?; }
        if let Some(v) = get("callsign") { config.callsign = v.to_string(); }
        if let Some(v) = get("aprs_host") { config.aprs_host = v.to_string(); }
        if let Some(v) = get("aprs_port") { config.aprs_port = parse_number("aprs_port", v)?; }
        if let Some(v) = get("aprs_pass") { config.aprs_pass = v.to_string(); }
        if let Some(v) = get("aprs_filter") { config.aprs_filter = v.to_string(); }
        if let Some(v) = get("beacon") { config.beacon = v.to_string(); }
        if let Some(v) = get("beacon_period_minutes") { config.beacon_period_minutes = parse_number("beacon_period_minutes", v)?; }

        if let Some(v) = get("lora_freq") { config.radio.frequency = parse_number("lora_freq", v)?; }
        if let Some(v) = get("lora_bw") { config.radio.bandwidth = parse_number("lora_bw", v)?; }
        if let Some(v) = get("lora_sf") { config.radio.spreading_factor = parse_number("lora_sf", v)?; }
        if let Some(v) = get("lora_cr") { config.radio.coding_rate = parse_number("lora_cr", v)?; }
        if let Some(v) = get("lora_power") { config.radio.tx_power = parse_number("lora_power", v)?; }
        if let Some(v) = get("lora_sync") { config.radio.sync_word = parse_byte("lora_sync", v)?; }

        if let Some(v) = get("rf_to_is") { config.enable_rf_to_is = parse_flag("rf_to_is", v)?; }
        if let Some(v) = get("is_to_rf") { config.enable_is_to_rf = parse_flag("is_to_rf", v)?; }
        if let Some(v) = get("repeater") { config.enable_repeater = parse_flag("repeater", v)?; }
        if let Some(v) = get("enable_beacon") { config.enable_beacon = parse_flag("enable_beacon", v)?; }
        if let Some(v) = get("auto_correct_freq") { config.auto_correct_frequency = parse_flag("auto_correct_freq", v)?; }
        if let Some(v) = get("signal_report") { config.add_signal_report = parse_flag("signal_report", v)?; }
        if let Some(v) = get("persistent_conn") { config.persistent_connection = parse_flag("persistent_conn", v)?; }

        if let Some(device) = get("kiss_port").filter(|d| !d.is_empty()) {
            config.kiss = Some(SerialSettings {
                device: device.to_string(),
                baud_rate: get("kiss_baud_rate").map(|v| parse_number("kiss_baud_rate", v)).transpose()?.unwrap_or(9600),
                flow_control: get("kiss_flow_control").and_then(parse_flow_control).unwrap_or(FlowControl::None),
                stop_bits: get("kiss_stop_bits").and_then(parse_stop_bits).unwrap_or(StopBits::One),
                parity: get("kiss_parity").and_then(parse_parity).unwrap_or(Parity::None),
            });
        }
        if let Some(v) = get("modem_port") { config.modem.device = v.to_string(); }
        if let Some(v) = get("modem_baud_rate") { config.modem.baud_rate = parse_number("modem_baud_rate", v)?; }

        if let Some(v) = get("poll_delay_ms") { config.poll_delay_ms = parse_number("poll_delay_ms", v)?; }
        if let Some(v) = get("retry_delay_ms") { config.retry_delay_ms = parse_number("retry_delay_ms", v)?; }
        if let Some(v) = get("reconnect_delay_ms") { config.reconnect_delay_ms = parse_number("reconnect_delay_ms", v)?; }

        if let Some(v) = get("dump") { config.dump_frames = parse_flag("dump", v)?; }
        if let Some(v) = get("log_level") { config.log_level = parse_number::<u8>("log_level", v)?.min(9); }
        if let Some(v) = get("quiet_startup") { config.quiet_startup = parse_flag("quiet_startup", v)?; }
        config.logfile = get("logfile").map(str::to_string);
        config.pidfile = get("pidfile").map(str::to_string);

        Ok(config)
    }

    pub fn apply_cli_overrides(&mut self, args: &[String]) {
        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            match arg.as_str() {
                "-d" | "--dump" => self.dump_frames = true,
                "-q" | "--quiet" => self.quiet_startup = true,
                "-C" | "--client" => self.is_client = true,
                "-r" | "--repeater" => self.enable_repeater = true,
                "-B" | "--beacon-enable" => self.enable_beacon = true,
                "-F" | "--auto-freq" => self.auto_correct_frequency = true,
                "-S" | "--signal-report" => self.add_signal_report = true,
                "-T" | "--transient" => self.persistent_connection = false,
                "--no-console" => self.log_to_console = false,
                "--console-only" => { self.log_to_console = true; self.logfile = None; }
                "-m" | "--callsign" => {
                    if i + 1 < args.len() { self.callsign = args[i + 1].clone(); i += 1; }
                }
                "-H" | "--host" => {
                    if i + 1 < args.len() { self.aprs_host = args[i + 1].clone(); i += 1; }
                }
                "-p" | "--port" => {
                    if i + 1 < args.len() {
                        if let Ok(port) = args[i + 1].parse::<u16>() { self.aprs_port = port; }
                        i += 1;
                    }
                }
                "-f" | "--frequency" => {
                    if i + 1 < args.len() {
                        if let Ok(freq) = args[i + 1].parse::<i64>() { self.radio.frequency = freq; }
                        i += 1;
                    }
                }
                "-M" | "--modem" => {
                    if i + 1 < args.len() { self.modem.device = args[i + 1].clone(); i += 1; }
                }
                "-K" | "--kiss-port" => {
                    if i + 1 < args.len() {
                        let device = args[i + 1].clone();
                        match self.kiss {
                            Some(ref mut kiss) => kiss.device = device,
                            None => {
                                self.kiss = Some(SerialSettings {
                                    device,
                                    baud_rate: 9600,
                                    flow_control: FlowControl::None,
                                    stop_bits: StopBits::One,
                                    parity: Parity::None,
                                });
                            }
                        }
                        i += 1;
                    }
                }
                "-l" | "--logfile" => {
                    if i + 1 < args.len() { self.logfile = Some(args[i + 1].clone()); i += 1; }
                }
                "-P" | "--pidfile" => {
                    if i + 1 < args.len() { self.pidfile = Some(args[i + 1].clone()); i += 1; }
                }
                "-L" | "--log-level" => {
                    if i + 1 < args.len() {
                        if let Ok(level) = args[i + 1].parse::<u8>() { self.log_level = level.min(9); }
                        i += 1;
                    }
                }
                "-c" => { if i + 1 < args.len() { i += 1; } }
                _ => {}
            }
            i += 1;
        }
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.callsign.is_empty() {
            return Err(GatewayError::Configuration("Missing required config: callsign".to_string()));
        }
        Callsign::parse(&self.callsign)
            .map_err(|e| GatewayError::Configuration(format!("Own callsign is not valid: {}", e)))?;
        if self.radio.frequency <= 0 {
            return Err(GatewayError::Configuration("lora_freq must be positive".to_string()));
        }
        if !(6..=12).contains(&self.radio.spreading_factor) {
            return Err(GatewayError::Configuration(format!(
                "lora_sf must be 6-12, got: {}", self.radio.spreading_factor
            )));
        }
        if !(5..=8).contains(&self.radio.coding_rate) {
            return Err(GatewayError::Configuration(format!(
                "lora_cr must be 5-8, got: {}", self.radio.coding_rate
            )));
        }
        if self.modem.device.is_empty() {
            return Err(GatewayError::Configuration("Missing required config: modem_port".to_string()));
        }
        Ok(())
    }

    /// Login sent once per APRS-IS connection.
    pub fn login_line(&self) -> String {
        let mut login = format!(
            "user {} pass {} vers {} {}",
            self.callsign, self.aprs_pass, PRODUCT_NAME, PRODUCT_VERSION
        );
        if !self.aprs_filter.is_empty() {
            login.push_str(" filter ");
            login.push_str(&self.aprs_filter);
        }
        login.push('\n');
        login
    }

    pub fn needs_aprsis(&self) -> bool {
        !self.is_client && (self.enable_rf_to_is || self.enable_is_to_rf)
    }

    pub fn needs_beacon(&self) -> bool {
        self.enable_beacon && !self.beacon.is_empty()
    }

    pub fn beacon_period_ms(&self) -> u32 {
        self.beacon_period_minutes.saturating_mul(60 * 1000)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, GatewayError> {
    parse_bool(value)
        .ok_or_else(|| GatewayError::Configuration(format!("Invalid boolean for {}: {}", key, value)))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, GatewayError> {
    value.parse::<T>()
        .map_err(|_| GatewayError::Configuration(format!("Invalid value for {}: {}", key, value)))
}

fn parse_byte(key: &str, value: &str) -> Result<u8, GatewayError> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => value.parse::<u8>().ok(),
    };
    parsed.ok_or_else(|| GatewayError::Configuration(format!("Invalid value for {}: {}", key, value)))
}

fn parse_flow_control(s: &str) -> Option<FlowControl> {
    match s.to_lowercase().as_str() {
        "software" | "xon" | "xonxoff" | "xon-xoff" => Some(FlowControl::Software),
        "hardware" | "rtscts" | "rts-cts" | "rts/cts" => Some(FlowControl::Hardware),
        "dtrdsr" | "dtr-dsr" | "dtr/dsr" => Some(FlowControl::DtrDsr),
        "none" | "off" | "no" => Some(FlowControl::None),
        _ => None,
    }
}

fn parse_stop_bits(s: &str) -> Option<StopBits> {
    match s {
        "1" | "one" => Some(StopBits::One),
        "2" | "two" => Some(StopBits::Two),
        _ => None,
    }
}

fn parse_parity(s: &str) -> Option<Parity> {
    match s.to_lowercase().as_str() {
        "none" | "n" | "no" => Some(Parity::None),
        "odd" | "o" => Some(Parity::Odd),
        "even" | "e" => Some(Parity::Even),
        _ => None,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# iGate on 433.775
callsign = N0CALL-10
aprs_pass = 12345
aprs_filter = "r/49.0/-72.0/50"
beacon = N0CALL-10>APZMDM,WIDE1-1:!4903.50N/07201.75W&LoRa iGate
beacon_period_minutes = 10
enable_beacon = yes
repeater = on
is_to_rf = true
lora_freq = 433775000
lora_sync = 0x34
kiss_port = /dev/rfcomm0
kiss_parity = even
modem_port = /dev/ttyUSB0
log_level = 12
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::parse_str(SAMPLE).unwrap();
        assert_eq!(config.callsign, "N0CALL-10");
        assert_eq!(config.aprs_filter, "r/49.0/-72.0/50");
        assert!(config.beacon.contains(":!4903.50N"));
        assert_eq!(config.beacon_period_ms(), 600_000);
        assert!(config.enable_beacon && config.enable_repeater && config.enable_is_to_rf);
        assert!(config.enable_rf_to_is);
        assert_eq!(config.radio.sync_word, 0x34);
        let kiss = config.kiss.as_ref().unwrap();
        assert_eq!(kiss.device, "/dev/rfcomm0");
        assert_eq!(kiss.baud_rate, 9600);
        assert_eq!(kiss.parity, Parity::Even);
        assert_eq!(config.log_level, 9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shipped_sample_config() {
        let config = Config::parse_str(include_str!("../rloraprs.cfg")).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.kiss.is_none());
        assert!(config.aprs_filter.is_empty());
        assert!(!config.needs_beacon());
    }

    #[test]
    fn test_bad_boolean_is_an_error() {
        assert!(Config::parse_str("repeater = maybe").is_err());
        assert!(Config::parse_str("aprs_port = http").is_err());
    }

    #[test]
    fn test_login_line_without_filter() {
        let config = Config {
            callsign: "N0CALL".to_string(),
            aprs_pass: "12345".to_string(),
            aprs_filter: String::new(),
            ..Config::default()
        };
        assert_eq!(
            config.login_line(),
            format!("user N0CALL pass 12345 vers {} {}\n", PRODUCT_NAME, PRODUCT_VERSION)
        );
    }

    #[test]
    fn test_login_line_with_filter() {
        let config = Config {
            callsign: "N0CALL".to_string(),
            aprs_pass: "12345".to_string(),
            aprs_filter: "m/50".to_string(),
            ..Config::default()
        };
        assert!(config.login_line().ends_with(" filter m/50\n"));
    }

    #[test]
    fn test_validate() {
        let mut config = Config::parse_str(SAMPLE).unwrap();
        config.radio.spreading_factor = 13;
        assert!(config.validate().is_err());

        let mut config = Config::parse_str(SAMPLE).unwrap();
        config.callsign = "NOT A CALL".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::parse_str(SAMPLE).unwrap();
        config.modem.device.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::parse_str(SAMPLE).unwrap();
        let args: Vec<String> = ["rloraprs", "-c", "x.cfg", "-C", "-T", "-f", "434000000", "-L", "7", "-K", "/dev/ttyS1"]
            .iter().map(|s| s.to_string()).collect();
        config.apply_cli_overrides(&args);
        assert!(config.is_client);
        assert!(!config.persistent_connection);
        assert_eq!(config.radio.frequency, 434_000_000);
        assert_eq!(config.log_level, 7);
        assert_eq!(config.kiss.as_ref().unwrap().device, "/dev/ttyS1");
        assert_eq!(config.kiss.as_ref().unwrap().parity, Parity::Even);
    }

    #[test]
    fn test_needs() {
        let mut config = Config::default();
        assert!(config.needs_aprsis());
        config.is_client = true;
        assert!(!config.needs_aprsis());
        assert!(!config.needs_beacon());
        config.enable_beacon = true;
        assert!(!config.needs_beacon());
        config.beacon = "N0CALL>APRS:>hi".to_string();
        assert!(config.needs_beacon());
    }
}
