// rloraprs - LoRa APRS iGate
//
// Copyright (C) 2025 Kris Kirby
//
// SPDX-License-Identifier: GPL-3.0-or-later
//
// rloraprs main source
//
// This file is part of rloraprs.
//
// rloraprs is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// rloraprs is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with rloraprs.  If not, see <https://www.gnu.org/licenses/>.
//
// This program bridges a LoRa modem carrying AX.25 UI frames to the APRS-IS
// network. Frames heard on the air are uplinked in TNC2 text form, lines from
// APRS-IS can be transmitted on the air, frames addressed through this
// station can be digirepeated, and a local KISS TNC client on a serial port
// sees every frame heard and may transmit its own.

mod aprsis;
mod ax25;
mod beacon;
mod config;
mod error;
mod freq_correction;
mod gateway;
mod kiss;
mod logger;
mod lora_modem;
mod routing;
mod serial_channel;
mod tcp_socket;
mod transport;

use std::fs::File;
use std::io::Write;
use std::sync::Arc;

use config::{Config, FlowControl, Parity, SerialSettings, StopBits, DEFAULT_CONFIG_FILE, PRODUCT_NAME, PRODUCT_VERSION};
use gateway::Gateway;
use logger::{Logger, LOG_NOTICE};
use lora_modem::SerialModem;
use serial_channel::SerialPortChannel;
use tcp_socket::TcpSocket;
use transport::SystemClock;

fn write_pidfile(pidfile: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = File::create(pidfile)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(())
}

fn describe_serial(settings: &SerialSettings) -> String {
    let flow_str = match settings.flow_control {
        FlowControl::None => "no flow control",
        FlowControl::Software => "XON/XOFF",
        FlowControl::Hardware => "RTS/CTS",
        FlowControl::DtrDsr => "DTR/DSR",
    };
    let parity_str = match settings.parity {
        Parity::None => "N",
        Parity::Odd => "O",
        Parity::Even => "E",
    };
    let stop_str = match settings.stop_bits {
        StopBits::One => "1",
        StopBits::Two => "2",
    };
    format!("{} @ {} baud, 8{}{}, {}", settings.device, settings.baud_rate, parity_str, stop_str, flow_str)
}

fn on_off(flag: bool) -> &'static str {
    if flag { "ON" } else { "OFF" }
}

fn show_help(program_name: &str) {
    println!("{} - LoRa APRS iGate\n", PRODUCT_NAME);
    println!("Usage: {} [OPTIONS]\n", program_name);
    println!("Station Options:");
    println!("  -m, --callsign <call>  Own callsign with optional SSID (N0CALL-10)");
    println!("  -C, --client           Client mode: no APRS-IS, no digirepeat");
    println!("  -r, --repeater         Digirepeat frames addressed through this station");
    println!("  -B, --beacon-enable    Send the configured beacon periodically");
    println!("\nAPRS-IS Options:");
    println!("  -H, --host <host>      APRS-IS server (default: rotate.aprs2.net)");
    println!("  -p, --port <port>      APRS-IS port (default: 14580)");
    println!("  -T, --transient        Connect per uplink instead of staying connected");
    println!("\nRadio Options:");
    println!("  -M, --modem <dev>      Serial port of the LoRa modem");
    println!("  -f, --frequency <hz>   Operating frequency in Hz (default: 433775000)");
    println!("  -F, --auto-freq        Retune by the reported frequency error");
    println!("  -S, --signal-report    Append RSSI/SNR/frequency error to uplinked packets");
    println!("\nKISS Options:");
    println!("  -K, --kiss-port <dev>  Serial port for a local KISS TNC client");
    println!("\nLogging Options:");
    println!("  -d, --dump             Dump frames in xxd format at debug level");
    println!("  -l, --logfile <file>   Log file path");
    println!("  -L, --log-level <0-9>  Log level (default: 5)");
    println!("  --console-only         Log only to console");
    println!("  --no-console           Log only to file");
    println!("\nOther Options:");
    println!("  -P, --pidfile <file>   PID file path");
    println!("  -c <file>              Config file (default: {})", DEFAULT_CONFIG_FILE);
    println!("  -q, --quiet            Quiet startup");
    println!("  -h, --help             Show this help\n");
    println!("Config file options:");
    println!("  client_mode, callsign, aprs_host, aprs_port, aprs_pass, aprs_filter");
    println!("  beacon, beacon_period_minutes, enable_beacon");
    println!("  lora_freq, lora_bw, lora_sf (6-12), lora_cr (5-8), lora_power, lora_sync");
    println!("  rf_to_is, is_to_rf, repeater, auto_correct_freq, signal_report, persistent_conn");
    println!("  modem_port, modem_baud_rate");
    println!("  kiss_port, kiss_baud_rate, kiss_flow_control, kiss_stop_bits, kiss_parity");
    println!("  poll_delay_ms, retry_delay_ms, reconnect_delay_ms");
    println!("  dump, log_level, logfile, pidfile, quiet_startup\n");
    println!("Examples:");
    println!("  {} -M /dev/ttyUSB0 -m N0CALL-10        # RX-only iGate", program_name);
    println!("  {} -M /dev/ttyUSB0 -K /dev/ttyS1 -r    # With KISS port and digirepeat", program_name);
    println!("  {} -c /etc/rloraprs.cfg -q             # Alternate config file", program_name);
    println!("\nLog levels: 0=EMERG 1=ALERT 2=CRIT 3=ERROR 4=WARN 5=NOTICE 6=INFO 7=DEBUG 8=TRACE 9=VERBOSE");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    ctrlc::set_handler(move || {
        println!("\nReceived SIGINT, shutting down...");
        std::process::exit(0);
    })?;

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        show_help(&args[0]);
        return Ok(());
    }

    let config_file = args.iter()
        .position(|arg| arg == "-c")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or(DEFAULT_CONFIG_FILE);

    let mut config = Config::from_file(config_file)?;
    config.apply_cli_overrides(&args);
    config.validate()?;

    if !config.quiet_startup {
        println!("{} {} - LoRa APRS iGate", PRODUCT_NAME, PRODUCT_VERSION);
        println!("==========================");
        println!("Configuration from: {}", config_file);
        println!("  Callsign: {}{}", config.callsign, if config.is_client { " (client mode)" } else { "" });
        println!("  LoRa modem: {}", describe_serial(&config.modem));
        println!("  LoRa: {} Hz, BW {} Hz, SF{}, CR4/{}, {} dBm, sync 0x{:02X}",
                 config.radio.frequency,
                 config.radio.bandwidth,
                 config.radio.spreading_factor,
                 config.radio.coding_rate,
                 config.radio.tx_power,
                 config.radio.sync_word);
        match config.kiss {
            Some(ref kiss) => println!("  KISS port: {}", describe_serial(kiss)),
            None => println!("  KISS port: none"),
        }
        if config.needs_aprsis() {
            println!("  APRS-IS: {}:{} ({})", config.aprs_host, config.aprs_port,
                     if config.persistent_connection { "persistent" } else { "transient" });
        }
        println!("  RF->IS: {}  IS->RF: {}  Repeater: {}",
                 on_off(config.enable_rf_to_is), on_off(config.enable_is_to_rf), on_off(config.enable_repeater));
        println!("  Beacon: {}", if config.needs_beacon() {
            format!("every {} min", config.beacon_period_minutes)
        } else {
            "OFF".to_string()
        });
        println!("  Frequency correction: {}  Signal report: {}",
                 on_off(config.auto_correct_frequency), on_off(config.add_signal_report));
        println!("  Log level: {}", config.log_level);
        if let Some(ref lf) = config.logfile { println!("  Log file: {}", lf); }
        if let Some(ref pf) = config.pidfile { println!("  PID file: {}", pf); }
        println!();
    }

    if let Some(ref pidfile) = config.pidfile {
        write_pidfile(pidfile)?;
        if !config.quiet_startup {
            println!("PID {} written to {}", std::process::id(), pidfile);
        }
    }

    let logger = Arc::new(Logger::new(config.logfile.clone(), config.log_level, config.log_to_console)?);
    logger.log(&format!("{} {} starting", PRODUCT_NAME, PRODUCT_VERSION), LOG_NOTICE);

    let radio = SerialModem::new(SerialPortChannel::new(config.modem.clone(), Arc::clone(&logger)));
    let kiss_peer = config.kiss.clone().map(|settings| SerialPortChannel::new(settings, Arc::clone(&logger)));

    let mut gateway = Gateway::new(config, logger, radio, TcpSocket::new(), kiss_peer, SystemClock::new());
    gateway.start();
    gateway.run()
}
