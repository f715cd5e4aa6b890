// rloraprs - Routing Policy Module
// Decides which transports re-emit a frame, given where it came from

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Radio,
    Internet,
    Serial,
    Beacon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingFlags {
    pub is_client: bool,
    pub rf_to_is: bool,
    pub is_to_rf: bool,
    pub repeater: bool,
}

impl RoutingFlags {
    pub fn from_config(config: &Config) -> Self {
        RoutingFlags {
            is_client: config.is_client,
            rf_to_is: config.enable_rf_to_is,
            is_to_rf: config.enable_is_to_rf,
            repeater: config.enable_repeater,
        }
    }

    /// Whether the codec should be asked to digirepeat a radio frame.
    pub fn may_digipeat(&self) -> bool {
        !self.is_client && self.repeater
    }
}

/// Targets a frame is re-emitted on. All false means drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Routes {
    pub aprsis: bool,
    pub radio: bool,
    pub kiss: bool,
}

#[cfg(test)]
impl Routes {
    pub fn is_drop(&self) -> bool {
        !self.aprsis && !self.radio && !self.kiss
    }
}

/// `digipeat_eligible` is the codec's answer for this frame and only
/// matters for radio-origin frames.
pub fn route(origin: Origin, valid: bool, digipeat_eligible: bool, flags: &RoutingFlags) -> Routes {
    match origin {
        Origin::Radio if valid => Routes {
            aprsis: !flags.is_client && flags.rf_to_is,
            radio: flags.may_digipeat() && digipeat_eligible,
            kiss: true,
        },
        Origin::Internet if valid => Routes {
            radio: flags.is_to_rf,
            ..Routes::default()
        },
        // Raw KISS payloads go on air unchecked
        Origin::Serial => Routes { radio: true, ..Routes::default() },
        Origin::Beacon if valid => Routes {
            aprsis: !flags.is_client && flags.rf_to_is,
            radio: true,
            kiss: false,
        },
        _ => Routes::default(),
    }
}
