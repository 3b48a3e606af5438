//! Decode Mode S payloads into typed messages.
//!
//! Dispatch is by downlink format (top 5 bits of byte 0), then for extended
//! squitters by type code (top 5 bits of byte 4):
//! - DF11:            All-call reply (address only)
//! - DF0/4/16/20:     Altitude replies (13-bit altitude, parity address)
//! - DF17/18 TC 1-4:  Identification (callsign)
//! - DF17/18 TC 5-8:  Surface position (CPR, not resolved)
//! - DF17/18 TC 9-18: Airborne position (AC12 altitude + CPR)
//! - DF17/18 TC 20-22: Airborne position, GNSS height (CPR only)
//!
//! Everything else decodes to [`Content::Unsupported`]: it is parsed far
//! enough to be identified and then ignored.

use crate::cpr::{CprFrame, Parity};
use crate::crc;
use crate::fields::{self, Altitude};
use crate::types::Icao;

/// Payload length of short (56-bit) replies.
pub const SHORT_LEN: usize = 7;
/// Payload length of long (112-bit) replies.
pub const LONG_LEN: usize = 14;

// ---------------------------------------------------------------------------
// Downlink format
// ---------------------------------------------------------------------------

/// Mode S downlink format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownlinkFormat {
    /// DF0
    ShortAirAir,
    /// DF4
    SurveillanceAltitude,
    /// DF5
    SurveillanceIdentity,
    /// DF11
    AllCallReply,
    /// DF16
    LongAirAir,
    /// DF17
    ExtendedSquitter,
    /// DF18
    NonTransponderSquitter,
    /// DF19
    MilitarySquitter,
    /// DF20
    CommBAltitude,
    /// DF21
    CommBIdentity,
    /// DF24 and up (only the top two bits are significant)
    CommD,
    /// Any other code
    Unassigned(u8),
}

/// Where a format carries the transponder address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    /// Bytes 1-3.
    Explicit,
    /// Overlaid on the parity field.
    Parity,
    /// Not recoverable.
    None,
}

impl DownlinkFormat {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => DownlinkFormat::ShortAirAir,
            4 => DownlinkFormat::SurveillanceAltitude,
            5 => DownlinkFormat::SurveillanceIdentity,
            11 => DownlinkFormat::AllCallReply,
            16 => DownlinkFormat::LongAirAir,
            17 => DownlinkFormat::ExtendedSquitter,
            18 => DownlinkFormat::NonTransponderSquitter,
            19 => DownlinkFormat::MilitarySquitter,
            20 => DownlinkFormat::CommBAltitude,
            21 => DownlinkFormat::CommBIdentity,
            24..=31 => DownlinkFormat::CommD,
            other => DownlinkFormat::Unassigned(other),
        }
    }

    /// Format from the first payload byte.
    pub fn from_byte(byte: u8) -> Self {
        DownlinkFormat::from_code(byte >> 3)
    }

    pub fn code(self) -> u8 {
        match self {
            DownlinkFormat::ShortAirAir => 0,
            DownlinkFormat::SurveillanceAltitude => 4,
            DownlinkFormat::SurveillanceIdentity => 5,
            DownlinkFormat::AllCallReply => 11,
            DownlinkFormat::LongAirAir => 16,
            DownlinkFormat::ExtendedSquitter => 17,
            DownlinkFormat::NonTransponderSquitter => 18,
            DownlinkFormat::MilitarySquitter => 19,
            DownlinkFormat::CommBAltitude => 20,
            DownlinkFormat::CommBIdentity => 21,
            DownlinkFormat::CommD => 24,
            DownlinkFormat::Unassigned(code) => code,
        }
    }

    /// Payload length in bytes, if the format has a defined one.
    pub fn expected_len(self) -> Option<usize> {
        match self {
            DownlinkFormat::ShortAirAir
            | DownlinkFormat::SurveillanceAltitude
            | DownlinkFormat::SurveillanceIdentity
            | DownlinkFormat::AllCallReply => Some(SHORT_LEN),
            DownlinkFormat::LongAirAir
            | DownlinkFormat::ExtendedSquitter
            | DownlinkFormat::NonTransponderSquitter
            | DownlinkFormat::MilitarySquitter
            | DownlinkFormat::CommBAltitude
            | DownlinkFormat::CommBIdentity
            | DownlinkFormat::CommD => Some(LONG_LEN),
            DownlinkFormat::Unassigned(_) => None,
        }
    }

    pub fn address_mode(self) -> AddressMode {
        match self {
            DownlinkFormat::AllCallReply
            | DownlinkFormat::ExtendedSquitter
            | DownlinkFormat::NonTransponderSquitter => AddressMode::Explicit,
            DownlinkFormat::ShortAirAir
            | DownlinkFormat::SurveillanceAltitude
            | DownlinkFormat::SurveillanceIdentity
            | DownlinkFormat::LongAirAir
            | DownlinkFormat::CommBAltitude
            | DownlinkFormat::CommBIdentity => AddressMode::Parity,
            DownlinkFormat::MilitarySquitter
            | DownlinkFormat::CommD
            | DownlinkFormat::Unassigned(_) => AddressMode::None,
        }
    }
}

// ---------------------------------------------------------------------------
// Extended squitter type
// ---------------------------------------------------------------------------

/// Extended squitter message type, from the ME type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquitterType {
    /// TC 0
    NoPosition,
    /// TC 1-4
    Identification { type_code: u8 },
    /// TC 5-8
    SurfacePosition { type_code: u8 },
    /// TC 9-18
    AirbornePosition { type_code: u8 },
    /// TC 19
    AirborneVelocity { subtype: u8 },
    /// TC 20-22
    AirbornePositionGnss { type_code: u8 },
    /// TC 28
    AircraftStatus { subtype: u8 },
    /// TC 29: the subtype is the 2-bit field after the type code
    TargetState { subtype: u8 },
    /// TC 31
    OperationalStatus { subtype: u8 },
    /// TC 23-27, 30
    Reserved { type_code: u8, subtype: u8 },
}

impl SquitterType {
    /// Classify from payload byte 4 (first ME byte).
    pub fn from_me_byte(byte: u8) -> Self {
        let type_code = byte >> 3;
        let subtype = if type_code == 29 {
            (byte & 0x06) >> 1
        } else {
            byte & 0x07
        };

        match type_code {
            0 => SquitterType::NoPosition,
            1..=4 => SquitterType::Identification { type_code },
            5..=8 => SquitterType::SurfacePosition { type_code },
            9..=18 => SquitterType::AirbornePosition { type_code },
            19 => SquitterType::AirborneVelocity { subtype },
            20..=22 => SquitterType::AirbornePositionGnss { type_code },
            28 => SquitterType::AircraftStatus { subtype },
            29 => SquitterType::TargetState { subtype },
            31 => SquitterType::OperationalStatus { subtype },
            _ => SquitterType::Reserved { type_code, subtype },
        }
    }
}

// ---------------------------------------------------------------------------
// Decoded message
// ---------------------------------------------------------------------------

/// How the address of a message was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    /// Transmitted in the clear; may create a registry entry.
    Explicit(Icao),
    /// Recovered from the parity field; only trusted for known aircraft.
    Parity(Icao),
}

impl Address {
    pub fn icao(&self) -> Icao {
        match self {
            Address::Explicit(icao) | Address::Parity(icao) => *icao,
        }
    }
}

/// What a message contributed, beyond identifying its sender.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// DF0/4/16/20 altitude.
    Altitude(Altitude),
    /// TC 1-4. `None` when the message carried no callsign.
    Identification(Option<String>),
    /// TC 9-18 (with AC12 altitude) and TC 20-22 (altitude `None`).
    AirbornePosition {
        altitude: Option<Altitude>,
        cpr: CprFrame,
    },
    /// TC 5-8.
    SurfacePosition { cpr: CprFrame },
    /// Identified but nothing to decode.
    Unsupported,
}

/// A decoded Mode S message.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeSMessage {
    pub df: DownlinkFormat,
    pub address: Option<Address>,
    pub content: Content,
}

/// Extract the CPR fields from an ADS-B position squitter.
pub fn cpr_frame(payload: &[u8]) -> Option<CprFrame> {
    if payload.len() < 11 {
        return None;
    }
    let odd = (payload[6] >> 2) & 1 == 1;
    let lat = ((payload[6] as u32 & 0x03) << 15)
        | (payload[7] as u32) << 7
        | (payload[8] as u32) >> 1;
    let lon = ((payload[8] as u32 & 0x01) << 16) | (payload[9] as u32) << 8 | payload[10] as u32;

    Some(CprFrame {
        lat,
        lon,
        parity: Parity::from_bit(odd),
    })
}

fn decode_squitter(payload: &[u8]) -> Content {
    match SquitterType::from_me_byte(payload[4]) {
        SquitterType::Identification { .. } => {
            Content::Identification(fields::decode_callsign(payload))
        }
        SquitterType::SurfacePosition { .. } => match cpr_frame(payload) {
            Some(cpr) => Content::SurfacePosition { cpr },
            None => Content::Unsupported,
        },
        SquitterType::AirbornePosition { .. } => match cpr_frame(payload) {
            Some(cpr) => Content::AirbornePosition {
                altitude: fields::ac12_field(payload).map(fields::decode_ac12),
                cpr,
            },
            None => Content::Unsupported,
        },
        SquitterType::AirbornePositionGnss { .. } => match cpr_frame(payload) {
            Some(cpr) => Content::AirbornePosition {
                altitude: None,
                cpr,
            },
            None => Content::Unsupported,
        },
        SquitterType::NoPosition
        | SquitterType::AirborneVelocity { .. }
        | SquitterType::AircraftStatus { .. }
        | SquitterType::TargetState { .. }
        | SquitterType::OperationalStatus { .. }
        | SquitterType::Reserved { .. } => Content::Unsupported,
    }
}

/// Decode a Mode S payload.
///
/// Returns `None` only when the payload is empty or its length does not match
/// its downlink format. Anything else yields a message, possibly with
/// [`Content::Unsupported`].
pub fn decode(payload: &[u8]) -> Option<ModeSMessage> {
    let df = DownlinkFormat::from_byte(*payload.first()?);
    if let Some(len) = df.expected_len() {
        if payload.len() != len {
            return None;
        }
    }

    let address = match df.address_mode() {
        AddressMode::Explicit => fields::explicit_icao(payload).map(Address::Explicit),
        AddressMode::Parity => crc::parity_address(payload).map(Address::Parity),
        AddressMode::None => None,
    };

    let content = match df {
        DownlinkFormat::ShortAirAir
        | DownlinkFormat::SurveillanceAltitude
        | DownlinkFormat::LongAirAir
        | DownlinkFormat::CommBAltitude => match fields::ac13_field(payload) {
            Some(code) => Content::Altitude(fields::decode_ac13(code)),
            None => Content::Unsupported,
        },
        DownlinkFormat::ExtendedSquitter | DownlinkFormat::NonTransponderSquitter => {
            decode_squitter(payload)
        }
        DownlinkFormat::AllCallReply
        | DownlinkFormat::SurveillanceIdentity
        | DownlinkFormat::MilitarySquitter
        | DownlinkFormat::CommBIdentity
        | DownlinkFormat::CommD
        | DownlinkFormat::Unassigned(_) => Content::Unsupported,
    };

    Some(ModeSMessage {
        df,
        address,
        content,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
