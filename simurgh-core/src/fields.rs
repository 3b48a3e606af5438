//! Field extraction from Mode S payloads.
//!
//! Pure functions over raw payload bytes (byte 0 holds the downlink format):
//! - ICAO address from formats 11/17/18
//! - 13-bit surveillance altitude (formats 0/4/16/20)
//! - 12-bit AC12 altitude from airborne position squitters
//! - 8-character callsign from identification squitters
//!
//! Only the 25-ft binary altitude encoding is decoded. Metric and Gillham
//! altitudes are reported as unsupported, never guessed.

use serde::Serialize;

use crate::types::Icao;

/// ADS-B character set for callsign encoding (6 bits per character).
pub const CALLSIGN_CHARSET: &[u8; 64] =
    b"@ABCDEFGHIJKLMNOPQRSTUVWXYZ[\\]^_ !\"#$%&'()*+,-./0123456789:;<=>?";

/// Altitude encodings that are recognised but not decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AltitudeEncoding {
    Metric,
    Gillham,
}

/// Result of decoding an altitude field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Altitude {
    Feet(i32),
    Unsupported(AltitudeEncoding),
}

impl Altitude {
    pub fn feet(self) -> Option<i32> {
        match self {
            Altitude::Feet(ft) => Some(ft),
            Altitude::Unsupported(_) => None,
        }
    }
}

/// ICAO address carried in bytes 1-3 (formats 11/17/18 only).
pub fn explicit_icao(payload: &[u8]) -> Option<Icao> {
    if payload.len() < 4 {
        return None;
    }
    Some([payload[1], payload[2], payload[3]])
}

/// Decode the 13-bit altitude code of formats 0/4/16/20.
///
/// Bit 6 is the M-bit (metric), bit 4 the Q-bit (25-ft increments).
pub fn decode_ac13(code: u16) -> Altitude {
    let m_bit = (code >> 6) & 1;
    let q_bit = (code >> 4) & 1;

    if m_bit == 1 {
        return Altitude::Unsupported(AltitudeEncoding::Metric);
    }
    if q_bit == 0 {
        return Altitude::Unsupported(AltitudeEncoding::Gillham);
    }

    // Drop M and Q to get the 11-bit count.
    let n = ((code & 0x1F80) >> 2) | ((code & 0x0020) >> 1) | (code & 0x000F);
    Altitude::Feet(n as i32 * 25 - 1000)
}

/// Decode the 12-bit AC12 altitude of airborne position squitters.
///
/// Bit 4 is the Q-bit.
pub fn decode_ac12(code: u16) -> Altitude {
    let q_bit = (code >> 4) & 1;
    if q_bit == 0 {
        return Altitude::Unsupported(AltitudeEncoding::Gillham);
    }

    let n = ((code & 0x0FE0) >> 1) | (code & 0x000F);
    Altitude::Feet(n as i32 * 25 - 1000)
}

/// 13-bit altitude code from payload bytes 2-3.
pub fn ac13_field(payload: &[u8]) -> Option<u16> {
    if payload.len() < 4 {
        return None;
    }
    Some(((payload[2] as u16 & 0x1F) << 8) | payload[3] as u16)
}

/// AC12 altitude code from payload bytes 5-6.
pub fn ac12_field(payload: &[u8]) -> Option<u16> {
    if payload.len() < 7 {
        return None;
    }
    Some(((payload[5] as u16) << 4) | (payload[6] as u16 >> 4))
}

/// Decode the 8-character callsign of an identification squitter.
///
/// The characters are packed as two 24-bit groups (bytes 5-7 and 8-10), four
/// 6-bit charset indices each, most significant first. Returns `None` when
/// either group is zero: such messages carry no identification.
pub fn decode_callsign(payload: &[u8]) -> Option<String> {
    if payload.len() < 11 {
        return None;
    }

    let group = |i: usize| {
        (payload[i] as u32) << 16 | (payload[i + 1] as u32) << 8 | payload[i + 2] as u32
    };
    let groups = [group(5), group(8)];
    if groups.contains(&0) {
        return None;
    }

    let mut callsign = String::with_capacity(8);
    for g in groups {
        for shift in [18, 12, 6, 0] {
            let idx = ((g >> shift) & 0x3F) as usize;
            callsign.push(CALLSIGN_CHARSET[idx] as char);
        }
    }
    Some(callsign)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
