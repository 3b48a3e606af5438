//! Mode S CRC-24 parity.
//!
//! ICAO standard polynomial: x^24 + x^23 + x^22 + ... + x^10 + x^3 + 1
//! Generator: 0xFFF409
//!
//! The last 24 bits of every Mode S reply are a parity field. In extended
//! squitters it is the plain CRC, so a clean message leaves remainder 0. In
//! surveillance and Comm-B replies (formats 0/4/5/16/20/21) the CRC is XOR'd
//! with the transponder address, so the remainder *is* the address.

use crate::types::{icao_from_u32, Icao};

const GENERATOR: u32 = 0xFFF409;

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 16;
        let mut bit = 0;
        while bit < 8 {
            if crc & 0x800000 != 0 {
                crc = (crc << 1) ^ GENERATOR;
            } else {
                crc <<= 1;
            }
            crc &= 0xFFFFFF;
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = build_crc_table();

/// CRC-24 of all bytes in `data`.
pub fn crc24(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |crc, &byte| {
        ((crc << 8) ^ CRC_TABLE[(((crc >> 16) ^ byte as u32) & 0xFF) as usize]) & 0xFFFFFF
    })
}

/// Remainder of a complete message: CRC of the data bytes XOR the parity field.
///
/// Returns `None` for messages too short to carry a parity field.
pub fn residual(message: &[u8]) -> Option<u32> {
    if message.len() <= 3 {
        return None;
    }
    let n = message.len() - 3;
    let parity = (message[n] as u32) << 16 | (message[n + 1] as u32) << 8 | message[n + 2] as u32;
    Some(crc24(&message[..n]) ^ parity)
}

/// Recover the transponder address from an address/parity reply.
pub fn parity_address(message: &[u8]) -> Option<Icao> {
    residual(message).map(icao_from_u32)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
