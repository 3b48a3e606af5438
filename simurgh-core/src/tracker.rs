//! Apply decoded messages to the aircraft registry.
//!
//! Pure logic, no I/O. One [`Tracker::update`] call per framed message:
//! decode, pick the registry clock, then upsert the sender's entry with
//! exactly the fields the message decoded.
//!
//! Formats 11/17/18 carry the address in the clear and may create entries.
//! Parity-address formats (0/4/5/16/20/21) only ever touch entries that
//! already exist, since a corrupted message yields a plausible but random
//! address.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use tracing::{debug, info, trace};

use crate::beast::BeastMessage;
use crate::cpr::{PairingPolicy, Resolution};
use crate::decode::{decode, Address, Content};
use crate::registry::AircraftRegistry;
use crate::types::{icao_to_string, Icao, SimurghError};

/// Where the registry clock comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClockSource {
    /// Receiver GPS time of day, falling back to arrival time when the
    /// timestamp is MLAT data or out of range.
    #[default]
    Receiver,
    /// Local time the bytes were read.
    Arrival,
}

impl FromStr for ClockSource {
    type Err = SimurghError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "receiver" => Ok(ClockSource::Receiver),
            "arrival" => Ok(ClockSource::Arrival),
            _ => Err(SimurghError::InvalidClockSource(s.to_string())),
        }
    }
}

impl fmt::Display for ClockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockSource::Receiver => f.write_str("receiver"),
            ClockSource::Arrival => f.write_str("arrival"),
        }
    }
}

/// Settings the decoding path needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerConfig {
    pub pairing: PairingPolicy,
    pub clock: ClockSource,
}

/// Tracker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Messages handed to `update`.
    pub messages: u64,
    /// Mode S messages that decoded.
    pub mode_s: u64,
    /// Mode A/C, status and undecodable Mode S messages.
    pub unsupported: u64,
    /// Messages from parity-address formats with no registry entry.
    pub unknown_address: u64,
    pub positions: u64,
    pub zone_mismatches: u64,
    pub stale_pairs: u64,
}

/// Owns the registry and feeds it.
#[derive(Debug, Default)]
pub struct Tracker {
    registry: AircraftRegistry,
    config: TrackerConfig,
    stats: TrackerStats,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Tracker {
            registry: AircraftRegistry::new(),
            config,
            stats: TrackerStats::default(),
        }
    }

    pub fn registry(&self) -> &AircraftRegistry {
        &self.registry
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Registry time for a message read at `arrival`.
    fn message_time(&self, msg: &BeastMessage, arrival: DateTime<Utc>) -> DateTime<Utc> {
        match self.config.clock {
            ClockSource::Arrival => arrival,
            ClockSource::Receiver => msg
                .receiver_time_near(arrival)
                .and_then(|t| t.gps())
                .unwrap_or(arrival),
        }
    }

    /// Process one framed message. Returns the address of the entry it
    /// updated, if any.
    pub fn update(&mut self, msg: &BeastMessage, arrival: DateTime<Utc>) -> Option<Icao> {
        self.stats.messages += 1;

        if !msg.kind.is_mode_s() {
            self.stats.unsupported += 1;
            return None;
        }

        let Some(decoded) = decode(&msg.payload) else {
            self.stats.unsupported += 1;
            trace!(len = msg.payload.len(), "undecodable Mode S payload");
            return None;
        };
        self.stats.mode_s += 1;

        let icao = match decoded.address {
            Some(Address::Explicit(icao)) => icao,
            Some(Address::Parity(icao)) if self.registry.contains(&icao) => icao,
            Some(Address::Parity(_)) => {
                self.stats.unknown_address += 1;
                return None;
            }
            None => return None,
        };

        let now = self.message_time(msg, arrival);
        let is_new = !self.registry.contains(&icao);
        let mut ac = self.registry.get_or_create(icao, now);
        ac.last_ping = now;
        ac.message_count += 1;

        match decoded.content {
            Content::Altitude(alt) => {
                if let Some(ft) = alt.feet() {
                    ac.altitude_ft = Some(ft);
                }
            }
            Content::Identification(Some(callsign)) => ac.set_callsign(&callsign),
            Content::Identification(None) => {}
            Content::AirbornePosition { altitude, cpr } => {
                if let Some(ft) = altitude.and_then(|a| a.feet()) {
                    ac.altitude_ft = Some(ft);
                }
                match ac.cpr.resolve(cpr, now, &self.config.pairing) {
                    Resolution::Resolved(pos) => {
                        ac.position = Some(pos);
                        ac.last_pos = Some(now);
                        self.stats.positions += 1;
                        trace!(icao = %icao_to_string(&icao), lat = pos.lat, lon = pos.lon, "position");
                    }
                    Resolution::Pending => {}
                    Resolution::ZoneMismatch => {
                        self.stats.zone_mismatches += 1;
                        debug!(icao = %icao_to_string(&icao), "CPR latitude zone mismatch");
                    }
                    Resolution::Stale => self.stats.stale_pairs += 1,
                }
            }
            // Surface positions need a reference location to resolve.
            Content::SurfacePosition { .. } => {}
            Content::Unsupported => {}
        }

        if is_new {
            info!(icao = %icao_to_string(&icao), df = decoded.df.code(), "new aircraft");
        }
        self.registry.put(ac);
        Some(icao)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
