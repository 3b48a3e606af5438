//! Keyed store of aircraft state.
//!
//! Entries are owned values: callers take a copy with [`AircraftRegistry::get_or_create`],
//! apply whatever a message decoded, and write it back with [`AircraftRegistry::put`].
//! Nothing is ever removed; staleness is a read-time filter ([`AircraftRegistry::active`]).

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::cpr::CprPairing;
use crate::types::{icao_to_string, Icao, Position};

/// State for one transponder address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aircraft {
    #[serde(serialize_with = "serialize_icao")]
    pub icao: Icao,
    /// Trailing padding stripped.
    pub callsign: Option<String>,
    pub altitude_ft: Option<i32>,
    pub position: Option<Position>,
    #[serde(skip)]
    pub cpr: CprPairing,
    /// Most recent message referencing this address.
    pub last_ping: DateTime<Utc>,
    /// Most recent resolved position.
    pub last_pos: Option<DateTime<Utc>>,
    pub message_count: u64,
}

fn serialize_icao<S: serde::Serializer>(icao: &Icao, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&icao_to_string(icao))
}

impl Aircraft {
    pub fn new(icao: Icao, now: DateTime<Utc>) -> Self {
        Aircraft {
            icao,
            callsign: None,
            altitude_ft: None,
            position: None,
            cpr: CprPairing::default(),
            last_ping: now,
            last_pos: None,
            message_count: 0,
        }
    }

    /// Time since the last message.
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.last_ping
    }

    pub fn is_stale(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        self.age(now) > window
    }

    /// Time since the last resolved position, if any.
    pub fn position_age(&self, now: DateTime<Utc>) -> Option<TimeDelta> {
        self.last_pos.map(|t| now - t)
    }

    /// Overwrite the callsign. All-padding clears it.
    pub fn set_callsign(&mut self, raw: &str) {
        let trimmed = raw.trim_end();
        self.callsign = (!trimmed.is_empty()).then(|| trimmed.to_string());
    }
}

#[derive(Debug, Default)]
pub struct AircraftRegistry {
    aircraft: HashMap<Icao, Aircraft>,
}

impl AircraftRegistry {
    pub fn new() -> Self {
        AircraftRegistry::default()
    }

    /// Copy of the entry for `icao`, or a fresh one pinged at `now`.
    ///
    /// The fresh entry is not stored until it is [`put`](Self::put) back.
    pub fn get_or_create(&self, icao: Icao, now: DateTime<Utc>) -> Aircraft {
        self.aircraft
            .get(&icao)
            .cloned()
            .unwrap_or_else(|| Aircraft::new(icao, now))
    }

    /// Store `aircraft` under its own address, replacing any previous entry.
    pub fn put(&mut self, aircraft: Aircraft) {
        self.aircraft.insert(aircraft.icao, aircraft);
    }

    pub fn get(&self, icao: &Icao) -> Option<&Aircraft> {
        self.aircraft.get(icao)
    }

    pub fn contains(&self, icao: &Icao) -> bool {
        self.aircraft.contains_key(icao)
    }

    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Aircraft> {
        self.aircraft.values()
    }

    /// Owned copy of every entry.
    pub fn snapshot(&self) -> Vec<Aircraft> {
        self.aircraft.values().cloned().collect()
    }

    /// Most recent ping across all entries.
    pub fn latest_ping(&self) -> Option<DateTime<Utc>> {
        self.aircraft.values().map(|ac| ac.last_ping).max()
    }

    /// Entries pinged within `window` of `now`, most recent first.
    pub fn active(&self, now: DateTime<Utc>, window: TimeDelta) -> Vec<&Aircraft> {
        let mut active: Vec<_> = self
            .aircraft
            .values()
            .filter(|ac| !ac.is_stale(now, window))
            .collect();
        active.sort_by(|a, b| b.last_ping.cmp(&a.last_ping));
        active
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
