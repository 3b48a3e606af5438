//! Bytes in, registry updates out.
//!
//! Couples one [`Framer`] with one [`Tracker`]. A pipeline serves a single
//! connection; messages are applied strictly in stream order.

use chrono::{DateTime, Utc};

use crate::beast::{Framer, FramerStats};
use crate::registry::AircraftRegistry;
use crate::tracker::{Tracker, TrackerConfig, TrackerStats};
use crate::types::Icao;

#[derive(Debug, Default)]
pub struct Pipeline {
    framer: Framer,
    tracker: Tracker,
}

impl Pipeline {
    pub fn new(config: TrackerConfig) -> Self {
        Pipeline {
            framer: Framer::new(),
            tracker: Tracker::new(config),
        }
    }

    /// Feed a chunk read at `arrival`. Returns the addresses updated, in
    /// order (an address appears once per message that touched it).
    pub fn feed(&mut self, chunk: &[u8], arrival: DateTime<Utc>) -> Vec<Icao> {
        self.framer
            .push(chunk)
            .iter()
            .filter_map(|msg| self.tracker.update(msg, arrival))
            .collect()
    }

    pub fn registry(&self) -> &AircraftRegistry {
        self.tracker.registry()
    }

    pub fn framer_stats(&self) -> FramerStats {
        self.framer.stats()
    }

    pub fn tracker_stats(&self) -> TrackerStats {
        self.tracker.stats()
    }

    /// Bytes of an unfinished message still held by the framer.
    pub fn buffered(&self) -> usize {
        self.framer.buffered()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beast::tests::{wire, TS_NOON};
    use crate::beast::MessageKind;
    use crate::tracker::ClockSource;
    use crate::types::hex_decode;
    use chrono::{TimeDelta, TimeZone};

    const KLM: Icao = [0x40, 0x62, 0x1D];

    fn long(hex: &str) -> Vec<u8> {
        wire(MessageKind::ModeSLong, TS_NOON, &hex_decode(hex).unwrap())
    }

    fn arrival() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 3, 11, 12, 0, 3).unwrap()
    }

    fn arrival_pipeline() -> Pipeline {
        Pipeline::new(TrackerConfig {
            clock: ClockSource::Arrival,
            ..Default::default()
        })
    }

    #[test]
    fn test_identification_then_position_pair() {
        let mut pipeline = arrival_pipeline();
        let t0 = arrival();

        pipeline.feed(&long("8D40621D202CC371C32CE02E065C"), t0);
        pipeline.feed(&long("8D40621D58C382D690C8AC2863A7"), t0 + TimeDelta::seconds(1));
        pipeline.feed(&long("8D40621D58C386435CC412692AD6"), t0 + TimeDelta::seconds(2));
        // Confirms the boundary of the last message.
        pipeline.feed(&[0x1A, 0x34], t0 + TimeDelta::seconds(3));

        let reg = pipeline.registry();
        assert_eq!(reg.len(), 1);
        let ac = reg.get(&KLM).unwrap();
        assert_eq!(ac.callsign.as_deref(), Some("KLM1023"));
        assert_eq!(ac.altitude_ft, Some(38000));
        let pos = ac.position.unwrap();
        assert!((pos.lat - 52.2658).abs() < 1e-4, "lat {}", pos.lat);
        assert!((pos.lon - 3.9389).abs() < 1e-4, "lon {}", pos.lon);
        assert!(ac.last_pos.unwrap() >= t0);
        assert_eq!(ac.message_count, 3);
    }

    #[test]
    fn test_feed_reports_updated_addresses() {
        let mut pipeline = arrival_pipeline();
        let mut bytes = long("8D40621D202CC371C32CE02E065C");
        bytes.extend(long("8D4840D6202CC371C32CE0576098"));
        bytes.extend([0x1A, 0x34]);

        let updated = pipeline.feed(&bytes, arrival());
        assert_eq!(updated, vec![KLM, [0x48, 0x40, 0xD6]]);
        assert_eq!(pipeline.framer_stats().messages, 2);
        assert_eq!(pipeline.tracker_stats().mode_s, 2);
    }

    #[test]
    fn test_chunking_does_not_change_result() {
        let mut bytes = long("8D40621D202CC371C32CE02E065C");
        bytes.extend(long("8D40621D58C382D690C8AC2863A7"));
        bytes.extend(long("8D40621D58C386435CC412692AD6"));
        bytes.extend([0x1A, 0x34]);

        let mut whole = arrival_pipeline();
        whole.feed(&bytes, arrival());

        let mut split = arrival_pipeline();
        for chunk in bytes.chunks(5) {
            split.feed(chunk, arrival());
        }

        assert_eq!(whole.registry().get(&KLM), split.registry().get(&KLM));
        assert_eq!(whole.framer_stats(), split.framer_stats());
    }

    #[test]
    fn test_unconfirmed_message_held() {
        let mut pipeline = arrival_pipeline();
        let bytes = long("8D40621D202CC371C32CE02E065C");
        assert!(pipeline.feed(&bytes, arrival()).is_empty());
        assert_eq!(pipeline.buffered(), bytes.len() - 1);
        assert!(pipeline.registry().is_empty());
    }
}
