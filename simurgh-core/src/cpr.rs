//! Compact Position Reporting: global CPR decode for airborne positions.
//!
//! A position squitter carries 17-bit latitude and longitude fractions within
//! a zone, alternating between even and odd zone grids. One frame of each
//! parity together pin down the absolute position (ICAO Annex 10 geometry).
//!
//! Key constants:
//! - Nb = 17 (bits per coordinate, 2^17 = 131072)
//! - Dlat_even = 360 / 60 = 6.0 degrees
//! - Dlat_odd = 360 / 59 ≈ 6.1017 degrees
//!
//! Each aircraft keeps at most one pending frame per parity in a
//! [`CprPairing`]. A resolution consumes both; a failure keeps them.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use crate::types::Position;

/// Maximum CPR value (2^17 = 131072).
const CPR_MAX: f64 = 131072.0;

const DLAT_EVEN: f64 = 360.0 / 60.0;
const DLAT_ODD: f64 = 360.0 / 59.0;

/// Latitude band upper bounds for the NL function, from 1090-WP-9-14.
///
/// `|lat| < NL_BREAKPOINTS[i]` (first match) gives `NL = 59 - i`; anything at
/// or above 87 degrees gives 1.
const NL_BREAKPOINTS: [f64; 58] = [
    10.47047130, 14.82817437, 18.18626357, 21.02939493, 23.54504487, 25.82924707,
    27.93898710, 29.91135686, 31.77209708, 33.53993436, 35.22899598, 36.85025108,
    38.41241892, 39.92256684, 41.38651832, 42.80914012, 44.19454951, 45.54626723,
    46.86733252, 48.16039128, 49.42776439, 50.67150166, 51.89342469, 53.09516153,
    54.27817472, 55.44378444, 56.59318756, 57.72747354, 58.84763776, 59.95459277,
    61.04917774, 62.13216659, 63.20427479, 64.26616523, 65.31845310, 66.36171008,
    67.39646774, 68.42322022, 69.44242631, 70.45451075, 71.45986473, 72.45884545,
    73.45177442, 74.43893416, 75.42056257, 76.39684391, 77.36789461, 78.33374083,
    79.29428225, 80.24923213, 81.19801349, 82.13956981, 83.07199445, 83.99173563,
    84.89166191, 85.75541621, 86.53536998, 87.00000000,
];

/// Number of longitude zones at a given latitude (NL function).
///
/// Ranges from 59 at the equator down to 1 at and beyond 87 degrees.
pub fn nl(lat: f64) -> u32 {
    let lat = lat.abs();
    NL_BREAKPOINTS
        .iter()
        .position(|&bound| lat < bound)
        .map_or(1, |i| 59 - i as u32)
}

/// Frame parity (the CPR format bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    pub fn from_bit(odd: bool) -> Self {
        if odd {
            Parity::Odd
        } else {
            Parity::Even
        }
    }
}

/// Raw CPR coordinates from one position squitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CprFrame {
    pub lat: u32,
    pub lon: u32,
    pub parity: Parity,
}

/// Modulo that always returns a non-negative result.
fn modulo(x: f64, y: f64) -> f64 {
    x - y * (x / y).floor()
}

/// Global CPR decode from an even/odd pair of raw `(lat, lon)` values.
///
/// `last` names the parity of the most recent frame; the output position is
/// that frame's. Returns `None` when the pair straddles a latitude zone
/// boundary or produces an impossible latitude.
pub fn global_decode(even: (u32, u32), odd: (u32, u32), last: Parity) -> Option<Position> {
    let (lat_even, lon_even) = (even.0 as f64, even.1 as f64);
    let (lat_odd, lon_odd) = (odd.0 as f64, odd.1 as f64);

    // Latitude zone index
    let j = (0.5 + (59.0 * lat_even - 60.0 * lat_odd) / CPR_MAX).floor();

    let mut rlat_even = DLAT_EVEN * (modulo(j, 60.0) + lat_even / CPR_MAX);
    let mut rlat_odd = DLAT_ODD * (modulo(j, 59.0) + lat_odd / CPR_MAX);
    if rlat_even >= 270.0 {
        rlat_even -= 360.0;
    }
    if rlat_odd >= 270.0 {
        rlat_odd -= 360.0;
    }

    if !(-90.0..=90.0).contains(&rlat_even) || !(-90.0..=90.0).contains(&rlat_odd) {
        return None;
    }

    let nl_val = nl(rlat_even);
    if nl_val != nl(rlat_odd) {
        return None; // Zone boundary crossing
    }

    let (lat, raw_lon, zone_offset) = match last {
        Parity::Even => (rlat_even, lon_even, 0),
        Parity::Odd => (rlat_odd, lon_odd, 1),
    };

    let nl_val = nl_val as f64;
    let ni = (nl(lat) - zone_offset).max(1) as f64;
    let m = (0.5 + (lon_even * (nl_val - 1.0) - lon_odd * nl_val) / CPR_MAX).floor();
    let dlon = 360.0 / ni;
    let lon = dlon * (modulo(m, ni) + raw_lon / CPR_MAX);

    // Normalize longitude to [-180, 180)
    let lon = lon - 360.0 * ((lon + 180.0) / 360.0).floor();

    Some(Position::new(lat, lon))
}

// ---------------------------------------------------------------------------
// Per-aircraft frame pairing
// ---------------------------------------------------------------------------

/// How far apart paired frames may be.
///
/// Unbounded by default: an arbitrarily old pending frame still pairs with a
/// fresh one, which can yield a plausible but wrong position. Setting
/// `max_pair_age` ignores opposite-parity frames older than the bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairingPolicy {
    pub max_pair_age: Option<TimeDelta>,
}

/// An unresolved frame waiting for its opposite parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingFrame {
    pub lat: u32,
    pub lon: u32,
    pub received: DateTime<Utc>,
}

/// Outcome of feeding one frame into a [`CprPairing`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// Both frames consumed, absolute position known.
    Resolved(Position),
    /// No opposite-parity frame yet; this one is now pending.
    Pending,
    /// Opposite-parity frame present but in a different latitude zone.
    ZoneMismatch,
    /// Opposite-parity frame present but older than the pairing bound.
    Stale,
}

/// Pending frame slots for one aircraft, one per parity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CprPairing {
    pub even: Option<PendingFrame>,
    pub odd: Option<PendingFrame>,
}

impl CprPairing {
    pub fn is_empty(&self) -> bool {
        self.even.is_none() && self.odd.is_none()
    }

    /// Pair `frame` with the pending opposite-parity frame, if any.
    ///
    /// On success both slots are cleared. Otherwise `frame` replaces any
    /// pending frame of its own parity and the opposite slot is untouched.
    pub fn resolve(
        &mut self,
        frame: CprFrame,
        received: DateTime<Utc>,
        policy: &PairingPolicy,
    ) -> Resolution {
        let pending = PendingFrame {
            lat: frame.lat,
            lon: frame.lon,
            received,
        };
        let (own, opposite) = match frame.parity {
            Parity::Even => (&mut self.even, self.odd),
            Parity::Odd => (&mut self.odd, self.even),
        };

        let Some(other) = opposite else {
            *own = Some(pending);
            return Resolution::Pending;
        };

        if let Some(max_age) = policy.max_pair_age {
            if received - other.received > max_age {
                debug!(age = ?(received - other.received), "CPR pair too old");
                *own = Some(pending);
                return Resolution::Stale;
            }
        }

        let (even, odd) = match frame.parity {
            Parity::Even => ((frame.lat, frame.lon), (other.lat, other.lon)),
            Parity::Odd => ((other.lat, other.lon), (frame.lat, frame.lon)),
        };

        match global_decode(even, odd, frame.parity) {
            Some(pos) => {
                *self = CprPairing::default();
                Resolution::Resolved(pos)
            }
            None => {
                *own = Some(pending);
                Resolution::ZoneMismatch
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_457_697_600 + secs, 0).unwrap()
    }

    fn even(lat: u32, lon: u32) -> CprFrame {
        CprFrame { lat, lon, parity: Parity::Even }
    }

    fn odd(lat: u32, lon: u32) -> CprFrame {
        CprFrame { lat, lon, parity: Parity::Odd }
    }

    #[test]
    fn test_nl_equator() {
        assert_eq!(nl(0.0), 59);
        assert_eq!(nl(10.47), 59);
        assert_eq!(nl(10.4705), 58);
    }

    #[test]
    fn test_nl_poles() {
        assert_eq!(nl(86.9), 2);
        assert_eq!(nl(87.0), 1);
        assert_eq!(nl(-87.0), 1);
        assert_eq!(nl(90.0), 1);
    }

    #[test]
    fn test_nl_symmetric() {
        for lat in [5.0, 33.3, 52.2572, 71.0, 86.0] {
            assert_eq!(nl(lat), nl(-lat));
        }
    }

    #[test]
    fn test_nl_mid_latitude() {
        assert_eq!(nl(52.2572), 36);
    }

    #[test]
    fn test_nl_monotonic() {
        let mut prev = nl(0.0);
        let mut lat = 0.0;
        while lat <= 90.0 {
            let cur = nl(lat);
            assert!(cur <= prev, "NL increased at {lat}: {prev} -> {cur}");
            prev = cur;
            lat += 0.001;
        }
        assert_eq!(prev, 1);
    }

    #[test]
    fn test_nl_every_band_reached() {
        for (i, bound) in NL_BREAKPOINTS.iter().enumerate() {
            assert_eq!(nl(bound - 1e-6), 59 - i as u32);
        }
    }

    #[test]
    fn test_global_decode_worked_example_odd_last() {
        let pos = global_decode((92095, 39846), (88385, 125818), Parity::Odd).unwrap();
        assert!((pos.lat - 10.216214).abs() < 1e-4, "lat {}", pos.lat);
        assert!((pos.lon - 123.889129).abs() < 1e-4, "lon {}", pos.lon);
    }

    #[test]
    fn test_global_decode_worked_example_even_last() {
        let pos = global_decode((92095, 39846), (88385, 125818), Parity::Even).unwrap();
        assert!((pos.lat - 10.215775).abs() < 1e-4, "lat {}", pos.lat);
        assert!((pos.lon - 123.888819).abs() < 1e-4, "lon {}", pos.lon);
    }

    #[test]
    fn test_global_decode_europe() {
        // "The 1090MHz Riddle" pair, even frame most recent
        let pos = global_decode((93000, 51372), (74158, 50194), Parity::Even).unwrap();
        assert!((pos.lat - 52.257202).abs() < 1e-4);
        assert!((pos.lon - 3.919373).abs() < 1e-4);
    }

    #[test]
    fn test_global_decode_zone_mismatch() {
        // Even latitude lands just below the 10.47° band edge, odd just above.
        let lat_even = ((10.46 / 6.0 - 1.0) * CPR_MAX) as u32;
        let lat_odd = ((10.50 / (360.0 / 59.0) - 1.0) * CPR_MAX) as u32;
        assert!(global_decode((lat_even, 0), (lat_odd, 0), Parity::Odd).is_none());
    }

    // j = -44 puts both latitudes near 96°, where the NL bands would agree.
    const LAT_ODD_OUT_OF_RANGE: u32 = 96119;

    #[test]
    fn test_global_decode_latitude_out_of_range() {
        assert!(global_decode((0, 0), (LAT_ODD_OUT_OF_RANGE, 0), Parity::Odd).is_none());
        assert!(global_decode((0, 0), (LAT_ODD_OUT_OF_RANGE, 0), Parity::Even).is_none());
    }

    #[test]
    fn test_longitude_normalised() {
        // Zone 35 of 58 starts at 217.24°, which wraps into the western hemisphere.
        let pos = global_decode((92095, 80000), (88385, 0), Parity::Odd).unwrap();
        assert!((pos.lon - (-142.758621)).abs() < 1e-4, "lon {}", pos.lon);
    }

    #[test]
    fn test_modulo_negative() {
        assert!((modulo(-1.0, 60.0) - 59.0).abs() < 1e-10);
        assert!((modulo(7.0, 3.0) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_pairing_first_frame_pending() {
        let mut pairing = CprPairing::default();
        let res = pairing.resolve(even(92095, 39846), t(0), &PairingPolicy::default());
        assert_eq!(res, Resolution::Pending);
        assert!(pairing.even.is_some());
        assert!(pairing.odd.is_none());
    }

    #[test]
    fn test_pairing_same_parity_overwrites() {
        let mut pairing = CprPairing::default();
        let policy = PairingPolicy::default();
        pairing.resolve(even(1, 2), t(0), &policy);
        pairing.resolve(even(92095, 39846), t(1), &policy);
        let pending = pairing.even.unwrap();
        assert_eq!((pending.lat, pending.lon, pending.received), (92095, 39846, t(1)));
    }

    #[test]
    fn test_pairing_resolves_and_clears() {
        let mut pairing = CprPairing::default();
        let policy = PairingPolicy::default();
        pairing.resolve(even(92095, 39846), t(0), &policy);
        let res = pairing.resolve(odd(88385, 125818), t(1), &policy);

        let Resolution::Resolved(pos) = res else {
            panic!("expected a position, got {res:?}");
        };
        assert!((pos.lat - 10.216214).abs() < 1e-4);
        assert!((pos.lon - 123.889129).abs() < 1e-4);
        assert!(pairing.is_empty());
    }

    #[test]
    fn test_pairing_zone_mismatch_keeps_slots() {
        let lat_even = ((10.46 / 6.0 - 1.0) * CPR_MAX) as u32;
        let lat_odd = ((10.50 / (360.0 / 59.0) - 1.0) * CPR_MAX) as u32;
        let mut pairing = CprPairing::default();
        let policy = PairingPolicy::default();

        pairing.resolve(even(lat_even, 0), t(0), &policy);
        let res = pairing.resolve(odd(lat_odd, 0), t(1), &policy);

        assert_eq!(res, Resolution::ZoneMismatch);
        assert_eq!(pairing.even.unwrap().lat, lat_even);
        assert_eq!(pairing.odd.unwrap().lat, lat_odd);
    }

    #[test]
    fn test_pairing_latitude_out_of_range_keeps_slots() {
        let mut pairing = CprPairing::default();
        let policy = PairingPolicy::default();

        pairing.resolve(even(0, 0), t(0), &policy);
        let res = pairing.resolve(odd(LAT_ODD_OUT_OF_RANGE, 0), t(1), &policy);

        assert_eq!(res, Resolution::ZoneMismatch);
        assert_eq!(pairing.even.unwrap().received, t(0));
        assert_eq!(pairing.odd.unwrap().lat, LAT_ODD_OUT_OF_RANGE);
    }

    #[test]
    fn test_pairing_unbounded_by_default() {
        let mut pairing = CprPairing::default();
        let policy = PairingPolicy::default();
        pairing.resolve(even(92095, 39846), t(0), &policy);
        let res = pairing.resolve(odd(88385, 125818), t(86_400), &policy);
        assert!(matches!(res, Resolution::Resolved(_)));
    }

    #[test]
    fn test_pairing_max_age() {
        let mut pairing = CprPairing::default();
        let policy = PairingPolicy {
            max_pair_age: Some(TimeDelta::seconds(10)),
        };
        pairing.resolve(even(92095, 39846), t(0), &policy);
        let res = pairing.resolve(odd(88385, 125818), t(11), &policy);

        assert_eq!(res, Resolution::Stale);
        // Stale frame is ignored, not cleared.
        assert!(pairing.even.is_some());
        assert!(pairing.odd.is_some());

        // A fresh even frame pairs with the pending odd one.
        let res = pairing.resolve(even(92095, 39846), t(12), &policy);
        assert!(matches!(res, Resolution::Resolved(_)));
    }
}
