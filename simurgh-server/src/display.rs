//! Live aircraft table.
//!
//! Reads registry snapshots and prints either a comfy-table (redrawn in
//! place on a terminal) or one JSON line per redraw. Stale aircraft are
//! hidden, never removed.

use std::cmp::Ordering;
use std::io::{self, Write};

use chrono::{DateTime, TimeDelta, Utc};
use comfy_table::{Cell, CellAlignment, Table};
use serde::Serialize;

use simurgh_core::config::{Config, SortMode};
use simurgh_core::registry::{Aircraft, AircraftRegistry};
use simurgh_core::types::{icao_to_string, Position};

/// One table row, also the JSON shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotRow {
    pub icao: String,
    pub callsign: Option<String>,
    pub altitude_ft: Option<i32>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub distance_nm: Option<f64>,
    /// Seconds since the last message.
    pub seen: f64,
    /// Seconds since the last resolved position.
    pub seen_pos: Option<f64>,
    pub messages: u64,
    #[serde(skip)]
    last_ping: DateTime<Utc>,
}

fn seconds(d: TimeDelta) -> f64 {
    d.num_milliseconds() as f64 / 1000.0
}

impl SnapshotRow {
    fn new(ac: &Aircraft, now: DateTime<Utc>, base: Option<&Position>) -> Self {
        SnapshotRow {
            icao: icao_to_string(&ac.icao),
            callsign: ac.callsign.clone(),
            altitude_ft: ac.altitude_ft,
            lat: ac.position.map(|p| p.lat),
            lon: ac.position.map(|p| p.lon),
            distance_nm: base.zip(ac.position.as_ref()).map(|(b, p)| b.distance_nm(p)),
            seen: seconds(ac.age(now)),
            seen_pos: ac.position_age(now).map(seconds),
            messages: ac.message_count,
            last_ping: ac.last_ping,
        }
    }
}

#[derive(Serialize)]
struct Snapshot<'a> {
    now: DateTime<Utc>,
    aircraft: &'a [SnapshotRow],
}

fn by_recency(a: &SnapshotRow, b: &SnapshotRow) -> Ordering {
    b.last_ping.cmp(&a.last_ping).then_with(|| a.icao.cmp(&b.icao))
}

/// Order rows in place.
///
/// Distance puts unknown distances last and falls back to recency when no
/// row has a distance (no base configured).
pub fn sort_rows(rows: &mut [SnapshotRow], mode: SortMode) {
    match mode {
        SortMode::Recency => rows.sort_by(by_recency),
        SortMode::Distance => rows.sort_by(|a, b| match (a.distance_nm, b.distance_nm) {
            (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| by_recency(a, b)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => by_recency(a, b),
        }),
        SortMode::Callsign => rows.sort_by(|a, b| match (&a.callsign, &b.callsign) {
            (Some(x), Some(y)) => x.cmp(y).then_with(|| a.icao.cmp(&b.icao)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.icao.cmp(&b.icao),
        }),
    }
}

fn dash<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

/// Build the table for `rows`.
pub fn render_table(rows: &[SnapshotRow]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "ICAO", "Callsign", "Alt (ft)", "Lat", "Lon", "Dist (nm)", "Seen", "Pos age", "Msgs",
    ]);

    for row in rows {
        table.add_row(vec![
            Cell::new(&row.icao),
            Cell::new(row.callsign.as_deref().unwrap_or("-")),
            Cell::new(dash(row.altitude_ft)).set_alignment(CellAlignment::Right),
            Cell::new(dash(row.lat.map(|l| format!("{l:.4}")))),
            Cell::new(dash(row.lon.map(|l| format!("{l:.4}")))),
            Cell::new(dash(row.distance_nm.map(|d| format!("{d:.1}"))))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.0}s", row.seen)),
            Cell::new(dash(row.seen_pos.map(|s| format!("{s:.0}s")))),
            Cell::new(row.messages),
        ]);
    }
    table
}

/// Draws registry snapshots, at most once per refresh interval.
#[derive(Debug)]
pub struct Presenter {
    sort: SortMode,
    base: Option<Position>,
    stale_after: TimeDelta,
    refresh: TimeDelta,
    json: bool,
    clear_screen: bool,
    last_draw: Option<DateTime<Utc>>,
}

impl Presenter {
    pub fn new(config: &Config, json: bool) -> Self {
        Presenter {
            sort: config.display.sort,
            base: config.base_position(),
            stale_after: config.stale_after(),
            refresh: config.refresh(),
            json,
            clear_screen: false,
            last_draw: None,
        }
    }

    /// Clear the terminal before each table.
    pub fn with_clear_screen(mut self, clear: bool) -> Self {
        self.clear_screen = clear && !self.json;
        self
    }

    /// Non-stale aircraft, sorted.
    pub fn rows(&self, registry: &AircraftRegistry, now: DateTime<Utc>) -> Vec<SnapshotRow> {
        let mut rows: Vec<_> = registry
            .active(now, self.stale_after)
            .into_iter()
            .map(|ac| SnapshotRow::new(ac, now, self.base.as_ref()))
            .collect();
        sort_rows(&mut rows, self.sort);
        rows
    }

    /// Draw unconditionally.
    pub fn draw<W: Write>(
        &mut self,
        registry: &AircraftRegistry,
        now: DateTime<Utc>,
        out: &mut W,
    ) -> io::Result<()> {
        let rows = self.rows(registry, now);
        if self.json {
            let line = serde_json::to_string(&Snapshot { now, aircraft: &rows })
                .map_err(io::Error::other)?;
            writeln!(out, "{line}")?;
        } else {
            if self.clear_screen {
                write!(out, "\x1b[2J\x1b[H")?;
            }
            writeln!(out, "{}", render_table(&rows))?;
            writeln!(out, "{} aircraft ({} tracked)", rows.len(), registry.len())?;
        }
        out.flush()?;
        self.last_draw = Some(now);
        Ok(())
    }

    /// Draw if the refresh interval has passed since the last draw.
    pub fn maybe_draw<W: Write>(
        &mut self,
        registry: &AircraftRegistry,
        now: DateTime<Utc>,
        out: &mut W,
    ) -> io::Result<bool> {
        if let Some(last) = self.last_draw {
            if now - last < self.refresh {
                return Ok(false);
            }
        }
        self.draw(registry, now, out)?;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
