//! simurgh-core: Beast stream decoding and aircraft tracking.
//!
//! No async, no sockets. Bytes go in through [`Pipeline::feed`]; the
//! [`AircraftRegistry`] comes out. The `simurgh` binary in `simurgh-server`
//! owns the connection and the display.

pub mod beast;
pub mod config;
pub mod cpr;
pub mod crc;
pub mod decode;
pub mod fields;
pub mod pipeline;
pub mod registry;
pub mod timestamp;
pub mod tracker;
pub mod types;

// Re-export commonly used types at crate root
pub use beast::{BeastMessage, Framer, MessageKind};
pub use config::{Config, SortMode};
pub use pipeline::Pipeline;
pub use registry::{Aircraft, AircraftRegistry};
pub use tracker::{ClockSource, Tracker, TrackerConfig};
pub use types::*;
