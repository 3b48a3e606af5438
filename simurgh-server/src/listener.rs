//! Receiver connection handling.
//!
//! One inbound connection at a time, read sequentially. End of stream or a
//! read error ends the session; there is no reconnect.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tracing::{info, warn};

use simurgh_core::config::Config;
use simurgh_core::pipeline::Pipeline;
use simurgh_core::types::Result;

use crate::display::Presenter;

const READ_BUF_SIZE: usize = 4096;

/// Which clock the display ages aircraft against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayClock {
    /// Local wall clock, for live feeds.
    Wall,
    /// Newest message time seen, for recorded streams.
    Stream,
}

impl DisplayClock {
    fn now(self, pipeline: &Pipeline, arrival: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            DisplayClock::Wall => arrival,
            DisplayClock::Stream => pipeline.registry().latest_ping().unwrap_or(arrival),
        }
    }
}

/// Read `reader` to the end, feeding every chunk through `pipeline` and
/// redrawing `presenter` after chunks that updated an aircraft.
///
/// The final unterminated message in the stream is never confirmed and is
/// dropped.
pub async fn run_connection<R, W>(
    mut reader: R,
    pipeline: &mut Pipeline,
    presenter: &mut Presenter,
    clock: DisplayClock,
    out: &mut W,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: Write,
{
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        // Errors are reported once, by the caller.
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }

        let arrival = Utc::now();
        let updated = pipeline.feed(&buf[..n], arrival);
        if !updated.is_empty() {
            presenter.maybe_draw(pipeline.registry(), clock.now(pipeline, arrival), out)?;
        }
    }

    if pipeline.buffered() > 0 {
        warn!(bytes = pipeline.buffered(), "stream ended inside a message");
    }
    presenter.draw(pipeline.registry(), clock.now(pipeline, Utc::now()), out)?;
    Ok(())
}

/// Log end-of-session counters.
pub fn log_summary(pipeline: &Pipeline) {
    let framer = pipeline.framer_stats();
    let tracker = pipeline.tracker_stats();
    info!(
        bytes = framer.bytes,
        messages = framer.messages,
        discarded = framer.discarded,
        "framer summary"
    );
    info!(
        mode_s = tracker.mode_s,
        unsupported = tracker.unsupported,
        unknown_address = tracker.unknown_address,
        positions = tracker.positions,
        zone_mismatches = tracker.zone_mismatches,
        stale_pairs = tracker.stale_pairs,
        aircraft = pipeline.registry().len(),
        "tracker summary"
    );
}

/// Accept a single receiver connection on the configured address and
/// process it until it closes.
pub async fn listen<W: Write>(
    config: &Config,
    presenter: &mut Presenter,
    out: &mut W,
) -> Result<()> {
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("listening for Beast feed on {addr}");

    let (stream, peer) = listener.accept().await?;
    info!(%peer, "receiver connected");

    let mut pipeline = Pipeline::new(config.tracker_config());
    let result = run_connection(stream, &mut pipeline, presenter, DisplayClock::Wall, out).await;
    info!(%peer, "receiver disconnected");
    log_summary(&pipeline);
    result
}

/// Process a recorded Beast stream from `path`.
pub async fn replay<W: Write>(
    config: &Config,
    path: &Path,
    presenter: &mut Presenter,
    out: &mut W,
) -> Result<()> {
    let file = tokio::fs::File::open(path).await?;
    info!(path = %path.display(), "replaying");

    let mut pipeline = Pipeline::new(config.tracker_config());
    let result = run_connection(file, &mut pipeline, presenter, DisplayClock::Stream, out).await;
    log_summary(&pipeline);
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use simurgh_core::tracker::{ClockSource, TrackerConfig};
    use simurgh_core::types::hex_decode;
    use tokio::io::AsyncWriteExt;

    /// Wire encoding: terminator, long marker, noon timestamp, signal, payload.
    fn long(hex: &str) -> Vec<u8> {
        let mut out = vec![0x1A, 0x33, 0x2A, 0x30, 0x1D, 0xCD, 0x65, 0x00, 0x80];
        out.extend(hex_decode(hex).unwrap());
        out
    }

    fn stream() -> Vec<u8> {
        let mut bytes = long("8D40621D202CC371C32CE02E065C");
        bytes.extend(long("8D40621D58C382D690C8AC2863A7"));
        bytes.extend(long("8D40621D58C386435CC412692AD6"));
        bytes.extend([0x1A, 0x34]);
        bytes
    }

    fn json_presenter() -> Presenter {
        Presenter::new(&Config::default(), true)
    }

    fn arrival_pipeline() -> Pipeline {
        Pipeline::new(TrackerConfig {
            clock: ClockSource::Arrival,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_run_connection_reads_to_end() {
        let bytes = stream();
        let mut pipeline = arrival_pipeline();
        let mut presenter = json_presenter();
        let mut out = Vec::new();

        run_connection(&bytes[..], &mut pipeline, &mut presenter, DisplayClock::Wall, &mut out)
            .await
            .unwrap();

        let ac = pipeline.registry().get(&[0x40, 0x62, 0x1D]).unwrap();
        assert_eq!(ac.callsign.as_deref(), Some("KLM1023"));
        assert!(ac.position.is_some());

        // Final snapshot is the last line.
        let text = String::from_utf8(out).unwrap();
        let last: serde_json::Value = serde_json::from_str(text.lines().last().unwrap()).unwrap();
        assert_eq!(last["aircraft"][0]["callsign"], "KLM1023");
        assert!(last["aircraft"][0]["lat"].as_f64().is_some());
    }

    #[tokio::test]
    async fn test_run_connection_empty_stream() {
        let mut pipeline = arrival_pipeline();
        let mut presenter = json_presenter();
        let mut out = Vec::new();

        run_connection(&b""[..], &mut pipeline, &mut presenter, DisplayClock::Wall, &mut out)
            .await
            .unwrap();

        assert!(pipeline.registry().is_empty());
        let text = String::from_utf8(out).unwrap();
        let snapshot: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(snapshot["aircraft"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_stream_clock_keeps_recorded_aircraft_visible() {
        // Receiver clock: pings carry the recorded time of day, which may be
        // far from the wall clock.
        let bytes = stream();
        let mut pipeline = Pipeline::new(TrackerConfig::default());
        let mut presenter = json_presenter();
        let mut out = Vec::new();

        run_connection(&bytes[..], &mut pipeline, &mut presenter, DisplayClock::Stream, &mut out)
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        let last: serde_json::Value = serde_json::from_str(text.lines().last().unwrap()).unwrap();
        assert_eq!(last["aircraft"].as_array().unwrap().len(), 1);
    }

    /// Yields `data` once, then fails.
    struct FailingReader {
        data: Option<Vec<u8>>,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(match self.data.take() {
                Some(data) => {
                    buf.put_slice(&data);
                    Ok(())
                }
                None => Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            })
        }
    }

    #[tokio::test]
    async fn test_read_error_returned_to_caller() {
        let reader = FailingReader { data: Some(stream()) };
        let mut pipeline = arrival_pipeline();
        let mut presenter = json_presenter();
        let mut out = Vec::new();

        let result =
            run_connection(reader, &mut pipeline, &mut presenter, DisplayClock::Wall, &mut out).await;

        assert!(matches!(result, Err(simurgh_core::types::SimurghError::Io(_))));
        // Messages read before the error are kept.
        assert!(pipeline.registry().get(&[0x40, 0x62, 0x1D]).is_some());
    }

    #[tokio::test]
    async fn test_replay_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.bin");
        let mut file = tokio::fs::File::create(&path).await.unwrap();
        file.write_all(&stream()).await.unwrap();
        file.flush().await.unwrap();

        let mut config = Config::default();
        config.tracking.clock = ClockSource::Arrival;
        let mut presenter = json_presenter();
        let mut out = Vec::new();
        replay(&config, &path, &mut presenter, &mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("KLM1023"));
    }

    #[tokio::test]
    async fn test_replay_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut presenter = json_presenter();
        let mut out = Vec::new();
        let path = dir.path().join("nope.bin");
        let result = replay(&Config::default(), &path, &mut presenter, &mut out).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_listen_accepts_one_connection() {
        // Reserve a free port, then release it for the listener.
        let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = reserved.local_addr().unwrap().port();
        drop(reserved);

        let mut config = Config::default();
        config.listen.host = "127.0.0.1".into();
        config.listen.port = port;
        config.tracking.clock = ClockSource::Arrival;

        let server = tokio::spawn(async move {
            let mut presenter = json_presenter();
            let mut out = Vec::new();
            listen(&config, &mut presenter, &mut out).await.map(|_| out)
        });

        let mut client = loop {
            match tokio::net::TcpStream::connect(("127.0.0.1", port)).await {
                Ok(c) => break c,
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
            }
        };
        client.write_all(&stream()).await.unwrap();
        client.shutdown().await.unwrap();
        drop(client);

        let out = server.await.unwrap().unwrap();
        assert!(String::from_utf8(out).unwrap().contains("KLM1023"));
    }
}
