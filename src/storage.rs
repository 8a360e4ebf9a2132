use serde::{Deserialize, Serialize};

use crate::aggregator::TripSummary;
use crate::error::{TrackerError, TrackerResult};
use crate::reading::TrackPoint;
use crate::store::KeyValueStore;

/// Key the legacy tracker kept its point list under.
pub const DEFAULT_STORAGE_KEY: &str = "hp-mobile-fleet";

/// Moves buffered points out of memory into a key-value store.
///
/// The store holds one JSON array of `{lat, lng}` records per key, rewritten
/// whole on every flush. Storage trouble is logged and swallowed: a trip keeps
/// running on whatever is still in memory.
pub struct OverflowFlusher {
    store: Box<dyn KeyValueStore>,
    key: String,
    flushes: usize,
}

impl OverflowFlusher {
    pub fn new(store: Box<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        OverflowFlusher {
            store,
            key: key.into(),
            flushes: 0,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of flushes performed since the last reset.
    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    /// Start a fresh, empty session entry.
    pub fn reset(&mut self) {
        self.flushes = 0;
        if let Err(e) = self.store.set(&self.key, "[]") {
            log::warn!("Could not initialize stored trip '{}': {}", self.key, e);
        }
    }

    /// Append `batch` to the persisted sequence. Returns whether the write
    /// went through.
    ///
    /// An absent or unreadable entry counts as "no prior data", so the batch
    /// becomes the whole stored dataset.
    pub fn flush(&mut self, batch: &[TrackPoint]) -> bool {
        self.flushes += 1;

        let mut all = match self.load_all() {
            Ok(points) => points,
            Err(e) => {
                log::warn!(
                    "Stored trip '{}' unreadable ({}), rewriting from current buffer",
                    self.key,
                    e
                );
                Vec::new()
            }
        };
        all.extend_from_slice(batch);

        let written = serde_json::to_string(&all)
            .map_err(TrackerError::from)
            .and_then(|blob| self.store.set(&self.key, &blob));

        match written {
            Ok(()) => {
                log::debug!(
                    "Flushed {} points to '{}' ({} stored)",
                    batch.len(),
                    self.key,
                    all.len()
                );
                true
            }
            Err(e) => {
                log::warn!(
                    "Dropping {} buffered points, store write failed: {}",
                    batch.len(),
                    e
                );
                false
            }
        }
    }

    /// Everything persisted under the session key, in acceptance order.
    pub fn load_all(&self) -> TrackerResult<Vec<TrackPoint>> {
        match self.store.get(&self.key)? {
            Some(blob) => Ok(serde_json::from_str(&blob)?),
            None => Ok(Vec::new()),
        }
    }

    /// Final flush at trip stop. The caller keeps `remaining` in memory; the
    /// full path (persisted + remaining) is returned.
    pub fn finish(&mut self, remaining: &[TrackPoint]) -> Vec<TrackPoint> {
        let written = remaining.is_empty() || self.flush(remaining);

        match self.load_all() {
            Ok(mut all) => {
                if !written {
                    all.extend_from_slice(remaining);
                }
                all
            }
            Err(e) => {
                log::warn!("Could not reload stored trip '{}': {}", self.key, e);
                remaining.to_vec()
            }
        }
    }
}

/// Finished trip, as handed to the map and export collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripExport {
    pub session_id: String,
    pub started_at: String,
    pub stopped_at: String,
    pub summary: TripSummary,
    pub path: Vec<TrackPoint>,
}

impl TripExport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// A path needs at least two points to be drawn as a line.
    pub fn drawable(&self) -> bool {
        self.path.len() > 1
    }

    pub fn start_marker(&self) -> Option<TrackPoint> {
        self.path.first().copied()
    }

    pub fn end_marker(&self) -> Option<TrackPoint> {
        self.path.last().copied()
    }

    /// GPX 1.1 document with one track segment.
    pub fn to_gpx_xml(&self) -> String {
        let name = xml_escape(&format!("Trip {}", self.session_id));
        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<gpx version=\"1.1\" creator=\"trip-tracker\">\n");
        xml.push_str("  <metadata>\n");
        xml.push_str(&format!("    <name>{}</name>\n", name));
        xml.push_str(&format!(
            "    <desc>{}</desc>\n",
            xml_escape(&self.summary.to_string())
        ));
        xml.push_str(&format!("    <time>{}</time>\n", xml_escape(&self.started_at)));
        xml.push_str("  </metadata>\n");
        xml.push_str("  <trk>\n");
        xml.push_str(&format!("    <name>{}</name>\n", name));
        xml.push_str("    <trkseg>\n");
        for point in &self.path {
            xml.push_str(&format!(
                "      <trkpt lat=\"{}\" lon=\"{}\"/>\n",
                point.latitude, point.longitude
            ));
        }
        xml.push_str("    </trkseg>\n");
        xml.push_str("  </trk>\n");
        xml.push_str("</gpx>\n");
        xml
    }
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
