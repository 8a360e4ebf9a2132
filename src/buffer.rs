use crate::reading::TrackPoint;

/// In-memory point buffer, optionally bounded by a write threshold.
///
/// When a push brings the length up to the threshold the whole batch is
/// handed to the overflow hook and the buffer is emptied, whatever the hook
/// did with it.
#[derive(Debug, Clone, Default)]
pub struct TrackBuffer {
    points: Vec<TrackPoint>,
    threshold: Option<usize>,
    total_pushed: usize,
}

impl TrackBuffer {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(threshold: usize) -> Self {
        TrackBuffer {
            points: Vec::with_capacity(threshold),
            threshold: Some(threshold.max(1)),
            total_pushed: 0,
        }
    }

    pub fn threshold(&self) -> Option<usize> {
        self.threshold
    }

    /// Append a point; returns true if the buffer overflowed and was drained.
    pub fn push<F>(&mut self, point: TrackPoint, on_overflow: F) -> bool
    where
        F: FnOnce(&[TrackPoint]),
    {
        self.points.push(point);
        self.total_pushed += 1;

        match self.threshold {
            Some(limit) if self.points.len() >= limit => {
                on_overflow(&self.points);
                self.points.clear();
                true
            }
            _ => false,
        }
    }

    pub fn as_slice(&self) -> &[TrackPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points pushed since the last reset, drained or not.
    pub fn total_pushed(&self) -> usize {
        self.total_pushed
    }

    pub fn reset(&mut self) {
        self.points.clear();
        self.total_pushed = 0;
    }
}
