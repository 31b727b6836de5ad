//! Fixed-capacity trailing window of decoded values
//!
//! The window is immutable: [`TrailingWindow::push`] returns a new window and
//! leaves the receiver untouched, so snapshots holding a window never change
//! underneath their readers.

use serde::Serialize;

/// Number of values retained for trend consumers
pub const TRAILING_WINDOW_CAPACITY: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TrailingWindow {
    values: Vec<Option<f64>>,
}

impl TrailingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` and evict from the front until the capacity holds.
    ///
    /// `None` (a reading without a value) is stored as given.
    pub fn push(&self, value: Option<f64>) -> Self {
        let mut values = Vec::with_capacity(TRAILING_WINDOW_CAPACITY + 1);
        values.extend_from_slice(&self.values);
        values.push(value);
        if values.len() > TRAILING_WINDOW_CAPACITY {
            let excess = values.len() - TRAILING_WINDOW_CAPACITY;
            values.drain(..excess);
        }
        Self { values }
    }

    /// Values in arrival order, oldest first
    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Most recently pushed value
    pub fn latest(&self) -> Option<Option<f64>> {
        self.values.last().copied()
    }

    /// Series suitable for charting.
    ///
    /// Missing values are dropped. A window with no numeric values yields a
    /// single `0.0` so charts always receive at least one point.
    pub fn trend_points(&self) -> Vec<f64> {
        let points: Vec<f64> = self
            .values
            .iter()
            .filter_map(|value| value.filter(|v| v.is_finite()))
            .collect();

        if points.is_empty() {
            vec![0.0]
        } else {
            points
        }
    }
}
