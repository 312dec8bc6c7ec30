//! Rolling history of derived gravity values for the gateway's trend view

use heapless::{Deque, Vec};

/// Number of readings kept for the trend
pub const HISTORY_CAPACITY: usize = 24;

/// Smallest value range the trend is scaled to, so a flat series still plots
const MIN_TREND_RANGE: f32 = 0.002;

/// Summary over everything currently in the buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub count: usize,
}

/// Value range a trend display should cover
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendBounds {
    pub min: f32,
    pub max: f32,
}

impl TrendBounds {
    pub fn range(&self) -> f32 {
        self.max - self.min
    }
}

/// Fixed-capacity FIFO, oldest value first.
///
/// Once full, every push evicts the oldest value.
#[derive(Debug, Clone, Default)]
pub struct HistoryBuffer {
    values: Deque<f32, HISTORY_CAPACITY>,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self {
            values: Deque::new(),
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.values.is_full() {
            self.values.pop_front();
        }
        // Room was made above
        let _ = self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Oldest value
    pub fn first(&self) -> Option<f32> {
        self.values.front().copied()
    }

    /// Newest value
    pub fn last(&self) -> Option<f32> {
        self.values.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.values.iter().copied()
    }

    pub fn min(&self) -> Option<f32> {
        self.iter().reduce(f32::min)
    }

    pub fn max(&self) -> Option<f32> {
        self.iter().reduce(f32::max)
    }

    pub fn stats(&self) -> Option<HistoryStats> {
        let (min, max) = (self.min()?, self.max()?);
        let count = self.len();
        let sum: f64 = self.iter().map(|v| v as f64).sum();

        Some(HistoryStats {
            min,
            max,
            mean: (sum / count as f64) as f32,
            count,
        })
    }

    /// Range to scale the trend to, widened by `margin_factor` of the data
    /// range on both sides. Needs at least two values.
    pub fn trend_bounds(&self, margin_factor: f32) -> Option<TrendBounds> {
        if self.len() < 2 {
            return None;
        }

        let (min, max) = (self.min()?, self.max()?);
        let range = (max - min).max(MIN_TREND_RANGE);
        let center = (max + min) / 2.0;
        let half = range / 2.0 + range * margin_factor;

        Some(TrendBounds {
            min: center - half,
            max: center + half,
        })
    }

    /// Vertical pixel position of every value, oldest first, for a plot
    /// `height` pixels tall with row 0 at the top. Needs at least two values.
    pub fn plot_points(&self, height: u16, margin_factor: f32) -> Option<Vec<u16, HISTORY_CAPACITY>> {
        let bounds = self.trend_bounds(margin_factor)?;
        let span = (height.max(1) - 1) as f32;

        let mut points = Vec::new();
        for value in self.iter() {
            let fraction = (value - bounds.min) / bounds.range();
            let y = span - fraction.clamp(0.0, 1.0) * span;
            // Cannot overflow: the buffer holds at most HISTORY_CAPACITY values
            let _ = points.push(libm::roundf(y) as u16);
        }
        Some(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_last_24_in_order() {
        let mut history = HistoryBuffer::new();
        for i in 1..=30 {
            history.push(i as f32);
        }

        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.first(), Some(7.0));
        assert_eq!(history.last(), Some(30.0));

        let kept: std::vec::Vec<f32> = history.iter().collect();
        let expected: std::vec::Vec<f32> = (7..=30).map(|i| i as f32).collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn test_min_max_stats() {
        let mut history = HistoryBuffer::new();
        for v in [1.050, 1.048, 1.052, 1.046] {
            history.push(v);
        }

        let stats = history.stats().unwrap();
        assert_eq!(stats.min, 1.046);
        assert_eq!(stats.max, 1.052);
        assert_eq!(stats.count, 4);
        assert!((stats.mean - 1.049).abs() < 1e-6);
    }

    #[test]
    fn test_empty_buffer() {
        let history = HistoryBuffer::new();

        assert_eq!(history.first(), None);
        assert_eq!(history.min(), None);
        assert!(history.stats().is_none());
    }

    #[test]
    fn test_scaling_needs_two_values() {
        let mut history = HistoryBuffer::new();
        history.push(1.050);

        assert!(history.trend_bounds(0.1).is_none());
        assert!(history.plot_points(100, 0.1).is_none());

        history.push(1.040);
        assert!(history.trend_bounds(0.1).is_some());
    }

    #[test]
    fn test_flat_series_gets_minimum_range() {
        let mut history = HistoryBuffer::new();
        history.push(1.000);
        history.push(1.000);

        let bounds = history.trend_bounds(0.0).unwrap();
        assert!((bounds.range() - MIN_TREND_RANGE).abs() < 1e-6);
        assert_eq!(history.plot_points(101, 0.0).unwrap().as_slice(), &[50, 50]);
    }

    #[test]
    fn test_plot_points_run_top_to_bottom() {
        let mut history = HistoryBuffer::new();
        for v in [1.0, 2.0, 3.0] {
            history.push(v);
        }

        let points = history.plot_points(11, 0.0).unwrap();
        // Highest value at the top row
        assert_eq!(points.as_slice(), &[10, 5, 0]);
    }
}
