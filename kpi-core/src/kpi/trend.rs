use serde::{Deserialize, Serialize};

use super::models::TrendLabel;

/// Tunables for trend classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TrendConfig {
    /// Deltas no larger than `epsilon_ratio * (max - min)` count as flat. Default 0.01.
    pub epsilon_ratio: f64,
    /// Trailing points to consider; `None` uses every point. Default `None`.
    pub window: Option<usize>,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            epsilon_ratio: 0.01,
            window: None,
        }
    }
}

impl TrendConfig {
    fn windowed<'a>(&self, values: &'a [f64]) -> &'a [f64] {
        match self.window {
            Some(size) => {
                let size = size.max(2);
                &values[values.len().saturating_sub(size)..]
            }
            None => values,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrendClassifier {
    config: TrendConfig,
}

impl TrendClassifier {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    /// Classifies values that are already in ascending date order.
    ///
    /// The input is never re-sorted. Fewer than two points is `Stable`.
    pub fn classify(&self, values: &[f64]) -> TrendLabel {
        let window = self.config.windowed(values);
        let (Some(first), Some(last)) = (window.first(), window.last()) else {
            return TrendLabel::Stable;
        };
        if window.len() < 2 {
            return TrendLabel::Stable;
        }

        let (min, max) = window
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), value| {
                (lo.min(*value), hi.max(*value))
            });
        let range = max - min;
        if !(range > 0.0) {
            return TrendLabel::Stable;
        }
        // a negative or NaN ratio behaves as zero
        let epsilon = self.config.epsilon_ratio.max(0.0) * range;

        let signs: Vec<i8> = window
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .filter(|delta| delta.abs() > epsilon)
            .map(|delta| if delta > 0.0 { 1 } else { -1 })
            .collect();
        if signs.is_empty() {
            return TrendLabel::Stable;
        }

        let flips = signs.windows(2).filter(|pair| pair[0] != pair[1]).count();
        let repeats = signs.len() - 1 - flips;
        if flips > repeats {
            return TrendLabel::Volatile;
        }

        let net = last - first;
        if net.abs() <= epsilon {
            return TrendLabel::Stable;
        }
        let rising = signs.iter().filter(|sign| **sign > 0).count();
        let falling = signs.len() - rising;
        match (net > 0.0, rising.cmp(&falling)) {
            (true, std::cmp::Ordering::Greater) => TrendLabel::Increasing,
            (false, std::cmp::Ordering::Less) => TrendLabel::Decreasing,
            _ => TrendLabel::Stable,
        }
    }
}

/// Classifies with the default tunables.
pub fn classify(values: &[f64]) -> TrendLabel {
    TrendClassifier::default().classify(values)
}
