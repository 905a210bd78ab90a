//! Two-stage cursor filter: a recency-weighted average over the last few
//! accepted deltas, fed into an exponential moving average of the position.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorPos {
    pub x: f32,
    pub y: f32,
}

/// Exponential moving average of an absolute cursor position, clamped to
/// the screen. Starts at the screen centre.
#[derive(Debug)]
pub struct CursorEma {
    alpha: f32,
    screen: (f32, f32),
    position: CursorPos,
}

impl CursorEma {
    pub fn new(alpha: f32, screen: (f32, f32)) -> Self {
        Self {
            alpha,
            screen,
            position: CursorPos {
                x: screen.0 / 2.0,
                y: screen.1 / 2.0,
            },
        }
    }

    #[cfg(test)]
    pub fn position(&self) -> CursorPos {
        self.position
    }

    fn clamp(&self, x: f32, y: f32) -> CursorPos {
        CursorPos {
            x: x.clamp(0.0, self.screen.0),
            y: y.clamp(0.0, self.screen.1),
        }
    }

    /// One EMA step toward an absolute target.
    pub fn ease_to(&mut self, target: CursorPos) -> CursorPos {
        let a = self.alpha;
        let x = (1.0 - a) * self.position.x + a * target.x;
        let y = (1.0 - a) * self.position.y + a * target.y;
        self.position = self.clamp(x, y);
        self.position
    }
}

#[derive(Debug)]
pub struct TemporalSmoother {
    xs: VecDeque<f32>,
    ys: VecDeque<f32>,
    weights: Vec<f32>,
    dead_zone: f32,
    screen: (f32, f32),
    ema: CursorEma,
}

/// `n` weights rising linearly from 1 (oldest) to 2 (newest), summing to 1.
fn recency_weights(n: usize) -> Vec<f32> {
    if n <= 1 {
        return vec![1.0; n];
    }
    let raw: Vec<f32> = (0..n)
        .map(|i| 1.0 + i as f32 / (n - 1) as f32)
        .collect();
    let total: f32 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

impl TemporalSmoother {
    /// The cursor starts at the screen centre.
    pub fn new(capacity: usize, dead_zone: f32, alpha: f32, screen: (f32, f32)) -> Self {
        Self {
            xs: VecDeque::with_capacity(capacity),
            ys: VecDeque::with_capacity(capacity),
            weights: recency_weights(capacity),
            dead_zone,
            screen,
            ema: CursorEma::new(alpha, screen),
        }
    }

    #[cfg(test)]
    pub fn position(&self) -> CursorPos {
        self.ema.position()
    }

    #[cfg(test)]
    pub fn buffered(&self) -> usize {
        self.xs.len()
    }

    /// Feed a raw delta from the calibration reference. Returns the new cursor
    /// position once the buffer is full, `None` while it is still priming.
    pub fn update(&mut self, dx: f32, dy: f32) -> Option<CursorPos> {
        if dx.abs() > self.dead_zone || dy.abs() > self.dead_zone {
            if self.xs.len() == self.weights.len() {
                self.xs.pop_front();
                self.ys.pop_front();
            }
            self.xs.push_back(dx);
            self.ys.push_back(dy);
        }

        if self.weights.is_empty() || self.xs.len() < self.weights.len() {
            return None;
        }

        let avg_dx: f32 = self.xs.iter().zip(&self.weights).map(|(v, w)| v * w).sum();
        let avg_dy: f32 = self.ys.iter().zip(&self.weights).map(|(v, w)| v * w).sum();
        let target = self
            .ema
            .clamp(self.screen.0 / 2.0 + avg_dx, self.screen.1 / 2.0 + avg_dy);
        Some(self.ema.ease_to(target))
    }
}
