use std::collections::VecDeque;

/// Trailing window over a single signal.
///
/// Statistics are recomputed from the buffered values on every push.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    window: VecDeque<f64>,
    window_len: usize,
}

impl RollingWindow {
    /// # Arguments
    /// * `window_len` - Number of consecutive values per window. Clamped to at least 1.
    pub fn new(window_len: usize) -> Self {
        let window_len = window_len.max(1);
        RollingWindow {
            window: VecDeque::with_capacity(window_len),
            window_len,
        }
    }

    /// Push a value; returns `(mean, population std)` once the window is full.
    pub fn push(&mut self, x: f64) -> Option<(f64, f64)> {
        if self.window.len() == self.window_len {
            self.window.pop_front();
        }
        self.window.push_back(x);
        if self.is_full() {
            Some((self.mean(), self.std()))
        } else {
            None
        }
    }

    pub fn is_full(&self) -> bool {
        self.window.len() == self.window_len
    }

    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            return f64::NAN;
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    /// Population standard deviation (divides by the window length).
    pub fn std(&self) -> f64 {
        if self.window.is_empty() {
            return f64::NAN;
        }
        let mean = self.mean();
        let sum_squares: f64 = self.window.iter().map(|v| (v - mean) * (v - mean)).sum();
        (sum_squares / self.window.len() as f64).sqrt()
    }
}

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population standard deviation (ddof = 0).
pub fn population_std(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    let m = mean(xs);
    let var = xs.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / xs.len() as f64;
    var.sqrt()
}

/// Mean of the finite values only; `NaN` when there are none.
pub fn finite_mean(xs: &[f64]) -> f64 {
    let (sum, count) = xs
        .iter()
        .filter(|x| x.is_finite())
        .fold((0.0, 0usize), |(s, c), x| (s + x, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Least-squares line `y = slope * i + intercept` against the row index `i`.
///
/// Non-finite values are left out of the fit but keep their index. With no
/// finite value the intercept is `NaN`.
pub fn linear_fit(ys: &[f64]) -> (f64, f64) {
    let points: Vec<(f64, f64)> = ys
        .iter()
        .enumerate()
        .filter(|(_, y)| y.is_finite())
        .map(|(i, &y)| (i as f64, y))
        .collect();
    match points.len() {
        0 => return (0.0, f64::NAN),
        1 => return (0.0, points[0].1),
        _ => {}
    }
    let n = points.len() as f64;
    let x_mean = points.iter().map(|p| p.0).sum::<f64>() / n;
    let y_mean = points.iter().map(|p| p.1).sum::<f64>() / n;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for &(x, y) in &points {
        let dx = x - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;
    (slope, y_mean - slope * x_mean)
}

/// Quantile of already sorted values with linear interpolation between the
/// two closest ranks. `q` is clamped to `[0, 1]`.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
