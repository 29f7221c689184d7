//! Small numeric helpers shared by scoring, anomaly detection and forecasting

/// Ordinary least-squares fit of `y` against its index `0..n`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination; 0 for a flat series
    pub r_squared: f64,
}

impl LinearFit {
    /// Fit a line through evenly spaced samples. Returns `None` for fewer than two points.
    pub fn fit(values: &[f64]) -> Option<Self> {
        let n = values.len();
        if n < 2 {
            return None;
        }
        let nf = n as f64;

        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut sum_xy = 0.0;
        let mut sum_xx = 0.0;
        for (i, y) in values.iter().enumerate() {
            let x = i as f64;
            sum_x += x;
            sum_y += y;
            sum_xy += x * y;
            sum_xx += x * x;
        }

        let denominator = nf * sum_xx - sum_x * sum_x;
        let slope = if denominator.abs() < f64::EPSILON {
            0.0
        } else {
            (nf * sum_xy - sum_x * sum_y) / denominator
        };
        let mean_x = sum_x / nf;
        let mean_y = sum_y / nf;
        let intercept = mean_y - slope * mean_x;

        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        for (i, y) in values.iter().enumerate() {
            let predicted = slope * i as f64 + intercept;
            ss_res += (y - predicted).powi(2);
            ss_tot += (y - mean_y).powi(2);
        }
        let r_squared = if ss_tot.abs() < f64::EPSILON {
            0.0
        } else {
            1.0 - ss_res / ss_tot
        };

        Some(Self {
            slope,
            intercept,
            r_squared,
        })
    }

    /// Value of the line at index `x`
    pub fn at(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}
