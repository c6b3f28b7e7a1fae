use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TTest {
    pub t_statistic: f64,
    pub p_value: f64,
    pub degrees_of_freedom: f64,
}

/// Two-sided paired Student t-test over aligned samples.
///
/// Returns `None` for degenerate inputs: fewer than two pairs, mismatched
/// lengths, or identical samples (zero variance and zero mean difference).
/// Zero variance with a non-zero mean difference yields `p = 0`.
pub fn paired_t_test(left: &[f64], right: &[f64]) -> Option<TTest> {
    if left.len() != right.len() || left.len() < 2 {
        return None;
    }

    let deltas = left
        .iter()
        .zip(right)
        .map(|(left, right)| left - right)
        .collect::<Vec<f64>>();
    let n = deltas.len() as f64;
    let mean_delta = deltas.iter().sum::<f64>() / n;
    let variance = deltas
        .iter()
        .map(|delta| (delta - mean_delta).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    let degrees_of_freedom = n - 1.0;

    if variance == 0.0 {
        if mean_delta == 0.0 {
            return None;
        }
        return Some(TTest {
            t_statistic: f64::INFINITY.copysign(mean_delta),
            p_value: 0.0,
            degrees_of_freedom,
        });
    }

    let t_statistic = mean_delta / (variance / n).sqrt();
    let x = degrees_of_freedom / (degrees_of_freedom + t_statistic * t_statistic);
    let p_value = incomplete_beta(degrees_of_freedom / 2.0, 0.5, x).clamp(0.0, 1.0);

    Some(TTest {
        t_statistic,
        p_value,
        degrees_of_freedom,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionMethod {
    Bonferroni,
    Holm,
    HolmSidak,
}

impl CorrectionMethod {
    pub const ALL: [Self; 3] = [Self::Bonferroni, Self::Holm, Self::HolmSidak];

    pub fn slug(self) -> &'static str {
        match self {
            Self::Bonferroni => "bonferroni",
            Self::Holm => "holm",
            Self::HolmSidak => "holm-sidak",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Bonferroni => "Bonferroni",
            Self::Holm => "Holm",
            Self::HolmSidak => "Holm-Sidak",
        }
    }

    /// Accepts either the slug or the display label.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|method| method.slug() == value || method.label() == value)
    }
}

/// Adjusts a family of p-values for multiple comparisons. Missing p-values
/// stay missing and are not counted in the family size.
pub fn adjust_p_values(p_values: &[Option<f64>], method: CorrectionMethod) -> Vec<Option<f64>> {
    let mut present = p_values
        .iter()
        .enumerate()
        .filter_map(|(index, p_value)| p_value.map(|p_value| (index, p_value)))
        .collect::<Vec<(usize, f64)>>();
    let family = present.len();
    let mut adjusted = vec![None; p_values.len()];

    if method == CorrectionMethod::Bonferroni {
        for (index, p_value) in present {
            adjusted[index] = Some((p_value * family as f64).min(1.0));
        }
        return adjusted;
    }

    // Step-down: sort ascending and keep the running maximum.
    present.sort_by(|left, right| left.1.total_cmp(&right.1));
    let mut running = 0.0_f64;
    for (rank, (index, p_value)) in present.into_iter().enumerate() {
        let remaining = (family - rank) as f64;
        let step = match method {
            CorrectionMethod::Holm => (p_value * remaining).min(1.0),
            _ => 1.0 - (1.0 - p_value).powf(remaining),
        };
        running = running.max(step);
        adjusted[index] = Some(running);
    }
    adjusted
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub total: f64,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Descriptive statistics with population standard deviation.
pub fn summarize(values: &[f64]) -> Option<Summary> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|left, right| left.total_cmp(right));
    let count = sorted.len();
    let total = sorted.iter().sum::<f64>();
    let mean = total / count as f64;
    let median = if count % 2 == 1 {
        sorted[count / 2]
    } else {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    };
    let variance = sorted
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / count as f64;

    Some(Summary {
        count,
        total,
        mean,
        median,
        std: variance.sqrt(),
        min: sorted[0],
        max: sorted[count - 1],
    })
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Regularized incomplete beta function `I_x(a, b)`.
fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let front =
        (ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln()).exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITERATIONS: usize = 200;
    const EPSILON: f64 = 1e-12;
    const TINY: f64 = 1e-30;

    let guard = |value: f64| if value.abs() < TINY { TINY } else { value };

    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - (a + b) * x / (a + 1.0));
    let mut h = d;

    for m in 1..=MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let even = m * (b - m) * x / ((a - 1.0 + m2) * (a + m2));
        d = 1.0 / guard(1.0 + even * d);
        c = guard(1.0 + even / c);
        h *= d * c;

        let odd = -(a + m) * (a + b + m) * x / ((a + m2) * (a + 1.0 + m2));
        d = 1.0 / guard(1.0 + odd * d);
        c = guard(1.0 + odd / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }

    h
}

/// Lanczos approximation of `ln Γ(x)`.
fn ln_gamma(x: f64) -> f64 {
    const COEFFICIENTS: [f64; 6] = [
        76.18009172947146,
        -86.50532032941677,
        24.01409824083091,
        -1.231739572450155,
        0.1208650973866179e-2,
        -0.5395239384953e-5,
    ];

    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut series = 1.000000000190015;
    for (offset, coefficient) in COEFFICIENTS.iter().enumerate() {
        series += coefficient / (x + 1.0 + offset as f64);
    }
    -tmp + (2.5066282746310005 * series / x).ln()
}
