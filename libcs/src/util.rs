#[cfg(test)]
#[ctor::ctor]
fn init_backtrace() {
    color_backtrace::install();
}

pub trait LogAbuse {
    fn log2_or_inf(self) -> f64;
}

impl LogAbuse for f64 {
    fn log2_or_inf(self) -> f64 {
        if self == 0.0 {
            -f64::INFINITY
        } else {
            self.log2()
        }
    }
}

pub trait VecMath {
    fn argmax(&self) -> Option<usize>;
    /// Scales the vector so it sums to one. Returns false
    /// (and leaves the vector untouched) when the sum is zero.
    fn normalize(&mut self) -> bool;
}

impl VecMath for [f64] {
    fn argmax(&self) -> Option<usize> {
        let mut max = *self.first()?;
        let mut argmax: usize = 0;

        for (idx, &item) in self.iter().enumerate().skip(1) {
            if item > max {
                max = item;
                argmax = idx;
            }
        }

        Some(argmax)
    }

    fn normalize(&mut self) -> bool {
        let sum: f64 = self.iter().sum();
        if sum == 0.0 {
            return false;
        }
        self.iter_mut().for_each(|item| *item /= sum);
        true
    }
}

/// Numerically stable ln(Σ exp(x_i)): the maximum is subtracted
/// before exponentiation.
pub fn log_sum_exp(xs: &[f64]) -> f64 {
    let max = xs.iter().cloned().fold(-f64::INFINITY, f64::max);
    if max == -f64::INFINITY {
        return -f64::INFINITY;
    }
    let sum: f64 = xs.iter().map(|&x| (x - max).exp()).sum();
    max + sum.ln()
}

/// Softmax of a logit vector, computed with the max-shift.
pub fn softmax(xs: &[f64]) -> Vec<f64> {
    let max = xs.iter().cloned().fold(-f64::INFINITY, f64::max);
    let mut out: Vec<f64> = xs.iter().map(|&x| (x - max).exp()).collect();
    let sum: f64 = out.iter().sum();
    out.iter_mut().for_each(|o| *o /= sum);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_log_sum_exp() {
        let xs = [0.1f64.ln(), 0.2f64.ln(), 0.3f64.ln()];
        assert_relative_eq!(log_sum_exp(&xs), 0.6f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_log_sum_exp_empty_support() {
        assert_eq!(log_sum_exp(&[-f64::INFINITY; 3]), -f64::INFINITY);
    }

    #[test]
    fn test_softmax_uniform() {
        let pc = softmax(&[0.0; 20]);
        for p in pc {
            assert_relative_eq!(p, 0.05, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_normalize_zero_sum() {
        let mut xs = vec![0.0; 4];
        assert!(!xs.as_mut_slice().normalize());
    }
}
