use lazy_static::lazy_static;

/// Number of representable quality scores (0..=127).
pub const QUALITY_RANGE: usize = 128;

/// Per-quality lookup tables shared by every likelihood formulation.
///
/// For a phred score q the base-call error probability is 10^(-q/10). The
/// decoders never call powf/log10 per base; they index these tables. Keeping
/// one table instance per process guarantees the three probability
/// strategies consume bit-identical terms.
pub struct PhredTable {
    /// p(q): probability the base call is wrong
    pub error: [f64; QUALITY_RANGE],
    /// 1 - p(q): probability the base call is right
    pub correct: [f64; QUALITY_RANGE],
    /// p(q) / 3: probability of one specific wrong alternative
    pub error_third: [f64; QUALITY_RANGE],
    /// -10*log10(1 - p(q)): phred equivalent of a correct call
    pub correct_phred: [f64; QUALITY_RANGE],
    /// -10*log10(p(q) / 3): phred equivalent of one wrong alternative
    pub error_third_phred: [f64; QUALITY_RANGE],
}

impl PhredTable {
    fn build() -> PhredTable {
        let mut error = [0.0; QUALITY_RANGE];
        let mut correct = [0.0; QUALITY_RANGE];
        let mut error_third = [0.0; QUALITY_RANGE];
        let mut correct_phred = [0.0; QUALITY_RANGE];
        let mut error_third_phred = [0.0; QUALITY_RANGE];

        for q in 0..QUALITY_RANGE {
            let p = 10f64.powf(-(q as f64) / 10.0);
            error[q] = p;
            correct[q] = 1.0 - p;
            error_third[q] = p / 3.0;
            // q = 0 means p = 1, a fully uninformative call; clamp so the
            // phred-domain tables stay finite
            correct_phred[q] = if q == 0 {
                f64::MAX / (QUALITY_RANGE as f64)
            } else {
                -10.0 * (1.0 - p).log10()
            };
            error_third_phred[q] = -10.0 * (p / 3.0).log10();
        }

        PhredTable {
            error,
            correct,
            error_third,
            correct_phred,
            error_third_phred,
        }
    }

    pub fn global() -> &'static PhredTable {
        &PHRED_TABLE
    }
}

lazy_static! {
    static ref PHRED_TABLE: PhredTable = PhredTable::build();
}

/// Convert a summed phred-domain penalty back to a probability.
#[inline]
pub fn phred_to_probability(phred: f64) -> f64 {
    10f64.powf(-phred / 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_closed_form() {
        let t = PhredTable::global();
        for q in [1usize, 10, 20, 30, 40, 93] {
            let p = 10f64.powf(-(q as f64) / 10.0);
            assert!((t.error[q] - p).abs() < 1e-12);
            assert!((t.correct[q] - (1.0 - p)).abs() < 1e-12);
            assert!((t.error_third[q] - p / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn phred_roundtrip() {
        let t = PhredTable::global();
        for q in [5usize, 15, 25, 35] {
            let back = phred_to_probability(t.error_third_phred[q]);
            let rel = (back - t.error_third[q]).abs() / t.error_third[q];
            assert!(rel < 1e-12);
        }
    }

    #[test]
    fn q0_stays_finite() {
        let t = PhredTable::global();
        assert!(t.correct_phred[0].is_finite());
        assert_eq!(t.correct[0], 0.0);
    }
}
