use crate::sequence::fragment::ANY_CODE;
use crate::sequence::phred::phred_to_probability;
use crate::sequence::Fragment;
use crate::sequence::PhredTable;

/// Phred-domain penalty of the uniform 1/4 term used for ambiguous bases.
const UNIFORM_PHRED: f64 = 6.020599913279624; // -10*log10(0.25)

/// Which of the numerically distinct likelihood formulations to run.
///
/// All three are logically equivalent and consume the same lookup tables;
/// they differ in where rounding error accumulates. `Direct` multiplies raw
/// probabilities and can underflow on long barcodes. `Phred` sums penalties
/// in log space. `CompensatedPhred` additionally runs the sum through Kahan
/// compensation, for registries where barcode length times candidate count
/// makes naive summation drift comparable to the decision margin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LikelihoodModel {
    Direct,
    Phred,
    CompensatedPhred,
}

///////////////////////////////
/// A multi-segment barcode: one Fragment per contributing input segment,
/// with a per-position mismatch tolerance and one quality masking threshold.
///
/// Registry entries are built once at configuration time and never mutated.
/// The observed barcode extracted from each record is a regular `Barcode`
/// too, cleared and refilled per record.
#[derive(Clone, Debug, Default)]
pub struct Barcode {
    positions: Vec<Fragment>,
    tolerance: Vec<u8>,
    quality_masking_threshold: u8,
}

impl Barcode {
    pub fn new() -> Barcode {
        Barcode::default()
    }

    ///////////////////////////////
    /// Build a registry entry from ASCII segments, all bases at the top
    /// quality score.
    pub fn from_ascii_segments(segments: &[&[u8]], tolerance: &[u8], masking_threshold: u8) -> Barcode {
        assert_eq!(
            segments.len(),
            tolerance.len(),
            "one tolerance per barcode segment"
        );
        Barcode {
            positions: segments
                .iter()
                .map(|s| Fragment::from_ascii(s, crate::sequence::fragment::MAX_QUALITY))
                .collect(),
            tolerance: tolerance.to_vec(),
            quality_masking_threshold: masking_threshold,
        }
    }

    pub fn push_segment(&mut self, fragment: Fragment, tolerance: u8) {
        self.positions.push(fragment);
        self.tolerance.push(tolerance);
    }

    pub fn set_masking_threshold(&mut self, threshold: u8) {
        self.quality_masking_threshold = threshold;
    }

    #[inline]
    pub fn total_fragments(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn total_length(&self) -> usize {
        self.positions.iter().map(|p| p.len()).sum()
    }

    #[inline]
    pub fn segment(&self, index: usize) -> &Fragment {
        &self.positions[index]
    }

    #[inline]
    pub fn segment_mut(&mut self, index: usize) -> &mut Fragment {
        &mut self.positions[index]
    }

    pub fn clear(&mut self) {
        for p in self.positions.iter_mut() {
            p.clear();
        }
    }

    ///////////////////////////////
    /// Ensure the observed barcode has the same shape as a registry entry,
    /// with empty fragments ready to be filled.
    pub fn shaped_like(template: &Barcode) -> Barcode {
        Barcode {
            positions: vec![Fragment::new(); template.total_fragments()],
            tolerance: template.tolerance.clone(),
            quality_masking_threshold: template.quality_masking_threshold,
        }
    }

    /// Concatenated code string across all segments, for distance-matrix
    /// construction.
    pub fn word(&self) -> Vec<u8> {
        let mut w = Vec::with_capacity(self.total_length());
        for p in &self.positions {
            w.extend_from_slice(p.code());
        }
        w
    }

    pub fn to_ascii(&self) -> String {
        self.positions
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join("-")
    }

    ///////////////////////////////
    /// Is one observed base a mismatch against one candidate base?
    ///
    /// Candidate "any" matches everything. A nonzero masking threshold
    /// distrusts observed calls below it: those count as mismatches even
    /// when the codes happen to agree.
    #[inline]
    fn is_mismatch(&self, candidate_code: u8, observed_code: u8, observed_quality: u8) -> bool {
        if self.quality_masking_threshold > 0 && observed_quality < self.quality_masking_threshold {
            return true;
        }
        if candidate_code == ANY_CODE {
            return false;
        }
        candidate_code != observed_code
    }

    ///////////////////////////////
    /// Aggregate Hamming distance against an observed barcode, with the
    /// quality masking rule applied. No tolerance gate.
    pub fn distance(&self, observed: &Barcode) -> u32 {
        let mut total = 0u32;
        for (candidate, obs) in self.positions.iter().zip(observed.positions.iter()) {
            total += self.segment_distance(candidate, obs);
        }
        total
    }

    #[inline]
    fn segment_distance(&self, candidate: &Fragment, observed: &Fragment) -> u32 {
        let mut d = 0u32;
        for ((&c, &o), &q) in candidate
            .code()
            .iter()
            .zip(observed.code().iter())
            .zip(observed.quality().iter())
        {
            if self.is_mismatch(c, o, q) {
                d += 1;
            }
        }
        d
    }

    ///////////////////////////////
    /// Tolerance-gated distance: `Some(total)` only if every position's
    /// distance stays within that position's configured tolerance.
    /// Tolerances are position-local; a sample index and a molecular index
    /// can warrant different strictness.
    pub fn corrected_match(&self, observed: &Barcode) -> Option<u32> {
        let mut total = 0u32;
        for ((candidate, obs), &tol) in self
            .positions
            .iter()
            .zip(observed.positions.iter())
            .zip(self.tolerance.iter())
        {
            let d = self.segment_distance(candidate, obs);
            if d > tol as u32 {
                return None;
            }
            total += d;
        }
        Some(total)
    }

    ///////////////////////////////
    /// Likelihood of the observed barcode given this candidate, under the
    /// selected numeric formulation.
    pub fn likelihood(&self, observed: &Barcode, model: LikelihoodModel) -> f64 {
        let table = PhredTable::global();
        match model {
            LikelihoodModel::Direct => self.likelihood_direct(observed, table),
            LikelihoodModel::Phred => phred_to_probability(self.penalty_phred(observed, table)),
            LikelihoodModel::CompensatedPhred => {
                phred_to_probability(self.penalty_compensated(observed, table))
            }
        }
    }

    fn likelihood_direct(&self, observed: &Barcode, table: &PhredTable) -> f64 {
        let mut product = 1.0f64;
        self.for_each_base(observed, |candidate_code, observed_code, q| {
            product *= if observed_code == ANY_CODE {
                0.25
            } else if candidate_code == ANY_CODE || candidate_code == observed_code {
                table.correct[q as usize]
            } else {
                table.error_third[q as usize]
            };
        });
        product
    }

    fn penalty_phred(&self, observed: &Barcode, table: &PhredTable) -> f64 {
        let mut sum = 0.0f64;
        self.for_each_base(observed, |candidate_code, observed_code, q| {
            sum += Self::base_penalty(table, candidate_code, observed_code, q);
        });
        sum
    }

    fn penalty_compensated(&self, observed: &Barcode, table: &PhredTable) -> f64 {
        // Kahan summation: carry the low-order bits lost by each addition
        let mut sum = 0.0f64;
        let mut compensation = 0.0f64;
        self.for_each_base(observed, |candidate_code, observed_code, q| {
            let term = Self::base_penalty(table, candidate_code, observed_code, q);
            let y = term - compensation;
            let t = sum + y;
            compensation = (t - sum) - y;
            sum = t;
        });
        sum
    }

    #[inline]
    fn base_penalty(table: &PhredTable, candidate_code: u8, observed_code: u8, q: u8) -> f64 {
        if observed_code == ANY_CODE {
            UNIFORM_PHRED
        } else if candidate_code == ANY_CODE || candidate_code == observed_code {
            table.correct_phred[q as usize]
        } else {
            table.error_third_phred[q as usize]
        }
    }

    #[inline]
    fn for_each_base<F: FnMut(u8, u8, u8)>(&self, observed: &Barcode, mut f: F) {
        for (candidate, obs) in self.positions.iter().zip(observed.positions.iter()) {
            for ((&c, &o), &q) in candidate
                .code()
                .iter()
                .zip(obs.code().iter())
                .zip(obs.quality().iter())
            {
                f(c, o, q);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed(segments: &[&[u8]], quality: u8) -> Barcode {
        let mut b = Barcode::new();
        for s in segments {
            b.push_segment(Fragment::from_ascii(s, quality), 0);
        }
        b
    }

    #[test]
    fn distance_counts_mismatches() {
        let candidate = Barcode::from_ascii_segments(&[b"ACGT"], &[2], 0);
        let obs = observed(&[b"ACGA"], 40);
        assert_eq!(candidate.distance(&obs), 1);
        assert_eq!(candidate.corrected_match(&obs), Some(1));
    }

    #[test]
    fn tolerance_is_per_position() {
        let candidate = Barcode::from_ascii_segments(&[b"ACGT", b"ACGT"], &[0, 2], 0);
        // one mismatch in the zero-tolerance segment disqualifies
        let obs = observed(&[b"ACGA", b"ACGT"], 40);
        assert_eq!(candidate.corrected_match(&obs), None);
        // two mismatches in the lenient segment are fine
        let obs = observed(&[b"ACGT", b"ACAA"], 40);
        assert_eq!(candidate.corrected_match(&obs), Some(2));
    }

    #[test]
    fn masking_threshold_distrusts_low_quality_matches() {
        let candidate = Barcode::from_ascii_segments(&[b"ACGT"], &[4], 10);
        // codes agree everywhere, but two calls are below the threshold
        let mut obs = Barcode::new();
        let mut f = Fragment::new();
        f.fill_ascii(b"ACGT", &[40, 5, 40, 5]);
        obs.push_segment(f, 0);
        assert_eq!(candidate.distance(&obs), 2);
    }

    #[test]
    fn candidate_any_code_matches_everything() {
        let candidate = Barcode::from_ascii_segments(&[b"ACNN"], &[0], 0);
        let obs = observed(&[b"ACGT"], 40);
        assert_eq!(candidate.corrected_match(&obs), Some(0));
    }

    #[test]
    fn likelihood_models_agree() {
        let candidate = Barcode::from_ascii_segments(&[b"ACGTACGT"], &[2], 0);
        let mut obs = Barcode::new();
        let mut f = Fragment::new();
        f.fill_ascii(b"ACGTACTT", &[33, 28, 17, 40, 22, 31, 12, 39]);
        obs.push_segment(f, 0);

        let direct = candidate.likelihood(&obs, LikelihoodModel::Direct);
        let phred = candidate.likelihood(&obs, LikelihoodModel::Phred);
        let compensated = candidate.likelihood(&obs, LikelihoodModel::CompensatedPhred);

        assert!((direct - phred).abs() / direct < 1e-6);
        assert!((direct - compensated).abs() / direct < 1e-6);
        assert!(direct > 0.0 && direct < 1.0);
    }

    #[test]
    fn exact_match_beats_single_mismatch() {
        let candidate = Barcode::from_ascii_segments(&[b"AAAA"], &[1], 0);
        let exact = observed(&[b"AAAA"], 40);
        let off = observed(&[b"AAAT"], 40);
        for model in [
            LikelihoodModel::Direct,
            LikelihoodModel::Phred,
            LikelihoodModel::CompensatedPhred,
        ] {
            assert!(candidate.likelihood(&exact, model) > candidate.likelihood(&off, model));
        }
    }

    #[test]
    fn ambiguous_observed_base_is_uniform() {
        let candidate = Barcode::from_ascii_segments(&[b"A"], &[0], 0);
        let obs = observed(&[b"N"], 40);
        let l = candidate.likelihood(&obs, LikelihoodModel::Direct);
        assert!((l - 0.25).abs() < 1e-12);
    }
}
