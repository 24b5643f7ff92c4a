use crate::barcode::Decoded;

///////////////////////////////
/// Running statistics for one registry entry at one classification site.
///
/// Raw counters accumulate during the run; the derived rates are only
/// meaningful after `finalize` has been called on the owning selector.
#[derive(Clone, Debug, Default)]
pub struct OptionStats {
    pub count: u64,
    pub perfect_count: u64,
    pub distance_sum: u64,
    pub confidence_sum: f64,

    // derived in finalize
    pub pooled_fraction: f64,
    pub pooled_classified_fraction: f64,
    pub mean_distance: f64,
    pub mean_confidence: f64,
    pub estimated_concentration: f64,
}

impl OptionStats {
    pub fn new() -> OptionStats {
        OptionStats::default()
    }

    #[inline]
    fn record(&mut self, decoded: &Decoded) {
        self.count += 1;
        if decoded.distance == 0 {
            self.perfect_count += 1;
        }
        self.distance_sum += decoded.distance as u64;
        self.confidence_sum += decoded.confidence;
    }

    /// Merge another shard's raw counters into this one.
    pub fn collect(&mut self, other: &OptionStats) {
        self.count += other.count;
        self.perfect_count += other.perfect_count;
        self.distance_sum += other.distance_sum;
        self.confidence_sum += other.confidence_sum;
    }

    ///////////////////////////////
    /// Derive rates from the raw sums. Pure function of the counters, so
    /// calling it again without intervening `collect` is a no-op in effect.
    fn finalize(&mut self, parent_count: u64, parent_classified: u64, noise_fraction: f64) {
        self.pooled_fraction = ratio(self.count, parent_count);
        self.pooled_classified_fraction = ratio(self.count, parent_classified);
        self.mean_distance = if self.count > 0 {
            self.distance_sum as f64 / self.count as f64
        } else {
            0.0
        };
        self.mean_confidence = if self.count > 0 {
            self.confidence_sum / self.count as f64
        } else {
            0.0
        };
        self.estimated_concentration = self.pooled_classified_fraction * (1.0 - noise_fraction);
    }
}

///////////////////////////////
/// Pool-level statistics for one classification site: every registry option
/// plus the explicit unclassified bucket and the low-confidence counters.
///
/// One selector (with its options) exists per independent decision in the
/// pipeline, e.g. one for the sample barcode and one for the molecular
/// index. Worker shards each own a private instance, merged with `collect`
/// at the end of the run; that merge is the only synchronization the
/// statistics path needs.
#[derive(Clone, Debug, Default)]
pub struct SelectorStats {
    pub count: u64,
    pub classified_count: u64,
    pub unclassified_count: u64,
    pub low_confidence_count: u64,
    pub low_conditional_confidence_count: u64,
    pub corrupt_record_count: u64,
    pub options: Vec<OptionStats>,

    // derived in finalize
    pub classified_fraction: f64,
    pub noise_fraction: f64,
    pub mean_classified_distance: f64,
    pub mean_classified_confidence: f64,
    finalized: bool,
}

impl SelectorStats {
    pub fn new(option_count: usize) -> SelectorStats {
        SelectorStats {
            options: vec![OptionStats::new(); option_count],
            ..SelectorStats::default()
        }
    }

    ///////////////////////////////
    /// Account one classification decision.
    pub fn record(&mut self, decoded: &Decoded) {
        self.count += 1;
        if decoded.low_confidence {
            self.low_confidence_count += 1;
        }
        if decoded.low_conditional_confidence {
            self.low_conditional_confidence_count += 1;
        }
        match decoded.option {
            Some(index) => {
                self.classified_count += 1;
                self.options[index].record(decoded);
            }
            None => {
                self.unclassified_count += 1;
            }
        }
    }

    pub fn record_corrupt(&mut self) {
        self.corrupt_record_count += 1;
    }

    ///////////////////////////////
    /// Merge a shard into this accumulator. Panics if the shards were not
    /// built over the same registry.
    pub fn collect(&mut self, other: &SelectorStats) {
        assert_eq!(
            self.options.len(),
            other.options.len(),
            "cannot collect selectors with different option counts"
        );
        self.count += other.count;
        self.classified_count += other.classified_count;
        self.unclassified_count += other.unclassified_count;
        self.low_confidence_count += other.low_confidence_count;
        self.low_conditional_confidence_count += other.low_conditional_confidence_count;
        self.corrupt_record_count += other.corrupt_record_count;
        for (mine, theirs) in self.options.iter_mut().zip(other.options.iter()) {
            mine.collect(theirs);
        }
        self.finalized = false;
    }

    ///////////////////////////////
    /// Convert raw sums into rates, once, after all records are processed.
    /// Idempotent: every derived value is recomputed from the raw counters.
    pub fn finalize(&mut self) {
        self.classified_fraction = ratio(self.classified_count, self.count);
        self.noise_fraction = ratio(self.unclassified_count, self.count);

        let (dist_sum, conf_sum): (u64, f64) = self
            .options
            .iter()
            .fold((0, 0.0), |(d, c), o| (d + o.distance_sum, c + o.confidence_sum));
        self.mean_classified_distance = if self.classified_count > 0 {
            dist_sum as f64 / self.classified_count as f64
        } else {
            0.0
        };
        self.mean_classified_confidence = if self.classified_count > 0 {
            conf_sum / self.classified_count as f64
        } else {
            0.0
        };

        let noise_fraction = self.noise_fraction;
        let (count, classified) = (self.count, self.classified_count);
        for option in self.options.iter_mut() {
            option.finalize(count, classified, noise_fraction);
        }
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

#[inline]
fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}
