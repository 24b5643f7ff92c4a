///////////////////////////////
/// Per-segment quality-control counters fed by an output channel after each
/// push. Base composition over the 16-code alphabet plus quality sums.
#[derive(Clone, Debug, Default)]
pub struct SegmentQc {
    pub record_count: u64,
    pub base_count: [u64; 16],
    pub quality_sum: u64,
    pub q30_count: u64,
    pub total_bases: u64,
}

impl SegmentQc {
    pub fn new() -> SegmentQc {
        SegmentQc::default()
    }

    pub fn record(&mut self, codes: &[u8], qualities: &[u8]) {
        debug_assert_eq!(codes.len(), qualities.len());
        self.record_count += 1;
        self.total_bases += codes.len() as u64;
        for (&c, &q) in codes.iter().zip(qualities.iter()) {
            self.base_count[(c & 0x0f) as usize] += 1;
            self.quality_sum += q as u64;
            if q >= 30 {
                self.q30_count += 1;
            }
        }
    }

    pub fn collect(&mut self, other: &SegmentQc) {
        self.record_count += other.record_count;
        self.quality_sum += other.quality_sum;
        self.q30_count += other.q30_count;
        self.total_bases += other.total_bases;
        for (mine, theirs) in self.base_count.iter_mut().zip(other.base_count.iter()) {
            *mine += theirs;
        }
    }

    pub fn mean_quality(&self) -> f64 {
        if self.total_bases > 0 {
            self.quality_sum as f64 / self.total_bases as f64
        } else {
            0.0
        }
    }

    pub fn q30_fraction(&self) -> f64 {
        if self.total_bases > 0 {
            self.q30_count as f64 / self.total_bases as f64
        } else {
            0.0
        }
    }
}
