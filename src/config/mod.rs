use std::io::Read;
use std::path::Path;

use log::info;

use crate::barcode::{
    Barcode, Decoder, DistanceMatrix, LikelihoodModel, MinDistanceDecoder, ProbabilisticDecoder,
};
use crate::feed::CorruptPolicy;
use crate::runtime::Error;

///////////////////////////////
/// For deserialization: one row in the sample metadata TSV. The barcode
/// column holds one sequence per contributing segment, joined with '-'.
/// The prior column is optional and only consulted by the probabilistic
/// decoder.
#[derive(Debug, serde::Deserialize, PartialEq)]
pub struct SampleRow {
    pub sample: String,
    pub barcode: String,
    #[serde(default)]
    pub prior: Option<f64>,
}

///////////////////////////////
/// Read the sample registry from a headered TSV file.
pub fn read_sample_rows(src: impl Read) -> anyhow::Result<Vec<SampleRow>> {
    let mut reader = csv::ReaderBuilder::new().delimiter(b'\t').from_reader(src);
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: SampleRow = result?;
        rows.push(row);
    }
    if rows.is_empty() {
        anyhow::bail!("empty sample metadata file");
    }
    Ok(rows)
}

/// Which decoder policy a classification site runs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DecoderPolicy {
    MinDistance,
    Probabilistic {
        model: LikelihoodModel,
        confidence_floor: f64,
        conditional_confidence_floor: f64,
        noise_prior: f64,
    },
}

///////////////////////////////
/// Fully resolved configuration for one classification site. Immutable
/// once built; the pipeline treats it as read-only input.
pub struct SiteConfig {
    pub labels: Vec<String>,
    pub registry: Vec<Barcode>,
    pub priors: Option<Vec<f64>>,
    pub policy: DecoderPolicy,
    pub distance: DistanceMatrix,
}

impl SiteConfig {
    ///////////////////////////////
    /// Build the immutable registry from sample rows. Every entry must
    /// share segment count and per-segment widths; the distance matrix
    /// load enforces the width invariant.
    pub fn from_rows(
        rows: &[SampleRow],
        tolerance: &[u8],
        masking_threshold: u8,
        policy: DecoderPolicy,
    ) -> Result<SiteConfig, Error> {
        let mut labels = Vec::with_capacity(rows.len());
        let mut registry = Vec::with_capacity(rows.len());
        let mut explicit_priors = Vec::with_capacity(rows.len());

        let segment_count = rows[0].barcode.split('-').count();
        if tolerance.len() != segment_count {
            return Err(Error::config(format!(
                "{} tolerances configured for {} barcode segments",
                tolerance.len(),
                segment_count
            )));
        }

        for row in rows {
            let segments: Vec<&[u8]> = row.barcode.split('-').map(|s| s.as_bytes()).collect();
            if segments.len() != segment_count {
                return Err(Error::config(format!(
                    "sample {} has {} barcode segments but the registry has {}",
                    row.sample,
                    segments.len(),
                    segment_count
                )));
            }
            labels.push(row.sample.clone());
            registry.push(Barcode::from_ascii_segments(
                &segments,
                tolerance,
                masking_threshold,
            ));
            explicit_priors.push(row.prior);
        }

        let words: Vec<Vec<u8>> = registry.iter().map(|b| b.word()).collect();
        let distance = DistanceMatrix::load(words)?;
        info!(
            "registry of {} barcodes, width {}, minimum distance {}, shannon bound {}",
            registry.len(),
            distance.width(),
            distance.min_distance(),
            distance.shannon_bound()
        );

        let priors = resolve_priors(&explicit_priors, &labels, policy)?;

        Ok(SiteConfig {
            labels,
            registry,
            priors,
            policy,
            distance,
        })
    }

    ///////////////////////////////
    /// Instantiate the decoder for this site.
    pub fn build_decoder(&self) -> Box<dyn Decoder> {
        match self.policy {
            DecoderPolicy::MinDistance => Box::new(MinDistanceDecoder::new(self.registry.clone())),
            DecoderPolicy::Probabilistic {
                model,
                confidence_floor,
                conditional_confidence_floor,
                noise_prior,
            } => {
                let mut decoder = ProbabilisticDecoder::new(self.registry.clone(), model)
                    .with_floors(confidence_floor, conditional_confidence_floor);
                if let Some(priors) = &self.priors {
                    decoder = decoder.with_priors(priors.clone(), noise_prior);
                }
                Box::new(decoder)
            }
        }
    }

    pub fn option_count(&self) -> usize {
        self.registry.len()
    }
}

///////////////////////////////
/// Priors must be given for every sample or for none; a partial set is a
/// configuration error, not something to guess around.
fn resolve_priors(
    explicit: &[Option<f64>],
    labels: &[String],
    policy: DecoderPolicy,
) -> Result<Option<Vec<f64>>, Error> {
    let given = explicit.iter().filter(|p| p.is_some()).count();
    if given == 0 {
        return Ok(None);
    }
    if given != explicit.len() {
        return Err(Error::config(
            "priors must be specified for every sample or for none",
        ));
    }
    let priors: Vec<f64> = explicit.iter().flatten().copied().collect();
    if priors.iter().any(|&p| p < 0.0 || !p.is_finite()) {
        return Err(Error::config("priors must be finite and non-negative"));
    }
    if let DecoderPolicy::Probabilistic { noise_prior, .. } = policy {
        let total: f64 = priors.iter().sum::<f64>() + noise_prior;
        if (total - 1.0).abs() > 1e-6 {
            return Err(Error::config(format!(
                "sample priors plus noise prior sum to {} (sample {} listed first), expected 1",
                total, labels[0]
            )));
        }
    }
    Ok(Some(priors))
}

///////////////////////////////
/// Feed geometry and record-level policies shared by every feed in a run.
#[derive(Clone, Copy, Debug)]
pub struct FeedConfig {
    pub capacity: usize,
    pub resolution: usize,
    pub corrupt: CorruptPolicy,
    pub include_qc_failed: bool,
}

impl FeedConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.capacity == 0 {
            return Err(Error::config("feed capacity must be positive"));
        }
        if self.resolution == 0 || self.resolution > self.capacity {
            return Err(Error::config(format!(
                "feed resolution {} must be within 1..={}",
                self.resolution, self.capacity
            )));
        }
        Ok(())
    }
}

///////////////////////////////
/// Read the registry from a file path.
pub fn read_sample_file(path: &Path) -> anyhow::Result<Vec<SampleRow>> {
    let file = std::fs::File::open(path).map_err(|e| {
        Error::io_error(format!("opening sample metadata {}", path.display()), e)
    })?;
    read_sample_rows(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "sample\tbarcode\nalpha\tAAAA\nbeta\tTTTT\n";
    const TSV_PRIORS: &str =
        "sample\tbarcode\tprior\nalpha\tAAAA\t0.6\nbeta\tTTTT\t0.35\n";

    #[test]
    fn reads_headered_tsv() {
        let rows = read_sample_rows(TSV.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sample, "alpha");
        assert_eq!(rows[0].barcode, "AAAA");
        assert_eq!(rows[0].prior, None);
    }

    #[test]
    fn builds_registry_and_distance_matrix() {
        let rows = read_sample_rows(TSV.as_bytes()).unwrap();
        let site =
            SiteConfig::from_rows(&rows, &[1], 0, DecoderPolicy::MinDistance).unwrap();
        assert_eq!(site.option_count(), 2);
        assert_eq!(site.distance.min_distance(), 4);
        assert_eq!(site.distance.shannon_bound(), 1);
    }

    #[test]
    fn tolerance_count_must_match_segments() {
        let rows = read_sample_rows(TSV.as_bytes()).unwrap();
        let site = SiteConfig::from_rows(&rows, &[1, 1], 0, DecoderPolicy::MinDistance);
        assert!(site.is_err());
    }

    #[test]
    fn priors_must_cover_all_samples_and_sum_to_one() {
        let rows = read_sample_rows(TSV_PRIORS.as_bytes()).unwrap();
        let policy = DecoderPolicy::Probabilistic {
            model: LikelihoodModel::Phred,
            confidence_floor: 0.95,
            conditional_confidence_floor: 0.95,
            noise_prior: 0.05,
        };
        let site = SiteConfig::from_rows(&rows, &[1], 0, policy).unwrap();
        assert_eq!(site.priors, Some(vec![0.6, 0.35]));

        let bad_policy = DecoderPolicy::Probabilistic {
            model: LikelihoodModel::Phred,
            confidence_floor: 0.95,
            conditional_confidence_floor: 0.95,
            noise_prior: 0.5,
        };
        assert!(SiteConfig::from_rows(&rows, &[1], 0, bad_policy).is_err());
    }

    #[test]
    fn multi_segment_barcodes() {
        let tsv = "sample\tbarcode\na\tACGT-GGTT\nb\tTGCA-CCAA\n";
        let rows = read_sample_rows(tsv.as_bytes()).unwrap();
        let site =
            SiteConfig::from_rows(&rows, &[1, 0], 0, DecoderPolicy::MinDistance).unwrap();
        assert_eq!(site.registry[0].total_fragments(), 2);
        assert_eq!(site.distance.width(), 8);
    }

    #[test]
    fn feed_config_rejects_bad_geometry() {
        let bad = FeedConfig {
            capacity: 0,
            resolution: 1,
            corrupt: CorruptPolicy::Abort,
            include_qc_failed: false,
        };
        assert!(bad.validate().is_err());
        let bad = FeedConfig {
            capacity: 8,
            resolution: 16,
            corrupt: CorruptPolicy::Abort,
            include_qc_failed: false,
        };
        assert!(bad.validate().is_err());
    }
}
