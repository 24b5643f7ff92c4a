use std::io::Write;
use std::path::Path;

use crate::runtime::Error;
use crate::sequence::fragment::encode_base;
use crate::stats::{SegmentQc, SelectorStats};

///////////////////////////////
/// One row of the classification report. Registry options get one row each;
/// the unclassified bucket gets a final row with the pooled noise fraction in
/// place of the classified fraction.
#[derive(Debug, serde::Serialize)]
struct ClassificationRow<'a> {
    sample: &'a str,
    count: u64,
    perfect_count: u64,
    mean_distance: f64,
    mean_confidence: f64,
    pooled_fraction: f64,
    pooled_classified_fraction: f64,
    estimated_concentration: f64,
}

///////////////////////////////
/// One row of the quality-control report, per channel and segment.
#[derive(Debug, serde::Serialize)]
struct QcRow<'a> {
    channel: &'a str,
    segment: usize,
    record_count: u64,
    mean_quality: f64,
    q30_fraction: f64,
    fraction_a: f64,
    fraction_c: f64,
    fraction_g: f64,
    fraction_t: f64,
    fraction_n: f64,
}

///////////////////////////////
/// Write the per-sample classification report as headered TSV. The selector
/// must be finalized; raw counters alone cannot produce the rate columns.
pub fn write_classification_report<W: Write>(
    dst: W,
    labels: &[String],
    selector: &SelectorStats,
) -> anyhow::Result<()> {
    if !selector.is_finalized() {
        return Err(Error::config("statistics must be finalized before reporting").into());
    }
    if labels.len() != selector.options.len() {
        return Err(Error::config(format!(
            "{} labels for {} options",
            labels.len(),
            selector.options.len()
        ))
        .into());
    }

    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(dst);
    for (label, option) in labels.iter().zip(selector.options.iter()) {
        writer.serialize(ClassificationRow {
            sample: label,
            count: option.count,
            perfect_count: option.perfect_count,
            mean_distance: option.mean_distance,
            mean_confidence: option.mean_confidence,
            pooled_fraction: option.pooled_fraction,
            pooled_classified_fraction: option.pooled_classified_fraction,
            estimated_concentration: option.estimated_concentration,
        })?;
    }
    writer.serialize(ClassificationRow {
        sample: "unclassified",
        count: selector.unclassified_count,
        perfect_count: 0,
        mean_distance: 0.0,
        mean_confidence: 0.0,
        pooled_fraction: selector.noise_fraction,
        pooled_classified_fraction: 0.0,
        estimated_concentration: 0.0,
    })?;
    writer.flush()?;
    Ok(())
}

///////////////////////////////
/// Write the per-channel segment QC report as headered TSV.
pub fn write_qc_report<W: Write>(
    dst: W,
    channels: &[(String, Vec<SegmentQc>)],
) -> anyhow::Result<()> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(dst);
    for (channel, segments) in channels {
        for (segment, qc) in segments.iter().enumerate() {
            writer.serialize(QcRow {
                channel,
                segment,
                record_count: qc.record_count,
                mean_quality: qc.mean_quality(),
                q30_fraction: qc.q30_fraction(),
                fraction_a: base_fraction(qc, b'A'),
                fraction_c: base_fraction(qc, b'C'),
                fraction_g: base_fraction(qc, b'G'),
                fraction_t: base_fraction(qc, b'T'),
                fraction_n: base_fraction(qc, b'N'),
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

#[inline]
fn base_fraction(qc: &SegmentQc, base: u8) -> f64 {
    if qc.total_bases > 0 {
        qc.base_count[encode_base(base) as usize] as f64 / qc.total_bases as f64
    } else {
        0.0
    }
}

pub fn create_report_file(path: &Path) -> Result<std::fs::File, Error> {
    std::fs::File::create(path)
        .map_err(|e| Error::io_error(format!("creating report {}", path.display()), e))
}
