use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Args, ValueEnum};
use crossbeam::channel::bounded;
use log::{info, warn};
use threadpool::ThreadPool;

use crate::barcode::{Barcode, Decoder, LikelihoodModel, ProbabilisticDecoder};
use crate::config::{read_sample_file, DecoderPolicy, FeedConfig, SiteConfig};
use crate::feed::{BufferedFeed, CorruptPolicy, Direction, OutputChannel, SegmentFeed};
use crate::fileformat::{FastqSink, FastqSource, NullSink};
use crate::model::Record;
use crate::report;
use crate::runtime::Error;
use crate::stats::{SegmentQc, SelectorStats};

pub const DEFAULT_CAPACITY: usize = 2048;
pub const DEFAULT_RESOLUTION: usize = 256;
pub const DEFAULT_THREADS: usize = 4;

/// Records handed to a worker per channel send.
const BATCH_SIZE: usize = 256;

/// Decoder selection on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecoderKind {
    /// minimum distance with per-position tolerances
    MinDistance,
    /// posterior probability, raw product likelihood
    Direct,
    /// posterior probability, phred-domain sum
    Phred,
    /// posterior probability, compensated phred-domain sum
    CompensatedPhred,
}

impl DecoderKind {
    fn policy(self, confidence: f64, conditional: f64, noise_prior: f64) -> DecoderPolicy {
        let model = match self {
            DecoderKind::MinDistance => return DecoderPolicy::MinDistance,
            DecoderKind::Direct => LikelihoodModel::Direct,
            DecoderKind::Phred => LikelihoodModel::Phred,
            DecoderKind::CompensatedPhred => LikelihoodModel::CompensatedPhred,
        };
        DecoderPolicy::Probabilistic {
            model,
            confidence_floor: confidence,
            conditional_confidence_floor: conditional,
            noise_prior,
        }
    }
}

#[derive(Args)]
pub struct DemuxCMD {
    // Input FASTQ files, one per record segment, in segment order
    #[arg(short = 'i', long = "in", value_parser, num_args = 1.., required = true)]
    pub inputs: Vec<PathBuf>,

    // Sample metadata TSV: sample, barcode, optional prior
    #[arg(short = 's', long = "samples", value_parser)]
    pub samples: PathBuf,

    // Output directory for per-sample FASTQ and reports
    #[arg(short = 'o', long = "out", value_parser)]
    pub outdir: PathBuf,

    // Which input segments carry the sample barcode, in registry order
    #[arg(long = "barcode-segments", value_delimiter = ',', default_value = "0")]
    pub barcode_segments: Vec<usize>,

    #[arg(long = "decoder", value_enum, default_value_t = DecoderKind::Phred)]
    pub decoder: DecoderKind,

    #[arg(long = "confidence", default_value_t = ProbabilisticDecoder::DEFAULT_CONFIDENCE_FLOOR)]
    pub confidence_floor: f64,

    #[arg(long = "conditional-confidence", default_value_t = ProbabilisticDecoder::DEFAULT_CONDITIONAL_CONFIDENCE_FLOOR)]
    pub conditional_confidence_floor: f64,

    #[arg(long = "noise-prior", default_value_t = ProbabilisticDecoder::DEFAULT_NOISE_PRIOR)]
    pub noise_prior: f64,

    // Per-segment mismatch tolerance for the minimum-distance decoder
    #[arg(long = "tolerance", value_delimiter = ',', default_value = "1")]
    pub tolerance: Vec<u8>,

    // Observed calls below this quality count as mismatches; 0 disables
    #[arg(long = "masking-threshold", default_value_t = 0)]
    pub masking_threshold: u8,

    // Optional molecular index registry TSV, classified independently
    #[arg(long = "umi-metadata", value_parser)]
    pub umi_metadata: Option<PathBuf>,

    // Which input segments carry the molecular index
    #[arg(long = "umi-segments", value_delimiter = ',')]
    pub umi_segments: Vec<usize>,

    #[arg(long = "umi-tolerance", value_delimiter = ',')]
    pub umi_tolerance: Vec<u8>,

    #[arg(long = "capacity", default_value_t = DEFAULT_CAPACITY)]
    pub capacity: usize,

    #[arg(long = "resolution", default_value_t = DEFAULT_RESOLUTION)]
    pub resolution: usize,

    #[arg(short = 't', long = "threads", default_value_t = DEFAULT_THREADS)]
    pub threads: usize,

    // Skip corrupt records instead of aborting the run
    #[arg(long = "skip-corrupt")]
    pub skip_corrupt: bool,

    // Route platform QC-failed reads into the QC accumulators too
    #[arg(long = "include-qc-failed")]
    pub include_qc_failed: bool,

    // Write per-sample FASTQ gzip-compressed
    #[arg(long = "gzip")]
    pub gzip: bool,

    // Also write unclassified reads as FASTQ instead of discarding them
    #[arg(long = "write-unclassified")]
    pub write_unclassified: bool,
}

/// Everything a worker needs for one independent classification decision.
struct Site {
    decoder: Arc<dyn Decoder>,
    segments: Arc<Vec<usize>>,
    template: Barcode,
    option_count: usize,
}

impl Site {
    fn build(config: &SiteConfig, segments: &[usize]) -> Site {
        Site {
            decoder: Arc::from(config.build_decoder()),
            segments: Arc::new(segments.to_vec()),
            template: config.registry[0].clone(),
            option_count: config.option_count(),
        }
    }

    fn share(&self) -> Site {
        Site {
            decoder: Arc::clone(&self.decoder),
            segments: Arc::clone(&self.segments),
            template: self.template.clone(),
            option_count: self.option_count,
        }
    }
}

impl DemuxCMD {
    ///////////////////////////////
    /// Run the commandline option. Reads the input FASTQ files in lockstep,
    /// classifies every record against the sample registry and routes it to
    /// the matching per-sample output, collecting statistics along the way.
    pub fn try_execute(&mut self) -> Result<()> {
        for path in &self.inputs {
            if !path.exists() {
                bail!("input file {} does not exist", path.display());
            }
        }
        let segment_count = self.inputs.len();
        for &s in self.barcode_segments.iter().chain(self.umi_segments.iter()) {
            if s >= segment_count {
                bail!(
                    "barcode segment index {} out of range for {} inputs",
                    s,
                    segment_count
                );
            }
        }

        let feed_config = FeedConfig {
            capacity: self.capacity,
            resolution: self.resolution,
            corrupt: if self.skip_corrupt {
                CorruptPolicy::Skip
            } else {
                CorruptPolicy::Abort
            },
            include_qc_failed: self.include_qc_failed,
        };
        feed_config.validate()?;

        let policy = self.decoder.policy(
            self.confidence_floor,
            self.conditional_confidence_floor,
            self.noise_prior,
        );
        let rows = read_sample_file(&self.samples)?;
        let sample_site = SiteConfig::from_rows(
            &rows,
            &self.tolerance,
            self.masking_threshold,
            policy,
        )?;
        if sample_site.registry[0].total_fragments() != self.barcode_segments.len() {
            bail!(
                "registry barcodes have {} segments but {} barcode segments were given",
                sample_site.registry[0].total_fragments(),
                self.barcode_segments.len()
            );
        }

        let umi_site = self.load_umi_site(policy)?;

        fs::create_dir_all(&self.outdir)
            .map_err(|e| Error::io_error(format!("creating {}", self.outdir.display()), e))?;

        // IN feeds, one per input segment; their indices open the global
        // lock-order table
        let mut input_feeds = Vec::with_capacity(segment_count);
        for (i, path) in self.inputs.iter().enumerate() {
            let source = FastqSource::open(path)?;
            let feed = BufferedFeed::new(
                &format!("in-{}", i),
                Direction::In,
                i,
                feed_config.capacity,
                feed_config.resolution,
                source,
                feed_config.corrupt,
            )?;
            feed.open();
            input_feeds.push(feed);
        }

        let (channels, out_feeds) =
            self.open_output(&sample_site, segment_count, &feed_config)?;
        let channels = Arc::new(channels);

        // worker pool in the usual shape: a bounded channel of record
        // batches, one None per worker to terminate, stats shards sent back
        let pool = ThreadPool::new(self.threads);
        let (tx, rx) = bounded::<Option<Vec<Record>>>(self.threads * 2);
        let (stats_tx, stats_rx) =
            bounded::<(SelectorStats, Option<SelectorStats>)>(self.threads);
        let push_failed = Arc::new(AtomicBool::new(false));

        let sample = Site::build(&sample_site, &self.barcode_segments);
        let umi = umi_site
            .as_ref()
            .map(|(config, segments)| Site::build(config, segments));

        for _ in 0..self.threads {
            let rx = rx.clone();
            let stats_tx = stats_tx.clone();
            let channels = Arc::clone(&channels);
            let push_failed = Arc::clone(&push_failed);
            let sample = sample.share();
            let umi = umi.as_ref().map(|u| u.share());

            pool.execute(move || {
                let mut stats = SelectorStats::new(sample.option_count);
                let mut umi_stats = umi.as_ref().map(|u| SelectorStats::new(u.option_count));
                let mut observed = Barcode::shaped_like(&sample.template);
                let mut umi_observed = umi.as_ref().map(|u| Barcode::shaped_like(&u.template));

                while let Ok(Some(batch)) = rx.recv() {
                    for record in &batch {
                        let channel_index = match extract_observed(
                            record,
                            &sample.segments,
                            &sample.template,
                            &mut observed,
                        ) {
                            Ok(()) => {
                                let decoded = sample.decoder.decode(&observed);
                                stats.record(&decoded);
                                decoded.option.unwrap_or(sample.option_count)
                            }
                            Err(e) => {
                                warn!("skipping unclassifiable record: {}", e);
                                stats.record_corrupt();
                                sample.option_count
                            }
                        };

                        if let (Some(u), Some(s), Some(o)) =
                            (&umi, &mut umi_stats, &mut umi_observed)
                        {
                            match extract_observed(record, &u.segments, &u.template, o) {
                                Ok(()) => s.record(&u.decoder.decode(o)),
                                Err(_) => s.record_corrupt(),
                            }
                        }

                        if !channels[channel_index].push(record) {
                            push_failed.store(true, Ordering::Relaxed);
                        }
                    }
                }
                let _ = stats_tx.send((stats, umi_stats.take()));
            });
        }
        drop(rx);
        drop(stats_tx);

        // read loop: one segment from every IN feed in lockstep
        let mut total = 0u64;
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        loop {
            let mut record = Record::with_segments(segment_count);
            let mut pulled = 0usize;
            for (i, feed) in input_feeds.iter().enumerate() {
                let mut lock = feed.acquire_pull_lock();
                if lock.pull(&mut record.segments[i]) {
                    pulled += 1;
                }
            }
            if pulled == 0 {
                break;
            }
            if pulled != segment_count {
                // a feed whose background thread died also reports a short
                // pull; join every input first so the real failure wins over
                // the unequal-counts diagnosis
                for feed in &input_feeds {
                    feed.stop();
                }
                for feed in &input_feeds {
                    feed.join()?;
                }
                bail!(
                    "input files carry unequal record counts ({} records read in lockstep)",
                    total
                );
            }
            total += 1;
            batch.push(record);
            if batch.len() == BATCH_SIZE {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(BATCH_SIZE));
                tx.send(Some(full))?;
            }
        }
        if !batch.is_empty() {
            tx.send(Some(batch))?;
        }
        for _ in 0..self.threads {
            tx.send(None)?;
        }
        drop(tx);
        pool.join();

        // shard merge is the only stats synchronization in the run
        let mut master = SelectorStats::new(sample.option_count);
        let mut umi_master = umi.as_ref().map(|u| SelectorStats::new(u.option_count));
        while let Ok((shard, umi_shard)) = stats_rx.recv() {
            master.collect(&shard);
            if let (Some(m), Some(s)) = (&mut umi_master, &umi_shard) {
                m.collect(s);
            }
        }

        for feed in &input_feeds {
            feed.join()?;
            master.corrupt_record_count += feed.corrupt_count();
        }
        for feed in &out_feeds {
            feed.stop();
        }
        for feed in &out_feeds {
            feed.join()?;
        }
        if push_failed.load(Ordering::Relaxed) {
            bail!("one or more output feeds refused records; the run is incomplete");
        }

        master.finalize();
        self.write_reports(&sample_site, &master, umi_site.as_ref(), umi_master, &channels)?;

        info!(
            "demultiplexed {} records: {} classified ({:.2}%), {} unclassified, {} corrupt",
            total,
            master.classified_count,
            100.0 * master.classified_fraction,
            master.unclassified_count,
            master.corrupt_record_count
        );
        Ok(())
    }

    ///////////////////////////////
    /// Resolve the optional molecular-index site. A missing tolerance list
    /// defaults to one mismatch per segment.
    fn load_umi_site(&self, policy: DecoderPolicy) -> Result<Option<(SiteConfig, Vec<usize>)>> {
        let Some(path) = &self.umi_metadata else {
            return Ok(None);
        };
        if self.umi_segments.is_empty() {
            bail!("--umi-metadata requires --umi-segments");
        }
        let rows = read_sample_file(path)?;
        let segment_count = rows[0].barcode.split('-').count();
        let tolerance = if self.umi_tolerance.is_empty() {
            vec![1u8; segment_count]
        } else {
            self.umi_tolerance.clone()
        };
        let site = SiteConfig::from_rows(&rows, &tolerance, self.masking_threshold, policy)?;
        if site.registry[0].total_fragments() != self.umi_segments.len() {
            bail!(
                "molecular index registry has {} segments but {} umi segments were given",
                site.registry[0].total_fragments(),
                self.umi_segments.len()
            );
        }
        Ok(Some((site, self.umi_segments.clone())))
    }

    ///////////////////////////////
    /// Create one output channel per sample plus the unclassified bucket.
    /// Out-feed lock-order indices continue where the IN feeds stopped.
    fn open_output(
        &self,
        site: &SiteConfig,
        segment_count: usize,
        feed_config: &FeedConfig,
    ) -> Result<(Vec<Arc<OutputChannel>>, Vec<Arc<dyn SegmentFeed>>)> {
        let extension = if self.gzip { ".fastq.gz" } else { ".fastq" };
        let mut next_index = segment_count;
        let mut channels = Vec::with_capacity(site.labels.len() + 1);
        let mut out_feeds: Vec<Arc<dyn SegmentFeed>> = Vec::new();

        for label in &site.labels {
            let mut feeds: Vec<Arc<dyn SegmentFeed>> = Vec::with_capacity(segment_count);
            for j in 0..segment_count {
                let path = self.outdir.join(format!("{}_R{}{}", label, j + 1, extension));
                let sink = FastqSink::create(&path)?;
                let feed = BufferedFeed::new(
                    &format!("{}-r{}", label, j + 1),
                    Direction::Out,
                    next_index,
                    feed_config.capacity,
                    feed_config.resolution,
                    sink,
                    feed_config.corrupt,
                )?;
                next_index += 1;
                feed.open();
                out_feeds.push(Arc::clone(&feed) as Arc<dyn SegmentFeed>);
                feeds.push(feed as Arc<dyn SegmentFeed>);
            }
            channels.push(Arc::new(OutputChannel::new(
                label,
                feeds,
                self.include_qc_failed,
            )));
        }

        let mut feeds: Vec<Arc<dyn SegmentFeed>> = Vec::with_capacity(segment_count);
        for j in 0..segment_count {
            let name = format!("unclassified-r{}", j + 1);
            let feed: Arc<dyn SegmentFeed> = if self.write_unclassified {
                let path = self
                    .outdir
                    .join(format!("unclassified_R{}{}", j + 1, extension));
                let feed = BufferedFeed::new(
                    &name,
                    Direction::Out,
                    next_index,
                    feed_config.capacity,
                    feed_config.resolution,
                    FastqSink::create(&path)?,
                    feed_config.corrupt,
                )?;
                feed.open();
                feed
            } else {
                let feed = BufferedFeed::new(
                    &name,
                    Direction::Out,
                    next_index,
                    feed_config.capacity,
                    feed_config.resolution,
                    NullSink,
                    feed_config.corrupt,
                )?;
                feed.open();
                feed
            };
            next_index += 1;
            out_feeds.push(Arc::clone(&feed));
            feeds.push(feed);
        }
        channels.push(Arc::new(OutputChannel::new(
            "unclassified",
            feeds,
            self.include_qc_failed,
        )));

        Ok((channels, out_feeds))
    }

    fn write_reports(
        &self,
        sample_site: &SiteConfig,
        master: &SelectorStats,
        umi_site: Option<&(SiteConfig, Vec<usize>)>,
        umi_master: Option<SelectorStats>,
        channels: &[Arc<OutputChannel>],
    ) -> Result<()> {
        let path = self.outdir.join("demux_report.tsv");
        report::write_classification_report(
            report::create_report_file(&path)?,
            &sample_site.labels,
            master,
        )?;
        info!("wrote classification report to {}", path.display());

        if let (Some((site, _)), Some(mut stats)) = (umi_site, umi_master) {
            stats.finalize();
            let path = self.outdir.join("umi_report.tsv");
            report::write_classification_report(
                report::create_report_file(&path)?,
                &site.labels,
                &stats,
            )?;
            info!("wrote molecular index report to {}", path.display());
        }

        let qc: Vec<(String, Vec<SegmentQc>)> = channels
            .iter()
            .map(|c| (c.label().to_string(), c.qc()))
            .collect();
        let path = self.outdir.join("qc_report.tsv");
        report::write_qc_report(report::create_report_file(&path)?, &qc)?;
        info!("wrote qc report to {}", path.display());
        Ok(())
    }
}

///////////////////////////////
/// Fill the observed barcode from the record's configured segments, one
/// registry-length prefix per contributing segment.
fn extract_observed(
    record: &Record,
    segments: &[usize],
    template: &Barcode,
    observed: &mut Barcode,
) -> Result<(), Error> {
    for (k, &s) in segments.iter().enumerate() {
        let want = template.segment(k).len();
        let fragment = &record.segments[s].fragment;
        if fragment.len() < want {
            return Err(Error::corrupt_record(
                String::from_utf8_lossy(&record.segments[s].name),
                Some(format!(
                    "segment {} is shorter than the {} base barcode",
                    s, want
                )),
            ));
        }
        observed
            .segment_mut(k)
            .fill(&fragment.code()[..want], &fragment.quality()[..want]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::Fragment;
    use tempfile::TempDir;

    fn record_with(seqs: &[(&str, &[u8], u8)]) -> Record {
        let mut record = Record::with_segments(seqs.len());
        for (i, (name, seq, quality)) in seqs.iter().enumerate() {
            record.segments[i].name = name.as_bytes().to_vec();
            record.segments[i].fragment = Fragment::from_ascii(seq, *quality);
        }
        record
    }

    #[test]
    fn extract_takes_registry_length_prefix() {
        let template = Barcode::from_ascii_segments(&[b"AAAA"], &[1], 0);
        let mut observed = Barcode::shaped_like(&template);
        let record = record_with(&[("r1", b"ACGTACGT", 40), ("i1", b"AAATCCCC", 30)]);
        extract_observed(&record, &[1], &template, &mut observed).unwrap();
        assert_eq!(observed.segment(0).to_ascii(), b"AAAT".to_vec());
        assert_eq!(observed.segment(0).quality(), &[30, 30, 30, 30]);
    }

    #[test]
    fn extract_rejects_short_segment() {
        let template = Barcode::from_ascii_segments(&[b"AAAAAAAA"], &[1], 0);
        let mut observed = Barcode::shaped_like(&template);
        let record = record_with(&[("r1", b"ACGT", 40)]);
        let outcome = extract_observed(&record, &[0], &template, &mut observed);
        assert!(matches!(outcome, Err(Error::CorruptRecord { .. })));
    }

    fn write_fastq(dir: &TempDir, name: &str, records: &[(&str, &str, &str)]) -> PathBuf {
        let path = dir.path().join(name);
        let mut content = String::new();
        for (head, seq, qual) in records {
            content.push_str(&format!("@{}\n{}\n+\n{}\n", head, seq, qual));
        }
        fs::write(&path, content).unwrap();
        path
    }

    ///////////////////////////////
    /// A background read failure in one of several inputs must surface as
    /// that feed's error, not as an unequal-record-count complaint.
    #[test]
    fn dead_input_feed_surfaces_its_own_error() {
        let dir = TempDir::new().unwrap();
        let r1 = write_fastq(
            &dir,
            "r1.fastq",
            &[
                ("read1 1:N:0:1", "ACGTACGT", "IIIIIIII"),
                ("read2 1:N:0:1", "TTGGCCAA", "IIIIIIII"),
                ("read3 1:N:0:1", "GGGGCCCC", "IIIIIIII"),
            ],
        );
        // second record truncated mid-sequence
        let i1 = dir.path().join("i1.fastq");
        fs::write(&i1, "@read1 1:N:0:1\nAAAA\n+\nIIII\n@read2 1:N:0:1\nTT\n").unwrap();
        let samples = dir.path().join("samples.tsv");
        fs::write(&samples, "sample\tbarcode\nalpha\tAAAA\nbeta\tTTTT\n").unwrap();

        let mut cmd = DemuxCMD {
            inputs: vec![r1, i1],
            samples,
            outdir: dir.path().join("out"),
            barcode_segments: vec![1],
            decoder: DecoderKind::MinDistance,
            confidence_floor: ProbabilisticDecoder::DEFAULT_CONFIDENCE_FLOOR,
            conditional_confidence_floor:
                ProbabilisticDecoder::DEFAULT_CONDITIONAL_CONFIDENCE_FLOOR,
            noise_prior: ProbabilisticDecoder::DEFAULT_NOISE_PRIOR,
            tolerance: vec![1],
            masking_threshold: 0,
            umi_metadata: None,
            umi_segments: vec![],
            umi_tolerance: vec![],
            capacity: 16,
            resolution: 16,
            threads: 2,
            skip_corrupt: false,
            include_qc_failed: false,
            gzip: false,
            write_unclassified: false,
        };
        let err = cmd.try_execute().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Corrupt record"), "unexpected error: {}", msg);
        assert!(
            !msg.contains("unequal record counts"),
            "feed failure misreported as: {}",
            msg
        );
    }

    ///////////////////////////////
    /// End-to-end: two samples, two input segments, barcode on the second.
    #[test]
    fn demultiplexes_two_samples_end_to_end() {
        let dir = TempDir::new().unwrap();
        let r1 = write_fastq(
            &dir,
            "r1.fastq",
            &[
                ("read1 1:N:0:1", "ACGTACGT", "IIIIIIII"),
                ("read2 1:N:0:1", "TTGGCCAA", "IIIIIIII"),
                ("read3 1:N:0:1", "GGGGCCCC", "IIIIIIII"),
            ],
        );
        let i1 = write_fastq(
            &dir,
            "i1.fastq",
            &[
                ("read1 1:N:0:1", "AAAA", "IIII"),
                ("read2 1:N:0:1", "TTTT", "IIII"),
                ("read3 1:N:0:1", "AAAT", "IIII"),
            ],
        );
        let samples = dir.path().join("samples.tsv");
        fs::write(&samples, "sample\tbarcode\nalpha\tAAAA\nbeta\tTTTT\n").unwrap();
        let outdir = dir.path().join("out");

        let mut cmd = DemuxCMD {
            inputs: vec![r1, i1],
            samples,
            outdir: outdir.clone(),
            barcode_segments: vec![1],
            // short barcodes cannot clear the posterior noise floor; the
            // distance decoder keeps the scenario deterministic
            decoder: DecoderKind::MinDistance,
            confidence_floor: ProbabilisticDecoder::DEFAULT_CONFIDENCE_FLOOR,
            conditional_confidence_floor:
                ProbabilisticDecoder::DEFAULT_CONDITIONAL_CONFIDENCE_FLOOR,
            noise_prior: ProbabilisticDecoder::DEFAULT_NOISE_PRIOR,
            tolerance: vec![1],
            masking_threshold: 0,
            umi_metadata: None,
            umi_segments: vec![],
            umi_tolerance: vec![],
            capacity: 16,
            resolution: 16,
            threads: 2,
            skip_corrupt: false,
            include_qc_failed: false,
            gzip: false,
            write_unclassified: false,
        };
        cmd.try_execute().unwrap();

        let alpha = fs::read_to_string(outdir.join("alpha_R1.fastq")).unwrap();
        let mut alpha_reads: Vec<&str> = alpha
            .lines()
            .step_by(4)
            .map(|l| l.split(' ').next().unwrap())
            .collect();
        alpha_reads.sort_unstable();
        assert_eq!(alpha_reads, vec!["@read1", "@read3"]);

        let beta = fs::read_to_string(outdir.join("beta_R2.fastq")).unwrap();
        assert!(beta.contains("@read2"));
        assert!(beta.contains("TTTT"));

        let report = fs::read_to_string(outdir.join("demux_report.tsv")).unwrap();
        let alpha_row = report
            .lines()
            .find(|l| l.starts_with("alpha\t"))
            .unwrap();
        assert!(alpha_row.starts_with("alpha\t2\t"));
        assert!(outdir.join("qc_report.tsv").exists());
    }
}
