use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use seq_io::fastq::{Reader as FastqReader, Record as FastqRecord};

use crate::model::{DecodeOutcome, RecordCodec, Segment};
use crate::runtime::Error;

/// Offset of the ASCII phred encoding in FASTQ quality strings.
const PHRED_OFFSET: u8 = 33;

///////////////////////////////
/// Open a FASTQ file, sniffing the compression.
pub fn open_fastq(path: &PathBuf) -> anyhow::Result<FastqReader<Box<dyn std::io::Read + Send>>> {
    let opened_handle = File::open(path)
        .map_err(|e| Error::io_error(format!("opening fastq file {}", path.display()), e))?;

    let (reader, compression) = niffler::send::get_reader(Box::new(opened_handle))
        .map_err(|e| anyhow::anyhow!("could not open fastq file {}: {}", path.display(), e))?;

    debug!(
        "Opened file {} with compression {:?}",
        path.display(),
        compression
    );
    Ok(FastqReader::new(reader))
}

///////////////////////////////
/// Record-format collaborator reading one FASTQ file, one segment per
/// record. Parses the Illumina comment field for the platform QC flag.
pub struct FastqSource {
    path: PathBuf,
    reader: FastqReader<Box<dyn std::io::Read + Send>>,
    /// a FASTQ parse error loses framing; after one the stream is over
    poisoned: bool,
}

impl FastqSource {
    pub fn open(path: &Path) -> anyhow::Result<FastqSource> {
        let reader = open_fastq(&path.to_path_buf())?;
        Ok(FastqSource {
            path: path.to_path_buf(),
            reader,
            poisoned: false,
        })
    }
}

///////////////////////////////
/// The comment of an Illumina read header is `<read>:<filter>:...`; a
/// filter field of Y marks the read as failing platform QC.
fn qc_fail_from_head(head: &[u8]) -> bool {
    let Some(space) = head.iter().position(|&b| b == b' ') else {
        return false;
    };
    let comment = &head[space + 1..];
    let mut fields = comment.split(|&b| b == b':');
    let _read = fields.next();
    matches!(fields.next(), Some(b"Y"))
}

impl RecordCodec<Segment> for FastqSource {
    fn decode(&mut self, slot: &mut Segment) -> Result<DecodeOutcome, Error> {
        if self.poisoned {
            return Ok(DecodeOutcome::EndOfStream);
        }
        match self.reader.next() {
            None => Ok(DecodeOutcome::EndOfStream),
            Some(Ok(record)) => {
                slot.clear();
                slot.name.extend_from_slice(record.head());
                slot.qc_fail = qc_fail_from_head(record.head());
                // the parser only yields records with equal sequence and
                // quality lengths
                let rescaled: Vec<u8> = record
                    .qual()
                    .iter()
                    .map(|&q| q.saturating_sub(PHRED_OFFSET))
                    .collect();
                slot.fragment.fill_ascii(record.seq(), &rescaled);
                Ok(DecodeOutcome::Record)
            }
            Some(Err(e)) => {
                self.poisoned = true;
                Err(Error::corrupt_record(
                    format!("in {}", self.path.display()),
                    Some(e.to_string()),
                ))
            }
        }
    }

    fn encode(&mut self, _slot: &Segment) -> Result<(), Error> {
        unreachable!("fastq source never encodes")
    }

    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

enum SinkWriter {
    Plain(BufWriter<File>),
    Gz(GzEncoder<BufWriter<File>>),
    Closed,
}

///////////////////////////////
/// Record-format collaborator writing one FASTQ file, gzip-compressed when
/// the path ends in .gz.
pub struct FastqSink {
    path: PathBuf,
    writer: SinkWriter,
}

impl FastqSink {
    pub fn create(path: &Path) -> Result<FastqSink, Error> {
        let file = File::create(path)
            .map_err(|e| Error::io_error(format!("creating {}", path.display()), e))?;
        let buffered = BufWriter::new(file);
        let writer = if path.extension().is_some_and(|e| e == "gz") {
            SinkWriter::Gz(GzEncoder::new(buffered, Compression::default()))
        } else {
            SinkWriter::Plain(buffered)
        };
        Ok(FastqSink {
            path: path.to_path_buf(),
            writer,
        })
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let outcome = match &mut self.writer {
            SinkWriter::Plain(w) => w.write_all(bytes),
            SinkWriter::Gz(w) => w.write_all(bytes),
            SinkWriter::Closed => return Ok(()),
        };
        outcome.map_err(|e| Error::io_error(format!("writing {}", self.path.display()), e))
    }
}

impl RecordCodec<Segment> for FastqSink {
    fn decode(&mut self, _slot: &mut Segment) -> Result<DecodeOutcome, Error> {
        unreachable!("fastq sink never decodes")
    }

    fn encode(&mut self, slot: &Segment) -> Result<(), Error> {
        self.write_all(b"@")?;
        self.write_all(&slot.name)?;
        self.write_all(b"\n")?;
        self.write_all(&slot.fragment.to_ascii())?;
        self.write_all(b"\n+\n")?;
        let qual: Vec<u8> = slot
            .fragment
            .quality()
            .iter()
            .map(|&q| q + PHRED_OFFSET)
            .collect();
        self.write_all(&qual)?;
        self.write_all(b"\n")
    }

    fn close(&mut self) -> Result<(), Error> {
        let finished = match std::mem::replace(&mut self.writer, SinkWriter::Closed) {
            SinkWriter::Plain(mut w) => w.flush(),
            SinkWriter::Gz(w) => w.finish().and_then(|mut inner| inner.flush()),
            SinkWriter::Closed => Ok(()),
        };
        finished.map_err(|e| Error::io_error(format!("closing {}", self.path.display()), e))
    }
}
