//! Reader for the tracer-to-engine coverage wire protocol, bit-exact: one
//! header, then hit records until a sentinel or the stream
//! ends. Generic over `Read` so the exact same parsing logic runs against
//! a real FIFO in production and an in-memory buffer in tests.

use std::io::Read;

use choronzon_core::{ChoronzonError, ErrorInfo};
use serde::{Deserialize, Serialize};

/// Sentinel `image_index` marking a termination record.
const SENTINEL_IMAGE_INDEX: u64 = 0xFFFF_FFFF_FFFF_FFFF;
/// `bbl` value on a sentinel record meaning the trial was terminated by an
/// out-of-band timeout flush rather than a fault.
const TIMEOUT_CODE: u64 = 0x0000_000C;
/// Mask the engine treats as marking a fatal exception code.
const FATAL_EXCEPTION_MASK: u64 = 0xC000_0000;

/// The image table learned from the protocol header: each image's logical
/// name at the index the tracer assigned it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTable {
    names: Vec<String>,
}

impl ImageTable {
    /// Returns the logical name registered at `index`, if any.
    pub fn name(&self, index: u64) -> Option<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }

    /// Number of images in the table.
    pub fn image_count(&self) -> usize {
        self.names.len()
    }
}

/// A single basic-block hit: the image it occurred in and the offset from
/// that image's load base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BasicBlockHit {
    /// Index of the image the hit occurred in.
    pub image_index: u64,
    /// Offset within the image, relative to its load base.
    pub bbl: u64,
}

/// The set of distinct basic-block edges hit during one trial.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageSet {
    hits: std::collections::BTreeSet<BasicBlockHit>,
    last_hit: Option<BasicBlockHit>,
}

impl CoverageSet {
    /// An empty coverage set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a hit, returning `true` if it was not already present.
    pub fn insert(&mut self, hit: BasicBlockHit) -> bool {
        self.last_hit = Some(hit);
        self.hits.insert(hit)
    }

    /// The most recently recorded hit, in wire order — used to attribute a
    /// `fatal_signal` termination to the block that was executing when the
    /// target crashed.
    pub fn last_hit(&self) -> Option<BasicBlockHit> {
        self.last_hit
    }

    /// Number of distinct edges in this set.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Whether this set has no recorded hits.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Iterates over the recorded hits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &BasicBlockHit> {
        self.hits.iter()
    }
}

/// Why a trial's execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// The target ran to completion without incident.
    Normal,
    /// The target raised a fatal signal or exception, carrying its code.
    FatalSignal(u64),
    /// The scheduler's per-trial timeout elapsed.
    Timeout,
    /// The stream ended before a sentinel was received, with no timeout
    /// signaled out-of-band.
    TracerError,
}

/// Parses the protocol header from `reader`.
pub fn read_header<R: Read>(reader: &mut R) -> Result<ImageTable, ChoronzonError> {
    let mut count_buf = [0u8; 1];
    reader
        .read_exact(&mut count_buf)
        .map_err(|err| header_error(err.to_string()))?;
    let mut names = Vec::with_capacity(count_buf[0] as usize);
    for _ in 0..count_buf[0] {
        let mut len_buf = [0u8; 2];
        reader
            .read_exact(&mut len_buf)
            .map_err(|err| header_error(err.to_string()))?;
        let len = u16::from_le_bytes(len_buf) as usize;
        let mut name_buf = vec![0u8; len];
        reader
            .read_exact(&mut name_buf)
            .map_err(|err| header_error(err.to_string()))?;
        names.push(String::from_utf8_lossy(&name_buf).into_owned());
    }
    Ok(ImageTable { names })
}

/// Reads one hit or sentinel record, or `Ok(None)` on a clean end-of-stream
/// (no bytes of a new record were available). A partial record (some but
/// not all 16 bytes available) is reported as a `TracerError`.
fn read_record<R: Read>(reader: &mut R) -> Result<Option<(u64, u64)>, ChoronzonError> {
    let mut index_buf = [0u8; 8];
    let mut read_so_far = 0usize;
    while read_so_far < 8 {
        let n = reader
            .read(&mut index_buf[read_so_far..])
            .map_err(|err| header_error(err.to_string()))?;
        if n == 0 {
            if read_so_far == 0 {
                return Ok(None);
            }
            return Err(tracer_error("truncated-record", "hit record index truncated"));
        }
        read_so_far += n;
    }
    let mut bbl_buf = [0u8; 8];
    reader
        .read_exact(&mut bbl_buf)
        .map_err(|_| tracer_error("truncated-record", "hit record offset truncated"))?;
    Ok(Some((
        u64::from_le_bytes(index_buf),
        u64::from_le_bytes(bbl_buf),
    )))
}

fn classify_sentinel(code: u64) -> TerminationReason {
    if code == TIMEOUT_CODE {
        TerminationReason::Timeout
    } else if code == 0 {
        TerminationReason::Normal
    } else {
        TerminationReason::FatalSignal(code)
    }
}

/// Returns whether `code` is treated as a fatal exception per the top-two-
/// bits rule (the "other platform" exception-code convention; POSIX signal
/// numbers are classified as fatal directly by [`classify_sentinel`]).
pub fn is_fatal_exception_code(code: u64) -> bool {
    code & FATAL_EXCEPTION_MASK == FATAL_EXCEPTION_MASK
}

/// Reads a complete header plus hit-record stream from `reader`, returning
/// the accumulated coverage set and termination reason.
///
/// `timeout_already_signaled` is polled (not snapshotted) at the moment an
/// end-of-stream is actually detected, since a read can block across an
/// arbitrarily long window and the out-of-band timeout signal may arrive
/// partway through it; it controls how an end-of-stream with no sentinel is
/// classified: `tracer_error` unless a timeout was raised.
pub fn ingest<R: Read>(
    reader: &mut R,
    timeout_already_signaled: impl Fn() -> bool,
) -> Result<(ImageTable, CoverageSet, TerminationReason), ChoronzonError> {
    let table = read_header(reader)?;
    let mut coverage = CoverageSet::new();
    loop {
        match read_record(reader)? {
            None => {
                let reason = if timeout_already_signaled() {
                    TerminationReason::Timeout
                } else {
                    TerminationReason::TracerError
                };
                return Ok((table, coverage, reason));
            }
            Some((image_index, bbl)) if image_index == SENTINEL_IMAGE_INDEX => {
                return Ok((table, coverage, classify_sentinel(bbl)));
            }
            Some((image_index, bbl)) => {
                coverage.insert(BasicBlockHit { image_index, bbl });
            }
        }
    }
}

fn header_error(message: String) -> ChoronzonError {
    ChoronzonError::Tracer(ErrorInfo::new("tracer-header", message))
}

fn tracer_error(code: &str, message: &str) -> ChoronzonError {
    ChoronzonError::Tracer(ErrorInfo::new(code, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn record(image_index: u64, bbl: u64) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&image_index.to_le_bytes());
        out[8..].copy_from_slice(&bbl.to_le_bytes());
        out
    }

    #[test]
    fn fatal_signal_sentinel_is_recorded_as_a_crash() {
        let mut bytes = vec![0x01u8, 0x04, 0x00];
        bytes.extend_from_slice(b"libx");
        bytes.extend_from_slice(&record(0, 16));
        bytes.extend_from_slice(&record(SENTINEL_IMAGE_INDEX, 11));
        let mut cursor = Cursor::new(bytes);
        let (table, coverage, reason) = ingest(&mut cursor, || false).unwrap();
        assert_eq!(table.name(0), Some("libx"));
        assert_eq!(coverage.len(), 1);
        assert!(coverage
            .iter()
            .any(|hit| hit.image_index == 0 && hit.bbl == 16));
        assert_eq!(reason, TerminationReason::FatalSignal(11));
    }

    #[test]
    fn timeout_sentinel_is_recognized() {
        let mut bytes = vec![0x00u8];
        bytes.extend_from_slice(&record(SENTINEL_IMAGE_INDEX, TIMEOUT_CODE));
        let mut cursor = Cursor::new(bytes);
        let (_, _, reason) = ingest(&mut cursor, || false).unwrap();
        assert_eq!(reason, TerminationReason::Timeout);
    }

    #[test]
    fn stream_end_without_sentinel_is_tracer_error_by_default() {
        let mut bytes = vec![0x00u8];
        bytes.extend_from_slice(&record(2, 99));
        let mut cursor = Cursor::new(bytes);
        let (_, _, reason) = ingest(&mut cursor, || false).unwrap();
        assert_eq!(reason, TerminationReason::TracerError);
    }

    #[test]
    fn stream_end_without_sentinel_is_timeout_when_flagged() {
        let mut bytes = vec![0x00u8];
        bytes.extend_from_slice(&record(2, 99));
        let mut cursor = Cursor::new(bytes);
        let (_, _, reason) = ingest(&mut cursor, || true).unwrap();
        assert_eq!(reason, TerminationReason::Timeout);
    }

    #[test]
    fn truncated_record_is_a_tracer_error() {
        let mut bytes = vec![0x00u8];
        bytes.extend_from_slice(&[1, 2, 3]);
        let mut cursor = Cursor::new(bytes);
        assert!(ingest(&mut cursor, || false).is_err());
    }

    #[test]
    fn normal_termination_reports_zero_code() {
        let mut bytes = vec![0x00u8];
        bytes.extend_from_slice(&record(SENTINEL_IMAGE_INDEX, 0));
        let mut cursor = Cursor::new(bytes);
        let (_, _, reason) = ingest(&mut cursor, || false).unwrap();
        assert_eq!(reason, TerminationReason::Normal);
    }
}
