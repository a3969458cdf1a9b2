//! Line-oriented JSON array format used for exported records.
//!
//! ```text
//! [
//! {"_id":"a",...},
//! {"_id":"b",...}
//! ]
//! ```
//!
//! One compact object per line, every line but the last comma-terminated.
//! Any JSON reader accepts the file as a whole; [`record_line`] lets the
//! reconciler consume it one line at a time.

use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use crate::sink::AtomicFile;

/// Incremental writer; memory stays flat regardless of record count
pub struct RecordStreamWriter<W: Write> {
    out: W,
    count: usize,
}

impl<W: Write> RecordStreamWriter<W> {
    pub fn new(mut out: W) -> io::Result<Self> {
        out.write_all(b"[\n")?;
        Ok(Self { out, count: 0 })
    }

    pub fn push<T: Serialize + ?Sized>(&mut self, record: &T) -> io::Result<()> {
        if self.count > 0 {
            self.out.write_all(b",\n")?;
        }
        serde_json::to_writer(&mut self.out, record)?;
        self.count += 1;
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Close the array and hand back the writer with the record count
    pub fn finish(mut self) -> io::Result<(W, usize)> {
        if self.count > 0 {
            self.out.write_all(b"\n")?;
        }
        self.out.write_all(b"]\n")?;
        self.out.flush()?;
        Ok((self.out, self.count))
    }
}

impl RecordStreamWriter<AtomicFile> {
    /// Stream into `path` via tmp→rename
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::new(AtomicFile::create(path)?)
    }

    /// Finish and rename into place. Returns `(records, bytes)`.
    pub fn commit(self) -> io::Result<(usize, u64)> {
        let (file, count) = self.finish()?;
        let bytes = file.commit()?;
        Ok((count, bytes))
    }

    /// Abandon the stream; nothing appears at the final path
    pub fn discard(self) -> io::Result<()> {
        self.out.discard()
    }
}

/// Payload of one stream line, or `None` for framing and blank lines.
///
/// Surrounding whitespace and trailing commas are stripped.
pub fn record_line(line: &str) -> Option<&str> {
    let line = line.trim().trim_end_matches(',');
    match line {
        "" | "[" | "]" | "[]" => None,
        _ => Some(line),
    }
}
