//! CSV skip log.

use std::io::Write;

use meridian_core::import::{ImportError, SkipEntry, SkipLog};

/// Appends skipped rows as `uuid,email,reason` lines.
///
/// Each line is flushed as it is written so an interrupted run still
/// leaves a usable log.
pub struct CsvSkipLog<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSkipLog<W> {
    /// Wraps a writer. The header is written with the first entry.
    pub fn new(inner: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(inner),
        }
    }

    /// Flushes and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn into_inner(self) -> Result<W, ImportError> {
        self.writer
            .into_inner()
            .map_err(|e| ImportError::SkipLog(e.to_string()))
    }
}

impl<W: Write> SkipLog for CsvSkipLog<W> {
    fn record(&mut self, entry: SkipEntry) -> Result<(), ImportError> {
        self.writer
            .serialize(&entry)
            .and_then(|()| self.writer.flush().map_err(csv::Error::from))
            .map_err(|e| ImportError::SkipLog(e.to_string()))
    }
}
