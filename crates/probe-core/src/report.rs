//! Primary CSV output

use crate::types::LatencyRecord;
use std::io::{self, Write};

/// Header row of the primary output
pub const CSV_HEADER: &str = "now,last_secret_update,last_on_pod";

/// Writes latency records as CSV, one flushed line per record
///
/// Output is written synchronously from the correlator task, at most one row
/// per observation (`watch.poll_interval_ms` is at least 1).
#[derive(Debug)]
pub struct ReportWriter<W: Write> {
    out: W,
    header_written: bool,
    rows: u64,
}

impl<W: Write> ReportWriter<W> {
    /// Create writer over an output
    #[inline]
    pub fn new(out: W) -> Self {
        Self {
            out,
            header_written: false,
            rows: 0,
        }
    }

    /// Write the header once
    ///
    /// # Errors
    /// Returns the underlying IO error.
    pub fn write_header(&mut self) -> io::Result<()> {
        if self.header_written {
            return Ok(());
        }
        writeln!(self.out, "{CSV_HEADER}")?;
        self.out.flush()?;
        self.header_written = true;
        Ok(())
    }

    /// Write one record, emitting the header first if needed
    ///
    /// # Errors
    /// Returns the underlying IO error.
    pub fn write_record(&mut self, record: &LatencyRecord) -> io::Result<()> {
        self.write_header()?;
        writeln!(self.out, "{}", record.to_csv_row())?;
        self.out.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Data rows written so far
    #[inline]
    #[must_use]
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Borrow the output
    #[inline]
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Recover the output
    #[inline]
    pub fn into_inner(self) -> W {
        self.out
    }
}
