//! Plain-text edge lists.
//!
//! # Input format
//! - line 1: total vertex count
//! - line 2: total edge count
//! - then one `tail head` pair of non-negative integers per line
//!
//! Blank lines are skipped. Tokens after the first two on an edge line are
//! ignored (weighted lists read as unweighted).
//!
//! # Output format
//! `tail head` per line, no header. Vertices are written with `Display`, so
//! relabeled fragments come out as `ab17 ab3`.

use crate::graph::vertex::{Edge, Vertex};
use crate::scaler_error::ScalerError;
use std::ffi::OsString;
use std::fmt::Display;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// The two header values of an input edge list.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EdgeListHeader {
    pub vertices: u64,
    pub edges: u64,
}

/// Line-oriented edge-list reader that keeps line numbers for diagnostics.
#[derive(Debug)]
pub struct EdgeListReader<R> {
    inner: R,
    line: usize,
    buf: String,
    edges_read: u64,
    header: Option<EdgeListHeader>,
}

impl<R: BufRead> EdgeListReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: 0,
            buf: String::new(),
            edges_read: 0,
            header: None,
        }
    }

    /// Advance to the next non-blank line into `buf`; false at end of input.
    fn next_line(&mut self) -> Result<bool, ScalerError> {
        loop {
            self.buf.clear();
            if self.inner.read_line(&mut self.buf)? == 0 {
                return Ok(false);
            }
            self.line += 1;
            if !self.buf.trim().is_empty() {
                return Ok(true);
            }
        }
    }

    fn header_value(&mut self) -> Result<u64, ScalerError> {
        if !self.next_line()? {
            return Err(ScalerError::MalformedHeader {
                line: self.line + 1,
                value: String::new(),
            });
        }
        let raw = self.buf.trim();
        raw.parse::<u64>().map_err(|_| ScalerError::MalformedHeader {
            line: self.line,
            value: raw.to_string(),
        })
    }

    /// Read the vertex-count and edge-count lines.
    pub fn read_header(&mut self) -> Result<EdgeListHeader, ScalerError> {
        let vertices = self.header_value()?;
        let edges = self.header_value()?;
        let header = EdgeListHeader { vertices, edges };
        self.header = Some(header);
        Ok(header)
    }

    /// Next edge, or `None` at end of input.
    pub fn next_edge(&mut self) -> Result<Option<Edge>, ScalerError> {
        if !self.next_line()? {
            return Ok(None);
        }
        let line = self.line;
        let raw = self.buf.trim();
        let malformed = || ScalerError::MalformedEdge {
            line,
            value: raw.to_string(),
        };
        let mut tokens = raw.split_whitespace();
        let (Some(t), Some(h)) = (tokens.next(), tokens.next()) else {
            return Err(malformed());
        };
        let edge = match (t.parse::<Vertex>(), h.parse::<Vertex>()) {
            (Ok(t), Ok(h)) => (t, h),
            _ => return Err(malformed()),
        };
        self.edges_read += 1;
        Ok(Some(edge))
    }

    /// Read exactly `n` edges; running out is [`ScalerError::TruncatedInput`].
    pub fn read_edges(&mut self, n: u64) -> Result<Vec<Edge>, ScalerError> {
        let mut out = Vec::with_capacity(usize::try_from(n).unwrap_or(0).min(1 << 20));
        for _ in 0..n {
            match self.next_edge()? {
                Some(e) => out.push(e),
                None => {
                    return Err(ScalerError::TruncatedInput {
                        read: self.edges_read,
                        expected: self.header.map_or(self.edges_read + 1, |h| h.edges),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Count the non-blank lines left after the declared edges.
    pub fn count_trailing(&mut self) -> Result<usize, ScalerError> {
        let mut n = 0;
        while self.next_line()? {
            n += 1;
        }
        Ok(n)
    }

    /// Number of the last line consumed (1-based).
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn edges_read(&self) -> u64 {
        self.edges_read
    }
}

/// Open an input edge list for buffered reading.
pub fn open_input(path: &Path) -> Result<BufReader<File>, ScalerError> {
    Ok(BufReader::new(File::open(path)?))
}

/// Create (truncating) an output file for buffered writing.
pub fn create_output(path: &Path) -> Result<BufWriter<File>, ScalerError> {
    Ok(BufWriter::new(File::create(path)?))
}

/// Write `tail head` lines; returns the number of edges written.
pub fn write_edges<W, V, I>(out: &mut W, edges: I) -> std::io::Result<u64>
where
    W: Write,
    V: Display,
    I: IntoIterator<Item = (V, V)>,
{
    let mut n = 0;
    for (t, h) in edges {
        writeln!(out, "{t} {h}")?;
        n += 1;
    }
    Ok(n)
}

/// Parallel-output file for fragment `index` of `rank`: `<output>.<rank>.<index>.edges`.
pub fn fragment_file_name(output: &Path, rank: usize, index: usize) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(format!(".{rank}.{index}.edges"));
    PathBuf::from(name)
}
