//! Rendering of ranked results and metric reports.
//!
//! `json` emits one document per call, `jsonl` one compact line per record
//! (a query result or a single ranked item), `text` an aligned table for
//! terminals.

use std::io::{self, Write};

use serde::Serialize;

use crate::types::QueryResult;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty JSON document
    Json,
    /// One JSON object per ranked item
    JsonLines,
    /// Human-readable table
    Text,
}

impl OutputFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "ndjson" => Some(Self::JsonLines),
            "text" | "table" => Some(Self::Text),
            _ => None,
        }
    }
}

/// One ranked item flattened with its query, for JSONL.
#[derive(Serialize)]
struct RankedLine<'a> {
    reference: &'a str,
    query: &'a str,
    rank: usize,
    identifier: &'a str,
    distance: f32,
}

/// Writes [`QueryResult`]s and serializable reports.
pub struct ResultWriter<W: Write> {
    writer: W,
    format: OutputFormat,
}

impl<W: Write> ResultWriter<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self { writer, format }
    }

    /// Write the ranking of one query.
    pub fn write_result(&mut self, result: &QueryResult) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut self.writer, result).map_err(io::Error::other)?;
                writeln!(self.writer)?;
            }
            OutputFormat::JsonLines => {
                for (i, item) in result.results.iter().enumerate() {
                    let line = RankedLine {
                        reference: &result.reference,
                        query: &result.query,
                        rank: i + 1,
                        identifier: &item.identifier,
                        distance: item.distance,
                    };
                    serde_json::to_writer(&mut self.writer, &line).map_err(io::Error::other)?;
                    writeln!(self.writer)?;
                }
            }
            OutputFormat::Text => {
                writeln!(self.writer, "{} + \"{}\"", result.reference, result.query)?;
                let width = result
                    .results
                    .iter()
                    .map(|r| r.identifier.len())
                    .max()
                    .unwrap_or(0);
                for (i, item) in result.results.iter().enumerate() {
                    writeln!(
                        self.writer,
                        "{:>3}. {:<width$}  {:.4}",
                        i + 1,
                        item.identifier,
                        item.distance,
                        width = width
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Write any serializable report; `text` falls back to its `Display`.
    pub fn write_report<T: Serialize + std::fmt::Display>(&mut self, report: &T) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut self.writer, report).map_err(io::Error::other)?;
            }
            OutputFormat::JsonLines => {
                serde_json::to_writer(&mut self.writer, report).map_err(io::Error::other)?;
            }
            OutputFormat::Text => write!(self.writer, "{report}")?,
        }
        writeln!(self.writer)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
