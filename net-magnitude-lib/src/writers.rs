//! # Data Writers for Magnitude Result Files
//!
//! This module provides utilities for writing computed network and station
//! magnitude results to delimited text files.
//!
//! ## Features
//!
//! - Serialize one row per station magnitude, carrying the network result
//!   alongside for context.
//! - Configurable delimiter support (e.g., tab, comma).
//! - Writes a header row.
//!
//! ## Example Output Format (tab-delimited)
//!
//! ```text
//! magtype sta     phase   delta   sta_mag magres  magdef  net_mag uncertainty
//! mb      ARCES   P       40.00   4.100   -0.100  d       4.200   0.115
//! ```

use crate::builder::Magnitude;
use csv::WriterBuilder;
use serde::Serialize;
use std::error::Error;
use std::fs::File;
use std::path::Path;

/// One output row: a station magnitude with its network context.
#[derive(Debug, Serialize)]
pub struct MagnitudeRow {
    pub magtype: String,
    pub sta: String,
    pub phase: String,
    pub delta: f64,
    pub sta_mag: f64,
    pub magres: f64,
    pub magdef: char,
    pub net_mag: f64,
    pub uncertainty: f64,
}

/// Flatten computed magnitude objects into result rows, skipping types
/// whose record set is empty.
pub fn magnitude_rows(magnitudes: &[Magnitude]) -> Vec<MagnitudeRow> {
    let mut rows = Vec::new();
    for magn in magnitudes {
        for sm in &magn.stamags {
            rows.push(MagnitudeRow {
                magtype: magn.netmag.magtype.clone(),
                sta: sm.sta.clone(),
                phase: sm.phase.clone(),
                delta: sm.delta,
                sta_mag: sm.magnitude,
                magres: sm.magres,
                magdef: sm.magdef,
                net_mag: magn.netmag.magnitude,
                uncertainty: magn.netmag.uncertainty,
            });
        }
    }
    rows
}

/// Writes magnitude results to a delimited text file, one row per station
/// magnitude, with a header row.
///
/// # Arguments
///
/// * `path` — The output file path.
/// * `delim` — Delimiter character for the file.
/// * `magnitudes` — The computed magnitude objects.
///
/// # Errors
///
/// Returns an error if the file cannot be created or a row fails to
/// serialize.
pub fn write_magnitude_results<P: AsRef<Path>>(
    path: P,
    delim: u8,
    magnitudes: &[Magnitude],
) -> Result<(), Box<dyn Error>> {
    let file = File::create(path)?;

    let mut wtr = WriterBuilder::new()
        .delimiter(delim)
        .has_headers(true)
        .from_writer(file);

    for row in magnitude_rows(magnitudes) {
        wtr.serialize(row)?;
    }

    wtr.flush()?;
    Ok(())
}
