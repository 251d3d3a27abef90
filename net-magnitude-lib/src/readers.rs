//! # Data Readers for Roster and Amplitude Input Files
//!
//! This module provides utilities for reading the delimited input files a
//! magnitude computation needs: the site roster and the amplitude
//! measurement lists.
//!
//! ## Features
//!
//! - Load station roster data (station code, latitude, longitude, elevation).
//! - Load amplitude measurements with their arrival linkage and clip flag.
//! - Support for configurable delimiter characters (e.g., tab, comma).
//! - Assumes no header row in input files.
//!
//! ## Example Site File Format (tab-delimited)
//!
//! ```text
//! ARCES   69.535  25.506  0.403
//! FINES   61.444  26.077  0.152
//! ```
//!
//! ## Example Amplitude File Format (tab-delimited)
//!
//! Columns: ampid, arid, parid, chan, amp, per, snr, amptype, duration, clip
//!
//! ```text
//! 101  11  -1  sz  6.31  1.0  12.0  A5/2  -1.0  -
//! 102  12  -1  sz  8.12  1.2  9.5   A5/2  -1.0  c
//! ```
//!
//! ## Errors
//!
//! This module returns boxed errors for I/O issues or data deserialization
//! failures.

use crate::records::{Amplitude, Assoc, Site};
use csv::ReaderBuilder;
use std::error::Error;
use std::fs::File;
use std::path::Path;

/// Reads a site roster from a delimited text file.
///
/// The file is assumed to have **no header row**; each line deserializes
/// into a [`Site`].
///
/// # Arguments
///
/// * `path` — Path to the input file.
/// * `delim` — Delimiter character (e.g., `b'\t'` for tab).
///
/// # Errors
///
/// Returns an error if the file cannot be opened or any row fails to
/// deserialize.
pub fn read_sites<P: AsRef<Path>>(path: P, delim: u8) -> Result<Vec<Site>, Box<dyn Error>> {
    let file = File::open(path)?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(delim)
        .has_headers(false)
        .from_reader(file);

    let mut sites = Vec::new();
    for result in rdr.deserialize() {
        let record: Site = result?;
        sites.push(record);
    }

    Ok(sites)
}

/// Reads amplitude measurements from a delimited text file.
///
/// The file is assumed to have **no header row**; each line deserializes
/// into an [`Amplitude`].
///
/// # Arguments
///
/// * `path` — Path to the input file.
/// * `delim` — Delimiter character (e.g., `b'\t'` for tab).
///
/// # Errors
///
/// Returns an error if the file cannot be opened or any row fails to
/// deserialize.
pub fn read_amplitudes<P: AsRef<Path>>(
    path: P,
    delim: u8,
) -> Result<Vec<Amplitude>, Box<dyn Error>> {
    let file = File::open(path)?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(delim)
        .has_headers(false)
        .from_reader(file);

    let mut amplitudes = Vec::new();
    for result in rdr.deserialize() {
        let record: Amplitude = result?;
        amplitudes.push(record);
    }

    Ok(amplitudes)
}

/// Reads arrival associations from a delimited text file.
///
/// The file is assumed to have **no header row**; columns are arid, orid,
/// sta, phase, delta.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or any row fails to
/// deserialize.
pub fn read_assocs<P: AsRef<Path>>(path: P, delim: u8) -> Result<Vec<Assoc>, Box<dyn Error>> {
    let file = File::open(path)?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(delim)
        .has_headers(false)
        .from_reader(file);

    let mut assocs = Vec::new();
    for result in rdr.deserialize() {
        let record: Assoc = result?;
        assocs.push(record);
    }

    Ok(assocs)
}
