use clap::Parser;
use std::path::PathBuf;

/// Input command line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CmdArgs {
    /// Transmission-loss specification file (TLSF).
    #[arg(short, long)]
    pub tlsf: PathBuf,

    /// Magnitude descriptor file (MDF).
    #[arg(short, long)]
    pub mdf: PathBuf,

    /// Site roster file: sta, lat, lon, elev per line.
    #[arg(short, long)]
    pub sites: PathBuf,

    /// Detection-based amplitude file: ampid, arid, parid, chan, amp, per,
    /// snr, amptype, duration, clip per line.
    #[arg(short, long)]
    pub amplitudes: PathBuf,

    /// Arrival association file: arid, orid, sta, phase, delta per line.
    #[arg(long)]
    pub arrivals: PathBuf,

    /// Event hypothesis e.g. --event 51.92 143.04 13.0 (lat lon depth).
    #[arg(short, long, num_args = 3, value_names = ["lat", "lon", "depth"])]
    pub event: Vec<f64>,

    /// Magnitude types to compute.
    #[arg(short = 'M', long, default_values = ["mb", "Ms", "ML"])]
    pub magtypes: Vec<String>,

    /// Output file to write computed magnitude rows.
    ///
    /// Defaults to `out_magnitudes.txt`.
    #[arg(short, long, default_value = "out_magnitudes.txt")]
    pub out_file: String,

    /// Delimiter character for input and output files.
    ///
    /// Defaults to tab (`'\t'`).
    #[arg(short, long, default_value = "\t")]
    pub delimeter: char,

    /// Verbosity level: 0 silent, 1 network results, 2 station detail.
    #[arg(short, long, default_value_t = 1)]
    pub verbose: u8,

    /// Report purely event-based (upper-bound) magnitudes.
    #[arg(long)]
    pub upper_bounds: bool,
}
