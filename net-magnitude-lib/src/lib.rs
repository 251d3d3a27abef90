//! # `net_magnitude_lib`
//!
//! **A modular Rust library for computing station and network magnitudes of
//! seismic events from distance/depth transmission-loss tables.**
//!
//! Given an event hypothesis (location, depth) and a set of signal amplitude
//! measurements from multiple stations, this crate computes per-station
//! magnitudes and aggregates them into a network magnitude with uncertainty.
//! Multiple magnitude types (mb, Ms, ML, ...) are supported, each driven by
//! its own descriptor, and three classes of amplitude observation are
//! accommodated: measured signals, clipped signals (upper bounds) and
//! non-detection noise measurements (lower bounds).
//!
//! ## Features
//!
//! - Transmission-loss table loading with bi-cubic interpolation, hole
//!   handling, extrapolation control and test-site corrections
//!   ([`tl_table`], [`tl_store`], [`interp`]).
//! - Magnitude descriptors with runtime overrides and revert-to-original
//!   semantics ([`mdf`], [`facilities`]).
//! - Station magnitudes with a full error decomposition ([`station`]).
//! - Network estimation by weighted average, maximum likelihood over mixed
//!   signal/bound data, a bootstrap uncertainty wrapper and a bound-only
//!   hypothesis test ([`network`], [`bootstrap`]).
//! - Magnitude object assembly and a per-event driver with outlier
//!   re-screening ([`builder`], [`driver`]).
//! - Delimited readers and writers for rosters, amplitudes and results
//!   ([`readers`], [`writers`]).
//!
//! ## Module Overview
//!
//! - [`auxilary`] — Sentinel constants, geodesic distance and numeric helpers.
//! - [`records`] — Site, origin, netmag, stamag, amplitude and arrival records.
//! - [`error`] — Error types and the canonical error-code message tables.
//! - [`interp`] — Generic bi-cubic table interpolation.
//! - [`tl_table`] — Single transmission-loss grid parsing.
//! - [`tl_store`] — TL specification parsing, table registry and resolution.
//! - [`mdf`] — Magnitude descriptor file parsing.
//! - [`facilities`] — The long-lived computation context and override surface.
//! - [`station`] — Station magnitude engine.
//! - [`network`] — Network magnitude estimators.
//! - [`bootstrap`] — Bootstrap resampling of the MLE.
//! - [`builder`] — Magnitude object construction.
//! - [`driver`] — The per-event magnitude driver.
//! - [`readers`] / [`writers`] — Delimited file I/O.
//!
//! ## Example
//!
//! ```no_run
//! use net_magnitude_lib::driver::MagParams;
//! use net_magnitude_lib::facilities::MagFacilities;
//! use net_magnitude_lib::records::{Origin, Site};
//! use std::path::Path;
//!
//! let sites = vec![Site::new("ARCES", 69.535, 25.506, 0.403)];
//! let magtypes = vec!["mb".to_string()];
//!
//! let mut facilities = MagFacilities::setup(
//!     Path::new("config/TLSF"),
//!     Path::new("config/MDF"),
//!     &magtypes,
//!     &sites,
//! )
//! .unwrap();
//!
//! let mut origin = Origin::new(51.92, 143.04, 13.0, 100, 10);
//! let mut magnitudes = facilities.build_mag_obj(
//!     &magtypes, &origin, &[], &[], &[], &[], &[], &[],
//! );
//! let params = MagParams::default();
//! let computed = facilities
//!     .calc_mags(&mut magnitudes, &mut origin, &params)
//!     .unwrap();
//! println!("{computed} magnitudes computed");
//! ```
//!
//! ## License
//!
//! Licensed under the Apache License, Version 2.0
//! ([Apache-2.0](http://www.apache.org/licenses/LICENSE-2.0))

pub mod auxilary;
pub mod bootstrap;
pub mod builder;
pub mod driver;
pub mod error;
pub mod facilities;
pub mod interp;
pub mod mdf;
pub mod network;
pub mod readers;
pub mod records;
pub mod station;
pub mod tl_store;
pub mod tl_table;
pub mod writers;
