//! Station magnitude computation.
//!
//! A station magnitude combines the log amplitude (or amplitude/period
//! ratio, or duration) with the distance/depth correction interpolated from
//! the resolved transmission-loss table, a bulk static station correction
//! (or a test-site correction replacing it), and the combined modelling plus
//! measurement error. Every constituent term is preserved in
//! [`StationMagInfo`] alongside the magnitude itself.

use crate::auxilary::{NA_MAGNITUDE, NA_MODEL_ERROR, NA_UNCERTAINTY, valid_magnitude};
use crate::facilities::MagFacilities;
use crate::tl_store::TlResolution;

/// One amplitude measurement handed to the station-magnitude engine.
#[derive(Debug, Clone, Copy)]
pub struct AmpMeasure {
    /// Measured amplitude (nm); negative means not measured.
    pub amp: f64,
    /// Measured period (s); negative means no period dependency.
    pub period: f64,
    /// Measurement duration (s), for duration magnitudes.
    pub duration: f64,
    /// Signal-to-noise ratio of the measurement.
    pub snr: f64,
}

impl AmpMeasure {
    pub fn new(amp: f64, period: f64, duration: f64, snr: f64) -> Self {
        Self {
            amp,
            period,
            duration,
            snr,
        }
    }
}

/// Full decomposition of one station magnitude computation.
#[derive(Debug, Clone)]
pub struct StationMagInfo {
    /// Interpolation condition code of the distance/depth correction.
    pub error_code: i32,
    /// The station magnitude, or the -999.0 sentinel on failure.
    pub sta_magnitude: f64,
    /// True when a test-site correction replaced the bulk correction.
    pub ts_corr_applied: bool,
    /// Total correction applied: distance/depth plus station term.
    pub total_mag_corr: f64,
    /// Distance/depth correction interpolated from the TL table.
    pub dist_depth_corr: f64,
    /// Bulk static station correction selected for the station.
    pub bulk_corr: f64,
    /// Error of the bulk static station correction.
    pub bulk_corr_error: f64,
    /// The test-site correction value, when one applied.
    pub ts_corr: f64,
    /// Modelling error (from the TL table, or the type baseline).
    pub model_error: f64,
    /// Measurement error derived from the signal-to-noise ratio.
    pub meas_error: f64,
    /// Combined model, measurement and correction error.
    pub combined_error: f64,
    /// Principal derivatives of the correction: dTL/dr, dTL/dz, d2TL/dr2,
    /// d2TL/dz2.
    pub derivs: [f64; 4],
    /// Name of the magnitude correction model applied.
    pub model: String,
}

impl Default for StationMagInfo {
    fn default() -> Self {
        Self {
            error_code: 0,
            sta_magnitude: NA_MAGNITUDE,
            ts_corr_applied: false,
            total_mag_corr: -1.0,
            dist_depth_corr: -1.0,
            bulk_corr: 0.0,
            bulk_corr_error: 0.0,
            ts_corr: 0.0,
            model_error: NA_UNCERTAINTY,
            meas_error: NA_UNCERTAINTY,
            combined_error: NA_UNCERTAINTY,
            derivs: [-1.0; 4],
            model: "-".to_string(),
        }
    }
}

impl StationMagInfo {
    /// Did the computation produce a usable station magnitude?
    pub fn is_valid(&self) -> bool {
        valid_magnitude(self.sta_magnitude)
    }
}

/// Magnitude measurement error as a function of signal-to-noise ratio.
///
/// The present implementation always returns zero.
pub fn measurement_error(_snr: f64) -> f64 {
    0.0
}

struct MagIndexes {
    tl: TlResolution,
    md_index: usize,
    mst_index: Option<usize>,
}

impl MagFacilities {
    /// Resolve all indexes needed for a station magnitude: the descriptor of
    /// the magnitude type, the TL table, and the station correction entry
    /// (only consulted when no station specialisation matched).
    fn mag_indexes(&self, magtype: &str, sta: &str, phase: &str, chan: &str) -> Option<MagIndexes> {
        let md_index = self.descriptor_index(magtype)?;
        let tltype = self.descriptors[md_index].tltype.clone();
        let tl = self.tl.resolve(&tltype, sta, phase, chan)?;
        let mst_index = match tl.stm_index {
            Some(_) => None,
            None => self.station_correction_index(sta, &tltype),
        };
        Some(MagIndexes {
            tl,
            md_index,
            mst_index,
        })
    }

    /// Compute one station magnitude with its full error decomposition.
    ///
    /// # Arguments
    ///
    /// * `magtype` - Magnitude type to compute.
    /// * `sta`, `phase`, `chan` - Station, phase and channel of the
    ///   measurement; used to resolve the TL table.
    /// * `extrapolate` - Permit evaluation outside the table's sampling.
    /// * `ts_region` - Test-site region whose correction, if available,
    ///   replaces the bulk static station correction. The two never combine.
    /// * `distance` - Station-to-event distance in arc degrees.
    /// * `ev_depth` - Event depth in kilometers.
    /// * `measure` - The amplitude measurement.
    ///
    /// # Returns
    ///
    /// A [`StationMagInfo`] whose `sta_magnitude` is the -999.0 sentinel
    /// when no table resolves or the interpolation fails; callers demote
    /// such records to non-defining rather than aborting the event.
    pub fn station_magnitude(
        &self,
        magtype: &str,
        sta: &str,
        phase: &str,
        chan: &str,
        extrapolate: bool,
        ts_region: Option<&str>,
        distance: f64,
        ev_depth: f64,
        measure: &AmpMeasure,
    ) -> StationMagInfo {
        let mut info = StationMagInfo::default();

        let Some(indexes) = self.mag_indexes(magtype, sta, phase, chan) else {
            return info;
        };
        let descriptor = &self.descriptors[indexes.md_index];

        let interp = self
            .tl
            .interpolate(indexes.tl.tl_index, distance, ev_depth, extrapolate);
        info.dist_depth_corr = interp.correction;
        info.error_code = interp.code;
        if !valid_magnitude(interp.correction) {
            return info;
        }
        info.derivs = interp.derivs;

        match indexes.mst_index {
            Some(mst) => {
                info.bulk_corr = self.station_corrections[mst].bulk_corr;
                info.bulk_corr_error = self.station_corrections[mst].bulk_corr_error;
            }
            None => {
                info.bulk_corr = descriptor.def_sta_corr;
                info.bulk_corr_error = descriptor.def_sta_corr_error;
            }
        }
        let mut mag_corr = info.bulk_corr;

        // A test-site correction replaces the bulk static correction; the
        // two are never combined.
        if let Some(region) = ts_region {
            if !region.is_empty() {
                if let Some(ts_corr) =
                    self.tl
                        .ts_correction(region, sta, &descriptor.tltype, indexes.tl.tl_index)
                {
                    mag_corr = ts_corr;
                    info.ts_corr = ts_corr;
                    info.ts_corr_applied = true;
                }
            }
        }

        let (model_error, model) =
            self.tl
                .model_error(indexes.tl.tl_index, distance, ev_depth);
        info.model_error = if model_error == NA_MODEL_ERROR {
            descriptor.sgbase
        } else {
            model_error
        };

        info.meas_error = measurement_error(measure.snr);
        info.combined_error = (info.model_error * info.model_error
            + info.meas_error * info.meas_error
            + info.bulk_corr_error * info.bulk_corr_error)
            .sqrt();

        let total_mag_corr = info.dist_depth_corr + mag_corr;

        // Amplitude over period where a period exists; plain log amplitude
        // without one; duration magnitude when neither was measured.
        let sta_magnitude = if measure.amp < 0.0 && measure.period < 0.0 {
            measure.duration.log10() + total_mag_corr
        } else if measure.period < 0.0 {
            measure.amp.log10() + total_mag_corr
        } else {
            (measure.amp / measure.period).log10() + total_mag_corr
        };

        info.sta_magnitude = sta_magnitude;
        info.total_mag_corr = total_mag_corr;
        info.model = model;
        info
    }

    /// Abbreviated station magnitude: no extrapolation, no test-site region
    /// and no signal-to-noise dependency. Returns the -999.0 sentinel on
    /// failure.
    pub fn abbrev_station_magnitude(
        &self,
        magtype: &str,
        sta: &str,
        phase: &str,
        chan: &str,
        distance: f64,
        ev_depth: f64,
        amp: f64,
        period: f64,
        duration: f64,
    ) -> f64 {
        let measure = AmpMeasure::new(amp, period, duration, -1.0);
        self.station_magnitude(
            magtype, sta, phase, chan, false, None, distance, ev_depth, &measure,
        )
        .sta_magnitude
    }
}
