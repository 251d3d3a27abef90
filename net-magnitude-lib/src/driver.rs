//! The magnitude driver: per-event computation over the built objects.
//!
//! [`MagFacilities::calc_mags`] loops over the magnitude objects assembled
//! by the builder. For each type it recomputes station distances, computes
//! every station magnitude, applies the defining filters (none of which
//! override an operator-set state), runs the configured network estimator,
//! screens residual outliers, and populates the network record and the
//! origin's mb/Ms/ML slots. Operator-set non-defining states persist across
//! re-location iterations; the driver never resets them back to defining.

use crate::auxilary::{NA_MAGNITUDE, NA_RESIDUAL, NA_UNCERTAINTY, valid_magnitude};
use crate::bootstrap::{BootstrapEstimate, mag_boot_strap};
use crate::builder::Magnitude;
use crate::error::MagError;
use crate::facilities::MagFacilities;
use crate::mdf::Algorithm;
use crate::network::{EstimatorStatus, MagSample, NetworkEstimate, network_mag};
use crate::records::{Origin, SignalClass};
use crate::station::AmpMeasure;
use std::path::PathBuf;

/// Process-level magnitude control parameters, supplied by the host
/// application.
#[derive(Debug, Clone)]
pub struct MagParams {
    /// Verbosity: 0 silent, 1 network results, 2 adds per-station lines.
    pub verbose: u8,
    /// Network name stamped into computed netmag records.
    pub net: String,
    /// Magnitude type whose result populates `origin.mb`.
    pub magtype_to_origin_mb: String,
    /// Magnitude type whose result populates `origin.ms`.
    pub magtype_to_origin_ms: String,
    /// Magnitude type whose result populates `origin.ml`.
    pub magtype_to_origin_ml: String,
    /// Number of bootstrap resamples for MLE computations.
    pub num_boots: usize,
    /// Use only station magnitudes backed by a source-dependent correction
    /// (meaningful together with `use_ts_corr`).
    pub use_only_sta_w_corr: bool,
    /// Restrict defining stations to `sub_sta_list`.
    pub sub_sta_list_only: bool,
    pub sub_sta_list: Vec<String>,
    /// Demote records whose residual exceeds `large_res_mult` times the
    /// a posteriori standard deviation of the mean, and re-estimate.
    pub ignore_large_res: bool,
    pub large_res_mult: f64,
    /// Apply the test-site correction of `ts_region` where available.
    pub use_ts_corr: bool,
    pub ts_region: String,
    /// Optional file for the result rows written by the host.
    pub outfile_name: Option<PathBuf>,
}

impl Default for MagParams {
    fn default() -> Self {
        Self {
            verbose: 0,
            net: "-".to_string(),
            magtype_to_origin_mb: String::new(),
            magtype_to_origin_ms: String::new(),
            magtype_to_origin_ml: String::new(),
            num_boots: 20,
            use_only_sta_w_corr: false,
            sub_sta_list_only: false,
            sub_sta_list: Vec::new(),
            ignore_large_res: false,
            large_res_mult: 3.0,
            use_ts_corr: false,
            ts_region: String::new(),
            outfile_name: None,
        }
    }
}

fn station_line(magn: &Magnitude, i: usize, code: i32) -> String {
    let sm = &magn.stamags[i];
    let amp = &magn.amplitudes[i];
    format!(
        "{:<6}  {:<8} {:<8}{:<8}{:7.2}{:8.2}{:7.2}{:7.2}{:9.3}{:3}\n",
        sm.sta,
        sm.phase,
        amp.amptype,
        amp.chan,
        sm.delta,
        amp.amp,
        amp.per,
        amp.duration,
        sm.magnitude,
        code
    )
}

impl MagFacilities {
    /// Compute the network magnitude of every non-empty magnitude object.
    ///
    /// Returns the number of magnitudes determined (netmag records flagged
    /// for persistence, including those retained only for their station
    /// magnitudes). The origin's mb/Ms/ML slots are updated for the
    /// configured types.
    ///
    /// # Errors
    ///
    /// Fails when weighted averaging is requested for a type but a defining
    /// station magnitude carries no positive weight.
    pub fn calc_mags(
        &self,
        magnitudes: &mut [Magnitude],
        origin: &mut Origin,
        params: &MagParams,
    ) -> Result<usize, MagError> {
        let mut mag_count = 0usize;

        for magn in magnitudes.iter_mut() {
            magn.mag_computed = false;
            magn.mag_write = false;
            if magn.count() == 0 {
                continue;
            }
            let Some(cntrl) = magn.control.clone() else {
                continue;
            };

            let mut sm_sub: Vec<MagSample> = Vec::with_capacity(magn.count());
            let mut num_magdef = 0usize;
            let mut nondef_out = String::new();
            let mut def_out = String::new();

            for i in 0..magn.count() {
                let ts_region = if params.use_ts_corr {
                    Some(params.ts_region.as_str())
                } else {
                    None
                };

                // The delta field is refreshed on every call; re-location
                // moves the origin between iterations.
                let delta = self
                    .delta_for_station(&magn.stamags[i].sta, origin.lat, origin.lon)
                    .unwrap_or(-1.0);
                magn.stamags[i].delta = delta;

                let measure = AmpMeasure::new(
                    magn.amplitudes[i].amp,
                    magn.amplitudes[i].per,
                    magn.amplitudes[i].duration,
                    magn.amplitudes[i].snr,
                );
                let info = self.station_magnitude(
                    &cntrl.magtype,
                    &magn.stamags[i].sta,
                    &magn.stamags[i].phase,
                    &magn.amplitudes[i].chan,
                    false,
                    ts_region,
                    delta,
                    origin.depth,
                    &measure,
                );

                let aux = &magn.aux[i];
                let sm = &mut magn.stamags[i];
                sm.magnitude = info.sta_magnitude;

                // A failed station magnitude is demoted regardless of any
                // manual setting; the remaining filters honor it.
                if !info.is_valid() {
                    sm.magdef = 'n';
                }
                if !aux.manual_override
                    && (sm.delta < cntrl.dist_min || sm.delta > cntrl.dist_max)
                {
                    sm.magdef = 'n';
                }
                if !aux.manual_override
                    && params.sub_sta_list_only
                    && !params.sub_sta_list.iter().any(|s| *s == sm.sta)
                {
                    sm.magdef = 'n';
                }
                if params.use_only_sta_w_corr
                    && params.use_ts_corr
                    && !aux.manual_override
                    && !info.ts_corr_applied
                {
                    sm.magdef = 'n';
                }

                if sm.magdef == 'd' {
                    num_magdef += 1;
                }

                if params.verbose > 1 {
                    let line = station_line(magn, i, info.error_code);
                    let sm = &magn.stamags[i];
                    if sm.magdef == 'n' {
                        nondef_out.push_str(&line);
                    } else {
                        if num_magdef == 1 {
                            def_out.push_str(
                                "\nStation Phase    Amptype Chan      Delta    Amp    Per    Dur   Sta_Mag Code\n",
                            );
                            def_out.push_str(
                                "------- -------- ------- -------- ------   -----  -----  -----  ------- ----\n",
                            );
                        }
                        def_out.push_str(&line);
                    }
                }

                // The combined error doubles as the station weight. A
                // defining record without one is fatal under weighted
                // averaging.
                let sm = &mut magn.stamags[i];
                if cntrl.apply_wgt {
                    if info.combined_error > 0.0 {
                        sm.uncertainty = info.combined_error;
                        magn.aux[i].wt = info.combined_error;
                    } else if sm.magdef == 'n' {
                        sm.uncertainty = NA_UNCERTAINTY;
                        magn.aux[i].wt = 0.0;
                    } else {
                        return Err(MagError::NoStationWeight {
                            magtype: cntrl.magtype.clone(),
                            sta: sm.sta.clone(),
                        });
                    }
                } else {
                    sm.uncertainty = NA_UNCERTAINTY;
                    magn.aux[i].wt = 0.0;
                }

                sm.mmodel = info.model.clone();
                sm_sub.push(MagSample::new(
                    sm.magdef == 'd',
                    magn.aux[i].sig_type,
                    magn.aux[i].wt,
                    sm.magnitude,
                ));
            }

            if params.verbose > 1 {
                print!("{nondef_out}");
                print!("{def_out}");
                println!();
            }

            let mut estimate = NetworkEstimate {
                magnitude: NA_MAGNITUDE,
                sigma: 0.0,
                sigma_of_mean: 0.0,
                num_amps_used: 0,
                status: EstimatorStatus::NoData,
            };
            let mut boot: Option<BootstrapEstimate> = None;

            while num_magdef > 0 {
                estimate = network_mag(&sm_sub, &cntrl);

                if params.verbose > 0 {
                    let label = if cntrl.algorithm == Algorithm::NetworkAverage {
                        "Network-Averaged Results"
                    } else {
                        "MLE Results"
                    };
                    println!(
                        "============================================================================\n"
                    );
                    println!(
                        "{label}: Mag:{:6.2}  Sigma:{:6.2}  Sdav:{:6.2}  Num:{:3}",
                        estimate.magnitude,
                        estimate.sigma,
                        estimate.sigma_of_mean,
                        estimate.num_amps_used
                    );
                    println!(
                        "\n============================================================================"
                    );
                }

                // Bootstrap resampling is meaningless with a single datum.
                boot = None;
                if cntrl.algorithm == Algorithm::MleWithBootstrap
                    && params.num_boots > 0
                    && estimate.num_amps_used > 1
                {
                    let bs = mag_boot_strap(
                        &sm_sub,
                        &cntrl,
                        params.num_boots,
                        estimate.magnitude,
                        estimate.sigma,
                    );
                    if params.verbose > 0 {
                        println!(
                            "MLE Bootstrap Results: num_boots: {}  sglim1: {:7.2}  sglim2: {:7.2}",
                            params.num_boots, cntrl.sglim1, cntrl.sglim2
                        );
                        println!(
                            "  Mag:{:6.2}  Sigma:{:6.2}  Sdml:{:6.2}  Sdsdml:{:6.2}  Err: {}",
                            bs.magnitude,
                            bs.sigma_mu,
                            bs.sigma,
                            bs.sigma_sigma,
                            bs.status.code()
                        );
                    }
                    boot = Some(bs);
                }

                // A posteriori residuals; records without a valid station
                // magnitude lose their residual and model name.
                for j in 0..magn.count() {
                    let sm = &mut magn.stamags[j];
                    if valid_magnitude(sm.magnitude) {
                        sm.magres = sm.magnitude - estimate.magnitude;
                    } else {
                        sm.magres = NA_RESIDUAL;
                        sm.mmodel = "-".to_string();
                        if sm.magdef == 'd' {
                            sm.magdef = 'n';
                            sm_sub[j].defining = false;
                            num_magdef -= 1;
                        }
                    }
                }

                // Outlier screening: demote large residuals and re-estimate.
                // The non-defining set grows monotonically, so this
                // converges without an explicit pass limit.
                let mut re_compute = false;
                if params.ignore_large_res {
                    for j in 0..magn.count() {
                        if magn.aux[j].manual_override {
                            continue;
                        }
                        let sm = &mut magn.stamags[j];
                        if sm.magdef == 'd'
                            && sm.magres.abs()
                                > params.large_res_mult * estimate.sigma_of_mean
                        {
                            re_compute = true;
                            num_magdef -= 1;
                            sm.magdef = 'n';
                            sm_sub[j].defining = false;
                        }
                    }
                }
                if !re_compute {
                    break;
                }
            }

            // Classify what survived screening.
            let mut num_detect_based = 0usize;
            let mut num_def_detect_based = 0usize;
            let mut num_event_based = 0usize;
            for j in 0..magn.count() {
                if sm_sub[j].class == SignalClass::MeasSignal {
                    num_detect_based += 1;
                    if magn.stamags[j].magdef == 'd' {
                        num_def_detect_based += 1;
                    }
                } else {
                    num_event_based += 1;
                }
            }

            magn.netmag.magnitude = NA_MAGNITUDE;
            magn.netmag.uncertainty = NA_UNCERTAINTY;
            magn.netmag.net = params.net.clone();

            if cntrl.algorithm == Algorithm::NetworkAverage {
                if num_magdef > 0 {
                    mag_count += 1;
                    magn.mag_computed = true;
                    magn.mag_write = true;
                    magn.netmag.magnitude = estimate.magnitude;
                    magn.netmag.uncertainty = estimate.sigma_of_mean;
                } else if num_detect_based > 0 {
                    mag_count += 1;
                    magn.mag_write = true;
                }
            } else {
                // Purely event-based (upper-bound) magnitudes can be
                // suppressed by the host.
                if num_magdef > 0 && (self.compute_upper_bounds() || num_def_detect_based > 0) {
                    mag_count += 1;
                    magn.mag_computed = true;
                    magn.mag_write = true;
                    magn.netmag.magnitude = estimate.magnitude;
                    magn.netmag.uncertainty = match &boot {
                        Some(bs) => bs.sigma,
                        None => estimate.sigma,
                    };
                } else if num_detect_based > 0
                    || (self.compute_upper_bounds() && num_event_based > 0)
                {
                    mag_count += 1;
                    magn.mag_write = true;
                }
            }

            magn.netmag.nsta = num_magdef as i64;
            magn.netmag.orid = origin.orid;
            for sm in magn.stamags.iter_mut() {
                sm.orid = origin.orid;
            }

            // Feed the configured origin slots, resetting them to N/A when
            // nothing defining survived.
            let computed = num_magdef > 0;
            if cntrl.magtype == params.magtype_to_origin_mb {
                if computed {
                    origin.mb = magn.netmag.magnitude;
                    origin.mbid = magn.netmag.magid;
                } else {
                    origin.mb = NA_MAGNITUDE;
                    origin.mbid = -1;
                }
            } else if cntrl.magtype == params.magtype_to_origin_ms {
                if computed {
                    origin.ms = magn.netmag.magnitude;
                    origin.msid = magn.netmag.magid;
                } else {
                    origin.ms = NA_MAGNITUDE;
                    origin.msid = -1;
                }
            } else if cntrl.magtype == params.magtype_to_origin_ml {
                if computed {
                    origin.ml = magn.netmag.magnitude;
                    origin.mlid = magn.netmag.magid;
                } else {
                    origin.ml = NA_MAGNITUDE;
                    origin.mlid = -1;
                }
            }
        }

        Ok(mag_count)
    }
}
