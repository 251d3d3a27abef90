//! Bootstrap resampling of the maximum-likelihood magnitude estimate.
//!
//! The defining records are resampled with replacement `num_boots` times;
//! each resample is fitted by the EM estimator and the resulting (mu, sigma)
//! stream is averaged to characterise the estimator's sampling uncertainty.
//! The network magnitude itself should normally come from the plain MLE so
//! that identical inputs keep producing identical magnitudes; the bootstrap
//! output serves the uncertainty fields.
//!
//! Convergence is tested on cumulative sums: after more than 10 resamples
//! the loop exits early once the running mean of either mu or sigma moves by
//! less than 0.01 magnitude units.

use crate::mdf::MagControl;
use crate::network::{EstimatorStatus, MagSample, mag_max_lik};
use crate::records::SignalClass;
use log::debug;
use rand::Rng;

/// Bootstrap characterisation of the MLE magnitude.
#[derive(Debug, Clone, Copy)]
pub struct BootstrapEstimate {
    /// Mean of the resampled network magnitudes.
    pub magnitude: f64,
    /// Standard deviation of the resampled network magnitudes.
    pub sigma_mu: f64,
    /// Mean of the resampled standard deviations.
    pub sigma: f64,
    /// Standard deviation of the resampled standard deviations; zero when
    /// the clamp interval is degenerate.
    pub sigma_sigma: f64,
    /// Number of resamples actually drawn.
    pub num_resamples: usize,
    /// Status of the last EM fit.
    pub status: EstimatorStatus,
}

/// Run the bootstrap over the defining records of `samples`.
///
/// `net_mag` and `sigma` seed the chained EM fits. Each resample keeps the
/// size of the defining set, drawing with replacement; when any defining
/// signal exists, a resample without one is redrawn. Not deterministic:
/// the resampling uses the thread-local generator.
pub fn mag_boot_strap(
    samples: &[MagSample],
    cntrl: &MagControl,
    num_boots: usize,
    net_mag: f64,
    sigma: f64,
) -> BootstrapEstimate {
    let mut rng = rand::thread_rng();

    let defining: Vec<MagSample> = samples.iter().filter(|s| s.defining).copied().collect();
    let num_data = defining.len();

    let signals: Vec<f64> = defining
        .iter()
        .filter(|s| s.class == SignalClass::MeasSignal)
        .map(|s| s.magnitude)
        .collect();
    let ave = if signals.is_empty() {
        0.0
    } else {
        signals.iter().sum::<f64>() / signals.len() as f64
    };

    let mut estimate = BootstrapEstimate {
        magnitude: 0.0,
        sigma_mu: 0.0,
        sigma: 0.0,
        sigma_sigma: 0.0,
        num_resamples: 0,
        status: EstimatorStatus::Converged,
    };
    if num_data == 0 || num_boots == 0 {
        return estimate;
    }

    let mut net_mag = net_mag;
    let mut sigma = sigma;
    let mut fmag0 = 0.0;
    let mut fmag1 = 0.0;
    let mut fmag2 = 0.0;
    let mut sig0 = 0.0;
    let mut sig1 = 0.0;
    let mut sig2 = 0.0;
    let mut num_resamples = 0.0;

    let mut resample = vec![defining[0]; num_data];
    for j in 0..num_boots {
        // Resample with replacement; keep at least one signal whenever the
        // input had any.
        loop {
            let mut num_signals = 0;
            for slot in resample.iter_mut() {
                let index = rng.gen_range(0..num_data);
                *slot = defining[index];
                if slot.class == SignalClass::MeasSignal {
                    num_signals += 1;
                }
            }
            if signals.is_empty() || num_signals > 0 {
                break;
            }
        }

        estimate.status = mag_max_lik(&resample, cntrl, ave, &mut net_mag, &mut sigma);
        debug!("MLE magnitude: {net_mag:.3} / std. dev.: {sigma:.3}");

        fmag1 += net_mag;
        fmag2 += net_mag * net_mag;
        sig1 += sigma;
        sig2 += sigma * sigma;

        // Cumulative-sum convergence test after more than 10 resamples.
        num_resamples = (j + 1) as f64;
        estimate.num_resamples = j + 1;
        if j > 10 && (fmag1 - fmag0).abs() / num_resamples < 0.01 {
            break;
        }
        fmag0 = fmag1;
        if j > 10 && (sig1 - sig0).abs() / num_resamples < 0.01 {
            break;
        }
        sig0 = sig1;
    }

    fmag1 /= num_resamples;
    fmag2 /= num_resamples;
    sig1 /= num_resamples;
    sig2 /= num_resamples;

    estimate.magnitude = fmag1;
    estimate.sigma = sig1;

    let chk = fmag2 - fmag1 * fmag1;
    estimate.sigma_mu = if chk > 0.0 { chk.sqrt() } else { 0.0 };

    // With a degenerate clamp interval every resample reports the same
    // sigma; force the spread to zero so round-off cannot produce a
    // negative variance.
    let mut sigsig = sig2 - sig1 * sig1;
    if cntrl.sglim1 == cntrl.sglim2 {
        sigsig = 0.0;
    }
    estimate.sigma_sigma = if sigsig > 0.0 { sigsig.sqrt() } else { 0.0 };

    estimate
}
