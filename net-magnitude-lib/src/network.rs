//! Network magnitude estimation.
//!
//! Three estimation paths exist, selected by the magnitude type's algorithm:
//! an arithmetic (optionally weighted) average over measured signals; a
//! maximum-likelihood estimator that jointly fits the magnitude and its
//! standard deviation over a mixture of signals, clipped upper bounds and
//! non-detection lower bounds using an EM iteration; and a hypothesis-test
//! scan used when only upper or only lower bounds are available.
//!
//! The EM update follows Blandford and Shumway (1982): clipped and
//! non-detecting records contribute `mu +/- sigma * phi(z) / Phi(+/-z)`
//! terms, with the ratio clamped to `z` itself beyond |z| > 4 as a guard
//! against degenerate inputs.

use crate::auxilary::erf;
use crate::mdf::{Algorithm, MagControl};
use crate::records::SignalClass;
use log::warn;
use std::f64::consts::{FRAC_1_SQRT_2, PI};

/// Iteration cap shared by the EM loop and the bound-only scan.
pub const MAX_ITER: usize = 200;

const NUM_CLASSES: usize = 3;

fn class_index(class: SignalClass) -> usize {
    match class {
        SignalClass::MeasSignal => 0,
        SignalClass::Clipped => 1,
        SignalClass::NonDetect => 2,
    }
}

/// One station magnitude datum handed to the network estimators.
#[derive(Debug, Clone, Copy)]
pub struct MagSample {
    /// Does this record participate in the network estimate?
    pub defining: bool,
    /// Signal class fixing the record's contribution type.
    pub class: SignalClass,
    /// Combined standard error of the station magnitude; weighting uses
    /// `1 / weight^2`. Zero means unweighted.
    pub weight: f64,
    /// The station magnitude value.
    pub magnitude: f64,
}

impl MagSample {
    pub fn new(defining: bool, class: SignalClass, weight: f64, magnitude: f64) -> Self {
        Self {
            defining,
            class,
            weight,
            magnitude,
        }
    }
}

/// Outcome classification of a network magnitude estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorStatus {
    /// No defining signal, clipped or non-detection data was available.
    NoData,
    /// The EM iteration exceeded its cap; the latest estimates are still
    /// reported.
    MleIterLimit,
    /// The bound-only scan over non-detection data failed to converge.
    NoiseBoundIterLimit,
    /// The bound-only scan over clipped data failed to converge.
    ClippedBoundIterLimit,
    /// Estimation succeeded.
    Converged,
    /// Only non-detection lower bounds were available; the estimate comes
    /// from the bound-only path.
    NoiseOnly,
    /// Only clipped upper bounds were available; the estimate comes from
    /// the bound-only path.
    ClippedOnly,
}

impl EstimatorStatus {
    /// The numeric condition code of this outcome.
    pub fn code(&self) -> i32 {
        match self {
            EstimatorStatus::NoData => -1,
            EstimatorStatus::MleIterLimit => -2,
            EstimatorStatus::NoiseBoundIterLimit => -3,
            EstimatorStatus::ClippedBoundIterLimit => -4,
            EstimatorStatus::Converged => 0,
            EstimatorStatus::NoiseOnly => 1,
            EstimatorStatus::ClippedOnly => 2,
        }
    }

    /// Did estimation produce a usable result?
    pub fn is_ok(&self) -> bool {
        self.code() >= 0
    }
}

/// A computed network magnitude with its uncertainty terms.
#[derive(Debug, Clone, Copy)]
pub struct NetworkEstimate {
    /// Network magnitude value.
    pub magnitude: f64,
    /// Standard deviation of the station magnitude population.
    pub sigma: f64,
    /// Uncertainty of the mean, `sigma / sqrt(num_amps_used)`.
    pub sigma_of_mean: f64,
    /// Number of records that participated: signals only for the network
    /// average, all defining classes for the MLE.
    pub num_amps_used: usize,
    /// Outcome classification.
    pub status: EstimatorStatus,
}

/// Compute a network-average or maximum-likelihood magnitude.
///
/// Only defining records participate. The network average uses measured
/// signals exclusively; the MLE additionally folds in clipped and
/// non-detection bounds, falling back to the bound-only hypothesis test
/// when no signals exist.
pub fn network_mag(samples: &[MagSample], cntrl: &MagControl) -> NetworkEstimate {
    let mut sigma_fixed = 0.0;
    if cntrl.sglim1 == cntrl.sglim2 {
        sigma_fixed = cntrl.sgbase;
    }
    let y1 = sigma_fixed;
    let sigma_sqrd = y1 * y1;

    let mut num = [0usize; NUM_CLASSES];
    let mut sum = [0.0; NUM_CLASSES];
    let mut sumsq = [0.0; NUM_CLASSES];
    let mut sig = [0.0; NUM_CLASSES];
    let mut wave = [0.0; NUM_CLASSES];
    let mut mag_wgt = [0.0; NUM_CLASSES];
    let mut ave = [0.0; NUM_CLASSES];
    let mut stdev = [0.0; NUM_CLASSES];

    for sample in samples.iter().filter(|s| s.defining) {
        let i = class_index(sample.class);
        num[i] += 1;
        sum[i] += sample.magnitude;
        let mag_sqrd = sample.magnitude * sample.magnitude;
        sumsq[i] += mag_sqrd;
        let wt_sqrd = sample.weight * sample.weight;
        if sample.weight != 0.0 {
            if y1 != 0.0 {
                // Fixed a priori network standard deviation.
                wave[i] += sample.magnitude / sigma_sqrd;
                mag_wgt[i] += mag_sqrd / sigma_sqrd;
                sig[i] += 1.0 / sigma_sqrd;
            } else {
                wave[i] += sample.magnitude / wt_sqrd;
                mag_wgt[i] += mag_sqrd / wt_sqrd;
                sig[i] += 1.0 / wt_sqrd;
            }
        }
    }

    let mut estimate = NetworkEstimate {
        magnitude: 0.0,
        sigma: sigma_fixed,
        sigma_of_mean: 0.0,
        num_amps_used: 0,
        status: EstimatorStatus::Converged,
    };

    if num.iter().all(|n| *n == 0) {
        estimate.status = EstimatorStatus::NoData;
        return estimate;
    }

    // Arithmetic and weighted means, standard deviation per class. A single
    // datum takes the baseline a priori standard deviation.
    for i in 0..NUM_CLASSES {
        if num[i] == 1 {
            ave[i] = sum[i];
            if sig[i] != 0.0 {
                wave[i] /= sig[i];
            } else {
                wave[i] = ave[i];
            }
            stdev[i] = cntrl.sgbase;
        } else if num[i] > 1 {
            let dnum = num[i] as f64;
            ave[i] = sum[i] / dnum;
            let mut arg;
            if sig[i] != 0.0 {
                wave[i] /= sig[i];
                arg = (mag_wgt[i] / sig[i] - wave[i] * wave[i]) * dnum / (dnum - 1.0);
            } else {
                wave[i] = ave[i];
                arg = (sumsq[i] - ave[i] * ave[i] * dnum) / (dnum - 1.0);
            }
            if arg <= 0.0 {
                arg = 1.0e-20;
            }
            stdev[i] = arg.sqrt();
        }
    }

    let signal = class_index(SignalClass::MeasSignal);
    let clipped = class_index(SignalClass::Clipped);
    let nondet = class_index(SignalClass::NonDetect);

    if cntrl.algorithm == Algorithm::NetworkAverage {
        estimate.num_amps_used = num[signal];
        estimate.magnitude = wave[signal];

        // Constrain the standard deviation to the configured bounds unless
        // the interval is degenerate.
        let mut sigma = stdev[signal];
        if cntrl.sglim1 != cntrl.sglim2 {
            if sigma < cntrl.sglim1 {
                warn!(
                    "network stdev = {sigma:.3} < lower bound in mdf file = {:.2}; \
                     setting network sigma = {:.2}",
                    cntrl.sglim1, cntrl.sglim1
                );
                sigma = cntrl.sglim1;
            } else if sigma > cntrl.sglim2 {
                warn!(
                    "network stdev = {sigma:.3} > upper bound in mdf file = {:.2}; \
                     setting network sigma = {:.2}",
                    cntrl.sglim2, cntrl.sglim2
                );
                sigma = cntrl.sglim2;
            }
        }
        estimate.sigma = sigma;
        estimate.sigma_of_mean = if estimate.num_amps_used > 0 {
            sigma / (estimate.num_amps_used as f64).sqrt()
        } else {
            sigma
        };
        return estimate;
    }

    // Maximum-likelihood estimation. Pure bound sets go through the
    // hypothesis-test scan; mixtures and signal-bearing sets through the EM
    // iteration.
    let mut mag = 0.0;
    let mut sigma = sigma_fixed;
    if num[signal] == 0 {
        if num[clipped] == 0 {
            estimate.status = EstimatorStatus::NoiseOnly;
            let bounds: Vec<MagSample> = samples
                .iter()
                .filter(|s| s.defining && s.class == SignalClass::NonDetect)
                .copied()
                .collect();
            match only_bound_amps(&bounds, cntrl, ave[nondet], -1.0) {
                Some((mu, sigmax)) => {
                    mag = mu;
                    sigma = sigmax;
                }
                None => {
                    estimate.status = EstimatorStatus::NoiseBoundIterLimit;
                    return estimate;
                }
            }
        } else if num[nondet] == 0 {
            estimate.status = EstimatorStatus::ClippedOnly;
            let bounds: Vec<MagSample> = samples
                .iter()
                .filter(|s| s.defining && s.class == SignalClass::Clipped)
                .copied()
                .collect();
            match only_bound_amps(&bounds, cntrl, ave[clipped], 1.0) {
                Some((mu, sigmax)) => {
                    mag = mu;
                    sigma = sigmax;
                }
                None => {
                    estimate.status = EstimatorStatus::ClippedBoundIterLimit;
                    return estimate;
                }
            }
        } else {
            // A mixture of noise and clipped data only: seed the EM with
            // the average of the two class means.
            ave[signal] = (ave[clipped] + ave[nondet]) / 2.0;
            stdev[signal] = (stdev[clipped] + stdev[nondet]) / 2.0;
            mag = ave[nondet];
            estimate.status = mag_max_lik(samples, cntrl, ave[nondet], &mut mag, &mut sigma);
        }
    } else {
        mag = ave[signal];
        estimate.status = mag_max_lik(samples, cntrl, ave[signal], &mut mag, &mut sigma);
    }

    estimate.magnitude = mag;
    estimate.sigma = sigma;
    estimate.num_amps_used = num[signal] + num[clipped] + num[nondet];
    estimate.sigma_of_mean = if estimate.num_amps_used > 0 {
        sigma / (estimate.num_amps_used as f64).sqrt()
    } else {
        sigma
    };
    estimate
}

/// Jointly fit (mu, sigma) by the EM algorithm over the defining records.
///
/// `net_mag` and `sigma` seed the iteration and receive the final
/// estimates; `ave` is the arithmetic mean used as the fallback seed.
pub(crate) fn mag_max_lik(
    samples: &[MagSample],
    cntrl: &MagControl,
    ave: f64,
    net_mag: &mut f64,
    sigma: &mut f64,
) -> EstimatorStatus {
    let p1 = 1.0 / (2.0 * PI).sqrt();
    let p2 = FRAC_1_SQRT_2;

    let mut wtot = 0.0;
    let mut nobs = 0usize;
    for s in samples.iter().filter(|s| s.defining) {
        if s.class == SignalClass::MeasSignal && s.weight != 0.0 {
            wtot += 1.0 / (s.weight * s.weight);
            nobs += 1;
        }
    }
    if wtot > 0.0 {
        wtot = nobs as f64 / wtot;
    }
    if wtot == 0.0 {
        wtot = 1.0;
    }

    // "x" is mu, "y1" is sigma; seed from the baseline when it lies inside
    // the clamp interval.
    let mut y = if cntrl.sgbase >= cntrl.sglim1 && cntrl.sgbase <= cntrl.sglim2 {
        cntrl.sgbase
    } else {
        0.5 * (cntrl.sglim1 + cntrl.sglim2)
    };
    let mut x = ave;
    let mut y1 = *sigma;
    if (ave - *net_mag).abs() <= 1.0 {
        x = *net_mag;
    }
    if y1 <= 0.0 || y1 >= cntrl.sglim2 {
        y1 = y;
    }
    if y1 < cntrl.sglim1 {
        y1 = cntrl.sglim1;
    }

    let mut converged = false;
    for iter in 0..MAX_ITER {
        // Mean update.
        let mut x1 = 0.0;
        let mut nobs = 0usize;
        let mut nclips = 0usize;
        let mut nnodet = 0usize;
        for s in samples.iter().filter(|s| s.defining) {
            match s.class {
                SignalClass::MeasSignal => {
                    nobs += 1;
                    if s.weight != 0.0 {
                        x1 += s.magnitude * wtot / (s.weight * s.weight);
                    } else {
                        x1 += s.magnitude;
                    }
                }
                SignalClass::Clipped => {
                    nclips += 1;
                    let s1 = if s.weight != 0.0 { s.weight } else { y };
                    let z = (s.magnitude - x) / s1;
                    // Clamp for stability on degenerate data.
                    if z > 4.0 {
                        x1 += x + y1 * z;
                    } else {
                        x1 += x + y1 * p1 * (-0.5 * z * z).exp() / (0.5 * (1.0 + erf(-p2 * z)));
                    }
                }
                SignalClass::NonDetect => {
                    nnodet += 1;
                    let s1 = if s.weight != 0.0 { s.weight } else { y };
                    let z = (s.magnitude - x) / s1;
                    if z < -4.0 {
                        x1 += x + y1 * z;
                    } else {
                        x1 += x - y1 * p1 * (-0.5 * z * z).exp() / (0.5 * (1.0 + erf(p2 * z)));
                    }
                }
            }
        }
        let num_amps = nobs + nclips + nnodet;
        if num_amps == 0 {
            return EstimatorStatus::NoData;
        }
        x1 /= num_amps as f64;
        let dx = x1 - x;

        // Sigma update (generalised residual sum of squares).
        let sigma2 = y1 * y1;
        let mut sigma1 = sigma2 * (num_amps - nobs) as f64;
        for s in samples.iter().filter(|s| s.defining) {
            match s.class {
                SignalClass::MeasSignal => {
                    let xm = s.magnitude - x;
                    if s.weight != 0.0 {
                        sigma1 += xm * xm * wtot / (s.weight * s.weight);
                    } else {
                        sigma1 += xm * xm;
                    }
                }
                SignalClass::Clipped => {
                    let s1 = if s.weight != 0.0 { s.weight } else { y };
                    let z = (s.magnitude - x) / s1;
                    if z > 4.0 {
                        sigma1 += sigma2 * z * z;
                    } else {
                        sigma1 +=
                            sigma2 * z * p1 * (-0.5 * z * z).exp() / (0.5 * (1.0 + erf(-p2 * z)));
                    }
                }
                SignalClass::NonDetect => {
                    let s1 = if s.weight != 0.0 { s.weight } else { y };
                    let z = (s.magnitude - x) / s1;
                    if z < -4.0 {
                        sigma1 += sigma2 * z * z;
                    } else {
                        sigma1 +=
                            -sigma2 * z * p1 * (-0.5 * z * z).exp() / (0.5 * (1.0 + erf(p2 * z)));
                    }
                }
            }
        }

        // A single datum takes the baseline standard deviation.
        let mut sigma1 = if num_amps <= 1 {
            cntrl.sgbase
        } else {
            (sigma1 / (num_amps as f64 - 1.0)).sqrt()
        };
        sigma1 = sigma1.clamp(cntrl.sglim1, cntrl.sglim2);

        let dsig = sigma1 - y1;
        let test = dsig.abs() + dx.abs();

        x = x1;
        y1 = sigma1;
        y = y1;

        if iter > 10 && test < 1.0e-4 {
            converged = true;
            break;
        }
    }

    *net_mag = x;
    *sigma = y;

    if converged {
        EstimatorStatus::Converged
    } else {
        warn!("EM estimator has not converged after {MAX_ITER} iterations!");
        EstimatorStatus::MleIterLimit
    }
}

/// Hypothesis-test scan for data sets consisting solely of lower or upper
/// bounds: at what magnitude can the hypothesis that no station detected
/// (or all clipped) be rejected at the 95% level?
///
/// `isign` is -1.0 for non-detection lower bounds and +1.0 for clipped
/// upper bounds. For each candidate sigma between the clamp limits (stepped
/// by 0.05, or fixed when the interval is degenerate) the assumed magnitude
/// starts 0.25 units on the safe side of the bound mean and walks by secant
/// steps until the tail-probability product lands in [0.9475, 0.9525].
/// Returns the converged (mu, sigma) of the widest accepted sigma, or None
/// when no scan converged within the iteration cap.
pub(crate) fn only_bound_amps(
    samples: &[MagSample],
    cntrl: &MagControl,
    ave: f64,
    isign: f64,
) -> Option<(f64, f64)> {
    let siginc = 0.05;
    let mut sigmas = Vec::new();
    if cntrl.sglim1 == cntrl.sglim2 {
        sigmas.push(cntrl.sglim1);
    } else {
        let mut s = cntrl.sglim1;
        while s <= cntrl.sglim2 + 1.0e-9 {
            sigmas.push(s);
            s += siginc;
        }
    }

    let mut best: Option<(f64, f64)> = None;
    for sigma in sigmas {
        let coef1 = isign * FRAC_1_SQRT_2 / sigma;

        // Start just beyond the bound mean on the safe side.
        let mut mu = 0.05 * ((20.0 * ave).trunc() - 5.0 * isign);
        let mut mu0 = mu;
        let mut prob0 = 1.0;
        mu += 0.05 * isign;

        let mut converged = false;
        for _ in 0..MAX_ITER {
            let mut prob = 1.0;
            for s in samples {
                let coef = if s.weight != 0.0 {
                    isign * FRAC_1_SQRT_2 / (sigma * sigma + s.weight * s.weight).sqrt()
                } else {
                    coef1
                };
                prob *= 0.5 * (1.0 + erf((mu - s.magnitude) * coef));
                if prob < 1.0e-20 {
                    prob = 0.0;
                }
            }
            if prob > 0.9475 && prob < 0.9525 {
                converged = true;
                break;
            }
            let tmp = mu;
            if prob < 0.90 {
                mu += 0.1 * isign;
            } else if (prob - prob0).abs() > 1.0e-30 {
                mu -= (mu - mu0) * (prob - 0.95) / (prob - prob0);
            } else {
                mu += 0.1 * isign;
            }
            mu0 = tmp;
            prob0 = prob;
        }

        // Sigmas ascend, so a converged scan always supersedes the last.
        if converged {
            best = Some((mu, sigma));
        }
    }
    best
}
