//! Magnitude descriptor file (MDF) loading.
//!
//! The MDF binds each magnitude type to a transmission-loss type, its
//! detection- and event-based amplitude types, the estimation algorithm, a
//! valid distance range and the standard-deviation policy. A second section
//! carries per-(station, TL type) bulk static corrections; the pseudo
//! station `DFAULT` provides type-wide defaults.
//!
//! ## File layout
//!
//! Two blank-separated sections, `#` in the first column comments:
//!
//! ```text
//! # magtype TLtype det_amptype ev_amptype algo dist_min dist_max sglim1 sglim2 sgbase wgt
//! mb       mb     A5/2        hppn       1    20.0     105.0    0.30   0.60   0.40   1
//!
//! # sta    TLtype bulk_corr bulk_corr_error
//! DFAULT   mb     0.0       0.35
//! ```

use crate::error::MagError;
use log::warn;
use std::path::Path;

/// Network magnitude estimation algorithm selected per magnitude type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Arithmetic (optionally weighted) network average over measured
    /// signals only.
    NetworkAverage,
    /// Maximum-likelihood estimation over signals, clipped upper bounds and
    /// non-detection lower bounds.
    Mle,
    /// Maximum-likelihood estimation wrapped in bootstrap resampling for
    /// the uncertainty estimate.
    MleWithBootstrap,
}

impl Algorithm {
    /// The numeric algorithm code used in the MDF.
    pub fn code(&self) -> i32 {
        match self {
            Algorithm::NetworkAverage => 0,
            Algorithm::Mle => 1,
            Algorithm::MleWithBootstrap => 2,
        }
    }

    /// The algorithm belonging to a numeric MDF code.
    pub fn from_code(code: i32) -> Option<Algorithm> {
        match code {
            0 => Some(Algorithm::NetworkAverage),
            1 => Some(Algorithm::Mle),
            2 => Some(Algorithm::MleWithBootstrap),
            _ => None,
        }
    }
}

/// Descriptor of one magnitude type. Every mutable field keeps an `orig_*`
/// shadow so overrides can be reverted to the loaded state.
#[derive(Debug, Clone)]
pub struct MagDescriptor {
    pub magtype: String,
    pub tltype: String,
    pub det_amptype: String,
    pub ev_amptype: String,
    pub algorithm: Algorithm,
    pub dist_min: f64,
    pub dist_max: f64,
    pub sglim1: f64,
    pub sglim2: f64,
    pub sgbase: f64,
    pub apply_wgt: bool,
    /// Type-wide default bulk correction (from the `DFAULT` station entry).
    pub def_sta_corr: f64,
    pub def_sta_corr_error: f64,
    pub orig_det_amptype: String,
    pub orig_ev_amptype: String,
    pub orig_algorithm: Algorithm,
    pub orig_dist_min: f64,
    pub orig_dist_max: f64,
    pub orig_sglim1: f64,
    pub orig_sglim2: f64,
    pub orig_sgbase: f64,
    pub orig_apply_wgt: bool,
}

/// Bulk static magnitude correction for one (station, TL type) pair.
#[derive(Debug, Clone)]
pub struct StationCorrection {
    pub sta: String,
    pub tltype: String,
    pub bulk_corr: f64,
    pub bulk_corr_error: f64,
}

/// Read-only snapshot of the current (possibly overridden) settings of one
/// magnitude type, consumed by the driver and the builder.
#[derive(Debug, Clone)]
pub struct MagControl {
    pub magtype: String,
    pub tltype: String,
    pub det_amptype: String,
    pub ev_amptype: String,
    pub algorithm: Algorithm,
    pub dist_min: f64,
    pub dist_max: f64,
    pub sglim1: f64,
    pub sglim2: f64,
    pub sgbase: f64,
    pub apply_wgt: bool,
}

impl MagDescriptor {
    /// Snapshot the current control settings.
    pub fn control(&self) -> MagControl {
        MagControl {
            magtype: self.magtype.clone(),
            tltype: self.tltype.clone(),
            det_amptype: self.det_amptype.clone(),
            ev_amptype: self.ev_amptype.clone(),
            algorithm: self.algorithm,
            dist_min: self.dist_min,
            dist_max: self.dist_max,
            sglim1: self.sglim1,
            sglim2: self.sglim2,
            sgbase: self.sgbase,
            apply_wgt: self.apply_wgt,
        }
    }
}

/// The loaded contents of an MDF, filtered to the requested magnitude types.
#[derive(Debug, Clone)]
pub struct MdfContents {
    pub descriptors: Vec<MagDescriptor>,
    pub station_corrections: Vec<StationCorrection>,
    /// The unique TL types the retained descriptors reference, in first-use
    /// order; this is the list of types the TL store needs to load.
    pub tltypes: Vec<String>,
}

/// Read a magnitude descriptor file.
///
/// # Errors
///
/// Fails when the file cannot be opened, a line has too few fields, a
/// standard-deviation triple violates `sglim1 <= sgbase <= sglim2`, no
/// requested type is present, or a type with weighted averaging enabled has
/// no `DFAULT` correction entry.
pub fn read_mdf(path: &Path, requested_magtypes: &[String]) -> Result<MdfContents, MagError> {
    let text = std::fs::read_to_string(path).map_err(|_| {
        warn!("MDF: {} will not open!", path.display());
        MagError::DescriptorOpen
    })?;
    parse_mdf(&text, requested_magtypes)
}

pub(crate) fn parse_mdf(
    text: &str,
    requested_magtypes: &[String],
) -> Result<MdfContents, MagError> {
    let mut descriptor_lines: Vec<&str> = Vec::new();
    let mut correction_lines: Vec<&str> = Vec::new();
    let mut in_first_section = true;
    for line in text.lines() {
        if line.starts_with('#') {
            continue;
        }
        if line.is_empty() || line.starts_with(char::is_whitespace) {
            in_first_section = false;
            continue;
        }
        if in_first_section {
            descriptor_lines.push(line);
        } else {
            correction_lines.push(line);
        }
    }

    let mut descriptors = Vec::new();
    for line in &descriptor_lines {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 11 {
            warn!(
                "incorrect number of arguments per magtype in MDF: expecting 11, found {}",
                tokens.len()
            );
            return Err(MagError::DescriptorFormat);
        }
        let magtype = tokens[0];
        if !requested_magtypes.iter().any(|m| m == magtype) {
            continue;
        }

        let parse_f64 = |s: &str| s.parse::<f64>().map_err(|_| MagError::DescriptorFormat);
        let algo_code = tokens[4]
            .parse::<i32>()
            .map_err(|_| MagError::DescriptorFormat)?;
        let algorithm = Algorithm::from_code(algo_code).ok_or(MagError::DescriptorFormat)?;
        let dist_min = parse_f64(tokens[5])?;
        let dist_max = parse_f64(tokens[6])?;
        let sglim1 = parse_f64(tokens[7])?;
        let sglim2 = parse_f64(tokens[8])?;
        let sgbase = parse_f64(tokens[9])?;
        // Read with an integer conversion; any nonzero value means true.
        let apply_wgt = tokens[10]
            .parse::<i32>()
            .map_err(|_| MagError::DescriptorFormat)?
            != 0;

        if sglim1 > sgbase || sgbase > sglim2 {
            warn!(
                "incorrect LB, UB, or BL value for magtype {magtype} in MDF: \
                 must satisfy LB <= BL <= UB"
            );
            return Err(MagError::DescriptorFormat);
        }

        descriptors.push(MagDescriptor {
            magtype: magtype.to_string(),
            tltype: tokens[1].to_string(),
            det_amptype: tokens[2].to_string(),
            ev_amptype: tokens[3].to_string(),
            algorithm,
            dist_min,
            dist_max,
            sglim1,
            sglim2,
            sgbase,
            apply_wgt,
            def_sta_corr: 0.0,
            def_sta_corr_error: 0.0,
            orig_det_amptype: tokens[2].to_string(),
            orig_ev_amptype: tokens[3].to_string(),
            orig_algorithm: algorithm,
            orig_dist_min: dist_min,
            orig_dist_max: dist_max,
            orig_sglim1: sglim1,
            orig_sglim2: sglim2,
            orig_sgbase: sgbase,
            orig_apply_wgt: apply_wgt,
        });
    }

    if descriptors.is_empty() {
        warn!("MDF is empty, so no magnitude info can be computed");
        return Err(MagError::DescriptorFormat);
    }

    let mut tltypes: Vec<String> = Vec::new();
    for descriptor in &descriptors {
        if !tltypes.iter().any(|t| *t == descriptor.tltype) {
            tltypes.push(descriptor.tltype.clone());
        }
    }

    let mut station_corrections = Vec::new();
    for line in &correction_lines {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 4 {
            warn!(
                "incorrect number of arguments per sta/TLtype in MDF file: \
                 expecting 4, found {}",
                tokens.len()
            );
            return Err(MagError::DescriptorFormat);
        }
        let bulk_corr = tokens[2]
            .parse::<f64>()
            .map_err(|_| MagError::DescriptorFormat)?;
        let bulk_corr_error = tokens[3]
            .parse::<f64>()
            .map_err(|_| MagError::DescriptorFormat)?;
        station_corrections.push(StationCorrection {
            sta: tokens[0].to_string(),
            tltype: tokens[1].to_string(),
            bulk_corr,
            bulk_corr_error,
        });
    }

    // Fold the DFAULT entries into the descriptors. A type with weighted
    // averaging enabled must have one.
    for descriptor in descriptors.iter_mut() {
        let default = station_corrections
            .iter()
            .find(|c| c.sta == "DFAULT" && c.tltype == descriptor.tltype);
        match default {
            Some(c) => {
                descriptor.def_sta_corr = c.bulk_corr;
                descriptor.def_sta_corr_error = c.bulk_corr_error;
            }
            None if descriptor.apply_wgt => {
                warn!(
                    "station DFAULT not found in MDF file station correction list \
                     for TLtype {}",
                    descriptor.tltype
                );
                return Err(MagError::DescriptorFormat);
            }
            None => {}
        }
    }

    Ok(MdfContents {
        descriptors,
        station_corrections,
        tltypes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auxilary::approx_equal;

    const MDF: &str = "\
# magtype TLtype det_amp ev_amp algo dmin  dmax  sg1  sg2  sgb  wgt
mb        mb     A5/2    hppn   1    20.0  105.0 0.30 0.60 0.40 1
Ms        Ms     ALR/2   hplr   0    20.0  100.0 0.25 0.50 0.35 0
ML        ML     SBSNR   hpsn   2    0.0   20.0  0.30 0.60 0.40 0

# sta    TLtype corr  err
DFAULT   mb     0.00  0.35
DFAULT   Ms     0.00  0.30
ARCES    mb     0.12  0.20
";

    fn requested() -> Vec<String> {
        vec!["mb".to_string(), "Ms".to_string(), "ML".to_string()]
    }

    #[test]
    fn parses_descriptors_and_corrections() {
        let mdf = parse_mdf(MDF, &requested()).unwrap();
        assert_eq!(mdf.descriptors.len(), 3);
        assert_eq!(mdf.station_corrections.len(), 3);
        assert_eq!(mdf.tltypes, vec!["mb", "Ms", "ML"]);

        let mb = &mdf.descriptors[0];
        assert_eq!(mb.algorithm, Algorithm::Mle);
        assert!(mb.apply_wgt);
        assert!(approx_equal(mb.dist_max, 105.0, 1e-9));
        assert!(approx_equal(mb.def_sta_corr_error, 0.35, 1e-9));

        let ml = &mdf.descriptors[2];
        assert_eq!(ml.algorithm, Algorithm::MleWithBootstrap);
        assert!(!ml.apply_wgt);
    }

    #[test]
    fn filters_unrequested_magtypes() {
        let mdf = parse_mdf(MDF, &["mb".to_string()]).unwrap();
        assert_eq!(mdf.descriptors.len(), 1);
        assert_eq!(mdf.tltypes, vec!["mb"]);
    }

    #[test]
    fn rejects_bad_sd_ordering() {
        let text = "\
mb mb A5/2 hppn 1 20.0 105.0 0.50 0.60 0.40 1

DFAULT mb 0.0 0.35
";
        assert_eq!(
            parse_mdf(text, &["mb".to_string()]).unwrap_err(),
            MagError::DescriptorFormat
        );
    }

    #[test]
    fn rejects_short_lines() {
        let text = "mb mb A5/2 hppn 1 20.0 105.0\n";
        assert_eq!(
            parse_mdf(text, &["mb".to_string()]).unwrap_err(),
            MagError::DescriptorFormat
        );
    }

    #[test]
    fn weighted_type_requires_default_correction() {
        let text = "\
mb mb A5/2 hppn 1 20.0 105.0 0.30 0.60 0.40 1

ARCES mb 0.12 0.20
";
        assert_eq!(
            parse_mdf(text, &["mb".to_string()]).unwrap_err(),
            MagError::DescriptorFormat
        );
        // The same type without weighting loads fine.
        let text = "\
mb mb A5/2 hppn 1 20.0 105.0 0.30 0.60 0.40 0

ARCES mb 0.12 0.20
";
        assert!(parse_mdf(text, &["mb".to_string()]).is_ok());
    }

    #[test]
    fn empty_after_filtering_is_an_error() {
        assert_eq!(
            parse_mdf(MDF, &["mw".to_string()]).unwrap_err(),
            MagError::DescriptorFormat
        );
    }

    #[test]
    fn nonzero_weight_flag_is_true() {
        let text = "\
mb mb A5/2 hppn 1 20.0 105.0 0.30 0.60 0.40 7

DFAULT mb 0.0 0.35
";
        let mdf = parse_mdf(text, &["mb".to_string()]).unwrap();
        assert!(mdf.descriptors[0].apply_wgt);
    }

    #[test]
    fn algorithm_codes_round_trip() {
        for code in 0..=2 {
            assert_eq!(Algorithm::from_code(code).unwrap().code(), code);
        }
        assert!(Algorithm::from_code(3).is_none());
    }
}
