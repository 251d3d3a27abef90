//! Magnitude facilities: the long-lived context tying everything together.
//!
//! [`MagFacilities`] owns the loaded transmission-loss store, the magnitude
//! descriptors and station corrections from the MDF, and the site roster
//! links. It is constructed once by [`MagFacilities::setup`] and passed to
//! every query; the `reset_*`/`revert_*` family applies runtime overrides to
//! the descriptors, with `revert_*` restoring the values loaded from file.
//!
//! The context is single-threaded by design: overrides must not be applied
//! while a magnitude calculation is in flight.

use crate::error::{MagError, SetupError};
use crate::mdf::{Algorithm, MagControl, MagDescriptor, StationCorrection, read_mdf};
use crate::records::Site;
use crate::tl_store::TlStore;
use log::warn;
use std::path::{Path, PathBuf};

/// Long-lived magnitude computation context.
#[derive(Debug)]
pub struct MagFacilities {
    pub(crate) tl: TlStore,
    pub(crate) descriptors: Vec<MagDescriptor>,
    pub(crate) station_corrections: Vec<StationCorrection>,
    compute_upper_bounds: bool,
    tlsf_path: PathBuf,
    /// Placeholder netmag identifier counter; decremented for every netmag
    /// record synthesised by the builder.
    pub(crate) next_magid: i64,
}

impl MagFacilities {
    /// Load the MDF and the TL specification it implies, then link the site
    /// roster, producing a ready-to-query context.
    ///
    /// # Arguments
    ///
    /// * `tlsf_path` - Transmission-loss specification file.
    /// * `mdf_path` - Magnitude descriptor file.
    /// * `magtypes` - Magnitude types to support; everything else in the
    ///   files is skipped.
    /// * `sites` - Site roster used for station links and distances.
    pub fn setup(
        tlsf_path: &Path,
        mdf_path: &Path,
        magtypes: &[String],
        sites: &[Site],
    ) -> Result<MagFacilities, SetupError> {
        let mdf = read_mdf(mdf_path, magtypes)?;
        let mut tl = TlStore::read_tlsf(tlsf_path, &mdf.tltypes, sites)?;
        tl.set_station_links(sites)?;

        Ok(MagFacilities {
            tl,
            descriptors: mdf.descriptors,
            station_corrections: mdf.station_corrections,
            compute_upper_bounds: false,
            tlsf_path: tlsf_path.to_path_buf(),
            next_magid: -1,
        })
    }

    /// Re-run setup in place. An unchanged TLSF path keeps the loaded store
    /// and only refreshes the station links; a new path replaces everything.
    /// The `compute_upper_bounds` state survives either way.
    pub fn resetup(
        &mut self,
        tlsf_path: &Path,
        mdf_path: &Path,
        magtypes: &[String],
        sites: &[Site],
    ) -> Result<(), SetupError> {
        if self.tlsf_path == tlsf_path {
            self.tl.set_station_links(sites)?;
            return Ok(());
        }
        let compute_upper_bounds = self.compute_upper_bounds;
        *self = MagFacilities::setup(tlsf_path, mdf_path, magtypes, sites)?;
        self.compute_upper_bounds = compute_upper_bounds;
        Ok(())
    }

    /// The transmission-loss store.
    pub fn tl(&self) -> &TlStore {
        &self.tl
    }

    /// The loaded magnitude descriptors.
    pub fn descriptors(&self) -> &[MagDescriptor] {
        &self.descriptors
    }

    /// Distance from the event to a roster station, in arc degrees.
    pub fn delta_for_station(&self, sta: &str, ev_lat: f64, ev_lon: f64) -> Option<f64> {
        self.tl.delta_for_station(sta, ev_lat, ev_lon)
    }

    /// Should purely event-based (upper-bound) magnitudes be reported?
    pub fn compute_upper_bounds(&self) -> bool {
        self.compute_upper_bounds
    }

    /// Control whether purely event-based (upper-bound) magnitudes are
    /// reported. Defaults to false.
    pub fn set_compute_upper_bounds(&mut self, compute: bool) {
        self.compute_upper_bounds = compute;
    }

    pub(crate) fn descriptor_index(&self, magtype: &str) -> Option<usize> {
        self.descriptors.iter().position(|d| d.magtype == magtype)
    }

    pub(crate) fn station_correction_index(&self, sta: &str, tltype: &str) -> Option<usize> {
        self.station_corrections
            .iter()
            .position(|c| c.sta == sta && c.tltype == tltype)
    }

    /// A read-only snapshot of the current (possibly overridden) settings
    /// for a magnitude type, or None when the type is unknown.
    pub fn get_magtype_features(&self, magtype: &str) -> Option<MagControl> {
        self.descriptor_index(magtype)
            .map(|idx| self.descriptors[idx].control())
    }

    fn descriptor_mut(&mut self, magtype: &str) -> Result<&mut MagDescriptor, MagError> {
        match self.descriptors.iter_mut().find(|d| d.magtype == magtype) {
            Some(descriptor) => Ok(descriptor),
            None => {
                warn!(
                    "invalid magtype, {magtype}, specified in attempt to change \
                     override settings; values from the MDF will be retained!"
                );
                Err(MagError::UnknownMagtype(magtype.to_string()))
            }
        }
    }

    /// Override the detection- and event-based amplitude types of a
    /// magnitude type.
    pub fn reset_amptypes(
        &mut self,
        magtype: &str,
        det_amptype: &str,
        ev_amptype: &str,
    ) -> Result<(), MagError> {
        let descriptor = self.descriptor_mut(magtype)?;
        descriptor.det_amptype = det_amptype.to_string();
        descriptor.ev_amptype = ev_amptype.to_string();
        Ok(())
    }

    /// Override the estimation algorithm of a magnitude type.
    pub fn reset_algorithm(&mut self, magtype: &str, algorithm: Algorithm) -> Result<(), MagError> {
        self.descriptor_mut(magtype)?.algorithm = algorithm;
        Ok(())
    }

    /// Override the minimum valid distance of a magnitude type.
    pub fn reset_min_dist(&mut self, magtype: &str, dist_min: f64) -> Result<(), MagError> {
        self.descriptor_mut(magtype)?.dist_min = dist_min;
        Ok(())
    }

    /// Override the maximum valid distance of a magnitude type.
    pub fn reset_max_dist(&mut self, magtype: &str, dist_max: f64) -> Result<(), MagError> {
        self.descriptor_mut(magtype)?.dist_max = dist_max;
        Ok(())
    }

    /// Override the standard-deviation clamp interval of a magnitude type.
    /// The current baseline must remain inside the new interval.
    pub fn reset_sd_limits(
        &mut self,
        magtype: &str,
        sglim1: f64,
        sglim2: f64,
    ) -> Result<(), MagError> {
        let descriptor = self.descriptor_mut(magtype)?;
        if sglim1 > descriptor.sgbase || descriptor.sgbase > sglim2 {
            return Err(MagError::InvalidSdSettings(magtype.to_string()));
        }
        descriptor.sglim1 = sglim1;
        descriptor.sglim2 = sglim2;
        Ok(())
    }

    /// Override the baseline standard deviation of a magnitude type. The
    /// new baseline must lie inside the current clamp interval.
    pub fn reset_sd_baseline(&mut self, magtype: &str, sgbase: f64) -> Result<(), MagError> {
        let descriptor = self.descriptor_mut(magtype)?;
        if sgbase < descriptor.sglim1 || sgbase > descriptor.sglim2 {
            return Err(MagError::InvalidSdSettings(magtype.to_string()));
        }
        descriptor.sgbase = sgbase;
        Ok(())
    }

    /// Override the weighted-average flag of a magnitude type.
    pub fn reset_wgt_ave_flag(&mut self, magtype: &str, apply_wgt: bool) -> Result<(), MagError> {
        self.descriptor_mut(magtype)?.apply_wgt = apply_wgt;
        Ok(())
    }

    /// Restore the amplitude types loaded from the MDF.
    pub fn revert_amptypes(&mut self, magtype: &str) -> Result<(), MagError> {
        let descriptor = self.descriptor_mut(magtype)?;
        descriptor.det_amptype = descriptor.orig_det_amptype.clone();
        descriptor.ev_amptype = descriptor.orig_ev_amptype.clone();
        Ok(())
    }

    /// Restore the algorithm loaded from the MDF.
    pub fn revert_algorithm(&mut self, magtype: &str) -> Result<(), MagError> {
        let descriptor = self.descriptor_mut(magtype)?;
        descriptor.algorithm = descriptor.orig_algorithm;
        Ok(())
    }

    /// Restore the minimum valid distance loaded from the MDF.
    pub fn revert_min_dist(&mut self, magtype: &str) -> Result<(), MagError> {
        let descriptor = self.descriptor_mut(magtype)?;
        descriptor.dist_min = descriptor.orig_dist_min;
        Ok(())
    }

    /// Restore the maximum valid distance loaded from the MDF.
    pub fn revert_max_dist(&mut self, magtype: &str) -> Result<(), MagError> {
        let descriptor = self.descriptor_mut(magtype)?;
        descriptor.dist_max = descriptor.orig_dist_max;
        Ok(())
    }

    /// Restore the standard-deviation clamp interval loaded from the MDF,
    /// together with the baseline it was validated against.
    pub fn revert_sd_limits(&mut self, magtype: &str) -> Result<(), MagError> {
        let descriptor = self.descriptor_mut(magtype)?;
        descriptor.sglim1 = descriptor.orig_sglim1;
        descriptor.sglim2 = descriptor.orig_sglim2;
        descriptor.sgbase = descriptor.orig_sgbase;
        Ok(())
    }

    /// Restore the baseline standard deviation loaded from the MDF.
    pub fn revert_sd_baseline(&mut self, magtype: &str) -> Result<(), MagError> {
        let descriptor = self.descriptor_mut(magtype)?;
        descriptor.sgbase = descriptor.orig_sgbase;
        Ok(())
    }

    /// Restore the weighted-average flag loaded from the MDF.
    pub fn revert_wgt_ave_flag(&mut self, magtype: &str) -> Result<(), MagError> {
        let descriptor = self.descriptor_mut(magtype)?;
        descriptor.apply_wgt = descriptor.orig_apply_wgt;
        Ok(())
    }
}
