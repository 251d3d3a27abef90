//! Transmission-loss store: specification parsing, table registry and query.
//!
//! The store is populated from a transmission-loss specification file (TLSF)
//! of three blank-separated sections:
//!
//! 1. model list — `model_name  relative_dir`
//! 2. type-to-model bindings — `type  model  phase_dep_flag  csv_phases`
//! 3. station specialisations — `station  type  model  phase  chan`
//!    (`-` means any)
//!
//! Lines with `#` in the first column are comments. Only TL types in the
//! caller's requested list, and specialisations for stations present in the
//! site roster, are loaded. Resolution from `(type, station, phase, channel)`
//! to a loaded table walks the per-station specialisation chain and keeps the
//! most specific match: type+phase+channel beats type+phase, which beats a
//! bare type specialisation (the latter only when a default table exists).

use crate::auxilary::{NA_MAGNITUDE, delta_degrees};
use crate::error::{MagError, TlError};
use crate::interp::INTERP_OK;
use crate::records::Site;
use crate::tl_table::{TlTable, read_tl_table};
use log::warn;
use std::path::{Path, PathBuf};

/// One phase of a TL type descriptor and the table it maps to (None when the
/// grid file for the phase was missing).
#[derive(Debug, Clone)]
pub struct PhaseEntry {
    pub phase: String,
    pub tl_index: Option<usize>,
}

/// Binding of a logical TL type to a model with its applicable phases.
#[derive(Debug, Clone)]
pub struct TlTypeDescriptor {
    pub tltype: String,
    pub model: String,
    pub model_index: usize,
    pub phase_dependency: bool,
    pub phases: Vec<PhaseEntry>,
}

/// A per-station override of the default (type, model, phase, channel)
/// binding.
#[derive(Debug, Clone)]
pub struct StationOverride {
    pub sta: String,
    pub tltype: String,
    pub model: String,
    pub phase: String,
    pub chan: String,
    pub tl_index: usize,
}

/// One entry of a station's resolution chain.
#[derive(Debug, Clone)]
struct StationLink {
    tltype: String,
    phase: String,
    chan: String,
    stm_index: usize,
    tl_index: usize,
}

struct ModelPath {
    model: String,
    dir: PathBuf,
}

/// Result of resolving `(type, station, phase, channel)` to a table.
#[derive(Debug, Clone, Copy)]
pub struct TlResolution {
    /// Index of the resolved table in the store.
    pub tl_index: usize,
    /// Index of the station in the site roster.
    pub sta_index: usize,
    /// Index of the matched station specialisation, if one applied.
    pub stm_index: Option<usize>,
    /// Index of the type descriptor whose phase list matched, if any.
    pub tlmd_index: Option<usize>,
}

/// Result of a distance/depth correction interpolation.
#[derive(Debug, Clone, Copy)]
pub struct TlInterpolation {
    /// Correction value, or the -999.0 sentinel on failure.
    pub correction: f64,
    /// Principal derivatives: dTL/dr, dTL/dz, d2TL/dr2, d2TL/dz2.
    pub derivs: [f64; 4],
    /// Interpolation condition code (0 = inside valid domain).
    pub code: i32,
}

/// In-memory registry of loaded TL tables and their resolution structures.
#[derive(Default, Debug)]
pub struct TlStore {
    tables: Vec<TlTable>,
    descriptors: Vec<TlTypeDescriptor>,
    overrides: Vec<StationOverride>,
    links: Vec<Vec<StationLink>>,
    sites: Vec<Site>,
}

/// Split a TLSF body into its three sections of content lines.
///
/// Sections 1 and 2 end at the first blank (or leading-whitespace) line;
/// section 3 runs to the end of the file. Comment lines are dropped.
fn split_sections(text: &str) -> [Vec<&str>; 3] {
    let mut sections: [Vec<&str>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    let mut current = 0;
    for line in text.lines() {
        if line.starts_with('#') {
            continue;
        }
        let blank = line.is_empty() || line.starts_with(char::is_whitespace);
        if blank {
            if current < 2 {
                current += 1;
            }
            continue;
        }
        sections[current].push(line);
    }
    sections
}

impl TlStore {
    /// Read the TL specification file and all grid files it selects.
    ///
    /// # Arguments
    ///
    /// * `tlsf_path` - Path of the specification file; model directories are
    ///   resolved relative to it.
    /// * `requested_tltypes` - TL types to load; everything else is skipped.
    /// * `sites` - Current site roster; specialisations for unknown stations
    ///   are skipped.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be opened, a section is ill-formed, a
    /// referenced model is undefined, or no table could be loaded at all.
    /// Missing individual grid files are warnings; the affected phase keeps
    /// no table.
    pub fn read_tlsf(
        tlsf_path: &Path,
        requested_tltypes: &[String],
        sites: &[Site],
    ) -> Result<TlStore, TlError> {
        let text = std::fs::read_to_string(tlsf_path).map_err(|_| {
            warn!("TLSF: {} will not open!", tlsf_path.display());
            TlError::SpecOpen
        })?;
        let base_dir = tlsf_path.parent().unwrap_or_else(|| Path::new("."));

        let [model_lines, binding_lines, override_lines] = split_sections(&text);

        let mut model_paths = Vec::with_capacity(model_lines.len());
        for line in &model_lines {
            let mut tokens = line.split_whitespace();
            let (Some(model), Some(relative)) = (tokens.next(), tokens.next()) else {
                return Err(TlError::SpecFormat);
            };
            model_paths.push(ModelPath {
                model: model.to_string(),
                dir: base_dir.join(relative),
            });
        }

        let mut store = TlStore::default();
        for line in &binding_lines {
            store.load_binding(line, requested_tltypes, &model_paths)?;
        }
        for line in &override_lines {
            store.load_override(line, requested_tltypes, sites, &model_paths)?;
        }

        if store.tables.is_empty() {
            warn!("no TL tables could be opened!");
            return Err(TlError::NoTables);
        }

        Ok(store)
    }

    /// Parse one type-to-model binding line and read its grid file(s).
    fn load_binding(
        &mut self,
        line: &str,
        requested_tltypes: &[String],
        model_paths: &[ModelPath],
    ) -> Result<(), TlError> {
        let mut tokens = line.split_whitespace();
        let (Some(tltype), Some(model), Some(dep), Some(phase_csv)) =
            (tokens.next(), tokens.next(), tokens.next(), tokens.next())
        else {
            return Err(TlError::SpecFormat);
        };
        let phase_dependency = dep.parse::<i32>().map_err(|_| TlError::SpecFormat)? != 0;

        if !requested_tltypes.iter().any(|t| t == tltype) {
            return Ok(());
        }

        let Some(model_index) = model_paths.iter().position(|m| m.model == model) else {
            warn!("TL model not specified for: {model} for TLtype: {tltype}");
            return Err(TlError::SpecFormat);
        };

        let mut phases: Vec<PhaseEntry> = phase_csv
            .split(',')
            .filter(|p| !p.is_empty())
            .map(|p| PhaseEntry {
                phase: p.to_string(),
                tl_index: None,
            })
            .collect();
        if phases.is_empty() {
            return Err(TlError::SpecFormat);
        }

        let dir = &model_paths[model_index].dir;
        if phase_dependency {
            for entry in phases.iter_mut() {
                if let Some(table) = read_tl_table(dir, tltype, model, &entry.phase, "-")? {
                    entry.tl_index = Some(self.tables.len());
                    self.tables.push(table);
                }
            }
        } else if let Some(table) = read_tl_table(dir, tltype, model, "-", "-")? {
            let tl_index = Some(self.tables.len());
            self.tables.push(table);
            for entry in phases.iter_mut() {
                entry.tl_index = tl_index;
            }
        }

        self.descriptors.push(TlTypeDescriptor {
            tltype: tltype.to_string(),
            model: model.to_string(),
            model_index,
            phase_dependency,
            phases,
        });
        Ok(())
    }

    /// Parse one station specialisation line, apply the duplicate-detection
    /// rules and read its grid file.
    fn load_override(
        &mut self,
        line: &str,
        requested_tltypes: &[String],
        sites: &[Site],
        model_paths: &[ModelPath],
    ) -> Result<(), TlError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let [sta, tltype, model, phase, chan] = tokens.as_slice() else {
            warn!("error reading station/TLtype/model info: {line}");
            return Err(TlError::SpecFormat);
        };

        // A channel dependency cannot exist without a phase dependency.
        if *chan != "-" && *phase == "-" {
            warn!("channel specialisation without phase: {line}");
            return Err(TlError::SpecFormat);
        }

        if !requested_tltypes.iter().any(|t| t == tltype)
            || !sites.iter().any(|s| s.sta == *sta)
        {
            return Ok(());
        }

        // A specialisation merely restating the default binding is ignored.
        if *chan == "-" {
            let redundant = self.descriptors.iter().any(|d| {
                d.model == *model
                    && d.tltype == *tltype
                    && d.phases.iter().any(|p| p.phase == *phase)
            });
            if redundant {
                warn!(
                    "STM: {sta}/{tltype}/{model} line found to be redundant with \
                     the TLtype/model binding; will be ignored!"
                );
                return Ok(());
            }
        }

        // So is an exact duplicate of an earlier specialisation.
        let duplicate = self.overrides.iter().any(|o| {
            o.sta == *sta && o.tltype == *tltype && o.model == *model && o.chan == *chan
        });
        if duplicate {
            warn!(
                "STM: {sta}/{tltype}/{model} line found to be a duplicate with \
                 another STM record; will be ignored!"
            );
            return Ok(());
        }

        // The grid file lives in the directory of the TL type's default model.
        let Some(descriptor) = self.descriptors.iter().find(|d| d.tltype == *tltype) else {
            warn!(
                "STM: {sta}/{tltype}/{model} line not associated with any \
                 TLtype/model binding; will be ignored!"
            );
            return Ok(());
        };
        let dir = &model_paths[descriptor.model_index].dir;

        if let Some(table) = read_tl_table(dir, tltype, model, phase, chan)? {
            self.overrides.push(StationOverride {
                sta: sta.to_string(),
                tltype: tltype.to_string(),
                model: model.to_string(),
                phase: phase.to_string(),
                chan: chan.to_string(),
                tl_index: self.tables.len(),
            });
            self.tables.push(table);
        }
        Ok(())
    }

    /// Rebuild the per-station resolution chains for a (possibly new) site
    /// roster. Idempotent when the roster is unchanged.
    pub fn set_station_links(&mut self, sites: &[Site]) -> Result<(), MagError> {
        if sites.is_empty() {
            warn!("site table not specified or empty!");
            return Err(MagError::SiteMissing);
        }

        let unchanged = self.sites.len() == sites.len()
            && self
                .sites
                .iter()
                .zip(sites.iter())
                .all(|(a, b)| a.sta == b.sta);
        if unchanged && !self.links.is_empty() {
            return Ok(());
        }

        self.links = sites
            .iter()
            .map(|site| {
                self.overrides
                    .iter()
                    .enumerate()
                    .filter(|(_, o)| o.sta == site.sta)
                    .map(|(stm_index, o)| StationLink {
                        tltype: o.tltype.clone(),
                        phase: o.phase.clone(),
                        chan: o.chan.clone(),
                        stm_index,
                        tl_index: o.tl_index,
                    })
                    .collect()
            })
            .collect();
        self.sites = sites.to_vec();
        Ok(())
    }

    /// The loaded tables.
    pub fn tables(&self) -> &[TlTable] {
        &self.tables
    }

    /// The table at a resolved index.
    pub fn table(&self, tl_index: usize) -> &TlTable {
        &self.tables[tl_index]
    }

    /// The type descriptors read from the specification.
    pub fn descriptors(&self) -> &[TlTypeDescriptor] {
        &self.descriptors
    }

    /// The station specialisations read from the specification.
    pub fn overrides(&self) -> &[StationOverride] {
        &self.overrides
    }

    /// The site roster the station links were built against.
    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    /// Index of the descriptor for a TL type.
    pub fn descriptor_index(&self, tltype: &str) -> Option<usize> {
        self.descriptors.iter().position(|d| d.tltype == tltype)
    }

    /// Is the phase acceptable for the given TL type?
    pub fn valid_phase_for_type(&self, tltype: &str, phase: &str) -> bool {
        match self.descriptor_index(tltype) {
            Some(idx) => self.descriptors[idx]
                .phases
                .iter()
                .any(|p| p.phase == phase),
            None => false,
        }
    }

    /// Is the (distance, depth) point inside the sampled domain of the table
    /// resolved for `(type, station, phase, channel)`?
    pub fn valid_range_for_table(
        &self,
        tltype: &str,
        sta: &str,
        phase: &str,
        chan: &str,
        delta: f64,
        depth: f64,
    ) -> bool {
        let Some(res) = self.resolve(tltype, sta, phase, chan) else {
            return false;
        };
        let table = &self.tables[res.tl_index];
        let nd = table.dist_samples.len();
        if nd > 1 && (delta < table.dist_samples[0] || delta > table.dist_samples[nd - 1]) {
            return false;
        }
        let nz = table.depth_samples.len();
        if nz > 1 && (depth < table.depth_samples[0] || depth > table.depth_samples[nz - 1]) {
            return false;
        }
        true
    }

    /// Resolve `(type, station, phase, channel)` to a loaded table.
    ///
    /// The default table comes from the type descriptor's phase list. The
    /// station's specialisation chain is then walked for the most specific
    /// match: an exact type+phase+channel match wins immediately; a
    /// type+phase match with channel `-` ranks next; a bare type match
    /// (phase and channel both `-`) applies only when a default table
    /// already exists. Returns None when the type or station is unknown or
    /// no table applies.
    pub fn resolve(&self, tltype: &str, sta: &str, phase: &str, chan: &str) -> Option<TlResolution> {
        if tltype.is_empty() {
            return None;
        }

        let mut tl_index: Option<usize> = None;
        let mut tlmd_index: Option<usize> = None;
        if let Some(idx) = self.descriptor_index(tltype) {
            if let Some(entry) = self.descriptors[idx]
                .phases
                .iter()
                .find(|p| p.phase == phase)
            {
                tl_index = entry.tl_index;
                tlmd_index = Some(idx);
            }
        } else {
            return None;
        }

        let sta_index = self.sites.iter().position(|s| s.sta == sta)?;

        let mut stm_index: Option<usize> = None;
        let mut specificity = 0;
        for link in &self.links[sta_index] {
            if link.tltype != tltype {
                continue;
            }
            if link.phase == phase {
                if link.chan == chan {
                    // Highest level of dependency; use immediately.
                    stm_index = Some(link.stm_index);
                    tl_index = Some(link.tl_index);
                    break;
                } else if link.chan == "-" {
                    stm_index = Some(link.stm_index);
                    tl_index = Some(link.tl_index);
                    specificity = 2;
                }
            }
            if link.phase == "-" && link.chan == "-" && specificity < 2 {
                // A bare type specialisation only applies on top of a valid
                // default phase binding.
                if tl_index.is_some() && tlmd_index.is_some() {
                    stm_index = Some(link.stm_index);
                    tl_index = Some(link.tl_index);
                    specificity = 1;
                }
            }
        }

        tl_index.map(|tl_index| TlResolution {
            tl_index,
            sta_index,
            stm_index,
            tlmd_index,
        })
    }

    /// Interpolate the distance/depth correction of a resolved table.
    ///
    /// The in-hole flag is passed to the interpolation service whenever the
    /// distance falls inside the table's invalid interval. When
    /// extrapolation is disabled and the point lies outside the valid
    /// domain, the correction is the -999.0 sentinel.
    pub fn interpolate(
        &self,
        tl_index: usize,
        distance: f64,
        depth: f64,
        extrapolate: bool,
    ) -> TlInterpolation {
        let failed = TlInterpolation {
            correction: NA_MAGNITUDE,
            derivs: [0.0; 4],
            code: -1,
        };
        if tl_index >= self.tables.len() {
            warn!("interpolate: tl_index is too large!");
            return failed;
        }
        let Some(out) = self.tables[tl_index].interpolate(distance, depth, extrapolate) else {
            return failed;
        };
        if !extrapolate && out.code != INTERP_OK {
            return TlInterpolation {
                correction: NA_MAGNITUDE,
                derivs: [out.dx, out.dz, out.dx2, out.dz2],
                code: out.code,
            };
        }
        TlInterpolation {
            correction: out.value,
            derivs: [out.dx, out.dz, out.dx2, out.dz2],
            code: out.code,
        }
    }

    /// Modelling-error variance of a table, with the model name it carries.
    pub fn model_error(&self, tl_index: usize, delta: f64, depth: f64) -> (f64, String) {
        let table = &self.tables[tl_index];
        (table.model_error(delta, depth), table.model.clone())
    }

    /// Test-site correction for `(region, station)` under the given type.
    pub fn ts_correction(
        &self,
        ts_region: &str,
        sta: &str,
        tltype: &str,
        tl_index: usize,
    ) -> Option<f64> {
        self.tables[tl_index].ts_correction(ts_region, sta, tltype)
    }

    /// Distance from the event to a roster station, in arc degrees, or None
    /// when the station is not in the roster.
    pub fn delta_for_station(&self, sta: &str, ev_lat: f64, ev_lon: f64) -> Option<f64> {
        self.sites
            .iter()
            .find(|s| s.sta == sta)
            .map(|s| delta_degrees(s.lat, s.lon, ev_lat, ev_lon))
    }
}
