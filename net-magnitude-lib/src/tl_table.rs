//! Transmission-loss (TL) table loading.
//!
//! One TL table holds a regular grid of log-space magnitude corrections over
//! sampled distances and depths, read from a single grid file. A table may
//! carry an optional modelling-error block (a bulk variance, a
//! distance-dependent curve, or a full distance/depth grid) and an optional
//! test-site correction sidecar. Correction values at or below -1.0 mark an
//! intentionally invalid distance interval (a "hole"), detected on the first
//! depth row at load time.
//!
//! ## Grid file layout
//!
//! ```text
//! # comment line
//! <num_depths>
//! <depth samples...>
//! <num_distances>
//! <distance samples...>
//! # one comment line per depth block
//! <num_distances correction values...>
//! ...
//! <num_distances> <num_depths>      (optional modelling-error block)
//! ...
//! ```
//!
//! A sidecar named `<grid>.ts_dir` holds the path of a test-site correction
//! file listing per-region station corrections.

use crate::auxilary::NA_MODEL_ERROR;
use crate::error::TlError;
use crate::interp::{self, INVALID_SAMPLE, TableInterp};
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};

/// Modelling-error information attached to a TL table, dispatched on grid
/// dimensionality for fastest access.
#[derive(Debug, Clone)]
pub enum TlModelError {
    /// A single bulk variance for the whole table.
    Bulk(f64),
    /// Distance-dependent variance curve.
    Distance {
        dist_samples: Vec<f64>,
        var: Vec<f64>,
    },
    /// Full distance/depth-dependent variance grid (`var[depth][dist]`).
    DistanceDepth {
        dist_samples: Vec<f64>,
        depth_samples: Vec<f64>,
        var: Vec<Vec<f64>>,
    },
}

/// One named test-site region: a map of station to scalar correction for
/// this TL type.
#[derive(Debug, Clone)]
pub struct TestSiteRegion {
    pub number: i32,
    pub name: String,
    pub tltype: String,
    /// Station codes paired with their corrections. A trailing `*` on a
    /// station is stripped at load time.
    pub stations: Vec<(String, f64)>,
}

/// One loaded transmission-loss table.
#[derive(Debug, Clone)]
pub struct TlTable {
    pub tltype: String,
    pub model: String,
    pub phase: String,
    pub chan: String,
    /// Monotone distance sampling, arc degrees.
    pub dist_samples: Vec<f64>,
    /// Monotone depth sampling, kilometers.
    pub depth_samples: Vec<f64>,
    /// Correction grid, `tl[depth][dist]`.
    pub tl: Vec<Vec<f64>>,
    /// Invalid distance interval detected on the first depth row:
    /// `(last valid distance before, first valid distance after)`.
    pub hole_dist: Option<(f64, f64)>,
    pub mdl_err: Option<TlModelError>,
    pub ts_regions: Vec<TestSiteRegion>,
}

impl TlTable {
    /// Does the given distance fall strictly inside this table's hole?
    pub fn in_hole(&self, distance: f64) -> bool {
        match self.hole_dist {
            Some((lo, hi)) => distance > lo && distance < hi,
            None => false,
        }
    }

    /// Interpolate the distance/depth correction at the given point.
    ///
    /// Delegates to the bi-cubic service with the in-hole flag set when the
    /// distance falls inside the invalid interval. Returns None when the
    /// interpolation fails outright.
    pub fn interpolate(
        &self,
        distance: f64,
        depth: f64,
        extrapolate: bool,
    ) -> Option<TableInterp> {
        interp::interpolate_table_value(
            extrapolate,
            self.in_hole(distance),
            &self.dist_samples,
            &self.depth_samples,
            &self.tl,
            distance,
            depth,
        )
    }

    /// The modelling-error variance at the given distance and depth.
    ///
    /// Bulk errors are constant; distance curves are linearly interpolated
    /// and clamped to their end points; 2-D grids are bi-linearly
    /// interpolated and clamped to the nearest edge on either axis. Returns
    /// [`NA_MODEL_ERROR`] when the table carries no modelling-error block,
    /// in which case the caller substitutes the magnitude type's baseline
    /// standard deviation.
    pub fn model_error(&self, delta: f64, depth: f64) -> f64 {
        match &self.mdl_err {
            None => NA_MODEL_ERROR,
            Some(TlModelError::Bulk(var)) => *var,
            Some(TlModelError::Distance { dist_samples, var }) => {
                interp_1d_clamped(dist_samples, var, delta)
            }
            Some(TlModelError::DistanceDepth {
                dist_samples,
                depth_samples,
                var,
            }) => {
                // Depth bracket, clamped to the shallowest/deepest rows.
                let (m0, m1, zr) = bracket_clamped(depth_samples, depth);
                let top = interp_1d_clamped(dist_samples, &var[m0], delta);
                let bot = interp_1d_clamped(dist_samples, &var[m1], delta);
                top + zr * (bot - top)
            }
        }
    }

    /// Look up the test-site correction for `(region, station)` bound to
    /// the given TL type.
    pub fn ts_correction(&self, ts_region: &str, sta: &str, tltype: &str) -> Option<f64> {
        if ts_region.is_empty() || ts_region == "-" || self.ts_regions.is_empty() {
            return None;
        }
        let mut region_found = false;
        for region in &self.ts_regions {
            if region.name == ts_region {
                region_found = true;
                if region.tltype == tltype {
                    return region
                        .stations
                        .iter()
                        .find(|(s, _)| s == sta)
                        .map(|(_, corr)| *corr);
                }
            }
        }
        if !region_found {
            warn!("requested mag. test-site region: {ts_region}, not available!");
        }
        None
    }
}

/// Linear interpolation over a monotone sampling, clamped to the end points.
fn interp_1d_clamped(samples: &[f64], values: &[f64], x: f64) -> f64 {
    let n = samples.len();
    if n == 1 || x < samples[0] {
        return values[0];
    }
    if x > samples[n - 1] {
        return values[n - 1];
    }
    for i in 1..n {
        if x < samples[i] {
            let ratio = (x - samples[i - 1]) / (samples[i] - samples[i - 1]);
            return values[i - 1] + ratio * (values[i] - values[i - 1]);
        }
    }
    values[n - 1]
}

/// Bracketing indices and ratio for `x` in a monotone sampling, clamped so
/// out-of-range queries collapse onto the nearest edge.
fn bracket_clamped(samples: &[f64], x: f64) -> (usize, usize, f64) {
    let n = samples.len();
    if n == 1 || x <= samples[0] {
        return (0, 0, 0.0);
    }
    if x >= samples[n - 1] {
        return (n - 1, n - 1, 0.0);
    }
    for i in 1..n {
        if samples[i] > x {
            let ratio = (x - samples[i - 1]) / (samples[i] - samples[i - 1]);
            return (i - 1, i, ratio);
        }
    }
    (n - 1, n - 1, 0.0)
}

/// Whitespace token cursor over a grid file body, following the reading
/// discipline of the file format (counts terminate their line, depth blocks
/// are introduced by `#` comment lines).
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn bytes(&self) -> &'a [u8] {
        self.text.as_bytes()
    }

    fn skip_ws(&mut self) {
        let bytes = self.bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn at_eof(&mut self) -> bool {
        self.skip_ws();
        self.pos >= self.text.len()
    }

    fn next_token(&mut self) -> Option<&'a str> {
        self.skip_ws();
        let bytes = self.bytes();
        if self.pos >= bytes.len() {
            return None;
        }
        let start = self.pos;
        while self.pos < bytes.len() && !bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        Some(&self.text[start..self.pos])
    }

    fn next_f64(&mut self) -> Option<f64> {
        self.next_token()?.parse().ok()
    }

    fn next_i32(&mut self) -> Option<i32> {
        self.next_token()?.parse().ok()
    }

    /// Advance past the next newline.
    fn skip_line(&mut self) {
        let bytes = self.bytes();
        while self.pos < bytes.len() && bytes[self.pos] != b'\n' {
            self.pos += 1;
        }
        if self.pos < bytes.len() {
            self.pos += 1;
        }
    }

    /// Advance past the next `#` character and then past its line.
    fn skip_past_comment(&mut self) -> bool {
        let bytes = self.bytes();
        while self.pos < bytes.len() && bytes[self.pos] != b'#' {
            self.pos += 1;
        }
        if self.pos >= bytes.len() {
            return false;
        }
        self.skip_line();
        true
    }

    fn read_f64s(&mut self, count: usize) -> Option<Vec<f64>> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.next_f64()?);
        }
        Some(out)
    }
}

/// Build the grid file name for the given table coordinates.
///
/// A phase dependency extends the name with `.phase`; a channel dependency
/// additionally with `.chan` and cannot exist without a phase.
fn grid_file_name(dir: &Path, model: &str, tltype: &str, phase: &str, chan: &str) -> PathBuf {
    let mut name = format!("{model}.{tltype}");
    if !phase.is_empty() && phase != "-" {
        name.push('.');
        name.push_str(phase);
        if !chan.is_empty() && chan != "-" {
            name.push('.');
            name.push_str(chan);
        }
    }
    dir.join(name)
}

/// Read a single transmission-loss table.
///
/// # Arguments
///
/// * `dir` - Directory holding the grid files of the table's model.
/// * `tltype`, `model`, `phase`, `chan` - Table coordinates; `"-"` marks an
///   absent phase/channel dependency.
///
/// # Returns
///
/// `Ok(Some(table))` on success. A missing grid file is a soft condition
/// reported as `Ok(None)` after a warning, so callers can continue with the
/// remaining phases. Format problems are hard errors.
pub fn read_tl_table(
    dir: &Path,
    tltype: &str,
    model: &str,
    phase: &str,
    chan: &str,
) -> Result<Option<TlTable>, TlError> {
    let path = grid_file_name(dir, model, tltype, phase, chan);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(_) => {
            warn!("file {} will not open!", path.display());
            return Ok(None);
        }
    };

    let mut table = parse_tl_table(&text, tltype, model, phase, chan)?;
    read_ts_sidecar(&path, &mut table)?;
    Ok(Some(table))
}

/// Parse the body of a TL grid file.
pub(crate) fn parse_tl_table(
    text: &str,
    tltype: &str,
    model: &str,
    phase: &str,
    chan: &str,
) -> Result<TlTable, TlError> {
    let mut cur = Cursor::new(text);

    // Leading comment line.
    cur.skip_line();

    let num_depths = cur.next_i32().ok_or(TlError::TableFormat)?;
    if num_depths <= 0 {
        return Err(TlError::TableFormat);
    }
    cur.skip_line();
    let depth_samples = cur
        .read_f64s(num_depths as usize)
        .ok_or(TlError::TableFormat)?;

    let num_dists = cur.next_i32().ok_or(TlError::TableFormat)?;
    if num_dists <= 0 {
        return Err(TlError::TableFormat);
    }
    cur.skip_line();
    let dist_samples = cur
        .read_f64s(num_dists as usize)
        .ok_or(TlError::TableFormat)?;

    let mut tl = Vec::with_capacity(num_depths as usize);
    for _ in 0..num_depths {
        if !cur.skip_past_comment() {
            return Err(TlError::TableFormat);
        }
        tl.push(cur.read_f64s(num_dists as usize).ok_or(TlError::TableFormat)?);
    }

    let hole_dist = detect_hole(&dist_samples, &tl[0]);
    let mdl_err = parse_model_error(&mut cur)?;

    Ok(TlTable {
        tltype: tltype.to_string(),
        model: model.to_string(),
        phase: phase.to_string(),
        chan: chan.to_string(),
        dist_samples,
        depth_samples,
        tl,
        hole_dist,
        mdl_err,
        ts_regions: Vec::new(),
    })
}

/// Scan the first depth row for an invalid interval. Only meaningful when
/// both the entry and exit of the hole are found.
fn detect_hole(dist_samples: &[f64], first_row: &[f64]) -> Option<(f64, f64)> {
    let valid = |v: f64| v > INVALID_SAMPLE;
    let mut hole_min = None;
    for i in 1..first_row.len() {
        match hole_min {
            None => {
                if valid(first_row[i - 1]) && !valid(first_row[i]) {
                    hole_min = Some(dist_samples[i - 1]);
                }
            }
            Some(lo) => {
                if valid(first_row[i]) {
                    return Some((lo, dist_samples[i]));
                }
            }
        }
    }
    None
}

/// Parse the optional modelling-error block following the correction grid.
fn parse_model_error(cur: &mut Cursor<'_>) -> Result<Option<TlModelError>, TlError> {
    if cur.at_eof() {
        return Ok(None);
    }
    // Header comment line introducing the block.
    cur.next_token();
    cur.skip_line();
    let Some(num_dists) = cur.next_i32() else {
        return Ok(None);
    };
    let Some(num_depths) = cur.next_i32() else {
        return Ok(None);
    };
    if num_dists <= 0 || num_depths <= 0 {
        return Err(TlError::ModelErrorFormat);
    }
    cur.skip_line();

    if num_depths == 1 {
        if num_dists == 1 {
            // Single bulk variance after one more comment line.
            cur.next_token().ok_or(TlError::ModelErrorFormat)?;
            cur.skip_line();
            let bulk = cur.next_f64().ok_or(TlError::ModelErrorFormat)?;
            return Ok(Some(TlModelError::Bulk(bulk)));
        }
        let dist_samples = cur
            .read_f64s(num_dists as usize)
            .ok_or(TlError::ModelErrorFormat)?;
        cur.next_token().ok_or(TlError::ModelErrorFormat)?;
        cur.skip_line();
        let var = cur
            .read_f64s(num_dists as usize)
            .ok_or(TlError::ModelErrorFormat)?;
        return Ok(Some(TlModelError::Distance { dist_samples, var }));
    }

    let dist_samples = cur
        .read_f64s(num_dists as usize)
        .ok_or(TlError::ModelErrorFormat)?;
    let depth_samples = cur
        .read_f64s(num_depths as usize)
        .ok_or(TlError::ModelErrorFormat)?;
    let mut var = Vec::with_capacity(num_depths as usize);
    for _ in 0..num_depths {
        if !cur.skip_past_comment() {
            return Err(TlError::ModelErrorFormat);
        }
        var.push(
            cur.read_f64s(num_dists as usize)
                .ok_or(TlError::ModelErrorFormat)?,
        );
    }
    Ok(Some(TlModelError::DistanceDepth {
        dist_samples,
        depth_samples,
        var,
    }))
}

/// Read the `.ts_dir` sidecar next to a grid file, if present, and load the
/// test-site correction file it points at.
fn read_ts_sidecar(grid_path: &Path, table: &mut TlTable) -> Result<(), TlError> {
    let mut sidecar = grid_path.as_os_str().to_owned();
    sidecar.push(".ts_dir");
    let sidecar = PathBuf::from(sidecar);
    let Ok(pointer) = fs::read_to_string(&sidecar) else {
        return Ok(());
    };

    let Some(ts_path) = pointer.split_whitespace().next() else {
        return Err(TlError::ModelErrorFormat);
    };
    let text = match fs::read_to_string(ts_path) {
        Ok(text) => text,
        Err(_) => {
            warn!(
                "test-site correction file: {ts_path} specified in file: {} does NOT exist! \
                 NO test-site corrections can be applied for this TL model",
                sidecar.display()
            );
            return Ok(());
        }
    };

    table.ts_regions = parse_ts_regions(&text)?;
    Ok(())
}

/// Parse a test-site correction file.
pub(crate) fn parse_ts_regions(text: &str) -> Result<Vec<TestSiteRegion>, TlError> {
    let mut cur = Cursor::new(text);
    let num_regions = cur.next_i32().ok_or(TlError::Allocation)?;
    cur.skip_line();

    let mut regions = Vec::with_capacity(num_regions.max(0) as usize);
    for _ in 0..num_regions {
        let number = cur.next_i32().ok_or(TlError::TestSiteFormat)?;
        let name = cur.next_token().ok_or(TlError::TestSiteFormat)?.to_string();
        let tltype = cur.next_token().ok_or(TlError::TestSiteFormat)?.to_string();
        let num_sta = cur.next_i32().ok_or(TlError::TestSiteFormat)?;
        cur.skip_line();

        let mut stations = Vec::with_capacity(num_sta.max(0) as usize);
        for _ in 0..num_sta {
            let sta = cur.next_token().ok_or(TlError::TestSiteFormat)?;
            let corr = cur.next_f64().ok_or(TlError::TestSiteFormat)?;
            let sta = sta.strip_suffix('*').unwrap_or(sta).to_string();
            stations.push((sta, corr));
        }
        regions.push(TestSiteRegion {
            number,
            name,
            tltype,
            stations,
        });
    }
    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auxilary::{NA_MODEL_ERROR, approx_equal};

    const GRID: &str = "\
# mb correction table
2                       # number of depth samples
  0.0 700.0
5                       # number of distance samples
  0.0 10.0 20.0 30.0 40.0
# depth = 0.0
  3.00 3.10 3.20 3.30 3.40
# depth = 700.0
  3.50 3.60 3.70 3.80 3.90
";

    const GRID_WITH_HOLE: &str = "\
# correction table with a hole
1
  0.0
5
  0.0 10.0 20.0 30.0 40.0
# depth = 0.0
  3.00 3.10 -1.00 -1.00 3.40
";

    #[test]
    fn parses_basic_grid() {
        let table = parse_tl_table(GRID, "mb", "iasp91", "-", "-").unwrap();
        assert_eq!(table.depth_samples, vec![0.0, 700.0]);
        assert_eq!(table.dist_samples.len(), 5);
        assert_eq!(table.tl.len(), 2);
        assert!(approx_equal(table.tl[1][4], 3.90, 1e-9));
        assert!(table.hole_dist.is_none());
        assert!(table.mdl_err.is_none());
    }

    #[test]
    fn detects_hole_bounds() {
        let table = parse_tl_table(GRID_WITH_HOLE, "mb", "iasp91", "-", "-").unwrap();
        let (lo, hi) = table.hole_dist.unwrap();
        assert!(approx_equal(lo, 10.0, 1e-9));
        assert!(approx_equal(hi, 40.0, 1e-9));
        assert!(table.in_hole(25.0));
        assert!(!table.in_hole(10.0));
        assert!(!table.in_hole(5.0));
    }

    #[test]
    fn parses_bulk_model_error() {
        let text = format!("{GRID}# modelling error\n1 1\n# bulk\n0.35\n");
        let table = parse_tl_table(&text, "mb", "iasp91", "-", "-").unwrap();
        match table.mdl_err {
            Some(TlModelError::Bulk(var)) => assert!(approx_equal(var, 0.35, 1e-9)),
            other => panic!("expected bulk modelling error, got {other:?}"),
        }
        assert!(approx_equal(table.model_error(12.0, 50.0), 0.35, 1e-9));
        assert!(approx_equal(table.model_error(90.0, 600.0), 0.35, 1e-9));
    }

    #[test]
    fn parses_distance_model_error_with_clamping() {
        let text = format!(
            "{GRID}# modelling error\n3 1\n  0.0 20.0 40.0\n# variances\n  0.30 0.40 0.50\n"
        );
        let table = parse_tl_table(&text, "mb", "iasp91", "-", "-").unwrap();
        assert!(approx_equal(table.model_error(10.0, 0.0), 0.35, 1e-9));
        // Clamped to nearest end point outside the sampling.
        assert!(approx_equal(table.model_error(-5.0, 0.0), 0.30, 1e-9));
        assert!(approx_equal(table.model_error(90.0, 0.0), 0.50, 1e-9));
    }

    #[test]
    fn parses_2d_model_error_bilinear() {
        let text = format!(
            "{GRID}# modelling error\n2 2\n  0.0 40.0\n  0.0 700.0\n# z=0\n  0.20 0.40\n# z=700\n  0.60 0.80\n"
        );
        let table = parse_tl_table(&text, "mb", "iasp91", "-", "-").unwrap();
        // Center of the cell: mean of the four corners.
        assert!(approx_equal(table.model_error(20.0, 350.0), 0.50, 1e-9));
        // Clamped on both axes.
        assert!(approx_equal(table.model_error(-10.0, -5.0), 0.20, 1e-9));
        assert!(approx_equal(table.model_error(99.0, 9999.0), 0.80, 1e-9));
        // Edge rows interpolate along distance only.
        assert!(approx_equal(table.model_error(20.0, 0.0), 0.30, 1e-9));
    }

    #[test]
    fn missing_model_error_is_na() {
        let table = parse_tl_table(GRID, "mb", "iasp91", "-", "-").unwrap();
        assert!(approx_equal(table.model_error(10.0, 0.0), NA_MODEL_ERROR, 1e-9));
    }

    #[test]
    fn rejects_truncated_grid() {
        let text = "# comment\n2\n0.0 700.0\n3\n0.0 10.0\n";
        assert_eq!(
            parse_tl_table(text, "mb", "iasp91", "-", "-").unwrap_err(),
            TlError::TableFormat
        );
    }

    #[test]
    fn parses_ts_regions_and_strips_wildcard() {
        let text = "2\n1 EKAZ mb 2\nABC 0.10\nDEF* -0.05\n2 NTS mb 1\nGHI 0.20\n";
        let regions = parse_ts_regions(text).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].stations[1].0, "DEF");
        assert!(approx_equal(regions[1].stations[0].1, 0.20, 1e-9));
    }

    #[test]
    fn ts_lookup_matches_region_and_type() {
        let mut table = parse_tl_table(GRID, "mb", "iasp91", "-", "-").unwrap();
        table.ts_regions = parse_ts_regions("1\n1 EKAZ mb 1\nABC 0.10\n").unwrap();
        assert!(table.ts_correction("EKAZ", "ABC", "mb").is_some());
        assert!(table.ts_correction("EKAZ", "XYZ", "mb").is_none());
        assert!(table.ts_correction("EKAZ", "ABC", "Ms").is_none());
        assert!(table.ts_correction("-", "ABC", "mb").is_none());
    }

    #[test]
    fn interpolates_grid_value_at_node() {
        let table = parse_tl_table(GRID, "mb", "iasp91", "-", "-").unwrap();
        let out = table.interpolate(20.0, 0.0, false).unwrap();
        assert!(approx_equal(out.value, 3.20, 1e-9));
        assert_eq!(out.code, crate::interp::INTERP_OK);
    }
}
