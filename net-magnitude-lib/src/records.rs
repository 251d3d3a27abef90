//! Event, station and measurement record definitions.
//!
//! This module provides the data structures exchanged with the host
//! application: the station roster, the event hypothesis (origin), network
//! and station magnitude records, amplitude measurements and their arrival
//! associations. Defaults populate every record with N/A sentinel values so
//! freshly synthesised records can be distinguished from computed ones.

use crate::auxilary::{NA_ID, NA_MAGNITUDE, NA_RESIDUAL, NA_UNCERTAINTY};
use serde::{Deserialize, Serialize};

/// One station of the site roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    /// Station code. Example: `"ARCES"`
    pub sta: String,
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
    /// Elevation in kilometers.
    #[serde(default)]
    pub elev: f64,
}

impl Site {
    /// Create a new Site instance.
    pub fn new(sta: &str, lat: f64, lon: f64, elev: f64) -> Self {
        Self {
            sta: sta.to_string(),
            lat,
            lon,
            elev,
        }
    }
}

/// Event hypothesis (origin) record.
///
/// The `mb`/`ms`/`ml` slots and their identifier fields are updated by the
/// magnitude driver when a computed magnitude type is configured to populate
/// them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Origin {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
    /// Depth below surface in kilometers.
    pub depth: f64,
    /// Epoch time of the origin, in seconds.
    pub time: f64,
    /// Origin identifier.
    pub orid: i64,
    /// Event identifier.
    pub evid: i64,
    /// Body-wave magnitude slot.
    pub mb: f64,
    /// Identifier of the netmag record backing `mb`.
    pub mbid: i64,
    /// Surface-wave magnitude slot.
    pub ms: f64,
    /// Identifier of the netmag record backing `ms`.
    pub msid: i64,
    /// Local magnitude slot.
    pub ml: f64,
    /// Identifier of the netmag record backing `ml`.
    pub mlid: i64,
    /// Authorship tag.
    pub auth: String,
}

impl Default for Origin {
    fn default() -> Self {
        Self {
            lat: 0.0,
            lon: 0.0,
            depth: 0.0,
            time: 0.0,
            orid: NA_ID,
            evid: NA_ID,
            mb: NA_MAGNITUDE,
            mbid: NA_ID,
            ms: NA_MAGNITUDE,
            msid: NA_ID,
            ml: NA_MAGNITUDE,
            mlid: NA_ID,
            auth: "-".to_string(),
        }
    }
}

impl Origin {
    /// Create an origin at the given hypocenter with N/A magnitude slots.
    pub fn new(lat: f64, lon: f64, depth: f64, orid: i64, evid: i64) -> Self {
        Self {
            lat,
            lon,
            depth,
            orid,
            evid,
            ..Self::default()
        }
    }
}

/// Network magnitude record for one magnitude type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Netmag {
    /// Network magnitude identifier. Negative values are placeholders
    /// assigned by the builder before persistence.
    pub magid: i64,
    /// Network code.
    pub net: String,
    /// Origin identifier.
    pub orid: i64,
    /// Event identifier.
    pub evid: i64,
    /// Magnitude type (e.g. `"mb"`, `"Ms"`, `"ML"`).
    pub magtype: String,
    /// Number of defining station magnitudes.
    pub nsta: i64,
    /// Network magnitude value.
    pub magnitude: f64,
    /// Network magnitude uncertainty.
    pub uncertainty: f64,
    /// Authorship tag.
    pub auth: String,
}

impl Default for Netmag {
    fn default() -> Self {
        Self {
            magid: NA_ID,
            net: "-".to_string(),
            orid: NA_ID,
            evid: NA_ID,
            magtype: "-".to_string(),
            nsta: 0,
            magnitude: NA_MAGNITUDE,
            uncertainty: NA_UNCERTAINTY,
            auth: "-".to_string(),
        }
    }
}

/// Station magnitude record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stamag {
    /// Network magnitude identifier this record contributes to.
    pub magid: i64,
    /// Amplitude identifier this record was measured from.
    pub ampid: i64,
    /// Arrival identifier.
    pub arid: i64,
    /// Origin identifier.
    pub orid: i64,
    /// Event identifier.
    pub evid: i64,
    /// Station code.
    pub sta: String,
    /// Phase name (e.g. `"P"`, `"LR"`).
    pub phase: String,
    /// Station-to-event distance in arc degrees. Recomputed by the driver
    /// on every invocation.
    pub delta: f64,
    /// Magnitude type.
    pub magtype: String,
    /// Station magnitude value.
    pub magnitude: f64,
    /// Combined model plus measurement error.
    pub uncertainty: f64,
    /// A posteriori residual against the network magnitude.
    pub magres: f64,
    /// Magnitude defining state: `'d'` defining, `'n'` non-defining.
    pub magdef: char,
    /// Name of the magnitude correction model applied.
    pub mmodel: String,
    /// Authorship tag.
    pub auth: String,
}

impl Default for Stamag {
    fn default() -> Self {
        Self {
            magid: NA_ID,
            ampid: NA_ID,
            arid: NA_ID,
            orid: NA_ID,
            evid: NA_ID,
            sta: "-".to_string(),
            phase: "-".to_string(),
            delta: -1.0,
            magtype: "-".to_string(),
            magnitude: NA_MAGNITUDE,
            uncertainty: NA_UNCERTAINTY,
            magres: NA_RESIDUAL,
            magdef: '-',
            mmodel: "-".to_string(),
            auth: "-".to_string(),
        }
    }
}

/// One signal amplitude measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Amplitude {
    /// Amplitude identifier.
    pub ampid: i64,
    /// Arrival identifier (detection-based measurements).
    pub arid: i64,
    /// Predicted-arrival identifier (event-based measurements).
    pub parid: i64,
    /// Channel code.
    pub chan: String,
    /// Measured amplitude (nm). Negative means not measured.
    pub amp: f64,
    /// Measured period (s). Negative means no period dependency.
    pub per: f64,
    /// Signal-to-noise ratio.
    pub snr: f64,
    /// Amplitude type (e.g. `"A5/2"`, `"hppn"`).
    pub amptype: String,
    /// Measurement duration (s), used for duration magnitudes.
    pub duration: f64,
    /// Clip flag: `"c"` marks a clipped measurement.
    #[serde(default)]
    pub clip: String,
}

impl Default for Amplitude {
    fn default() -> Self {
        Self {
            ampid: NA_ID,
            arid: NA_ID,
            parid: NA_ID,
            chan: "-".to_string(),
            amp: -1.0,
            per: -1.0,
            snr: -1.0,
            amptype: "-".to_string(),
            duration: -1.0,
            clip: "-".to_string(),
        }
    }
}

/// Arrival-to-origin association record for detection-based amplitudes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assoc {
    /// Arrival identifier.
    pub arid: i64,
    /// Origin identifier.
    pub orid: i64,
    /// Station code.
    pub sta: String,
    /// Associated phase name.
    pub phase: String,
    /// Station-to-event distance in arc degrees.
    pub delta: f64,
}

/// Predicted arrival record, substituting for an association on event-based
/// amplitudes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parrival {
    /// Predicted arrival identifier.
    pub parid: i64,
    /// Origin identifier.
    pub orid: i64,
    /// Event identifier.
    pub evid: i64,
    /// Station code.
    pub sta: String,
    /// Predicted phase name.
    pub phase: String,
}

/// Signal class of one amplitude observation, fixing its contribution type
/// in the network estimators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalClass {
    /// A measured signal amplitude.
    MeasSignal,
    /// A clipped measurement: an upper bound on the true amplitude.
    Clipped,
    /// A noise measurement at a non-detecting station: a lower bound.
    NonDetect,
}
