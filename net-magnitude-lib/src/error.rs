//! Error types for transmission-loss and magnitude processing.
//!
//! Two closed error spaces exist, mirroring the external error-code tables:
//! transmission-loss (TL) codes 0-8 and magnitude codes 0-7. The numeric
//! codes and their canonical messages are part of the external interface, so
//! both enums carry bi-directional maps and the message lookup is available
//! by code as well.

use thiserror::Error;

/// Errors raised while loading or accessing transmission-loss information.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TlError {
    /// A requested TL grid file was not found. Loaders treat this as a
    /// warning and continue without the affected phase.
    #[error("TLreadWarn1: A requested TL file was not found!")]
    MissingTable,
    /// The TL specification file could not be opened.
    #[error("TLreadErr1: Cannot open TLSF!")]
    SpecOpen,
    /// The TL specification file is ill-formed.
    #[error("TLreadErr2: TLSF incorrectly formatted!")]
    SpecFormat,
    /// No TL table could be loaded at all.
    #[error("TLreadErr3: No TL tables could be found!")]
    NoTables,
    /// A TL grid file is ill-formed.
    #[error("TLreadErr4: TL table incorrectly formatted!")]
    TableFormat,
    /// A modelling-error block is ill-formed.
    #[error("TLreadErr5: TL modelling error table incorrectly formatted!")]
    ModelErrorFormat,
    /// A test-site correction file is ill-formed.
    #[error("TLreadErr6: TL test-site corr. file incorrectly formatted!")]
    TestSiteFormat,
    /// Storage for TL information could not be allocated.
    #[error("TLreadErr7: Error allocating memory while reading TL info!")]
    Allocation,
}

impl TlError {
    /// The numeric code of this error in the external TL error table.
    pub fn code(&self) -> i32 {
        match self {
            TlError::MissingTable => 1,
            TlError::SpecOpen => 2,
            TlError::SpecFormat => 3,
            TlError::NoTables => 4,
            TlError::TableFormat => 5,
            TlError::ModelErrorFormat => 6,
            TlError::TestSiteFormat => 7,
            TlError::Allocation => 8,
        }
    }

    /// The error belonging to a numeric TL code, if any. Code 0 denotes
    /// success and has no error value.
    pub fn from_code(code: i32) -> Option<TlError> {
        match code {
            1 => Some(TlError::MissingTable),
            2 => Some(TlError::SpecOpen),
            3 => Some(TlError::SpecFormat),
            4 => Some(TlError::NoTables),
            5 => Some(TlError::TableFormat),
            6 => Some(TlError::ModelErrorFormat),
            7 => Some(TlError::TestSiteFormat),
            8 => Some(TlError::Allocation),
            _ => None,
        }
    }
}

/// Errors raised while loading magnitude descriptors or driving magnitude
/// computations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MagError {
    /// The magnitude descriptor file could not be opened.
    #[error("MDreadErr1: Cannot open MDF!")]
    DescriptorOpen,
    /// The magnitude descriptor file is ill-formed.
    #[error("MDreadErr2: MDF incorrectly formatted!")]
    DescriptorFormat,
    /// A TL type referenced by the MDF was never specified in the TLSF.
    #[error("MDreadErr3: No matching TLtype found for info specified in TLSF!")]
    NoMatchingTlType,
    /// Storage for magnitude information could not be allocated.
    #[error("MDreadErr4: Error allocating memory while reading mag info!")]
    Allocation,
    /// The station link table cannot be built without a site roster.
    #[error("SSgetErr1: No input site table info available for Sta_Pt!")]
    SiteMissing,
    /// Storage for the station link table could not be allocated.
    #[error("SSgetErr2: Error allocating memory while trying to set Sta_Pt info!")]
    StationLinkAllocation,
    /// The station link table could not be set at all.
    #[error("NetMagErrX: Cannot set Sta_Pt structure!  Site table likely missing!")]
    StationLinks,
    /// A magnitude type unknown to the descriptor store was requested. Not
    /// part of the numeric code table; maps to the generic code -1.
    #[error("unknown magtype: {0}")]
    UnknownMagtype(String),
    /// Weighted averaging was requested but a defining signal carries no
    /// positive weight. Not part of the numeric code table.
    #[error("{magtype} weighted average desired, but no {sta} station weights available!")]
    NoStationWeight { magtype: String, sta: String },
    /// A standard-deviation override would violate sglim1 <= sgbase <= sglim2.
    /// Not part of the numeric code table.
    #[error("std dev settings for {0} must satisfy sglim1 <= sgbase <= sglim2")]
    InvalidSdSettings(String),
}

impl MagError {
    /// The numeric code of this error in the external magnitude error table,
    /// or -1 for conditions outside the table.
    pub fn code(&self) -> i32 {
        match self {
            MagError::DescriptorOpen => 1,
            MagError::DescriptorFormat => 2,
            MagError::NoMatchingTlType => 3,
            MagError::Allocation => 4,
            MagError::SiteMissing => 5,
            MagError::StationLinkAllocation => 6,
            MagError::StationLinks => 7,
            _ => -1,
        }
    }

    /// The error belonging to a numeric magnitude code, if any.
    pub fn from_code(code: i32) -> Option<MagError> {
        match code {
            1 => Some(MagError::DescriptorOpen),
            2 => Some(MagError::DescriptorFormat),
            3 => Some(MagError::NoMatchingTlType),
            4 => Some(MagError::Allocation),
            5 => Some(MagError::SiteMissing),
            6 => Some(MagError::StationLinkAllocation),
            7 => Some(MagError::StationLinks),
            _ => None,
        }
    }
}

/// Error of a combined facilities setup, which reads both the magnitude
/// descriptor file and the TL specification file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error(transparent)]
    Tl(#[from] TlError),
    #[error(transparent)]
    Mag(#[from] MagError),
}

const TL_SUCCESS_MSG: &str = "TL: Successful TL condition!";
const TL_OUT_OF_RANGE_MSG: &str = "TL: Input error code is out-of-range!";
const MAG_SUCCESS_MSG: &str = "Magnitude: Successful magnitude computed!";
const MAG_OUT_OF_RANGE_MSG: &str = "Magnitude: Input error code is out-of-range!";

/// The canonical message for a numeric TL error code.
///
/// Out-of-range codes yield a generic out-of-range message, code 0 the
/// success message.
pub fn tl_error_message(code: i32) -> String {
    match code {
        0 => TL_SUCCESS_MSG.to_string(),
        _ => match TlError::from_code(code) {
            Some(err) => err.to_string(),
            None => TL_OUT_OF_RANGE_MSG.to_string(),
        },
    }
}

/// The canonical message for a numeric magnitude error code.
pub fn mag_error_message(code: i32) -> String {
    match code {
        0 => MAG_SUCCESS_MSG.to_string(),
        _ => match MagError::from_code(code) {
            Some(err) => err.to_string(),
            None => MAG_OUT_OF_RANGE_MSG.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tl_codes_round_trip() {
        for code in 1..=8 {
            let err = TlError::from_code(code).unwrap();
            assert_eq!(err.code(), code);
        }
        assert!(TlError::from_code(0).is_none());
        assert!(TlError::from_code(9).is_none());
    }

    #[test]
    fn mag_codes_round_trip() {
        for code in 1..=7 {
            let err = MagError::from_code(code).unwrap();
            assert_eq!(err.code(), code);
        }
        assert!(MagError::from_code(8).is_none());
    }

    #[test]
    fn tl_message_lookup() {
        assert!(tl_error_message(0).contains("Successful"));
        assert!(tl_error_message(1).starts_with("TLreadWarn1"));
        assert!(tl_error_message(5).starts_with("TLreadErr4"));
        assert!(tl_error_message(42).contains("out-of-range"));
        assert!(tl_error_message(-3).contains("out-of-range"));
    }

    #[test]
    fn mag_message_lookup() {
        assert!(mag_error_message(0).contains("Successful"));
        assert!(mag_error_message(2).starts_with("MDreadErr2"));
        assert!(mag_error_message(7).starts_with("NetMagErrX"));
        assert!(mag_error_message(99).contains("out-of-range"));
    }

    #[test]
    fn extra_variants_have_generic_code() {
        let err = MagError::UnknownMagtype("mx".to_string());
        assert_eq!(err.code(), -1);
        let err = MagError::NoStationWeight {
            magtype: "mb".to_string(),
            sta: "ARCES".to_string(),
        };
        assert_eq!(err.code(), -1);
        assert!(err.to_string().contains("ARCES"));
    }
}
