use net_magnitude_lib::auxilary::approx_equal;
use net_magnitude_lib::error::{MagError, SetupError, TlError};
use net_magnitude_lib::facilities::MagFacilities;
use net_magnitude_lib::records::Site;
use net_magnitude_lib::station::AmpMeasure;
use std::path::Path;

const EPSILON: f64 = 1e-6;
const TLSF: &str = "tests/data/TLSF";
const MDF: &str = "tests/data/MDF";

fn sites() -> Vec<Site> {
    vec![
        Site::new("STA1", 0.0, 30.0, 0.0),
        Site::new("STA2", 0.0, 50.0, 0.0),
        Site::new("STA3", 0.0, 40.0, 0.0),
        Site::new("STA4", 0.0, 45.0, 0.0),
        Site::new("ABC", 0.0, 60.0, 0.0),
        Site::new("FAR", 0.0, 110.0, 0.0),
    ]
}

fn magtypes() -> Vec<String> {
    vec!["mb".to_string(), "ML".to_string(), "mbh".to_string()]
}

fn setup() -> MagFacilities {
    MagFacilities::setup(Path::new(TLSF), Path::new(MDF), &magtypes(), &sites()).unwrap()
}

#[test]
fn setup_loads_descriptors_and_tables() {
    let facilities = setup();
    assert_eq!(facilities.descriptors().len(), 3);
    // Three type bindings plus the ABC specialisation grid.
    assert_eq!(facilities.tl().tables().len(), 4);
    assert_eq!(facilities.tl().overrides().len(), 1);
}

#[test]
fn setup_errors_map_to_code_spaces() {
    let err = MagFacilities::setup(
        Path::new("tests/data/NO_SUCH_TLSF"),
        Path::new(MDF),
        &magtypes(),
        &sites(),
    )
    .unwrap_err();
    assert_eq!(err, SetupError::Tl(TlError::SpecOpen));

    let err = MagFacilities::setup(
        Path::new(TLSF),
        Path::new("tests/data/NO_SUCH_MDF"),
        &magtypes(),
        &sites(),
    )
    .unwrap_err();
    assert_eq!(err, SetupError::Mag(MagError::DescriptorOpen));
}

#[test]
fn resolve_uses_station_specialisation() {
    let facilities = setup();

    let res = facilities.tl().resolve("mb", "STA1", "P", "sz").unwrap();
    assert_eq!(facilities.tl().table(res.tl_index).model, "iasp91");
    assert!(res.stm_index.is_none());

    // ABC carries a phase-level override onto the regional model.
    let res = facilities.tl().resolve("mb", "ABC", "P", "sz").unwrap();
    assert_eq!(facilities.tl().table(res.tl_index).model, "regional");
    assert!(res.stm_index.is_some());

    // The override is phase-specific; Pn falls back to the default.
    let res = facilities.tl().resolve("mb", "ABC", "Pn", "sz").unwrap();
    assert_eq!(facilities.tl().table(res.tl_index).model, "iasp91");
}

#[test]
fn phase_validity_follows_the_specification() {
    let facilities = setup();
    assert!(facilities.tl().valid_phase_for_type("mb", "P"));
    assert!(facilities.tl().valid_phase_for_type("mb", "Pn"));
    assert!(!facilities.tl().valid_phase_for_type("mb", "Lg"));
    assert!(facilities.tl().valid_phase_for_type("ML", "Pg"));
    assert!(!facilities.tl().valid_phase_for_type("nope", "P"));
}

#[test]
fn range_validity_follows_the_table_sampling() {
    let facilities = setup();
    assert!(facilities
        .tl()
        .valid_range_for_table("ML", "STA1", "Pg", "-", 5.0, 0.0));
    assert!(!facilities
        .tl()
        .valid_range_for_table("ML", "STA1", "Pg", "-", 25.0, 0.0));
    assert!(facilities
        .tl()
        .valid_range_for_table("mb", "FAR", "P", "-", 110.0, 13.0));
}

#[test]
fn interpolation_is_exact_at_grid_nodes() {
    let facilities = setup();
    let res = facilities.tl().resolve("mb", "STA1", "P", "sz").unwrap();
    let out = facilities.tl().interpolate(res.tl_index, 30.0, 0.0, false);
    assert!(approx_equal(out.correction, 3.3, EPSILON));
    assert_eq!(out.code, 0);
    let out = facilities.tl().interpolate(res.tl_index, 90.0, 300.0, false);
    assert!(approx_equal(out.correction, 4.05, EPSILON));
}

#[test]
fn model_error_interpolates_the_distance_curve() {
    let facilities = setup();
    let res = facilities.tl().resolve("mb", "STA1", "P", "sz").unwrap();
    let (err, model) = facilities.tl().model_error(res.tl_index, 45.0, 0.0);
    assert!(approx_equal(err, 0.35, EPSILON));
    assert_eq!(model, "iasp91");
    // Clamped beyond the sampled distances.
    let (err, _) = facilities.tl().model_error(res.tl_index, 500.0, 0.0);
    assert!(approx_equal(err, 0.5, EPSILON));
}

#[test]
fn station_magnitude_decomposition() {
    let facilities = setup();
    let measure = AmpMeasure::new(10.0, 1.0, -1.0, 10.0);
    let info = facilities.station_magnitude(
        "mb", "STA1", "P", "sz", false, None, 30.0, 13.0, &measure,
    );
    assert!(info.is_valid());
    // log10(10/1) + (3.0 + 0.01 * 30 + 0.0005 * 13) + 0.0 bulk correction.
    let expected_corr = 3.3 + 0.0065;
    assert!(approx_equal(info.dist_depth_corr, expected_corr, EPSILON));
    assert!(approx_equal(info.sta_magnitude, 1.0 + expected_corr, EPSILON));
    assert!(approx_equal(info.total_mag_corr, expected_corr, EPSILON));
    assert!(approx_equal(info.bulk_corr, 0.0, EPSILON));
    // Combined error: sqrt(model^2 + meas^2 + bulk_err^2) with the distance
    // curve at 30 degrees and the DFAULT correction error.
    let model_error = 0.3 + (30.0 / 90.0) * 0.1;
    let combined = (model_error * model_error + 0.35_f64 * 0.35).sqrt();
    assert!(approx_equal(info.model_error, model_error, EPSILON));
    assert!(approx_equal(info.meas_error, 0.0, EPSILON));
    assert!(approx_equal(info.combined_error, combined, EPSILON));
    // First radial derivative of the linear grid is 0.01 per degree.
    assert!(approx_equal(info.derivs[0], 0.01, 1e-7));
    assert_eq!(info.model, "iasp91");
}

#[test]
fn station_magnitude_uses_station_correction_override() {
    let facilities = setup();
    let measure = AmpMeasure::new(10.0, 1.0, -1.0, 10.0);
    // ABC resolves onto the regional grid through its specialisation, so
    // the bulk correction comes from the descriptor default, not the ABC
    // station entry (station corrections pair with the default binding).
    let info = facilities.station_magnitude(
        "mb", "ABC", "Pn", "sz", false, None, 60.0, 0.0, &measure,
    );
    assert!(info.is_valid());
    assert!(approx_equal(info.bulk_corr, 0.12, EPSILON));
    assert!(approx_equal(info.bulk_corr_error, 0.2, EPSILON));
    assert!(approx_equal(info.sta_magnitude, 1.0 + 3.6 + 0.12, EPSILON));
}

#[test]
fn station_magnitude_sentinels_in_the_hole() {
    let facilities = setup();
    let measure = AmpMeasure::new(10.0, 1.0, -1.0, 10.0);
    let info = facilities.station_magnitude(
        "mbh", "STA4", "P", "sz", false, None, 45.0, 0.0, &measure,
    );
    assert!(!info.is_valid());
    assert!(info.error_code != 0);

    // Extrapolation bridges the hole from the valid side.
    let info = facilities.station_magnitude(
        "mbh", "STA4", "P", "sz", true, None, 45.0, 0.0, &measure,
    );
    assert!(info.is_valid());
}

#[test]
fn abbrev_matches_the_full_computation() {
    let facilities = setup();
    let measure = AmpMeasure::new(10.0, 1.0, -1.0, -1.0);
    let full = facilities.station_magnitude(
        "mb", "STA2", "P", "sz", false, None, 50.0, 0.0, &measure,
    );
    let abbrev =
        facilities.abbrev_station_magnitude("mb", "STA2", "P", "sz", 50.0, 0.0, 10.0, 1.0, -1.0);
    assert!(approx_equal(full.sta_magnitude, abbrev, EPSILON));
}

#[test]
fn unknown_magtype_returns_sentinel() {
    let facilities = setup();
    let measure = AmpMeasure::new(10.0, 1.0, -1.0, 10.0);
    let info = facilities.station_magnitude(
        "mw", "STA1", "P", "sz", false, None, 30.0, 0.0, &measure,
    );
    assert!(!info.is_valid());
}

#[test]
fn duration_magnitude_without_amp_and_period() {
    let facilities = setup();
    let measure = AmpMeasure::new(-1.0, -1.0, 100.0, -1.0);
    let info = facilities.station_magnitude(
        "mb", "STA1", "P", "sz", false, None, 30.0, 0.0, &measure,
    );
    // log10(duration) + correction.
    assert!(approx_equal(info.sta_magnitude, 2.0 + 3.3, EPSILON));
}

#[test]
fn overrides_revert_to_loaded_values() {
    let mut facilities = setup();
    let before = facilities.get_magtype_features("mb").unwrap();

    facilities.reset_sd_limits("mb", 0.1, 0.9).unwrap();
    facilities.reset_sd_baseline("mb", 0.5).unwrap();
    facilities.reset_min_dist("mb", 25.0).unwrap();
    facilities.reset_max_dist("mb", 95.0).unwrap();
    facilities
        .reset_amptypes("mb", "SBSNR", "hpsn")
        .unwrap();
    facilities
        .reset_algorithm("mb", net_magnitude_lib::mdf::Algorithm::Mle)
        .unwrap();
    facilities.reset_wgt_ave_flag("mb", true).unwrap();

    let changed = facilities.get_magtype_features("mb").unwrap();
    assert!(approx_equal(changed.sglim1, 0.1, EPSILON));
    assert!(approx_equal(changed.sgbase, 0.5, EPSILON));
    assert_eq!(changed.det_amptype, "SBSNR");
    assert!(changed.apply_wgt);

    facilities.revert_sd_limits("mb").unwrap();
    facilities.revert_sd_baseline("mb").unwrap();
    facilities.revert_min_dist("mb").unwrap();
    facilities.revert_max_dist("mb").unwrap();
    facilities.revert_amptypes("mb").unwrap();
    facilities.revert_algorithm("mb").unwrap();
    facilities.revert_wgt_ave_flag("mb").unwrap();

    let after = facilities.get_magtype_features("mb").unwrap();
    assert_eq!(after.det_amptype, before.det_amptype);
    assert_eq!(after.ev_amptype, before.ev_amptype);
    assert_eq!(after.algorithm, before.algorithm);
    assert!(approx_equal(after.dist_min, before.dist_min, EPSILON));
    assert!(approx_equal(after.dist_max, before.dist_max, EPSILON));
    assert!(approx_equal(after.sglim1, before.sglim1, EPSILON));
    assert!(approx_equal(after.sglim2, before.sglim2, EPSILON));
    assert!(approx_equal(after.sgbase, before.sgbase, EPSILON));
    assert_eq!(after.apply_wgt, before.apply_wgt);
}

#[test]
fn invalid_override_values_are_rejected() {
    let mut facilities = setup();
    // Baseline 0.30 would fall outside [0.4, 0.9].
    assert!(matches!(
        facilities.reset_sd_limits("mb", 0.4, 0.9),
        Err(MagError::InvalidSdSettings(_))
    ));
    // Baseline outside the current [0.2, 0.6] interval.
    assert!(matches!(
        facilities.reset_sd_baseline("mb", 0.9),
        Err(MagError::InvalidSdSettings(_))
    ));
    // Unknown magtype leaves everything untouched.
    assert!(matches!(
        facilities.reset_min_dist("mw", 10.0),
        Err(MagError::UnknownMagtype(_))
    ));
    let control = facilities.get_magtype_features("mb").unwrap();
    assert!(approx_equal(control.sglim1, 0.2, EPSILON));
    assert!(approx_equal(control.sgbase, 0.3, EPSILON));
}

#[test]
fn resetup_with_same_path_keeps_the_store() {
    let mut facilities = setup();
    facilities.set_compute_upper_bounds(true);
    let mut roster = sites();
    roster.push(Site::new("NEW", 10.0, 10.0, 0.0));
    facilities
        .resetup(Path::new(TLSF), Path::new(MDF), &magtypes(), &roster)
        .unwrap();
    assert!(facilities.compute_upper_bounds());
    assert!(facilities
        .delta_for_station("NEW", 0.0, 0.0)
        .is_some());
}

#[test]
fn delta_for_station_matches_the_equatorial_arc() {
    let facilities = setup();
    let delta = facilities.delta_for_station("STA2", 0.0, 0.0).unwrap();
    assert!(approx_equal(delta, 50.0, 1e-6));
    assert!(facilities.delta_for_station("NOPE", 0.0, 0.0).is_none());
}
