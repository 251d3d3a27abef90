use net_magnitude_lib::auxilary::{approx_equal, valid_magnitude};
use net_magnitude_lib::driver::MagParams;
use net_magnitude_lib::facilities::MagFacilities;
use net_magnitude_lib::records::{Amplitude, Assoc, Netmag, Origin, Parrival, SignalClass, Site, Stamag};
use net_magnitude_lib::writers::magnitude_rows;
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
        Site::new("STA5", 0.0, 70.0, 0.0),
        Site::new("FAR", 0.0, 110.0, 0.0),
        Site::new("EVS1", 0.0, 100.0, 0.0),
        Site::new("EVS2", 0.0, 120.0, 0.0),
    ]
}

fn magtypes() -> Vec<String> {
    vec!["mb".to_string(), "ML".to_string(), "mbh".to_string()]
}

fn setup() -> MagFacilities {
    MagFacilities::setup(Path::new(TLSF), Path::new(MDF), &magtypes(), &sites()).unwrap()
}

fn origin() -> Origin {
    Origin::new(0.0, 0.0, 0.0, 100, 10)
}

fn det_amp(ampid: i64, arid: i64, amptype: &str, amp: f64, per: f64) -> Amplitude {
    Amplitude {
        ampid,
        arid,
        amp,
        per,
        snr: 10.0,
        amptype: amptype.to_string(),
        chan: "sz".to_string(),
        ..Amplitude::default()
    }
}

fn ev_amp(ampid: i64, parid: i64, amptype: &str, amp: f64, per: f64) -> Amplitude {
    Amplitude {
        ampid,
        parid,
        amp,
        per,
        snr: 2.0,
        amptype: amptype.to_string(),
        chan: "sz".to_string(),
        ..Amplitude::default()
    }
}

fn assoc(arid: i64, sta: &str, delta: f64) -> Assoc {
    Assoc {
        arid,
        orid: 100,
        sta: sta.to_string(),
        phase: "P".to_string(),
        delta,
    }
}

fn parrival(parid: i64, sta: &str) -> Parrival {
    Parrival {
        parid,
        orid: 100,
        evid: 10,
        sta: sta.to_string(),
        phase: "P".to_string(),
    }
}

/// Amplitude whose log10 is exactly 0.8 (with a unit period).
fn amp08() -> f64 {
    10f64.powf(0.8)
}

#[test]
fn pure_signal_network_average() {
    let mut facilities = setup();
    let mut origin = origin();

    // Stations at 30, 50 and 40 degrees with corrections 3.3, 3.5, 3.4
    // yield station magnitudes 4.1, 4.3 and 4.2.
    let amps = vec![
        det_amp(1, 1, "A5/2", amp08(), 1.0),
        det_amp(2, 2, "A5/2", amp08(), 1.0),
        det_amp(3, 3, "A5/2", amp08(), 1.0),
    ];
    let assocs = vec![
        assoc(1, "STA1", 30.0),
        assoc(2, "STA2", 50.0),
        assoc(3, "STA3", 40.0),
    ];

    let types = vec!["mb".to_string()];
    let mut magnitudes =
        facilities.build_mag_obj(&types, &origin, &[], &[], &amps, &[], &assocs, &[]);
    assert_eq!(magnitudes.len(), 1);
    assert_eq!(magnitudes[0].count(), 3);
    assert!(magnitudes[0].netmag.magid < 0);
    assert!(magnitudes[0]
        .stamags
        .iter()
        .all(|sm| sm.auth == "build_mag_obj" && sm.magdef == 'd'));
    assert!(magnitudes[0]
        .aux
        .iter()
        .all(|aux| aux.detect_based && aux.sig_type == SignalClass::MeasSignal));

    let params = MagParams {
        net: "TEST".to_string(),
        magtype_to_origin_mb: "mb".to_string(),
        ..MagParams::default()
    };
    let computed = facilities
        .calc_mags(&mut magnitudes, &mut origin, &params)
        .unwrap();
    assert_eq!(computed, 1);

    let magn = &magnitudes[0];
    assert!(magn.mag_computed);
    assert!(magn.mag_write);
    assert!(approx_equal(magn.netmag.magnitude, 4.2, EPSILON));
    // Sample stdev 0.1 clamps to 0.2; uncertainty of the mean follows.
    assert!(approx_equal(
        magn.netmag.uncertainty,
        0.2 / 3.0_f64.sqrt(),
        1e-4
    ));
    assert_eq!(magn.netmag.nsta, 3);
    assert_eq!(magn.netmag.net, "TEST");

    // The configured origin slot is fed.
    assert!(approx_equal(origin.mb, 4.2, EPSILON));
    assert_eq!(origin.mbid, magn.netmag.magid);

    // Residuals are centred on the network magnitude.
    for sm in &magn.stamags {
        assert!(sm.magres.abs() < 0.11);
    }

    let rows = magnitude_rows(&magnitudes);
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.magtype == "mb" && r.magdef == 'd'));
}

#[test]
fn out_of_range_station_is_demoted_but_kept() {
    let mut facilities = setup();
    let mut origin = origin();

    let amps = vec![
        det_amp(1, 1, "A5/2", amp08(), 1.0),
        det_amp(2, 2, "A5/2", amp08(), 1.0),
        det_amp(3, 3, "A5/2", amp08(), 1.0),
        det_amp(4, 4, "A5/2", amp08(), 1.0),
    ];
    let assocs = vec![
        assoc(1, "STA1", 30.0),
        assoc(2, "STA2", 50.0),
        assoc(3, "STA3", 40.0),
        assoc(4, "FAR", 110.0),
    ];

    let types = vec!["mb".to_string()];
    let mut magnitudes =
        facilities.build_mag_obj(&types, &origin, &[], &[], &amps, &[], &assocs, &[]);
    assert_eq!(magnitudes[0].count(), 4);

    let params = MagParams::default();
    facilities
        .calc_mags(&mut magnitudes, &mut origin, &params)
        .unwrap();

    let magn = &magnitudes[0];
    // FAR sits at 110 degrees, beyond dist_max = 105: excluded from the
    // network mean yet its station magnitude was computed successfully.
    let far = magn.stamags.iter().find(|sm| sm.sta == "FAR").unwrap();
    assert_eq!(far.magdef, 'n');
    assert!(valid_magnitude(far.magnitude));
    assert!(approx_equal(magn.netmag.magnitude, 4.2, EPSILON));
    assert_eq!(magn.netmag.nsta, 3);
}

#[test]
fn hole_distance_sentinels_the_station_magnitude() {
    let mut facilities = setup();
    let mut origin = origin();

    // STA4 at 45 degrees falls inside the [30, 90] hole of the mbh grid;
    // EVS2 at 120 degrees interpolates normally.
    let amps = vec![
        det_amp(11, 11, "hpp", amp08(), 1.0),
        det_amp(12, 12, "hpp", amp08(), 1.0),
    ];
    let assocs = vec![assoc(11, "STA4", 45.0), assoc(12, "EVS2", 120.0)];

    let types = vec!["mbh".to_string()];
    let mut magnitudes =
        facilities.build_mag_obj(&types, &origin, &[], &[], &amps, &[], &assocs, &[]);
    assert_eq!(magnitudes[0].count(), 2);

    let params = MagParams::default();
    facilities
        .calc_mags(&mut magnitudes, &mut origin, &params)
        .unwrap();

    let magn = &magnitudes[0];
    let hole = magn.stamags.iter().find(|sm| sm.sta == "STA4").unwrap();
    assert_eq!(hole.magdef, 'n');
    assert!(!valid_magnitude(hole.magnitude));

    // The surviving signal drives a single-datum MLE with the baseline
    // standard deviation.
    assert!(magn.mag_computed);
    assert!(approx_equal(magn.netmag.magnitude, 0.8 + 4.2, 1e-3));
    assert_eq!(magn.netmag.nsta, 1);
}

#[test]
fn upper_bound_magnitudes_are_suppressed_until_enabled() {
    let mut facilities = setup();
    let mut origin = origin();

    // Event-based noise amplitudes only: lower bounds at 4.8 and 5.0.
    let amps = vec![
        ev_amp(21, 21, "hppn", amp08(), 1.0),
        ev_amp(22, 22, "hppn", amp08(), 1.0),
    ];
    let parrivals = vec![parrival(21, "EVS1"), parrival(22, "EVS2")];

    let types = vec!["mbh".to_string()];
    let mut magnitudes =
        facilities.build_mag_obj(&types, &origin, &[], &[], &[], &amps, &[], &parrivals);
    assert_eq!(magnitudes[0].count(), 2);
    assert!(magnitudes[0]
        .aux
        .iter()
        .all(|aux| !aux.detect_based && aux.sig_type == SignalClass::NonDetect));

    let params = MagParams::default();
    let computed = facilities
        .calc_mags(&mut magnitudes, &mut origin, &params)
        .unwrap();
    // Upper-bound reporting defaults to off: nothing is persisted.
    assert_eq!(computed, 0);
    assert!(!magnitudes[0].mag_computed);
    assert!(!magnitudes[0].mag_write);

    facilities.set_compute_upper_bounds(true);
    let computed = facilities
        .calc_mags(&mut magnitudes, &mut origin, &params)
        .unwrap();
    assert_eq!(computed, 1);
    let magn = &magnitudes[0];
    assert!(magn.mag_computed);
    // The bound-only estimate sits below the quietest non-detection.
    assert!(valid_magnitude(magn.netmag.magnitude));
    assert!(magn.netmag.magnitude < 4.8);
    assert_eq!(magn.netmag.nsta, 2);
}

#[test]
fn outlier_screening_is_idempotent() {
    let mut facilities = setup();
    let mut origin = origin();

    // Three consistent stations plus one 6.0 outlier at STA5 (70 degrees,
    // correction 3.7).
    let outlier_amp = 10f64.powf(6.0 - 3.7);
    let amps = vec![
        det_amp(1, 1, "A5/2", amp08(), 1.0),
        det_amp(2, 2, "A5/2", amp08(), 1.0),
        det_amp(3, 3, "A5/2", amp08(), 1.0),
        det_amp(5, 5, "A5/2", outlier_amp, 1.0),
    ];
    let assocs = vec![
        assoc(1, "STA1", 30.0),
        assoc(2, "STA2", 50.0),
        assoc(3, "STA3", 40.0),
        assoc(5, "STA5", 70.0),
    ];

    let types = vec!["mb".to_string()];
    let mut magnitudes =
        facilities.build_mag_obj(&types, &origin, &[], &[], &amps, &[], &assocs, &[]);

    let params = MagParams {
        ignore_large_res: true,
        large_res_mult: 3.0,
        ..MagParams::default()
    };
    facilities
        .calc_mags(&mut magnitudes, &mut origin, &params)
        .unwrap();

    let partition: Vec<char> = magnitudes[0].stamags.iter().map(|sm| sm.magdef).collect();
    let sta5 = magnitudes[0].stamags.iter().find(|sm| sm.sta == "STA5").unwrap();
    assert_eq!(sta5.magdef, 'n');
    assert!(approx_equal(magnitudes[0].netmag.magnitude, 4.2, EPSILON));
    assert_eq!(magnitudes[0].netmag.nsta, 3);

    // A second pass over the same event reproduces the partition and the
    // network magnitude; the demoted record stays demoted.
    facilities
        .calc_mags(&mut magnitudes, &mut origin, &params)
        .unwrap();
    let partition2: Vec<char> = magnitudes[0].stamags.iter().map(|sm| sm.magdef).collect();
    assert_eq!(partition, partition2);
    assert!(approx_equal(magnitudes[0].netmag.magnitude, 4.2, EPSILON));
}

#[test]
fn existing_records_are_reused() {
    let mut facilities = setup();
    let origin = origin();

    let amps = vec![det_amp(1, 1, "A5/2", amp08(), 1.0)];
    let assocs = vec![assoc(1, "STA1", 30.0)];
    let existing_stamag = Stamag {
        ampid: 1,
        arid: 1,
        sta: "STA1".to_string(),
        phase: "P".to_string(),
        magtype: "mb".to_string(),
        magdef: 'd',
        auth: "analyst".to_string(),
        ..Stamag::default()
    };
    let existing_netmag = Netmag {
        magid: 555,
        magtype: "mb".to_string(),
        ..Netmag::default()
    };

    let types = vec!["mb".to_string()];
    let magnitudes = facilities.build_mag_obj(
        &types,
        &origin,
        &[existing_netmag],
        &[existing_stamag],
        &amps,
        &[],
        &assocs,
        &[],
    );
    let magn = &magnitudes[0];
    assert_eq!(magn.count(), 1);
    assert_eq!(magn.netmag.magid, 555);
    assert_eq!(magn.stamags[0].magid, 555);
    assert_eq!(magn.stamags[0].auth, "analyst");
}

#[test]
fn placeholder_magids_decrement_across_builds() {
    let mut facilities = setup();
    let origin = origin();

    let amps = vec![det_amp(1, 1, "A5/2", amp08(), 1.0)];
    let assocs = vec![assoc(1, "STA1", 30.0)];

    let types = vec!["mb".to_string()];
    let first = facilities.build_mag_obj(&types, &origin, &[], &[], &amps, &[], &assocs, &[]);
    let second = facilities.build_mag_obj(&types, &origin, &[], &[], &amps, &[], &assocs, &[]);
    assert!(first[0].netmag.magid < 0);
    assert_eq!(second[0].netmag.magid, first[0].netmag.magid - 1);
}

#[test]
fn unknown_and_empty_types_yield_empty_objects() {
    let mut facilities = setup();
    let mut origin = origin();

    let types = vec!["mw".to_string(), "ML".to_string()];
    let mut magnitudes =
        facilities.build_mag_obj(&types, &origin, &[], &[], &[], &[], &[], &[]);
    assert_eq!(magnitudes.len(), 2);
    assert!(magnitudes[0].control.is_none());
    assert_eq!(magnitudes[0].count(), 0);
    assert!(magnitudes[1].control.is_some());
    assert_eq!(magnitudes[1].count(), 0);

    let computed = facilities
        .calc_mags(&mut magnitudes, &mut origin, &MagParams::default())
        .unwrap();
    assert_eq!(computed, 0);
}

#[test]
fn builder_rejects_invalid_phase_and_range() {
    let mut facilities = setup();
    let origin = origin();

    // ML tables stop at 20 degrees and accept Pg/Lg only; a P arrival at
    // 30 degrees produces no stub.
    let amps = vec![det_amp(31, 31, "SBSNR", amp08(), 1.0)];
    let assocs = vec![assoc(31, "STA1", 30.0)];
    let types = vec!["ML".to_string()];
    let magnitudes =
        facilities.build_mag_obj(&types, &origin, &[], &[], &amps, &[], &assocs, &[]);
    assert_eq!(magnitudes[0].count(), 0);
}

#[test]
fn clip_flags_tag_the_signal_class() {
    let mut facilities = setup();
    let origin = origin();

    let mut clipped = det_amp(41, 41, "hpp", amp08(), 1.0);
    clipped.clip = "c".to_string();
    let amps = vec![clipped, det_amp(42, 42, "hpp", amp08(), 1.0)];
    let assocs = vec![assoc(41, "STA1", 30.0), assoc(42, "EVS2", 120.0)];

    let types = vec!["mbh".to_string()];
    let magnitudes =
        facilities.build_mag_obj(&types, &origin, &[], &[], &amps, &[], &assocs, &[]);
    let aux = &magnitudes[0].aux;
    assert_eq!(aux[0].sig_type, SignalClass::Clipped);
    assert!(aux[0].clipped);
    assert_eq!(aux[1].sig_type, SignalClass::MeasSignal);
}
