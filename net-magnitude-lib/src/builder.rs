//! Magnitude object construction.
//!
//! For each requested magnitude type the builder groups pre-existing network
//! and station magnitude records with new records synthesised for amplitudes
//! not yet assigned to one. New station magnitude records are only created
//! when the associated phase is acceptable for the type's transmission-loss
//! tables and the station's distance/depth lies inside the table range; they
//! are stamped with the origin and event identifiers and the author tag
//! `build_mag_obj`.
//!
//! The returned objects are owned by the caller; the driver consumes them
//! in place.

use crate::auxilary::NA_ID;
use crate::facilities::MagFacilities;
use crate::mdf::{Algorithm, MagControl};
use crate::records::{Amplitude, Assoc, Netmag, Origin, Parrival, SignalClass, Stamag};
use log::warn;

/// Auxiliary per-station information carried alongside each station
/// magnitude record.
#[derive(Debug, Clone, Copy)]
pub struct SmAux {
    /// True for detection-based records, false for event-based ones.
    pub detect_based: bool,
    /// True when an operator fixed the defining state by hand; automatic
    /// screening must not override it.
    pub manual_override: bool,
    /// True when the amplitude carries a clip flag.
    pub clipped: bool,
    /// Signal class derived from the two flags above.
    pub sig_type: SignalClass,
    /// Station weighting (combined standard error), filled by the driver.
    pub wt: f64,
}

/// The per-magnitude-type working set: one network magnitude record plus
/// parallel arrays of station magnitudes, amplitudes and auxiliary data.
#[derive(Debug, Clone)]
pub struct Magnitude {
    /// Was a network magnitude successfully computed?
    pub mag_computed: bool,
    /// The network magnitude failed, but surviving station magnitude
    /// records should still be persisted.
    pub mag_write: bool,
    /// Control snapshot for the magnitude type; None when the type is not
    /// described in the MDF.
    pub control: Option<MagControl>,
    /// The singular network magnitude record.
    pub netmag: Netmag,
    pub stamags: Vec<Stamag>,
    pub amplitudes: Vec<Amplitude>,
    pub aux: Vec<SmAux>,
}

impl Magnitude {
    fn empty(control: Option<MagControl>) -> Self {
        Self {
            mag_computed: false,
            mag_write: false,
            control,
            netmag: Netmag::default(),
            stamags: Vec::new(),
            amplitudes: Vec::new(),
            aux: Vec::new(),
        }
    }

    /// Number of station magnitude entries.
    pub fn count(&self) -> usize {
        self.stamags.len()
    }
}

impl MagFacilities {
    /// Build the magnitude objects for the requested types.
    ///
    /// # Arguments
    ///
    /// * `magtypes` - Magnitude types to assemble, one object per entry.
    /// * `origin` - The event hypothesis the amplitudes belong to.
    /// * `netmags`, `stamags` - Pre-existing records to reuse.
    /// * `det_amplitudes` - Detection-based amplitude measurements.
    /// * `ev_amplitudes` - Event-based amplitude measurements, considered
    ///   only for types whose algorithm is not the plain network average.
    /// * `assocs` - Arrival associations for detection-based amplitudes.
    /// * `parrivals` - Predicted arrivals substituting for associations on
    ///   event-based amplitudes.
    #[allow(clippy::too_many_arguments)]
    pub fn build_mag_obj(
        &mut self,
        magtypes: &[String],
        origin: &Origin,
        netmags: &[Netmag],
        stamags: &[Stamag],
        det_amplitudes: &[Amplitude],
        ev_amplitudes: &[Amplitude],
        assocs: &[Assoc],
        parrivals: &[Parrival],
    ) -> Vec<Magnitude> {
        let mut out = Vec::with_capacity(magtypes.len());

        for magtype in magtypes {
            let Some(control) = self.get_magtype_features(magtype) else {
                warn!(
                    "magtype: {magtype} is not specified within MDF; \
                     hence, this magnitude cannot be computed!"
                );
                out.push(Magnitude::empty(None));
                continue;
            };
            let tltype = control.tltype.clone();

            let mut gathered_stamags: Vec<Stamag> = Vec::new();
            let mut gathered_amps: Vec<Amplitude> = Vec::new();
            let mut num_existing = 0usize;

            // Detection-based amplitudes: reuse the matching stamag where
            // one exists, otherwise synthesise a defining stub when phase
            // and range permit.
            for amp in det_amplitudes {
                let existing = stamags.iter().find(|sm| {
                    sm.ampid == amp.ampid
                        && sm.magtype == *magtype
                        && control.det_amptype == amp.amptype
                });
                if let Some(sm) = existing {
                    gathered_stamags.push(sm.clone());
                    gathered_amps.push(amp.clone());
                    num_existing += 1;
                    continue;
                }
                if control.det_amptype != amp.amptype {
                    continue;
                }
                let Some(assoc) = assocs.iter().rev().find(|a| a.arid == amp.arid) else {
                    continue;
                };
                let Some(delta) =
                    self.delta_for_station(&assoc.sta, origin.lat, origin.lon)
                else {
                    continue;
                };
                if delta > 0.0
                    && self.tl.valid_phase_for_type(&tltype, &assoc.phase)
                    && self.tl.valid_range_for_table(
                        &tltype,
                        &assoc.sta,
                        &assoc.phase,
                        &amp.chan,
                        assoc.delta,
                        origin.depth,
                    )
                {
                    gathered_stamags.push(new_stamag(magtype, origin, amp, assoc_sta(assoc), delta));
                    gathered_amps.push(amp.clone());
                }
            }
            let num_det_based = gathered_stamags.len();

            // Event-based amplitudes only matter to estimators that can use
            // bound observations.
            if control.algorithm != Algorithm::NetworkAverage {
                for amp in ev_amplitudes {
                    let existing = stamags.iter().find(|sm| {
                        sm.ampid == amp.ampid
                            && sm.magtype == *magtype
                            && control.ev_amptype == amp.amptype
                    });
                    if let Some(sm) = existing {
                        gathered_stamags.push(sm.clone());
                        gathered_amps.push(amp.clone());
                        num_existing += 1;
                        continue;
                    }
                    if control.ev_amptype != amp.amptype {
                        continue;
                    }
                    let Some(parrival) = parrivals.iter().rev().find(|p| p.parid == amp.parid)
                    else {
                        continue;
                    };
                    let Some(delta) =
                        self.delta_for_station(&parrival.sta, origin.lat, origin.lon)
                    else {
                        continue;
                    };
                    if delta > 0.0
                        && self.tl.valid_phase_for_type(&tltype, &parrival.phase)
                        && self.tl.valid_range_for_table(
                            &tltype,
                            &parrival.sta,
                            &parrival.phase,
                            &amp.chan,
                            delta,
                            origin.depth,
                        )
                    {
                        gathered_stamags.push(new_stamag(
                            magtype,
                            origin,
                            amp,
                            (&parrival.sta, &parrival.phase),
                            delta,
                        ));
                        gathered_amps.push(amp.clone());
                    }
                }
            }

            if gathered_stamags.is_empty() {
                out.push(Magnitude::empty(Some(control)));
                continue;
            }

            let mut magn = Magnitude::empty(Some(control));

            // Reuse an existing netmag record where any pre-existing stamag
            // was found; otherwise assign a placeholder magid.
            if num_existing > 0 {
                if let Some(netmag) = netmags.iter().rev().find(|nm| nm.magtype == *magtype) {
                    magn.netmag = netmag.clone();
                    for sm in gathered_stamags.iter_mut() {
                        sm.magid = netmag.magid;
                    }
                }
            }
            if magn.netmag.magid == NA_ID {
                self.next_magid -= 1;
                magn.netmag = Netmag {
                    evid: origin.evid,
                    orid: origin.orid,
                    magid: self.next_magid,
                    magtype: magtype.clone(),
                    ..Netmag::default()
                };
                for sm in gathered_stamags.iter_mut() {
                    sm.magid = self.next_magid;
                }
            }

            // Tag the auxiliary slots: the first num_det_based rows are
            // detection-based; clipped amplitudes carry a "c" flag.
            magn.aux = gathered_amps
                .iter()
                .enumerate()
                .map(|(j, amp)| {
                    let detect_based = j < num_det_based;
                    let clipped = amp.clip == "c";
                    let sig_type = if !detect_based {
                        SignalClass::NonDetect
                    } else if clipped {
                        SignalClass::Clipped
                    } else {
                        SignalClass::MeasSignal
                    };
                    SmAux {
                        detect_based,
                        manual_override: false,
                        clipped,
                        sig_type,
                        wt: 0.0,
                    }
                })
                .collect();

            magn.stamags = gathered_stamags;
            magn.amplitudes = gathered_amps;
            out.push(magn);
        }

        out
    }
}

fn assoc_sta(assoc: &Assoc) -> (&str, &str) {
    (&assoc.sta, &assoc.phase)
}

/// Synthesise a defining station magnitude stub for an unassigned amplitude.
fn new_stamag(
    magtype: &str,
    origin: &Origin,
    amp: &Amplitude,
    (sta, phase): (&str, &str),
    delta: f64,
) -> Stamag {
    Stamag {
        ampid: amp.ampid,
        arid: amp.arid,
        orid: origin.orid,
        evid: origin.evid,
        delta,
        sta: sta.to_string(),
        phase: phase.to_string(),
        magdef: 'd',
        magtype: magtype.to_string(),
        auth: "build_mag_obj".to_string(),
        ..Stamag::default()
    }
}
