mod cmd_args;
use clap::Parser;
use net_magnitude_lib::driver::MagParams;
use net_magnitude_lib::facilities::MagFacilities;
use net_magnitude_lib::readers::{read_amplitudes, read_assocs, read_sites};
use net_magnitude_lib::records::Origin;
use net_magnitude_lib::writers::write_magnitude_results;

use crate::cmd_args::CmdArgs;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cmd_args = CmdArgs::parse();

    let delim = cmd_args.delimeter as u8;
    let sites = read_sites(&cmd_args.sites, delim)?;
    println!("Loaded {} sites from {}", sites.len(), cmd_args.sites.display());

    let amplitudes = read_amplitudes(&cmd_args.amplitudes, delim)?;
    let assocs = read_assocs(&cmd_args.arrivals, delim)?;
    println!(
        "Loaded {} amplitudes and {} associations",
        amplitudes.len(),
        assocs.len()
    );

    let mut facilities = MagFacilities::setup(
        &cmd_args.tlsf,
        &cmd_args.mdf,
        &cmd_args.magtypes,
        &sites,
    )
    .map_err(|e| format!("magnitude setup failed: {e}"))?;
    facilities.set_compute_upper_bounds(cmd_args.upper_bounds);

    let [lat, lon, depth] = cmd_args.event.as_slice() else {
        return Err("expected --event lat lon depth".into());
    };
    let mut origin = Origin::new(*lat, *lon, *depth, 1, 1);
    println!(
        "Event hypothesis: lat {lat:.3}  lon {lon:.3}  depth {depth:.1} km"
    );

    let mut magnitudes = facilities.build_mag_obj(
        &cmd_args.magtypes,
        &origin,
        &[],
        &[],
        &amplitudes,
        &[],
        &assocs,
        &[],
    );

    let params = MagParams {
        verbose: cmd_args.verbose,
        net: "CLI".to_string(),
        ..MagParams::default()
    };
    let computed = facilities
        .calc_mags(&mut magnitudes, &mut origin, &params)
        .map_err(|e| format!("magnitude computation failed: {e}"))?;

    for magn in &magnitudes {
        if magn.count() == 0 {
            continue;
        }
        println!(
            "{}: magnitude {:.3} +/- {:.3} from {} defining stations",
            magn.netmag.magtype,
            magn.netmag.magnitude,
            magn.netmag.uncertainty,
            magn.netmag.nsta
        );
    }
    println!("{computed} magnitudes computed");

    println!("Write magnitude rows to {}...", cmd_args.out_file);
    write_magnitude_results(&cmd_args.out_file, delim, &magnitudes)?;
    println!("Done");

    Ok(())
}
