//! Reference networks shared by tests, demos and benchmarks.

use num_complex::Complex64;

use crate::basic::elements::{
    Bundle, Conductor, GeneratorParams, LineParams, PhaseGeometry, TransformerParams,
};
use crate::basic::error::PfResult;
use crate::basic::system::{BranchPrimitive, Network, NetworkBuilder};

/// Bus1 slack at 1.0∠0 feeding a 50 MW / 20 MVAr load at Bus2 through
/// 0.02 + j0.08 p.u. on a 100 MVA base.
pub fn two_bus() -> PfResult<Network> {
    let mut builder = NetworkBuilder::new("two_bus", 100.0);
    builder.add_bus("Bus1", 230.0)?.add_bus("Bus2", 230.0)?;
    builder.add_branch(
        "Line1",
        BranchPrimitive::series("Bus1", "Bus2", Complex64::new(0.02, 0.08))?,
    )?;
    builder.add_generator("G1", "Bus1", GeneratorParams::voltage_controlled(0.0, 1.0))?;
    builder.add_load("Load2", "Bus2", 50.0, 20.0)?;
    builder.set_slack_bus("Bus1")?;
    builder.build()
}

/// Two-conductor Partridge bundle, 1.5 ft between subconductors.
pub fn partridge_bundle() -> Bundle {
    Bundle {
        conductor: Conductor {
            name: "Partridge".into(),
            diameter_in: 0.642,
            gmr_ft: 0.0217,
            r_ohm_per_mile: 0.385,
        },
        count: 2,
        spacing_ft: 1.5,
    }
}

/// 60 Hz overhead line of Partridge bundles with 18.5 ft flat phase spacing.
pub fn partridge_line(length_km: f64) -> PfResult<LineParams> {
    LineParams::from_geometry(
        &partridge_bundle(),
        &PhaseGeometry::flat(18.5),
        60.0,
        length_km,
    )
}

/// Seven-bus, 230 kV system with two 20 kV generator buses.
///
/// G1 at Bus1 is the slack, G2 at Bus7 regulates its terminal at 1.0 p.u.
/// while delivering 200 MW. Both machines have X″ = 0.12 p.u.
pub fn seven_bus_builder() -> PfResult<NetworkBuilder> {
    let mut builder = NetworkBuilder::new("seven_bus", 100.0);
    builder.add_bus("Bus1", 20.0)?;
    for name in ["Bus2", "Bus3", "Bus4", "Bus5", "Bus6"] {
        builder.add_bus(name, 230.0)?;
    }
    builder.add_bus("Bus7", 20.0)?;

    for (name, from, to, km) in [
        ("Line1", "Bus2", "Bus4", 16.093),
        ("Line2", "Bus2", "Bus3", 40.234),
        ("Line3", "Bus3", "Bus5", 32.187),
        ("Line4", "Bus4", "Bus6", 32.187),
        ("Line5", "Bus5", "Bus6", 16.093),
        ("Line6", "Bus4", "Bus5", 56.327),
    ] {
        builder.add_line(name, from, to, partridge_line(km)?)?;
    }
    builder.add_transformer(
        "T1",
        "Bus1",
        "Bus2",
        TransformerParams::from_impedance_percent(125.0, 8.5, 10.0),
    )?;
    builder.add_transformer(
        "T2",
        "Bus6",
        "Bus7",
        TransformerParams::from_impedance_percent(200.0, 10.5, 12.0),
    )?;

    builder.add_generator(
        "G1",
        "Bus1",
        GeneratorParams::voltage_controlled(0.0, 1.0).with_subtransient(0.12, None),
    )?;
    builder.add_generator(
        "G2",
        "Bus7",
        GeneratorParams::voltage_controlled(200.0, 1.0).with_subtransient(0.12, None),
    )?;
    builder.set_slack_bus("Bus1")?;

    builder.add_load("L1", "Bus3", 110.0, 50.0)?;
    builder.add_load("L2", "Bus4", 100.0, 70.0)?;
    builder.add_load("L3", "Bus5", 100.0, 65.0)?;
    Ok(builder)
}

pub fn seven_bus() -> PfResult<Network> {
    seven_bus_builder()?.build()
}
