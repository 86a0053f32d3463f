//! Network import from, and result export to, folders of CSV files.
//!
//! Static tables hold one row per entity (`buses.csv`, `generators.csv`,
//! `loads.csv`, `branches.csv`, `transport_links.csv`), `snapshots.csv`
//! lists snapshot names. Time-varying tables (`generators-p_max.csv`, ...)
//! have a `snapshot` column followed by one column per entity.

use crate::network::{
    BranchBuilder, BusBuilder, BusId, GeneratorBuilder, LoadBuilder, Network, TimeSeries,
    TransportLinkBuilder,
};
use anyhow::{format_err, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;
use std::path::Path;

fn one() -> f64 {
    1.0
}

fn minus_one() -> f64 {
    -1.0
}

#[derive(Deserialize)]
struct SnapshotRecord {
    name: String,
}

#[derive(Deserialize)]
struct BusRecord {
    name: String,
    #[serde(default = "one")]
    v_nom: f64,
}

#[derive(Deserialize)]
struct GeneratorRecord {
    name: String,
    bus: String,
    #[serde(default)]
    p_min: f64,
    p_max: f64,
    #[serde(default)]
    marginal_cost: f64,
    #[serde(default = "one")]
    sign: f64,
}

#[derive(Deserialize)]
struct LoadRecord {
    name: String,
    bus: String,
    #[serde(default)]
    p_set: f64,
    #[serde(default = "minus_one")]
    sign: f64,
}

#[derive(Deserialize)]
struct BranchRecord {
    name: String,
    bus0: String,
    bus1: String,
    x: f64,
    s_nom: f64,
}

#[derive(Deserialize)]
struct TransportLinkRecord {
    name: String,
    bus0: String,
    bus1: String,
    p_min: f64,
    p_max: f64,
}

/// Reads all rows of `path`, or none if the file does not exist.
fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for record in rdr.deserialize() {
        let row: T = record.with_context(|| format!("failed to parse {}", path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

/// A time-varying table: entity names and, per snapshot, one value per entity.
struct SeriesTable {
    columns: Vec<String>,
    rows: Vec<(String, Vec<f64>)>,
}

fn read_series(path: &Path) -> Result<Option<SeriesTable>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let columns: Vec<String> = rdr.headers()?.iter().skip(1).map(String::from).collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let snapshot = record
            .get(0)
            .ok_or_else(|| format_err!("{}: empty row", path.display()))?
            .to_string();
        let values = record
            .iter()
            .skip(1)
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<f64>, _>>()
            .with_context(|| format!("{}: bad value at snapshot {:?}", path.display(), snapshot))?;
        if values.len() != columns.len() {
            return Err(format_err!(
                "{}: snapshot {:?} has {} values for {} columns",
                path.display(),
                snapshot,
                values.len(),
                columns.len()
            ));
        }
        rows.push((snapshot, values));
    }
    Ok(Some(SeriesTable { columns, rows }))
}

/// Writes the values of a time-varying table through `set`, which returns
/// false for an unknown entity name.
fn apply_series<F>(network: &mut Network, path: &Path, mut set: F) -> Result<()>
where
    F: FnMut(&mut Network, &str, &str, f64) -> bool,
{
    let table = match read_series(path)? {
        Some(table) => table,
        None => return Ok(()),
    };
    for (snapshot, values) in &table.rows {
        if !network.has_snapshot(snapshot) {
            return Err(format_err!(
                "{}: unknown snapshot {:?}",
                path.display(),
                snapshot
            ));
        }
        for (name, &value) in table.columns.iter().zip(values) {
            if !set(network, name, snapshot, value) {
                return Err(format_err!("{}: unknown entity {:?}", path.display(), name));
            }
        }
    }
    Ok(())
}

fn bus_handle(network: &Network, name: &str, owner: &str) -> Result<BusId> {
    network
        .bus_id(name)
        .ok_or_else(|| format_err!("{:?} references unknown bus {:?}", owner, name))
}

/// Loads a network from a folder of CSV files and determines its topology.
pub fn load_network(dir: &Path) -> Result<Network> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut network = Network::new(name);

    let snapshots: Vec<SnapshotRecord> = read_table(&dir.join("snapshots.csv"))?;
    if !snapshots.is_empty() {
        network.set_snapshots(snapshots.into_iter().map(|s| s.name))?;
    }

    let bus_path = dir.join("buses.csv");
    if !bus_path.exists() {
        return Err(format_err!("missing {}", bus_path.display()));
    }
    for r in read_table::<BusRecord>(&bus_path)? {
        network.add_bus(BusBuilder::default().name(r.name).v_nom(r.v_nom).build()?)?;
    }

    for r in read_table::<GeneratorRecord>(&dir.join("generators.csv"))? {
        let bus = bus_handle(&network, &r.bus, &r.name)?;
        network.add_generator(
            GeneratorBuilder::default()
                .name(r.name)
                .bus(bus)
                .p_min(r.p_min)
                .p_max(r.p_max)
                .marginal_cost(r.marginal_cost)
                .sign(r.sign)
                .build()?,
        )?;
    }

    for r in read_table::<LoadRecord>(&dir.join("loads.csv"))? {
        let bus = bus_handle(&network, &r.bus, &r.name)?;
        network.add_load(
            LoadBuilder::default()
                .name(r.name)
                .bus(bus)
                .p_set(r.p_set)
                .sign(r.sign)
                .build()?,
        )?;
    }

    for r in read_table::<BranchRecord>(&dir.join("branches.csv"))? {
        let bus0 = bus_handle(&network, &r.bus0, &r.name)?;
        let bus1 = bus_handle(&network, &r.bus1, &r.name)?;
        network.add_branch(
            BranchBuilder::default()
                .name(r.name)
                .bus0(bus0)
                .bus1(bus1)
                .x(r.x)
                .s_nom(r.s_nom)
                .build()?,
        )?;
    }

    for r in read_table::<TransportLinkRecord>(&dir.join("transport_links.csv"))? {
        let bus0 = bus_handle(&network, &r.bus0, &r.name)?;
        let bus1 = bus_handle(&network, &r.bus1, &r.name)?;
        network.add_transport_link(
            TransportLinkBuilder::default()
                .name(r.name)
                .bus0(bus0)
                .bus1(bus1)
                .p_min(r.p_min)
                .p_max(r.p_max)
                .build()?,
        )?;
    }

    apply_series(
        &mut network,
        &dir.join("generators-p_min.csv"),
        |n, name, snapshot, value| match n.generator_id(name) {
            Some(id) => {
                n.generators_mut()[id.index()].p_min.set(snapshot, value);
                true
            }
            None => false,
        },
    )?;
    apply_series(
        &mut network,
        &dir.join("generators-p_max.csv"),
        |n, name, snapshot, value| match n.generator_id(name) {
            Some(id) => {
                n.generators_mut()[id.index()].p_max.set(snapshot, value);
                true
            }
            None => false,
        },
    )?;
    apply_series(
        &mut network,
        &dir.join("loads-p_set.csv"),
        |n, name, snapshot, value| match n.load_id(name) {
            Some(id) => {
                n.loads_mut()[id.index()].p_set.set(snapshot, value);
                true
            }
            None => false,
        },
    )?;

    network.determine_network_topology();

    log::info!(
        "loaded network {:?}: {} buses, {} generators, {} loads, {} branches, {} transport links, {} snapshots",
        network.name,
        network.buses().len(),
        network.generators().len(),
        network.loads().len(),
        network.branches().len(),
        network.transport_links().len(),
        network.snapshots().len()
    );
    Ok(network)
}

fn write_series<'a>(
    path: &Path,
    snapshots: &[String],
    columns: impl Iterator<Item = (&'a str, &'a TimeSeries)>,
) -> Result<()> {
    let (names, series): (Vec<&str>, Vec<&TimeSeries>) = columns.unzip();

    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut header = vec!["snapshot"];
    header.extend(names);
    wtr.write_record(&header)?;
    for snapshot in snapshots {
        let mut row = vec![snapshot.clone()];
        // Snapshots without a solved value stay blank.
        row.extend(series.iter().map(|ts| {
            if ts.contains(snapshot) {
                ts.get(snapshot).to_string()
            } else {
                String::new()
            }
        }));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes every solved attribute of the network to `dir`, one CSV per
/// attribute with a row per snapshot. Values never solved for are left empty.
pub fn write_results(network: &Network, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    let snapshots = network.snapshots();

    let gens = network.generators();
    write_series(
        &dir.join("generators-p.csv"),
        snapshots,
        gens.iter().map(|g| (g.name.as_str(), &g.p)),
    )?;

    let loads = network.loads();
    write_series(
        &dir.join("loads-p.csv"),
        snapshots,
        loads.iter().map(|l| (l.name.as_str(), &l.p)),
    )?;

    let buses = network.buses();
    write_series(
        &dir.join("buses-v_ang.csv"),
        snapshots,
        buses.iter().map(|b| (b.name.as_str(), &b.v_ang)),
    )?;
    write_series(
        &dir.join("buses-p.csv"),
        snapshots,
        buses.iter().map(|b| (b.name.as_str(), &b.p)),
    )?;
    write_series(
        &dir.join("buses-marginal_price.csv"),
        snapshots,
        buses.iter().map(|b| (b.name.as_str(), &b.marginal_price)),
    )?;

    let branches = network.branches();
    write_series(
        &dir.join("branches-p0.csv"),
        snapshots,
        branches.iter().map(|br| (br.name.as_str(), &br.p0)),
    )?;
    write_series(
        &dir.join("branches-p1.csv"),
        snapshots,
        branches.iter().map(|br| (br.name.as_str(), &br.p1)),
    )?;

    let links = network.transport_links();
    write_series(
        &dir.join("transport_links-p0.csv"),
        snapshots,
        links.iter().map(|tl| (tl.name.as_str(), &tl.p0)),
    )?;
    write_series(
        &dir.join("transport_links-p1.csv"),
        snapshots,
        links.iter().map(|tl| (tl.name.as_str(), &tl.p1)),
    )?;

    log::info!("results written to {}", dir.display());
    Ok(())
}
