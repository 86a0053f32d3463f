use crate::error::LopfError;
use derive_builder::Builder;
use std::collections::HashMap;

/// Name of the single snapshot of a freshly created network.
pub const DEFAULT_SNAPSHOT: &str = "now";

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(usize);

        impl $name {
            /// Position of the entity in its network arena.
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl From<usize> for $name {
            fn from(i: usize) -> Self {
                Self(i)
            }
        }
    };
}

handle!(
    /// Stable handle of a bus.
    BusId
);
handle!(
    /// Stable handle of a generator.
    GeneratorId
);
handle!(
    /// Stable handle of a load.
    LoadId
);
handle!(
    /// Stable handle of a branch.
    BranchId
);
handle!(
    /// Stable handle of a transport link.
    TransportLinkId
);
handle!(
    /// Stable handle of a sub-network.
    SubNetworkId
);

/// Per-snapshot values with a static fallback.
///
/// Snapshots without an explicit value read as the default, so a static
/// attribute and a time-varying one share the same representation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    default: f64,
    values: HashMap<String, f64>,
}

impl TimeSeries {
    pub fn new(default: f64) -> Self {
        Self {
            default,
            values: HashMap::new(),
        }
    }

    /// Returns a copy of `self` with `value` set at `snapshot`.
    pub fn with(mut self, snapshot: &str, value: f64) -> Self {
        self.set(snapshot, value);
        self
    }

    pub fn get(&self, snapshot: &str) -> f64 {
        self.values.get(snapshot).copied().unwrap_or(self.default)
    }

    pub fn set(&mut self, snapshot: &str, value: f64) {
        self.values.insert(snapshot.to_string(), value);
    }

    /// Adds `delta` to the value at `snapshot`.
    pub fn add(&mut self, snapshot: &str, delta: f64) {
        let value = self.get(snapshot) + delta;
        self.set(snapshot, value);
    }

    /// Whether `snapshot` holds an explicit value.
    pub fn contains(&self, snapshot: &str) -> bool {
        self.values.contains_key(snapshot)
    }

    pub fn default_value(&self) -> f64 {
        self.default
    }

    /// True when no snapshot holds an explicit value.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<f64> for TimeSeries {
    fn from(default: f64) -> Self {
        TimeSeries::new(default)
    }
}

/// Bus is an electrical node. Assets reference it, it owns none.
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(setter(into))]
pub struct Bus {
    pub name: String,

    /// Nominal voltage (kV), the base for per-unit reactance.
    #[builder(default = "1.0")]
    pub v_nom: f64,

    /// Assigned by the topology preprocessor.
    #[builder(setter(skip))]
    pub sub_network: Option<SubNetworkId>,

    /// Voltage angle (radians).
    #[builder(setter(skip))]
    pub v_ang: TimeSeries,

    /// Net power injection.
    #[builder(setter(skip))]
    pub p: TimeSeries,

    /// Shadow price of the nodal power balance (currency/power unit).
    #[builder(setter(skip))]
    pub marginal_price: TimeSeries,
}

/// Generator with bounded dispatch and a linear cost.
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(setter(into))]
pub struct Generator {
    pub name: String,

    pub bus: BusId,

    /// Minimum dispatch per snapshot.
    #[builder(default)]
    pub p_min: TimeSeries,

    /// Maximum dispatch per snapshot.
    pub p_max: TimeSeries,

    /// Cost per unit of dispatched power.
    #[builder(default)]
    pub marginal_cost: f64,

    /// Injection convention.
    #[builder(default = "1.0")]
    pub sign: f64,

    /// Solved dispatch.
    #[builder(setter(skip))]
    pub p: TimeSeries,
}

/// Fixed (non-dispatchable) demand.
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(setter(into))]
pub struct Load {
    pub name: String,

    pub bus: BusId,

    #[builder(default)]
    pub p_set: TimeSeries,

    #[builder(default = "-1.0")]
    pub sign: f64,

    /// Dispatch, equal to `p_set` after a solve.
    #[builder(setter(skip))]
    pub p: TimeSeries,
}

/// Line or transformer obeying the linearized flow law.
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(setter(into))]
pub struct Branch {
    pub name: String,

    pub bus0: BusId,

    pub bus1: BusId,

    /// Series reactance (ohm).
    pub x: f64,

    /// Thermal limit.
    pub s_nom: f64,

    /// Per-unit reactance, computed by the topology preprocessor.
    #[builder(setter(skip))]
    pub x_pu: f64,

    #[builder(setter(skip))]
    pub sub_network: Option<SubNetworkId>,

    #[builder(setter(skip))]
    pub p0: TimeSeries,

    #[builder(setter(skip))]
    pub p1: TimeSeries,

    /// Shadow price of the upper thermal limit.
    #[builder(setter(skip))]
    pub mu_upper: TimeSeries,

    /// Shadow price of the lower thermal limit.
    #[builder(setter(skip))]
    pub mu_lower: TimeSeries,
}

/// Controllable flow element (e.g. an HVDC link), free within fixed bounds.
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(setter(into))]
pub struct TransportLink {
    pub name: String,

    pub bus0: BusId,

    pub bus1: BusId,

    pub p_min: f64,

    pub p_max: f64,

    #[builder(setter(skip))]
    pub p0: TimeSeries,

    #[builder(setter(skip))]
    pub p1: TimeSeries,
}

/// Maximal set of buses connected by branches, solved as one angle system.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubNetwork {
    pub name: String,
    pub buses: Vec<BusId>,
    pub branches: Vec<BranchId>,
    pub slack_bus: Option<BusId>,
}

/// Network owns every entity in arenas addressed by integer handles.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    pub name: String,

    snapshots: Vec<String>,
    now: String,

    buses: Vec<Bus>,
    generators: Vec<Generator>,
    loads: Vec<Load>,
    branches: Vec<Branch>,
    transport_links: Vec<TransportLink>,
    pub(crate) sub_networks: Vec<SubNetwork>,

    bus_index: HashMap<String, BusId>,
    generator_index: HashMap<String, GeneratorId>,
    load_index: HashMap<String, LoadId>,
    branch_index: HashMap<String, BranchId>,
    transport_link_index: HashMap<String, TransportLinkId>,
}

fn insert_named<T, I: From<usize> + Copy>(
    items: &mut Vec<T>,
    index: &mut HashMap<String, I>,
    kind: &str,
    name: &str,
    item: T,
) -> Result<I, LopfError> {
    if index.contains_key(name) {
        return Err(LopfError::config(format!("duplicate {} name {:?}", kind, name)));
    }
    let id = I::from(items.len());
    items.push(item);
    index.insert(name.to_string(), id);
    Ok(id)
}

impl Network {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            snapshots: vec![DEFAULT_SNAPSHOT.to_string()],
            now: DEFAULT_SNAPSHOT.to_string(),
            buses: Vec::new(),
            generators: Vec::new(),
            loads: Vec::new(),
            branches: Vec::new(),
            transport_links: Vec::new(),
            sub_networks: Vec::new(),
            bus_index: HashMap::new(),
            generator_index: HashMap::new(),
            load_index: HashMap::new(),
            branch_index: HashMap::new(),
            transport_link_index: HashMap::new(),
        }
    }

    // Snapshots //

    pub fn snapshots(&self) -> &[String] {
        &self.snapshots
    }

    /// Replaces the snapshot sequence. The current snapshot falls back to the
    /// first one if it is no longer part of the sequence.
    pub fn set_snapshots<S: Into<String>>(
        &mut self,
        snapshots: impl IntoIterator<Item = S>,
    ) -> Result<(), LopfError> {
        let snapshots: Vec<String> = snapshots.into_iter().map(Into::into).collect();
        if snapshots.is_empty() {
            return Err(LopfError::config("snapshot sequence must not be empty"));
        }
        for (i, s) in snapshots.iter().enumerate() {
            if snapshots[..i].contains(s) {
                return Err(LopfError::config(format!("duplicate snapshot {:?}", s)));
            }
        }
        if !snapshots.contains(&self.now) {
            self.now = snapshots[0].clone();
        }
        self.snapshots = snapshots;
        Ok(())
    }

    pub fn now(&self) -> &str {
        &self.now
    }

    pub fn set_now(&mut self, snapshot: &str) -> Result<(), LopfError> {
        if !self.has_snapshot(snapshot) {
            return Err(LopfError::config(format!("unknown snapshot {:?}", snapshot)));
        }
        self.now = snapshot.to_string();
        Ok(())
    }

    pub fn has_snapshot(&self, snapshot: &str) -> bool {
        self.snapshots.iter().any(|s| s == snapshot)
    }

    // Insertion //

    pub fn add_bus(&mut self, bus: Bus) -> Result<BusId, LopfError> {
        let name = bus.name.clone();
        insert_named(&mut self.buses, &mut self.bus_index, "bus", &name, bus)
    }

    pub fn add_generator(&mut self, gen: Generator) -> Result<GeneratorId, LopfError> {
        self.check_bus(gen.bus, &gen.name)?;
        let name = gen.name.clone();
        insert_named(
            &mut self.generators,
            &mut self.generator_index,
            "generator",
            &name,
            gen,
        )
    }

    pub fn add_load(&mut self, load: Load) -> Result<LoadId, LopfError> {
        self.check_bus(load.bus, &load.name)?;
        let name = load.name.clone();
        insert_named(&mut self.loads, &mut self.load_index, "load", &name, load)
    }

    pub fn add_branch(&mut self, branch: Branch) -> Result<BranchId, LopfError> {
        self.check_bus(branch.bus0, &branch.name)?;
        self.check_bus(branch.bus1, &branch.name)?;
        let name = branch.name.clone();
        insert_named(
            &mut self.branches,
            &mut self.branch_index,
            "branch",
            &name,
            branch,
        )
    }

    pub fn add_transport_link(&mut self, tl: TransportLink) -> Result<TransportLinkId, LopfError> {
        self.check_bus(tl.bus0, &tl.name)?;
        self.check_bus(tl.bus1, &tl.name)?;
        let name = tl.name.clone();
        insert_named(
            &mut self.transport_links,
            &mut self.transport_link_index,
            "transport link",
            &name,
            tl,
        )
    }

    fn check_bus(&self, bus: BusId, owner: &str) -> Result<(), LopfError> {
        if bus.index() >= self.buses.len() {
            return Err(LopfError::config(format!(
                "{:?} references unknown bus handle {}",
                owner,
                bus.index()
            )));
        }
        Ok(())
    }

    // Lookup //

    pub fn bus_id(&self, name: &str) -> Option<BusId> {
        self.bus_index.get(name).copied()
    }

    pub fn generator_id(&self, name: &str) -> Option<GeneratorId> {
        self.generator_index.get(name).copied()
    }

    pub fn load_id(&self, name: &str) -> Option<LoadId> {
        self.load_index.get(name).copied()
    }

    pub fn branch_id(&self, name: &str) -> Option<BranchId> {
        self.branch_index.get(name).copied()
    }

    pub fn transport_link_id(&self, name: &str) -> Option<TransportLinkId> {
        self.transport_link_index.get(name).copied()
    }

    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    pub fn generators(&self) -> &[Generator] {
        &self.generators
    }

    pub fn loads(&self) -> &[Load] {
        &self.loads
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn transport_links(&self) -> &[TransportLink] {
        &self.transport_links
    }

    pub fn sub_networks(&self) -> &[SubNetwork] {
        &self.sub_networks
    }

    pub fn bus(&self, id: BusId) -> &Bus {
        &self.buses[id.index()]
    }

    pub fn generator(&self, id: GeneratorId) -> &Generator {
        &self.generators[id.index()]
    }

    pub fn load(&self, id: LoadId) -> &Load {
        &self.loads[id.index()]
    }

    pub fn branch(&self, id: BranchId) -> &Branch {
        &self.branches[id.index()]
    }

    pub fn transport_link(&self, id: TransportLinkId) -> &TransportLink {
        &self.transport_links[id.index()]
    }

    pub fn sub_network(&self, id: SubNetworkId) -> &SubNetwork {
        &self.sub_networks[id.index()]
    }

    pub(crate) fn buses_mut(&mut self) -> &mut [Bus] {
        &mut self.buses
    }

    pub(crate) fn generators_mut(&mut self) -> &mut [Generator] {
        &mut self.generators
    }

    pub(crate) fn loads_mut(&mut self) -> &mut [Load] {
        &mut self.loads
    }

    pub(crate) fn branches_mut(&mut self) -> &mut [Branch] {
        &mut self.branches
    }

    pub(crate) fn transport_links_mut(&mut self) -> &mut [TransportLink] {
        &mut self.transport_links
    }

    /// Mutable access to a sub-network, e.g. to preset its slack bus.
    pub fn sub_network_mut(&mut self, id: SubNetworkId) -> &mut SubNetwork {
        &mut self.sub_networks[id.index()]
    }
}
