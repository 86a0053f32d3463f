use crate::error::LopfError;
use crate::network::{BranchId, BusId, Network, SubNetwork, SubNetworkId};
use petgraph::unionfind::UnionFind;
use std::collections::{HashMap, HashSet};

impl Network {
    /// Splits the network into sub-networks, the connected components of the
    /// bus graph with branches as edges.
    ///
    /// Sub-networks are numbered in order of their first bus. Any previous
    /// assignment, including preset slack buses, is discarded.
    pub fn determine_network_topology(&mut self) {
        let mut uf = UnionFind::<usize>::new(self.buses().len());
        for br in self.branches() {
            uf.union(br.bus0.index(), br.bus1.index());
        }
        let labels = uf.into_labeling();

        let mut component: HashMap<usize, SubNetworkId> = HashMap::new();
        let mut sub_networks: Vec<SubNetwork> = Vec::new();
        for (i, &label) in labels.iter().enumerate() {
            let id = *component.entry(label).or_insert_with(|| {
                let id = SubNetworkId::from(sub_networks.len());
                sub_networks.push(SubNetwork {
                    name: id.index().to_string(),
                    ..Default::default()
                });
                id
            });
            sub_networks[id.index()].buses.push(BusId::from(i));
        }
        for (i, bus) in self.buses_mut().iter_mut().enumerate() {
            bus.sub_network = Some(component[&labels[i]]);
        }
        for (i, br) in self.branches_mut().iter_mut().enumerate() {
            let id = component[&labels[br.bus0.index()]];
            br.sub_network = Some(id);
            sub_networks[id.index()].branches.push(BranchId::from(i));
        }

        log::debug!(
            "network {:?}: {} buses in {} sub-networks",
            self.name,
            labels.len(),
            sub_networks.len()
        );
        self.sub_networks = sub_networks;
    }
}

/// Computes the per-unit reactance of every branch in the sub-network,
/// using the nominal voltage of the branch's first bus as base.
pub fn calculate_x_pu(network: &mut Network, sub_network: SubNetworkId) {
    let branches = network.sub_network(sub_network).branches.clone();
    let v_nom: Vec<f64> = branches
        .iter()
        .map(|&br| network.bus(network.branch(br).bus0).v_nom)
        .collect();
    let all = network.branches_mut();
    for (br, v_nom) in branches.iter().zip(v_nom) {
        let branch = &mut all[br.index()];
        branch.x_pu = branch.x / (v_nom * v_nom);
    }
}

/// Designates the slack bus of the sub-network.
///
/// A preset slack bus is kept if it is a member. Otherwise the first bus with
/// a generator is chosen, falling back to the first bus.
pub fn find_slack_bus(
    network: &mut Network,
    sub_network: SubNetworkId,
) -> Result<BusId, LopfError> {
    let sn = network.sub_network(sub_network);
    if let Some(slack) = sn.slack_bus {
        if sn.buses.contains(&slack) {
            return Ok(slack);
        }
    }
    let gen_buses: HashSet<BusId> = network.generators().iter().map(|g| g.bus).collect();
    let slack = sn
        .buses
        .iter()
        .find(|b| gen_buses.contains(*b))
        .or_else(|| sn.buses.first())
        .copied()
        .ok_or_else(|| {
            LopfError::config(format!("sub-network {:?} has no buses", sn.name))
        })?;

    log::debug!(
        "sub-network {:?}: slack bus {:?}",
        sn.name,
        network.bus(slack).name
    );
    network.sub_network_mut(sub_network).slack_bus = Some(slack);
    Ok(slack)
}
