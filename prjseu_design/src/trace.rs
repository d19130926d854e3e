use crate::{Design, NetId, NodeRef};
use std::collections::{BTreeSet, HashSet, VecDeque};

/// Visited-node bound for a single trace. Routed nets are far smaller;
/// hitting the bound means a malformed route and yields a truncated
/// result rather than an error.
pub const TRACE_NODE_LIMIT: usize = 65536;

/// Result of a downstream trace: the sink cells reached, and whether the
/// walk was cut short by the node bound.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Trace {
    pub sinks: BTreeSet<String>,
    pub truncated: bool,
}

impl Design {
    /// Collects every sink cell reachable downstream of the given node in
    /// the net's routing graph. Forward edges only, so the upstream
    /// portion of the net is never re-entered; a visited set guards
    /// against cycles in malformed routes.
    pub fn trace_from_pip(&self, net: NetId, tile: &str, node: &str) -> Trace {
        let edges = self.net_edges(net);
        let node_sinks = self.net_node_sinks(net);
        let mut trace = Trace::default();
        let mut visited: HashSet<NodeRef> = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(NodeRef::new(tile, node));
        while let Some(cur) = queue.pop_front() {
            if !visited.insert(cur.clone()) {
                continue;
            }
            if visited.len() > TRACE_NODE_LIMIT {
                trace.truncated = true;
                break;
            }
            if let Some(cells) = node_sinks.get(&cur) {
                for &cid in cells {
                    trace.sinks.insert(self.cells[cid].name.clone());
                }
            }
            if let Some(next) = edges.get(&cur) {
                for n in next {
                    if !visited.contains(n) {
                        queue.push_back(n.clone());
                    }
                }
            }
        }
        trace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::sample_design;
    use crate::{Net, Pip};
    use unnamed_entity::EntityId;

    #[test]
    fn trace_collects_downstream_sinks() {
        let design = sample_design();
        let nid = NetId::from_idx(0);
        // from the driver output: both branches reached
        let trace = design.trace_from_pip(nid, "INT_L_X0Y0", "EE2BEG0");
        assert!(!trace.truncated);
        assert_eq!(
            trace.sinks.iter().collect::<Vec<_>>(),
            vec!["u0/ff_a", "u0/lut_b"]
        );
    }

    #[test]
    fn trace_is_forward_only() {
        let design = sample_design();
        let nid = NetId::from_idx(0);
        // downstream of the second hop only the far branch remains
        let trace = design.trace_from_pip(nid, "INT_L_X1Y0", "EE2BEG0");
        assert_eq!(trace.sinks.iter().collect::<Vec<_>>(), vec!["u0/lut_b"]);
        // a sink-input node reaches exactly its own cell
        let trace = design.trace_from_pip(nid, "INT_L_X1Y0", "IMUX_L4");
        assert_eq!(trace.sinks.iter().collect::<Vec<_>>(), vec!["u0/ff_a"]);
    }

    #[test]
    fn trace_tolerates_cycles() {
        let mut design = sample_design();
        // malformed route: a loop back to the driver tile
        design.nets[NetId::from_idx(0)].conns.push((
            NodeRef::new("INT_L_X2Y0", "EE2END0"),
            NodeRef::new("INT_L_X0Y0", "EE2BEG0"),
        ));
        design.post_deserialize();
        let trace = design.trace_from_pip(NetId::from_idx(0), "INT_L_X0Y0", "EE2BEG0");
        assert!(!trace.truncated);
        assert_eq!(trace.sinks.len(), 2);
    }

    #[test]
    fn trace_from_unrelated_node_is_empty() {
        let mut design = sample_design();
        design.nets.push(Net {
            name: "other".to_string(),
            pips: vec![Pip {
                tile: "INT_L_X5Y5".to_string(),
                input: "A".to_string(),
                output: "B".to_string(),
                bidir: false,
            }],
            conns: vec![],
            sinks: vec![],
        });
        design.post_deserialize();
        let trace = design.trace_from_pip(NetId::from_idx(1), "INT_L_X5Y5", "B");
        assert!(trace.sinks.is_empty());
        assert!(!trace.truncated);
    }
}
