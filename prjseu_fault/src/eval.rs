use crate::{
    BitClass, CandidateTile, Direction, ErrorlessReason, Fault, FaultRecord, Statistics,
};
use itertools::Itertools;
use prjseu_bitstream::BitCoord;
use prjseu_design::Design;
use prjseu_tilemap::{BitView, FlipView, Resource, TileId, TileMap};
use prjseu_xray::PseudoPipKind;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// All records of one bit group, in input bit order.
#[derive(Debug, Clone)]
pub struct GroupReport {
    pub index: usize,
    pub records: Vec<FaultRecord>,
}

impl GroupReport {
    pub fn stats(&self) -> Statistics {
        Statistics::from_group(&self.records)
    }
}

/// Joins the configuration state with the design model to evaluate bit
/// groups. Holds read-only references; each group gets its own flip
/// overlay.
pub struct Evaluator<'a> {
    map: &'a TileMap<'a>,
    design: &'a Design,
}

fn tile_y_of(tile: &str) -> Option<u32> {
    let x = tile.find("_X")?;
    let y = tile[x..].find('Y')? + x;
    tile[y + 1..].parse().ok()
}

fn site_x_of(site: &str) -> Option<u32> {
    let x = site.rfind('X')?;
    let y = site[x..].find('Y')? + x;
    site[x + 1..y].parse().ok()
}

fn site_y_of(site: &str) -> Option<u32> {
    site[site.rfind('Y')? + 1..].parse().ok()
}

/// Database BEL names drop the size digit of design BEL names
/// (`ALUT` vs `A6LUT`).
fn bel_matches(db_bel: &str, design_bel: &str) -> bool {
    if db_bel == design_bel {
        return true;
    }
    let mut chars = design_bel.chars();
    match chars.next() {
        Some(first) => {
            let squeezed: String = std::iter::once(first).chain(chars.skip(1)).collect();
            squeezed == db_bel
        }
        None => false,
    }
}

impl<'a> Evaluator<'a> {
    pub fn new(map: &'a TileMap<'a>, design: &'a Design) -> Evaluator<'a> {
        Evaluator { map, design }
    }

    /// Evaluates groups in input order. Cancellation is polled between
    /// groups only; a cancelled run returns the completed prefix.
    pub fn run(&self, groups: &[Vec<BitCoord>], cancel: Option<&AtomicBool>) -> Vec<GroupReport> {
        let mut reports = Vec::with_capacity(groups.len());
        for (i, group) in groups.iter().enumerate() {
            if let Some(c) = cancel {
                if c.load(Ordering::Relaxed) {
                    break;
                }
            }
            reports.push(self.evaluate_group(i + 1, group));
        }
        reports
    }

    pub fn evaluate_group(&self, index: usize, bits: &[BitCoord]) -> GroupReport {
        let overlay = self.map.with_flips(bits.iter().copied());
        let mut records: Vec<FaultRecord> = Vec::with_capacity(bits.len());
        let mut muxes: BTreeMap<(String, String), Vec<usize>> = BTreeMap::new();

        for &coord in bits {
            let direction = if self.map.bits.get(coord) {
                Direction::DrivenLow
            } else {
                Direction::DrivenHigh
            };
            let mut rec = FaultRecord {
                coord,
                direction,
                class: BitClass::Undefined,
                tile: None,
                functions: vec![],
                design_name: None,
                fault: Fault::Unevaluated,
                affected_pips: vec![],
                affected_resources: vec![],
                candidates: vec![],
                trace_truncated: false,
            };
            match self.map.resource_at(coord) {
                Resource::MuxBit { tile, sink, role } => {
                    let tile_name = self.map.tile(tile).name.clone();
                    let ttdb = self.map.tile_type_db(tile);
                    let kind = ttdb
                        .muxes
                        .get(&sink)
                        .and_then(|m| m.kind)
                        .map(|k| k.to_string())
                        .unwrap_or_default();
                    rec.class = BitClass::Routing;
                    rec.functions = vec![format!("{sink} {kind} Routing Mux - {role}")];
                    rec.design_name = Some(format!("{tile_name}/{sink}"));
                    // downstream of the mux output on its routed net
                    if let Some(net) = self.design.net_driving_node(&tile_name, &sink) {
                        let trace = self.design.trace_from_pip(net, &tile_name, &sink);
                        rec.affected_resources = trace.sinks.into_iter().collect();
                        rec.trace_truncated = trace.truncated;
                    }
                    rec.tile = Some(tile_name.clone());
                    muxes
                        .entry((tile_name, sink))
                        .or_default()
                        .push(records.len());
                }
                Resource::SiteBit { tile, functions } => {
                    let tile_name = self.map.tile(tile).name.clone();
                    rec.tile = Some(tile_name.clone());
                    rec.functions = functions
                        .iter()
                        .map(|f| f.split('.').join(" - "))
                        .collect();
                    if tile_name.contains("CLB") {
                        rec.class = BitClass::Clb;
                        self.eval_site_bit(&mut rec, &tile_name, &functions[0]);
                    } else {
                        rec.class = BitClass::Unsupported;
                    }
                }
                Resource::Other { tile } => {
                    rec.class = BitClass::Unsupported;
                    rec.tile = Some(self.map.tile(tile).name.clone());
                }
                Resource::Unknown { candidates } => {
                    rec.class = BitClass::Unknown;
                    rec.candidates = self.candidate_cells(&candidates);
                }
                Resource::Undefined => rec.class = BitClass::Undefined,
            }
            records.push(rec);
        }

        // routing faults are evaluated per mux under the joint overlay
        for ((tile_name, sink), idxs) in &muxes {
            self.eval_mux(&mut records, &overlay, tile_name, sink, idxs);
        }

        GroupReport { index, records }
    }

    /// Resolves a tile-relative site name (`SLICEM_X0`) against the sites
    /// the design occupies in the tile.
    fn global_site(&self, tile: &str, local: &str) -> Option<String> {
        let mut parts = local.split('_');
        let root = parts.next()?;
        let offset = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        let sites = self.design.sites_in_tile(tile)?;
        let root = if root.contains("SLICE") { "SLICE" } else { root };
        let matching: Vec<&String> = sites.keys().filter(|s| s.contains(root)).collect();
        if offset.contains('Y') {
            let want = tile_y_of(tile)? + u32::from(offset.contains('1'));
            matching
                .into_iter()
                .find(|s| site_y_of(s) == Some(want))
                .cloned()
        } else {
            matching
                .into_iter()
                .find(|s| match site_x_of(s) {
                    Some(x) => {
                        (offset == "X0" && x % 2 == 0) || (offset == "X1" && x % 2 == 1)
                    }
                    None => false,
                })
                .cloned()
        }
    }

    fn eval_site_bit(&self, rec: &mut FaultRecord, tile_name: &str, function: &str) {
        let mut segs: Vec<&str> = function.split('.').collect();
        let leaf = segs.pop().unwrap_or_default();
        let leaf = if leaf == "NOCLKINV" { "CLKINV" } else { leaf };
        let Some(&site_local) = segs.first() else {
            rec.class = BitClass::Unsupported;
            return;
        };
        let Some(site) = self.global_site(tile_name, site_local) else {
            rec.fault = Fault::Errorless {
                reason: ErrorlessReason::NoCellPlaced,
            };
            return;
        };
        let bels = &self.design.sites_in_tile(tile_name).unwrap()[&site];
        let cell_name = |cid| self.design.cell(cid).name.clone();
        let mut cells: Vec<String> = if segs.len() >= 2 {
            // BEL-level bit: cells on the matching BEL
            let bel = segs.last().unwrap();
            bels.iter()
                .filter(|(b, _)| bel_matches(bel, b))
                .map(|(_, &cid)| cell_name(cid))
                .collect()
        } else {
            // site-level control bit
            match leaf {
                "FFSYNC" | "LATCH" => bels
                    .iter()
                    .filter(|(b, _)| b.contains("FF"))
                    .map(|(_, &cid)| cell_name(cid))
                    .collect(),
                "WA7USED" | "WA8USED" => bels
                    .iter()
                    .filter(|(b, _)| b.contains("LUT"))
                    .map(|(_, &cid)| cell_name(cid))
                    .collect(),
                _ => bels.values().map(|&cid| cell_name(cid)).collect(),
            }
        };
        cells.sort();
        cells.dedup();
        if cells.is_empty() {
            rec.fault = Fault::Errorless {
                reason: ErrorlessReason::NoCellPlaced,
            };
            return;
        }
        rec.affected_resources = cells.clone();
        if segs.len() >= 2 {
            rec.design_name = Some(cells.iter().join(", "));
            rec.fault = Fault::ClbAltered {
                bit_name: leaf.to_string(),
                cells,
            };
        } else {
            rec.design_name = Some(leaf.to_string());
            rec.fault = Fault::ClbAltered {
                bit_name: "Configuration".to_string(),
                cells,
            };
        }
    }

    fn candidate_cells(&self, candidates: &[TileId]) -> Vec<CandidateTile> {
        candidates
            .iter()
            .map(|&tid| {
                let tile = self.map.tile(tid).name.clone();
                let mut cells = Vec::new();
                if let Some(sites) = self.design.sites_in_tile(&tile) {
                    for (site, bels) in sites {
                        for (bel, &cid) in bels {
                            cells.push((
                                format!("{site}.{bel}"),
                                self.design.cell(cid).name.clone(),
                            ));
                        }
                    }
                }
                CandidateTile { tile, cells }
            })
            .collect()
    }

    /// Inputs conducting to the sink under the given view, including
    /// `default` pseudo-PIPs (which conduct when the whole mux is
    /// unprogrammed and both ends carry the same net).
    fn connected_srcs(
        &self,
        tile: TileId,
        tile_name: &str,
        sink: &str,
        view: &impl BitView,
    ) -> BTreeSet<String> {
        let mut srcs = self.map.connected_inputs(tile, sink, view);
        let ttdb = self.map.tile_type_db(tile);
        if let Some(pp) = ttdb.ppips.get(sink) {
            for (src, &kind) in pp {
                if kind != PseudoPipKind::Default {
                    continue;
                }
                let all_off = match ttdb.muxes.get(sink) {
                    Some(mux) => mux.selection_bits().all(|tb| {
                        self.map
                            .coord_of(tile, tb)
                            .map(|c| !view.bit(c))
                            .unwrap_or(true)
                    }),
                    None => true,
                };
                let sink_net = self.design.net_driving_node(tile_name, sink);
                let src_net = self.design.net_driving_node(tile_name, src);
                if all_off && sink_net.is_some() && sink_net == src_net {
                    srcs.insert(src.clone());
                }
            }
        }
        srcs
    }

    fn eval_mux(
        &self,
        records: &mut [FaultRecord],
        overlay: &FlipView<'_, '_>,
        tile_name: &str,
        sink: &str,
        idxs: &[usize],
    ) {
        let tile = self.map.tile_by_name(tile_name).unwrap();
        let base = self.connected_srcs(tile, tile_name, sink, &self.map.baseline());
        let post = self.connected_srcs(tile, tile_name, sink, overlay);
        let removed: BTreeSet<String> = base.difference(&post).cloned().collect();
        let added: BTreeSet<String> = post.difference(&base).cloned().collect();

        let net_name_of = |src: &str| -> Option<String> {
            self.design
                .net_through_pip(tile_name, src, sink)
                .or_else(|| self.design.net_driving_node(tile_name, src))
                .map(|nid| self.design.net(nid).name.clone())
        };

        let mut opens: BTreeSet<String> = BTreeSet::new();
        let mut shorts: BTreeSet<String> = BTreeSet::new();

        if post.len() > 1 {
            // conflict: every simultaneously active source, plus opens for
            // any source that dropped out
            for src in &post {
                let entry = match net_name_of(src) {
                    Some(net) if base.contains(src) => {
                        format!("{net} (initially connected)")
                    }
                    Some(net) => net,
                    None => format!("Unconnected Node({src})"),
                };
                shorts.insert(entry);
            }
            for src in &removed {
                if let Some(net) = net_name_of(src) {
                    opens.insert(net);
                }
            }
        } else if post.len() == 1 {
            let y = post.iter().next().unwrap();
            if base.len() == 1 && !base.contains(y) {
                // retarget: the kept net meets whatever now drives the sink
                let x = base.iter().next().unwrap();
                if let Some(net_x) = net_name_of(x) {
                    shorts.insert(format!("{net_x} (initially connected)"));
                    let entry = match net_name_of(y) {
                        Some(net_y) => net_y,
                        None => format!("Unconnected Node({y})"),
                    };
                    shorts.insert(entry);
                }
                // an unconnected prior source disturbs no design net
            } else if base.is_empty() {
                // activation: a short only if the newly selected source is
                // driven and the output already belongs to another net
                if let Some(net_y) = net_name_of(y) {
                    if let Some(out) = self.design.net_driving_node(tile_name, sink) {
                        let out_net = self.design.net(out).name.clone();
                        if out_net != net_y {
                            shorts.insert(net_y);
                            shorts.insert(format!("{out_net} (initially connected)"));
                        }
                    }
                }
            } else {
                // a conflict shrank back to one source
                for src in &removed {
                    if let Some(net) = net_name_of(src) {
                        opens.insert(net);
                    }
                }
            }
        } else {
            for src in &removed {
                if let Some(net) = net_name_of(src) {
                    opens.insert(net);
                }
            }
        }

        let fault = if opens.is_empty() && shorts.is_empty() {
            Fault::Errorless {
                reason: ErrorlessReason::NoFailureFound,
            }
        } else {
            Fault::Routing {
                opens: opens.into_iter().collect(),
                shorts: shorts.into_iter().collect(),
            }
        };

        let ttdb = self.map.tile_type_db(tile);
        let mux = ttdb.muxes.get(sink);
        let bidir = |src: &str| {
            ttdb.muxes
                .get(src)
                .map(|m| m.inputs.contains_key(sink))
                .unwrap_or(false)
        };
        for &ri in idxs {
            let tb = self.map.tile_bit_at(tile, records[ri].coord);
            let mut pips = Vec::new();
            for (state, set) in [("deactivated", &removed), ("activated", &added)] {
                for src in set.iter() {
                    let applies = match (mux, tb) {
                        (Some(m), Some(tb)) => match m.inputs.get(src) {
                            Some(rules) => rules.iter().any(|r| r.bit == tb),
                            // pseudo-PIP source: attributed to every
                            // selection bit of the mux
                            None => m.row_bits.contains(&tb) || m.col_bits.contains(&tb),
                        },
                        _ => false,
                    };
                    if applies {
                        let sep = if bidir(src) { "<<->>" } else { "->" };
                        pips.push(format!("{src}{sep}{sink} ({state})"));
                    }
                }
            }
            records[ri].affected_pips = pips;
            records[ri].fault = fault.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prjseu_bitstream::Bitstream;
    use prjseu_design::{Cell, Net, NodeRef, Pip, SinkPin};
    use prjseu_xray::{
        BitRule, BitsSegment, Database, PartFrames, RoutingMux, TileBit, TileGrid, TileInfo,
        TileTypeDb,
    };
    use unnamed_entity::EntityMap;

    const INT_TILE: &str = "INT_L_X10Y100";
    const CLB_TILE: &str = "CLBLM_L_X9Y100";
    const CLB_EMPTY_TILE: &str = "CLBLM_L_X9Y102";

    fn tb(frame: u32, bit: u32) -> TileBit {
        TileBit { frame, bit }
    }

    fn rule(frame: u32, bit: u32) -> BitRule {
        BitRule {
            bit: tb(frame, bit),
            inv: false,
        }
    }

    /// Three-input mux on SS2BEG0: shared row bit 00_00, column bits
    /// 01_00 / 01_01 / 01_02 for NODE_A / NODE_B / NODE_C.
    fn int_type() -> TileTypeDb {
        let mut db = TileTypeDb {
            name: "INT_L".to_string(),
            ..Default::default()
        };
        let mut inputs = std::collections::BTreeMap::new();
        for (i, src) in ["NODE_A", "NODE_B", "NODE_C"].iter().enumerate() {
            inputs.insert(src.to_string(), vec![rule(0, 0), rule(1, i as u32)]);
        }
        let mux = RoutingMux {
            sink: "SS2BEG0".to_string(),
            kind: Some(prjseu_xray::MuxKind::M2x12),
            inputs,
            row_bits: BTreeSet::from([tb(0, 0)]),
            col_bits: BTreeSet::from([tb(1, 0), tb(1, 1), tb(1, 2)]),
        };
        for b in mux.selection_bits() {
            db.config_bits.insert(b);
        }
        db.muxes.insert("SS2BEG0".to_string(), mux);
        db
    }

    fn clb_type() -> TileTypeDb {
        let mut db = TileTypeDb {
            name: "CLBLM_L".to_string(),
            ..Default::default()
        };
        for (tag, r) in [
            ("SLICEM_X0.ALUT.INIT[00]", rule(31, 15)),
            ("SLICEM_X0.CEUSEDMUX", rule(31, 40)),
        ] {
            db.functions.insert(tag.to_string(), vec![r]);
            db.config_bits.insert(r.bit);
            db.bit_functions.insert(r.bit, vec![tag.to_string()]);
        }
        db
    }

    fn seg(base_addr: u32, frames: u32, word_offset: u32) -> BitsSegment {
        BitsSegment {
            base_addr,
            frames,
            word_offset,
            words: 2,
        }
    }

    fn database() -> Database {
        let mut tiles = std::collections::BTreeMap::new();
        tiles.insert(
            INT_TILE.to_string(),
            TileInfo {
                tile_type: "INT_L".to_string(),
                grid_x: 10,
                grid_y: 100,
                segments: vec![seg(0x100, 26, 50)],
            },
        );
        tiles.insert(
            CLB_TILE.to_string(),
            TileInfo {
                tile_type: "CLBLM_L".to_string(),
                grid_x: 9,
                grid_y: 100,
                segments: vec![seg(0x100, 36, 52)],
            },
        );
        tiles.insert(
            CLB_EMPTY_TILE.to_string(),
            TileInfo {
                tile_type: "CLBLM_L".to_string(),
                grid_x: 9,
                grid_y: 102,
                segments: vec![seg(0x100, 36, 54)],
            },
        );
        let mut tile_types = EntityMap::new();
        tile_types.insert("CLBLM_L".to_string(), clb_type());
        tile_types.insert("INT_L".to_string(), int_type());
        Database {
            part: "xc7a35tcsg324-1".to_string(),
            family: "artix7",
            fabric: "xc7a50t".to_string(),
            grid: TileGrid { tiles },
            tile_types,
            frames: PartFrames::from_addresses(None, (0x100..0x130).collect()),
        }
    }

    fn coord(frame: u32, word: u8, bit: u8) -> BitCoord {
        BitCoord { frame, word, bit }
    }

    // selection bits of the SS2BEG0 mux as bitstream coordinates
    fn row_bit() -> BitCoord {
        coord(0x100, 50, 0)
    }
    fn col_a() -> BitCoord {
        coord(0x101, 50, 0)
    }
    fn col_b() -> BitCoord {
        coord(0x101, 50, 1)
    }
    fn col_c() -> BitCoord {
        coord(0x101, 50, 2)
    }

    /// Bitstream with NODE_A selected into SS2BEG0.
    fn bitstream() -> Bitstream {
        let mut bits = Bitstream::default();
        bits.set(row_bit(), true);
        bits.set(col_a(), true);
        bits
    }

    fn design() -> Design {
        let mut design = Design::default();
        design.part = "xc7a35tcsg324-1".to_string();
        design.cells.push(Cell {
            name: "cells/lut_a".to_string(),
            tile: CLB_TILE.to_string(),
            site: "SLICE_X18Y100".to_string(),
            bel: "A6LUT".to_string(),
            kind: "LUT6".to_string(),
        });
        design.cells.push(Cell {
            name: "cells/ff_q".to_string(),
            tile: CLB_TILE.to_string(),
            site: "SLICE_X18Y100".to_string(),
            bel: "AFF".to_string(),
            kind: "FDRE".to_string(),
        });
        // the net routed through the analyzed mux
        design.nets.push(Net {
            name: "nets/alpha".to_string(),
            pips: vec![
                Pip {
                    tile: INT_TILE.to_string(),
                    input: "LOGIC_OUTS0".to_string(),
                    output: "NODE_A".to_string(),
                    bidir: false,
                },
                Pip {
                    tile: INT_TILE.to_string(),
                    input: "NODE_A".to_string(),
                    output: "SS2BEG0".to_string(),
                    bidir: false,
                },
            ],
            conns: vec![(
                NodeRef::new(INT_TILE, "SS2BEG0"),
                NodeRef::new(CLB_TILE, "CLBLM_L_A3"),
            )],
            sinks: vec![SinkPin {
                cell: "cells/ff_q".to_string(),
                node: NodeRef::new(CLB_TILE, "CLBLM_L_A3"),
            }],
        });
        // a second net driving NODE_B, available for shorts
        design.nets.push(Net {
            name: "nets/beta".to_string(),
            pips: vec![Pip {
                tile: INT_TILE.to_string(),
                input: "LOGIC_OUTS1".to_string(),
                output: "NODE_B".to_string(),
                bidir: false,
            }],
            conns: vec![],
            sinks: vec![],
        });
        design.post_deserialize();
        design
    }

    fn eval_one(bits: &[BitCoord]) -> Vec<FaultRecord> {
        let db = database();
        let stream = bitstream();
        let map = TileMap::new(&db, &stream);
        let design = design();
        let ev = Evaluator::new(&map, &design);
        ev.evaluate_group(1, bits).records
    }

    #[test]
    fn lut_init_fault() {
        let recs = eval_one(&[coord(0x11f, 52, 15)]);
        let rec = &recs[0];
        assert_eq!(rec.class, BitClass::Clb);
        assert_eq!(rec.direction, Direction::DrivenHigh);
        assert_eq!(rec.functions, vec!["SLICEM_X0 - ALUT - INIT[00]"]);
        assert_eq!(rec.design_name.as_deref(), Some("cells/lut_a"));
        assert_eq!(
            rec.fault,
            Fault::ClbAltered {
                bit_name: "INIT[00]".to_string(),
                cells: vec!["cells/lut_a".to_string()],
            }
        );
        assert!(rec.is_significant());
    }

    #[test]
    fn site_control_fault_covers_site() {
        let recs = eval_one(&[coord(0x11f, 52, 40)]);
        let rec = &recs[0];
        assert_eq!(rec.class, BitClass::Clb);
        match &rec.fault {
            Fault::ClbAltered { bit_name, cells } => {
                assert_eq!(bit_name, "Configuration");
                assert_eq!(cells, &vec![
                    "cells/ff_q".to_string(),
                    "cells/lut_a".to_string(),
                ]);
            }
            f => panic!("expected clb altered, got {f:?}"),
        }
        assert_eq!(rec.design_name.as_deref(), Some("CEUSEDMUX"));
    }

    #[test]
    fn init_bit_without_cell_is_errorless() {
        let recs = eval_one(&[coord(0x11f, 54, 15)]);
        let rec = &recs[0];
        assert_eq!(rec.class, BitClass::Clb);
        assert_eq!(
            rec.fault,
            Fault::Errorless {
                reason: ErrorlessReason::NoCellPlaced,
            }
        );
    }

    #[test]
    fn pip_open() {
        let recs = eval_one(&[row_bit()]);
        let rec = &recs[0];
        assert_eq!(rec.class, BitClass::Routing);
        assert_eq!(rec.direction, Direction::DrivenLow);
        assert_eq!(
            rec.functions,
            vec!["SS2BEG0 2-12 Routing Mux - Row Bit"]
        );
        assert_eq!(
            rec.design_name.as_deref(),
            Some("INT_L_X10Y100/SS2BEG0")
        );
        assert_eq!(
            rec.fault,
            Fault::Routing {
                opens: vec!["nets/alpha".to_string()],
                shorts: vec![],
            }
        );
        assert_eq!(rec.affected_pips, vec!["NODE_A->SS2BEG0 (deactivated)"]);
        assert_eq!(rec.affected_resources, vec!["cells/ff_q"]);
    }

    #[test]
    fn pip_short_between_nets() {
        let recs = eval_one(&[col_b()]);
        let rec = &recs[0];
        assert_eq!(rec.direction, Direction::DrivenHigh);
        assert_eq!(
            rec.fault,
            Fault::Routing {
                opens: vec![],
                shorts: vec![
                    "nets/alpha (initially connected)".to_string(),
                    "nets/beta".to_string(),
                ],
            }
        );
        assert_eq!(rec.affected_pips, vec!["NODE_B->SS2BEG0 (activated)"]);
        // trace runs from the mux output onward
        assert_eq!(rec.affected_resources, vec!["cells/ff_q"]);
    }

    #[test]
    fn pip_short_to_unconnected_node() {
        let recs = eval_one(&[col_c()]);
        let rec = &recs[0];
        assert_eq!(
            rec.fault,
            Fault::Routing {
                opens: vec![],
                shorts: vec![
                    "Unconnected Node(NODE_C)".to_string(),
                    "nets/alpha (initially connected)".to_string(),
                ],
            }
        );
    }

    #[test]
    fn undefined_bit() {
        let recs = eval_one(&[coord(0xdead_0000, 0, 0)]);
        let rec = &recs[0];
        assert_eq!(rec.class, BitClass::Undefined);
        assert_eq!(rec.fault, Fault::Unevaluated);
        assert!(rec.affected_resources.is_empty());
        assert!(!rec.is_significant());
    }

    #[test]
    fn unknown_bit_lists_candidates() {
        let recs = eval_one(&[coord(0x100, 51, 5)]);
        let rec = &recs[0];
        assert_eq!(rec.class, BitClass::Unknown);
        assert_eq!(rec.candidates.len(), 1);
        assert_eq!(rec.candidates[0].tile, INT_TILE);
    }

    #[test]
    fn joint_flip_retargets_mux() {
        // flipping both column bits in one group moves the selection from
        // NODE_A to NODE_B; evaluated jointly this is a short of the kept
        // net against the new driver, not an open plus a conflict
        let recs = eval_one(&[col_a(), col_b()]);
        assert_eq!(recs.len(), 2);
        let expected = Fault::Routing {
            opens: vec![],
            shorts: vec![
                "nets/alpha (initially connected)".to_string(),
                "nets/beta".to_string(),
            ],
        };
        assert_eq!(recs[0].fault, expected);
        assert_eq!(recs[1].fault, expected);
        assert_eq!(recs[0].affected_pips, vec!["NODE_A->SS2BEG0 (deactivated)"]);
        assert_eq!(recs[1].affected_pips, vec!["NODE_B->SS2BEG0 (activated)"]);
    }

    #[test]
    fn classification_partition_covers_group() {
        let group = vec![
            coord(0x11f, 52, 15),
            row_bit(),
            coord(0x100, 51, 5),
            coord(0xdead_0000, 0, 0),
            coord(0x11f, 54, 15),
        ];
        let recs = eval_one(&group);
        assert_eq!(recs.len(), group.len());
        let significant = recs.iter().filter(|r| r.is_significant()).count();
        let undefined = recs
            .iter()
            .filter(|r| r.class == BitClass::Undefined)
            .count();
        let unknown = recs.iter().filter(|r| r.class == BitClass::Unknown).count();
        let errorless = recs
            .iter()
            .filter(|r| {
                matches!(r.fault, Fault::Errorless { .. })
                    || (r.fault == Fault::Unevaluated
                        && !matches!(r.class, BitClass::Undefined | BitClass::Unknown))
            })
            .count();
        assert_eq!(significant + undefined + unknown + errorless, group.len());
    }

    #[test]
    fn evaluation_is_repeatable() {
        let group = vec![row_bit(), col_b(), coord(0x11f, 52, 15)];
        let a = eval_one(&group);
        let b = eval_one(&group);
        assert_eq!(a, b);
    }

    #[test]
    fn cancellation_stops_between_groups() {
        let db = database();
        let stream = bitstream();
        let map = TileMap::new(&db, &stream);
        let design = design();
        let ev = Evaluator::new(&map, &design);
        let cancel = AtomicBool::new(true);
        let groups = vec![vec![row_bit()], vec![col_b()]];
        let reports = ev.run(&groups, Some(&cancel));
        assert!(reports.is_empty());
        let reports = ev.run(&groups, None);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].index, 1);
        assert_eq!(reports[1].index, 2);
    }
}
