use std::collections::HashMap;

use tracing::{debug, debug_span};

use super::{Dag, DagError, DagNode, Lattice, NodeId};
use crate::dict::{Dictionary, WordId};
use crate::settings::Settings;
use crate::Frame;

/// Limits and tolerances applied while building a DAG.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Abort once the DAG holds more links than this.
    pub max_edges: usize,
    /// Nodes with fewer distinct end frames are not linked, except root and exit.
    pub min_ef_range: i32,
    /// Near-miss adjacency tolerated when adding fudge links (0..=2 frames).
    pub fudge: u8,
    pub max_lm_ops: u64,
    /// Per-frame LM budget; the utterance limit is the lesser of the two.
    pub max_lm_ops_per_frame: u64,
}

impl BuildOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_edges: settings.dag.max_edges,
            min_ef_range: settings.dag.min_ef_range,
            fudge: settings.dag.fudge,
            max_lm_ops: settings.search.max_lm_ops,
            max_lm_ops_per_frame: settings.search.max_lm_ops_per_frame,
        }
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Reject node, edge and best-segment references that point outside the
/// lattice.
fn check_indices(lattice: &Lattice) -> Result<(), DagError> {
    let n = lattice.nodes.len();
    if n == 0 {
        return Err(DagError::invalid("lattice has no nodes"));
    }
    let node_ref = |what: &str, seq: usize| {
        if seq < n {
            Ok(())
        } else {
            Err(DagError::invalid(format!("{what} refers to node {seq}, lattice has {n}")))
        }
    };
    node_ref("initial node", lattice.initial)?;
    node_ref("final node", lattice.final_node)?;
    for (i, e) in lattice.edges.iter().enumerate() {
        node_ref(&format!("edge {i}"), e.from)?;
        node_ref(&format!("edge {i}"), e.to)?;
    }
    for (i, s) in lattice.best_segments.iter().enumerate() {
        node_ref(&format!("best segment {i}"), s.seq)?;
        if s.end_frame < 0 || s.end_frame >= lattice.frames {
            return Err(DagError::invalid(format!(
                "best segment {i} ends at frame {}, lattice has {} frames",
                s.end_frame, lattice.frames
            )));
        }
    }
    Ok(())
}

/// Merged `(word, start_frame)` occurrence before allocation.
struct Occurrence {
    word: WordId,
    start_frame: Frame,
    first_end_frame: Frame,
    last_end_frame: Frame,
    seq: usize,
}

impl Dag {
    /// Build a DAG from a parsed lattice.
    ///
    /// Lattice occurrences sharing word and start frame merge into one node
    /// spanning the union of their end frames. Lattice edges become links
    /// unless the source is `</s>` or an endpoint is too short-lived (see
    /// `min_ef_range`); root as source and exit as target are exempt. With `fudge > 0`, nodes are also linked across a
    /// one- or two-frame overlap, scored from the lattice's best segments.
    pub fn build(
        lattice: &Lattice,
        dict: &dyn Dictionary,
        opts: &BuildOptions,
    ) -> Result<Self, DagError> {
        let _span = debug_span!(
            "build_dag",
            frames = lattice.frames,
            lattice_nodes = lattice.nodes.len(),
            lattice_edges = lattice.edges.len()
        )
        .entered();

        check_indices(lattice)?;

        // Merge occurrences.
        let mut occurrences: Vec<Occurrence> = Vec::new();
        let mut by_key: HashMap<(WordId, Frame), usize> = HashMap::new();
        let mut seq_to_occ = Vec::with_capacity(lattice.nodes.len());
        for (seq, n) in lattice.nodes.iter().enumerate() {
            let idx = *by_key.entry((n.word, n.start_frame)).or_insert_with(|| {
                occurrences.push(Occurrence {
                    word: n.word,
                    start_frame: n.start_frame,
                    first_end_frame: n.first_end_frame,
                    last_end_frame: n.last_end_frame,
                    seq,
                });
                occurrences.len() - 1
            });
            let occ = &mut occurrences[idx];
            occ.first_end_frame = occ.first_end_frame.min(n.first_end_frame);
            occ.last_end_frame = occ.last_end_frame.max(n.last_end_frame);
            seq_to_occ.push(idx);
        }

        // Allocate in descending start-frame order.
        let mut order: Vec<usize> = (0..occurrences.len()).collect();
        order.sort_by(|&a, &b| {
            let (a, b) = (&occurrences[a], &occurrences[b]);
            b.start_frame
                .cmp(&a.start_frame)
                .then(b.first_end_frame.cmp(&a.first_end_frame))
                .then(a.seq.cmp(&b.seq))
        });
        let mut occ_to_node = vec![NodeId(0); occurrences.len()];
        let mut nodes = Vec::with_capacity(occurrences.len());
        for (i, &occ_idx) in order.iter().enumerate() {
            let occ = &occurrences[occ_idx];
            occ_to_node[occ_idx] = NodeId(i as u32);
            nodes.push(DagNode {
                word: occ.word,
                seq: occ.seq,
                start_frame: occ.start_frame,
                first_end_frame: occ.first_end_frame,
                last_end_frame: occ.last_end_frame,
                reachable: false,
                succ: Vec::new(),
                pred: Vec::new(),
            });
        }
        let node_of = |seq: usize| occ_to_node[seq_to_occ[seq]];

        let start = dict.start_word();
        let is_root = |n: &DagNode| dict.base_word_id(n.word) == start && n.start_frame == 0;
        let initial = node_of(lattice.initial);
        let root = if is_root(&nodes[initial.index()]) {
            initial
        } else {
            (0..nodes.len())
                .rev()
                .find(|&i| is_root(&nodes[i]))
                .map(|i| NodeId(i as u32))
                .ok_or(DagError::MissingRoot)?
        };
        let exit = node_of(lattice.final_node);

        let exit_node = &nodes[exit.index()];
        let exit_ascr = lattice
            .best_segments
            .iter()
            .find(|s| node_of(s.seq) == exit && s.end_frame == exit_node.last_end_frame)
            .map_or(0, |s| s.ascr);

        let mut max_lm_ops = opts.max_lm_ops;
        let per_frame = opts.max_lm_ops_per_frame.saturating_mul(lattice.frames.max(0) as u64);
        if per_frame > 0 && per_frame < max_lm_ops {
            max_lm_ops = per_frame;
        }

        let mut dag = Dag {
            nodes,
            links: Vec::new(),
            root,
            exit,
            exit_ascr,
            entry: None,
            frames: lattice.frames,
            live_links: 0,
            bypass_links: 0,
            max_edges: opts.max_edges,
            max_lm_ops,
            exit_word: None,
            filler_removed: false,
            bypass_key: None,
            heuristic_ready: false,
        };

        let finish = dict.finish_word();
        let persistent = |n: &DagNode| n.last_end_frame - n.first_end_frame >= opts.min_ef_range - 1;

        for edge in &lattice.edges {
            let (from, to) = (node_of(edge.from), node_of(edge.to));
            let (pd, d) = (dag.node(from), dag.node(to));
            if dict.base_word_id(pd.word) == finish {
                continue;
            }
            if !((from == root || persistent(pd)) && (to == exit || persistent(d))) {
                continue;
            }
            if pd.start_frame >= d.start_frame {
                return Err(DagError::MalformedLattice {
                    line: None,
                    reason: format!(
                        "edge {} -> {} does not advance in time ({} >= {})",
                        edge.from, edge.to, pd.start_frame, d.start_frame
                    ),
                });
            }
            let end_frame = d.start_frame - 1;
            dag.add_link(from, to, edge.ascr, end_frame, None)?;
        }
        let file_links = dag.live_links;

        if opts.fudge > 0 {
            dag.add_fudge_links(lattice, dict, opts, &node_of)?;
        }

        debug!(
            nodes = dag.nodes.len(),
            links = dag.live_links,
            fudge_links = dag.live_links - file_links,
            max_lm_ops = dag.max_lm_ops,
            "DAG built"
        );
        Ok(dag)
    }

    /// Link nodes whose predecessor's first end frame overlaps their start by
    /// up to `fudge` frames. These links carry the predecessor's best-segment
    /// score at that end frame.
    fn add_fudge_links(
        &mut self,
        lattice: &Lattice,
        dict: &dyn Dictionary,
        opts: &BuildOptions,
        node_of: &dyn Fn(usize) -> NodeId,
    ) -> Result<(), DagError> {
        let frames = lattice.frames.max(0) as usize;
        let mut by_end: Vec<Vec<(NodeId, crate::Score)>> = vec![Vec::new(); frames];
        for seg in &lattice.best_segments {
            let node = node_of(seg.seq);
            if seg.end_frame == self.node(node).first_end_frame {
                by_end[seg.end_frame as usize].push((node, seg.ascr));
            }
        }

        let finish = dict.finish_word();
        let persistent =
            |n: &DagNode| n.last_end_frame - n.first_end_frame >= opts.min_ef_range - 1;
        for d in 0..self.nodes.len() {
            let to = NodeId(d as u32);
            let node = &self.nodes[d];
            if !persistent(node) {
                continue;
            }
            let sf = node.start_frame;
            let mut candidates = Vec::new();
            for f in sf..=sf + i32::from(opts.fudge) - 1 {
                if let Some(list) = usize::try_from(f).ok().and_then(|f| by_end.get(f)) {
                    candidates.extend_from_slice(list);
                }
            }
            for (from, ascr) in candidates {
                let pd = self.node(from);
                if pd.start_frame >= sf || dict.base_word_id(pd.word) == finish || !persistent(pd) {
                    continue;
                }
                self.add_link(from, to, ascr, sf - 1, None)?;
            }
        }
        Ok(())
    }
}
