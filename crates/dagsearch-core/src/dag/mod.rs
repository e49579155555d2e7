//! Word-occurrence DAG.
//!
//! Nodes are unique `(word, start_frame)` occurrences; links connect a node to
//! a successor that starts right after one of its end frames. Nodes and links
//! live in arenas owned by `Dag` and are referred to by `NodeId` / `LinkId`.
//!
//! Nodes are allocated in descending start-frame order and every link goes
//! from an earlier start frame to a later one, so allocation order is a
//! reverse topological order: a node's successors are always allocated first.

mod build;
mod bypass;
mod lattice;

pub use build::BuildOptions;
pub use lattice::{BestSegment, Lattice, LatticeEdge, LatticeNode};

use std::io;

use crate::dict::WordId;
use crate::{Frame, Score};

#[derive(Debug, thiserror::Error)]
pub enum DagError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed lattice{}: {}", line_suffix(.line), .reason)]
    MalformedLattice { line: Option<usize>, reason: String },

    #[error("unknown word '{word}' at line {line}")]
    UnknownWord { word: String, line: usize },

    #[error("DAG exceeds {limit} links")]
    EdgeBudgetExceeded { limit: usize },

    #[error("no <s> node starting at frame 0")]
    MissingRoot,
}

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|l| format!(" at line {l}")).unwrap_or_default()
}

impl DagError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedLattice {
            line: Some(line),
            reason: reason.into(),
        }
    }

    /// A structural problem not tied to one line of the file.
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::MalformedLattice {
            line: None,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl LinkId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A unique `(word, start_frame)` occurrence.
#[derive(Debug, Clone)]
pub struct DagNode {
    pub word: WordId,
    /// Lattice sequence number of the first occurrence merged into this node.
    pub seq: usize,
    pub start_frame: Frame,
    pub first_end_frame: Frame,
    pub last_end_frame: Frame,
    pub(crate) reachable: bool,
    pub(crate) succ: Vec<LinkId>,
    pub(crate) pred: Vec<LinkId>,
}

/// A filler bypass stands for `from → filler → to`: `head` is the link into
/// the filler, `skipped` the filler's own outgoing link (itself possibly a
/// bypass, for runs of consecutive fillers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bypass {
    pub head: LinkId,
    pub skipped: LinkId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkEval {
    Unevaluated,
    Evaluating,
    Valid,
}

#[derive(Debug, Clone)]
pub struct DagLink {
    /// `None` only for the synthetic entry link into the root.
    pub from: Option<NodeId>,
    pub to: NodeId,
    /// Acoustic score of `from` (plus bypassed fillers) ending at `end_frame`.
    pub ascr: Score,
    pub end_frame: Frame,
    pub bypass: Option<Bypass>,
    pub(crate) lscr: Score,
    pub(crate) hscr: Option<Score>,
    pub(crate) pscr: Option<Score>,
    pub(crate) eval: LinkEval,
    pub(crate) history: Option<LinkId>,
    pub(crate) live: bool,
}

impl DagLink {
    /// LM score applied on this link by the last best-path search.
    pub fn lm_score(&self) -> Score {
        self.lscr
    }

    /// Best path score up to and including this link, if evaluated.
    pub fn path_score(&self) -> Option<Score> {
        self.pscr
    }

    /// Upper bound on the score from this link's target to the exit.
    pub fn heuristic(&self) -> Option<Score> {
        self.hscr
    }

    pub fn is_live(&self) -> bool {
        self.live
    }
}

#[derive(Debug, Clone)]
pub struct Dag {
    nodes: Vec<DagNode>,
    links: Vec<DagLink>,
    root: NodeId,
    exit: NodeId,
    exit_ascr: Score,
    entry: Option<LinkId>,
    frames: Frame,
    live_links: usize,
    bypass_links: usize,
    max_edges: usize,
    max_lm_ops: u64,
    exit_word: Option<WordId>,
    pub(crate) filler_removed: bool,
    /// Scorer weights the bypass scores were computed with.
    pub(crate) bypass_key: Option<(u64, Score)>,
    pub(crate) heuristic_ready: bool,
}

impl Dag {
    pub fn node(&self, id: NodeId) -> &DagNode {
        &self.nodes[id.index()]
    }

    pub fn link(&self, id: LinkId) -> &DagLink {
        &self.links[id.index()]
    }

    /// Node ids in allocation order (descending start frame).
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Live links, bypasses and the entry link included.
    pub fn link_ids(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.links
            .iter()
            .enumerate()
            .filter(|(_, l)| l.live)
            .map(|(i, _)| LinkId(i as u32))
    }

    pub fn succ(&self, id: NodeId) -> &[LinkId] {
        &self.nodes[id.index()].succ
    }

    pub fn pred(&self, id: NodeId) -> &[LinkId] {
        &self.nodes[id.index()].pred
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn exit(&self) -> NodeId {
        self.exit
    }

    /// Acoustic score of the exit word ending in the utterance's last frame.
    pub fn exit_ascr(&self) -> Score {
        self.exit_ascr
    }

    pub fn entry_link(&self) -> Option<LinkId> {
        self.entry
    }

    pub fn frames(&self) -> Frame {
        self.frames
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Live links counted against the edge budget (bypasses included, the
    /// entry link excluded).
    pub fn link_count(&self) -> usize {
        self.live_links
    }

    pub fn bypass_count(&self) -> usize {
        self.bypass_links
    }

    pub fn max_lm_ops(&self) -> u64 {
        self.max_lm_ops
    }

    pub fn is_filler_removed(&self) -> bool {
        self.filler_removed
    }

    pub fn is_heuristic_ready(&self) -> bool {
        self.heuristic_ready
    }

    /// The exit's lattice word, if it was a filler coerced to `</s>`.
    pub fn original_exit_word(&self) -> Option<WordId> {
        self.exit_word
    }

    pub fn is_reachable(&self, id: NodeId) -> bool {
        self.nodes[id.index()].reachable
    }

    pub(crate) fn link_mut(&mut self, id: LinkId) -> &mut DagLink {
        &mut self.links[id.index()]
    }

    pub(crate) fn set_node_word(&mut self, id: NodeId, word: WordId) {
        self.nodes[id.index()].word = word;
    }

    fn push_link(&mut self, link: DagLink) -> LinkId {
        let id = LinkId(self.links.len() as u32);
        if let Some(from) = link.from {
            self.nodes[from.index()].succ.push(id);
        }
        self.nodes[link.to.index()].pred.push(id);
        self.links.push(link);
        id
    }

    /// Add a link counted against the edge budget.
    pub(crate) fn add_link(
        &mut self,
        from: NodeId,
        to: NodeId,
        ascr: Score,
        end_frame: Frame,
        bypass: Option<Bypass>,
    ) -> Result<LinkId, DagError> {
        debug_assert!(self.node(from).start_frame < self.node(to).start_frame);
        let id = self.push_link(DagLink {
            from: Some(from),
            to,
            ascr,
            end_frame,
            bypass,
            lscr: 0,
            hscr: None,
            pscr: None,
            eval: LinkEval::Unevaluated,
            history: None,
            live: true,
        });
        self.live_links += 1;
        if bypass.is_some() {
            self.bypass_links += 1;
        }
        if self.live_links > self.max_edges {
            return Err(DagError::EdgeBudgetExceeded {
                limit: self.max_edges,
            });
        }
        Ok(id)
    }

    /// Add the synthetic root entry link. Not counted against the budget.
    pub(crate) fn add_entry_link(&mut self) -> LinkId {
        if let Some(id) = self.entry {
            return id;
        }
        let id = self.push_link(DagLink {
            from: None,
            to: self.root,
            ascr: 0,
            end_frame: -1,
            bypass: None,
            lscr: 0,
            hscr: None,
            pscr: None,
            eval: LinkEval::Unevaluated,
            history: None,
            live: true,
        });
        self.entry = Some(id);
        id
    }

    pub(crate) fn detach_link(&mut self, id: LinkId) {
        let link = &mut self.links[id.index()];
        if !link.live {
            return;
        }
        link.live = false;
        let (from, to, bypass) = (link.from, link.to, link.bypass.is_some());
        if let Some(from) = from {
            self.nodes[from.index()].succ.retain(|&l| l != id);
        }
        self.nodes[to.index()].pred.retain(|&l| l != id);
        if Some(id) == self.entry {
            self.entry = None;
        } else {
            self.live_links -= 1;
            if bypass {
                self.bypass_links -= 1;
            }
        }
    }

    /// Clear best-path memo state so the search can run again.
    pub(crate) fn reset_path_scores(&mut self) {
        for link in &mut self.links {
            link.pscr = None;
            link.lscr = 0;
            link.history = None;
            link.eval = LinkEval::Unevaluated;
        }
    }
}
