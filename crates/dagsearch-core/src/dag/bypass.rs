use tracing::{debug, debug_span};

use super::{Bypass, Dag, DagError, LinkId, NodeId};
use crate::scorer::Scorer;
use crate::{Frame, Score};

impl Dag {
    /// Prepare the DAG for search: coerce a filler exit word to `</s>`, drop
    /// nodes that cannot reach the exit, add a bypass link around every
    /// filler and add the root entry link.
    ///
    /// A bypass `p → s` stands for `p → filler → s` and scores
    /// `ascr(p → filler) + penalty(filler) + ascr(filler → s)`, with the
    /// penalty from `scorer`. Fillers are visited in allocation order, so runs
    /// of consecutive fillers collapse into chains of bypasses. When several
    /// routes connect the same pair, only the best-scoring bypass is kept.
    ///
    /// Calling this again with a scorer of the same weights is a no-op; with
    /// different weights the bypasses are rebuilt and the heuristic cleared.
    pub fn bypass_fillers(&mut self, scorer: &Scorer<'_>) -> Result<(), DagError> {
        let key = scorer.penalty_key();
        if self.filler_removed {
            if self.bypass_key == Some(key) {
                return Ok(());
            }
            let _span = debug_span!("rebuild_bypasses", nodes = self.nodes.len()).entered();
            let stale: Vec<LinkId> = self
                .link_ids()
                .filter(|&l| self.link(l).bypass.is_some())
                .collect();
            for l in stale {
                self.detach_link(l);
            }
            self.heuristic_ready = false;
            self.add_bypass_links(scorer)?;
            self.bypass_key = Some(key);
            debug!(bypass_links = self.bypass_links, "bypasses rebuilt for new weights");
            return Ok(());
        }
        let _span = debug_span!("bypass_fillers", nodes = self.nodes.len()).entered();
        let dict = scorer.dict();

        let exit_word = self.node(self.exit).word;
        if dict.is_filler(exit_word) {
            self.exit_word = Some(exit_word);
            self.set_node_word(self.exit, dict.finish_word());
        }

        let pruned = self.prune_unreachable();

        let before = self.bypass_links;
        self.add_bypass_links(scorer)?;

        self.add_entry_link();
        self.filler_removed = true;
        self.bypass_key = Some(key);
        debug!(
            pruned_nodes = pruned,
            bypass_links = self.bypass_links - before,
            links = self.live_links,
            "fillers bypassed"
        );
        Ok(())
    }

    fn add_bypass_links(&mut self, scorer: &Scorer<'_>) -> Result<(), DagError> {
        let dict = scorer.dict();
        for d in 0..self.nodes.len() {
            let filler = NodeId(d as u32);
            let word = self.nodes[d].word;
            if !self.nodes[d].reachable || !dict.is_filler(word) {
                continue;
            }
            let penalty = scorer.filler_penalty(word);
            let preds = self.nodes[d].pred.clone();
            let succs = self.nodes[d].succ.clone();
            for &head in &preds {
                let Some(from) = self.link(head).from else {
                    continue;
                };
                let base = self.link(head).ascr.saturating_add(penalty);
                let end_frame = self.link(head).end_frame;
                for &skipped in &succs {
                    let to = self.link(skipped).to;
                    if dict.is_filler(self.node(to).word) {
                        continue;
                    }
                    let ascr = base.saturating_add(self.link(skipped).ascr);
                    self.update_bypass_link(from, to, ascr, end_frame, Bypass { head, skipped })?;
                }
            }
            debug!(filler = ?filler, word, "bypassed");
        }
        Ok(())
    }

    /// Keep the better of an existing bypass `from → to` and the new route.
    fn update_bypass_link(
        &mut self,
        from: NodeId,
        to: NodeId,
        ascr: Score,
        end_frame: Frame,
        bypass: Bypass,
    ) -> Result<(), DagError> {
        let existing = self.nodes[from.index()]
            .succ
            .iter()
            .copied()
            .find(|&l| self.link(l).to == to && self.link(l).bypass.is_some());
        match existing {
            Some(l) => {
                let link = self.link_mut(l);
                if link.ascr < ascr {
                    link.ascr = ascr;
                    link.end_frame = end_frame;
                    link.bypass = Some(bypass);
                }
                Ok(())
            }
            None => self.add_link(from, to, ascr, end_frame, Some(bypass)).map(|_| ()),
        }
    }

    /// Mark nodes from which the exit is reachable and detach every link
    /// touching the rest. Returns the number of unreachable nodes.
    pub fn prune_unreachable(&mut self) -> usize {
        for node in &mut self.nodes {
            node.reachable = false;
        }
        let mut stack = vec![self.exit];
        self.nodes[self.exit.index()].reachable = true;
        while let Some(n) = stack.pop() {
            for i in 0..self.nodes[n.index()].pred.len() {
                let l = self.nodes[n.index()].pred[i];
                if let Some(p) = self.link(l).from {
                    if !self.nodes[p.index()].reachable {
                        self.nodes[p.index()].reachable = true;
                        stack.push(p);
                    }
                }
            }
        }

        let dead: Vec<LinkId> = self
            .link_ids()
            .filter(|&l| {
                let link = self.link(l);
                !self.is_reachable(link.to) || link.from.is_some_and(|f| !self.is_reachable(f))
            })
            .collect();
        for l in dead {
            self.detach_link(l);
        }
        self.nodes.iter().filter(|n| !n.reachable).count()
    }
}
