use tracing::{debug, debug_span};

use super::{Scorer, SearchError};
use crate::dag::{Dag, NodeId};

/// Compute each link's heuristic: the best score from the link's target to
/// the end of the utterance.
///
/// For `d → d1` the heuristic is 0 if `d1` is the exit, otherwise the best
/// over `d1 → d2` (non-filler `d2`) of `hscr(d1 → d2) + ascr(d1 → d2) +
/// lm(d2 | context)`. The context is `(d, d1)`, dropping fillers: a filler
/// `d` leaves only `d1`, a filler `d1` leaves only `d`. Links that cannot
/// reach the exit keep no heuristic and are never expanded.
///
/// Nodes are visited in allocation order, which puts every successor first.
/// Exact when the DAG has no fillers; otherwise an approximation.
pub fn compute_heuristic(dag: &mut Dag, scorer: &Scorer<'_>) -> Result<(), SearchError> {
    dag.bypass_fillers(scorer)?;
    if dag.heuristic_ready {
        return Ok(());
    }
    let _span = debug_span!("compute_heuristic", nodes = dag.node_count()).entered();

    let exit = dag.exit();
    let mut scored = 0usize;
    let ids: Vec<NodeId> = dag.node_ids().collect();
    for d in ids {
        let w = dag.node(d).word;
        let bw0 = (!scorer.is_filler(w)).then_some(w);
        let succ = dag.succ(d).to_vec();
        for l1 in succ {
            let d1 = dag.link(l1).to;
            let h = if d1 == exit {
                Some(0)
            } else {
                let w1 = dag.node(d1).word;
                let (ctx2, ctx1) = if scorer.is_filler(w1) {
                    (None, bw0)
                } else {
                    (bw0, Some(w1))
                };
                let mut best = None;
                for &l2 in dag.succ(d1) {
                    let link2 = dag.link(l2);
                    let w2 = dag.node(link2.to).word;
                    if scorer.is_filler(w2) {
                        continue;
                    }
                    let Some(h2) = link2.heuristic() else {
                        continue;
                    };
                    let s = h2
                        .saturating_add(link2.ascr)
                        .saturating_add(scorer.lm_score(ctx2, ctx1, w2));
                    if best.map_or(true, |b| s > b) {
                        best = Some(s);
                    }
                }
                best
            };
            if h.is_some() {
                scored += 1;
            }
            dag.link_mut(l1).hscr = h;
        }
    }
    dag.heuristic_ready = true;
    debug!(scored, "heuristic computed");
    Ok(())
}
