use super::{Hypothesis, SearchError, Segment};
use crate::dag::{Bypass, Dag, LinkId, NodeId};
use crate::scorer::Scorer;
use crate::Score;

/// Recover the hypothesis ending with link `last` (a link into the exit)
/// from the best-path memo.
///
/// Each link on the history chain contributes its source word, scored with
/// the link's acoustic score and the LM score of the link before it. Bypass
/// links expand back into the fillers they skipped, each filler carrying its
/// weighted penalty as LM score. The segment scores always sum to the path score plus
/// the exit's acoustic score; anything else means the memo is corrupt.
pub fn backtrace(dag: &Dag, scorer: &Scorer<'_>, last: LinkId) -> Result<Hypothesis, SearchError> {
    let end = dag.link(last);
    let path_score = end.path_score().ok_or(SearchError::NoPath)?;
    if end.to != dag.exit() {
        return Err(SearchError::Inconsistent(format!(
            "backtrace must start at a link into the exit, got {last:?}"
        )));
    }

    let exit = dag.node(dag.exit());
    let mut rev = vec![Segment {
        word: exit.word,
        start_frame: exit.start_frame,
        end_frame: dag.frames() - 1,
        ascr: dag.exit_ascr(),
        lscr: end.lm_score(),
    }];

    let mut cur = Some(last);
    let mut steps = 0usize;
    while let Some(l) = cur {
        steps += 1;
        if steps > dag.node_count() + 1 {
            return Err(SearchError::Inconsistent("history chain does not terminate".to_string()));
        }
        let link = dag.link(l);
        let Some(src) = link.from else {
            break;
        };
        let history = link.history.ok_or_else(|| {
            SearchError::Inconsistent(format!("scored link {l:?} has no history"))
        })?;
        let lscr_in = dag.link(history).lm_score();
        match link.bypass {
            None => rev.push(segment(dag, src, link.end_frame, link.ascr, lscr_in)),
            Some(bypass) => {
                let expanded = expand_bypass(dag, scorer, src, bypass, lscr_in);
                rev.extend(expanded.into_iter().rev());
            }
        }
        cur = Some(history);
    }
    rev.reverse();

    let score = rev
        .iter()
        .fold(0 as Score, |acc, s| acc.saturating_add(s.ascr).saturating_add(s.lscr));
    let expected = path_score.saturating_add(dag.exit_ascr());
    if score != expected {
        return Err(SearchError::Inconsistent(format!(
            "segment scores sum to {score}, path score is {expected}"
        )));
    }
    Ok(Hypothesis {
        segments: rev,
        score,
    })
}

fn segment(dag: &Dag, node: NodeId, end_frame: crate::Frame, ascr: Score, lscr: Score) -> Segment {
    let n = dag.node(node);
    Segment {
        word: n.word,
        start_frame: n.start_frame,
        end_frame,
        ascr,
        lscr,
    }
}

/// Segments, in time order, for `src` followed by the fillers a bypass skips.
fn expand_bypass(
    dag: &Dag,
    scorer: &Scorer<'_>,
    src: NodeId,
    bypass: Bypass,
    lscr_in: Score,
) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut node = src;
    let mut lscr = lscr_in;
    let mut bypass = bypass;
    loop {
        let head = dag.link(bypass.head);
        out.push(segment(dag, node, head.end_frame, head.ascr, lscr));
        let filler = head.to;
        lscr = scorer.filler_penalty(dag.node(filler).word);
        let skipped = dag.link(bypass.skipped);
        match skipped.bypass {
            Some(next) => {
                node = filler;
                bypass = next;
            }
            None => {
                out.push(segment(dag, filler, skipped.end_frame, skipped.ascr, lscr));
                return out;
            }
        }
    }
}
