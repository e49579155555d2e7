use tracing::{debug, debug_span};

use super::{backtrace, Hypothesis, LmBudget, Scorer, SearchError};
use crate::dag::{Dag, LinkEval, LinkId};
use crate::Score;

/// Find the best-scoring hypothesis through the DAG.
///
/// Every link `l = d → s` gets a path score: the best over predecessor links
/// `pl = pd → d` of `pscr(pl) + ascr(l) + lm(s | pd d)`, with the entry link
/// scoring 0. Predecessor links leaving a filler are skipped; their bypasses
/// stand in for them, so LM context always spans non-filler words. The LM is
/// consulted only when the acoustic part alone could improve the current
/// best, and each consultation counts against the DAG's LM budget.
///
/// Memo state lives on the links and is reset on entry, so the search can be
/// rerun on the same DAG.
pub fn best_path(dag: &mut Dag, scorer: &Scorer<'_>) -> Result<Hypothesis, SearchError> {
    let _span = debug_span!(
        "best_path",
        frames = dag.frames(),
        nodes = dag.node_count(),
        links = dag.link_count()
    )
    .entered();

    dag.bypass_fillers(scorer)?;
    check_score_signs(dag)?;
    dag.reset_path_scores();

    let mut budget = LmBudget::new(dag.max_lm_ops());
    let exit = dag.exit();
    let mut best: Option<(Score, LinkId)> = None;
    let finals: Vec<LinkId> = dag.pred(exit).to_vec();
    for l in finals {
        let Some(from) = dag.link(l).from else {
            continue;
        };
        if scorer.is_filler(dag.node(from).word) {
            continue;
        }
        evaluate(dag, scorer, &mut budget, l)?;
        if let Some(p) = dag.link(l).path_score() {
            if best.map_or(true, |(b, _)| p > b) {
                best = Some((p, l));
            }
        }
    }

    let (_, last) = best.ok_or(SearchError::NoPath)?;
    let hyp = backtrace(dag, scorer, last)?;
    debug!(
        score = hyp.score,
        words = hyp.segments.len(),
        lm_ops = budget.used(),
        "best path found"
    );
    Ok(hyp)
}

fn check_score_signs(dag: &Dag) -> Result<(), SearchError> {
    for l in dag.link_ids() {
        let link = dag.link(l);
        if link.ascr > 0 {
            return Err(SearchError::InvalidScoreSign {
                from: link.from,
                to: link.to,
                score: link.ascr,
            });
        }
    }
    Ok(())
}

/// Compute the path score of `target` and every link it depends on.
///
/// Depth-first over predecessor links with an explicit stack; each frame
/// holds a link and the index of the next predecessor to fold in.
fn evaluate(
    dag: &mut Dag,
    scorer: &Scorer<'_>,
    budget: &mut LmBudget,
    target: LinkId,
) -> Result<(), SearchError> {
    if dag.link(target).eval == LinkEval::Valid {
        return Ok(());
    }
    dag.link_mut(target).eval = LinkEval::Evaluating;
    let mut stack: Vec<(LinkId, usize)> = vec![(target, 0)];

    while let Some(&(l, cursor)) = stack.last() {
        let Some(src) = dag.link(l).from else {
            // Entry link.
            let link = dag.link_mut(l);
            link.pscr = Some(0);
            link.lscr = 0;
            link.history = None;
            link.eval = LinkEval::Valid;
            stack.pop();
            continue;
        };
        let Some(&pl) = dag.pred(src).get(cursor) else {
            dag.link_mut(l).eval = LinkEval::Valid;
            stack.pop();
            continue;
        };
        if let Some(top) = stack.last_mut() {
            top.1 += 1;
        }
        if dag
            .link(pl)
            .from
            .is_some_and(|pd| scorer.is_filler(dag.node(pd).word))
        {
            continue;
        }
        match dag.link(pl).eval {
            LinkEval::Valid => relax(dag, scorer, budget, l, pl)?,
            LinkEval::Evaluating => {
                return Err(SearchError::Inconsistent(format!(
                    "link {pl:?} reached again while being evaluated"
                )))
            }
            LinkEval::Unevaluated => {
                // Revisit this predecessor once it is scored.
                if let Some(top) = stack.last_mut() {
                    top.1 -= 1;
                }
                dag.link_mut(pl).eval = LinkEval::Evaluating;
                stack.push((pl, 0));
            }
        }
    }
    Ok(())
}

/// Fold predecessor `pl` into `l`'s best path score.
fn relax(
    dag: &mut Dag,
    scorer: &Scorer<'_>,
    budget: &mut LmBudget,
    l: LinkId,
    pl: LinkId,
) -> Result<(), SearchError> {
    let Some(prev) = dag.link(pl).path_score() else {
        return Ok(());
    };
    let link = dag.link(l);
    let acoustic = prev.saturating_add(link.ascr);
    if link.path_score().is_some_and(|best| acoustic <= best) {
        return Ok(());
    }
    let Some(src) = link.from else {
        return Ok(());
    };
    let w = dag.node(link.to).word;
    let w1 = dag.node(src).word;
    let w2 = dag.link(pl).from.map(|pd| dag.node(pd).word);

    budget.charge()?;
    let lscr = scorer.lm_score(w2, Some(w1), w);
    let score = acoustic.saturating_add(lscr);

    let link = dag.link_mut(l);
    if link.pscr.map_or(true, |best| score > best) {
        link.pscr = Some(score);
        link.lscr = lscr;
        link.history = Some(pl);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::Dictionary;
    use crate::lm::FlatModel;
    use crate::testutil::{sample_dag, test_vocab, HashedModel};

    #[test]
    fn sample_prefers_filler_route_on_acoustics() {
        let vocab = test_vocab();
        let mut dag = sample_dag(&vocab);
        let lm = FlatModel(0);
        let scorer = Scorer::new(&lm, &vocab, 1.0);
        let hyp = best_path(&mut dag, &scorer).unwrap();
        let sil = vocab.word_id("<sil>").unwrap();
        assert_eq!(hyp.words(&vocab), vec!["<s>", "b", "<sil>", "</s>"]);
        assert_eq!(hyp.score, -110 - 180 - 50 - 30 + vocab.filler_penalty(sil));
    }

    #[test]
    fn filler_penalty_can_flip_the_decision() {
        let vocab = test_vocab();
        let mut dag = sample_dag(&vocab);
        // Every non-filler word costs -100; the filler route scores one word fewer.
        let lm = FlatModel(-100);
        let scorer = Scorer::new(&lm, &vocab, 1.0);
        let hyp = best_path(&mut dag, &scorer).unwrap();
        assert_eq!(hyp.words(&vocab), vec!["<s>", "b", "<sil>", "</s>"]);

        let mut dag = sample_dag(&vocab);
        let strong = test_vocab_heavy_fillers();
        let scorer = Scorer::new(&lm, &strong, 1.0);
        let hyp = best_path(&mut dag, &scorer).unwrap();
        assert_eq!(hyp.words(&strong), vec!["<s>", "a", "c", "</s>"]);
    }

    #[test]
    fn lm_weight_scales_filler_penalty() {
        let vocab = test_vocab();
        let lm = FlatModel(0);
        let sil = vocab.word_id("<sil>").unwrap();

        let mut dag = sample_dag(&vocab);
        let plain = Scorer::new(&lm, &vocab, 1.0);
        let hyp = best_path(&mut dag, &plain).unwrap();
        assert_eq!(hyp.words(&vocab), vec!["<s>", "b", "<sil>", "</s>"]);

        // Both routes carry three scored words, so the insertion penalty
        // cancels out and only the weighted `<sil>` penalty decides.
        let weighted = Scorer::new(&lm, &vocab, 5.0).with_word_penalty(-20);
        assert!(-340 + weighted.filler_penalty(sil) - 20 < -470 - 20);
        let hyp = best_path(&mut dag, &weighted).unwrap();
        assert_eq!(hyp.words(&vocab), vec!["<s>", "a", "c", "</s>"]);
        assert_eq!(hyp.score, -100 - 220 - 150 - 30 + 3 * -20);
        assert_eq!(hyp.lm_score(), 3 * -20);
    }

    fn test_vocab_heavy_fillers() -> crate::dict::Vocabulary {
        crate::dict::Vocabulary::from_words(
            &["a", "b", "c", "d"],
            &["<sil>", "++noise++"],
            &crate::logmath::LogMath::new(1.0003),
            &crate::settings::FillerSettings {
                silence_prob: 0.5,
                filler_prob: 0.5,
            },
        )
    }

    #[test]
    fn rerun_gives_same_result() {
        let vocab = test_vocab();
        let mut dag = sample_dag(&vocab);
        let lm = HashedModel { max: 40 };
        let scorer = Scorer::new(&lm, &vocab, 1.0);
        let first = best_path(&mut dag, &scorer).unwrap();
        let second = best_path(&mut dag, &scorer).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn positive_acoustic_score_is_rejected() {
        let vocab = test_vocab();
        let text = crate::testutil::SAMPLE_LATTICE.replace("4 5 -150", "4 5 15");
        let lat = crate::dag::Lattice::parse(&text, &vocab).unwrap();
        let mut dag = Dag::build(&lat, &vocab, &crate::testutil::loose_options()).unwrap();
        let lm = FlatModel(0);
        let scorer = Scorer::new(&lm, &vocab, 1.0);
        assert!(matches!(
            best_path(&mut dag, &scorer),
            Err(SearchError::InvalidScoreSign { score: 15, .. })
        ));
    }

    #[test]
    fn lm_budget_aborts_search() {
        let vocab = test_vocab();
        let lat = crate::dag::Lattice::parse(crate::testutil::SAMPLE_LATTICE, &vocab).unwrap();
        let opts = crate::dag::BuildOptions {
            max_lm_ops: 2,
            ..crate::testutil::loose_options()
        };
        let mut dag = Dag::build(&lat, &vocab, &opts).unwrap();
        let lm = FlatModel(0);
        let scorer = Scorer::new(&lm, &vocab, 1.0);
        assert!(matches!(
            best_path(&mut dag, &scorer),
            Err(SearchError::LmBudgetExceeded { limit: 2 })
        ));
    }
}
