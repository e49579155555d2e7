use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::{debug, debug_span, trace};

use super::{Hypothesis, LmBudget, Scorer, SearchError, Segment};
use crate::dag::{Dag, NodeId};
use crate::dict::WordId;
use crate::logmath::LogMath;
use crate::settings::Settings;
use crate::Score;

#[derive(Debug, Clone)]
pub struct AstarConfig {
    /// Paths scoring more than this below the best total score seen so far
    /// are not queued. Non-negative.
    pub beam: Score,
    pub max_partial_paths: usize,
}

impl AstarConfig {
    pub fn from_settings(settings: &Settings, logmath: &LogMath) -> Self {
        Self {
            beam: logmath.log(settings.search.beam).saturating_neg().max(0),
            max_partial_paths: settings.search.max_partial_paths,
        }
    }
}

impl Default for AstarConfig {
    fn default() -> Self {
        Self {
            beam: Score::MAX,
            max_partial_paths: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct PathId(u32);

struct PartialPath {
    parent: Option<PathId>,
    /// Nearest non-filler ancestor, the LM context for this path's word.
    lm_history: Option<PathId>,
    node: NodeId,
    lscr: Score,
    pscr: Score,
    tscr: Score,
    hist_hash: u32,
    pruned: Cell<bool>,
}

#[derive(PartialEq, Eq)]
struct Queued {
    tscr: Score,
    path: PathId,
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // Best total score first; among equals, the earlier path.
        self.tscr
            .cmp(&other.tscr)
            .then_with(|| other.path.cmp(&self.path))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub popped: usize,
    pub expanded: usize,
    pub partial_paths: usize,
    pub lm_ops: u64,
    pub hypotheses: usize,
    pub best_score: Option<Score>,
    pub worst_score: Option<Score>,
}

/// Incremental A* N-best search over a DAG.
///
/// Partial paths are expanded best-first on `pscr + hscr`, where `hscr` is
/// the link heuristic from `compute_heuristic`. Two paths at the same node
/// whose LM histories name the same sequence of base words are duplicates:
/// only the better one is kept, so every hypothesis produced is a distinct
/// word sequence. Bypass links are not followed; fillers appear as words.
///
/// Once an error is returned or the queue runs dry, the session is finished
/// and yields no more hypotheses.
pub struct AstarSession<'a> {
    dag: &'a Dag,
    scorer: Scorer<'a>,
    config: AstarConfig,
    paths: Vec<PartialPath>,
    heap: BinaryHeap<Queued>,
    by_hash: HashMap<(NodeId, u32), Vec<PathId>>,
    emitted: HashSet<PathId>,
    budget: LmBudget,
    best_tscr: Option<Score>,
    stats: SearchStats,
    finished: bool,
}

impl<'a> AstarSession<'a> {
    pub fn new(dag: &'a Dag, scorer: Scorer<'a>, config: AstarConfig) -> Result<Self, SearchError> {
        if !dag.is_heuristic_ready() {
            return Err(SearchError::HeuristicMissing);
        }
        let root = dag.root();
        let mut session = Self {
            dag,
            scorer,
            config,
            paths: Vec::new(),
            heap: BinaryHeap::new(),
            by_hash: HashMap::new(),
            emitted: HashSet::new(),
            budget: LmBudget::new(dag.max_lm_ops()),
            best_tscr: None,
            stats: SearchStats::default(),
            finished: false,
        };
        let hash = dag.node(root).word;
        let id = session.push_path(PartialPath {
            parent: None,
            lm_history: None,
            node: root,
            lscr: 0,
            pscr: 0,
            tscr: 0,
            hist_hash: hash,
            pruned: Cell::new(false),
        });
        session.by_hash.entry((root, hash)).or_default().push(id);
        debug!(frames = dag.frames(), beam = session.config.beam, "A* session started");
        Ok(session)
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Next best hypothesis, or `None` when the search is exhausted.
    pub fn next_hypothesis(&mut self) -> Result<Option<Hypothesis>, SearchError> {
        if self.finished {
            return Ok(None);
        }
        let _span = debug_span!("next_hypothesis", n = self.stats.hypotheses).entered();
        match self.next_complete_path() {
            Ok(Some(id)) => {
                self.emitted.insert(id);
                let hyp = self.hypothesis(id);
                self.stats.hypotheses += 1;
                self.stats.best_score = Some(self.stats.best_score.map_or(hyp.score, |b| b.max(hyp.score)));
                self.stats.worst_score = Some(self.stats.worst_score.map_or(hyp.score, |w| w.min(hyp.score)));
                debug!(score = hyp.score, words = hyp.segments.len(), "hypothesis");
                Ok(Some(hyp))
            }
            Ok(None) => {
                self.finished = true;
                debug!(stats = ?self.stats, "A* search exhausted");
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                debug!(error = %e, stats = ?self.stats, "A* search aborted");
                Err(e)
            }
        }
    }

    /// Up to `n` hypotheses in score order.
    pub fn nbest(&mut self, n: usize) -> Result<Vec<Hypothesis>, SearchError> {
        let mut out = Vec::with_capacity(n.min(1024));
        while out.len() < n {
            match self.next_hypothesis()? {
                Some(h) => out.push(h),
                None => break,
            }
        }
        Ok(out)
    }

    fn push_path(&mut self, path: PartialPath) -> PathId {
        let id = PathId(self.paths.len() as u32);
        self.heap.push(Queued {
            tscr: path.tscr,
            path: id,
        });
        self.paths.push(path);
        self.stats.partial_paths = self.paths.len();
        id
    }

    fn path(&self, id: PathId) -> &PartialPath {
        &self.paths[id.0 as usize]
    }

    fn word(&self, id: PathId) -> WordId {
        self.dag.node(self.path(id).node).word
    }

    fn next_complete_path(&mut self) -> Result<Option<PathId>, SearchError> {
        let dag = self.dag;
        let exit = dag.exit();
        while let Some(Queued { path: top, .. }) = self.heap.pop() {
            self.stats.popped += 1;
            if self.path(top).pruned.get() {
                continue;
            }
            let node = self.path(top).node;
            if node == exit {
                return Ok(Some(top));
            }

            let lm_history = if self.scorer.is_filler(self.word(top)) {
                self.path(top).lm_history
            } else {
                Some(top)
            };
            let (w2, w1) = match lm_history {
                Some(h) => (self.path(h).lm_history.map(|p| self.word(p)), Some(self.word(h))),
                None => (None, None),
            };
            let base_hash = lm_history.map_or(0, |h| {
                let w = self.word(h);
                self.path(h)
                    .hist_hash
                    .wrapping_sub(w)
                    .wrapping_add(self.scorer.dict().base_word_id(w))
                    .rotate_right(5)
            });

            for &l in dag.succ(node) {
                let link = dag.link(l);
                if link.bypass.is_some() {
                    continue;
                }
                let Some(hscr) = link.heuristic() else {
                    continue;
                };
                let w = dag.node(link.to).word;
                let lscr = if self.scorer.is_filler(w) {
                    self.scorer.filler_penalty(w)
                } else {
                    self.budget.charge()?;
                    self.stats.lm_ops = self.budget.used();
                    self.scorer.lm_score(w2, w1, w)
                };
                let pscr = self.path(top).pscr.saturating_add(link.ascr).saturating_add(lscr);
                let tscr = pscr.saturating_add(hscr);
                if self.best_tscr.is_some_and(|best| tscr < best.saturating_sub(self.config.beam)) {
                    continue;
                }
                let hash = base_hash.wrapping_add(w);
                self.insert(top, lm_history, link.to, hash, lscr, pscr, tscr)?;
                if self.best_tscr.map_or(true, |best| tscr > best) {
                    self.best_tscr = Some(tscr);
                }
            }
            self.stats.expanded += 1;
        }
        Ok(None)
    }

    /// Queue a new path unless an equivalent one scores at least as well;
    /// an equivalent path scoring worse is marked pruned.
    #[allow(clippy::too_many_arguments)]
    fn insert(
        &mut self,
        parent: PathId,
        lm_history: Option<PathId>,
        node: NodeId,
        hash: u32,
        lscr: Score,
        pscr: Score,
        tscr: Score,
    ) -> Result<(), SearchError> {
        if let Some(candidates) = self.by_hash.get(&(node, hash)) {
            for &other in candidates {
                let existing = self.path(other);
                if existing.pruned.get() || !self.same_history(existing.lm_history, lm_history) {
                    continue;
                }
                if existing.pscr >= pscr || self.emitted.contains(&other) {
                    trace!(?node, pscr, "duplicate discarded");
                    return Ok(());
                }
                existing.pruned.set(true);
                break;
            }
        }

        if self.paths.len() >= self.config.max_partial_paths {
            return Err(SearchError::PartialPathBudgetExceeded {
                limit: self.config.max_partial_paths,
            });
        }
        let id = self.push_path(PartialPath {
            parent: Some(parent),
            lm_history,
            node,
            lscr,
            pscr,
            tscr,
            hist_hash: hash,
            pruned: Cell::new(false),
        });
        self.by_hash.entry((node, hash)).or_default().push(id);
        Ok(())
    }

    /// Whether two LM history chains name the same base-word sequence.
    fn same_history(&self, mut a: Option<PathId>, mut b: Option<PathId>) -> bool {
        let dict = self.scorer.dict();
        loop {
            match (a, b) {
                (None, None) => return true,
                (Some(x), Some(y)) => {
                    if x == y {
                        return true;
                    }
                    if dict.base_word_id(self.word(x)) != dict.base_word_id(self.word(y)) {
                        return false;
                    }
                    a = self.path(x).lm_history;
                    b = self.path(y).lm_history;
                }
                _ => return false,
            }
        }
    }

    fn hypothesis(&self, last: PathId) -> Hypothesis {
        let mut chain = Vec::new();
        let mut cur = Some(last);
        while let Some(id) = cur {
            chain.push(id);
            cur = self.path(id).parent;
        }
        chain.reverse();

        let dag = self.dag;
        let mut segments = Vec::with_capacity(chain.len());
        for (i, &id) in chain.iter().enumerate() {
            let p = self.path(id);
            let node = dag.node(p.node);
            let (end_frame, ascr) = match chain.get(i + 1) {
                Some(&next) => {
                    let n = self.path(next);
                    (dag.node(n.node).start_frame - 1, n.pscr - p.pscr - n.lscr)
                }
                None => (dag.frames() - 1, dag.exit_ascr()),
            };
            segments.push(Segment {
                word: node.word,
                start_frame: node.start_frame,
                end_frame,
                ascr,
                lscr: p.lscr,
            });
        }
        let score = self.path(last).pscr.saturating_add(dag.exit_ascr());
        Hypothesis { segments, score }
    }
}
