#![cfg(test)]

use proptest::prelude::*;

use crate::dag::{BestSegment, BuildOptions, Dag, Lattice, LatticeEdge, LatticeNode};
use crate::dict::{Dictionary, Vocabulary, WordId};
use crate::lm::{FlatModel, LanguageModel};
use crate::logmath::LogMath;
use crate::scorer::Scorer;
use crate::settings::FillerSettings;
use crate::{Frame, Score};

pub const LOG_BASE: f64 = 1.0003;

/// Shared test dictionary: content words `a`..`d` plus two fillers.
pub fn test_vocab() -> Vocabulary {
    let fillers = FillerSettings {
        silence_prob: 0.99,
        filler_prob: 0.9,
    };
    Vocabulary::from_words(
        &["a", "b", "c", "d"],
        &["<sil>", "++noise++"],
        &LogMath::new(LOG_BASE),
        &fillers,
    )
}

static FLAT: FlatModel = FlatModel(0);

/// Acoustics-only scorer: flat LM, unit weight and no insertion penalty, so
/// filler penalties are the dictionary's own.
pub fn flat_scorer(dict: &dyn Dictionary) -> Scorer<'_> {
    Scorer::new(&FLAT, dict, 1.0)
}

/// Six nodes over 40 frames; `<s> b <sil> </s>` wins on acoustics alone.
pub const SAMPLE_LATTICE: &str = "\
# -logbase 1.0003
Frames 40
Nodes 6 (NODEID WORD STARTFRAME FIRST-ENDFRAME LAST-ENDFRAME)
0 <s> 0 8 10
1 a 9 18 20
2 b 11 18 20
3 <sil> 19 24 26
4 c 21 24 26
5 </s> 27 39 39
Initial 0
Final 5
BestSegAscr 1 (NODEID ENDFRAME ASCORE)
5 39 -30
Edges (FROM-NODEID TO-NODEID ASCORE)
0 1 -100
0 2 -110
1 3 -200
2 3 -180
1 4 -220
3 5 -50
4 5 -150
End
";

pub fn sample_dag(vocab: &Vocabulary) -> Dag {
    let lat = Lattice::parse(SAMPLE_LATTICE, vocab).unwrap();
    Dag::build(&lat, vocab, &loose_options()).unwrap()
}

/// Build options that link every node and add no fudge links.
pub fn loose_options() -> BuildOptions {
    BuildOptions {
        min_ef_range: 1,
        fudge: 0,
        ..BuildOptions::default()
    }
}

/// Deterministic pseudo-random trigram model: every context gets its own
/// score in `-max..=0`.
pub struct HashedModel {
    pub max: Score,
}

impl HashedModel {
    fn mix(&self, words: [u64; 3], order: u64) -> Score {
        let mut h = 0xcbf2_9ce4_8422_2325u64 ^ order;
        for w in words {
            h ^= w.wrapping_add(1);
            h = h.wrapping_mul(0x0000_0100_0000_01b3);
        }
        -((h % (self.max as u64 + 1)) as Score)
    }
}

impl LanguageModel for HashedModel {
    fn unigram_score(&self, w: WordId) -> Score {
        self.mix([u64::from(w), 0, 0], 1)
    }

    fn bigram_score(&self, w1: WordId, w2: WordId) -> Score {
        self.mix([u64::from(w1), u64::from(w2), 0], 2)
    }

    fn trigram_score(&self, w1: WordId, w2: WordId, w3: WordId) -> Score {
        self.mix([u64::from(w1), u64::from(w2), u64::from(w3)], 3)
    }
}

/// A complete root-to-exit path found by exhaustive enumeration.
#[derive(Debug, Clone)]
pub struct EnumeratedPath {
    pub score: Score,
    /// Every node word, fillers included.
    pub words: Vec<WordId>,
}

/// Enumerate every root-to-exit path over non-bypass links and score it the
/// way the searches do: link acoustic scores, LM scores over the two
/// preceding non-filler words, filler penalties, and the exit's own score.
pub fn enumerate_paths(dag: &Dag, scorer: &Scorer<'_>) -> Vec<EnumeratedPath> {
    let mut out = Vec::new();
    let mut words = vec![dag.node(dag.root()).word];
    walk(dag, scorer, dag.root(), 0, &mut words, &mut out);
    out
}

fn walk(
    dag: &Dag,
    scorer: &Scorer<'_>,
    node: crate::dag::NodeId,
    score: Score,
    words: &mut Vec<WordId>,
    out: &mut Vec<EnumeratedPath>,
) {
    if node == dag.exit() {
        out.push(EnumeratedPath {
            score: score + dag.exit_ascr(),
            words: words.clone(),
        });
        return;
    }
    for &l in dag.succ(node) {
        let link = dag.link(l);
        if link.bypass.is_some() {
            continue;
        }
        let w = dag.node(link.to).word;
        let lscr = if scorer.is_filler(w) {
            scorer.filler_penalty(w)
        } else {
            let ctx: Vec<WordId> = words
                .iter()
                .rev()
                .filter(|&&x| !scorer.is_filler(x))
                .take(2)
                .copied()
                .collect();
            scorer.lm_score(ctx.get(1).copied(), ctx.first().copied(), w)
        };
        words.push(w);
        walk(dag, scorer, link.to, score + link.ascr + lscr, words, out);
        words.pop();
    }
}

/// Base-word sequence without fillers.
pub fn strip_fillers(words: &[WordId], dict: &dyn Dictionary) -> Vec<WordId> {
    words
        .iter()
        .filter(|&&w| !dict.is_filler(w))
        .map(|&w| dict.base_word_id(w))
        .collect()
}

/// Random lattice over 12 frames: `<s>` at frame 0, `</s>` at frame 11 and
/// up to `max_inner` word occurrences in between, linked wherever one ends
/// right before another starts.
pub fn arb_lattice(with_fillers: bool, max_inner: usize) -> impl Strategy<Value = Lattice> {
    let vocab = test_vocab();
    let mut pool: Vec<WordId> = ["a", "b", "c"]
        .iter()
        .map(|w| vocab.word_id(w).unwrap())
        .collect();
    if with_fillers {
        pool.push(vocab.word_id("<sil>").unwrap());
        pool.push(vocab.word_id("++noise++").unwrap());
    }
    let start = vocab.start_word();
    let finish = vocab.finish_word();

    let inner = prop::collection::vec(
        (prop::sample::select(pool), 1..=9i32, 0..=1i32, 0..=1i32),
        1..=max_inner,
    );
    let edges = prop::collection::vec((prop::bool::weighted(0.8), -60..=0i32), 64);
    (inner, edges, 0..=1i32, -20..=0i32).prop_map(move |(inner, edge_bits, root_extra, exit_ascr)| {
        const FRAMES: Frame = 12;
        let mut nodes = vec![LatticeNode {
            word: start,
            start_frame: 0,
            first_end_frame: 0,
            last_end_frame: root_extra,
        }];
        for (word, sf, len, extra) in inner {
            let fef = (sf + len).min(FRAMES - 2);
            nodes.push(LatticeNode {
                word,
                start_frame: sf,
                first_end_frame: fef,
                last_end_frame: (fef + extra).min(FRAMES - 2),
            });
        }
        let exit = nodes.len();
        nodes.push(LatticeNode {
            word: finish,
            start_frame: FRAMES - 1,
            first_end_frame: FRAMES - 1,
            last_end_frame: FRAMES - 1,
        });

        let mut bits = edge_bits.into_iter().cycle();
        let mut edges = Vec::new();
        for (i, p) in nodes.iter().enumerate() {
            if i == exit {
                continue;
            }
            for (j, s) in nodes.iter().enumerate() {
                let adjacent = (p.first_end_frame..=p.last_end_frame).contains(&(s.start_frame - 1));
                if j == 0 || !adjacent {
                    continue;
                }
                if let Some((keep, ascr)) = bits.next() {
                    if keep {
                        edges.push(LatticeEdge { from: i, to: j, ascr });
                    }
                }
            }
        }

        Lattice {
            frames: FRAMES,
            nodes,
            initial: 0,
            final_node: exit,
            best_segments: vec![BestSegment {
                seq: exit,
                end_frame: FRAMES - 1,
                ascr: exit_ascr,
            }],
            edges,
            log_base: Some(LOG_BASE),
        }
    })
}
