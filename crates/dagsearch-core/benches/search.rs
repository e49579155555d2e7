use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use dagsearch_core::dag::{BestSegment, BuildOptions, Dag, Lattice, LatticeEdge, LatticeNode};
use dagsearch_core::dict::{Dictionary, Vocabulary, WordId};
use dagsearch_core::lm::LanguageModel;
use dagsearch_core::logmath::LogMath;
use dagsearch_core::search::{best_path, compute_heuristic, AstarConfig, AstarSession, Scorer};
use dagsearch_core::settings::FillerSettings;
use dagsearch_core::Score;

const VOCAB_SIZE: usize = 40;
const SLOT_FRAMES: i32 = 10;

fn bench_vocab() -> Vocabulary {
    let words: Vec<String> = (0..VOCAB_SIZE).map(|i| format!("w{i}")).collect();
    let refs: Vec<&str> = words.iter().map(String::as_str).collect();
    let fillers = FillerSettings {
        silence_prob: 0.1,
        filler_prob: 0.05,
    };
    Vocabulary::from_words(&refs, &["<sil>"], &LogMath::new(1.0003), &fillers)
}

/// Trigram scores from a multiplicative hash; no allocation per lookup.
struct MixModel;

impl MixModel {
    fn mix(words: [WordId; 3]) -> Score {
        let mut h = 0x811c_9dc5u32;
        for w in words {
            h = (h ^ w).wrapping_mul(0x0100_0193);
        }
        -((h % 2000) as Score)
    }
}

impl LanguageModel for MixModel {
    fn unigram_score(&self, w: WordId) -> Score {
        Self::mix([w, u32::MAX, u32::MAX])
    }

    fn bigram_score(&self, w1: WordId, w2: WordId) -> Score {
        Self::mix([w1, w2, u32::MAX])
    }

    fn trigram_score(&self, w1: WordId, w2: WordId, w3: WordId) -> Score {
        Self::mix([w1, w2, w3])
    }
}

/// `slots` consecutive time slots of `width` competing words each, fully
/// connected slot to slot. Every third slot also has a silence.
fn dense_lattice(vocab: &Vocabulary, slots: usize, width: usize) -> Lattice {
    let word = |w: &str| vocab.word_id(w).unwrap_or(0);
    let mut nodes = vec![LatticeNode {
        word: vocab.start_word(),
        start_frame: 0,
        first_end_frame: 0,
        last_end_frame: 0,
    }];
    let mut prev: Vec<usize> = vec![0];
    let mut edges = Vec::new();
    for k in 0..slots {
        let sf = 1 + k as i32 * SLOT_FRAMES;
        let mut cur = Vec::new();
        for i in 0..width {
            let w = word(&format!("w{}", (k * 7 + i) % VOCAB_SIZE));
            cur.push(nodes.len());
            nodes.push(LatticeNode {
                word: w,
                start_frame: sf,
                first_end_frame: sf + SLOT_FRAMES - 1,
                last_end_frame: sf + SLOT_FRAMES - 1,
            });
        }
        if k % 3 == 2 {
            cur.push(nodes.len());
            nodes.push(LatticeNode {
                word: word("<sil>"),
                start_frame: sf,
                first_end_frame: sf + SLOT_FRAMES - 1,
                last_end_frame: sf + SLOT_FRAMES - 1,
            });
        }
        for &p in &prev {
            for &s in &cur {
                let ascr = -(((p * 7919 + s * 104_729) % 500) as Score);
                edges.push(LatticeEdge { from: p, to: s, ascr });
            }
        }
        prev = cur;
    }
    let exit_sf = 1 + slots as i32 * SLOT_FRAMES;
    let exit = nodes.len();
    nodes.push(LatticeNode {
        word: vocab.finish_word(),
        start_frame: exit_sf,
        first_end_frame: exit_sf,
        last_end_frame: exit_sf,
    });
    for &p in &prev {
        edges.push(LatticeEdge {
            from: p,
            to: exit,
            ascr: -((p % 97) as Score),
        });
    }
    Lattice {
        frames: exit_sf + 1,
        nodes,
        initial: 0,
        final_node: exit,
        best_segments: vec![BestSegment {
            seq: exit,
            end_frame: exit_sf,
            ascr: -10,
        }],
        edges,
        log_base: Some(1.0003),
    }
}

fn build(vocab: &Vocabulary, slots: usize, width: usize) -> Dag {
    let lattice = dense_lattice(vocab, slots, width);
    let opts = BuildOptions {
        min_ef_range: 1,
        fudge: 0,
        ..BuildOptions::default()
    };
    Dag::build(&lattice, vocab, &opts).expect("bench lattice builds")
}

fn bench_best_path(c: &mut Criterion) {
    let vocab = bench_vocab();
    let lm = MixModel;
    let scorer = Scorer::new(&lm, &vocab, 9.5);
    let mut group = c.benchmark_group("search/best_path");
    for &(slots, width) in &[(10usize, 4usize), (40, 8), (100, 12)] {
        let mut dag = build(&vocab, slots, width);
        group.bench_with_input(
            BenchmarkId::new(format!("width{width}"), slots),
            &slots,
            |b, _| {
                b.iter(|| best_path(&mut dag, &scorer));
            },
        );
    }
    group.finish();
}

fn bench_nbest(c: &mut Criterion) {
    let vocab = bench_vocab();
    let lm = MixModel;
    let scorer = Scorer::new(&lm, &vocab, 9.5);
    let mut group = c.benchmark_group("search/nbest");
    for &(slots, width) in &[(6usize, 4usize), (12, 6)] {
        let mut dag = build(&vocab, slots, width);
        compute_heuristic(&mut dag, &scorer).expect("heuristic");
        for n in [1usize, 10, 100] {
            group.bench_with_input(BenchmarkId::new(format!("{slots}x{width}"), n), &n, |b, &n| {
                b.iter(|| {
                    let mut session = AstarSession::new(&dag, scorer, AstarConfig::default())
                        .expect("heuristic is ready");
                    session.nbest(n)
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_best_path, bench_nbest);
criterion_main!(benches);
