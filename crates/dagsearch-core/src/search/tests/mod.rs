
use crate::dag::{Dag, Lattice, LatticeEdge, LatticeNode};
use crate::dict::{Dictionary, WordId};
use crate::testutil::loose_options;
use crate::Frame;

/// Build a DAG from `(word, start, first_end, last_end)` occurrences and
/// `(from, to, ascr)` edges. The first occurrence is initial, the last final.
pub(super) fn dag_from(
    dict: &dyn Dictionary,
    frames: Frame,
    nodes: &[(&str, Frame, Frame, Frame)],
    edges: &[(usize, usize, i32)],
) -> Dag {
    let word = |w: &str| -> WordId { dict.word_id(w).unwrap() };
    let lattice = Lattice {
        frames,
        nodes: nodes
            .iter()
            .map(|&(w, sf, fef, lef)| LatticeNode {
                word: word(w),
                start_frame: sf,
                first_end_frame: fef,
                last_end_frame: lef,
            })
            .collect(),
        initial: 0,
        final_node: nodes.len() - 1,
        best_segments: vec![],
        edges: edges
            .iter()
            .map(|&(from, to, ascr)| LatticeEdge { from, to, ascr })
            .collect(),
        log_base: None,
    };
    Dag::build(&lattice, dict, &loose_options()).unwrap()
}
