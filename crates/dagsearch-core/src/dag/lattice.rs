//! Word lattice text format.
//!
//! ```text
//! # -logbase 1.0003
//! Frames 120
//! Nodes 4 (NODEID WORD STARTFRAME FIRST-ENDFRAME LAST-ENDFRAME)
//! 0 <s> 0 9 11
//! 1 HELLO 10 60 62
//! ...
//! Initial 0
//! Final 3
//! BestSegAscr 2 (NODEID ENDFRAME ASCORE)
//! 3 119 -1200
//! ...
//! Edges (FROM-NODEID TO-NODEID ASCORE)
//! 0 1 -900
//! ...
//! End
//! ```
//!
//! `#` lines are comments; header lines the reader does not recognize are
//! skipped. Node lines may carry two trailing scores, which are ignored.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use super::{Dag, DagError};
use crate::dict::{Dictionary, WordId};
use crate::{Frame, Score};

/// One word occurrence as written by the recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatticeNode {
    pub word: WordId,
    pub start_frame: Frame,
    pub first_end_frame: Frame,
    pub last_end_frame: Frame,
}

/// Acoustic score of lattice node `seq` ending at `end_frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BestSegment {
    pub seq: usize,
    pub end_frame: Frame,
    pub ascr: Score,
}

/// `from` may be followed by `to`; `ascr` scores `from` ending just before `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatticeEdge {
    pub from: usize,
    pub to: usize,
    pub ascr: Score,
}

#[derive(Debug, Clone, Default)]
pub struct Lattice {
    /// Utterance length in frames
    pub frames: Frame,
    /// Nodes indexed by sequence number
    pub nodes: Vec<LatticeNode>,
    /// Sequence number of the utterance-begin node
    pub initial: usize,
    /// Sequence number of the utterance-end node
    pub final_node: usize,
    pub best_segments: Vec<BestSegment>,
    pub edges: Vec<LatticeEdge>,
    /// Log base declared in the header, if any
    pub log_base: Option<f64>,
}

struct Lines<'a> {
    inner: std::iter::Enumerate<std::str::Lines<'a>>,
    last: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: text.lines().enumerate(),
            last: 0,
        }
    }

    fn next_line(&mut self) -> Option<(usize, &'a str)> {
        let (i, line) = self.inner.next()?;
        self.last = i + 1;
        Some((i + 1, line.trim()))
    }

    /// Next non-blank, non-comment line.
    fn next_data(&mut self) -> Option<(usize, &'a str)> {
        loop {
            let (n, line) = self.next_line()?;
            if !line.is_empty() && !line.starts_with('#') {
                return Some((n, line));
            }
        }
    }

    fn eof(&self, what: &str) -> DagError {
        DagError::malformed(self.last + 1, format!("unexpected end of file, expected {what}"))
    }
}

fn field<T: std::str::FromStr>(fields: &[&str], i: usize, line: usize, what: &str) -> Result<T, DagError> {
    let raw = fields
        .get(i)
        .ok_or_else(|| DagError::malformed(line, format!("missing {what}")))?;
    raw.parse()
        .map_err(|_| DagError::malformed(line, format!("invalid {what} '{raw}'")))
}

impl Lattice {
    pub fn open(path: &Path, dict: &dyn Dictionary) -> Result<Self, DagError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, dict)
    }

    pub fn parse(text: &str, dict: &dyn Dictionary) -> Result<Self, DagError> {
        let mut lines = Lines::new(text);
        let mut lattice = Lattice::default();

        // Header: comments (one may declare the log base) up to "Frames".
        let frames = loop {
            let (n, line) = lines.next_line().ok_or_else(|| lines.eof("Frames"))?;
            if let Some(rest) = line.strip_prefix('#') {
                let parts: Vec<&str> = rest.split_whitespace().collect();
                if parts.first() == Some(&"-logbase") {
                    lattice.log_base = Some(field(&parts, 1, n, "log base")?);
                }
                continue;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.first() == Some(&"Frames") {
                break field::<Frame>(&parts, 1, n, "frame count")?;
            }
        };
        if frames <= 0 {
            return Err(DagError::malformed(lines.last, "frame count must be positive"));
        }
        lattice.frames = frames;

        let node_count: usize = expect_param(&mut lines, "Nodes")?;
        lattice.nodes.reserve(node_count);
        for seq in 0..node_count {
            let (n, line) = lines.next_data().ok_or_else(|| lines.eof("node line"))?;
            let parts: Vec<&str> = line.split_whitespace().collect();
            let id: usize = field(&parts, 0, n, "node id")?;
            if id != seq {
                return Err(DagError::malformed(n, format!("expected node {seq}, found {id}")));
            }
            let text = parts.get(1).ok_or_else(|| DagError::malformed(n, "missing word"))?;
            let word = dict.word_id(text).ok_or_else(|| DagError::UnknownWord {
                word: text.to_string(),
                line: n,
            })?;
            let node = LatticeNode {
                word,
                start_frame: field(&parts, 2, n, "start frame")?,
                first_end_frame: field(&parts, 3, n, "first end frame")?,
                last_end_frame: field(&parts, 4, n, "last end frame")?,
            };
            if node.start_frame < 0
                || node.start_frame > node.first_end_frame
                || node.first_end_frame > node.last_end_frame
                || node.last_end_frame >= frames
            {
                return Err(DagError::malformed(n, "inconsistent node frames"));
            }
            lattice.nodes.push(node);
        }

        lattice.initial = expect_param(&mut lines, "Initial")?;
        lattice.final_node = expect_param(&mut lines, "Final")?;
        for (name, seq) in [("Initial", lattice.initial), ("Final", lattice.final_node)] {
            if seq >= node_count {
                return Err(DagError::malformed(lines.last, format!("{name} node {seq} out of range")));
            }
        }

        let seg_count: usize = expect_param(&mut lines, "BestSegAscr")?;
        for _ in 0..seg_count {
            let (n, line) = lines.next_data().ok_or_else(|| lines.eof("BestSegAscr line"))?;
            let parts: Vec<&str> = line.split_whitespace().collect();
            let seg = BestSegment {
                seq: field(&parts, 0, n, "node id")?,
                end_frame: field(&parts, 1, n, "end frame")?,
                ascr: field(&parts, 2, n, "acoustic score")?,
            };
            if seg.seq >= node_count || seg.end_frame < 0 || seg.end_frame >= frames {
                return Err(DagError::malformed(n, "best segment out of range"));
            }
            lattice.best_segments.push(seg);
        }

        loop {
            let (_, line) = lines.next_data().ok_or_else(|| lines.eof("Edges"))?;
            if line.split_whitespace().next() == Some("Edges") {
                break;
            }
        }
        loop {
            let (n, line) = lines.next_data().ok_or_else(|| lines.eof("End"))?;
            if line == "End" {
                break;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() != 3 {
                return Err(DagError::malformed(n, format!("expected 3 fields, got {}", parts.len())));
            }
            let edge = LatticeEdge {
                from: field(&parts, 0, n, "from node")?,
                to: field(&parts, 1, n, "to node")?,
                ascr: field(&parts, 2, n, "acoustic score")?,
            };
            if edge.from >= node_count || edge.to >= node_count {
                return Err(DagError::malformed(n, "edge endpoint out of range"));
            }
            lattice.edges.push(edge);
        }

        Ok(lattice)
    }

    pub fn write(&self, w: &mut dyn Write, dict: &dyn Dictionary) -> io::Result<()> {
        writeln!(w, "# Lattice file")?;
        if let Some(base) = self.log_base {
            writeln!(w, "# -logbase {base}")?;
        }
        writeln!(w, "#")?;
        writeln!(w, "Frames {}", self.frames)?;
        writeln!(w, "#")?;
        writeln!(
            w,
            "Nodes {} (NODEID WORD STARTFRAME FIRST-ENDFRAME LAST-ENDFRAME)",
            self.nodes.len()
        )?;
        for (seq, node) in self.nodes.iter().enumerate() {
            writeln!(
                w,
                "{seq} {} {} {} {}",
                dict.display(node.word),
                node.start_frame,
                node.first_end_frame,
                node.last_end_frame
            )?;
        }
        writeln!(w, "#")?;
        writeln!(w, "Initial {}", self.initial)?;
        writeln!(w, "Final {}", self.final_node)?;
        writeln!(w, "#")?;
        writeln!(w, "BestSegAscr {} (NODEID ENDFRAME ASCORE)", self.best_segments.len())?;
        for seg in &self.best_segments {
            writeln!(w, "{} {} {}", seg.seq, seg.end_frame, seg.ascr)?;
        }
        writeln!(w, "#")?;
        writeln!(w, "Edges (FROM-NODEID TO-NODEID ASCORE)")?;
        for edge in &self.edges {
            writeln!(w, "{} {} {}", edge.from, edge.to, edge.ascr)?;
        }
        writeln!(w, "End")?;
        Ok(())
    }
}

fn expect_param<T: std::str::FromStr>(lines: &mut Lines<'_>, name: &str) -> Result<T, DagError> {
    loop {
        let (n, line) = lines.next_data().ok_or_else(|| lines.eof(name))?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.first() == Some(&name) {
            return field(&parts, 1, n, name);
        }
    }
}

impl Dag {
    /// Export the DAG as a lattice: every node, numbered in allocation order,
    /// and the live links other than bypasses.
    pub fn to_lattice(&self, log_base: Option<f64>) -> Lattice {
        let mut lattice = Lattice {
            frames: self.frames,
            initial: self.root.index(),
            final_node: self.exit.index(),
            log_base,
            ..Lattice::default()
        };
        for node in &self.nodes {
            lattice.nodes.push(LatticeNode {
                word: node.word,
                start_frame: node.start_frame,
                first_end_frame: node.first_end_frame,
                last_end_frame: node.last_end_frame,
            });
        }
        let exit = self.node(self.exit);
        if exit.last_end_frame == self.frames - 1 {
            lattice.best_segments.push(BestSegment {
                seq: self.exit.index(),
                end_frame: exit.last_end_frame,
                ascr: self.exit_ascr,
            });
        }
        for link in self.links.iter().filter(|l| l.live && l.bypass.is_none()) {
            if let Some(from) = link.from {
                lattice.edges.push(LatticeEdge {
                    from: from.index(),
                    to: link.to.index(),
                    ascr: link.ascr,
                });
            }
        }
        lattice
    }
}
