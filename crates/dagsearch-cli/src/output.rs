//! Hypothesis rendering: plain text, JSON, and N-best list files.

use std::io::{self, Write};

use serde::Serialize;

use dagsearch::dict::Dictionary;
use dagsearch::search::{Hypothesis, SearchStats};
use dagsearch::{Frame, Score};

/// `score: word(sf,ef) word(sf,ef) ...`
pub fn format_hypothesis(hyp: &Hypothesis, dict: &dyn Dictionary) -> String {
    let words: Vec<String> = hyp
        .segments
        .iter()
        .map(|s| format!("{}({},{})", dict.display(s.word), s.start_frame, s.end_frame))
        .collect();
    format!("{}: {}", hyp.score, words.join(" "))
}

#[derive(Debug, Serialize)]
pub struct SegmentJson<'a> {
    pub word: &'a str,
    pub start_frame: Frame,
    pub end_frame: Frame,
    pub acoustic_score: Score,
    pub lm_score: Score,
}

#[derive(Debug, Serialize)]
pub struct HypothesisJson<'a> {
    pub rank: usize,
    pub score: Score,
    pub acoustic_score: Score,
    pub lm_score: Score,
    pub segments: Vec<SegmentJson<'a>>,
}

impl<'a> HypothesisJson<'a> {
    pub fn new(rank: usize, hyp: &Hypothesis, dict: &'a dyn Dictionary) -> Self {
        Self {
            rank,
            score: hyp.score,
            acoustic_score: hyp.acoustic_score(),
            lm_score: hyp.lm_score(),
            segments: hyp
                .segments
                .iter()
                .map(|s| SegmentJson {
                    word: dict.display(s.word),
                    start_frame: s.start_frame,
                    end_frame: s.end_frame,
                    acoustic_score: s.ascr,
                    lm_score: s.lscr,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsJson {
    pub popped: usize,
    pub expanded: usize,
    pub partial_paths: usize,
    pub lm_ops: u64,
}

impl From<&SearchStats> for StatsJson {
    fn from(s: &SearchStats) -> Self {
        Self {
            popped: s.popped,
            expanded: s.expanded,
            partial_paths: s.partial_paths,
            lm_ops: s.lm_ops,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UtteranceJson<'a> {
    pub utterance: &'a str,
    pub hypotheses: Vec<HypothesisJson<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsJson>,
}

impl<'a> UtteranceJson<'a> {
    pub fn new(
        utterance: &'a str,
        hyps: &[Hypothesis],
        dict: &'a dyn Dictionary,
        stats: Option<&SearchStats>,
    ) -> Self {
        Self {
            utterance,
            hypotheses: hyps
                .iter()
                .enumerate()
                .map(|(i, h)| HypothesisJson::new(i + 1, h, dict))
                .collect(),
            stats: stats.map(StatsJson::from),
        }
    }
}

/// Header values recorded at the top of an N-best file.
#[derive(Debug, Clone)]
pub struct NbestHeader<'a> {
    pub utterance: &'a str,
    pub frames: Frame,
    pub log_base: f64,
    pub lm_weight: f64,
    /// Beam as a probability ratio, as configured.
    pub beam: f64,
    /// Beam in score units, as searched.
    pub beam_score: Score,
}

/// Write an N-best list: `#` header comments, one `T total A ascr L lscr`
/// line per hypothesis followed by `sf ascr lscr word` per segment and the
/// frame count, and a closing summary.
pub fn write_nbest(
    w: &mut dyn Write,
    header: &NbestHeader<'_>,
    hyps: &[Hypothesis],
    dict: &dyn Dictionary,
) -> io::Result<()> {
    writeln!(w, "# {}", header.utterance)?;
    writeln!(w, "# frames {}", header.frames)?;
    writeln!(w, "# logbase {:e}", header.log_base)?;
    writeln!(w, "# langwt {:e}", header.lm_weight)?;
    writeln!(w, "# beam {:e}", header.beam)?;

    let mut best = Score::MIN;
    let mut worst = Score::MAX;
    for hyp in hyps {
        write!(w, "T {} A {} L {}", hyp.score, hyp.acoustic_score(), hyp.lm_score())?;
        for s in &hyp.segments {
            write!(w, " {} {} {} {}", s.start_frame, s.ascr, s.lscr, dict.display(s.word))?;
        }
        writeln!(w, " {}", header.frames)?;
        best = best.max(hyp.score);
        worst = worst.min(hyp.score);
    }
    if hyps.is_empty() {
        best = 0;
        worst = 0;
    }
    writeln!(
        w,
        "End; best {best} worst {worst} diff {} beam {}",
        worst - best,
        header.beam_score
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagsearch::dict::Vocabulary;
    use dagsearch::logmath::LogMath;
    use dagsearch::search::Segment;
    use dagsearch::settings::FillerSettings;

    fn vocab() -> Vocabulary {
        let fillers = FillerSettings {
            silence_prob: 0.1,
            filler_prob: 0.1,
        };
        Vocabulary::from_words(&["hello", "world"], &["<sil>"], &LogMath::new(1.0003), &fillers)
    }

    fn hyp(vocab: &Vocabulary, words: &[(&str, Frame, Frame, Score, Score)]) -> Hypothesis {
        let segments: Vec<Segment> = words
            .iter()
            .map(|&(w, sf, ef, ascr, lscr)| Segment {
                word: vocab.word_id(w).unwrap(),
                start_frame: sf,
                end_frame: ef,
                ascr,
                lscr,
            })
            .collect();
        let score = segments.iter().map(|s| s.ascr + s.lscr).sum();
        Hypothesis { segments, score }
    }

    #[test]
    fn test_text_line() {
        let v = vocab();
        let h = hyp(&v, &[("<s>", 0, 4, -10, 0), ("hello", 5, 9, -20, -3), ("</s>", 10, 11, -5, -1)]);
        assert_eq!(format_hypothesis(&h, &v), "-39: <s>(0,4) hello(5,9) </s>(10,11)");
    }

    #[test]
    fn test_json_shape() {
        let v = vocab();
        let h = hyp(&v, &[("<s>", 0, 4, -10, 0), ("world", 5, 11, -20, -3)]);
        let utt = UtteranceJson::new("utt1", std::slice::from_ref(&h), &v, None);
        let json = serde_json::to_value(&utt).unwrap();
        assert_eq!(json["utterance"], "utt1");
        assert_eq!(json["hypotheses"][0]["rank"], 1);
        assert_eq!(json["hypotheses"][0]["score"], -33);
        assert_eq!(json["hypotheses"][0]["segments"][1]["word"], "world");
        assert_eq!(json["hypotheses"][0]["segments"][1]["lm_score"], -3);
        assert!(json.get("stats").is_none());
    }

    #[test]
    fn test_nbest_file() {
        let v = vocab();
        let hyps = vec![
            hyp(&v, &[("<s>", 0, 4, -10, 0), ("hello", 5, 9, -20, -3), ("</s>", 10, 11, -5, -1)]),
            hyp(&v, &[("<s>", 0, 4, -10, 0), ("world", 5, 9, -30, -4), ("</s>", 10, 11, -5, -1)]),
        ];
        let header = NbestHeader {
            utterance: "utt1",
            frames: 12,
            log_base: 1.0003,
            lm_weight: 9.5,
            beam: 1e-64,
            beam_score: 491_228,
        };
        let mut out = Vec::new();
        write_nbest(&mut out, &header, &hyps, &v).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# utt1");
        assert_eq!(lines[1], "# frames 12");
        assert_eq!(lines[5], "T -39 A -35 L -4 0 -10 0 <s> 5 -20 -3 hello 10 -5 -1 </s> 12");
        assert_eq!(lines[6], "T -50 A -45 L -5 0 -10 0 <s> 5 -30 -4 world 10 -5 -1 </s> 12");
        assert_eq!(lines[7], "End; best -39 worst -50 diff -11 beam 491228");
        assert_eq!(lines.len(), 8);
    }
}
