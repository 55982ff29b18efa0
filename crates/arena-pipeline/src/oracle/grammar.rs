//! Oracle response grammar.
//!
//! Every free-text oracle answer is converted into a tagged variant here.
//! Each parser has an explicit "could not read it" outcome instead of
//! guessing, and nothing outside this module inspects raw oracle text.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use coordination::debate::{DebateSignal, FinalistChoice};
use coordination::{Confidence, Direction, QualityAssessment, Recommendation, NEUTRAL_QUALITY};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which item a comparison picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonVerdict {
    /// The first item passed to `compare`.
    A,
    B,
    Unparseable,
}

impl ComparisonVerdict {
    pub fn is_parsed(self) -> bool {
        !matches!(self, Self::Unparseable)
    }
}

static COMPARISON_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)better\s+scenario\s*[:\-]?\s*(?:scenario\s*)?\b([12]|(?-i:[AB]))\b",
        r"(?i)winner\s*[:\-]\s*(?:scenario\s*)?\b([12]|(?-i:[AB]))\b",
        r"(?i)scenario\s*([12]|(?-i:[AB]))\s+is\s+(?:better|stronger|superior|preferred)",
        r"(?i)preferred\s*[:\-]\s*(?:scenario\s*)?\b([12]|(?-i:[AB]))\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("comparison pattern should compile"))
    .collect()
});

static OVERALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*[-*]?\s*(?:overall(?:\s+score)?|score)\s*[:=]\s*(\d{1,3})")
        .expect("OVERALL_RE regex should compile")
});

static RECOMMENDATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*[-*]?\s*recommendation\s*[:=]\s*(advance|revise|reject)\b")
        .expect("RECOMMENDATION_RE regex should compile")
});

static BARE_RECOMMENDATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(ADVANCE|REVISE|REJECT)\b").expect("BARE_RECOMMENDATION_RE regex should compile")
});

static DIMENSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*[-*]?\s*([A-Za-z][A-Za-z _]{1,40}?)\s*[:=]\s*(\d{1,3})\s*(?:/\s*100)?\s*$")
        .expect("DIMENSION_RE regex should compile")
});

static CRITIQUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*critique\s*[:=]\s*(.+)$").expect("CRITIQUE_RE regex should compile")
});

static CRITIQUE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*critique\s*[:=]").expect("CRITIQUE_LINE_RE regex should compile")
});

static FINALIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:final\s+verdict|verdict|winner|choice|pick)\s*[:\-]\s*(?:finalist\s*|scenario\s*)?(1|2|first|second)\b",
    )
    .expect("FINALIST_RE regex should compile")
});

static FINALIST_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)finalist\s*(1|2)\s+(?:wins|is\s+(?:better|stronger|preferred))")
        .expect("FINALIST_PHRASE_RE regex should compile")
});

static LIST_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*]|\d+[.)])\s*").expect("LIST_PREFIX_RE regex should compile")
});

/// Markers an expert uses to close a meta-analysis debate. A marker only
/// counts when it opens a line.
pub const CONSENSUS_MARKERS: [&str; 4] = ["CONSENSUS REACHED", "[CONSENSUS]", "WE AGREE", "AGREED:"];

static CONSENSUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    let markers: Vec<String> = CONSENSUS_MARKERS.iter().map(|m| regex::escape(m)).collect();
    Regex::new(&format!(r"(?im)^[\s>#*_\-]*(?:{})(.*)$", markers.join("|")))
        .expect("CONSENSUS_RE regex should compile")
});

const RESERVED_DIMENSIONS: [&str; 5] = ["overall", "overall score", "score", "confidence", "critique"];

/// Read a pairwise comparison. "1"/"A" name the first item.
pub fn parse_comparison(text: &str) -> ComparisonVerdict {
    let text = text.replace('*', "");
    COMPARISON_PATTERNS
        .iter()
        .find_map(|re| re.captures(&text))
        .and_then(|caps| caps.get(1))
        .map(|m| match m.as_str() {
            "1" | "A" => ComparisonVerdict::A,
            _ => ComparisonVerdict::B,
        })
        .unwrap_or(ComparisonVerdict::Unparseable)
}

/// Read a quality assessment.
///
/// A missing overall score becomes 50 and a missing recommendation becomes
/// REVISE; either fallback marks the result low-confidence. Scores are
/// clamped to 0..=100.
pub fn parse_assessment(text: &str) -> QualityAssessment {
    let text = text.replace('*', "");

    let overall = OVERALL_RE
        .captures(&text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map(clamp_score);

    let recommendation = RECOMMENDATION_RE
        .captures(&text)
        .or_else(|| BARE_RECOMMENDATION_RE.captures(&text))
        .and_then(|c| c.get(1))
        .and_then(|m| Recommendation::from_keyword(m.as_str()));

    let body_end = CRITIQUE_LINE_RE
        .find(&text)
        .map(|m| m.start())
        .unwrap_or(text.len());
    let dimensions: BTreeMap<String, u8> = DIMENSION_RE
        .captures_iter(&text[..body_end])
        .filter_map(|c| {
            let name = c.get(1)?.as_str().trim().to_ascii_lowercase();
            if RESERVED_DIMENSIONS.contains(&name.as_str()) {
                return None;
            }
            let score = c.get(2)?.as_str().parse::<u32>().ok()?;
            Some((name.replace(' ', "_"), clamp_score(score)))
        })
        .collect();

    let critique = CRITIQUE_LINE_RE
        .find(&text)
        .and_then(|m| CRITIQUE_RE.captures(&text[m.start()..]))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let confidence = if overall.is_some() && recommendation.is_some() {
        Confidence::High
    } else {
        Confidence::Low
    };

    QualityAssessment {
        overall: overall.unwrap_or(NEUTRAL_QUALITY),
        dimensions,
        recommendation: recommendation.unwrap_or_default(),
        confidence,
        critique,
    }
}

/// Read an expert's final pick between two finalists. The last explicit
/// verdict in the text wins.
pub fn parse_finalist(text: &str) -> FinalistChoice {
    let text = text.replace('*', "");
    FINALIST_RE
        .captures_iter(&text)
        .last()
        .or_else(|| FINALIST_PHRASE_RE.captures_iter(&text).last())
        .and_then(|c| c.get(1))
        .map(|m| match m.as_str().to_ascii_lowercase().as_str() {
            "1" | "first" => FinalistChoice::First,
            _ => FinalistChoice::Second,
        })
        .unwrap_or(FinalistChoice::Unparseable)
}

/// Whether a debate turn carries a consensus marker at the start of a line.
///
/// Markers inside a sentence ("I don't think we agree") and "we agree to
/// disagree" do not count.
pub fn parse_signal(text: &str) -> DebateSignal {
    let agreed = CONSENSUS_RE.captures_iter(text).any(|caps| {
        !caps
            .get(1)
            .is_some_and(|rest| rest.as_str().to_ascii_uppercase().contains("DISAGREE"))
    });
    if agreed {
        DebateSignal::Consensus
    } else {
        DebateSignal::Continue
    }
}

/// Read `name | core assumption | focus` lines into directions.
///
/// List bullets, numbering, markdown table pipes, header rows and
/// separator rows are tolerated. Ids are assigned `d1`, `d2`, ... in order.
pub fn parse_direction_list(text: &str) -> Vec<Direction> {
    text.lines()
        .filter_map(|line| {
            let line = LIST_PREFIX_RE.replace(line, "");
            let parts: Vec<&str> = line
                .split('|')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();
            if parts.len() < 3 {
                return None;
            }
            if parts[0].eq_ignore_ascii_case("name") || parts[0].chars().all(|c| c == '-' || c == ':')
            {
                return None;
            }
            Some((parts[0].to_string(), parts[1].to_string(), parts[2].to_string()))
        })
        .enumerate()
        .map(|(i, (name, assumption, focus))| {
            Direction::new(format!("d{}", i + 1), name, assumption, focus)
        })
        .collect()
}

/// Bullet lines (`- `, `* `, `INSIGHT:`) of a narrative, in order.
pub fn parse_insights(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            let rest = line
                .strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| {
                    line.get(..8)
                        .filter(|p| p.eq_ignore_ascii_case("insight:"))
                        .map(|_| &line[8..])
                })?;
            let rest = rest.trim();
            (!rest.is_empty()).then(|| rest.to_string())
        })
        .collect()
}

fn clamp_score(score: u32) -> u8 {
    score.min(100) as u8
}
