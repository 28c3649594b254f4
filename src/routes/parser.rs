// Looking-glass capture parser
//
// A capture is a run of terminal-rendered route entries shaped like
//   [{AS6939 he.net} 2001:7f8::1] [6939 3356 19366] {[3356:2 3356:100]}
// where the renderer may wrap a single entry across several lines.

use regex::Regex;
use std::sync::LazyLock;

use super::{Asn, AsPath, RouteObservation};

const RECORD_START: &str = "[{AS";
const RECORD_END: &str = "]}";

static RECORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[\{AS(\d+)[^\}]*\}\s+[^\]]*\]\s+\[([\d\s]+)\]\s+\{\[([^\]]*)\]\}$")
        .expect("record pattern is valid")
});

#[derive(Debug, Default)]
enum ParserState {
    #[default]
    Idle,
    Accumulating(String),
}

/// Line-fed parser for looking-glass captures.
///
/// Lines are buffered from a record start until the buffer ends with the
/// community-list closing marker, then the buffer is matched and cleared.
/// Lines seen while idle that do not open a record are dropped.
#[derive(Debug, Default)]
pub struct CaptureParser {
    state: ParserState,
}

impl CaptureParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one physical line. Returns an observation when a record closes and matches.
    pub fn feed_line(&mut self, line: &str) -> Option<RouteObservation> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let buffer = match std::mem::take(&mut self.state) {
            ParserState::Idle if !trimmed.starts_with(RECORD_START) => return None,
            ParserState::Idle => trimmed.to_string(),
            ParserState::Accumulating(previous) if trimmed.starts_with(RECORD_START) => {
                tracing::debug!("Discarding unterminated record: {}", previous);
                trimmed.to_string()
            }
            ParserState::Accumulating(mut buffer) => {
                buffer.push('\n');
                buffer.push_str(trimmed);
                buffer
            }
        };

        if buffer.ends_with(RECORD_END) {
            let record = match_record(&buffer);
            if record.is_none() {
                tracing::debug!("Skipping unmatched record: {}", buffer);
            }
            record
        } else {
            self.state = ParserState::Accumulating(buffer);
            None
        }
    }

    /// True while a record has been opened but not yet closed.
    pub fn is_accumulating(&self) -> bool {
        matches!(self.state, ParserState::Accumulating(_))
    }

    /// Parse a complete capture. Never fails, unmatched records are skipped.
    pub fn parse(raw_text: &str) -> Vec<RouteObservation> {
        let mut parser = CaptureParser::new();
        raw_text.lines().filter_map(|line| parser.feed_line(line)).collect()
    }
}

fn match_record(buffer: &str) -> Option<RouteObservation> {
    let caps = RECORD_RE.captures(buffer)?;

    let source_asn: Asn = caps.get(1)?.as_str().parse().ok()?;
    let as_path = caps
        .get(2)?
        .as_str()
        .split_whitespace()
        .map(str::parse::<Asn>)
        .collect::<Result<AsPath, _>>()
        .ok()?;
    let communities = caps
        .get(3)?
        .as_str()
        .split_whitespace()
        .map(String::from)
        .collect();

    Some(RouteObservation {
        source_asn,
        as_path,
        communities,
    })
}

/// Extract the AS path from route-summary tokens that carry a leading metric.
///
/// The first purely numeric token is the metric and is dropped, every numeric
/// token after it is a hop. Non-numeric tokens are ignored.
pub fn path_after_metric<'a>(tokens: impl IntoIterator<Item = &'a str>) -> AsPath {
    tokens
        .into_iter()
        .filter(|tok| !tok.is_empty() && tok.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|tok| tok.parse::<Asn>().ok())
        .skip(1)
        .collect()
}
