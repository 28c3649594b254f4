// Transcript pre-cleaning for captured terminal panes

use regex::Regex;
use std::sync::LazyLock;

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1B\[[0-9;?]*[A-Za-z]").expect("ansi pattern is valid"));

static BANNER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\x{2580}\x{2588} ]+$").expect("banner pattern is valid"));

static MOTD_LINES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"This session is supported by:",
        r"For more information about AS[0-9]+, check out",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("motd pattern is valid"))
    .collect()
});

const PROMPT: &str = "bgp.tools>";

/// Strip terminal noise from a captured pane.
///
/// Removes ANSI escapes, carriage returns, blank lines, block-drawing banner
/// lines, message-of-the-day lines and idle prompts. Command echo lines
/// (`bgp.tools> show route ...`) are kept.
pub fn clean_transcript(raw: &str) -> String {
    raw.lines()
        .map(|line| ANSI_ESCAPE.replace_all(line, "").replace('\r', ""))
        .map(|line| line.trim_end().to_string())
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !BANNER_LINE.is_match(line))
        .filter(|line| !MOTD_LINES.iter().any(|motd| motd.is_match(line)))
        .filter(|line| line.trim() != PROMPT)
        .collect::<Vec<_>>()
        .join("\n")
}
