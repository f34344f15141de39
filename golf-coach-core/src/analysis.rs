//! Heuristic extraction of a rating and short summary from the model's free text.

use regex::Regex;

pub const SUMMARY_MAX_CHARS: usize = 500;

/// Parse the overall rating (1-10) and a short summary out of an analysis.
/// Either may be `None` when nothing usable is found.
pub fn parse_analysis(text: &str) -> (Option<i64>, Option<String>) {
    let rating = extract_rating(text);
    let summary = extract_summary(text).or_else(|| fallback_summary(text));
    (rating, summary)
}

/// Patterns are tried in order; a match outside 1..=10 falls through to the next.
pub fn extract_rating(text: &str) -> Option<i64> {
    let rating_patterns = [
        r"(?i)(?:rate|rating|score).*?(\d+)(?:/10|\s*out\s*of\s*10)",
        r"(\d+)/10",
        r"(?i)(?:quality|overall).*?(\d+)(?:/10|\s*out\s*of\s*10)",
    ];

    for pattern in rating_patterns.iter() {
        if let Ok(re) = Regex::new(pattern) {
            if let Some(caps) = re.captures(text) {
                let value = caps.get(1).and_then(|m| m.as_str().parse::<i64>().ok());
                if let Some(rating) = value.filter(|r| (1..=10).contains(r)) {
                    return Some(rating);
                }
            }
        }
    }

    None
}

/// The first matching pattern wins. A match with an empty capture yields
/// `None` so the caller falls back to the opening lines.
pub fn extract_summary(text: &str) -> Option<String> {
    let summary_patterns = [
        r"(?is)OVERALL ASSESSMENT.*?-\s*(.+?)(?:\n\n|\n2\.)",
        r"(?is)overall.*?summary.*?:\s*(.+?)(?:\n\n|\n)",
        r"(?is)summary.*?:\s*(.+?)(?:\n\n|\n)",
    ];

    for pattern in summary_patterns.iter() {
        if let Ok(re) = Regex::new(pattern) {
            if let Some(caps) = re.captures(text) {
                let summary = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
                if summary.is_empty() {
                    return None;
                }
                return Some(truncate_summary(summary));
            }
        }
    }

    None
}

/// First three content lines (markdown headers skipped), joined by spaces.
fn fallback_summary(text: &str) -> Option<String> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .take(3)
        .collect();

    if lines.is_empty() {
        return None;
    }
    Some(truncate_summary(&lines.join(" ")))
}

pub fn truncate_summary(summary: &str) -> String {
    if summary.chars().count() > SUMMARY_MAX_CHARS {
        let head: String = summary.chars().take(SUMMARY_MAX_CHARS - 3).collect();
        format!("{}...", head)
    } else {
        summary.to_string()
    }
}
