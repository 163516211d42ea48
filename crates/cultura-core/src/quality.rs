//! Reply quality heuristics and display cleanup.

use crate::config::QualityConfig;
use std::collections::HashSet;

/// Below this many words lexical diversity says nothing useful.
const MIN_WORDS_FOR_DIVERSITY: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    pub chars: usize,
    pub words: usize,
    /// Distinct words over total words, 1.0 for an empty reply.
    pub lexical_diversity: f32,
    pub issues: Vec<String>,
}

impl QualityReport {
    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct QualityGate {
    max_chars: usize,
    min_lexical_diversity: f32,
    enforce: bool,
}

impl QualityGate {
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            max_chars: config.max_chars,
            min_lexical_diversity: config.min_lexical_diversity,
            enforce: config.enforce,
        }
    }

    /// Whether a failed check rejects the reply or is only logged.
    pub fn enforced(&self) -> bool {
        self.enforce
    }

    pub fn evaluate(&self, reply: &str) -> QualityReport {
        let chars = reply.chars().count();
        let words: Vec<String> = reply
            .split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|w| !w.is_empty())
            .collect();
        let distinct: HashSet<&str> = words.iter().map(String::as_str).collect();
        let lexical_diversity = if words.is_empty() {
            1.0
        } else {
            distinct.len() as f32 / words.len() as f32
        };

        let mut issues = Vec::new();
        if chars > self.max_chars {
            issues.push(format!("reply is {} chars, limit is {}", chars, self.max_chars));
        }
        if words.len() >= MIN_WORDS_FOR_DIVERSITY && lexical_diversity < self.min_lexical_diversity {
            issues.push(format!(
                "lexical diversity {:.2} below {:.2}",
                lexical_diversity, self.min_lexical_diversity
            ));
        }
        QualityReport {
            chars,
            words: words.len(),
            lexical_diversity,
            issues,
        }
    }
}

/// Trim and start the reply with a capital letter.
pub fn clean_reply(reply: &str) -> String {
    let mut out = reply.trim().to_string();
    if let Some(c) = out.chars().next() {
        if c.is_lowercase() {
            out.replace_range(0..c.len_utf8(), &c.to_uppercase().to_string());
        }
    }
    out
}

/// Non-empty display lines with markdown emphasis and heading marks removed.
pub fn display_lines(reply: &str) -> Vec<String> {
    reply
        .lines()
        .map(|line| {
            let line = line.replace(['*', '`'], "");
            line.trim_start_matches('#').trim().to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(max_chars: usize) -> QualityGate {
        QualityGate::new(&QualityConfig {
            max_chars,
            min_lexical_diversity: 0.3,
            enforce: true,
        })
    }

    #[test]
    fn normal_reply_passes() {
        let report = gate(4000).evaluate("The Kecak dance is performed at sunset in Uluwatu temple.");
        assert!(report.passed());
        assert_eq!(report.words, 10);
    }

    #[test]
    fn overlong_reply_fails() {
        let report = gate(10).evaluate("This reply is far too long.");
        assert!(!report.passed());
        assert!(report.issues[0].contains("limit is 10"));
    }

    #[test]
    fn repetitive_reply_fails_diversity() {
        let reply = "batik ".repeat(30);
        let report = gate(4000).evaluate(&reply);
        assert!(report.lexical_diversity < 0.1);
        assert!(!report.passed());
    }

    #[test]
    fn short_replies_skip_diversity() {
        assert!(gate(4000).evaluate("Yes yes yes.").passed());
        assert!(gate(4000).evaluate("").passed());
    }

    #[test]
    fn display_lines_strip_emphasis() {
        let lines = display_lines("## Tonight\n\n**Legong** at *Ubud Palace*\n- bring `cash`\n");
        assert_eq!(lines, vec!["Tonight", "Legong at Ubud Palace", "- bring cash"]);
    }

    #[test]
    fn clean_reply_capitalizes() {
        assert_eq!(clean_reply("  selamat pagi! "), "Selamat pagi!");
        assert_eq!(clean_reply(""), "");
    }
}
