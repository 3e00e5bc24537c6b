//! Normalisation of raw speech-to-text output.

use regex::{Captures, Regex};
use std::sync::OnceLock;

const FILLERS: &[&str] = &[
    "you know", "i mean", "basically", "literally", "actually", "okay", "right", "well", "like",
    "hmm", "uhm", "umm", "erm", "ehm", "um", "uh", "er", "ah", "so",
];

struct Patterns {
    filler: Regex,
    whitespace: Regex,
    space_before_punct: Regex,
    punct_before_letter: Regex,
    sentence_start: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let alternation = FILLERS
            .iter()
            .map(|f| f.split(' ').map(regex::escape).collect::<Vec<_>>().join(r"\s+"))
            .collect::<Vec<_>>()
            .join("|");
        let compile = |p: &str| Regex::new(p).unwrap_or_else(|e| panic!("bad pattern {p}: {e}"));
        Patterns {
            filler: compile(&format!(r"(?i)\b(?:{alternation})\b,?\s*")),
            whitespace: compile(r"\s+"),
            space_before_punct: compile(r"\s+([.,!?;:])"),
            punct_before_letter: compile(r"([.,!?;:])([A-Za-z])"),
            sentence_start: compile(r"^\s*\w|[.!?]\s+\w"),
        }
    })
}

/// Clean a transcript: drop filler words, normalise spacing around
/// punctuation, and capitalise sentence starts. `clean(clean(s)) == clean(s)`.
pub fn clean(raw: &str) -> String {
    let p = patterns();

    let mut text = raw.to_string();
    loop {
        let next = p.filler.replace_all(&text, "");
        if next == text {
            break;
        }
        text = next.into_owned();
    }

    let text = p.whitespace.replace_all(&text, " ");
    let text = p.space_before_punct.replace_all(&text, "$1");
    let text = p.punct_before_letter.replace_all(&text, "$1 $2");
    let text = p
        .sentence_start
        .replace_all(&text, |caps: &Captures<'_>| caps[0].to_uppercase());
    text.trim().to_string()
}
