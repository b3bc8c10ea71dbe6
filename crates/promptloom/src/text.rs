//! Small text helpers shared by the annotator, populator, and validator.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Tokens that belong to the structural markup and must not reach prose.
pub const MARKUP_TOKENS: [&str; 4] = ["[", "]", "#", "__"];

/// Generic phrase substituted for tool names.
pub const TOOL_REFERENT: &str = "a suitable tool";

/// Generic phrase substituted for repeated persona mentions.
pub const PERSONA_REFERENT: &str = "the user";

/// Generic phrase substituted for block identifiers found in generated text.
pub const BLOCK_REFERENT: &str = "this guidance";

static BULLET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+?)\s*$").expect("valid bullet pattern")
});

// Three or more single-word descriptors: "warm, upbeat, and patient". The
// leading group is what precedes the first item, so a run that opens a
// sentence (usually a list of verbs) can be told apart.
static DESCRIPTORS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[.!?:;]\s+|\s)([[:alpha:]][\w'-]*)((?:, [[:alpha:]][\w'-]*)+),? (?:and|or) ([[:alpha:]][\w'-]*)\b")
        .expect("valid descriptor pattern")
});

// Three or more short phrases introduced by a capability lead-in and closing
// the clause: "can search the web, summarize documents, or draft replies."
static FEATURES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(can|could|is able to|supports?|offers?|provides?|includ(?:e|es|ing)|such as) ([[:alpha:]][\w'-]*(?: [\w'-]+){0,2})((?:, [[:alpha:]][\w'-]*(?: [\w'-]+){0,2})+),? (?:and|or) ([[:alpha:]][\w'-]*(?: [\w'-]+){0,2})([.;!?]|$)",
    )
    .expect("valid feature pattern")
});

/// Words that mark an item as a clause rather than a descriptor or feature.
const CLAUSE_WORDS: [&str; 16] = [
    "is", "are", "was", "were", "am", "be", "been", "when", "if", "unless", "because", "while",
    "then", "so", "but", "not",
];

/// Markup tokens present in `text`, in [`MARKUP_TOKENS`] order.
pub fn markup_tokens_in(text: &str) -> Vec<&'static str> {
    MARKUP_TOKENS
        .into_iter()
        .filter(|t| text.contains(t))
        .collect()
}

/// Collapse whitespace and strip characters that would break the markup
/// grammar if the text were written inside `( … )`.
pub fn normalize_explanation(text: &str) -> String {
    let mut cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '(' | ')' | '{' | '}' | '#'))
        .collect();
    while cleaned.contains("__") {
        cleaned = cleaned.replace("__", "_");
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Append a period unless the text already ends a sentence.
pub fn ensure_terminal(text: &str) -> String {
    let trimmed = text.trim_end();
    let last_meaningful = trimmed
        .chars()
        .rev()
        .find(|c| !matches!(c, '"' | '\'' | '’' | '”'));
    match last_meaningful {
        Some('.' | '!' | '?' | '…') => trimmed.to_string(),
        Some(_) => format!("{trimmed}."),
        None => String::new(),
    }
}

/// A sentence built from a lower-case clause.
pub fn sentence(clause: &str) -> String {
    ensure_terminal(&capitalize_first(clause.trim()))
}

/// Whether `doc` contains `span`, allowing the sentence-start
/// capitalisation touch-up the populator may apply.
pub fn contains_span(doc: &str, span: &str) -> bool {
    let span = span.trim();
    !span.is_empty() && (doc.contains(span) || doc.contains(&capitalize_first(span)))
}

/// Sentence introducing the persona when no protected text names them.
pub fn persona_introduction(name: &str) -> String {
    format!("You are assisting {}.", name.trim())
}

/// Matches a tool name anywhere, together with the word it sits in, so a
/// leak can never survive as a substring.
pub fn tool_pattern(name: &str) -> Option<Regex> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Regex::new(&format!(r"(?i)\w*{}\w*", regex::escape(name))).ok()
}

/// Matches a persona name as a whole word.
pub fn persona_pattern(name: &str) -> Option<Regex> {
    let name = name.trim();
    let first = name.chars().next()?;
    let last = name.chars().last()?;
    let lead = if is_word_char(first) { r"\b" } else { "" };
    let tail = if is_word_char(last) { r"\b" } else { "" };
    Regex::new(&format!("{lead}{}{tail}", regex::escape(name))).ok()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Rewrite bullet lists and inline enumerations of three or more items.
///
/// Bullet lists and capability lists ("can X, Y, or Z") collapse to the
/// first item followed by a summarising phrase. Inline runs of single-word
/// descriptors collapse to the first descriptor. Runs that open a sentence
/// or contain a clause ("the user is tired, keep replies short, ...") are
/// ordinary prose and stay as written.
pub fn collapse_enumerations(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut bullets: Vec<String> = Vec::new();

    for line in text.lines() {
        if let Some(caps) = BULLET.captures(line) {
            bullets.push(caps[1].to_string());
            continue;
        }
        if !bullets.is_empty() {
            out.push(collapse_items(&std::mem::take(&mut bullets)));
        }
        if !line.trim().is_empty() {
            out.push(line.trim().to_string());
        }
    }
    if !bullets.is_empty() {
        out.push(collapse_items(&bullets));
    }

    let joined = out.join(" ");
    let features = FEATURES.replace_all(&joined, |caps: &Captures<'_>| {
        let items = inline_items(&caps[2], &caps[3], &caps[4]);
        if items.iter().any(|item| is_clause(item)) {
            return caps[0].to_string();
        }
        format!("{} {}{}", &caps[1], summarize(&items), &caps[5])
    });
    DESCRIPTORS
        .replace_all(&features, |caps: &Captures<'_>| {
            let opens_sentence = caps[1].is_empty() || !caps[1].trim().is_empty();
            let items = inline_items(&caps[2], &caps[3], &caps[4]);
            if opens_sentence || items.iter().any(|item| is_clause(item)) {
                return caps[0].to_string();
            }
            format!("{}{}", &caps[1], &caps[2])
        })
        .into_owned()
}

fn inline_items<'t>(first: &'t str, middle: &'t str, last: &'t str) -> Vec<&'t str> {
    std::iter::once(first)
        .chain(middle.split(", ").filter(|s| !s.is_empty()))
        .chain(std::iter::once(last))
        .collect()
}

fn is_clause(item: &str) -> bool {
    item.split_whitespace()
        .any(|word| CLAUSE_WORDS.contains(&word.to_lowercase().as_str()))
}

fn summarize(items: &[&str]) -> String {
    match items.first() {
        Some(first) => format!("{} and related capabilities", first.trim_end_matches(['.', ';', ','])),
        None => String::new(),
    }
}

fn collapse_items(items: &[String]) -> String {
    let Some(first) = items.first() else {
        return String::new();
    };
    let first = first.trim_end_matches(['.', ';', ',']).to_string();
    if items.len() == 1 {
        return first;
    }
    let descriptors = items[1..].iter().all(|item| !item.trim().contains(' '));
    if descriptors {
        first
    } else {
        format!("{first} and related capabilities")
    }
}
