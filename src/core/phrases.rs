//! Fixed table of spoken trigger phrases.

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Deliver pending alerts now, or say there are none.
    RequestUpdate,
    Exit,
    Unrecognized,
}

const UPDATE_PHRASES: &[&str] = &[
    "any updates",
    "any alerts",
    "any notifications",
    "what's new",
    "whats new",
    "anything new",
    "any changes",
    "status update",
    "status updates",
    "proactive update",
    "proactive updates",
    "check for updates",
    "check updates",
    "pending alerts",
    "any pending",
    "what did i miss",
    "anything i should know",
    "catch me up",
    "brief me",
];

/// Matched against the whole utterance only.
const EXIT_WORDS: &[&str] = &["exit", "quit", "stop"];

/// Matched anywhere in the utterance.
const EXIT_PHRASES: &[&str] = &["ok bye"];

pub struct PhraseMatcher {
    noise: Regex,
    spaces: Regex,
}

impl PhraseMatcher {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            noise: Regex::new(r"[^a-z0-9' ]+")?,
            spaces: Regex::new(r"\s+")?,
        })
    }

    /// Lowercase, unify apostrophes, drop punctuation and collapse whitespace.
    pub fn normalize(&self, input: &str) -> String {
        let lower = input.to_lowercase().replace(['\u{2019}', '`'], "'");
        let cleaned = self.noise.replace_all(&lower, " ");
        self.spaces.replace_all(cleaned.trim(), " ").into_owned()
    }

    pub fn classify(&self, input: &str) -> Command {
        let text = self.normalize(input);
        if EXIT_WORDS.contains(&text.as_str()) || EXIT_PHRASES.iter().any(|p| contains_phrase(&text, p)) {
            Command::Exit
        } else if UPDATE_PHRASES.iter().any(|p| contains_phrase(&text, p)) {
            Command::RequestUpdate
        } else {
            Command::Unrecognized
        }
    }
}

/// Whole-word containment: "any updates" matches "hey any updates today"
/// but "stop" does not match "stopover".
fn contains_phrase(text: &str, phrase: &str) -> bool {
    format!(" {text} ").contains(&format!(" {phrase} "))
}
