//! Tool-Choice Classifier
//!
//! Decides, per turn, whether the model must call a tool or may answer in
//! free text. Pure and deterministic: keyword tables are loaded once and
//! classification does no I/O.
//!
//! The decision is biased toward tools. Anything that looks like tool
//! output, an instruction, or is simply ambiguous forces a tool call; only
//! a plain question lets the model answer in prose.

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{LlmError, LlmResult, PromptData, ToolCallMode};

/// Built-in English and Russian keyword tables.
const BUILTIN_KEYWORDS: &str = include_str!("../data/tool_choice_keywords.toml");

/// Intermediate label assigned to the latest user-visible message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageIntent {
    /// Text reporting the outcome of a tool invocation
    ToolResult,
    /// An instruction to do something
    Action,
    /// A question the model may answer directly
    Question,
    /// None of the above
    Uncertain,
}

impl MessageIntent {
    /// Map the label to a tool-forcing mode.
    pub fn tool_mode(self) -> ToolCallMode {
        match self {
            MessageIntent::Question => ToolCallMode::Auto,
            MessageIntent::ToolResult | MessageIntent::Action | MessageIntent::Uncertain => {
                ToolCallMode::Required
            }
        }
    }
}

impl std::fmt::Display for MessageIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageIntent::ToolResult => write!(f, "tool_result"),
            MessageIntent::Action => write!(f, "action"),
            MessageIntent::Question => write!(f, "question"),
            MessageIntent::Uncertain => write!(f, "uncertain"),
        }
    }
}

/// Keyword tables for one or more languages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordTables {
    pub result_patterns: Vec<String>,
    pub result_indicators: Vec<String>,
    pub question_starters: Vec<String>,
    pub strong_actions: Vec<String>,
    pub action_keywords: Vec<String>,
}

impl KeywordTables {
    /// The tables shipped with the crate.
    pub fn builtin() -> LlmResult<Self> {
        Self::from_toml_str(BUILTIN_KEYWORDS)
    }

    /// Parse a TOML document whose top-level tables are languages; all
    /// languages are merged into one set.
    pub fn from_toml_str(source: &str) -> LlmResult<Self> {
        let sections: toml::Table = toml::from_str(source)
            .map_err(|e| LlmError::config(format!("Invalid keyword tables: {}", e)))?;

        let mut merged = KeywordTables::default();
        for (language, value) in sections {
            let tables: KeywordTables = value.try_into().map_err(|e| {
                LlmError::config(format!("Invalid keyword table '{}': {}", language, e))
            })?;
            merged.merge(tables);
        }
        Ok(merged)
    }

    /// Load tables from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> LlmResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            LlmError::config(format!(
                "Failed to read keyword tables {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&source)
    }

    /// Append another table set, skipping entries already present.
    pub fn merge(&mut self, other: KeywordTables) {
        // Regexes keep their case: `\S` and `\s` differ.
        fn extend(into: &mut Vec<String>, from: Vec<String>, lowercase: bool) {
            for entry in from {
                let entry = if lowercase {
                    entry.trim().to_lowercase()
                } else {
                    entry.trim().to_string()
                };
                if !entry.is_empty() && !into.contains(&entry) {
                    into.push(entry);
                }
            }
        }
        extend(&mut self.result_patterns, other.result_patterns, false);
        extend(&mut self.result_indicators, other.result_indicators, true);
        extend(&mut self.question_starters, other.question_starters, true);
        extend(&mut self.strong_actions, other.strong_actions, true);
        extend(&mut self.action_keywords, other.action_keywords, true);
    }
}

/// A word-list entry: one or more words, the last optionally a prefix.
#[derive(Debug, Clone)]
struct Term {
    words: Vec<String>,
    prefix: bool,
}

impl Term {
    fn parse(entry: &str) -> Option<Self> {
        let (body, prefix) = match entry.strip_suffix('*') {
            Some(body) => (body, true),
            None => (entry, false),
        };
        let words = tokenize(body);
        if words.is_empty() {
            None
        } else {
            Some(Self { words, prefix })
        }
    }

    fn word_matches(&self, index: usize, word: &str) -> bool {
        let expected = &self.words[index];
        if self.prefix && index + 1 == self.words.len() {
            word.starts_with(expected.as_str())
        } else {
            word == expected
        }
    }

    /// Matches the leading words of `words`.
    fn matches_start(&self, words: &[String]) -> bool {
        words.len() >= self.words.len()
            && words
                .iter()
                .take(self.words.len())
                .enumerate()
                .all(|(i, w)| self.word_matches(i, w))
    }

    /// Matches anywhere in `words`.
    fn matches_anywhere(&self, words: &[String]) -> bool {
        (0..words.len()).any(|start| self.matches_start(&words[start..]))
    }
}

/// Split lower-cased text into words. Apostrophes stay inside words so
/// "let's" is one token.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '’'))
        .map(|w| w.trim_matches(|c| c == '\'' || c == '’').replace('’', "'"))
        .filter(|w| !w.is_empty())
        .collect()
}

/// Rule-based tool-choice classifier.
#[derive(Debug, Clone)]
pub struct ToolChoiceClassifier {
    result_patterns: Vec<Regex>,
    result_indicators: Vec<String>,
    question_starters: Vec<Term>,
    strong_actions: Vec<Term>,
    action_keywords: Vec<Term>,
}

impl Default for ToolChoiceClassifier {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ToolChoiceClassifier {
    /// Compile a classifier from keyword tables. Invalid regexes are
    /// skipped with a warning.
    pub fn new(tables: &KeywordTables) -> Self {
        Self {
            result_patterns: Self::compile_patterns(&tables.result_patterns),
            result_indicators: tables
                .result_indicators
                .iter()
                .map(|s| s.to_lowercase())
                .filter(|s| !s.trim().is_empty())
                .collect(),
            question_starters: Self::compile_terms(&tables.question_starters),
            strong_actions: Self::compile_terms(&tables.strong_actions),
            action_keywords: Self::compile_terms(&tables.action_keywords),
        }
    }

    /// Classifier over the built-in tables.
    pub fn builtin() -> Self {
        match KeywordTables::builtin() {
            Ok(tables) => Self::new(&tables),
            Err(e) => {
                warn!(error = %e, "Built-in keyword tables failed to load");
                Self::new(&KeywordTables::default())
            }
        }
    }

    /// Classifier over the built-in tables plus `extra`.
    pub fn with_extra_tables(extra: KeywordTables) -> LlmResult<Self> {
        let mut tables = KeywordTables::builtin()?;
        tables.merge(extra);
        Ok(Self::new(&tables))
    }

    fn compile_patterns(patterns: &[String]) -> Vec<Regex> {
        patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "Skipping invalid result pattern");
                    None
                }
            })
            .collect()
    }

    fn compile_terms(entries: &[String]) -> Vec<Term> {
        entries
            .iter()
            .filter_map(|e| Term::parse(&e.to_lowercase()))
            .collect()
    }

    /// Label the text.
    pub fn classify(&self, text: &str) -> MessageIntent {
        let lower = text.trim().to_lowercase();
        if lower.is_empty() {
            return MessageIntent::Uncertain;
        }

        if self.result_patterns.iter().any(|re| re.is_match(&lower))
            || self
                .result_indicators
                .iter()
                .any(|indicator| lower.contains(indicator.as_str()))
        {
            return MessageIntent::ToolResult;
        }

        let words = tokenize(&lower);

        if self.strong_actions.iter().any(|t| t.matches_anywhere(&words)) {
            return MessageIntent::Action;
        }

        if self.question_starters.iter().any(|t| t.matches_start(&words)) || lower.ends_with('?')
        {
            return MessageIntent::Question;
        }

        if self.action_keywords.iter().any(|t| t.matches_anywhere(&words)) {
            return MessageIntent::Action;
        }

        MessageIntent::Uncertain
    }

    /// Tool-forcing mode for the text.
    pub fn determine_mode(&self, text: &str) -> ToolCallMode {
        self.classify(text).tool_mode()
    }

    /// Tool-forcing mode for a prompt, judged on its latest user-visible
    /// message.
    pub fn mode_for_prompt(&self, prompt: &PromptData) -> ToolCallMode {
        self.determine_mode(prompt.last_user_visible_text().unwrap_or_default())
    }
}
