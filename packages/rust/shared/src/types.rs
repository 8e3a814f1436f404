//! Core domain types for the distillation pipeline.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One unit of input text to be classified (e.g. one support ticket).
///
/// A record is structured at split time into a title/description pair;
/// downstream stages render prompts from the fields instead of re-parsing a
/// formatted string. Identity is the record's 0-based position in the split
/// sequence; records are never merged or reordered after splitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Short summary line, without the `Title:` label.
    pub title: String,
    /// Free-text body, without the `Description:` label. May be empty.
    pub description: String,
}

impl Record {
    /// Parse one raw chunk into a structured record.
    ///
    /// Everything before the first `Description:` marker is the title (a
    /// leading `Title:` label is stripped); the remainder is the description.
    /// A chunk without the marker becomes a title-only record.
    pub fn parse(chunk: &str) -> Self {
        match chunk.split_once("Description:") {
            Some((head, tail)) => Self {
                title: strip_label(head, "Title:"),
                description: tail.trim().to_string(),
            },
            None => Self {
                title: strip_label(chunk, "Title:"),
                description: String::new(),
            },
        }
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.description.is_empty() {
            write!(f, "Title: {}", self.title)
        } else {
            write!(f, "Title: {}\nDescription: {}", self.title, self.description)
        }
    }
}

fn strip_label(text: &str, label: &str) -> String {
    let trimmed = text.trim();
    trimmed
        .strip_prefix(label)
        .map_or(trimmed, str::trim)
        .to_string()
}

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

/// A knowledge category produced by taxonomy discovery. Immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Unique name within its taxonomy level.
    pub name: String,
    /// What this category encompasses.
    pub description: String,
    /// Keywords or patterns the model used to identify the category.
    #[serde(default)]
    pub identifying_patterns: Vec<String>,
}

/// A category discovered within the scope of one parent category's expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCategory {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub identifying_patterns: Vec<String>,
    /// Name of the parent [`Category`] this sub-category refines.
    #[serde(default)]
    pub parent_category: String,
}

// ---------------------------------------------------------------------------
// Assignments
// ---------------------------------------------------------------------------

/// One classification result for one record at the top level.
///
/// A record may receive 0, 1, or 2 assignments; only the first is used for
/// bucketing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Name reference to a discovered [`Category`].
    pub category: String,
    /// Model-provided justification.
    #[serde(default)]
    pub reasoning: String,
}

/// One classification result for one record at the sub-category level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAssignment {
    /// Name reference to a discovered [`SubCategory`].
    pub subcategory: String,
    #[serde(default)]
    pub reasoning: String,
}

// ---------------------------------------------------------------------------
// KnowledgeArticle
// ---------------------------------------------------------------------------

/// Terminal pipeline output: one markdown article per leaf category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeArticle {
    /// Leaf category name. May be a composite path (`Parent > Child`) or a
    /// large-category fallback (`Name (Large Category)`).
    pub category_name: String,
    /// The synthesized article body.
    pub markdown_content: String,
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// A transient progress update. Each event supersedes the previous one for
/// display purposes; events are not retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub current: usize,
    pub total: usize,
    /// Human-readable description of the step in flight.
    pub task: String,
}

impl ProgressEvent {
    pub fn new(current: usize, total: usize, task: impl Into<String>) -> Self {
        Self {
            current,
            total,
            task: task.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineState
// ---------------------------------------------------------------------------

/// The orchestrator's state machine. Exactly one state is current at any
/// time; `Done` and `Error` are terminal until a new run resets the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PipelineState {
    Idle,
    Discovering,
    Categorizing,
    Synthesizing,
    Done,
    Error,
}

impl PipelineState {
    /// Whether the pipeline has finished (successfully or not).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Categorizing => "categorizing",
            Self::Synthesizing => "synthesizing",
            Self::Done => "done",
            Self::Error => "error",
        };
        write!(f, "{name}")
    }
}
