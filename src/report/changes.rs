use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ChangeKind {
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub content: String,
    pub description: String,
}

impl Change {
    fn new(kind: ChangeKind, content: &str) -> Self {
        let verb = match kind {
            ChangeKind::Added => "Added",
            ChangeKind::Removed => "Removed",
        };
        Self {
            kind,
            content: content.to_string(),
            description: format!("{verb}: {content}"),
        }
    }
}

/// Line-set difference between an original and a patched artifact.
///
/// Lines are compared trimmed, blank lines ignored, and each distinct line
/// reported once. Added lines come first in patched order, then removed
/// lines in original order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub total_changes: usize,
    #[serde(rename = "changes_detail")]
    pub changes: Vec<Change>,
}

fn significant_lines(text: &str) -> Vec<&str> {
    let mut seen = HashSet::new();
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && seen.insert(*line))
        .collect()
}

impl ChangeSet {
    pub fn between(original: &str, patched: &str) -> Self {
        let original_lines = significant_lines(original);
        let patched_lines = significant_lines(patched);
        let original_set: HashSet<&str> = original_lines.iter().copied().collect();
        let patched_set: HashSet<&str> = patched_lines.iter().copied().collect();

        let added = patched_lines
            .iter()
            .filter(|line| !original_set.contains(*line))
            .map(|line| Change::new(ChangeKind::Added, line));
        let removed = original_lines
            .iter()
            .filter(|line| !patched_set.contains(*line))
            .map(|line| Change::new(ChangeKind::Removed, line));

        let changes: Vec<Change> = added.chain(removed).collect();
        Self {
            total_changes: changes.len(),
            changes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn of_kind(&self, kind: ChangeKind) -> impl Iterator<Item = &Change> {
        self.changes.iter().filter(move |c| c.kind == kind)
    }
}
