//! Context Retriever - keyword intents with a substring fallback
//!
//! Deterministic and side-effect free: the same query over the same
//! knowledge base always yields the same context block.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::{KnowledgeBase, KnowledgeEntry};

/// High-level question categories detected from keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Questions about projects or the portfolio
    Projects,
    /// Questions about jobs and career history
    WorkHistory,
    /// Questions about skills and technologies
    Skills,
}

/// Probes checked in order; the first one with a keyword in the query wins.
const INTENT_PROBES: [(Intent, &str); 3] = [
    (Intent::Projects, "projects portfolio"),
    (Intent::WorkHistory, "work experience jobs career"),
    (Intent::Skills, "skills technologies languages"),
];

impl Intent {
    /// The probe phrase whose keywords trigger this intent.
    pub fn probe(&self) -> &'static str {
        INTENT_PROBES
            .iter()
            .find(|(intent, _)| intent == self)
            .map(|(_, probe)| *probe)
            .unwrap_or_default()
    }
}

/// Detect the intent of a query.
///
/// Matching is a plain substring test of each probe keyword against the
/// lowercased query, so "hi" would also match inside "this".
pub fn classify_intent(query: &str) -> Option<Intent> {
    let query = query.to_lowercase();
    INTENT_PROBES
        .iter()
        .find(|(_, probe)| probe.split_whitespace().any(|keyword| query.contains(keyword)))
        .map(|(intent, _)| *intent)
}

/// Selects and formats the knowledge relevant to a visitor question.
#[derive(Debug, Clone)]
pub struct ContextRetriever {
    knowledge: Arc<KnowledgeBase>,
    overview_id: String,
    owner_name: String,
}

impl ContextRetriever {
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        overview_id: impl Into<String>,
        owner_name: impl Into<String>,
    ) -> Self {
        Self {
            knowledge,
            overview_id: overview_id.into(),
            owner_name: owner_name.into(),
        }
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// Entries relevant to `query`, in knowledge-base order, each id once.
    pub fn select(&self, query: &str) -> Vec<&KnowledgeEntry> {
        let entries = self.knowledge.entries();

        let selected: Vec<&KnowledgeEntry> = match classify_intent(query) {
            Some(Intent::Projects) => entries
                .iter()
                .filter(|e| e.id.starts_with("project_"))
                .collect(),
            Some(Intent::WorkHistory) => entries
                .iter()
                .filter(|e| e.id.starts_with("work_"))
                .collect(),
            Some(Intent::Skills) => self.knowledge.get(&self.overview_id).into_iter().collect(),
            None => {
                let needle = query.to_lowercase();
                entries
                    .iter()
                    .filter(|e| searchable_text(e).to_lowercase().contains(&needle))
                    .collect()
            }
        };

        let mut seen = HashSet::with_capacity(selected.len());
        selected
            .into_iter()
            .filter(|e| seen.insert(e.id.as_str()))
            .collect()
    }

    /// Render the context block for `query`, or an empty string when
    /// nothing in the knowledge base is relevant.
    pub fn retrieve_relevant_context(&self, query: &str) -> String {
        let selected = self.select(query);
        if selected.is_empty() {
            return String::new();
        }

        let mut context = format!("**Context about {}:**\n\n", self.owner_name);
        for entry in selected {
            context.push_str(&EntryBlock(entry).to_string());
        }
        context
    }
}

/// All searchable fields of an entry joined with single spaces.
fn searchable_text(entry: &KnowledgeEntry) -> String {
    let mut parts: Vec<String> = vec![entry.title.clone()];
    parts.extend(entry.description.iter().cloned());
    parts.extend(entry.summary.iter().cloned());
    parts.extend(entry.technologies.as_ref().map(|t| t.join(" ")));
    parts.extend(entry.tech_stack.as_ref().map(|t| t.join(" ")));
    if let Some(skills) = &entry.skills {
        parts.extend(skills.iter().map(|(_, values)| values.join(" ")));
    }

    parts.retain(|p| !p.is_empty());
    parts.join(" ")
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn present_list(value: &Option<Vec<String>>) -> Option<&[String]> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// One entry rendered as a labelled block; absent fields are skipped.
struct EntryBlock<'a>(&'a KnowledgeEntry);

impl fmt::Display for EntryBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entry = self.0;
        writeln!(f, "--- {} ---", entry.title)?;

        if let Some(summary) = present(&entry.summary) {
            writeln!(f, "Summary: {}", summary)?;
        }
        if let Some(description) = present(&entry.description) {
            writeln!(f, "Description: {}", description)?;
        }
        if let Some(technologies) = present_list(&entry.technologies) {
            writeln!(f, "Technologies: {}", technologies.join(", "))?;
        }
        if let Some(tech_stack) = present_list(&entry.tech_stack) {
            writeln!(f, "Tech Stack: {}", tech_stack.join(", "))?;
        }
        if let Some(skills) = entry.skills.as_ref().filter(|s| !s.is_empty()) {
            writeln!(f, "Skills:")?;
            for (category, values) in skills.iter() {
                writeln!(f, "  - {}: {}", category, values.join(", "))?;
            }
        }
        writeln!(f)
    }
}
