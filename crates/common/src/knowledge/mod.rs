//! Static knowledge base about the site owner
//!
//! Entries are loaded once at startup from a JSON array and are read-only
//! afterwards. Ids carry their category as a prefix (`project_`, `work_`).

mod retriever;

pub use retriever::{classify_intent, ContextRetriever, Intent};

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::errors::{AppError, Result};

/// One fact sheet in the knowledge base.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub technologies: Option<Vec<String>>,
    #[serde(default, alias = "techStack")]
    pub tech_stack: Option<Vec<String>>,
    #[serde(default)]
    pub skills: Option<SkillSet>,
    #[serde(default)]
    pub link: Option<String>,
}

impl KnowledgeEntry {
    /// Create an entry with only its identity fields set.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            summary: None,
            technologies: None,
            tech_stack: None,
            skills: None,
            link: None,
        }
    }
}

/// Skill categories in the order they appear in the source document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkillSet(Vec<(String, Vec<String>)>);

impl SkillSet {
    pub fn new(groups: Vec<(String, Vec<String>)>) -> Self {
        Self(groups)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for SkillSet {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SkillSetVisitor;

        impl<'de> Visitor<'de> for SkillSetVisitor {
            type Value = SkillSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of skill category to a list of strings")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<SkillSet, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut groups = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((category, values)) = map.next_entry::<String, Vec<String>>()? {
                    groups.push((category, values));
                }
                Ok(SkillSet(groups))
            }
        }

        deserializer.deserialize_map(SkillSetVisitor)
    }
}

/// Ordered, immutable collection of knowledge entries.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    entries: Vec<KnowledgeEntry>,
}

impl KnowledgeBase {
    /// Build from entries, rejecting empty or duplicate ids.
    pub fn from_entries(entries: Vec<KnowledgeEntry>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if entry.id.is_empty() {
                return Err(AppError::KnowledgeBase {
                    message: format!("entry titled '{}' has an empty id", entry.title),
                });
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(AppError::KnowledgeBase {
                    message: format!("duplicate entry id '{}'", entry.id),
                });
            }
        }
        Ok(Self { entries })
    }

    /// Parse a JSON array of entries.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let entries: Vec<KnowledgeEntry> =
            serde_json::from_str(json).map_err(|e| AppError::KnowledgeBase {
                message: format!("invalid knowledge base JSON: {}", e),
            })?;
        Self::from_entries(entries)
    }

    /// Read and parse the knowledge base file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| AppError::KnowledgeBase {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        let kb = Self::from_json_str(&raw)?;
        tracing::info!(path = %path.display(), entries = kb.len(), "Knowledge base loaded");
        Ok(kb)
    }

    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&KnowledgeEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {
            "id": "profile_overview",
            "title": "Profile",
            "summary": "Full-stack engineer.",
            "skills": {
                "languages": ["Rust", "TypeScript"],
                "tools_platform": ["Docker"],
                "databases": ["PostgreSQL"]
            }
        },
        {
            "id": "project_alpha",
            "title": "Alpha",
            "description": "A realtime editor.",
            "tech_stack": ["React", "WebSockets"],
            "link": "https://example.com/alpha"
        },
        {
            "id": "work_beta",
            "title": "Beta Corp",
            "techStack": ["Go"]
        }
    ]"#;

    #[test]
    fn test_parse_sample() {
        let kb = KnowledgeBase::from_json_str(SAMPLE).unwrap();
        assert_eq!(kb.len(), 3);

        let alpha = kb.get("project_alpha").unwrap();
        assert_eq!(alpha.tech_stack.as_deref(), Some(&["React".to_string(), "WebSockets".to_string()][..]));
        assert_eq!(alpha.link.as_deref(), Some("https://example.com/alpha"));

        let beta = kb.get("work_beta").unwrap();
        assert_eq!(beta.tech_stack.as_deref(), Some(&["Go".to_string()][..]));
    }

    #[test]
    fn test_skill_categories_keep_source_order() {
        let kb = KnowledgeBase::from_json_str(SAMPLE).unwrap();
        let skills = kb.get("profile_overview").unwrap().skills.as_ref().unwrap();
        let categories: Vec<&str> = skills.iter().map(|(k, _)| k).collect();
        assert_eq!(categories, vec!["languages", "tools_platform", "databases"]);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = KnowledgeBase::from_entries(vec![
            KnowledgeEntry::new("project_a", "A"),
            KnowledgeEntry::new("project_a", "A again"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("project_a"));
    }

    #[test]
    fn test_empty_id_rejected() {
        assert!(KnowledgeBase::from_entries(vec![KnowledgeEntry::new("", "Nameless")]).is_err());
    }

    #[test]
    fn test_invalid_json_rejected() {
        assert!(KnowledgeBase::from_json_str("{not json").is_err());
        assert!(KnowledgeBase::from_json_str(r#"[{"title": "no id"}]"#).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = KnowledgeBase::load("/nonexistent/knowledge.json").unwrap_err();
        assert!(matches!(err, AppError::KnowledgeBase { .. }));
    }
}
