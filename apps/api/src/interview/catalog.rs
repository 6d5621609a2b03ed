use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// One scoring level of a criterion's rubric.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Level {
    pub score: u32,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Criterion {
    pub id: Value,
    pub name: String,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub levels: Vec<Level>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Career {
    pub id: Value,
    pub name: String,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    careers: Vec<Career>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CareerSummary {
    pub id: Value,
    pub name: String,
}

/// Careers offered for mock interviews, read once from `interview.json`.
#[derive(Debug, Clone, Default)]
pub struct InterviewCatalog {
    careers: Vec<Career>,
}

impl InterviewCatalog {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading interview catalog {}", path.display()))?;
        let catalog = Self::from_json(&raw)
            .with_context(|| format!("parsing interview catalog {}", path.display()))?;
        info!("Loaded {} interview careers", catalog.careers.len());
        Ok(catalog)
    }

    /// Criteria without questions, and careers left without criteria, are dropped.
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let file: CatalogFile = serde_json::from_str(raw)?;
        let careers = file
            .careers
            .into_iter()
            .filter_map(|mut career| {
                career.criteria.retain(|c| {
                    if c.questions.is_empty() {
                        warn!("Criterion '{}' of '{}' has no questions; skipping", c.name, career.name);
                    }
                    !c.questions.is_empty()
                });
                if career.criteria.is_empty() {
                    warn!("Career '{}' has no usable criteria; skipping", career.name);
                    return None;
                }
                Some(career)
            })
            .collect();
        Ok(Self { careers })
    }

    pub fn summaries(&self) -> Vec<CareerSummary> {
        self.careers
            .iter()
            .map(|c| CareerSummary {
                id: c.id.clone(),
                name: c.name.clone(),
            })
            .collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Career> {
        self.careers.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.careers.len()
    }
}

#[cfg(test)]
pub const SAMPLE_CATALOG: &str = r#"{
  "careers": [
    {
      "id": 1,
      "name": "Lập trình viên",
      "criteria": [
        {
          "id": "tech",
          "name": "Kiến thức kỹ thuật",
          "questions": ["Bạn dùng ngôn ngữ nào?", "Kể về một dự án khó."],
          "levels": [
            {"score": 1, "description": "Yếu"},
            {"score": 4, "description": "Xuất sắc"}
          ]
        },
        {
          "id": "soft",
          "name": "Kỹ năng mềm",
          "questions": ["Bạn làm việc nhóm thế nào?"],
          "levels": []
        }
      ]
    },
    {
      "id": 2,
      "name": "Nghề trống",
      "criteria": [{"id": "x", "name": "Không câu hỏi", "questions": []}]
    }
  ]
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_drops_unusable_careers() {
        let catalog = InterviewCatalog::from_json(SAMPLE_CATALOG).unwrap();
        assert_eq!(catalog.len(), 1);
        let summaries = catalog.summaries();
        assert_eq!(summaries[0].name, "Lập trình viên");
        assert_eq!(summaries[0].id, serde_json::json!(1));
    }

    #[test]
    fn test_find_by_name_is_exact() {
        let catalog = InterviewCatalog::from_json(SAMPLE_CATALOG).unwrap();
        assert!(catalog.find_by_name("Lập trình viên").is_some());
        assert!(catalog.find_by_name("lập trình viên").is_none());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = InterviewCatalog::load(&dir.path().join("interview.json")).unwrap_err();
        assert!(err.to_string().contains("reading interview catalog"));
    }
}
