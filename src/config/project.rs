//! The `.m365rc.json` project file
//!
//! Lives in the working directory and holds the app registrations created for
//! the project (`apps`) plus free-form context options (`context`). Keys this
//! tool doesn't know about are carried through unchanged on save.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub const PROJECT_FILE: &str = ".m365rc.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectApp {
    pub app_id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apps: Option<Vec<ProjectApp>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl ProjectFile {
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(PROJECT_FILE)
    }

    /// Read the project file; `Ok(None)` when it doesn't exist
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = Self::path_in(dir);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(Self::path_in(dir), contents)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_none() && self.context.is_none() && self.other.is_empty()
    }

    pub fn apps(&self) -> &[ProjectApp] {
        self.apps.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProjectFile::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_unknown_keys_survive_save() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            ProjectFile::path_in(dir.path()),
            r#"{"apps":[{"appId":"9b1b1e42-794b-4c71-93ac-5ed92488b67f","name":"Contoso"}],"context":{"listName":"Tasks"},"$schema":"x"}"#,
        )
        .unwrap();

        let mut project = ProjectFile::load(dir.path()).unwrap().unwrap();
        assert_eq!(project.apps()[0].name, "Contoso");
        project.context.as_mut().unwrap().remove("listName");
        project.save(dir.path()).unwrap();

        let saved: Value =
            serde_json::from_str(&fs::read_to_string(ProjectFile::path_in(dir.path())).unwrap())
                .unwrap();
        assert_eq!(saved["$schema"], "x");
        assert_eq!(saved["context"], serde_json::json!({}));
        assert_eq!(saved["apps"][0]["appId"], "9b1b1e42-794b-4c71-93ac-5ed92488b67f");
    }
}
