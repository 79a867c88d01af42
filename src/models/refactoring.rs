use camino::Utf8Path;
use serde::{Deserialize, Serialize};

/// A refactoring reported by the oracle, narrowed to one affected file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refactoring {
    pub file_path: String,
    pub refactoring_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

impl Refactoring {
    /// Class name to label the sample with: the oracle's value, else the file stem.
    pub fn class_name(&self) -> String {
        if let Some(name) = &self.class_name {
            return name.clone();
        }
        Utf8Path::new(&self.file_path)
            .file_stem()
            .unwrap_or(&self.file_path)
            .to_string()
    }
}
