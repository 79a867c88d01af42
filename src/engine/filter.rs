use camino::Utf8Path;

/// Normalize a repository path to forward slashes.
pub fn unix_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Restricts tracking to files with the configured extensions.
///
/// Extensions compare case-insensitively and without the leading dot. An
/// empty list tracks every file.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    extensions: Vec<String>,
}

impl FileFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { extensions }
    }

    pub fn accepts(&self, path: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        Utf8Path::new(path)
            .extension()
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}
