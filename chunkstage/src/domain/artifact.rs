use std::fmt;

use crate::domain::ContentHash;
use crate::error::AppError;

/// Name of a reassembled file under the storage root: `<hash><ext>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArtifactName(String);

impl ArtifactName {
    pub fn new(hash: &ContentHash, filename: &str) -> Result<Self, AppError> {
        let ext = extension_of(filename)?;
        Ok(ArtifactName(format!("{hash}{ext}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns `filename` from its last `.` to the end, or `""` when there is no `.`.
pub fn extension_of(filename: &str) -> Result<&str, AppError> {
    let ext = filename.rfind('.').map_or("", |pos| &filename[pos..]);
    if ext.contains(['/', '\\', '\0']) {
        return Err(AppError::Validation(format!(
            "filename `{filename}` has an unusable extension"
        )));
    }
    Ok(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_from_last_dot() {
        assert_eq!(extension_of("movie.mp4").unwrap(), ".mp4");
        assert_eq!(extension_of("backup.tar.gz").unwrap(), ".gz");
        assert_eq!(extension_of(".bashrc").unwrap(), ".bashrc");
        assert_eq!(extension_of("trailing.").unwrap(), ".");
    }

    #[test]
    fn test_extension_without_dot_is_empty() {
        assert_eq!(extension_of("README").unwrap(), "");
    }

    #[test]
    fn test_extension_with_separator_is_rejected() {
        assert!(extension_of("a.d/../../etc").is_err());
        assert!(extension_of("x.\\evil").is_err());
    }

    #[test]
    fn test_artifact_name_is_hash_plus_extension() {
        let hash = ContentHash::parse("cafebabe").unwrap();
        assert_eq!(ArtifactName::new(&hash, "clip.mov").unwrap().as_str(), "cafebabe.mov");
        assert_eq!(ArtifactName::new(&hash, "noext").unwrap().as_str(), "cafebabe");
    }
}
