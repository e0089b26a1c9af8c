use std::path::{Path, PathBuf};

use crate::error::ArtifactAmbiguityError;

/// The single file an encoder run produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactReference {
    /// Name exactly as announced by the encoder.
    pub relative_name: String,
    /// `relative_name` joined onto the result directory.
    pub resolved_path: PathBuf,
    /// File name up to the first `.`.
    pub base_name: String,
    /// Everything after the first `.` of the file name, possibly empty.
    pub extension: String,
}

/// Requires exactly one announced artifact and resolves it against
/// `result_dir`. Zero or several names fail rather than guess.
pub fn resolve_artifact(
    names: &[String],
    result_dir: &Path,
) -> Result<ArtifactReference, ArtifactAmbiguityError> {
    let [name] = names else {
        return Err(ArtifactAmbiguityError {
            count: names.len(),
            lines: names.to_vec(),
        });
    };

    let resolved_path = result_dir.join(name);
    let file_name = resolved_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.clone());
    let (base_name, extension) = split_first_dot(&file_name);

    Ok(ArtifactReference {
        relative_name: name.clone(),
        resolved_path,
        base_name: base_name.to_string(),
        extension: extension.to_string(),
    })
}

/// Splits on the first `.`: `tex.rgba.raw` → (`tex`, `rgba.raw`). Without a
/// dot the extension is empty.
pub fn split_first_dot(file_name: &str) -> (&str, &str) {
    file_name.split_once('.').unwrap_or((file_name, ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_first_dot() {
        assert_eq!(split_first_dot("tex.rgba.raw"), ("tex", "rgba.raw"));
        assert_eq!(split_first_dot("photo.raw"), ("photo", "raw"));
        assert_eq!(split_first_dot("noext"), ("noext", ""));
        assert_eq!(split_first_dot(".hidden"), ("", "hidden"));
    }

    #[test]
    fn test_exactly_one_resolves() {
        let artifact = resolve_artifact(&names(&["tex.rgba.raw"]), Path::new("/data/results"))
            .unwrap();
        assert_eq!(
            artifact,
            ArtifactReference {
                relative_name: "tex.rgba.raw".to_string(),
                resolved_path: PathBuf::from("/data/results/tex.rgba.raw"),
                base_name: "tex".to_string(),
                extension: "rgba.raw".to_string(),
            }
        );
    }

    #[test]
    fn test_zero_is_ambiguous() {
        let err = resolve_artifact(&[], Path::new("/data/results")).unwrap_err();
        assert_eq!(err.count, 0);
        assert!(err.lines.is_empty());
    }

    #[test]
    fn test_many_is_ambiguous() {
        let err = resolve_artifact(&names(&["a.raw", "b.raw"]), Path::new("/r")).unwrap_err();
        assert_eq!(err.count, 2);
        assert_eq!(err.lines, names(&["a.raw", "b.raw"]));

        let err =
            resolve_artifact(&names(&["a.raw", "b.raw", "c.raw"]), Path::new("/r")).unwrap_err();
        assert_eq!(err.count, 3);
    }

    #[test]
    fn test_split_uses_file_name_component() {
        let artifact =
            resolve_artifact(&names(&["sub.dir/photo.raw"]), Path::new("/r")).unwrap();
        assert_eq!(artifact.resolved_path, PathBuf::from("/r/sub.dir/photo.raw"));
        assert_eq!(artifact.base_name, "photo");
        assert_eq!(artifact.extension, "raw");
    }
}
