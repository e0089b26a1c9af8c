//! Artifact discovery from the encoder's diagnostic output.
//!
//! `glraw-cmd` reports each file it writes as a line `<name> created.` on
//! stderr. There is no structured channel, so this suffix is the whole
//! contract; if the phrasing changes upstream, parsing yields nothing and the
//! resolver fails the job.

/// Suffix marking a line as an artifact announcement.
pub const CREATION_MARKER: &str = " created.";

/// Returns the distinct artifact names announced in `output`, in emission
/// order. Lines are split on `\n`; a trailing `\r` is ignored.
pub fn parse_created(output: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for line in output.lines() {
        let Some(name) = line.strip_suffix(CREATION_MARKER) else {
            continue;
        };
        if name.is_empty() {
            log::warn!("creation marker without a file name: {:?}", line);
            continue;
        }
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_markers() {
        assert_eq!(
            parse_created("foo.raw created.\nbar.raw created.\n"),
            vec!["foo.raw", "bar.raw"]
        );
    }

    #[test]
    fn test_nothing_found() {
        assert!(parse_created("").is_empty());
        assert!(parse_created("unrelated line").is_empty());
        assert!(parse_created("foo.raw created. \nfoo.raw was created\n").is_empty());
    }

    #[test]
    fn test_duplicates_collapse_in_order() {
        let output = "b.raw created.\na.raw created.\nb.raw created.\n";
        assert_eq!(parse_created(output), vec!["b.raw", "a.raw"]);
    }

    #[test]
    fn test_names_may_contain_spaces_and_dots() {
        let output = "Loading image\r\nmy tex.rgba.ub.raw created.\r\n";
        assert_eq!(parse_created(output), vec!["my tex.rgba.ub.raw"]);
    }

    #[test]
    fn test_bare_marker_is_skipped() {
        assert!(parse_created(" created.\n").is_empty());
    }

    /// Pinned to the announcement format of glraw-cmd. If the encoder changes
    /// its wording this must fail here, not as "zero artifacts" in production.
    #[test]
    fn test_glraw_cmd_output_contract() {
        let stderr = "\
Loading /tmp/glraw-3fA9kQ.png
Converting to GL_RGBA GL_UNSIGNED_BYTE
glraw-3fA9kQ.rgba.ub.raw created.
";
        assert_eq!(parse_created(stderr), vec!["glraw-3fA9kQ.rgba.ub.raw"]);
    }
}
