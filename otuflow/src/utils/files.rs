//! Input discovery.

use crate::errors::{OtuflowError, Result};
use std::path::{Path, PathBuf};

/// Lists the regular files in `dir` whose name contains `filter`, sorted by path.
///
/// # Errors
///
/// Returns an error if the directory cannot be read or nothing matches.
pub fn collect_inputs(dir: &Path, filter: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = match (filter, path.file_name()) {
            (None, _) => true,
            (Some(filter), Some(name)) => name.to_string_lossy().contains(filter),
            (Some(_), None) => false,
        };
        if matches {
            inputs.push(path);
        }
    }

    if inputs.is_empty() {
        return Err(OtuflowError::MissingInput(dir.join(filter.unwrap_or("*"))));
    }
    inputs.sort();
    Ok(inputs)
}

/// The final path component as text, or the whole path if there is none.
#[must_use]
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.to_string_lossy(), |n| n.to_string_lossy())
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_collect_inputs_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b_R1.fastq", "a_R1.fastq", "a_R2.fastq", "notes.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub_R1")).unwrap();

        let inputs = collect_inputs(dir.path(), Some("fastq")).unwrap();
        let names: Vec<_> = inputs.iter().map(|p| file_name(p)).collect();
        assert_eq!(names, vec!["a_R1.fastq", "a_R2.fastq", "b_R1.fastq"]);

        assert_eq!(collect_inputs(dir.path(), None).unwrap().len(), 4);
    }

    #[test]
    fn test_collect_inputs_empty_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect_inputs(dir.path(), Some("fastq")).unwrap_err();
        assert!(matches!(err, OtuflowError::MissingInput(_)));
    }
}
