// Score corpus: a directory tree of JSON score files.
//
// Each file holds one `Score` (catalogue number, optional title, parts with
// their voices). Files are discovered recursively, sorted by path so the
// batch order is stable across filesystems, and parsed on demand. Voices are
// validated on deserialization, so a score that loads is already a set of
// well-formed voices.

use crate::error::{PipelineError, PipelineResult};
use crate::score::{Part, Score};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

pub fn load_score(path: &Path) -> PipelineResult<Score> {
    let data = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    serde_json::from_str(&data).map_err(|source| PipelineError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Every `.json` file under `dir`, sorted by path.
pub fn score_paths(dir: &Path) -> PipelineResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let is_json = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if entry.file_type().is_file() && is_json {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

/// Find the score with catalogue number `number`. Files that fail to parse
/// are logged and passed over.
pub fn find_score(dir: &Path, number: u32) -> PipelineResult<Score> {
    for path in score_paths(dir)? {
        match load_score(&path) {
            Ok(score) if score.number == number => return Ok(score),
            Ok(_) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable score"),
        }
    }
    Err(PipelineError::ScoreNotFound { number })
}

/// Check that the score has exactly the four chorale parts.
pub fn validate_parts(score: &Score) -> PipelineResult<()> {
    let expected: BTreeSet<&str> = Part::ALL.iter().map(|p| p.name()).collect();
    if score.parts.len() != expected.len() || score.part_ids() != expected {
        return Err(PipelineError::SkippableInputMismatch {
            number: score.number,
            found: score.parts.iter().map(|p| p.id.clone()).collect(),
        });
    }
    Ok(())
}
