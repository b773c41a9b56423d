//! Per-request temporary files for transcoding.

use std::path::{Path, PathBuf};

/// Maximum length of the sanitized original file name kept in scratch names.
const MAX_NAME_LEN: usize = 64;

/// Input and output files of one transcode, removed when dropped.
///
/// Names are `<unix-millis>_<random>_<original name>` so concurrent requests
/// never collide. Removal failures are logged and otherwise ignored.
#[derive(Debug)]
pub struct ScratchFiles {
    input: PathBuf,
    output: PathBuf,
}

impl ScratchFiles {
    /// Writes `raw` into a fresh input file under `dir`.
    ///
    /// On failure, anything already written is removed before returning.
    pub async fn create(dir: &Path, original_name: &str, raw: &[u8]) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;

        let stem = format!(
            "{}_{}_{}",
            chrono::Utc::now().timestamp_millis(),
            &uuid::Uuid::new_v4().simple().to_string()[..8],
            sanitize_file_name(original_name)
        );
        let files = Self {
            input: dir.join(&stem),
            output: dir.join(format!("{}.16k.wav", stem)),
        };

        tokio::fs::write(&files.input, raw).await?;
        Ok(files)
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }
}

// Removal is synchronous so the files are gone once `process` returns or
// unwinds. Two unlinks in the scratch directory block only briefly; there
// is no async drop to hand them to.
impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in [&self.input, &self.output] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove scratch file");
                }
            }
        }
    }
}

/// Keeps ASCII alphanumerics, `.`, `-` and `_`; everything else becomes `_`.
fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "recording".to_string()
    } else {
        cleaned.to_string()
    }
}
