//! Saving generated sources and running the external assembler.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use anyhow::Context;
use tokio::process::Command;

/// Write `content` to `root/relative`, creating parent directories.
pub fn save(root: &Path, relative: &Path, content: &str) -> anyhow::Result<PathBuf> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    std::fs::write(&path, content).with_context(|| format!("cannot write {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = content.len(), "Saved generated source");
    Ok(path)
}

#[derive(Debug)]
pub struct AssembleOutcome {
    pub output: PathBuf,
    pub status: ExitStatus,
    pub stderr: String,
}

impl AssembleOutcome {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Run `<assembler> assemble <source> -o <source>.mbc`.
pub async fn assemble(assembler: &Path, source: &Path) -> anyhow::Result<AssembleOutcome> {
    if !assembler.exists() {
        anyhow::bail!("Assembler not found: {}", assembler.display());
    }
    let output = source.with_extension("mbc");

    let result = Command::new(assembler)
        .arg("assemble")
        .arg(source)
        .arg("-o")
        .arg(&output)
        .output()
        .await
        .with_context(|| format!("cannot run {}", assembler.display()))?;

    let outcome = AssembleOutcome {
        output,
        status: result.status,
        stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
    };
    if outcome.success() {
        tracing::info!(output = %outcome.output.display(), "Assembled");
    } else {
        tracing::warn!(status = %outcome.status, stderr = %outcome.stderr, "Assembler failed");
    }
    Ok(outcome)
}

/// `programs/<feature_name>.masm` for a free-form feature description.
pub fn program_path(feature: &str) -> PathBuf {
    let stem: String = feature
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    PathBuf::from("programs").join(format!("{stem}.masm"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = save(dir.path(), Path::new("programs/deep/timer.masm"), "RET\n").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "RET\n");
    }

    #[test]
    fn test_program_path() {
        assert_eq!(program_path("Text Editor"), PathBuf::from("programs/text_editor.masm"));
        assert_eq!(program_path("../etc"), PathBuf::from("programs/___etc.masm"));
    }

    #[tokio::test]
    async fn test_missing_assembler_is_an_error() {
        let err = assemble(Path::new("/nonexistent/masm"), Path::new("a.masm")).await.unwrap_err();
        assert!(err.to_string().contains("Assembler not found"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_assembler_exit_status_is_reported() {
        let ok = assemble(Path::new("/bin/true"), Path::new("prog/a.masm")).await.unwrap();
        assert!(ok.success());
        assert_eq!(ok.output, PathBuf::from("prog/a.mbc"));

        let failed = assemble(Path::new("/bin/false"), Path::new("prog/a.masm")).await.unwrap();
        assert!(!failed.success());
    }
}
