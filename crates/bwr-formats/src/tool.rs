//! Running external command-line tools (BLAST, BLAT)

use bwr_common::{BwrError, Result};
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::debug;

/// Find an executable by name on `PATH`
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Resolve `name` inside `dir` when given, otherwise on `PATH`
pub fn locate(name: &str, dir: Option<&Path>) -> Result<PathBuf> {
    let found = match dir {
        Some(dir) => Some(dir.join(name)).filter(|p| p.is_file()),
        None => find_in_path(name),
    };
    found.ok_or_else(|| BwrError::ToolNotFound(name.to_string()))
}

/// Run a tool to completion; a non-zero exit becomes [`BwrError::ToolFailed`]
/// carrying the tool's stderr
pub fn run<I, S>(executable: &Path, args: I) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let tool = executable
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| executable.display().to_string());
    let mut command = Command::new(executable);
    command.args(args);
    debug!(command = ?command, "Running external tool");

    let output = command.output().map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            BwrError::ToolNotFound(executable.display().to_string())
        } else {
            BwrError::tool_failed(&tool, e.to_string())
        }
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BwrError::tool_failed(tool, stderr.trim().to_string()));
    }
    Ok(output)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool() {
        let err = locate("definitely-not-a-real-tool-bwr", None).unwrap_err();
        assert!(matches!(err, BwrError::ToolNotFound(_)));

        let err = run(Path::new("/nonexistent/bwr-tool"), ["-h"]).unwrap_err();
        assert!(matches!(err, BwrError::ToolNotFound(_)));
    }
}
