// Runs Valgrind memcheck on the target program

use std::fs;
use std::path::Path;
use std::process::Command;

use tracing::info;

use crate::config::AnalysisConfig;
use crate::errors::ReportError;
use crate::process;

/// Flags passed to memcheck ahead of the target command line.
const MEMCHECK_FLAGS: &[&str] = &[
    "--leak-check=full",
    "--show-leak-kinds=all",
    "--track-origins=yes",
];

/// Checks that `path` names an executable regular file.
pub fn check_executable(path: &Path) -> Result<(), ReportError> {
    let meta = fs::metadata(path).map_err(|_| ReportError::ExecutableMissing(path.to_path_buf()))?;
    if !meta.is_file() {
        return Err(ReportError::NotAFile(path.to_path_buf()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            return Err(ReportError::NotExecutable(path.to_path_buf()));
        }
    }

    Ok(())
}

/// Runs memcheck on `executable args...` and returns its report (stderr).
pub fn run_valgrind(
    config: &AnalysisConfig,
    executable: &Path,
    args: &[String],
) -> Result<String, ReportError> {
    check_executable(executable)?;

    let mut command = Command::new(&config.valgrind);
    command.args(MEMCHECK_FLAGS).arg(executable).args(args);

    info!(executable = %executable.display(), "running valgrind");
    let output = process::run_with_timeout(&mut command, config.valgrind_timeout)?;

    // The target's exit status is irrelevant; memcheck still reports.
    if output.stderr.trim().is_empty() {
        return Err(ReportError::EmptyOutput);
    }
    Ok(output.stderr)
}

/// Reads a previously saved memcheck log.
pub fn read_report(path: &Path) -> Result<String, ReportError> {
    fs::read_to_string(path).map_err(|source| ReportError::Unreadable {
        path: path.to_path_buf(),
        source,
    })
}
