//! Verdict emission.

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use tracing::error;

use kubecheck_core::Verdict;

/// Write `verdict` to `path` (or stdout) and return the process exit code.
///
/// If the file cannot be written the verdict goes to stdout instead, so the
/// scheduler always sees a status line.
pub fn emit(verdict: &Verdict, path: Option<&Path>) -> i32 {
    let rendered = verdict.render();
    if let Some(path) = path {
        match write_file(path, &rendered) {
            Ok(()) => return verdict.exit_code(),
            Err(e) => error!(error = %format!("{e:#}"), "cannot write verdict file, using stdout"),
        }
    }

    let mut stdout = std::io::stdout().lock();
    if let Err(e) = stdout.write_all(rendered.as_bytes()).and_then(|()| stdout.flush()) {
        error!(error = %e, "cannot write verdict to stdout");
    }
    verdict.exit_code()
}

fn write_file(path: &Path, rendered: &str) -> anyhow::Result<()> {
    std::fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))
}
