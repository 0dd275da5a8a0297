//! Concrete processing-engine runner: locates and executes the topsApp
//! application, teeing its output to a persistent execution log.

use crate::core::pipeline::{EngineRunner, StepRange};
use crate::types::{InsarError, InsarResult};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;

const ENGINE_APP: &str = "topsApp.py";
const EXECUTION_LOG: &str = "isce_execution.log";

/// Runs the external engine as a subprocess in the working directory
pub struct TopsAppRunner {
    app_path: PathBuf,
}

impl TopsAppRunner {
    /// Locate the engine application: `$ISCE_HOME/applications` first, then
    /// the directories on PATH.
    pub fn discover() -> InsarResult<Self> {
        if let Some(isce_home) = std::env::var_os("ISCE_HOME") {
            let candidate = Path::new(&isce_home).join("applications").join(ENGINE_APP);
            if candidate.is_file() {
                log::info!("Engine found via ISCE_HOME: {}", candidate.display());
                return Ok(Self { app_path: candidate });
            }
        }

        if let Some(path_var) = std::env::var_os("PATH") {
            for dir in std::env::split_paths(&path_var) {
                let candidate = dir.join(ENGINE_APP);
                if candidate.is_file() {
                    log::info!("Engine found on PATH: {}", candidate.display());
                    return Ok(Self { app_path: candidate });
                }
            }
        }

        Err(InsarError::ExternalTool(format!(
            "{} not found; set ISCE_HOME or add it to PATH",
            ENGINE_APP
        )))
    }

    pub fn with_app_path<P: Into<PathBuf>>(app_path: P) -> Self {
        Self { app_path: app_path.into() }
    }

    pub fn app_path(&self) -> &Path {
        &self.app_path
    }
}

impl EngineRunner for TopsAppRunner {
    fn run(&self, work_dir: &Path, steps: &StepRange) -> InsarResult<()> {
        let mut command = Command::new(&self.app_path);
        command
            .arg("topsApp.xml")
            .current_dir(work_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(start) = &steps.start {
            command.arg("--start").arg(start);
        }
        if let Some(end) = &steps.end {
            command.arg("--end").arg(end);
        }

        log::info!(
            "Running {} in {} (steps: {:?}..{:?})",
            self.app_path.display(),
            work_dir.display(),
            steps.start,
            steps.end
        );

        let mut child = command.spawn().map_err(|e| {
            InsarError::ExternalTool(format!("failed to launch {}: {}", ENGINE_APP, e))
        })?;

        let log_file = std::fs::File::create(work_dir.join(EXECUTION_LOG))?;
        let sink = Mutex::new(log_file);

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        std::thread::scope(|scope| {
            if let Some(stdout) = stdout {
                scope.spawn(|| tee_stream(stdout, &sink, false));
            }
            if let Some(stderr) = stderr {
                scope.spawn(|| tee_stream(stderr, &sink, true));
            }
        });

        let status = child.wait().map_err(|e| {
            InsarError::ExternalTool(format!("failed to wait for {}: {}", ENGINE_APP, e))
        })?;

        if !status.success() {
            return Err(InsarError::ExternalTool(format!(
                "{} exited with {}; see {}",
                ENGINE_APP,
                status,
                work_dir.join(EXECUTION_LOG).display()
            )));
        }
        Ok(())
    }
}

/// Forward one output stream line-by-line to both the execution log and the
/// process logger.
fn tee_stream<R: std::io::Read>(stream: R, sink: &Mutex<std::fs::File>, is_stderr: bool) {
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        if is_stderr {
            log::warn!("[engine] {}", line);
        } else {
            log::info!("[engine] {}", line);
        }
        if let Ok(mut file) = sink.lock() {
            let _ = writeln!(file, "{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_reports_nonzero_exit_as_external_tool() {
        let dir = TempDir::new().unwrap();
        let runner = TopsAppRunner::with_app_path("/bin/false");
        let err = runner.run(dir.path(), &StepRange::default()).unwrap_err();
        assert!(matches!(err, InsarError::ExternalTool(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tees_output_to_execution_log() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("fake_engine.sh");
        std::fs::write(&script, "#!/bin/sh\necho step one\necho step two\n").unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let runner = TopsAppRunner::with_app_path(&script);
        runner.run(dir.path(), &StepRange::default()).unwrap();

        let logged = std::fs::read_to_string(dir.path().join(EXECUTION_LOG)).unwrap();
        assert!(logged.contains("step one"));
        assert!(logged.contains("step two"));
    }

    #[test]
    fn test_step_range_passed_through() {
        let steps = StepRange {
            start: Some("unwrap".to_string()),
            end: Some("geocode".to_string()),
        };
        assert_eq!(steps.start.as_deref(), Some("unwrap"));
        assert_eq!(steps.end.as_deref(), Some("geocode"));
    }
}
