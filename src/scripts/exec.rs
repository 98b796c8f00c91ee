use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{AppError, Result};
use crate::scripts::Script;

/// Combined output of a script run.
#[derive(Debug, Clone)]
pub struct ScriptOutput {
    pub output: String,
}

/// Run `script` with `workdir` as its working directory.
///
/// stdout and stderr are captured together. A non-zero exit is an
/// `AppError::Script`; exceeding `timeout` kills the child and yields
/// `AppError::Timeout`.
pub async fn run_script(
    script: &Script,
    workdir: &Path,
    env: &[(&str, String)],
    timeout: Duration,
) -> Result<ScriptOutput> {
    let mut command = Command::new(&script.path);
    command
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, value) in env {
        command.env(key, value);
    }

    let child = command.spawn()?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| AppError::Timeout(timeout))??;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(AppError::Script {
            script: script.path.clone(),
            status: output.status.to_string(),
            output: combined,
        });
    }

    Ok(ScriptOutput { output: combined })
}
