use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::process::Command;
use tracing::debug;

use crate::engine::SearchEngine;
use crate::errors::StageError;

/// Operation a stage performs
///
#[derive(Debug, Clone)]
pub enum StageOp {
    /// Spawn an external process and wait for it
    Process { program: PathBuf, args: Vec<String> },
    /// Rename a produced artifact
    Rename { from: PathBuf, to: PathBuf },
    /// Delete an intermediate artifact
    Delete { path: PathBuf },
}

/// One step of an engine job. Stages declare their filesystem contract so
/// the runner can verify artifacts and clean up intermediates.
///
#[derive(Debug, Clone)]
pub struct Stage {
    pub description: String,
    pub op: StageOp,
    pub working_dir: PathBuf,
    /// Artifacts which must exist before the stage runs
    pub inputs: Vec<PathBuf>,
    /// Artifacts which must exist after the stage ran
    pub outputs: Vec<PathBuf>,
    /// Whether the outputs survive intermediate cleanup
    pub retain_outputs: bool,
}

/// A fully assembled search job for one engine and one spectrum file
///
#[derive(Debug, Clone)]
pub struct EngineJob {
    pub engine: SearchEngine,
    pub spectrum_file: PathBuf,
    /// Files written into the working directory before the first stage,
    /// typically engine parameter files
    pub setup_files: Vec<(PathBuf, String)>,
    pub stages: Vec<Stage>,
    /// Engine result file holding target matches
    pub result_path: PathBuf,
    /// Separate decoy result file, for engines searching a decoy database in
    /// a second pass
    pub decoy_result_path: Option<PathBuf>,
}

/// How a job run ended
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRun {
    Completed,
    /// Stopped at a cancellation point between stages. Artifacts produced so
    /// far are left in place.
    Canceled,
}

/// Runs a single stage: verifies declared inputs, performs the operation and
/// verifies declared outputs. Process output (stdout and stderr interleaved)
/// becomes part of the error on a non-zero exit.
///
pub async fn run_stage(stage: &Stage) -> Result<(), StageError> {
    for input in &stage.inputs {
        if !input.exists() {
            return Err(StageError::MissingInputArtifact(input.clone()));
        }
    }

    match &stage.op {
        StageOp::Process { program, args } => {
            if program.components().count() > 1 && !program.exists() {
                return Err(StageError::MissingExecutable(program.clone()));
            }
            debug!("Running `{}` for `{}`", program.display(), &stage.description);
            let output = Command::new(program)
                .args(args)
                .current_dir(&stage.working_dir)
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|source| StageError::Spawn {
                    program: program.clone(),
                    source,
                })?;
            if !output.status.success() {
                let mut merged = String::from_utf8_lossy(&output.stdout).to_string();
                merged.push_str(&String::from_utf8_lossy(&output.stderr));
                return Err(StageError::NonZeroExit {
                    program: program.clone(),
                    code: output.status.code(),
                    output: merged,
                });
            }
        }
        StageOp::Rename { from, to } => {
            tokio::fs::rename(from, to).await?;
        }
        StageOp::Delete { path } => {
            tokio::fs::remove_file(path).await?;
        }
    }

    for output in &stage.outputs {
        if !output.exists() {
            return Err(StageError::MissingOutputArtifact(output.clone()));
        }
    }
    Ok(())
}

/// Runs all stages of a job in order with a cancellation point before each
/// stage. Setup files are written first; intermediate artifacts of
/// non-retaining stages are deleted once no later stage consumes them. On
/// error everything produced so far stays on disk for inspection.
///
pub async fn run_job(job: &EngineJob, cancel: &Arc<AtomicBool>) -> Result<JobRun, StageError> {
    for (path, content) in &job.setup_files {
        tokio::fs::write(path, content).await?;
    }

    let mut produced_intermediates: HashSet<PathBuf> = HashSet::new();
    for (index, stage) in job.stages.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            debug!("Job for `{}` canceled before `{}`", job.spectrum_file.display(), &stage.description);
            return Ok(JobRun::Canceled);
        }

        run_stage(stage).await?;

        if !stage.retain_outputs {
            produced_intermediates.extend(stage.outputs.iter().cloned());
        }

        // intermediates no later stage consumes are done for
        let consumed_later: HashSet<&PathBuf> = job.stages[index + 1..]
            .iter()
            .flat_map(|later| later.inputs.iter())
            .collect();
        let done: Vec<PathBuf> = produced_intermediates
            .iter()
            .filter(|path| !consumed_later.contains(path) && !is_result(job, path))
            .cloned()
            .collect();
        for path in done {
            produced_intermediates.remove(&path);
            if path.exists() {
                tokio::fs::remove_file(&path).await?;
            }
        }
    }

    for path in produced_intermediates {
        if !is_result(job, &path) && path.exists() {
            tokio::fs::remove_file(&path).await?;
        }
    }
    Ok(JobRun::Completed)
}

fn is_result(job: &EngineJob, path: &Path) -> bool {
    path == job.result_path
        || job
            .decoy_result_path
            .as_deref()
            .map(|decoy| decoy == path)
            .unwrap_or(false)
}

#[cfg(test)]
mod test {
    use super::*;

    fn temp_working_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("multisearch_job_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn shell_stage(dir: &Path, description: &str, script: &str) -> Stage {
        Stage {
            description: description.to_string(),
            op: StageOp::Process {
                program: PathBuf::from("sh"),
                args: vec!["-c".to_string(), script.to_string()],
            },
            working_dir: dir.to_path_buf(),
            inputs: vec![],
            outputs: vec![],
            retain_outputs: false,
        }
    }

    fn job_with_stages(dir: &Path, stages: Vec<Stage>, result: PathBuf) -> EngineJob {
        EngineJob {
            engine: SearchEngine::Comet,
            spectrum_file: dir.join("run01.mgf"),
            setup_files: vec![],
            stages,
            result_path: result,
            decoy_result_path: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_output_aborts_before_next_stage() {
        let dir = temp_working_dir();
        let mut first = shell_stage(&dir, "produce nothing", "true");
        first.outputs = vec![dir.join("never_written.txt")];
        let second = shell_stage(&dir, "must not run", "touch second_ran.txt");

        let job = job_with_stages(&dir, vec![first, second], dir.join("result.txt"));
        let cancel = Arc::new(AtomicBool::new(false));
        let result = run_job(&job, &cancel).await;

        assert!(matches!(result, Err(StageError::MissingOutputArtifact(_))));
        assert!(!dir.join("second_ran.txt").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_nonzero_exit_carries_merged_output() {
        let dir = temp_working_dir();
        let stage = shell_stage(&dir, "fail loudly", "echo boom; echo err >&2; exit 3");
        let job = job_with_stages(&dir, vec![stage], dir.join("result.txt"));
        let cancel = Arc::new(AtomicBool::new(false));

        match run_job(&job, &cancel).await {
            Err(StageError::NonZeroExit { code, output, .. }) => {
                assert_eq!(code, Some(3));
                assert!(output.contains("boom"));
                assert!(output.contains("err"));
            }
            other => panic!("expected NonZeroExit, got {:?}", other.map(|_| ())),
        }

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_intermediates_are_cleaned_and_results_retained() {
        let dir = temp_working_dir();
        let intermediate = dir.join("converted.tmp");
        let result = dir.join("result.txt");

        let mut convert = shell_stage(&dir, "convert", "printf spectra > converted.tmp");
        convert.outputs = vec![intermediate.clone()];
        let mut search = shell_stage(&dir, "search", "cp converted.tmp result.txt");
        search.inputs = vec![intermediate.clone()];
        search.outputs = vec![result.clone()];
        search.retain_outputs = true;

        let job = EngineJob {
            engine: SearchEngine::Comet,
            spectrum_file: dir.join("run01.mgf"),
            setup_files: vec![(dir.join("engine.params"), "tolerance = 10ppm\n".to_string())],
            stages: vec![convert, search],
            result_path: result.clone(),
            decoy_result_path: None,
        };
        let cancel = Arc::new(AtomicBool::new(false));
        let run = run_job(&job, &cancel).await.unwrap();

        assert_eq!(run, JobRun::Completed);
        assert!(dir.join("engine.params").exists());
        assert!(result.exists());
        assert!(!intermediate.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_before_first_stage_runs_nothing() {
        let dir = temp_working_dir();
        let stage = shell_stage(&dir, "must not run", "touch ran.txt");
        let job = job_with_stages(&dir, vec![stage], dir.join("result.txt"));
        let cancel = Arc::new(AtomicBool::new(true));

        let run = run_job(&job, &cancel).await.unwrap();
        assert_eq!(run, JobRun::Canceled);
        assert!(!dir.join("ran.txt").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rename_and_delete_stages() {
        let dir = temp_working_dir();
        let raw = dir.join("percolator.target.txt");
        let renamed = dir.join("run01_percolator.tsv");
        std::fs::write(&raw, "scan\tcharge\n").unwrap();

        let rename = Stage {
            description: "rename percolator output".to_string(),
            op: StageOp::Rename {
                from: raw.clone(),
                to: renamed.clone(),
            },
            working_dir: dir.clone(),
            inputs: vec![raw.clone()],
            outputs: vec![renamed.clone()],
            retain_outputs: true,
        };
        run_stage(&rename).await.unwrap();
        assert!(renamed.exists());
        assert!(!raw.exists());

        let delete = Stage {
            description: "delete renamed output".to_string(),
            op: StageOp::Delete {
                path: renamed.clone(),
            },
            working_dir: dir.clone(),
            inputs: vec![renamed.clone()],
            outputs: vec![],
            retain_outputs: false,
        };
        run_stage(&delete).await.unwrap();
        assert!(!renamed.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
