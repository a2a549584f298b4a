// dump.rs

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use rayon::prelude::*;

use crate::error::{PipelineError, Result};

/// Configuration for the batch SRA conversion + QC run. Parallelism comes
/// from the caller-configured rayon pool, not from ambient CPU detection.
#[derive(Debug)]
pub(crate) struct DumpConfig {
    pub(crate) sra_dir: PathBuf,
    pub(crate) out_dir: PathBuf,
    pub(crate) qc_dir: PathBuf,
}

#[derive(Debug, Default)]
pub(crate) struct DumpSummary {
    pub(crate) converted: usize,
    pub(crate) convert_failures: usize,
    pub(crate) qc_passed: usize,
    pub(crate) qc_failures: usize,
}

/// Converts every `.sra` file in `sra_dir` to FASTQ with `fasterq-dump`, then
/// runs `fastqc` over each produced `.fastq` file.
///
/// Per-file tool failures are logged and skipped; each tool writes to its own
/// named output path so a failed item leaves no ambiguous partial state. The
/// run fails only when the input set is empty or no conversion succeeded.
pub(crate) fn run_batch(config: &DumpConfig) -> Result<DumpSummary> {
    if !config.sra_dir.is_dir() {
        return Err(PipelineError::Configuration(format!(
            "SRA input directory {} not found",
            config.sra_dir.display()
        )));
    }
    let sra_files = discover_files(&config.sra_dir, "sra")?;
    if sra_files.is_empty() {
        return Err(PipelineError::Configuration(format!(
            "no .sra files found in {}",
            config.sra_dir.display()
        )));
    }
    fs::create_dir_all(&config.out_dir)?;
    fs::create_dir_all(&config.qc_dir)?;

    info!(
        "Converting {} SRA file(s) from {} into {}...",
        sra_files.len(),
        config.sra_dir.display(),
        config.out_dir.display()
    );
    let pb = batch_progress_bar(sra_files.len(), "SRA")?;
    let convert_results: Vec<(PathBuf, Result<()>)> = sra_files
        .par_iter()
        .map(|sra_path| {
            let result = run_tool(
                "fasterq-dump",
                &[
                    OsStr::new("--outdir"),
                    config.out_dir.as_os_str(),
                    sra_path.as_os_str(),
                ],
                sra_path,
            );
            pb.inc(1);
            (sra_path.clone(), result)
        })
        .collect();
    pb.finish_with_message("SRA conversion complete.");

    let mut summary = DumpSummary::default();
    for (path, result) in convert_results {
        match result {
            Ok(()) => summary.converted += 1,
            Err(e) => {
                summary.convert_failures += 1;
                error!("Conversion of {} failed: {}", path.display(), e);
            }
        }
    }
    if summary.converted == 0 {
        return Err(PipelineError::ExternalTool {
            tool: "fasterq-dump".to_string(),
            input: config.sra_dir.clone(),
            message: format!("all {} conversion(s) failed", summary.convert_failures),
        });
    }

    let fastq_files = discover_files(&config.out_dir, "fastq")?;
    if fastq_files.is_empty() {
        warn!(
            "No .fastq files found in {} after conversion; skipping QC.",
            config.out_dir.display()
        );
        return Ok(summary);
    }

    info!(
        "Running QC on {} FASTQ file(s) into {}...",
        fastq_files.len(),
        config.qc_dir.display()
    );
    let pb = batch_progress_bar(fastq_files.len(), "FASTQ")?;
    let qc_results: Vec<(PathBuf, Result<()>)> = fastq_files
        .par_iter()
        .map(|fastq_path| {
            let result = run_tool(
                "fastqc",
                &[
                    fastq_path.as_os_str(),
                    OsStr::new("--outdir"),
                    config.qc_dir.as_os_str(),
                ],
                fastq_path,
            );
            pb.inc(1);
            (fastq_path.clone(), result)
        })
        .collect();
    pb.finish_with_message("QC complete.");

    for (path, result) in qc_results {
        match result {
            Ok(()) => summary.qc_passed += 1,
            Err(e) => {
                summary.qc_failures += 1;
                error!("QC of {} failed: {}", path.display(), e);
            }
        }
    }

    info!(
        "Batch finished: {}/{} converted, {}/{} passed QC.",
        summary.converted,
        summary.converted + summary.convert_failures,
        summary.qc_passed,
        summary.qc_passed + summary.qc_failures
    );
    Ok(summary)
}

/// Lists files in `dir` with the given extension, sorted for a stable
/// processing order.
fn discover_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().map_or(false, |ext| ext == extension)
        })
        .collect();
    files.sort();
    Ok(files)
}

fn batch_progress_bar(len: usize, noun: &str) -> Result<ProgressBar> {
    let style = ProgressStyle::default_bar()
        .template(&format!(
            "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} files ({{percent}}%) ETA: {{eta}}",
            noun
        ))
        .map_err(|e| {
            PipelineError::Configuration(format!("failed to create progress bar style: {}", e))
        })?
        .progress_chars("=> ");
    Ok(ProgressBar::new(len as u64).with_style(style))
}

/// Runs one external tool invocation to completion.
///
/// A missing executable or a non-zero exit becomes `ExternalTool`; the batch
/// loop above decides whether that is fatal.
fn run_tool(tool: &str, args: &[&OsStr], input: &Path) -> Result<()> {
    let output = Command::new(tool).args(args).output().map_err(|e| {
        let message = if e.kind() == std::io::ErrorKind::NotFound {
            "executable not found on PATH".to_string()
        } else {
            e.to_string()
        };
        PipelineError::ExternalTool {
            tool: tool.to_string(),
            input: input.to_path_buf(),
            message,
        }
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let snippet: String = stderr.chars().take(400).collect();
        return Err(PipelineError::ExternalTool {
            tool: tool.to_string(),
            input: input.to_path_buf(),
            message: format!("exited with {} ({})", output.status, snippet.trim()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn missing_input_directory_is_a_configuration_error() {
        let config = DumpConfig {
            sra_dir: PathBuf::from("/definitely/not/here"),
            out_dir: PathBuf::from("out"),
            qc_dir: PathBuf::from("qc"),
        };
        assert!(matches!(
            run_batch(&config).unwrap_err(),
            PipelineError::Configuration(_)
        ));
    }

    #[test]
    fn directory_without_sra_files_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("reads.fastq")).unwrap();
        let config = DumpConfig {
            sra_dir: dir.path().to_path_buf(),
            out_dir: dir.path().join("out"),
            qc_dir: dir.path().join("qc"),
        };
        assert!(matches!(
            run_batch(&config).unwrap_err(),
            PipelineError::Configuration(_)
        ));
    }

    #[test]
    fn discover_filters_by_extension_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("b.sra")).unwrap();
        File::create(dir.path().join("a.sra")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();
        let files = discover_files(dir.path(), "sra").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.sra", "b.sra"]);
    }

    #[test]
    fn missing_executable_maps_to_external_tool_error() {
        let input = PathBuf::from("sample.sra");
        let err = run_tool("definitely-not-a-real-tool-xyz", &[], &input).unwrap_err();
        match err {
            PipelineError::ExternalTool { tool, message, .. } => {
                assert_eq!(tool, "definitely-not-a-real-tool-xyz");
                assert!(message.contains("not found"));
            }
            other => panic!("expected ExternalTool, got {:?}", other),
        }
    }

    #[test]
    fn non_zero_exit_maps_to_external_tool_error() {
        let input = PathBuf::from("sample.sra");
        let err = run_tool("sh", &[OsStr::new("-c"), OsStr::new("exit 3")], &input)
            .unwrap_err();
        assert!(matches!(err, PipelineError::ExternalTool { .. }));
    }
}
