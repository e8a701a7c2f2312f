//! Terraform invocation and failure classification.
//!
//! `apply` runs `terraform init` and `terraform apply -auto-approve -json`.
//! A failed apply is tolerated only when every error it reports matches the
//! configured allow-list (resources that already exist). Errors are taken
//! from the JSON diagnostics on stdout; stderr is the fallback when the tool
//! printed none.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ProvisionConfig;
use crate::error::{DwhError, Result};

/// Captured result of one tool invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Apply failed, but only with allow-listed errors.
    Tolerated { errors: Vec<String> },
}

/// Runs an external tool binary in a working directory.
#[derive(Debug, Clone)]
pub struct Tool {
    bin: String,
    dir: String,
}

impl Tool {
    pub fn new(bin: impl Into<String>, dir: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            dir: dir.into(),
        }
    }

    /// The configured terraform binary in the configured directory.
    pub fn terraform(config: &ProvisionConfig) -> Self {
        Self::new(&config.terraform_bin, &config.terraform_dir)
    }

    pub async fn run<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<CommandOutput> {
        debug!(
            bin = %self.bin,
            dir = %self.dir,
            args = ?args.iter().map(|a| a.as_ref().to_string_lossy()).collect::<Vec<_>>(),
            "Running tool"
        );
        let output = Command::new(&self.bin)
            .args(args)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                DwhError::provision(format!(
                    "failed to start '{}' in '{}': {}",
                    self.bin, self.dir, e
                ))
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// `terraform init` then `terraform apply`, classifying apply failures.
pub async fn apply(config: &ProvisionConfig) -> Result<ApplyOutcome> {
    let terraform = Tool::terraform(config);

    info!(dir = %config.terraform_dir, "Running terraform init");
    let init = terraform.run(&["init", "-input=false", "-no-color"]).await?;
    if !init.success {
        return Err(DwhError::provision(format!(
            "terraform init exited with {:?}: {}",
            init.status,
            init.stderr.trim()
        )));
    }

    info!("Running terraform apply");
    let output = terraform
        .run(&["apply", "-auto-approve", "-input=false", "-json"])
        .await?;
    let outcome = classify_apply(&output, &config.tolerated_errors)?;

    match &outcome {
        ApplyOutcome::Applied => info!("Terraform apply succeeded"),
        ApplyOutcome::Tolerated { errors } => {
            for error in errors {
                warn!(error = %error, "Tolerated terraform error");
            }
            warn!(count = errors.len(), "Terraform apply failed with tolerated errors only; continuing");
        }
    }
    Ok(outcome)
}

/// Decide whether an apply result is success, tolerated, or fatal.
pub fn classify_apply(output: &CommandOutput, tolerated: &[String]) -> Result<ApplyOutcome> {
    if output.success {
        return Ok(ApplyOutcome::Applied);
    }

    let mut errors = error_diagnostics(&output.stdout);
    if errors.is_empty() {
        let stderr = output.stderr.trim();
        if !stderr.is_empty() {
            errors.push(stderr.to_string());
        }
    }

    if errors.is_empty() {
        return Err(DwhError::provision(format!(
            "terraform apply exited with {:?} and reported no errors",
            output.status
        )));
    }

    let fatal: Vec<&String> = errors
        .iter()
        .filter(|error| !is_tolerated(error, tolerated))
        .collect();

    if fatal.is_empty() {
        Ok(ApplyOutcome::Tolerated { errors })
    } else {
        Err(DwhError::provision(format!(
            "terraform apply failed: {}",
            fatal
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        )))
    }
}

fn is_tolerated(error: &str, tolerated: &[String]) -> bool {
    tolerated
        .iter()
        .any(|pattern| !pattern.is_empty() && error.contains(pattern.as_str()))
}

#[derive(Debug, Deserialize)]
struct JsonEvent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(rename = "@level", default)]
    level: String,
    #[serde(rename = "@message", default)]
    message: String,
    diagnostic: Option<Diagnostic>,
}

#[derive(Debug, Deserialize)]
struct Diagnostic {
    #[serde(default)]
    severity: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    detail: String,
}

/// Error diagnostics from a `-json` event stream, one string per diagnostic.
///
/// Lines that are not JSON events are ignored.
pub fn error_diagnostics(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<JsonEvent>(line.trim()).ok())
        .filter(|event| event.kind == "diagnostic")
        .filter_map(|event| match event.diagnostic {
            Some(d) if d.severity == "error" => {
                let text = if d.detail.is_empty() {
                    d.summary
                } else {
                    format!("{}: {}", d.summary, d.detail)
                };
                Some(text)
            }
            Some(_) => None,
            None if event.level == "error" => Some(event.message),
            None => None,
        })
        .collect()
}

/// One entry of `terraform output -json`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OutputValue {
    pub value: serde_json::Value,
    #[serde(default)]
    pub sensitive: bool,
}

/// Parsed `terraform output -json`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct TerraformOutputs(BTreeMap<String, OutputValue>);

impl TerraformOutputs {
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| DwhError::provision(format!("invalid terraform outputs: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DwhError::invalid_config(format!(
                "terraform outputs file not found at {}: {}\n\n\
                How to fix:\n\
                  • Run `aircrash-dwh provision` first\n\
                  • Or point TF_OUTPUTS_PATH at an existing file",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    /// String value of an output, if present.
    pub fn string(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|o| o.value.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Run `terraform output -json`, save it to the configured path, and parse it.
pub async fn refresh_outputs(config: &ProvisionConfig) -> Result<TerraformOutputs> {
    let output = Tool::terraform(config).run(&["output", "-json"]).await?;
    if !output.success {
        return Err(DwhError::provision(format!(
            "terraform output exited with {:?}: {}",
            output.status,
            output.stderr.trim()
        )));
    }

    let outputs = TerraformOutputs::from_json(&output.stdout)?;
    if let Some(parent) = Path::new(&config.outputs_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DwhError::provision(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
    }
    std::fs::write(&config.outputs_path, output.stdout.as_bytes()).map_err(|e| {
        DwhError::provision(format!("failed to write {}: {}", config.outputs_path, e))
    })?;

    info!(path = %config.outputs_path, outputs = outputs.0.len(), "Saved terraform outputs");
    Ok(outputs)
}
