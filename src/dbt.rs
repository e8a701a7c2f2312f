//! `dbt run` over the generated profile.

use std::path::Path;

use tracing::{info, warn};

use crate::config::DbtConfig;
use crate::error::{DwhError, Result};
use crate::provision::{CommandOutput, Tool};

/// Arguments for `dbt run` against the profiles in `profiles_dir`.
pub fn run_args(profiles_dir: &Path, target: &str) -> Vec<String> {
    vec![
        "run".to_string(),
        "--profiles-dir".to_string(),
        profiles_dir.display().to_string(),
        "--target".to_string(),
        target.to_string(),
    ]
}

/// Run the dbt models in the configured project. Any non-zero exit is fatal.
pub async fn run_models(config: &DbtConfig, profiles_dir: &Path, target: &str) -> Result<CommandOutput> {
    info!(project = %config.project_dir, target, "Running dbt");
    let output = Tool::new(&config.bin, &config.project_dir)
        .run(&run_args(profiles_dir, target))
        .await?;

    if !output.success {
        let detail = if output.stderr.trim().is_empty() {
            output.stdout.trim()
        } else {
            output.stderr.trim()
        };
        warn!(status = ?output.status, "dbt run failed");
        return Err(DwhError::provision(format!(
            "dbt run exited with {:?}: {}",
            output.status, detail
        )));
    }

    info!("dbt run succeeded");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_point_at_profiles() {
        let args = run_args(Path::new("/home/ci/.dbt"), "dev");
        assert_eq!(args, ["run", "--profiles-dir", "/home/ci/.dbt", "--target", "dev"]);
    }

    #[tokio::test]
    async fn missing_binary_is_fatal() {
        let config = DbtConfig {
            bin: "/nonexistent/dbt".to_string(),
            project_dir: ".".to_string(),
        };
        let err = run_models(&config, Path::new("."), "dev").await.unwrap_err();
        assert_eq!(err.code(), "E006");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_fatal() {
        // `false` ignores its arguments and exits 1.
        let config = DbtConfig {
            bin: "false".to_string(),
            project_dir: ".".to_string(),
        };
        let err = run_models(&config, Path::new("."), "dev").await.unwrap_err();
        assert!(err.to_string().contains("dbt run exited"), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn zero_exit_succeeds() {
        let config = DbtConfig {
            bin: "true".to_string(),
            project_dir: ".".to_string(),
        };
        let output = run_models(&config, Path::new("."), "dev").await.unwrap();
        assert_eq!(output.status, Some(0));
    }
}
