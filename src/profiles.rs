//! dbt profile generation from terraform outputs.

use anyhow::{Context, Result};
use dialoguer::Confirm;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::RuntimeConfig;
use crate::error::DwhError;
use crate::provision::TerraformOutputs;

const TEMPLATE: &str = include_str!("../templates/profiles.yml");
const PROFILES_FILE: &str = "profiles.yml";

/// Connection details rendered into the profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileInput {
    pub profile: String,
    pub target: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub schema: String,
    pub threads: u16,
}

impl ProfileInput {
    /// Combine terraform outputs with local configuration.
    ///
    /// `redshift_host` may carry a `:port` suffix, which is dropped. Database
    /// and user fall back to the warehouse settings when the outputs lack them.
    pub fn from_outputs(outputs: &TerraformOutputs, config: &RuntimeConfig) -> Result<Self> {
        let host = outputs
            .string("redshift_host")
            .map(strip_port)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DwhError::invalid_config("'redshift_host' not found in terraform outputs"))?;

        let database = outputs
            .string("redshift_db")
            .map(str::to_string)
            .or_else(|| non_empty(&config.warehouse.database))
            .ok_or_else(|| DwhError::invalid_config("'redshift_db' not found in terraform outputs"))?;

        let user = outputs
            .string("redshift_user")
            .map(str::to_string)
            .or_else(|| non_empty(&config.warehouse.user))
            .ok_or_else(|| DwhError::invalid_config("'redshift_user' not found in terraform outputs"))?;

        Ok(Self {
            profile: config.profiles.profile_name.clone(),
            target: config.profiles.target.clone(),
            host: host.to_string(),
            port: config.warehouse.port,
            database,
            user,
            password: config.warehouse.password.clone(),
            schema: config.profiles.schema.clone(),
            threads: config.profiles.threads,
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn strip_port(host: &str) -> &str {
    host.split(':').next().unwrap_or(host)
}

/// Single-quoted YAML scalar.
fn yaml_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn render(input: &ProfileInput) -> String {
    TEMPLATE
        .replace("{{PROFILE}}", &yaml_quote(&input.profile))
        .replace("{{TARGET}}", &yaml_quote(&input.target))
        .replace("{{HOST}}", &yaml_quote(&input.host))
        .replace("{{USER}}", &yaml_quote(&input.user))
        .replace("{{PASSWORD}}", &yaml_quote(&input.password))
        .replace("{{PORT}}", &input.port.to_string())
        .replace("{{DBNAME}}", &yaml_quote(&input.database))
        .replace("{{SCHEMA}}", &yaml_quote(&input.schema))
        .replace("{{THREADS}}", &input.threads.to_string())
}

/// Configured profiles directory, else `$HOME/.dbt`.
pub fn profiles_dir(config: &RuntimeConfig, home: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = &config.profiles.dir {
        return Ok(PathBuf::from(dir));
    }
    home.map(|h| h.join(".dbt")).ok_or_else(|| {
        DwhError::invalid_config("HOME is not set; set DBT_PROFILES_DIR or [profiles] dir").into()
    })
}

/// Write `content` to `dir/profiles.yml`.
///
/// An existing file is replaced only with `force` or after confirmation.
/// Returns the written path, or `None` when the user declined.
pub fn write_profile(dir: &Path, content: &str, force: bool) -> Result<Option<PathBuf>> {
    let path = dir.join(PROFILES_FILE);

    if path.exists() && !force {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", path.display()))
            .default(false)
            .interact()?;
        if !overwrite {
            return Ok(None);
        }
    }

    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Wrote dbt profile");
    Ok(Some(path))
}

/// Load outputs, render, and write the profile.
pub fn generate(config: &RuntimeConfig, home: Option<PathBuf>, force: bool) -> Result<Option<PathBuf>> {
    let outputs = TerraformOutputs::load(&config.provision.outputs_path)?;
    let input = ProfileInput::from_outputs(&outputs, config)?;
    let dir = profiles_dir(config, home)?;
    write_profile(&dir, &render(&input), force)
}
