//! Run manifest: one JSON document written at each generation boundary,
//! recording enough about the run for `resume` to locate the latest
//! checkpoint without scanning the run directory.

use std::fs;
use std::path::PathBuf;

use choronzon_core::{ChoronzonError, ErrorInfo, SchemaVersion};
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;

/// Snapshot of run progress, persisted to `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Schema version this manifest was written under.
    #[serde(default)]
    pub schema_version: SchemaVersion,
    /// Master PRNG seed for this campaign.
    pub seed: u64,
    /// Format plug-in name in use.
    pub format: String,
    /// Number of chromosomes currently in the corpus.
    pub corpus_size: usize,
    /// Number of distinct crash sites recorded so far.
    pub crash_count: usize,
    /// Number of completed generations.
    pub generation: u64,
    /// Number of trials executed across the whole campaign.
    pub trials_completed: u64,
    /// Path to the corpus index, relative to the run directory.
    pub corpus_index_path: PathBuf,
    /// Path to the coverage map checkpoint, relative to the run directory.
    pub coverage_map_path: PathBuf,
    /// Path to the PRNG state checkpoint, relative to the run directory.
    pub prng_state_path: PathBuf,
    /// Path to the operator weights checkpoint, relative to the run directory.
    pub weights_path: PathBuf,
}

impl RunManifest {
    /// Builds a manifest snapshot from the current campaign state.
    pub fn new(
        config: &RunConfig,
        corpus_size: usize,
        crash_count: usize,
        generation: u64,
        trials_completed: u64,
    ) -> Self {
        Self {
            schema_version: SchemaVersion::CURRENT,
            seed: config.seed,
            format: config.format.clone(),
            corpus_size,
            crash_count,
            generation,
            trials_completed,
            corpus_index_path: config.output.corpus_dir.join("index.json"),
            coverage_map_path: config.output.coverage_map_file.clone(),
            prng_state_path: config.output.prng_state_file.clone(),
            weights_path: config.output.weights_file.clone(),
        }
    }

    /// Writes the manifest to `manifest.json` under the run directory.
    pub fn store(&self, config: &RunConfig) -> Result<(), ChoronzonError> {
        let path = config.run_path(&config.output.manifest_file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| ChoronzonError::io("manifest-mkdir", parent.display().to_string(), err))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            ChoronzonError::Io(ErrorInfo::new("manifest-serialize", err.to_string()))
        })?;
        fs::write(&path, json).map_err(|err| ChoronzonError::io("manifest-write", path.display().to_string(), err))
    }

    /// Loads the manifest from `manifest.json` under the run directory.
    ///
    /// Rejects a manifest written by an incompatible major schema version
    /// rather than resuming onto checkpoint layouts this build cannot
    /// interpret correctly.
    pub fn load(config: &RunConfig) -> Result<Self, ChoronzonError> {
        let path = config.run_path(&config.output.manifest_file);
        let contents = fs::read_to_string(&path)
            .map_err(|err| ChoronzonError::io("manifest-read", path.display().to_string(), err))?;
        let manifest: Self = serde_json::from_str(&contents).map_err(|err| {
            ChoronzonError::Io(
                ErrorInfo::new("manifest-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        if !manifest.schema_version.is_compatible(SchemaVersion::CURRENT) {
            return Err(ChoronzonError::Config(
                ErrorInfo::new(
                    "manifest-schema-incompatible",
                    format!(
                        "manifest schema {}.{}.{} is incompatible with this build's {}.{}.{}",
                        manifest.schema_version.major,
                        manifest.schema_version.minor,
                        manifest.schema_version.patch,
                        SchemaVersion::CURRENT.major,
                        SchemaVersion::CURRENT.minor,
                        SchemaVersion::CURRENT.patch,
                    ),
                )
                .with_context("path", path.display().to_string()),
            ));
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputConfig, SeedConfig, TargetConfig};

    fn config(run_directory: &std::path::Path) -> RunConfig {
        RunConfig {
            corpus_capacity: 10,
            trials_per_generation: 5,
            p_recomb: 0.5,
            k_tournament: 3,
            trial_timeout_ms: 1000,
            timeout_grace_ms: 100,
            consecutive_failure_budget: 5,
            seed: 1,
            max_generations: None,
            format: "png".into(),
            seeds: SeedConfig {
                directory: run_directory.join("seeds"),
                include_glob: "*".into(),
            },
            target: TargetConfig {
                command: "true".into(),
                args: Vec::new(),
                fifo_env_var: "CHORONZON_COVERAGE_FIFO".into(),
            },
            output: OutputConfig {
                run_directory: run_directory.to_path_buf(),
                ..OutputConfig::default()
            },
        }
    }

    #[test]
    fn manifest_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let manifest = RunManifest::new(&config, 3, 1, 4, 400);
        manifest.store(&config).unwrap();
        let restored = RunManifest::load(&config).unwrap();
        assert_eq!(restored.schema_version, SchemaVersion::CURRENT);
        assert_eq!(restored.corpus_size, 3);
        assert_eq!(restored.generation, 4);
        assert_eq!(restored.trials_completed, 400);
    }

    #[test]
    fn loading_a_newer_major_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut manifest = RunManifest::new(&config, 3, 1, 4, 400);
        manifest.schema_version = SchemaVersion::new(SchemaVersion::CURRENT.major + 1, 0, 0);
        manifest.store(&config).unwrap();
        assert!(matches!(
            RunManifest::load(&config),
            Err(ChoronzonError::Config(_))
        ));
    }

    #[test]
    fn loading_a_missing_manifest_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        assert!(matches!(
            RunManifest::load(&config),
            Err(ChoronzonError::Io(_))
        ));
    }
}
