//! Run configuration schema: `{corpus_capacity, trials_per_generation,
//! p_recomb, k_tournament, trial_timeout_ms, mutator/recombinator weights,
//! seed}`, loaded from a layered YAML file with serde defaults for every
//! field an operator doesn't need to override.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration for a fuzzing campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Corpus capacity, default 500.
    #[serde(default = "default_corpus_capacity")]
    pub corpus_capacity: usize,
    /// Trials per generation, default 100.
    #[serde(default = "default_trials_per_generation")]
    pub trials_per_generation: usize,
    /// Probability of picking the recombinator family over the mutator
    /// family for a given trial, default 0.5.
    #[serde(default = "default_p_recomb")]
    pub p_recomb: f64,
    /// Tournament size for parent selection, default 3.
    #[serde(default = "default_k_tournament")]
    pub k_tournament: usize,
    /// Per-trial wall-clock timeout in milliseconds, default 10,000.
    #[serde(default = "default_trial_timeout_ms")]
    pub trial_timeout_ms: u64,
    /// Grace period after a timeout signal before the engine force-kills
    /// the target: a small fraction of the trial timeout.
    #[serde(default = "default_timeout_grace_ms")]
    pub timeout_grace_ms: u64,
    /// Number of consecutive `tracer_error` trials tolerated before the
    /// campaign aborts.
    #[serde(default = "default_failure_budget")]
    pub consecutive_failure_budget: u32,
    /// Master PRNG seed.
    pub seed: u64,
    /// Optional cap on the number of generations a `run` executes before
    /// stopping on its own; `None` means run until interrupted.
    #[serde(default)]
    pub max_generations: Option<u64>,
    /// Name of the format plug-in to use, matched against the CLI's static
    /// registry.
    pub format: String,
    /// Seed corpus configuration.
    pub seeds: SeedConfig,
    /// Target process configuration.
    pub target: TargetConfig,
    /// Run directory / artifact layout configuration.
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_corpus_capacity() -> usize {
    500
}

fn default_trials_per_generation() -> usize {
    100
}

fn default_p_recomb() -> f64 {
    0.5
}

fn default_k_tournament() -> usize {
    3
}

fn default_trial_timeout_ms() -> u64 {
    10_000
}

fn default_timeout_grace_ms() -> u64 {
    2_000
}

fn default_failure_budget() -> u32 {
    25
}

/// Seed corpus directory and include filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Directory walked (recursively) for candidate seed files.
    pub directory: PathBuf,
    /// Glob pattern (via `globset`) filtering which files under `directory`
    /// are attempted as seeds.
    #[serde(default = "default_seed_glob")]
    pub include_glob: String,
}

fn default_seed_glob() -> String {
    "*".to_string()
}

/// Describes how to launch the target under the tracer for one trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Executable to spawn (the in-process-instrumented target binary, or a
    /// thin wrapper that loads it under the tracer).
    pub command: String,
    /// Argument template. The literal token `@@` is replaced with the path
    /// to the serialized candidate for this trial (the common
    /// fuzzer-harness convention); arguments without the token are passed
    /// through unchanged.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variable the target's tracer reads to find the coverage
    /// FIFO the engine created for this trial.
    #[serde(default = "default_fifo_env_var")]
    pub fifo_env_var: String,
}

fn default_fifo_env_var() -> String {
    "CHORONZON_COVERAGE_FIFO".to_string()
}

/// Run directory layout: artifact subdirectories and checkpoint filenames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory for run artifacts. Created (idempotently) by `init`.
    #[serde(default = "default_run_directory")]
    pub run_directory: PathBuf,
    /// Subdirectory (under `run_directory`) holding `corpus/<id>.bin` and
    /// `corpus/index.json`.
    #[serde(default = "default_corpus_dir")]
    pub corpus_dir: PathBuf,
    /// Subdirectory holding `crashes/<image_index>_<bbl>.bin`.
    #[serde(default = "default_crashes_dir")]
    pub crashes_dir: PathBuf,
    /// Directory used for the trial's stable input path and FIFO.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Checkpoint filename for the global coverage map (`coverage.map`).
    #[serde(default = "default_coverage_map_file")]
    pub coverage_map_file: PathBuf,
    /// Checkpoint filename for the PRNG state (`prng.state`).
    #[serde(default = "default_prng_state_file")]
    pub prng_state_file: PathBuf,
    /// Checkpoint filename for operator weights.
    #[serde(default = "default_weights_file")]
    pub weights_file: PathBuf,
    /// Manifest filename (`manifest.json`), one written per generation
    /// boundary.
    #[serde(default = "default_manifest_file")]
    pub manifest_file: PathBuf,
}

fn default_run_directory() -> PathBuf {
    PathBuf::from("run")
}

fn default_corpus_dir() -> PathBuf {
    PathBuf::from("corpus")
}

fn default_crashes_dir() -> PathBuf {
    PathBuf::from("crashes")
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("scratch")
}

fn default_coverage_map_file() -> PathBuf {
    PathBuf::from("coverage.map")
}

fn default_prng_state_file() -> PathBuf {
    PathBuf::from("prng.state")
}

fn default_weights_file() -> PathBuf {
    PathBuf::from("weights.bin")
}

fn default_manifest_file() -> PathBuf {
    PathBuf::from("manifest.json")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            run_directory: default_run_directory(),
            corpus_dir: default_corpus_dir(),
            crashes_dir: default_crashes_dir(),
            scratch_dir: default_scratch_dir(),
            coverage_map_file: default_coverage_map_file(),
            prng_state_file: default_prng_state_file(),
            weights_file: default_weights_file(),
            manifest_file: default_manifest_file(),
        }
    }
}

impl RunConfig {
    /// Loads a run configuration from a YAML file.
    pub fn load(path: &std::path::Path) -> Result<Self, choronzon_core::ChoronzonError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|err| choronzon_core::ChoronzonError::io("config-read", path.display().to_string(), err))?;
        serde_yaml::from_str(&contents).map_err(|err| {
            choronzon_core::ChoronzonError::Config(
                choronzon_core::ErrorInfo::new("config-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }

    /// Absolute-ish path helpers: joins a relative output path under the
    /// configured run directory.
    pub fn run_path(&self, relative: &std::path::Path) -> PathBuf {
        self.output.run_directory.join(relative)
    }

    /// Path to the corpus subdirectory.
    pub fn corpus_dir(&self) -> PathBuf {
        self.run_path(&self.output.corpus_dir)
    }

    /// Path to the crashes subdirectory.
    pub fn crashes_dir(&self) -> PathBuf {
        self.run_path(&self.output.crashes_dir)
    }

    /// Path to the scratch subdirectory used for per-trial inputs/FIFOs.
    pub fn scratch_dir(&self) -> PathBuf {
        self.run_path(&self.output.scratch_dir)
    }
}
