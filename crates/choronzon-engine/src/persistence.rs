//! Checkpoint persistence: the on-disk layout — `corpus/<id>.bin` +
//! `corpus/index.json`, `coverage.map`, `prng.state`,
//! `crashes/<image_index>_<bbl>.bin`, and `manifest.json`.

use std::fs;
use std::path::Path;

use choronzon_core::{ChoronzonError, ErrorInfo, PrngState};
use choronzon_corpus::{Corpus, GlobalCoverageMap};
use choronzon_gene::{Chromosome, ChromosomeId};
use choronzon_variation::OperatorWeights;
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;

fn io_err(code: &str, path: &Path, err: std::io::Error) -> ChoronzonError {
    ChoronzonError::io(code, path.display().to_string(), err)
}

/// One row of `corpus/index.json`: lineage and scoring metadata for a
/// corpus member, without the gene tree itself (that lives in the
/// sibling `.bin` file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Content-addressed identifier.
    pub id: String,
    /// Parent identifiers.
    pub parent_ids: Vec<String>,
    /// Generation number.
    pub generation: u64,
    /// Variation operator chain that produced this chromosome.
    pub operator_chain: Vec<String>,
    /// Fitness at admission.
    pub fitness: f64,
    /// Whether the chromosome has been executed (always true for admitted
    /// members).
    pub executed: bool,
}

/// Writes `corpus/<id>.bin` for every member plus `corpus/index.json`.
pub fn write_corpus(
    config: &RunConfig,
    corpus: &Corpus,
    serialized_by_id: &dyn Fn(&ChromosomeId) -> Option<Vec<u8>>,
) -> Result<(), ChoronzonError> {
    let dir = config.corpus_dir();
    fs::create_dir_all(&dir).map_err(|err| io_err("corpus-mkdir", &dir, err))?;
    let mut index = Vec::with_capacity(corpus.len());
    for member in corpus.iter() {
        let chromosome = &member.chromosome;
        if let Some(bytes) = serialized_by_id(&chromosome.id) {
            let path = dir.join(format!("{}.bin", chromosome.id.as_str()));
            fs::write(&path, &bytes).map_err(|err| io_err("corpus-write-member", &path, err))?;
        }
        index.push(to_index_entry(chromosome, member.fitness));
    }
    let index_path = dir.join("index.json");
    let json = serde_json::to_string_pretty(&index).map_err(|err| {
        ChoronzonError::Io(ErrorInfo::new("corpus-index-serialize", err.to_string()))
    })?;
    fs::write(&index_path, json).map_err(|err| io_err("corpus-index-write", &index_path, err))?;
    Ok(())
}

fn to_index_entry(chromosome: &Chromosome, fitness: f64) -> IndexEntry {
    IndexEntry {
        id: chromosome.id.as_str().to_string(),
        parent_ids: chromosome
            .parent_ids
            .iter()
            .map(|id| id.as_str().to_string())
            .collect(),
        generation: chromosome.generation,
        operator_chain: chromosome.operator_chain.clone(),
        fitness,
        executed: chromosome.executed,
    }
}

/// Reads `corpus/index.json`, or an empty list if it does not exist yet.
pub fn read_index(config: &RunConfig) -> Result<Vec<IndexEntry>, ChoronzonError> {
    let path = config.corpus_dir().join("index.json");
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(&path).map_err(|err| io_err("corpus-index-read", &path, err))?;
    serde_json::from_str(&contents)
        .map_err(|err| ChoronzonError::Io(ErrorInfo::new("corpus-index-parse", err.to_string())))
}

/// Writes `coverage.map` as a `bincode`-encoded `Vec<(u64, u64, u64)>`.
pub fn write_coverage_map(config: &RunConfig, global: &GlobalCoverageMap) -> Result<(), ChoronzonError> {
    let path = config.run_path(&config.output.coverage_map_file);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| io_err("coverage-map-mkdir", parent, err))?;
    }
    let bytes = bincode::serialize(global)
        .map_err(|err| ChoronzonError::Io(ErrorInfo::new("coverage-map-serialize", err.to_string())))?;
    fs::write(&path, bytes).map_err(|err| io_err("coverage-map-write", &path, err))
}

/// Reads `coverage.map`, or an empty map if it does not exist yet.
pub fn read_coverage_map(config: &RunConfig) -> Result<GlobalCoverageMap, ChoronzonError> {
    let path = config.run_path(&config.output.coverage_map_file);
    if !path.exists() {
        return Ok(GlobalCoverageMap::new());
    }
    let bytes = fs::read(&path).map_err(|err| io_err("coverage-map-read", &path, err))?;
    bincode::deserialize(&bytes)
        .map_err(|err| ChoronzonError::Io(ErrorInfo::new("coverage-map-parse", err.to_string())))
}

/// Writes `prng.state` as a small `bincode` blob.
pub fn write_prng_state(config: &RunConfig, state: &PrngState) -> Result<(), ChoronzonError> {
    let path = config.run_path(&config.output.prng_state_file);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| io_err("prng-state-mkdir", parent, err))?;
    }
    let bytes = bincode::serialize(state)
        .map_err(|err| ChoronzonError::Io(ErrorInfo::new("prng-state-serialize", err.to_string())))?;
    fs::write(&path, bytes).map_err(|err| io_err("prng-state-write", &path, err))
}

/// Reads `prng.state`, or a fresh state seeded from `default_seed` if no
/// checkpoint exists yet.
pub fn read_prng_state(config: &RunConfig, default_seed: u64) -> Result<PrngState, ChoronzonError> {
    let path = config.run_path(&config.output.prng_state_file);
    if !path.exists() {
        return Ok(PrngState::new(default_seed));
    }
    let bytes = fs::read(&path).map_err(|err| io_err("prng-state-read", &path, err))?;
    bincode::deserialize(&bytes)
        .map_err(|err| ChoronzonError::Io(ErrorInfo::new("prng-state-parse", err.to_string())))
}

/// Writes the operator weights checkpoint.
pub fn write_weights(config: &RunConfig, weights: &OperatorWeights) -> Result<(), ChoronzonError> {
    let path = config.run_path(&config.output.weights_file);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| io_err("weights-mkdir", parent, err))?;
    }
    let bytes = bincode::serialize(weights)
        .map_err(|err| ChoronzonError::Io(ErrorInfo::new("weights-serialize", err.to_string())))?;
    fs::write(&path, bytes).map_err(|err| io_err("weights-write", &path, err))
}

/// Reads the operator weights checkpoint, or `None` if it does not exist
/// yet (caller falls back to uniform initial weights).
pub fn read_weights(config: &RunConfig) -> Result<Option<OperatorWeights>, ChoronzonError> {
    let path = config.run_path(&config.output.weights_file);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(&path).map_err(|err| io_err("weights-read", &path, err))?;
    let weights = bincode::deserialize(&bytes)
        .map_err(|err| ChoronzonError::Io(ErrorInfo::new("weights-parse", err.to_string())))?;
    Ok(Some(weights))
}

/// Writes one representative crash file: `crashes/<image_index>_<bbl>.bin`.
pub fn write_crash(
    config: &RunConfig,
    image_index: u64,
    bbl: u64,
    serialized: &[u8],
) -> Result<(), ChoronzonError> {
    let dir = config.crashes_dir();
    fs::create_dir_all(&dir).map_err(|err| io_err("crashes-mkdir", &dir, err))?;
    let path = dir.join(format!("{image_index}_{bbl}.bin"));
    fs::write(&path, serialized).map_err(|err| io_err("crashes-write", &path, err))
}

/// Ensures the run directory's subdirectories exist (idempotent, so `init`
/// can be re-run safely).
pub fn prepare_run_directory(config: &RunConfig) -> Result<(), ChoronzonError> {
    for dir in [config.corpus_dir(), config.crashes_dir(), config.scratch_dir()] {
        fs::create_dir_all(&dir).map_err(|err| io_err("run-dir-mkdir", &dir, err))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputConfig, SeedConfig, TargetConfig};

    fn config(run_directory: &Path) -> RunConfig {
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
    fn coverage_map_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut global = GlobalCoverageMap::new();
        global.record((0, 16));
        global.record((0, 16));
        global.record((1, 32));
        write_coverage_map(&config, &global).unwrap();
        let restored = read_coverage_map(&config).unwrap();
        assert_eq!(restored.count((0, 16)), 2);
        assert_eq!(restored.count((1, 32)), 1);
    }

    #[test]
    fn prng_state_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut state = PrngState::new(7);
        let _ = state.next_trial_seed();
        let _ = state.next_trial_seed();
        write_prng_state(&config, &state).unwrap();
        let restored = read_prng_state(&config, 0).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn missing_checkpoints_fall_back_to_fresh_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let state = read_prng_state(&config, 99).unwrap();
        assert_eq!(state.master_seed, 99);
        assert_eq!(read_coverage_map(&config).unwrap().edge_count(), 0);
        assert!(read_weights(&config).unwrap().is_none());
    }

    #[test]
    fn prepare_run_directory_creates_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        prepare_run_directory(&config).unwrap();
        assert!(config.corpus_dir().is_dir());
        assert!(config.crashes_dir().is_dir());
        assert!(config.scratch_dir().is_dir());
    }
}
