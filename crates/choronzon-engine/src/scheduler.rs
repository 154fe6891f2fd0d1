//! The generation scheduler: `select -> vary -> serialize -> spawn_target
//! -> ingest_coverage -> score -> admit_or_discard`, run a configurable
//! number of trials per generation, checkpointing at each generation
//! boundary.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use choronzon_core::{ChoronzonError, ErrorInfo, PrngState, RngHandle};
use choronzon_corpus::{Corpus, GlobalCoverageMap};
use choronzon_coverage::TerminationReason;
use choronzon_format::FormatPlugin;
use choronzon_gene::{Chromosome, ChromosomeId};
use choronzon_variation::{
    apply_mutator, apply_recombinator, Family, OperatorWeights, MUTATOR_NAMES, RECOMBINATOR_NAMES,
};

use crate::config::RunConfig;
use crate::manifest::RunManifest;
use crate::persistence;
use crate::spawn::TrialExecutor;

/// Per-call budget (bits/bytes touched) handed to the variable-count
/// mutators: a fraction of the selected payload size with sensible clamps,
/// pinned to a small constant here.
const MUTATION_BUDGET: usize = 4;

/// What happened to one trial, for logging and generation-level bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    /// The child was admitted to the corpus.
    Admitted,
    /// The child was produced and executed but not admitted.
    Rejected,
    /// No admissible variation was found within the retry budget.
    AllNoOp,
    /// The child failed to serialize; the operator was penalized.
    SerializationFailed,
    /// The trial's tracer stream ended without a sentinel.
    TracerFailed,
}

/// Why a campaign run loop stopped.
///
/// The tracer-error-budget-exceeded case is not a variant here: it surfaces
/// as `Err(ChoronzonError::Tracer(_))` from [`Scheduler::run`] instead, since
/// it is a fatal condition rather than an orderly stop (see `exit_code_for`
/// in the CLI crate for how that error maps to exit code 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured generation cap was reached.
    GenerationCapReached,
    /// A campaign-level interrupt was observed between trials.
    Interrupted,
}

/// Drives the evolutionary loop for one campaign.
pub struct Scheduler<F: FormatPlugin, E: TrialExecutor> {
    config: RunConfig,
    plugin: F,
    executor: E,
    corpus: Corpus,
    global: GlobalCoverageMap,
    weights: OperatorWeights,
    prng: PrngState,
    generation: u64,
    consecutive_tracer_failures: u32,
    serialized_cache: BTreeMap<ChromosomeId, Vec<u8>>,
    interrupted: Arc<AtomicBool>,
}

impl<F: FormatPlugin, E: TrialExecutor> Scheduler<F, E> {
    /// Starts a fresh campaign: loads the seed corpus, runs each seed
    /// through the full trial pipeline to populate the initial corpus and
    /// global coverage map, and returns a scheduler ready for `run`.
    pub fn bootstrap(
        config: RunConfig,
        plugin: F,
        executor: E,
        interrupted: Arc<AtomicBool>,
    ) -> Result<Self, ChoronzonError> {
        let seeds = crate::seeds::load_seed_corpus(&config.seeds, &plugin)?;
        let mut scheduler = Self {
            prng: PrngState::new(config.seed),
            weights: OperatorWeights::uniform(&MUTATOR_NAMES, &RECOMBINATOR_NAMES),
            corpus: Corpus::new(config.corpus_capacity),
            global: GlobalCoverageMap::new(),
            generation: 0,
            consecutive_tracer_failures: 0,
            serialized_cache: BTreeMap::new(),
            config,
            plugin,
            executor,
            interrupted,
        };
        for seed in seeds {
            scheduler.execute_and_score(seed)?;
        }
        Ok(scheduler)
    }

    /// Rebuilds a scheduler from a checkpoint written by a previous run.
    pub fn resume(
        config: RunConfig,
        plugin: F,
        executor: E,
        interrupted: Arc<AtomicBool>,
    ) -> Result<Self, ChoronzonError> {
        let manifest = RunManifest::load(&config)?;
        let index = persistence::read_index(&config)?;
        let mut restored = Vec::with_capacity(index.len());
        for entry in index {
            let bin_path = config.corpus_dir().join(format!("{}.bin", entry.id));
            let bytes = std::fs::read(&bin_path)
                .map_err(|err| ChoronzonError::io("resume-read-member", bin_path.display().to_string(), err))?;
            let mut chromosome = plugin.deserialize(&bytes)?;
            chromosome.id = ChromosomeId::from_hex(entry.id);
            chromosome.parent_ids = entry.parent_ids.into_iter().map(ChromosomeId::from_hex).collect();
            chromosome.generation = entry.generation;
            chromosome.operator_chain = entry.operator_chain;
            chromosome.mark_executed(entry.fitness);
            // Crash provenance is not retained across a resume, see Corpus::restore.
            let is_crash = false;
            restored.push((
                choronzon_corpus::CorpusMember {
                    chromosome,
                    fitness: entry.fitness,
                    admitted_at: restored.len() as u64,
                    is_crash,
                },
                bytes,
            ));
        }
        let corpus = Corpus::restore(config.corpus_capacity, restored);
        let global = persistence::read_coverage_map(&config)?;
        let weights = persistence::read_weights(&config)?
            .unwrap_or_else(|| OperatorWeights::uniform(&MUTATOR_NAMES, &RECOMBINATOR_NAMES));
        let mut prng = persistence::read_prng_state(&config, config.seed)?;
        prng.trials_completed = manifest.trials_completed;
        Ok(Self {
            config,
            plugin,
            executor,
            corpus,
            global,
            weights,
            prng,
            generation: manifest.generation,
            consecutive_tracer_failures: 0,
            serialized_cache: BTreeMap::new(),
            interrupted,
        })
    }

    /// Runs generations until the configured cap is reached, the campaign
    /// is interrupted, or the tracer-error budget is exceeded.
    pub fn run(&mut self) -> Result<StopReason, ChoronzonError> {
        loop {
            if self.interrupted.load(Ordering::SeqCst) {
                self.checkpoint()?;
                return Ok(StopReason::Interrupted);
            }
            if let Some(cap) = self.config.max_generations {
                if self.generation >= cap {
                    return Ok(StopReason::GenerationCapReached);
                }
            }
            if let Err(err) = self.run_generation() {
                self.checkpoint()?;
                return Err(err);
            }
            self.generation += 1;
            self.checkpoint()?;
        }
    }

    fn run_generation(&mut self) -> Result<(), ChoronzonError> {
        for _ in 0..self.config.trials_per_generation {
            if self.interrupted.load(Ordering::SeqCst) {
                return Ok(());
            }
            self.run_trial()?;
        }
        Ok(())
    }

    fn run_trial(&mut self) -> Result<TrialOutcome, ChoronzonError> {
        let trial_seed = self.prng.next_trial_seed();
        let mut rng = RngHandle::from_seed(trial_seed);

        if self.corpus.is_empty() {
            return Ok(TrialOutcome::AllNoOp);
        }

        let family = if rng.next_unit() < self.config.p_recomb {
            Family::Recombinator
        } else {
            Family::Mutator
        };
        let primary = match self.corpus.tournament_select(self.config.k_tournament, &mut rng) {
            Some(chromosome) => chromosome.clone(),
            None => return Ok(TrialOutcome::AllNoOp),
        };
        let secondary = self
            .corpus
            .tournament_select(self.config.k_tournament, &mut rng)
            .cloned();

        let names: &[&str] = match family {
            Family::Mutator => &MUTATOR_NAMES,
            Family::Recombinator => &RECOMBINATOR_NAMES,
        };

        let mut outcome = None;
        for _ in 0..names.len().max(1) {
            let Some(name) = self.weights.select(family, &mut rng) else {
                break;
            };
            let attempt = match family {
                Family::Mutator => apply_mutator(&name, &primary.root, MUTATION_BUDGET, &mut rng),
                Family::Recombinator => apply_recombinator(
                    &name,
                    &primary.root,
                    secondary.as_ref().map(|c| &c.root),
                    &self.plugin,
                    &mut rng,
                ),
            };
            match attempt {
                Some(result) if !result.no_op => {
                    outcome = Some((name, result.tree));
                    break;
                }
                _ => {
                    log::info!("{name} produced a no-op, retrying with another operator");
                    continue;
                }
            }
        }

        let Some((operator_name, child_tree)) = outcome else {
            return Ok(TrialOutcome::AllNoOp);
        };

        let parent_ids = match family {
            Family::Recombinator if secondary.is_some() && is_two_parent(&operator_name) => {
                vec![primary.id.clone(), secondary.as_ref().unwrap().id.clone()]
            }
            _ => vec![primary.id.clone()],
        };
        let parent_generation = secondary
            .as_ref()
            .map(|s| s.generation.max(primary.generation))
            .unwrap_or(primary.generation);

        let placeholder = Chromosome::child(
            child_tree.clone(),
            ChromosomeId::from_bytes(&[], 0),
            parent_ids.clone(),
            parent_generation,
            operator_name.clone(),
        );
        let serialized = match self.plugin.serialize(&placeholder) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("discarding trial: serialization failed for {operator_name}: {err}");
                self.weights.penalize(family, &operator_name);
                return Ok(TrialOutcome::SerializationFailed);
            }
        };

        let chromosome = Chromosome::child(
            child_tree,
            ChromosomeId::from_bytes(&serialized, parent_generation + 1),
            parent_ids,
            parent_generation,
            operator_name.clone(),
        );

        let outcome = self.execute_and_score(chromosome)?;
        if matches!(outcome, TrialOutcome::Admitted) {
            self.weights.reward(family, &operator_name);
        }
        Ok(outcome)
    }

    /// Runs `chromosome` through `serialize -> spawn_target ->
    /// ingest_coverage -> score -> admit_or_discard`. Used both by
    /// [`Scheduler::run_trial`] for evolved children and by
    /// [`Scheduler::bootstrap`] to execute the seed corpus.
    fn execute_and_score(&mut self, chromosome: Chromosome) -> Result<TrialOutcome, ChoronzonError> {
        let serialized = match self.plugin.serialize(&chromosome) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("discarding seed/child: serialization failed: {err}");
                return Ok(TrialOutcome::SerializationFailed);
            }
        };
        let timeout = Duration::from_millis(self.config.trial_timeout_ms);
        let grace = Duration::from_millis(self.config.timeout_grace_ms);
        match self.executor.execute(&serialized, timeout, grace) {
            Err(err) if err.is_campaign_fatal() => Err(err),
            Err(err) => {
                log::warn!("trial failed before a termination reason was known: {err}");
                self.bump_tracer_failure()?;
                Ok(TrialOutcome::TracerFailed)
            }
            Ok((coverage, TerminationReason::TracerError)) => {
                log::warn!("trial ended without a coverage sentinel");
                self.bump_tracer_failure()?;
                let _ = coverage;
                Ok(TrialOutcome::TracerFailed)
            }
            Ok((coverage, termination)) => {
                self.consecutive_tracer_failures = 0;
                let id = chromosome.id.clone();
                let admitted =
                    self.corpus
                        .try_admit(chromosome, &serialized, &coverage, &termination, &mut self.global);
                if admitted {
                    self.serialized_cache.insert(id, serialized.clone());
                    if let TerminationReason::FatalSignal(code) = termination {
                        let (image_index, bbl) = coverage
                            .last_hit()
                            .map(|hit| (hit.image_index, hit.bbl))
                            .unwrap_or((u64::MAX, code));
                        persistence::write_crash(&self.config, image_index, bbl, &serialized)?;
                    }
                    self.prune_serialized_cache();
                    Ok(TrialOutcome::Admitted)
                } else {
                    Ok(TrialOutcome::Rejected)
                }
            }
        }
    }

    fn bump_tracer_failure(&mut self) -> Result<(), ChoronzonError> {
        self.consecutive_tracer_failures += 1;
        if self.consecutive_tracer_failures > self.config.consecutive_failure_budget {
            return Err(ChoronzonError::Tracer(
                ErrorInfo::new(
                    "tracer-failure-budget-exceeded",
                    format!(
                        "{} consecutive tracer failures exceeds the configured budget of {}",
                        self.consecutive_tracer_failures, self.config.consecutive_failure_budget
                    ),
                )
                .with_hint("check the tracer/target integration"),
            ));
        }
        Ok(())
    }

    fn prune_serialized_cache(&mut self) {
        let live: std::collections::BTreeSet<_> =
            self.corpus.iter().map(|member| member.chromosome.id.clone()).collect();
        self.serialized_cache.retain(|id, _| live.contains(id));
    }

    /// Flushes the corpus, coverage map, operator weights, PRNG state, and
    /// manifest to the run directory.
    pub fn checkpoint(&self) -> Result<(), ChoronzonError> {
        persistence::write_corpus(&self.config, &self.corpus, &|id| self.serialized_cache.get(id).cloned())?;
        persistence::write_coverage_map(&self.config, &self.global)?;
        persistence::write_prng_state(&self.config, &self.prng)?;
        persistence::write_weights(&self.config, &self.weights)?;
        RunManifest::new(
            &self.config,
            self.corpus.len(),
            self.corpus.crash_count(),
            self.generation,
            self.prng.trials_completed,
        )
        .store(&self.config)
    }

    /// Number of members currently held in the corpus.
    pub fn corpus_len(&self) -> usize {
        self.corpus.len()
    }

    /// Number of distinct crash sites recorded so far.
    pub fn crash_count(&self) -> usize {
        self.corpus.crash_count()
    }

    /// Re-executes a corpus member deterministically for `replay`.
    pub fn replay(&mut self, id: &str) -> Result<(Vec<u8>, TerminationReason), ChoronzonError> {
        let bin_path = self.config.corpus_dir().join(format!("{id}.bin"));
        let bytes = std::fs::read(&bin_path)
            .map_err(|err| ChoronzonError::io("replay-read-member", bin_path.display().to_string(), err))?;
        let timeout = Duration::from_millis(self.config.trial_timeout_ms);
        let grace = Duration::from_millis(self.config.timeout_grace_ms);
        let (_, termination) = self.executor.execute(&bytes, timeout, grace)?;
        Ok((bytes, termination))
    }
}

fn is_two_parent(operator_name: &str) -> bool {
    matches!(operator_name, "cross_over" | "gene_splice")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputConfig, SeedConfig, TargetConfig};
    use choronzon_coverage::{BasicBlockHit, CoverageSet};
    use choronzon_png::PngPlugin;
    use std::sync::Mutex;

    struct StubExecutor {
        responses: Mutex<Vec<(CoverageSet, TerminationReason)>>,
    }

    impl StubExecutor {
        fn new(responses: Vec<(CoverageSet, TerminationReason)>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    impl TrialExecutor for StubExecutor {
        fn execute(
            &mut self,
            _serialized: &[u8],
            _timeout: Duration,
            _grace: Duration,
        ) -> Result<(CoverageSet, TerminationReason), ChoronzonError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Ok((CoverageSet::new(), TerminationReason::Normal));
            }
            Ok(responses.remove(0))
        }
    }

    fn coverage(edges: &[(u64, u64)]) -> CoverageSet {
        let mut set = CoverageSet::new();
        for &(a, b) in edges {
            set.insert(BasicBlockHit {
                image_index: a,
                bbl: b,
            });
        }
        set
    }

    fn minimal_png_seed(dir: &std::path::Path) {
        use choronzon_format::FormatPlugin;
        use choronzon_gene::{Gene, GeneFlags};
        let plugin = PngPlugin::new();
        let sig = Gene::leaf("SIG", [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A], GeneFlags::essential_leaf());
        let ihdr = Gene::leaf("IHDR", vec![0u8; 13], GeneFlags::structural().with_essential(true));
        let idat = Gene::leaf("IDAT", vec![1, 2, 3], GeneFlags::structural());
        let iend = Gene::leaf("IEND", Vec::new(), GeneFlags::structural().with_essential(true));
        let root = Gene::new("PNG", Vec::new(), GeneFlags::structural(), vec![sig, ihdr, idat, iend]);
        let chromosome = Chromosome::seed(root, ChromosomeId::from_bytes(b"seed", 0));
        let bytes = plugin.serialize(&chromosome).unwrap();
        std::fs::write(dir.join("seed.png"), bytes).unwrap();
    }

    fn config(run_directory: &std::path::Path) -> RunConfig {
        RunConfig {
            corpus_capacity: 10,
            trials_per_generation: 3,
            p_recomb: 0.5,
            k_tournament: 2,
            trial_timeout_ms: 1000,
            timeout_grace_ms: 100,
            consecutive_failure_budget: 2,
            seed: 7,
            max_generations: Some(1),
            format: "png".into(),
            seeds: SeedConfig {
                directory: run_directory.join("seeds"),
                include_glob: "*.png".into(),
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
    fn bootstrap_admits_the_seed_corpus() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("seeds")).unwrap();
        minimal_png_seed(&dir.path().join("seeds"));
        let config = config(dir.path());
        let executor = StubExecutor::new(vec![(coverage(&[(0, 1)]), TerminationReason::Normal)]);
        let scheduler = Scheduler::bootstrap(config, PngPlugin::new(), executor, Arc::new(AtomicBool::new(false)))
            .unwrap();
        assert_eq!(scheduler.corpus_len(), 1);
    }

    #[test]
    fn run_executes_configured_trials_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("seeds")).unwrap();
        minimal_png_seed(&dir.path().join("seeds"));
        let config = config(dir.path());
        let executor = StubExecutor::new(vec![
            (coverage(&[(0, 1)]), TerminationReason::Normal),
            (coverage(&[(0, 1), (0, 2)]), TerminationReason::Normal),
            (coverage(&[(0, 1), (0, 2), (0, 3)]), TerminationReason::Normal),
            (coverage(&[(0, 1), (0, 2), (0, 3), (0, 4)]), TerminationReason::Normal),
        ]);
        let mut scheduler =
            Scheduler::bootstrap(config, PngPlugin::new(), executor, Arc::new(AtomicBool::new(false))).unwrap();
        let stop = scheduler.run().unwrap();
        assert_eq!(stop, StopReason::GenerationCapReached);
        assert!(scheduler.corpus_len() >= 1);
        assert!(dir.path().join("run/manifest.json").exists());
    }

    #[test]
    fn interrupt_flag_stops_the_run_early() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("seeds")).unwrap();
        minimal_png_seed(&dir.path().join("seeds"));
        let mut config = config(dir.path());
        config.max_generations = None;
        let executor = StubExecutor::new(vec![(coverage(&[(0, 1)]), TerminationReason::Normal)]);
        let interrupted = Arc::new(AtomicBool::new(true));
        let mut scheduler = Scheduler::bootstrap(config, PngPlugin::new(), executor, interrupted).unwrap();
        let stop = scheduler.run().unwrap();
        assert_eq!(stop, StopReason::Interrupted);
    }

    #[test]
    fn tracer_error_budget_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("seeds")).unwrap();
        minimal_png_seed(&dir.path().join("seeds"));
        let config = config(dir.path());
        let executor = StubExecutor::new(vec![
            (coverage(&[]), TerminationReason::TracerError),
            (coverage(&[]), TerminationReason::TracerError),
            (coverage(&[]), TerminationReason::TracerError),
            (coverage(&[]), TerminationReason::TracerError),
        ]);
        let mut scheduler =
            Scheduler::bootstrap(config, PngPlugin::new(), executor, Arc::new(AtomicBool::new(false))).unwrap();
        let err = scheduler.run().unwrap_err();
        assert!(matches!(err, ChoronzonError::Tracer(_)));
    }
}
