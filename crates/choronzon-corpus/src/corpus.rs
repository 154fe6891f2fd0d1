//! The corpus: an ordered multiset of admitted chromosomes plus the
//! crash set, admission rules, and eviction policy.

use std::collections::{BTreeMap, BTreeSet};

use choronzon_core::RngHandle;
use choronzon_coverage::{CoverageSet, TerminationReason};
use choronzon_gene::{Chromosome, ChromosomeId};
use serde::{Deserialize, Serialize};

use crate::coverage_map::{fitness, has_novel_edge, GlobalCoverageMap};

/// One admitted chromosome plus the bookkeeping the corpus needs to apply
/// its eviction policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusMember {
    /// The admitted chromosome.
    pub chromosome: Chromosome,
    /// Fitness at the moment of admission.
    pub fitness: f64,
    /// Monotonic admission sequence number, used to break eviction ties in
    /// favor of the oldest member.
    pub admitted_at: u64,
    /// Whether this member was admitted as a crash (exempt from eviction).
    pub is_crash: bool,
}

/// The corpus: bounded set of admitted chromosomes plus the crash set that
/// is exempt from the eviction policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    capacity: usize,
    members: Vec<CorpusMember>,
    crashes: BTreeMap<(u64, u64), ChromosomeId>,
    seen_bytes: BTreeSet<Vec<u8>>,
    next_admission_seq: u64,
}

impl Corpus {
    /// Creates an empty corpus bounded at `capacity` non-crash members.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Rebuilds a corpus from members read back from a checkpoint, paired
    /// with their serialized bytes (for the duplicate-bytes admission
    /// check). The reconstructed crash set starts empty: the checkpoint
    /// format does not retain the `(image_index, bbl)` crash key
    /// independently of coverage, so the dedup-by-crash-site behavior
    /// resets across a resume. The `is_crash` flag on each member (and
    /// therefore its exemption from eviction) is preserved.
    pub fn restore(capacity: usize, members: Vec<(CorpusMember, Vec<u8>)>) -> Self {
        let mut corpus = Self::new(capacity);
        for (member, serialized) in members {
            corpus.next_admission_seq = corpus.next_admission_seq.max(member.admitted_at + 1);
            corpus.seen_bytes.insert(serialized);
            corpus.members.push(member);
        }
        corpus
    }

    /// Number of members currently held (including crashes).
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the corpus holds no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterates over the corpus's members.
    pub fn iter(&self) -> impl Iterator<Item = &CorpusMember> {
        self.members.iter()
    }

    /// The lowest fitness currently held, or `None` if the corpus is empty.
    pub fn min_fitness(&self) -> Option<f64> {
        self.members
            .iter()
            .map(|m| m.fitness)
            .fold(None, |acc, f| Some(acc.map_or(f, |a: f64| a.min(f))))
    }

    /// Number of distinct crash sites recorded so far.
    pub fn crash_count(&self) -> usize {
        self.crashes.len()
    }

    /// Evaluates the admission rules (in the order specified) for a freshly
    /// executed trial and, if admitted, inserts the chromosome and updates
    /// `global` and the crash set. Returns whether the trial was admitted.
    pub fn try_admit(
        &mut self,
        mut chromosome: Chromosome,
        serialized: &[u8],
        coverage: &CoverageSet,
        termination: &TerminationReason,
        global: &mut GlobalCoverageMap,
    ) -> bool {
        let fit = fitness(coverage, global);
        let is_duplicate = self.seen_bytes.contains(serialized);
        // A timed-out trial is never admitted by fitness alone (rule 3):
        // a slow input that happens to cover well must still prove novelty
        // to earn a corpus slot, so it isn't rewarded for being slow.
        let fitness_alone_eligible = !matches!(termination, TerminationReason::Timeout);

        let (admitted, is_crash) = if let TerminationReason::FatalSignal(code) = termination {
            let key = coverage
                .last_hit()
                .map(|hit| (hit.image_index, hit.bbl))
                .unwrap_or((u64::MAX, *code));
            self.crashes
                .entry(key)
                .or_insert_with(|| chromosome.id.clone());
            (true, true)
        } else if has_novel_edge(coverage, global) {
            (!is_duplicate, false)
        } else if fitness_alone_eligible && self.min_fitness().map_or(true, |min| fit > min) {
            (!is_duplicate, false)
        } else {
            (false, false)
        };

        if !admitted {
            return false;
        }

        for hit in coverage.iter() {
            global.record((hit.image_index, hit.bbl));
        }
        self.seen_bytes.insert(serialized.to_vec());
        let seq = self.next_admission_seq;
        self.next_admission_seq += 1;
        chromosome.mark_executed(fit);
        self.members.push(CorpusMember {
            chromosome,
            fitness: fit,
            admitted_at: seq,
            is_crash,
        });
        self.enforce_capacity();
        true
    }

    /// Drops the lowest-fitness, oldest-among-ties, non-crash member until
    /// the corpus is back within capacity.
    fn enforce_capacity(&mut self) {
        while self.members.len() > self.capacity {
            let victim = self
                .members
                .iter()
                .enumerate()
                .filter(|(_, member)| !member.is_crash)
                .min_by(|(_, a), (_, b)| {
                    a.fitness
                        .partial_cmp(&b.fitness)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.admitted_at.cmp(&b.admitted_at))
                })
                .map(|(index, _)| index);
            match victim {
                Some(index) => {
                    self.members.remove(index);
                }
                None => break,
            }
        }
    }

    /// Tournament-of-`k` parent selection: draws `k` members uniformly and
    /// keeps the highest-fitness one.
    pub fn tournament_select(&self, k: usize, rng: &mut RngHandle) -> Option<&Chromosome> {
        if self.members.is_empty() {
            return None;
        }
        let mut best: Option<&CorpusMember> = None;
        for _ in 0..k.max(1) {
            let candidate = &self.members[rng.below(self.members.len())];
            best = match best {
                Some(current) if current.fitness >= candidate.fitness => Some(current),
                _ => Some(candidate),
            };
        }
        best.map(|member| &member.chromosome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use choronzon_coverage::BasicBlockHit;
    use choronzon_gene::{Gene, GeneFlags};

    fn chromosome(id: &str) -> Chromosome {
        let root = Gene::leaf("ROOT", Vec::new(), GeneFlags::structural());
        Chromosome::seed(root, ChromosomeId::from_bytes(id.as_bytes(), 0))
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

    #[test]
    fn novel_edge_is_always_admitted() {
        let mut corpus = Corpus::new(10);
        let mut global = GlobalCoverageMap::new();
        let admitted = corpus.try_admit(
            chromosome("a"),
            b"a",
            &coverage(&[(0, 1)]),
            &TerminationReason::Normal,
            &mut global,
        );
        assert!(admitted);
        assert_eq!(corpus.len(), 1);
    }

    #[test]
    fn duplicate_bytes_are_rejected() {
        let mut corpus = Corpus::new(10);
        let mut global = GlobalCoverageMap::new();
        corpus.try_admit(
            chromosome("a"),
            b"same",
            &coverage(&[(0, 1)]),
            &TerminationReason::Normal,
            &mut global,
        );
        let admitted = corpus.try_admit(
            chromosome("b"),
            b"same",
            &coverage(&[(0, 2)]),
            &TerminationReason::Normal,
            &mut global,
        );
        assert!(!admitted);
    }

    #[test]
    fn fatal_signal_always_admits_and_records_crash() {
        let mut corpus = Corpus::new(10);
        let mut global = GlobalCoverageMap::new();
        let admitted = corpus.try_admit(
            chromosome("crash"),
            b"crash",
            &coverage(&[(0, 99)]),
            &TerminationReason::FatalSignal(11),
            &mut global,
        );
        assert!(admitted);
        assert_eq!(corpus.crash_count(), 1);
    }

    #[test]
    fn eviction_drops_lowest_fitness_oldest_first() {
        let mut corpus = Corpus::new(1);
        let mut global = GlobalCoverageMap::new();
        corpus.try_admit(
            chromosome("low"),
            b"low",
            &coverage(&[(0, 1)]),
            &TerminationReason::Normal,
            &mut global,
        );
        corpus.try_admit(
            chromosome("high"),
            b"high",
            &coverage(&[(0, 1), (0, 2)]),
            &TerminationReason::Normal,
            &mut global,
        );
        assert_eq!(corpus.len(), 1);
        assert!(corpus.iter().next().unwrap().chromosome.id.as_str() != "");
    }

    #[test]
    fn timeout_is_not_admitted_by_fitness_alone() {
        let mut corpus = Corpus::new(10);
        let mut global = GlobalCoverageMap::new();
        corpus.try_admit(
            chromosome("seed"),
            b"seed",
            &coverage(&[(0, 1)]),
            &TerminationReason::Normal,
            &mut global,
        );
        let admitted = corpus.try_admit(
            chromosome("slow"),
            b"slow",
            &coverage(&[(0, 1)]),
            &TerminationReason::Timeout,
            &mut global,
        );
        assert!(!admitted);
        assert_eq!(corpus.len(), 1);
    }

    #[test]
    fn timeout_with_novel_edge_is_still_admitted() {
        let mut corpus = Corpus::new(10);
        let mut global = GlobalCoverageMap::new();
        let admitted = corpus.try_admit(
            chromosome("slow-novel"),
            b"slow-novel",
            &coverage(&[(0, 1)]),
            &TerminationReason::Timeout,
            &mut global,
        );
        assert!(admitted);
    }

    #[test]
    fn crashes_are_exempt_from_eviction() {
        let mut corpus = Corpus::new(1);
        let mut global = GlobalCoverageMap::new();
        corpus.try_admit(
            chromosome("crash"),
            b"crash",
            &coverage(&[(0, 1)]),
            &TerminationReason::FatalSignal(11),
            &mut global,
        );
        corpus.try_admit(
            chromosome("second"),
            b"second",
            &coverage(&[(0, 1), (0, 2)]),
            &TerminationReason::Normal,
            &mut global,
        );
        assert_eq!(corpus.len(), 2);
    }
}
