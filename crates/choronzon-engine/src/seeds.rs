//! Seed corpus ingestion: walk a configured directory, filter by glob,
//! deserialize every match with the configured format plug-in, and skip
//! (with a logged diagnostic) any seed that fails to parse. Zero
//! surviving seeds is a `ConfigError`.

use choronzon_core::{ChoronzonError, ErrorInfo};
use choronzon_format::FormatPlugin;
use choronzon_gene::Chromosome;
use globset::{Glob, GlobMatcher};
use walkdir::WalkDir;

use crate::config::SeedConfig;

fn build_matcher(pattern: &str) -> Result<GlobMatcher, ChoronzonError> {
    Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|err| {
            ChoronzonError::Config(
                ErrorInfo::new("seed-glob-invalid", err.to_string())
                    .with_context("pattern", pattern.to_string()),
            )
        })
}

/// Walks `config.directory`, deserializes every file matching
/// `config.include_glob` with `plugin`, and returns the chromosomes that
/// parsed successfully. Returns `ConfigError` if none did.
pub fn load_seed_corpus(
    config: &SeedConfig,
    plugin: &dyn FormatPlugin,
) -> Result<Vec<Chromosome>, ChoronzonError> {
    let matcher = build_matcher(&config.include_glob)?;
    let mut chromosomes = Vec::new();
    let mut attempted = 0usize;

    for entry in WalkDir::new(&config.directory)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
    {
        let path = entry.path();
        let relative = path.strip_prefix(&config.directory).unwrap_or(path);
        if !matcher.is_match(relative) {
            continue;
        }
        attempted += 1;
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("skipping seed {}: unreadable ({err})", path.display());
                continue;
            }
        };
        match plugin.deserialize(&bytes) {
            Ok(chromosome) => chromosomes.push(chromosome),
            Err(err) => {
                log::warn!("skipping seed {}: failed to parse ({err})", path.display());
            }
        }
    }

    if chromosomes.is_empty() {
        return Err(ChoronzonError::Config(
            ErrorInfo::new(
                "seed-corpus-empty",
                format!(
                    "no seeds survived parsing (considered {attempted} file(s) under {})",
                    config.directory.display()
                ),
            )
            .with_hint("check the seed directory and --format selection"),
        ));
    }
    Ok(chromosomes)
}
