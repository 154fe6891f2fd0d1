#![deny(missing_docs)]
//! The (de)serialization contract a file-format plug-in implements. This
//! crate defines the contract only; concrete plug-ins (such as
//! `choronzon-png`) are external collaborators that implement it.

use choronzon_core::ChoronzonError;
use choronzon_gene::{AdmissibilityOracle, Chromosome};

/// A format-specific plug-in bridging raw bytes and gene trees.
///
/// Implementations must satisfy a round-trip property: for every seed `s`
/// accepted by [`FormatPlugin::deserialize`],
/// `serialize(deserialize(s))` must re-deserialize to a structurally equal
/// tree, modulo fields the plug-in documents as auto-recomputed (lengths,
/// checksums, and the like).
pub trait FormatPlugin: AdmissibilityOracle {
    /// A short, stable name for this plug-in (e.g. `"png"`), used in CLI
    /// `--format` selection and in diagnostics.
    fn name(&self) -> &'static str;

    /// Parses `bytes` into a chromosome. Must accept any valid file of the
    /// format; is not required to accept malformed files.
    fn deserialize(&self, bytes: &[u8]) -> Result<Chromosome, ChoronzonError>;

    /// Serializes a chromosome to bytes. Must always succeed for a tree
    /// that satisfies the plug-in's admissibility rules; may recompute
    /// auto-computable fields (lengths, checksums) but must otherwise
    /// preserve the tree's logical content.
    fn serialize(&self, chromosome: &Chromosome) -> Result<Vec<u8>, ChoronzonError>;
}

impl AdmissibilityOracle for Box<dyn FormatPlugin> {
    fn admissible(&self, parent_kind: &choronzon_gene::GeneKind, child_kind: &choronzon_gene::GeneKind, position: usize) -> bool {
        (**self).admissible(parent_kind, child_kind, position)
    }
}

impl FormatPlugin for Box<dyn FormatPlugin> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Chromosome, ChoronzonError> {
        (**self).deserialize(bytes)
    }

    fn serialize(&self, chromosome: &Chromosome) -> Result<Vec<u8>, ChoronzonError> {
        (**self).serialize(chromosome)
    }
}

/// Helper constructors for the two error families format plug-ins raise,
/// so plug-in authors don't need to hand-build [`choronzon_core::ErrorInfo`].
pub mod errors {
    use choronzon_core::{ChoronzonError, ErrorInfo};

    /// Builds a `ChoronzonError::Parse` with the given code and message.
    pub fn parse_error(code: &str, message: impl Into<String>) -> ChoronzonError {
        ChoronzonError::Parse(ErrorInfo::new(code, message))
    }

    /// Builds a `ChoronzonError::Serialization` with the given code and message.
    pub fn serialization_error(code: &str, message: impl Into<String>) -> ChoronzonError {
        ChoronzonError::Serialization(ErrorInfo::new(code, message))
    }
}
