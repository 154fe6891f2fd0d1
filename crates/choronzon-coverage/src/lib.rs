#![deny(missing_docs)]
//! Coverage-feedback wire protocol consumption: reads the tracer's
//! length-prefixed header and hit-record stream and turns it into a
//! per-trial coverage set and termination reason.

mod wire;

pub use wire::{
    ingest, is_fatal_exception_code, read_header, BasicBlockHit, CoverageSet, ImageTable,
    TerminationReason,
};
