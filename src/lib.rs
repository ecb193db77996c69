// Orchestrates multiple peptide search engines as external processes,
// gates their matches at a common FDR threshold and merges the accepted
// peptide hits into protein hits.

/// Session configuration
pub mod config;
/// Default values used throughout the pipeline
pub mod constants;
/// Supported search engines
pub mod engine;
/// Protein metadata enrichment
pub mod enrichment;
/// Error types
pub mod errors;
/// Hit and metadata records
pub mod hit;
/// File format readers
pub mod io;
/// Peptide to protein hit merging
pub mod merge;
/// Jobs, scheduling and session orchestration
pub mod pipeline;
/// Score extraction and target-decoy analysis
pub mod scoring;
/// Shared session state
pub mod store;
