/// Engine output parsing into scores and hits
pub mod extractor;
/// Sorted target and decoy score container
pub mod score_list;
/// Target-decoy q-value computation and FDR filtering
pub mod target_decoy;
/// X!Tandem structured result documents
pub mod xtandem;
