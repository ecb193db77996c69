use crate::engine::SearchEngine;

/// One peptide-spectrum match surviving FDR filtering, expanded to a single
/// protein accession. A peptide mapping to N proteins produces N hits which
/// share every field except accession, protein sequence and description.
///
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SearchHit {
    /// Spectrum identifier as reported by the engine
    pub spectrum_id: String,

    /// Spectrum title
    pub spectrum_title: String,

    /// Name of the spectrum source file
    pub spectrum_file: String,

    /// Precursor charge
    pub charge: u8,

    /// Measured neutral mass
    pub exp_neutral_mass: f64,

    /// Calculated neutral mass of the assigned peptide
    pub calc_neutral_mass: f64,

    /// Raw engine score (primary discriminating score)
    pub score: f64,

    /// Assigned peptide sequence
    pub peptide: String,

    /// Protein accession
    pub accession: String,

    /// Protein sequence, filled during merging
    pub protein_sequence: String,

    /// Protein description, filled during merging
    pub protein_description: String,

    /// q-value of the hit, 1.0 until assigned
    pub q_value: f64,

    /// Engine which produced the hit
    pub engine: SearchEngine,
}

/// Protein metadata fetched from a remote service during enrichment
///
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProteinMetadata {
    pub description: String,
    pub taxonomy_id: Option<i64>,
    pub ec_numbers: Vec<String>,
    pub keywords: Vec<String>,
}
