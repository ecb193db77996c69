use std::path::PathBuf;

use tracing::warn;

use crate::constants::{COMET_HEADER_ROWS, PROVISIONAL_Q_VALUE_BOUND};
use crate::engine::SearchEngine;
use crate::errors::ExtractionError;
use crate::hit::SearchHit;
use crate::io::fasta::parse_accession;
use crate::scoring::score_list::ScoreList;

/// Result of one extraction run
///
pub struct Extraction {
    /// Target and decoy scores, sorted descending
    pub scores: ScoreList,

    /// Structured hit records of the target file
    pub hits: Vec<SearchHit>,

    /// Number of structurally malformed rows which were logged and skipped
    pub skipped_rows: usize,
}

/// Capability set of an engine output parser. One implementation per engine
/// output family; shared sorting and filtering lives in the target-decoy
/// analysis.
///
pub trait ScoreExtractor {
    /// Opens and validates the engine's raw output file(s)
    fn load(&mut self) -> Result<(), ExtractionError>;

    /// Produces score list and hits from target and decoy files
    fn extract(&mut self) -> Result<Extraction, ExtractionError>;

    /// Produces a target-only score list when no decoy file exists
    fn extract_target_only(&mut self) -> Result<Extraction, ExtractionError>;
}

/// Transformation from the raw column value to the primary score
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreTransform {
    Identity,
    /// `-ln(value)`, used for e-value based engines so that larger is better
    NegLn,
}

/// Per-engine acceptance pre-filter applied during extraction. Hits failing
/// the bound are dropped silently; their scores still enter the score list.
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AcceptanceBound {
    /// Keep hits with a transformed score at or above the bound
    MinScore(f64),
    /// Keep hits with an engine-native q-value below the bound
    MaxQValue(f64),
}

/// Fixed column semantics of one tab-delimited engine output format
///
#[derive(Debug, Clone)]
pub struct ColumnMap {
    pub spectrum_id: usize,
    pub charge: usize,
    pub exp_mass: Option<usize>,
    pub calc_mass: Option<usize>,
    pub score: usize,
    pub peptide: usize,
    pub protein_header: usize,
    /// Engine-native q-value column, if the output was statistically
    /// post-processed
    pub q_value: Option<usize>,
    pub transform: ScoreTransform,
    /// Leading non-data rows (revision lines, column headers)
    pub header_rows: usize,
}

impl ColumnMap {
    /// Comet text output: revision line, header row, then
    /// scan / charge / masses / e-value / secondary scores / ion counts /
    /// peptide / protein header
    ///
    pub fn comet() -> Self {
        Self {
            spectrum_id: 0,
            charge: 2,
            exp_mass: Some(3),
            calc_mass: Some(4),
            score: 5,
            peptide: 11,
            protein_header: 15,
            q_value: None,
            transform: ScoreTransform::NegLn,
            header_rows: COMET_HEADER_ROWS + 1,
        }
    }

    /// MS-GF+ TSV export
    ///
    pub fn msgf() -> Self {
        Self {
            spectrum_id: 1,
            charge: 7,
            exp_mass: Some(4),
            calc_mass: None,
            score: 12,
            peptide: 8,
            protein_header: 9,
            q_value: None,
            transform: ScoreTransform::NegLn,
            header_rows: 1,
        }
    }

    /// Crux percolator target output, re-ranked with engine-native q-values
    ///
    pub fn crux_percolator() -> Self {
        Self {
            spectrum_id: 0,
            charge: 1,
            exp_mass: None,
            calc_mass: None,
            score: 2,
            peptide: 5,
            protein_header: 7,
            q_value: Some(3),
            transform: ScoreTransform::Identity,
            header_rows: 1,
        }
    }

    /// Default column map for a tab-delimited engine
    ///
    pub fn for_engine(engine: SearchEngine) -> Self {
        match engine {
            SearchEngine::Comet => Self::comet(),
            SearchEngine::MsGf => Self::msgf(),
            SearchEngine::Crux => Self::crux_percolator(),
            // X!Tandem output is a structured document, not columnar
            SearchEngine::XTandem => Self::comet(),
        }
    }
}

struct ParsedRow {
    score: f64,
    q_value: Option<f64>,
    hit: SearchHit,
}

/// Extractor for tab-delimited engine outputs with fixed column semantics
///
pub struct ColumnarExtractor {
    engine: SearchEngine,
    spectrum_file: String,
    target_file: PathBuf,
    decoy_file: Option<PathBuf>,
    columns: ColumnMap,
    acceptance: Option<AcceptanceBound>,
    loaded: bool,
}

impl ColumnarExtractor {
    pub fn new(
        engine: SearchEngine,
        spectrum_file: String,
        target_file: PathBuf,
        decoy_file: Option<PathBuf>,
        columns: ColumnMap,
        acceptance: Option<AcceptanceBound>,
    ) -> Self {
        Self {
            engine,
            spectrum_file,
            target_file,
            decoy_file,
            columns,
            acceptance,
            loaded: false,
        }
    }

    /// Extractor for an engine's re-ranked output with native q-values,
    /// pre-filtered at the provisional q-value bound
    ///
    pub fn with_native_q_values(
        engine: SearchEngine,
        spectrum_file: String,
        target_file: PathBuf,
        columns: ColumnMap,
    ) -> Self {
        Self::new(
            engine,
            spectrum_file,
            target_file,
            None,
            columns,
            Some(AcceptanceBound::MaxQValue(PROVISIONAL_Q_VALUE_BOUND)),
        )
    }

    fn parse_row(&self, record: &csv::StringRecord) -> Option<ParsedRow> {
        let field = |index: usize| record.get(index);

        let spectrum_id = field(self.columns.spectrum_id)?.trim().to_string();
        let charge: u8 = field(self.columns.charge)?.trim().parse().ok()?;
        let exp_neutral_mass = match self.columns.exp_mass {
            Some(index) => field(index)?.trim().parse().ok()?,
            None => 0.0,
        };
        let calc_neutral_mass = match self.columns.calc_mass {
            Some(index) => field(index)?.trim().parse().ok()?,
            None => 0.0,
        };
        let raw_score: f64 = field(self.columns.score)?.trim().parse().ok()?;
        let score = match self.columns.transform {
            ScoreTransform::Identity => raw_score,
            ScoreTransform::NegLn => {
                if raw_score <= 0.0 {
                    return None;
                }
                -raw_score.ln()
            }
        };
        let peptide = field(self.columns.peptide)?.trim().to_string();
        if peptide.is_empty() {
            return None;
        }
        let protein_header = field(self.columns.protein_header)?.trim();
        let q_value = match self.columns.q_value {
            Some(index) => Some(field(index)?.trim().parse().ok()?),
            None => None,
        };

        Some(ParsedRow {
            score,
            q_value,
            hit: SearchHit {
                spectrum_id: spectrum_id.clone(),
                spectrum_title: spectrum_id,
                spectrum_file: self.spectrum_file.clone(),
                charge,
                exp_neutral_mass,
                calc_neutral_mass,
                score,
                peptide,
                accession: parse_accession(protein_header),
                protein_sequence: String::new(),
                protein_description: String::new(),
                q_value: q_value.unwrap_or(1.0),
                engine: self.engine,
            },
        })
    }

    /// Whether a parsed row passes the acceptance pre-filter. Failing rows
    /// are dropped silently.
    ///
    fn accepts(&self, row: &ParsedRow) -> bool {
        match self.acceptance {
            None => true,
            Some(AcceptanceBound::MinScore(bound)) => row.score >= bound,
            Some(AcceptanceBound::MaxQValue(bound)) => match row.q_value {
                Some(q_value) => q_value < bound,
                None => true,
            },
        }
    }

    fn parse_file(
        &self,
        path: &PathBuf,
        collect_hits: bool,
    ) -> Result<(Vec<f64>, Vec<SearchHit>, usize), ExtractionError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(|source| ExtractionError::Open {
                path: path.clone(),
                source,
            })?;

        let mut scores: Vec<f64> = Vec::new();
        let mut hits: Vec<SearchHit> = Vec::new();
        let mut skipped = 0usize;

        for (row_index, record) in reader.records().enumerate() {
            if row_index < self.columns.header_rows {
                continue;
            }
            let record = match record {
                Ok(record) => record,
                Err(error) => {
                    warn!(
                        "Skipping unreadable row {} of `{}`: {}",
                        row_index + 1,
                        path.display(),
                        error
                    );
                    skipped += 1;
                    continue;
                }
            };
            match self.parse_row(&record) {
                Some(row) => {
                    scores.push(row.score);
                    if collect_hits && self.accepts(&row) {
                        hits.push(row.hit);
                    }
                }
                None => {
                    warn!(
                        "Skipping malformed row {} of `{}`",
                        row_index + 1,
                        path.display()
                    );
                    skipped += 1;
                }
            }
        }

        Ok((scores, hits, skipped))
    }
}

impl ScoreExtractor for ColumnarExtractor {
    fn load(&mut self) -> Result<(), ExtractionError> {
        if !self.target_file.exists() {
            return Err(ExtractionError::MissingResultFile(self.target_file.clone()));
        }
        if let Some(decoy_file) = &self.decoy_file {
            if !decoy_file.exists() {
                return Err(ExtractionError::MissingResultFile(decoy_file.clone()));
            }
        }
        self.loaded = true;
        Ok(())
    }

    fn extract(&mut self) -> Result<Extraction, ExtractionError> {
        if !self.loaded {
            return Err(ExtractionError::NotLoaded);
        }
        let (target_scores, hits, mut skipped) = self.parse_file(&self.target_file.clone(), true)?;
        let decoy_scores = match &self.decoy_file {
            Some(decoy_file) => {
                let (scores, _, decoy_skipped) = self.parse_file(&decoy_file.clone(), false)?;
                skipped += decoy_skipped;
                scores
            }
            None => Vec::with_capacity(0),
        };
        Ok(Extraction {
            scores: ScoreList::new(target_scores, decoy_scores),
            hits,
            skipped_rows: skipped,
        })
    }

    fn extract_target_only(&mut self) -> Result<Extraction, ExtractionError> {
        if !self.loaded {
            return Err(ExtractionError::NotLoaded);
        }
        let (target_scores, hits, skipped) = self.parse_file(&self.target_file.clone(), true)?;
        Ok(Extraction {
            scores: ScoreList::target_only(target_scores),
            hits,
            skipped_rows: skipped,
        })
    }
}
