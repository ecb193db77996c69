use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use crate::errors::ExtractionError;
use crate::hit::SearchHit;
use crate::io::fasta::parse_accession;
use crate::scoring::extractor::{Extraction, ScoreExtractor};
use crate::scoring::score_list::ScoreList;
use crate::engine::SearchEngine;

/// Marker after which spectrum titles carry retention time information.
/// Everything from the marker on is stripped for display.
const RETENTION_TIME_MARKER: &str = "RTINSECONDS";

/// One peptide-spectrum candidate read from a result document
///
#[derive(Debug, Clone)]
pub struct SpectrumCandidate {
    pub spectrum_id: String,
    pub spectrum_title: String,
    pub charge: u8,
    pub exp_neutral_mass: f64,
    pub calc_neutral_mass: f64,
    pub hyperscore: f64,
    pub peptide: String,
    pub protein_header: String,
    pub protein_description: String,
}

/// Collaborator turning a structured result document into candidates.
/// Separated from the extractor so scoring logic is testable without
/// document files.
///
pub trait SpectrumDocumentReader {
    fn load(&mut self) -> Result<(), ExtractionError>;

    fn candidates(&mut self) -> Result<Vec<SpectrumCandidate>, ExtractionError>;
}

/// Line-scanning reader for X!Tandem XML result documents. The documents are
/// large but rigidly machine-written with one element per line, so attribute
/// scanning is sufficient and avoids buffering a DOM.
///
pub struct TandemDocumentReader {
    path: PathBuf,
}

impl TandemDocumentReader {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

/// Value of the attribute `name` on the element in `line`
///
fn attribute<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{}=\"", name);
    let start = line.find(&needle)? + needle.len();
    let end = line[start..].find('"')? + start;
    Some(&line[start..end])
}

/// Text content between the opening and closing tag on a single line
///
fn inline_text(line: &str) -> Option<&str> {
    let start = line.find('>')? + 1;
    let end = line[start..].find('<')? + start;
    Some(&line[start..end])
}

impl SpectrumDocumentReader for TandemDocumentReader {
    fn load(&mut self) -> Result<(), ExtractionError> {
        if !self.path.exists() {
            return Err(ExtractionError::MissingResultFile(self.path.clone()));
        }
        Ok(())
    }

    fn candidates(&mut self) -> Result<Vec<SpectrumCandidate>, ExtractionError> {
        let file = File::open(&self.path).map_err(|source| ExtractionError::Read {
            path: self.path.clone(),
            source,
        })?;
        let reader = BufReader::new(file);

        let mut candidates: Vec<SpectrumCandidate> = Vec::new();
        let mut pending: Vec<SpectrumCandidate> = Vec::new();

        let mut group_depth = 0usize;
        let mut spectrum_id = String::new();
        let mut spectrum_title = String::new();
        let mut exp_neutral_mass = 0.0f64;
        let mut charge = 0u8;
        let mut protein_header = String::new();
        let mut protein_description = String::new();
        let mut in_support_spectrum = false;

        for line in reader.lines() {
            let line = line.map_err(|source| ExtractionError::Read {
                path: self.path.clone(),
                source,
            })?;
            let trimmed = line.trim_start();

            if trimmed.starts_with("<group") {
                group_depth += 1;
                if attribute(trimmed, "type") == Some("model") {
                    spectrum_id = attribute(trimmed, "id").unwrap_or("").to_string();
                    spectrum_title = attribute(trimmed, "label").unwrap_or("").to_string();
                    exp_neutral_mass = attribute(trimmed, "mh")
                        .and_then(|value| value.parse().ok())
                        .unwrap_or(0.0);
                    charge = attribute(trimmed, "z")
                        .and_then(|value| value.parse().ok())
                        .unwrap_or(0);
                } else if attribute(trimmed, "label") == Some("fragment ion mass spectrum") {
                    in_support_spectrum = true;
                }
            } else if trimmed.starts_with("</group") {
                group_depth = group_depth.saturating_sub(1);
                in_support_spectrum = false;
                if group_depth == 0 {
                    // top-level model group closed, flush its candidates
                    let title = spectrum_title
                        .split(RETENTION_TIME_MARKER)
                        .next()
                        .unwrap_or("")
                        .trim()
                        .to_string();
                    for mut candidate in pending.drain(..) {
                        candidate.spectrum_title = title.clone();
                        candidates.push(candidate);
                    }
                }
            } else if trimmed.starts_with("<protein") {
                protein_header = attribute(trimmed, "label").unwrap_or("").to_string();
            } else if trimmed.starts_with("<note") {
                if in_support_spectrum {
                    if let Some(text) = inline_text(trimmed) {
                        spectrum_title = text.to_string();
                    }
                } else if attribute(trimmed, "label")
                    .map(|label| label.eq_ignore_ascii_case("description"))
                    .unwrap_or(false)
                {
                    protein_description = inline_text(trimmed).unwrap_or("").trim().to_string();
                }
            } else if trimmed.starts_with("<domain") {
                let hyperscore: f64 = attribute(trimmed, "hyperscore")
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(0.0);
                let peptide = attribute(trimmed, "seq").unwrap_or("").to_string();
                let calc_neutral_mass: f64 = attribute(trimmed, "mh")
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(0.0);
                pending.push(SpectrumCandidate {
                    spectrum_id: spectrum_id.clone(),
                    spectrum_title: String::new(),
                    charge,
                    exp_neutral_mass,
                    calc_neutral_mass,
                    hyperscore,
                    peptide,
                    protein_header: protein_header.clone(),
                    protein_description: protein_description.clone(),
                });
            }
        }

        Ok(candidates)
    }
}

/// Extractor for X!Tandem result documents. The engine reports many
/// candidates per spectrum; only the best hyperscore per spectrum enters the
/// score distribution, while every candidate sharing that best score becomes
/// a hit.
///
pub struct XTandemScoreExtractor<R>
where
    R: SpectrumDocumentReader,
{
    spectrum_file: String,
    target: R,
    decoy: Option<R>,
    loaded: bool,
}

impl<R> XTandemScoreExtractor<R>
where
    R: SpectrumDocumentReader,
{
    pub fn new(spectrum_file: String, target: R, decoy: Option<R>) -> Self {
        Self {
            spectrum_file,
            target,
            decoy,
            loaded: false,
        }
    }

    /// Best hyperscore per spectrum, in document order
    ///
    fn best_scores(candidates: &[SpectrumCandidate]) -> Vec<(String, f64)> {
        let mut best: Vec<(String, f64)> = Vec::new();
        for candidate in candidates {
            match best.iter_mut().find(|(id, _)| *id == candidate.spectrum_id) {
                Some((_, score)) => {
                    if candidate.hyperscore > *score {
                        *score = candidate.hyperscore;
                    }
                }
                None => best.push((candidate.spectrum_id.clone(), candidate.hyperscore)),
            }
        }
        best
    }

    fn hit_from(&self, candidate: &SpectrumCandidate) -> SearchHit {
        SearchHit {
            spectrum_id: candidate.spectrum_id.clone(),
            spectrum_title: candidate.spectrum_title.clone(),
            spectrum_file: self.spectrum_file.clone(),
            charge: candidate.charge,
            exp_neutral_mass: candidate.exp_neutral_mass,
            calc_neutral_mass: candidate.calc_neutral_mass,
            score: candidate.hyperscore,
            peptide: candidate.peptide.clone(),
            accession: parse_accession(&candidate.protein_header),
            protein_sequence: String::new(),
            protein_description: candidate.protein_description.clone(),
            q_value: 1.0,
            engine: SearchEngine::XTandem,
        }
    }

    /// Hits for every candidate matching its spectrum's best positive score
    ///
    fn best_hits(&self, candidates: &[SpectrumCandidate]) -> Vec<SearchHit> {
        let best = Self::best_scores(candidates);
        candidates
            .iter()
            .filter(|candidate| {
                candidate.hyperscore > 0.0
                    && best
                        .iter()
                        .any(|(id, score)| *id == candidate.spectrum_id && *score == candidate.hyperscore)
            })
            .map(|candidate| self.hit_from(candidate))
            .collect()
    }
}

impl<R> ScoreExtractor for XTandemScoreExtractor<R>
where
    R: SpectrumDocumentReader,
{
    fn load(&mut self) -> Result<(), ExtractionError> {
        self.target.load()?;
        if let Some(decoy) = self.decoy.as_mut() {
            decoy.load()?;
        }
        self.loaded = true;
        Ok(())
    }

    fn extract(&mut self) -> Result<Extraction, ExtractionError> {
        if !self.loaded {
            return Err(ExtractionError::NotLoaded);
        }
        let target_candidates = self.target.candidates()?;
        let target_scores: Vec<f64> = Self::best_scores(&target_candidates)
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(_, score)| score)
            .collect();
        let decoy_scores = match self.decoy.as_mut() {
            Some(decoy) => Self::best_scores(&decoy.candidates()?)
                .into_iter()
                .filter(|(_, score)| *score > 0.0)
                .map(|(_, score)| score)
                .collect(),
            None => Vec::with_capacity(0),
        };
        Ok(Extraction {
            hits: self.best_hits(&target_candidates),
            scores: ScoreList::new(target_scores, decoy_scores),
            skipped_rows: 0,
        })
    }

    /// Target-only variant. Every spectrum's best score enters the score
    /// distribution, including zero scores, so the rank-fraction fallback
    /// sees the full spectrum count.
    ///
    fn extract_target_only(&mut self) -> Result<Extraction, ExtractionError> {
        if !self.loaded {
            return Err(ExtractionError::NotLoaded);
        }
        let candidates = self.target.candidates()?;
        let target_scores: Vec<f64> = Self::best_scores(&candidates)
            .into_iter()
            .map(|(_, score)| score)
            .collect();
        Ok(Extraction {
            hits: self.best_hits(&candidates),
            scores: ScoreList::target_only(target_scores),
            skipped_rows: 0,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct StaticReader {
        candidates: Vec<SpectrumCandidate>,
    }

    impl SpectrumDocumentReader for StaticReader {
        fn load(&mut self) -> Result<(), ExtractionError> {
            Ok(())
        }

        fn candidates(&mut self) -> Result<Vec<SpectrumCandidate>, ExtractionError> {
            Ok(self.candidates.clone())
        }
    }

    fn candidate(
        spectrum_id: &str,
        hyperscore: f64,
        peptide: &str,
        header: &str,
    ) -> SpectrumCandidate {
        SpectrumCandidate {
            spectrum_id: spectrum_id.to_string(),
            spectrum_title: format!("scan {} RTINSECONDS=120.5", spectrum_id),
            charge: 2,
            exp_neutral_mass: 1200.5,
            calc_neutral_mass: 1200.6,
            hyperscore,
            peptide: peptide.to_string(),
            protein_header: header.to_string(),
            protein_description: "Some protein".to_string(),
        }
    }

    #[test]
    fn test_best_score_per_spectrum() {
        let reader = StaticReader {
            candidates: vec![
                candidate("1", 25.0, "PEPTIDEK", "sp|P12345|ALBU_HUMAN"),
                candidate("1", 12.0, "AAAAK", "tr|Q99999|SOME_PROT"),
                candidate("2", 18.0, "ELVISK", "sp|P67890|OTHER"),
            ],
        };
        let mut extractor =
            XTandemScoreExtractor::new("run01.mgf".to_string(), reader, None::<StaticReader>);
        extractor.load().unwrap();
        let extraction = extractor.extract_target_only().unwrap();

        assert_eq!(extraction.scores.targets(), &[25.0, 18.0]);
        assert_eq!(extraction.hits.len(), 2);
        assert_eq!(extraction.hits[0].peptide, "PEPTIDEK");
        assert_eq!(extraction.hits[0].accession, "P12345");
        assert_eq!(extraction.hits[1].peptide, "ELVISK");
    }

    #[test]
    fn test_zero_scores_counted_in_target_only_distribution() {
        let reader = StaticReader {
            candidates: vec![
                candidate("1", 25.0, "PEPTIDEK", "sp|P12345|ALBU_HUMAN"),
                candidate("2", 0.0, "AAAAK", "tr|Q99999|SOME_PROT"),
            ],
        };
        let mut extractor =
            XTandemScoreExtractor::new("run01.mgf".to_string(), reader, None::<StaticReader>);
        extractor.load().unwrap();
        let extraction = extractor.extract_target_only().unwrap();
        // the zero score stays in the distribution but produces no hit
        assert_eq!(extraction.scores.targets().len(), 2);
        assert_eq!(extraction.hits.len(), 1);
    }

    #[test]
    fn test_extract_with_decoy_reader_drops_zero_scores() {
        let target = StaticReader {
            candidates: vec![candidate("1", 25.0, "PEPTIDEK", "sp|P12345|ALBU_HUMAN")],
        };
        let decoy = StaticReader {
            candidates: vec![
                candidate("1", 9.0, "KEDITPEP", "DECOY_sp|P12345|ALBU_HUMAN"),
                candidate("2", 0.0, "KAAAA", "DECOY_tr|Q99999|SOME_PROT"),
            ],
        };
        let mut extractor =
            XTandemScoreExtractor::new("run01.mgf".to_string(), target, Some(decoy));
        extractor.load().unwrap();
        let extraction = extractor.extract().unwrap();
        assert_eq!(extraction.scores.targets(), &[25.0]);
        assert_eq!(extraction.scores.decoys(), &[9.0]);
    }

    #[test]
    fn test_document_reader_parses_model_groups() {
        let path = std::env::temp_dir().join(format!(
            "multisearch_tandem_{}.xml",
            uuid::Uuid::new_v4()
        ));
        let document = concat!(
            "<?xml version=\"1.0\"?>\n",
            "<bioml>\n",
            "<group id=\"101\" mh=\"1201.51\" z=\"2\" type=\"model\" label=\"101.2.2\">\n",
            "<protein id=\"101.1\" label=\"sp|P12345|ALBU_HUMAN\">\n",
            "<note label=\"description\">sp|P12345|ALBU_HUMAN Serum albumin</note>\n",
            "<peptide start=\"1\" end=\"10\">\n",
            "<domain id=\"101.1.1\" mh=\"1200.60\" hyperscore=\"25.1\" seq=\"PEPTIDEK\" />\n",
            "</peptide>\n",
            "</protein>\n",
            "<group type=\"support\" label=\"fragment ion mass spectrum\">\n",
            "<note label=\"Description\">scan 101 RTINSECONDS=120.5</note>\n",
            "</group>\n",
            "</group>\n",
            "</bioml>\n",
        );
        std::fs::write(&path, document).unwrap();

        let mut reader = TandemDocumentReader::new(path.clone());
        reader.load().unwrap();
        let candidates = reader.candidates().unwrap();
        assert_eq!(candidates.len(), 1);
        let candidate = &candidates[0];
        assert_eq!(candidate.spectrum_id, "101");
        assert_eq!(candidate.spectrum_title, "scan 101");
        assert_eq!(candidate.charge, 2);
        assert_eq!(candidate.peptide, "PEPTIDEK");
        assert!((candidate.hyperscore - 25.1).abs() < 1e-9);
        assert_eq!(candidate.protein_header, "sp|P12345|ALBU_HUMAN");
        assert_eq!(candidate.protein_description, "sp|P12345|ALBU_HUMAN Serum albumin");

        std::fs::remove_file(&path).unwrap();
    }
}
