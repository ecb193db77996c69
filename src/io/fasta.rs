use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::merge::{ProteinEntry, SequenceLookup};

/// Extracts the accession from a FASTA-style protein header, e.g.
/// `sp|P12345|ALBU_HUMAN Serum albumin` yields `P12345`.
/// Works with or without a leading `>`.
///
pub fn parse_accession(header: &str) -> String {
    let first_token = header
        .trim_start_matches('>')
        .split_whitespace()
        .next()
        .unwrap_or("");
    let mut segments = first_token.split('|');
    match (segments.next(), segments.next()) {
        (Some(_), Some(accession)) if !accession.is_empty() => accession.to_string(),
        (Some(accession), _) => accession.to_string(),
        _ => String::new(),
    }
}

/// Description part of a FASTA header: everything after the first whitespace
///
pub fn parse_description(header: &str) -> String {
    match header.trim_start_matches('>').split_once(char::is_whitespace) {
        Some((_, description)) => description.trim().to_string(),
        None => String::new(),
    }
}

/// In-memory sequence lookup backed by the FASTA database the engines
/// searched
///
pub struct FastaSequenceLookup {
    entries: HashMap<String, ProteinEntry>,
}

impl FastaSequenceLookup {
    /// Reads the whole FASTA file into memory, keyed by accession
    ///
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let reader = BufReader::new(File::open(path)?);
        let mut entries: HashMap<String, ProteinEntry> = HashMap::new();
        let mut current_accession: Option<String> = None;
        let mut current_description = String::new();
        let mut current_sequence = String::new();

        for line in reader.lines() {
            let line = line?;
            if let Some(header) = line.strip_prefix('>') {
                if let Some(accession) = current_accession.take() {
                    entries.insert(
                        accession,
                        ProteinEntry {
                            sequence: std::mem::take(&mut current_sequence),
                            description: std::mem::take(&mut current_description),
                        },
                    );
                }
                current_accession = Some(parse_accession(header));
                current_description = parse_description(header);
            } else {
                current_sequence.push_str(line.trim());
            }
        }
        if let Some(accession) = current_accession {
            entries.insert(
                accession,
                ProteinEntry {
                    sequence: current_sequence,
                    description: current_description,
                },
            );
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SequenceLookup for FastaSequenceLookup {
    fn protein(&self, accession: &str) -> Option<ProteinEntry> {
        self.entries.get(accession).cloned()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_accession() {
        assert_eq!(
            parse_accession("sp|P12345|ALBU_HUMAN Serum albumin"),
            "P12345"
        );
        assert_eq!(parse_accession(">tr|Q99999|SOME_PROT Another"), "Q99999");
        assert_eq!(parse_accession("CONTAMINANT_1 keratin"), "CONTAMINANT_1");
        assert_eq!(parse_accession(""), "");
    }

    #[test]
    fn test_parse_description() {
        assert_eq!(
            parse_description("sp|P12345|ALBU_HUMAN Serum albumin"),
            "Serum albumin"
        );
        assert_eq!(parse_description("ACC_ONLY"), "");
    }

    #[test]
    fn test_fasta_lookup() {
        let path = std::env::temp_dir().join(format!(
            "multisearch_fasta_{}.fasta",
            uuid::Uuid::new_v4()
        ));
        let mut file = File::create(&path).unwrap();
        writeln!(file, ">sp|P12345|ALBU_HUMAN Serum albumin").unwrap();
        writeln!(file, "MKWVTFISLL").unwrap();
        writeln!(file, "FLFSSAYSRG").unwrap();
        writeln!(file, ">tr|Q99999|SOME_PROT Another protein").unwrap();
        writeln!(file, "GGPEPTIDEKAA").unwrap();
        drop(file);

        let lookup = FastaSequenceLookup::from_file(&path).unwrap();
        assert_eq!(lookup.len(), 2);
        let protein = lookup.protein("P12345").unwrap();
        assert_eq!(protein.sequence, "MKWVTFISLLFLFSSAYSRG");
        assert_eq!(protein.description, "Serum albumin");
        assert!(lookup.protein("NOPE").is_none());

        std::fs::remove_file(&path).unwrap();
    }
}
