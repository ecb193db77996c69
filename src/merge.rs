use std::collections::HashSet;

use tracing::debug;

use crate::errors::StoreError;
use crate::hit::SearchHit;
use crate::store::SessionStore;

/// Protein sequence and description as provided by the sequence database
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProteinEntry {
    pub sequence: String,
    pub description: String,
}

/// Collaborator resolving protein accessions to sequence and description,
/// typically backed by the FASTA database the engines searched
///
pub trait SequenceLookup {
    fn protein(&self, accession: &str) -> Option<ProteinEntry>;
}

/// Expands accepted hits across all protein accessions their peptide maps to
/// and appends them to the session's global hit set
///
pub struct ResultMerger<'a, L>
where
    L: SequenceLookup,
{
    store: &'a SessionStore,
    lookup: &'a L,
}

impl<'a, L> ResultMerger<'a, L>
where
    L: SequenceLookup,
{
    pub fn new(store: &'a SessionStore, lookup: &'a L) -> Self {
        Self { store, lookup }
    }

    /// Merges a batch of accepted hits. For each hit the accession embedded
    /// in the engine output is unioned with all accessions the peptide index
    /// knows for the exact peptide sequence; one hit copy is appended per
    /// accession. The whole batch is appended in a single step and the
    /// accessions are queued for enrichment afterwards, so a failing task
    /// never leaves a partial update behind.
    ///
    /// Returns the number of appended hits.
    ///
    pub fn merge(&self, hits: Vec<SearchHit>) -> Result<usize, StoreError> {
        let mut expanded: Vec<SearchHit> = Vec::with_capacity(hits.len());
        let mut touched_accessions: HashSet<String> = HashSet::new();

        for hit in hits {
            let mut accessions: HashSet<String> = HashSet::new();
            if !hit.accession.is_empty() {
                accessions.insert(hit.accession.clone());
            }
            accessions.extend(self.store.accessions_for(&hit.peptide)?);

            for accession in accessions {
                let mut expanded_hit = hit.clone();
                expanded_hit.accession = accession.clone();
                if let Some(protein) = self.lookup.protein(&accession) {
                    expanded_hit.protein_sequence = protein.sequence;
                    expanded_hit.protein_description = protein.description;
                }
                touched_accessions.insert(accession);
                expanded.push(expanded_hit);
            }
        }

        let appended = expanded.len();
        self.store.append_hits(expanded)?;
        for accession in touched_accessions {
            self.store.queue_for_enrichment(&accession)?;
        }
        debug!("Merged {} hits into the global hit set", appended);
        Ok(appended)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::SearchEngine;

    struct StaticLookup;

    impl SequenceLookup for StaticLookup {
        fn protein(&self, accession: &str) -> Option<ProteinEntry> {
            match accession {
                "A" => Some(ProteinEntry {
                    sequence: "MKLVPEPTIDEK".to_string(),
                    description: "Protein A".to_string(),
                }),
                "B" => Some(ProteinEntry {
                    sequence: "GGPEPTIDEKAA".to_string(),
                    description: "Protein B".to_string(),
                }),
                _ => None,
            }
        }
    }

    fn hit() -> SearchHit {
        SearchHit {
            spectrum_id: "42".to_string(),
            spectrum_title: "spectrum 42".to_string(),
            spectrum_file: "run01.mgf".to_string(),
            charge: 2,
            exp_neutral_mass: 1200.5,
            calc_neutral_mass: 1200.6,
            score: 11.5,
            peptide: "PEPTIDEK".to_string(),
            accession: "A".to_string(),
            protein_sequence: String::new(),
            protein_description: String::new(),
            q_value: 0.01,
            engine: SearchEngine::Comet,
        }
    }

    #[test]
    fn test_ambiguous_peptide_expands_to_one_hit_per_accession() {
        let store = SessionStore::new();
        store
            .register_peptide("PEPTIDEK", vec!["A".to_string(), "B".to_string()])
            .unwrap();

        let merger = ResultMerger::new(&store, &StaticLookup);
        let appended = merger.merge(vec![hit()]).unwrap();
        assert_eq!(appended, 2);

        let hits = store.hits().unwrap();
        assert_eq!(hits.len(), 2);
        let hit_a = hits.iter().find(|hit| hit.accession == "A").unwrap();
        let hit_b = hits.iter().find(|hit| hit.accession == "B").unwrap();
        assert_eq!(hit_a.protein_description, "Protein A");
        assert_eq!(hit_b.protein_description, "Protein B");

        // everything except accession and protein fields is shared
        assert_eq!(hit_a.peptide, hit_b.peptide);
        assert_eq!(hit_a.spectrum_id, hit_b.spectrum_id);
        assert_eq!(hit_a.score, hit_b.score);
        assert_eq!(hit_a.q_value, hit_b.q_value);

        // both accessions are queued for enrichment
        let mut pending = store.pending_accessions().unwrap();
        pending.sort();
        assert_eq!(pending, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_unknown_peptide_keeps_embedded_accession() {
        let store = SessionStore::new();
        let merger = ResultMerger::new(&store, &StaticLookup);
        let appended = merger.merge(vec![hit()]).unwrap();
        assert_eq!(appended, 1);
        assert_eq!(store.hits().unwrap()[0].accession, "A");
    }
}
