use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use crate::errors::StoreError;
use crate::hit::{ProteinMetadata, SearchHit};

/// Shared state of one search session, explicitly constructed and injected
/// into every task. The only state shared across concurrent tasks; all
/// mutation follows insert-new/leave-existing semantics.
///
pub struct SessionStore {
    /// Peptide sequence to protein accessions, populated by the digestion
    /// collaborator and grown as new peptides are observed
    peptide_index: RwLock<HashMap<String, HashSet<String>>>,

    /// Accepted hits of the whole session, append only
    hits: Mutex<Vec<SearchHit>>,

    /// Accessions pending metadata enrichment. `None` marks a pending
    /// accession, `Some` an already enriched one which is never overwritten.
    enrichment: Mutex<HashMap<String, Option<ProteinMetadata>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            peptide_index: RwLock::new(HashMap::new()),
            hits: Mutex::new(Vec::new()),
            enrichment: Mutex::new(HashMap::new()),
        }
    }

    /// Clears the per-session results: hit list and enrichment state.
    /// Called once at session start. The peptide index is populated by the
    /// digestion collaborator and only ever grows, so it is left untouched.
    ///
    pub fn clear_results(&self) -> Result<(), StoreError> {
        self.hits.lock().map_err(|_| StoreError::Poisoned)?.clear();
        self.enrichment
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .clear();
        Ok(())
    }

    /// Adds accessions to the peptide's accession set. Existing accessions
    /// are left alone.
    ///
    pub fn register_peptide<I>(&self, peptide: &str, accessions: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut index = self
            .peptide_index
            .write()
            .map_err(|_| StoreError::Poisoned)?;
        index
            .entry(peptide.to_string())
            .or_default()
            .extend(accessions);
        Ok(())
    }

    /// All accessions known for the exact peptide sequence
    ///
    pub fn accessions_for(&self, peptide: &str) -> Result<HashSet<String>, StoreError> {
        let index = self
            .peptide_index
            .read()
            .map_err(|_| StoreError::Poisoned)?;
        Ok(index.get(peptide).cloned().unwrap_or_default())
    }

    /// Appends a batch of hits under a single lock acquisition, so a failed
    /// task never leaves a partial update behind
    ///
    pub fn append_hits(&self, batch: Vec<SearchHit>) -> Result<(), StoreError> {
        self.hits
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .extend(batch);
        Ok(())
    }

    pub fn hits(&self) -> Result<Vec<SearchHit>, StoreError> {
        Ok(self.hits.lock().map_err(|_| StoreError::Poisoned)?.clone())
    }

    pub fn hit_count(&self) -> Result<usize, StoreError> {
        Ok(self.hits.lock().map_err(|_| StoreError::Poisoned)?.len())
    }

    /// Registers an accession for metadata enrichment. Idempotent:
    /// re-registering an already enriched accession is a no-op.
    ///
    pub fn queue_for_enrichment(&self, accession: &str) -> Result<(), StoreError> {
        let mut enrichment = self.enrichment.lock().map_err(|_| StoreError::Poisoned)?;
        enrichment.entry(accession.to_string()).or_insert(None);
        Ok(())
    }

    /// Accessions still waiting for metadata
    ///
    pub fn pending_accessions(&self) -> Result<Vec<String>, StoreError> {
        let enrichment = self.enrichment.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(enrichment
            .iter()
            .filter_map(|(accession, metadata)| match metadata {
                None => Some(accession.clone()),
                Some(_) => None,
            })
            .collect())
    }

    /// Stores fetched metadata. Only fills pending slots, recorded
    /// enrichment is never overwritten.
    ///
    pub fn store_metadata(
        &self,
        accession: &str,
        metadata: ProteinMetadata,
    ) -> Result<(), StoreError> {
        let mut enrichment = self.enrichment.lock().map_err(|_| StoreError::Poisoned)?;
        match enrichment.get_mut(accession) {
            Some(slot) if slot.is_none() => *slot = Some(metadata),
            Some(_) => (),
            None => {
                enrichment.insert(accession.to_string(), Some(metadata));
            }
        }
        Ok(())
    }

    pub fn metadata_for(&self, accession: &str) -> Result<Option<ProteinMetadata>, StoreError> {
        let enrichment = self.enrichment.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(enrichment.get(accession).cloned().flatten())
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
