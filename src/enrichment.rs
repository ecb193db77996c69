use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fancy_regex::Regex;
use lazy_static::lazy_static;
use tracing::{debug, warn};

use crate::errors::{EnrichmentError, PipelineError};
use crate::hit::ProteinMetadata;
use crate::pipeline::scheduler::{TaskOutcome, TaskWork};
use crate::store::SessionStore;

lazy_static! {
    /// UniProt accession format, see https://www.uniprot.org/help/accession_numbers
    static ref UNIPROT_ACCESSION_REGEX: Regex = Regex::new(
        r"^(?:[A-NR-Z][0-9][A-Z][A-Z0-9]{2}[0-9]|[OPQ][0-9][A-Z0-9]{3}[0-9])(?:-\d+)?$"
    )
    .unwrap();
}

/// Whether the accession looks like a UniProt accession. Contaminant and
/// custom database entries are left unenriched.
///
pub fn is_uniprot_accession(accession: &str) -> bool {
    UNIPROT_ACCESSION_REGEX.is_match(accession).unwrap_or(false)
}

/// Collaborator fetching protein metadata from a remote service
///
pub trait MetadataProvider: Send + Sync + 'static {
    fn fetch(
        &self,
        accession: &str,
    ) -> impl Future<Output = Result<ProteinMetadata, EnrichmentError>> + Send;
}

/// Enrichment of one accession. Remote failures cancel the task with a
/// warning; the merged hits stay complete either way, metadata is additive.
///
pub struct EnrichmentWork<P>
where
    P: MetadataProvider,
{
    pub store: Arc<SessionStore>,
    pub provider: Arc<P>,
    pub accession: String,
}

impl<P> TaskWork for EnrichmentWork<P>
where
    P: MetadataProvider,
{
    async fn run(self, cancel: Arc<AtomicBool>) -> Result<TaskOutcome, PipelineError> {
        if cancel.load(Ordering::Relaxed) {
            return Ok(TaskOutcome::Canceled);
        }
        if !is_uniprot_accession(&self.accession) {
            debug!("Skipping non-UniProt accession `{}`", &self.accession);
            return Ok(TaskOutcome::Completed);
        }
        match self.provider.fetch(&self.accession).await {
            Ok(metadata) => {
                self.store.store_metadata(&self.accession, metadata)?;
                Ok(TaskOutcome::Completed)
            }
            Err(error) => {
                warn!(
                    "Metadata enrichment for `{}` failed, keeping hits unenriched: {}",
                    &self.accession, error
                );
                Ok(TaskOutcome::Canceled)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct StaticProvider {
        fail: bool,
    }

    impl MetadataProvider for StaticProvider {
        async fn fetch(&self, accession: &str) -> Result<ProteinMetadata, EnrichmentError> {
            if self.fail {
                return Err(EnrichmentError::ServiceUnavailable(
                    "connection refused".to_string(),
                ));
            }
            Ok(ProteinMetadata {
                description: format!("protein {}", accession),
                taxonomy_id: Some(9606),
                ec_numbers: vec![],
                keywords: vec!["Plasma".to_string()],
            })
        }
    }

    #[test]
    fn test_accession_format() {
        assert!(is_uniprot_accession("P12345"));
        assert!(is_uniprot_accession("Q9H0H5"));
        assert!(is_uniprot_accession("A0A024"));
        assert!(is_uniprot_accession("P12345-2"));
        assert!(!is_uniprot_accession("CONTAMINANT_1"));
        assert!(!is_uniprot_accession("DECOY_P12345"));
        assert!(!is_uniprot_accession(""));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetched_metadata_is_stored() {
        let store = Arc::new(SessionStore::new());
        store.queue_for_enrichment("P12345").unwrap();
        let work = EnrichmentWork {
            store: store.clone(),
            provider: Arc::new(StaticProvider { fail: false }),
            accession: "P12345".to_string(),
        };

        let outcome = work.run(Arc::new(AtomicBool::new(false))).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Completed);
        let metadata = store.metadata_for("P12345").unwrap().unwrap();
        assert_eq!(metadata.description, "protein P12345");
        assert!(store.pending_accessions().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remote_failure_cancels_without_losing_state() {
        let store = Arc::new(SessionStore::new());
        store.queue_for_enrichment("P12345").unwrap();
        let work = EnrichmentWork {
            store: store.clone(),
            provider: Arc::new(StaticProvider { fail: true }),
            accession: "P12345".to_string(),
        };

        let outcome = work.run(Arc::new(AtomicBool::new(false))).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Canceled);
        // the accession stays pending, nothing is lost
        assert_eq!(store.pending_accessions().unwrap(), vec!["P12345".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_non_uniprot_accession_is_skipped() {
        let store = Arc::new(SessionStore::new());
        store.queue_for_enrichment("CONTAMINANT_1").unwrap();
        let work = EnrichmentWork {
            store: store.clone(),
            provider: Arc::new(StaticProvider { fail: false }),
            accession: "CONTAMINANT_1".to_string(),
        };

        let outcome = work.run(Arc::new(AtomicBool::new(false))).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Completed);
        assert!(store.metadata_for("CONTAMINANT_1").unwrap().is_none());
    }
}
