use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{DecoyFreePolicy, SearchConfiguration};
use crate::constants::WORKER_POLL_INTERVAL_MS;
use crate::engine::SearchEngine;
use crate::enrichment::{EnrichmentWork, MetadataProvider};
use crate::errors::PipelineError;
use crate::merge::{ResultMerger, SequenceLookup};
use crate::pipeline::jobs::{job_for, JobContext};
use crate::pipeline::scheduler::{next_status_event, TaskOutcome, TaskScheduler, TaskWork};
use crate::pipeline::stage::{run_job, EngineJob, JobRun};
use crate::scoring::extractor::{ColumnMap, ColumnarExtractor, ScoreExtractor};
use crate::scoring::target_decoy::TargetDecoyAnalyzer;
use crate::scoring::xtandem::{TandemDocumentReader, XTandemScoreExtractor};
use crate::store::SessionStore;

/// Extractor matching the engine's output format
///
fn extractor_for(job: &EngineJob) -> Box<dyn ScoreExtractor + Send> {
    let spectrum_file = job
        .spectrum_file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    match job.engine {
        SearchEngine::XTandem => Box::new(XTandemScoreExtractor::new(
            spectrum_file,
            TandemDocumentReader::new(job.result_path.clone()),
            job.decoy_result_path
                .clone()
                .map(TandemDocumentReader::new),
        )),
        SearchEngine::Crux => Box::new(ColumnarExtractor::with_native_q_values(
            job.engine,
            spectrum_file,
            job.result_path.clone(),
            ColumnMap::crux_percolator(),
        )),
        SearchEngine::Comet | SearchEngine::MsGf => Box::new(ColumnarExtractor::new(
            job.engine,
            spectrum_file,
            job.result_path.clone(),
            job.decoy_result_path.clone(),
            ColumnMap::for_engine(job.engine),
            None,
        )),
    }
}

/// One engine search on one spectrum file: run the job, extract scores and
/// hits, gate them at the session FDR threshold and merge the survivors into
/// the shared store
///
pub struct SearchWork<L>
where
    L: SequenceLookup + Send + Sync + 'static,
{
    pub job: EngineJob,
    pub fdr_threshold: f64,
    pub decoy_free_policy: DecoyFreePolicy,
    pub store: Arc<SessionStore>,
    pub lookup: Arc<L>,
}

impl<L> TaskWork for SearchWork<L>
where
    L: SequenceLookup + Send + Sync + 'static,
{
    async fn run(self, cancel: Arc<AtomicBool>) -> Result<TaskOutcome, PipelineError> {
        if run_job(&self.job, &cancel).await? == JobRun::Canceled {
            return Ok(TaskOutcome::Canceled);
        }
        if cancel.load(Ordering::Relaxed) {
            return Ok(TaskOutcome::Canceled);
        }

        let mut extractor = extractor_for(&self.job);
        extractor.load()?;
        let extraction = if self.job.decoy_result_path.is_some() {
            extractor.extract()?
        } else {
            extractor.extract_target_only()?
        };
        if extraction.skipped_rows > 0 {
            warn!(
                "{} malformed rows skipped in `{}` output for `{}`",
                extraction.skipped_rows,
                self.job.engine,
                self.job.spectrum_file.display()
            );
        }

        let mut hits = extraction.hits;
        if self.job.engine.has_native_q_values() {
            // q-values come from the engine's own re-ranking
            hits.retain(|hit| hit.q_value < self.fdr_threshold);
        } else {
            let analyzer = TargetDecoyAnalyzer::new(&extraction.scores, self.decoy_free_policy);
            analyzer.assign_and_filter(&mut hits, self.fdr_threshold);
        }

        let merged = ResultMerger::new(&self.store, self.lookup.as_ref()).merge(hits)?;
        metrics::counter!("multisearch_accepted_hits").increment(merged as u64);
        info!(
            "{} accepted {} hits for `{}`",
            self.job.engine,
            merged,
            self.job.spectrum_file.display()
        );
        Ok(TaskOutcome::Completed)
    }
}

/// Session summary returned to the caller
///
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub submitted_tasks: usize,
    pub accepted_hits: usize,
    pub pending_enrichments: usize,
    pub canceled: bool,
}

/// One multi-engine search session. Fans one task per enabled engine and
/// spectrum file out to the scheduler, merges accepted hits into the shared
/// store and enriches protein metadata afterwards when a provider is
/// available.
///
pub struct SearchSession<L, P>
where
    L: SequenceLookup + Send + Sync + 'static,
    P: MetadataProvider,
{
    config: SearchConfiguration,
    store: Arc<SessionStore>,
    lookup: Arc<L>,
    provider: Option<Arc<P>>,
    cancel: Arc<AtomicBool>,
}

impl<L, P> SearchSession<L, P>
where
    L: SequenceLookup + Send + Sync + 'static,
    P: MetadataProvider,
{
    pub fn new(
        config: SearchConfiguration,
        store: Arc<SessionStore>,
        lookup: Arc<L>,
        provider: Option<Arc<P>>,
    ) -> Self {
        Self {
            config,
            store,
            lookup,
            provider,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag observed by all running tasks, for wiring up signal handlers
    ///
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Runs the whole session: search tasks for every enabled engine and
    /// spectrum file, then metadata enrichment for all touched accessions
    ///
    pub async fn run(
        &self,
        spectrum_files: &[PathBuf],
        target_database: PathBuf,
        decoy_database: Option<PathBuf>,
        work_dir: &Path,
    ) -> Result<SessionSummary, PipelineError> {
        self.config.validate()?;
        self.store.clear_results()?;

        let session_id = Uuid::new_v4();
        let context = JobContext {
            work_dir: work_dir.join(session_id.to_string()),
            target_database,
            decoy_database,
        };
        let engines = self.config.enabled_engines();
        for engine in &engines {
            tokio::fs::create_dir_all(context.work_dir.join(engine.tag())).await?;
        }
        info!(
            "Session {} searching {} spectrum files with {} engines",
            session_id,
            spectrum_files.len(),
            engines.len()
        );

        let scheduler: TaskScheduler<SearchWork<L>> =
            TaskScheduler::new(self.config.num_workers);
        let log_task = Self::spawn_event_logger(&scheduler);

        let mut handles = Vec::with_capacity(engines.len() * spectrum_files.len());
        for spectrum_file in spectrum_files {
            for engine in &engines {
                let job = job_for(*engine, &self.config, &context, spectrum_file);
                let description =
                    format!("{} search of {}", engine, spectrum_file.display());
                let work = SearchWork {
                    job,
                    fdr_threshold: self.config.fdr_threshold,
                    decoy_free_policy: self.config.decoy_free_policy,
                    store: self.store.clone(),
                    lookup: self.lookup.clone(),
                };
                handles.push(scheduler.submit(description, work).await);
            }
        }
        let submitted_tasks = handles.len();

        let session_cancel = self.cancel.clone();
        let monitor = tokio::spawn(async move {
            loop {
                if session_cancel.load(Ordering::Relaxed) {
                    for handle in &handles {
                        handle.cancel();
                    }
                    break;
                }
                tokio::time::sleep(tokio::time::Duration::from_millis(
                    WORKER_POLL_INTERVAL_MS,
                ))
                .await;
            }
        });

        scheduler.shutdown().await?;
        monitor.abort();
        log_task.await.ok();

        if !self.cancel.load(Ordering::Relaxed) {
            if let Some(provider) = &self.provider {
                self.enrich(provider.clone()).await?;
            }
        }

        Ok(SessionSummary {
            session_id,
            submitted_tasks,
            accepted_hits: self.store.hit_count()?,
            pending_enrichments: self.store.pending_accessions()?.len(),
            canceled: self.cancel.load(Ordering::Relaxed),
        })
    }

    /// Enrichment phase, one task per pending accession
    ///
    async fn enrich(&self, provider: Arc<P>) -> Result<(), PipelineError> {
        let pending = self.store.pending_accessions()?;
        if pending.is_empty() {
            return Ok(());
        }
        info!("Enriching metadata for {} accessions", pending.len());
        let scheduler: TaskScheduler<EnrichmentWork<P>> =
            TaskScheduler::new(self.config.num_workers);
        let log_task = Self::spawn_event_logger(&scheduler);
        for accession in pending {
            let work = EnrichmentWork {
                store: self.store.clone(),
                provider: provider.clone(),
                accession: accession.clone(),
            };
            scheduler
                .submit(format!("enrichment of {}", accession), work)
                .await;
        }
        scheduler.shutdown().await?;
        log_task.await.ok();
        Ok(())
    }

    fn spawn_event_logger<W>(scheduler: &TaskScheduler<W>) -> tokio::task::JoinHandle<()>
    where
        W: TaskWork,
    {
        let mut events = scheduler.subscribe();
        tokio::spawn(async move {
            while let Some(event) = next_status_event(&mut events).await {
                info!("[{}] {}", event.status, &event.description);
            }
        })
    }

    /// Writes the merged hits as a tab-delimited report
    ///
    pub fn write_report(&self, path: &Path) -> Result<(), PipelineError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)
            .map_err(csv_io_error)?;
        writer
            .write_record([
                "spectrum_file",
                "spectrum_id",
                "spectrum_title",
                "charge",
                "exp_neutral_mass",
                "calc_neutral_mass",
                "engine",
                "score",
                "q_value",
                "peptide",
                "accession",
                "protein_description",
            ])
            .map_err(csv_io_error)?;
        for hit in self.store.hits()? {
            writer
                .write_record([
                    hit.spectrum_file.as_str(),
                    hit.spectrum_id.as_str(),
                    hit.spectrum_title.as_str(),
                    &hit.charge.to_string(),
                    &hit.exp_neutral_mass.to_string(),
                    &hit.calc_neutral_mass.to_string(),
                    &hit.engine.to_string(),
                    &hit.score.to_string(),
                    &hit.q_value.to_string(),
                    hit.peptide.as_str(),
                    hit.accession.as_str(),
                    hit.protein_description.as_str(),
                ])
                .map_err(csv_io_error)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn csv_io_error(error: csv::Error) -> PipelineError {
    PipelineError::Io(std::io::Error::other(error))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::merge::ProteinEntry;

    struct StaticLookup;

    impl SequenceLookup for StaticLookup {
        fn protein(&self, accession: &str) -> Option<ProteinEntry> {
            match accession {
                "P12345" => Some(ProteinEntry {
                    sequence: "MKWVTFISLL".to_string(),
                    description: "Serum albumin".to_string(),
                }),
                _ => None,
            }
        }
    }

    /// Job with no stages, pointing straight at prepared result fixtures
    fn fixture_job(decoy: bool) -> EngineJob {
        EngineJob {
            engine: SearchEngine::Comet,
            spectrum_file: PathBuf::from("run01.mgf"),
            setup_files: vec![],
            stages: vec![],
            result_path: PathBuf::from("./test_files/comet_target.tsv"),
            decoy_result_path: decoy
                .then(|| PathBuf::from("./test_files/comet_decoy.tsv")),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_search_work_gates_and_merges() {
        // target e-values 1e-5 and 0.5, decoy e-values 0.2 and 0.8: only the
        // top target survives a 5% FDR threshold
        let store = Arc::new(SessionStore::new());
        let work = SearchWork {
            job: fixture_job(true),
            fdr_threshold: 0.05,
            decoy_free_policy: DecoyFreePolicy::AcceptAll,
            store: store.clone(),
            lookup: Arc::new(StaticLookup),
        };

        let outcome = work.run(Arc::new(AtomicBool::new(false))).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Completed);

        let hits = store.hits().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].peptide, "PEPTIDEK");
        assert_eq!(hits[0].accession, "P12345");
        assert_eq!(hits[0].protein_description, "Serum albumin");
        assert_eq!(hits[0].q_value, 0.0);
        assert_eq!(
            store.pending_accessions().unwrap(),
            vec!["P12345".to_string()]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_search_work_decoy_free_accept_all() {
        let store = Arc::new(SessionStore::new());
        let work = SearchWork {
            job: fixture_job(false),
            fdr_threshold: 0.05,
            decoy_free_policy: DecoyFreePolicy::AcceptAll,
            store: store.clone(),
            lookup: Arc::new(StaticLookup),
        };

        let outcome = work.run(Arc::new(AtomicBool::new(false))).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Completed);
        // without decoys and with the accept-all policy both hits survive
        assert_eq!(store.hit_count().unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_search_work_expands_indexed_peptides() {
        // a peptide the digestion collaborator mapped to two proteins yields
        // one hit per accession
        let store = Arc::new(SessionStore::new());
        store
            .register_peptide(
                "PEPTIDEK",
                vec!["P12345".to_string(), "Q99999".to_string()],
            )
            .unwrap();
        let work = SearchWork {
            job: fixture_job(true),
            fdr_threshold: 0.05,
            decoy_free_policy: DecoyFreePolicy::AcceptAll,
            store: store.clone(),
            lookup: Arc::new(StaticLookup),
        };

        let outcome = work.run(Arc::new(AtomicBool::new(false))).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Completed);

        let hits = store.hits().unwrap();
        assert_eq!(hits.len(), 2);
        let mut accessions: Vec<&str> =
            hits.iter().map(|hit| hit.accession.as_str()).collect();
        accessions.sort();
        assert_eq!(accessions, vec!["P12345", "Q99999"]);
    }

    struct UnreachableProvider;

    impl crate::enrichment::MetadataProvider for UnreachableProvider {
        async fn fetch(
            &self,
            _accession: &str,
        ) -> Result<crate::hit::ProteinMetadata, crate::errors::EnrichmentError> {
            Err(crate::errors::EnrichmentError::ServiceUnavailable(
                "not configured".to_string(),
            ))
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_session_run_preserves_collaborator_index() {
        let store = Arc::new(SessionStore::new());
        store
            .register_peptide("PEPTIDEK", vec!["A".to_string(), "B".to_string()])
            .unwrap();

        let mut config = crate::config::SearchConfiguration::new();
        config.num_workers = 1;
        let session = SearchSession::new(
            config,
            store.clone(),
            Arc::new(StaticLookup),
            None::<Arc<UnreachableProvider>>,
        );

        let work_dir = std::env::temp_dir().join(format!(
            "multisearch_session_{}",
            uuid::Uuid::new_v4()
        ));
        // the spectrum file does not exist, so the task fails at its input
        // precondition, and the session still completes
        let summary = session
            .run(
                &[PathBuf::from("/does/not/exist.mgf")],
                PathBuf::from("/does/not/exist.fasta"),
                None,
                &work_dir,
            )
            .await
            .unwrap();

        assert_eq!(summary.submitted_tasks, 1);
        assert_eq!(summary.accepted_hits, 0);
        // the digestion collaborator's index survives the session
        let accessions = store.accessions_for("PEPTIDEK").unwrap();
        assert_eq!(accessions.len(), 2);

        std::fs::remove_dir_all(&work_dir).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_search_work_canceled_before_extraction() {
        let store = Arc::new(SessionStore::new());
        let work = SearchWork {
            job: fixture_job(true),
            fdr_threshold: 0.05,
            decoy_free_policy: DecoyFreePolicy::AcceptAll,
            store: store.clone(),
            lookup: Arc::new(StaticLookup),
        };

        let outcome = work.run(Arc::new(AtomicBool::new(true))).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Canceled);
        assert_eq!(store.hit_count().unwrap(), 0);
    }
}
