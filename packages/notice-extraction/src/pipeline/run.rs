//! Pipeline run orchestration.
//!
//! A run opens a ledger entry, validates its configuration, fans gazette and
//! filing documents out with bounded concurrency, classifies articles in
//! sequential batches, and closes the ledger entry exactly once. Only an
//! unreachable store or an unusable configuration fails a run; everything
//! else is counted per item.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Result, StoreError};
use crate::pipeline::cascade::{Cascade, ClassificationResult};
use crate::pipeline::filing::process_filing;
use crate::pipeline::fingerprint::{fingerprint, DedupVerdict, Deduplicator};
use crate::pipeline::gazette::process_gazette;
use crate::pipeline::patterns::fields;
use crate::pipeline::prefilter::should_process;
use crate::pipeline::quality::assess;
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::segment::Segmenter;
use crate::traits::oracle::{Oracle, OracleItem};
use crate::traits::store::{InsertOutcome, Storage};
use crate::types::{
    candidate::{CandidateSet, Confidence, ExtractionCandidate, ExtractionMethod},
    config::PipelineConfig,
    document::{Document, DocumentKind},
    record::{ArticleCategory, ClassifiedArticle, RecordBody, RecordDraft, RecordKind, RecordStatus},
    review::ReviewQueueItem,
    run::{IngestionRun, RunTally},
};

/// Characters of article body shown to the prefilter.
const PREFILTER_EXCERPT_CHARS: usize = 500;

/// Characters of article body sent for classification.
const CLASSIFY_EXCERPT_CHARS: usize = 4_000;

/// Longest title derived from an article's first line.
const DERIVED_TITLE_CHARS: usize = 200;

/// Runs the pipeline against a store and an oracle.
pub struct Pipeline<S, O> {
    store: S,
    oracle: O,
    config: PipelineConfig,
}

impl<S: Storage, O: Oracle> Pipeline<S, O> {
    pub fn new(store: S, oracle: O, config: PipelineConfig) -> Self {
        Self {
            store,
            oracle,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process a set of documents.
    pub async fn run(&self, documents: &[Document]) -> IngestionRun {
        run_pipeline(&self.store, &self.oracle, documents, &self.config).await
    }

    /// Review items not yet reviewed, most urgent first.
    pub async fn pending_reviews(&self) -> Result<Vec<ReviewQueueItem>> {
        Ok(self.store.pending_reviews().await?)
    }

    /// Close a review item. Reviewing twice keeps the first outcome.
    pub async fn mark_reviewed(&self, id: Uuid, note: Option<&str>) -> Result<ReviewQueueItem> {
        Ok(self.store.mark_reviewed(id, note).await?)
    }
}

/// Shared state for one run.
struct RunContext<'a, S: ?Sized> {
    store: &'a S,
    config: &'a PipelineConfig,
    dedup: Deduplicator,
    run_id: Uuid,
}

/// Process `documents` and return the finalized run.
///
/// Idempotent with respect to already-fingerprinted records: rerunning the
/// same documents creates no new records and no new review items.
#[instrument(skip_all, fields(documents = documents.len()))]
pub async fn run_pipeline<S, O>(
    store: &S,
    oracle: &O,
    documents: &[Document],
    config: &PipelineConfig,
) -> IngestionRun
where
    S: Storage + ?Sized,
    O: Oracle + ?Sized,
{
    let mut run = IngestionRun::start();
    info!(run_id = %run.id, oracle = oracle.name(), "Pipeline run started");

    if let Err(e) = store.start_run(&run).await {
        error!(run_id = %run.id, error = %e, "Run ledger unavailable");
        run.fail(PipelineError::from(e).to_string());
        return run;
    }

    match execute(store, oracle, documents, config, &mut run).await {
        Ok(()) => {
            run.complete();
        }
        Err(e) => {
            error!(run_id = %run.id, error = %e, "Pipeline run failed");
            run.fail(e.to_string());
        }
    }

    if let Err(e) = store.finish_run(&run).await {
        error!(run_id = %run.id, error = %e, "Failed to record run outcome");
        run.errors.push(format!("run ledger: {e}"));
    }

    info!(
        run_id = %run.id,
        status = ?run.status,
        fetched = run.fetched,
        new = run.new,
        duplicate = run.duplicate,
        failed = run.failed,
        skipped = run.skipped,
        flagged = run.flagged,
        oracle_tokens = run.oracle_tokens,
        "Pipeline run finished"
    );
    run
}

async fn execute<S, O>(
    store: &S,
    oracle: &O,
    documents: &[Document],
    config: &PipelineConfig,
    run: &mut IngestionRun,
) -> Result<()>
where
    S: Storage + ?Sized,
    O: Oracle + ?Sized,
{
    config.validate()?;
    let segmenter = Segmenter::new(&config.vocabulary)?;
    let cascade = Cascade::new(oracle, RetryPolicy::from_config(config), config.budget);
    let ctx = RunContext {
        store,
        config,
        dedup: Deduplicator::new(config.near_duplicate_threshold, config.recent_title_window),
        run_id: run.id,
    };

    let (articles, others): (Vec<&Document>, Vec<&Document>) = documents
        .iter()
        .partition(|d| d.kind == DocumentKind::Article);

    let mut fatal = None;
    let mut outcomes = stream::iter(
        others
            .into_iter()
            .map(|document| process_document(&ctx, &segmenter, &cascade, document)),
    )
    .buffer_unordered(config.document_concurrency);

    while let Some((tally, failure)) = outcomes.next().await {
        // Counts for records persisted before a fatal error still belong to the run
        run.absorb(tally);
        if let Some(e) = failure {
            fatal.get_or_insert(e);
        }
    }
    drop(outcomes);

    if let Some(e) = fatal {
        return Err(e);
    }

    process_articles(&ctx, &cascade, &articles, run).await
}

/// Gazette or filing document.
///
/// The tally is returned alongside a fatal error so that records already
/// persisted are still counted.
#[instrument(skip_all, fields(document = %document.id, kind = document.kind.as_str()))]
async fn process_document<S, O>(
    ctx: &RunContext<'_, S>,
    segmenter: &Segmenter,
    cascade: &Cascade<'_, O>,
    document: &Document,
) -> (RunTally, Option<PipelineError>)
where
    S: Storage + ?Sized,
    O: Oracle + ?Sized,
{
    let mut tally = RunTally::default();

    let drafts = match document.kind {
        DocumentKind::Gazette => {
            let outcome = process_gazette(document, segmenter, cascade, ctx.config).await;
            tally.oracle_tokens += outcome.oracle_tokens;
            tally.fetched += outcome.unusable;
            tally.skipped += outcome.unusable;
            outcome.drafts
        }
        DocumentKind::CaseFiling => match process_filing(document) {
            Some(draft) => vec![draft],
            None => {
                tally.fetched += 1;
                tally.record_failure(format!("{}: no case number found", document.id));
                Vec::new()
            }
        },
        DocumentKind::Article => Vec::new(),
    };

    for draft in drafts {
        tally.fetched += 1;
        if let Err(e) = persist(ctx, draft, &mut tally).await {
            return (tally, Some(e));
        }
    }

    debug!(new = tally.new, duplicate = tally.duplicate, "Document processed");
    (tally, None)
}

/// Prefilter, deduplicate and classify articles in sequential batches.
async fn process_articles<S, O>(
    ctx: &RunContext<'_, S>,
    cascade: &Cascade<'_, O>,
    articles: &[&Document],
    run: &mut IngestionRun,
) -> Result<()>
where
    S: Storage + ?Sized,
    O: Oracle + ?Sized,
{
    let mut tally = RunTally::default();
    let mut pending: Vec<(&Document, ClassifiedArticle)> = Vec::new();

    for &document in articles {
        tally.fetched += 1;
        let Some(article) = unclassified_article(document) else {
            tally.record_failure(format!("{}: article has no title", document.id));
            continue;
        };

        let decision = should_process(
            &article.title,
            document.excerpt(PREFILTER_EXCERPT_CHARS),
            ctx.config.exploration_rate,
        );
        if !decision.process {
            debug!(document = %document.id, "Article declined by prefilter");
            tally.skipped += 1;
            continue;
        }

        // Identity does not depend on classification, so duplicates are
        // dropped before any oracle tokens are spent
        let fp = fingerprint(&RecordBody::Article(article.clone()).natural_key());
        let verdict = match ctx.dedup.is_duplicate(ctx.store, &fp).await {
            Ok(true) => Ok(DedupVerdict::Exact),
            Ok(false) => ctx
                .dedup
                .near_duplicate(ctx.store, RecordKind::Article, &article.title)
                .await
                .map(|matched| match matched {
                    Some(matched) => DedupVerdict::NearDuplicate { matched },
                    None => DedupVerdict::Unique,
                }),
            Err(e) => Err(e),
        };
        match verdict {
            Ok(DedupVerdict::Unique) => pending.push((document, article)),
            Ok(verdict) => {
                debug!(document = %document.id, ?verdict, "Duplicate article skipped");
                tally.duplicate += 1;
            }
            Err(e) => {
                if let Err(fatal) = store_failure(e, &mut tally, &document.id) {
                    run.absorb(tally);
                    return Err(fatal);
                }
            }
        }
    }
    run.absorb(std::mem::take(&mut tally));

    let delay = Duration::from_millis(ctx.config.inter_batch_delay_ms);
    for (index, batch) in pending.chunks(ctx.config.classification_batch_size).enumerate() {
        if index > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let items: Vec<OracleItem> = batch
            .iter()
            .map(|(document, article)| {
                OracleItem::new(
                    &document.id,
                    format!("{}\n\n{}", article.title, document.excerpt(CLASSIFY_EXCERPT_CHARS)),
                )
            })
            .collect();

        let classified = cascade.classify(&items).await;
        tally.oracle_tokens += classified.tokens;
        info!(
            batch = index + 1,
            articles = items.len(),
            degraded = classified.results.iter().filter(|r| r.degraded).count(),
            tokens = classified.tokens,
            "Articles classified"
        );

        for ((document, article), result) in batch.iter().zip(classified.results) {
            let draft = article_draft(document, article.clone(), result);
            if let Err(e) = persist(ctx, draft, &mut tally).await {
                run.absorb(std::mem::take(&mut tally));
                return Err(e);
            }
        }
        run.absorb(std::mem::take(&mut tally));
    }

    Ok(())
}

/// Article body with identity fields set and classification pending.
fn unclassified_article(document: &Document) -> Option<ClassifiedArticle> {
    let title = match document.title.as_deref().map(str::trim) {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => document
            .text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())?
            .chars()
            .take(DERIVED_TITLE_CHARS)
            .collect(),
    };

    Some(ClassifiedArticle {
        title,
        url: document.source_url.clone(),
        published_at: document.published_at,
        relevant: false,
        category: ArticleCategory::Other,
        summary: None,
        risk_signals: Vec::new(),
        entities: Vec::new(),
    })
}

fn article_draft(
    document: &Document,
    mut article: ClassifiedArticle,
    result: ClassificationResult,
) -> RecordDraft {
    let method = if result.degraded {
        ExtractionMethod::Heuristic
    } else {
        ExtractionMethod::Oracle
    };
    let candidate = |field: &str, value: &str, confidence: Confidence, method: ExtractionMethod| {
        ExtractionCandidate {
            field: field.to_string(),
            value: value.to_string(),
            confidence,
            method,
            span: value.to_string(),
            offset: 0,
        }
    };

    let mut candidates = CandidateSet::new();
    candidates.push(candidate(fields::TITLE, &article.title, Confidence::High, ExtractionMethod::Heuristic));
    if let Some(summary) = &result.summary {
        candidates.push(candidate(fields::SUMMARY, summary, result.confidence, method));
    }
    candidates.push(candidate(
        fields::CATEGORY,
        result.category.as_str(),
        result.confidence,
        method,
    ));

    article.relevant = result.relevant;
    article.category = result.category;
    article.summary = result.summary;
    article.risk_signals = result.risk_signals;
    article.entities = result.entities;

    let status = if result.degraded {
        RecordStatus::Degraded
    } else {
        RecordStatus::Classified
    };
    RecordDraft::new(RecordBody::Article(article), candidates, status, &document.id)
        .with_oracle_tokens(result.tokens)
}

/// Score, deduplicate, insert and route one draft.
///
/// Only an unreachable store is returned as an error.
async fn persist<S: Storage + ?Sized>(
    ctx: &RunContext<'_, S>,
    draft: RecordDraft,
    tally: &mut RunTally,
) -> Result<()> {
    let assessment = assess(
        &draft.candidates,
        draft.body.kind(),
        draft.body.high_risk_signal(),
        ctx.config,
    );
    let record = draft
        .into_record(ctx.run_id)
        .with_quality(assessment.score, assessment.requires_review);

    match ctx.dedup.check(ctx.store, &record).await {
        Ok(DedupVerdict::Unique) => {}
        Ok(verdict) => {
            debug!(fingerprint = %record.fingerprint, ?verdict, "Duplicate record skipped");
            tally.duplicate += 1;
            return Ok(());
        }
        Err(e) => return store_failure(e, tally, &record.provenance.document_id),
    }

    match ctx.store.insert_record(&record).await {
        Ok(InsertOutcome::Inserted) => tally.new += 1,
        Ok(InsertOutcome::Duplicate) => {
            // Lost a race with a concurrent insert of the same record
            debug!(fingerprint = %record.fingerprint, "Uniqueness collision counted as duplicate");
            tally.duplicate += 1;
            ctx.dedup.register_record(&record).await;
            return Ok(());
        }
        Err(e) => return store_failure(e, tally, &record.provenance.document_id),
    }
    ctx.dedup.register_record(&record).await;

    if let Some(priority) = assessment.priority {
        let item = ReviewQueueItem::new(record.id, assessment.reason_text(), priority);
        match ctx.store.enqueue(&item).await {
            Ok(()) => tally.flagged += 1,
            Err(StoreError::Unavailable(reason)) => {
                return Err(StoreError::Unavailable(reason).into());
            }
            Err(e) => {
                warn!(record_id = %record.id, error = %e, "Failed to enqueue review");
                tally.errors.push(format!("review for {}: {e}", record.id));
            }
        }
    }

    Ok(())
}

/// Unreachable storage is fatal; any other storage error fails the item.
fn store_failure(e: StoreError, tally: &mut RunTally, item: &str) -> Result<()> {
    match e {
        StoreError::Unavailable(_) => Err(e.into()),
        other => {
            warn!(item = %item, error = %other, "Storage error, item failed");
            tally.record_failure(format!("{item}: {other}"));
            Ok(())
        }
    }
}
