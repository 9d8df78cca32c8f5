//! Integration tests for full pipeline runs.
//!
//! These tests drive `Pipeline` end to end with an in-memory store and the
//! mock oracle:
//! 1. Gazette segmentation, extraction and cross-referencing
//! 2. Idempotent reruns
//! 3. Article classification with and without a working oracle
//! 4. Fatal configuration and storage failures
//! 5. Store faults mid-run and uniqueness collisions

use chrono::NaiveDate;
use notice_extraction::{
    testing::{FailingStore, FlakyStore, MockOracle},
    Document, DocumentKind, IngestionRun, LiquidationType, MemoryStore, OracleError, Pipeline,
    PipelineConfig, RecordBody, RecordStatus, ReviewPriority, RunLedger, RunStatus,
    SectionVocabulary,
};

const GAZETTE: &str = "GAZETTE ISSUE 7/2024\n\
    CONTENTS\n\
    Liquidation Notices ....... 12\n\
    Final Meeting Notices ..... 15\n\
    \n\
    Published by authority. Notices for the next issue must reach the editor by noon on the Wednesday before publication. \
    Notices received after that time will be held over to the following issue. Fees are payable in advance of publication \
    and are set out in the schedule of charges.\n\
    \n\
    COMMERCIAL\n\
    LIQUIDATION NOTICES\n\
    ALPHA HOLDINGS LIMITED\n\
    (In Voluntary Liquidation)\n\
    NOTICE IS HEREBY GIVEN that the following special resolution was passed by the sole shareholder of the Company on 5th March 2024: that the Company be wound up voluntarily.\n\
    Creditors are required to prove their debts before 12th April 2024.\n\
    Voluntary Liquidator: John Smith\n\
    \n\
    FINAL MEETING NOTICES\n\
    ALPHA HOLDINGS LIMITED\n\
    (In Voluntary Liquidation)\n\
    NOTICE IS HEREBY GIVEN that the final general meeting of the Company will be held on 20 June 2024.\n\
    \n\
    DORMANT ACCOUNTS NOTICES\n\
    Unclaimed balances are listed below.\n\
    GOVERNMENT\n\
    Appointments and other notices.\n";

const FILING: &str = "IN THE GRAND COURT OF THE CAYMAN ISLANDS\n\
    Cause No: FSD 0456 of 2024\n\
    Date of filing: 2nd April 2024\n\
    Title: Omega Fund Ltd v Sigma Holdings Inc\n\
    Nature of claim: Breach of contract\n\
    Amount claimed: US$250,000\n";

/// Config with no pauses between oracle calls.
fn fast_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_retries(0, 1)
        .with_inter_batch_delay_ms(0)
}

fn pipeline(oracle: MockOracle) -> Pipeline<MemoryStore, MockOracle> {
    Pipeline::new(MemoryStore::new(), oracle, fast_config())
}

fn article(id: &str, title: &str, text: &str) -> Document {
    Document::new(id, DocumentKind::Article, text).with_title(title)
}

fn assert_finalized(run: &IngestionRun, status: RunStatus) {
    assert_eq!(run.status, status, "errors: {:?}", run.errors);
    assert!(run.finished_at.is_some());
    assert!(run.counts_consistent());
}

#[tokio::test]
async fn test_gazette_run_produces_merged_notice() {
    let pipeline = pipeline(MockOracle::new());
    let gazette = Document::new("gazette-7", DocumentKind::Gazette, GAZETTE);

    let run = pipeline.run(&[gazette]).await;
    assert_finalized(&run, RunStatus::Completed);
    assert_eq!(run.fetched, 1);
    assert_eq!(run.new, 1);
    assert_eq!(run.flagged, 0);
    assert_eq!(pipeline.oracle().call_count(), 0);

    let records = pipeline.store().records().unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.status, RecordStatus::Extracted);
    assert_eq!(record.quality_score, 100);
    assert!(!record.requires_review);
    assert_eq!(record.provenance.document_id, "gazette-7");
    assert_eq!(record.provenance.run_id, run.id);

    let RecordBody::GazetteNotice(notice) = &record.body else {
        panic!("expected a gazette notice, got {:?}", record.body);
    };
    assert_eq!(notice.company_name, "ALPHA HOLDINGS LIMITED");
    assert_eq!(notice.liquidation_type, Some(LiquidationType::Voluntary));
    assert_eq!(notice.liquidators, vec!["John Smith"]);
    assert_eq!(notice.resolution_date, NaiveDate::from_ymd_opt(2024, 3, 5));
    assert_eq!(notice.claims_deadline, NaiveDate::from_ymd_opt(2024, 4, 12));
    assert_eq!(notice.final_meeting_date, NaiveDate::from_ymd_opt(2024, 6, 20));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let pipeline = pipeline(MockOracle::new());
    let documents = vec![
        Document::new("gazette-7", DocumentKind::Gazette, GAZETTE),
        Document::new("filing-456", DocumentKind::CaseFiling, FILING),
        article(
            "news-1",
            "Fund enters voluntary liquidation",
            "Liquidators were appointed to the fund on Monday. Creditors have been notified.",
        ),
    ];

    let first = pipeline.run(&documents).await;
    assert_finalized(&first, RunStatus::Completed);
    assert_eq!(first.new, 3);
    let reviews_after_first = pipeline.store().review_count().unwrap();

    let second = pipeline.run(&documents).await;
    assert_finalized(&second, RunStatus::Completed);
    assert_eq!(second.new, 0);
    assert_eq!(second.duplicate, 3);
    assert_eq!(second.flagged, 0);
    assert_eq!(pipeline.store().records().unwrap().len(), 3);
    assert_eq!(pipeline.store().review_count().unwrap(), reviews_after_first);

    // Duplicate articles are dropped before classification
    assert_eq!(pipeline.oracle().call_count(), 1);
}

#[tokio::test]
async fn test_classified_articles_carry_oracle_output() {
    let pipeline = pipeline(MockOracle::new().with_tokens_per_call(300));
    let documents = vec![
        article("news-1", "Court hears winding up petition", "A petition was heard today."),
        article("news-2", "Regulator fines administrator", "The monetary authority acted."),
        article("news-3", "Creditors vote on restructuring", "A scheme was approved."),
    ];

    let run = pipeline.run(&documents).await;
    assert_finalized(&run, RunStatus::Completed);
    assert_eq!(run.new, 3);
    assert_eq!(run.oracle_tokens, 300);

    let calls = pipeline.oracle().calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].item_count, 3);

    for record in pipeline.store().records().unwrap() {
        assert_eq!(record.status, RecordStatus::Classified);
        assert_eq!(record.provenance.oracle_tokens, 100);
        let RecordBody::Article(article) = &record.body else {
            panic!("expected an article");
        };
        assert!(article.relevant);
        assert!(article.summary.as_deref().unwrap().starts_with("Mock summary"));
    }
}

#[tokio::test]
async fn test_oracle_outage_degrades_articles() {
    let oracle = MockOracle::new().with_errors(OracleError::Rejected("401 unauthorized".into()), 10);
    let pipeline = pipeline(oracle);
    let documents = vec![article(
        "news-1",
        "Fund enters voluntary liquidation",
        "Liquidators were appointed to the fund on Monday. Creditors have been notified.",
    )];

    let run = pipeline.run(&documents).await;
    assert_finalized(&run, RunStatus::Completed);
    assert_eq!(run.new, 1);
    assert_eq!(run.flagged, 1);
    assert_eq!(run.oracle_tokens, 0);
    assert_eq!(pipeline.oracle().call_count(), 1);

    let records = pipeline.store().records().unwrap();
    let record = &records[0];
    assert_eq!(record.status, RecordStatus::Degraded);
    assert!(record.requires_review);
    let RecordBody::Article(article) = &record.body else {
        panic!("expected an article");
    };
    let summary = article.summary.as_deref().unwrap();
    assert!(summary.ends_with("appointed to the fund on Monday."), "{summary}");
    assert!(!article.risk_signals.is_empty());

    let pending = pipeline.pending_reviews().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].record_id, record.id);
    assert_eq!(pending[0].priority, ReviewPriority::Medium);

    let reviewed = pipeline
        .mark_reviewed(pending[0].id, Some("checked against source"))
        .await
        .unwrap();
    assert!(reviewed.reviewed);
    assert!(pipeline.pending_reviews().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_prefilter_skips_unrelated_articles() {
    let config = fast_config().with_exploration_rate(0.0);
    let pipeline = Pipeline::new(MemoryStore::new(), MockOracle::new(), config);
    let documents = vec![article(
        "news-1",
        "Local bakery wins award",
        "The bakery on Main Street was recognised for its bread.",
    )];

    let run = pipeline.run(&documents).await;
    assert_finalized(&run, RunStatus::Completed);
    assert_eq!(run.fetched, 1);
    assert_eq!(run.skipped, 1);
    assert_eq!(run.new, 0);
    assert_eq!(pipeline.oracle().call_count(), 0);
}

#[tokio::test]
async fn test_filing_without_case_number_is_counted_failed() {
    let pipeline = pipeline(MockOracle::new());
    let documents = vec![
        Document::new("filing-456", DocumentKind::CaseFiling, FILING),
        Document::new("filing-bad", DocumentKind::CaseFiling, "Title: Unnumbered v Nobody"),
    ];

    let run = pipeline.run(&documents).await;
    assert_finalized(&run, RunStatus::Completed);
    assert_eq!(run.fetched, 2);
    assert_eq!(run.new, 1);
    assert_eq!(run.failed, 1);
    assert!(run.errors[0].contains("filing-bad"));
}

#[tokio::test]
async fn test_empty_vocabulary_fails_run() {
    let config = fast_config().with_vocabulary(SectionVocabulary::new(vec![], vec![]));
    let pipeline = Pipeline::new(MemoryStore::new(), MockOracle::new(), config);

    let run = pipeline
        .run(&[Document::new("gazette-7", DocumentKind::Gazette, GAZETTE)])
        .await;
    assert_finalized(&run, RunStatus::Failed);
    assert_eq!(run.new, 0);
    assert!(run.errors.iter().any(|e| e.contains("config error")));

    // The ledger holds the finalized run
    let stored = pipeline.store().get_run(run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
    assert!(pipeline.store().records().unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_store_fails_run() {
    let pipeline = Pipeline::new(FailingStore::new(), MockOracle::new(), fast_config());

    let run = pipeline
        .run(&[Document::new("filing-456", DocumentKind::CaseFiling, FILING)])
        .await;
    assert_finalized(&run, RunStatus::Failed);
    assert!(run.errors.iter().any(|e| e.contains("storage unavailable")));

    let stored = pipeline.store().get_run(run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
}

const DELTA_GAZETTE: &str = "LIQUIDATION NOTICES\n\
    DELTA FUND LTD\n\
    (In Voluntary Liquidation)\n\
    Creditors should contact the liquidator.\n";

#[tokio::test]
async fn test_rerun_after_enrichment_outage_is_idempotent() {
    let oracle = MockOracle::new()
        .with_response(r#"[{"liquidator_names": ["Mary Major"], "resolution_date": "2024-02-01"}]"#)
        .with_errors(OracleError::Transient("503 service unavailable".into()), 10);
    let config = fast_config().with_oracle_enrichment(true);
    let pipeline = Pipeline::new(MemoryStore::new(), oracle, config);
    let documents = vec![Document::new("gazette-delta", DocumentKind::Gazette, DELTA_GAZETTE)];

    let first = pipeline.run(&documents).await;
    assert_finalized(&first, RunStatus::Completed);
    assert_eq!(first.new, 1);

    let records = pipeline.store().records().unwrap();
    let RecordBody::GazetteNotice(notice) = &records[0].body else {
        panic!("expected a gazette notice");
    };
    assert_eq!(notice.resolution_date, NaiveDate::from_ymd_opt(2024, 2, 1));

    // The oracle is down on the second run
    let second = pipeline.run(&documents).await;
    assert_finalized(&second, RunStatus::Completed);
    assert_eq!(second.new, 0);
    assert_eq!(second.duplicate, 1);
    assert_eq!(pipeline.store().records().unwrap().len(), 1);
}

#[tokio::test]
async fn test_store_outage_mid_document_keeps_counts() {
    let gazette = GAZETTE.replace(
        "\nFINAL MEETING NOTICES\n",
        "\nBETA CAPITAL LTD\n(In Official Liquidation)\n\
         Official Liquidators: Jane Doe and Peter Brown\n\nFINAL MEETING NOTICES\n",
    );
    let store = FlakyStore::new().failing_after_inserts(1);
    let pipeline = Pipeline::new(store, MockOracle::new(), fast_config());

    let run = pipeline
        .run(&[Document::new("gazette-7", DocumentKind::Gazette, gazette)])
        .await;
    assert_finalized(&run, RunStatus::Failed);
    assert!(run.errors.iter().any(|e| e.contains("storage unavailable")));

    let persisted = pipeline.store().inner().records().unwrap().len();
    assert_eq!(persisted, 1);
    assert_eq!(run.new, persisted);
    assert_eq!(run.fetched, 2);

    let stored = pipeline.store().get_run(run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
    assert_eq!(stored.new, 1);
}

#[tokio::test]
async fn test_uniqueness_collision_counts_as_duplicate() {
    // Existence checks miss, so the second insert collides in the store
    let pipeline = Pipeline::new(FlakyStore::new().hiding_existing(), MockOracle::new(), fast_config());
    let documents = vec![Document::new("filing-456", DocumentKind::CaseFiling, FILING)];

    let first = pipeline.run(&documents).await;
    assert_finalized(&first, RunStatus::Completed);
    assert_eq!(first.new, 1);
    let reviews_after_first = pipeline.store().inner().review_count().unwrap();

    let second = pipeline.run(&documents).await;
    assert_finalized(&second, RunStatus::Completed);
    assert_eq!(second.new, 0);
    assert_eq!(second.duplicate, 1);
    assert_eq!(second.failed, 0);
    assert_eq!(second.flagged, 0);
    assert!(second.errors.is_empty());
    assert_eq!(pipeline.store().inner().records().unwrap().len(), 1);
    assert_eq!(pipeline.store().inner().review_count().unwrap(), reviews_after_first);
}
