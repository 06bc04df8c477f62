//! The full learner flow against an on-disk SQLite file, then reopened.

mod common;

use common::*;
use cyber_tutor::{DocPath, DocumentStore, Rank, SqliteStore};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn progress_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("tutor.db");

    {
        let store = Arc::new(SqliteStore::open(&db).unwrap());
        let (progression, profiles) = setup_with(store, "u1").await;

        let mut s = progression.start_quiz("u1", "c2", &mut rng()).await.unwrap();
        let fail = progression.submit(&mut s, &answers(&[("q1", "a")])).await.unwrap();
        assert!(!fail.evaluation.passed);

        let mut s = progression.start_quiz("u1", "c2", &mut rng()).await.unwrap();
        let pass = progression
            .submit(&mut s, &answers(&[("q1", "a"), ("q2", "b")]))
            .await
            .unwrap();
        assert!(pass.newly_completed);
        assert_eq!(pass.attempt_index, 2);

        progression
            .complete_content_chapter("u1", "c1", std::time::Duration::from_secs(30))
            .await
            .unwrap();
        profiles.mark_video_watched("u1").await.unwrap();
    }

    let store = Arc::new(SqliteStore::open(&db).unwrap());
    let progression = cyber_tutor::Progression::new(store.clone(), catalog(), &test_config());
    let profiles = cyber_tutor::Profiles::new(store.clone(), catalog(), test_config().retry_policy());

    let attempts = progression.ledger().attempts("u1", "c2").await.unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].score, 50.0);
    assert_eq!(attempts[1].score, 100.0);
    assert!(progression.ledger().is_complete("u1", "c1").await.unwrap());
    assert_eq!(
        progression.proficiency().get_rank("u1", "t1").await.unwrap(),
        Rank::Intermediate
    );
    assert_eq!(
        progression.proficiency().get_rank("u1", "t2").await.unwrap(),
        Rank::Beginner
    );
    assert!(profiles.is_video_watched("u1").await.unwrap());

    let record = store
        .get(&DocPath::progress("u1", "c2"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record["proficiencyApplied"], serde_json::json!(true));
    assert_eq!(record["topicId"], serde_json::json!("t1"));
}

#[tokio::test]
async fn listing_returns_one_record_per_chapter() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open(&dir.path().join("list.db")).unwrap());
    setup_with(store.clone(), "u1").await;
    setup_with(store.clone(), "u2").await;

    let docs = store
        .list(&DocPath::progress_collection("u1"))
        .await
        .unwrap();
    let mut ids: Vec<&str> = docs.iter().map(|(p, _)| p.id()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["c1", "c2", "c3", "c4", "c5"]);
}
