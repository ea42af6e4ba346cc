use mcq_core::model::{
    DocumentId, InstituteId, NotificationData, NotificationKind, QuestionId,
    SavedQuestionData, SavedQuestionMetadata, TestId, UserId,
};
use mcq_core::time::fixed_now;
use serde_json::json;
use storage::repository::{Document, DocumentStore, Filter, StorageError, from_document, to_document};
use storage::sqlite::SqliteDocumentStore;

async fn connect(name: &str) -> SqliteDocumentStore {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteDocumentStore::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn doc(value: serde_json::Value) -> Document {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("not an object"),
    }
}

#[tokio::test]
async fn sqlite_saved_question_roundtrip_and_query() {
    let repo = connect("memdb_saved").await;

    let question = mcq_core::model::Question::new(
        QuestionId::new("q1"),
        TestId::new("t1"),
        "<p>Capital of France?</p>",
        ["Paris".into(), "Rome".into(), "Oslo".into(), "Bern".into()],
        mcq_core::model::OptionIndex::new(1).unwrap(),
    );
    let data = SavedQuestionData::snapshot(
        UserId::new("u1"),
        &question,
        InstituteId::new("inst1"),
        TestId::new("t1"),
        SavedQuestionMetadata {
            institute_name: Some("Alpha".into()),
            subject: Some("  ".into()),
            ..SavedQuestionMetadata::default()
        },
        fixed_now(),
    );

    let id = repo
        .add("saved_questions", to_document(&data).unwrap())
        .await
        .unwrap();

    let hits = repo
        .query(
            "saved_questions",
            &[
                Filter::eq("userId", "u1"),
                Filter::eq("questionId", "q1"),
                Filter::eq("coachingId", "inst1"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, id);
    assert!(!hits[0].data.contains_key("subject"));

    let back: SavedQuestionData = from_document(hits[0].data.clone()).unwrap();
    assert_eq!(back, data);

    repo.delete("saved_questions", &id).await.unwrap();
    assert!(repo.query("saved_questions", &[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn sqlite_set_merge_and_update_semantics() {
    let repo = connect("memdb_merge").await;
    let id = DocumentId::new("u1-inst1-t1-secA");

    repo.set_merge(
        "section_progress",
        &id,
        doc(json!({"userId": "u1", "isCompleted": true, "completedAt": "2023-11-14T22:13:20Z"})),
    )
    .await
    .unwrap();
    repo.set_merge("section_progress", &id, doc(json!({"isCompleted": false})))
        .await
        .unwrap();

    let stored = repo.get("section_progress", &id).await.unwrap().unwrap();
    assert_eq!(stored["isCompleted"], false);
    assert_eq!(stored["userId"], "u1");
    assert!(stored.contains_key("completedAt"));

    let err = repo
        .update("test_progress", &DocumentId::new("missing"), doc(json!({"isComplete": false})))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn sqlite_query_keeps_insertion_order() {
    let repo = connect("memdb_order").await;
    for title in ["first", "second", "third"] {
        let data = NotificationData {
            recipient: "broadcast".into(),
            title: title.into(),
            message: "m".into(),
            kind: NotificationKind::Info,
            timestamp: fixed_now(),
            read: false,
        };
        repo.add("notifications", to_document(&data).unwrap())
            .await
            .unwrap();
    }

    let titles: Vec<String> = repo
        .query("notifications", &[Filter::eq("userId", "broadcast")])
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.data["title"].as_str().unwrap_or_default().to_owned())
        .collect();
    assert_eq!(titles, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let repo = connect("memdb_migrate_twice").await;
    repo.migrate().await.expect("second migrate");
}

#[tokio::test]
async fn sqlite_query_filters_in_sql_and_skips_corrupt_rows() {
    let repo = connect("memdb_corrupt").await;
    for (user, question, read) in [("u1", "q1", false), ("u2", "q1", true), ("u1", "q2", true)] {
        repo.add(
            "saved_questions",
            doc(json!({ "userId": user, "questionId": question, "read": read })),
        )
        .await
        .unwrap();
    }
    sqlx::query(
        "INSERT INTO documents (collection, id, body, updated_at) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind("saved_questions")
    .bind("broken")
    .bind("{not json")
    .bind(fixed_now())
    .execute(repo.pool())
    .await
    .unwrap();

    let all = repo.query("saved_questions", &[]).await.unwrap();
    assert_eq!(all.len(), 3);

    let mine = repo
        .query("saved_questions", &[Filter::eq("userId", "u1")])
        .await
        .unwrap();
    let questions: Vec<&str> = mine
        .iter()
        .map(|d| d.data["questionId"].as_str().unwrap_or_default())
        .collect();
    assert_eq!(questions, vec!["q1", "q2"]);

    let read = repo
        .query(
            "saved_questions",
            &[Filter::eq("userId", "u1"), Filter::eq("read", true)],
        )
        .await
        .unwrap();
    assert_eq!(read.len(), 1);
    assert_eq!(read[0].data["questionId"], json!("q2"));
}
