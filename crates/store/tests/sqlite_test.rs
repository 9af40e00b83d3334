use citydesk_core::{
    traits::{RecordFilter, RecordStore},
    types::{Command, CommandError, CommandState, Intent},
};
use citydesk_store::SqliteRecordStore;
use serde_json::json;

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.db");

    let mut cmd = Command::new(Intent::RagQuery, json!({"query": "bulk pickup"}), "clerk-7");
    {
        let store = SqliteRecordStore::new(&path).unwrap();
        store.append_record(&cmd).await.unwrap();
        cmd.state = CommandState::Running;
        store.append_record(&cmd).await.unwrap();
        cmd.state = CommandState::Failed;
        cmd.error = Some(CommandError {
            code: "RETRIEVAL_FAILED".into(),
            message: "Retrieval failed: index offline".into(),
            failures: vec![],
        });
        store.append_record(&cmd).await.unwrap();
    }

    let reopened = SqliteRecordStore::new(&path).unwrap();
    let history = reopened
        .query_records(&RecordFilter::command(cmd.id.clone()))
        .await
        .unwrap();
    let states: Vec<CommandState> = history.iter().map(|c| c.state).collect();
    assert_eq!(
        states,
        vec![CommandState::Pending, CommandState::Running, CommandState::Failed]
    );
    assert_eq!(history[2].error.as_ref().unwrap().code, "RETRIEVAL_FAILED");
    assert_eq!(history[2].parameters, json!({"query": "bulk pickup"}));
}

#[tokio::test]
async fn test_latest_only_by_submitter() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteRecordStore::new(dir.path().join("records.db")).unwrap();

    for submitter in ["ann", "ann", "ben"] {
        let mut cmd = Command::new(Intent::LlmQuery, json!({"prompt": "hi"}), submitter);
        store.append_record(&cmd).await.unwrap();
        cmd.state = CommandState::Running;
        store.append_record(&cmd).await.unwrap();
    }

    let filter = RecordFilter {
        submitter: Some("ann".into()),
        latest_only: true,
        ..Default::default()
    };
    let records = store.query_records(&filter).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|c| c.state == CommandState::Running));
}
