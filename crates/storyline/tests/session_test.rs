//! File-backed sessions over the sample data directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use storyline::{
    ConversationLog, FileTaskSource, JsonFileStore, LlmDriver, Phase, ScriptedDriver,
    StorylineConfig, VariableManager, Workflow,
};

fn data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../data")
}

fn manager() -> VariableManager {
    let definitions = std::fs::read_to_string(data_dir().join("variables.json")).unwrap();
    VariableManager::from_json(&definitions, &FileTaskSource::new(data_dir())).unwrap()
}

fn drivers() -> (Arc<dyn LlmDriver>, Arc<dyn LlmDriver>) {
    let script: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(data_dir().join("replies.json")).unwrap())
            .unwrap();
    let judge = ScriptedDriver::from_json("judge", &script["judge"].to_string()).unwrap();
    let narrator = ScriptedDriver::from_json("narrator", &script["narrator"].to_string()).unwrap();
    (Arc::new(judge), Arc::new(narrator))
}

async fn open(log_path: &Path) -> Workflow<JsonFileStore> {
    let mut config = StorylineConfig::bundled().unwrap();
    config.user_name = "Ada".to_string();
    let log = ConversationLog::open(JsonFileStore::new(log_path))
        .await
        .unwrap();
    let (judge, narrator) = drivers();
    Workflow::new(config, manager(), log, judge, narrator)
}

#[test]
fn test_sample_definitions_load() {
    let manager = manager();
    assert_eq!(manager.variables().len(), 3);
    assert_eq!(manager.value_of("anger"), Some(0.0));
    assert_eq!(manager.value_of("bond"), Some(1.0));
    assert_eq!(manager.get("bond").unwrap().phase(), Phase::Post);
}

#[tokio::test]
async fn test_turn_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("conversation.json");
    let opening = std::fs::read_to_string(data_dir().join("opening.txt")).unwrap();

    let mut workflow = open(&log_path).await;
    assert!(workflow.initialize(&opening).await.unwrap());
    let outcome = workflow.run_turn("I hate this place").await.unwrap();
    assert!(!outcome.is_stopped());

    let anger = workflow.manager().value_of("anger").unwrap();
    assert!((3.0..=5.0).contains(&anger));
    assert_eq!(workflow.manager().value_of("tension"), Some(2.0));
    assert_eq!(workflow.manager().value_of("bond"), Some(2.0));
    assert_eq!(
        workflow.log().records()[0].content(),
        "Ada steps into the quiet tavern. The innkeeper looks up from the bar."
    );

    let mut reopened = open(&log_path).await;
    assert_eq!(reopened.log().records().len(), 3);
    assert_eq!(reopened.manager().value_of("bond"), Some(1.0));
    assert!(reopened.recover().unwrap());
    assert_eq!(reopened.manager().value_of("anger"), Some(anger));
    assert_eq!(reopened.manager().value_of("tension"), Some(2.0));
    assert_eq!(reopened.manager().value_of("bond"), Some(2.0));
    assert!(!reopened.initialize(&opening).await.unwrap());
}
