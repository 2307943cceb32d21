//! Full turns with scripted collaborators.

use serde_json::json;
use std::sync::{Arc, Mutex};
use storyline_core::{ChatMethod, Phase, StageValue, StorylineConfig};
use storyline_interface::TokenSink;
use storyline_storage::{ConversationLog, InMemoryStore, InlineTaskSource, JsonFileStore};
use storyline_variables::VariableManager;
use storyline_workflow::{ScriptedDriver, ScriptedReply, Workflow, WorkflowState};

const OPENING: &str =
    "<scene>Tavern</scene><main_body>{user} steps into the quiet tavern.</main_body><summary>Arrival.</summary>";

const NARRATIVE: &str = "<preparation>p</preparation><main_body>Mira scowls.</main_body>\
                         <scene>Bar</scene><summary>Tense.</summary>";

fn definitions() -> String {
    json!([
        {
            "name": "anger",
            "var_type": "stage_independent",
            "update_type": "keyword_appear",
            "update_config": {"insult": {"keywords": ["hate"], "min_value": 5, "max_value": 5}},
            "min_value": 0,
            "max_value": 20,
            "stage_label": "Anger",
            "stage_method": "ladder",
            "stage_config": [3, 6],
            "stage_descriptions": ["calm", "irritated", "furious"]
        },
        {
            "name": "tension",
            "update_type": "llm_fuzzy",
            "update_config": "tasks/tension.txt",
            "initial_value": 0
        },
        {
            "name": "bond",
            "update_type": "llm_fuzzy",
            "update_config": "tasks/bond.txt",
            "pre_update": false,
            "initial_value": 1
        }
    ])
    .to_string()
}

fn tasks() -> InlineTaskSource {
    InlineTaskSource::new()
        .with(
            "tasks/tension.txt",
            "<name>tension_level</name><description>How tense is the input?</description>",
        )
        .with(
            "tasks/bond.txt",
            "<name>bond_change</name><description>How much closer did they grow?</description>",
        )
}

struct Harness {
    workflow: Workflow<InMemoryStore>,
    judge: Arc<ScriptedDriver>,
    narrator: Arc<ScriptedDriver>,
}

async fn harness(
    config: StorylineConfig,
    judge: Vec<ScriptedReply>,
    narrator: Vec<ScriptedReply>,
) -> Harness {
    let manager = VariableManager::with_seed(
        storyline_variables::load_variables(&definitions(), &tasks()).unwrap(),
        7,
    )
    .unwrap();
    let log = ConversationLog::open(InMemoryStore::new()).await.unwrap();
    let judge = Arc::new(ScriptedDriver::new("judge", judge));
    let narrator = Arc::new(ScriptedDriver::new("narrator", narrator));
    let mut workflow = Workflow::new(config, manager, log, judge.clone(), narrator.clone());
    assert!(workflow.initialize(OPENING).await.unwrap());
    Harness {
        workflow,
        judge,
        narrator,
    }
}

fn config() -> StorylineConfig {
    let mut config = StorylineConfig::bundled().unwrap();
    config.user_name = "Mira".to_string();
    config
}

#[tokio::test]
async fn test_full_turn_commits_both_phases() {
    let mut h = harness(
        config(),
        vec![
            ScriptedReply::text("{\"tension_level\": 2}"),
            ScriptedReply::text("```json\n{\"bond_change\": 1.5}\n```"),
        ],
        vec![ScriptedReply::text(NARRATIVE)],
    )
    .await;

    let outcome = h.workflow.run_turn("I hate waiting").await.unwrap();
    assert!(!outcome.is_stopped());
    assert_eq!(h.workflow.state(), WorkflowState::Idle);
    assert!(h.workflow.queue().is_empty());

    let records = h.workflow.log().records();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].content(), "Mira steps into the quiet tavern.");
    let assistant = h.workflow.log().current_assistant().unwrap();
    assert_eq!(assistant.content(), "Mira scowls.");
    assert_eq!(assistant.scene().as_deref(), Some("Bar"));
    assert_eq!(assistant.summary().as_deref(), Some("Tense."));

    let pre = assistant.section(Phase::Pre).unwrap();
    assert_eq!(pre["anger"].value, 5.0);
    assert_eq!(pre["tension"].value, 2.0);
    let post = assistant.section(Phase::Post).unwrap();
    assert_eq!(post["bond"].value, 2.5);

    let anger = h.workflow.manager().get("anger").unwrap();
    assert_eq!(anger.stage_value(), Some(StageValue::Single(1)));

    let judged = h.judge.requests();
    assert_eq!(judged.len(), 2);
    assert!(judged.iter().all(|r| r.json_mode));
    let post_prompt: String = judged[1].messages.iter().map(|m| m.content.as_str()).collect();
    assert!(post_prompt.contains("(Bar)Mira scowls."));
    assert!(post_prompt.contains("bond_change: 1"));

    let narrated = h.narrator.requests();
    assert_eq!(narrated.len(), 1);
    let last = narrated[0].messages.last().unwrap();
    assert!(last.content.contains("Mira: I hate waiting"));
    assert!(!narrated[0].json_mode);
}

#[tokio::test]
async fn test_stop_during_pre_update_skips_later_phases() {
    let mut h = harness(
        config(),
        vec![
            ScriptedReply::Stop,
            ScriptedReply::text("{\"tension_level\": 1}"),
        ],
        vec![ScriptedReply::text(NARRATIVE)],
    )
    .await;

    let outcome = h.workflow.run_turn("I hate this").await.unwrap();
    assert!(outcome.is_stopped());
    assert_eq!(h.workflow.state(), WorkflowState::Stopped);
    assert!(h.workflow.queue().is_empty());
    assert!(h.narrator.requests().is_empty());

    let placeholder = h.workflow.log().current_assistant().unwrap();
    assert!(placeholder.is_placeholder());
    assert!(placeholder.section(Phase::Pre).is_none());

    let stop = h.workflow.stop_signal();
    assert!(stop.is_stopped());
    assert!(h.workflow.run_pre_phase().await.unwrap().is_stopped());
    assert_eq!(h.judge.remaining(), 1);

    stop.reset();
    let retry = h.workflow.run_pre_phase().await.unwrap();
    assert!(!retry.is_stopped());
    let pre = h
        .workflow
        .log()
        .current_assistant()
        .unwrap()
        .section(Phase::Pre)
        .unwrap();
    assert_eq!(pre["anger"].value, 5.0);
    assert_eq!(pre["tension"].value, 1.0);
}

#[tokio::test]
async fn test_anomalous_verdicts_are_discarded() {
    let mut h = harness(
        config(),
        vec![ScriptedReply::text("{\"tension_level\": \"very\"}")],
        vec![],
    )
    .await;

    h.workflow.submit_user_input("I hate rain").await.unwrap();
    h.workflow.run_pre_phase().await.unwrap();

    let pre = h
        .workflow
        .log()
        .current_assistant()
        .unwrap()
        .section(Phase::Pre)
        .unwrap();
    assert_eq!(pre["anger"].value, 5.0);
    assert_eq!(pre["tension"].value, 0.0);
}

#[tokio::test]
async fn test_judge_failure_clears_queue() {
    let mut h = harness(config(), vec![ScriptedReply::Fail("offline".into())], vec![]).await;

    h.workflow.submit_user_input("calm words").await.unwrap();
    assert!(h.workflow.run_pre_phase().await.is_err());
    assert!(h.workflow.queue().is_empty());
    assert_eq!(h.workflow.state(), WorkflowState::Idle);
}

#[tokio::test]
async fn test_interactive_pre_phase_uses_post_prompt() {
    let mut config = config();
    config.chat_method = ChatMethod::Interactive;
    let mut h = harness(config, vec![ScriptedReply::text("{\"tension_level\": 0}")], vec![]).await;

    h.workflow.submit_user_input("hello").await.unwrap();
    h.workflow.run_pre_phase().await.unwrap();

    let prompt: String = h.judge.requests()[0]
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert!(prompt.contains("Current values:"));
    assert!(prompt.contains("tension_level: 0"));
}

#[tokio::test]
async fn test_stream_filter_feeds_display() {
    let shown = Arc::new(Mutex::new(String::new()));
    let sink_shown = Arc::clone(&shown);
    let sink: TokenSink = Arc::new(move |t: &str| sink_shown.lock().unwrap().push_str(t));

    let h = harness(
        config(),
        vec![
            ScriptedReply::text("{\"tension_level\": 0}"),
            ScriptedReply::text("{\"bond_change\": 0}"),
        ],
        vec![ScriptedReply::text(NARRATIVE)],
    )
    .await;
    let mut workflow = h.workflow.with_sinks(None, Some(sink)).with_stream_filter(true);

    workflow.run_turn("Hello there").await.unwrap();
    assert_eq!(
        shown.lock().unwrap().as_str(),
        "Plan:\np\nNarrative:\nMira scowls.\nBar\nTense.\n"
    );
}

#[tokio::test]
async fn test_delete_messages_restores_earlier_state() {
    let mut h = harness(
        config(),
        vec![
            ScriptedReply::text("{\"tension_level\": 3}"),
            ScriptedReply::text("{\"bond_change\": 2}"),
        ],
        vec![ScriptedReply::text(NARRATIVE)],
    )
    .await;
    h.workflow.run_turn("I hate you").await.unwrap();
    assert_eq!(h.workflow.manager().value_of("anger"), Some(5.0));

    assert_eq!(h.workflow.delete_messages(10).await.unwrap(), 2);
    assert_eq!(h.workflow.log().records().len(), 1);
    assert_eq!(h.workflow.manager().value_of("anger"), Some(0.0));
    assert_eq!(h.workflow.manager().value_of("bond"), Some(1.0));

    assert!(!h.workflow.initialize(OPENING).await.unwrap());
}

#[tokio::test]
async fn test_stop_raised_before_phase_keeps_it_from_running() {
    let mut h = harness(
        config(),
        vec![
            ScriptedReply::text("{\"tension_level\": 1}"),
            ScriptedReply::text("{\"bond_change\": 0}"),
        ],
        vec![ScriptedReply::text(NARRATIVE)],
    )
    .await;
    h.workflow.submit_user_input("I hate queues").await.unwrap();

    h.workflow.stop_signal().stop();
    assert!(h.workflow.run_pre_phase().await.unwrap().is_stopped());
    assert!(h.workflow.run_create_phase().await.unwrap().is_stopped());
    assert_eq!(h.workflow.state(), WorkflowState::Stopped);
    assert!(h.judge.requests().is_empty());
    assert!(h.narrator.requests().is_empty());
    assert!(
        h.workflow
            .log()
            .current_assistant()
            .unwrap()
            .section(Phase::Pre)
            .is_none()
    );

    // A new turn lowers the signal before it starts.
    h.workflow.delete_messages(2).await.unwrap();
    let outcome = h.workflow.run_turn("I hate queues").await.unwrap();
    assert!(!outcome.is_stopped());
    assert_eq!(h.workflow.manager().value_of("anger"), Some(5.0));
}

#[tokio::test]
async fn test_file_backed_turn_persists_and_recovers() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("conversation.json");
    let open = |path: std::path::PathBuf| async move {
        let manager = VariableManager::from_json(&definitions(), &tasks()).unwrap();
        let log = ConversationLog::open(JsonFileStore::new(path)).await.unwrap();
        let judge = Arc::new(ScriptedDriver::new(
            "judge",
            [
                ScriptedReply::text("{\"tension_level\": 2}"),
                ScriptedReply::text("{\"bond_change\": 1}"),
            ],
        ));
        let narrator = Arc::new(ScriptedDriver::new("narrator", [ScriptedReply::text(NARRATIVE)]));
        Workflow::new(config(), manager, log, judge, narrator)
    };

    let mut workflow = open(path.clone()).await;
    assert!(workflow.initialize(OPENING).await.unwrap());
    workflow.run_turn("I hate waiting").await.unwrap();

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let anger = &written["3"]["variable_snapshot"]["pre"]["anger"];
    assert_eq!(anger["value"], json!(5.0));
    assert_eq!(anger["relative_is_upgrade"], json!([0, 1]));
    assert_eq!(written["3"]["content"], "Mira scowls.");

    let mut reopened = open(path).await;
    assert!(reopened.recover().unwrap());
    assert_eq!(reopened.manager().value_of("anger"), Some(5.0));
    assert_eq!(reopened.manager().value_of("bond"), Some(2.0));
    assert!(reopened.manager().get("anger").unwrap().stage_transition().is_some());
}
