//! Recompute, commit and recovery against an in-memory conversation log.

use serde_json::json;
use storyline_core::{
    Phase, SnapshotEntry, SnapshotSection, StageTransition, StageValue, VariableSnapshot,
};
use storyline_error::{SnapshotErrorKind, StorylineErrorKind};
use storyline_storage::{ConversationLog, InMemoryStore, InlineTaskSource};
use storyline_variables::{
    Delta, JudgeStyle, TaskQueue, VariableManager, VariableUpdate, Verdict,
};

fn definitions() -> String {
    json!([
        {
            "name": "anger",
            "var_type": "stage_independent",
            "update_type": "keyword_appear",
            "update_config": {
                "insult": {"keywords": ["hate", "idiot"], "min_value": 5, "max_value": 5}
            },
            "reset_type": "keyword",
            "reset_config": {"keywords": ["sorry"]},
            "min_value": 0,
            "max_value": 20,
            "stage_label": "Anger",
            "stage_method": "ladder",
            "stage_config": [3, 6],
            "stage_descriptions": ["calm", "irritated", "furious"]
        },
        {
            "name": "patience",
            "update_type": "keyword_count",
            "update_config": {"wait": {"keywords": ["wait"], "min_value": 1, "max_value": 1}},
            "initial_value": 4,
            "min_value": 0,
            "max_value": 10
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

fn source() -> InlineTaskSource {
    InlineTaskSource::new().with(
        "tasks/bond.txt",
        "<name>bond_change</name><description>How much closer did they grow?</description>",
    )
}

async fn started(manager: &VariableManager) -> ConversationLog<InMemoryStore> {
    let mut log = ConversationLog::open(InMemoryStore::new()).await.unwrap();
    log.initialize("The tavern is quiet.", None, None, manager.initial_snapshot())
        .await
        .unwrap();
    log
}

#[tokio::test]
async fn test_anger_keyword_appear_end_to_end() {
    let mut manager = VariableManager::with_seed(
        storyline_variables::load_variables(&definitions(), &source()).unwrap(),
        11,
    )
    .unwrap();
    let mut log = started(&manager).await;

    log.append_user_input("I hate you, idiot").await.unwrap();
    let mut queue = TaskQueue::new(5);
    let text = log.latest_user_text().unwrap().to_string();
    let updates = manager.recalculate_all(&text, Phase::Pre, &mut queue).unwrap();
    assert_eq!(updates, vec![VariableUpdate::numeric("anger", 5.0)]);
    assert!(queue.is_empty());

    let section = manager.apply_updates(&updates, &mut log).await.unwrap().unwrap();
    assert_eq!(section["anger"].value, 5.0);
    assert_eq!(section["patience"].value, 4.0);
    assert!(section["patience"].stage_transition.is_none());

    let anger = manager.get("anger").unwrap();
    assert_eq!(anger.stage_value(), Some(StageValue::Single(1)));
    assert_eq!(anger.stage_description().unwrap().to_string(), "irritated");
    let transition = anger.stage_transition().unwrap();
    assert_eq!(transition.before(), &StageValue::Single(0));
    assert_eq!(transition.after(), &StageValue::Single(1));

    let stored = log.current_assistant().unwrap().section(Phase::Pre).unwrap();
    assert_eq!(stored, &section);
}

#[tokio::test]
async fn test_reset_takes_precedence_over_update() {
    let mut manager = VariableManager::from_json(&definitions(), &source()).unwrap();
    let mut queue = TaskQueue::new(5);
    let updates = manager
        .recalculate_all("sorry, I hate this", Phase::Pre, &mut queue)
        .unwrap();
    assert_eq!(updates, vec![VariableUpdate::reset("anger")]);
}

#[tokio::test]
async fn test_fuzzy_tasks_queue_in_post_phase_only() {
    let mut manager = VariableManager::from_json(&definitions(), &source()).unwrap();
    let mut queue = TaskQueue::new(5);
    manager.recalculate_all("They laughed together", Phase::Pre, &mut queue).unwrap();
    assert!(queue.is_empty());

    manager.recalculate_all("They laughed together", Phase::Post, &mut queue).unwrap();
    assert_eq!(queue.len(), 1);

    let assembled = queue.assemble_batch(|name| manager.value_of(name));
    assert_eq!(assembled[0].name, "bond_change");
    assert_eq!(assembled[0].current_value, 1.0);

    let verdicts = queue.resolve("```json\n{\"bond_change\": 2}\n```").unwrap();
    assert_eq!(
        verdicts,
        vec![Verdict::Update(VariableUpdate::numeric("bond", 2.0))]
    );
    assert_eq!(JudgeStyle::Post.to_string(), "post");
}

#[tokio::test]
async fn test_empty_commit_leaves_log_untouched() {
    let mut manager = VariableManager::from_json(&definitions(), &source()).unwrap();
    let mut log = started(&manager).await;
    log.append_user_input("hello").await.unwrap();
    let writes = log.store().write_count();

    assert!(manager.apply_updates(&[], &mut log).await.unwrap().is_none());
    assert_eq!(log.store().write_count(), writes);
}

#[tokio::test]
async fn test_mixed_phase_commit_is_fatal() {
    let mut manager = VariableManager::from_json(&definitions(), &source()).unwrap();
    let mut log = started(&manager).await;
    log.append_user_input("hello").await.unwrap();

    let updates = vec![
        VariableUpdate::numeric("anger", 1.0),
        VariableUpdate::numeric("bond", 1.0),
    ];
    let err = manager.apply_updates(&updates, &mut log).await.unwrap_err();
    assert!(matches!(
        err.kind(),
        StorylineErrorKind::Snapshot(e) if matches!(e.kind, SnapshotErrorKind::MixedPhase(_))
    ));
}

#[tokio::test]
async fn test_missing_baseline_is_fatal() {
    let mut manager = VariableManager::from_json(&definitions(), &source()).unwrap();
    let mut log = ConversationLog::open(InMemoryStore::new()).await.unwrap();
    log.initialize("Opening", None, None, VariableSnapshot::default())
        .await
        .unwrap();
    log.append_user_input("I hate it").await.unwrap();

    let err = manager
        .apply_updates(&[VariableUpdate::numeric("anger", 1.0)], &mut log)
        .await
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        StorylineErrorKind::Snapshot(e) if matches!(e.kind, SnapshotErrorKind::MissingBaseline(_))
    ));
}

#[tokio::test]
async fn test_commit_clamps_and_resets() {
    let mut manager = VariableManager::from_json(&definitions(), &source()).unwrap();
    let mut log = started(&manager).await;
    log.append_user_input("hello").await.unwrap();

    let updates = vec![
        VariableUpdate::numeric("anger", 999.0),
        VariableUpdate::numeric("patience", -0.26),
    ];
    let section = manager.apply_updates(&updates, &mut log).await.unwrap().unwrap();
    assert_eq!(section["anger"].value, 20.0);
    assert_eq!(section["patience"].value, 3.7);

    log.fill_assistant("reply", None, None, None).await.unwrap();
    log.append_user_input("sorry").await.unwrap();
    let reset = VariableUpdate {
        variable: "anger".to_string(),
        delta: Delta::Reset,
    };
    let section = manager.apply_updates(&[reset], &mut log).await.unwrap().unwrap();
    assert_eq!(section["anger"].value, 0.0);
    assert_eq!(section["patience"].value, 3.7);
}

#[tokio::test]
async fn test_recommit_on_same_layer_starts_from_baseline() {
    let mut manager = VariableManager::from_json(&definitions(), &source()).unwrap();
    let mut log = started(&manager).await;
    log.append_user_input("hello").await.unwrap();

    let updates = vec![VariableUpdate::numeric("patience", 2.0)];
    manager.apply_updates(&updates, &mut log).await.unwrap();
    let section = manager.apply_updates(&updates, &mut log).await.unwrap().unwrap();
    assert_eq!(section["patience"].value, 6.0);
}

#[tokio::test]
async fn test_restore_latest_round_trip_and_mismatch() {
    let mut manager = VariableManager::from_json(&definitions(), &source()).unwrap();
    let mut log = started(&manager).await;
    log.append_user_input("wait, wait").await.unwrap();
    manager
        .apply_updates(&[VariableUpdate::numeric("patience", 2.0)], &mut log)
        .await
        .unwrap();

    let mut fresh = VariableManager::from_json(&definitions(), &source()).unwrap();
    assert!(fresh.restore_latest(&log).unwrap());
    assert_eq!(fresh.value_of("patience"), Some(6.0));
    assert_eq!(fresh.value_of("bond"), Some(1.0));

    let mut extra = SnapshotSection::new();
    extra.insert(
        "ghost".to_string(),
        SnapshotEntry {
            value: 1.0,
            stage_transition: None,
        },
    );
    log.save_section(Phase::Post, extra).await.unwrap();
    let err = fresh.restore_latest(&log).unwrap_err();
    match err.kind() {
        StorylineErrorKind::Snapshot(e) => match &e.kind {
            SnapshotErrorKind::NameSetMismatch {
                missing_in_snapshot,
                missing_in_registry,
            } => {
                assert_eq!(missing_in_snapshot, "bond");
                assert_eq!(missing_in_registry, "ghost");
            }
            other => panic!("unexpected kind {:?}", other),
        },
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_restore_without_snapshots_is_noop() {
    let mut manager = VariableManager::from_json(&definitions(), &source()).unwrap();
    let log = ConversationLog::open(InMemoryStore::new()).await.unwrap();
    assert!(!manager.restore_latest(&log).unwrap());
}

#[tokio::test]
async fn test_untouched_stage_variable_keeps_baseline_transition() {
    let mut manager = VariableManager::from_json(&definitions(), &source()).unwrap();
    let mut log = started(&manager).await;
    log.append_user_input("I hate it").await.unwrap();
    manager
        .apply_updates(&[VariableUpdate::numeric("anger", 5.0)], &mut log)
        .await
        .unwrap();
    log.fill_assistant("reply", None, None, None).await.unwrap();

    log.append_user_input("wait").await.unwrap();
    let section = manager
        .apply_updates(&[VariableUpdate::numeric("patience", 1.0)], &mut log)
        .await
        .unwrap()
        .unwrap();

    let raised = StageTransition::between(StageValue::Single(0), StageValue::Single(1));
    assert_eq!(section["anger"].value, 5.0);
    assert_eq!(section["anger"].stage_transition, raised);
    assert_eq!(manager.get("anger").unwrap().stage_transition(), raised.as_ref());
    assert_eq!(section["patience"].value, 5.0);
}

#[tokio::test]
async fn test_last_entry_for_a_variable_decides_transition() {
    let mut manager = VariableManager::from_json(&definitions(), &source()).unwrap();
    let mut log = started(&manager).await;
    log.append_user_input("I hate it").await.unwrap();
    manager
        .apply_updates(&[VariableUpdate::numeric("anger", 10.0)], &mut log)
        .await
        .unwrap();
    assert_eq!(
        manager.get("anger").unwrap().stage_value(),
        Some(StageValue::Single(2))
    );
    log.fill_assistant("reply", None, None, None).await.unwrap();

    log.append_user_input("sorry, but I still hate it").await.unwrap();
    let updates = vec![
        VariableUpdate::reset("anger"),
        VariableUpdate::numeric("anger", 5.0),
    ];
    let section = manager.apply_updates(&updates, &mut log).await.unwrap().unwrap();

    assert_eq!(section["anger"].value, 5.0);
    assert_eq!(
        section["anger"].stage_transition,
        StageTransition::between(StageValue::Single(0), StageValue::Single(1))
    );
}

#[tokio::test]
async fn test_previous_layer_without_section_is_fatal() {
    let mut manager = VariableManager::from_json(&definitions(), &source()).unwrap();
    let mut log = started(&manager).await;
    log.append_user_input("I hate it").await.unwrap();
    manager
        .apply_updates(&[VariableUpdate::numeric("anger", 1.0)], &mut log)
        .await
        .unwrap();
    log.fill_assistant("reply", None, None, None).await.unwrap();
    log.append_user_input("hello").await.unwrap();

    // Layer 2 never committed a post section, so layer 3 has no post baseline.
    let err = manager
        .apply_updates(&[VariableUpdate::numeric("bond", 1.0)], &mut log)
        .await
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        StorylineErrorKind::Snapshot(e) if matches!(e.kind, SnapshotErrorKind::MissingBaseline(_))
    ));
}
