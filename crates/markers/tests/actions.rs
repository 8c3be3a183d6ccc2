mod support;

use std::sync::Arc;
use std::time::Duration;

use markers::actions::EXPORTED_MESSAGE;
use markers::{
    ErrorClass, KeyValueStore, Marker, MarkerActions, MarkerFormatter, MinimalFormatter, PageMode,
};

use support::Harness;

async fn installed(harness: &Harness) -> Arc<MarkerActions> {
    let controller = harness.controller();
    controller.install().await.expect("install");
    controller.actions().await.expect("actions")
}

fn seconds(actions: &MarkerActions) -> Vec<f64> {
    actions
        .store()
        .snapshot()
        .iter()
        .map(|marker| marker.seconds)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn time_offset_prefix_moves_the_new_marker() {
    let harness = Harness::vod();
    harness.page.state().elapsed = Some(String::from("01:00"));
    let actions = installed(&harness).await;

    harness.dialogs.answer(Some("t-15 Ambush"));
    let marker = actions.add_marker_here().await.expect("add").expect("added");
    assert_eq!(marker, Marker::new(45.0, "Ambush"));
    assert!(harness.clipboard.texts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn live_markers_copy_their_share_link() {
    let harness = Harness::new(PageMode::Live, Some("777"));
    {
        let mut state = harness.page.state();
        state.stats_visible = true;
        state.live_clock = Some(String::from("1:00:05"));
    }
    let actions = installed(&harness).await;

    harness.dialogs.answer(Some("Clip"));
    actions.add_marker_here().await.expect("add").expect("added");
    assert_eq!(
        harness.clipboard.texts(),
        vec!["https://twitch.tv/videos/777?t=01h00m00s"]
    );
}

#[tokio::test(start_paused = true)]
async fn dismissed_prompts_change_nothing() {
    let harness = Harness::vod();
    harness.seed("v1", "json", r#"[{"seconds":5.0,"name":"a"}]"#);
    let actions = installed(&harness).await;

    harness.dialogs.answer(None);
    assert!(actions.add_marker_here().await.expect("add").is_none());
    harness.dialogs.answer(None);
    assert!(!actions.edit_seconds(5.0).await.expect("edit"));
    harness.dialogs.answer(Some("   "));
    assert!(!actions.edit_name(5.0).await.expect("edit"));

    assert_eq!(actions.store().snapshot(), vec![Marker::new(5.0, "a")]);
}

#[tokio::test(start_paused = true)]
async fn edits_use_the_selected_formatter() {
    let harness = Harness::vod();
    harness.seed("v1", "json", r#"[{"seconds":65.0,"name":"Intro"}]"#);
    let actions = installed(&harness).await;

    harness.dialogs.answer(Some("1:10"));
    assert!(actions.edit_seconds(65.0).await.expect("edit seconds"));
    assert_eq!(harness.dialogs.state().prompts[0].1, "01:05");

    harness.dialogs.answer(Some("00:20\tOpening"));
    assert!(actions.edit_marker(70.0).await.expect("edit marker"));
    assert_eq!(actions.store().snapshot(), vec![Marker::new(20.0, "Opening")]);

    // Record keeps the formatter it was written with.
    assert_eq!(harness.record("v1").expect("saved").formatter, "json");
}

#[tokio::test(start_paused = true)]
async fn edit_all_applies_nothing_from_bad_or_empty_text() {
    let harness = Harness::vod();
    harness.seed("v1", "json", r#"[{"seconds":5.0,"name":"a"}]"#);
    let actions = installed(&harness).await;

    harness.dialogs.answer(Some("00:10\tok\nlater\tbroken"));
    let error = actions.edit_all().await.expect_err("bad line");
    assert_eq!(error.class(), ErrorClass::Parse);

    harness.dialogs.answer(Some("\n\n"));
    assert!(!actions.edit_all().await.expect("empty"));
    assert_eq!(seconds(&actions), vec![5.0]);

    harness.dialogs.answer(Some("00:30\tc\n00:10\tb"));
    assert!(actions.edit_all().await.expect("apply"));
    assert_eq!(seconds(&actions), vec![10.0, 30.0]);
}

#[tokio::test(start_paused = true)]
async fn unchanged_edit_all_keeps_fractional_times() {
    let harness = Harness::vod();
    harness.seed(
        "v1",
        "json",
        r#"[{"seconds":100.3,"name":"a"},{"seconds":100.8,"name":"b"},{"seconds":200.6,"name":"c"}]"#,
    );
    let actions = installed(&harness).await;

    let text = MinimalFormatter::default()
        .serialize_all(&actions.store().snapshot())
        .expect("serialize");
    harness.dialogs.answer(Some(&text));
    assert!(actions.edit_all().await.expect("apply"));

    assert_eq!(harness.dialogs.state().prompts[0].1, text);
    assert_eq!(seconds(&actions), vec![100.3, 100.8, 200.6]);
}

#[tokio::test(start_paused = true)]
async fn duplicate_time_is_rejected() {
    let harness = Harness::vod();
    harness.seed("v1", "json", r#"[{"seconds":5.0,"name":"a"}]"#);
    harness.page.state().elapsed = Some(String::from("00:05"));
    let actions = installed(&harness).await;

    harness.dialogs.answer(Some("again"));
    let error = actions.add_marker_here().await.expect_err("duplicate");
    assert_eq!(error.class(), ErrorClass::Rejected);
    assert_eq!(actions.store().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn nudging_on_vod_seeks_the_player() {
    let harness = Harness::vod();
    harness.seed("v1", "json", r#"[{"seconds":5.0,"name":"a"}]"#);
    let actions = installed(&harness).await;

    assert_eq!(actions.nudge(5.0, 1.0).await.expect("nudge"), 6.0);
    assert_eq!(actions.nudge(6.0, -1.0).await.expect("nudge"), 5.0);
    assert_eq!(harness.page.state().seeks, vec![6.0, 5.0]);
}

#[tokio::test(start_paused = true)]
async fn export_copies_and_confirms() {
    let harness = Harness::vod();
    harness.seed(
        "v1",
        "json",
        r#"[{"seconds":65.0,"name":"Intro"},{"seconds":3725.0,"name":"Boss"}]"#,
    );
    let actions = installed(&harness).await;

    let text = actions.export().await.expect("export");
    assert_eq!(text, "01:05\tIntro\n01:02:05\tBoss");
    assert_eq!(harness.clipboard.texts(), vec![text]);
    assert_eq!(harness.dialogs.state().alerts, vec![EXPORTED_MESSAGE]);
}

#[tokio::test(start_paused = true)]
async fn share_copies_a_timestamped_link() {
    let harness = Harness::vod();
    harness.seed("v1", "json", r#"[{"seconds":3725.0,"name":"Boss"}]"#);
    let actions = installed(&harness).await;

    let link = actions.share(3_725.0).await.expect("share").expect("link");
    assert_eq!(link, "https://twitch.tv/videos/v1?t=01h02m05s");
}

#[tokio::test(start_paused = true)]
async fn cancel_key_closes_the_list() {
    let harness = Harness::vod();
    harness.seed("v1", "json", r#"[{"seconds":5.0,"name":"a"}]"#);
    let controller = harness.controller();
    controller.install().await.expect("install");
    let actions = controller.actions().await.expect("actions");
    let session = controller
        .installation()
        .await
        .expect("installation")
        .session()
        .clone();

    actions.toggle_list();
    assert!(harness.overlay.state().visible);
    assert_eq!(session.cancel_stack().len(), 1);

    assert!(session.cancel_stack().cancel_topmost());
    assert!(!harness.overlay.state().visible);
    assert!(harness.overlay.state().items.is_empty());
}

#[tokio::test(start_paused = true)]
async fn chosen_formatter_becomes_the_preference() {
    let harness = Harness::vod();
    let actions = installed(&harness).await;

    harness
        .dialogs
        .state()
        .choices
        .push_back(Some(String::from("json")));
    assert_eq!(
        actions.choose_formatter().await.expect("choose").as_deref(),
        Some("json")
    );
    assert_eq!(
        harness
            .storage
            .get("r2_twitch_user_markers_ui_formatter")
            .expect("get")
            .as_deref(),
        Some("json")
    );
}

fn label(harness: &Harness) -> Option<String> {
    harness.overlay.state().label.clone()
}

#[tokio::test(start_paused = true)]
async fn seekbar_hover_holds_the_label_until_the_pointer_leaves() {
    let harness = Harness::vod();
    harness.seed(
        "v1",
        "json",
        r#"[{"seconds":10.0,"name":"a"},{"seconds":50.0,"name":"b"},{"seconds":120.0,"name":"c"}]"#,
    );
    harness.page.state().elapsed = Some(String::from("00:55"));
    let actions = installed(&harness).await;

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(label(&harness).as_deref(), Some("b"));

    let hovered = actions.hover_seekbar(0.011).await.expect("marker under pointer");
    assert_eq!(hovered.name, "a");
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(label(&harness).as_deref(), Some("a"));

    actions.leave_seekbar();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(label(&harness).as_deref(), Some("b"));
}

#[tokio::test(start_paused = true)]
async fn clicking_the_label_seeks_to_its_marker() {
    let harness = Harness::vod();
    harness.seed("v1", "json", r#"[{"seconds":50.0,"name":"b"}]"#);
    harness.page.state().elapsed = Some(String::from("01:10"));
    let actions = installed(&harness).await;

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(actions.seek_to_labelled_marker().await, Some(50.0));
    assert_eq!(harness.page.state().seeks, vec![50.0]);
}

#[tokio::test(start_paused = true)]
async fn wheel_steps_one_second_at_a_time() {
    let harness = Harness::vod();
    harness.page.state().elapsed = Some(String::from("01:00"));
    let actions = installed(&harness).await;

    assert_eq!(actions.wheel_seekbar(120.0).await.expect("wheel"), Some(61.0));
    assert_eq!(actions.wheel_seekbar(-3.0).await.expect("wheel"), Some(59.0));
    assert_eq!(harness.page.state().seeks, vec![61.0, 59.0]);
}

#[tokio::test(start_paused = true)]
async fn seekbar_pointer_is_ignored_on_live_pages() {
    let harness = Harness::new(PageMode::Live, Some("777"));
    harness.page.state().stats_visible = true;
    harness.seed("777", "json", r#"[{"seconds":0.0,"name":"start"}]"#);
    let actions = installed(&harness).await;

    assert!(actions.hover_seekbar(0.5).await.is_none());
    assert_eq!(actions.wheel_seekbar(1.0).await.expect("wheel"), None);
    assert_eq!(actions.seek_to_labelled_marker().await, None);
    assert!(harness.page.state().seeks.is_empty());
}

#[tokio::test(start_paused = true)]
async fn seekbar_pointer_does_nothing_after_uninstall() {
    let harness = Harness::vod();
    harness.seed("v1", "json", r#"[{"seconds":10.0,"name":"a"}]"#);
    let controller = harness.controller();
    controller.install().await.expect("install");
    let actions = controller.actions().await.expect("actions");

    controller.uninstall().await;
    assert!(actions.hover_seekbar(0.5).await.is_none());
    assert_eq!(actions.wheel_seekbar(1.0).await.expect("wheel"), None);
    assert_eq!(label(&harness), None);
}
