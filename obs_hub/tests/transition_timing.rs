mod support;

use obs_hub::{HubConfig, ObsHub};
use obs_protocol::request_type as rt;
use std::sync::Arc;
use std::time::Duration;
use support::{broadcast_world, settle, Call, FakeObs, Snapshots, World};
use tokio::time::{sleep, Instant};

async fn start_hub(world: World) -> (ObsHub, Arc<FakeObs>) {
    let (fake, events) = FakeObs::new(world);
    let config = HubConfig::new("127.0.0.1:4455").unwrap();
    let hub = ObsHub::new(&config, fake.clone(), Snapshots::default().sink(Instant::now()));
    hub.start(events);
    settle().await;
    fake.clear_calls();
    (hub, fake)
}

fn volume_sets(fake: &FakeObs, input: &str) -> Vec<Call> {
    fake.calls_of(rt::SET_INPUT_VOLUME)
        .into_iter()
        .filter(|c| c.str_field("inputName") == Some(input))
        .collect()
}

fn assert_near(actual: Duration, expected_ms: f64, tolerance_ms: f64, what: &str) {
    let actual_ms = actual.as_secs_f64() * 1000.0;
    assert!(
        (actual_ms - expected_ms).abs() <= tolerance_ms,
        "{what}: at {actual_ms} ms, expected {expected_ms} ms"
    );
}

#[tokio::test(start_paused = true)]
async fn crossfade_and_cut_follow_schedule() {
    let (hub, fake) = start_hub(broadcast_world()).await;
    assert_eq!(hub.transition_target_db(), -10.0);
    let t0 = fake.elapsed().as_secs_f64() * 1000.0;

    assert!(hub.transition());
    settle().await;

    let play = fake.calls_of(rt::TRIGGER_MEDIA_INPUT_ACTION);
    assert_eq!(play.len(), 1);
    assert_eq!(play[0].str_field("inputName"), Some("intro.mp4"));
    assert_eq!(play[0].str_field("mediaAction"), Some(obs_protocol::media_action::PLAY));
    assert_near(play[0].at, t0, 1.0, "play");

    sleep(Duration::from_secs(11)).await;
    settle().await;
    assert!(!hub.transition_running());

    assert!(volume_sets(&fake, "intro.mp4").is_empty(), "preview already at target");

    let program = volume_sets(&fake, "main.mp4");
    assert_eq!(program.len(), 161, "160 ramp steps plus the reset");
    for (i, call) in program[..160].iter().enumerate() {
        let step = i as f64 + 1.0;
        assert_eq!(call.f64_field("inputVolumeDb"), Some(-0.5 * step));
        assert_near(call.at, t0 + 62.5 * step, 1.0, "program step");
    }
    assert_near(program[159].at, t0 + 10_000.0, 1.0, "last program step");
    assert_eq!(program[160].f64_field("inputVolumeDb"), Some(0.0));

    let mutes = fake.calls_of(rt::SET_INPUT_MUTE);
    assert_eq!(mutes.len(), 1);
    assert_eq!(mutes[0].str_field("inputName"), Some("main.mp4"));
    assert_eq!(mutes[0].bool_field("inputMuted"), Some(true));
    assert!(mutes[0].at >= program[159].at && mutes[0].at <= program[160].at);

    let cut = fake.calls_of(rt::TRIGGER_STUDIO_MODE_TRANSITION);
    assert_eq!(cut.len(), 1);
    assert_near(cut[0].at, t0 + 5000.0, 1.0, "cut");

    let hotkeys = fake.calls_of(rt::TRIGGER_HOTKEY_BY_KEY_SEQUENCE);
    assert_eq!(hotkeys.len(), 1);
    assert_eq!(hotkeys[0].str_field("keyId"), Some("OBS_KEY_NUMMINUS"));
    assert!(hotkeys[0].at >= cut[0].at);

    // Roles swapped at the cut; the faded source now sits in preview.
    assert_eq!(hub.program_scene_name(), "Intro");
    assert_eq!(hub.preview_scene_name(), "Main");
    let staged = &hub.preview_sources()[0];
    assert_eq!(staged.name, "main.mp4");
    assert!(staged.muted);
    assert_eq!(staged.volume_db, 0.0);
    assert_eq!(staged.status, "main.mp4\n0.0 dB\nMuted");
}

#[tokio::test(start_paused = true)]
async fn overlapping_transition_is_rejected() {
    let (hub, fake) = start_hub(broadcast_world()).await;

    assert!(hub.transition());
    sleep(Duration::from_secs(1)).await;
    assert!(hub.transition_running());
    assert!(!hub.transition(), "second call while ramping");

    sleep(Duration::from_secs(6)).await;
    assert!(!hub.transition(), "cut done but program ramp still running");

    sleep(Duration::from_secs(4)).await;
    settle().await;
    assert_eq!(fake.calls_of(rt::TRIGGER_STUDIO_MODE_TRANSITION).len(), 1);
    assert_eq!(fake.calls_of(rt::TRIGGER_MEDIA_INPUT_ACTION).len(), 1);
    assert_eq!(volume_sets(&fake, "main.mp4").len(), 161);

    assert!(!hub.transition_running());
    assert!(hub.transition(), "accepted again once finished");
    hub.shutdown();
}

#[tokio::test(start_paused = true)]
async fn muted_preview_starts_from_floor() {
    let mut world = broadcast_world();
    world.echo_events = false;
    {
        let intro = world.inputs.get_mut("intro.mp4").unwrap();
        intro.volume_db = -30.0;
        intro.muted = true;
    }
    let (hub, fake) = start_hub(world).await;
    assert_eq!(hub.transition_target_db(), -30.0);
    hub.set_transition_target_db(-10.0);
    hub.set_transition_crossfade_duration_secs(2.0);
    let t0 = fake.elapsed().as_secs_f64() * 1000.0;

    assert!(hub.transition());
    settle().await;
    let intro = volume_sets(&fake, "intro.mp4");
    assert_eq!(intro[0].f64_field("inputVolumeDb"), Some(-80.0));
    let unmute = fake.calls_of(rt::SET_INPUT_MUTE);
    assert_eq!(unmute[0].str_field("inputName"), Some("intro.mp4"));
    assert_eq!(unmute[0].bool_field("inputMuted"), Some(false));

    sleep(Duration::from_secs(6)).await;
    settle().await;

    let intro = volume_sets(&fake, "intro.mp4");
    assert_eq!(intro.len(), 1 + 140);
    assert_eq!(intro[1].f64_field("inputVolumeDb"), Some(-79.5));
    assert_eq!(intro[140].f64_field("inputVolumeDb"), Some(-10.0));
    assert_near(intro[140].at, t0 + 2000.0, 1.0, "preview ramp end");

    let main = volume_sets(&fake, "main.mp4");
    assert_eq!(main.len(), 161);
    assert_near(main[0].at, t0 + 12.5, 1.0, "first program step");
    assert_near(main[159].at, t0 + 2000.0, 1.0, "program ramp end");

    // No push events in this world; the ramp results are written back by name.
    let preview = &hub.preview_sources()[0];
    assert_eq!(preview.volume_db, -10.0);
    assert!(!preview.muted);
    let program = &hub.program_sources()[0];
    assert_eq!(program.volume_db, 0.0);
    assert!(program.muted);
}

#[tokio::test(start_paused = true)]
async fn loud_preview_skips_crossfade_but_still_cuts() {
    let (hub, fake) = start_hub(broadcast_world()).await;
    hub.set_transition_target_db(-20.0);

    assert!(hub.transition());
    sleep(Duration::from_secs(6)).await;
    settle().await;

    assert!(fake.calls_of(rt::SET_INPUT_VOLUME).is_empty());
    assert!(fake.calls_of(rt::SET_INPUT_MUTE).is_empty());
    assert_eq!(fake.calls_of(rt::TRIGGER_STUDIO_MODE_TRANSITION).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_cut() {
    let (hub, fake) = start_hub(broadcast_world()).await;

    assert!(hub.transition());
    sleep(Duration::from_secs(1)).await;
    hub.shutdown();
    let ramp_steps = volume_sets(&fake, "main.mp4").len();

    sleep(Duration::from_secs(15)).await;
    assert!(fake.calls_of(rt::TRIGGER_STUDIO_MODE_TRANSITION).is_empty());
    assert_eq!(volume_sets(&fake, "main.mp4").len(), ramp_steps);
}

#[tokio::test(start_paused = true)]
async fn oversized_delay_holds_the_cut() {
    let (hub, fake) = start_hub(broadcast_world()).await;
    hub.set_transition_visual_delay_secs(1e30);

    assert!(hub.transition());
    sleep(Duration::from_secs(60)).await;
    settle().await;

    assert!(fake.calls_of(rt::TRIGGER_STUDIO_MODE_TRANSITION).is_empty());
    assert!(fake.calls_of(rt::TRIGGER_HOTKEY_BY_KEY_SEQUENCE).is_empty());
    assert_eq!(volume_sets(&fake, "main.mp4").len(), 161, "fade still completes");
    assert!(hub.transition_running(), "cut still pending");
    hub.shutdown();
}
