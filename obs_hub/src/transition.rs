use crate::client::ObsApi;
use crate::config::TimetablePolarity;
use crate::error::HubError;
use crate::lock;
use crate::mirror::{MirrorState, Role};
use crate::requests;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const STEP_DB: f64 = 0.5;
pub const MUTE_FLOOR_DB: f64 = -80.0;
pub const RESTORE_DB: f64 = 0.0;
const MIN_TICK: Duration = Duration::from_millis(1);
/// Ceiling for any scheduled wait; longer requests saturate here.
const MAX_WAIT: Duration = Duration::from_secs(u32::MAX as u64);

pub const TIMETABLE_KEY_A: &str = "OBS_KEY_NUMMINUS";
pub const TIMETABLE_KEY_B: &str = "OBS_KEY_NUMASTERISK";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimetableDirection {
    Advance,
    Retract,
}

pub fn timetable_key(polarity: TimetablePolarity, direction: TimetableDirection) -> &'static str {
    match (polarity, direction) {
        (TimetablePolarity::Advance, TimetableDirection::Advance)
        | (TimetablePolarity::Retract, TimetableDirection::Retract) => TIMETABLE_KEY_A,
        (TimetablePolarity::Advance, TimetableDirection::Retract)
        | (TimetablePolarity::Retract, TimetableDirection::Advance) => TIMETABLE_KEY_B,
    }
}

/// Zero for NaN or non-positive input, `MAX_WAIT` for anything too large.
fn wait_from_secs(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).map_or(MAX_WAIT, |d| d.min(MAX_WAIT))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampPlan {
    pub start_db: f64,
    /// Signed per-tick change.
    pub step_db: f64,
    pub steps: u32,
    pub interval: Duration,
}

impl RampPlan {
    fn new(start_db: f64, end_db: f64, duration_secs: f64) -> Option<Self> {
        let span = end_db - start_db;
        let steps = (span.abs() / STEP_DB).round();
        if !steps.is_finite() || steps < 1.0 || span == 0.0 {
            return None;
        }
        let interval = wait_from_secs(duration_secs / steps).max(MIN_TICK);
        Some(Self {
            start_db,
            step_db: STEP_DB.copysign(span),
            steps: steps.min(u32::MAX as f64) as u32,
            interval,
        })
    }

    pub fn end_db(&self) -> f64 {
        self.start_db + self.step_db * f64::from(self.steps)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossfadePlan {
    pub preview: Option<RampPlan>,
    pub program: Option<RampPlan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CrossfadeAbort {
    #[error("preview is already at {preview_db} dB, above the {target_db} dB target")]
    PreviewAboveTarget { preview_db: f64, target_db: f64 },
}

/// Preview ramps up to the target, program ramps down to the mute floor,
/// each paced independently over the same nominal duration.
pub fn plan_crossfade(
    preview_db: f64,
    program_db: f64,
    target_db: f64,
    duration_secs: f64,
) -> Result<CrossfadePlan, CrossfadeAbort> {
    if preview_db > target_db {
        return Err(CrossfadeAbort::PreviewAboveTarget {
            preview_db,
            target_db,
        });
    }
    Ok(CrossfadePlan {
        preview: RampPlan::new(preview_db, target_db, duration_secs),
        program: RampPlan::new(program_db, MUTE_FLOOR_DB, duration_secs)
            .filter(|r| r.step_db < 0.0),
    })
}

struct InFlight {
    crossfade: JoinHandle<()>,
    cut: JoinHandle<()>,
}

impl InFlight {
    fn is_running(&self) -> bool {
        !self.crossfade.is_finished() || !self.cut.is_finished()
    }
}

#[derive(Clone)]
pub struct TransitionScheduler {
    api: Arc<dyn ObsApi>,
    state: Arc<Mutex<MirrorState>>,
    in_flight: Arc<Mutex<Option<InFlight>>>,
}

impl TransitionScheduler {
    pub fn new(api: Arc<dyn ObsApi>, state: Arc<Mutex<MirrorState>>) -> Self {
        Self {
            api,
            state,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.in_flight).as_ref().is_some_and(InFlight::is_running)
    }

    /// Starts the crossfade and schedules the visual cut. A second call while
    /// the first is still ramping or waiting to cut is refused.
    pub fn transition(&self) -> bool {
        let mut in_flight = lock(&self.in_flight);
        if in_flight.as_ref().is_some_and(InFlight::is_running) {
            warn!("transition already in progress; ignoring");
            return false;
        }

        let (local_preview, visual_delay) = {
            let st = lock(&self.state);
            let local = st
                .primary(Role::Preview)
                .filter(|s| s.is_local_file)
                .map(|s| s.name.clone());
            (local, st.transition.visual_delay_secs)
        };

        if let Some(name) = local_preview {
            let api = Arc::clone(&self.api);
            tokio::spawn(async move {
                let play = obs_protocol::media_action::PLAY;
                if let Err(e) = requests::trigger_media_action(api.as_ref(), &name, play).await {
                    warn!(input = %name, "could not start preview media: {e}");
                }
            });
        }

        let this = self.clone();
        let crossfade = tokio::spawn(async move { this.crossfade().await });

        let this = self.clone();
        let delay = wait_from_secs(visual_delay);
        let cut = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = requests::trigger_studio_mode_transition(this.api.as_ref()).await {
                warn!("visual cut failed: {e}");
            }
            if let Err(e) = this.timetable(TimetableDirection::Advance).await {
                warn!("timetable advance failed: {e}");
            }
        });

        info!(visual_delay_secs = visual_delay, "transition started");
        *in_flight = Some(InFlight { crossfade, cut });
        true
    }

    pub fn shutdown(&self) {
        if let Some(f) = lock(&self.in_flight).take() {
            f.crossfade.abort();
            f.cut.abort();
        }
    }

    async fn crossfade(&self) {
        let (preview, program, target_db, duration_secs) = {
            let st = lock(&self.state);
            (
                st.primary(Role::Preview).cloned(),
                st.primary(Role::Program).cloned(),
                st.transition.target_db,
                st.transition.crossfade_secs,
            )
        };
        let (Some(mut preview), Some(program)) = (preview, program) else {
            debug!("crossfade needs both a preview and a program source");
            return;
        };
        let api = self.api.as_ref();

        if preview.muted {
            // Start from a known level rather than whatever was under the mute.
            let floor = requests::set_input_volume_db(api, &preview.name, MUTE_FLOOR_DB).await;
            if let Err(e) = floor {
                warn!(input = %preview.name, "crossfade aborted: {e}");
                return;
            }
            if let Err(e) = requests::set_input_mute(api, &preview.name, false).await {
                warn!(input = %preview.name, "crossfade aborted: {e}");
                return;
            }
            preview.volume_db = MUTE_FLOOR_DB;
        }

        if program.volume_db < MUTE_FLOOR_DB {
            info!(input = %program.name, "program already below the mute floor");
        }

        let plan = plan_crossfade(
            preview.volume_db,
            program.volume_db,
            target_db,
            duration_secs,
        );
        let plan = match plan {
            Ok(plan) => plan,
            Err(abort) => {
                info!(input = %preview.name, "crossfade skipped: {abort}");
                return;
            }
        };
        info!(
            preview = %preview.name,
            preview_steps = plan.preview.map_or(0, |r| r.steps),
            program = %program.name,
            program_steps = plan.program.map_or(0, |r| r.steps),
            "crossfade"
        );

        let preview_ramp = async {
            let Some(ramp) = plan.preview else { return };
            let db = self.run_ramp(&preview.name, ramp).await;
            lock(&self.state).update_source_named(&preview.name, |s| {
                s.volume_db = db;
                s.muted = false;
            });
        };

        let program_ramp = async {
            let Some(ramp) = plan.program else { return };
            self.run_ramp(&program.name, ramp).await;
            // Leave it silent but at nominal level for when it is next staged.
            if let Err(e) = requests::set_input_mute(api, &program.name, true).await {
                warn!(input = %program.name, "could not mute faded program: {e}");
            }
            if let Err(e) = requests::set_input_volume_db(api, &program.name, RESTORE_DB).await {
                warn!(input = %program.name, "could not restore program level: {e}");
            }
            lock(&self.state).update_source_named(&program.name, |s| {
                s.volume_db = RESTORE_DB;
                s.muted = true;
            });
        };

        tokio::join!(preview_ramp, program_ramp);
    }

    /// Works on a private copy of the level so push events arriving mid-ramp
    /// cannot pull it back.
    async fn run_ramp(&self, input: &str, ramp: RampPlan) -> f64 {
        let mut ticker = interval_at(Instant::now() + ramp.interval, ramp.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut db = ramp.start_db;
        for _ in 0..ramp.steps {
            ticker.tick().await;
            db += ramp.step_db;
            if let Err(e) = requests::set_input_volume_db(self.api.as_ref(), input, db).await {
                warn!(input, "crossfade step failed: {e}");
            }
        }
        db
    }

    pub async fn timetable(&self, direction: TimetableDirection) -> Result<(), HubError> {
        let polarity = lock(&self.state).transition.polarity;
        let key = timetable_key(polarity, direction);
        debug!(?direction, %polarity, key, "timetable signal");
        requests::trigger_hotkey_by_key_sequence(self.api.as_ref(), key).await
    }

    pub async fn advance_timetable(&self) -> Result<(), HubError> {
        self.timetable(TimetableDirection::Advance).await
    }

    pub async fn retract_timetable(&self) -> Result<(), HubError> {
        self.timetable(TimetableDirection::Retract).await
    }

    /// Nudging the preview also moves the crossfade target with it.
    ///
    /// The cached level is bumped before the request goes out so repeated
    /// nudges accumulate; the push echo later overwrites it with the value
    /// the remote actually applied.
    pub async fn nudge(&self, role: Role, delta_db: f64) -> Result<(), HubError> {
        let (name, db) = {
            let mut st = lock(&self.state);
            let Some(source) = st.primary_mut(role) else {
                return Ok(());
            };
            source.volume_db += delta_db;
            source.refresh_status();
            let next = (source.name.clone(), source.volume_db);
            if role == Role::Preview {
                st.transition.target_db += delta_db;
            }
            next
        };
        requests::set_input_volume_db(self.api.as_ref(), &name, db).await
    }
}
