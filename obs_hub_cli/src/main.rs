use clap::Parser;
use obs_hub::config::{
    DEFAULT_CROSSFADE_SECS, DEFAULT_OBS_ADDRESS, DEFAULT_TARGET_DB, DEFAULT_VISUAL_DELAY_SECS,
};
use obs_hub::{guard_volume_db, HubConfig, ObsClient, ObsHub, TimetablePolarity, EVENT_CAP};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "obs_hub")]
struct Args {
    #[arg(long, env = "OBS_ADDRESS", default_value = DEFAULT_OBS_ADDRESS)]
    obs_address: String,

    /// `advance` or `retract`, depending on how the timetable device is mounted.
    #[arg(long, env = "TIMETABLE_POLARITY", default_value_t = TimetablePolarity::Advance)]
    timetable_polarity: TimetablePolarity,

    /// Passthrough scene whose item visibility follows the live sources.
    #[arg(long, env = "OBS_AUX_SCENE")]
    aux_scene: Option<String>,

    #[arg(long, default_value_t = DEFAULT_TARGET_DB, allow_negative_numbers = true)]
    target_db: f64,

    #[arg(long, default_value_t = DEFAULT_CROSSFADE_SECS)]
    crossfade_secs: f64,

    #[arg(long, default_value_t = DEFAULT_VISUAL_DELAY_SECS)]
    visual_delay_secs: f64,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = HubConfig::new(&args.obs_address)?;
    config.timetable_polarity = args.timetable_polarity;
    config.aux_scene = args.aux_scene.filter(|s| !s.trim().is_empty());
    config.transition_target_db = guard_volume_db(args.target_db)?;
    for secs in [args.crossfade_secs, args.visual_delay_secs] {
        if !secs.is_finite() || secs < 0.0 {
            anyhow::bail!("durations must be finite and not negative, got {secs}");
        }
    }
    config.transition_crossfade_secs = args.crossfade_secs;
    config.transition_visual_delay_secs = args.visual_delay_secs;

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(run(config))
}

async fn run(config: HubConfig) -> anyhow::Result<()> {
    info!(
        address = %config.obs_address,
        polarity = %config.timetable_polarity,
        aux_scene = config.aux_scene.as_deref().unwrap_or("-"),
        "starting"
    );

    let (events_tx, events_rx) = mpsc::channel(EVENT_CAP);
    let client = Arc::new(ObsClient::new(
        config.obs_address.clone(),
        config.request_timeout,
        events_tx,
    ));

    let hub = ObsHub::new(&config, client.clone(), |snapshot| {
        match serde_json::to_string(&snapshot) {
            Ok(json) => info!(connected = snapshot.is_connected(), "state: {json}"),
            Err(e) => warn!("could not serialise snapshot: {e}"),
        }
    });
    hub.start(events_rx);

    tokio::signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    hub.shutdown();
    client.disconnect();
    Ok(())
}
