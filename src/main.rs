//! astro-live binary entry point.

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use astro_live::audio::{AudioFocusGuard, PlatformCapabilities, SoftwareAudioDevice};
use astro_live::chart::{BirthDetails, ChartApiClient, ChartRepository, LocalStore};
use astro_live::cli::{self, Args, ArgsError, Command};
use astro_live::config::Config;
use astro_live::live::{
    AudioBridge, AudioChunk, GeminiLiveEndpoint, LiveEvent, LiveSessionManager, ManagerState,
    SessionConfig, StaticPermission,
};
use astro_live::logging;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

type AppResult = Result<(), Box<dyn Error>>;

/// 100 ms of 16 kHz mono 16-bit PCM.
const MIC_CHUNK_BYTES: usize = 3200;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Try 'astro-live --help' for more information.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if logging::init_with_filter(config.log_filter()).is_err() {
        eprintln!("warning: logging was already initialized");
    }
    debug!(store = %config.storage.path.display(), "configuration loaded");

    let result = match args.command {
        Some(Command::Fetch) => fetch(&args, &config).await,
        Some(Command::Show) => show(&args, &config),
        Some(Command::Users) => users(&config),
        Some(Command::Talk) => talk(&args, &config).await,
        None => {
            cli::print_help();
            return ExitCode::from(2);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn required<T: Clone>(value: &Option<T>, name: &'static str) -> Result<T, ArgsError> {
    value.clone().ok_or(ArgsError::Missing(name))
}

async fn fetch(args: &Args, config: &Config) -> AppResult {
    let (hours, minutes, seconds) = required(&args.time, "time")?;
    let details = BirthDetails {
        name: required(&args.name, "name")?,
        date: required(&args.date, "date")?,
        hours,
        minutes,
        seconds,
        place: args.place.clone().unwrap_or_default(),
        latitude: required(&args.latitude, "lat")?,
        longitude: required(&args.longitude, "lon")?,
        timezone: config.chart_api.timezone,
    };
    let request = details.to_request()?;

    if config.chart_api.api_key.is_none() {
        warn!("no astrology API key configured; set ASTRO_LIVE_API_KEY");
    }

    let store = Arc::new(LocalStore::open(&config.storage.path)?);
    let client = ChartApiClient::from_settings(&config.chart_api)?;
    let repository = ChartRepository::new(Arc::new(client), store.clone());

    let profile = details.to_profile();
    let reading = repository.fetch_and_save(&profile.name, &request).await?;
    store.upsert_user(profile.clone())?;

    info!(user_id = %profile.user_id, username = %reading.username, "profile stored");
    println!(
        "Saved chart reading for {} ({} {} at {})",
        reading.username, profile.birth_date, profile.birth_time, profile.place
    );
    Ok(())
}

fn show(args: &Args, config: &Config) -> AppResult {
    let username = required(&args.user, "user")?;
    let store = LocalStore::open(&config.storage.path)?;
    let reading = store
        .reading(&username)?
        .ok_or(astro_live::AstroLiveError::UserNotFound(username))?;

    println!("{}", serde_json::to_string_pretty(&reading)?);
    Ok(())
}

fn users(config: &Config) -> AppResult {
    let store = LocalStore::open(&config.storage.path)?;

    println!("Profiles ({}):", store.user_count()?);
    for user in store.users()? {
        println!(
            "  {}  {:<20} {} {}  {}",
            user.user_id, user.name, user.birth_date, user.birth_time, user.place
        );
    }

    println!("Readings:");
    for reading in store.readings()? {
        println!(
            "  {:<20} {}",
            reading.username,
            reading.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}

async fn talk(args: &Args, config: &Config) -> AppResult {
    let username = required(&args.user, "user")?;
    let api_key = config
        .live
        .api_key
        .clone()
        .ok_or("no live model API key configured; set ASTRO_LIVE_GEMINI_KEY")?;

    let store = Arc::new(LocalStore::open(&config.storage.path)?);
    let context = store
        .reading(&username)?
        .map(|r| r.to_context())
        .ok_or(astro_live::AstroLiveError::UserNotFound(username.clone()))?;
    let session_config = SessionConfig::for_chart(&config.live, &context);

    let (bridge, mic_tx, events_rx) = AudioBridge::channel(64);
    let endpoint = GeminiLiveEndpoint::new(&config.live, api_key, bridge);
    let capabilities = args
        .api_level
        .map(PlatformCapabilities::new)
        .unwrap_or_default();
    let guard = AudioFocusGuard::new(Arc::new(SoftwareAudioDevice::new()), capabilities);

    let manager = LiveSessionManager::with_policy(
        session_config,
        Arc::new(endpoint),
        guard,
        Arc::new(StaticPermission::granted()),
        config.reconnect_policy(),
    );

    let microphone = tokio::spawn(read_microphone(mic_tx));
    let speaker = tokio::spawn(play_events(events_rx));

    let mut state = manager.subscribe_state();
    manager.start()?;
    info!(username = %username, language = %config.live.language, "consultation started");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == ManagerState::Stopped {
                    warn!("live session gave up reconnecting");
                    break;
                }
            }
        }
    }

    manager.stop().await;
    microphone.abort();
    speaker.abort();
    Ok(())
}

/// Forward stdin PCM to the live session.
async fn read_microphone(mic: mpsc::Sender<AudioChunk>) {
    let mut stdin = tokio::io::stdin();
    let mut buf = vec![0u8; MIC_CHUNK_BYTES];

    loop {
        match stdin.read(&mut buf).await {
            Ok(0) => {
                debug!("microphone input ended");
                break;
            }
            Ok(n) => {
                let chunk = AudioChunk {
                    pcm: buf[..n].to_vec(),
                };
                if mic.send(chunk).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to read microphone input");
                break;
            }
        }
    }
}

/// Write model audio to stdout and log text.
async fn play_events(mut events: mpsc::Receiver<LiveEvent>) {
    let mut stdout = tokio::io::stdout();

    while let Some(event) = events.recv().await {
        match event {
            LiveEvent::Audio { pcm, .. } => {
                if let Err(e) = stdout.write_all(&pcm).await {
                    warn!(error = %e, "failed to write audio output");
                    break;
                }
                stdout.flush().await.ok();
            }
            LiveEvent::Text(text) => info!(text = %text, "model text"),
            LiveEvent::TurnComplete => debug!("turn complete"),
            LiveEvent::Interrupted => debug!("model interrupted"),
            LiveEvent::GoAway => info!("server ending connection"),
        }
    }
}
