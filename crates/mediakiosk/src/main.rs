//! MediaKiosk - full-screen media center for USB media, streaming and WiFi.
//!
//! The device watcher runs on its own thread. Everything else lives on a
//! current-thread runtime: the USB tick, the playback pump and menu input.

mod logging;
mod shell;

use std::process::ExitCode;
use std::sync::Arc;

use mediakiosk_core::{
    AppConfig, BrowserLauncher, Clock, ConfigManager, DeviceWatcher, ExternalPlayerEngine,
    MediaEngine, NetworkPanel, NmcliNetworkProvider, SessionKind, StreamingSession, SystemClock,
    UsbSession, event_channel,
};
use shell::{Command, Flow, Kiosk, ParseError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

/// Anything that stops the kiosk from starting.
#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Logging(#[from] logging::LoggingError),
    #[error(transparent)]
    Core(#[from] mediakiosk_core::Error),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("mediakiosk: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let _logging = logging::init(&logging::LoggingConfig::auto())?;
    info!("Starting MediaKiosk");

    let manager = ConfigManager::new()?;
    let config = manager.config().clone();

    let (sender, receiver) = event_channel();
    let watcher = DeviceWatcher::with_system_sources(config.usb.watcher.clone()).spawn(sender)?;

    let mut kiosk = build_kiosk(&config, receiver)?;
    let mut tick = interval(config.usb.tick_interval());
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pump = interval(config.playback.pump_interval());
    pump.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut shown = kiosk.render();
    print!("{shown}");

    loop {
        tokio::select! {
            _ = tick.tick() => kiosk.tick(),
            _ = pump.tick() => kiosk.pump(),
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => match line.parse::<Command>() {
                    Ok(command) => {
                        let (flow, message) = kiosk.handle(command);
                        debug!(
                            screen = ?kiosk.screen(),
                            window = ?kiosk.usb().window_category(),
                            "Command applied"
                        );
                        if let Some(message) = message {
                            println!("{message}");
                        }
                        if flow == Flow::Exit {
                            break;
                        }
                    }
                    Err(ParseError::Empty) => shown.clear(),
                    Err(e) => println!("{e}"),
                },
                Ok(None) => {
                    info!("Input closed");
                    break;
                }
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            },
        }

        let screen = kiosk.render();
        if screen != shown {
            print!("{screen}");
            shown = screen;
        }
    }

    kiosk.shutdown();
    watcher.stop();
    info!("MediaKiosk stopped");
    Ok(())
}

fn build_kiosk(
    config: &AppConfig,
    receiver: mediakiosk_core::EventReceiver,
) -> Result<Kiosk, StartupError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let players = config.players.clone();
    let engines = move |kind: SessionKind| -> Box<dyn MediaEngine> {
        Box::new(ExternalPlayerEngine::for_kind(kind, &players))
    };
    let usb = UsbSession::new(
        receiver,
        Box::new(engines),
        Arc::clone(&clock),
        config.playback,
    );

    let network = NetworkPanel::new(Box::new(NmcliNetworkProvider::new(&config.network)?));
    let streaming = StreamingSession::new(
        Box::new(BrowserLauncher::new(config.streaming.browser.clone())),
        config.streaming.clone(),
        clock,
    );

    Ok(Kiosk::new(usb, network, streaming))
}
