use color_eyre::Result;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use vrpad::config::Config;
use vrpad::input::ControllerInput;
use vrpad::provider::create_provider;
use vrpad::state::{Button, ConnectionState};
use vrpad::GestureState;

// Stand-in for the host render loop: polls the controller at ~60 Hz and
// prints state transitions.
#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = Config::default_path()?;
    Config::ensure_default_config(&config_path)?;
    let config = Config::load_or_default(&config_path);
    info!(
        "Starting vrpad monitor: provider {:?}, link {:?} {}:{}",
        config.provider,
        config.link.mode,
        config.link.host(),
        config.link.port
    );

    let provider = create_provider(config.provider, config.link.clone(), None)?;
    let mut input = ControllerInput::new(provider);

    let mut ticker = tokio::time::interval(Duration::from_millis(16));
    let mut last_connection = ConnectionState::Disconnected;
    let mut last_gesture = GestureState::Idle;
    let mut last_long_press: Option<Button> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                input.poll();
                let snapshot = input.snapshot();

                if snapshot.connection_state != last_connection {
                    // The facade logs the transition; print the user-facing line too.
                    println!("{}", snapshot.connection_state);
                    last_connection = snapshot.connection_state;
                }

                if !snapshot.buttons_down.is_empty() {
                    info!("Buttons down: {:#x}", snapshot.buttons_down.0);
                }
                if !snapshot.buttons_up.is_empty() {
                    info!("Buttons up: {:#x}", snapshot.buttons_up.0);
                }
                if snapshot.recentered {
                    info!("Controller recentered");
                }

                let gesture = input.gesture_state();
                if gesture != last_gesture {
                    info!(
                        "Gesture {:?} ({:?}, displacement {:.3?})",
                        gesture,
                        input.gesture_direction(),
                        input.gesture_displacement()
                    );
                    if input.swipe_detected() {
                        info!("Swipe detected");
                    }
                    last_gesture = gesture;
                }

                let long_press = input.long_press_button();
                if long_press != last_long_press {
                    if let Some(button) = long_press {
                        info!("Long press: {:?}", button);
                    }
                    last_long_press = long_press;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
