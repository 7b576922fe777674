//! End-to-end exercise of the emulator link: a real in-process TCP feed,
//! a mid-prefix connection drop, and the subsequent reconnect.

use std::io::Write;
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use vrpad::input::ControllerInput;
use vrpad::provider::EmulatorProvider;
use vrpad::state::{Button, ConnectionState, ControllerSnapshot};
use vrpad::transport::protocol::{write_frame, ButtonCode, RemoteEvent, TouchAction};
use vrpad::transport::{LinkConfig, LinkMode};

fn poll_until(
    input: &mut ControllerInput,
    deadline: Duration,
    what: &str,
    condition: impl Fn(&ControllerSnapshot) -> bool,
) {
    let start = Instant::now();
    loop {
        input.poll();
        if condition(input.snapshot()) {
            return;
        }
        assert!(
            start.elapsed() < deadline,
            "timed out waiting for: {what} (state: {:?})",
            input.snapshot().connection_state
        );
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn feed_disconnect_and_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
    let port = listener.local_addr().expect("local addr").port();
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let feeder = thread::spawn(move || {
        // First connection: a few valid frames, then a torn length prefix.
        let (mut stream, _) = listener.accept().expect("first accept");
        for event in [
            RemoteEvent::Orientation {
                x: 0.0,
                y: 0.0,
                z: 0.0,
                w: 1.0,
                timestamp_ms: 1,
            },
            RemoteEvent::Touch {
                action: TouchAction::Down,
                x: 0.5,
                y: 0.25,
                timestamp_ms: 2,
            },
            RemoteEvent::Button {
                code: ButtonCode::Click,
                pressed: true,
                timestamp_ms: 3,
            },
        ] {
            write_frame(&mut stream, &event).expect("write frame");
        }
        stream.flush().expect("flush");

        // Only two of the four prefix bytes arrive before the peer vanishes.
        thread::sleep(Duration::from_millis(100));
        stream.write_all(&[0, 0]).expect("write torn prefix");
        drop(stream);

        // The client must come back on its own.
        let (mut stream, _) = listener.accept().expect("second accept");
        write_frame(
            &mut stream,
            &RemoteEvent::Button {
                code: ButtonCode::App,
                pressed: true,
                timestamp_ms: 4,
            },
        )
        .expect("write frame after reconnect");
        stream.flush().expect("flush after reconnect");

        // Keep the connection open until the test is done asserting.
        let _ = done_rx.recv();
    });

    let config = LinkConfig {
        mode: LinkMode::Wifi,
        wifi_host: "127.0.0.1".to_string(),
        port,
        read_timeout_ms: 2000,
        min_retry_interval_ms: 100,
        ..Default::default()
    };
    let provider = EmulatorProvider::new(config).expect("emulator provider");
    let mut input = ControllerInput::new(Box::new(provider));

    // Decoded events become visible through the per-frame poll.
    poll_until(
        &mut input,
        Duration::from_secs(5),
        "first connection with decoded samples",
        |s| {
            s.connection_state == ConnectionState::Connected
                && s.is_touching
                && s.buttons_held.contains(Button::TouchpadClick)
        },
    );
    assert_eq!(input.snapshot().touch_pos.x, 0.5);
    assert_eq!(input.snapshot().touch_pos.y, 0.25);

    // The torn prefix drops the connection without killing the thread.
    poll_until(
        &mut input,
        Duration::from_secs(5),
        "disconnect after torn prefix",
        |s| s.connection_state != ConnectionState::Connected,
    );

    // The reconnect loop dials again and new samples flow.
    poll_until(
        &mut input,
        Duration::from_secs(5),
        "reconnect with new samples",
        |s| {
            s.connection_state == ConnectionState::Connected
                && s.buttons_held.contains(Button::App)
        },
    );

    // Level state from the first connection is retained across the drop.
    assert!(input.snapshot().buttons_held.contains(Button::TouchpadClick));

    done_tx.send(()).ok();
    drop(input); // joins the socket thread via the provider
    feeder.join().expect("feeder thread");
}
