use chrono::{DateTime, Duration, Local};
use nalgebra::Vector2;
use tracing::warn;

use crate::state::{Button, ButtonMask, ControllerSnapshot};

/// State of the gesture recognizer for the current frame. `Start` and `End`
/// are transient: true for exactly the frame the gesture begins or
/// concludes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GestureState {
    #[default]
    Idle,
    Start,
    Update,
    End,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GestureDirection {
    Up,
    Down,
    Left,
    Right,
    #[default]
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GestureKind {
    Swipe,
    ScrollStart,
    ScrollUpdate,
    ScrollEnd,
}

/// One active gesture as reported by the underlying detector. Displacement
/// and velocity are in the detector's own convention (touchpad space, Y
/// growing downward); the engine flips Y before exposing them.
#[derive(Clone, Copy, Debug)]
pub struct GestureRecord {
    pub kind: GestureKind,
    pub direction: GestureDirection,
    pub displacement: Vector2<f32>,
    pub velocity: Vector2<f32>,
}

/// The algorithmic gesture detector consuming the raw sample stream. Called
/// once per frame with the freshly published snapshot; returns the records
/// active in that frame (zero when idle).
pub trait GestureDetector: Send {
    fn update(&mut self, snapshot: &ControllerSnapshot) -> &[GestureRecord];
}

const LONG_PRESS_THRESHOLD_MS: i64 = 500;

// Priority order for long-press reporting; the first long-pressed entry
// wins.
const WATCHED_BUTTONS: [Button; 5] = [
    Button::TouchpadClick,
    Button::System,
    Button::App,
    Button::VolumeUp,
    Button::VolumeDown,
];

// Tracks how long each watched button has been held.
#[derive(Debug, Default)]
struct LongPressTracker {
    pressed_since: [Option<DateTime<Local>>; WATCHED_BUTTONS.len()],
    current: Option<Button>,
}

impl LongPressTracker {
    fn update_at(&mut self, held: ButtonMask, now: DateTime<Local>) {
        self.current = None;
        for (slot, button) in WATCHED_BUTTONS.iter().enumerate() {
            if held.contains(*button) {
                let since = *self.pressed_since[slot].get_or_insert(now);
                if self.current.is_none()
                    && now - since >= Duration::milliseconds(LONG_PRESS_THRESHOLD_MS)
                {
                    self.current = Some(*button);
                }
            } else {
                self.pressed_since[slot] = None;
            }
        }
    }

    fn current(&self) -> Option<Button> {
        self.current
    }
}

/// Per-frame gesture recognition over the published controller snapshot:
/// a four-state swipe/scroll machine plus long-press detection.
pub struct GestureEngine {
    detector: Option<Box<dyn GestureDetector>>,
    long_press: LongPressTracker,
    state: GestureState,
    direction: GestureDirection,
    displacement: Vector2<f32>,
    velocity: Vector2<f32>,
    record_count: usize,
}

impl GestureEngine {
    pub fn new(detector: Option<Box<dyn GestureDetector>>) -> Self {
        Self {
            detector,
            long_press: LongPressTracker::default(),
            state: GestureState::Idle,
            direction: GestureDirection::None,
            displacement: Vector2::zeros(),
            velocity: Vector2::zeros(),
            record_count: 0,
        }
    }

    pub fn with_default_detector() -> Self {
        Self::new(Some(Box::new(TouchpadSwipeDetector::new())))
    }

    /// Advances the recognizer by one frame. Returns false (and changes
    /// nothing) when no detector is installed.
    pub fn update(&mut self, snapshot: &ControllerSnapshot) -> bool {
        let Some(detector) = self.detector.as_mut() else {
            return false;
        };

        let (count, first) = {
            let records = detector.update(snapshot);
            (records.len(), records.first().copied())
        };
        self.record_count = count;

        match first {
            None => {
                self.state = GestureState::Idle;
                self.direction = GestureDirection::None;
                self.displacement = Vector2::zeros();
                self.velocity = Vector2::zeros();
            }
            Some(record) => {
                self.state = match record.kind {
                    GestureKind::ScrollStart => GestureState::Start,
                    GestureKind::ScrollUpdate => GestureState::Update,
                    GestureKind::ScrollEnd => GestureState::End,
                    GestureKind::Swipe => {
                        warn!("Detector reported a leading swipe record; treating as idle");
                        GestureState::Idle
                    }
                };
                self.direction = record.direction;
                // Flip Y out of the detector's touchpad convention.
                self.displacement = Vector2::new(record.displacement.x, -record.displacement.y);
                self.velocity = Vector2::new(record.velocity.x, -record.velocity.y);
            }
        }

        self.long_press.update_at(snapshot.buttons_held, Local::now());
        true
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    /// True exactly when the detector reported two simultaneous records in
    /// the last update; that count is the detector's swipe signal.
    pub fn swipe_detected(&self) -> bool {
        self.record_count == 2
    }

    pub fn direction(&self) -> GestureDirection {
        self.direction
    }

    pub fn displacement(&self) -> Vector2<f32> {
        self.displacement
    }

    pub fn velocity(&self) -> Vector2<f32> {
        self.velocity
    }

    pub fn long_press_button(&self) -> Option<Button> {
        self.long_press.current()
    }
}

// A touchpad fling must travel at least this far (normalized units) within
// the duration cap to count as a swipe.
const SWIPE_MIN_DISPLACEMENT: f32 = 0.15;
const SWIPE_MAX_DURATION_MS: i64 = 300;

/// Built-in detector recognizing scroll sessions and swipes from touchpad
/// samples. A scroll session opens on touch-down and closes on touch-up; a
/// session that ends fast and far enough additionally reports a swipe
/// record next to the closing scroll record.
pub struct TouchpadSwipeDetector {
    records: Vec<GestureRecord>,
    tracking: bool,
    origin: Vector2<f32>,
    last_pos: Vector2<f32>,
    last_update: DateTime<Local>,
    started_at: DateTime<Local>,
    velocity: Vector2<f32>,
}

impl TouchpadSwipeDetector {
    pub fn new() -> Self {
        let now = Local::now();
        Self {
            records: Vec::with_capacity(2),
            tracking: false,
            origin: Vector2::zeros(),
            last_pos: Vector2::zeros(),
            last_update: now,
            started_at: now,
            velocity: Vector2::zeros(),
        }
    }

    fn step(&mut self, snapshot: &ControllerSnapshot, now: DateTime<Local>) -> &[GestureRecord] {
        self.records.clear();

        if snapshot.touch_down {
            self.tracking = true;
            self.origin = snapshot.touch_pos;
            self.last_pos = snapshot.touch_pos;
            self.started_at = now;
            self.last_update = now;
            self.velocity = Vector2::zeros();
            self.records.push(GestureRecord {
                kind: GestureKind::ScrollStart,
                direction: GestureDirection::None,
                displacement: Vector2::zeros(),
                velocity: Vector2::zeros(),
            });
        } else if snapshot.touch_up && self.tracking {
            self.tracking = false;
            let displacement = snapshot.touch_pos - self.origin;
            let direction = dominant_direction(displacement);
            self.records.push(GestureRecord {
                kind: GestureKind::ScrollEnd,
                direction,
                displacement,
                velocity: self.velocity,
            });

            let duration = now - self.started_at;
            if displacement.norm() >= SWIPE_MIN_DISPLACEMENT
                && duration <= Duration::milliseconds(SWIPE_MAX_DURATION_MS)
            {
                self.records.push(GestureRecord {
                    kind: GestureKind::Swipe,
                    direction,
                    displacement,
                    velocity: self.velocity,
                });
            }
        } else if snapshot.is_touching && self.tracking {
            let displacement = snapshot.touch_pos - self.origin;
            let dt_ms = (now - self.last_update).num_milliseconds().max(1);
            let instantaneous = (snapshot.touch_pos - self.last_pos) / (dt_ms as f32 / 1000.0);
            self.velocity = (instantaneous + self.velocity) / 2.0;
            self.last_pos = snapshot.touch_pos;
            self.last_update = now;
            self.records.push(GestureRecord {
                kind: GestureKind::ScrollUpdate,
                direction: dominant_direction(displacement),
                displacement,
                velocity: self.velocity,
            });
        }

        &self.records
    }
}

impl Default for TouchpadSwipeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl GestureDetector for TouchpadSwipeDetector {
    fn update(&mut self, snapshot: &ControllerSnapshot) -> &[GestureRecord] {
        self.step(snapshot, Local::now())
    }
}

// Dominant axis of a displacement in touchpad space (Y grows downward).
fn dominant_direction(displacement: Vector2<f32>) -> GestureDirection {
    if displacement == Vector2::zeros() {
        return GestureDirection::None;
    }
    if displacement.x.abs() >= displacement.y.abs() {
        if displacement.x > 0.0 {
            GestureDirection::Right
        } else {
            GestureDirection::Left
        }
    } else if displacement.y > 0.0 {
        GestureDirection::Down
    } else {
        GestureDirection::Up
    }
}
