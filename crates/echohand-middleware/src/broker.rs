//! Shared glove state store with a revision-based change signal.
//!
//! [`StateBroker`] owns one [`StateSnapshot`] worth of fields. Each field has
//! exactly one logical writer (the sampler writes finger angles, joystick and
//! buttons; the command relay writes servo targets and vibration speeds) and
//! any number of readers.
//!
//! # Consistency
//!
//! The field block sits behind a read-write lock held only for the duration
//! of a copy, so [`StateBroker::take_snapshot`] always returns one fully
//! formed version. Writers that update several fields at once go through
//! [`StateBroker::batch`] so readers see the whole frame or none of it.
//!
//! Every individual field write bumps the revision by one. Consumers keep the
//! last revision they handled and call [`StateBroker::snapshot_if_changed`]
//! (or compare [`StateBroker::revision`]) to skip work when nothing moved.
//!
//! # Index policy
//!
//! Index-addressed setters ignore out-of-range indices without storing or
//! bumping the revision; getters return `0` for them. Neither ever panics.
//!
//! # Wraparound
//!
//! The revision is a `u32` that wraps to `0` after `u32::MAX`. Change
//! detection uses `!=`, so the only failure mode is a single missed change
//! for a reader whose stored revision happens to equal the wrapped value.
//!
//! # Example
//!
//! ```rust
//! use echohand_middleware::StateBroker;
//!
//! let broker = StateBroker::new();
//! let seen = broker.revision();
//!
//! broker.set_finger_angle(1, 2048);
//! assert_eq!(broker.finger_angle(1), 2048);
//!
//! let snap = broker.snapshot_if_changed(seen).expect("revision moved");
//! assert_eq!(snap.finger_angles[1], 2048);
//! assert!(broker.snapshot_if_changed(snap.revision).is_none());
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use echohand_types::StateSnapshot;
use tokio::sync::watch;
use tracing::trace;

/// The single shared glove state store.
///
/// Construct once at startup and hand an `Arc<StateBroker>` to every worker.
#[derive(Debug)]
pub struct StateBroker {
    fields: RwLock<StateSnapshot>,
    // Mirror of `fields.revision` readable without the lock.
    revision: AtomicU32,
    changes: watch::Sender<u32>,
}

impl StateBroker {
    /// Create a broker holding the default state at revision `0`.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    fn starting_at(revision: u32) -> Self {
        let (changes, _) = watch::channel(revision);
        Self {
            fields: RwLock::new(StateSnapshot {
                revision,
                ..StateSnapshot::default()
            }),
            revision: AtomicU32::new(revision),
            changes,
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Write API
    // ────────────────────────────────────────────────────────────────────────

    /// Apply several field writes under a single lock acquisition.
    ///
    /// Each write inside the closure still bumps the revision once, but no
    /// reader can observe the state between them.
    pub fn batch<R>(&self, f: impl FnOnce(&mut StateWriter<'_>) -> R) -> R {
        let mut guard = self.write_fields();
        let before = guard.revision;
        let mut writer = StateWriter {
            fields: &mut guard,
            published: &self.revision,
        };
        let result = f(&mut writer);
        let after = guard.revision;
        drop(guard);

        if after != before {
            self.changes.send_replace(after);
        }
        result
    }

    pub fn set_finger_angle(&self, index: usize, angle: i32) {
        self.batch(|w| w.set_finger_angle(index, angle));
    }

    pub fn set_servo_target_angle(&self, index: usize, degrees: i32) {
        self.batch(|w| w.set_servo_target_angle(index, degrees));
    }

    pub fn set_vibration_rpm(&self, index: usize, rpm: u16) {
        self.batch(|w| w.set_vibration_rpm(index, rpm));
    }

    /// Store both joystick axes (one revision bump).
    pub fn set_joystick(&self, x: f32, y: f32) {
        self.batch(|w| w.set_joystick(x, y));
    }

    pub fn set_buttons_bitmask(&self, mask: u32) {
        self.batch(|w| w.set_buttons_bitmask(mask));
    }

    pub fn set_battery_percent(&self, percent: u8) {
        self.batch(|w| w.set_battery_percent(percent));
    }

    // ────────────────────────────────────────────────────────────────────────
    // Read API
    // ────────────────────────────────────────────────────────────────────────

    /// Finger curl at `index`, or `0` when out of range.
    pub fn finger_angle(&self, index: usize) -> i32 {
        self.read_fields().finger_angles.get(index).copied().unwrap_or(0)
    }

    /// Servo target at `index`, or `0` when out of range.
    pub fn servo_target_angle(&self, index: usize) -> i32 {
        self.read_fields()
            .servo_target_angles
            .get(index)
            .copied()
            .unwrap_or(0)
    }

    /// Vibration speed at `index`, or `0` when out of range.
    pub fn vibration_rpm(&self, index: usize) -> u16 {
        self.read_fields().vibration_rpms.get(index).copied().unwrap_or(0)
    }

    /// Joystick `(x, y)`.
    pub fn joystick(&self) -> (f32, f32) {
        let xy = self.read_fields().joystick_xy;
        (xy[0], xy[1])
    }

    pub fn buttons_bitmask(&self) -> u32 {
        self.read_fields().buttons_bitmask
    }

    pub fn battery_percent(&self) -> u8 {
        self.read_fields().battery_percent
    }

    /// Copy every field plus the current revision into an owned value.
    pub fn take_snapshot(&self) -> StateSnapshot {
        *self.read_fields()
    }

    /// Cheap read of the mutation counter alone.
    pub fn revision(&self) -> u32 {
        self.revision.load(Ordering::Acquire)
    }

    /// Take a snapshot only when the revision differs from `last_seen`.
    pub fn snapshot_if_changed(&self, last_seen: u32) -> Option<StateSnapshot> {
        if self.revision() == last_seen {
            return None;
        }
        Some(self.take_snapshot())
    }

    /// Subscribe to revision changes.
    ///
    /// The receiver always holds the latest revision; intermediate values
    /// may be skipped by a slow consumer.
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.changes.subscribe()
    }

    // ────────────────────────────────────────────────────────────────────────
    // Internal helpers
    // ────────────────────────────────────────────────────────────────────────

    // The guarded data is plain values, so a panicked writer cannot leave it
    // in a state worse than a partially applied frame.
    fn read_fields(&self) -> RwLockReadGuard<'_, StateSnapshot> {
        self.fields.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_fields(&self) -> RwLockWriteGuard<'_, StateSnapshot> {
        self.fields.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StateBroker {
    fn default() -> Self {
        Self::new()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Batched writer
// ────────────────────────────────────────────────────────────────────────────

/// Write access to the broker's fields for the duration of a
/// [`StateBroker::batch`] call.
pub struct StateWriter<'a> {
    fields: &'a mut StateSnapshot,
    published: &'a AtomicU32,
}

impl StateWriter<'_> {
    pub fn set_finger_angle(&mut self, index: usize, angle: i32) {
        match self.fields.finger_angles.get_mut(index) {
            Some(slot) => *slot = angle,
            None => return ignored("finger_angles", index),
        }
        self.bump();
    }

    pub fn set_servo_target_angle(&mut self, index: usize, degrees: i32) {
        match self.fields.servo_target_angles.get_mut(index) {
            Some(slot) => *slot = degrees,
            None => return ignored("servo_target_angles", index),
        }
        self.bump();
    }

    pub fn set_vibration_rpm(&mut self, index: usize, rpm: u16) {
        match self.fields.vibration_rpms.get_mut(index) {
            Some(slot) => *slot = rpm,
            None => return ignored("vibration_rpms", index),
        }
        self.bump();
    }

    pub fn set_joystick(&mut self, x: f32, y: f32) {
        self.fields.joystick_xy = [x, y];
        self.bump();
    }

    pub fn set_buttons_bitmask(&mut self, mask: u32) {
        self.fields.buttons_bitmask = mask;
        self.bump();
    }

    pub fn set_battery_percent(&mut self, percent: u8) {
        self.fields.battery_percent = percent;
        self.bump();
    }

    fn bump(&mut self) {
        let next = self.fields.revision.wrapping_add(1);
        self.fields.revision = next;
        self.published.store(next, Ordering::Release);
    }
}

fn ignored(field: &'static str, index: usize) {
    trace!(field, index, "out-of-range index ignored");
}
