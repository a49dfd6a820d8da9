//! Input Capture and Normalization
//!
//! Turns raw keyboard/mouse or gamepad state into one immutable
//! [`InputSnapshot`] per tick. The two sources are mutually exclusive:
//! whichever shows activity owns the snapshot, and switching wipes the
//! other source's latches so nothing stays stuck.
//!
//! Controller layout is fixed: A jump/fly, B sword (tap) / special (hold),
//! X heal (hold) / reload (tap), Y swap, LB speed boost, RB mortar toggle,
//! LT sprint + preview, RT fire / release mortar, Back scoreboard.

use std::collections::BTreeSet;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{Action, InputConfig};
use crate::core::math::{direction_xz, horizontal, Ray};
use crate::error::InputSourceError;

// =============================================================================
// RAW DEVICE STATE
// =============================================================================

/// Keyboard and mouse state as sampled by the host this frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KeyboardState {
    /// Physical key codes currently down (e.g. `KeyW`, `Space`)
    pub pressed: BTreeSet<String>,
    /// Left mouse button
    pub mouse_left: bool,
    /// Right mouse button
    pub mouse_right: bool,
    /// Camera ray through the cursor
    pub mouse_ray: Option<Ray>,
}

impl KeyboardState {
    /// Builder: press a key.
    pub fn with_key(mut self, code: &str) -> Self {
        self.pressed.insert(code.to_string());
        self
    }

    /// Any key or button down.
    pub fn any_active(&self) -> bool {
        !self.pressed.is_empty() || self.mouse_left || self.mouse_right
    }

    fn action(&self, config: &InputConfig, action: Action) -> bool {
        config.bindings.keys(action).iter().any(|k| self.pressed.contains(k))
    }
}

/// Gamepad buttons used by the game.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamepadButtons {
    /// Jump / fly
    pub a: bool,
    /// Sword / special
    pub b: bool,
    /// Heal / reload
    pub x: bool,
    /// Swap
    pub y: bool,
    /// Speed boost
    pub lb: bool,
    /// Mortar toggle
    pub rb: bool,
    /// Sprint + preview
    pub lt: bool,
    /// Fire / release mortar
    pub rt: bool,
    /// Scoreboard
    pub back: bool,
}

impl GamepadButtons {
    fn any(&self) -> bool {
        self.a || self.b || self.x || self.y || self.lb || self.rb || self.lt || self.rt || self.back
    }
}

/// One gamepad sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GamepadState {
    /// Axes 0/1 move, 2/3 aim, each in [-1, 1] (up is negative)
    pub axes: [f32; 4],
    /// Buttons
    pub buttons: GamepadButtons,
}

/// Everything the host sampled this frame.
#[derive(Clone, Debug)]
pub struct InputDevices {
    /// Keyboard and mouse
    pub keyboard: KeyboardState,
    /// Gamepad read: `Ok(None)` when no pad is connected
    pub gamepad: Result<Option<GamepadState>, InputSourceError>,
}

impl Default for InputDevices {
    fn default() -> Self {
        Self {
            keyboard: KeyboardState::default(),
            gamepad: Ok(None),
        }
    }
}

impl InputDevices {
    /// Keyboard-only sample.
    pub fn keyboard(keyboard: KeyboardState) -> Self {
        Self {
            keyboard,
            gamepad: Ok(None),
        }
    }

    /// Gamepad-only sample.
    pub fn gamepad(pad: GamepadState) -> Self {
        Self {
            keyboard: KeyboardState::default(),
            gamepad: Ok(Some(pad)),
        }
    }
}

/// Active input source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Keyboard and mouse
    #[default]
    Keyboard,
    /// Gamepad
    Controller,
}

// =============================================================================
// CAMERA BASIS / DEAD ZONE
// =============================================================================

/// Camera orientation used to map stick input into the world.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraBasis {
    /// Camera look direction
    pub direction: Vec3,
}

impl Default for CameraBasis {
    fn default() -> Self {
        Self {
            direction: Vec3::NEG_Z,
        }
    }
}

impl CameraBasis {
    /// `normalize(direction × up)`.
    pub fn right(&self) -> Vec3 {
        let r = self.direction.cross(Vec3::Y).normalize_or_zero();
        if r == Vec3::ZERO {
            Vec3::X
        } else {
            r
        }
    }

    /// Look direction projected onto XZ.
    pub fn forward_xz(&self) -> Vec3 {
        let f = horizontal(self.direction).normalize_or_zero();
        if f == Vec3::ZERO {
            Vec3::NEG_Z
        } else {
            f
        }
    }

    /// Map a stick vector (x right, y down-positive) into world XZ.
    pub fn stick_to_world(&self, stick: Vec2) -> Vec3 {
        self.right() * stick.x + self.forward_xz() * (-stick.y)
    }

    /// Map a (strafe, forward) vector into world XZ.
    pub fn move_to_world(&self, mv: Vec2) -> Vec3 {
        self.right() * mv.x + self.forward_xz() * mv.y
    }
}

/// Radial dead zone with rescaling.
///
/// Zero at or below `dead_zone`, otherwise the direction is kept and the
/// magnitude remapped from `(dead_zone, 1]` onto `(0, 1]`. Raw magnitudes
/// above 1 (square-gated sticks at the diagonals) saturate at 1, so the
/// output never exceeds unit length.
pub fn apply_radial_dead_zone(raw: Vec2, dead_zone: f32) -> Vec2 {
    let raw = if raw.is_finite() { raw } else { Vec2::ZERO };
    let magnitude = raw.length();
    if magnitude <= dead_zone || magnitude <= f32::EPSILON {
        return Vec2::ZERO;
    }
    let scaled = ((magnitude - dead_zone) / (1.0 - dead_zone)).min(1.0);
    raw / magnitude * scaled
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Immutable per-tick input.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InputSnapshot {
    /// Source that produced this snapshot
    pub mode: InputMode,
    /// (strafe, forward), length <= 1
    pub move_vec: Vec2,
    /// `move_vec` mapped into world XZ
    pub move_world: Vec3,
    /// Sprint held for movement (suppressed while mortar hold is latched)
    pub running: bool,
    /// Raw sprint button, latch or not. Drives the Herald ability gate
    pub sprint_held: bool,
    /// Jump press edge
    pub jump_pressed: bool,
    /// This jump edge followed another within the double-jump window
    pub double_jump: bool,
    /// Jump held (levitation)
    pub fly_held: bool,
    /// Fire bolts
    pub shoot_held: bool,
    /// Mortar hold is latched
    pub mortar_hold_active: bool,
    /// Mortar released this tick
    pub mortar_release_edge: bool,
    /// Show the mortar arc
    pub preview_held: bool,
    /// Heal held
    pub heal_held: bool,
    /// Heal tap released quickly (manual reload)
    pub reload_pressed: bool,
    /// Sword press
    pub sword_pressed: bool,
    /// Special press
    pub special_pressed: bool,
    /// Speed boost press
    pub speed_boost_pressed: bool,
    /// Character swap press
    pub swap_pressed: bool,
    /// Scoreboard overlay held
    pub scoreboard_held: bool,
    /// Unit aim direction in world XZ
    pub aim_world_dir: Option<Vec3>,
    /// Aim stick magnitude (1.0 for mouse aim)
    pub aim_magnitude: f32,
    /// Mouse ground point (keyboard mode)
    pub aim_target: Option<Vec3>,
}

/// Per-refresh context supplied by the simulation.
#[derive(Clone, Copy, Debug)]
pub struct RefreshContext {
    /// Simulated time (seconds)
    pub now: f64,
    /// Tick delta
    pub dt: f32,
    /// Camera used for stick mapping
    pub camera: CameraBasis,
    /// Local player position (mouse aim origin)
    pub player_position: Vec3,
    /// Mortar cooldown is clear
    pub mortar_ready: bool,
    /// Weapons enabled in the current mode
    pub combat: bool,
    /// Heal releases shorter than this are reload taps
    pub heal_tap_threshold: f32,
    /// The local character's sprint blocks its abilities (Herald)
    pub sprint_blocks_abilities: bool,
}

/// Logical buttons after source mapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct LogicalButtons {
    jump: bool,
    fire: bool,
    mortar_toggle: bool,
    heal: bool,
    sword: bool,
    special: bool,
    speed_boost: bool,
    swap: bool,
    scoreboard: bool,
    run: bool,
    preview: bool,
}

// =============================================================================
// ROUTER
// =============================================================================

/// Stateful producer of [`InputSnapshot`]s.
#[derive(Clone, Debug)]
pub struct InputRouter {
    config: InputConfig,
    mode: InputMode,
    prev: LogicalButtons,
    last_jump_edge: Option<f64>,
    mortar_latched: bool,
    /// The fire button released a mortar and must come up before bolts fire
    fire_consumed: bool,
    release_cooldown: f32,
    special_hold: Option<f32>,
    special_fired: bool,
    heal_hold: f32,
    ability_inputs_blocked: bool,
    pad_failed: bool,
    disconnect_notice: Option<String>,
    last: InputSnapshot,
}

impl InputRouter {
    /// Create a router in keyboard mode.
    pub fn new(config: InputConfig) -> Self {
        Self {
            config,
            mode: InputMode::Keyboard,
            prev: LogicalButtons::default(),
            last_jump_edge: None,
            mortar_latched: false,
            fire_consumed: false,
            release_cooldown: 0.0,
            special_hold: None,
            special_fired: false,
            heal_hold: 0.0,
            ability_inputs_blocked: false,
            pad_failed: false,
            disconnect_notice: None,
            last: InputSnapshot::default(),
        }
    }

    /// Active source.
    pub fn mode(&self) -> InputMode {
        self.mode
    }

    /// Last produced snapshot.
    pub fn last_snapshot(&self) -> &InputSnapshot {
        &self.last
    }

    /// Mortar hold latched.
    pub fn mortar_hold_active(&self) -> bool {
        self.mortar_latched
    }

    /// Seconds until bolts are allowed after a mortar release or cancel.
    pub fn release_cooldown(&self) -> f32 {
        self.release_cooldown
    }

    /// Force shoot/mortar/heal/sword/special/speed-boost to read false.
    pub fn set_ability_inputs_blocked(&mut self, blocked: bool) {
        self.ability_inputs_blocked = blocked;
        if blocked {
            self.cancel_mortar_hold();
        }
    }

    /// Abilities currently blocked.
    pub fn ability_inputs_blocked(&self) -> bool {
        self.ability_inputs_blocked
    }

    /// Drop a latched mortar hold (death, sprint gate). Starts the
    /// release cooldown like a manual cancel.
    pub fn cancel_mortar_hold(&mut self) {
        if self.mortar_latched {
            self.mortar_latched = false;
            self.release_cooldown = self.config.mortar_release_cooldown;
        }
    }

    /// Clear every latch and timer (death, mode change).
    pub fn reset(&mut self) {
        let mode = self.mode;
        let blocked = self.ability_inputs_blocked;
        *self = Self::new(self.config.clone());
        self.mode = mode;
        self.ability_inputs_blocked = blocked;
    }

    /// Take the pending controller-disconnected notice.
    pub fn take_disconnect_notice(&mut self) -> Option<String> {
        self.disconnect_notice.take()
    }

    /// Produce the snapshot for this tick.
    pub fn refresh(&mut self, devices: &InputDevices, ctx: &RefreshContext) -> InputSnapshot {
        let dt = ctx.dt.max(0.0);
        self.release_cooldown = (self.release_cooldown - dt).max(0.0);

        let pad = self.select_mode(devices);
        let (buttons, move_vec, aim_stick) = match (self.mode, pad) {
            (InputMode::Controller, Some(pad)) => self.read_pad(&pad),
            _ => (self.read_keyboard(&devices.keyboard), keyboard_move(&devices.keyboard, &self.config), None),
        };

        let mut snap = InputSnapshot {
            mode: self.mode,
            move_vec,
            move_world: ctx.camera.move_to_world(move_vec),
            ..InputSnapshot::default()
        };

        // Aim
        match aim_stick {
            Some(stick) => {
                let world = ctx.camera.stick_to_world(stick);
                snap.aim_magnitude = stick.length().min(1.0);
                snap.aim_world_dir = (snap.aim_magnitude > 0.0).then(|| world.normalize_or_zero());
            }
            None => {
                let target = devices.keyboard.mouse_ray.and_then(|r| r.intersect_ground(0.0));
                snap.aim_target = target;
                snap.aim_world_dir = target.and_then(|t| direction_xz(ctx.player_position, t));
                snap.aim_magnitude = if snap.aim_world_dir.is_some() { 1.0 } else { 0.0 };
            }
        }

        // Sprint gate lands before any weapon input is read
        if ctx.sprint_blocks_abilities && buttons.run && !self.ability_inputs_blocked {
            self.set_ability_inputs_blocked(true);
            debug!("abilities blocked by sprint");
        }

        let edge = |now: bool, before: bool| now && !before;
        let blocked = self.ability_inputs_blocked;
        let weapons = ctx.combat && !blocked;

        if !buttons.fire {
            self.fire_consumed = false;
        }

        // Jump / double jump
        if edge(buttons.jump, self.prev.jump) {
            snap.jump_pressed = true;
            match self.last_jump_edge {
                Some(t) if ctx.now - t <= self.config.double_jump_window as f64 => {
                    snap.double_jump = true;
                    self.last_jump_edge = None;
                }
                _ => self.last_jump_edge = Some(ctx.now),
            }
        }
        snap.fly_held = buttons.jump;

        // Mortar hold: toggle edge latches or cancels, fire edge releases
        if edge(buttons.mortar_toggle, self.prev.mortar_toggle) {
            if self.mortar_latched {
                self.cancel_mortar_hold();
                debug!("mortar hold cancelled");
            } else if weapons {
                self.mortar_latched = true;
            }
        }
        if self.mortar_latched && !weapons {
            self.cancel_mortar_hold();
        }
        if self.mortar_latched && edge(buttons.fire, self.prev.fire) && ctx.mortar_ready {
            snap.mortar_release_edge = true;
            self.mortar_latched = false;
            self.fire_consumed = true;
            self.release_cooldown = self.config.mortar_release_cooldown;
        }
        snap.mortar_hold_active = self.mortar_latched;

        snap.shoot_held = weapons
            && buttons.fire
            && !self.fire_consumed
            && !self.mortar_latched
            && self.release_cooldown <= 0.0;
        snap.running = buttons.run && !self.mortar_latched;
        snap.sprint_held = buttons.run;
        snap.preview_held = weapons
            && (buttons.preview || (self.mortar_latched && (snap.aim_magnitude > 0.0 || snap.aim_target.is_some())));

        // Heal hold / reload tap
        if buttons.heal {
            self.heal_hold += dt;
        } else if self.prev.heal {
            if ctx.combat && !blocked && self.heal_hold < ctx.heal_tap_threshold {
                snap.reload_pressed = true;
            }
            self.heal_hold = 0.0;
        }
        snap.heal_held = buttons.heal && !blocked;

        // Sword / special
        match self.mode {
            InputMode::Controller => {
                let (sword, special) = self.track_special_hold(buttons.sword, dt);
                snap.sword_pressed = sword;
                snap.special_pressed = special;
            }
            InputMode::Keyboard => {
                snap.sword_pressed = edge(buttons.sword, self.prev.sword);
                snap.special_pressed = edge(buttons.special, self.prev.special);
            }
        }
        if !weapons {
            snap.sword_pressed = false;
            snap.special_pressed = false;
        }

        snap.speed_boost_pressed = !blocked && edge(buttons.speed_boost, self.prev.speed_boost);
        snap.swap_pressed = edge(buttons.swap, self.prev.swap);
        snap.scoreboard_held = buttons.scoreboard;

        self.prev = buttons;
        self.last = snap;
        snap
    }

    /// B: tap is the sword, holding past the threshold fires the special once.
    fn track_special_hold(&mut self, held: bool, dt: f32) -> (bool, bool) {
        let mut sword = false;
        let mut special = false;
        match (held, self.special_hold) {
            (true, None) => {
                self.special_hold = Some(0.0);
                self.special_fired = false;
            }
            (true, Some(t)) => {
                let t = t + dt;
                self.special_hold = Some(t);
                if t >= self.config.special_hold_threshold && !self.special_fired {
                    special = true;
                    self.special_fired = true;
                }
            }
            (false, Some(_)) => {
                sword = !self.special_fired;
                self.special_hold = None;
                self.special_fired = false;
            }
            (false, None) => {}
        }
        (sword, special)
    }

    /// Pick the source for this frame and return the pad sample if usable.
    fn select_mode(&mut self, devices: &InputDevices) -> Option<GamepadState> {
        let pad = match &devices.gamepad {
            Ok(pad) => {
                self.pad_failed = false;
                *pad
            }
            Err(err) => {
                if !self.pad_failed {
                    warn!(error = %err, "gamepad read failed, falling back to keyboard");
                    self.disconnect_notice = Some(err.to_string());
                }
                self.pad_failed = true;
                None
            }
        };

        let pad_active = pad.is_some_and(|p| {
            p.buttons.any()
                || p.axes
                    .iter()
                    .any(|a| a.is_finite() && a.abs() > self.config.controller_activity_threshold)
        });
        let keys_active = devices.keyboard.any_active();

        let next = match self.mode {
            InputMode::Controller if pad.is_none() => {
                if !self.pad_failed {
                    self.disconnect_notice = Some(InputSourceError::Disconnected.to_string());
                }
                InputMode::Keyboard
            }
            InputMode::Controller if keys_active && !pad_active => InputMode::Keyboard,
            InputMode::Keyboard if pad_active && !keys_active => InputMode::Controller,
            mode => mode,
        };
        if next != self.mode {
            debug!(from = ?self.mode, to = ?next, "input mode switched");
            self.switch_mode(next);
        }
        pad
    }

    fn switch_mode(&mut self, mode: InputMode) {
        self.mode = mode;
        self.prev = LogicalButtons::default();
        self.mortar_latched = false;
        self.fire_consumed = false;
        self.special_hold = None;
        self.special_fired = false;
        self.heal_hold = 0.0;
        self.last_jump_edge = None;
    }

    fn read_keyboard(&self, kb: &KeyboardState) -> LogicalButtons {
        let c = &self.config;
        LogicalButtons {
            jump: kb.action(c, Action::Jump),
            fire: kb.mouse_left,
            mortar_toggle: kb.mouse_right,
            heal: kb.action(c, Action::Heal),
            sword: kb.action(c, Action::Sword),
            special: kb.action(c, Action::Special),
            speed_boost: kb.action(c, Action::SpeedBoost),
            swap: kb.action(c, Action::Swap),
            scoreboard: kb.action(c, Action::Scoreboard),
            run: kb.action(c, Action::Run),
            preview: kb.action(c, Action::Preview),
        }
    }

    fn read_pad(&self, pad: &GamepadState) -> (LogicalButtons, Vec2, Option<Vec2>) {
        let b = pad.buttons;
        let buttons = LogicalButtons {
            jump: b.a,
            fire: b.rt,
            mortar_toggle: b.rb,
            heal: b.x,
            sword: b.b,
            special: false,
            speed_boost: b.lb,
            swap: b.y,
            scoreboard: b.back,
            run: b.lt,
            preview: b.lt && self.mortar_latched,
        };
        let dz = self.config.dead_zone;
        let mv = apply_radial_dead_zone(Vec2::new(pad.axes[0], pad.axes[1]), dz);
        let aim = apply_radial_dead_zone(Vec2::new(pad.axes[2], pad.axes[3]), dz);
        (buttons, Vec2::new(mv.x, -mv.y), Some(aim))
    }
}

fn keyboard_move(kb: &KeyboardState, config: &InputConfig) -> Vec2 {
    let axis = |pos: Action, neg: Action| {
        (kb.action(config, pos) as i32 - kb.action(config, neg) as i32) as f32
    };
    let v = Vec2::new(
        axis(Action::MoveRight, Action::MoveLeft),
        axis(Action::MoveForward, Action::MoveBack),
    );
    if v.length_squared() > 1.0 {
        v.normalize()
    } else {
        v
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DT: f32 = 1.0 / 60.0;

    fn ctx(now: f64) -> RefreshContext {
        RefreshContext {
            now,
            dt: DT,
            camera: CameraBasis::default(),
            player_position: Vec3::new(0.0, 1.0, 0.0),
            mortar_ready: true,
            combat: true,
            heal_tap_threshold: 0.3,
            sprint_blocks_abilities: false,
        }
    }

    fn pad(buttons: GamepadButtons) -> InputDevices {
        InputDevices::gamepad(GamepadState { axes: [0.0; 4], buttons })
    }

    #[test]
    fn test_dead_zone_edges() {
        assert_eq!(apply_radial_dead_zone(Vec2::new(0.15, 0.1), 0.2), Vec2::ZERO);
        assert_eq!(apply_radial_dead_zone(Vec2::new(0.2, 0.0), 0.2), Vec2::ZERO);
        let full = apply_radial_dead_zone(Vec2::new(1.0, 0.0), 0.2);
        assert!((full - Vec2::X).length() < 1e-6);
        let half = apply_radial_dead_zone(Vec2::new(0.0, -0.6), 0.2);
        assert!((half - Vec2::new(0.0, -0.5)).length() < 1e-6);
    }

    #[test]
    fn test_dead_zone_saturates_past_unit_length() {
        let corner = apply_radial_dead_zone(Vec2::new(1.0, 1.0), 0.2);
        assert!((corner.length() - 1.0).abs() < 1e-6);
        assert!((corner.x - corner.y).abs() < 1e-6);
        let rim = apply_radial_dead_zone(Vec2::new(0.0, 1.0), 0.2);
        let past = apply_radial_dead_zone(Vec2::new(0.0, 1.3), 0.2);
        assert_eq!(rim, past);
    }

    #[test]
    fn test_identity_camera_maps_stick_right_to_camera_right() {
        let camera = CameraBasis::default();
        assert!((camera.right() - Vec3::X).length() < 1e-6);
        let world = camera.stick_to_world(Vec2::new(1.0, 0.0));
        assert!((world - camera.right()).length() < 1e-6);
        // Stick up (negative y) is camera forward
        let up = camera.stick_to_world(Vec2::new(0.0, -1.0));
        assert!((up - Vec3::NEG_Z).length() < 1e-6);
    }

    #[test]
    fn test_keyboard_movement_and_mouse_aim() {
        let mut router = InputRouter::new(InputConfig::default());
        let mut kb = KeyboardState::default().with_key("KeyW").with_key("KeyD");
        kb.mouse_ray = Some(Ray::new(Vec3::new(4.0, 10.0, 0.0), Vec3::NEG_Y));
        let snap = router.refresh(&InputDevices::keyboard(kb), &ctx(0.0));
        assert_eq!(snap.mode, InputMode::Keyboard);
        assert!((snap.move_vec.length() - 1.0).abs() < 1e-6);
        // Forward on the identity camera is -Z
        assert!(snap.move_world.z < 0.0 && snap.move_world.x > 0.0);
        assert!((snap.aim_world_dir.unwrap() - Vec3::X).length() < 1e-6);
        assert_eq!(snap.aim_target, Some(Vec3::new(4.0, 0.0, 0.0)));
    }

    #[test]
    fn test_double_jump_window() {
        let mut router = InputRouter::new(InputConfig::default());
        let space = InputDevices::keyboard(KeyboardState::default().with_key("Space"));
        let idle = InputDevices::default();

        // Edges 250 ms apart
        assert!(router.refresh(&space, &ctx(0.0)).jump_pressed);
        router.refresh(&idle, &ctx(0.1));
        let second = router.refresh(&space, &ctx(0.25));
        assert!(second.jump_pressed && second.double_jump);

        // Window resets after a double; edges 800 ms apart are independent
        router.refresh(&idle, &ctx(1.0));
        let first = router.refresh(&space, &ctx(2.0));
        assert!(first.jump_pressed && !first.double_jump);
        router.refresh(&idle, &ctx(2.4));
        let late = router.refresh(&space, &ctx(2.8));
        assert!(late.jump_pressed && !late.double_jump);
    }

    #[test]
    fn test_mortar_hold_gating_controller() {
        let mut router = InputRouter::new(InputConfig::default());
        let fire = GamepadButtons { rt: true, ..Default::default() };
        let mut t = 0.0;

        assert!(router.refresh(&pad(fire), &ctx(t)).shoot_held);

        // RB edge latches; RT stays held (no new edge)
        t += DT as f64;
        let snap = router.refresh(&pad(GamepadButtons { rb: true, ..fire }), &ctx(t));
        assert!(snap.mortar_hold_active);
        assert!(!snap.shoot_held);

        // Sprint suppressed while latched
        t += DT as f64;
        let snap = router.refresh(&pad(GamepadButtons { lt: true, ..fire }), &ctx(t));
        assert!(!snap.running && !snap.shoot_held);
        assert!(snap.sprint_held);

        // Second RB edge cancels; shoot stays off for the release cooldown
        t += DT as f64;
        let snap = router.refresh(&pad(GamepadButtons { rb: true, ..fire }), &ctx(t));
        assert!(!snap.mortar_hold_active && !snap.mortar_release_edge);
        assert!(!snap.shoot_held);

        let mut elapsed = 0.0f32;
        let mut reenabled_at = None;
        for _ in 0..40 {
            t += DT as f64;
            elapsed += DT;
            if router.refresh(&pad(fire), &ctx(t)).shoot_held {
                reenabled_at = Some(elapsed);
                break;
            }
        }
        let at = reenabled_at.expect("shoot re-enabled");
        assert!(at >= 0.3 - DT && at <= 0.3 + 2.0 * DT);
    }

    #[test]
    fn test_controller_release_consumes_trigger() {
        let mut router = InputRouter::new(InputConfig::default());
        let mut t = 0.0;
        router.refresh(&pad(GamepadButtons { rb: true, ..Default::default() }), &ctx(t));
        t += DT as f64;
        router.refresh(&pad(GamepadButtons::default()), &ctx(t));

        // Not ready: RT edge does nothing
        t += DT as f64;
        let mut c = ctx(t);
        c.mortar_ready = false;
        let snap = router.refresh(&pad(GamepadButtons { rt: true, ..Default::default() }), &c);
        assert!(!snap.mortar_release_edge && snap.mortar_hold_active);

        t += DT as f64;
        router.refresh(&pad(GamepadButtons::default()), &ctx(t));
        t += DT as f64;
        let snap = router.refresh(&pad(GamepadButtons { rt: true, ..Default::default() }), &ctx(t));
        assert!(snap.mortar_release_edge);
        assert!(!snap.shoot_held);

        // Holding RT past the cooldown still does not fire until released
        for _ in 0..40 {
            t += DT as f64;
            assert!(!router.refresh(&pad(GamepadButtons { rt: true, ..Default::default() }), &ctx(t)).shoot_held);
        }
        t += DT as f64;
        router.refresh(&pad(GamepadButtons::default()), &ctx(t));
        t += DT as f64;
        assert!(router.refresh(&pad(GamepadButtons { rt: true, ..Default::default() }), &ctx(t)).shoot_held);
    }

    #[test]
    fn test_keyboard_mortar_right_latches_left_releases() {
        let mut router = InputRouter::new(InputConfig::default());
        let right = KeyboardState { mouse_right: true, ..Default::default() };
        let left = KeyboardState { mouse_left: true, ..Default::default() };
        let none = KeyboardState::default();

        assert!(router.refresh(&InputDevices::keyboard(right.clone()), &ctx(0.0)).mortar_hold_active);
        // Mouse-up of the right button does not release
        let snap = router.refresh(&InputDevices::keyboard(none.clone()), &ctx(0.1));
        assert!(snap.mortar_hold_active && !snap.mortar_release_edge);
        let snap = router.refresh(&InputDevices::keyboard(left), &ctx(0.2));
        assert!(snap.mortar_release_edge && !snap.mortar_hold_active);
    }

    #[test]
    fn test_b_tap_is_sword_hold_is_special() {
        let mut router = InputRouter::new(InputConfig::default());
        let b = GamepadButtons { b: true, ..Default::default() };
        let mut t = 0.0;
        router.refresh(&pad(b), &ctx(t));
        t += DT as f64;
        let snap = router.refresh(&pad(GamepadButtons::default()), &ctx(t));
        assert!(snap.sword_pressed && !snap.special_pressed);

        let mut specials = 0;
        for _ in 0..40 {
            t += DT as f64;
            let snap = router.refresh(&pad(b), &ctx(t));
            specials += snap.special_pressed as u32;
            assert!(!snap.sword_pressed);
        }
        t += DT as f64;
        let snap = router.refresh(&pad(GamepadButtons::default()), &ctx(t));
        assert_eq!(specials, 1);
        assert!(!snap.sword_pressed);
    }

    #[test]
    fn test_heal_tap_reloads_hold_does_not() {
        let mut router = InputRouter::new(InputConfig::default());
        let x = GamepadButtons { x: true, ..Default::default() };
        let mut t = 0.0;
        assert!(router.refresh(&pad(x), &ctx(t)).heal_held);
        t += DT as f64;
        assert!(router.refresh(&pad(GamepadButtons::default()), &ctx(t)).reload_pressed);

        for _ in 0..30 {
            t += DT as f64;
            router.refresh(&pad(x), &ctx(t));
        }
        t += DT as f64;
        assert!(!router.refresh(&pad(GamepadButtons::default()), &ctx(t)).reload_pressed);
    }

    #[test]
    fn test_blocked_inputs_read_false() {
        let mut router = InputRouter::new(InputConfig::default());
        router.set_ability_inputs_blocked(true);
        let all = GamepadButtons { rt: true, b: true, x: true, lb: true, rb: true, ..Default::default() };
        let snap = router.refresh(&pad(all), &ctx(0.0));
        assert!(!snap.shoot_held && !snap.heal_held && !snap.speed_boost_pressed);
        assert!(!snap.mortar_hold_active);
    }

    #[test]
    fn test_sprint_gate_blocks_on_first_sprint_tick() {
        let mut router = InputRouter::new(InputConfig::default());
        let gated = RefreshContext { sprint_blocks_abilities: true, ..ctx(0.0) };
        let snap = router.refresh(&pad(GamepadButtons { rb: true, ..Default::default() }), &gated);
        assert!(snap.mortar_hold_active);

        let all = GamepadButtons { lt: true, rt: true, b: true, x: true, lb: true, ..Default::default() };
        let snap = router.refresh(&pad(all), &RefreshContext { now: DT as f64, ..gated });
        assert!(router.ability_inputs_blocked());
        assert!(!router.mortar_hold_active());
        assert!(!snap.mortar_hold_active && !snap.mortar_release_edge);
        assert!(!snap.shoot_held && !snap.heal_held && !snap.speed_boost_pressed);
        assert!(snap.sprint_held && snap.running);
    }

    #[test]
    fn test_gamepad_error_falls_back_to_keyboard() {
        let mut router = InputRouter::new(InputConfig::default());
        router.refresh(&pad(GamepadButtons { a: true, ..Default::default() }), &ctx(0.0));
        assert_eq!(router.mode(), InputMode::Controller);

        let failing = InputDevices {
            keyboard: KeyboardState::default(),
            gamepad: Err(InputSourceError::Api("boom".into())),
        };
        let snap = router.refresh(&failing, &ctx(0.1));
        assert_eq!(snap.mode, InputMode::Keyboard);
        assert!(router.take_disconnect_notice().unwrap().contains("boom"));
        // Reported once per failure streak
        router.refresh(&failing, &ctx(0.2));
        assert!(router.take_disconnect_notice().is_none());
    }

    proptest! {
        #[test]
        fn prop_dead_zone_monotonic(a in 0.0f32..1.0, b in 0.0f32..1.0, angle in 0.0f32..6.28) {
            let dir = Vec2::new(angle.cos(), angle.sin());
            let (lo, hi) = if a < b { (a, b) } else { (b, a) };
            let out_lo = apply_radial_dead_zone(dir * lo, 0.2).length();
            let out_hi = apply_radial_dead_zone(dir * hi, 0.2).length();
            if hi <= 0.2 {
                prop_assert_eq!(out_hi, 0.0);
            }
            if lo > 0.2 && hi - lo > 1e-4 {
                prop_assert!(out_hi > out_lo);
            }
            prop_assert!(out_lo <= out_hi + 1e-6);
        }
    }
}
