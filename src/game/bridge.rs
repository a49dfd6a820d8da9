//! Presentation Bridges
//!
//! Optional one-way collaborators for rendering, particles, sound and
//! vibration. The core never reads anything back except the camera basis.
//! Any bridge may be missing; its effects are skipped.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::events::{AbilityKind, GameEvent, GameEventData, VibrationPattern};
use super::input::CameraBasis;
use super::render::RenderFrame;

/// Heal particle colour.
const HEAL_COLOR: [f32; 3] = [0.35, 1.0, 0.45];

/// Rumble strength when the local player is hit.
const HURT_INTENSITY: f32 = 0.5;

/// Rumble strength when the local player dies.
const DEATH_INTENSITY: f32 = 1.0;

/// Named sound cues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundCue {
    /// Jump or double jump
    Jump,
    /// Touched ground
    Land,
    /// Bolt fired
    Shoot,
    /// Mortar launched
    MortarLaunch,
    /// Sword swung
    MeleeSwing,
    /// Local sword connected
    MeleeHit,
    /// Someone died
    Death,
    /// Someone came back
    Respawn,
    /// Local player hurt
    TakeDamage,
    /// Character swapped
    CharacterSwap,
}

/// Scene renderer.
pub trait RendererBridge {
    /// Current camera basis for stick-to-world conversion.
    fn camera(&self) -> Option<CameraBasis>;

    /// Show the explore-mode decoration.
    fn set_mushrooms_visible(&mut self, visible: bool);

    /// Offset the camera for one frame.
    fn apply_screen_shake(&mut self, offset: Vec3);

    /// Draw a frame.
    fn render(&mut self, frame: &RenderFrame);

    /// Show the controller-disconnected notice.
    fn notify_controller_disconnected(&mut self, _reason: &str) {}
}

/// Particle effects.
pub trait ParticleBridge {
    /// Puff of smoke on swap.
    fn spawn_character_swap_smoke(&mut self, position: Vec3);

    /// Ring of sparks around a sword swing.
    fn spawn_sword_swing_particles(&mut self, position: Vec3, color: [f32; 3], radius: f32, duration: f32);

    /// Rising heal sparkle.
    fn spawn_healing_particle(&mut self, position: Vec3, color: [f32; 3]);
}

/// Audio.
pub trait SoundBridge {
    /// Play a cue, positioned when `position` is given.
    fn play(&mut self, cue: SoundCue, position: Option<Vec3>);
}

/// Gamepad rumble.
pub trait VibrationBridge {
    /// Rumble with an already distance-scaled intensity.
    fn vibrate(&mut self, pattern: VibrationPattern, intensity: f32);
}

/// Every optional collaborator.
#[derive(Default)]
pub struct Bridges {
    /// Renderer
    pub renderer: Option<Box<dyn RendererBridge>>,
    /// Particles
    pub particles: Option<Box<dyn ParticleBridge>>,
    /// Sound
    pub sound: Option<Box<dyn SoundBridge>>,
    /// Rumble
    pub vibration: Option<Box<dyn VibrationBridge>>,
}

impl std::fmt::Debug for Bridges {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridges")
            .field("renderer", &self.renderer.is_some())
            .field("particles", &self.particles.is_some())
            .field("sound", &self.sound.is_some())
            .field("vibration", &self.vibration.is_some())
            .finish()
    }
}

impl Bridges {
    /// No bridges attached.
    pub fn none() -> Self {
        Self::default()
    }

    /// Camera from the renderer, or the default basis.
    pub fn camera(&self) -> CameraBasis {
        self.renderer.as_ref().and_then(|r| r.camera()).unwrap_or_default()
    }

    /// Hand a frame to the renderer.
    pub fn render(&mut self, frame: &RenderFrame) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.render(frame);
        }
    }

    /// Toggle explore decoration.
    pub fn set_mushrooms_visible(&mut self, visible: bool) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.set_mushrooms_visible(visible);
        }
    }

    fn sound(&mut self, cue: SoundCue, position: Option<Vec3>) {
        if let Some(sound) = self.sound.as_mut() {
            sound.play(cue, position);
        }
    }

    fn vibrate(&mut self, pattern: VibrationPattern, intensity: f32) {
        if let Some(vibration) = self.vibration.as_mut() {
            vibration.vibrate(pattern, intensity);
        }
    }

    /// Forward a tick's events to whichever bridges are attached.
    pub fn dispatch(&mut self, events: &[GameEvent]) {
        for event in events {
            trace!(tick = event.tick, priority = ?event.priority, "dispatch");
            self.dispatch_one(&event.data);
        }
    }

    fn dispatch_one(&mut self, data: &GameEventData) {
        use GameEventData::*;
        match data {
            Jumped { .. } => self.sound(SoundCue::Jump, None),
            Landed { .. } => self.sound(SoundCue::Land, None),
            AbilityUsed {
                ability,
                character,
                position,
                radius,
                duration,
                ..
            } => match ability {
                AbilityKind::Bolt | AbilityKind::MultiShot => self.sound(SoundCue::Shoot, Some(*position)),
                AbilityKind::Mortar => self.sound(SoundCue::MortarLaunch, Some(*position)),
                AbilityKind::Melee => {
                    self.sound(SoundCue::MeleeSwing, Some(*position));
                    if let Some(particles) = self.particles.as_mut() {
                        particles.spawn_sword_swing_particles(*position, character.color(), *radius, *duration);
                    }
                }
                _ => {}
            },
            Damaged {
                victim,
                attacker,
                source,
                position,
                ..
            } => {
                if victim.is_local() {
                    self.sound(SoundCue::TakeDamage, Some(*position));
                    self.vibrate(VibrationPattern::Hurt, HURT_INTENSITY);
                } else if attacker.as_ref().is_some_and(|a| a.is_local())
                    && *source == super::events::DamageSource::Melee
                {
                    self.sound(SoundCue::MeleeHit, Some(*position));
                }
            }
            Died { victim, position, .. } => {
                self.sound(SoundCue::Death, Some(*position));
                if victim.is_local() {
                    self.vibrate(VibrationPattern::Death, DEATH_INTENSITY);
                }
            }
            Respawned { position, .. } => self.sound(SoundCue::Respawn, Some(*position)),
            CharacterSwapped { position, .. } => {
                self.sound(SoundCue::CharacterSwap, Some(*position));
                if let Some(particles) = self.particles.as_mut() {
                    particles.spawn_character_swap_smoke(*position);
                }
            }
            Healed { position, .. } => {
                if let Some(particles) = self.particles.as_mut() {
                    particles.spawn_healing_particle(*position, HEAL_COLOR);
                }
            }
            ScreenShake { offset } => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.apply_screen_shake(*offset);
                }
            }
            Vibration { pattern, intensity } => self.vibrate(*pattern, *intensity),
            ControllerDisconnected { reason } => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.notify_controller_disconnected(reason);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::events::DamageSource;
    use crate::game::state::{CharacterKind, EntityId};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct LogSound(Log);
    impl SoundBridge for LogSound {
        fn play(&mut self, cue: SoundCue, _: Option<Vec3>) {
            self.0.borrow_mut().push(format!("{cue:?}"));
        }
    }

    struct LogRumble(Log);
    impl VibrationBridge for LogRumble {
        fn vibrate(&mut self, pattern: VibrationPattern, intensity: f32) {
            self.0.borrow_mut().push(format!("{pattern:?}:{intensity}"));
        }
    }

    struct LogParticles(Log);
    impl ParticleBridge for LogParticles {
        fn spawn_character_swap_smoke(&mut self, _: Vec3) {
            self.0.borrow_mut().push("smoke".into());
        }
        fn spawn_sword_swing_particles(&mut self, _: Vec3, _: [f32; 3], radius: f32, _: f32) {
            self.0.borrow_mut().push(format!("sword:{radius}"));
        }
        fn spawn_healing_particle(&mut self, _: Vec3, _: [f32; 3]) {
            self.0.borrow_mut().push("heal".into());
        }
    }

    fn event(data: GameEventData) -> GameEvent {
        GameEvent::new(1, data)
    }

    #[test]
    fn test_missing_bridges_are_skipped() {
        let mut bridges = Bridges::none();
        bridges.dispatch(&[event(GameEventData::Jumped {
            id: EntityId::local(),
            double: false,
        })]);
        assert_eq!(bridges.camera(), CameraBasis::default());
    }

    #[test]
    fn test_events_reach_bridges() {
        let log: Log = Rc::default();
        let mut bridges = Bridges {
            sound: Some(Box::new(LogSound(log.clone()))),
            vibration: Some(Box::new(LogRumble(log.clone()))),
            particles: Some(Box::new(LogParticles(log.clone()))),
            renderer: None,
        };
        bridges.dispatch(&[
            event(GameEventData::AbilityUsed {
                id: EntityId::local(),
                ability: AbilityKind::Melee,
                character: CharacterKind::Lucy,
                position: Vec3::ZERO,
                radius: 2.5,
                duration: 0.5,
            }),
            event(GameEventData::Damaged {
                victim: EntityId::local(),
                attacker: Some(EntityId::bot(1)),
                amount: 10.0,
                health: 90.0,
                max_health: 100.0,
                source: DamageSource::Bolt,
                position: Vec3::ZERO,
            }),
            event(GameEventData::Vibration {
                pattern: VibrationPattern::Explosion,
                intensity: 0.75,
            }),
        ]);
        assert_eq!(
            *log.borrow(),
            vec!["MeleeSwing", "sword:2.5", "TakeDamage", "Hurt:0.5", "Explosion:0.75"]
        );
    }
}
