//! Rotation policies: each channel has a role that steps one parameter.

use rand::Rng;

use super::sound_state::{Role, SoundState};
use super::{LightCell, PolicyContext, PolicyOutput};

/// Steps the role of every channel it is handed. Whether those are the held
/// channels or only the freshly touched ones is up to the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct RotationPolicy {
    roles: Vec<Option<Role>>,
    tempo_step: f64,
    sound: SoundState,
}

impl RotationPolicy {
    pub fn new(roles: Vec<Option<Role>>, tempo_step: f64, sound: SoundState) -> Self {
        Self {
            roles,
            tempo_step,
            sound,
        }
    }

    pub fn sound(&self) -> &SoundState {
        &self.sound
    }

    pub(crate) fn process(
        &mut self,
        channels: impl Iterator<Item = usize>,
        ctx: &mut PolicyContext<'_>,
    ) -> PolicyOutput {
        let mut output = PolicyOutput::default();
        for channel in channels {
            let Some(Some(role)) = self.roles.get(channel).copied() else {
                continue;
            };
            let mutation = self.sound.rotate(role, self.tempo_step);
            log::debug!("[MAPPER] Channel {} ({}) -> {:?}", channel, role, mutation);
            output.mutations.push(mutation);
            output
                .lights
                .push((channel, LightCell::new(cool_warm_hue(ctx.rng.random()), 255)));
        }
        output
    }
}

/// Hue along a blue-to-red ramp; `t` in [0, 1].
pub fn cool_warm_hue(t: f64) -> u8 {
    (160.0 * (1.0 - t.clamp(0.0, 1.0))).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{LightSnapshot, SensorSnapshot};
    use crate::music::LayerMap;
    use crate::state::{MusicalState, Parameter};
    use crate::timing::TempoRange;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Instant;

    fn policy() -> RotationPolicy {
        let initial = MusicalState {
            instruments: LayerMap::new("a".into(), "a".into(), "a".into()),
            ..MusicalState::default()
        };
        let sound = SoundState::new(
            &initial,
            vec!["a".into(), "b".into()],
            TempoRange::default(),
        );
        RotationPolicy::new(
            vec![Some(Role::KeyUp), None, Some(Role::Melody)],
            5.0,
            sound,
        )
    }

    #[test]
    fn test_channels_processed_in_order_with_lights() {
        let mut policy = policy();
        let displayed = LightSnapshot::new(vec![]);
        let mut rng = StdRng::seed_from_u64(0);
        let mut ctx = PolicyContext {
            displayed: &displayed,
            now: Instant::now(),
            rng: &mut rng,
        };
        let current = SensorSnapshot::from(vec![true, true, true]);
        let output = policy.process(current.active(), &mut ctx);

        assert_eq!(
            output.mutations,
            vec![Parameter::Key(65), Parameter::MelodyPattern(1)]
        );
        let lit: Vec<usize> = output.lights.iter().map(|(c, _)| *c).collect();
        assert_eq!(lit, vec![0, 2]);
        for (_, cell) in &output.lights {
            assert!(cell.hue <= 160);
        }
    }

    #[test]
    fn test_cool_warm_endpoints() {
        assert_eq!(cool_warm_hue(0.0), 160);
        assert_eq!(cool_warm_hue(1.0), 0);
    }
}
