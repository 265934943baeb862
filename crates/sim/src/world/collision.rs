use serde::{Deserialize, Serialize};
use tracing::debug;

use super::entity::EntityRef;
use super::registry::Simulation;

/// How many detect-then-resolve passes a tick may run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CollisionPolicy {
    Disabled,
    /// One detection pass, then every collider is resolved once. Chains of
    /// bodies pushed into each other can stay overlapping until the next tick.
    #[default]
    SinglePass,
    /// Detect and resolve repeatedly until a pass finds nothing or the
    /// budget runs out.
    FixedPoint { max_passes: u32 },
}

impl CollisionPolicy {
    pub fn max_passes(self) -> u32 {
        match self {
            Self::Disabled => 0,
            Self::SinglePass => 1,
            Self::FixedPoint { max_passes } => max_passes.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionOutcome {
    /// Total `resolve_collision` calls across all passes.
    pub resolved: usize,
    /// Passes that found at least one collision.
    pub passes: u32,
}

impl Simulation {
    /// Runs collision detection and resolution according to the configured policy.
    pub fn do_collisions(&mut self) -> CollisionOutcome {
        let max_passes = self.config().collision.max_passes();
        let mut outcome = CollisionOutcome::default();

        while outcome.passes < max_passes {
            let colliding = self.detect_collisions();
            if colliding.is_empty() {
                break;
            }
            debug!(
                pass = outcome.passes,
                colliding = colliding.len(),
                "collisions_detected"
            );
            for entity in &colliding {
                match entity.try_borrow_mut() {
                    Ok(mut entity) => entity.resolve_collision(),
                    Err(_) => debug!("collision_resolve_skipped_busy_entity"),
                }
            }
            outcome.resolved += colliding.len();
            outcome.passes += 1;
        }

        outcome
    }

    fn detect_collisions(&self) -> Vec<EntityRef> {
        let mut colliding = Vec::new();
        for (id, entity) in self.live_entities() {
            let Ok(candidate) = entity.try_borrow() else {
                continue;
            };
            if !candidate.can_collide() {
                continue;
            }
            let mut others = self.get_entities(candidate.collision_mask());
            others.remove(id);
            if candidate.is_colliding(&others) {
                drop(candidate);
                colliding.push(entity);
            }
        }
        colliding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_budget_follows_policy() {
        assert_eq!(CollisionPolicy::Disabled.max_passes(), 0);
        assert_eq!(CollisionPolicy::SinglePass.max_passes(), 1);
        assert_eq!(CollisionPolicy::FixedPoint { max_passes: 0 }.max_passes(), 1);
        assert_eq!(CollisionPolicy::FixedPoint { max_passes: 5 }.max_passes(), 5);
    }
}
