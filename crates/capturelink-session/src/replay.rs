//! JSON-lines hand event replay.
//!
//! One event per line:
//!
//! ```text
//! {"kind":"surface","center":[0,1.2,2],"rotation":[0,0,0,1],"size":[1.6,0.9]}
//! {"kind":"enter","hand":"primary","collider":"hover"}
//! {"kind":"stay","hand":"primary","collider":"hover","point":[0.1,1.2,2]}
//! {"kind":"tick"}
//! {"kind":"exit","hand":"primary","collider":"hover"}
//! {"kind":"release_all"}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use capturelink_core::HandId;
use capturelink_touch::{
    ColliderKind, HandSample, ScreenGeometry, SurfaceProjection, TouchContactManager, TouchInjector,
};
use glam::{Quat, Vec2, Vec3};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayEvent {
    Surface {
        center: Vec3,
        #[serde(default)]
        rotation: Quat,
        size: Vec2,
    },
    Enter {
        hand: HandId,
        collider: ColliderKind,
    },
    Exit {
        hand: HandId,
        collider: ColliderKind,
    },
    Stay {
        hand: HandId,
        collider: ColliderKind,
        point: Vec3,
        #[serde(default)]
        rotation: Quat,
    },
    Tick,
    ReleaseAll,
}

/// `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<ReplayEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Feeds replayed events into a [`TouchContactManager`]. The manager is
/// passed per event so it can be shared with a running capture session.
#[derive(Debug, Default)]
pub struct ReplayDriver {
    surface: SurfaceProjection,
    ticks: u64,
    submitted: usize,
}

impl ReplayDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply<I: TouchInjector, G: ScreenGeometry>(
        &mut self,
        manager: &mut TouchContactManager<I, G>,
        event: &ReplayEvent,
    ) {
        match *event {
            ReplayEvent::Surface { center, rotation, size } => {
                self.surface = SurfaceProjection::from_placement(center, rotation, size);
            }
            ReplayEvent::Enter { hand, collider } => manager.on_enter(hand, collider),
            ReplayEvent::Exit { hand, collider } => manager.on_exit(hand, collider),
            ReplayEvent::Stay { hand, collider, point, rotation } => {
                let sample = HandSample::new(point, rotation);
                manager.on_stay(hand, collider, &sample, &self.surface);
            }
            ReplayEvent::Tick => {
                self.ticks += 1;
                self.submitted += manager.fixed_tick();
            }
            ReplayEvent::ReleaseAll => manager.release_all(),
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Contact records submitted across all ticks.
    pub fn submitted(&self) -> usize {
        self.submitted
    }
}
