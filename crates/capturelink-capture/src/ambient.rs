//! Ambient light probe.
//!
//! Each frame the captured texture is halved through a short chain of
//! intermediate surfaces down to a 1×1 probe whose pixel is read back
//! asynchronously. At most one readback is in flight; a pending or failed
//! readback skips the update and never stalls the frame loop.

use capturelink_core::{AmbientConfig, Resolution};
use tracing::{debug, trace};

use crate::bridge::{DisplaySurfaceParams, HostTexture};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadbackTicket(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadbackStatus {
    Pending,
    /// RGBA8 of the probe pixel.
    Ready([u8; 4]),
    Failed,
}

/// GPU downsample and asynchronous readback, provided by the host renderer.
pub trait ReadbackHost {
    /// Blit `source` through every surface in `chain` (the last is the probe)
    /// and start reading the probe back. `None` if the host cannot start one.
    fn request_probe(&mut self, source: &HostTexture, chain: &[Resolution]) -> Option<ReadbackTicket>;

    /// Non-blocking completion check.
    fn poll_readback(&mut self, ticket: ReadbackTicket) -> ReadbackStatus;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    /// Linear RGB in 0..=1.
    pub color: [f32; 3],
    pub intensity: f32,
}

impl AmbientLight {
    pub fn from_probe(rgba: [u8; 4], light_scale: f32) -> Self {
        let [r, g, b, _] = rgba.map(|c| c as f32 / 255.0);
        let luminance = 0.2126 * r + 0.7152 * g + 0.0722 * b;
        Self { color: [r, g, b], intensity: luminance * light_scale }
    }
}

/// Surfaces to blit through when reducing `source` to a single pixel: up to
/// `max_chain_length` halvings, then the 1×1 probe.
pub fn downsample_chain(source: Resolution, max_chain_length: usize) -> Vec<Resolution> {
    let mut chain = Vec::with_capacity(max_chain_length + 1);
    let mut current = source;
    for _ in 0..max_chain_length {
        let next = current.halved();
        if next == Resolution::PROBE || next == current {
            break;
        }
        chain.push(next);
        current = next;
    }
    chain.push(Resolution::PROBE);
    chain
}

pub struct AmbientSampler {
    config: AmbientConfig,
    in_flight: Option<ReadbackTicket>,
    latest: Option<AmbientLight>,
}

impl AmbientSampler {
    pub fn new(config: AmbientConfig) -> Self {
        Self { config, in_flight: None, latest: None }
    }

    pub fn latest(&self) -> Option<AmbientLight> {
        self.latest
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Called once per frame. Returns a new sample when a readback finished
    /// this frame.
    pub fn tick<H: ReadbackHost>(
        &mut self,
        host: &mut H,
        texture: Option<&HostTexture>,
        params: &dyn DisplaySurfaceParams,
    ) -> Option<AmbientLight> {
        if !self.config.enabled {
            return None;
        }

        let mut fresh = None;
        if let Some(ticket) = self.in_flight {
            match host.poll_readback(ticket) {
                ReadbackStatus::Pending => {
                    trace!("Ambient readback {ticket:?} pending");
                    return None;
                }
                ReadbackStatus::Ready(rgba) => {
                    let light = AmbientLight::from_probe(rgba, params.light_scale());
                    self.latest = Some(light);
                    fresh = Some(light);
                }
                ReadbackStatus::Failed => debug!("Ambient readback {ticket:?} failed; skipping"),
            }
            self.in_flight = None;
        }

        if let Some(texture) = texture {
            let chain = downsample_chain(texture.resolution, self.config.max_chain_length);
            self.in_flight = host.request_probe(texture, &chain);
        }
        fresh
    }

    /// Forget any outstanding readback; its result will be ignored.
    pub fn reset(&mut self) {
        self.in_flight = None;
        self.latest = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{FixedSurfaceParams, RenderHost};
    use crate::testing::RecordingHost;

    #[test]
    fn chain_halves_down_to_probe() {
        assert_eq!(
            downsample_chain(Resolution::new(640, 480), 4),
            vec![
                Resolution::new(320, 240),
                Resolution::new(160, 120),
                Resolution::new(80, 60),
                Resolution::new(40, 30),
                Resolution::PROBE,
            ]
        );
        assert_eq!(downsample_chain(Resolution::new(2, 2), 4), vec![Resolution::PROBE]);
        assert_eq!(downsample_chain(Resolution::new(640, 480), 0), vec![Resolution::PROBE]);
    }

    #[test]
    fn one_readback_outstanding_and_pending_skips() {
        let mut host = RecordingHost::new();
        let texture = host.create_texture(Resolution::new(640, 480)).unwrap();
        let params = FixedSurfaceParams::default();
        let mut sampler = AmbientSampler::new(AmbientConfig::default());

        host.script_readbacks([ReadbackStatus::Pending, ReadbackStatus::Pending]);
        assert!(sampler.tick(&mut host, Some(&texture), &params).is_none());
        assert!(sampler.tick(&mut host, Some(&texture), &params).is_none());
        assert!(sampler.tick(&mut host, Some(&texture), &params).is_none());
        assert_eq!(host.probe_requests().len(), 1, "no new request while one is pending");
    }

    #[test]
    fn ready_readback_yields_light_and_requests_again() {
        let mut host = RecordingHost::new();
        let texture = host.create_texture(Resolution::new(64, 64)).unwrap();
        let params = FixedSurfaceParams { light_scale: 2.0, ..Default::default() };
        let mut sampler = AmbientSampler::new(AmbientConfig::default());

        host.script_readbacks([ReadbackStatus::Ready([255, 255, 255, 255])]);
        assert!(sampler.tick(&mut host, Some(&texture), &params).is_none());

        let light = sampler.tick(&mut host, Some(&texture), &params).unwrap();
        assert_eq!(light.color, [1.0, 1.0, 1.0]);
        assert!((light.intensity - 2.0).abs() < 1e-4);
        assert_eq!(host.probe_requests().len(), 2);
        assert!(sampler.in_flight());
    }

    #[test]
    fn failed_readback_keeps_previous_sample() {
        let mut host = RecordingHost::new();
        let texture = host.create_texture(Resolution::new(64, 64)).unwrap();
        let params = FixedSurfaceParams::default();
        let mut sampler = AmbientSampler::new(AmbientConfig::default());

        host.script_readbacks([ReadbackStatus::Ready([0, 0, 255, 255]), ReadbackStatus::Failed]);
        sampler.tick(&mut host, Some(&texture), &params);
        let first = sampler.tick(&mut host, Some(&texture), &params).unwrap();
        assert!(sampler.tick(&mut host, Some(&texture), &params).is_none());
        assert_eq!(sampler.latest(), Some(first));
    }

    #[test]
    fn disabled_sampler_never_requests() {
        let mut host = RecordingHost::new();
        let texture = host.create_texture(Resolution::new(64, 64)).unwrap();
        let mut sampler = AmbientSampler::new(AmbientConfig { enabled: false, ..Default::default() });

        sampler.tick(&mut host, Some(&texture), &FixedSurfaceParams::default());
        assert!(host.probe_requests().is_empty());
    }
}
