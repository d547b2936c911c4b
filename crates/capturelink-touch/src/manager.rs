//! Per-tick touch contact state machine.
//!
//! Hand state per manipulator:
//!
//! ```text
//! OutOfRange ──enter hover──▶ Hovering ──enter physical──▶ Drawing
//!     ▲                         │   ▲                         │
//!     └──────exit hover─────────┘   └──────exit physical──────┘
//! ```
//!
//! Collider callbacks only write the pending delta (`frame` and
//! `pending_removal`). [`TouchContactManager::fixed_tick`] merges it into the
//! `persistent` set and submits the whole set as one batch:
//!
//! 1. frame entries overwrite persistent entries with the same id
//! 2. ids pending removal are rewritten to `UP`
//! 3. the full persistent set is injected
//! 4. `UP` ids are dropped; if the OS accepted the batch, `DOWN` becomes
//!    `UPDATE` for the rest
//!
//! A persistent id therefore never carries `UP` between ticks. A `DOWN` the
//! OS rejected stays pending and goes out again with the next batch, so
//! `DOWN` is only produced for ids the OS does not already hold in contact.

use std::collections::{BTreeMap, BTreeSet};

use capturelink_core::{
    ContactFlags, HandId, HandInteractionState, ScreenRect, TouchConfig, TouchContact,
};
use glam::Vec2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::inject::{ScreenGeometry, TouchInjector};
use crate::mapping::{target_pixel, HandSample, SurfaceProjection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColliderKind {
    /// Touching the display surface.
    Physical,
    /// The larger volume in front of it.
    Hover,
}

#[derive(Debug, Clone, Copy, Default)]
struct HandTracker {
    state: HandInteractionState,
    in_physical: bool,
    in_hover: bool,
}

pub struct TouchContactManager<I: TouchInjector, G: ScreenGeometry> {
    config: TouchConfig,
    injector: I,
    geometry: G,
    target_window: Option<u64>,
    hands: [HandTracker; 2],
    frame: BTreeMap<u32, TouchContact>,
    persistent: BTreeMap<u32, TouchContact>,
    pending_removal: BTreeSet<u32>,
    failed_batches: u64,
}

impl<I: TouchInjector, G: ScreenGeometry> TouchContactManager<I, G> {
    pub fn new(config: TouchConfig, injector: I, geometry: G) -> Self {
        Self {
            config,
            injector,
            geometry,
            target_window: None,
            hands: [HandTracker::default(); 2],
            frame: BTreeMap::new(),
            persistent: BTreeMap::new(),
            pending_removal: BTreeSet::new(),
            failed_batches: 0,
        }
    }

    /// Window the captured frames come from; contacts are mapped into its rect.
    pub fn set_target_window(&mut self, window: Option<u64>) {
        if self.target_window != window {
            debug!("Touch target window → {window:?}");
            self.target_window = window;
        }
    }

    pub fn target_window(&self) -> Option<u64> {
        self.target_window
    }

    pub fn hand_state(&self, hand: HandId) -> HandInteractionState {
        self.hands[hand.index()].state
    }

    pub fn persistent(&self) -> impl Iterator<Item = &TouchContact> {
        self.persistent.values()
    }

    pub fn injector(&self) -> &I {
        &self.injector
    }

    pub fn failed_batches(&self) -> u64 {
        self.failed_batches
    }

    // MARK: - Event ingestion

    pub fn on_enter(&mut self, hand: HandId, collider: ColliderKind) {
        let tracker = &mut self.hands[hand.index()];
        let before = tracker.state;
        match collider {
            ColliderKind::Hover => {
                tracker.in_hover = true;
                if tracker.state == HandInteractionState::OutOfRange {
                    tracker.state = HandInteractionState::Hovering;
                }
            }
            ColliderKind::Physical => {
                tracker.in_physical = true;
                tracker.state = HandInteractionState::Drawing;
            }
        }
        if tracker.state != before {
            debug!("Hand {hand:?}: {before:?} → {:?}", tracker.state);
        }
    }

    pub fn on_exit(&mut self, hand: HandId, collider: ColliderKind) {
        let tracker = &mut self.hands[hand.index()];
        let before = tracker.state;
        match collider {
            ColliderKind::Physical => {
                tracker.in_physical = false;
                if tracker.state == HandInteractionState::Drawing {
                    tracker.state = if tracker.in_hover {
                        HandInteractionState::Hovering
                    } else {
                        HandInteractionState::OutOfRange
                    };
                }
            }
            ColliderKind::Hover => {
                tracker.in_hover = false;
                if tracker.state == HandInteractionState::Hovering {
                    tracker.state = HandInteractionState::OutOfRange;
                }
            }
        }
        if tracker.state != before {
            debug!("Hand {hand:?}: {before:?} → {:?}", tracker.state);
            // Leaving contact or leaving range both end the current pointer.
            // A pointer the OS never saw gets no UP.
            let id = hand.contact_id();
            if self.persistent.contains_key(&id) {
                self.pending_removal.insert(id);
            } else {
                self.frame.remove(&id);
            }
        }
    }

    /// Record where the hand touches or hovers this tick. Ignored unless
    /// `collider` matches the hand's state, so each hand writes at most one
    /// frame contact per tick.
    pub fn on_stay(
        &mut self,
        hand: HandId,
        collider: ColliderKind,
        sample: &HandSample,
        surface: &SurfaceProjection,
    ) {
        let state = self.hands[hand.index()].state;
        let flags = match (state, collider) {
            (HandInteractionState::Drawing, ColliderKind::Physical) => {
                let id = hand.contact_id();
                let already_down = self
                    .persistent
                    .get(&id)
                    .is_some_and(|c| c.in_contact() && !c.is_down());
                if already_down {
                    ContactFlags::DRAG
                } else {
                    ContactFlags::PRESS
                }
            }
            (HandInteractionState::Hovering, ColliderKind::Hover) => ContactFlags::HOVER,
            _ => return,
        };

        let Some(dest) = self.destination_rect() else {
            debug!("No destination rect for touch; dropping {hand:?} sample");
            return;
        };
        let location = target_pixel(sample, self.offset(hand), surface, dest);
        let contact = TouchContact::new(
            hand.contact_id(),
            location,
            flags,
            self.config.pressure,
            self.config.contact_radius_px,
        );
        self.frame.insert(contact.id, contact);
    }

    // MARK: - Per-tick merge

    /// Merge this tick's events and submit the full contact set. Returns the
    /// number of records submitted.
    pub fn fixed_tick(&mut self) -> usize {
        for (id, contact) in std::mem::take(&mut self.frame) {
            self.persistent.insert(id, contact);
        }
        for id in std::mem::take(&mut self.pending_removal) {
            if let Some(contact) = self.persistent.get_mut(&id) {
                contact.flags = ContactFlags::UP;
            }
        }

        let (submitted, delivered) = self.submit();

        self.persistent.retain(|_, c| !c.is_up());
        if delivered {
            for contact in self.persistent.values_mut() {
                if contact.is_down() {
                    contact.flags = contact.flags.without(ContactFlags::DOWN) | ContactFlags::UPDATE;
                }
            }
        }
        submitted
    }

    /// Lift every contact and return all hands to out-of-range.
    pub fn release_all(&mut self) {
        self.frame.clear();
        self.pending_removal.clear();
        self.hands = [HandTracker::default(); 2];
        for contact in self.persistent.values_mut() {
            contact.flags = ContactFlags::UP;
        }
        let (released, _) = self.submit();
        self.persistent.clear();
        if released > 0 {
            info!("Released {released} touch contact(s)");
        }
    }

    /// Inject the persistent set. Returns the record count and whether the
    /// OS accepted the batch.
    fn submit(&mut self) -> (usize, bool) {
        if self.persistent.is_empty() {
            return (0, true);
        }
        let batch: Vec<TouchContact> = self.persistent.values().copied().collect();
        match self.injector.inject(&batch) {
            Ok(()) => (batch.len(), true),
            Err(e) => {
                self.failed_batches += 1;
                // Resubmitted in full next tick.
                warn!("Touch injection failed ({} contacts): {e}", batch.len());
                (batch.len(), false)
            }
        }
    }

    fn destination_rect(&self) -> Option<ScreenRect> {
        if self.config.test_mode {
            return Some(
                self.geometry
                    .desktop_rect()
                    .unwrap_or_else(|| ScreenRect::desktop(self.config.desktop_resolution)),
            );
        }
        self.target_window.and_then(|w| self.geometry.window_rect(w))
    }

    fn offset(&self, hand: HandId) -> Vec2 {
        match hand {
            HandId::Primary => Vec2::from(self.config.primary_offset),
            HandId::Secondary => Vec2::from(self.config.secondary_offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capturelink_core::{InjectError, PixelPoint};
    use glam::{Quat, Vec3};
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Batches = Rc<RefCell<Vec<Vec<TouchContact>>>>;

    #[derive(Default)]
    struct RecordingInjector {
        batches: Batches,
        /// Reject this many batches before accepting.
        failures: usize,
    }

    impl TouchInjector for RecordingInjector {
        fn inject(&mut self, contacts: &[TouchContact]) -> Result<(), InjectError> {
            self.batches.borrow_mut().push(contacts.to_vec());
            if self.failures > 0 {
                self.failures -= 1;
                return Err(InjectError::Rejected { count: contacts.len(), reason: "test".into() });
            }
            Ok(())
        }
    }

    struct FixedGeometry(Option<ScreenRect>);

    impl ScreenGeometry for FixedGeometry {
        fn window_rect(&self, _window: u64) -> Option<ScreenRect> {
            self.0
        }

        fn desktop_rect(&self) -> Option<ScreenRect> {
            None
        }
    }

    fn manager() -> (TouchContactManager<RecordingInjector, FixedGeometry>, Batches) {
        failing_manager(0)
    }

    fn failing_manager(failures: usize) -> (TouchContactManager<RecordingInjector, FixedGeometry>, Batches) {
        let injector = RecordingInjector { failures, ..Default::default() };
        let batches = Rc::clone(&injector.batches);
        let config = TouchConfig { test_mode: true, ..Default::default() };
        (TouchContactManager::new(config, injector, FixedGeometry(None)), batches)
    }

    fn sample() -> HandSample {
        HandSample::new(Vec3::ZERO, Quat::IDENTITY)
    }

    fn stay(m: &mut TouchContactManager<RecordingInjector, FixedGeometry>, hand: HandId) {
        let surface = SurfaceProjection::default();
        m.on_stay(hand, ColliderKind::Physical, &sample(), &surface);
        m.on_stay(hand, ColliderKind::Hover, &sample(), &surface);
    }

    fn last(batches: &Batches) -> Vec<TouchContact> {
        batches.borrow().last().cloned().unwrap_or_default()
    }

    #[test]
    fn drawing_and_hovering_hands_in_one_tick() {
        let (mut m, batches) = manager();
        m.on_enter(HandId::Primary, ColliderKind::Hover);
        m.on_enter(HandId::Primary, ColliderKind::Physical);
        m.on_enter(HandId::Secondary, ColliderKind::Hover);
        stay(&mut m, HandId::Primary);
        stay(&mut m, HandId::Secondary);

        assert_eq!(m.fixed_tick(), 2);
        let batch = last(&batches);
        assert_eq!(batch.len(), 2);

        let a = batch.iter().find(|c| c.id == 0).unwrap();
        assert!(a.flags.contains(ContactFlags::DOWN | ContactFlags::IN_CONTACT));

        let b = batch.iter().find(|c| c.id == 1).unwrap();
        assert_eq!(b.flags, ContactFlags::IN_RANGE | ContactFlags::UPDATE);
        assert!(!b.flags.contains(ContactFlags::IN_CONTACT));
        assert!(!b.flags.contains(ContactFlags::DOWN));
    }

    #[test]
    fn down_is_sent_once_then_updates() {
        let (mut m, batches) = manager();
        m.on_enter(HandId::Primary, ColliderKind::Physical);
        for _ in 0..3 {
            stay(&mut m, HandId::Primary);
            m.fixed_tick();
        }
        let flags: Vec<_> = batches.borrow().iter().map(|b| b[0].flags).collect();
        assert_eq!(flags, vec![ContactFlags::PRESS, ContactFlags::DRAG, ContactFlags::DRAG]);
    }

    #[test]
    fn stale_contacts_are_resent_every_tick() {
        let (mut m, batches) = manager();
        m.on_enter(HandId::Primary, ColliderKind::Hover);
        stay(&mut m, HandId::Primary);
        m.fixed_tick();

        // No new sample, still in range.
        m.fixed_tick();
        m.fixed_tick();
        assert_eq!(batches.borrow().len(), 3);
        assert_eq!(last(&batches)[0].flags, ContactFlags::HOVER);
    }

    #[test]
    fn hover_only_contact_gets_up_on_leaving_range() {
        let (mut m, batches) = manager();
        m.on_enter(HandId::Secondary, ColliderKind::Hover);
        stay(&mut m, HandId::Secondary);
        m.fixed_tick();

        m.on_exit(HandId::Secondary, ColliderKind::Hover);
        m.fixed_tick();
        assert_eq!(last(&batches)[0].flags, ContactFlags::UP);
        assert_eq!(m.persistent().count(), 0);

        assert_eq!(m.fixed_tick(), 0, "nothing left to submit");
        assert_eq!(batches.borrow().len(), 2);
    }

    #[test]
    fn lifting_to_hover_ends_contact_before_hovering() {
        let (mut m, batches) = manager();
        m.on_enter(HandId::Primary, ColliderKind::Hover);
        m.on_enter(HandId::Primary, ColliderKind::Physical);
        stay(&mut m, HandId::Primary);
        m.fixed_tick();

        m.on_exit(HandId::Primary, ColliderKind::Physical);
        assert_eq!(m.hand_state(HandId::Primary), HandInteractionState::Hovering);
        stay(&mut m, HandId::Primary);
        m.fixed_tick();
        assert_eq!(last(&batches)[0].flags, ContactFlags::UP);

        stay(&mut m, HandId::Primary);
        m.fixed_tick();
        assert_eq!(last(&batches)[0].flags, ContactFlags::HOVER);
    }

    #[test]
    fn injection_failures_are_tolerated() {
        let (mut m, batches) = failing_manager(2);

        m.on_enter(HandId::Primary, ColliderKind::Physical);
        stay(&mut m, HandId::Primary);
        m.fixed_tick();
        m.fixed_tick();
        assert_eq!(m.failed_batches(), 2);
        assert_eq!(batches.borrow().len(), 2);
        assert_eq!(m.persistent().count(), 1);
    }

    #[test]
    fn rejected_down_is_sent_again() {
        let (mut m, batches) = failing_manager(1);
        m.on_enter(HandId::Primary, ColliderKind::Physical);

        stay(&mut m, HandId::Primary);
        m.fixed_tick();
        // No sample this tick; the pending DOWN is resent on its own.
        m.fixed_tick();
        stay(&mut m, HandId::Primary);
        m.fixed_tick();

        let flags: Vec<_> = batches.borrow().iter().map(|b| b[0].flags).collect();
        assert_eq!(flags, vec![ContactFlags::PRESS, ContactFlags::PRESS, ContactFlags::DRAG]);
        assert_eq!(m.failed_batches(), 1);
    }

    #[test]
    fn rejected_down_keeps_down_when_hand_keeps_drawing() {
        let (mut m, batches) = failing_manager(2);
        m.on_enter(HandId::Primary, ColliderKind::Physical);
        for _ in 0..4 {
            stay(&mut m, HandId::Primary);
            m.fixed_tick();
        }
        let flags: Vec<_> = batches.borrow().iter().map(|b| b[0].flags).collect();
        assert_eq!(
            flags,
            vec![ContactFlags::PRESS, ContactFlags::PRESS, ContactFlags::PRESS, ContactFlags::DRAG]
        );
    }

    #[test]
    fn brief_hover_within_one_tick_sends_nothing() {
        let (mut m, batches) = manager();
        m.on_enter(HandId::Primary, ColliderKind::Physical);
        stay(&mut m, HandId::Primary);

        m.on_enter(HandId::Secondary, ColliderKind::Hover);
        stay(&mut m, HandId::Secondary);
        m.on_exit(HandId::Secondary, ColliderKind::Hover);

        assert_eq!(m.fixed_tick(), 1);
        let batch = last(&batches);
        assert!(batch.iter().all(|c| c.id == 0), "no bare UP for the secondary hand");
        assert_eq!(batch[0].flags, ContactFlags::PRESS);

        m.fixed_tick();
        assert!(injected(&batches).iter().all(|c| c.id == 0));
    }

    #[test]
    fn window_mode_maps_into_window_rect() {
        let injector = RecordingInjector::default();
        let batches = Rc::clone(&injector.batches);
        let rect = ScreenRect::new(200, 100, 400, 300);
        let mut m = TouchContactManager::new(TouchConfig::default(), injector, FixedGeometry(Some(rect)));

        m.on_enter(HandId::Primary, ColliderKind::Hover);
        stay(&mut m, HandId::Primary);
        assert_eq!(m.fixed_tick(), 0, "no target window yet");

        m.set_target_window(Some(0x42));
        assert_eq!(m.target_window(), Some(0x42));
        stay(&mut m, HandId::Primary);
        m.fixed_tick();
        assert_eq!(last(&batches)[0].location, PixelPoint::new(400, 250));
    }

    #[test]
    fn release_all_lifts_everything() {
        let (mut m, batches) = manager();
        m.on_enter(HandId::Primary, ColliderKind::Physical);
        m.on_enter(HandId::Secondary, ColliderKind::Hover);
        stay(&mut m, HandId::Primary);
        stay(&mut m, HandId::Secondary);
        m.fixed_tick();

        m.release_all();
        let batch = last(&batches);
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(TouchContact::is_up));
        assert_eq!(m.persistent().count(), 0);
        assert_eq!(m.hand_state(HandId::Primary), HandInteractionState::OutOfRange);
    }

    // ── Random event sequences ────────────────────────────────────────────────

    #[derive(Debug, Clone)]
    enum Event {
        Enter(HandId, ColliderKind),
        Exit(HandId, ColliderKind),
        Stay(HandId),
        Tick,
    }

    fn hand() -> impl Strategy<Value = HandId> {
        prop_oneof![Just(HandId::Primary), Just(HandId::Secondary)]
    }

    fn collider() -> impl Strategy<Value = ColliderKind> {
        prop_oneof![Just(ColliderKind::Physical), Just(ColliderKind::Hover)]
    }

    fn event() -> impl Strategy<Value = Event> {
        prop_oneof![
            1 => (hand(), collider()).prop_map(|(h, c)| Event::Enter(h, c)),
            1 => (hand(), collider()).prop_map(|(h, c)| Event::Exit(h, c)),
            3 => hand().prop_map(Event::Stay),
            3 => Just(Event::Tick),
        ]
    }

    fn apply(m: &mut TouchContactManager<RecordingInjector, FixedGeometry>, ev: &Event) {
        match ev {
            Event::Enter(h, c) => m.on_enter(*h, *c),
            Event::Exit(h, c) => m.on_exit(*h, *c),
            Event::Stay(h) => stay(m, *h),
            Event::Tick => {
                m.fixed_tick();
            }
        }
    }

    fn injected(batches: &Batches) -> Vec<TouchContact> {
        batches.borrow().iter().flatten().copied().collect()
    }

    proptest! {
        #[test]
        fn never_two_downs_without_up(events in prop::collection::vec(event(), 0..200)) {
            let (mut m, batches) = manager();
            for ev in &events {
                apply(&mut m, ev);
            }
            let mut down = [false; 2];
            for c in injected(&batches) {
                let slot = &mut down[c.id as usize];
                if c.is_down() {
                    prop_assert!(!*slot, "second DOWN for id {} without UP", c.id);
                    *slot = true;
                }
                if c.is_up() {
                    *slot = false;
                }
            }
        }

        #[test]
        fn every_in_range_id_is_eventually_lifted(events in prop::collection::vec(event(), 0..200)) {
            let (mut m, batches) = manager();
            for ev in &events {
                apply(&mut m, ev);
            }
            for h in HandId::ALL {
                m.on_exit(h, ColliderKind::Physical);
                m.on_exit(h, ColliderKind::Hover);
            }
            m.fixed_tick();

            let mut open = [false; 2];
            for c in injected(&batches) {
                if c.is_up() {
                    open[c.id as usize] = false;
                } else if c.flags.contains(ContactFlags::IN_RANGE) {
                    open[c.id as usize] = true;
                }
            }
            prop_assert_eq!(open, [false, false]);
            prop_assert_eq!(m.persistent().count(), 0);
        }

        #[test]
        fn persistent_set_never_holds_up(events in prop::collection::vec(event(), 0..200)) {
            let (mut m, _batches) = manager();
            for ev in &events {
                apply(&mut m, ev);
                prop_assert!(m.persistent().all(|c| !c.is_up()));
            }
        }
    }
}
