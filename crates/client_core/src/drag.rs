use std::sync::Arc;

use shared::domain::StationUuid;
use tracing::debug;

use crate::error::DragError;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset_from(self, origin: Point) -> Point {
        Point::new(self.x - origin.x, self.y - origin.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size { width, height },
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.origin.x
            && point.x < self.origin.x + self.size.width
            && point.y >= self.origin.y
            && point.y < self.origin.y + self.size.height
    }
}

pub trait LayoutProbe {
    fn station_at(&self, point: Point) -> Option<StationUuid>;
}

#[derive(Debug, Clone, Default)]
pub struct CardLayout {
    cards: Vec<(StationUuid, Rect)>,
}

impl CardLayout {
    pub fn new(cards: Vec<(StationUuid, Rect)>) -> Self {
        Self { cards }
    }

    pub fn column<'a>(
        ids: impl IntoIterator<Item = &'a StationUuid>,
        card: Size,
        gap: f64,
    ) -> Self {
        let cards = ids
            .into_iter()
            .enumerate()
            .map(|(index, id)| {
                let y = index as f64 * (card.height + gap);
                (id.clone(), Rect::new(0.0, y, card.width, card.height))
            })
            .collect();
        Self { cards }
    }

    pub fn bounds_of(&self, id: &StationUuid) -> Option<Rect> {
        self.cards
            .iter()
            .find(|(card_id, _)| card_id == id)
            .map(|(_, rect)| *rect)
    }
}

impl LayoutProbe for CardLayout {
    fn station_at(&self, point: Point) -> Option<StationUuid> {
        self.cards
            .iter()
            .find(|(_, rect)| rect.contains(point))
            .map(|(id, _)| id.clone())
    }
}

pub trait PointerTracking: Send + Sync {
    fn attach(&self);
    fn detach(&self);
}

pub struct NoopPointerTracking;

impl PointerTracking for NoopPointerTracking {
    fn attach(&self) {}
    fn detach(&self) {}
}

/// Attached on construction, detached on drop.
struct ListenerRegistration {
    tracking: Arc<dyn PointerTracking>,
}

impl ListenerRegistration {
    fn acquire(tracking: Arc<dyn PointerTracking>) -> Self {
        tracking.attach();
        Self { tracking }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.tracking.detach();
    }
}

#[derive(Debug, Clone)]
pub struct DragGrab {
    pub station: StationUuid,
    pub pointer: Point,
    pub card_bounds: Rect,
}

pub struct DragState {
    dragging_id: StationUuid,
    drag_order: Vec<StationUuid>,
    main_station: Option<StationUuid>,
    pointer_start: Point,
    pointer_current: Point,
    grab_offset: Point,
    card_size: Size,
    _listeners: ListenerRegistration,
}

impl DragState {
    pub fn dragging_id(&self) -> &StationUuid {
        &self.dragging_id
    }

    pub fn drag_order(&self) -> &[StationUuid] {
        &self.drag_order
    }

    pub fn pointer(&self) -> Point {
        self.pointer_current
    }

    pub fn translation(&self) -> Point {
        self.pointer_current.offset_from(self.pointer_start)
    }

    pub fn ghost_origin(&self) -> Point {
        self.pointer_current.offset_from(self.grab_offset)
    }

    pub fn card_size(&self) -> Size {
        self.card_size
    }

    /// Full order to commit: main station first, then the dragged order.
    pub fn committed_order(&self) -> Vec<StationUuid> {
        self.main_station
            .iter()
            .cloned()
            .chain(self.drag_order.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderCommit {
    pub order: Vec<StationUuid>,
}

enum DragPhase {
    Idle,
    Dragging(DragState),
}

pub struct DragCoordinator {
    phase: DragPhase,
    tracking: Arc<dyn PointerTracking>,
}

impl Default for DragCoordinator {
    fn default() -> Self {
        Self::new(Arc::new(NoopPointerTracking))
    }
}

impl DragCoordinator {
    pub fn new(tracking: Arc<dyn PointerTracking>) -> Self {
        Self {
            phase: DragPhase::Idle,
            tracking,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, DragPhase::Dragging(_))
    }

    pub fn state(&self) -> Option<&DragState> {
        match &self.phase {
            DragPhase::Dragging(state) => Some(state),
            DragPhase::Idle => None,
        }
    }

    pub fn drag_order(&self) -> Option<&[StationUuid]> {
        self.state().map(DragState::drag_order)
    }

    /// `Idle -> Dragging`. `order` is the non-main station order at press
    /// time; the gesture only ever permutes it.
    pub fn begin(
        &mut self,
        grab: DragGrab,
        main_station: Option<StationUuid>,
        order: Vec<StationUuid>,
    ) -> Result<(), DragError> {
        if let DragPhase::Dragging(state) = &self.phase {
            return Err(DragError::AlreadyDragging(state.dragging_id.clone()));
        }
        if !order.contains(&grab.station) {
            return Err(DragError::NotReorderable(grab.station));
        }

        debug!(station = %grab.station, "drag: gesture started");
        self.phase = DragPhase::Dragging(DragState {
            grab_offset: grab.pointer.offset_from(grab.card_bounds.origin),
            card_size: grab.card_bounds.size,
            pointer_start: grab.pointer,
            pointer_current: grab.pointer,
            dragging_id: grab.station,
            drag_order: order,
            main_station,
            _listeners: ListenerRegistration::acquire(Arc::clone(&self.tracking)),
        });
        Ok(())
    }

    /// Tracks the pointer and moves the dragged station onto whichever other
    /// card is under it. Returns whether the order changed.
    pub fn pointer_moved(&mut self, pointer: Point, layout: &dyn LayoutProbe) -> bool {
        let DragPhase::Dragging(state) = &mut self.phase else {
            return false;
        };
        state.pointer_current = pointer;

        let Some(target) = layout.station_at(pointer) else {
            return false;
        };
        if target == state.dragging_id {
            return false;
        }
        let Some(target_index) = state.drag_order.iter().position(|id| id == &target) else {
            return false;
        };
        move_to(&mut state.drag_order, &state.dragging_id, target_index)
    }

    pub fn release(&mut self) -> Option<ReorderCommit> {
        match std::mem::replace(&mut self.phase, DragPhase::Idle) {
            DragPhase::Dragging(state) => {
                let order = state.committed_order();
                debug!(station = %state.dragging_id, ?order, "drag: gesture released");
                Some(ReorderCommit { order })
            }
            DragPhase::Idle => None,
        }
    }

    pub fn cancel(&mut self) -> bool {
        match std::mem::replace(&mut self.phase, DragPhase::Idle) {
            DragPhase::Dragging(state) => {
                debug!(station = %state.dragging_id, "drag: gesture cancelled");
                true
            }
            DragPhase::Idle => false,
        }
    }
}

fn move_to(order: &mut Vec<StationUuid>, id: &StationUuid, target_index: usize) -> bool {
    let Some(current) = order.iter().position(|candidate| candidate == id) else {
        return false;
    };
    if current == target_index {
        return false;
    }
    let moved = order.remove(current);
    order.insert(target_index, moved);
    true
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingTracking {
        attached: AtomicUsize,
        detached: AtomicUsize,
    }

    impl CountingTracking {
        fn active(&self) -> usize {
            self.attached.load(Ordering::SeqCst) - self.detached.load(Ordering::SeqCst)
        }
    }

    impl PointerTracking for CountingTracking {
        fn attach(&self) {
            self.attached.fetch_add(1, Ordering::SeqCst);
        }

        fn detach(&self) {
            self.detached.fetch_add(1, Ordering::SeqCst);
        }
    }

    const CARD: Size = Size {
        width: 300.0,
        height: 100.0,
    };

    fn ids(raw: &[&str]) -> Vec<StationUuid> {
        raw.iter().map(|id| StationUuid::from(*id)).collect()
    }

    fn grab(layout: &CardLayout, id: &str) -> DragGrab {
        let station = StationUuid::from(id);
        let card_bounds = layout.bounds_of(&station).expect("card on screen");
        DragGrab {
            pointer: Point::new(card_bounds.origin.x + 20.0, card_bounds.origin.y + 30.0),
            station,
            card_bounds,
        }
    }

    fn centre_of(layout: &CardLayout, id: &str) -> Point {
        let rect = layout.bounds_of(&StationUuid::from(id)).expect("card");
        Point::new(
            rect.origin.x + rect.size.width / 2.0,
            rect.origin.y + rect.size.height / 2.0,
        )
    }

    #[test]
    fn dragging_last_card_onto_first_moves_it_to_front() {
        let order = ids(&["a", "b", "c"]);
        let layout = CardLayout::column(&order, CARD, 10.0);
        let mut drag = DragCoordinator::default();

        drag.begin(grab(&layout, "c"), None, order.clone()).expect("begin");
        assert!(drag.pointer_moved(centre_of(&layout, "a"), &layout));
        assert_eq!(drag.drag_order().unwrap(), ids(&["c", "a", "b"]).as_slice());

        let commit = drag.release().expect("commit");
        assert_eq!(commit.order, ids(&["c", "a", "b"]));
        assert!(!drag.is_dragging());
    }

    #[test]
    fn committed_order_puts_main_station_first() {
        let order = ids(&["a", "b"]);
        let layout = CardLayout::column(&order, CARD, 0.0);
        let mut drag = DragCoordinator::default();

        drag.begin(grab(&layout, "a"), Some(StationUuid::from("m")), order)
            .expect("begin");
        drag.pointer_moved(centre_of(&layout, "b"), &layout);
        let commit = drag.release().expect("commit");
        assert_eq!(commit.order, ids(&["m", "b", "a"]));
    }

    #[test]
    fn hovering_own_card_or_gaps_changes_nothing() {
        let order = ids(&["a", "b", "c"]);
        let layout = CardLayout::column(&order, CARD, 50.0);
        let mut drag = DragCoordinator::default();
        drag.begin(grab(&layout, "b"), None, order.clone()).expect("begin");

        assert!(!drag.pointer_moved(centre_of(&layout, "b"), &layout));
        assert!(!drag.pointer_moved(Point::new(10.0, 125.0), &layout));
        assert!(!drag.pointer_moved(Point::new(-50.0, -50.0), &layout));
        assert_eq!(drag.drag_order().unwrap(), order.as_slice());
    }

    #[test]
    fn cards_outside_the_gesture_are_ignored() {
        let order = ids(&["a", "b"]);
        let mut cards = ids(&["m"]);
        cards.extend(order.iter().cloned());
        let layout = CardLayout::column(&cards, CARD, 0.0);
        let mut drag = DragCoordinator::default();
        drag.begin(grab(&layout, "b"), Some(StationUuid::from("m")), order.clone())
            .expect("begin");

        assert!(!drag.pointer_moved(centre_of(&layout, "m"), &layout));
        assert_eq!(drag.drag_order().unwrap(), order.as_slice());
    }

    #[test]
    fn any_move_sequence_keeps_a_permutation() {
        let order = ids(&["a", "b", "c", "d", "e", "f"]);
        let layout = CardLayout::column(&order, CARD, 5.0);
        let mut drag = DragCoordinator::default();
        drag.begin(grab(&layout, "d"), None, order.clone()).expect("begin");

        // Sweep the pointer up and down the column with a fixed stride.
        let mut y = 0.0;
        for step in 0..200 {
            y = (y + 37.0 + step as f64 * 3.0) % 700.0;
            drag.pointer_moved(Point::new(150.0, y), &layout);

            let mut current = drag.drag_order().unwrap().to_vec();
            assert_eq!(current.len(), order.len());
            current.sort();
            let mut expected = order.clone();
            expected.sort();
            assert_eq!(current, expected);
        }
    }

    #[test]
    fn tracks_pointer_for_visual_translation() {
        let order = ids(&["a", "b"]);
        let layout = CardLayout::column(&order, CARD, 0.0);
        let mut drag = DragCoordinator::default();
        drag.begin(grab(&layout, "a"), None, order).expect("begin");

        drag.pointer_moved(Point::new(60.0, 90.0), &layout);
        let state = drag.state().expect("dragging");
        assert_eq!(state.translation(), Point::new(40.0, 60.0));
        assert_eq!(state.ghost_origin(), Point::new(40.0, 60.0));
        assert_eq!(state.card_size(), CARD);
    }

    #[test]
    fn rejects_main_station_and_second_gesture() {
        let order = ids(&["a", "b"]);
        let layout = CardLayout::column(&ids(&["m", "a", "b"]), CARD, 0.0);
        let mut drag = DragCoordinator::default();

        assert_eq!(
            drag.begin(grab(&layout, "m"), Some(StationUuid::from("m")), order.clone()),
            Err(DragError::NotReorderable(StationUuid::from("m")))
        );
        drag.begin(grab(&layout, "a"), None, order.clone()).expect("begin");
        assert_eq!(
            drag.begin(grab(&layout, "b"), None, order),
            Err(DragError::AlreadyDragging(StationUuid::from("a")))
        );
    }

    #[test]
    fn listeners_are_released_on_every_exit_path() {
        let tracking = Arc::new(CountingTracking::default());
        let order = ids(&["a", "b"]);
        let layout = CardLayout::column(&order, CARD, 0.0);
        let mut drag = DragCoordinator::new(tracking.clone());

        for _ in 0..3 {
            drag.begin(grab(&layout, "a"), None, order.clone()).expect("begin");
            assert_eq!(tracking.active(), 1);
            drag.release();
            assert_eq!(tracking.active(), 0);
        }

        drag.begin(grab(&layout, "b"), None, order.clone()).expect("begin");
        assert!(drag.cancel());
        assert_eq!(tracking.active(), 0);

        drag.begin(grab(&layout, "b"), None, order.clone()).expect("begin");
        let _ = drag.begin(grab(&layout, "a"), None, order.clone());
        assert_eq!(tracking.active(), 1);
        drop(drag);
        assert_eq!(tracking.active(), 0);
        assert_eq!(tracking.attached.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn release_when_idle_is_a_no_op() {
        let mut drag = DragCoordinator::default();
        assert_eq!(drag.release(), None);
        assert!(!drag.cancel());
        assert!(!drag.pointer_moved(Point::default(), &CardLayout::default()));
    }
}
