//! Widget tree, focus, and the input/display seams the dispatcher talks to.
//!
//! Widgets live in an arena ([`WidgetTree`]) and refer to each other by
//! [`WidgetId`]. Parent links are explicit so the dispatcher can bubble key
//! and encoder events by walking ids instead of chasing references.
//!
//! Layout and pixel painting are out of scope: a widget paints text through
//! the [`Painter`] seam and the [`Display`] decides what to do with it.

use std::any::Any;
use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::Mutex;

use crate::types::{Point, Rect};

// ---------------------------------------------------------------------------
// Input events
// ---------------------------------------------------------------------------

/// Hardware key, in switch bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyEvent {
    Right = 0,
    Left = 1,
    Down = 2,
    Up = 3,
    Select = 4,
    Dfu = 5,
}

impl KeyEvent {
    pub const ALL: [KeyEvent; 6] = [
        KeyEvent::Right,
        KeyEvent::Left,
        KeyEvent::Down,
        KeyEvent::Up,
        KeyEvent::Select,
        KeyEvent::Dfu,
    ];

    pub fn switch(self) -> Switches {
        Switches::from_bits_truncate(1 << self as u8)
    }
}

bitflags! {
    /// Level state of the hardware keys.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Switches: u8 {
        const RIGHT = 1 << 0;
        const LEFT = 1 << 1;
        const DOWN = 1 << 2;
        const UP = 1 << 3;
        const SELECT = 1 << 4;
        const DFU = 1 << 5;
    }
}

impl Switches {
    /// Pressed keys in bit order.
    pub fn keys(self) -> impl Iterator<Item = KeyEvent> {
        KeyEvent::ALL
            .into_iter()
            .filter(move |k| self.contains(k.switch()))
    }
}

/// Signed encoder movement in detents.
pub type EncoderEvent = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchKind {
    Start,
    Move,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchEvent {
    pub point: Point,
    pub kind: TouchKind,
}

impl TouchEvent {
    pub fn new(kind: TouchKind, x: i32, y: i32) -> Self {
        TouchEvent {
            point: Point::new(x, y),
            kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Widgets
// ---------------------------------------------------------------------------

/// Text sink used by [`Widget::paint`].
pub trait Painter {
    fn draw_text(&mut self, origin: Point, text: &str, inverted: bool);
}

/// Blanket downcast support so trees can hand out concrete widgets.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A node in the widget tree. Every handler returns `true` when it consumed
/// the event.
pub trait Widget: AsAny {
    fn on_key(&mut self, _event: KeyEvent) -> bool {
        false
    }

    fn on_encoder(&mut self, _event: EncoderEvent) -> bool {
        false
    }

    fn on_touch(&mut self, _event: TouchEvent) -> bool {
        false
    }

    fn on_focus(&mut self) {}

    fn on_blur(&mut self) {}

    fn focusable(&self) -> bool {
        false
    }

    fn paint(&self, _rect: Rect, _has_focus: bool, _painter: &mut dyn Painter) {}
}

/// Plain container.
#[derive(Debug, Default)]
pub struct View;

impl Widget for View {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetId(usize);

impl WidgetId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Shared "needs repaint" flag. Clones refer to the same flag, so message
/// handlers can mark the screen dirty without touching the tree.
#[derive(Debug, Clone, Default)]
pub struct DirtyFlag(Rc<Cell<bool>>);

impl DirtyFlag {
    pub fn set(&self) {
        self.0.set(true);
    }

    pub fn is_set(&self) -> bool {
        self.0.get()
    }

    pub fn take(&self) -> bool {
        self.0.replace(false)
    }
}

struct Node {
    widget: Box<dyn Widget>,
    parent: Option<WidgetId>,
    children: Vec<WidgetId>,
    rect: Rect,
    hidden: bool,
}

/// Arena of widgets rooted at [`WidgetTree::root`].
pub struct WidgetTree {
    nodes: Vec<Node>,
    dirty: DirtyFlag,
}

impl WidgetTree {
    pub fn new(rect: Rect, root: impl Widget) -> Self {
        let dirty = DirtyFlag::default();
        dirty.set();
        WidgetTree {
            nodes: vec![Node {
                widget: Box::new(root),
                parent: None,
                children: Vec::new(),
                rect,
                hidden: false,
            }],
            dirty,
        }
    }

    pub fn root(&self) -> WidgetId {
        WidgetId(0)
    }

    /// Append `widget` as the last child of `parent`.
    pub fn add(&mut self, parent: WidgetId, rect: Rect, widget: impl Widget) -> WidgetId {
        let id = WidgetId(self.nodes.len());
        self.nodes.push(Node {
            widget: Box::new(widget),
            parent: Some(parent),
            children: Vec::new(),
            rect,
            hidden: false,
        });
        self.nodes[parent.0].children.push(id);
        self.dirty.set();
        id
    }

    pub fn parent(&self, id: WidgetId) -> Option<WidgetId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: WidgetId) -> &[WidgetId] {
        &self.nodes[id.0].children
    }

    pub fn rect(&self, id: WidgetId) -> Rect {
        self.nodes[id.0].rect
    }

    pub fn set_rect(&mut self, id: WidgetId, rect: Rect) {
        self.nodes[id.0].rect = rect;
        self.dirty.set();
    }

    pub fn hidden(&self, id: WidgetId) -> bool {
        self.nodes[id.0].hidden
    }

    pub fn set_hidden(&mut self, id: WidgetId, hidden: bool) {
        self.nodes[id.0].hidden = hidden;
        self.dirty.set();
    }

    /// Hidden itself or below a hidden ancestor.
    pub fn is_visible(&self, id: WidgetId) -> bool {
        let mut cur = Some(id);
        while let Some(w) = cur {
            if self.nodes[w.0].hidden {
                return false;
            }
            cur = self.nodes[w.0].parent;
        }
        true
    }

    pub fn widget(&self, id: WidgetId) -> &dyn Widget {
        self.nodes[id.0].widget.as_ref()
    }

    pub fn widget_dyn_mut(&mut self, id: WidgetId) -> &mut dyn Widget {
        self.nodes[id.0].widget.as_mut()
    }

    /// Concrete access; `None` if `id` holds a different widget type.
    pub fn widget_mut<W: Widget>(&mut self, id: WidgetId) -> Option<&mut W> {
        self.nodes[id.0].widget.as_mut().as_any_mut().downcast_mut::<W>()
    }

    pub fn widget_ref<W: Widget>(&self, id: WidgetId) -> Option<&W> {
        self.nodes[id.0].widget.as_ref().as_any().downcast_ref::<W>()
    }

    pub fn dirty_flag(&self) -> DirtyFlag {
        self.dirty.clone()
    }

    pub fn set_dirty(&self) {
        self.dirty.set();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_set()
    }

    pub fn take_dirty(&self) -> bool {
        self.dirty.take()
    }

    /// Visible widgets in paint order (parents before children).
    pub fn visible_preorder(&self) -> Vec<WidgetId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            if self.nodes[id.0].hidden {
                continue;
            }
            out.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        out
    }

    /// Paint every visible widget through `painter`.
    pub fn paint(&self, focus: Option<WidgetId>, painter: &mut dyn Painter) {
        for id in self.visible_preorder() {
            let node = &self.nodes[id.0];
            node.widget.paint(node.rect, focus == Some(id), painter);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Focus
// ---------------------------------------------------------------------------

/// Tracks the focused widget and moves focus for unconsumed navigation
/// keys. Focus order is visible-preorder among focusable widgets.
#[derive(Debug, Default)]
pub struct FocusManager {
    focus: Option<WidgetId>,
}

impl FocusManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focus_widget(&self) -> Option<WidgetId> {
        self.focus
    }

    pub fn set_focus(&mut self, tree: &mut WidgetTree, id: Option<WidgetId>) {
        if self.focus == id {
            return;
        }
        if let Some(old) = self.focus {
            tree.widget_dyn_mut(old).on_blur();
        }
        self.focus = id;
        if let Some(new) = id {
            tree.widget_dyn_mut(new).on_focus();
        }
        tree.set_dirty();
    }

    /// Move focus for a key no widget consumed. Returns whether focus moved.
    pub fn update(&mut self, tree: &mut WidgetTree, event: KeyEvent) -> bool {
        let order: Vec<WidgetId> = tree
            .visible_preorder()
            .into_iter()
            .filter(|id| tree.widget(*id).focusable())
            .collect();
        if order.is_empty() {
            return false;
        }

        let current = self.focus.and_then(|f| order.iter().position(|id| *id == f));
        let next = match (event, current) {
            (KeyEvent::Down | KeyEvent::Right, Some(i)) if i + 1 < order.len() => {
                Some(order[i + 1])
            }
            (KeyEvent::Up | KeyEvent::Left, Some(i)) if i > 0 => Some(order[i - 1]),
            (KeyEvent::Select | KeyEvent::Dfu, _) => None,
            (_, None) => Some(order[0]),
            _ => None,
        };

        match next {
            Some(id) => {
                self.set_focus(tree, Some(id));
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Platform seams
// ---------------------------------------------------------------------------

/// Raw input as seen by the dispatcher after an input interrupt.
pub trait InputDevices {
    /// Next changed switch state, oldest first. `None` once caught up.
    fn poll_switches(&mut self) -> Option<Switches>;

    /// Absolute encoder count (wrapping).
    fn encoder_position(&mut self) -> u32;

    /// Next decoded touch event, oldest first.
    fn poll_touch(&mut self) -> Option<TouchEvent>;
}

#[derive(Debug, Default)]
struct InputState {
    switches: VecDeque<Switches>,
    encoder: u32,
    touches: VecDeque<TouchEvent>,
}

/// Thread-safe input fed by a host thread (stdin, test harness). The
/// feeding side should raise the matching interrupt afterwards.
#[derive(Debug, Clone, Default)]
pub struct SharedInput {
    state: Arc<Mutex<InputState>>,
}

impl SharedInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Press `key` and release it.
    pub fn tap(&self, key: KeyEvent) {
        let mut s = self.state.lock();
        s.switches.push_back(key.switch());
        s.switches.push_back(Switches::empty());
    }

    /// Queue an arbitrary level state.
    pub fn set_switches(&self, state: Switches) {
        self.state.lock().switches.push_back(state);
    }

    pub fn rotate(&self, delta: i32) {
        let mut s = self.state.lock();
        s.encoder = s.encoder.wrapping_add(delta as u32);
    }

    pub fn touch(&self, event: TouchEvent) {
        self.state.lock().touches.push_back(event);
    }
}

impl InputDevices for SharedInput {
    fn poll_switches(&mut self) -> Option<Switches> {
        self.state.lock().switches.pop_front()
    }

    fn encoder_position(&mut self) -> u32 {
        self.state.lock().encoder
    }

    fn poll_touch(&mut self) -> Option<TouchEvent> {
        self.state.lock().touches.pop_front()
    }
}

/// The physical screen.
pub trait Display {
    fn sleep(&mut self);

    fn wake(&mut self);

    fn set_backlight(&mut self, on: bool);

    /// Repaint. Called once per frame sync while awake.
    fn paint(&mut self, tree: &WidgetTree, focus: Option<WidgetId>);

    /// Full-screen fault report; nothing else is drawn afterwards.
    fn show_fault(&mut self, message: &str);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Button {
        label: &'static str,
        focused: bool,
    }

    impl Widget for Button {
        fn focusable(&self) -> bool {
            true
        }

        fn on_focus(&mut self) {
            self.focused = true;
        }

        fn on_blur(&mut self) {
            self.focused = false;
        }

        fn paint(&self, rect: Rect, has_focus: bool, painter: &mut dyn Painter) {
            painter.draw_text(Point::new(rect.left, rect.top), self.label, has_focus);
        }
    }

    struct Lines(Vec<(String, bool)>);

    impl Painter for Lines {
        fn draw_text(&mut self, _origin: Point, text: &str, inverted: bool) {
            self.0.push((text.to_string(), inverted));
        }
    }

    fn three_buttons() -> (WidgetTree, [WidgetId; 3]) {
        let mut tree = WidgetTree::new(Rect::new(0, 0, 240, 320), View);
        let root = tree.root();
        let button = |label| Button {
            label,
            ..Default::default()
        };
        let a = tree.add(root, Rect::new(0, 0, 240, 16), button("a"));
        let b = tree.add(root, Rect::new(0, 16, 240, 16), button("b"));
        let c = tree.add(root, Rect::new(0, 32, 240, 16), button("c"));
        (tree, [a, b, c])
    }

    #[test]
    fn test_parent_links() {
        let (tree, [a, _, c]) = three_buttons();
        assert_eq!(tree.parent(a), Some(tree.root()));
        assert_eq!(tree.parent(tree.root()), None);
        assert_eq!(tree.children(tree.root()).last(), Some(&c));
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_downcast() {
        let (mut tree, [a, _, _]) = three_buttons();
        assert_eq!(tree.widget_ref::<Button>(a).map(|b| b.label), Some("a"));
        assert!(tree.widget_mut::<View>(a).is_none());
    }

    #[test]
    fn test_hidden_subtree_not_visible() {
        let mut tree = WidgetTree::new(Rect::new(0, 0, 10, 10), View);
        let root = tree.root();
        let panel = tree.add(root, Rect::new(0, 0, 10, 10), View);
        let inner = tree.add(panel, Rect::new(0, 0, 5, 5), View);
        tree.set_hidden(panel, true);
        assert!(!tree.is_visible(inner));
        assert_eq!(tree.visible_preorder(), vec![root]);
    }

    #[test]
    fn test_focus_navigation() {
        let (mut tree, [a, b, c]) = three_buttons();
        let mut focus = FocusManager::new();

        assert!(focus.update(&mut tree, KeyEvent::Down));
        assert_eq!(focus.focus_widget(), Some(a));
        assert!(focus.update(&mut tree, KeyEvent::Down));
        assert_eq!(focus.focus_widget(), Some(b));
        assert!(tree.widget_ref::<Button>(b).unwrap().focused);
        assert!(!tree.widget_ref::<Button>(a).unwrap().focused);

        assert!(focus.update(&mut tree, KeyEvent::Right));
        assert_eq!(focus.focus_widget(), Some(c));
        assert!(!focus.update(&mut tree, KeyEvent::Down)); // end of order
        assert!(focus.update(&mut tree, KeyEvent::Up));
        assert_eq!(focus.focus_widget(), Some(b));
        assert!(!focus.update(&mut tree, KeyEvent::Select));
    }

    #[test]
    fn test_paint_marks_focus() {
        let (mut tree, [_, b, _]) = three_buttons();
        let mut focus = FocusManager::new();
        focus.set_focus(&mut tree, Some(b));

        let mut lines = Lines(Vec::new());
        tree.paint(focus.focus_widget(), &mut lines);
        assert_eq!(
            lines.0,
            vec![
                ("a".to_string(), false),
                ("b".to_string(), true),
                ("c".to_string(), false)
            ]
        );
    }

    #[test]
    fn test_dirty_flag_shared() {
        let (tree, _) = three_buttons();
        assert!(tree.take_dirty());
        assert!(!tree.is_dirty());
        let flag = tree.dirty_flag();
        flag.set();
        assert!(tree.take_dirty());
    }

    #[test]
    fn test_switch_keys() {
        let s = Switches::UP | Switches::SELECT;
        assert_eq!(s.keys().collect::<Vec<_>>(), vec![KeyEvent::Up, KeyEvent::Select]);
        assert_eq!(KeyEvent::Down.switch(), Switches::DOWN);
    }

    #[test]
    fn test_shared_input_tap_queues_press_and_release() {
        let input = SharedInput::new();
        let mut reader = input.clone();
        input.tap(KeyEvent::Left);
        assert_eq!(reader.poll_switches(), Some(Switches::LEFT));
        assert_eq!(reader.poll_switches(), Some(Switches::empty()));
        assert_eq!(reader.poll_switches(), None);
    }

    #[test]
    fn test_shared_input_encoder_wraps() {
        let input = SharedInput::new();
        let mut reader = input.clone();
        input.rotate(-1);
        assert_eq!(reader.encoder_position(), u32::MAX);
        input.rotate(3);
        assert_eq!(reader.encoder_position(), 2);
    }
}
