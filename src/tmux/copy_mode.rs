//! Turns continuous scroll gesture deltas into discrete tmux copy-mode
//! key sequences.

use tracing::trace;

/// C-b then `[`: the copy-mode entry sequence for a default tmux prefix.
const COPY_MODE_ENTER: &[u8] = &[0x02, b'['];
/// `q` leaves copy mode.
const COPY_MODE_EXIT: &[u8] = b"q";
const CURSOR_UP: &[u8] = &[0x1b, b'[', b'A'];
const CURSOR_DOWN: &[u8] = &[0x1b, b'[', b'B'];

/// Gesture units of vertical motion per scrolled line.
pub const DEFAULT_LINE_HEIGHT: f32 = 16.0;

/// Transient copy-mode flags for one terminal view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyModeState {
    pub in_copy_mode: bool,
    /// Lines scrolled back from the live bottom; never negative.
    pub scroll_offset_lines: u32,
}

/// Accumulates raw scroll deltas and emits whole-line cursor keys,
/// entering copy mode before the first key and leaving it when a
/// gesture ends back at the bottom. One instance per terminal view.
pub struct ScrollTranslator {
    line_height: f32,
    accumulated: f32,
    /// Whether the view currently sits inside a tmux session; gestures
    /// are ignored entirely when it does not.
    has_context: bool,
    state: CopyModeState,
}

impl ScrollTranslator {
    pub fn new(line_height: f32) -> Self {
        Self {
            line_height,
            accumulated: 0.0,
            has_context: false,
            state: CopyModeState::default(),
        }
    }

    pub fn set_context(&mut self, inside_multiplexer: bool) {
        self.has_context = inside_multiplexer;
    }

    pub fn state(&self) -> CopyModeState {
        self.state
    }

    /// Feeds one gesture update. Returns the key sequences to send, in
    /// order. Positive deltas scroll up (back in history). The
    /// fractional remainder below one line height carries over to the
    /// next update, so slow gestures do not drift.
    pub fn scroll(&mut self, delta: f32) -> Vec<Vec<u8>> {
        if !self.has_context {
            return Vec::new();
        }

        self.accumulated += delta;
        let lines = (self.accumulated / self.line_height) as i32;
        if lines == 0 {
            return Vec::new();
        }
        self.accumulated -= lines as f32 * self.line_height;

        let mut sequences = Vec::new();
        if !self.state.in_copy_mode {
            sequences.push(COPY_MODE_ENTER.to_vec());
            self.state.in_copy_mode = true;
        }
        let key = if lines > 0 { CURSOR_UP } else { CURSOR_DOWN };
        for _ in 0..lines.unsigned_abs() {
            sequences.push(key.to_vec());
        }
        self.state.scroll_offset_lines = self.state.scroll_offset_lines.saturating_add_signed(lines);
        trace!(lines, offset = self.state.scroll_offset_lines, "scroll keys");
        sequences
    }

    /// Marks the end of a gesture (pointer lift). Returns the exit key
    /// when the view is back at the live bottom; otherwise copy mode
    /// stays active across gestures.
    pub fn gesture_ended(&mut self) -> Option<Vec<u8>> {
        self.accumulated = 0.0;
        if self.state.in_copy_mode && self.state.scroll_offset_lines == 0 {
            self.state.in_copy_mode = false;
            return Some(COPY_MODE_EXIT.to_vec());
        }
        None
    }

    /// Jumps back to the live view unconditionally, e.g. when the user
    /// submits a command while scrolled back. Returns the exit key if
    /// copy mode was active.
    pub fn return_to_live(&mut self) -> Option<Vec<u8>> {
        self.accumulated = 0.0;
        self.state.scroll_offset_lines = 0;
        if self.state.in_copy_mode {
            self.state.in_copy_mode = false;
            return Some(COPY_MODE_EXIT.to_vec());
        }
        None
    }
}

impl Default for ScrollTranslator {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_HEIGHT)
    }
}
