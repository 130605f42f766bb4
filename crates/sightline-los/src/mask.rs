//! Per-viewer visibility mask in client space.

use std::fmt;

/// One cell of a viewer's mask.
///
/// The wire protocol collapses these to a single signed byte (see
/// [`Cell::wire_byte`]); internally the states are kept apart so an opaque
/// mark can never be erased by brightness arithmetic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Cell {
    /// Fully visible, or nothing found that rules the cell out.
    #[default]
    Visible,
    /// Confirmed opaque, hidden behind an obstruction, or off the map.
    Blocked,
    /// Obstruction bordering open floor, pending reveal at normalization.
    Softened,
    /// Darkness shade: 0 is bright, higher is darker. May dip negative while
    /// light contributions accumulate; normalization clears that to visible.
    Shade(i8),
}

impl Cell {
    #[inline]
    pub fn is_blocked(self) -> bool {
        matches!(self, Cell::Blocked)
    }

    /// The byte encoding consumed by the transport layer: 0 visible, 100
    /// blocked, -1 softened, anything else a shade level.
    #[inline]
    pub fn wire_byte(self) -> i8 {
        match self {
            Cell::Visible => 0,
            Cell::Blocked => 100,
            Cell::Softened => -1,
            Cell::Shade(v) => v,
        }
    }
}

/// Flat client-space grid of [`Cell`] marks, always centered on the viewer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LosMask {
    w: i32,
    h: i32,
    cells: Vec<Cell>,
}

impl LosMask {
    pub fn new(w: i32, h: i32) -> Self {
        assert!(
            w >= 1 && h >= 1 && w % 2 == 1 && h % 2 == 1,
            "mask dimensions must be odd, got {w}x{h}"
        );
        LosMask {
            w,
            h,
            cells: vec![Cell::Visible; (w * h) as usize],
        }
    }

    #[inline]
    fn idx(&self, x: i32, y: i32) -> usize {
        (y * self.w + x) as usize
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.w
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.h
    }

    /// The viewer's own cell.
    #[inline]
    pub fn center(&self) -> (i32, i32) {
        (self.w / 2, self.h / 2)
    }

    #[inline]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.w && y < self.h
    }

    #[inline]
    pub fn get(&self, x: i32, y: i32) -> Cell {
        self.cells[self.idx(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: i32, y: i32, cell: Cell) {
        let i = self.idx(x, y);
        self.cells[i] = cell;
    }

    /// Reset every cell; each recompute starts from a fully overwritten mask.
    pub fn clear(&mut self) {
        self.cells.fill(Cell::Visible);
    }

    pub fn fill(&mut self, cell: Cell) {
        self.cells.fill(cell);
    }

    /// Collapse transient marks after the passes have run: softened cells
    /// and over-lit shades become plain visible.
    pub fn normalize(&mut self) {
        for c in &mut self.cells {
            match *c {
                Cell::Softened => *c = Cell::Visible,
                Cell::Shade(v) if v <= 0 => *c = Cell::Visible,
                _ => {}
            }
        }
    }

    /// ASCII rendering for debug commands: `#` blocked, `.` visible, shade
    /// digits, `~` softened.
    pub fn debug_grid(&self) -> String {
        let mut out = String::with_capacity(((self.w + 1) * self.h) as usize);
        for y in 0..self.h {
            for x in 0..self.w {
                out.push(match self.get(x, y) {
                    Cell::Visible => '.',
                    Cell::Blocked => '#',
                    Cell::Softened => '~',
                    Cell::Shade(v) => {
                        char::from_digit(v.clamp(0, 9) as u32, 10).unwrap_or('?')
                    }
                });
            }
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for LosMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.debug_grid())
    }
}
