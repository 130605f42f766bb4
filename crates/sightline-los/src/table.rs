//! Precomputed hidden-behind relations for a fixed viewing window.

use std::error::Error;

/// Distance must be at or below this for a cell to hide another. A cell is
/// 1.0 wide, so 0.5 means an obstruction covering half the sightline hides
/// what lies behind it; 0.4 or less would let viewers peek past walls.
const SPACE_BLOCK: f64 = 0.5;

/// Observed upper bound on relations per cell; each quadrant cell is probed
/// against three nearer offsets and mirroring dedupes onto the axes.
const FANOUT: usize = 4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Shadow {
    n: u8,
    cells: [(i16, i16); FANOUT],
}

impl Shadow {
    fn push(&mut self, bx: i16, by: i16) {
        // Mirroring revisits cells on the center axes; keep relations unique.
        for i in 0..self.n as usize {
            if self.cells[i] == (bx, by) {
                return;
            }
        }
        debug_assert!((self.n as usize) < FANOUT);
        if (self.n as usize) < FANOUT {
            self.cells[self.n as usize] = (bx, by);
            self.n += 1;
        }
    }

    #[inline]
    fn as_slice(&self) -> &[(i16, i16)] {
        &self.cells[..self.n as usize]
    }
}

/// For every cell of the viewing window, the cells it hides when opaque.
/// Built once per process from window geometry alone and shared read-only
/// across all viewers.
///
/// A relation `(x, y) -> (bx, by)` means: if `(x, y)` is opaque, `(bx, by)`
/// is hidden from the window center. Relations always point strictly away
/// from the center, so chains of them are finite.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockTable {
    w: i32,
    h: i32,
    cells: Vec<Shadow>,
}

impl BlockTable {
    /// Build the table for a `w x h` window. Dimensions must be odd and at
    /// least 3 so a true center cell exists; anything else is a
    /// configuration error with no sane fallback.
    pub fn build(w: i32, h: i32) -> Result<Self, Box<dyn Error>> {
        if w < 3 || h < 3 || w % 2 == 0 || h % 2 == 0 {
            return Err(format!("viewing window must be odd and at least 3x3, got {w}x{h}").into());
        }
        let mut table = BlockTable {
            w,
            h,
            cells: vec![Shadow::default(); (w * h) as usize],
        };
        let (cx, cy) = (w / 2, h / 2);
        // Offsets toward the window edge from a cell in the upper-left
        // quadrant (smaller coordinates are farther from the center there).
        const NEARER: [(i32, i32); 3] = [(-1, -1), (-1, 0), (0, -1)];

        // Only the upper-left quadrant is computed; the rest is mirrored.
        for x in 1..=cx {
            for y in 1..=cy {
                // The center cell never hides anything.
                if x == cx && y == cy {
                    continue;
                }
                for (ox, oy) in NEARER {
                    let dx = x + ox;
                    let dy = y + oy;
                    if (dx == x && x == cx) || (dy == y && y == cy) {
                        // Straight cardinal line through the center: hidden
                        // outright, no distance test. Only one reflection is
                        // distinct on an axis.
                        table.set(x, y, dx, dy);
                        if x == cx {
                            table.set(x, h - y - 1, dx, h - dy - 1);
                        } else if y == cy {
                            table.set(w - x - 1, y, w - dx - 1, dy);
                        }
                    } else {
                        // Perpendicular distance from (x,y) to the line
                        // running from (dx,dy) to the window center.
                        let d1 = ((cx - dx).pow(2) + (cy - dy).pow(2)) as f64;
                        let s = ((dy - y) * (cx - dx) - (dx - x) * (cy - dy)) as f64 / d1;
                        let l = (d1.sqrt() * s).abs();
                        if l <= SPACE_BLOCK {
                            table.set(x, y, dx, dy);
                            table.set(w - x - 1, y, w - dx - 1, dy);
                            table.set(x, h - y - 1, dx, h - dy - 1);
                            table.set(w - x - 1, h - y - 1, w - dx - 1, h - dy - 1);
                        }
                    }
                }
            }
        }
        Ok(table)
    }

    #[inline]
    fn idx(&self, x: i32, y: i32) -> usize {
        (y * self.w + x) as usize
    }

    fn set(&mut self, x: i32, y: i32, bx: i32, by: i32) {
        let i = self.idx(x, y);
        self.cells[i].push(bx as i16, by as i16);
    }

    /// Cells hidden when `(x, y)` is opaque, in table space.
    #[inline]
    pub fn hidden_behind(&self, x: i32, y: i32) -> &[(i16, i16)] {
        self.cells[self.idx(x, y)].as_slice()
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.w
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.h
    }

    #[inline]
    pub fn center(&self) -> (i32, i32) {
        (self.w / 2, self.h / 2)
    }
}
