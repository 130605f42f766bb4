//! The recompute pipeline: blocking cascade, corner smoothing, lighting.

use sightline_map::{MAX_DARKNESS, MapId, MapSource};

use crate::mask::{Cell, LosMask};
use crate::table::BlockTable;
use crate::view::Vision;

/// Largest radius any light source can reach; also the shade a cell starts
/// at on a dark map before lights argue it back down.
pub const MAX_LIGHT_RADIUS: i32 = 4;

/// How much the effective darkness drops for a dark-vision viewer.
const DARK_VISION_BONUS: i32 = 2;

/// Half-width of the box forced visible for x-ray viewers.
const XRAY_REACH: i32 = 2;

/// The 8 neighbors of a cell, cardinals first.
const NEIGHBORS: [(i32, i32); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

/// Recompute `mask` for a viewer standing at `(x, y)` on `map`.
///
/// Policy order is fixed: omniscient sight short-circuits to an all-visible
/// mask, blindness short-circuits to an all-blocked one, and the x-ray patch
/// is applied only on the normal path, after lighting.
pub fn update_view<M: MapSource>(
    table: &BlockTable,
    source: &M,
    map: MapId,
    x: i32,
    y: i32,
    vision: Vision,
    mask: &mut LosMask,
) {
    mask.clear();
    if vision.omniscient {
        return;
    }
    if vision.blind {
        blinded_view(mask);
        return;
    }

    cascade_obstructions(table, source, map, x, y, mask);
    soften_corners(source, map, x, y, mask);
    if source.darkness(map) > 0 {
        apply_light(source, map, x, y, vision, mask);
    }
    mask.normalize();

    if vision.xray {
        let (ccx, ccy) = mask.center();
        for dy in -XRAY_REACH..=XRAY_REACH {
            for dx in -XRAY_REACH..=XRAY_REACH {
                if mask.in_bounds(ccx + dx, ccy + dy) {
                    mask.set(ccx + dx, ccy + dy, Cell::Visible);
                }
            }
        }
    }
}

/// Everything blocked except the viewer's own cell. A little odd that a
/// blind viewer still sees what they stand on, but play is unreasonable
/// without it.
fn blinded_view(mask: &mut LosMask) {
    mask.fill(Cell::Blocked);
    let (ccx, ccy) = mask.center();
    mask.set(ccx, ccy, Cell::Visible);
}

/// Walk every window cell once; each opaque or off-map cell is marked
/// blocked and its hidden-behind chain cascaded.
pub(crate) fn cascade_obstructions<M: MapSource>(
    table: &BlockTable,
    source: &M,
    map: MapId,
    vx: i32,
    vy: i32,
    mask: &mut LosMask,
) {
    let (tcx, tcy) = table.center();
    // Client window's origin inside table space.
    let ox = (table.width() - mask.width()) / 2;
    let oy = (table.height() - mask.height()) / 2;

    for tx in 0..table.width() {
        for ty in 0..table.height() {
            let ax = tx - ox;
            let ay = ty - oy;
            if !mask.in_bounds(ax, ay) {
                continue;
            }
            // The viewer's own cell is always seen.
            if tx == tcx && ty == tcy {
                continue;
            }
            // Already swept up by an earlier obstruction; its chain is done.
            if mask.get(ax, ay).is_blocked() {
                continue;
            }
            let r = source.resolve(map, vx + tx - tcx, vy + ty - tcy);
            if r.out_of_bounds || source.is_opaque(r.map, r.x, r.y) {
                mask.set(ax, ay, Cell::Blocked);
                spread_shadow(table, mask, tx, ty, ox, oy);
            }
        }
    }
}

/// Mark everything hidden behind table cell `(tx, ty)`, recursing through
/// the chain. The table only ever points strictly farther from the center,
/// so the recursion depth is bounded by the window radius; a cell that is
/// already blocked had its chain walked when it was marked.
fn spread_shadow(table: &BlockTable, mask: &mut LosMask, tx: i32, ty: i32, ox: i32, oy: i32) {
    for &(bx, by) in table.hidden_behind(tx, ty) {
        let (bx, by) = (bx as i32, by as i32);
        let ax = bx - ox;
        let ay = by - oy;
        if !mask.in_bounds(ax, ay) {
            continue;
        }
        if mask.get(ax, ay).is_blocked() {
            continue;
        }
        mask.set(ax, ay, Cell::Blocked);
        spread_shadow(table, mask, bx, by, ox, oy);
    }
}

/// Soften the cascade so viewers can see into corners: every blocked cell
/// touching a visible, transparent interior cell is queued for reveal. The
/// softened marks survive into the lighting pass and collapse to visible at
/// normalization.
pub(crate) fn soften_corners<M: MapSource>(source: &M, map: MapId, vx: i32, vy: i32, mask: &mut LosMask) {
    let (ccx, ccy) = mask.center();
    for x in 1..mask.width() - 1 {
        for y in 1..mask.height() - 1 {
            if mask.get(x, y) != Cell::Visible {
                continue;
            }
            let r = source.resolve(map, vx - ccx + x, vy - ccy + y);
            if r.out_of_bounds || source.is_opaque(r.map, r.x, r.y) {
                continue;
            }
            for (ox, oy) in NEIGHBORS {
                if mask.get(x + ox, y + oy).is_blocked() {
                    mask.set(x + ox, y + oy, Cell::Softened);
                }
            }
        }
    }
}

/// Overlay per-cell brightness on a dark map: seed everything unblocked to
/// fully dark, accumulate falloff from every nearby emitter, then apply the
/// outdoor floor and the ambient-vision bonus.
pub(crate) fn apply_light<M: MapSource>(
    source: &M,
    map: MapId,
    vx: i32,
    vy: i32,
    vision: Vision,
    mask: &mut LosMask,
) {
    let mut darkness = source.darkness(map) as i32;
    if vision.see_in_dark {
        darkness -= DARK_VISION_BONUS;
    }
    // Bright enough that the whole pass can be skipped.
    if darkness < 1 {
        return;
    }
    // The map layer warns about misconfigured darkness; here just clamp.
    if darkness > MAX_DARKNESS as i32 {
        darkness = MAX_DARKNESS as i32;
    }

    let (w, h) = (mask.width(), mask.height());
    let (ccx, ccy) = mask.center();

    // Dark unless a light proves otherwise.
    for y in 0..h {
        for x in 0..w {
            if !mask.get(x, y).is_blocked() {
                mask.set(x, y, Cell::Shade(MAX_LIGHT_RADIUS as i8));
            }
        }
    }

    // Sweep the window plus a light-radius margin in every direction, so a
    // source just outside the window still lights its edge.
    for sy in -MAX_LIGHT_RADIUS..=(h - 1 + MAX_LIGHT_RADIUS) {
        for sx in -MAX_LIGHT_RADIUS..=(w - 1 + MAX_LIGHT_RADIUS) {
            let r = source.resolve(map, vx - ccx + sx, vy - ccy + sy);
            if r.out_of_bounds {
                continue;
            }
            let glow = source.light_emission(r.map, r.x, r.y) as i32;
            if glow == 0 {
                continue;
            }
            let radius = glow.abs();
            for ay in (sy - radius).max(0)..=(sy + radius).min(h - 1) {
                for ax in (sx - radius).max(0)..=(sx + radius).min(w - 1) {
                    // Opaque marks are never erased by light.
                    let Cell::Shade(v) = mask.get(ax, ay) else {
                        continue;
                    };
                    // Circular falloff: full at the source, gone at the
                    // radius. Negative glow darkens by the mirrored amount.
                    let d = isqrt((sx - ax).pow(2) + (sy - ay).pow(2));
                    let delta = if glow > 0 {
                        (glow - d).max(0)
                    } else {
                        (glow + d).min(0)
                    };
                    mask.set(ax, ay, Cell::Shade(shade(v as i32 - delta)));
                }
            }
        }
    }

    // Outdoors is never pitch black: standing still, the viewer keeps a dim
    // view of their own cell and its ring.
    if source.is_outdoor(map) && darkness > MAX_DARKNESS as i32 - 3 {
        clamp_shade(mask, ccx, ccy, (MAX_DARKNESS - 3) as i8);
        for dy in -1..=1 {
            for dx in -1..=1 {
                clamp_shade(mask, ccx + dx, ccy + dy, (MAX_DARKNESS - 2) as i8);
            }
        }
    }

    // Ambient vision: a small radius around the viewer brightens regardless
    // of lighting, shrinking as darkness rises.
    let reach = MAX_DARKNESS as i32 - darkness;
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            let (ax, ay) = (ccx + dx, ccy + dy);
            if !mask.in_bounds(ax, ay) {
                continue;
            }
            let Cell::Shade(v) = mask.get(ax, ay) else {
                continue;
            };
            let bonus = ((MAX_DARKNESS as i32 + 1) - darkness - dx.abs().max(dy.abs())).max(0);
            mask.set(ax, ay, Cell::Shade(shade(v as i32 - bonus)));
        }
    }
}

/// Lower a shade cell to `limit` if it is darker; blocked cells keep their
/// mark.
fn clamp_shade(mask: &mut LosMask, x: i32, y: i32, limit: i8) {
    if !mask.in_bounds(x, y) {
        return;
    }
    if let Cell::Shade(v) = mask.get(x, y) {
        if v > limit {
            mask.set(x, y, Cell::Shade(limit));
        }
    }
}

#[inline]
fn shade(v: i32) -> i8 {
    v.clamp(i8::MIN as i32, i8::MAX as i32) as i8
}

/// Integer square root by Newton iteration; inputs are window-sized squares.
pub(crate) fn isqrt(v: i32) -> i32 {
    if v < 2 {
        return v.max(0);
    }
    let mut x = v;
    let mut y = (x + 1) / 2;
    while y < x {
        x = y;
        y = (x + v / x) / 2;
    }
    x
}
