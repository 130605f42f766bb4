use proptest::prelude::*;
use sightline_los::{BlockTable, Cell, LosMask, Vision, update_view};
use sightline_map::TileAtlas;

const TABLE: i32 = 25;
const VIEW: i32 = 11;

fn wall_offsets() -> impl Strategy<Value = Vec<(i32, i32)>> {
    prop::collection::vec((-5i32..=5, -5i32..=5), 0..30)
}

fn compute(atlas: &TileAtlas, m: sightline_map::MapId, x: i32, y: i32, vision: Vision) -> LosMask {
    let table = BlockTable::build(TABLE, TABLE).unwrap();
    let mut mask = LosMask::new(VIEW, VIEW);
    update_view(&table, atlas, m, x, y, vision, &mut mask);
    mask
}

proptest! {
    // Recomputing on an unchanged world always reproduces the same mask.
    #[test]
    fn recompute_is_stable(walls in wall_offsets(), darkness in 0u8..=5, glow in -4i8..=4) {
        let mut atlas = TileAtlas::new();
        let m = atlas.add_map(31, 31, darkness, false);
        let (x, y) = (15, 15);
        for (dx, dy) in walls {
            atlas.set_opaque(m, x + dx, y + dy, true);
        }
        atlas.set_glow(m, x + 3, y - 2, glow);
        let a = compute(&atlas, m, x, y, Vision::default());
        let b = compute(&atlas, m, x, y, Vision::default());
        prop_assert_eq!(a, b);
    }

    // However the map is built, a sighted viewer always sees their own cell.
    #[test]
    fn center_never_blocked(walls in wall_offsets(), darkness in 0u8..=5, xray in any::<bool>()) {
        let mut atlas = TileAtlas::new();
        let m = atlas.add_map(31, 31, darkness, false);
        let (x, y) = (15, 15);
        for (dx, dy) in walls {
            atlas.set_opaque(m, x + dx, y + dy, true);
        }
        let vision = Vision { xray, ..Vision::default() };
        let mask = compute(&atlas, m, x, y, vision);
        let (ccx, ccy) = mask.center();
        prop_assert_ne!(mask.get(ccx, ccy), Cell::Blocked);
    }

    // Blindness hides everything but the viewer's own cell, whatever else
    // is going on.
    #[test]
    fn blind_overrides_everything(walls in wall_offsets(), darkness in 0u8..=5) {
        let mut atlas = TileAtlas::new();
        let m = atlas.add_map(31, 31, darkness, true);
        let (x, y) = (15, 15);
        for (dx, dy) in walls {
            atlas.set_opaque(m, x + dx, y + dy, true);
        }
        let vision = Vision { blind: true, ..Vision::default() };
        let mask = compute(&atlas, m, x, y, vision);
        let (ccx, ccy) = mask.center();
        for cy in 0..VIEW {
            for cx in 0..VIEW {
                if (cx, cy) == (ccx, ccy) {
                    prop_assert_eq!(mask.get(cx, cy), Cell::Visible);
                } else {
                    prop_assert_eq!(mask.get(cx, cy), Cell::Blocked);
                }
            }
        }
    }

    // With a lone light at the viewer's feet, brightness never improves
    // with distance along a cardinal ray.
    #[test]
    fn falloff_is_monotone(glow in 1i8..=4, darkness in 1u8..=5) {
        let mut atlas = TileAtlas::new();
        let m = atlas.add_map(31, 31, darkness, false);
        let (x, y) = (15, 15);
        atlas.set_glow(m, x, y, glow);
        let mask = compute(&atlas, m, x, y, Vision::default());
        let (ccx, ccy) = mask.center();
        for step in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            for d in 0..ccx - 1 {
                let near = mask.get(ccx + step.0 * d, ccy + step.1 * d).wire_byte();
                let far = mask
                    .get(ccx + step.0 * (d + 1), ccy + step.1 * (d + 1))
                    .wire_byte();
                prop_assert!(far >= near, "step {:?} d {}: {} then {}", step, d, near, far);
            }
        }
    }
}
