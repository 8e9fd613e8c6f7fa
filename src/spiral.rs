//! The square spiral that plot candidates are enumerated in.
//!
//! Plot centres live on a lattice with a pitch of twice the plot spacing. The
//! walk only ever looks at the previous position, so a search can be resumed
//! from any remembered centre without keeping history around.

use vek::*;

/// Returns the lattice position that follows `pos` on the counter-clockwise
/// square spiral around the origin. `spacing` is the plot spacing, the
/// lattice pitch is `2 * spacing`.
///
/// Exactly one axis moves, by exactly one pitch.
pub fn next_grid_pos(pos: Vec2<i32>, spacing: i32) -> Vec2<i32> {
    let step = spacing * 2;
    let Vec2 { x, y } = pos;

    if x < y {
        if -x < y {
            Vec2::new(x + step, y)
        } else {
            Vec2::new(x, y + step)
        }
    } else if x > y {
        if -x >= y {
            Vec2::new(x - step, y)
        } else {
            Vec2::new(x, y - step)
        }
    } else if x <= 0 {
        Vec2::new(x, y + step)
    } else {
        Vec2::new(x, y - step)
    }
}

/// An endless iterator over the spiral, starting at (and yielding first) an
/// arbitrary position.
#[derive(Copy, Clone, Debug)]
pub struct GridSpiral {
    next: Vec2<i32>,
    spacing: i32,
}

impl GridSpiral {
    pub fn new(start: Vec2<i32>, spacing: i32) -> Self {
        Self {
            next: start,
            spacing,
        }
    }
}

impl Iterator for GridSpiral {
    type Item = Vec2<i32>;

    fn next(&mut self) -> Option<Self::Item> {
        let pos = self.next;
        self.next = next_grid_pos(pos, self.spacing);
        Some(pos)
    }
}
