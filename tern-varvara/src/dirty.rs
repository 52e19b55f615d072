/// Screen-space rectangle, with exclusive upper bounds
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    /// Left edge
    pub x1: u16,
    /// Top edge
    pub y1: u16,
    /// Right edge (exclusive)
    pub x2: u16,
    /// Bottom edge (exclusive)
    pub y2: u16,
}

impl Rect {
    /// Checks whether the rectangle covers no pixels
    pub fn is_empty(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }

    fn union(&self, other: &Rect) -> Rect {
        Rect {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }
}

/// Accumulated region of the screen which needs to be redrawn
#[derive(Debug, Default)]
pub struct Dirty {
    rect: Rect,
}

impl Dirty {
    /// Marks a region as changed
    ///
    /// Coordinates are in `u16` space, so a region which wrapped around the
    /// left or top edge arrives with its start past its end; such a start is
    /// treated as 0.  Regions which begin off the right or bottom edge are
    /// ignored, and the end is clamped to the screen.
    pub fn change(
        &mut self,
        mut x1: u16,
        mut y1: u16,
        mut x2: u16,
        mut y2: u16,
        width: u16,
        height: u16,
    ) {
        if x1 >= width && x2 > x1 {
            return;
        }
        if y1 >= height && y2 > y1 {
            return;
        }
        if x1 > x2 {
            x1 = 0;
        }
        if y1 > y2 {
            y1 = 0;
        }
        x2 = x2.min(width);
        y2 = y2.min(height);
        let r = Rect { x1, y1, x2, y2 };
        if r.is_empty() {
            return;
        }
        self.rect = if self.rect.is_empty() {
            r
        } else {
            self.rect.union(&r)
        };
    }

    /// Returns the pending rectangle and clears it
    pub fn take(&mut self) -> Option<Rect> {
        let r = std::mem::take(&mut self.rect);
        (!r.is_empty()).then_some(r)
    }

    /// Checks whether nothing has changed since the last [`take`](Self::take)
    pub fn is_empty(&self) -> bool {
        self.rect.is_empty()
    }

    /// Peeks at the pending rectangle
    pub fn rect(&self) -> Rect {
        self.rect
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn union_of_changes() {
        let mut d = Dirty::default();
        assert!(d.is_empty());
        d.change(10, 10, 20, 20, 64, 64);
        d.change(5, 30, 6, 31, 64, 64);
        assert_eq!(
            d.take(),
            Some(Rect {
                x1: 5,
                y1: 10,
                x2: 20,
                y2: 31
            })
        );
        assert!(d.is_empty());
        assert_eq!(d.take(), None);
    }

    #[test]
    fn clamped_to_screen() {
        let mut d = Dirty::default();
        d.change(60, 60, 100, 100, 64, 64);
        assert_eq!(
            d.rect(),
            Rect {
                x1: 60,
                y1: 60,
                x2: 64,
                y2: 64
            }
        );
    }

    #[test]
    fn offscreen_start_is_ignored() {
        let mut d = Dirty::default();
        d.change(70, 0, 78, 8, 64, 64);
        d.change(0, 64, 8, 72, 64, 64);
        assert!(d.is_empty());
    }

    #[test]
    fn wrapped_start_becomes_zero() {
        let mut d = Dirty::default();
        // A sprite at x = -4 wraps to 0xfffc, ending at 4
        d.change(0xfffc, 2, 4, 10, 64, 64);
        assert_eq!(
            d.rect(),
            Rect {
                x1: 0,
                y1: 2,
                x2: 4,
                y2: 10
            }
        );
    }

    #[test]
    fn degenerate_is_ignored() {
        let mut d = Dirty::default();
        d.change(8, 8, 8, 16, 64, 64);
        assert!(d.is_empty());
        // Starting at an origin other than zero still works
        d.change(30, 30, 31, 31, 64, 64);
        assert_eq!(d.rect().x1, 30);
    }
}
