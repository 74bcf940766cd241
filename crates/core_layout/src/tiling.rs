//! Master-stack tiling.
//!
//! Everything in here is pure: the same inputs always produce the same
//! geometry, and nothing is mutated.

use serde::{Deserialize, Serialize};

use crate::{Rect, WindowId, WindowInfo};

/// Lower bound for the master factor.
pub const MIN_MASTER_FACTOR: f64 = 0.1;
/// Upper bound for the master factor.
pub const MAX_MASTER_FACTOR: f64 = 0.9;
/// Master factor used when nothing else is configured.
pub const DEFAULT_MASTER_FACTOR: f64 = 0.55;

/// Which part of the layout a window was assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// The master column.
    Master,
    /// A row in the stack column, counted from the top.
    Stack(usize),
}

/// Computed geometry for one tiled window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilePlacement {
    /// The window identifier.
    pub window_id: WindowId,
    /// The target rectangle in screen coordinates.
    pub rect: Rect,
    /// Where in the layout the window sits.
    pub slot: Slot,
}

/// Clamp a master factor into `[MIN_MASTER_FACTOR, MAX_MASTER_FACTOR]`.
///
/// Non-finite values fall back to [`DEFAULT_MASTER_FACTOR`].
pub fn clamp_master_factor(factor: f64) -> f64 {
    if !factor.is_finite() {
        return DEFAULT_MASTER_FACTOR;
    }
    factor.clamp(MIN_MASTER_FACTOR, MAX_MASTER_FACTOR)
}

/// Compute the master-stack layout for a workspace.
///
/// The head of `order` is the master and gets a left column of
/// `area.width * master_factor`; the rest are stacked top to bottom in the
/// right column with equal heights. The last stack row absorbs the integer
/// remainder so the placements exactly cover `area`.
pub fn layout(order: &[WindowId], master_factor: f64, area: Rect) -> Vec<TilePlacement> {
    let Some((&master, stack)) = order.split_first() else {
        return Vec::new();
    };

    if stack.is_empty() {
        return vec![TilePlacement {
            window_id: master,
            rect: area,
            slot: Slot::Master,
        }];
    }

    let factor = clamp_master_factor(master_factor);
    let master_width = (f64::from(area.width) * factor).round() as i32;
    let stack_width = area.width - master_width;

    let mut placements = Vec::with_capacity(order.len());
    placements.push(TilePlacement {
        window_id: master,
        rect: Rect::new(area.x, area.y, master_width, area.height),
        slot: Slot::Master,
    });

    let rows = stack.len() as i32;
    let row_height = area.height / rows;
    let stack_x = area.x + master_width;
    let mut current_y = area.y;

    for (row, &window_id) in stack.iter().enumerate() {
        let height = if row == stack.len() - 1 {
            area.bottom() - current_y
        } else {
            row_height
        };

        placements.push(TilePlacement {
            window_id,
            rect: Rect::new(stack_x, current_y, stack_width, height),
            slot: Slot::Stack(row),
        });

        current_y += height;
    }

    placements
}

/// Decide whether a newly mapped window enters the tiling set.
///
/// Fixed-size windows and transients of another window float instead.
pub fn can_tile(window: &WindowInfo) -> bool {
    window.kind.is_tileable() && !window.fixed_size && window.transient_for.is_none()
}

/// The tiled window after `current` in `order`, wrapping around.
///
/// When `current` is `None` or not part of `order`, navigation starts at the
/// master.
pub fn next_tiled(order: &[WindowId], current: Option<WindowId>) -> Option<WindowId> {
    let position = current.and_then(|id| order.iter().position(|&w| w == id));
    match position {
        Some(pos) => order.get((pos + 1) % order.len()).copied(),
        None => order.first().copied(),
    }
}

/// The tiled window before `current` in `order`, wrapping around.
///
/// When `current` is `None` or not part of `order`, navigation starts at the
/// last stack window.
pub fn prev_tiled(order: &[WindowId], current: Option<WindowId>) -> Option<WindowId> {
    let position = current.and_then(|id| order.iter().position(|&w| w == id));
    match position {
        Some(pos) => order.get((pos + order.len() - 1) % order.len()).copied(),
        None => order.last().copied(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WindowKind;

    fn assert_exact_cover(placements: &[TilePlacement], area: Rect) {
        let covered: i64 = placements.iter().map(|p| p.rect.area()).sum();
        assert_eq!(covered, area.area(), "placements must cover the area");

        for (i, a) in placements.iter().enumerate() {
            assert!(a.rect.x >= area.x && a.rect.right() <= area.right());
            assert!(a.rect.y >= area.y && a.rect.bottom() <= area.bottom());
            for b in &placements[i + 1..] {
                assert!(
                    !a.rect.intersects(&b.rect),
                    "{:?} overlaps {:?}",
                    a.rect,
                    b.rect
                );
            }
        }
    }

    #[test]
    fn test_empty_order() {
        assert!(layout(&[], 0.5, Rect::new(0, 0, 1000, 800)).is_empty());
    }

    #[test]
    fn test_single_window_gets_full_area() {
        let area = Rect::new(10, 20, 1000, 800);
        for factor in [0.0, 0.1, 0.5, 0.9, 1.0, f64::NAN] {
            let placements = layout(&[42], factor, area);
            assert_eq!(placements.len(), 1);
            assert_eq!(placements[0].rect, area);
            assert_eq!(placements[0].slot, Slot::Master);
        }
    }

    #[test]
    fn test_three_windows_master_stack() {
        let placements = layout(&[3, 1, 2], 0.6, Rect::new(0, 0, 1000, 800));

        assert_eq!(placements[0].window_id, 3);
        assert_eq!(placements[0].rect, Rect::new(0, 0, 600, 800));
        assert_eq!(placements[1].window_id, 1);
        assert_eq!(placements[1].rect, Rect::new(600, 0, 400, 400));
        assert_eq!(placements[1].slot, Slot::Stack(0));
        assert_eq!(placements[2].window_id, 2);
        assert_eq!(placements[2].rect, Rect::new(600, 400, 400, 400));
        assert_eq!(placements[2].slot, Slot::Stack(1));
    }

    #[test]
    fn test_layout_covers_area_without_overlap() {
        let areas = [
            Rect::new(0, 0, 1000, 800),
            Rect::new(0, 32, 1920, 1048),
            Rect::new(-1280, 0, 1279, 1021),
        ];
        let factors = [0.1, 0.33, 0.5, 0.618, 0.9];

        for area in areas {
            for factor in factors {
                for n in 1..=7u64 {
                    let order: Vec<WindowId> = (1..=n).collect();
                    let placements = layout(&order, factor, area);
                    assert_eq!(placements.len(), order.len());
                    assert_exact_cover(&placements, area);
                }
            }
        }
    }

    #[test]
    fn test_master_factor_is_clamped() {
        let area = Rect::new(0, 0, 1000, 800);

        let tiny = layout(&[1, 2], 0.0, area);
        assert_eq!(tiny[0].rect.width, 100);

        let huge = layout(&[1, 2], 5.0, area);
        assert_eq!(huge[0].rect.width, 900);
        assert_eq!(huge[1].rect.width, 100);
    }

    #[test]
    fn test_clamp_master_factor() {
        assert_eq!(clamp_master_factor(0.5), 0.5);
        assert_eq!(clamp_master_factor(-1.0), MIN_MASTER_FACTOR);
        assert_eq!(clamp_master_factor(1.0), MAX_MASTER_FACTOR);
        assert_eq!(clamp_master_factor(f64::INFINITY), DEFAULT_MASTER_FACTOR);
    }

    #[test]
    fn test_layout_is_deterministic() {
        let area = Rect::new(0, 0, 1366, 768);
        let order = [5, 9, 2, 7];
        assert_eq!(layout(&order, 0.55, area), layout(&order, 0.55, area));
    }

    #[test]
    fn test_can_tile() {
        let normal = WindowInfo::new(1, WindowKind::Normal, 0);
        assert!(can_tile(&normal));

        let mut fixed = WindowInfo::new(2, WindowKind::Dialog, 0);
        fixed.fixed_size = true;
        assert!(!can_tile(&fixed));

        let mut transient = WindowInfo::new(3, WindowKind::ModalDialog, 0);
        transient.transient_for = Some(1);
        assert!(!can_tile(&transient));

        let menu = WindowInfo::new(4, WindowKind::PopupMenu, 0);
        assert!(!can_tile(&menu));
    }

    #[test]
    fn test_next_and_prev_wrap() {
        let order = [10, 20, 30];

        assert_eq!(next_tiled(&order, Some(10)), Some(20));
        assert_eq!(next_tiled(&order, Some(30)), Some(10));
        assert_eq!(prev_tiled(&order, Some(10)), Some(30));
        assert_eq!(prev_tiled(&order, Some(20)), Some(10));
    }

    #[test]
    fn test_navigation_from_outside_order() {
        let order = [10, 20, 30];

        assert_eq!(next_tiled(&order, None), Some(10));
        assert_eq!(next_tiled(&order, Some(99)), Some(10));
        assert_eq!(prev_tiled(&order, None), Some(30));
        assert_eq!(next_tiled(&[], Some(10)), None);
        assert_eq!(prev_tiled(&[], None), None);
    }

    #[test]
    fn test_navigation_single_window() {
        assert_eq!(next_tiled(&[7], Some(7)), Some(7));
        assert_eq!(prev_tiled(&[7], Some(7)), Some(7));
    }
}
