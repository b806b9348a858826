use crate::config::{Anchor, PlacementConfig};

/// Target rectangle for the subject on the output surface
///
/// `x`/`y` may be negative when the subject is wider than the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementRect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

/// Scale the subject to a fraction of the surface height, keep its aspect
/// ratio and anchor it with the configured margins
///
/// Returns `None` when either size is empty or the scaled subject rounds to
/// nothing.
pub fn compute_placement(
    surface: (u32, u32),
    subject: (u32, u32),
    config: &PlacementConfig,
) -> Option<PlacementRect> {
    let (surface_width, surface_height) = surface;
    let (subject_width, subject_height) = subject;
    if surface_width == 0 || surface_height == 0 || subject_width == 0 || subject_height == 0 {
        return None;
    }

    let height = (surface_height as f64 * config.scale as f64).round();
    let width = (height * subject_width as f64 / subject_height as f64).round();
    if height < 1.0 || width < 1.0 {
        return None;
    }
    let (width, height) = (width as i64, height as i64);

    let (sw, sh) = (surface_width as i64, surface_height as i64);
    let (mx, my) = (config.margin_x as i64, config.margin_y as i64);

    let (x, y) = match config.anchor {
        Anchor::TopLeft => (mx, my),
        Anchor::TopRight => (sw - width - mx, my),
        Anchor::BottomLeft => (mx, sh - height - my),
        Anchor::BottomRight => (sw - width - mx, sh - height - my),
        Anchor::Center => ((sw - width) / 2, (sh - height) / 2),
    };

    Some(PlacementRect {
        x,
        y,
        width: width as u32,
        height: height as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_anchor(anchor: Anchor) -> PlacementConfig {
        PlacementConfig {
            anchor,
            ..PlacementConfig::default()
        }
    }

    #[test]
    fn bottom_right_default() {
        let rect = compute_placement((960, 540), (300, 400), &PlacementConfig::default()).unwrap();
        assert_eq!(
            rect,
            PlacementRect {
                x: 778,
                y: 314,
                width: 162,
                height: 216
            }
        );
    }

    #[test]
    fn other_corners() {
        let surface = (960, 540);
        let subject = (300, 400);

        let rect = compute_placement(surface, subject, &with_anchor(Anchor::TopLeft)).unwrap();
        assert_eq!((rect.x, rect.y), (20, 10));

        let rect = compute_placement(surface, subject, &with_anchor(Anchor::TopRight)).unwrap();
        assert_eq!((rect.x, rect.y), (778, 10));

        let rect = compute_placement(surface, subject, &with_anchor(Anchor::BottomLeft)).unwrap();
        assert_eq!((rect.x, rect.y), (20, 314));

        let rect = compute_placement(surface, subject, &with_anchor(Anchor::Center)).unwrap();
        assert_eq!((rect.x, rect.y), (399, 162));
    }

    #[test]
    fn wide_subject_can_overhang() {
        let config = PlacementConfig {
            scale: 1.0,
            ..PlacementConfig::default()
        };
        let rect = compute_placement((100, 100), (400, 100), &config).unwrap();
        assert_eq!(rect.width, 400);
        assert!(rect.x < 0);
    }

    #[test]
    fn empty_surface_has_no_placement() {
        let config = PlacementConfig::default();
        assert!(compute_placement((0, 540), (300, 400), &config).is_none());
        assert!(compute_placement((960, 0), (300, 400), &config).is_none());
        assert!(compute_placement((960, 540), (0, 400), &config).is_none());
    }

    #[test]
    fn tiny_scale_has_no_placement() {
        let config = PlacementConfig {
            scale: 0.001,
            ..PlacementConfig::default()
        };
        assert!(compute_placement((100, 100), (10, 10), &config).is_none());
    }
}
