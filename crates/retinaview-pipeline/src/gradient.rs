//! 3x3 Sobel gradient estimation.
//!
//! The vessel filter computes the gradient of the smoothed field as an
//! intermediate for diagnostics (edge energy of the input). The
//! vesselness score itself is derived from the Hessian, never from these
//! first derivatives.

use crate::types::ScalarField;

/// Horizontal and vertical Sobel responses of a field.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    /// d/dx estimate.
    pub gx: ScalarField,
    /// d/dy estimate.
    pub gy: ScalarField,
}

impl Gradient {
    /// Per-sample gradient magnitude `sqrt(gx^2 + gy^2)`.
    #[must_use]
    pub fn magnitude(&self) -> ScalarField {
        ScalarField::from_fn(self.gx.width(), self.gx.height(), |x, y| {
            self.gx.get(x, y).hypot(self.gy.get(x, y))
        })
    }
}

/// Sobel gradient with edge-clamped neighbor reads.
#[must_use = "returns the gradient fields"]
pub fn sobel(field: &ScalarField) -> Gradient {
    let at = |x: i64, y: i64| field.get_clamped(x, y);

    let gx = ScalarField::from_fn(field.width(), field.height(), |x, y| {
        let (x, y) = (i64::from(x), i64::from(y));
        (at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1))
            - (at(x - 1, y - 1) + 2.0 * at(x - 1, y) + at(x - 1, y + 1))
    });

    let gy = ScalarField::from_fn(field.width(), field.height(), |x, y| {
        let (x, y) = (i64::from(x), i64::from(y));
        (at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1))
            - (at(x - 1, y - 1) + 2.0 * at(x, y - 1) + at(x + 1, y - 1))
    });

    Gradient { gx, gy }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_field_has_zero_gradient() {
        let field = ScalarField::from_fn(6, 6, |_, _| 42.0);
        let g = sobel(&field);
        let magnitude = g.magnitude();
        assert!(magnitude.as_slice().iter().all(|v| v.abs() < f32::EPSILON));
    }

    #[test]
    fn horizontal_ramp_has_only_x_gradient() {
        let field = ScalarField::from_fn(6, 6, |x, _| x as f32 * 10.0);
        let g = sobel(&field);
        // Interior: (x+1) - (x-1) = 20 per row, weighted 1 + 2 + 1.
        assert!((g.gx.get(3, 3) - 80.0).abs() < 1e-4);
        assert!(g.gy.get(3, 3).abs() < 1e-4);
    }

    #[test]
    fn clamped_border_halves_edge_response() {
        let field = ScalarField::from_fn(6, 6, |x, _| x as f32 * 10.0);
        let g = sobel(&field);
        // At x = 0 the left neighbor replicates x = 0, so the difference is 10.
        assert!((g.gx.get(0, 3) - 40.0).abs() < 1e-4);
    }

    #[test]
    fn vertical_step_has_y_gradient() {
        let field = ScalarField::from_fn(5, 5, |_, y| if y < 2 { 0.0 } else { 100.0 });
        let g = sobel(&field);
        assert!(g.gy.get(2, 2) > 0.0);
        assert!(g.gx.get(2, 2).abs() < 1e-4);
        assert_eq!(g.magnitude().dimensions(), field.dimensions());
    }
}
