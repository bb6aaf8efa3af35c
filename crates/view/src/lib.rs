use std::fmt;

use model::{Rect, RectF};

/// Axis-aligned layer-to-screen mapping: `screen = layer * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenSpaceTransform {
    scale_x: f32,
    scale_y: f32,
    offset_x: f32,
    offset_y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewTransformError {
    InvalidZoom,
    InvalidViewport,
    NonFiniteValue,
    NonInvertible,
}

impl fmt::Display for ViewTransformError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewTransformError::InvalidZoom => write!(formatter, "zoom must be finite and positive"),
            ViewTransformError::InvalidViewport => {
                write!(formatter, "viewport must be finite and non-empty")
            }
            ViewTransformError::NonFiniteValue => write!(formatter, "transform value is not finite"),
            ViewTransformError::NonInvertible => write!(formatter, "transform is not invertible"),
        }
    }
}

impl std::error::Error for ViewTransformError {}

impl Default for ScreenSpaceTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl ScreenSpaceTransform {
    pub const fn identity() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }

    pub fn new(
        scale_x: f32,
        scale_y: f32,
        offset_x: f32,
        offset_y: f32,
    ) -> Result<Self, ViewTransformError> {
        for value in [scale_x, scale_y, offset_x, offset_y] {
            if !value.is_finite() {
                return Err(ViewTransformError::NonFiniteValue);
            }
        }
        Ok(Self {
            scale_x,
            scale_y,
            offset_x,
            offset_y,
        })
    }

    pub fn from_scale(scale: f32) -> Result<Self, ViewTransformError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ViewTransformError::InvalidZoom);
        }
        Self::new(scale, scale, 0.0, 0.0)
    }

    pub fn scale_x(&self) -> f32 {
        self.scale_x
    }

    pub fn scale_y(&self) -> f32 {
        self.scale_y
    }

    pub fn offset_x(&self) -> f32 {
        self.offset_x
    }

    pub fn offset_y(&self) -> f32 {
        self.offset_y
    }

    /// Largest absolute scale along either axis.
    pub fn max_scale_component(&self) -> f32 {
        self.scale_x.abs().max(self.scale_y.abs())
    }

    /// Transform that applies `self` first and `next` afterwards.
    pub fn then(&self, next: &ScreenSpaceTransform) -> Result<Self, ViewTransformError> {
        let scale_x = checked_mul(self.scale_x, next.scale_x)?;
        let scale_y = checked_mul(self.scale_y, next.scale_y)?;
        let offset_x = checked_add(checked_mul(self.offset_x, next.scale_x)?, next.offset_x)?;
        let offset_y = checked_add(checked_mul(self.offset_y, next.scale_y)?, next.offset_y)?;
        Self::new(scale_x, scale_y, offset_x, offset_y)
    }

    pub fn inverse(&self) -> Result<Self, ViewTransformError> {
        if self.scale_x.abs() <= f32::EPSILON || self.scale_y.abs() <= f32::EPSILON {
            return Err(ViewTransformError::NonInvertible);
        }
        Self::new(
            1.0 / self.scale_x,
            1.0 / self.scale_y,
            -self.offset_x / self.scale_x,
            -self.offset_y / self.scale_y,
        )
    }

    pub fn map_rect(&self, rect: RectF) -> RectF {
        let x0 = rect.x * self.scale_x + self.offset_x;
        let x1 = rect.right() * self.scale_x + self.offset_x;
        let y0 = rect.y * self.scale_y + self.offset_y;
        let y1 = rect.bottom() * self.scale_y + self.offset_y;
        RectF::new(x0.min(x1), y0.min(y1), (x1 - x0).abs(), (y1 - y0).abs())
    }

    /// Maps a screen rect back into layer space and returns the enclosing
    /// integer rect.
    pub fn project_to_layer(&self, screen_rect: Rect) -> Result<Rect, ViewTransformError> {
        let inverse = self.inverse()?;
        let mapped = inverse.map_rect(screen_rect.to_rect_f());
        if !mapped.x.is_finite()
            || !mapped.y.is_finite()
            || !mapped.width.is_finite()
            || !mapped.height.is_finite()
        {
            return Err(ViewTransformError::NonFiniteValue);
        }
        Ok(mapped.to_enclosing_rect())
    }
}

/// Page scale plus scroll offset driven by pinch gestures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageScaleController {
    page_scale: f32,
    min_page_scale: f32,
    max_page_scale: f32,
    scroll_x: f32,
    scroll_y: f32,
    pinching: bool,
}

impl Default for PageScaleController {
    fn default() -> Self {
        Self {
            page_scale: 1.0,
            min_page_scale: 1.0,
            max_page_scale: 4.0,
            scroll_x: 0.0,
            scroll_y: 0.0,
            pinching: false,
        }
    }
}

impl PageScaleController {
    pub fn new(min_page_scale: f32, max_page_scale: f32) -> Result<Self, ViewTransformError> {
        if !min_page_scale.is_finite()
            || !max_page_scale.is_finite()
            || min_page_scale <= 0.0
            || max_page_scale < min_page_scale
        {
            return Err(ViewTransformError::InvalidZoom);
        }
        Ok(Self {
            page_scale: min_page_scale,
            min_page_scale,
            max_page_scale,
            ..Self::default()
        })
    }

    pub fn page_scale(&self) -> f32 {
        self.page_scale
    }

    pub fn min_page_scale(&self) -> f32 {
        self.min_page_scale
    }

    pub fn max_page_scale(&self) -> f32 {
        self.max_page_scale
    }

    pub fn is_pinching(&self) -> bool {
        self.pinching
    }

    pub fn set_page_scale(&mut self, page_scale: f32) -> Result<(), ViewTransformError> {
        if !page_scale.is_finite() || page_scale <= 0.0 {
            return Err(ViewTransformError::InvalidZoom);
        }
        self.page_scale = page_scale.clamp(self.min_page_scale, self.max_page_scale);
        Ok(())
    }

    pub fn pinch_begin(&mut self) {
        self.pinching = true;
    }

    pub fn pinch_end(&mut self) {
        self.pinching = false;
    }

    /// Multiplies the page scale by `zoom_factor` (clamped to the limits)
    /// keeping the screen point under the anchor fixed.
    pub fn pinch_update(
        &mut self,
        zoom_factor: f32,
        anchor_x: f32,
        anchor_y: f32,
    ) -> Result<(), ViewTransformError> {
        if !zoom_factor.is_finite() || zoom_factor <= 0.0 {
            return Err(ViewTransformError::InvalidZoom);
        }
        if !anchor_x.is_finite() || !anchor_y.is_finite() {
            return Err(ViewTransformError::NonFiniteValue);
        }

        let next_scale = checked_mul(self.page_scale, zoom_factor)?
            .clamp(self.min_page_scale, self.max_page_scale);
        let applied_factor = next_scale / self.page_scale;

        let keep_anchor_scale = checked_add(1.0, -applied_factor)?;
        let scaled_x = checked_mul(self.scroll_x, applied_factor)?;
        let scaled_y = checked_mul(self.scroll_y, applied_factor)?;
        self.scroll_x = checked_add(scaled_x, checked_mul(anchor_x, keep_anchor_scale)?)?;
        self.scroll_y = checked_add(scaled_y, checked_mul(anchor_y, keep_anchor_scale)?)?;
        self.page_scale = next_scale;
        Ok(())
    }

    pub fn scroll_by(&mut self, delta_x: f32, delta_y: f32) -> Result<(), ViewTransformError> {
        self.scroll_x = checked_add(self.scroll_x, delta_x)?;
        self.scroll_y = checked_add(self.scroll_y, delta_y)?;
        Ok(())
    }

    pub fn to_transform(&self) -> ScreenSpaceTransform {
        ScreenSpaceTransform {
            scale_x: self.page_scale,
            scale_y: self.page_scale,
            offset_x: self.scroll_x,
            offset_y: self.scroll_y,
        }
    }
}

fn checked_add(current: f32, delta: f32) -> Result<f32, ViewTransformError> {
    if !delta.is_finite() {
        return Err(ViewTransformError::NonFiniteValue);
    }
    let next = current + delta;
    if !next.is_finite() {
        return Err(ViewTransformError::NonFiniteValue);
    }
    Ok(next)
}

fn checked_mul(left: f32, right: f32) -> Result<f32, ViewTransformError> {
    if !left.is_finite() || !right.is_finite() {
        return Err(ViewTransformError::NonFiniteValue);
    }
    let next = left * right;
    if !next.is_finite() {
        return Err(ViewTransformError::NonFiniteValue);
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinch_update_keeps_anchor_screen_position() {
        let mut controller = PageScaleController::new(0.5, 8.0).expect("limits");
        controller.scroll_by(20.0, -10.0).expect("scroll");
        controller.pinch_begin();

        controller.pinch_update(2.0, 100.0, 50.0).expect("pinch");

        assert!(controller.is_pinching());
        assert!((controller.page_scale() - 1.0).abs() < 1e-6);
        let transform = controller.to_transform();
        assert!((transform.offset_x() + 60.0).abs() < 1e-6);
        assert!((transform.offset_y() + 70.0).abs() < 1e-6);
    }

    #[test]
    fn pinch_update_clamps_to_max_page_scale() {
        let mut controller = PageScaleController::new(1.0, 2.0).expect("limits");
        controller.pinch_update(5.0, 0.0, 0.0).expect("pinch");
        assert_eq!(controller.page_scale(), 2.0);
        assert_eq!(
            controller.pinch_update(0.0, 0.0, 0.0),
            Err(ViewTransformError::InvalidZoom)
        );
        assert_eq!(
            controller.pinch_update(1.2, f32::NAN, 0.0),
            Err(ViewTransformError::NonFiniteValue)
        );
    }

    #[test]
    fn then_composes_scale_and_offset() {
        let layer = ScreenSpaceTransform::new(2.0, 2.0, 10.0, 0.0).expect("layer");
        let page = ScreenSpaceTransform::new(3.0, 3.0, -5.0, 4.0).expect("page");
        let combined = layer.then(&page).expect("compose");
        assert_eq!(combined.scale_x(), 6.0);
        assert_eq!(combined.offset_x(), 25.0);
        assert_eq!(combined.offset_y(), 4.0);
    }

    #[test]
    fn project_to_layer_inverts_screen_mapping() {
        let transform = ScreenSpaceTransform::new(2.0, 2.0, -100.0, 0.0).expect("transform");
        let layer_rect = transform
            .project_to_layer(Rect::new(0, 0, 200, 100))
            .expect("invertible");
        assert_eq!(layer_rect, Rect::new(50, 0, 100, 50));
    }

    #[test]
    fn zero_scale_is_not_invertible() {
        let transform = ScreenSpaceTransform::new(0.0, 1.0, 0.0, 0.0).expect("transform");
        assert_eq!(
            transform.inverse(),
            Err(ViewTransformError::NonInvertible)
        );
    }
}
