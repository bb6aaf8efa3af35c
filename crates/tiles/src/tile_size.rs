use model::Size;

const TILE_SIZE_ROUNDING: i32 = 64;

/// Inputs that decide the tile size of a tiling from its content bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSizePolicy {
    pub default_tile_size: Size,
    pub max_untiled_layer_size: Size,
    pub max_texture_size: i32,
    pub is_mask: bool,
    /// Device viewport size when GPU rasterization is enabled.
    pub gpu_raster_viewport: Option<Size>,
}

impl TileSizePolicy {
    /// Masks are never tiled: one tile covers the whole mask, or no tile at
    /// all when the mask exceeds the texture limit.
    pub fn tile_size(&self, content_bounds: Size) -> Size {
        let max_texture = Size::new(self.max_texture_size, self.max_texture_size);
        if self.is_mask {
            if content_bounds.width > self.max_texture_size
                || content_bounds.height > self.max_texture_size
            {
                return Size::default();
            }
            return content_bounds;
        }

        let mut default_tile_size = match self.gpu_raster_viewport {
            Some(viewport) => Size::new(viewport.width, viewport.height / 4),
            None => self.default_tile_size,
        };
        default_tile_size.set_to_min(max_texture);

        let mut max_untiled = self.max_untiled_layer_size;
        max_untiled.set_to_min(max_texture);

        let any_dimension_too_large = content_bounds.width > max_untiled.width
            || content_bounds.height > max_untiled.height;
        let any_dimension_one_tile = content_bounds.width <= default_tile_size.width
            || content_bounds.height <= default_tile_size.height;

        // Long and skinny or small layers get a single row/column of tiles.
        if any_dimension_one_tile || !any_dimension_too_large {
            let width = max_untiled
                .width
                .max(default_tile_size.width)
                .min(content_bounds.width);
            let height = max_untiled
                .height
                .max(default_tile_size.height)
                .min(content_bounds.height);
            return Size::new(
                round_up(width, TILE_SIZE_ROUNDING),
                round_up(height, TILE_SIZE_ROUNDING),
            );
        }
        default_tile_size
    }
}

fn round_up(value: i32, multiple: i32) -> i32 {
    if value <= 0 {
        return 0;
    }
    (value + multiple - 1) / multiple * multiple
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> TileSizePolicy {
        TileSizePolicy {
            default_tile_size: Size::new(256, 256),
            max_untiled_layer_size: Size::new(512, 512),
            max_texture_size: 2048,
            is_mask: false,
            gpu_raster_viewport: None,
        }
    }

    #[test]
    fn small_layer_gets_single_tile_rounded_to_64() {
        assert_eq!(policy().tile_size(Size::new(100, 100)), Size::new(128, 128));
    }

    #[test]
    fn long_skinny_layer_tiles_at_max_untiled_width() {
        assert_eq!(policy().tile_size(Size::new(1000, 12)), Size::new(512, 64));
    }

    #[test]
    fn large_layer_uses_default_tile_size() {
        assert_eq!(policy().tile_size(Size::new(3000, 3000)), Size::new(256, 256));
    }

    #[test]
    fn non_mask_sizes_are_multiples_of_64() {
        let cases = [
            Size::new(1, 1),
            Size::new(65, 300),
            Size::new(511, 513),
            Size::new(200, 5000),
            Size::new(700, 256),
        ];
        for content_bounds in cases {
            let size = policy().tile_size(content_bounds);
            assert_eq!(size.width % 64, 0, "{content_bounds:?} -> {size:?}");
            assert_eq!(size.height % 64, 0, "{content_bounds:?} -> {size:?}");
        }
    }

    #[test]
    fn gpu_raster_uses_quarter_viewport_tiles() {
        let mut gpu = policy();
        gpu.gpu_raster_viewport = Some(Size::new(800, 1200));
        assert_eq!(gpu.tile_size(Size::new(4000, 4000)), Size::new(800, 300));
    }

    #[test]
    fn masks_are_untiled_or_empty() {
        let mut mask = policy();
        mask.is_mask = true;
        assert_eq!(mask.tile_size(Size::new(300, 700)), Size::new(300, 700));
        assert!(mask.tile_size(Size::new(4096, 10)).is_empty());
    }
}
