//! Aspect-fit projection for the output quad.

use serde::{Deserialize, Serialize};

/// How a frame is fitted into the output surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleType {
    /// Fill the output, ignoring aspect ratio.
    Stretch,

    /// Fit inside the output, letterboxing the short axis.
    #[default]
    ScaleFit,

    /// Fill the output, cropping the long axis.
    CropFit,
}

/// Column-major 4x4 identity.
pub const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Projection mapping the unit quad onto `output` for a `texture`-sized frame.
///
/// The Y axis is flipped so top-left-origin frames appear upright.
pub fn aspect_fit_projection(
    scale_type: ScaleType,
    output: (u32, u32),
    texture: (u32, u32),
) -> [f32; 16] {
    let mut m = IDENTITY;
    m[0] = 1.0;
    m[5] = -1.0;

    let (out_w, out_h) = output;
    let (tex_w, tex_h) = texture;
    if scale_type == ScaleType::Stretch || out_w == 0 || out_h == 0 || tex_w == 0 || tex_h == 0 {
        return m;
    }

    let scale = (out_w as f32 / out_h as f32) / (tex_w as f32 / tex_h as f32);
    let shrink_y = match scale_type {
        ScaleType::ScaleFit => scale < 1.0,
        ScaleType::CropFit => scale > 1.0,
        ScaleType::Stretch => return m,
    };

    if shrink_y {
        m[5] *= scale;
    } else {
        m[0] /= scale;
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_scale_fit_tall_frame_in_square_output() {
        let m = aspect_fit_projection(ScaleType::ScaleFit, (100, 100), (50, 200));
        assert!(approx(m[0], 0.25));
        assert!(approx(m[5], -1.0));
    }

    #[test]
    fn test_scale_fit_wide_frame_in_square_output() {
        let m = aspect_fit_projection(ScaleType::ScaleFit, (100, 100), (200, 50));
        assert!(approx(m[0], 1.0));
        assert!(approx(m[5], -0.25));
    }

    #[test]
    fn test_crop_fit_inverts_axis_choice() {
        let m = aspect_fit_projection(ScaleType::CropFit, (100, 100), (50, 200));
        assert!(approx(m[0], 1.0));
        assert!(approx(m[5], -4.0));

        let m = aspect_fit_projection(ScaleType::CropFit, (100, 100), (200, 50));
        assert!(approx(m[0], 4.0));
        assert!(approx(m[5], -1.0));
    }

    #[test]
    fn test_stretch_and_degenerate_sizes_only_flip() {
        let expected = {
            let mut m = IDENTITY;
            m[5] = -1.0;
            m
        };
        assert_eq!(
            aspect_fit_projection(ScaleType::Stretch, (100, 50), (10, 90)),
            expected
        );
        assert_eq!(
            aspect_fit_projection(ScaleType::ScaleFit, (0, 50), (10, 90)),
            expected
        );
        assert_eq!(
            aspect_fit_projection(ScaleType::CropFit, (100, 50), (10, 0)),
            expected
        );
    }

    #[test]
    fn test_matching_aspect_is_unscaled() {
        let m = aspect_fit_projection(ScaleType::ScaleFit, (1920, 1080), (1280, 720));
        assert!(approx(m[0], 1.0));
        assert!(approx(m[5], -1.0));
    }
}
