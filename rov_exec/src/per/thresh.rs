//! Colour-threshold terrain classification.
//!
//! Three independent per-pixel predicates over the warped frame, each
//! producing a binary mask. Thresholds are tunable constants, not learned:
//! the rover assumes consistent lighting and ground albedo, which is a
//! documented limitation rather than a defect.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::RgbImage;
use ndarray::{s, Array2};

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Identify navigable terrain pixels.
///
/// A pixel is navigable when all three channels are strictly above the
/// threshold. High-intensity ground pixels pass, shadowed rock walls do not.
pub fn nav_thresh(img: &RgbImage, rgb_thresh: [u8; 3]) -> Array2<u8> {
    let (width, height) = img.dimensions();
    let mut mask = Array2::zeros((height as usize, width as usize));

    for (x, y, px) in img.enumerate_pixels() {
        if px.0[0] > rgb_thresh[0] && px.0[1] > rgb_thresh[1] && px.0[2] > rgb_thresh[2] {
            mask[[y as usize, x as usize]] = 1;
        }
    }

    mask
}

/// Identify target-sample pixels.
///
/// Targets have a distinct golden colour signature: strong red and green,
/// very low blue. Note the blue comparison direction differs from
/// [`nav_thresh`].
pub fn target_thresh(img: &RgbImage, rgb_thresh: [u8; 3]) -> Array2<u8> {
    let (width, height) = img.dimensions();
    let mut mask = Array2::zeros((height as usize, width as usize));

    for (x, y, px) in img.enumerate_pixels() {
        if px.0[0] > rgb_thresh[0] && px.0[1] > rgb_thresh[1] && px.0[2] < rgb_thresh[2] {
            mask[[y as usize, x as usize]] = 1;
        }
    }

    mask
}

/// Identify obstacle pixels - anything inside the camera's field of view
/// which is not navigable terrain.
///
/// The field-of-view mask excludes the regions the warp introduced at the
/// image borders, which would otherwise be invented obstacles.
pub fn obstacle_thresh(nav_mask: &Array2<u8>, fov_mask: &Array2<u8>) -> Array2<u8> {
    let mut mask = Array2::zeros(nav_mask.raw_dim());

    for ((idx, &nav), &fov) in nav_mask.indexed_iter().zip(fov_mask.iter()) {
        mask[idx] = (1 - nav) * fov;
    }

    mask
}

/// Crop a mask to its near-field rows - the lower `fraction` of the image.
///
/// Pixels far from the rover are geometrically distorted by the flat-ground
/// assumption underlying the perspective warp, and are discarded for
/// navigable/obstacle classification. Retained pixels keep their
/// rover-centric coordinates because the bottom edge is preserved.
pub fn crop_near_field(mask: &Array2<u8>, fraction: f64) -> Array2<u8> {
    let rows = mask.nrows();
    let first_row = ((rows as f64) * (1.0 - fraction)) as usize;

    mask.slice(s![first_row..rows, ..]).to_owned()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use image::Rgb;

    const NAV_THRESH: [u8; 3] = [185, 170, 160];
    const TARGET_THRESH: [u8; 3] = [150, 130, 30];

    /// Build a 6x4 image: left half bright ground, right half dark rock,
    /// with one golden target pixel at (5, 3).
    fn test_img() -> RgbImage {
        RgbImage::from_fn(6, 4, |x, y| {
            if x == 5 && y == 3 {
                Rgb([200, 180, 10])
            } else if x < 3 {
                Rgb([210, 190, 170])
            } else {
                Rgb([90, 70, 50])
            }
        })
    }

    #[test]
    fn test_nav_thresh_selects_bright_ground() {
        let mask = nav_thresh(&test_img(), NAV_THRESH);

        assert_eq!(mask[[0, 0]], 1);
        assert_eq!(mask[[3, 2]], 1);
        assert_eq!(mask[[0, 4]], 0);
        // The golden pixel fails the blue threshold
        assert_eq!(mask[[3, 5]], 0);
    }

    #[test]
    fn test_nav_thresh_is_strict() {
        // A pixel exactly at the threshold does not pass
        let img = RgbImage::from_pixel(2, 2, Rgb(NAV_THRESH));
        let mask = nav_thresh(&img, NAV_THRESH);

        assert_eq!(mask.iter().filter(|&&v| v != 0).count(), 0);
    }

    #[test]
    fn test_target_thresh_selects_golden_pixels() {
        let mask = target_thresh(&test_img(), TARGET_THRESH);

        assert_eq!(mask.iter().filter(|&&v| v != 0).count(), 1);
        assert_eq!(mask[[3, 5]], 1);
    }

    #[test]
    fn test_obstacle_is_complement_inside_fov() {
        let img = test_img();
        let nav = nav_thresh(&img, NAV_THRESH);

        let fov = Array2::ones(nav.raw_dim());
        let obs = obstacle_thresh(&nav, &fov);

        // Masks partition the frame inside the fov
        for (o, n) in obs.iter().zip(nav.iter()) {
            assert_eq!(o + n, 1);
        }
    }

    #[test]
    fn test_obstacle_masked_outside_fov() {
        let img = test_img();
        let nav = nav_thresh(&img, NAV_THRESH);

        let fov = Array2::zeros(nav.raw_dim());
        let obs = obstacle_thresh(&nav, &fov);

        assert_eq!(obs.iter().filter(|&&v| v != 0).count(), 0);
    }

    #[test]
    fn test_crop_near_field_keeps_lower_rows() {
        let mut mask = Array2::<u8>::zeros((10, 4));
        mask[[9, 0]] = 1;
        mask[[0, 0]] = 1;

        let cropped = crop_near_field(&mask, 0.4);

        assert_eq!(cropped.nrows(), 4);
        // The bottom row survives, the top row is gone
        assert_eq!(cropped[[3, 0]], 1);
        assert_eq!(cropped.iter().filter(|&&v| v != 0).count(), 1);
    }
}
