//! Perceptual hashing (dHash): greyscale, shrink to a `(n+1) x n` grid,
//! then one bit per pixel for "is this pixel darker than its right
//! neighbor." Images that look alike hash to values a small Hamming
//! distance apart; exact byte differences (re-encode, crop, recompress)
//! barely move it.

use image::DynamicImage;
use uuid::Uuid;

use crate::domain::Fingerprint;

/// 8x8 bits = 64, filling a `u64` exactly.
const DHASH_SIZE: u32 = 8;

pub fn compute(file_id: Uuid, img: &DynamicImage) -> Fingerprint {
    let small = img.grayscale().resize_exact(DHASH_SIZE + 1, DHASH_SIZE, image::imageops::FilterType::Triangle);
    let grey = small.into_luma8();

    let mut value: u64 = 0;
    for y in 0..DHASH_SIZE {
        for x in 0..DHASH_SIZE {
            let left = grey.get_pixel(x, y).0[0];
            let right = grey.get_pixel(x + 1, y).0[0];
            value = (value << 1) | u64::from(left > right);
        }
    }
    Fingerprint { file_id, value }
}

#[cfg(test)]
mod test {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn identical_images_hash_identically() {
        let mut img = RgbaImage::new(32, 32);
        for (x, y, px) in img.enumerate_pixels_mut() {
            let v = ((x + y) % 255) as u8;
            *px = Rgba([v, v, v, 255]);
        }
        let dyn_img = DynamicImage::ImageRgba8(img);
        let a = compute(Uuid::nil(), &dyn_img);
        let b = compute(Uuid::nil(), &dyn_img);
        assert_eq!(a.value, b.value);
    }

    #[test]
    fn solid_color_hashes_to_zero() {
        let img = RgbaImage::from_pixel(16, 16, Rgba([128, 128, 128, 255]));
        let fp = compute(Uuid::nil(), &DynamicImage::ImageRgba8(img));
        assert_eq!(fp.value, 0);
    }
}
