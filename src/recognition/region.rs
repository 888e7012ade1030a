//! Slot rectangles derived proportionally from the frame resolution

use super::error::{RecognitionError, RecognitionResult};
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Total number of slots evaluated per scan.
pub const SLOT_COUNT: usize = 5;
/// Number of primary (hand) slots; they occupy indices `0..PRIMARY_SLOT_COUNT`.
pub const PRIMARY_SLOT_COUNT: usize = 4;
/// Index of the smaller preview slot.
pub const PREVIEW_SLOT: usize = 4;

/// Returns true for the four primary slots.
pub fn is_primary_slot(slot: usize) -> bool {
    slot < PRIMARY_SLOT_COUNT
}

/// A slot rectangle expressed as fractions of the frame width and height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl SlotRegion {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Check if the fractions describe a non-empty rectangle that starts inside the frame
    pub fn is_valid(&self) -> bool {
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        finite
            && (0.0..1.0).contains(&self.x)
            && (0.0..1.0).contains(&self.y)
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Scale to pixel coordinates for a frame and clamp to its bounds.
    ///
    /// Returns `(x, y, width, height)`; width or height may be zero when the
    /// region falls entirely outside the frame.
    pub fn to_pixels(&self, frame_width: u32, frame_height: u32) -> (u32, u32, u32, u32) {
        let fw = frame_width as f32;
        let fh = frame_height as f32;

        let x = (self.x * fw).round().max(0.0) as u32;
        let y = (self.y * fh).round().max(0.0) as u32;
        let w = (self.width * fw).round().max(0.0) as u32;
        let h = (self.height * fh).round().max(0.0) as u32;

        let x = x.min(frame_width);
        let y = y.min(frame_height);
        let w = w.min(frame_width - x);
        let h = h.min(frame_height - y);
        (x, y, w, h)
    }
}

/// The five slot rectangles of the hand: four primary slots left to right,
/// then the preview slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotLayout {
    pub slots: [SlotRegion; SLOT_COUNT],
}

impl Default for SlotLayout {
    fn default() -> Self {
        Self {
            slots: [
                SlotRegion::new(0.225, 0.835, 0.170, 0.135),
                SlotRegion::new(0.410, 0.835, 0.170, 0.135),
                SlotRegion::new(0.595, 0.835, 0.170, 0.135),
                SlotRegion::new(0.780, 0.835, 0.170, 0.135),
                SlotRegion::new(0.040, 0.895, 0.095, 0.080),
            ],
        }
    }
}

impl SlotLayout {
    pub fn region(&self, slot: usize) -> RecognitionResult<&SlotRegion> {
        self.slots.get(slot).ok_or(RecognitionError::InvalidSlot {
            slot,
            max: SLOT_COUNT,
        })
    }

    /// Pixel rectangle for a slot in a frame of the given size.
    pub fn rect(
        &self,
        slot: usize,
        frame_width: u32,
        frame_height: u32,
    ) -> RecognitionResult<(u32, u32, u32, u32)> {
        let (x, y, w, h) = self.region(slot)?.to_pixels(frame_width, frame_height);
        if w == 0 || h == 0 {
            return Err(RecognitionError::OutOfBounds {
                slot,
                frame_width,
                frame_height,
            });
        }
        Ok((x, y, w, h))
    }

    /// Crop a slot out of a frame
    pub fn crop(&self, frame: &RgbImage, slot: usize) -> RecognitionResult<RgbImage> {
        let (x, y, w, h) = self.rect(slot, frame.width(), frame.height())?;
        Ok(image::imageops::crop_imm(frame, x, y, w, h).to_image())
    }

    /// Crop every slot, keeping per-slot failures separate so one bad region
    /// never hides the others.
    pub fn crop_all(&self, frame: &RgbImage) -> Vec<(usize, RecognitionResult<RgbImage>)> {
        (0..SLOT_COUNT)
            .map(|slot| (slot, self.crop(frame, slot)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_scales_with_resolution() {
        let layout = SlotLayout::default();
        let small = layout.rect(0, 1000, 1000).unwrap();
        let large = layout.rect(0, 2000, 2000).unwrap();

        assert_eq!(small, (225, 835, 170, 135));
        assert_eq!(large, (450, 1670, 340, 270));
    }

    #[test]
    fn test_rect_clamps_to_frame() {
        let mut layout = SlotLayout::default();
        layout.slots[1] = SlotRegion::new(0.9, 0.9, 0.5, 0.5);

        let (x, y, w, h) = layout.rect(1, 100, 200).unwrap();
        assert_eq!((x, y), (90, 180));
        assert_eq!(w, 10);
        assert_eq!(h, 20);
    }

    #[test]
    fn test_zero_area_region_is_out_of_bounds() {
        let mut layout = SlotLayout::default();
        layout.slots[2] = SlotRegion::new(0.999, 0.5, 0.0001, 0.1);

        let err = layout.rect(2, 100, 100).unwrap_err();
        assert!(matches!(err, RecognitionError::OutOfBounds { slot: 2, .. }));
    }

    #[test]
    fn test_invalid_slot_index() {
        let layout = SlotLayout::default();
        let err = layout.rect(SLOT_COUNT, 100, 100).unwrap_err();
        assert!(matches!(err, RecognitionError::InvalidSlot { slot: 5, .. }));
    }

    #[test]
    fn test_crop_all_isolates_failures() {
        let mut layout = SlotLayout::default();
        layout.slots[3] = SlotRegion::new(0.9999, 0.9999, 0.00001, 0.00001);
        let frame = RgbImage::new(400, 300);

        let crops = layout.crop_all(&frame);
        assert_eq!(crops.len(), SLOT_COUNT);
        assert!(crops[3].1.is_err());
        assert!(crops.iter().filter(|(_, c)| c.is_ok()).count() == 4);
        let crop0 = crops[0].1.as_ref().unwrap();
        assert_eq!(crop0.width(), 68);
    }

    #[test]
    fn test_default_layout_is_valid() {
        assert!(SlotLayout::default().slots.iter().all(|r| r.is_valid()));
        assert!(!SlotRegion::new(1.2, 0.0, 0.1, 0.1).is_valid());
        assert!(!SlotRegion::new(0.1, 0.1, 0.0, 0.1).is_valid());
    }
}
