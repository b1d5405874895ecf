//! Part bounding boxes
//!
//! Derives one axis-aligned box per detected part from a label buffer.

use crate::ml::{BodyPart, PartSegmentation, NUM_PARTS, UNLABELED};

/// Axis-aligned box in pixel coordinates.
///
/// Edges are inclusive pixel positions. `width()` and `height()` are the edge
/// differences, so a single labeled pixel gives a box of width 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    top: u32,
    right: u32,
    bottom: u32,
    left: u32,
}

impl BoundingBox {
    /// Box covering exactly one pixel
    pub fn at(x: u32, y: u32) -> Self {
        Self {
            top: y,
            right: x,
            bottom: y,
            left: x,
        }
    }

    /// Box from explicit edges; `None` if the edges are inverted
    pub fn from_edges(top: u32, right: u32, bottom: u32, left: u32) -> Option<Self> {
        if right < left || bottom < top {
            return None;
        }
        Some(Self {
            top,
            right,
            bottom,
            left,
        })
    }

    /// Grow the box to cover pixel (x, y)
    pub fn include(&mut self, x: u32, y: u32) {
        self.top = self.top.min(y);
        self.bottom = self.bottom.max(y);
        self.left = self.left.min(x);
        self.right = self.right.max(x);
    }

    /// Smallest box covering both
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
            left: self.left.min(other.left),
        }
    }

    pub fn top(&self) -> u32 {
        self.top
    }

    pub fn right(&self) -> u32 {
        self.right
    }

    pub fn bottom(&self) -> u32 {
        self.bottom
    }

    pub fn left(&self) -> u32 {
        self.left
    }

    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    /// Whether both dimensions are non-zero
    pub fn has_area(&self) -> bool {
        self.width() > 0 && self.height() > 0
    }

    /// Whether pixel (x, y) lies within the edges
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }
}

/// Bounding boxes keyed by part. Parts not seen in the frame have no entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartBoxes {
    boxes: [Option<BoundingBox>; NUM_PARTS],
}

impl PartBoxes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, part: BodyPart) -> Option<&BoundingBox> {
        self.boxes[part.index()].as_ref()
    }

    pub fn get_index(&self, index: usize) -> Option<&BoundingBox> {
        self.boxes.get(index).and_then(Option::as_ref)
    }

    pub fn insert(&mut self, part: BodyPart, bounding_box: BoundingBox) {
        self.boxes[part.index()] = Some(bounding_box);
    }

    /// Detected parts and their boxes, in part order
    pub fn iter(&self) -> impl Iterator<Item = (BodyPart, &BoundingBox)> {
        self.boxes
            .iter()
            .zip(BodyPart::ALL)
            .filter_map(|(entry, part)| entry.as_ref().map(|b| (part, b)))
    }

    /// Number of detected parts
    pub fn len(&self) -> usize {
        self.boxes.iter().filter(|b| b.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.iter().all(Option::is_none)
    }
}

/// Compute the minimal box around every part present in `segmentation`.
///
/// Single pass over the buffer in row-major order.
pub fn part_bounding_boxes(segmentation: &PartSegmentation) -> PartBoxes {
    let mut boxes = PartBoxes::new();
    let width = segmentation.width() as usize;
    if width == 0 {
        return boxes;
    }

    for (i, &label) in segmentation.data().iter().enumerate() {
        if label == UNLABELED {
            continue;
        }

        let x = (i % width) as u32;
        let y = (i / width) as u32;

        let slot = &mut boxes.boxes[label as usize];
        if let Some(bounding_box) = slot {
            bounding_box.include(x, y);
        } else {
            *slot = Some(BoundingBox::at(x, y));
        }
    }

    boxes
}
