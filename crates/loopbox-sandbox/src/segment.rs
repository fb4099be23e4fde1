//! Bounds-clamping of caller-supplied image segments.
//!
//! Fuzzers hand the harness arbitrary (data, size, offset) triples. Rather
//! than rejecting out-of-range values, the validator narrows them until the
//! whole list fits inside one maximum-sized image: clamping is silent,
//! infallible, and mutates the caller's list in place. A narrowed request
//! still reproduces most crashes; a rejected one reproduces nothing.

/// Hard ceiling on the staged image, 129 MiB.
pub const MAX_IMAGE_SIZE: u64 = 129 << 20;

/// Hard ceiling on the number of segments per image.
pub const MAX_SEGMENTS: usize = 4096;

/// One scattered write into the staged image.
///
/// `data` is borrowed only for the duration of a single mount attempt.
/// `size` is the declared write length and may disagree with `data.len()`;
/// writes are additionally bounded by the actual buffer.
#[derive(Debug, Clone, Copy)]
pub struct ImageSegment<'a> {
    pub data: &'a [u8],
    pub size: u64,
    pub offset: u64,
}

/// Clamp a segment list and requested total size to the image bounds.
///
/// Returns the corrected total size. Afterwards every retained segment
/// satisfies `offset + size <= MAX_IMAGE_SIZE`, the list holds at most
/// [`MAX_SEGMENTS`] entries, and the total covers the furthest segment end.
///
/// Oversized offsets wrap modulo the image size; an offset at exactly the
/// boundary is shifted down so the segment still lands at the image tail.
pub fn clamp_segments(size: u64, segments: &mut Vec<ImageSegment<'_>>) -> u64 {
    segments.truncate(MAX_SEGMENTS);

    let mut total = size;
    for seg in segments.iter_mut() {
        if seg.size > MAX_IMAGE_SIZE {
            seg.size = MAX_IMAGE_SIZE;
        }
        if seg.offset > MAX_IMAGE_SIZE {
            seg.offset %= MAX_IMAGE_SIZE;
        }
        if seg.offset > MAX_IMAGE_SIZE - seg.size {
            seg.offset = MAX_IMAGE_SIZE - seg.size;
        }
        total = total.max(seg.offset + seg.size);
    }

    total.min(MAX_IMAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(offset: u64, size: u64) -> ImageSegment<'static> {
        ImageSegment {
            data: &[],
            size,
            offset,
        }
    }

    #[test]
    fn truncates_segment_count() {
        let mut segments: Vec<_> = (0..MAX_SEGMENTS + 10).map(|i| seg(i as u64, 1)).collect();
        clamp_segments(0, &mut segments);
        assert_eq!(segments.len(), MAX_SEGMENTS);
    }

    #[test]
    fn clamps_oversized_segment() {
        let mut segments = vec![seg(0, MAX_IMAGE_SIZE + 1)];
        let total = clamp_segments(0, &mut segments);
        assert_eq!(segments[0].size, MAX_IMAGE_SIZE);
        assert_eq!(segments[0].offset, 0);
        assert_eq!(total, MAX_IMAGE_SIZE);
    }

    #[test]
    fn wraps_oversized_offset() {
        let mut segments = vec![seg(MAX_IMAGE_SIZE + 7, 16)];
        clamp_segments(0, &mut segments);
        assert_eq!(segments[0].offset, 7);
    }

    #[test]
    fn boundary_offset_shifts_down() {
        // offset == MAX_IMAGE_SIZE with size 10 lands at the image tail.
        let mut segments = vec![seg(MAX_IMAGE_SIZE, 10)];
        clamp_segments(0, &mut segments);
        assert_eq!(segments[0].offset, MAX_IMAGE_SIZE - 10);
        assert_eq!(segments[0].size, 10);
    }

    #[test]
    fn total_grows_to_furthest_end() {
        let mut segments = vec![seg(0x1000, 0x200), seg(0x8000, 0x40), seg(0, 8)];
        let total = clamp_segments(0x100, &mut segments);
        assert_eq!(total, 0x8040);
    }

    #[test]
    fn total_keeps_caller_size_when_larger() {
        let mut segments = vec![seg(0, 0x10)];
        let total = clamp_segments(0x10_0000, &mut segments);
        assert_eq!(total, 0x10_0000);
    }

    #[test]
    fn total_clamped_to_image_maximum() {
        let mut segments = vec![];
        let total = clamp_segments(u64::MAX, &mut segments);
        assert_eq!(total, MAX_IMAGE_SIZE);
    }

    #[test]
    fn postconditions_hold_for_arbitrary_lists() {
        let cases = [
            (0u64, 0u64),
            (MAX_IMAGE_SIZE, 10),
            (MAX_IMAGE_SIZE * 3 + 5, MAX_IMAGE_SIZE),
            (u64::MAX, u64::MAX),
            (1, MAX_IMAGE_SIZE - 1),
        ];
        let mut segments: Vec<_> = cases.iter().map(|&(o, s)| seg(o, s)).collect();
        let total = clamp_segments(42, &mut segments);

        assert!(total <= MAX_IMAGE_SIZE);
        for seg in &segments {
            assert!(seg.size <= MAX_IMAGE_SIZE);
            assert!(seg.offset + seg.size <= MAX_IMAGE_SIZE);
        }
    }
}
