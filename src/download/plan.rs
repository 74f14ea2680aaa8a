//! Chunk planning: splitting a resource into disjoint byte ranges.

use std::fmt;

/// An inclusive byte range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    #[must_use]
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Number of bytes covered, always at least one.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Value for the `Range` request header.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// How one resource will be transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkPlan {
    /// One whole-file transfer; `total` is the length if known.
    Sequential { total: Option<u64> },
    /// At least two disjoint ranges jointly covering `[0, total - 1]`.
    Chunked(Vec<ByteRange>),
}

impl ChunkPlan {
    /// Number of transfers the plan dispatches.
    #[must_use]
    pub fn part_count(&self) -> usize {
        match self {
            Self::Sequential { .. } => 1,
            Self::Chunked(ranges) => ranges.len(),
        }
    }

    #[must_use]
    pub fn is_chunked(&self) -> bool {
        matches!(self, Self::Chunked(_))
    }
}

/// Plans the parts of a download of `total` bytes.
///
/// Falls back to [`ChunkPlan::Sequential`] when the length is unknown or
/// zero, below `min_size_for_chunking`, or when `threads <= 1`. Otherwise
/// `parts = max(2, min(threads, total / min_part_size))`, every part but the
/// last spans `ceil(total / parts)` bytes, and empty trailing ranges are
/// dropped.
///
/// ```
/// use chunkfetch_core::download::{ByteRange, ChunkPlan, plan_chunks};
///
/// let plan = plan_chunks(Some(10), 4, 0, 3);
/// assert_eq!(
///     plan,
///     ChunkPlan::Chunked(vec![
///         ByteRange::new(0, 4),
///         ByteRange::new(5, 9),
///     ])
/// );
/// ```
#[must_use]
pub fn plan_chunks(
    total: Option<u64>,
    threads: usize,
    min_size_for_chunking: u64,
    min_part_size: u64,
) -> ChunkPlan {
    let Some(total) = total.filter(|t| *t > 0) else {
        return ChunkPlan::Sequential { total };
    };
    if total < min_size_for_chunking || threads <= 1 {
        return ChunkPlan::Sequential { total: Some(total) };
    }

    let threads = u64::try_from(threads).unwrap_or(u64::MAX);
    let by_size = total / min_part_size.max(1);
    let parts = threads.min(by_size).max(2);
    let part_size = total.div_ceil(parts);

    let last = total - 1;
    let ranges: Vec<ByteRange> = (0..parts)
        .map(|i| i * part_size)
        .take_while(|start| *start <= last)
        .map(|start| ByteRange::new(start, last.min(start + part_size - 1)))
        .collect();

    if ranges.len() < 2 {
        return ChunkPlan::Sequential { total: Some(total) };
    }
    ChunkPlan::Chunked(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(ranges: &[ByteRange], total: u64) {
        assert!(ranges.len() >= 2, "chunked plan needs two ranges");
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges[ranges.len() - 1].end, total - 1);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start, "gap or overlap in {ranges:?}");
        }
        assert_eq!(ranges.iter().map(ByteRange::len).sum::<u64>(), total);
    }

    #[test]
    fn test_unknown_or_empty_length_is_sequential() {
        assert_eq!(
            plan_chunks(None, 4, 0, 1),
            ChunkPlan::Sequential { total: None }
        );
        assert!(!plan_chunks(Some(0), 4, 0, 1).is_chunked());
    }

    #[test]
    fn test_below_threshold_is_sequential() {
        let plan = plan_chunks(Some(1023), 4, 1024, 1);
        assert_eq!(plan, ChunkPlan::Sequential { total: Some(1023) });
    }

    #[test]
    fn test_single_thread_is_sequential() {
        assert!(!plan_chunks(Some(100 << 20), 1, 0, 1).is_chunked());
        assert!(!plan_chunks(Some(100 << 20), 0, 0, 1).is_chunked());
    }

    #[test]
    fn test_part_count_limited_by_min_part_size() {
        // 10 MiB with 4 MiB minimum parts: floor(10/4) = 2 parts.
        let plan = plan_chunks(Some(10 << 20), 8, 0, 4 << 20);
        assert_eq!(plan.part_count(), 2);
    }

    #[test]
    fn test_at_least_two_parts_when_chunking() {
        // Smaller than one min part, still split in two.
        let plan = plan_chunks(Some(1000), 4, 0, 1 << 20);
        let ChunkPlan::Chunked(ranges) = plan else {
            panic!("expected chunked plan");
        };
        assert_eq!(ranges, vec![ByteRange::new(0, 499), ByteRange::new(500, 999)]);
    }

    #[test]
    fn test_one_byte_resource_never_chunks() {
        assert!(!plan_chunks(Some(1), 4, 0, 1).is_chunked());
    }

    #[test]
    fn test_trailing_empty_ranges_are_dropped() {
        // ceil(10 / 4) = 3 -> [0-2] [3-5] [6-8] [9-9]
        let plan = plan_chunks(Some(10), 4, 0, 1);
        let ChunkPlan::Chunked(ranges) = plan else {
            panic!("expected chunked plan");
        };
        assert_eq!(ranges.last(), Some(&ByteRange::new(9, 9)));
        assert_partition(&ranges, 10);

        // ceil(5 / 4) = 2 -> [0-1] [2-3] [4-4], fourth range would start past the end
        let plan = plan_chunks(Some(5), 4, 0, 1);
        assert_eq!(plan.part_count(), 3);
    }

    #[test]
    fn test_ranges_partition_the_resource() {
        let mins = [1_u64, 7, 256 * 1024, 2 << 20];
        for total in [2_u64, 3, 17, 1000, 4097, 8 << 20, (8 << 20) + 13, 1 << 33] {
            for threads in 2..=16 {
                for min_part in mins {
                    match plan_chunks(Some(total), threads, 0, min_part) {
                        ChunkPlan::Chunked(ranges) => {
                            assert!(ranges.len() <= threads.max(2));
                            assert_partition(&ranges, total);
                        }
                        ChunkPlan::Sequential { .. } => {
                            panic!("total={total} threads={threads} min={min_part} not chunked");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_range_header_value() {
        assert_eq!(ByteRange::new(0, 99).header_value(), "bytes=0-99");
        assert_eq!(ByteRange::new(5, 5).len(), 1);
    }
}
