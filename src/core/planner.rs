use crate::core::error::TransferError;
use crate::core::model::ByteRange;

/// Upper bound on the segment count. Each segment is a spawned task with its
/// own connection and store file.
pub const MAX_SEGMENTS: u64 = 1024;

/// Splits `[0, total_size - 1]` into `segments` contiguous ranges.
///
/// Every segment but the last spans `total_size / segments + 1` bytes and the
/// last one absorbs the rest. When that stride would starve the trailing
/// segments, a segment is cut short so each remaining one still gets a byte.
pub fn plan_ranges(total_size: u64, segments: u64) -> Result<Vec<ByteRange>, TransferError> {
    if segments == 0 || segments > total_size || segments > MAX_SEGMENTS {
        return Err(TransferError::InvalidSegmentCount { segments, total_size });
    }

    let base = total_size / segments;
    let mut ranges = Vec::with_capacity(segments as usize);
    let mut start = 0u64;

    for i in 0..segments {
        let end = if i + 1 == segments {
            total_size - 1
        } else {
            let after = segments - i - 1;
            // bytes left from `start` onwards, minus one per later segment
            let room = total_size - start - after;
            start + base.min(room - 1)
        };
        ranges.push(ByteRange::new(start, end));
        start = end + 1;
    }

    Ok(ranges)
}
