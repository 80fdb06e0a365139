//! Time slicing of large fetch ranges

use contracts::TimeRange;

/// Split `range` into consecutive slices no wider than `width`
///
/// Slices share their boundaries; the last one is clipped to `range.end`.
/// An empty range yields no slices, a non-positive width a single slice.
pub fn slices(range: TimeRange, width: chrono::Duration) -> Vec<TimeRange> {
    if range.is_empty() {
        return Vec::new();
    }
    if width <= chrono::Duration::zero() {
        return vec![range];
    }

    let mut out = Vec::new();
    let mut start = range.start;
    while start < range.end {
        let end = (start + width).min(range.end);
        out.push(TimeRange::new(start, end));
        start = end;
    }
    out
}
