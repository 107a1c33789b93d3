use std::ops::Range;

/// Index range of `rank`'s share when `len` items are split into `rank_count`
/// contiguous chunks. The first `len % rank_count` chunks hold one extra item.
/// `rank_count` below 1 is treated as 1; a `rank` past the end gets an empty range.
pub fn partition_range(len: usize, rank_count: usize, rank: usize) -> Range<usize> {
    let rank_count = rank_count.max(1);
    if rank >= rank_count {
        return len..len;
    }
    let base = len / rank_count;
    let extra = len % rank_count;
    let start = rank * base + rank.min(extra);
    let size = base + usize::from(rank < extra);
    start..start + size
}

/// Splits `items` into `rank_count` contiguous, near-equal slices in rank order.
pub fn partition<T>(items: &[T], rank_count: usize) -> Vec<&[T]> {
    let rank_count = rank_count.max(1);
    (0..rank_count)
        .map(|rank| &items[partition_range(items.len(), rank_count, rank)])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_items_go_to_leading_ranks() {
        let items = (0..10).collect::<Vec<_>>();
        let parts = partition(&items, 3);
        assert_eq!(parts, vec![&[0, 1, 2, 3][..], &[4, 5, 6][..], &[7, 8, 9][..]]);
    }

    #[test]
    fn more_ranks_than_items() {
        let parts = partition(&["a", "b"], 4);
        assert_eq!(parts.iter().map(|part| part.len()).collect::<Vec<_>>(), vec![1, 1, 0, 0]);
    }

    #[test]
    fn empty_input() {
        let items: [u8; 0] = [];
        let parts = partition(&items, 5);
        assert_eq!(parts.len(), 5);
        assert!(parts.iter().all(|part| part.is_empty()));
    }

    #[test]
    fn zero_ranks_is_one() {
        assert_eq!(partition(&[1, 2, 3], 0), vec![&[1, 2, 3][..]]);
        assert_eq!(partition_range(7, 2, 9), 7..7);
    }
}
