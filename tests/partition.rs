use refseq_sync::partition::{partition, partition_range};

#[test]
fn partitions_are_complete_disjoint_and_balanced() {
    for len in 0..40usize {
        let items = (0..len).collect::<Vec<_>>();
        for ranks in 1..12usize {
            let parts = partition(&items, ranks);
            assert_eq!(parts.len(), ranks);

            let joined = parts.concat();
            assert_eq!(joined, items, "len={len} ranks={ranks}");

            let sizes = parts.iter().map(|part| part.len()).collect::<Vec<_>>();
            let max = *sizes.iter().max().unwrap();
            let min = *sizes.iter().min().unwrap();
            assert!(max - min <= 1, "len={len} ranks={ranks} sizes={sizes:?}");
        }
    }
}

#[test]
fn range_matches_slice_for_every_rank() {
    let items = (0..23).collect::<Vec<_>>();
    let parts = partition(&items, 5);
    for (rank, part) in parts.iter().enumerate() {
        let range = partition_range(items.len(), 5, rank);
        assert_eq!(&items[range], *part);
    }
}
