//! Deterministic list splitting used by the bisecting search

/// Split `list` into exactly `chunk_amount` contiguous chunks
///
/// Every chunk gets `len / chunk_amount` elements in original order and the
/// remainder is appended to the last chunk, so concatenating the chunks gives
/// back `list`. A single-element list cannot be split and comes back as one
/// chunk. A `chunk_amount` of zero is treated as one.
///
/// ```
/// use can_search_core::split_into_chunks;
///
/// let chunks = split_into_chunks(&[1, 2, 3, 4, 5], 2);
/// assert_eq!(chunks, vec![vec![1, 2], vec![3, 4, 5]]);
/// ```
pub fn split_into_chunks<T: Clone>(list: &[T], chunk_amount: usize) -> Vec<Vec<T>> {
    if list.len() == 1 {
        return vec![list.to_vec()];
    }

    let chunk_amount = chunk_amount.max(1);
    let chunk_size = list.len() / chunk_amount;

    let split_at = chunk_size * chunk_amount;

    // With fewer elements than chunks every chunk starts empty
    let mut chunks: Vec<Vec<T>> = if chunk_size == 0 {
        vec![Vec::new(); chunk_amount]
    } else {
        list[..split_at].chunks(chunk_size).map(<[T]>::to_vec).collect()
    };

    if let Some(last) = chunks.last_mut() {
        last.extend_from_slice(&list[split_at..]);
    }

    log::trace!(
        "Split {} element(s) into {} chunk(s) of {} (+{} remainder)",
        list.len(),
        chunk_amount,
        chunk_size,
        list.len() - split_at
    );

    debug_assert_eq!(chunks.len(), chunk_amount);
    debug_assert_eq!(chunks.iter().map(Vec::len).sum::<usize>(), list.len());
    chunks
}

/// Number of chunks a search round actually uses for `len` frames
///
/// `max(2, min(chunk_amount, ceil(len / chunk_amount)))`: at least two chunks,
/// and never more than there are frames to spread over them usefully.
pub fn effective_chunk_amount(len: usize, chunk_amount: usize) -> usize {
    let chunk_amount = chunk_amount.max(1);
    chunk_amount.min(len.div_ceil(chunk_amount)).max(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remainder_goes_to_last_chunk() {
        assert_eq!(
            split_into_chunks(&[1, 2, 3, 4, 5], 2),
            vec![vec![1, 2], vec![3, 4, 5]]
        );
        assert_eq!(
            split_into_chunks(&[1, 2, 3, 4, 5, 6, 7], 3),
            vec![vec![1, 2], vec![3, 4], vec![5, 6, 7]]
        );
    }

    #[test]
    fn test_partition_invariant() {
        let list: Vec<u32> = (0..23).collect();
        for k in 1..=30 {
            let chunks = split_into_chunks(&list, k);
            assert_eq!(chunks.len(), k, "chunk count for k={}", k);
            let flat: Vec<u32> = chunks.into_iter().flatten().collect();
            assert_eq!(flat, list, "concatenation for k={}", k);
        }
    }

    #[test]
    fn test_single_element_not_split() {
        assert_eq!(split_into_chunks(&["a"], 4), vec![vec!["a"]]);
    }

    #[test]
    fn test_more_chunks_than_elements() {
        assert_eq!(
            split_into_chunks(&[1, 2], 3),
            vec![vec![], vec![], vec![1, 2]]
        );
    }

    #[test]
    fn test_empty_list() {
        let empty: [u8; 0] = [];
        assert_eq!(split_into_chunks(&empty, 2), vec![Vec::<u8>::new(), Vec::new()]);
    }

    #[test]
    fn test_effective_chunk_amount() {
        assert_eq!(effective_chunk_amount(8, 2), 2);
        assert_eq!(effective_chunk_amount(2, 3), 2); // ceil(2/3) = 1
        assert_eq!(effective_chunk_amount(9, 3), 3);
        assert_eq!(effective_chunk_amount(10, 4), 3); // ceil(10/4) = 3
        assert_eq!(effective_chunk_amount(100, 5), 5);
        assert_eq!(effective_chunk_amount(1, 0), 2);
    }
}
