/// Split `strings` into contiguous chunks of at most `max_size` items.
///
/// Order is preserved and every input appears in exactly one chunk.
/// A `max_size` of zero is treated as one.
pub fn split<T: Clone>(strings: &[T], max_size: usize) -> Vec<Vec<T>> {
    strings
        .chunks(max_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("text {}", i)).collect()
    }

    #[test]
    fn test_split_97_by_40() {
        let strings = numbered(97);
        let chunks = split(&strings, 40);

        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![40, 40, 17]);
        assert_eq!(chunks.concat(), strings);
    }

    #[test]
    fn test_split_exact_multiple() {
        let chunks = split(&numbered(80), 40);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 40));
    }

    #[test]
    fn test_split_empty() {
        let chunks = split::<String>(&[], 40);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_split_size_one() {
        let strings = numbered(3);
        let chunks = split(&strings, 1);
        assert_eq!(chunks, vec![vec![strings[0].clone()], vec![strings[1].clone()], vec![strings[2].clone()]]);
    }

    #[test]
    fn test_split_zero_size_does_not_panic() {
        let chunks = split(&numbered(2), 0);
        assert_eq!(chunks.len(), 2);
    }
}
