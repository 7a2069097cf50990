//! Sweep-line co-iteration over two sequences sorted by a common key.

use itertools::{EitherOrBoth, Itertools};

/// One event of an [`ordered_merge`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Merged<L, R> {
    /// The left item's key is strictly smaller than the next right key
    Left(L),
    /// The right item's key is strictly smaller than the next left key
    Right(R),
    /// Both sides have an item with the same key; both are consumed together
    Conflict(L, R),
}

impl<L, R> Merged<L, R> {
    pub fn left(&self) -> Option<&L> {
        match self {
            Merged::Left(l) | Merged::Conflict(l, _) => Some(l),
            Merged::Right(_) => None,
        }
    }

    pub fn right(&self) -> Option<&R> {
        match self {
            Merged::Right(r) | Merged::Conflict(_, r) => Some(r),
            Merged::Left(_) => None,
        }
    }
}

/// Merge two sequences, each already sorted by its key, into one ordered sequence of events.
///
/// Each input must be non-decreasing by key; a repeated key on one side pairs at most once with
/// the other side, with the remaining duplicates reported on their own.
pub fn ordered_merge<L, R, K: Ord>(
    left: impl IntoIterator<Item = L>,
    right: impl IntoIterator<Item = R>,
    left_key: impl Fn(&L) -> K,
    right_key: impl Fn(&R) -> K,
) -> impl Iterator<Item = Merged<L, R>> {
    left.into_iter()
        .merge_join_by(right, move |l, r| left_key(l).cmp(&right_key(r)))
        .map(|e| match e {
            EitherOrBoth::Left(l) => Merged::Left(l),
            EitherOrBoth::Right(r) => Merged::Right(r),
            EitherOrBoth::Both(l, r) => Merged::Conflict(l, r),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaves_by_key() {
        let merged: Vec<_> = ordered_merge(vec![1, 3, 5, 6], vec![2, 3, 6, 9], |x| *x, |x| *x).collect();
        assert_eq!(
            merged,
            vec![
                Merged::Left(1),
                Merged::Right(2),
                Merged::Conflict(3, 3),
                Merged::Left(5),
                Merged::Conflict(6, 6),
                Merged::Right(9),
            ]
        );
    }

    #[test]
    fn keys_may_differ_from_items() {
        let left = vec![("a", 0x10), ("b", 0x20)];
        let right = vec![(0x20u64, 'x')];
        let merged: Vec<_> = ordered_merge(left, right, |l| l.1 as u64, |r| r.0).collect();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].left(), Some(&("a", 0x10)));
        assert!(merged[0].right().is_none());
        assert_eq!(merged[1], Merged::Conflict(("b", 0x20), (0x20, 'x')));
    }

    #[test]
    fn empty_sides() {
        let merged: Vec<Merged<i32, i32>> =
            ordered_merge(vec![], vec![4, 5], |x| *x, |x| *x).collect();
        assert_eq!(merged, vec![Merged::Right(4), Merged::Right(5)]);
        assert_eq!(
            ordered_merge(Vec::<i32>::new(), Vec::<i32>::new(), |x| *x, |x| *x).count(),
            0
        );
    }
}
