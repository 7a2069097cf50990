//! Comparison of two data types placed at some offset from one another.

use crate::compare_config::CONFIG;
use crate::datatype::{DataTypeRecursiveDescent, Ty};
use crate::type_lattice::{LatticeItem, TypeLatticeNode};

/// Strength of a [`DataTypeCompare2`], for scoring
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataTypeCompareLevel {
    NoMatch = 0,
    /// One type is a (possibly nested) component of the other
    Subset = 1,
    /// Distinct primitives that are related in the type lattice
    PrimitiveCommonAncestor = 2,
    Match = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataTypeCompareCode {
    NoMatch,
    Match,
    /// Left is found within right, at the offset
    LeftSubsetRight,
    /// Right is found within left, at the offset
    RightSubsetLeft,
    PrimitiveCommonAncestor,
}

impl DataTypeCompareCode {
    pub fn level(self) -> DataTypeCompareLevel {
        match self {
            DataTypeCompareCode::NoMatch => DataTypeCompareLevel::NoMatch,
            DataTypeCompareCode::LeftSubsetRight | DataTypeCompareCode::RightSubsetLeft => {
                DataTypeCompareLevel::Subset
            }
            DataTypeCompareCode::PrimitiveCommonAncestor => {
                DataTypeCompareLevel::PrimitiveCommonAncestor
            }
            DataTypeCompareCode::Match => DataTypeCompareLevel::Match,
        }
    }

    pub fn flip(self) -> Self {
        match self {
            DataTypeCompareCode::LeftSubsetRight => DataTypeCompareCode::RightSubsetLeft,
            DataTypeCompareCode::RightSubsetLeft => DataTypeCompareCode::LeftSubsetRight,
            c => c,
        }
    }
}

/// The relationship between a left and a right type, where `right` starts `offset` bytes after
/// `left` (a negative offset means that `right` starts first).
#[derive(Clone, Debug)]
pub struct DataTypeCompare2<'a> {
    left: Ty<'a>,
    right: Ty<'a>,
    offset: i64,
    exact_match: bool,
    /// Where `right` was found within `left`
    left_descent: Option<DataTypeRecursiveDescent<'a>>,
    /// Where `left` was found within `right`
    right_descent: Option<DataTypeRecursiveDescent<'a>>,
    primitive_comparison: Option<DataTypePrimitiveCompare2<'a>>,
    compare_code: DataTypeCompareCode,
}

impl<'a> DataTypeCompare2<'a> {
    /// Compare using the globally configured notion of type equality
    pub fn new(left: Ty<'a>, right: Ty<'a>, offset: i64) -> Self {
        Self::with_exact_match(left, right, offset, CONFIG.exact_match)
    }

    pub fn with_exact_match(left: Ty<'a>, right: Ty<'a>, offset: i64, exact_match: bool) -> Self {
        let primitive_comparison = if left.is_primitive() && right.is_primitive() && offset == 0 {
            Some(DataTypePrimitiveCompare2::new(left.clone(), right.clone()))
        } else {
            None
        };
        let mut res = Self {
            left,
            right,
            offset,
            exact_match,
            left_descent: None,
            right_descent: None,
            primitive_comparison,
            compare_code: DataTypeCompareCode::NoMatch,
        };
        res.compare_code = res.compute_compare_code();
        res
    }

    fn compute_compare_code(&mut self) -> DataTypeCompareCode {
        if self.types_match() {
            return DataTypeCompareCode::Match;
        }

        if let Some(p) = &self.primitive_comparison {
            if p.share_common_ancestor() {
                return DataTypeCompareCode::PrimitiveCommonAncestor;
            }
            return DataTypeCompareCode::NoMatch;
        }

        if self.offset >= 0 && !self.right_bigger_left() && self.left.is_complex() {
            self.left_descent = DataTypeRecursiveDescent::descend_find_type_at_offset_recursive(
                &self.left,
                self.offset as usize,
                Some(&self.right),
                self.exact_match,
            );
            if self.left_descent.is_some() {
                return DataTypeCompareCode::RightSubsetLeft;
            }
        }

        if self.offset <= 0 && !self.left_bigger_right() && self.right.is_complex() {
            self.right_descent = DataTypeRecursiveDescent::descend_find_type_at_offset_recursive(
                &self.right,
                self.offset.unsigned_abs() as usize,
                Some(&self.left),
                self.exact_match,
            );
            if self.right_descent.is_some() {
                return DataTypeCompareCode::LeftSubsetRight;
            }
        }

        DataTypeCompareCode::NoMatch
    }

    fn types_match(&self) -> bool {
        self.offset == 0 && self.left.matches(&self.right, self.exact_match)
    }

    pub fn left(&self) -> &Ty<'a> {
        &self.left
    }

    pub fn right(&self) -> &Ty<'a> {
        &self.right
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn exact_match(&self) -> bool {
        self.exact_match
    }

    pub fn compare_code(&self) -> DataTypeCompareCode {
        self.compare_code
    }

    pub fn compare_level(&self) -> DataTypeCompareLevel {
        self.compare_code.level()
    }

    pub fn left_descent(&self) -> Option<&DataTypeRecursiveDescent<'a>> {
        self.left_descent.as_ref()
    }

    pub fn right_descent(&self) -> Option<&DataTypeRecursiveDescent<'a>> {
        self.right_descent.as_ref()
    }

    pub fn primitive_comparison(&self) -> Option<&DataTypePrimitiveCompare2<'a>> {
        self.primitive_comparison.as_ref()
    }

    pub fn top_level_match(&self) -> bool {
        self.compare_code == DataTypeCompareCode::Match
    }

    pub fn left_subset_right(&self) -> bool {
        self.compare_code == DataTypeCompareCode::LeftSubsetRight
    }

    pub fn right_subset_left(&self) -> bool {
        self.compare_code == DataTypeCompareCode::RightSubsetLeft
    }

    pub fn primitive_common_ancestor(&self) -> bool {
        self.compare_code == DataTypeCompareCode::PrimitiveCommonAncestor
    }

    /// A match, or one type found within the other. Lattice kinship alone does not count.
    pub fn any_match(&self) -> bool {
        self.top_level_match() || self.left_subset_right() || self.right_subset_left()
    }

    pub fn no_match(&self) -> bool {
        !self.any_match()
    }

    pub fn same_metatype(&self) -> bool {
        self.left.metatype() == self.right.metatype()
    }

    pub fn start_aligned(&self) -> bool {
        self.offset == 0
    }

    pub fn right_before_left(&self) -> bool {
        self.offset < 0
    }

    pub fn left_before_right(&self) -> bool {
        self.offset > 0
    }

    /// `right.size - left.size`
    pub fn size_diff(&self) -> i64 {
        self.right.size() as i64 - self.left.size() as i64
    }

    pub fn same_size(&self) -> bool {
        self.size_diff() == 0
    }

    pub fn left_bigger_right(&self) -> bool {
        self.size_diff() < 0
    }

    pub fn right_bigger_left(&self) -> bool {
        self.size_diff() > 0
    }

    pub fn bytes_overlapped(&self) -> usize {
        if self.no_match() {
            0
        } else {
            self.left.size().min(self.right.size())
        }
    }

    /// The same comparison, seen from the other side
    pub fn flip(&self) -> Self {
        Self::with_exact_match(
            self.right.clone(),
            self.left.clone(),
            -self.offset,
            self.exact_match,
        )
    }
}

impl<'a> std::fmt::Display for DataTypeCompare2<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<DataTypeCompare2 left={} right={} offset={} compare_code={:?}>",
            self.left, self.right, self.offset, self.compare_code
        )
    }
}

/// Strength of a [`DataTypePrimitiveCompare2`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataTypePrimitiveCompareLevel {
    NoMatch = 0,
    /// Related through a common ancestor, but neither descends from the other
    CommonAncestor = 1,
    /// One is a more precise form of the other
    Descent = 2,
    Match = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataTypePrimitiveCompareCode {
    NoMatch,
    /// Same lattice node
    Match,
    /// Left is a more precise form of right
    LeftDescendantRight,
    /// Right is a more precise form of left
    RightDescendantLeft,
    CommonAncestor,
}

impl DataTypePrimitiveCompareCode {
    pub fn level(self) -> DataTypePrimitiveCompareLevel {
        match self {
            DataTypePrimitiveCompareCode::NoMatch => DataTypePrimitiveCompareLevel::NoMatch,
            DataTypePrimitiveCompareCode::LeftDescendantRight
            | DataTypePrimitiveCompareCode::RightDescendantLeft => {
                DataTypePrimitiveCompareLevel::Descent
            }
            DataTypePrimitiveCompareCode::CommonAncestor => {
                DataTypePrimitiveCompareLevel::CommonAncestor
            }
            DataTypePrimitiveCompareCode::Match => DataTypePrimitiveCompareLevel::Match,
        }
    }
}

/// How two primitive types relate in the type lattice
#[derive(Clone, Debug)]
pub struct DataTypePrimitiveCompare2<'a> {
    left: Ty<'a>,
    right: Ty<'a>,
    left_node: Option<TypeLatticeNode>,
    right_node: Option<TypeLatticeNode>,
    /// Paths from the nearest common ancestor down to the left and right nodes
    paths: Option<(Vec<TypeLatticeNode>, Vec<TypeLatticeNode>)>,
    compare_code: DataTypePrimitiveCompareCode,
}

impl<'a> DataTypePrimitiveCompare2<'a> {
    pub fn new(left: Ty<'a>, right: Ty<'a>) -> Self {
        assert!(left.is_primitive() && right.is_primitive());
        let left_node = TypeLatticeNode::from_datatype(&left);
        let right_node = TypeLatticeNode::from_datatype(&right);
        let paths = match (&left_node, &right_node) {
            (Some(l), Some(r)) => l.common_ancestor_paths(r),
            _ => None,
        };
        let mut res = Self {
            left,
            right,
            left_node,
            right_node,
            paths,
            compare_code: DataTypePrimitiveCompareCode::NoMatch,
        };
        res.compare_code = if res.paths.is_none() {
            DataTypePrimitiveCompareCode::NoMatch
        } else if res.left_node == res.right_node {
            DataTypePrimitiveCompareCode::Match
        } else if res.left_descendant_right() {
            DataTypePrimitiveCompareCode::LeftDescendantRight
        } else if res.right_descendant_left() {
            DataTypePrimitiveCompareCode::RightDescendantLeft
        } else {
            DataTypePrimitiveCompareCode::CommonAncestor
        };
        res
    }

    pub fn left(&self) -> &Ty<'a> {
        &self.left
    }

    pub fn right(&self) -> &Ty<'a> {
        &self.right
    }

    pub fn left_node(&self) -> Option<&TypeLatticeNode> {
        self.left_node.as_ref()
    }

    pub fn right_node(&self) -> Option<&TypeLatticeNode> {
        self.right_node.as_ref()
    }

    pub fn paths(&self) -> Option<&(Vec<TypeLatticeNode>, Vec<TypeLatticeNode>)> {
        self.paths.as_ref()
    }

    pub fn share_common_ancestor(&self) -> bool {
        self.paths.is_some()
    }

    pub fn left_descendant_right(&self) -> bool {
        matches!(&self.paths, Some((l, r)) if r.len() == 1 && l.len() > 1)
    }

    pub fn right_descendant_left(&self) -> bool {
        matches!(&self.paths, Some((l, r)) if l.len() == 1 && r.len() > 1)
    }

    pub fn compare_code(&self) -> DataTypePrimitiveCompareCode {
        self.compare_code
    }

    pub fn compare_level(&self) -> DataTypePrimitiveCompareLevel {
        self.compare_code.level()
    }
}

impl<'a> std::fmt::Display for DataTypePrimitiveCompare2<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<DataTypePrimitiveCompare2 left={} right={} compare_code={:?}>",
            self.left, self.right, self.compare_code
        )
    }
}
