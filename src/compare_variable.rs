//! Comparison of two varnodes within one address region, and the per-varnode record that collects
//! all such comparisons on behalf of a ground-truth varnode.

use crate::address::AddressRangeOverlap;
use crate::compare_config::CONFIG;
use crate::compare_datatype::DataTypeCompare2;
use crate::errors::{Error, Result};
use crate::lang::Varnode;

/// Strength of a varnode comparison, for scoring
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarnodeCompareLevel {
    NoMatch = 0,
    Overlap = 1,
    Subset = 2,
    Aligned = 3,
    Match = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VarnodeCompare2Code {
    NoOverlap,
    /// Common bytes, without any further relationship
    Overlap,
    /// Same start and size, but unrelated types
    Aligned,
    Match,
    /// The right type is a component of the left type
    LeftContainsRight,
    /// The left type is a component of the right type
    RightContainsLeft,
}

impl VarnodeCompare2Code {
    pub fn level(self) -> VarnodeCompareLevel {
        match self {
            VarnodeCompare2Code::NoOverlap => VarnodeCompareLevel::NoMatch,
            VarnodeCompare2Code::Overlap => VarnodeCompareLevel::Overlap,
            VarnodeCompare2Code::Aligned => VarnodeCompareLevel::Aligned,
            VarnodeCompare2Code::Match => VarnodeCompareLevel::Match,
            VarnodeCompare2Code::LeftContainsRight => VarnodeCompareLevel::Subset,
            // Scored as a plain overlap, unlike its mirror image
            VarnodeCompare2Code::RightContainsLeft => VarnodeCompareLevel::Overlap,
        }
    }
}

/// The result of comparing two varnodes of a common address region
#[derive(Clone, Debug)]
pub struct VarnodeCompare2<'a> {
    left: Varnode<'a>,
    right: Varnode<'a>,
    overlap: Option<AddressRangeOverlap>,
    /// `right - left`, in bytes; only when the two overlap
    offset: Option<i64>,
    datatype_comparison: Option<DataTypeCompare2<'a>>,
    compare_code: VarnodeCompare2Code,
}

impl<'a> VarnodeCompare2<'a> {
    pub fn new(left: Varnode<'a>, right: Varnode<'a>) -> Result<Self> {
        Self::with_exact_match(left, right, CONFIG.exact_match)
    }

    pub fn with_exact_match(left: Varnode<'a>, right: Varnode<'a>, exact_match: bool) -> Result<Self> {
        if left.region() != right.region() {
            return Err(Error::RegionMismatch {
                left: left.region(),
                right: right.region(),
            });
        }

        let overlap = match (left.addr_range(), right.addr_range()) {
            (Some(l), Some(r)) => Some(l.overlap(&r)?).filter(|o| o.does_overlap()),
            _ => None,
        };
        let offset = match overlap {
            Some(_) => Some(left.addr().distance(&right.addr())?),
            None => None,
        };

        let datatype_comparison = match (&overlap, offset) {
            (Some(o), Some(offset)) if !o.misaligned() => Some(DataTypeCompare2::with_exact_match(
                left.dtype.clone(),
                right.dtype.clone(),
                offset,
                exact_match,
            )),
            _ => None,
        };

        let mut res = Self {
            left,
            right,
            overlap,
            offset,
            datatype_comparison,
            compare_code: VarnodeCompare2Code::NoOverlap,
        };
        res.compare_code = res.compute_compare_code();
        Ok(res)
    }

    fn compute_compare_code(&self) -> VarnodeCompare2Code {
        if !self.does_overlap() {
            return VarnodeCompare2Code::NoOverlap;
        }
        if let Some(dt) = &self.datatype_comparison {
            if dt.top_level_match() {
                return VarnodeCompare2Code::Match;
            } else if dt.right_subset_left() {
                return VarnodeCompare2Code::LeftContainsRight;
            } else if dt.left_subset_right() {
                return VarnodeCompare2Code::RightContainsLeft;
            }
        }
        if self.is_aligned() {
            VarnodeCompare2Code::Aligned
        } else {
            VarnodeCompare2Code::Overlap
        }
    }

    pub fn left(&self) -> &Varnode<'a> {
        &self.left
    }

    pub fn right(&self) -> &Varnode<'a> {
        &self.right
    }

    pub fn overlap(&self) -> Option<&AddressRangeOverlap> {
        self.overlap.as_ref()
    }

    pub fn offset(&self) -> Option<i64> {
        self.offset
    }

    pub fn datatype_comparison(&self) -> Option<&DataTypeCompare2<'a>> {
        self.datatype_comparison.as_ref()
    }

    pub fn compare_code(&self) -> VarnodeCompare2Code {
        self.compare_code
    }

    pub fn compare_level(&self) -> VarnodeCompareLevel {
        self.compare_code.level()
    }

    pub fn does_overlap(&self) -> bool {
        self.overlap.is_some()
    }

    pub fn is_start_aligned(&self) -> bool {
        self.overlap.as_ref().map_or(false, |o| o.start_aligned())
    }

    pub fn is_same_size(&self) -> bool {
        self.size_diff() == 0
    }

    /// `right.size - left.size`
    pub fn size_diff(&self) -> i64 {
        self.right.size() as i64 - self.left.size() as i64
    }

    /// Same start and same size
    pub fn is_aligned(&self) -> bool {
        self.is_start_aligned() && self.is_same_size()
    }

    pub fn is_misaligned(&self) -> bool {
        self.overlap.as_ref().map_or(false, |o| o.misaligned())
    }

    pub fn bytes_overlapped(&self) -> u64 {
        self.overlap.as_ref().map_or(0, |o| o.bytes_overlapped())
    }
}

impl<'a> std::fmt::Display for VarnodeCompare2<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<VarnodeCompare2 left={} right={} compare_code={:?}>",
            self.left, self.right, self.compare_code
        )
    }
}

/// Every comparison that one (left, ground-truth) varnode took part in
#[derive(Clone, Debug)]
pub struct VarnodeCompareRecord<'a> {
    varnode: Varnode<'a>,
    /// At most one comparison per right varnode
    comparisons: Vec<VarnodeCompare2<'a>>,
}

impl<'a> VarnodeCompareRecord<'a> {
    pub fn new(varnode: Varnode<'a>) -> Self {
        Self {
            varnode,
            comparisons: vec![],
        }
    }

    pub fn varnode(&self) -> &Varnode<'a> {
        &self.varnode
    }

    /// Record `cmp`, unless its right varnode was already compared against. The left side of
    /// `cmp` must be this record's varnode.
    pub fn add_comparison(&mut self, cmp: VarnodeCompare2<'a>) {
        assert!(
            cmp.left().same(&self.varnode),
            "Comparison {} does not belong to {}",
            cmp,
            self.varnode
        );
        if !self.comparisons.iter().any(|c| c.right().same(cmp.right())) {
            self.comparisons.push(cmp);
        }
    }

    pub fn comparisons(&self) -> &[VarnodeCompare2<'a>] {
        &self.comparisons
    }

    pub fn compared_varnodes(&self) -> impl Iterator<Item = &Varnode<'a>> {
        self.comparisons.iter().map(|c| c.right())
    }

    /// The best level achieved against any right varnode
    pub fn compare_level(&self) -> VarnodeCompareLevel {
        self.comparisons
            .iter()
            .map(|c| c.compare_level())
            .max()
            .unwrap_or(VarnodeCompareLevel::NoMatch)
    }

    pub fn compared_with(&self) -> usize {
        self.comparisons.len()
    }

    pub fn is_comparable(&self) -> bool {
        self.varnode.region().is_rangeable()
    }

    pub fn does_overlap(&self) -> bool {
        self.compare_level() >= VarnodeCompareLevel::Overlap
    }

    pub fn exact_match(&self) -> bool {
        self.compare_level() == VarnodeCompareLevel::Match
    }

    /// Sum of bytes overlapped by all comparisons. Overlapping right varnodes may be counted more
    /// than once, so this is capped at the varnode's own size.
    pub fn bytes_overlapped(&self) -> u64 {
        let overlapped: u64 = self.comparisons.iter().map(|c| c.bytes_overlapped()).sum();
        overlapped.min(self.varnode.size() as u64)
    }
}

impl<'a> std::fmt::Display for VarnodeCompareRecord<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<VarnodeCompareRecord varnode={} level={:?}>",
            self.varnode,
            self.compare_level()
        )?;
        for c in &self.comparisons {
            write!(f, "\n\tComparison: other={} compare_code={:?}", c.right(), c.compare_code())?;
        }
        Ok(())
    }
}
