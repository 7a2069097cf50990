//! Addresses, regions, half-open address ranges, and the overlap partition between two ranges.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A location that a variable (or a program counter) may refer to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Address {
    /// A global, absolute memory address
    Absolute { addr: u64 },
    /// An offset relative to the frame base of the current function
    Stack { offset: i64 },
    /// A (part of a) register; `byte_offset` is the offset within the register
    Register {
        regnum: u32,
        #[serde(default)]
        byte_offset: i64,
    },
    /// Memory addressed relative to the value held in a register
    RegisterOffset { regnum: u32, offset: i64 },
    /// Lives outside the analyzed program
    External,
    Unknown,
}

/// The comparability class of an [`Address`]. Two addresses can only be ranged, ordered or
/// overlapped when they share a region, and only if the region is rangeable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressRegion {
    Absolute,
    Stack,
    Register(u32),
    RegisterOffset(u32),
    External,
    Unknown,
}

impl AddressRegion {
    /// Addresses in this region support arithmetic and form ranges
    pub fn is_rangeable(&self) -> bool {
        matches!(
            self,
            AddressRegion::Absolute | AddressRegion::Stack | AddressRegion::RegisterOffset(_)
        )
    }

    /// Addresses in this region name one single location (a register)
    pub fn is_single_location(&self) -> bool {
        matches!(self, AddressRegion::Register(_))
    }

    /// Addresses in this region can never be compared with anything
    pub fn is_opaque(&self) -> bool {
        matches!(self, AddressRegion::External | AddressRegion::Unknown)
    }
}

impl Address {
    pub fn absolute(addr: u64) -> Self {
        Address::Absolute { addr }
    }

    pub fn stack(offset: i64) -> Self {
        Address::Stack { offset }
    }

    pub fn register(regnum: u32) -> Self {
        Address::Register {
            regnum,
            byte_offset: 0,
        }
    }

    pub fn register_offset(regnum: u32, offset: i64) -> Self {
        Address::RegisterOffset { regnum, offset }
    }

    pub fn region(&self) -> AddressRegion {
        match self {
            Address::Absolute { .. } => AddressRegion::Absolute,
            Address::Stack { .. } => AddressRegion::Stack,
            Address::Register { regnum, .. } => AddressRegion::Register(*regnum),
            Address::RegisterOffset { regnum, .. } => AddressRegion::RegisterOffset(*regnum),
            Address::External => AddressRegion::External,
            Address::Unknown => AddressRegion::Unknown,
        }
    }

    pub fn is_rangeable(&self) -> bool {
        self.region().is_rangeable()
    }

    pub fn is_single_location(&self) -> bool {
        self.region().is_single_location()
    }

    /// The position of a rangeable address within its region. Wide enough to hold both the
    /// unsigned absolute and the signed relative variants.
    pub(crate) fn rangeable_offset(&self) -> Option<i128> {
        match self {
            Address::Absolute { addr } => Some(*addr as i128),
            Address::Stack { offset } | Address::RegisterOffset { offset, .. } => {
                Some(*offset as i128)
            }
            Address::Register { .. } | Address::External | Address::Unknown => None,
        }
    }

    /// The same variant (and register), moved to position `offset`
    fn at_offset(&self, offset: i128) -> Result<Address> {
        let overflow = || Error::Overflow(*self);
        Ok(match self {
            Address::Absolute { .. } => Address::Absolute {
                addr: u64::try_from(offset).map_err(|_| overflow())?,
            },
            Address::Stack { .. } => Address::Stack {
                offset: i64::try_from(offset).map_err(|_| overflow())?,
            },
            Address::RegisterOffset { regnum, .. } => Address::RegisterOffset {
                regnum: *regnum,
                offset: i64::try_from(offset).map_err(|_| overflow())?,
            },
            Address::Register { .. } | Address::External | Address::Unknown => {
                return Err(Error::NotRangeable(*self))
            }
        })
    }

    fn offset_or_err(&self) -> Result<i128> {
        self.rangeable_offset().ok_or(Error::NotRangeable(*self))
    }

    fn check_same_region(&self, other: &Address) -> Result<()> {
        if self.region() == other.region() {
            Ok(())
        } else {
            Err(Error::RegionMismatch {
                left: self.region(),
                right: other.region(),
            })
        }
    }

    /// The address `n` bytes after `self`
    pub fn add_const(&self, n: i64) -> Result<Address> {
        let offset = self.offset_or_err()?;
        self.at_offset(offset + n as i128)
    }

    /// Number of bytes from `self` to `other` (i.e., `other - self`)
    pub fn distance(&self, other: &Address) -> Result<i64> {
        self.check_same_region(other)?;
        let d = other.offset_or_err()? - self.offset_or_err()?;
        i64::try_from(d).map_err(|_| Error::Overflow(*other))
    }

    /// Ordering between two addresses of the same rangeable region
    pub fn try_cmp(&self, other: &Address) -> Result<Ordering> {
        self.check_same_region(other)?;
        Ok(self.offset_or_err()?.cmp(&other.offset_or_err()?))
    }

    /// Moves the address `n` bytes forward within whatever region it lives in. Rangeable
    /// addresses use [`Self::add_const`]; a register moves its byte offset within the register,
    /// and opaque addresses are left as-is.
    pub fn displaced(&self, n: i64) -> Result<Address> {
        match self {
            Address::Register {
                regnum,
                byte_offset,
            } => Ok(Address::Register {
                regnum: *regnum,
                byte_offset: byte_offset.checked_add(n).ok_or(Error::Overflow(*self))?,
            }),
            Address::External | Address::Unknown => Ok(*self),
            _ => self.add_const(n),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Absolute { addr } => write!(f, "{:#x}", addr),
            Address::Stack { offset } => write!(f, "stack[{}]", offset),
            Address::Register {
                regnum,
                byte_offset: 0,
            } => write!(f, "reg{}", regnum),
            Address::Register {
                regnum,
                byte_offset,
            } => write!(f, "reg{}+{}", regnum, byte_offset),
            Address::RegisterOffset { regnum, offset } => write!(f, "reg{}[{}]", regnum, offset),
            Address::External => write!(f, "external"),
            Address::Unknown => write!(f, "unknown"),
        }
    }
}

/// A half-open range `[start, end)` of addresses within one rangeable region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AddressRange {
    start: Address,
    end: Address,
}

impl AddressRange {
    pub fn new(start: Address, end: Address) -> Result<Self> {
        if start.try_cmp(&end)? == Ordering::Greater {
            return Err(Error::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn with_size(start: Address, size: u64) -> Result<Self> {
        let size = i64::try_from(size).map_err(|_| Error::Overflow(start))?;
        Self::new(start, start.add_const(size)?)
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn end(&self) -> Address {
        self.end
    }

    pub fn region(&self) -> AddressRegion {
        self.start.region()
    }

    fn bounds(&self) -> (i128, i128) {
        // Both ends are rangeable by construction
        (
            self.start.rangeable_offset().unwrap_or_default(),
            self.end.rangeable_offset().unwrap_or_default(),
        )
    }

    pub fn size(&self) -> u64 {
        let (lo, hi) = self.bounds();
        (hi - lo) as u64
    }

    pub fn contains(&self, addr: &Address) -> bool {
        if addr.region() != self.region() {
            return false;
        }
        let (lo, hi) = self.bounds();
        match addr.rangeable_offset() {
            Some(a) => lo <= a && a < hi,
            None => false,
        }
    }

    /// Classify how `self` (the left range) relates to `other` (the right range)
    pub fn overlap(&self, other: &AddressRange) -> Result<AddressRangeOverlap> {
        AddressRangeOverlap::new(*self, *other)
    }
}

impl std::fmt::Display for AddressRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Which of the two compared ranges a sub-range belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubrangeTag {
    LeftOnly,
    RightOnly,
    Overlap,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaggedSubrange {
    pub tag: SubrangeTag,
    pub range: AddressRange,
}

/// The relationship between a left and a right [`AddressRange`] of the same region, as an ordered
/// partition of their union into disjoint tagged sub-ranges.
#[derive(Clone, Debug)]
pub struct AddressRangeOverlap {
    left: AddressRange,
    right: AddressRange,
    subranges: Vec<TaggedSubrange>,
}

impl AddressRangeOverlap {
    pub fn new(left: AddressRange, right: AddressRange) -> Result<Self> {
        if left.region() != right.region() {
            return Err(Error::RegionMismatch {
                left: left.region(),
                right: right.region(),
            });
        }
        let subranges = Self::partition(&left, &right);
        Ok(Self {
            left,
            right,
            subranges,
        })
    }

    fn partition(left: &AddressRange, right: &AddressRange) -> Vec<TaggedSubrange> {
        use SubrangeTag::*;
        let (ls, le) = left.bounds();
        let (rs, re) = right.bounds();
        // Every sub-range boundary is one of the four endpoints, so no arithmetic is needed.
        let sub = |tag, start: Address, end: Address| TaggedSubrange {
            tag,
            range: AddressRange { start, end },
        };
        let (l0, l1, r0, r1) = (left.start, left.end, right.start, right.end);

        if ls == rs && le == re {
            vec![sub(Overlap, l0, l1)]
        } else if ls == rs {
            if le < re {
                vec![sub(Overlap, l0, l1), sub(RightOnly, l1, r1)]
            } else {
                vec![sub(Overlap, r0, r1), sub(LeftOnly, r1, l1)]
            }
        } else if le == re {
            if ls < rs {
                vec![sub(LeftOnly, l0, r0), sub(Overlap, r0, r1)]
            } else {
                vec![sub(RightOnly, r0, l0), sub(Overlap, l0, l1)]
            }
        } else if le <= rs {
            vec![sub(LeftOnly, l0, l1), sub(RightOnly, r0, r1)]
        } else if re <= ls {
            vec![sub(RightOnly, r0, r1), sub(LeftOnly, l0, l1)]
        } else if ls < rs && re < le {
            vec![
                sub(LeftOnly, l0, r0),
                sub(Overlap, r0, r1),
                sub(LeftOnly, r1, l1),
            ]
        } else if rs < ls && le < re {
            vec![
                sub(RightOnly, r0, l0),
                sub(Overlap, l0, l1),
                sub(RightOnly, l1, r1),
            ]
        } else if ls < rs {
            vec![
                sub(LeftOnly, l0, r0),
                sub(Overlap, r0, l1),
                sub(RightOnly, l1, r1),
            ]
        } else {
            vec![
                sub(RightOnly, r0, l0),
                sub(Overlap, l0, r1),
                sub(LeftOnly, r1, l1),
            ]
        }
    }

    pub fn left(&self) -> &AddressRange {
        &self.left
    }

    pub fn right(&self) -> &AddressRange {
        &self.right
    }

    /// The tagged sub-ranges, in ascending address order
    pub fn subranges(&self) -> &[TaggedSubrange] {
        &self.subranges
    }

    /// The overlapping sub-range, if any
    pub fn overlap_range(&self) -> Option<&AddressRange> {
        self.subranges
            .iter()
            .find(|s| s.tag == SubrangeTag::Overlap)
            .map(|s| &s.range)
    }

    fn first_is(&self, tag: SubrangeTag) -> bool {
        self.subranges.first().map(|s| s.tag) == Some(tag)
    }

    fn last_is(&self, tag: SubrangeTag) -> bool {
        self.subranges.last().map(|s| s.tag) == Some(tag)
    }

    pub fn does_overlap(&self) -> bool {
        self.overlap_range().is_some()
    }

    pub fn start_aligned(&self) -> bool {
        self.first_is(SubrangeTag::Overlap)
    }

    pub fn end_aligned(&self) -> bool {
        self.last_is(SubrangeTag::Overlap)
    }

    pub fn left_contains_right(&self) -> bool {
        self.does_overlap()
            && (self.first_is(SubrangeTag::LeftOnly) || self.start_aligned())
            && (self.last_is(SubrangeTag::LeftOnly) || self.end_aligned())
    }

    pub fn right_contains_left(&self) -> bool {
        self.does_overlap()
            && (self.first_is(SubrangeTag::RightOnly) || self.start_aligned())
            && (self.last_is(SubrangeTag::RightOnly) || self.end_aligned())
    }

    /// Overlapping, but neither range contains the other
    pub fn misaligned(&self) -> bool {
        self.does_overlap() && !self.left_contains_right() && !self.right_contains_left()
    }

    pub fn bytes_overlapped(&self) -> u64 {
        self.overlap_range().map(|r| r.size()).unwrap_or(0)
    }
}

/// An address paired with the program counter range during which a variable lives there. A
/// missing PC range means the location is valid throughout the program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AddressLiveRange {
    pub addr: Address,
    pub pc_range: Option<AddressRange>,
}

impl AddressLiveRange {
    pub fn new(addr: Address, startpc: Option<u64>, endpc: Option<u64>) -> Result<Self> {
        let pc_range = match (startpc, endpc) {
            (Some(s), Some(e)) => Some(AddressRange::new(
                Address::absolute(s),
                Address::absolute(e),
            )?),
            (Some(s), None) => Some(AddressRange::with_size(Address::absolute(s), 0)?),
            (None, _) => None,
        };
        Ok(Self { addr, pc_range })
    }

    /// Valid throughout the whole program
    pub fn global(addr: Address) -> Self {
        Self {
            addr,
            pc_range: None,
        }
    }

    pub fn is_global(&self) -> bool {
        self.pc_range.is_none()
    }

    pub(crate) fn start_pc(&self) -> Option<i128> {
        self.pc_range.and_then(|r| r.start().rangeable_offset())
    }

    pub(crate) fn end_pc(&self) -> Option<i128> {
        self.pc_range.and_then(|r| r.end().rangeable_offset())
    }
}

impl std::fmt::Display for AddressLiveRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.pc_range {
            Some(pc) => write!(f, "{} @ pc{}", self.addr, pc),
            None => write!(f, "{}", self.addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SubrangeTag::*;

    fn abs_range(start: u64, end: u64) -> AddressRange {
        AddressRange::new(Address::absolute(start), Address::absolute(end)).unwrap()
    }

    fn tags(o: &AddressRangeOverlap) -> Vec<SubrangeTag> {
        o.subranges().iter().map(|s| s.tag).collect()
    }

    fn bounds(o: &AddressRangeOverlap) -> Vec<(i128, i128)> {
        o.subranges().iter().map(|s| s.range.bounds()).collect()
    }

    /// One representative pair per geometric case, plus the mirrored pair
    fn all_cases() -> Vec<(AddressRange, AddressRange)> {
        let base = vec![
            (abs_range(0, 8), abs_range(0, 8)),
            (abs_range(0, 4), abs_range(0, 8)),
            (abs_range(0, 8), abs_range(4, 8)),
            (abs_range(0, 4), abs_range(8, 12)),
            (abs_range(0, 4), abs_range(4, 8)),
            (abs_range(0, 12), abs_range(4, 8)),
            (abs_range(0, 8), abs_range(4, 12)),
        ];
        base.iter()
            .cloned()
            .chain(base.iter().map(|(a, b)| (*b, *a)))
            .collect()
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(matches!(
            AddressRange::new(Address::absolute(8), Address::absolute(4)),
            Err(Error::InvertedRange { .. })
        ));
    }

    #[test]
    fn ranges_require_rangeable_addresses() {
        assert!(AddressRange::with_size(Address::register(3), 4).is_err());
        assert!(AddressRange::with_size(Address::External, 4).is_err());
        assert!(AddressRange::new(Address::stack(-8), Address::absolute(0)).is_err());
        let r = AddressRange::with_size(Address::register_offset(7, -16), 8).unwrap();
        assert_eq!(r.size(), 8);
        assert_eq!(r.end(), Address::register_offset(7, -8));
    }

    #[test]
    fn arithmetic_only_on_rangeable_addresses() {
        assert_eq!(
            Address::stack(-8).add_const(4).unwrap(),
            Address::stack(-4)
        );
        assert_eq!(
            Address::absolute(0x10)
                .distance(&Address::absolute(0x4))
                .unwrap(),
            -0xc
        );
        assert!(Address::register(1).add_const(1).is_err());
        assert!(Address::Unknown.distance(&Address::Unknown).is_err());
        assert!(Address::register_offset(1, 0)
            .try_cmp(&Address::register_offset(2, 0))
            .is_err());
        assert!(Address::absolute(0).add_const(-1).is_err());
    }

    #[test]
    fn contains_is_half_open() {
        let r = abs_range(0x10, 0x14);
        assert!(r.contains(&Address::absolute(0x10)));
        assert!(r.contains(&Address::absolute(0x13)));
        assert!(!r.contains(&Address::absolute(0x14)));
        assert!(!r.contains(&Address::stack(0x10)));
    }

    #[test]
    fn overlap_of_mismatched_regions_fails() {
        let a = abs_range(0, 4);
        let b = AddressRange::with_size(Address::stack(0), 4).unwrap();
        assert!(a.overlap(&b).is_err());
    }

    #[test]
    fn overlap_identity() {
        for (a, _) in all_cases() {
            let o = a.overlap(&a).unwrap();
            assert_eq!(o.subranges().len(), 1);
            assert_eq!(o.subranges()[0].tag, Overlap);
            assert_eq!(o.subranges()[0].range, a);
        }
    }

    #[test]
    fn overlap_symmetry() {
        for (a, b) in all_cases() {
            let ab = a.overlap(&b).unwrap();
            let ba = b.overlap(&a).unwrap();
            assert_eq!(ab.bytes_overlapped(), ba.bytes_overlapped());
            assert_eq!(ab.does_overlap(), ba.does_overlap());
            assert_eq!(ab.left_contains_right(), ba.right_contains_left());
            assert_eq!(ab.misaligned(), ba.misaligned());
        }
    }

    #[test]
    fn partition_completeness() {
        for (a, b) in all_cases() {
            let o = a.overlap(&b).unwrap();
            let subs = bounds(&o);
            for w in subs.windows(2) {
                // ascending and non-overlapping
                assert!(w[0].1 <= w[1].0);
            }
            let covered: i128 = subs.iter().map(|(lo, hi)| hi - lo).sum();
            let (al, ah) = a.bounds();
            let (bl, bh) = b.bounds();
            let union = if ah <= bl || bh <= al {
                (ah - al) + (bh - bl)
            } else {
                ah.max(bh) - al.min(bl)
            };
            assert_eq!(covered, union);
            for s in o.subranges() {
                let in_a = s.range.bounds().0 >= al && s.range.bounds().1 <= ah;
                let in_b = s.range.bounds().0 >= bl && s.range.bounds().1 <= bh;
                match s.tag {
                    LeftOnly => assert!(in_a),
                    RightOnly => assert!(in_b),
                    Overlap => assert!(in_a && in_b),
                }
            }
        }
    }

    #[test]
    fn equal_starts_tags_the_rest_by_owner() {
        let o = abs_range(0, 8).overlap(&abs_range(0, 4)).unwrap();
        assert_eq!(tags(&o), vec![Overlap, LeftOnly]);
        assert!(o.left_contains_right());
        assert!(!o.right_contains_left());
        assert!(o.start_aligned());

        let o = abs_range(0, 4).overlap(&abs_range(0, 8)).unwrap();
        assert_eq!(tags(&o), vec![Overlap, RightOnly]);
        assert!(o.right_contains_left());
    }

    #[test]
    fn nested_and_partial_cases() {
        let o = abs_range(0, 12).overlap(&abs_range(4, 8)).unwrap();
        assert_eq!(tags(&o), vec![LeftOnly, Overlap, LeftOnly]);
        assert_eq!(bounds(&o), vec![(0, 4), (4, 8), (8, 12)]);
        assert!(o.left_contains_right());
        assert!(!o.start_aligned() && !o.end_aligned());

        let o = abs_range(4, 12).overlap(&abs_range(0, 8)).unwrap();
        assert_eq!(tags(&o), vec![RightOnly, Overlap, LeftOnly]);
        assert_eq!(o.bytes_overlapped(), 4);
        assert!(o.misaligned());
    }

    #[test]
    fn misaligned_overlap() {
        let o = abs_range(0x3000, 0x3008)
            .overlap(&abs_range(0x3004, 0x300c))
            .unwrap();
        assert!(o.does_overlap());
        assert!(o.misaligned());
        assert_eq!(o.bytes_overlapped(), 4);
    }

    #[test]
    fn disjoint_ranges() {
        let o = abs_range(0x4000, 0x4004)
            .overlap(&abs_range(0x5000, 0x5004))
            .unwrap();
        assert!(!o.does_overlap());
        assert!(!o.misaligned());
        assert_eq!(o.bytes_overlapped(), 0);
        assert_eq!(tags(&o), vec![LeftOnly, RightOnly]);

        // Touching ranges share no bytes
        let o = abs_range(0, 4).overlap(&abs_range(4, 8)).unwrap();
        assert!(!o.does_overlap());
    }

    #[test]
    fn register_displacement_stays_in_register() {
        let a = Address::register(5).displaced(2).unwrap();
        assert_eq!(
            a,
            Address::Register {
                regnum: 5,
                byte_offset: 2
            }
        );
        assert_eq!(a.region(), AddressRegion::Register(5));
        assert_eq!(Address::External.displaced(4).unwrap(), Address::External);
    }

    #[test]
    fn live_range_without_pcs_is_global() {
        let lr = AddressLiveRange::new(Address::absolute(0x1000), None, None).unwrap();
        assert!(lr.is_global());
        let lr = AddressLiveRange::new(Address::stack(-4), Some(0x10), Some(0x20)).unwrap();
        assert!(!lr.is_global());
        assert_eq!(lr.pc_range.unwrap().size(), 0x10);
        assert!(AddressLiveRange::new(Address::stack(-4), Some(0x20), Some(0x10)).is_err());
    }
}
