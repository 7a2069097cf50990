//! Comparison of whole sets of varnodes that are alive at the same time (a "snapshot" of a scope,
//! such as the globals, or the parameters of a function).
//!
//! A snapshot is partitioned into one [`AddressSpace`] per address region. Spaces of the same
//! region are then compared pairwise, with a single sweep over both (address-sorted) sides that
//! only ever compares varnodes whose ranges overlap.

use std::collections::BTreeMap;

use crate::address::AddressRegion;
use crate::compare_config::CONFIG;
use crate::compare_variable::{VarnodeCompare2, VarnodeCompareRecord};
use crate::errors::{Error, Result};
use crate::lang::Varnode;
use crate::log::*;
use crate::ordered_merge::{ordered_merge, Merged};

/// The varnodes of one address region
#[derive(Clone, Debug)]
pub struct AddressSpace<'a> {
    region: AddressRegion,
    /// Sorted by address if the region is rangeable
    varnodes: Vec<Varnode<'a>>,
}

impl<'a> AddressSpace<'a> {
    pub fn new(region: AddressRegion, mut varnodes: Vec<Varnode<'a>>) -> Result<Self> {
        if let Some(v) = varnodes.iter().find(|v| v.region() != region) {
            return Err(Error::RegionMismatch {
                left: region,
                right: v.region(),
            });
        }
        if region.is_rangeable() {
            varnodes.sort_by_key(|v| v.addr().rangeable_offset());
        }
        Ok(Self { region, varnodes })
    }

    pub fn empty(region: AddressRegion) -> Self {
        Self {
            region,
            varnodes: vec![],
        }
    }

    pub fn region(&self) -> AddressRegion {
        self.region
    }

    pub fn varnodes(&self) -> &[Varnode<'a>] {
        &self.varnodes
    }

    pub fn is_rangeable(&self) -> bool {
        self.region.is_rangeable()
    }

    /// Only rangeable spaces produce comparisons
    pub fn is_comparable(&self) -> bool {
        self.is_rangeable()
    }

    /// Pairs of distinct varnodes of this space that share bytes
    pub fn find_self_overlaps(&self) -> Vec<(&Varnode<'a>, &Varnode<'a>)> {
        if !self.is_rangeable() {
            return vec![];
        }
        let mut res = vec![];
        // The earlier varnode reaching furthest into the space
        let mut furthest: Option<(&Varnode<'a>, i128)> = None;
        for v in &self.varnodes {
            let start = v.addr().rangeable_offset().unwrap_or_default();
            let end = start + v.size() as i128;
            match furthest {
                Some((prev, prev_end)) if start < prev_end => {
                    res.push((prev, v));
                    if end > prev_end {
                        furthest = Some((v, end));
                    }
                }
                _ => furthest = Some((v, end)),
            }
        }
        res
    }

    /// Fail on the first self-overlap if `strict`; otherwise only warn about each one.
    pub fn check_self_overlap(&self, strict: bool) -> Result<()> {
        for (l, r) in self.find_self_overlaps() {
            if strict {
                return Err(Error::SelfOverlap {
                    left: l.addr(),
                    right: r.addr(),
                });
            }
            warn!("Self-overlapping varnodes"; "left" => %l, "right" => %r);
        }
        Ok(())
    }

    fn overlaps(l: &Varnode<'_>, r: &Varnode<'_>) -> bool {
        match (l.addr_range(), r.addr_range()) {
            (Some(lr), Some(rr)) => lr.overlap(&rr).map_or(false, |o| o.does_overlap()),
            _ => false,
        }
    }

    /// Indices `(self, other)` of every overlapping pair of varnodes found by sweeping both
    /// address-sorted spaces at once.
    fn comparison_pair_indices(&self, other: &AddressSpace<'a>) -> Vec<(usize, usize)> {
        if !self.is_rangeable() {
            return vec![];
        }
        let mut pairs = vec![];
        // Varnodes seen so far on each side that may still reach into later ones of the other.
        // Everything in `active_*` starts no later than the current event, so one that does
        // not overlap it ends before it and can never overlap anything later.
        let mut active_left: Vec<(usize, &Varnode<'_>)> = vec![];
        let mut active_right: Vec<(usize, &Varnode<'_>)> = vec![];

        for event in ordered_merge(
            self.varnodes.iter().enumerate(),
            other.varnodes.iter().enumerate(),
            |l| l.1.addr().rangeable_offset(),
            |r| r.1.addr().rangeable_offset(),
        ) {
            match event {
                Merged::Left(l) => {
                    active_right.retain(|r| Self::overlaps(l.1, r.1));
                    pairs.extend(active_right.iter().map(|r| (l.0, r.0)));
                    active_left.push(l);
                }
                Merged::Right(r) => {
                    active_left.retain(|l| Self::overlaps(l.1, r.1));
                    pairs.extend(active_left.iter().map(|l| (l.0, r.0)));
                    active_right.push(r);
                }
                Merged::Conflict(l, r) => {
                    active_right.retain(|ar| Self::overlaps(l.1, ar.1));
                    pairs.extend(active_right.iter().map(|ar| (l.0, ar.0)));
                    active_left.retain(|al| Self::overlaps(al.1, r.1));
                    pairs.extend(active_left.iter().map(|al| (al.0, r.0)));
                    if Self::overlaps(l.1, r.1) {
                        pairs.push((l.0, r.0));
                    }
                    active_left.push(l);
                    active_right.push(r);
                }
            }
        }
        pairs
    }

    /// Every overlapping `(self, other)` pair of varnodes. Empty unless the region is rangeable.
    pub fn comparison_pairs<'s>(
        &'s self,
        other: &'s AddressSpace<'a>,
    ) -> Vec<(&'s Varnode<'a>, &'s Varnode<'a>)> {
        self.comparison_pair_indices(other)
            .into_iter()
            .map(|(l, r)| (&self.varnodes[l], &other.varnodes[r]))
            .collect()
    }
}

/// The varnodes of one scope, grouped by region
#[derive(Clone, Debug, Default)]
pub struct VariableSetSnapshot<'a> {
    spaces: BTreeMap<AddressRegion, AddressSpace<'a>>,
}

impl<'a> VariableSetSnapshot<'a> {
    pub fn new(varnodes: Vec<Varnode<'a>>) -> Result<Self> {
        let mut by_region: BTreeMap<AddressRegion, Vec<Varnode<'a>>> = BTreeMap::new();
        for v in varnodes {
            by_region.entry(v.region()).or_default().push(v);
        }
        let spaces = by_region
            .into_iter()
            .map(|(region, vs)| Ok((region, AddressSpace::new(region, vs)?)))
            .collect::<Result<_>>()?;
        Ok(Self { spaces })
    }

    pub fn varnodes(&self) -> impl Iterator<Item = &Varnode<'a>> {
        self.spaces.values().flat_map(|s| s.varnodes.iter())
    }

    pub fn address_spaces(&self) -> &BTreeMap<AddressRegion, AddressSpace<'a>> {
        &self.spaces
    }

    pub fn address_space(&self, region: AddressRegion) -> Option<&AddressSpace<'a>> {
        self.spaces.get(&region)
    }

    /// The same scope, with every varnode replaced by its primitive components
    pub fn flatten(&self) -> Result<Self> {
        let mut flat = vec![];
        for v in self.varnodes() {
            flat.extend(v.flatten()?);
        }
        Self::new(flat)
    }

    /// Total size of the varnodes accepted by `filter`
    pub fn get_bytes(&self, filter: impl Fn(&Varnode<'a>) -> bool) -> u64 {
        self.varnodes()
            .filter(|v| filter(v))
            .map(|v| v.size() as u64)
            .sum()
    }

    pub fn find_self_overlaps(&self) -> Vec<(&Varnode<'a>, &Varnode<'a>)> {
        self.spaces
            .values()
            .flat_map(|s| s.find_self_overlaps())
            .collect()
    }

    pub fn check_self_overlap(&self, strict: bool) -> Result<()> {
        self.spaces
            .values()
            .try_for_each(|s| s.check_self_overlap(strict))
    }
}

/// The comparison between a left and a right space of the same region. Holds a record for every
/// left varnode, with the overlapping right varnodes it was compared against.
#[derive(Clone, Debug)]
pub struct AddressSpaceCompare2<'a> {
    region: AddressRegion,
    records: Vec<VarnodeCompareRecord<'a>>,
}

impl<'a> AddressSpaceCompare2<'a> {
    pub fn new(left: &AddressSpace<'a>, right: &AddressSpace<'a>) -> Result<Self> {
        if left.region != right.region {
            return Err(Error::RegionMismatch {
                left: left.region,
                right: right.region,
            });
        }
        let mut records: Vec<_> = left
            .varnodes
            .iter()
            .map(|v| VarnodeCompareRecord::new(v.clone()))
            .collect();
        for (l, r) in left.comparison_pair_indices(right) {
            let cmp = VarnodeCompare2::new(left.varnodes[l].clone(), right.varnodes[r].clone())?;
            if cmp.does_overlap() {
                records[l].add_comparison(cmp);
            }
        }
        Ok(Self {
            region: left.region,
            records,
        })
    }

    pub fn region(&self) -> AddressRegion {
        self.region
    }

    pub fn varnode_compare_records(&self) -> &[VarnodeCompareRecord<'a>] {
        &self.records
    }

    pub fn get_varnode_compare_record(&self, varnode: &Varnode<'_>) -> Option<&VarnodeCompareRecord<'a>> {
        self.records.iter().find(|r| r.varnode().same(varnode))
    }

    /// Bytes overlapped by the left varnodes accepted by `filter`
    pub fn bytes_overlapped(&self, filter: impl Fn(&Varnode<'a>) -> bool) -> u64 {
        self.records
            .iter()
            .filter(|r| filter(r.varnode()))
            .map(|r| r.bytes_overlapped())
            .sum()
    }
}

/// The comparison of a ground-truth (left) snapshot to a candidate (right) snapshot of the same
/// scope.
#[derive(Clone, Debug)]
pub struct VariableSetSnapshotCompare2<'a> {
    left: VariableSetSnapshot<'a>,
    right: VariableSetSnapshot<'a>,
    spaces: BTreeMap<AddressRegion, AddressSpaceCompare2<'a>>,
}

impl<'a> VariableSetSnapshotCompare2<'a> {
    /// Compare every region present on either side; a region missing from one side is compared
    /// against an empty space. The left side must not overlap itself (unless configured
    /// otherwise).
    pub fn new(left: VariableSetSnapshot<'a>, right: VariableSetSnapshot<'a>) -> Result<Self> {
        left.check_self_overlap(CONFIG.check_ground_truth_self_overlap)?;

        let mut spaces = BTreeMap::new();
        for (region, l) in &left.spaces {
            let cmp = match right.spaces.get(region) {
                Some(r) => AddressSpaceCompare2::new(l, r)?,
                None => AddressSpaceCompare2::new(l, &AddressSpace::empty(*region))?,
            };
            spaces.insert(*region, cmp);
        }
        for (region, r) in &right.spaces {
            if !spaces.contains_key(region) {
                spaces.insert(
                    *region,
                    AddressSpaceCompare2::new(&AddressSpace::empty(*region), r)?,
                );
            }
        }

        Ok(Self {
            left,
            right,
            spaces,
        })
    }

    /// Compare two plain lists of varnodes
    pub fn from_varnodes(left: Vec<Varnode<'a>>, right: Vec<Varnode<'a>>) -> Result<Self> {
        Self::new(
            VariableSetSnapshot::new(left)?,
            VariableSetSnapshot::new(right)?,
        )
    }

    pub fn left(&self) -> &VariableSetSnapshot<'a> {
        &self.left
    }

    pub fn right(&self) -> &VariableSetSnapshot<'a> {
        &self.right
    }

    pub fn space_comparisons(&self) -> &BTreeMap<AddressRegion, AddressSpaceCompare2<'a>> {
        &self.spaces
    }

    pub fn space_comparison(&self, region: AddressRegion) -> Option<&AddressSpaceCompare2<'a>> {
        self.spaces.get(&region)
    }

    /// Bytes of the left varnodes accepted by `filter` that are overlapped by the right side
    pub fn bytes_overlapped(&self, filter: impl Fn(&Varnode<'a>) -> bool) -> u64 {
        self.spaces
            .values()
            .map(|s| s.bytes_overlapped(&filter))
            .sum()
    }

    /// Total bytes of the left (ground-truth) side
    pub fn get_bytes(&self) -> u64 {
        self.left.get_bytes(|_| true)
    }

    pub fn varnode_compare_records(&self) -> impl Iterator<Item = &VarnodeCompareRecord<'a>> {
        self.spaces
            .values()
            .flat_map(|s| s.varnode_compare_records().iter())
    }

    pub fn get_varnode_compare_record(&self, varnode: &Varnode<'_>) -> Option<&VarnodeCompareRecord<'a>> {
        self.spaces
            .get(&varnode.region())
            .and_then(|s| s.get_varnode_compare_record(varnode))
    }

    /// The same comparison, over the primitive components of both sides
    pub fn get_flattened_comparison(&self) -> Result<VariableSetSnapshotCompare2<'a>> {
        Self::new(self.left.flatten()?, self.right.flatten()?)
    }

    pub fn primitive_varnode_compare_records(&self) -> Result<Vec<VarnodeCompareRecord<'a>>> {
        let flat = self.get_flattened_comparison()?;
        Ok(flat.into_varnode_compare_records())
    }

    pub fn into_varnode_compare_records(self) -> Vec<VarnodeCompareRecord<'a>> {
        self.spaces
            .into_values()
            .flat_map(|s| s.records.into_iter())
            .collect()
    }

    pub fn select_varnode_compare_records(
        &self,
        record_cond: impl Fn(&VarnodeCompareRecord<'a>) -> bool,
    ) -> Vec<&VarnodeCompareRecord<'a>> {
        self.varnode_compare_records()
            .filter(|r| record_cond(r))
            .collect()
    }

    pub fn select_varnode_comparisons(
        &self,
        record_cond: impl Fn(&VarnodeCompareRecord<'a>) -> bool,
        cmp_cond: impl Fn(&VarnodeCompare2<'a>) -> bool,
    ) -> Vec<&VarnodeCompare2<'a>> {
        self.varnode_compare_records()
            .filter(|r| record_cond(r))
            .flat_map(|r| r.comparisons().iter())
            .filter(|c| cmp_cond(c))
            .collect()
    }

    pub fn select_primitive_varnode_compare_records(
        &self,
        record_cond: impl Fn(&VarnodeCompareRecord<'a>) -> bool,
    ) -> Result<Vec<VarnodeCompareRecord<'a>>> {
        Ok(self
            .primitive_varnode_compare_records()?
            .into_iter()
            .filter(|r| record_cond(r))
            .collect())
    }

    pub fn select_primitive_varnode_comparisons(
        &self,
        record_cond: impl Fn(&VarnodeCompareRecord<'a>) -> bool,
        cmp_cond: impl Fn(&VarnodeCompare2<'a>) -> bool,
    ) -> Result<Vec<VarnodeCompare2<'a>>> {
        Ok(self
            .primitive_varnode_compare_records()?
            .iter()
            .filter(|r| record_cond(r))
            .flat_map(|r| r.comparisons().iter())
            .filter(|c| cmp_cond(c))
            .cloned()
            .collect())
    }
}

impl<'a> std::fmt::Display for VariableSetSnapshotCompare2<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for r in self.varnode_compare_records() {
            writeln!(f, "{}", r)?;
        }
        Ok(())
    }
}
