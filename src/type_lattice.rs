//! A fixed lattice of primitive type categories, used to score how related two distinct
//! primitive types are.

use crate::datatype::{DataType, Ty};

/// An element of a lattice that knows its own neighbours.
pub trait LatticeItem: Sized + Clone + PartialEq + std::fmt::Debug {
    /// `None` exactly at the root
    fn parent(&self) -> Option<Self>;

    fn children(&self) -> Vec<Self>;

    /// The node for a primitive type; `None` for composite or zero-sized types
    fn from_datatype(ty: &Ty<'_>) -> Option<Self>;

    fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    fn is_leaf(&self) -> bool {
        self.children().is_empty()
    }

    fn depth(&self) -> usize {
        self.path_to_root().len() - 1
    }

    /// `self` first, root last
    fn path_to_root(&self) -> Vec<Self> {
        let mut path = vec![self.clone()];
        while let Some(p) = path.last().and_then(|n| n.parent()) {
            path.push(p);
        }
        path
    }

    /// The paths from the nearest common ancestor down to `self` and to `other` respectively
    /// (ancestor first in both), or `None` if the two share no ancestor.
    fn common_ancestor_paths(&self, other: &Self) -> Option<(Vec<Self>, Vec<Self>)> {
        let ours = self.path_to_root();
        let theirs = other.path_to_root();
        for (i, node) in ours.iter().enumerate() {
            if let Some(j) = theirs.iter().position(|n| n == node) {
                let mut left: Vec<Self> = ours[..=i].to_vec();
                let mut right: Vec<Self> = theirs[..=j].to_vec();
                left.reverse();
                right.reverse();
                return Some((left, right));
            }
        }
        None
    }

    fn common_ancestor(&self, other: &Self) -> Option<Self> {
        self.common_ancestor_paths(other)
            .map(|(left, _)| left[0].clone())
    }
}

/// Categories of primitive types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveKind {
    Root,
    Code,
    Data,
    Float,
    Num,
    Ptr,
    Int,
    Uint,
}

impl PrimitiveKind {
    pub fn parent(self) -> Option<Self> {
        use PrimitiveKind::*;
        match self {
            Root => None,
            Code | Data => Some(Root),
            Float | Num => Some(Data),
            Ptr | Int | Uint => Some(Num),
        }
    }

    pub fn children(self) -> &'static [Self] {
        use PrimitiveKind::*;
        match self {
            Root => &[Code, Data],
            Data => &[Float, Num],
            Num => &[Ptr, Int, Uint],
            Code | Float | Ptr | Int | Uint => &[],
        }
    }
}

/// Bit widths that sized data may have
pub const VALID_BIT_WIDTHS: [u32; 6] = [1, 8, 16, 32, 64, 80];

/// A [`PrimitiveKind`] refined by an optional bit width. Sized data and code hang below their
/// unsized counterparts; below that, kinds keep the width of their parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KindLatticeItem {
    pub kind: PrimitiveKind,
    pub bits: Option<u32>,
}

impl KindLatticeItem {
    pub fn new(kind: PrimitiveKind, bits: Option<u32>) -> Self {
        Self { kind, bits }
    }
}

impl LatticeItem for KindLatticeItem {
    fn parent(&self) -> Option<Self> {
        match (self.kind, self.bits) {
            (PrimitiveKind::Data, Some(_)) => Some(Self::new(PrimitiveKind::Data, None)),
            (PrimitiveKind::Code, Some(_)) => Some(Self::new(PrimitiveKind::Code, None)),
            (kind, bits) => kind.parent().map(|k| Self::new(k, bits)),
        }
    }

    fn children(&self) -> Vec<Self> {
        match (self.kind, self.bits) {
            (PrimitiveKind::Data, None) => VALID_BIT_WIDTHS
                .iter()
                .map(|b| Self::new(PrimitiveKind::Data, Some(*b)))
                .collect(),
            (PrimitiveKind::Data, Some(1)) => vec![],
            // Only floats come in 80 bits
            (PrimitiveKind::Data, Some(80)) => vec![Self::new(PrimitiveKind::Float, Some(80))],
            (kind, bits) => kind
                .children()
                .iter()
                .map(|k| Self::new(*k, bits))
                .collect(),
        }
    }

    fn from_datatype(ty: &Ty<'_>) -> Option<Self> {
        let kind = match ty.data() {
            DataType::Int { signed: true, .. } => PrimitiveKind::Int,
            DataType::Int { signed: false, .. } => PrimitiveKind::Uint,
            DataType::Float { .. } => PrimitiveKind::Float,
            DataType::Pointer { .. } => PrimitiveKind::Ptr,
            DataType::Undefined { .. } => PrimitiveKind::Data,
            DataType::Void => PrimitiveKind::Root,
            DataType::Array { .. }
            | DataType::Struct { .. }
            | DataType::Union { .. }
            | DataType::FunctionPrototype { .. } => return None,
        };
        match ty.size() {
            0 => None,
            bytes => Some(Self::new(kind, Some(bytes as u32 * 8))),
        }
    }
}

/// The lattice used when comparing primitive types
pub type TypeLatticeNode = KindLatticeItem;
