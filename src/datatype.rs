//! The data type model: an arena of (possibly self-referential) types, a borrowed view over
//! them, flattening to primitives, and recursive descent to locate sub-components by offset.

use std::borrow::Cow;

/// Struct sizes derived from their members are padded up to this alignment
pub const STRUCT_ALIGNMENT: usize = 4;

/// The coarse kind of a type. `Typedef`, `Enum`, `Qualifier` and `String` only ever describe
/// stubs; they are resolved away before a [`DataType`] is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetaType {
    Int,
    Float,
    Pointer,
    Array,
    Struct,
    Union,
    Undefined,
    Void,
    FunctionPrototype,
    Typedef,
    Enum,
    Qualifier,
    String,
}

/// A stable index into a [`TypeArena`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(usize);

impl TypeId {
    pub fn to_string(self) -> String {
        format!("t{}", self.0)
    }
}

/// A data type. Sub-types are referred to by [`TypeId`] into the arena that holds this type,
/// which is what allows a struct to (indirectly) refer to itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataType {
    Int {
        size: usize,
        signed: bool,
    },
    Float {
        size: usize,
    },
    Undefined {
        size: usize,
    },
    Void,
    Pointer {
        basetype: TypeId,
        size: usize,
    },
    Array {
        basetype: TypeId,
        dimensions: Vec<u32>,
        size: usize,
    },
    /// Members are `(offset, type)`, sorted by offset
    Struct {
        name: String,
        members: Vec<(usize, TypeId)>,
        size: usize,
    },
    Union {
        name: String,
        members: Vec<TypeId>,
        size: usize,
    },
    FunctionPrototype {
        rettype: TypeId,
        paramtypes: Vec<TypeId>,
        variadic: bool,
    },
}

impl DataType {
    pub fn metatype(&self) -> MetaType {
        match self {
            DataType::Int { .. } => MetaType::Int,
            DataType::Float { .. } => MetaType::Float,
            DataType::Undefined { .. } => MetaType::Undefined,
            DataType::Void => MetaType::Void,
            DataType::Pointer { .. } => MetaType::Pointer,
            DataType::Array { .. } => MetaType::Array,
            DataType::Struct { .. } => MetaType::Struct,
            DataType::Union { .. } => MetaType::Union,
            DataType::FunctionPrototype { .. } => MetaType::FunctionPrototype,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            DataType::Int { size, .. }
            | DataType::Float { size }
            | DataType::Undefined { size }
            | DataType::Pointer { size, .. }
            | DataType::Array { size, .. }
            | DataType::Struct { size, .. }
            | DataType::Union { size, .. } => *size,
            DataType::Void | DataType::FunctionPrototype { .. } => 0,
        }
    }

    /// Not decomposed any further during comparison. Pointers count as primitive.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            DataType::Int { .. }
                | DataType::Float { .. }
                | DataType::Undefined { .. }
                | DataType::Void
                | DataType::Pointer { .. }
        )
    }

    /// Refers to sub-components
    pub fn is_complex(&self) -> bool {
        !self.is_primitive()
    }

    /// Occupies memory (as opposed to, say, a function prototype)
    pub fn is_sized(&self) -> bool {
        !matches!(self, DataType::FunctionPrototype { .. })
    }

    pub fn array_size(dimensions: &[u32], basetype_size: usize) -> usize {
        dimensions.iter().map(|d| *d as usize).product::<usize>() * basetype_size
    }

    /// The size of a struct whose size was not given explicitly: the end of its last member,
    /// optionally rounded up to [`STRUCT_ALIGNMENT`].
    pub fn derived_struct_size(last_member_end: Option<usize>, pad_to_alignment: bool) -> usize {
        match last_member_end {
            None => 0,
            Some(end) if pad_to_alignment => {
                (end + STRUCT_ALIGNMENT - 1) / STRUCT_ALIGNMENT * STRUCT_ALIGNMENT
            }
            Some(end) => end,
        }
    }
}

/// The owner of all types of one program.
#[derive(Clone, Debug)]
pub struct TypeArena {
    types: Vec<DataType>,
}

impl Default for TypeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeArena {
    /// Every arena holds `void` at this index
    pub const VOID: TypeId = TypeId(0);

    pub fn new() -> Self {
        Self {
            types: vec![DataType::Void],
        }
    }

    pub fn insert(&mut self, typ: DataType) -> TypeId {
        let id = TypeId(self.types.len());
        self.types.push(typ);
        id
    }

    /// Allocate a slot whose contents will be provided later via [`Self::set`]. Until then, the
    /// slot reads as `void`.
    pub fn reserve(&mut self) -> TypeId {
        self.insert(DataType::Void)
    }

    pub fn set(&mut self, id: TypeId, typ: DataType) {
        assert!(id != Self::VOID, "Cannot overwrite the shared void type");
        self.types[id.0] = typ;
    }

    pub fn get(&self, id: TypeId) -> &DataType {
        &self.types[id.0]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// A view of the type at `id`
    pub fn ty(&self, id: TypeId) -> Ty<'_> {
        Ty {
            types: self,
            id: Some(id),
            dtype: Cow::Borrowed(&self.types[id.0]),
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.types.len()).map(TypeId)
    }
}

impl std::ops::Index<TypeId> for TypeArena {
    type Output = DataType;
    fn index(&self, id: TypeId) -> &DataType {
        self.get(id)
    }
}

/// A data type together with the arena its sub-types live in. Either refers to a type stored in
/// the arena, or to a type synthesized on the fly (struct padding, sub-arrays, union
/// placeholders), whose own references still point into the same arena.
#[derive(Clone)]
pub struct Ty<'a> {
    types: &'a TypeArena,
    id: Option<TypeId>,
    dtype: Cow<'a, DataType>,
}

impl<'a> std::fmt::Debug for Ty<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.id {
            Some(id) => write!(f, "{}:{}", id.to_string(), self),
            None => write!(f, "~{}", self),
        }
    }
}

impl<'a> Ty<'a> {
    pub fn arena(&self) -> &'a TypeArena {
        self.types
    }

    /// The arena slot of this type; `None` for synthesized types
    pub fn id(&self) -> Option<TypeId> {
        self.id
    }

    pub fn data(&self) -> &DataType {
        &self.dtype
    }

    fn sub(&self, id: TypeId) -> Ty<'a> {
        self.types.ty(id)
    }

    fn synthesized(&self, dtype: DataType) -> Ty<'a> {
        Ty {
            types: self.types,
            id: None,
            dtype: Cow::Owned(dtype),
        }
    }

    pub fn metatype(&self) -> MetaType {
        self.dtype.metatype()
    }

    pub fn size(&self) -> usize {
        self.dtype.size()
    }

    pub fn is_primitive(&self) -> bool {
        self.dtype.is_primitive()
    }

    pub fn is_complex(&self) -> bool {
        self.dtype.is_complex()
    }

    /// Same metatype and same size
    pub fn rough_match(&self, other: &Ty<'_>) -> bool {
        self.metatype() == other.metatype() && self.size() == other.size()
    }

    /// Structural equality, which may compare types living in different arenas. Pointers only
    /// compare their base types roughly, so self-referential types are safe to compare.
    pub fn exact_eq(&self, other: &Ty<'_>) -> bool {
        if !self.rough_match(other) {
            return false;
        }
        match (self.data(), other.data()) {
            (DataType::Int { signed: s1, .. }, DataType::Int { signed: s2, .. }) => s1 == s2,
            (DataType::Pointer { basetype: b1, .. }, DataType::Pointer { basetype: b2, .. }) => {
                self.sub(*b1).rough_match(&other.sub(*b2))
            }
            (
                DataType::Array {
                    basetype: b1,
                    dimensions: d1,
                    ..
                },
                DataType::Array {
                    basetype: b2,
                    dimensions: d2,
                    ..
                },
            ) => d1 == d2 && self.sub(*b1).exact_eq(&other.sub(*b2)),
            (DataType::Struct { members: m1, .. }, DataType::Struct { members: m2, .. }) => {
                m1.len() == m2.len()
                    && m1
                        .iter()
                        .zip(m2.iter())
                        .all(|((o1, t1), (o2, t2))| {
                            o1 == o2 && self.sub(*t1).exact_eq(&other.sub(*t2))
                        })
            }
            (DataType::Union { members: m1, .. }, DataType::Union { members: m2, .. }) => {
                m1.len() == m2.len()
                    && m1
                        .iter()
                        .zip(m2.iter())
                        .all(|(t1, t2)| self.sub(*t1).exact_eq(&other.sub(*t2)))
            }
            (
                DataType::FunctionPrototype {
                    rettype: r1,
                    paramtypes: p1,
                    variadic: v1,
                },
                DataType::FunctionPrototype {
                    rettype: r2,
                    paramtypes: p2,
                    variadic: v2,
                },
            ) => {
                v1 == v2
                    && p1.len() == p2.len()
                    && self.sub(*r1).exact_eq(&other.sub(*r2))
                    && p1
                        .iter()
                        .zip(p2.iter())
                        .all(|(t1, t2)| self.sub(*t1).exact_eq(&other.sub(*t2)))
            }
            _ => true,
        }
    }

    /// Either exact equality or rough match, depending on `exact_match`
    pub fn matches(&self, other: &Ty<'_>, exact_match: bool) -> bool {
        if exact_match {
            self.exact_eq(other)
        } else {
            self.rough_match(other)
        }
    }

    pub fn basetype(&self) -> Option<Ty<'a>> {
        match self.data() {
            DataType::Pointer { basetype, .. } | DataType::Array { basetype, .. } => {
                Some(self.sub(*basetype))
            }
            _ => None,
        }
    }

    /// Number of elements of an array. Without known dimensions, this is derived from its size.
    pub fn num_elements(&self) -> Option<usize> {
        match self.data() {
            DataType::Array {
                basetype,
                dimensions,
                size,
            } => {
                if dimensions.is_empty() {
                    let bs = self.sub(*basetype).size();
                    Some(if bs == 0 { 0 } else { size / bs })
                } else {
                    Some(dimensions.iter().map(|d| *d as usize).product())
                }
            }
            _ => None,
        }
    }

    /// Members of a struct in order, with every gap (including a leading or trailing gap)
    /// filled by an `undefined` member.
    pub fn members_with_padding(&self) -> Vec<(usize, Ty<'a>)> {
        let (members, size) = match self.data() {
            DataType::Struct { members, size, .. } => (members.clone(), *size),
            _ => return vec![],
        };
        let mut res = vec![];
        let mut cursor = 0;
        for (offset, id) in members {
            if offset > cursor {
                res.push((
                    cursor,
                    self.synthesized(DataType::Undefined {
                        size: offset - cursor,
                    }),
                ));
            }
            let member = self.sub(id);
            cursor = cursor.max(offset + member.size());
            res.push((offset, member));
        }
        if size > cursor {
            res.push((
                cursor,
                self.synthesized(DataType::Undefined {
                    size: size - cursor,
                }),
            ));
        }
        res
    }

    /// Decompose into `(offset, primitive)` pairs. A union cannot be decomposed statically, and
    /// yields a single `undefined` of its size; a function prototype yields nothing.
    pub fn flatten(&self) -> Box<dyn Iterator<Item = (usize, Ty<'a>)> + 'a> {
        match self.data() {
            DataType::Int { .. }
            | DataType::Float { .. }
            | DataType::Undefined { .. }
            | DataType::Void
            | DataType::Pointer { .. } => Box::new(std::iter::once((0, self.clone()))),
            DataType::Array { basetype, .. } => {
                let base = self.sub(*basetype);
                let stride = base.size();
                let n = self.num_elements().unwrap_or(0);
                Box::new((0..n).flat_map(move |i| {
                    base.flatten()
                        .map(move |(off, prim)| (i * stride + off, prim))
                }))
            }
            DataType::Struct { members, .. } => {
                let types = self.types;
                let members = members.clone();
                Box::new(members.into_iter().flat_map(move |(offset, id)| {
                    types
                        .ty(id)
                        .flatten()
                        .map(move |(off, prim)| (offset + off, prim))
                }))
            }
            DataType::Union { size, .. } => {
                let placeholder = self.synthesized(DataType::Undefined { size: *size });
                Box::new(std::iter::once((0, placeholder)))
            }
            DataType::FunctionPrototype { .. } => Box::new(std::iter::empty()),
        }
    }

    /// The immediate sub-component starting exactly at `offset`, of at most `size` bytes if a
    /// size is requested. An array can produce a synthesized sub-array spanning several elements.
    pub fn find_component_at_offset(
        &self,
        offset: usize,
        size: Option<usize>,
    ) -> Option<DescentRecord<'a>> {
        match self.data() {
            DataType::Array {
                basetype,
                size: total,
                ..
            } => {
                let base = self.sub(*basetype);
                let bs = base.size();
                let n = self.num_elements()?;
                if bs == 0 || self.is_dimension_unknown() {
                    return None;
                }
                if offset % bs != 0 || offset >= *total {
                    return None;
                }
                if let Some(size) = size {
                    if size % bs != 0 || offset + size > *total {
                        return None;
                    }
                    let sublength = size / bs;
                    if 1 < sublength && sublength < n {
                        let subarray = self.synthesized(DataType::Array {
                            basetype: *basetype,
                            dimensions: vec![sublength as u32],
                            size: sublength * bs,
                        });
                        return Some(DescentRecord {
                            relationship: Relationship::Subset,
                            offset,
                            dtype: subarray,
                        });
                    }
                }
                Some(DescentRecord {
                    relationship: Relationship::ArrayElement,
                    offset,
                    dtype: base,
                })
            }
            DataType::Struct { .. } => {
                for (member_offset, member) in self.members_with_padding() {
                    if member_offset == offset {
                        if size.map(|s| s <= member.size()).unwrap_or(true) {
                            return Some(DescentRecord {
                                relationship: Relationship::StructMember,
                                offset,
                                dtype: member,
                            });
                        }
                        return None;
                    }
                    if member_offset > offset {
                        break;
                    }
                }
                None
            }
            _ => None,
        }
    }

    /// The immediate sub-component whose extent contains `offset`. For arrays, rounds down to the
    /// start of the element.
    pub fn find_component_containing_offset(&self, offset: usize) -> Option<DescentRecord<'a>> {
        match self.data() {
            DataType::Array {
                basetype,
                size: total,
                ..
            } => {
                let base = self.sub(*basetype);
                let bs = base.size();
                if bs == 0 || self.is_dimension_unknown() || offset >= *total {
                    return None;
                }
                Some(DescentRecord {
                    relationship: Relationship::ArrayElement,
                    offset: offset - offset % bs,
                    dtype: base,
                })
            }
            DataType::Struct { .. } => self
                .members_with_padding()
                .into_iter()
                .find(|(member_offset, member)| {
                    *member_offset <= offset && offset < member_offset + member.size()
                })
                .map(|(member_offset, member)| DescentRecord {
                    relationship: Relationship::StructMember,
                    offset: member_offset,
                    dtype: member,
                }),
            _ => None,
        }
    }

    fn is_dimension_unknown(&self) -> bool {
        matches!(self.data(), DataType::Array { dimensions, .. } if dimensions.is_empty())
    }

    /// The path of sub-components leading to `match_type` (or to whatever lives at `offset`, if
    /// no type is being matched). An empty path means `self` matched.
    pub fn type_at_offset_recursive(
        &self,
        offset: usize,
        match_type: Option<&Ty<'_>>,
        exact_match: bool,
    ) -> Option<Vec<DescentRecord<'a>>> {
        if offset == 0
            && match_type
                .map(|m| self.exact_eq(m) || (!exact_match && self.rough_match(m)))
                .unwrap_or(true)
        {
            return Some(vec![]);
        }

        if let DataType::Union { members, .. } = self.data() {
            // All members live at offset 0
            for id in members.iter() {
                let member = self.sub(*id);
                if let Some(rest) = member.type_at_offset_recursive(offset, match_type, exact_match)
                {
                    let mut path = vec![DescentRecord {
                        relationship: Relationship::UnionMember,
                        offset: 0,
                        dtype: member,
                    }];
                    path.extend(rest);
                    return Some(path);
                }
            }
            return None;
        }

        if !self.is_complex() {
            return None;
        }

        let record = self
            .find_component_at_offset(offset, match_type.map(|m| m.size()))
            .or_else(|| self.find_component_containing_offset(offset))?;
        let rest =
            record
                .dtype
                .type_at_offset_recursive(offset - record.offset, match_type, exact_match)?;
        let mut path = vec![record];
        path.extend(rest);
        Some(path)
    }
}

impl<'a, 'b> PartialEq<Ty<'b>> for Ty<'a> {
    fn eq(&self, other: &Ty<'b>) -> bool {
        self.exact_eq(other)
    }
}

impl<'a> std::fmt::Display for Ty<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.data() {
            DataType::Int { size: 1, signed } => {
                write!(f, "{}char", if *signed { "" } else { "unsigned " })
            }
            DataType::Int { size, signed } => {
                write!(f, "{}int{}", if *signed { "" } else { "unsigned " }, size)
            }
            DataType::Float { size } => write!(f, "float{}", size),
            DataType::Undefined { size } => write!(f, "undefined{}", size),
            DataType::Void => write!(f, "void"),
            DataType::Pointer { basetype, .. } => match self.sub(*basetype).data() {
                // Do not chase the pointee's members; they may lead back here
                DataType::Struct { name, .. } => write!(f, "struct {} *", name),
                DataType::Union { name, .. } => write!(f, "union {} *", name),
                DataType::FunctionPrototype { .. } => write!(f, "code *"),
                _ => write!(f, "{} *", self.sub(*basetype)),
            },
            DataType::Array {
                basetype,
                dimensions,
                ..
            } => {
                write!(f, "{}", self.sub(*basetype))?;
                if dimensions.is_empty() {
                    write!(f, "[]")?;
                }
                for d in dimensions {
                    write!(f, "[{}]", d)?;
                }
                Ok(())
            }
            DataType::Struct {
                name,
                members,
                size,
            } => write!(f, "struct {} ({} members, size {})", name, members.len(), size),
            DataType::Union {
                name,
                members,
                size,
            } => write!(f, "union {} ({} members, size {})", name, members.len(), size),
            DataType::FunctionPrototype {
                rettype,
                paramtypes,
                variadic,
            } => {
                write!(f, "(")?;
                for (i, p) in paramtypes.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.sub(*p))?;
                }
                if *variadic {
                    write!(f, "{}...", if paramtypes.is_empty() { "" } else { ", " })?;
                }
                write!(f, ") -> {}", self.sub(*rettype))
            }
        }
    }
}

/// How a [`DescentRecord`] relates to its parent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Relationship {
    ArrayElement,
    StructMember,
    UnionMember,
    /// A contiguous part of the parent, such as a sub-array
    Subset,
}

/// One step into a composite type
#[derive(Clone, Debug)]
pub struct DescentRecord<'a> {
    pub relationship: Relationship,
    /// Offset from the start of the immediate parent
    pub offset: usize,
    pub dtype: Ty<'a>,
}

/// A path from a root type down to a sub-component
#[derive(Clone, Debug)]
pub struct DataTypeRecursiveDescent<'a> {
    pub root: Ty<'a>,
    pub path: Vec<DescentRecord<'a>>,
}

impl<'a> DataTypeRecursiveDescent<'a> {
    /// Find `match_type` (or anything, if `None`) at `offset` within `root`
    pub fn descend_find_type_at_offset_recursive(
        root: &Ty<'a>,
        offset: usize,
        match_type: Option<&Ty<'_>>,
        exact_match: bool,
    ) -> Option<Self> {
        let path = root.type_at_offset_recursive(offset, match_type, exact_match)?;
        Some(Self {
            root: root.clone(),
            path,
        })
    }

    /// The root itself matched
    pub fn no_descent(&self) -> bool {
        self.path.is_empty()
    }

    pub fn leaf(&self) -> Option<&DescentRecord<'a>> {
        self.path.last()
    }

    pub fn total_offset(&self) -> usize {
        self.path.iter().map(|r| r.offset).sum()
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

impl TypeArena {
    /// Render the type graph as GraphViz.
    pub fn write_dot<W: std::io::Write>(&self, w: &mut W) -> std::io::Result<()> {
        type Node = TypeId;
        type Edge = (TypeId, TypeId, String);

        struct Graph<'a> {
            types: &'a TypeArena,
        }

        impl<'a> dot::Labeller<'a, Node, Edge> for Graph<'a> {
            fn graph_id(&'a self) -> dot::Id<'a> {
                dot::Id::new("Types").unwrap()
            }
            fn node_id(&'a self, n: &Node) -> dot::Id<'a> {
                dot::Id::new(n.to_string()).unwrap()
            }
            fn node_label<'b>(&'b self, n: &Node) -> dot::LabelText<'b> {
                dot::LabelText::label(format!("{}: {}", n.to_string(), self.types.ty(*n)))
            }
            fn edge_label<'b>(&'b self, e: &Edge) -> dot::LabelText<'b> {
                dot::LabelText::label(e.2.clone())
            }
        }

        impl<'a> dot::GraphWalk<'a, Node, Edge> for Graph<'a> {
            fn nodes(&self) -> dot::Nodes<'a, Node> {
                self.types.ids().collect::<Vec<_>>().into()
            }
            fn edges(&'a self) -> dot::Edges<'a, Edge> {
                let mut edges: Vec<Edge> = vec![];
                for id in self.types.ids() {
                    match self.types.get(id) {
                        DataType::Pointer { basetype, .. } => {
                            edges.push((id, *basetype, "pointer_to".into()))
                        }
                        DataType::Array { basetype, .. } => {
                            edges.push((id, *basetype, "element".into()))
                        }
                        DataType::Struct { members, .. } => {
                            for (offset, m) in members {
                                edges.push((id, *m, format!("member_{}", offset)));
                            }
                        }
                        DataType::Union { members, .. } => {
                            for m in members {
                                edges.push((id, *m, "union_member".into()));
                            }
                        }
                        DataType::FunctionPrototype {
                            rettype,
                            paramtypes,
                            ..
                        } => {
                            edges.push((id, *rettype, "returns".into()));
                            for (i, p) in paramtypes.iter().enumerate() {
                                edges.push((id, *p, format!("param_{}", i)));
                            }
                        }
                        DataType::Int { .. }
                        | DataType::Float { .. }
                        | DataType::Undefined { .. }
                        | DataType::Void => {}
                    }
                }
                edges.into()
            }
            fn source(&self, e: &Edge) -> Node {
                e.0
            }
            fn target(&self, e: &Edge) -> Node {
                e.1
            }
        }

        dot::render(&Graph { types: self }, w)
    }

    /// Generate a `.dot` file representing these types
    pub fn generate_dot(&self) -> String {
        let mut s: Vec<u8> = vec![];
        self.write_dot(&mut s)
            .expect("writing to a Vec cannot fail");
        String::from_utf8_lossy(&s).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(types: &mut TypeArena, size: usize) -> TypeId {
        types.insert(DataType::Int { size, signed: true })
    }

    /// `struct { int4; char; /* 3 bytes padding */ int8[2] }`
    fn padded_struct(types: &mut TypeArena) -> TypeId {
        let i4 = int(types, 4);
        let c = int(types, 1);
        let i8 = int(types, 8);
        let arr = types.insert(DataType::Array {
            basetype: i8,
            dimensions: vec![2],
            size: 16,
        });
        types.insert(DataType::Struct {
            name: "padded".into(),
            members: vec![(0, i4), (4, c), (8, arr)],
            size: 24,
        })
    }

    #[test]
    fn primitive_classification() {
        let mut types = TypeArena::new();
        let i = int(&mut types, 4);
        let p = types.insert(DataType::Pointer {
            basetype: i,
            size: 8,
        });
        assert!(types.ty(p).is_primitive());
        assert!(!types.ty(p).is_complex());
        assert!(types.ty(TypeArena::VOID).is_primitive());
        assert_eq!(types.ty(TypeArena::VOID).size(), 0);
        let proto = types.insert(DataType::FunctionPrototype {
            rettype: TypeArena::VOID,
            paramtypes: vec![i],
            variadic: false,
        });
        assert!(types.ty(proto).is_complex());
        assert!(!types[proto].is_sized());
        assert_eq!(types.ty(proto).flatten().count(), 0);
    }

    #[test]
    fn equality_across_arenas() {
        let mut a = TypeArena::new();
        let mut b = TypeArena::new();
        let sa = padded_struct(&mut a);
        // Put some noise first so that indices differ between the arenas
        b.insert(DataType::Float { size: 4 });
        let sb = padded_struct(&mut b);
        assert!(a.ty(sa) == b.ty(sb));

        let signed = a.insert(DataType::Int {
            size: 4,
            signed: true,
        });
        let unsigned = b.insert(DataType::Int {
            size: 4,
            signed: false,
        });
        assert!(a.ty(signed).rough_match(&b.ty(unsigned)));
        assert!(a.ty(signed) != b.ty(unsigned));
    }

    #[test]
    fn pointer_equality_is_rough_on_the_pointee() {
        let mut types = TypeArena::new();
        let i = int(&mut types, 4);
        let f = types.insert(DataType::Float { size: 4 });
        let u = types.insert(DataType::Undefined { size: 4 });
        let pi = types.insert(DataType::Pointer {
            basetype: i,
            size: 8,
        });
        let pf = types.insert(DataType::Pointer {
            basetype: f,
            size: 8,
        });
        let pu = types.insert(DataType::Pointer {
            basetype: u,
            size: 8,
        });
        assert!(types.ty(pi) != types.ty(pf));
        assert!(types.ty(pu) != types.ty(pi));
        let pi2 = types.insert(DataType::Pointer {
            basetype: i,
            size: 8,
        });
        assert!(types.ty(pi) == types.ty(pi2));
    }

    #[test]
    fn padding_fills_gaps() {
        let mut types = TypeArena::new();
        let s = padded_struct(&mut types);
        let padded: Vec<(usize, usize, MetaType)> = types
            .ty(s)
            .members_with_padding()
            .into_iter()
            .map(|(o, t)| (o, t.size(), t.metatype()))
            .collect();
        assert_eq!(
            padded,
            vec![
                (0, 4, MetaType::Int),
                (4, 1, MetaType::Int),
                (5, 3, MetaType::Undefined),
                (8, 16, MetaType::Array),
            ]
        );
    }

    #[test]
    fn leading_and_trailing_padding() {
        let mut types = TypeArena::new();
        let i = int(&mut types, 4);
        let s = types.insert(DataType::Struct {
            name: "gappy".into(),
            members: vec![(4, i)],
            size: 12,
        });
        let padded: Vec<(usize, usize)> = types
            .ty(s)
            .members_with_padding()
            .into_iter()
            .map(|(o, t)| (o, t.size()))
            .collect();
        assert_eq!(padded, vec![(0, 4), (4, 4), (8, 4)]);
    }

    #[test]
    fn flatten_offsets() {
        let mut types = TypeArena::new();
        let s = padded_struct(&mut types);
        let flat: Vec<(usize, usize)> = types
            .ty(s)
            .flatten()
            .map(|(o, t)| (o, t.size()))
            .collect();
        assert_eq!(flat, vec![(0, 4), (4, 1), (8, 8), (16, 8)]);
    }

    #[test]
    fn flatten_size_conservation() {
        let mut types = TypeArena::new();
        let i4 = int(&mut types, 4);
        let f8 = types.insert(DataType::Float { size: 8 });
        let inner = types.insert(DataType::Struct {
            name: "inner".into(),
            members: vec![(0, i4), (4, i4)],
            size: 8,
        });
        let arr = types.insert(DataType::Array {
            basetype: inner,
            dimensions: vec![2, 3],
            size: 48,
        });
        let un = types.insert(DataType::Union {
            name: "u".into(),
            members: vec![i4, f8],
            size: 8,
        });
        let outer = types.insert(DataType::Struct {
            name: "outer".into(),
            members: vec![(0, arr), (48, un), (56, f8)],
            size: 64,
        });
        for id in [i4, f8, inner, arr, un, outer] {
            let t = types.ty(id);
            let total: usize = t.flatten().map(|(_, p)| p.size()).sum();
            assert_eq!(total, t.size(), "{}", t);
            assert!(t.flatten().all(|(_, p)| p.is_primitive()));
        }
        // A union is a single placeholder
        let flat: Vec<_> = types.ty(un).flatten().collect();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].1.metatype(), MetaType::Undefined);
        assert_eq!(flat[0].1.size(), 8);
        assert!(flat[0].1.id().is_none());
    }

    #[test]
    fn descent_round_trip() {
        let mut types = TypeArena::new();
        let s = padded_struct(&mut types);
        let i4 = int(&mut types, 4);
        let nested_arr = types.insert(DataType::Array {
            basetype: s,
            dimensions: vec![3],
            size: 72,
        });
        let outer = types.insert(DataType::Struct {
            name: "outer".into(),
            members: vec![(0, i4), (8, nested_arr)],
            size: 80,
        });
        for root in [s, nested_arr, outer] {
            let root = types.ty(root);
            for (offset, leaf) in root.flatten() {
                let d = DataTypeRecursiveDescent::descend_find_type_at_offset_recursive(
                    &root,
                    offset,
                    Some(&leaf),
                    true,
                )
                .unwrap();
                assert!(!d.no_descent());
                assert!(d.leaf().unwrap().dtype == leaf);
                assert_eq!(d.total_offset(), offset);
            }
        }
    }

    #[test]
    fn descent_selects_second_member() {
        let mut types = TypeArena::new();
        let i4 = int(&mut types, 4);
        let s = types.insert(DataType::Struct {
            name: "pair".into(),
            members: vec![(0, i4), (4, i4)],
            size: 8,
        });
        let root = types.ty(s);
        let d = DataTypeRecursiveDescent::descend_find_type_at_offset_recursive(
            &root,
            4,
            Some(&types.ty(i4)),
            false,
        )
        .unwrap();
        assert_eq!(d.depth(), 1);
        assert_eq!(d.path[0].relationship, Relationship::StructMember);
        assert_eq!(d.path[0].offset, 4);
    }

    #[test]
    fn descent_without_match_type_stops_at_offset() {
        let mut types = TypeArena::new();
        let s = padded_struct(&mut types);
        let root = types.ty(s);
        let d =
            DataTypeRecursiveDescent::descend_find_type_at_offset_recursive(&root, 0, None, false)
                .unwrap();
        assert!(d.no_descent());
        // Offset 6 lands in the padding after the char
        let d =
            DataTypeRecursiveDescent::descend_find_type_at_offset_recursive(&root, 6, None, false);
        assert!(d.is_none());
        let d =
            DataTypeRecursiveDescent::descend_find_type_at_offset_recursive(&root, 5, None, false)
                .unwrap();
        assert_eq!(d.leaf().unwrap().dtype.metatype(), MetaType::Undefined);
    }

    #[test]
    fn subarray_lookup() {
        let mut types = TypeArena::new();
        let i4 = int(&mut types, 4);
        let arr = types.insert(DataType::Array {
            basetype: i4,
            dimensions: vec![8],
            size: 32,
        });
        let a = types.ty(arr);
        let r = a.find_component_at_offset(8, Some(12)).unwrap();
        assert_eq!(r.relationship, Relationship::Subset);
        assert_eq!(r.dtype.size(), 12);
        assert_eq!(r.dtype.num_elements(), Some(3));

        let r = a.find_component_at_offset(8, Some(4)).unwrap();
        assert_eq!(r.relationship, Relationship::ArrayElement);

        assert!(a.find_component_at_offset(6, None).is_none());
        assert!(a.find_component_at_offset(32, None).is_none());
        assert!(a.find_component_at_offset(24, Some(12)).is_none());
        assert!(a.find_component_at_offset(0, Some(6)).is_none());

        let r = a.find_component_containing_offset(6).unwrap();
        assert_eq!(r.offset, 4);

        // A sub-array type is found through descent
        let mut other = TypeArena::new();
        let j4 = int(&mut other, 4);
        let sub = other.insert(DataType::Array {
            basetype: j4,
            dimensions: vec![3],
            size: 12,
        });
        let d = DataTypeRecursiveDescent::descend_find_type_at_offset_recursive(
            &a,
            8,
            Some(&other.ty(sub)),
            true,
        )
        .unwrap();
        assert_eq!(d.depth(), 1);
        assert_eq!(d.path[0].relationship, Relationship::Subset);
    }

    #[test]
    fn union_descent_tries_every_member() {
        let mut types = TypeArena::new();
        let i4 = int(&mut types, 4);
        let f8 = types.insert(DataType::Float { size: 8 });
        let s = types.insert(DataType::Struct {
            name: "s".into(),
            members: vec![(0, i4), (4, i4)],
            size: 8,
        });
        let un = types.insert(DataType::Union {
            name: "u".into(),
            members: vec![f8, s],
            size: 8,
        });
        let root = types.ty(un);
        let d = DataTypeRecursiveDescent::descend_find_type_at_offset_recursive(
            &root,
            4,
            Some(&types.ty(i4)),
            true,
        )
        .unwrap();
        assert_eq!(d.depth(), 2);
        assert_eq!(d.path[0].relationship, Relationship::UnionMember);
        assert_eq!(d.path[0].offset, 0);
        assert!(d.path[0].dtype.id() == Some(s));
        assert_eq!(d.total_offset(), 4);

        let d = DataTypeRecursiveDescent::descend_find_type_at_offset_recursive(
            &root,
            0,
            Some(&types.ty(f8)),
            true,
        )
        .unwrap();
        assert_eq!(d.depth(), 1);
    }

    #[test]
    fn struct_size_derivation() {
        assert_eq!(DataType::derived_struct_size(None, true), 0);
        assert_eq!(DataType::derived_struct_size(Some(5), true), 8);
        assert_eq!(DataType::derived_struct_size(Some(8), true), 8);
        assert_eq!(DataType::derived_struct_size(Some(5), false), 5);
    }

    #[test]
    fn self_referential_display_terminates() {
        let mut types = TypeArena::new();
        let node = types.reserve();
        let ptr = types.insert(DataType::Pointer {
            basetype: node,
            size: 8,
        });
        let i4 = int(&mut types, 4);
        types.set(
            node,
            DataType::Struct {
                name: "node".into(),
                members: vec![(0, i4), (8, ptr)],
                size: 16,
            },
        );
        assert_eq!(format!("{}", types.ty(ptr)), "struct node *");
        assert!(types.ty(node) == types.ty(node));
        let dot = types.generate_dot();
        assert!(dot.contains("pointer_to"));
        assert!(dot.contains("member_8"));
    }
}
