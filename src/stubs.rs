//! Concrete stubs for programs, functions, variables and data types, resolving into a
//! [`ProgramInfo`].
//!
//! `Typedef`, `Enum`, `Qualifier` and `String` stubs are transparent: they resolve to the type
//! they alias, and never become a [`DataType`] of their own.

use serde::{Deserialize, Serialize};

use crate::address::{Address, AddressLiveRange};
use crate::compare_config::CONFIG;
use crate::datatype::{DataType, TypeArena, TypeId};
use crate::errors::{Error, Result};
use crate::lang::{Function, FunctionId, ProgramInfo, VarId, Variable};
use crate::log::*;
use crate::resolve::{Resolver, ResolverDatabase, Stub};

/// Stubs are keyed by their name in the input table
pub type StubKey = String;

/// A resolved object within a [`ProgramInfo`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handle {
    /// The program itself
    Program,
    Function(FunctionId),
    Variable(VarId),
    Type(TypeId),
}

impl Handle {
    fn type_id(self, key: &StubKey) -> Result<TypeId> {
        match self {
            Handle::Type(t) => Ok(t),
            _ => Err(Error::UnexpectedObject {
                key: key.clone(),
                expected: "data type",
            }),
        }
    }

    fn var_id(self, key: &StubKey) -> Result<VarId> {
        match self {
            Handle::Variable(v) => Ok(v),
            _ => Err(Error::UnexpectedObject {
                key: key.clone(),
                expected: "variable",
            }),
        }
    }

    fn function_id(self, key: &StubKey) -> Result<FunctionId> {
        match self {
            Handle::Function(f) => Ok(f),
            _ => Err(Error::UnexpectedObject {
                key: key.clone(),
                expected: "function",
            }),
        }
    }
}

/// A live range as described in a stub table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveRangeStub {
    pub addr: Address,
    #[serde(default)]
    pub startpc: Option<u64>,
    #[serde(default)]
    pub endpc: Option<u64>,
}

fn signed_default() -> bool {
    true
}

/// A flattened description of one object of a program
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "objtype")]
pub enum ProgramStub {
    ProgramInfo {
        #[serde(default)]
        globalrefs: Vec<StubKey>,
        #[serde(default)]
        functionrefs: Vec<StubKey>,
    },
    Function {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        startaddr: Option<u64>,
        #[serde(default)]
        endaddr: Option<u64>,
        #[serde(default)]
        rettyperef: Option<StubKey>,
        #[serde(default)]
        paramrefs: Vec<StubKey>,
        #[serde(default)]
        varrefs: Vec<StubKey>,
        #[serde(default)]
        variadic: bool,
    },
    Variable {
        #[serde(default)]
        name: Option<String>,
        dtyperef: StubKey,
        #[serde(default)]
        liveranges: Vec<LiveRangeStub>,
        #[serde(default)]
        param: bool,
        #[serde(default)]
        functionref: Option<StubKey>,
    },
    DataTypeInt {
        size: usize,
        #[serde(default = "signed_default")]
        signed: bool,
    },
    DataTypeFloat {
        size: usize,
    },
    DataTypeUndefined {
        size: usize,
    },
    DataTypeVoid,
    DataTypePointer {
        basetyperef: StubKey,
        size: usize,
    },
    DataTypeArray {
        basetyperef: StubKey,
        #[serde(default)]
        dimensions: Vec<u32>,
        #[serde(default)]
        size: Option<usize>,
    },
    DataTypeStruct {
        #[serde(default)]
        name: String,
        /// `(offset, member type)` pairs
        #[serde(default)]
        membertyperef_offsets: Vec<(usize, StubKey)>,
        #[serde(default)]
        size: Option<usize>,
    },
    DataTypeUnion {
        #[serde(default)]
        name: String,
        #[serde(default)]
        membertyperefs: Vec<StubKey>,
        #[serde(default)]
        size: Option<usize>,
    },
    DataTypeFunctionPrototype {
        #[serde(default)]
        rettyperef: Option<StubKey>,
        #[serde(default)]
        paramtyperefs: Vec<StubKey>,
        #[serde(default)]
        variadic: bool,
    },
    /// A typedef without a base type aliases `void`
    DataTypeTypedef {
        #[serde(default)]
        name: String,
        #[serde(default)]
        basetyperef: Option<StubKey>,
    },
    DataTypeEnum {
        basetyperef: StubKey,
    },
    DataTypeQualifier {
        basetyperef: StubKey,
    },
    /// Aliases its character (or array) type if one is given; otherwise it is opaque bytes
    DataTypeString {
        #[serde(default)]
        basetyperef: Option<StubKey>,
        #[serde(default)]
        size: Option<usize>,
    },
}

/// The resolver database that front ends fill in
pub type ProgramResolverDatabase = ResolverDatabase<StubKey, ProgramStub>;

/// A resolution session over a [`ProgramResolverDatabase`]
pub type ProgramResolver<'db> = Resolver<'db, StubKey, ProgramStub>;

impl ProgramStub {
    pub fn is_root(&self) -> bool {
        matches!(self, ProgramStub::ProgramInfo { .. })
    }

    /// The `objtype` tag this stub is written with
    /// The size given explicitly in the stub, if any
    pub fn declared_size(&self) -> Option<usize> {
        match self {
            ProgramStub::DataTypeInt { size, .. }
            | ProgramStub::DataTypeFloat { size }
            | ProgramStub::DataTypeUndefined { size }
            | ProgramStub::DataTypePointer { size, .. } => Some(*size),
            ProgramStub::DataTypeArray { size, .. }
            | ProgramStub::DataTypeStruct { size, .. }
            | ProgramStub::DataTypeUnion { size, .. }
            | ProgramStub::DataTypeString { size, .. } => *size,
            _ => None,
        }
    }

    pub fn objtype(&self) -> &'static str {
        match self {
            ProgramStub::ProgramInfo { .. } => "ProgramInfo",
            ProgramStub::Function { .. } => "Function",
            ProgramStub::Variable { .. } => "Variable",
            ProgramStub::DataTypeInt { .. } => "DataTypeInt",
            ProgramStub::DataTypeFloat { .. } => "DataTypeFloat",
            ProgramStub::DataTypeUndefined { .. } => "DataTypeUndefined",
            ProgramStub::DataTypeVoid => "DataTypeVoid",
            ProgramStub::DataTypePointer { .. } => "DataTypePointer",
            ProgramStub::DataTypeArray { .. } => "DataTypeArray",
            ProgramStub::DataTypeStruct { .. } => "DataTypeStruct",
            ProgramStub::DataTypeUnion { .. } => "DataTypeUnion",
            ProgramStub::DataTypeFunctionPrototype { .. } => "DataTypeFunctionPrototype",
            ProgramStub::DataTypeTypedef { .. } => "DataTypeTypedef",
            ProgramStub::DataTypeEnum { .. } => "DataTypeEnum",
            ProgramStub::DataTypeQualifier { .. } => "DataTypeQualifier",
            ProgramStub::DataTypeString { .. } => "DataTypeString",
        }
    }
}

fn resolve_type(r: &mut ProgramResolver<'_>, key: &StubKey) -> Result<TypeId> {
    r.resolve(key)?.type_id(key)
}

fn resolve_optional_type(r: &mut ProgramResolver<'_>, key: &Option<StubKey>) -> Result<TypeId> {
    match key {
        Some(k) => resolve_type(r, k),
        None => Ok(TypeArena::VOID),
    }
}

fn resolve_types(r: &mut ProgramResolver<'_>, keys: &[StubKey]) -> Result<Vec<TypeId>> {
    keys.iter().map(|k| resolve_type(r, k)).collect()
}

/// Resolves variables, dropping those of size zero if so configured
fn resolve_variables(r: &mut ProgramResolver<'_>, keys: &[StubKey]) -> Result<Vec<VarId>> {
    let mut res = vec![];
    for k in keys {
        let id = r.resolve(k)?.var_id(k)?;
        if r.is_resolving(k) {
            // Reached again through its own function; only the placeholder exists so far
            trace!("Keeping variable still being resolved"; "key" => %k);
        } else if CONFIG.filter_zero_sized_variables
            && r.arena.variable(id).size(&r.arena.types) == 0
        {
            debug!("Dropping zero-sized variable"; "key" => %k);
            continue;
        }
        res.push(id);
    }
    Ok(res)
}

/// Size of the type at `key`, resolved to `id`. A type still being resolved has no size in the
/// arena yet, so its declared size is used instead, if it has one.
fn component_size(r: &ProgramResolver<'_>, key: &StubKey, id: TypeId) -> usize {
    if !r.is_resolving(key) {
        return r.arena.types.get(id).size();
    }
    let declared = r
        .dealias(key)
        .ok()
        .and_then(|k| r.db().lookup(k))
        .and_then(|stub| stub.declared_size());
    match declared {
        Some(size) => size,
        None => {
            debug!("Component still being resolved, counting it as empty"; "key" => %key);
            0
        }
    }
}

fn set_type(r: &mut ProgramResolver<'_>, handle: Handle, dtype: DataType) {
    if let Handle::Type(id) = handle {
        if id != TypeArena::VOID {
            r.arena.types.set(id, dtype);
        }
    }
}

impl Stub<StubKey> for ProgramStub {
    type Arena = ProgramInfo;
    type Handle = Handle;

    fn alias_of(&self) -> Option<&StubKey> {
        match self {
            ProgramStub::DataTypeTypedef { basetyperef, .. }
            | ProgramStub::DataTypeString { basetyperef, .. } => basetyperef.as_ref(),
            ProgramStub::DataTypeEnum { basetyperef } | ProgramStub::DataTypeQualifier { basetyperef } => {
                Some(basetyperef)
            }
            _ => None,
        }
    }

    fn reserve(&self, arena: &mut ProgramInfo) -> Handle {
        match self {
            ProgramStub::ProgramInfo { .. } => Handle::Program,
            ProgramStub::Function { .. } => Handle::Function(arena.reserve_function()),
            ProgramStub::Variable { .. } => Handle::Variable(arena.reserve_variable()),
            // Every arena already holds `void`
            ProgramStub::DataTypeVoid | ProgramStub::DataTypeTypedef { .. } => {
                Handle::Type(TypeArena::VOID)
            }
            ProgramStub::DataTypeString { size: None, .. } => Handle::Type(TypeArena::VOID),
            _ => Handle::Type(arena.types.reserve()),
        }
    }

    fn resolve(&self, handle: Handle, r: &mut ProgramResolver<'_>) -> Result<()> {
        match self {
            ProgramStub::ProgramInfo {
                globalrefs,
                functionrefs,
            } => {
                let globals = resolve_variables(r, globalrefs)?;
                let mut functions = vec![];
                for k in functionrefs {
                    functions.push(r.resolve(k)?.function_id(k)?);
                }
                for g in globals {
                    r.arena.push_global(g);
                }
                for f in functions {
                    r.arena.push_function(f);
                }
            }
            ProgramStub::Function {
                name,
                startaddr,
                endaddr,
                rettyperef,
                paramrefs,
                varrefs,
                variadic,
            } => {
                if let (Some(s), Some(e)) = (startaddr, endaddr) {
                    if e < s {
                        return Err(Error::InvertedRange {
                            start: Address::absolute(*s),
                            end: Address::absolute(*e),
                        });
                    }
                }
                let rettype = resolve_optional_type(r, rettyperef)?;
                let params = resolve_variables(r, paramrefs)?;
                let vars = resolve_variables(r, varrefs)?;
                if let Handle::Function(id) = handle {
                    r.arena.set_function(
                        id,
                        Function {
                            name: name.clone(),
                            startaddr: *startaddr,
                            endaddr: *endaddr,
                            rettype,
                            params,
                            vars,
                            variadic: *variadic,
                        },
                    );
                }
            }
            ProgramStub::Variable {
                name,
                dtyperef,
                liveranges,
                param,
                functionref,
            } => {
                let function = match functionref {
                    Some(k) => Some(r.resolve(k)?.function_id(k)?),
                    None => None,
                };
                let dtype = resolve_type(r, dtyperef)?;
                let liveranges = liveranges
                    .iter()
                    .map(|lr| AddressLiveRange::new(lr.addr, lr.startpc, lr.endpc))
                    .collect::<Result<Vec<_>>>()?;
                let var = Variable::new(name.clone(), dtype, liveranges, *param, function)?;
                if let Handle::Variable(id) = handle {
                    r.arena.set_variable(id, var);
                }
            }
            ProgramStub::DataTypeInt { size, signed } => set_type(
                r,
                handle,
                DataType::Int {
                    size: *size,
                    signed: *signed,
                },
            ),
            ProgramStub::DataTypeFloat { size } => set_type(r, handle, DataType::Float { size: *size }),
            ProgramStub::DataTypeUndefined { size } => {
                set_type(r, handle, DataType::Undefined { size: *size })
            }
            ProgramStub::DataTypeVoid | ProgramStub::DataTypeTypedef { .. } => {}
            ProgramStub::DataTypeString { size, .. } => {
                if let Some(size) = size {
                    set_type(r, handle, DataType::Undefined { size: *size })
                }
            }
            ProgramStub::DataTypePointer { basetyperef, size } => {
                let basetype = resolve_type(r, basetyperef)?;
                set_type(
                    r,
                    handle,
                    DataType::Pointer {
                        basetype,
                        size: *size,
                    },
                )
            }
            ProgramStub::DataTypeArray {
                basetyperef,
                dimensions,
                size,
            } => {
                let basetype = resolve_type(r, basetyperef)?;
                let size = size.unwrap_or_else(|| {
                    DataType::array_size(dimensions, component_size(r, basetyperef, basetype))
                });
                set_type(
                    r,
                    handle,
                    DataType::Array {
                        basetype,
                        dimensions: dimensions.clone(),
                        size,
                    },
                )
            }
            ProgramStub::DataTypeStruct {
                name,
                membertyperef_offsets,
                size,
            } => {
                let mut members = vec![];
                for (offset, k) in membertyperef_offsets {
                    members.push((*offset, k, resolve_type(r, k)?));
                }
                members.sort_by_key(|(offset, _, _)| *offset);
                let size = size.unwrap_or_else(|| {
                    let last_end = members
                        .last()
                        .map(|(offset, k, t)| offset + component_size(r, k, *t));
                    DataType::derived_struct_size(last_end, CONFIG.pad_struct_tail_to_alignment)
                });
                let members = members.into_iter().map(|(o, _, t)| (o, t)).collect();
                set_type(
                    r,
                    handle,
                    DataType::Struct {
                        name: name.clone(),
                        members,
                        size,
                    },
                )
            }
            ProgramStub::DataTypeUnion {
                name,
                membertyperefs,
                size,
            } => {
                let members = resolve_types(r, membertyperefs)?;
                let size = size.unwrap_or_else(|| {
                    membertyperefs
                        .iter()
                        .zip(&members)
                        .map(|(k, t)| component_size(r, k, *t))
                        .max()
                        .unwrap_or(0)
                });
                set_type(
                    r,
                    handle,
                    DataType::Union {
                        name: name.clone(),
                        members,
                        size,
                    },
                )
            }
            ProgramStub::DataTypeFunctionPrototype {
                rettyperef,
                paramtyperefs,
                variadic,
            } => {
                let rettype = resolve_optional_type(r, rettyperef)?;
                let paramtypes = resolve_types(r, paramtyperefs)?;
                set_type(
                    r,
                    handle,
                    DataType::FunctionPrototype {
                        rettype,
                        paramtypes,
                        variadic: *variadic,
                    },
                )
            }
            // Resolution never reaches an alias; aliases are followed before a slot is reserved
            ProgramStub::DataTypeEnum { .. } | ProgramStub::DataTypeQualifier { .. } => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::MetaType;

    fn k(s: &str) -> StubKey {
        s.to_string()
    }

    fn int(size: usize) -> ProgramStub {
        ProgramStub::DataTypeInt { size, signed: true }
    }

    #[test]
    fn self_pointer_struct_keeps_identity() {
        let mut db = ProgramResolverDatabase::new();
        db.make_record(k("int"), int(4));
        db.make_record(
            k("node"),
            ProgramStub::DataTypeStruct {
                name: "node".into(),
                membertyperef_offsets: vec![(0, k("int")), (8, k("next"))],
                size: None,
            },
        );
        db.make_record(
            k("next"),
            ProgramStub::DataTypePointer {
                basetyperef: k("node"),
                size: 8,
            },
        );
        let mut r = db.resolver(ProgramInfo::new());
        let node = resolve_type(&mut r, &k("node")).unwrap();
        let prog = r.into_arena();
        match prog.types.get(node) {
            DataType::Struct { members, size, .. } => {
                assert_eq!(*size, 16);
                match prog.types.get(members[1].1) {
                    DataType::Pointer { basetype, .. } => assert_eq!(*basetype, node),
                    other => panic!("expected pointer, got {:?}", other),
                }
            }
            other => panic!("expected struct, got {:?}", other),
        }
    }

    #[test]
    fn aliases_resolve_to_their_target() {
        let mut db = ProgramResolverDatabase::new();
        db.make_record(k("uint"), ProgramStub::DataTypeInt { size: 4, signed: false });
        db.make_record(k("const"), ProgramStub::DataTypeQualifier { basetyperef: k("uint") });
        db.make_record(
            k("td"),
            ProgramStub::DataTypeTypedef {
                name: "uint32_t".into(),
                basetyperef: Some(k("const")),
            },
        );
        db.make_record(k("en"), ProgramStub::DataTypeEnum { basetyperef: k("td") });
        db.make_record(
            k("void_td"),
            ProgramStub::DataTypeTypedef {
                name: "nothing".into(),
                basetyperef: None,
            },
        );
        let mut r = db.resolver(ProgramInfo::new());
        let u = resolve_type(&mut r, &k("uint")).unwrap();
        assert_eq!(resolve_type(&mut r, &k("en")).unwrap(), u);
        assert_eq!(resolve_type(&mut r, &k("td")).unwrap(), u);
        assert_eq!(resolve_type(&mut r, &k("void_td")).unwrap(), TypeArena::VOID);
        // Only `void` and the one integer
        assert_eq!(r.arena.types.len(), 2);
    }

    #[test]
    fn derived_sizes() {
        let mut db = ProgramResolverDatabase::new();
        db.make_record(k("int"), int(4));
        db.make_record(k("char"), int(1));
        db.make_record(
            k("arr"),
            ProgramStub::DataTypeArray {
                basetyperef: k("int"),
                dimensions: vec![2, 3],
                size: None,
            },
        );
        db.make_record(
            k("s"),
            ProgramStub::DataTypeStruct {
                name: "s".into(),
                membertyperef_offsets: vec![(4, k("char")), (0, k("int"))],
                size: None,
            },
        );
        db.make_record(
            k("u"),
            ProgramStub::DataTypeUnion {
                name: "u".into(),
                membertyperefs: vec![k("char"), k("arr")],
                size: None,
            },
        );
        let mut r = db.resolver(ProgramInfo::new());
        let arr = resolve_type(&mut r, &k("arr")).unwrap();
        let s = resolve_type(&mut r, &k("s")).unwrap();
        let u = resolve_type(&mut r, &k("u")).unwrap();
        let types = &r.arena.types;
        assert_eq!(types.get(arr).size(), 24);
        assert_eq!(types.get(s).size(), 8);
        assert_eq!(types.get(u).size(), 24);
        match types.get(s) {
            DataType::Struct { members, .. } => assert_eq!(members[0].0, 0),
            other => panic!("expected struct, got {:?}", other),
        }
    }

    #[test]
    fn struct_sized_through_a_type_still_being_resolved() {
        let mut db = ProgramResolverDatabase::new();
        // struct b { struct a *p; }; struct a { struct b inner; };
        db.make_record(
            k("b"),
            ProgramStub::DataTypeStruct {
                name: "b".into(),
                membertyperef_offsets: vec![(0, k("pa"))],
                size: Some(8),
            },
        );
        db.make_record(
            k("pa"),
            ProgramStub::DataTypePointer {
                basetyperef: k("a"),
                size: 8,
            },
        );
        db.make_record(
            k("a"),
            ProgramStub::DataTypeStruct {
                name: "a".into(),
                membertyperef_offsets: vec![(0, k("b"))],
                size: None,
            },
        );
        let mut r = db.resolver(ProgramInfo::new());
        let b = resolve_type(&mut r, &k("b")).unwrap();
        assert!(r.is_resolved(&k("b")));
        let a = resolve_type(&mut r, &k("a")).unwrap();
        let types = &r.arena.types;
        assert_eq!(types.get(b).size(), 8);
        assert_eq!(types.get(a).size(), 8);
    }

    #[test]
    fn variable_reached_through_its_own_function_is_kept() {
        let mut db = ProgramResolverDatabase::new();
        db.make_record(k("int"), int(4));
        db.set_root_key(k("0")).unwrap();
        db.make_record(
            k("0"),
            ProgramStub::ProgramInfo {
                globalrefs: vec![k("counter")],
                functionrefs: vec![k("f")],
            },
        );
        db.make_record(
            k("f"),
            ProgramStub::Function {
                name: Some("f".into()),
                startaddr: Some(0x400),
                endaddr: Some(0x440),
                rettyperef: None,
                paramrefs: vec![],
                varrefs: vec![k("counter")],
                variadic: false,
            },
        );
        // A function-scoped static, listed both as a global and as a local of `f`
        db.make_record(
            k("counter"),
            ProgramStub::Variable {
                name: Some("counter".into()),
                dtyperef: k("int"),
                liveranges: vec![LiveRangeStub {
                    addr: Address::absolute(0x1000),
                    startpc: None,
                    endpc: None,
                }],
                param: false,
                functionref: Some(k("f")),
            },
        );
        let (prog, _) = db.resolve_root(ProgramInfo::new()).unwrap();
        assert_eq!(prog.globals().count(), 1);
        let f = prog.functions().next().unwrap();
        let locals: Vec<_> = prog.locals(f).collect();
        assert_eq!(locals.len(), 1);
        assert_eq!(locals[0].name.as_deref(), Some("counter"));
    }

    #[test]
    fn wrong_kind_of_reference() {
        let mut db = ProgramResolverDatabase::new();
        db.make_record(k("int"), int(4));
        db.make_record(
            k("v"),
            ProgramStub::Variable {
                name: None,
                dtyperef: k("int"),
                liveranges: vec![],
                param: false,
                functionref: None,
            },
        );
        db.make_record(
            k("p"),
            ProgramStub::DataTypePointer {
                basetyperef: k("v"),
                size: 8,
            },
        );
        let mut r = db.resolver(ProgramInfo::new());
        assert!(matches!(
            r.resolve(&k("p")),
            Err(Error::UnexpectedObject { .. })
        ));
    }

    #[test]
    fn program_with_function_and_zero_sized_variable() {
        let mut db = ProgramResolverDatabase::new();
        db.make_record(k("int"), int(4));
        db.make_record(k("void"), ProgramStub::DataTypeVoid);
        db.make_record(
            k("prog"),
            ProgramStub::ProgramInfo {
                globalrefs: vec![k("g"), k("nothing")],
                functionrefs: vec![k("main")],
            },
        );
        db.make_record(
            k("g"),
            ProgramStub::Variable {
                name: Some("g".into()),
                dtyperef: k("int"),
                liveranges: vec![LiveRangeStub {
                    addr: Address::absolute(0x1000),
                    startpc: None,
                    endpc: None,
                }],
                param: false,
                functionref: None,
            },
        );
        db.make_record(
            k("nothing"),
            ProgramStub::Variable {
                name: Some("nothing".into()),
                dtyperef: k("void"),
                liveranges: vec![],
                param: false,
                functionref: None,
            },
        );
        db.make_record(
            k("main"),
            ProgramStub::Function {
                name: Some("main".into()),
                startaddr: Some(0x400),
                endaddr: Some(0x480),
                rettyperef: Some(k("int")),
                paramrefs: vec![k("argc")],
                varrefs: vec![],
                variadic: false,
            },
        );
        db.make_record(
            k("argc"),
            ProgramStub::Variable {
                name: Some("argc".into()),
                dtyperef: k("int"),
                liveranges: vec![LiveRangeStub {
                    addr: Address::stack(4),
                    startpc: Some(0x400),
                    endpc: Some(0x480),
                }],
                param: true,
                functionref: Some(k("main")),
            },
        );
        db.set_root_key(k("prog")).unwrap();
        let (prog, root) = db.resolve_root(ProgramInfo::new()).unwrap();
        assert_eq!(root, Handle::Program);
        assert_eq!(prog.globals().count(), 1);
        let main = prog.functions().next().unwrap();
        assert_eq!(main.name.as_deref(), Some("main"));
        assert_eq!(prog.types.ty(main.rettype).metatype(), MetaType::Int);
        let argc = prog.params(main).next().unwrap();
        assert!(argc.is_param());
        assert!(!argc.is_global());
        // The parameter's owner is the very function it belongs to
        assert!(std::ptr::eq(prog.function(argc.function.unwrap()), main));
    }

    #[test]
    fn inverted_function_range() {
        let mut db = ProgramResolverDatabase::new();
        db.make_record(
            k("f"),
            ProgramStub::Function {
                name: None,
                startaddr: Some(0x20),
                endaddr: Some(0x10),
                rettyperef: None,
                paramrefs: vec![],
                varrefs: vec![],
                variadic: false,
            },
        );
        let mut r = db.resolver(ProgramInfo::new());
        assert!(matches!(
            r.resolve(&k("f")),
            Err(Error::InvertedRange { .. })
        ));
    }
}
