//! The normalized program model shared by ground truth and decompiler output: variables, their
//! materialized instances (varnodes), functions and whole programs.

use crate::address::{Address, AddressLiveRange, AddressRange, AddressRegion};
use crate::datatype::{Ty, TypeArena, TypeId};
use crate::errors::{Error, Result};

/// Index of a [`Variable`] within its [`ProgramInfo`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

/// Index of a [`Function`] within its [`ProgramInfo`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(usize);

#[derive(Clone, Debug)]
pub struct Variable {
    pub name: Option<String>,
    pub dtype: TypeId,
    /// Sorted by PC, pairwise PC-disjoint
    liveranges: Vec<AddressLiveRange>,
    pub param: bool,
    /// The owning function; `None` for globals
    pub function: Option<FunctionId>,
}

impl Variable {
    pub fn new(
        name: Option<String>,
        dtype: TypeId,
        mut liveranges: Vec<AddressLiveRange>,
        param: bool,
        function: Option<FunctionId>,
    ) -> Result<Self> {
        liveranges.sort_by_key(|lr| (lr.start_pc(), lr.end_pc()));
        let overlapping = liveranges.windows(2).any(|w| match (w[0].end_pc(), w[1].start_pc()) {
            (Some(end), Some(start)) => end > start,
            // A range without PCs spans the whole program
            _ => true,
        });
        if overlapping {
            return Err(Error::OverlappingLiveRanges(
                name.unwrap_or_else(|| "<anonymous>".into()),
            ));
        }
        Ok(Self {
            name,
            dtype,
            liveranges,
            param,
            function,
        })
    }

    /// Stands in for a variable that is being resolved
    pub(crate) fn placeholder() -> Self {
        Self {
            name: None,
            dtype: TypeArena::VOID,
            liveranges: vec![],
            param: false,
            function: None,
        }
    }

    pub fn liveranges(&self) -> &[AddressLiveRange] {
        &self.liveranges
    }

    pub fn is_param(&self) -> bool {
        self.param
    }

    pub fn is_global(&self) -> bool {
        self.function.is_none()
    }

    pub fn is_local(&self) -> bool {
        !self.is_global() && !self.is_param()
    }

    pub fn has_location(&self) -> bool {
        !self.liveranges.is_empty()
    }

    /// Lives in exactly one place throughout its lifetime
    pub fn is_single_loc(&self) -> bool {
        self.liveranges.len() == 1
    }

    pub fn size(&self, types: &TypeArena) -> usize {
        types.get(self.dtype).size()
    }

    /// The address this variable occupies at `pc`. Globals have one location regardless.
    pub fn address_at_pc(&self, pc: &Address) -> Option<Address> {
        if self.is_global() {
            return self.liveranges.first().map(|lr| lr.addr);
        }
        self.liveranges
            .iter()
            .find(|lr| lr.pc_range.map(|r| r.contains(pc)).unwrap_or(true))
            .map(|lr| lr.addr)
    }

    /// One varnode per live range
    pub fn varnodes<'a>(&'a self, types: &'a TypeArena) -> Vec<Varnode<'a>> {
        self.liveranges
            .iter()
            .map(|lr| Varnode {
                dtype: types.ty(self.dtype),
                liverange: *lr,
                var: Some(self),
            })
            .collect()
    }

    pub fn display<'a>(&'a self, types: &'a TypeArena) -> impl std::fmt::Display + 'a {
        struct D<'a>(&'a Variable, &'a TypeArena);
        impl<'a> std::fmt::Display for D<'a> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let v = self.0;
                write!(
                    f,
                    "{} {} :: {} @ [",
                    if v.param { "PARAM" } else { "VAR" },
                    v.name.as_deref().unwrap_or("<anonymous>"),
                    self.1.ty(v.dtype),
                )?;
                for (i, lr) in v.liveranges.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", lr)?;
                }
                write!(f, "]")
            }
        }
        D(self, types)
    }
}

/// One concrete instance of a variable: a type at a single live range. This is the atomic unit
/// of comparison.
#[derive(Clone, Debug)]
pub struct Varnode<'a> {
    pub dtype: Ty<'a>,
    pub liverange: AddressLiveRange,
    /// The variable this varnode was derived from
    pub var: Option<&'a Variable>,
}

impl<'a> Varnode<'a> {
    pub fn new(dtype: Ty<'a>, liverange: AddressLiveRange, var: Option<&'a Variable>) -> Self {
        Self {
            dtype,
            liverange,
            var,
        }
    }

    pub fn addr(&self) -> Address {
        self.liverange.addr
    }

    pub fn region(&self) -> AddressRegion {
        self.liverange.addr.region()
    }

    pub fn pc_range(&self) -> Option<AddressRange> {
        self.liverange.pc_range
    }

    pub fn size(&self) -> usize {
        self.dtype.size()
    }

    /// The bytes this varnode occupies, if its address is rangeable
    pub fn addr_range(&self) -> Option<AddressRange> {
        if !self.addr().is_rangeable() {
            return None;
        }
        AddressRange::with_size(self.addr(), self.size() as u64).ok()
    }

    /// One varnode per primitive leaf of the type, at the leaf's address
    pub fn flatten(&self) -> Result<Vec<Varnode<'a>>> {
        self.dtype
            .flatten()
            .map(|(offset, prim)| {
                Ok(Varnode {
                    dtype: prim,
                    liverange: AddressLiveRange {
                        addr: self.addr().displaced(offset as i64)?,
                        pc_range: self.pc_range(),
                    },
                    var: self.var,
                })
            })
            .collect()
    }

    /// Same location, same lifetime, same type, and spawned by the same variable
    pub fn same(&self, other: &Varnode<'_>) -> bool {
        self.liverange == other.liverange
            && self.dtype.exact_eq(&other.dtype)
            && match (self.var, other.var) {
                (Some(a), Some(b)) => std::ptr::eq(a, b),
                (None, None) => true,
                _ => false,
            }
    }
}

impl<'a> std::fmt::Display for Varnode<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Varnode {} :: {}", self.liverange, self.dtype)?;
        if let Some(name) = self.var.and_then(|v| v.name.as_deref()) {
            write!(f, " ({})", name)?;
        }
        write!(f, ">")
    }
}

#[derive(Clone, Debug)]
pub struct Function {
    pub name: Option<String>,
    pub startaddr: Option<u64>,
    pub endaddr: Option<u64>,
    pub rettype: TypeId,
    pub params: Vec<VarId>,
    pub vars: Vec<VarId>,
    pub variadic: bool,
}

impl Function {
    pub(crate) fn placeholder() -> Self {
        Self {
            name: None,
            startaddr: None,
            endaddr: None,
            rettype: TypeArena::VOID,
            params: vec![],
            vars: vec![],
            variadic: false,
        }
    }

    /// Has no code of its own
    pub fn is_inlined(&self) -> bool {
        self.startaddr.is_none() && self.endaddr.is_none()
    }

    pub fn start_pc(&self) -> Option<Address> {
        self.startaddr.map(Address::absolute)
    }

    pub fn pc_range(&self) -> Option<AddressRange> {
        let start = self.start_pc()?;
        let end = Address::absolute(self.endaddr.unwrap_or(self.startaddr?));
        AddressRange::new(start, end).ok()
    }
}

/// A whole program: the owner of all its types, variables and functions.
#[derive(Clone, Debug, Default)]
pub struct ProgramInfo {
    pub types: TypeArena,
    variables: Vec<Variable>,
    functions: Vec<Function>,
    globals: Vec<VarId>,
    function_order: Vec<FunctionId>,
}

impl ProgramInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_variable(&mut self, var: Variable) -> VarId {
        self.variables.push(var);
        VarId(self.variables.len() - 1)
    }

    pub(crate) fn reserve_variable(&mut self) -> VarId {
        self.insert_variable(Variable::placeholder())
    }

    pub(crate) fn set_variable(&mut self, id: VarId, var: Variable) {
        self.variables[id.0] = var;
    }

    pub fn insert_function(&mut self, function: Function) -> FunctionId {
        self.functions.push(function);
        FunctionId(self.functions.len() - 1)
    }

    pub(crate) fn reserve_function(&mut self) -> FunctionId {
        self.insert_function(Function::placeholder())
    }

    pub(crate) fn set_function(&mut self, id: FunctionId, function: Function) {
        self.functions[id.0] = function;
    }

    /// Register an already-inserted variable as a global of the program
    pub fn push_global(&mut self, id: VarId) {
        self.globals.push(id);
    }

    /// Register an already-inserted function as a function of the program
    pub fn push_function(&mut self, id: FunctionId) {
        self.function_order.push(id);
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.0]
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.0]
    }

    pub fn globals(&self) -> impl Iterator<Item = &Variable> {
        self.globals.iter().map(move |id| self.variable(*id))
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.function_order.iter().map(move |id| self.function(*id))
    }

    pub fn params<'a>(&'a self, f: &'a Function) -> impl Iterator<Item = &'a Variable> {
        f.params.iter().map(move |id| self.variable(*id))
    }

    pub fn locals<'a>(&'a self, f: &'a Function) -> impl Iterator<Item = &'a Variable> {
        f.vars.iter().map(move |id| self.variable(*id))
    }

    pub fn select_globals(&self, variable_cond: impl Fn(&Variable) -> bool) -> Vec<&Variable> {
        self.globals().filter(|v| variable_cond(v)).collect()
    }

    pub fn select_functions(&self, function_cond: impl Fn(&Function) -> bool) -> Vec<&Function> {
        self.functions().filter(|f| function_cond(f)).collect()
    }

    /// Parameters and locals of `f`, in that order
    pub fn select_function_variables<'a>(
        &'a self,
        f: &'a Function,
        variable_cond: impl Fn(&Variable) -> bool,
    ) -> Vec<&'a Variable> {
        self.params(f)
            .chain(self.locals(f))
            .filter(|v| variable_cond(v))
            .collect()
    }

    /// Globals, followed by the variables of each selected function
    pub fn select_variables(
        &self,
        function_cond: impl Fn(&Function) -> bool,
        variable_cond: impl Fn(&Variable) -> bool,
    ) -> Vec<&Variable> {
        let mut res = self.select_globals(&variable_cond);
        for f in self.functions().filter(|f| function_cond(f)) {
            res.extend(self.select_function_variables(f, &variable_cond));
        }
        res
    }

    pub fn select_varnodes(
        &self,
        function_cond: impl Fn(&Function) -> bool,
        variable_cond: impl Fn(&Variable) -> bool,
        varnode_cond: impl Fn(&Varnode) -> bool,
    ) -> Vec<Varnode<'_>> {
        self.select_variables(function_cond, variable_cond)
            .into_iter()
            .flat_map(|v| v.varnodes(&self.types))
            .filter(|vn| varnode_cond(vn))
            .collect()
    }

    pub fn select_primitive_varnodes(
        &self,
        function_cond: impl Fn(&Function) -> bool,
        variable_cond: impl Fn(&Variable) -> bool,
        varnode_cond: impl Fn(&Varnode) -> bool,
    ) -> Result<Vec<Varnode<'_>>> {
        let mut res = vec![];
        for vn in self.select_varnodes(function_cond, variable_cond, |_| true) {
            res.extend(vn.flatten()?.into_iter().filter(|p| varnode_cond(p)));
        }
        Ok(res)
    }

    /// Display a function's name, prototype and PC range
    pub fn function_header(&self, f: &Function) -> String {
        let params: Vec<String> = self
            .params(f)
            .map(|p| format!("{}", self.types.ty(p.dtype)))
            .collect();
        format!(
            "{} :: ({}{}) -> {} @ PC range=({}, {})",
            f.name.as_deref().unwrap_or("<anonymous>"),
            params.join(", "),
            if f.variadic { ", ..." } else { "" },
            self.types.ty(f.rettype),
            f.startaddr
                .map(|a| format!("{:#x}", a))
                .unwrap_or_else(|| "None".into()),
            f.endaddr
                .map(|a| format!("{:#x}", a))
                .unwrap_or_else(|| "None".into()),
        )
    }
}

impl std::fmt::Display for ProgramInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "----------------GLOBALS----------------------")?;
        for g in self.globals() {
            writeln!(f, "{}", g.display(&self.types))?;
        }
        writeln!(f, "----------------FUNCTIONS--------------------")?;
        for func in self.functions() {
            writeln!(f, "{}", self.function_header(func))?;
            for v in self.params(func).chain(self.locals(func)) {
                writeln!(f, "\t{}", v.display(&self.types))?;
            }
        }
        Ok(())
    }
}
