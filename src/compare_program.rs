//! Whole-program and per-function comparison, for programs whose variables each live in a single
//! location (i.e., unoptimized code).
//!
//! Functions of the two programs are paired up by exact start address. Only paired functions are
//! compared further: their return types, and the snapshots of their parameters and locals.

use std::collections::BTreeMap;

use crate::address::{Address, AddressRange, AddressRangeOverlap};
use crate::compare_datatype::DataTypeCompare2;
use crate::compare_scope::VariableSetSnapshotCompare2;
use crate::compare_variable::{VarnodeCompare2, VarnodeCompareLevel, VarnodeCompareRecord};
use crate::errors::Result;
use crate::lang::{Function, ProgramInfo, Variable, Varnode};
use crate::log::*;
use crate::ordered_merge::{ordered_merge, Merged};

/// The first location of each of `vars` that has one
fn first_varnodes<'a>(
    prog: &'a ProgramInfo,
    vars: impl Iterator<Item = &'a Variable>,
) -> Vec<Varnode<'a>> {
    vars.filter_map(|v| v.varnodes(&prog.types).into_iter().next())
        .collect()
}

/// A function, seen as if each of its variables lived in one single place
#[derive(Clone, Copy, Debug)]
pub struct SingleLocationFunction<'a> {
    prog: &'a ProgramInfo,
    function: &'a Function,
}

impl<'a> SingleLocationFunction<'a> {
    pub fn new(prog: &'a ProgramInfo, function: &'a Function) -> Self {
        Self { prog, function }
    }

    pub fn program(&self) -> &'a ProgramInfo {
        self.prog
    }

    pub fn function(&self) -> &'a Function {
        self.function
    }

    pub fn name(&self) -> &'a str {
        self.function.name.as_deref().unwrap_or("UNKNOWN")
    }

    pub fn start_pc(&self) -> Option<Address> {
        self.function.start_pc()
    }

    pub fn pc_range(&self) -> Option<AddressRange> {
        self.function.pc_range()
    }

    pub fn param_varnodes(&self) -> Vec<Varnode<'a>> {
        first_varnodes(self.prog, self.prog.params(self.function))
    }

    pub fn variable_varnodes(&self) -> Vec<Varnode<'a>> {
        first_varnodes(self.prog, self.prog.locals(self.function))
    }

    /// Parameters, then locals
    pub fn varnodes(&self) -> Vec<Varnode<'a>> {
        let mut res = self.param_varnodes();
        res.extend(self.variable_varnodes());
        res
    }

    pub fn flattened_varnodes(&self) -> Result<Vec<Varnode<'a>>> {
        let mut res = vec![];
        for v in self.varnodes() {
            res.extend(v.flatten()?);
        }
        Ok(res)
    }
}

impl<'a> std::fmt::Display for SingleLocationFunction<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |a: Option<u64>| a.map_or_else(|| "None".to_string(), |a| format!("{:#x}", a));
        write!(
            f,
            "<SingleLocationFunction {} startpc={} endpc={}>",
            self.name(),
            show(self.function.startaddr),
            show(self.function.endaddr),
        )
    }
}

/// A program, seen as if each of its variables lived in one single place. Functions without a
/// start address (inlined functions) are left out.
#[derive(Clone, Debug)]
pub struct SingleLocationProgram<'a> {
    prog: &'a ProgramInfo,
    /// Sorted by start address
    functions: Vec<SingleLocationFunction<'a>>,
    /// Globals with exactly one location
    globals: Vec<Varnode<'a>>,
}

impl<'a> SingleLocationProgram<'a> {
    pub fn new(prog: &'a ProgramInfo) -> Self {
        let mut by_start: BTreeMap<u64, SingleLocationFunction<'a>> = BTreeMap::new();
        for function in prog.functions() {
            let start = match function.startaddr {
                Some(s) => s,
                None => {
                    debug!("Skipping function without start address";
                           OptionalKV("name", function.name.as_deref()),
                           "inlined" => function.is_inlined());
                    continue;
                }
            };
            let f = SingleLocationFunction::new(prog, function);
            if let Some(prev) = by_start.insert(start, f) {
                warn!("Functions share a start address; keeping the later one";
                      "start" => format!("{:#x}", start),
                      "dropped" => prev.name(),
                      "kept" => f.name());
            }
        }

        let globals = prog
            .globals()
            .filter_map(|g| {
                let mut vs = g.varnodes(&prog.types);
                if vs.len() == 1 {
                    vs.pop()
                } else {
                    None
                }
            })
            .collect();

        Self {
            prog,
            functions: by_start.into_values().collect(),
            globals,
        }
    }

    pub fn program(&self) -> &'a ProgramInfo {
        self.prog
    }

    pub fn functions(&self) -> &[SingleLocationFunction<'a>] {
        &self.functions
    }

    pub fn globals(&self) -> &[Varnode<'a>] {
        &self.globals
    }
}

/// The comparison of two functions. The return types and variables are only compared when the
/// two functions start at the same address.
#[derive(Clone, Debug)]
pub struct FunctionCompare2<'a> {
    left: SingleLocationFunction<'a>,
    right: SingleLocationFunction<'a>,
    pc_range_overlap: Option<AddressRangeOverlap>,
    rettype_comparison: Option<DataTypeCompare2<'a>>,
    param_set_comparison: Option<VariableSetSnapshotCompare2<'a>>,
    variable_set_comparison: Option<VariableSetSnapshotCompare2<'a>>,
    varnode_set_comparison: Option<VariableSetSnapshotCompare2<'a>>,
}

impl<'a> FunctionCompare2<'a> {
    pub fn new(left: SingleLocationFunction<'a>, right: SingleLocationFunction<'a>) -> Result<Self> {
        let pc_range_overlap = match (left.pc_range(), right.pc_range()) {
            (Some(l), Some(r)) => Some(l.overlap(&r)?),
            _ => None,
        };
        let mut res = Self {
            left,
            right,
            pc_range_overlap,
            rettype_comparison: None,
            param_set_comparison: None,
            variable_set_comparison: None,
            varnode_set_comparison: None,
        };
        if res.pc_range_start_aligned() {
            res.rettype_comparison = Some(DataTypeCompare2::new(
                left.prog.types.ty(left.function.rettype),
                right.prog.types.ty(right.function.rettype),
                0,
            ));
            res.param_set_comparison = Some(VariableSetSnapshotCompare2::from_varnodes(
                left.param_varnodes(),
                right.param_varnodes(),
            )?);
            res.variable_set_comparison = Some(VariableSetSnapshotCompare2::from_varnodes(
                left.variable_varnodes(),
                right.variable_varnodes(),
            )?);
            res.varnode_set_comparison = Some(VariableSetSnapshotCompare2::from_varnodes(
                left.varnodes(),
                right.varnodes(),
            )?);
        }
        Ok(res)
    }

    pub fn left(&self) -> &SingleLocationFunction<'a> {
        &self.left
    }

    pub fn right(&self) -> &SingleLocationFunction<'a> {
        &self.right
    }

    pub fn does_pc_range_overlap(&self) -> bool {
        self.pc_range_overlap
            .as_ref()
            .map_or(false, |o| o.does_overlap())
    }

    pub fn pc_range_start_aligned(&self) -> bool {
        self.pc_range_overlap
            .as_ref()
            .map_or(false, |o| o.start_aligned())
    }

    pub fn pc_range_end_aligned(&self) -> bool {
        self.pc_range_overlap
            .as_ref()
            .map_or(false, |o| o.end_aligned())
    }

    pub fn pc_range_match(&self) -> bool {
        self.left.pc_range().is_some() && self.left.pc_range() == self.right.pc_range()
    }

    pub fn pc_range_bytes_overlapped(&self) -> u64 {
        self.pc_range_overlap
            .as_ref()
            .map_or(0, |o| o.bytes_overlapped())
    }

    pub fn return_type_comparison(&self) -> Option<&DataTypeCompare2<'a>> {
        self.rettype_comparison.as_ref()
    }

    pub fn return_type_match(&self) -> bool {
        self.rettype_comparison
            .as_ref()
            .map_or(false, |c| c.top_level_match())
    }

    pub fn param_set_comparison(&self) -> Option<&VariableSetSnapshotCompare2<'a>> {
        self.param_set_comparison.as_ref()
    }

    pub fn variable_set_comparison(&self) -> Option<&VariableSetSnapshotCompare2<'a>> {
        self.variable_set_comparison.as_ref()
    }

    /// Parameters and locals together
    pub fn varnode_set_comparison(&self) -> Option<&VariableSetSnapshotCompare2<'a>> {
        self.varnode_set_comparison.as_ref()
    }

    pub fn primitive_param_set_comparison(&self) -> Result<Option<VariableSetSnapshotCompare2<'a>>> {
        self.param_set_comparison
            .as_ref()
            .map(|c| c.get_flattened_comparison())
            .transpose()
    }

    pub fn primitive_variable_set_comparison(
        &self,
    ) -> Result<Option<VariableSetSnapshotCompare2<'a>>> {
        self.variable_set_comparison
            .as_ref()
            .map(|c| c.get_flattened_comparison())
            .transpose()
    }

    pub fn primitive_varnode_set_comparison(&self) -> Result<Option<VariableSetSnapshotCompare2<'a>>> {
        self.varnode_set_comparison
            .as_ref()
            .map(|c| c.get_flattened_comparison())
            .transpose()
    }

    pub fn varnode_compare_records(&self) -> Vec<&VarnodeCompareRecord<'a>> {
        self.varnode_set_comparison
            .iter()
            .flat_map(|c| c.varnode_compare_records())
            .collect()
    }

    pub fn primitive_varnode_compare_records(&self) -> Result<Vec<VarnodeCompareRecord<'a>>> {
        Ok(self
            .primitive_varnode_set_comparison()?
            .map(|c| c.into_varnode_compare_records())
            .unwrap_or_default())
    }

    pub fn varnode_bytes_overlapped(&self) -> u64 {
        self.varnode_set_comparison
            .as_ref()
            .map_or(0, |c| c.bytes_overlapped(|_| true))
    }

    pub fn varnode_bytes(&self) -> u64 {
        self.varnode_set_comparison
            .as_ref()
            .map_or(0, |c| c.get_bytes())
    }

    pub fn select_varnode_compare_records(
        &self,
        record_cond: impl Fn(&VarnodeCompareRecord<'a>) -> bool,
    ) -> Vec<&VarnodeCompareRecord<'a>> {
        self.varnode_set_comparison
            .as_ref()
            .map(|c| c.select_varnode_compare_records(record_cond))
            .unwrap_or_default()
    }

    pub fn select_varnode_comparisons(
        &self,
        record_cond: impl Fn(&VarnodeCompareRecord<'a>) -> bool,
        cmp_cond: impl Fn(&VarnodeCompare2<'a>) -> bool,
    ) -> Vec<&VarnodeCompare2<'a>> {
        self.varnode_set_comparison
            .as_ref()
            .map(|c| c.select_varnode_comparisons(record_cond, cmp_cond))
            .unwrap_or_default()
    }

    pub fn select_primitive_varnode_compare_records(
        &self,
        record_cond: impl Fn(&VarnodeCompareRecord<'a>) -> bool,
    ) -> Result<Vec<VarnodeCompareRecord<'a>>> {
        match &self.varnode_set_comparison {
            Some(c) => c.select_primitive_varnode_compare_records(record_cond),
            None => Ok(vec![]),
        }
    }

    pub fn select_primitive_varnode_comparisons(
        &self,
        record_cond: impl Fn(&VarnodeCompareRecord<'a>) -> bool,
        cmp_cond: impl Fn(&VarnodeCompare2<'a>) -> bool,
    ) -> Result<Vec<VarnodeCompare2<'a>>> {
        match &self.varnode_set_comparison {
            Some(c) => c.select_primitive_varnode_comparisons(record_cond, cmp_cond),
            None => Ok(vec![]),
        }
    }

    pub fn flip(&self) -> Result<Self> {
        Self::new(self.right, self.left)
    }

    /// A textual summary; `flattened` adds the comparison of primitive components
    pub fn summary(&self, flattened: bool) -> Result<String> {
        use std::fmt::Write;
        let mut s = String::new();
        let (params, locals) = match (&self.param_set_comparison, &self.variable_set_comparison) {
            (Some(p), Some(l)) => (p, l),
            _ => return Ok("NO FUNCTION MATCH\n".to_string()),
        };
        let rettype = match &self.rettype_comparison {
            Some(c) => format!("{:?}", c.compare_code()),
            None => "None".to_string(),
        };
        writeln!(s, "Return type: {}", rettype)?;
        write!(s, "Parameters:\n{}", params)?;
        write!(s, "Local Variables:\n{}", locals)?;
        if flattened {
            if let Some(prim) = self.primitive_varnode_set_comparison()? {
                write!(s, "Flattened (Primitive) Parameters & Variables:\n{}", prim)?;
            }
        }
        Ok(s)
    }
}

impl<'a> std::fmt::Display for FunctionCompare2<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<FunctionCompare2 start_aligned={}>",
            self.pc_range_start_aligned()
        )
    }
}

/// A left function, with its comparison to the right function of the same start address, if
/// any.
#[derive(Clone, Debug)]
pub struct FunctionCompareRecord<'a> {
    function: SingleLocationFunction<'a>,
    comparison: Option<FunctionCompare2<'a>>,
}

impl<'a> FunctionCompareRecord<'a> {
    pub fn new(function: SingleLocationFunction<'a>, comparison: Option<FunctionCompare2<'a>>) -> Self {
        Self {
            function,
            comparison,
        }
    }

    pub fn function(&self) -> &SingleLocationFunction<'a> {
        &self.function
    }

    pub fn is_comparison(&self) -> bool {
        self.comparison.is_some()
    }

    pub fn comparison(&self) -> Option<&FunctionCompare2<'a>> {
        self.comparison.as_ref()
    }

    pub fn varnode_bytes_overlapped(&self) -> u64 {
        self.comparison
            .as_ref()
            .map_or(0, |c| c.varnode_bytes_overlapped())
    }

    pub fn varnode_compare_records(&self) -> Vec<&VarnodeCompareRecord<'a>> {
        self.comparison
            .as_ref()
            .map(|c| c.varnode_compare_records())
            .unwrap_or_default()
    }

    pub fn primitive_varnode_compare_records(&self) -> Result<Vec<VarnodeCompareRecord<'a>>> {
        match &self.comparison {
            Some(c) => c.primitive_varnode_compare_records(),
            None => Ok(vec![]),
        }
    }

    /// The comparison, if there is one and it satisfies `cmp_cond`
    pub fn select_function_comparison(
        &self,
        cmp_cond: impl Fn(&FunctionCompare2<'a>) -> bool,
    ) -> Option<&FunctionCompare2<'a>> {
        self.comparison.as_ref().filter(|c| cmp_cond(c))
    }

    pub fn summary(&self, flattened: bool) -> Result<String> {
        let mut s = format!("{}", self);
        match &self.comparison {
            Some(c) => {
                s.push('\n');
                for line in c.summary(flattened)?.lines() {
                    s.push('\t');
                    s.push_str(line);
                    s.push('\n');
                }
            }
            None => s.push_str(": NO FUNCTION MATCH\n"),
        }
        Ok(s)
    }
}

impl<'a> std::fmt::Display for FunctionCompareRecord<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<FunctionCompareRecord name={} startpc={} compared={}>",
            self.function.name(),
            self.function
                .start_pc()
                .map_or_else(|| "None".to_string(), |a| a.to_string()),
            self.is_comparison()
        )
    }
}

/// The comparison of a ground-truth (left) program with a decompiled (right) program
#[derive(Clone, Debug)]
pub struct ProgramCompare2<'a> {
    left: SingleLocationProgram<'a>,
    right: SingleLocationProgram<'a>,
    globals_comparison: VariableSetSnapshotCompare2<'a>,
    /// One per left function, ordered by start address
    function_records: Vec<FunctionCompareRecord<'a>>,
}

impl<'a> ProgramCompare2<'a> {
    pub fn new(left: &'a ProgramInfo, right: &'a ProgramInfo) -> Result<Self> {
        let left = SingleLocationProgram::new(left);
        let right = SingleLocationProgram::new(right);

        let globals_comparison = VariableSetSnapshotCompare2::from_varnodes(
            left.globals.clone(),
            right.globals.clone(),
        )?;

        let mut function_records = vec![];
        for event in ordered_merge(
            left.functions.iter().copied(),
            right.functions.iter().copied(),
            |f| f.function.startaddr,
            |f| f.function.startaddr,
        ) {
            match event {
                Merged::Left(l) => {
                    debug!("No decompiled function at start address"; "function" => %l);
                    function_records.push(FunctionCompareRecord::new(l, None));
                }
                Merged::Right(r) => {
                    debug!("Decompiled function has no ground truth counterpart"; "function" => %r);
                }
                Merged::Conflict(l, r) => {
                    trace!("Pairing functions"; "left" => %l, "right" => %r);
                    let cmp = FunctionCompare2::new(l, r)?;
                    function_records.push(FunctionCompareRecord::new(l, Some(cmp)));
                }
            }
        }

        Ok(Self {
            left,
            right,
            globals_comparison,
            function_records,
        })
    }

    pub fn left(&self) -> &SingleLocationProgram<'a> {
        &self.left
    }

    pub fn right(&self) -> &SingleLocationProgram<'a> {
        &self.right
    }

    pub fn globals_comparison(&self) -> &VariableSetSnapshotCompare2<'a> {
        &self.globals_comparison
    }

    pub fn primitive_globals_comparison(&self) -> Result<VariableSetSnapshotCompare2<'a>> {
        self.globals_comparison.get_flattened_comparison()
    }

    pub fn get_global_compare_record(&self, global: &Varnode<'_>) -> Option<&VarnodeCompareRecord<'a>> {
        self.globals_comparison.get_varnode_compare_record(global)
    }

    pub fn get_function_compare_records(&self) -> &[FunctionCompareRecord<'a>] {
        &self.function_records
    }

    /// The record of the left function starting at `startaddr`
    pub fn get_function_compare_record(&self, startaddr: u64) -> Option<&FunctionCompareRecord<'a>> {
        self.function_records
            .iter()
            .find(|r| r.function.function.startaddr == Some(startaddr))
    }

    /// Globals first, then the parameters and locals of each function
    pub fn get_varnode_compare_records(&self) -> Vec<&VarnodeCompareRecord<'a>> {
        let mut res: Vec<_> = self.globals_comparison.varnode_compare_records().collect();
        for r in &self.function_records {
            res.extend(r.varnode_compare_records());
        }
        res
    }

    pub fn get_primitive_varnode_compare_records(&self) -> Result<Vec<VarnodeCompareRecord<'a>>> {
        let mut res = self.globals_comparison.primitive_varnode_compare_records()?;
        for r in &self.function_records {
            res.extend(r.primitive_varnode_compare_records()?);
        }
        Ok(res)
    }

    /// Records that reached at least `level`
    pub fn get_varnode_records_matched_level(
        &self,
        level: VarnodeCompareLevel,
    ) -> Vec<&VarnodeCompareRecord<'a>> {
        self.get_varnode_compare_records()
            .into_iter()
            .filter(|r| r.compare_level() >= level)
            .collect()
    }

    pub fn get_primitive_varnode_records_matched_level(
        &self,
        level: VarnodeCompareLevel,
    ) -> Result<Vec<VarnodeCompareRecord<'a>>> {
        Ok(self
            .get_primitive_varnode_compare_records()?
            .into_iter()
            .filter(|r| r.compare_level() >= level)
            .collect())
    }

    pub fn select_function_compare_records(
        &self,
        record_cond: impl Fn(&FunctionCompareRecord<'a>) -> bool,
    ) -> Vec<&FunctionCompareRecord<'a>> {
        self.function_records
            .iter()
            .filter(|r| record_cond(r))
            .collect()
    }

    pub fn select_function_comparisons(
        &self,
        record_cond: impl Fn(&FunctionCompareRecord<'a>) -> bool,
        cmp_cond: impl Fn(&FunctionCompare2<'a>) -> bool,
    ) -> Vec<&FunctionCompare2<'a>> {
        self.select_function_compare_records(record_cond)
            .into_iter()
            .filter_map(|r| r.select_function_comparison(&cmp_cond))
            .collect()
    }

    /// Matching global records, then matching records of the matching functions
    pub fn select_varnode_compare_records(
        &self,
        function_record_cond: impl Fn(&FunctionCompareRecord<'a>) -> bool,
        function_cmp_cond: impl Fn(&FunctionCompare2<'a>) -> bool,
        record_cond: impl Fn(&VarnodeCompareRecord<'a>) -> bool,
    ) -> Vec<&VarnodeCompareRecord<'a>> {
        let mut res = self
            .globals_comparison
            .select_varnode_compare_records(&record_cond);
        for c in self.select_function_comparisons(function_record_cond, function_cmp_cond) {
            res.extend(c.select_varnode_compare_records(&record_cond));
        }
        res
    }

    pub fn select_varnode_comparisons(
        &self,
        function_record_cond: impl Fn(&FunctionCompareRecord<'a>) -> bool,
        function_cmp_cond: impl Fn(&FunctionCompare2<'a>) -> bool,
        record_cond: impl Fn(&VarnodeCompareRecord<'a>) -> bool,
        cmp_cond: impl Fn(&VarnodeCompare2<'a>) -> bool,
    ) -> Vec<&VarnodeCompare2<'a>> {
        let mut res = self
            .globals_comparison
            .select_varnode_comparisons(&record_cond, &cmp_cond);
        for c in self.select_function_comparisons(function_record_cond, function_cmp_cond) {
            res.extend(c.select_varnode_comparisons(&record_cond, &cmp_cond));
        }
        res
    }

    pub fn select_primitive_varnode_compare_records(
        &self,
        function_record_cond: impl Fn(&FunctionCompareRecord<'a>) -> bool,
        function_cmp_cond: impl Fn(&FunctionCompare2<'a>) -> bool,
        record_cond: impl Fn(&VarnodeCompareRecord<'a>) -> bool,
    ) -> Result<Vec<VarnodeCompareRecord<'a>>> {
        let mut res = self
            .globals_comparison
            .select_primitive_varnode_compare_records(&record_cond)?;
        for c in self.select_function_comparisons(function_record_cond, function_cmp_cond) {
            res.extend(c.select_primitive_varnode_compare_records(&record_cond)?);
        }
        Ok(res)
    }

    pub fn select_primitive_varnode_comparisons(
        &self,
        function_record_cond: impl Fn(&FunctionCompareRecord<'a>) -> bool,
        function_cmp_cond: impl Fn(&FunctionCompare2<'a>) -> bool,
        record_cond: impl Fn(&VarnodeCompareRecord<'a>) -> bool,
        cmp_cond: impl Fn(&VarnodeCompare2<'a>) -> bool,
    ) -> Result<Vec<VarnodeCompare2<'a>>> {
        let mut res = self
            .globals_comparison
            .select_primitive_varnode_comparisons(&record_cond, &cmp_cond)?;
        for c in self.select_function_comparisons(function_record_cond, function_cmp_cond) {
            res.extend(c.select_primitive_varnode_comparisons(&record_cond, &cmp_cond)?);
        }
        Ok(res)
    }

    /// The same comparison with the roles of ground truth and decompiled program swapped
    pub fn flip(&self) -> Result<Self> {
        Self::new(self.right.prog, self.left.prog)
    }

    /// Ground-truth bytes overlapped by the decompiled program: globals, plus the parameters and
    /// locals of each paired function.
    pub fn bytes_overlapped(&self) -> u64 {
        self.globals_comparison.bytes_overlapped(|_| true)
            + self
                .function_records
                .iter()
                .map(|r| r.varnode_bytes_overlapped())
                .sum::<u64>()
    }

    /// Total size of all ground-truth varnodes that took part in the comparison
    pub fn get_bytes(&self) -> u64 {
        self.get_varnode_compare_records()
            .iter()
            .map(|r| r.varnode().size() as u64)
            .sum()
    }

    /// `bytes_overlapped / get_bytes`, or `None` if there is nothing to overlap
    pub fn bytes_overlapped_fraction(&self) -> Option<f64> {
        match self.get_bytes() {
            0 => None,
            total => Some(self.bytes_overlapped() as f64 / total as f64),
        }
    }

    /// A textual summary; `flattened` adds the comparison of primitive components
    pub fn summary(&self, flattened: bool) -> Result<String> {
        let mut s = String::new();
        s.push_str("\n----------GLOBAL COMPARISONS----------\n");
        s.push_str("Globals:\n");
        s.push_str(&self.globals_comparison.to_string());
        if flattened {
            s.push_str("Globals (flattened to primitives):\n");
            s.push_str(&self.primitive_globals_comparison()?.to_string());
        }
        s.push_str("\n----------FUNCTION COMPARISONS----------\n");
        for r in &self.function_records {
            s.push_str(&r.summary(flattened)?);
        }
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressLiveRange;
    use crate::datatype::{DataType, TypeId};

    struct Builder {
        prog: ProgramInfo,
        i4: TypeId,
    }

    impl Builder {
        fn new() -> Self {
            let mut prog = ProgramInfo::new();
            let i4 = prog.types.insert(DataType::Int {
                size: 4,
                signed: true,
            });
            Self { prog, i4 }
        }

        fn global(&mut self, addr: u64) {
            let v = Variable::new(
                None,
                self.i4,
                vec![AddressLiveRange::global(Address::absolute(addr))],
                false,
                None,
            )
            .unwrap();
            let id = self.prog.insert_variable(v);
            self.prog.push_global(id);
        }

        fn function(&mut self, name: &str, start: Option<u64>, locals: &[i64]) {
            let fid = self.prog.insert_function(Function {
                name: Some(name.to_string()),
                startaddr: start,
                endaddr: start.map(|s| s + 0x40),
                rettype: self.i4,
                params: vec![],
                vars: vec![],
                variadic: false,
            });
            let mut vars = vec![];
            for off in locals {
                let lr = AddressLiveRange::new(Address::stack(*off), start, start.map(|s| s + 0x40))
                    .unwrap();
                vars.push(
                    self.prog
                        .insert_variable(Variable::new(None, self.i4, vec![lr], false, Some(fid)).unwrap()),
                );
            }
            let mut f = self.prog.function(fid).clone();
            f.vars = vars;
            self.prog.set_function(fid, f);
            self.prog.push_function(fid);
        }
    }

    #[test]
    fn functions_pair_by_start_address() {
        let mut gt = Builder::new();
        gt.global(0x1000);
        gt.function("main", Some(0x400), &[-8, -4]);
        gt.function("helper", Some(0x500), &[-4]);
        gt.function("inlined", None, &[]);

        let mut dc = Builder::new();
        dc.global(0x1000);
        dc.function("FUN_00000400", Some(0x400), &[-8]);
        dc.function("FUN_00000600", Some(0x600), &[-4]);

        let cmp = ProgramCompare2::new(&gt.prog, &dc.prog).unwrap();
        let records = cmp.get_function_compare_records();
        assert_eq!(records.len(), 2);
        assert!(records[0].is_comparison());
        assert_eq!(records[0].function().name(), "main");
        assert!(!records[1].is_comparison());
        assert!(cmp.get_function_compare_record(0x500).is_some());

        let main = records[0].comparison().unwrap();
        assert!(main.pc_range_start_aligned());
        assert!(main.pc_range_match());
        assert!(main.return_type_match());

        // The global, and main's two locals
        assert_eq!(cmp.get_varnode_compare_records().len(), 3);
        assert_eq!(cmp.get_bytes(), 12);
        assert_eq!(cmp.bytes_overlapped(), 8);
        assert_eq!(cmp.bytes_overlapped_fraction(), Some(8.0 / 12.0));
        assert_eq!(
            cmp.get_varnode_records_matched_level(VarnodeCompareLevel::Match)
                .len(),
            2
        );
        assert_eq!(
            cmp.select_varnode_compare_records(|_| true, |_| true, |r| !r.does_overlap())
                .len(),
            1
        );
        assert_eq!(
            cmp.select_function_comparisons(|_| true, |c| c.return_type_match())
                .len(),
            1
        );
        assert_eq!(cmp.get_primitive_varnode_compare_records().unwrap().len(), 3);
        assert!(cmp.summary(true).unwrap().contains("NO FUNCTION MATCH"));
    }

    #[test]
    fn function_summary_sections() {
        let mut gt = Builder::new();
        gt.function("main", Some(0x400), &[-4]);
        let mut dc = Builder::new();
        dc.function("main", Some(0x400), &[-4]);

        let cmp = ProgramCompare2::new(&gt.prog, &dc.prog).unwrap();
        let f = cmp.get_function_compare_record(0x400).unwrap().comparison().unwrap();
        let plain = f.summary(false).unwrap();
        assert!(plain.starts_with("Return type: Match\n"));
        assert!(plain.contains("Parameters:\n"));
        assert!(plain.contains("Local Variables:\n"));
        assert!(!plain.contains("Flattened"));
        assert!(f
            .summary(true)
            .unwrap()
            .contains("Flattened (Primitive) Parameters & Variables:\n"));
    }

    #[test]
    fn flipped_comparison() {
        let mut gt = Builder::new();
        gt.function("main", Some(0x400), &[-8, -4]);
        let mut dc = Builder::new();
        dc.function("main", Some(0x400), &[-4]);

        let cmp = ProgramCompare2::new(&gt.prog, &dc.prog).unwrap();
        assert_eq!(cmp.bytes_overlapped_fraction(), Some(0.5));
        let flipped = cmp.flip().unwrap();
        assert_eq!(flipped.bytes_overlapped_fraction(), Some(1.0));
    }

    #[test]
    fn empty_programs_have_no_fraction() {
        let gt = ProgramInfo::new();
        let cmp = ProgramCompare2::new(&gt, &gt).unwrap();
        assert_eq!(cmp.get_bytes(), 0);
        assert_eq!(cmp.bytes_overlapped_fraction(), None);
    }

    #[test]
    fn duplicate_start_addresses_keep_the_later_function() {
        let mut b = Builder::new();
        b.function("first", Some(0x400), &[]);
        b.function("second", Some(0x400), &[]);
        let p = SingleLocationProgram::new(&b.prog);
        assert_eq!(p.functions().len(), 1);
        assert_eq!(p.functions()[0].name(), "second");
    }
}
