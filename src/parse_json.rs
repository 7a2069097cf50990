//! Declarative front end: a JSON object mapping keys to stubs, resolved into a [`ProgramInfo`].

use std::path::Path;

use crate::errors::{Error, Result};
use crate::lang::ProgramInfo;
use crate::log::*;
use crate::stubs::{ProgramResolverDatabase, ProgramStub, StubKey};

/// The raw stub table
pub type StubTable = Vec<(StubKey, ProgramStub)>;

/// Parse a JSON object of `key: stub` entries
pub fn parse_stub_table(s: &str) -> Result<StubTable> {
    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(s)?;
    map.into_iter()
        .map(|(k, v)| Ok((k, serde_json::from_value(v)?)))
        .collect()
}

/// Build a resolver database from a stub table. The stub of kind `ProgramInfo` becomes the root.
pub fn make_resolver_database(table: StubTable) -> Result<ProgramResolverDatabase> {
    let mut db = ProgramResolverDatabase::new();
    for (key, stub) in table {
        if stub.is_root() {
            db.set_root_key(key.clone())?;
        }
        trace!("Adding stub"; "key" => %key, "objtype" => stub.objtype());
        db.make_record(key, stub);
    }
    if !db.has_root_key() {
        return Err(Error::NoRootKey);
    }
    Ok(db)
}

pub fn parse_from_table(table: StubTable) -> Result<ProgramInfo> {
    let db = make_resolver_database(table)?;
    let (prog, _) = db.resolve_root(ProgramInfo::new())?;
    Ok(prog)
}

pub fn parse_from_json_str(s: &str) -> Result<ProgramInfo> {
    parse_from_table(parse_stub_table(s)?)
}

pub fn parse_from_json_file(path: &Path) -> Result<ProgramInfo> {
    let s = std::fs::read_to_string(path)?;
    let prog = parse_from_json_str(&s)?;
    info!(
        "Loaded program";
        "path" => %path.display(),
        "globals" => prog.globals().count(),
        "functions" => prog.functions().count()
    );
    Ok(prog)
}
