//! A generic resolver that materializes (possibly cyclic) object graphs from a flat table of
//! keyed stubs.
//!
//! Each stub refers to other stubs by key. Resolution allocates a placeholder slot in an arena
//! before resolving the stub's references, so a reference back to an object that is still being
//! resolved binds to that same slot. Objects in the arena refer to each other by handle, never by
//! ownership.

use crate::containers::unordered::{UnorderedMap, UnorderedSet};
use crate::errors::{Error, Result};
use crate::log::*;

/// Bounds required of the keys of a [`ResolverDatabase`]
pub trait ResolverKey:
    Clone + Eq + std::hash::Hash + Ord + std::fmt::Debug + std::fmt::Display
{
}
impl<T: Clone + Eq + std::hash::Hash + Ord + std::fmt::Debug + std::fmt::Display> ResolverKey
    for T
{
}

/// A flattened description of an object, referring to other objects by key.
pub trait Stub<K: ResolverKey>: Sized {
    /// Where resolved objects live
    type Arena;
    /// A stable reference to a resolved object within the arena
    type Handle: Copy + std::fmt::Debug;

    /// A transparent alias stands for whatever its target resolves to, and never becomes an object
    /// of its own.
    fn alias_of(&self) -> Option<&K> {
        None
    }

    /// Allocate the slot that the object will be resolved into. References to this object made
    /// while it is being resolved receive this handle.
    fn reserve(&self, arena: &mut Self::Arena) -> Self::Handle;

    /// Fill in the slot at `handle`, resolving referenced keys through `resolver`
    fn resolve(&self, handle: Self::Handle, resolver: &mut Resolver<'_, K, Self>) -> Result<()>;
}

/// A table of stubs, along with a distinguished root key
#[derive(Debug)]
pub struct ResolverDatabase<K: ResolverKey, S> {
    stubs: UnorderedMap<K, S>,
    root_key: Option<K>,
}

impl<K: ResolverKey, S> Default for ResolverDatabase<K, S> {
    fn default() -> Self {
        Self {
            stubs: Default::default(),
            root_key: None,
        }
    }
}

impl<K: ResolverKey, S: Stub<K>> ResolverDatabase<K, S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self, key: &K) -> bool {
        self.stubs.contains_key(key)
    }

    pub fn lookup(&self, key: &K) -> Option<&S> {
        self.stubs.get(key)
    }

    /// Add a stub, replacing any previous stub at `key`
    pub fn make_record(&mut self, key: K, stub: S) {
        self.stubs.insert(key, stub);
    }

    /// Add a stub only if `key` is not yet present. Returns whether it was added.
    pub fn try_add(&mut self, key: K, stub: S) -> bool {
        if self.exists(&key) {
            false
        } else {
            self.stubs.insert(key, stub);
            true
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<S> {
        self.stubs.remove(key)
    }

    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }

    pub fn has_root_key(&self) -> bool {
        self.root_key.is_some()
    }

    pub fn root_key(&self) -> Option<&K> {
        self.root_key.as_ref()
    }

    /// Set the root key. There can be only one root.
    pub fn set_root_key(&mut self, key: K) -> Result<()> {
        match &self.root_key {
            Some(prev) if *prev != key => Err(Error::DuplicateRootKey(
                prev.to_string(),
                key.to_string(),
            )),
            _ => {
                self.root_key = Some(key);
                Ok(())
            }
        }
    }

    /// Start a resolution session that materializes objects into `arena`
    pub fn resolver(&self, arena: S::Arena) -> Resolver<'_, K, S> {
        Resolver {
            db: self,
            arena,
            records: Default::default(),
        }
    }

    /// Resolve everything reachable from the root key, returning the populated arena and the
    /// handle of the root object.
    pub fn resolve_root(&self, arena: S::Arena) -> Result<(S::Arena, S::Handle)> {
        let root = self.root_key.as_ref().ok_or(Error::NoRootKey)?;
        let mut resolver = self.resolver(arena);
        let handle = resolver.resolve(root)?;
        Ok((resolver.into_arena(), handle))
    }
}

/// Where a key is in its resolution
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ResolverRecord<H> {
    /// Reserved, fields still being populated
    Resolving(H),
    Resolved(H),
}

/// One resolution session over a [`ResolverDatabase`].
pub struct Resolver<'db, K: ResolverKey, S: Stub<K>> {
    db: &'db ResolverDatabase<K, S>,
    pub arena: S::Arena,
    records: UnorderedMap<K, ResolverRecord<S::Handle>>,
}

impl<'db, K: ResolverKey, S: Stub<K>> Resolver<'db, K, S> {
    pub fn db(&self) -> &'db ResolverDatabase<K, S> {
        self.db
    }

    /// The key that `key` stands for once all transparent aliases are followed
    pub fn dealias<'k>(&self, key: &'k K) -> Result<&'k K>
    where
        'db: 'k,
    {
        let mut cur = key;
        let mut seen: UnorderedSet<&K> = UnorderedSet::new();
        loop {
            let stub = self
                .db
                .lookup(cur)
                .ok_or_else(|| Error::MissingKey(cur.to_string()))?;
            match stub.alias_of() {
                Some(next) => {
                    trace!("Following alias"; "from" => %cur, "to" => %next);
                    if !seen.insert(cur) {
                        return Err(Error::UnexpectedObject {
                            key: key.to_string(),
                            expected: "finite alias chain",
                        });
                    }
                    cur = next;
                }
                None => return Ok(cur),
            }
        }
    }

    /// Resolve `key`, returning the handle to its object. Repeated resolution of the same key
    /// (including re-entrant resolution from within its own references) returns the same handle.
    pub fn resolve(&mut self, key: &K) -> Result<S::Handle> {
        let db = self.db;
        let key = self.dealias(key)?;
        match self.records.get(key) {
            Some(ResolverRecord::Resolved(h)) => return Ok(*h),
            Some(ResolverRecord::Resolving(h)) => {
                debug!("Cycle while resolving; returning partial object"; "key" => %key);
                return Ok(*h);
            }
            None => {}
        }
        let stub = db
            .lookup(key)
            .ok_or_else(|| Error::MissingKey(key.to_string()))?;
        let handle = stub.reserve(&mut self.arena);
        trace!("Resolving"; "key" => %key, "handle" => ?handle);
        self.records
            .insert(key.clone(), ResolverRecord::Resolving(handle));
        stub.resolve(handle, self)?;
        self.records
            .insert(key.clone(), ResolverRecord::Resolved(handle));
        Ok(handle)
    }

    pub fn resolve_many<'k>(&mut self, keys: impl IntoIterator<Item = &'k K>) -> Result<Vec<S::Handle>>
    where
        K: 'k,
    {
        keys.into_iter().map(|k| self.resolve(k)).collect()
    }

    fn record(&self, key: &K) -> Option<&ResolverRecord<S::Handle>> {
        self.dealias(key).ok().and_then(|k| self.records.get(k))
    }

    /// Whether `key` (or what it aliases) has been fully resolved in this session
    pub fn is_resolved(&self, key: &K) -> bool {
        matches!(self.record(key), Some(ResolverRecord::Resolved(_)))
    }

    /// Whether `key` (or what it aliases) is reserved but its fields are still being populated
    pub fn is_resolving(&self, key: &K) -> bool {
        matches!(self.record(key), Some(ResolverRecord::Resolving(_)))
    }

    pub fn into_arena(self) -> S::Arena {
        self.arena
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A tiny linked-list-like object graph
    #[derive(Debug)]
    enum TestStub {
        Node { next: Option<String>, value: u32 },
        Alias(String),
    }

    #[derive(Debug, Default)]
    struct Nodes {
        slots: Vec<(u32, Option<usize>)>,
    }

    impl Stub<String> for TestStub {
        type Arena = Nodes;
        type Handle = usize;

        fn alias_of(&self) -> Option<&String> {
            match self {
                TestStub::Alias(k) => Some(k),
                TestStub::Node { .. } => None,
            }
        }

        fn reserve(&self, arena: &mut Nodes) -> usize {
            arena.slots.push((0, None));
            arena.slots.len() - 1
        }

        fn resolve(&self, handle: usize, r: &mut Resolver<'_, String, Self>) -> Result<()> {
            if let TestStub::Node { next, value } = self {
                let next = match next {
                    Some(k) => Some(r.resolve(k)?),
                    None => None,
                };
                r.arena.slots[handle] = (*value, next);
            }
            Ok(())
        }
    }

    fn node(next: Option<&str>, value: u32) -> TestStub {
        TestStub::Node {
            next: next.map(String::from),
            value,
        }
    }

    #[test]
    fn cycles_return_the_same_handle() {
        let mut db = ResolverDatabase::new();
        db.make_record("a".to_string(), node(Some("b"), 1));
        db.make_record("b".to_string(), node(Some("a"), 2));
        db.set_root_key("a".to_string()).unwrap();
        let (nodes, root) = db.resolve_root(Nodes::default()).unwrap();
        assert_eq!(nodes.slots.len(), 2);
        let (v, next) = nodes.slots[root];
        assert_eq!(v, 1);
        let (v2, back) = nodes.slots[next.unwrap()];
        assert_eq!(v2, 2);
        assert_eq!(back, Some(root));
    }

    #[test]
    fn self_reference() {
        let mut db = ResolverDatabase::new();
        db.make_record("a".to_string(), node(Some("a"), 7));
        let mut r = db.resolver(Nodes::default());
        let h = r.resolve(&"a".to_string()).unwrap();
        assert!(r.is_resolved(&"a".to_string()));
        // Resolving again reuses the object
        assert_eq!(r.resolve(&"a".to_string()).unwrap(), h);
        let nodes = r.into_arena();
        assert_eq!(nodes.slots, vec![(7, Some(h))]);
    }

    #[test]
    fn aliases_are_transparent() {
        let mut db = ResolverDatabase::new();
        db.make_record("x".to_string(), node(None, 3));
        db.make_record("y".to_string(), TestStub::Alias("x".to_string()));
        db.make_record("z".to_string(), TestStub::Alias("y".to_string()));
        let mut r = db.resolver(Nodes::default());
        let hz = r.resolve(&"z".to_string()).unwrap();
        let hx = r.resolve(&"x".to_string()).unwrap();
        assert_eq!(hz, hx);
        assert_eq!(r.arena.slots.len(), 1);

        db.make_record("loop".to_string(), TestStub::Alias("loop".to_string()));
        let mut r = db.resolver(Nodes::default());
        assert!(r.resolve(&"loop".to_string()).is_err());
    }

    #[test]
    fn missing_keys_and_roots() {
        let mut db: ResolverDatabase<String, TestStub> = ResolverDatabase::new();
        assert!(matches!(
            db.resolve_root(Nodes::default()),
            Err(Error::NoRootKey)
        ));
        db.make_record("a".to_string(), node(Some("nowhere"), 1));
        db.set_root_key("a".to_string()).unwrap();
        assert!(matches!(
            db.resolve_root(Nodes::default()),
            Err(Error::MissingKey(k)) if k == "nowhere"
        ));
        assert!(matches!(
            db.set_root_key("b".to_string()),
            Err(Error::DuplicateRootKey(..))
        ));
        assert!(!db.try_add("a".to_string(), node(None, 0)));
        assert!(db.try_add("b".to_string(), node(None, 0)));
        assert!(db.remove(&"b".to_string()).is_some());
    }
}
