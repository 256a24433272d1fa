//! Schema registry with lazy type loading.
//!
//! Types are looked up by name. Without a loader every type is collected
//! and validated when the schema is built. With a loader, types are loaded
//! on first lookup and cached, so a name maps to one instance for the
//! schema's lifetime.

use crate::definition::type_::{Type, TypeRef};
use crate::error::{SchemaError, SchemaResult};
use indexmap::IndexMap;
use sage_core::{Warning, WarningId};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, ThreadId};

/// What a type loader hands back
pub enum LoadedType {
    /// The type itself
    Type(Type),
    /// Thunk producing the type, invoked once
    Thunk(Box<dyn FnOnce() -> Type + Send>),
}

impl LoadedType {
    /// Thunk variant
    #[must_use]
    pub fn thunk<F>(thunk: F) -> Self
    where
        F: FnOnce() -> Type + Send + 'static,
    {
        Self::Thunk(Box::new(thunk))
    }
}

impl From<Type> for LoadedType {
    fn from(t: Type) -> Self {
        Self::Type(t)
    }
}

/// Loads a type by name; `None` if the name is unknown
pub type TypeLoader = Arc<dyn Fn(&str) -> Option<LoadedType> + Send + Sync>;

enum Slot {
    Loading { owner: ThreadId, cyclic: bool },
    Ready(Type),
}

struct SchemaInner {
    loader: Option<TypeLoader>,
    types: RwLock<IndexMap<String, Slot>>,
    fully_loaded: AtomicBool,
}

/// Name-keyed type registry. Cloning shares the registry.
#[derive(Clone)]
pub struct Schema {
    inner: Arc<SchemaInner>,
}

impl Schema {
    /// Start building a schema
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Check if a type loader is configured
    #[must_use]
    pub fn has_type_loader(&self) -> bool {
        self.inner.loader.is_some()
    }

    /// Look up a type by name, loading it on first use.
    ///
    /// # Errors
    ///
    /// Returns error if the loader misbehaves: wrong name, wrapping type, or
    /// a re-entrant lookup of a name that is still loading
    pub fn get_type(&self, name: &str) -> SchemaResult<Option<Type>> {
        let me = thread::current().id();
        {
            let mut types = self.write();
            match types.get_mut(name) {
                Some(Slot::Ready(t)) => return Ok(Some(t.clone())),
                Some(Slot::Loading { owner, cyclic }) if *owner == me => {
                    *cyclic = true;
                    return Err(SchemaError::CyclicLoad {
                        name: name.to_string(),
                    });
                }
                // Another thread is loading; load independently, first insert wins.
                Some(Slot::Loading { .. }) => {}
                None => {
                    if self.inner.loader.is_none() {
                        return Ok(None);
                    }
                    types.insert(
                        name.to_string(),
                        Slot::Loading {
                            owner: me,
                            cyclic: false,
                        },
                    );
                }
            }
        }
        let Some(loader) = self.inner.loader.clone() else {
            return Ok(None);
        };

        let mut guard = LoadingGuard {
            schema: self,
            name,
            owner: me,
            armed: true,
        };
        let loaded = self.load(&loader, name)?;

        let mut types = self.write();
        if let Some(Slot::Loading { owner, cyclic: true }) = types.get(name) {
            if *owner == me {
                return Err(SchemaError::CyclicLoad {
                    name: name.to_string(),
                });
            }
        }
        let Some(loaded) = loaded else {
            return Ok(None);
        };
        if let Some(Slot::Ready(existing)) = types.get(name) {
            return Ok(Some(existing.clone()));
        }
        types.insert(name.to_string(), Slot::Ready(loaded.clone()));
        guard.armed = false;
        drop(types);
        tracing::debug!(type_name = name, "type loaded");

        // Validated once cached, so cyclic references find it ready.
        if let Type::Entity(entity) = &loaded {
            if let Err(err) = entity.assert_valid(self) {
                self.evict(name, &loaded);
                return Err(err);
            }
        }
        Ok(Some(loaded))
    }

    fn evict(&self, name: &str, t: &Type) {
        let mut types = self.write();
        if let Some(Slot::Ready(existing)) = types.get(name) {
            if existing.is_same(t) {
                types.shift_remove(name);
            }
        }
    }

    /// Check if a type exists.
    ///
    /// # Errors
    ///
    /// Same as [`Schema::get_type`]
    pub fn has_type(&self, name: &str) -> SchemaResult<bool> {
        Ok(self.get_type(name)?.is_some())
    }

    /// Collect every type reachable from the registered ones.
    ///
    /// Expensive with a type loader, which triggers a `FULL_SCHEMA_SCAN`
    /// warning.
    ///
    /// # Errors
    ///
    /// Returns error on unknown references or two instances under one name
    pub fn type_map(&self) -> SchemaResult<IndexMap<String, Type>> {
        if self.inner.loader.is_some() {
            Warning::warn(
                "Full schema scan requested on a lazily loaded schema; every reachable type will be loaded",
                WarningId::FULL_SCHEMA_SCAN,
            );
        }

        let seeds: Vec<Type> = self
            .read()
            .values()
            .filter_map(|slot| match slot {
                Slot::Ready(t) => Some(t.clone()),
                Slot::Loading { .. } => None,
            })
            .collect();

        let mut map = IndexMap::new();
        let mut pending: Vec<String> = Vec::new();
        for t in &seeds {
            self.collect(t, &mut map, &mut pending)?;
        }
        while let Some(name) = pending.pop() {
            if map.contains_key(&name) {
                continue;
            }
            let t = self
                .get_type(&name)?
                .ok_or_else(|| SchemaError::UnknownType { name: name.clone() })?;
            self.collect(&t, &mut map, &mut pending)?;
        }

        {
            let mut types = self.write();
            for (name, t) in &map {
                match types.get(name) {
                    Some(Slot::Ready(existing)) if !existing.is_same(t) => {
                        return Err(SchemaError::DuplicateType { name: name.clone() });
                    }
                    Some(Slot::Ready(_)) => {}
                    _ => {
                        types.insert(name.clone(), Slot::Ready(t.clone()));
                    }
                }
            }
        }
        self.inner.fully_loaded.store(true, Ordering::Release);
        Ok(map)
    }

    /// Check whether [`Schema::type_map`] has completed at least once
    #[must_use]
    pub fn is_fully_loaded(&self) -> bool {
        self.inner.fully_loaded.load(Ordering::Acquire)
    }

    fn collect(
        &self,
        t: &Type,
        map: &mut IndexMap<String, Type>,
        pending: &mut Vec<String>,
    ) -> SchemaResult<()> {
        let follow = |r: &TypeRef,
                      map: &mut IndexMap<String, Type>,
                      pending: &mut Vec<String>|
         -> SchemaResult<()> {
            match r {
                TypeRef::Named(name) => {
                    pending.push(name.clone());
                    Ok(())
                }
                other => self.collect(&other.resolve(self)?, map, pending),
            }
        };

        match t {
            Type::NonNull(n) => follow(n.of_type_ref(), map, pending),
            Type::ListOf(l) => follow(l.of_type_ref(), map, pending),
            Type::Scalar(_) | Type::Entity(_) => {
                let Some(name) = t.name() else {
                    return Ok(());
                };
                if let Some(existing) = map.get(name) {
                    if existing.is_same(t) {
                        return Ok(());
                    }
                    return Err(SchemaError::DuplicateType {
                        name: name.to_string(),
                    });
                }
                map.insert(name.to_string(), t.clone());

                if let Type::Entity(entity) = t {
                    for argument in entity.arguments().values() {
                        follow(argument.type_ref(), map, pending)?;
                    }
                    for attribute in entity.attributes().values() {
                        if let Some(r) = attribute.type_ref() {
                            follow(r, map, pending)?;
                        }
                    }
                    for act in entity.acts().values() {
                        for argument in act.arguments().values() {
                            follow(argument.type_ref(), map, pending)?;
                        }
                    }
                    for link in entity.links().values() {
                        follow(link.links_to_ref(), map, pending)?;
                        for argument in link.arguments().values() {
                            follow(argument.type_ref(), map, pending)?;
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Validate every reachable type.
    ///
    /// With a loader, also checks that the loader returns the same instance
    /// as the one referenced from the type graph.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found
    pub fn assert_valid(&self) -> SchemaResult<()> {
        let map = self.type_map()?;
        for (name, t) in &map {
            if Type::is_standard_name(name) {
                continue;
            }
            if let Type::Entity(entity) = t {
                entity.assert_valid(self)?;
            }
            if let Some(loader) = &self.inner.loader {
                let fresh = self.load(loader, name)?;
                if !fresh.is_some_and(|f| f.is_same(t)) {
                    return Err(SchemaError::LoaderInstanceMismatch { name: name.clone() });
                }
            }
        }
        Ok(())
    }

    fn load(&self, loader: &TypeLoader, name: &str) -> SchemaResult<Option<Type>> {
        let t = match loader(name) {
            None => return Ok(None),
            Some(LoadedType::Type(t)) => t,
            Some(LoadedType::Thunk(thunk)) => thunk(),
        };
        match t.name() {
            None => Err(SchemaError::NotANamedType {
                name: name.to_string(),
                found: t.to_string(),
            }),
            Some(found) if found != name => Err(SchemaError::TypeNameMismatch {
                expected: name.to_string(),
                found: found.to_string(),
            }),
            Some(_) => Ok(Some(t)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<String, Slot>> {
        self.inner.types.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<String, Slot>> {
        self.inner.types.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.read().keys().cloned().collect();
        f.debug_struct("Schema")
            .field("types", &names)
            .field("lazy", &self.has_type_loader())
            .finish()
    }
}

/// Clears a loading marker if the load does not complete.
struct LoadingGuard<'a> {
    schema: &'a Schema,
    name: &'a str,
    owner: ThreadId,
    armed: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut types = self.schema.write();
        if let Some(Slot::Loading { owner, .. }) = types.get(self.name) {
            if *owner == self.owner {
                types.shift_remove(self.name);
            }
        }
    }
}

/// Builder for [`Schema`]
#[derive(Default)]
pub struct SchemaBuilder {
    types: Vec<Type>,
    loader: Option<TypeLoader>,
    assume_valid: bool,
}

impl SchemaBuilder {
    /// Empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type eagerly
    #[must_use]
    pub fn add_type(mut self, t: Type) -> Self {
        self.types.push(t);
        self
    }

    /// Register several types eagerly
    #[must_use]
    pub fn types(mut self, types: impl IntoIterator<Item = Type>) -> Self {
        self.types.extend(types);
        self
    }

    /// Load types lazily by name
    #[must_use]
    pub fn type_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn(&str) -> Option<LoadedType> + Send + Sync + 'static,
    {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Skip type validation of an eagerly scanned schema
    #[must_use]
    pub fn assume_valid(mut self, assume_valid: bool) -> Self {
        self.assume_valid = assume_valid;
        self
    }

    /// Register types and, without a loader, scan and validate them.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found
    pub fn build(self) -> SchemaResult<Schema> {
        let mut types: IndexMap<String, Slot> = IndexMap::new();
        for t in Type::standard_types().into_iter().chain(self.types) {
            let Some(name) = t.name().map(str::to_string) else {
                return Err(SchemaError::NotANamedType {
                    name: String::new(),
                    found: t.to_string(),
                });
            };
            if let Some(Slot::Ready(existing)) = types.get(&name) {
                if !existing.is_same(&t) {
                    return Err(SchemaError::DuplicateType { name });
                }
                continue;
            }
            types.insert(name, Slot::Ready(t));
        }

        let lazy = self.loader.is_some();
        let schema = Schema {
            inner: Arc::new(SchemaInner {
                loader: self.loader,
                types: RwLock::new(types),
                fully_loaded: AtomicBool::new(false),
            }),
        };

        if !lazy {
            if self.assume_valid {
                schema.type_map()?;
            } else {
                schema.assert_valid()?;
            }
        }
        tracing::debug!(types = schema.read().len(), lazy, "schema built");
        Ok(schema)
    }
}
