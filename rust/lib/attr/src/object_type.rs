//! Object types: the finalized schema table plus named methods.
//!
//! Types are built once through [`TypeBuilder`], which linearizes the
//! bases, runs the slot layout, binds magic methods and installs
//! class-level observers. After that the table only changes through
//! [`ObjectType::customize`], [`ObjectType::add_attribute`] and the
//! observer helpers, all of which keep slot indices stable.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Value as JsonValue, json};
use tracing::debug;

use crate::change::ChangeTypes;
use crate::config::BuildConfig;
use crate::error::{AttrError, Result};
use crate::extended::ExtendedObserver;
use crate::layout::{self, SchemaTable};
use crate::method::{Method, magic};
use crate::mode::{
    DefaultMode, GetMode, GetStateMode, PostGetMode, PostSetMode, PostValidateMode, ValidateMode,
};
use crate::observer::Observer;
use crate::schema::{AttributeSchema, SchemaEditor};

/// A type of attributed objects.
pub struct ObjectType {
    name: String,
    bases: Vec<Arc<ObjectType>>,
    /// Linearized ancestry, most specific first, excluding this type.
    ancestors: Vec<Arc<ObjectType>>,
    table: RwLock<SchemaTable>,
    methods: IndexMap<String, Method>,
}

impl ObjectType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bases(&self) -> &[Arc<ObjectType>] {
        &self.bases
    }

    pub fn ancestors(&self) -> &[Arc<ObjectType>] {
        &self.ancestors
    }

    /// Names of this type and its ancestors in resolution order.
    pub fn mro(&self) -> Vec<String> {
        std::iter::once(self.name.clone())
            .chain(self.ancestors.iter().map(|t| t.name.clone()))
            .collect()
    }

    pub fn is_subtype_of(&self, other: &Arc<ObjectType>) -> bool {
        std::ptr::eq(self, other.as_ref()) || self.ancestors.iter().any(|t| Arc::ptr_eq(t, other))
    }

    /// Number of storage slots an instance needs.
    pub fn slot_count(&self) -> usize {
        self.table.read().attrs.len()
    }

    /// All schemas in declaration order.
    pub fn schemas(&self) -> Vec<Arc<AttributeSchema>> {
        self.table.read().attrs.values().cloned().collect()
    }

    pub fn schema(&self, name: &str) -> Option<Arc<AttributeSchema>> {
        self.table.read().attrs.get(name).cloned()
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.table.read().attrs.keys().cloned().collect()
    }

    /// Whether `name` was declared, overridden or re-slotted by this type
    /// rather than inherited unchanged.
    pub fn is_specific(&self, name: &str) -> bool {
        self.table.read().specific.contains(name)
    }

    /// Whether this type may mutate `schema` in place.
    pub fn owns(&self, schema: &AttributeSchema) -> bool {
        self.table.read().owned.contains(&schema.id())
    }

    pub(crate) fn specific_schemas(&self) -> Vec<(String, Arc<AttributeSchema>)> {
        let table = self.table.read();
        table
            .specific
            .iter()
            .filter_map(|name| Some((name.clone(), table.attrs.get(name)?.clone())))
            .collect()
    }

    /// Resolve a named method through the linearized ancestry.
    pub fn lookup_method(&self, name: &str) -> Option<Method> {
        self.methods.get(name).cloned().or_else(|| {
            self.ancestors
                .iter()
                .find_map(|t| t.methods.get(name).cloned())
        })
    }

    fn no_attribute(&self, name: &str) -> AttrError {
        AttrError::NoSuchAttribute {
            type_name: self.name.clone(),
            attribute: name.to_string(),
        }
    }

    // ── Mutation ────────────────────────────────────────────────────

    /// Apply `f` to the schema of `name`, cloning it first if this type
    /// does not own it. Types sharing the original are unaffected. This is
    /// the only way to change a schema once it belongs to a type.
    pub fn customize(
        &self,
        name: &str,
        f: impl FnOnce(&SchemaEditor<'_>) -> Result<()>,
    ) -> Result<Arc<AttributeSchema>> {
        let schema = {
            let mut table = self.table.write();
            let current = table
                .attrs
                .get(name)
                .cloned()
                .ok_or_else(|| self.no_attribute(name))?;
            if table.owned.contains(&current.id()) {
                current
            } else {
                debug!(type_name = %self.name, attribute = name, "copy-on-write schema");
                let copy = Arc::new(current.as_ref().clone());
                table.adopt(name, copy)
            }
        };
        f(&SchemaEditor::new(schema.as_ref()))?;
        Ok(schema)
    }

    /// Add or replace an attribute after construction. A replacement keeps
    /// the slot and static observers of the schema it replaces; a new
    /// attribute takes the next slot. Existing instances have no storage
    /// for a new slot.
    pub fn add_attribute(
        &self,
        name: &str,
        schema: impl Into<Arc<AttributeSchema>>,
    ) -> Result<Arc<AttributeSchema>> {
        let schema = schema.into();
        schema.check()?;
        let mut table = self.table.write();
        let previous = table.attrs.get(name).cloned();
        let next = table.attrs.len();
        let schema = table.adopt(name, schema);
        schema.set_name(name);
        match previous {
            Some(old) => {
                schema.set_index(old.index());
                schema.copy_static_observers(&old);
            }
            None => schema.set_index(next),
        }
        debug!(type_name = %self.name, attribute = name, index = schema.index(), "attribute added");
        Ok(schema)
    }

    /// Register a class-level observer. Dotted paths follow the object held
    /// by the first attribute of every instance.
    pub fn add_static_observer(&self, path: &str, observer: Observer) -> Result<()> {
        self.add_static_observer_with(path, observer, ChangeTypes::all())
    }

    pub fn add_static_observer_with(
        &self,
        path: &str,
        observer: Observer,
        types: ChangeTypes,
    ) -> Result<()> {
        match path.split_once('.') {
            None => {
                self.customize(path, |schema| {
                    schema.add_static_observer_with(observer, types);
                    Ok(())
                })?;
            }
            Some((head, rest)) => {
                let ext = Arc::new(ExtendedObserver::new(rest, observer, types));
                self.customize(head, |schema| {
                    schema.add_static_observer_with(
                        Observer::Extended(ext),
                        ExtendedObserver::head_types(),
                    );
                    Ok(())
                })?;
            }
        }
        Ok(())
    }

    pub fn remove_static_observer(&self, path: &str, observer: &Observer) -> Result<()> {
        let (head, target) = match path.split_once('.') {
            None => (path, observer.clone()),
            Some((head, rest)) => (
                head,
                Observer::Extended(Arc::new(ExtendedObserver::new(
                    rest,
                    observer.clone(),
                    ChangeTypes::all(),
                ))),
            ),
        };
        self.customize(head, |schema| {
            schema.remove_static_observer(&target);
            Ok(())
        })?;
        Ok(())
    }

    /// Reset the cached property `property` whenever one of `dependencies`
    /// is created, updated or deleted.
    pub fn invalidate_on(&self, property: &str, dependencies: &[&str]) -> Result<()> {
        let schema = self.schema(property).ok_or_else(|| self.no_attribute(property))?;
        if !matches!(schema.get_mode(), GetMode::CachedProperty(_) | GetMode::Property(_)) {
            return Err(AttrError::config(format!(
                "'{}.{}' is not a property",
                self.name, property
            )));
        }
        let property = property.to_string();
        let observer = Observer::new(move |change| change.object.reset_property(&property));
        for dependency in dependencies {
            self.add_static_observer_with(
                dependency,
                observer.clone(),
                ChangeTypes::CREATE | ChangeTypes::UPDATE | ChangeTypes::DELETE,
            )?;
        }
        Ok(())
    }

    // ── Build-time passes ───────────────────────────────────────────

    /// Bind methods whose names start with a magic prefix to the attribute
    /// named by the rest of the method name.
    fn bind_magic_methods(&self) -> Result<()> {
        let mut bound = 0;
        for (method_name, method) in &self.methods {
            let Some((prefix, attr)) = split_magic(method_name) else {
                continue;
            };
            if self.schema(attr).is_none() {
                debug!(type_name = %self.name, method = %method_name, "magic method without attribute");
                continue;
            }
            let expected = match prefix {
                magic::DEFAULT => "getter",
                magic::VALIDATE | magic::POST_VALIDATE => "validator",
                magic::POST_GETATTR => "post-getter",
                magic::POST_SETATTR => "post-setter",
                magic::GETSTATE => "state predicate",
                _ => "observer",
            };
            if method.shape() != expected {
                return Err(AttrError::config(format!(
                    "magic method '{}.{}' is a {}, expected a {}",
                    self.name,
                    method_name,
                    method.shape(),
                    expected
                )));
            }
            let name = method_name.clone();
            if prefix == magic::OBSERVE {
                self.add_static_observer(attr, Observer::Method(name))?;
            } else {
                self.customize(attr, |schema| match prefix {
                    magic::DEFAULT => schema.set_default_mode(DefaultMode::ObjectMethod(name)),
                    magic::VALIDATE => schema.set_validate_mode(ValidateMode::ObjectMethod(name)),
                    magic::POST_VALIDATE => {
                        schema.set_post_validate_mode(PostValidateMode::ObjectMethod(name))
                    }
                    magic::POST_GETATTR => schema.set_post_get_mode(PostGetMode::ObjectMethod(name)),
                    magic::POST_SETATTR => schema.set_post_set_mode(PostSetMode::ObjectMethod(name)),
                    _ => schema.set_getstate_mode(GetStateMode::ObjectMethod(name)),
                })?;
            }
            bound += 1;
        }
        if bound > 0 {
            debug!(type_name = %self.name, bound, "bound magic methods");
        }
        Ok(())
    }

    /// Every property without a getter function needs a `_get_<name>` method.
    fn check_property_getters(&self) -> Result<()> {
        for (name, schema) in self.table.read().attrs.iter() {
            let needs_method = matches!(
                schema.get_mode(),
                GetMode::Property(None) | GetMode::CachedProperty(None)
            );
            if needs_method && self.lookup_method(&format!("{}{}", magic::GET, name)).is_none() {
                return Err(AttrError::config(format!(
                    "property '{}.{}' has no getter and no '{}{}' method",
                    self.name,
                    name,
                    magic::GET,
                    name
                )));
            }
        }
        Ok(())
    }

    // ── Introspection ───────────────────────────────────────────────

    /// JSON description of the type: name, bases, linearization, slot
    /// count and every schema with its specific flag.
    pub fn describe(&self) -> JsonValue {
        let table = self.table.read();
        let attributes: Vec<JsonValue> = table
            .attrs
            .iter()
            .map(|(name, schema)| {
                let mut ir = schema.describe();
                ir["specific"] = json!(table.specific.contains(name));
                ir
            })
            .collect();
        json!({
            "name": self.name,
            "bases": self.bases.iter().map(|b| b.name.clone()).collect::<Vec<_>>(),
            "mro": self.mro(),
            "slots": table.attrs.len(),
            "attributes": attributes,
            "methods": self.methods.keys().collect::<Vec<_>>(),
        })
    }
}

/// Longest magic prefix of `method` followed by a non-empty attribute name.
fn split_magic(method: &str) -> Option<(&'static str, &str)> {
    // Ordered so that `_post_validate_` wins over `_validate_`.
    const PREFIXES: [&str; 7] = [
        magic::POST_VALIDATE,
        magic::POST_GETATTR,
        magic::POST_SETATTR,
        magic::DEFAULT,
        magic::VALIDATE,
        magic::GETSTATE,
        magic::OBSERVE,
    ];
    PREFIXES.iter().find_map(|prefix| {
        method
            .strip_prefix(prefix)
            .filter(|attr| !attr.is_empty())
            .map(|attr| (*prefix, attr))
    })
}

impl fmt::Debug for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectType")
            .field("name", &self.name)
            .field("mro", &self.mro())
            .field("attributes", &self.attribute_names())
            .finish()
    }
}

// ── TypeBuilder ─────────────────────────────────────────────────────

/// Declares a new [`ObjectType`].
///
/// ```ignore
/// let point = TypeBuilder::new("Point")
///     .attr("x", AttributeSchema::new().typed::<i64>().with_default(0i64))
///     .attr("y", AttributeSchema::new().typed::<i64>().with_default(0i64))
///     .build()?;
/// ```
pub struct TypeBuilder {
    name: String,
    bases: Vec<Arc<ObjectType>>,
    attrs: IndexMap<String, Arc<AttributeSchema>>,
    methods: IndexMap<String, Method>,
    observers: Vec<(String, Observer, ChangeTypes)>,
    config: BuildConfig,
}

impl TypeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
            attrs: IndexMap::new(),
            methods: IndexMap::new(),
            observers: Vec::new(),
            config: BuildConfig::default(),
        }
    }

    pub fn base(mut self, base: &Arc<ObjectType>) -> Self {
        self.bases.push(base.clone());
        self
    }

    /// Declare an attribute. Passing the same `Arc` under two names gives
    /// each name its own copy.
    pub fn attr(mut self, name: impl Into<String>, schema: impl Into<Arc<AttributeSchema>>) -> Self {
        self.attrs.insert(name.into(), schema.into());
        self
    }

    pub fn method(mut self, name: impl Into<String>, method: Method) -> Self {
        self.methods.insert(name.into(), method);
        self
    }

    /// Class-level observer installed once the table is built.
    pub fn observe(self, path: impl Into<String>, observer: Observer) -> Self {
        self.observe_with(path, observer, ChangeTypes::all())
    }

    pub fn observe_with(
        mut self,
        path: impl Into<String>,
        observer: Observer,
        types: ChangeTypes,
    ) -> Self {
        self.observers.push((path.into(), observer, types));
        self
    }

    pub fn with_config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Arc<ObjectType>> {
        for (name, schema) in &self.attrs {
            schema.check().map_err(|err| match err {
                AttrError::Configuration(msg) => {
                    AttrError::config(format!("'{}.{}': {}", self.name, name, msg))
                }
                other => other,
            })?;
        }
        let ancestors = layout::linearize(&self.name, &self.bases)?;
        let declared = self.attrs.len();
        let table = layout::build_table(&self.name, &ancestors, self.attrs.into_iter().collect())?;

        let ty = Arc::new(ObjectType {
            name: self.name,
            bases: self.bases,
            ancestors,
            table: RwLock::new(table),
            methods: self.methods,
        });
        if self.config.bind_magic_methods {
            ty.bind_magic_methods()?;
        }
        if self.config.check_property_getters {
            ty.check_property_getters()?;
        }
        for (path, observer, types) in self.observers {
            ty.add_static_observer_with(&path, observer, types)?;
        }
        debug!(
            type_name = %ty.name,
            declared,
            slots = ty.slot_count(),
            mro = ?ty.mro(),
            "type built"
        );
        Ok(ty)
    }
}
