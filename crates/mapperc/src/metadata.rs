//! Entity metadata consumed by the compiler.
//!
//! The compiler never reflects over entity types itself. It asks an [`EntityResolver`] for
//! the column, nullability, declared type and id strategy of a property path, and for the
//! optional joins ("connectors") a path needs. [`EntityModel`] is an in-memory resolver that
//! callers (and the CLI) populate from their own metadata source.

use std::collections::BTreeMap;

/// Declared type category of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropertyType {
    Text,
    Integer,
    Decimal,
    Boolean,
    Temporal,
    Binary,
    Uuid,
    Enum,
    #[default]
    Other,
}

impl PropertyType {
    /// Whether case folding applies to values of this type.
    pub fn is_textual(self) -> bool {
        matches!(self, PropertyType::Text)
    }

    /// Parse the short names used in project files (`text`, `int`, `bool`, ...).
    pub fn parse(name: &str) -> Option<Self> {
        let ty = match name.to_ascii_lowercase().as_str() {
            "text" | "string" | "varchar" | "char" => Self::Text,
            "int" | "integer" | "long" | "short" | "bigint" | "smallint" => Self::Integer,
            "decimal" | "numeric" | "double" | "float" => Self::Decimal,
            "bool" | "boolean" => Self::Boolean,
            "date" | "time" | "timestamp" | "datetime" | "instant" => Self::Temporal,
            "binary" | "bytes" | "blob" => Self::Binary,
            "uuid" => Self::Uuid,
            "enum" => Self::Enum,
            "other" => Self::Other,
            _ => return None,
        };
        Some(ty)
    }
}

/// How an id value is produced on insert.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdGeneration {
    /// Assigned by the caller.
    #[default]
    Assigned,
    /// Database identity / auto-increment column.
    Identity,
    /// Drawn from a named sequence before insert.
    Sequence(String),
}

/// Join table backing a to-many association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTable {
    pub table: String,
    /// Column referencing the owning entity's id.
    pub owner_column: String,
    /// Column referencing the associated element.
    pub inverse_column: String,
}

/// Structural kind of a property.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PropertyKind {
    #[default]
    Scalar,
    /// Embedded value (e.g. a composite id); compared component-wise.
    Composite(Vec<PropertyDescriptor>),
    /// Collection association; join metadata may be missing.
    ToMany(Option<JoinTable>),
}

/// Resolved description of one property path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropertyDescriptor {
    /// Dotted property path (`department.name`).
    pub path: String,
    pub column: String,
    /// Alias of the joined table owning the column; `None` for the root entity.
    pub table_alias: Option<String>,
    pub nullable: bool,
    pub ty: PropertyType,
    pub java_type: Option<String>,
    pub jdbc_type: Option<String>,
    pub type_handler: Option<String>,
    pub kind: PropertyKind,
    pub is_id: bool,
    pub generation: IdGeneration,
}

impl PropertyDescriptor {
    /// A nullable scalar property.
    pub fn new(path: impl Into<String>, column: impl Into<String>, ty: PropertyType) -> Self {
        Self {
            path: path.into(),
            column: column.into(),
            nullable: true,
            ty,
            ..Self::default()
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn id(mut self, generation: IdGeneration) -> Self {
        self.is_id = true;
        self.nullable = false;
        self.generation = generation;
        self
    }

    pub fn java_type(mut self, ty: impl Into<String>) -> Self {
        self.java_type = Some(ty.into());
        self
    }

    pub fn jdbc_type(mut self, ty: impl Into<String>) -> Self {
        self.jdbc_type = Some(ty.into());
        self
    }

    pub fn type_handler(mut self, handler: impl Into<String>) -> Self {
        self.type_handler = Some(handler.into());
        self
    }

    /// Turn this property into an embedded value with the given components.
    ///
    /// Component paths are relative to this property (`orderId`, not `id.orderId`).
    pub fn composite(mut self, components: Vec<PropertyDescriptor>) -> Self {
        let prefix = self.path.clone();
        self.kind = PropertyKind::Composite(
            components
                .into_iter()
                .map(|mut c| {
                    c.path = format!("{prefix}.{}", c.path);
                    c
                })
                .collect(),
        );
        self
    }

    pub fn to_many(mut self, join: Option<JoinTable>) -> Self {
        self.kind = PropertyKind::ToMany(join);
        self
    }

    /// Last segment of the path.
    pub fn name(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.kind, PropertyKind::Composite(_))
    }

    /// Scalar columns of this property: itself, or its components.
    pub fn columns(&self) -> Vec<&PropertyDescriptor> {
        match &self.kind {
            PropertyKind::Composite(parts) => parts.iter().collect(),
            _ => vec![self],
        }
    }
}

/// Root entity description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Entity name (`User`).
    pub name: String,
    /// Fully qualified type name used for `resultMap type` / `parameterType`.
    pub type_name: String,
    pub schema: Option<String>,
    pub table: String,
    /// Correlation alias used in generated selects.
    pub alias: String,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        let name = name.into();
        let table = table.into();
        let alias = lower_first(&name);
        Self {
            type_name: name.clone(),
            name,
            schema: None,
            table,
            alias,
        }
    }

    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }
}

fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// An optional join that predicates may require.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinDescriptor {
    /// Connector name (the association property, `department`).
    pub name: String,
    pub table: String,
    pub alias: String,
    /// `(joined column, owner column)` pairs for the ON clause.
    pub on: Vec<(String, String)>,
    /// Alias of the owning side; `None` for the root entity.
    pub owner_alias: Option<String>,
}

impl JoinDescriptor {
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            alias: alias.into(),
            on: Vec::new(),
            owner_alias: None,
        }
    }

    pub fn on(mut self, joined_column: impl Into<String>, owner_column: impl Into<String>) -> Self {
        self.on.push((joined_column.into(), owner_column.into()));
        self
    }
}

/// Metadata collaborator consumed by the compiler.
pub trait EntityResolver: Send + Sync {
    /// The root entity.
    fn entity(&self) -> &EntityDescriptor;

    /// Resolve a dotted property path.
    fn property(&self, path: &str) -> Option<PropertyDescriptor>;

    /// Optional joins needed to reach `path`, outermost first.
    fn connectors(&self, _path: &str) -> Vec<String> {
        Vec::new()
    }

    /// Join clause metadata for a connector.
    fn join(&self, _connector: &str) -> Option<JoinDescriptor> {
        None
    }

    /// Persistent properties of the root entity in declaration order.
    fn properties(&self) -> Vec<PropertyDescriptor>;

    /// The id property, if the entity has one.
    fn id(&self) -> Option<PropertyDescriptor> {
        self.properties().into_iter().find(|p| p.is_id)
    }
}

/// In-memory [`EntityResolver`].
///
/// # Example
/// ```
/// use mapperc::metadata::{EntityDescriptor, EntityModel, EntityResolver, IdGeneration, PropertyDescriptor, PropertyType};
///
/// let user = EntityModel::new(EntityDescriptor::new("User", "t_user").alias("u"))
///     .with_property(PropertyDescriptor::new("id", "id", PropertyType::Integer).id(IdGeneration::Identity))
///     .with_property(PropertyDescriptor::new("name", "name", PropertyType::Text));
///
/// assert_eq!(user.property("name").unwrap().column, "name");
/// assert!(user.property("missing").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct EntityModel {
    entity: EntityDescriptor,
    properties: Vec<PropertyDescriptor>,
    associations: BTreeMap<String, (JoinDescriptor, EntityModel)>,
}

impl EntityModel {
    pub fn new(entity: EntityDescriptor) -> Self {
        Self {
            entity,
            properties: Vec::new(),
            associations: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    /// Register a to-one association reachable through an optional join.
    pub fn association(mut self, join: JoinDescriptor, target: EntityModel) -> Self {
        self.associations.insert(join.name.clone(), (join, target));
        self
    }

    fn resolve(&self, path: &str, alias: Option<&str>, prefix: &str) -> Option<PropertyDescriptor> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        if let Some(prop) = self.properties.iter().find(|p| p.path == head) {
            let mut found = match (rest, &prop.kind) {
                (None, _) => prop.clone(),
                (Some(rest), PropertyKind::Composite(parts)) => {
                    let full = format!("{head}.{rest}");
                    parts.iter().find(|p| p.path == full)?.clone()
                }
                _ => return None,
            };
            found.table_alias = alias.map(str::to_string);
            if !prefix.is_empty() {
                found.path = format!("{prefix}.{}", found.path);
            }
            return Some(found);
        }

        let (join, target) = self.associations.get(head)?;
        let next_prefix = if prefix.is_empty() {
            head.to_string()
        } else {
            format!("{prefix}.{head}")
        };
        target.resolve(rest?, Some(&join.alias), &next_prefix)
    }

    fn collect_connectors(&self, path: &str, out: &mut Vec<String>) {
        let Some((head, rest)) = path.split_once('.') else {
            return;
        };
        if self.properties.iter().any(|p| p.path == head) {
            return;
        }
        if let Some((join, target)) = self.associations.get(head) {
            out.push(join.name.clone());
            target.collect_connectors(rest, out);
        }
    }

    fn find_join(&self, connector: &str, owner: Option<&str>) -> Option<JoinDescriptor> {
        if let Some((join, _)) = self.associations.get(connector) {
            let mut join = join.clone();
            join.owner_alias = owner.map(str::to_string);
            return Some(join);
        }
        self.associations
            .values()
            .find_map(|(join, target)| target.find_join(connector, Some(&join.alias)))
    }
}

impl EntityResolver for EntityModel {
    fn entity(&self) -> &EntityDescriptor {
        &self.entity
    }

    fn property(&self, path: &str) -> Option<PropertyDescriptor> {
        self.resolve(path, None, "")
    }

    fn connectors(&self, path: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_connectors(path, &mut out);
        out
    }

    fn join(&self, connector: &str) -> Option<JoinDescriptor> {
        self.find_join(connector, None)
    }

    fn properties(&self) -> Vec<PropertyDescriptor> {
        self.properties
            .iter()
            .filter(|p| !matches!(p.kind, PropertyKind::ToMany(_)))
            .cloned()
            .collect()
    }
}
