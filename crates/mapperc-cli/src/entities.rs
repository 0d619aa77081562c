use crate::config::{EntityConfig, PropertyConfig};
use heck::ToSnakeCase;
use mapperc::EntityModel;
use mapperc::metadata::{
    EntityDescriptor, IdGeneration, JoinDescriptor, JoinTable, PropertyDescriptor, PropertyType,
};
use std::collections::BTreeMap;

/// Build one [`EntityModel`] per configured entity, associations resolved.
///
/// Associations are expanded into nested models. An association leading back to an entity
/// already on the current path is left out at that depth, so bidirectional mappings terminate.
pub fn build_models(entities: &[EntityConfig]) -> anyhow::Result<BTreeMap<String, EntityModel>> {
    let by_name: BTreeMap<&str, &EntityConfig> =
        entities.iter().map(|e| (e.name.as_str(), e)).collect();

    let mut models = BTreeMap::new();
    for entity in entities {
        let model = build_model(entity, &by_name, &mut Vec::new())?;
        models.insert(entity.name.clone(), model);
    }
    Ok(models)
}

fn build_model<'a>(
    entity: &'a EntityConfig,
    by_name: &BTreeMap<&str, &'a EntityConfig>,
    path: &mut Vec<&'a str>,
) -> anyhow::Result<EntityModel> {
    path.push(entity.name.as_str());

    let mut descriptor = EntityDescriptor::new(&entity.name, &entity.table);
    if let Some(type_name) = &entity.type_name {
        descriptor = descriptor.type_name(type_name);
    }
    if let Some(schema) = &entity.schema {
        descriptor = descriptor.schema(schema);
    }
    if let Some(alias) = &entity.alias {
        descriptor = descriptor.alias(alias);
    }

    let mut model = EntityModel::new(descriptor);
    for property in &entity.properties {
        let property = build_property(property)
            .map_err(|e| anyhow::anyhow!("entity {}: {e}", entity.name))?;
        model = model.with_property(property);
    }

    for join in &entity.joins {
        let Some(target) = by_name.get(join.entity.as_str()) else {
            anyhow::bail!(
                "entity {}: join {} refers to unknown entity {}",
                entity.name,
                join.name,
                join.entity
            );
        };
        if join.on.is_empty() {
            anyhow::bail!("entity {}: join {} has no `on` columns", entity.name, join.name);
        }
        if path.contains(&target.name.as_str()) {
            tracing::debug!(
                entity = %entity.name,
                join = %join.name,
                target = %target.name,
                "skipping association back to an entity on the current path"
            );
            continue;
        }

        let alias = join.alias.clone().unwrap_or_else(|| join.name.clone());
        let mut descriptor = JoinDescriptor::new(&join.name, &target.table, alias);
        for columns in &join.on {
            descriptor = descriptor.on(&columns.joined, &columns.owner);
        }
        let target_model = build_model(target, by_name, path)?;
        model = model.association(descriptor, target_model);
    }

    path.pop();
    Ok(model)
}

fn build_property(config: &PropertyConfig) -> anyhow::Result<PropertyDescriptor> {
    let column = config
        .column
        .clone()
        .unwrap_or_else(|| config.name.to_snake_case());
    let ty = PropertyType::parse(&config.type_name).ok_or_else(|| {
        anyhow::anyhow!("property {}: unknown type {}", config.name, config.type_name)
    })?;

    let mut property = PropertyDescriptor::new(&config.name, column, ty);
    if config.not_null {
        property = property.not_null();
    }
    if let Some(id) = &config.id {
        let generation = match (id.as_str(), &config.sequence) {
            ("assigned", _) => IdGeneration::Assigned,
            ("identity", _) => IdGeneration::Identity,
            ("sequence", Some(sequence)) => IdGeneration::Sequence(sequence.clone()),
            ("sequence", None) => {
                anyhow::bail!("property {}: id = \"sequence\" needs `sequence`", config.name)
            }
            (other, _) => anyhow::bail!(
                "property {}: id must be assigned, identity or sequence, got {other}",
                config.name
            ),
        };
        property = property.id(generation);
    }
    if let Some(java_type) = &config.java_type {
        property = property.java_type(java_type);
    }
    if let Some(jdbc_type) = &config.jdbc_type {
        property = property.jdbc_type(jdbc_type);
    }
    if let Some(handler) = &config.type_handler {
        property = property.type_handler(handler);
    }

    if !config.components.is_empty() {
        let components = config
            .components
            .iter()
            .map(build_property)
            .collect::<anyhow::Result<Vec<_>>>()?;
        property = property.composite(components);
    }

    if let Some(collection) = &config.collection {
        let join = match (
            &collection.table,
            &collection.owner_column,
            &collection.inverse_column,
        ) {
            (Some(table), Some(owner), Some(inverse)) => Some(JoinTable {
                table: table.clone(),
                owner_column: owner.clone(),
                inverse_column: inverse.clone(),
            }),
            _ => None,
        };
        property = property.to_many(join);
    }

    Ok(property)
}
