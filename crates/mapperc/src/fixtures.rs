//! Entity models shared by unit tests.

use crate::metadata::{
    EntityDescriptor, EntityModel, IdGeneration, JoinDescriptor, JoinTable, PropertyDescriptor,
    PropertyType,
};

pub(crate) fn department() -> EntityModel {
    EntityModel::new(EntityDescriptor::new("Department", "t_department").alias("d"))
        .with_property(PropertyDescriptor::new("id", "id", PropertyType::Integer).id(IdGeneration::Identity))
        .with_property(PropertyDescriptor::new("name", "name", PropertyType::Text).not_null())
}

/// `User` on `t_user u`: identity id, nullable name/email, a department join and two
/// collection properties (one without join metadata).
pub(crate) fn user() -> EntityModel {
    EntityModel::new(
        EntityDescriptor::new("User", "t_user")
            .type_name("com.example.User")
            .alias("u"),
    )
    .with_property(
        PropertyDescriptor::new("id", "id", PropertyType::Integer)
            .id(IdGeneration::Identity)
            .java_type("java.lang.Long"),
    )
    .with_property(PropertyDescriptor::new("name", "name", PropertyType::Text))
    .with_property(PropertyDescriptor::new("age", "age", PropertyType::Integer).not_null())
    .with_property(PropertyDescriptor::new("email", "email", PropertyType::Text))
    .with_property(PropertyDescriptor::new("active", "active", PropertyType::Boolean).not_null())
    .with_property(PropertyDescriptor::new("status", "status", PropertyType::Text).not_null())
    .with_property(PropertyDescriptor::new("createdAt", "created_at", PropertyType::Temporal).not_null())
    .with_property(
        PropertyDescriptor::new("roles", "id", PropertyType::Other).to_many(Some(JoinTable {
            table: "t_user_role".to_string(),
            owner_column: "user_id".to_string(),
            inverse_column: "role_id".to_string(),
        })),
    )
    .with_property(PropertyDescriptor::new("tags", "id", PropertyType::Other).to_many(None))
    .association(
        JoinDescriptor::new("department", "t_department", "department").on("id", "department_id"),
        department(),
    )
}

/// `Order` with a composite `(tenant_id, order_no)` id assigned by the caller.
pub(crate) fn order() -> EntityModel {
    EntityModel::new(EntityDescriptor::new("Order", "t_order").alias("o"))
        .with_property(
            PropertyDescriptor::new("id", "", PropertyType::Other)
                .id(IdGeneration::Assigned)
                .composite(vec![
                    PropertyDescriptor::new("tenant", "tenant_id", PropertyType::Integer).not_null(),
                    PropertyDescriptor::new("number", "order_no", PropertyType::Integer).not_null(),
                ]),
        )
        .with_property(PropertyDescriptor::new("total", "total", PropertyType::Decimal).not_null())
}

/// `Invoice` whose id comes from a sequence.
pub(crate) fn invoice() -> EntityModel {
    EntityModel::new(EntityDescriptor::new("Invoice", "t_invoice").alias("i"))
        .with_property(
            PropertyDescriptor::new("id", "id", PropertyType::Integer)
                .id(IdGeneration::Sequence("invoice_seq".to_string())),
        )
        .with_property(PropertyDescriptor::new("amount", "amount", PropertyType::Decimal))
}
