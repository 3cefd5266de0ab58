use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sea-ORM entity for the `emails` table.
///
/// The generated `document_with_idx` search column is maintained by Postgres
/// and not mapped here.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "emails")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub email_id: Uuid,
    pub address_from: String,
    pub address_to: String,
    pub subject: String,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::models::Email {
    fn from(model: Model) -> Self {
        Self {
            id: model.email_id,
            from: model.address_from,
            to: model.address_to,
            subject: model.subject,
            message: model.message,
            created_at: model.created_at.into(),
        }
    }
}
