use async_trait::async_trait;
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use uuid::Uuid;

use crate::{
    entity,
    error::{MailError, MailResult},
    models::{Email, NewEmail, Pagination},
    repository::EmailRepository,
};

/// Full-text predicate over the generated search column.
const SEARCH_PREDICATE: &str = "document_with_idx @@ websearch_to_tsquery('english', $1)";

pub struct PgEmailRepository {
    db: DatabaseConnection,
}

impl PgEmailRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn search_query(text: &str) -> sea_orm::Select<entity::Entity> {
        entity::Entity::find().filter(Expr::cust_with_values(SEARCH_PREDICATE, [text]))
    }
}

#[async_trait]
impl EmailRepository for PgEmailRepository {
    async fn create(&self, input: NewEmail) -> MailResult<Email> {
        // id and created_at come from column defaults
        let active_model = entity::ActiveModel {
            email_id: NotSet,
            address_from: Set(input.from),
            address_to: Set(input.to),
            subject: Set(input.subject),
            message: Set(input.message),
            created_at: NotSet,
        };

        let model = active_model.insert(&self.db).await?;

        tracing::info!(email_id = %model.email_id, "Created email");
        Ok(model.into())
    }

    async fn get_by_id(&self, id: Uuid) -> MailResult<Email> {
        entity::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Into::into)
            .ok_or(MailError::NotFound(id))
    }

    async fn count_search(&self, text: &str) -> MailResult<u64> {
        let count = Self::search_query(text).count(&self.db).await?;
        Ok(count)
    }

    async fn search(&self, text: &str, pagination: Pagination) -> MailResult<Vec<Email>> {
        let models = Self::search_query(text)
            .order_by_desc(entity::Column::CreatedAt)
            .offset(pagination.offset())
            .limit(pagination.limit())
            .all(&self.db)
            .await?;

        Ok(models.into_iter().map(Into::into).collect())
    }
}
