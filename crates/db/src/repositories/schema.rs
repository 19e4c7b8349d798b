use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::{QueryBuilder, Row, Sqlite};

use querent_core::domain::template::{
    Entity, LifecycleStatus, Section, Template, TemplateId, TemplateRef,
};
use querent_core::domain::tenant::TenantId;

use super::{RepositoryError, SchemaRepository};
use crate::DbPool;

const ACTIVE: &str = "ACTIVE";

pub struct SqlSchemaRepository {
    pool: DbPool,
}

impl SqlSchemaRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_entity(
        &self,
        tenant_id: &TenantId,
        entity_id: &str,
        entity: &Entity,
    ) -> Result<(), RepositoryError> {
        let templates = serde_json::to_string(&entity.templates)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO entity (id, tenant_id, name, status, templates, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 tenant_id = excluded.tenant_id,
                 name = excluded.name,
                 status = excluded.status,
                 templates = excluded.templates",
        )
        .bind(entity_id)
        .bind(&tenant_id.0)
        .bind(&entity.name)
        .bind(entity.status.as_str())
        .bind(templates)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_template(
        &self,
        tenant_id: &TenantId,
        template: &Template,
    ) -> Result<(), RepositoryError> {
        let sections = serde_json::to_string(&template.sections)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO template (id, tenant_id, status, sections, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 tenant_id = excluded.tenant_id,
                 status = excluded.status,
                 sections = excluded.sections",
        )
        .bind(&template.id.0)
        .bind(&tenant_id.0)
        .bind(template.status.as_str())
        .bind(sections)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Decodes a JSON array element by element; anything malformed is dropped.
fn lenient_list<T: DeserializeOwned>(raw: &str) -> Vec<T> {
    serde_json::from_str::<Vec<Value>>(raw)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}

fn row_to_entity(row: &sqlx::sqlite::SqliteRow) -> Result<Entity, RepositoryError> {
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let templates: String =
        row.try_get("templates").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Entity {
        name,
        status: LifecycleStatus::from(status),
        templates: lenient_list::<TemplateRef>(&templates),
    })
}

fn row_to_template(row: &sqlx::sqlite::SqliteRow) -> Result<Template, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sections: String =
        row.try_get("sections").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Template {
        id: TemplateId(id),
        status: LifecycleStatus::from(status),
        sections: lenient_list::<Section>(&sections),
    })
}

#[async_trait::async_trait]
impl SchemaRepository for SqlSchemaRepository {
    async fn active_entities(&self, tenant_id: &TenantId) -> Result<Vec<Entity>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT name, status, templates FROM entity
             WHERE tenant_id = ? AND status = ?
             ORDER BY rowid",
        )
        .bind(&tenant_id.0)
        .bind(ACTIVE)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entity).collect()
    }

    async fn active_templates(
        &self,
        template_ids: &[TemplateId],
    ) -> Result<Vec<Template>, RepositoryError> {
        if template_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT id, status, sections FROM template WHERE status = ");
        builder.push_bind(ACTIVE);
        builder.push(" AND id IN (");
        let mut separated = builder.separated(", ");
        for template_id in template_ids {
            separated.push_bind(template_id.0.as_str());
        }
        separated.push_unseparated(") ORDER BY rowid");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_template).collect()
    }
}

#[cfg(test)]
mod tests {
    use querent_core::domain::template::{
        Entity, Field, InputType, LifecycleStatus, Section, Template, TemplateId, TemplateRef,
    };
    use querent_core::domain::tenant::TenantId;

    use super::SqlSchemaRepository;
    use crate::repositories::SchemaRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn entity(name: &str, status: LifecycleStatus, template_ids: &[&str]) -> Entity {
        Entity {
            name: name.to_string(),
            status,
            templates: template_ids
                .iter()
                .map(|id| TemplateRef { template_id: Some(TemplateId(id.to_string())) })
                .collect(),
        }
    }

    fn template(id: &str, status: LifecycleStatus) -> Template {
        Template {
            id: TemplateId(id.to_string()),
            status,
            sections: vec![Section {
                fields: vec![Field {
                    key: Some("email".to_string()),
                    input_type: Some(InputType::from("string")),
                    data_table_columns: Vec::new(),
                }],
            }],
        }
    }

    #[tokio::test]
    async fn active_entities_are_scoped_to_tenant_and_status() {
        let pool = pool().await;
        let repo = SqlSchemaRepository::new(pool.clone());
        let tenant = TenantId::from("t-1");
        let other = TenantId::from("t-2");

        repo.upsert_entity(&tenant, "e1", &entity("Customer", LifecycleStatus::Active, &["T1"]))
            .await
            .expect("save e1");
        repo.upsert_entity(&tenant, "e2", &entity("Legacy", LifecycleStatus::Inactive, &["T2"]))
            .await
            .expect("save e2");
        repo.upsert_entity(&other, "e3", &entity("Foreign", LifecycleStatus::Active, &["T3"]))
            .await
            .expect("save e3");

        let entities = repo.active_entities(&tenant).await.expect("query");

        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "Customer");
        assert_eq!(entities[0].template_ids(), vec![TemplateId("T1".to_string())]);

        pool.close().await;
    }

    #[tokio::test]
    async fn active_templates_filter_by_id_set() {
        let pool = pool().await;
        let repo = SqlSchemaRepository::new(pool.clone());
        let tenant = TenantId::from("t-1");

        for template in [
            template("T1", LifecycleStatus::Active),
            template("T2", LifecycleStatus::Inactive),
            template("T3", LifecycleStatus::Active),
        ] {
            repo.upsert_template(&tenant, &template).await.expect("save template");
        }

        let found = repo
            .active_templates(&[
                TemplateId("T1".to_string()),
                TemplateId("T2".to_string()),
                TemplateId("MISSING".to_string()),
            ])
            .await
            .expect("query");

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, TemplateId("T1".to_string()));
        assert_eq!(found[0].sections[0].fields[0].key.as_deref(), Some("email"));
        assert!(repo.active_templates(&[]).await.expect("empty").is_empty());

        pool.close().await;
    }

    #[tokio::test]
    async fn malformed_nested_documents_decode_as_empty() {
        let pool = pool().await;
        let repo = SqlSchemaRepository::new(pool.clone());

        sqlx::query(
            "INSERT INTO template (id, tenant_id, status, sections, created_at)
             VALUES ('BROKEN', 't-1', 'ACTIVE', 'not json', '2025-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert broken template");
        sqlx::query(
            "INSERT INTO entity (id, tenant_id, name, status, templates, created_at)
             VALUES ('e1', 't-1', 'Odd', 'ACTIVE', '[{\"template_id\": 7}, {\"template_id\": \"T1\"}]', '2025-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert odd entity");

        let templates =
            repo.active_templates(&[TemplateId("BROKEN".to_string())]).await.expect("query");
        assert_eq!(templates.len(), 1);
        assert!(templates[0].sections.is_empty());

        let entities = repo.active_entities(&TenantId::from("t-1")).await.expect("query");
        assert_eq!(entities[0].template_ids(), vec![TemplateId("T1".to_string())]);

        pool.close().await;
    }

    #[tokio::test]
    async fn stored_null_column_list_keeps_the_rest_of_the_section() {
        let pool = pool().await;
        let repo = SqlSchemaRepository::new(pool.clone());

        let sections = r#"[{"fields": [
            {"key": "email"},
            {"key": "owner", "inputType": "ENTITY", "data_table_columns": null}
        ]}]"#;
        sqlx::query(
            "INSERT INTO template (id, tenant_id, status, sections, created_at)
             VALUES ('T1', 't-1', 'ACTIVE', ?, '2025-01-01T00:00:00Z')",
        )
        .bind(sections)
        .execute(&pool)
        .await
        .expect("insert template");

        let templates = repo.active_templates(&[TemplateId("T1".to_string())]).await.expect("query");

        let fields = &templates[0].sections[0].fields;
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].key.as_deref(), Some("email"));
        assert_eq!(fields[1].input_type, Some(InputType::Entity));

        pool.close().await;
    }
}
