//! Routing rule repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::RoutingRuleDbModel;

/// Routing rule repository trait.
#[async_trait]
pub trait RoutingRuleRepository: Send + Sync {
    /// Active rules for `event_type`, oldest first.
    async fn find_active_by_event(&self, event_type: &str) -> Result<Vec<RoutingRuleDbModel>>;
    async fn list_rules(&self) -> Result<Vec<RoutingRuleDbModel>>;
    async fn create_rule(&self, rule: &RoutingRuleDbModel) -> Result<()>;
}

/// SQLx implementation of RoutingRuleRepository.
pub struct SqlxRoutingRuleRepository {
    pool: SqlitePool,
}

impl SqlxRoutingRuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoutingRuleRepository for SqlxRoutingRuleRepository {
    async fn find_active_by_event(&self, event_type: &str) -> Result<Vec<RoutingRuleDbModel>> {
        let rules = sqlx::query_as::<_, RoutingRuleDbModel>(
            r#"
            SELECT * FROM notification_routing_rule
            WHERE event_type = ? AND is_active = 1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(event_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(rules)
    }

    async fn list_rules(&self) -> Result<Vec<RoutingRuleDbModel>> {
        let rules = sqlx::query_as::<_, RoutingRuleDbModel>(
            "SELECT * FROM notification_routing_rule ORDER BY event_type, created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rules)
    }

    async fn create_rule(&self, rule: &RoutingRuleDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_routing_rule
                (id, event_type, organization_ids, channel_types, description, is_active, is_system, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.event_type)
        .bind(&rule.organization_ids)
        .bind(&rule.channel_types)
        .bind(&rule.description)
        .bind(rule.is_active)
        .bind(rule.is_system)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::ChannelType;
    use crate::database::test_pool;

    #[tokio::test]
    async fn test_find_active_by_event() {
        let repo = SqlxRoutingRuleRepository::new(test_pool().await);

        let rule = RoutingRuleDbModel::new(
            "order_shipped",
            vec!["o1".into(), "o2".into()],
            Some(vec![ChannelType::Webhook]),
        );
        let mut inactive = RoutingRuleDbModel::new("order_shipped", vec!["o3".into()], None);
        inactive.is_active = false;
        let other = RoutingRuleDbModel::new("order_created", vec!["o1".into()], None);

        for r in [&rule, &inactive, &other] {
            repo.create_rule(r).await.unwrap();
        }

        let found = repo.find_active_by_event("order_shipped").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].organization_ids.0, vec!["o1", "o2"]);
        assert_eq!(
            found[0].channel_types.as_ref().map(|t| t.0.clone()),
            Some(vec![ChannelType::Webhook])
        );

        assert!(repo.find_active_by_event("unknown").await.unwrap().is_empty());
        assert_eq!(repo.list_rules().await.unwrap().len(), 3);
    }
}
