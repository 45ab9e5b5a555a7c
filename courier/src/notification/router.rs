//! Event routing.
//!
//! Expands an event type into `(organization, channel)` routes by evaluating
//! active routing rules. Per-organization lookup failures are collected in
//! the returned [`RouteSet`] instead of aborting the fan-out.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::Result;
use crate::database::models::ChannelDbModel;
use crate::database::repositories::{ChannelRepository, RoutingRuleRepository};

/// One resolved delivery target.
#[derive(Debug, Clone)]
pub struct Route {
    pub organization_id: String,
    pub channel: ChannelDbModel,
}

/// An organization skipped because its channels could not be loaded.
#[derive(Debug, Clone)]
pub struct OrganizationFailure {
    pub organization_id: String,
    pub error: String,
}

/// Routes for one event plus the organizations that were skipped.
#[derive(Debug, Clone, Default)]
pub struct RouteSet {
    pub routes: Vec<Route>,
    pub failures: Vec<OrganizationFailure>,
}

impl RouteSet {
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

pub struct EventRouter {
    rules: Arc<dyn RoutingRuleRepository>,
    channels: Arc<dyn ChannelRepository>,
}

impl EventRouter {
    pub fn new(rules: Arc<dyn RoutingRuleRepository>, channels: Arc<dyn ChannelRepository>) -> Self {
        Self { rules, channels }
    }

    /// Every active channel reachable from the active rules for `event_type`.
    ///
    /// Each matching rule contributes its own routes, so a channel reached
    /// through two rules is routed twice. No matching rule yields an empty
    /// set, not an error.
    pub async fn find_routes(&self, event_type: &str) -> Result<RouteSet> {
        let rules = self.rules.find_active_by_event(event_type).await?;
        let mut set = RouteSet::default();

        for rule in &rules {
            for organization_id in rule.organization_ids.iter() {
                let channels = match self.channels.list_active_by_organization(organization_id).await
                {
                    Ok(channels) => channels,
                    Err(e) => {
                        warn!(
                            event_type,
                            organization_id = %organization_id,
                            error = %e,
                            "Skipping organization, failed to load channels"
                        );
                        set.failures.push(OrganizationFailure {
                            organization_id: organization_id.clone(),
                            error: e.to_string(),
                        });
                        continue;
                    }
                };

                for channel in channels {
                    if !rule.admits(channel.channel_type) {
                        continue;
                    }
                    set.routes.push(Route {
                        organization_id: organization_id.clone(),
                        channel,
                    });
                }
            }
        }

        debug!(
            event_type,
            rules = rules.len(),
            routes = set.routes.len(),
            skipped = set.failures.len(),
            "Resolved routes"
        );
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::database::models::{ChannelSettings, ChannelType, RoutingRuleDbModel};
    use crate::database::repositories::{SqlxChannelRepository, SqlxRoutingRuleRepository};
    use crate::database::test_pool;
    use async_trait::async_trait;

    fn email(org: &str, name: &str) -> ChannelDbModel {
        ChannelDbModel::new(
            org,
            name,
            ChannelSettings::Email {
                recipients: vec!["a@example.com".into()],
            },
            vec![],
        )
    }

    fn webhook(org: &str, name: &str) -> ChannelDbModel {
        ChannelDbModel::new(
            org,
            name,
            ChannelSettings::Webhook {
                webhook_url: "https://hook.example/1".into(),
                webhook_headers: Default::default(),
            },
            vec![],
        )
    }

    async fn setup() -> (EventRouter, Arc<SqlxRoutingRuleRepository>, Arc<SqlxChannelRepository>) {
        let pool = test_pool().await;
        let rules = Arc::new(SqlxRoutingRuleRepository::new(pool.clone()));
        let channels = Arc::new(SqlxChannelRepository::new(pool));
        (
            EventRouter::new(rules.clone(), channels.clone()),
            rules,
            channels,
        )
    }

    #[tokio::test]
    async fn test_no_rule_yields_empty_set() {
        let (router, _, _) = setup().await;
        let set = router.find_routes("nothing").await.unwrap();
        assert!(set.is_empty());
        assert!(set.failures.is_empty());
    }

    #[tokio::test]
    async fn test_routes_filtered_by_channel_type() {
        let (router, rules, channels) = setup().await;
        channels.create_channel(&email("A", "mail")).await.unwrap();
        channels.create_channel(&webhook("A", "hook")).await.unwrap();
        channels.create_channel(&webhook("B", "hook")).await.unwrap();

        let mut inactive = webhook("B", "off");
        inactive.is_active = false;
        channels.create_channel(&inactive).await.unwrap();

        rules
            .create_rule(&RoutingRuleDbModel::new(
                "order_shipped",
                vec!["A".into(), "B".into()],
                Some(vec![ChannelType::Webhook]),
            ))
            .await
            .unwrap();

        let set = router.find_routes("order_shipped").await.unwrap();
        assert_eq!(set.routes.len(), 2);
        assert!(
            set.routes
                .iter()
                .all(|r| r.channel.channel_type == ChannelType::Webhook && r.channel.is_active)
        );
        let orgs: Vec<_> = set.routes.iter().map(|r| r.organization_id.as_str()).collect();
        assert_eq!(orgs, ["A", "B"]);
    }

    #[tokio::test]
    async fn test_overlapping_rules_route_channel_per_rule() {
        let (router, rules, channels) = setup().await;
        let mail = email("A", "mail");
        channels.create_channel(&mail).await.unwrap();
        for _ in 0..2 {
            rules
                .create_rule(&RoutingRuleDbModel::new("e", vec!["A".into()], None))
                .await
                .unwrap();
        }

        let set = router.find_routes("e").await.unwrap();
        assert_eq!(set.routes.len(), 2);
        assert!(set.routes.iter().all(|r| r.channel.id == mail.id));
    }

    struct FlakyChannels {
        inner: SqlxChannelRepository,
    }

    #[async_trait]
    impl ChannelRepository for FlakyChannels {
        async fn get_channel(&self, id: &str) -> Result<ChannelDbModel> {
            self.inner.get_channel(id).await
        }
        async fn list_channels(&self) -> Result<Vec<ChannelDbModel>> {
            self.inner.list_channels().await
        }
        async fn list_active_by_organization(&self, org: &str) -> Result<Vec<ChannelDbModel>> {
            if org == "broken" {
                return Err(Error::Database("connection reset".into()));
            }
            self.inner.list_active_by_organization(org).await
        }
        async fn create_channel(&self, channel: &ChannelDbModel) -> Result<()> {
            self.inner.create_channel(channel).await
        }
        async fn delete_channel(&self, id: &str) -> Result<()> {
            self.inner.delete_channel(id).await
        }
    }

    #[tokio::test]
    async fn test_failing_organization_is_skipped() {
        let pool = test_pool().await;
        let rules = Arc::new(SqlxRoutingRuleRepository::new(pool.clone()));
        let channels = Arc::new(FlakyChannels {
            inner: SqlxChannelRepository::new(pool),
        });
        channels.create_channel(&email("ok", "mail")).await.unwrap();
        rules
            .create_rule(&RoutingRuleDbModel::new(
                "e",
                vec!["broken".into(), "ok".into()],
                None,
            ))
            .await
            .unwrap();

        let router = EventRouter::new(rules, channels);
        let set = router.find_routes("e").await.unwrap();

        assert_eq!(set.routes.len(), 1);
        assert_eq!(set.routes[0].organization_id, "ok");
        assert_eq!(set.failures.len(), 1);
        assert_eq!(set.failures[0].organization_id, "broken");
    }
}
