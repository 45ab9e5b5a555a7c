//! Sender resolution.
//!
//! A channel's explicit `sender_ids` win. Otherwise the owning
//! organization's tree is walked up to its company, and senders scoped to
//! the company, then its parent group, then the global scope are tried.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::database::models::{ChannelDbModel, OrgType, SenderDbModel};
use crate::database::repositories::{OrganizationRepository, SenderRepository};
use crate::{Error, Result};

/// Upper bound on parent hops, guards against cycles in bad data.
const MAX_TREE_DEPTH: usize = 32;

/// Company and group scopes above an organization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderScopes {
    pub company_id: Option<String>,
    pub group_id: Option<String>,
}

pub struct SenderResolver {
    senders: Arc<dyn SenderRepository>,
    organizations: Arc<dyn OrganizationRepository>,
}

impl SenderResolver {
    pub fn new(
        senders: Arc<dyn SenderRepository>,
        organizations: Arc<dyn OrganizationRepository>,
    ) -> Self {
        Self {
            senders,
            organizations,
        }
    }

    /// Resolve the sender for a delivery on `channel` owned by `owner_organization_id`.
    pub async fn find_sender(
        &self,
        channel: &ChannelDbModel,
        owner_organization_id: &str,
    ) -> Result<SenderDbModel> {
        if let Some(sender) = self.first_usable(channel, &channel.sender_ids).await? {
            return Ok(sender);
        }

        let scopes = self.resolve_scopes(owner_organization_id).await?;
        let search = [scopes.company_id.as_deref(), scopes.group_id.as_deref(), None];
        for scope in search {
            if let Some(sender) = self
                .senders
                .find_active_by_scope(channel.channel_type, scope)
                .await?
            {
                debug!(
                    channel_id = %channel.id,
                    sender_id = %sender.id,
                    scope = scope.unwrap_or("global"),
                    "Resolved sender by organization scope"
                );
                return Ok(sender);
            }
        }

        Err(Error::NoActiveSender {
            channel_type: channel.channel_type.to_string(),
            channel_id: channel.id.clone(),
        })
    }

    /// Usable senders listed after `primary` in the channel's preference list,
    /// in order. Used when a send with `primary` fails.
    ///
    /// A primary found by the organization walk is not in the list. Every
    /// listed sender was unusable at resolution, so the head entry is skipped.
    pub async fn fallback_senders(
        &self,
        channel: &ChannelDbModel,
        primary: &SenderDbModel,
    ) -> Result<Vec<SenderDbModel>> {
        let ids = &channel.sender_ids;
        if ids.len() <= 1 {
            return Ok(Vec::new());
        }

        let start = ids
            .iter()
            .position(|id| *id == primary.id)
            .map_or(1, |pos| pos + 1);

        let mut fallbacks = Vec::new();
        for id in ids.iter().skip(start) {
            if *id == primary.id {
                continue;
            }
            if let Some(sender) = self.senders.find_sender(id).await?
                && sender.usable_for(channel.channel_type)
            {
                fallbacks.push(sender);
            }
        }
        Ok(fallbacks)
    }

    async fn first_usable(
        &self,
        channel: &ChannelDbModel,
        ids: &[String],
    ) -> Result<Option<SenderDbModel>> {
        for id in ids {
            match self.senders.find_sender(id).await? {
                Some(sender) if sender.usable_for(channel.channel_type) => {
                    return Ok(Some(sender));
                }
                Some(_) => debug!(sender_id = %id, "Skipping inactive or mismatched sender"),
                None => warn!(channel_id = %channel.id, sender_id = %id, "Channel lists unknown sender"),
            }
        }
        Ok(None)
    }

    /// Walk up to the first company node. The group scope is that
    /// company's direct parent.
    ///
    /// The walk starts at `organization_id` itself, so a company owner uses
    /// its own scope. An unknown owner is a `NotFound` error. A chain without
    /// a company yields empty scopes, leaving only the global sender.
    pub async fn resolve_scopes(&self, organization_id: &str) -> Result<SenderScopes> {
        let mut visited = HashSet::new();
        let mut current = Some(
            self.organizations
                .find_organization(organization_id)
                .await?
                .ok_or_else(|| Error::not_found("Organization", organization_id))?,
        );

        while let Some(org) = current {
            if org.org_type == OrgType::Company {
                return Ok(SenderScopes {
                    company_id: Some(org.id),
                    group_id: org.parent_id,
                });
            }
            if visited.len() >= MAX_TREE_DEPTH || !visited.insert(org.id.clone()) {
                warn!(organization_id, "Organization tree too deep or cyclic");
                break;
            }
            current = match org.parent_id.as_deref() {
                Some(parent_id) => self.organizations.find_organization(parent_id).await?,
                None => None,
            };
        }

        Ok(SenderScopes::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{ChannelSettings, OrganizationDbModel, SenderCredentials};
    use crate::database::repositories::{SqlxOrganizationRepository, SqlxSenderRepository};
    use crate::database::test_pool;

    struct Fixture {
        resolver: SenderResolver,
        senders: Arc<SqlxSenderRepository>,
        orgs: Arc<SqlxOrganizationRepository>,
    }

    async fn fixture() -> Fixture {
        let pool = test_pool().await;
        let senders = Arc::new(SqlxSenderRepository::new(pool.clone()));
        let orgs = Arc::new(SqlxOrganizationRepository::new(pool));
        Fixture {
            resolver: SenderResolver::new(senders.clone(), orgs.clone()),
            senders,
            orgs,
        }
    }

    fn bot(org: Option<&str>, active: bool) -> SenderDbModel {
        let mut sender = SenderDbModel::new(
            "bot",
            org.map(str::to_string),
            SenderCredentials::TelegramBot {
                bot_token: "t".into(),
                bot_username: None,
            },
        );
        sender.is_active = active;
        sender
    }

    fn channel(org: &str, sender_ids: Vec<String>) -> ChannelDbModel {
        ChannelDbModel::new(
            org,
            "tg",
            ChannelSettings::Telegram {
                chat_ids: vec!["1".into()],
            },
            sender_ids,
        )
    }

    /// group -> company -> division -> team
    async fn tree(orgs: &SqlxOrganizationRepository) -> (String, String, String) {
        let group = OrganizationDbModel::new("G", OrgType::Group, None);
        let company = OrganizationDbModel::new("C", OrgType::Company, Some(group.id.clone()));
        let division = OrganizationDbModel::new("D", OrgType::Division, Some(company.id.clone()));
        let team = OrganizationDbModel::new("T", OrgType::Team, Some(division.id.clone()));
        for org in [&group, &company, &division, &team] {
            orgs.create_organization(org).await.unwrap();
        }
        (group.id, company.id, team.id)
    }

    #[tokio::test]
    async fn test_explicit_list_skips_inactive() {
        let f = fixture().await;
        let s1 = bot(None, false);
        let s2 = bot(None, true);
        f.senders.create_sender(&s1).await.unwrap();
        f.senders.create_sender(&s2).await.unwrap();

        let ch = channel("team", vec![s1.id.clone(), s2.id.clone()]);
        let found = f.resolver.find_sender(&ch, "team").await.unwrap();
        assert_eq!(found.id, s2.id);
    }

    #[tokio::test]
    async fn test_explicit_list_skips_type_mismatch() {
        let f = fixture().await;
        let (_, _, team_id) = tree(&f.orgs).await;
        let smtp = SenderDbModel::new(
            "mail",
            None,
            SenderCredentials::Smtp {
                smtp_host: "h".into(),
                smtp_port: 25,
                smtp_username: String::new(),
                smtp_password: String::new(),
                from_email: "a@x.io".into(),
                from_name: None,
                use_tls: false,
            },
        );
        let global_bot = bot(None, true);
        f.senders.create_sender(&smtp).await.unwrap();
        f.senders.create_sender(&global_bot).await.unwrap();

        let ch = channel(&team_id, vec![smtp.id.clone(), "missing".into()]);
        let found = f.resolver.find_sender(&ch, &team_id).await.unwrap();
        assert_eq!(found.id, global_bot.id);
    }

    #[tokio::test]
    async fn test_hierarchy_order_company_group_global() {
        let f = fixture().await;
        let (group_id, company_id, team_id) = tree(&f.orgs).await;
        let ch = channel(&team_id, vec![]);

        let global = bot(None, true);
        f.senders.create_sender(&global).await.unwrap();
        assert_eq!(
            f.resolver.find_sender(&ch, &team_id).await.unwrap().id,
            global.id
        );

        let group = bot(Some(&group_id), true);
        f.senders.create_sender(&group).await.unwrap();
        assert_eq!(
            f.resolver.find_sender(&ch, &team_id).await.unwrap().id,
            group.id
        );

        let company = bot(Some(&company_id), true);
        f.senders.create_sender(&company).await.unwrap();
        assert_eq!(
            f.resolver.find_sender(&ch, &team_id).await.unwrap().id,
            company.id
        );
    }

    #[tokio::test]
    async fn test_resolve_scopes() {
        let f = fixture().await;
        let (group_id, company_id, team_id) = tree(&f.orgs).await;

        let scopes = f.resolver.resolve_scopes(&team_id).await.unwrap();
        assert_eq!(scopes.company_id, Some(company_id.clone()));
        assert_eq!(scopes.group_id, Some(group_id));

        let scopes = f.resolver.resolve_scopes(&company_id).await.unwrap();
        assert_eq!(scopes.company_id, Some(company_id));

        let lone = OrganizationDbModel::new("L", OrgType::Team, None);
        f.orgs.create_organization(&lone).await.unwrap();
        let scopes = f.resolver.resolve_scopes(&lone.id).await.unwrap();
        assert_eq!(scopes, SenderScopes::default());
    }

    #[tokio::test]
    async fn test_unknown_owner_organization_is_not_found() {
        let f = fixture().await;
        f.senders.create_sender(&bot(None, true)).await.unwrap();

        let ch = channel("ghost", vec![]);
        let err = f.resolver.find_sender(&ch, "ghost").await.unwrap_err();
        assert!(matches!(
            err,
            Error::NotFound { ref entity_type, ref id } if entity_type == "Organization" && id == "ghost"
        ));
    }

    #[tokio::test]
    async fn test_no_sender_anywhere() {
        let f = fixture().await;
        let (_, _, team_id) = tree(&f.orgs).await;
        let ch = channel(&team_id, vec![]);
        assert!(matches!(
            f.resolver.find_sender(&ch, &team_id).await,
            Err(Error::NoActiveSender { .. })
        ));
    }

    #[tokio::test]
    async fn test_fallback_senders_follow_primary() {
        let f = fixture().await;
        let s1 = bot(None, false);
        let s2 = bot(None, true);
        let s3 = bot(None, false);
        let s4 = bot(None, true);
        for s in [&s1, &s2, &s3, &s4] {
            f.senders.create_sender(s).await.unwrap();
        }
        let ch = channel(
            "team",
            vec![s1.id.clone(), s2.id.clone(), s3.id.clone(), s4.id.clone()],
        );

        let primary = f.resolver.find_sender(&ch, "team").await.unwrap();
        assert_eq!(primary.id, s2.id);

        let fallbacks = f.resolver.fallback_senders(&ch, &primary).await.unwrap();
        let ids: Vec<_> = fallbacks.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![s4.id.as_str()]);

        let single = channel("team", vec![s2.id.clone()]);
        assert!(
            f.resolver
                .fallback_senders(&single, &primary)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_fallback_after_scoped_primary_skips_list_head() {
        let f = fixture().await;
        let s1 = bot(None, true);
        let s2 = bot(None, true);
        let global = bot(None, true);
        for s in [&s1, &s2, &global] {
            f.senders.create_sender(s).await.unwrap();
        }
        let ch = channel("team", vec![s1.id.clone(), s2.id.clone()]);

        let fallbacks = f.resolver.fallback_senders(&ch, &global).await.unwrap();
        let ids: Vec<_> = fallbacks.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![s2.id.as_str()]);
    }
}
