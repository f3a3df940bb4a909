use async_trait::async_trait;
use n9e_common::types::{AlertRule, Target};
use n9e_storage::store::{BusiGroupRow, MuteRow, SubscribeRow};
use n9e_storage::Store;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::error::Result;
use crate::mute::CompiledMute;
use crate::subscribe::CompiledSubscription;

/// Read access to alert rules.
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn list_active_rules(&self) -> Result<Vec<AlertRule>>;
    async fn get_rule(&self, id: i64) -> Result<Option<AlertRule>>;
}

/// Everything the registry caches.
#[async_trait]
pub trait RegistrySource: RuleSource {
    async fn list_mutes(&self) -> Result<Vec<MuteRow>>;
    async fn list_subscriptions(&self) -> Result<Vec<SubscribeRow>>;
    async fn list_targets(&self) -> Result<Vec<Target>>;
    async fn list_groups(&self) -> Result<Vec<BusiGroupRow>>;
}

#[async_trait]
impl RuleSource for Store {
    async fn list_active_rules(&self) -> Result<Vec<AlertRule>> {
        Ok(self.list_active_alert_rules().await?)
    }

    async fn get_rule(&self, id: i64) -> Result<Option<AlertRule>> {
        Ok(self.get_alert_rule(id).await?)
    }
}

#[async_trait]
impl RegistrySource for Store {
    async fn list_mutes(&self) -> Result<Vec<MuteRow>> {
        Ok(self.list_enabled_mutes().await?)
    }

    async fn list_subscriptions(&self) -> Result<Vec<SubscribeRow>> {
        Ok(self.list_enabled_subscriptions().await?)
    }

    async fn list_targets(&self) -> Result<Vec<Target>> {
        Ok(Store::list_targets(self).await?)
    }

    async fn list_groups(&self) -> Result<Vec<BusiGroupRow>> {
        Ok(self.list_busi_groups().await?)
    }
}

/// Immutable view of rules, mutes, subscriptions, targets and group names.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    rules: HashMap<i64, Arc<AlertRule>>,
    mutes: HashMap<i64, Vec<CompiledMute>>,
    subscriptions: HashMap<i64, Vec<CompiledSubscription>>,
    targets: HashMap<String, Target>,
    groups: HashMap<i64, String>,
}

impl RegistrySnapshot {
    /// Compiles the given rows. Disabled rules and rows that fail to
    /// compile are skipped with a warning.
    pub fn build(
        rules: Vec<AlertRule>,
        mutes: Vec<MuteRow>,
        subscriptions: Vec<SubscribeRow>,
        targets: Vec<Target>,
        groups: Vec<BusiGroupRow>,
    ) -> Self {
        let mut snapshot = Self::default();

        for rule in rules.into_iter().filter(|r| !r.disabled) {
            snapshot.rules.insert(rule.id, Arc::new(rule));
        }

        for row in mutes.iter().filter(|m| !m.disabled) {
            match CompiledMute::compile(row) {
                Ok(mute) => snapshot.mutes.entry(mute.group_id()).or_default().push(mute),
                Err(e) => tracing::warn!(mute_id = row.id, error = %e, "Skipping invalid mute"),
            }
        }

        for row in subscriptions.into_iter().filter(|s| !s.disabled) {
            let id = row.id;
            match CompiledSubscription::compile(row) {
                Ok(sub) => snapshot
                    .subscriptions
                    .entry(sub.rule_id())
                    .or_default()
                    .push(sub),
                Err(e) => {
                    tracing::warn!(sub_id = id, error = %e, "Skipping invalid subscription")
                }
            }
        }

        snapshot.targets = targets.into_iter().map(|t| (t.ident.clone(), t)).collect();
        snapshot.groups = groups.into_iter().map(|g| (g.id, g.name)).collect();
        snapshot
    }

    pub fn rule(&self, id: i64) -> Option<Arc<AlertRule>> {
        self.rules.get(&id).cloned()
    }

    pub fn mutes_for_group(&self, group_id: i64) -> &[CompiledMute] {
        self.mutes.get(&group_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Subscriptions bound to `rule_id`, then those bound to every rule.
    pub fn subscriptions_for_rule(
        &self,
        rule_id: i64,
    ) -> impl Iterator<Item = &CompiledSubscription> + '_ {
        let specific = if rule_id == 0 {
            None
        } else {
            self.subscriptions.get(&rule_id)
        };
        specific
            .into_iter()
            .chain(self.subscriptions.get(&0))
            .flatten()
    }

    pub fn target(&self, ident: &str) -> Option<&Target> {
        self.targets.get(ident)
    }

    pub fn group_name(&self, group_id: i64) -> Option<&str> {
        self.groups.get(&group_id).map(String::as_str)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn mute_count(&self) -> usize {
        self.mutes.values().map(Vec::len).sum()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.values().map(Vec::len).sum()
    }
}

/// Process-wide cache of [`RegistrySnapshot`]s.
///
/// Readers clone the current `Arc`; `reload` builds a whole new snapshot
/// and swaps it in, so a reader never observes a half-updated set.
#[derive(Debug, Default)]
pub struct Registry {
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: RegistrySnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, snapshot: RegistrySnapshot) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(snapshot);
    }

    pub async fn reload(&self, source: &dyn RegistrySource) -> Result<()> {
        let rules = source.list_active_rules().await?;
        let mutes = source.list_mutes().await?;
        let subscriptions = source.list_subscriptions().await?;
        let targets = source.list_targets().await?;
        let groups = source.list_groups().await?;

        let snapshot = RegistrySnapshot::build(rules, mutes, subscriptions, targets, groups);
        tracing::debug!(
            rules = snapshot.rule_count(),
            mutes = snapshot.mute_count(),
            subscriptions = snapshot.subscription_count(),
            "Registry reloaded"
        );
        self.replace(snapshot);
        Ok(())
    }

    /// Reload loop; runs until the task is aborted. Failed reloads keep the
    /// previous snapshot.
    pub async fn run(self: Arc<Self>, source: Arc<dyn RegistrySource>, every: Duration) {
        let mut tick = tokio::time::interval(every);
        loop {
            tick.tick().await;
            if let Err(e) = self.reload(source.as_ref()).await {
                tracing::error!(error = %e, "Registry reload failed");
            }
        }
    }
}
