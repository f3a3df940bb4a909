use n9e_common::error::ValidationError;
use n9e_common::filter::{compile_all, matches_all, TagFilter};
use n9e_common::types::AlertEvent;
use n9e_storage::store::SubscribeRow;

/// A validated subscription with its tag filters compiled.
#[derive(Debug, Clone)]
pub struct CompiledSubscription {
    row: SubscribeRow,
    filters: Vec<TagFilter>,
    user_groups: Vec<String>,
}

impl CompiledSubscription {
    pub fn compile(row: SubscribeRow) -> Result<Self, ValidationError> {
        row.verify()?;
        let filters = compile_all(&row.tags)?;
        let user_groups = row.user_groups();
        Ok(Self {
            row,
            filters,
            user_groups,
        })
    }

    pub fn id(&self) -> i64 {
        self.row.id
    }

    /// 0 subscribes to every rule of the group.
    pub fn rule_id(&self) -> i64 {
        self.row.rule_id
    }

    pub fn row(&self) -> &SubscribeRow {
        &self.row
    }

    /// Scope, filters and for-duration gate.
    ///
    /// Empty `prod`/`cate` and an empty or `0`-containing datasource list
    /// act as wildcards.
    pub fn matches(&self, event: &AlertEvent) -> bool {
        let sub = &self.row;
        if sub.disabled || sub.group_id != event.group_id {
            return false;
        }
        if sub.rule_id != 0 && sub.rule_id != event.rule_id {
            return false;
        }
        if !sub.prod.is_empty() && sub.prod != event.rule_prod {
            return false;
        }
        if !sub.cate.is_empty() && sub.cate != event.cate {
            return false;
        }
        if event.datasource_id != 0
            && !sub.datasource_ids.is_empty()
            && !sub.datasource_ids.contains(&0)
            && !sub.datasource_ids.contains(&event.datasource_id)
        {
            return false;
        }
        // 0 in the list stands for every severity
        if !sub.severities.is_empty()
            && !sub.severities.iter().any(|s| *s == 0 || *s == event.severity)
        {
            return false;
        }
        // still too young for this subscriber
        if sub.for_duration > event.trigger_time - event.first_trigger_time {
            return false;
        }
        matches_all(&self.filters, &event.tags)
    }

    /// A rewritten copy: severity, channels, webhooks, then notify groups.
    pub fn apply(&self, event: &AlertEvent) -> AlertEvent {
        let sub = &self.row;
        let mut out = event.clone();
        if sub.redefine_severity {
            out.severity = sub.new_severity;
        }
        if sub.redefine_channels {
            out.notify_channels = sub.new_channels.clone();
        }
        if sub.redefine_webhooks {
            out.callbacks = sub.webhooks.clone();
        }
        out.notify_groups = self.user_groups.clone();
        out.sub_rule_id = sub.id;
        out
    }
}

/// One rewritten copy per matching subscription, in iteration order.
pub fn route<'a, I>(event: &AlertEvent, subs: I) -> Vec<AlertEvent>
where
    I: IntoIterator<Item = &'a CompiledSubscription>,
{
    subs.into_iter()
        .filter(|s| s.matches(event))
        .map(|s| s.apply(event))
        .collect()
}
