use chrono::Utc;
use n9e_common::aggr::parse_aggr_rule;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, Condition, EntityTrait,
    Order, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};

use crate::entities::alert_aggr_view::{self, Column, Entity};
use crate::error::Result;
use crate::store::Store;

/// Public views are visible to everyone; private ones only to their creator.
pub const AGGR_VIEW_PUBLIC: i32 = 0;
pub const AGGR_VIEW_PRIVATE: i32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggrViewRow {
    pub id: i64,
    pub name: String,
    /// `field:<name>` / `tagkey:<name>` tokens joined with `::`.
    pub rule: String,
    pub cate: i32,
    pub create_at: i64,
    pub create_by: i64,
    pub update_at: i64,
}

fn to_row(m: alert_aggr_view::Model) -> AggrViewRow {
    AggrViewRow {
        id: m.id,
        name: m.name,
        rule: m.rule,
        cate: m.cate,
        create_at: m.create_at,
        create_by: m.create_by,
        update_at: m.update_at,
    }
}

impl Store {
    /// Rejects rules that reference unknown fields or malformed tokens.
    pub async fn insert_aggr_view(&self, row: &AggrViewRow) -> Result<AggrViewRow> {
        parse_aggr_rule(&row.rule)?;
        let now = Utc::now().timestamp();
        let am = alert_aggr_view::ActiveModel {
            id: NotSet,
            name: Set(row.name.clone()),
            rule: Set(row.rule.trim().to_string()),
            cate: Set(row.cate),
            create_at: Set(now),
            create_by: Set(row.create_by),
            update_at: Set(now),
        };
        Ok(to_row(am.insert(self.db()).await?))
    }

    pub async fn get_aggr_view(&self, id: i64) -> Result<Option<AggrViewRow>> {
        Ok(Entity::find_by_id(id).one(self.db()).await?.map(to_row))
    }

    /// Public views plus the private views created by `user_id`.
    pub async fn list_aggr_views(&self, user_id: i64) -> Result<Vec<AggrViewRow>> {
        let rows = Entity::find()
            .filter(
                Condition::any()
                    .add(Column::Cate.eq(AGGR_VIEW_PUBLIC))
                    .add(Column::CreateBy.eq(user_id)),
            )
            .order_by(Column::Id, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    pub async fn delete_aggr_view(&self, id: i64) -> Result<bool> {
        let res = Entity::delete_by_id(id).exec(self.db()).await?;
        Ok(res.rows_affected > 0)
    }
}
