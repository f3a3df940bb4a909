use chrono::Utc;
use n9e_common::types::Target;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, EntityTrait};
use serde::{Deserialize, Serialize};

use crate::entities::{busi_group, target};
use crate::error::Result;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusiGroupRow {
    pub id: i64,
    pub name: String,
}

impl Store {
    /// Inserts or updates a target by `ident`.
    pub async fn upsert_target(&self, t: &Target) -> Result<()> {
        let am = target::ActiveModel {
            id: NotSet,
            group_id: Set(t.group_id),
            ident: Set(t.ident.clone()),
            note: Set(t.note.clone()),
            update_at: Set(Utc::now().timestamp()),
        };
        target::Entity::insert(am)
            .on_conflict(
                OnConflict::column(target::Column::Ident)
                    .update_columns([
                        target::Column::GroupId,
                        target::Column::Note,
                        target::Column::UpdateAt,
                    ])
                    .to_owned(),
            )
            .exec(self.db())
            .await?;
        Ok(())
    }

    pub async fn list_targets(&self) -> Result<Vec<Target>> {
        let rows = target::Entity::find().all(self.db()).await?;
        Ok(rows
            .into_iter()
            .map(|m| Target {
                ident: m.ident,
                note: m.note,
                group_id: m.group_id,
            })
            .collect())
    }

    pub async fn insert_busi_group(&self, name: &str) -> Result<BusiGroupRow> {
        let am = busi_group::ActiveModel {
            id: NotSet,
            name: Set(name.to_string()),
            update_at: Set(Utc::now().timestamp()),
        };
        let model = am.insert(self.db()).await?;
        Ok(BusiGroupRow {
            id: model.id,
            name: model.name,
        })
    }

    pub async fn list_busi_groups(&self) -> Result<Vec<BusiGroupRow>> {
        let rows = busi_group::Entity::find().all(self.db()).await?;
        Ok(rows
            .into_iter()
            .map(|m| BusiGroupRow {
                id: m.id,
                name: m.name,
            })
            .collect())
    }
}
