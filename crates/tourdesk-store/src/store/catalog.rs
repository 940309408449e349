use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::HashMap;
use tracing::info;

use tourdesk_core::catalog::{
    BaseItemPatch, CatalogDefaults, NewBaseItem, NewOperatorItem, OperatorItemPatch,
};
use tourdesk_core::{
    AgencyId, BaseItem, BaseItemId, CrmError, ItemCategory, OperatorItem, OperatorItemId,
};

use super::CrmStore;
use crate::api::Catalog;
use crate::error::StoreResult;
use crate::rows::{from_json, json, parse, timestamp, ts};

const BASE_COLUMNS: &str = "id, agency_id, name, category, description, fields, active, created_at";
const OPERATOR_COLUMNS: &str = "id, agency_id, base_item_id, operator_name, name, price, currency, \
                                commission_rate, custom_fields, active, created_at";

impl CrmStore {
    async fn load_base_item(
        conn: &mut SqliteConnection,
        agency: AgencyId,
        id: BaseItemId,
    ) -> StoreResult<BaseItem> {
        let row = sqlx::query(&format!(
            "SELECT {BASE_COLUMNS} FROM base_items WHERE id = ? AND agency_id = ?"
        ))
        .bind(id.to_string())
        .bind(agency.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CrmError::not_found("base item", id))?;
        base_item_from_row(&row)
    }

    async fn load_operator_item(
        conn: &mut SqliteConnection,
        agency: AgencyId,
        id: OperatorItemId,
    ) -> StoreResult<OperatorItem> {
        let row = sqlx::query(&format!(
            "SELECT {OPERATOR_COLUMNS} FROM operator_items WHERE id = ? AND agency_id = ?"
        ))
        .bind(id.to_string())
        .bind(agency.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CrmError::not_found("operator item", id))?;
        operator_item_from_row(&row)
    }

    /// Operator items of the agency keyed by id, for pricing proposal lines
    pub(super) async fn load_operator_items(
        conn: &mut SqliteConnection,
        agency: AgencyId,
        ids: impl Iterator<Item = OperatorItemId> + Send,
    ) -> StoreResult<HashMap<OperatorItemId, OperatorItem>> {
        let mut items = HashMap::new();
        for id in ids {
            if items.contains_key(&id) {
                continue;
            }
            // a missing id is reported by the pricing step
            match Self::load_operator_item(conn, agency, id).await {
                Ok(item) => {
                    items.insert(id, item);
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(items)
    }

    async fn save_base_item(conn: &mut SqliteConnection, item: &BaseItem) -> StoreResult<()> {
        sqlx::query(
            "UPDATE base_items SET name = ?, category = ?, description = ?, fields = ?, active = ?
             WHERE id = ? AND agency_id = ?",
        )
        .bind(&item.name)
        .bind(item.category.as_str())
        .bind(item.description.as_deref())
        .bind(json(&item.fields)?)
        .bind(item.active)
        .bind(item.id.to_string())
        .bind(item.agency_id.to_string())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn save_operator_item(
        conn: &mut SqliteConnection,
        item: &OperatorItem,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE operator_items SET operator_name = ?, name = ?, price = ?, commission_rate = ?,
                custom_fields = ?, active = ?
             WHERE id = ? AND agency_id = ?",
        )
        .bind(&item.operator_name)
        .bind(&item.name)
        .bind(item.price.to_string())
        .bind(item.commission_rate.to_string())
        .bind(json(&item.custom_fields)?)
        .bind(item.active)
        .bind(item.id.to_string())
        .bind(item.agency_id.to_string())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Catalog for CrmStore {
    async fn create_base_item(
        &self,
        agency: AgencyId,
        input: NewBaseItem,
    ) -> StoreResult<BaseItem> {
        let mut conn = self.pool.acquire().await?;
        Self::ensure_agency(&mut conn, agency).await?;
        let item = BaseItem::create(agency, input, Self::now())?;
        sqlx::query(
            "INSERT INTO base_items (id, agency_id, name, category, description, fields, active,
                created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(item.id.to_string())
        .bind(agency.to_string())
        .bind(&item.name)
        .bind(item.category.as_str())
        .bind(item.description.as_deref())
        .bind(json(&item.fields)?)
        .bind(item.active)
        .bind(ts(&item.created_at))
        .execute(&mut *conn)
        .await?;

        info!(%agency, base_item = %item.id, category = %item.category, "base item created");
        Ok(item)
    }

    async fn update_base_item(
        &self,
        agency: AgencyId,
        id: BaseItemId,
        patch: BaseItemPatch,
    ) -> StoreResult<BaseItem> {
        let mut tx = self.begin_write().await?;
        let mut item = Self::load_base_item(&mut tx, agency, id).await?;
        item.apply(patch)?;
        Self::save_base_item(&mut tx, &item).await?;
        tx.commit().await?;

        info!(%agency, base_item = %id, "base item updated");
        Ok(item)
    }

    async fn get_base_item(&self, agency: AgencyId, id: BaseItemId) -> StoreResult<BaseItem> {
        let mut conn = self.pool.acquire().await?;
        Self::load_base_item(&mut conn, agency, id).await
    }

    async fn list_base_items(
        &self,
        agency: AgencyId,
        category: Option<ItemCategory>,
    ) -> StoreResult<Vec<BaseItem>> {
        let mut items = sqlx::query(&format!(
            "SELECT {BASE_COLUMNS} FROM base_items
             WHERE agency_id = ? AND (? IS NULL OR category = ?)
             ORDER BY id"
        ))
        .bind(agency.to_string())
        .bind(category.map(ItemCategory::as_str))
        .bind(category.map(ItemCategory::as_str))
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(base_item_from_row)
        .collect::<StoreResult<Vec<_>>>()?;
        items.sort_by_cached_key(|i| i.name.to_lowercase());
        Ok(items)
    }

    async fn deactivate_base_item(
        &self,
        agency: AgencyId,
        id: BaseItemId,
    ) -> StoreResult<BaseItem> {
        let item = self
            .update_base_item(
                agency,
                id,
                BaseItemPatch {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await?;
        info!(%agency, base_item = %id, "base item deactivated");
        Ok(item)
    }

    async fn create_operator_item(
        &self,
        agency: AgencyId,
        input: NewOperatorItem,
    ) -> StoreResult<OperatorItem> {
        let mut conn = self.pool.acquire().await?;
        let settings = Self::load_agency(&mut conn, agency).await?;
        let defaults = CatalogDefaults {
            currency: settings.default_currency,
            commission_rate: settings.default_commission_rate,
        };
        let base = Self::load_base_item(&mut conn, agency, input.base_item_id).await?;
        let item = OperatorItem::create(&base, input, &defaults, Self::now())?;
        sqlx::query(
            "INSERT INTO operator_items (id, agency_id, base_item_id, operator_name, name, price,
                currency, commission_rate, custom_fields, active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(item.id.to_string())
        .bind(agency.to_string())
        .bind(item.base_item_id.to_string())
        .bind(&item.operator_name)
        .bind(&item.name)
        .bind(item.price.to_string())
        .bind(item.currency.as_str())
        .bind(item.commission_rate.to_string())
        .bind(json(&item.custom_fields)?)
        .bind(item.active)
        .bind(ts(&item.created_at))
        .execute(&mut *conn)
        .await?;

        info!(%agency, operator_item = %item.id, operator = %item.operator_name, "operator item created");
        Ok(item)
    }

    async fn update_operator_item(
        &self,
        agency: AgencyId,
        id: OperatorItemId,
        patch: OperatorItemPatch,
    ) -> StoreResult<OperatorItem> {
        let mut tx = self.begin_write().await?;
        let mut item = Self::load_operator_item(&mut tx, agency, id).await?;
        let base = Self::load_base_item(&mut tx, agency, item.base_item_id).await?;
        item.apply(&base, patch)?;
        Self::save_operator_item(&mut tx, &item).await?;
        tx.commit().await?;

        info!(%agency, operator_item = %id, "operator item updated");
        Ok(item)
    }

    async fn get_operator_item(
        &self,
        agency: AgencyId,
        id: OperatorItemId,
    ) -> StoreResult<OperatorItem> {
        let mut conn = self.pool.acquire().await?;
        Self::load_operator_item(&mut conn, agency, id).await
    }

    async fn list_operator_items(
        &self,
        agency: AgencyId,
        base: Option<BaseItemId>,
    ) -> StoreResult<Vec<OperatorItem>> {
        let base = base.map(|id| id.to_string());
        let mut items = sqlx::query(&format!(
            "SELECT {OPERATOR_COLUMNS} FROM operator_items
             WHERE agency_id = ? AND (? IS NULL OR base_item_id = ?)
             ORDER BY id"
        ))
        .bind(agency.to_string())
        .bind(base.as_deref())
        .bind(base.as_deref())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(operator_item_from_row)
        .collect::<StoreResult<Vec<_>>>()?;
        items.sort_by_cached_key(|i| (i.name.to_lowercase(), i.operator_name.to_lowercase()));
        Ok(items)
    }

    async fn deactivate_operator_item(
        &self,
        agency: AgencyId,
        id: OperatorItemId,
    ) -> StoreResult<OperatorItem> {
        let item = self
            .update_operator_item(
                agency,
                id,
                OperatorItemPatch {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await?;
        info!(%agency, operator_item = %id, "operator item deactivated");
        Ok(item)
    }
}

fn base_item_from_row(row: &SqliteRow) -> StoreResult<BaseItem> {
    Ok(BaseItem {
        id: parse(row, "id")?,
        agency_id: parse(row, "agency_id")?,
        name: row.try_get("name")?,
        category: parse(row, "category")?,
        description: row.try_get("description")?,
        fields: from_json(row, "fields")?,
        active: row.try_get("active")?,
        created_at: timestamp(row, "created_at")?,
    })
}

fn operator_item_from_row(row: &SqliteRow) -> StoreResult<OperatorItem> {
    Ok(OperatorItem {
        id: parse(row, "id")?,
        agency_id: parse(row, "agency_id")?,
        base_item_id: parse(row, "base_item_id")?,
        operator_name: row.try_get("operator_name")?,
        name: row.try_get("name")?,
        price: parse(row, "price")?,
        currency: parse(row, "currency")?,
        commission_rate: parse(row, "commission_rate")?,
        custom_fields: from_json(row, "custom_fields")?,
        active: row.try_get("active")?,
        created_at: timestamp(row, "created_at")?,
    })
}
