use crate::errors::{corrupt_row, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use figgy_core::errors::FiggyError;
use figgy_core::Resource;
use figgy_core_types::ResourceId;
use std::collections::BTreeMap;

pub(crate) const COLUMNS: &str = "id, model, lock_version, attributes, created_at, updated_at";

/// Raw `resources` row as read from SQLite
pub(crate) struct ResourceRow {
    pub id: String,
    pub model: String,
    pub lock_version: Option<i64>,
    pub attributes: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ResourceRow {
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            model: row.get(1)?,
            lock_version: row.get(2)?,
            attributes: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    /// Row for a resource that has been through `prepare_save`
    pub(crate) fn from_resource(resource: &Resource) -> Result<Self> {
        let id = resource.id.as_ref().ok_or_else(|| FiggyError::Internal {
            message: "resource reached the sqlite writer without an id".to_string(),
        })?;
        let lock_version = resource
            .lock_version
            .map(i64::try_from)
            .transpose()
            .map_err(|_| FiggyError::InvalidInput {
                reason: format!("lock version of {} out of range", id),
            })?;
        let now = Utc::now();

        Ok(Self {
            id: id.to_string(),
            model: resource.model.clone(),
            lock_version,
            attributes: serde_json::to_string(&resource.attributes)?,
            created_at: timestamp(resource.created_at.unwrap_or(now)),
            updated_at: timestamp(resource.updated_at.unwrap_or(now)),
        })
    }
}

impl TryFrom<ResourceRow> for Resource {
    type Error = FiggyError;

    fn try_from(row: ResourceRow) -> Result<Self> {
        let attributes: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(&row.attributes).map_err(|e| corrupt_row(&row.id, e))?;
        let lock_version = row
            .lock_version
            .map(u64::try_from)
            .transpose()
            .map_err(|e| corrupt_row(&row.id, e))?;
        let created_at = parse_timestamp(&row.id, &row.created_at)?;
        let updated_at = parse_timestamp(&row.id, &row.updated_at)?;

        Ok(Resource {
            id: Some(ResourceId::from(row.id)),
            model: row.model,
            attributes,
            lock_version,
            new_record: false,
            created_at: Some(created_at),
            updated_at: Some(updated_at),
        })
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(id: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| corrupt_row(id, e))
}
