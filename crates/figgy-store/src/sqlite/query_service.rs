use crate::errors::{from_rusqlite, Result};
use crate::sqlite::database::Database;
use crate::sqlite::persister::find_row;
use crate::sqlite::row::{ResourceRow, COLUMNS};
use figgy_core::adapter::QueryService;
use figgy_core::errors::FiggyError;
use figgy_core::model::MEMBER_IDS;
use figgy_core::Resource;
use figgy_core_types::ResourceId;
use rusqlite::ToSql;
use std::sync::Arc;

pub(crate) struct SqliteQueryService {
    db: Arc<Database>,
}

impl SqliteQueryService {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn select(&self, filter: &str, params: &[&dyn ToSql]) -> Result<Vec<Resource>> {
        let conn = self.db.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM resources r {} ORDER BY r.rowid",
                COLUMNS, filter
            ))
            .map_err(from_rusqlite)?;
        let rows = stmt
            .query_map(params, ResourceRow::from_row)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        rows.into_iter().map(Resource::try_from).collect()
    }

    fn resolve(&self, ids: &[ResourceId]) -> Result<Vec<Resource>> {
        let conn = self.db.lock()?;
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(resource) = find_row(&conn, id)? {
                found.push(resource);
            }
        }
        Ok(found)
    }

    /// Resources whose `property` holds `id`, either as a string or in an array
    fn referencing(&self, property: &str, id: &ResourceId) -> Result<Vec<Resource>> {
        let path = json_path(property)?;
        self.select(
            "WHERE EXISTS (SELECT 1 FROM json_each(r.attributes, ?1) WHERE json_each.value = ?2)",
            &[&path, &id.as_str()],
        )
    }
}

fn json_path(property: &str) -> Result<String> {
    if property.contains('"') {
        return Err(FiggyError::InvalidInput {
            reason: format!("property name {:?} cannot contain quotes", property),
        });
    }
    Ok(format!("$.\"{}\"", property))
}

impl QueryService for SqliteQueryService {
    fn find_by(&self, id: &ResourceId) -> Result<Resource> {
        let conn = self.db.lock()?;
        find_row(&conn, id)?.ok_or_else(|| FiggyError::ObjectNotFound { id: id.to_string() })
    }

    fn find_all(&self) -> Result<Vec<Resource>> {
        self.select("", &[])
    }

    fn find_all_of_model(&self, model: &str) -> Result<Vec<Resource>> {
        self.select("WHERE r.model = ?1", &[&model])
    }

    fn find_members(&self, resource: &Resource) -> Result<Vec<Resource>> {
        self.resolve(&resource.member_ids())
    }

    fn find_parents(&self, resource: &Resource) -> Result<Vec<Resource>> {
        let Some(id) = &resource.id else {
            return Ok(Vec::new());
        };
        self.referencing(MEMBER_IDS, id)
    }

    fn find_references_by(&self, resource: &Resource, property: &str) -> Result<Vec<Resource>> {
        self.resolve(&resource.reference_ids(property))
    }

    fn find_inverse_references_by(
        &self,
        resource: &Resource,
        property: &str,
    ) -> Result<Vec<Resource>> {
        let id = resource.id.as_ref().ok_or_else(|| FiggyError::InvalidInput {
            reason: "inverse references need a saved resource".to_string(),
        })?;
        self.referencing(property, id)
    }
}
