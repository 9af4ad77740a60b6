use crate::errors::{from_rusqlite, Result};
use crate::sqlite::database::Database;
use crate::sqlite::row::{ResourceRow, COLUMNS};
use figgy_core::adapter::{in_transaction, prepare_save, Persister, Transactional};
use figgy_core::Resource;
use figgy_core_types::ResourceId;
use rusqlite::{Connection, OptionalExtension};
use std::sync::Arc;

pub(crate) struct SqlitePersister {
    db: Arc<Database>,
}

impl SqlitePersister {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

pub(crate) fn find_row(conn: &Connection, id: &ResourceId) -> Result<Option<Resource>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM resources WHERE id = ?1", COLUMNS),
            [id.as_str()],
            ResourceRow::from_row,
        )
        .optional()
        .map_err(from_rusqlite)?;
    row.map(Resource::try_from).transpose()
}

fn upsert(conn: &Connection, resource: &Resource) -> Result<()> {
    let row = ResourceRow::from_resource(resource)?;
    conn.execute(
        "INSERT INTO resources (id, model, lock_version, attributes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            model = excluded.model,
            lock_version = excluded.lock_version,
            attributes = excluded.attributes,
            updated_at = excluded.updated_at",
        rusqlite::params![
            row.id,
            row.model,
            row.lock_version,
            row.attributes,
            row.created_at,
            row.updated_at,
        ],
    )
    .map_err(from_rusqlite)?;
    Ok(())
}

impl Persister for SqlitePersister {
    fn save(&self, resource: Resource, external_resource: bool) -> Result<Resource> {
        let conn = self.db.lock()?;
        let stored = match &resource.id {
            Some(id) => find_row(&conn, id)?,
            None => None,
        };
        let saved = prepare_save(resource, stored.as_ref(), external_resource)?;
        upsert(&conn, &saved)?;
        Ok(saved)
    }

    fn save_all(&self, resources: Vec<Resource>) -> Result<Vec<Resource>> {
        in_transaction(self.connection(), true, || {
            resources
                .into_iter()
                .map(|resource| self.save(resource, false))
                .collect()
        })
    }

    fn delete(&self, resource: Resource) -> Result<Resource> {
        if let Some(id) = &resource.id {
            self.db
                .lock()?
                .execute("DELETE FROM resources WHERE id = ?1", [id.as_str()])
                .map_err(from_rusqlite)?;
        }
        Ok(resource)
    }

    fn connection(&self) -> Option<Arc<dyn Transactional>> {
        Some(self.db.clone())
    }
}
