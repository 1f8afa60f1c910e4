use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context};
use kerjoo_core::{
    Assignment, AssignmentId, AssignmentItem, AssignmentSnapshot, Change, Coordinates, Geofence, ItemId, Photo,
    RequirementProfile, Status, TaskDefId, TaskDefinition, UserId,
};
use kerjoo_storage::{Storage, StorageError};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

const ASSIGNMENT_COLUMNS: &str = "id, task_id, worker_id, assigner_id, status, deadline_at, started_at, ended_at, note, \
     target_lat, target_lon, target_radius_m, target_name, created_at, version";

const ITEM_COLUMNS: &str = "id, assignment_id, name, sort_order, status, started_at, running_since, ended_at, duration_secs, \
     photo_before_ref, photo_before_lat, photo_before_lon, photo_after_ref, photo_after_lat, photo_after_lon, \
     file_ref, summary, version";

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql).context("apply schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Backend(anyhow!("sqlite connection lock poisoned")))
    }

    fn status_from_sql(idx: usize, s: &str) -> rusqlite::Result<Status> {
        Status::parse(s).ok_or_else(|| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("unknown status {s:?}").into()))
    }

    fn assignment_from_row(r: &Row<'_>) -> rusqlite::Result<Assignment> {
        let lat: Option<f64> = r.get(9)?;
        let lon: Option<f64> = r.get(10)?;
        let radius: Option<i64> = r.get(11)?;
        let geofence = match (lat, lon, radius) {
            (Some(lat), Some(lon), Some(radius)) => Some(Geofence {
                center: Coordinates { lat, lon },
                radius_m: radius as u32,
                name: r.get(12)?,
            }),
            _ => None,
        };
        Ok(Assignment {
            id: AssignmentId::from_str(r.get::<_, String>(0)?),
            task_id: TaskDefId::from_str(r.get::<_, String>(1)?),
            worker_id: UserId::from_str(r.get::<_, String>(2)?),
            assigner_id: UserId::from_str(r.get::<_, String>(3)?),
            status: Self::status_from_sql(4, &r.get::<_, String>(4)?)?,
            deadline_unix: r.get(5)?,
            started_at_unix: r.get(6)?,
            ended_at_unix: r.get(7)?,
            note: r.get(8)?,
            geofence,
            created_at_unix: r.get(13)?,
            version: r.get::<_, i64>(14)? as u64,
        })
    }

    fn photo_from_row(r: &Row<'_>, first: usize) -> rusqlite::Result<Option<Photo>> {
        let reference: Option<String> = r.get(first)?;
        let lat: Option<f64> = r.get(first + 1)?;
        let lon: Option<f64> = r.get(first + 2)?;
        Ok(reference.map(|reference| Photo {
            reference,
            position: lat.zip(lon).map(|(lat, lon)| Coordinates { lat, lon }),
        }))
    }

    fn item_from_row(r: &Row<'_>) -> rusqlite::Result<AssignmentItem> {
        Ok(AssignmentItem {
            id: ItemId::from_str(r.get::<_, String>(0)?),
            assignment_id: AssignmentId::from_str(r.get::<_, String>(1)?),
            name: r.get(2)?,
            sort_order: r.get(3)?,
            status: Self::status_from_sql(4, &r.get::<_, String>(4)?)?,
            started_at_unix: r.get(5)?,
            running_since_unix: r.get(6)?,
            ended_at_unix: r.get(7)?,
            duration_secs: r.get::<_, i64>(8)? as u64,
            photo_before: Self::photo_from_row(r, 9)?,
            photo_after: Self::photo_from_row(r, 12)?,
            file_ref: r.get(15)?,
            summary: r.get(16)?,
            version: r.get::<_, i64>(17)? as u64,
        })
    }

    fn task_from_row(r: &Row<'_>) -> rusqlite::Result<TaskDefinition> {
        Ok(TaskDefinition {
            id: TaskDefId::from_str(r.get::<_, String>(0)?),
            name: r.get(1)?,
            category: r.get(2)?,
            requirements: RequirementProfile {
                requires_photo: r.get(3)?,
                requires_file: r.get(4)?,
                requires_text_summary: r.get(5)?,
            },
        })
    }

    fn insert_item(conn: &Connection, item: &AssignmentItem) -> anyhow::Result<()> {
        let (b_ref, b_lat, b_lon) = photo_columns(item.photo_before.as_ref());
        let (a_ref, a_lat, a_lon) = photo_columns(item.photo_after.as_ref());
        conn.execute(
            &format!("INSERT INTO assignment_items({ITEM_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"),
            params![
                item.id.0,
                item.assignment_id.0,
                item.name,
                item.sort_order,
                item.status.as_str(),
                item.started_at_unix,
                item.running_since_unix,
                item.ended_at_unix,
                item.duration_secs as i64,
                b_ref,
                b_lat,
                b_lon,
                a_ref,
                a_lat,
                a_lon,
                item.file_ref,
                item.summary,
                item.version as i64
            ],
        )
        .with_context(|| format!("insert item {}", item.id))?;
        Ok(())
    }

    /// Tell "row is gone" apart from "row moved on" after a guarded update hit nothing.
    fn missing_or_conflict(conn: &Connection, table: &str, entity: &'static str, id: &str) -> StorageError {
        let exists = conn
            .query_row(&format!("SELECT COUNT(1) FROM {table} WHERE id=?1"), params![id], |r| r.get::<_, i64>(0))
            .unwrap_or(0);
        if exists == 0 {
            StorageError::NotFound { entity, id: id.to_string() }
        } else {
            StorageError::Conflict { entity, id: id.to_string() }
        }
    }
}

fn photo_columns(photo: Option<&Photo>) -> (Option<&str>, Option<f64>, Option<f64>) {
    match photo {
        Some(p) => (Some(p.reference.as_str()), p.position.map(|c| c.lat), p.position.map(|c| c.lon)),
        None => (None, None, None),
    }
}

impl Storage for SqliteStorage {
    fn insert_task_definition(&self, task: &TaskDefinition) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO task_definitions(id, name, category, requires_photo, requires_file, requires_text_summary)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                task.id.0,
                task.name,
                task.category,
                task.requirements.requires_photo,
                task.requirements.requires_file,
                task.requirements.requires_text_summary
            ],
        )
        .with_context(|| format!("insert task definition {}", task.id))?;
        Ok(())
    }

    fn task_definition(&self, id: &TaskDefId) -> Result<TaskDefinition, StorageError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name, category, requires_photo, requires_file, requires_text_summary FROM task_definitions WHERE id=?1",
            params![id.0],
            Self::task_from_row,
        )
        .optional()
        .context("load task definition")?
        .ok_or_else(|| StorageError::NotFound { entity: "task", id: id.to_string() })
    }

    fn list_task_definitions(&self) -> Result<Vec<TaskDefinition>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, name, category, requires_photo, requires_file, requires_text_summary FROM task_definitions ORDER BY name")
            .context("prepare task list")?;
        let rows = stmt.query_map([], Self::task_from_row).context("list task definitions")?;
        let mut tasks = vec![];
        for row in rows {
            tasks.push(row.context("read task definition")?);
        }
        Ok(tasks)
    }

    fn insert_assignment(&self, assignment: &Assignment, items: &[AssignmentItem]) -> Result<(), StorageError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().context("begin insert assignment")?;
        let fence = assignment.geofence.as_ref();
        tx.execute(
            &format!("INSERT INTO assignments({ASSIGNMENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"),
            params![
                assignment.id.0,
                assignment.task_id.0,
                assignment.worker_id.0,
                assignment.assigner_id.0,
                assignment.status.as_str(),
                assignment.deadline_unix,
                assignment.started_at_unix,
                assignment.ended_at_unix,
                assignment.note,
                fence.map(|f| f.center.lat),
                fence.map(|f| f.center.lon),
                fence.map(|f| i64::from(f.radius_m)),
                fence.and_then(|f| f.name.clone()),
                assignment.created_at_unix,
                assignment.version as i64
            ],
        )
        .with_context(|| format!("insert assignment {}", assignment.id))?;
        for item in items {
            Self::insert_item(&tx, item)?;
        }
        tx.commit().context("commit insert assignment")?;
        Ok(())
    }

    fn load_snapshot(&self, assignment_id: &AssignmentId) -> Result<AssignmentSnapshot, StorageError> {
        let conn = self.lock()?;

        let assignment = conn
            .query_row(
                &format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id=?1"),
                params![assignment_id.0],
                Self::assignment_from_row,
            )
            .optional()
            .context("load assignment")?
            .ok_or_else(|| StorageError::NotFound { entity: "assignment", id: assignment_id.to_string() })?;

        let mut items = vec![];
        {
            let mut stmt = conn
                .prepare(&format!("SELECT {ITEM_COLUMNS} FROM assignment_items WHERE assignment_id=?1 ORDER BY sort_order, id"))
                .context("prepare item query")?;
            let rows = stmt.query_map(params![assignment_id.0], Self::item_from_row).context("load items")?;
            for row in rows {
                items.push(row.context("read item")?);
            }
        }

        let task = conn
            .query_row(
                "SELECT id, name, category, requires_photo, requires_file, requires_text_summary FROM task_definitions WHERE id=?1",
                params![assignment.task_id.0],
                Self::task_from_row,
            )
            .context("load task definition for assignment")?;

        Ok(AssignmentSnapshot { assignment, items, task })
    }

    fn assignment_of_item(&self, item_id: &ItemId) -> Result<AssignmentId, StorageError> {
        let conn = self.lock()?;
        conn.query_row("SELECT assignment_id FROM assignment_items WHERE id=?1", params![item_id.0], |r| r.get::<_, String>(0))
            .optional()
            .context("look up item")?
            .map(AssignmentId::from_str)
            .ok_or_else(|| StorageError::NotFound { entity: "item", id: item_id.to_string() })
    }

    fn list_assignments(&self, worker: Option<&UserId>) -> Result<Vec<Assignment>, StorageError> {
        let conn = self.lock()?;
        let mut out = vec![];
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE (?1 IS NULL OR worker_id = ?1) ORDER BY created_at, id"
            ))
            .context("prepare assignment list")?;
        let rows = stmt
            .query_map(params![worker.map(|w| w.as_str())], Self::assignment_from_row)
            .context("list assignments")?;
        for row in rows {
            out.push(row.context("read assignment")?);
        }
        Ok(out)
    }

    fn commit(&self, change: &Change) -> Result<(), StorageError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().context("begin commit")?;

        if let Some(worker) = &change.exclusive_for {
            let except = change.item_id().map(|i| i.as_str()).unwrap_or("");
            let active: Option<String> = tx
                .query_row(
                    "SELECT i.id FROM assignment_items i JOIN assignments a ON a.id = i.assignment_id
                     WHERE a.worker_id = ?1 AND i.status = 'in_progress' AND i.id <> ?2 LIMIT 1",
                    params![worker.0, except],
                    |r| r.get(0),
                )
                .optional()
                .context("check active items")?;
            if let Some(active) = active {
                return Err(StorageError::ActiveItem { worker: worker.clone(), active: ItemId::from_str(active) });
            }
        }

        let a = &change.assignment;
        let updated = tx
            .execute(
                "UPDATE assignments SET status=?1, started_at=?2, ended_at=?3, note=?4, version=version+1
                 WHERE id=?5 AND version=?6",
                params![a.status.as_str(), a.started_at_unix, a.ended_at_unix, a.note, a.id.0, a.version as i64],
            )
            .context("update assignment")?;
        if updated == 0 {
            return Err(Self::missing_or_conflict(&tx, "assignments", "assignment", a.id.as_str()));
        }

        if let Some(item) = &change.item {
            let (b_ref, b_lat, b_lon) = photo_columns(item.photo_before.as_ref());
            let (a_ref, a_lat, a_lon) = photo_columns(item.photo_after.as_ref());
            let updated = tx
                .execute(
                    "UPDATE assignment_items SET status=?1, started_at=?2, running_since=?3, ended_at=?4, duration_secs=?5,
                       photo_before_ref=?6, photo_before_lat=?7, photo_before_lon=?8,
                       photo_after_ref=?9, photo_after_lat=?10, photo_after_lon=?11,
                       file_ref=?12, summary=?13, version=version+1
                     WHERE id=?14 AND version=?15",
                    params![
                        item.status.as_str(),
                        item.started_at_unix,
                        item.running_since_unix,
                        item.ended_at_unix,
                        item.duration_secs as i64,
                        b_ref,
                        b_lat,
                        b_lon,
                        a_ref,
                        a_lat,
                        a_lon,
                        item.file_ref,
                        item.summary,
                        item.id.0,
                        item.version as i64
                    ],
                )
                .context("update item")?;
            if updated == 0 {
                return Err(Self::missing_or_conflict(&tx, "assignment_items", "item", item.id.as_str()));
            }
        }

        if let Some(item) = &change.appended {
            Self::insert_item(&tx, item)?;
        }

        tx.commit().context("commit change")?;
        debug!(action = %change.action, assignment = %a.id, "committed change");
        Ok(())
    }
}
