//! Row-level SQL shared by [`Queue`](super::Queue) and [`QueueTx`](super::QueueTx).
//!
//! Every function takes a plain connection so the same statement runs either
//! on a pooled connection or inside an open transaction.

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::filter::{FileFilter, ResourceFilter};
use super::item::{
    FileDownload, FileStatus, FileUpdate, NewFileDownload, NewResourceDownload, ResourceDownload,
    ResourceStatus, ResourceUpdate,
};
use super::{Result, check_affected};

/// Millisecond-resolution timestamp, so "most recently updated" ordering is
/// meaningful for rows touched within the same second.
pub(crate) const NOW: &str = "strftime('%Y-%m-%d %H:%M:%f', 'now')";

const FILE_ORDER: &str = " ORDER BY updated_at DESC, id DESC";
const RESOURCE_ORDER: &str = " ORDER BY failed ASC, updated_at DESC, id DESC";

pub(crate) async fn insert_file(conn: &mut SqliteConnection, row: &NewFileDownload) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r"INSERT INTO file_downloads
          (download_id, file_id, identifier, site, file_url, filename, save_path,
           resource_id, status, note, client)
          VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
          RETURNING id",
    )
    .bind(&row.download_id)
    .bind(&row.file_id)
    .bind(&row.identifier)
    .bind(&row.site)
    .bind(&row.file_url)
    .bind(&row.filename)
    .bind(&row.save_path)
    .bind(&row.resource_id)
    .bind(row.status.as_str())
    .bind(&row.note)
    .bind(&row.client)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

pub(crate) async fn insert_resource(
    conn: &mut SqliteConnection,
    row: &NewResourceDownload,
) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r"INSERT INTO resource_downloads
          (resource_id, identifier, site, number, title, author, size, tags)
          VALUES (?, ?, ?, ?, ?, ?, ?, ?)
          RETURNING id",
    )
    .bind(&row.resource_id)
    .bind(&row.identifier)
    .bind(&row.site)
    .bind(&row.number)
    .bind(&row.title)
    .bind(&row.author)
    .bind(row.size)
    .bind(row.tags_json())
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

pub(crate) async fn get_file(conn: &mut SqliteConnection, id: i64) -> Result<FileDownload> {
    sqlx::query_as::<_, FileDownload>("SELECT * FROM file_downloads WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(super::QueueError::ItemNotFound(id))
}

pub(crate) async fn get_resource(conn: &mut SqliteConnection, id: i64) -> Result<ResourceDownload> {
    sqlx::query_as::<_, ResourceDownload>("SELECT * FROM resource_downloads WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(super::QueueError::ItemNotFound(id))
}

pub(crate) async fn find_files(
    conn: &mut SqliteConnection,
    filter: &FileFilter,
    limit: Option<i64>,
) -> Result<Vec<FileDownload>> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM file_downloads");
    filter.push_where(&mut qb);
    qb.push(FILE_ORDER);
    if let Some(limit) = limit {
        qb.push(" LIMIT ").push_bind(limit);
    }
    Ok(qb
        .build_query_as::<FileDownload>()
        .fetch_all(&mut *conn)
        .await?)
}

pub(crate) async fn find_resources(
    conn: &mut SqliteConnection,
    filter: &ResourceFilter,
    limit: Option<i64>,
) -> Result<Vec<ResourceDownload>> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM resource_downloads");
    filter.push_where(&mut qb);
    qb.push(RESOURCE_ORDER);
    if let Some(limit) = limit {
        qb.push(" LIMIT ").push_bind(limit);
    }
    Ok(qb
        .build_query_as::<ResourceDownload>()
        .fetch_all(&mut *conn)
        .await?)
}

pub(crate) async fn update_file(
    conn: &mut SqliteConnection,
    id: i64,
    update: &FileUpdate,
) -> Result<()> {
    if update.is_empty() {
        return Ok(());
    }
    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE file_downloads SET updated_at = ");
    qb.push(NOW);
    if let Some(status) = update.status {
        qb.push(", status = ").push_bind(status.as_str());
    }
    if let Some(download_id) = &update.download_id {
        qb.push(", download_id = ").push_bind(download_id.clone());
    }
    if let Some(save_path) = &update.save_path {
        qb.push(", save_path = ").push_bind(save_path.clone());
    }
    if let Some(client) = &update.client {
        qb.push(", client = ").push_bind(client.clone());
    }
    if let Some(note) = &update.note {
        qb.push(", note = ").push_bind(note.clone());
    }
    qb.push(" WHERE id = ").push_bind(id);
    let result = qb.build().execute(&mut *conn).await?;
    check_affected(id, result.rows_affected())
}

pub(crate) async fn update_resource(
    conn: &mut SqliteConnection,
    id: i64,
    update: &ResourceUpdate,
) -> Result<()> {
    if update.is_empty() {
        return Ok(());
    }
    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE resource_downloads SET updated_at = ");
    qb.push(NOW);
    if let Some(status) = update.status {
        qb.push(", status = ").push_bind(status.as_str());
    }
    if let Some(save_path) = &update.save_path {
        qb.push(", save_path = ").push_bind(save_path.clone());
    }
    if let Some(client) = &update.client {
        qb.push(", client = ").push_bind(client.clone());
    }
    if let Some(note) = &update.note {
        qb.push(", note = ").push_bind(note.clone());
    }
    if let Some(failed) = update.failed {
        qb.push(", failed = ").push_bind(failed);
    }
    qb.push(" WHERE id = ").push_bind(id);
    let result = qb.build().execute(&mut *conn).await?;
    check_affected(id, result.rows_affected())
}

pub(crate) async fn delete_files(conn: &mut SqliteConnection, ids: &[i64]) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM file_downloads WHERE id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
    Ok(qb.build().execute(&mut *conn).await?.rows_affected())
}

pub(crate) async fn delete_files_of_resource(
    conn: &mut SqliteConnection,
    resource_id: &str,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM file_downloads WHERE resource_id = ?")
        .bind(resource_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn delete_resource(conn: &mut SqliteConnection, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM resource_downloads WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    check_affected(id, result.rows_affected())
}

pub(crate) async fn set_file_status_where(
    conn: &mut SqliteConnection,
    from: FileStatus,
    to: FileStatus,
) -> Result<u64> {
    let sql = format!("UPDATE file_downloads SET status = ?, updated_at = {NOW} WHERE status = ?");
    let result = sqlx::query(&sql)
        .bind(to.as_str())
        .bind(from.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn requeue_error_resources(conn: &mut SqliteConnection) -> Result<u64> {
    let sql = format!(
        "UPDATE resource_downloads SET status = ?, failed = 0, updated_at = {NOW} WHERE status = ?"
    );
    let result = sqlx::query(&sql)
        .bind(ResourceStatus::Queued.as_str())
        .bind(ResourceStatus::Error.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn count_files(conn: &mut SqliteConnection, filter: &FileFilter) -> Result<i64> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM file_downloads");
    filter.push_where(&mut qb);
    Ok(qb.build_query_scalar::<i64>().fetch_one(&mut *conn).await?)
}

pub(crate) async fn count_resources(
    conn: &mut SqliteConnection,
    filter: &ResourceFilter,
) -> Result<i64> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM resource_downloads");
    filter.push_where(&mut qb);
    Ok(qb.build_query_scalar::<i64>().fetch_one(&mut *conn).await?)
}
