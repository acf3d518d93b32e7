//! Operator-facing view of the queue: the five buckets printed by `status`
//! and by the `p` console command.

use std::fmt;

use super::item::{FileDownload, ResourceDownload};

const NAME_WIDTH: usize = 30;

/// Queue contents relevant to one client.
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    /// Files the client is currently downloading.
    pub downloading_files: Vec<FileDownload>,
    /// Resources the client completed.
    pub completed_resources: Vec<ResourceDownload>,
    /// Standalone files the client completed.
    pub completed_files: Vec<FileDownload>,
    /// Resources waiting for admission (any client).
    pub queued_resources: Vec<ResourceDownload>,
    /// Standalone files waiting for admission (any client).
    pub queued_files: Vec<FileDownload>,
}

impl fmt::Display for QueueSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_files(f, "Downloading files", &self.downloading_files)?;
        writeln!(f)?;
        write_resources(f, "Completed downloaded resources", &self.completed_resources)?;
        writeln!(f)?;
        write_files(f, "Completed downloaded files", &self.completed_files)?;
        writeln!(f)?;
        write_resources(f, "Queued resources", &self.queued_resources)?;
        writeln!(f)?;
        write_files(f, "Queued files", &self.queued_files)?;
        writeln!(f)
    }
}

fn write_row(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    client: &str,
    status: &str,
    key: &str,
    note: &str,
) -> fmt::Result {
    writeln!(
        f,
        "{}  {client:<10}  {status:<10}  {key:<16}  {note}",
        fit_width(name, NAME_WIDTH)
    )
}

fn write_files(f: &mut fmt::Formatter<'_>, title: &str, files: &[FileDownload]) -> fmt::Result {
    writeln!(f, "{title} ({}):", files.len())?;
    write_row(f, "Filename", "Client", "Status", "TaskId", "Note")?;
    for file in files {
        let mut notes = Vec::new();
        if !file.resource_id.is_empty() {
            notes.push(format!("resource:{}", file.resource_id));
        } else if !file.file_id.is_empty() {
            notes.push(format!("file:{}", file.file_id));
        }
        if !file.save_path.is_empty() {
            notes.push(file.save_path.clone());
        }
        if !file.note.is_empty() {
            notes.push(file.note.clone());
        }
        write_row(
            f,
            &file.filename,
            &file.client,
            &file.status().to_string(),
            &file.download_id,
            &notes.join(" ; "),
        )?;
    }
    Ok(())
}

fn write_resources(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    resources: &[ResourceDownload],
) -> fmt::Result {
    writeln!(f, "{title} ({}):", resources.len())?;
    write_row(f, "Name", "Client", "Status", "Number", "Note")?;
    for resource in resources {
        let mut notes = vec![format!("id:{}", resource.resource_id)];
        if !resource.save_path.is_empty() {
            notes.push(resource.save_path.clone());
        }
        notes.push(format!("tags:{}", resource.tags().join(",")));
        write_row(
            f,
            &resource.title,
            &resource.client,
            &resource.status().to_string(),
            &resource.number,
            &notes.join(" ; "),
        )?;
    }
    Ok(())
}

/// Pads or truncates `value` to exactly `width` chars, marking truncation with `..`.
fn fit_width(value: &str, width: usize) -> String {
    let count = value.chars().count();
    if count <= width {
        return format!("{value}{}", " ".repeat(width - count));
    }
    let kept: String = value.chars().take(width.saturating_sub(2)).collect();
    format!("{kept}..")
}
