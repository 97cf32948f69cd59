use crate::changeset::{ChangeEntry, ChangeKind};
use crate::error::StagerError;

/// parse `status --porcelain -z` output into change entries
///
/// each record is `XY <path>`; a rename or copy names its destination and
/// consumes the following record as its source. `in_project` decides which
/// repository paths belong to the tracked namespace. Malformed records are skipped.
pub fn parse_status<F>(output: &[u8], in_project: F) -> Vec<ChangeEntry>
where
    F: Fn(&str) -> bool,
{
    let records: Vec<&[u8]> = output.split(|b| *b == 0).collect();
    let mut entries = Vec::new();
    let mut i = 0;

    while i < records.len() {
        let record = records[i];
        i += 1;

        if record.is_empty() {
            continue;
        }
        if record.len() < 3 {
            anomaly(&format!(
                "record too short: {:?}",
                String::from_utf8_lossy(record)
            ));
            continue;
        }

        let index_status = record[0] as char;
        let worktree_status = record[1] as char;
        let path = String::from_utf8_lossy(&record[3..]).to_string();

        let primary = if index_status == ' ' {
            worktree_status
        } else {
            index_status
        };
        let is_staged = index_status != ' ' && index_status != '?';
        let is_unstaged = worktree_status != ' ' || index_status == '?';

        if primary == 'R' || primary == 'C' {
            // with -z git writes the new path first and the old one after it;
            // the paired record is consumed even when this one is unusable
            let Some(source) = records.get(i) else {
                anomaly(&format!("{primary} record for {path} has no source"));
                continue;
            };
            i += 1;
            if source.is_empty() || path.is_empty() {
                anomaly(&format!("{primary} record for {path:?} has an empty path"));
                continue;
            }
            let source = String::from_utf8_lossy(source).to_string();
            let destination = path;
            if !is_staged && !is_unstaged {
                continue;
            }

            if primary == 'C' {
                if in_project(&destination) {
                    entries.push(ChangeEntry::new(
                        destination,
                        ChangeKind::Added,
                        is_staged,
                        is_unstaged,
                    ));
                }
                continue;
            }

            push_rename(
                &mut entries,
                source,
                destination,
                is_staged,
                is_unstaged,
                &in_project,
            );
            continue;
        }

        let kind = ChangeKind::from_status_char(primary);
        if kind == ChangeKind::Unknown || path.is_empty() {
            continue;
        }
        if !is_staged && !is_unstaged {
            continue;
        }
        if !in_project(&path) {
            continue;
        }
        entries.push(ChangeEntry::new(path, kind, is_staged, is_unstaged));
    }

    entries
}

fn push_rename<F>(
    entries: &mut Vec<ChangeEntry>,
    source: String,
    destination: String,
    is_staged: bool,
    is_unstaged: bool,
    in_project: &F,
) where
    F: Fn(&str) -> bool,
{
    match (in_project(&source), in_project(&destination)) {
        (true, true) => {
            entries.push(
                ChangeEntry::new(destination.clone(), ChangeKind::Renamed, is_staged, is_unstaged)
                    .with_original(source.clone()),
            );
            entries.push(
                ChangeEntry::new(source, ChangeKind::Deleted, is_staged, is_unstaged)
                    .with_original(destination),
            );
        }
        // moved out of the project: only the disappearance is visible
        (true, false) => {
            entries.push(ChangeEntry::new(
                source,
                ChangeKind::Deleted,
                is_staged,
                is_unstaged,
            ));
        }
        // moved in from outside: only the arrival is visible
        (false, true) => {
            entries.push(ChangeEntry::new(
                destination,
                ChangeKind::Added,
                is_staged,
                is_unstaged,
            ));
        }
        (false, false) => {}
    }
}

fn anomaly(detail: &str) {
    tracing::warn!("{}", StagerError::ParseAnomaly(detail.to_string()));
}
