//! Reading and writing the persisted stray list.
//!
//! One user key per line (`type,username,domain`), an optional header line, and
//! an optional fourth `umapi` column naming the secondary target (empty for the
//! primary). The fourth column is only written when a secondary target is
//! involved.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::error::SyncError;
use crate::stray::StrayRecord;
use crate::types::{IdentityType, TargetId, UserKey};

const HEADER: &str = "type,username,domain";
const TARGET_COLUMN: &str = "umapi";

/// Parse a stray list. Blank lines and a leading header are skipped.
pub fn read_stray_list(reader: impl BufRead) -> Result<Vec<StrayRecord>, SyncError> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || (index == 0 && is_header(line)) {
            continue;
        }
        records.push(parse_line(line)?);
    }
    Ok(records)
}

pub fn load_stray_list(path: &Path) -> Result<Vec<StrayRecord>, SyncError> {
    let records = read_stray_list(BufReader::new(File::open(path)?))?;
    info!(event = "StrayList", phase = "Load", path = %path.display(), count = records.len());
    Ok(records)
}

/// Write `strays` grouped by target, primary first.
pub fn write_stray_list(
    mut writer: impl Write,
    strays: &BTreeMap<TargetId, BTreeSet<UserKey>>,
) -> Result<(), SyncError> {
    let with_target = strays
        .iter()
        .any(|(target, keys)| !target.is_primary() && !keys.is_empty());

    if with_target {
        writeln!(writer, "{HEADER},{TARGET_COLUMN}")?;
    } else {
        writeln!(writer, "{HEADER}")?;
    }
    for (target, keys) in strays {
        for key in keys {
            if with_target {
                writeln!(writer, "{key},{}", target.name().unwrap_or_default())?;
            } else {
                writeln!(writer, "{key}")?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn save_stray_list(
    path: &Path,
    strays: &BTreeMap<TargetId, BTreeSet<UserKey>>,
) -> Result<(), SyncError> {
    write_stray_list(BufWriter::new(File::create(path)?), strays)?;
    debug!(event = "StrayList", phase = "Save", path = %path.display());
    Ok(())
}

fn is_header(line: &str) -> bool {
    line.to_lowercase().starts_with(HEADER)
}

fn parse_line(line: &str) -> Result<StrayRecord, SyncError> {
    let columns: Vec<&str> = line.split(',').map(str::trim).collect();
    let (key, target) = match columns.as_slice() {
        [identity_type, username, domain] => (key_from(identity_type, username, domain, line)?, None),
        [identity_type, username, domain, target] => (
            key_from(identity_type, username, domain, line)?,
            Some(TargetId::from_name(Some(*target))),
        ),
        _ => return Err(SyncError::MalformedKey(line.to_string())),
    };
    let mut record = StrayRecord::new(key);
    record.target = target;
    Ok(record)
}

fn key_from(
    identity_type: &str,
    username: &str,
    domain: &str,
    line: &str,
) -> Result<UserKey, SyncError> {
    let identity_type: IdentityType = identity_type
        .parse()
        .map_err(|_| SyncError::MalformedKey(line.to_string()))?;
    if username.is_empty() {
        return Err(SyncError::MalformedKey(line.to_string()));
    }
    Ok(UserKey::new(identity_type, username, domain))
}
