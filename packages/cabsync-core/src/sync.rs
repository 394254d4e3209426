use std::collections::HashSet;
use std::mem::discriminant;

use log::info;

use crate::error::{Error, Result};
use crate::ids::NodeId;
use crate::time::Timestamp;
use crate::tree::{Cabinet, Node, NodeKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Side {
    Local,
    Remote,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyncOutcome {
    /// Both trees were reconciled in place and now agree level by level.
    Merged,
    /// The roots are different cabinets; the named side was created later
    /// and is authoritative. Neither tree was touched; replacing the other
    /// copy wholesale is the caller's decision.
    Superseded(Side),
}

/// Reconcile two copies of the same vault. `last_sync` is the watermark of
/// the previous successful synchronization: children created before it that
/// are missing on one side were deleted there; children created after it
/// that are missing on one side were added on the other.
///
/// The merge runs against clones and the results replace the inputs only on
/// success, so an aborted synchronization leaves both trees untouched.
pub fn synchronize(
    local: &mut Cabinet,
    remote: &mut Cabinet,
    last_sync: Timestamp,
) -> Result<SyncOutcome> {
    if local.id() != remote.id() {
        let winner = if local.created() > remote.created() {
            Side::Local
        } else {
            Side::Remote
        };
        info!("event=synchronize status=root_mismatch winner={winner:?}");
        return Ok(SyncOutcome::Superseded(winner));
    }

    let mut merged_local = local.clone();
    let mut merged_remote = remote.clone();
    let changes = merge_cabinet(&mut merged_local, &mut merged_remote, last_sync)?;
    if changes > 0 {
        merged_local.mark_dirty();
        merged_remote.mark_dirty();
    }
    *local = merged_local;
    *remote = merged_remote;
    info!("event=synchronize status=merged changes={changes}");
    Ok(SyncOutcome::Merged)
}

fn merge_cabinet(local: &mut Cabinet, remote: &mut Cabinet, last_sync: Timestamp) -> Result<u64> {
    let mut changes = 0;

    if local.label() != remote.label() {
        if local.modified() < remote.modified() {
            local.set_label_quiet(remote.label().to_string());
        } else {
            remote.set_label_quiet(local.label().to_string());
        }
        changes += 1;
    }
    if local.password() != remote.password() {
        if local.modified() < remote.modified() {
            local.set_password_quiet(remote.password().to_string());
        } else {
            remote.set_password_quiet(local.password().to_string());
        }
        changes += 1;
    }

    // Converge the stamps so both sides carry the winning watermark.
    if local.modified() != remote.modified() {
        let later = local.modified().max(remote.modified());
        local.set_modified(later);
        remote.set_modified(later);
        changes += 1;
    }

    changes += merge_children(local.children_vec(), remote.children_vec(), last_sync)?;
    Ok(changes)
}

fn merge_node(local: &mut Node, remote: &mut Node, last_sync: Timestamp) -> Result<u64> {
    if discriminant(local.kind()) != discriminant(remote.kind()) {
        return Err(Error::MergeConsistency(format!(
            "node {} is a {} locally but a {} remotely",
            local.id(),
            local.kind().kind_name(),
            remote.kind().kind_name()
        )));
    }

    let mut changes = 0;

    // Per-field last-writer-wins: label and content are transferred
    // independently, both judged by the nodes' modified stamps. Ties keep
    // the local value.
    if local.label() != remote.label() {
        if local.modified() < remote.modified() {
            local.set_label_quiet(remote.label().to_string());
        } else {
            remote.set_label_quiet(local.label().to_string());
        }
        changes += 1;
    }

    let divergent_content = match (local.content(), remote.content()) {
        (Some(a), Some(b)) if a != b => Some((a.to_string(), b.to_string())),
        _ => None,
    };
    if let Some((local_content, remote_content)) = divergent_content {
        if local.modified() < remote.modified() {
            local.set_content_quiet(remote_content);
        } else {
            remote.set_content_quiet(local_content);
        }
        changes += 1;
    }

    if local.modified() != remote.modified() {
        let later = local.modified().max(remote.modified());
        local.set_modified(later);
        remote.set_modified(later);
        changes += 1;
    }

    let is_container = matches!(local.kind(), NodeKind::Folder { .. } | NodeKind::Card { .. });
    if is_container {
        if let (Some(local_children), Some(remote_children)) = (
            local.kind_mut().children_mut(),
            remote.kind_mut().children_mut(),
        ) {
            changes += merge_children(local_children, remote_children, last_sync)?;
        }
    }
    Ok(changes)
}

/// Align two ordered sibling lists, then recurse over the matched pairs.
///
/// Walks both lists by a shared index. Nodes present on only one side are
/// deleted or cloned across depending on whether they predate `last_sync`;
/// nodes present on both sides but at different positions are moved on
/// whichever side holds the copy with the earlier modified stamp. Every
/// iteration either advances the index or performs exactly one structural
/// edit that grows the matched prefix, so the walk terminates.
fn merge_children(
    local: &mut Vec<Node>,
    remote: &mut Vec<Node>,
    last_sync: Timestamp,
) -> Result<u64> {
    let local_ids: HashSet<NodeId> = local.iter().map(|n| n.id().clone()).collect();
    let remote_ids: HashSet<NodeId> = remote.iter().map(|n| n.id().clone()).collect();
    let unique_local: HashSet<&NodeId> = local_ids.difference(&remote_ids).collect();
    let unique_remote: HashSet<&NodeId> = remote_ids.difference(&local_ids).collect();

    let mut changes = 0;
    let mut index = 0;

    loop {
        match (index < local.len(), index < remote.len()) {
            (false, false) => break,
            (true, false) => {
                // Local keeps going after remote ran out; every remaining
                // node must be unique to local.
                if !unique_local.contains(local[index].id()) {
                    return Err(Error::MergeConsistency(format!(
                        "unexpected surviving local child {}",
                        local[index].id()
                    )));
                }
                if local[index].created() < last_sync {
                    // existed at the last sync, so it was deleted remotely
                    local.remove(index);
                } else {
                    // added locally since the last sync
                    remote.push(local[index].clone());
                }
                changes += 1;
            }
            (false, true) => {
                if !unique_remote.contains(remote[index].id()) {
                    return Err(Error::MergeConsistency(format!(
                        "unexpected surviving remote child {}",
                        remote[index].id()
                    )));
                }
                if remote[index].created() < last_sync {
                    remote.remove(index);
                } else {
                    local.push(remote[index].clone());
                }
                changes += 1;
            }
            (true, true) => {
                if local[index].id() == remote[index].id() {
                    index += 1;
                    continue;
                }
                if unique_local.contains(local[index].id()) {
                    if local[index].created() < last_sync {
                        local.remove(index);
                    } else {
                        let clone = local[index].clone();
                        let at = index.min(remote.len());
                        remote.insert(at, clone);
                    }
                    changes += 1;
                } else if unique_remote.contains(remote[index].id()) {
                    if remote[index].created() < last_sync {
                        remote.remove(index);
                    } else {
                        let clone = remote[index].clone();
                        let at = index.min(local.len());
                        local.insert(at, clone);
                    }
                    changes += 1;
                } else {
                    // Both nodes exist on both sides, so this is a pure
                    // ordering conflict: the side whose copy was modified
                    // later dictates the order.
                    let local_id = local[index].id().clone();
                    let Some(remote_pos) = remote.iter().position(|n| n.id() == &local_id)
                    else {
                        return Err(Error::MergeConsistency(format!(
                            "no remote counterpart for child {local_id}"
                        )));
                    };
                    if local[index].modified() > remote[remote_pos].modified() {
                        let moved = remote.remove(remote_pos);
                        let at = index.min(remote.len());
                        remote.insert(at, moved);
                    } else {
                        let moved = local.remove(index);
                        let at = remote_pos.min(local.len());
                        local.insert(at, moved);
                    }
                    changes += 1;
                }
            }
        }
    }

    debug_assert_eq!(local.len(), remote.len());
    for i in 0..local.len().min(remote.len()) {
        changes += merge_node(&mut local[i], &mut remote[i], last_sync)?;
    }
    Ok(changes)
}
