//! Links normalized messages into a parent → children arena.
//!
//! Records live in a `Vec`, addressed by index; ids are only used at the
//! boundary. The arena is rebuilt from scratch on every call and only holds
//! messages that hang off the selected root.
use crate::error::{BuildWarning, StructuralError};
use crate::model::MessageRecord;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Validated messages reachable from a single root.
#[derive(Debug)]
pub struct MessageGraph {
    records: Vec<MessageRecord>,
    index: HashMap<String, usize>,
    parents: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    root: usize,
}

#[allow(clippy::len_without_is_empty)]
impl MessageGraph {
    /// Never zero: a graph always holds its root.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn record(&self, node: usize) -> &MessageRecord {
        &self.records[node]
    }

    pub fn parent(&self, node: usize) -> Option<usize> {
        self.parents[node]
    }

    /// Children of `node` in canonical sibling order.
    pub fn children(&self, node: usize) -> &[usize] {
        &self.children[node]
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn into_records(self) -> Vec<MessageRecord> {
        self.records
    }
}

#[derive(Clone, Copy)]
enum Fate {
    Unvisited,
    OnPath,
    /// Reaches the root at this index.
    Rooted(usize),
    /// Dropped because the record at this index lost its parent.
    Dropped(usize),
}

/// Builds the arena.
///
/// Checks run in a fixed order (duplicate ids, missing parents, cycles, roots)
/// over records sorted by id, so the reported error does not depend on input
/// order. In tolerant mode duplicates, records with missing parents, their
/// descendants and the subtrees of losing roots are dropped into `warnings`.
pub fn build_graph(
    mut records: Vec<MessageRecord>,
    tolerant: bool,
    warnings: &mut Vec<BuildWarning>,
) -> Result<MessageGraph, StructuralError> {
    records.sort_by(canonical_order);
    let records = dedup_ids(records, tolerant, warnings)?;

    let mut fates = vec![Fate::Unvisited; records.len()];
    let parents = resolve_parents(&records, tolerant, &mut fates, warnings)?;

    let mut path = Vec::new();
    for start in 0..records.len() {
        if !matches!(fates[start], Fate::Unvisited) {
            continue;
        }
        let mut cursor = start;
        let fate = loop {
            match fates[cursor] {
                Fate::Unvisited => {
                    fates[cursor] = Fate::OnPath;
                    path.push(cursor);
                    match parents[cursor] {
                        Some(parent) => cursor = parent,
                        None => break Fate::Rooted(cursor),
                    }
                }
                Fate::OnPath => return Err(cycle_error(&records, &path, cursor)),
                settled => break settled,
            }
        };
        for node in path.drain(..) {
            if let Fate::Dropped(origin) = fate {
                warnings.push(BuildWarning::Orphaned {
                    id: records[node].id.clone(),
                    dropped_ancestor: records[origin].id.clone(),
                });
            }
            fates[node] = fate;
        }
    }

    let root = select_root(&records, &fates, tolerant, warnings)?;
    Ok(compact(records, &parents, &fates, root))
}

/// Total order used to make the whole build independent of input order.
fn canonical_order(a: &MessageRecord, b: &MessageRecord) -> Ordering {
    a.id.cmp(&b.id)
        .then_with(|| a.timestamp.cmp(&b.timestamp))
        .then_with(|| a.sequence_index.cmp(&b.sequence_index))
        .then_with(|| a.parent_id.cmp(&b.parent_id))
        .then_with(|| a.role.cmp(&b.role))
        .then_with(|| a.content.cmp(&b.content))
}

/// Expects records sorted by [`canonical_order`]; keeps the first copy of each id.
fn dedup_ids(
    records: Vec<MessageRecord>,
    tolerant: bool,
    warnings: &mut Vec<BuildWarning>,
) -> Result<Vec<MessageRecord>, StructuralError> {
    let mut kept: Vec<MessageRecord> = Vec::with_capacity(records.len());
    let mut dropped = 0usize;

    for record in records {
        if let Some(previous) = kept.last() {
            if previous.id == record.id {
                if !tolerant {
                    return Err(StructuralError::DuplicateId { id: record.id });
                }
                dropped += 1;
                continue;
            }
            if dropped > 0 {
                warnings.push(BuildWarning::DuplicateId {
                    id: previous.id.clone(),
                    dropped,
                });
                dropped = 0;
            }
        }
        kept.push(record);
    }
    if dropped > 0 {
        if let Some(previous) = kept.last() {
            warnings.push(BuildWarning::DuplicateId {
                id: previous.id.clone(),
                dropped,
            });
        }
    }
    Ok(kept)
}

fn resolve_parents(
    records: &[MessageRecord],
    tolerant: bool,
    fates: &mut [Fate],
    warnings: &mut Vec<BuildWarning>,
) -> Result<Vec<Option<usize>>, StructuralError> {
    let index: HashMap<&str, usize> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id.as_str(), i))
        .collect();

    let mut parents = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        let parent = match record.parent_id.as_deref() {
            None => None,
            Some(parent_id) => match index.get(parent_id) {
                Some(&p) => Some(p),
                None => {
                    if !tolerant {
                        return Err(StructuralError::MissingParent {
                            id: record.id.clone(),
                            parent_id: parent_id.to_string(),
                        });
                    }
                    warnings.push(BuildWarning::MissingParent {
                        id: record.id.clone(),
                        parent_id: parent_id.to_string(),
                    });
                    fates[i] = Fate::Dropped(i);
                    None
                }
            },
        };
        parents.push(parent);
    }
    Ok(parents)
}

/// `path` runs child → ancestor and ends just before re-entering `repeat`.
fn cycle_error(records: &[MessageRecord], path: &[usize], repeat: usize) -> StructuralError {
    let start = path.iter().position(|&n| n == repeat).unwrap_or(0);
    let mut ids: Vec<String> = path[start..]
        .iter()
        .map(|&n| records[n].id.clone())
        .collect();
    // Rotate so the smallest id leads; the cycle itself is order-free.
    if let Some(lowest) = ids
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
    {
        ids.rotate_left(lowest);
    }
    StructuralError::Cycle { ids }
}

fn select_root(
    records: &[MessageRecord],
    fates: &[Fate],
    tolerant: bool,
    warnings: &mut Vec<BuildWarning>,
) -> Result<usize, StructuralError> {
    let mut sizes: HashMap<usize, usize> = HashMap::new();
    for fate in fates {
        if let Fate::Rooted(root) = fate {
            *sizes.entry(*root).or_default() += 1;
        }
    }
    let mut roots: Vec<usize> = sizes.keys().copied().collect();
    roots.sort_unstable();

    match roots.len() {
        0 => Err(StructuralError::NoRoot),
        1 => Ok(roots[0]),
        _ if !tolerant => Err(StructuralError::MultipleRoots {
            ids: roots.iter().map(|&r| records[r].id.clone()).collect(),
        }),
        _ => {
            roots.sort_by(|&a, &b| records[a].sibling_order(&records[b]));
            let kept = roots[0];
            for &discarded in &roots[1..] {
                warnings.push(BuildWarning::DiscardedRoot {
                    id: records[discarded].id.clone(),
                    kept_root: records[kept].id.clone(),
                    dropped_messages: sizes.get(&discarded).copied().unwrap_or(0),
                });
            }
            Ok(kept)
        }
    }
}

/// Keeps only the records under `root` and wires up sorted child lists.
fn compact(
    records: Vec<MessageRecord>,
    parents: &[Option<usize>],
    fates: &[Fate],
    root: usize,
) -> MessageGraph {
    let mut remap: Vec<Option<usize>> = vec![None; records.len()];
    let mut kept = Vec::with_capacity(records.len());
    for (old, record) in records.into_iter().enumerate() {
        if matches!(fates[old], Fate::Rooted(r) if r == root) {
            remap[old] = Some(kept.len());
            kept.push(record);
        }
    }

    let mut new_parents = vec![None; kept.len()];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); kept.len()];
    for (old, parent) in parents.iter().enumerate() {
        let (Some(node), Some(parent)) = (remap[old], parent.and_then(|p| remap[p])) else {
            continue;
        };
        new_parents[node] = Some(parent);
        children[parent].push(node);
    }
    for siblings in &mut children {
        siblings.sort_by(|&a, &b| kept[a].sibling_order(&kept[b]));
    }

    let index = kept
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id.clone(), i))
        .collect();

    MessageGraph {
        root: remap[root].unwrap_or(0),
        records: kept,
        index,
        parents: new_parents,
        children,
    }
}
