//! Cross-workflow link catalog.
//!
//! Lists every (Source instance, Target instance) pair from different
//! mappings bound to the same physical full name: the candidate handoffs
//! between workflows. Traversal does not read this table; it exists so the
//! handoffs can be listed without running a query.

use lineage_model::*;
use lineage_store::{Result, Store};
use std::collections::{BTreeMap, BTreeSet};

/// Compute the catalog from the store's current contents and insert any
/// missing rows. Returns the catalog size.
pub fn materialize_crosslinks(store: &Store) -> Result<usize> {
    let links = compute_crosslinks(store)?;
    let inserted = store.insert_rows(&links)?;
    tracing::debug!(total = links.len(), inserted, "cross-workflow links materialized");
    Ok(links.len())
}

pub fn compute_crosslinks(store: &Store) -> Result<Vec<CrossLink>> {
    let mapping_of: BTreeMap<String, String> = store
        .load::<Instance>()?
        .into_iter()
        .map(|i| (i.instance_id, i.mapping_id))
        .collect();
    let full_of: BTreeMap<String, String> = store
        .load::<PhysicalObject>()?
        .into_iter()
        .map(|o| (o.object_id, o.full_name))
        .collect();

    // full name -> bound instance ids, per role
    let mut sources: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut targets: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for b in store.load::<InstancePhys>()? {
        let Some(full) = full_of.get(&b.object_id) else {
            continue;
        };
        let side = match b.role {
            PhysKind::Source => &mut sources,
            PhysKind::Target => &mut targets,
        };
        side.entry(full.clone()).or_default().insert(b.instance_id);
    }

    let mut links = Vec::new();
    for (full, src_ids) in &sources {
        let Some(tgt_ids) = targets.get(full) else {
            continue;
        };
        for src in src_ids {
            let Some(src_map) = mapping_of.get(src) else {
                continue;
            };
            for tgt in tgt_ids {
                let Some(tgt_map) = mapping_of.get(tgt) else {
                    continue;
                };
                if src_map == tgt_map {
                    continue;
                }
                links.push(CrossLink {
                    full_name: full.clone(),
                    source_mapping_id: src_map.clone(),
                    source_instance_id: src.clone(),
                    target_mapping_id: tgt_map.clone(),
                    target_instance_id: tgt.clone(),
                });
            }
        }
    }
    Ok(links)
}
