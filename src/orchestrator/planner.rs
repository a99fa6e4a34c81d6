use crate::core::{CloudError, Record, RecordId, Result};
use crate::gateway::ModifyBatch;
use log::debug;

/// Partitions a modify request into gateway-sized batches.
///
/// Saves are walked first, then deletes, each in the caller's order; every
/// batch is filled up to `max_batch_size` items before the next one starts.
/// Concatenating the batches reproduces the input exactly. A request at or
/// below the limit, including an empty one, yields a single batch.
pub fn plan_modify_batches(
    saves: Vec<Record>,
    deletes: Vec<RecordId>,
    max_batch_size: usize,
) -> Result<Vec<ModifyBatch>> {
    if max_batch_size == 0 {
        return Err(CloudError::InvalidRequest(
            "max_batch_size must be > 0".to_string(),
        ));
    }

    let total = saves.len() + deletes.len();
    if total <= max_batch_size {
        return Ok(vec![ModifyBatch::new(saves, deletes)]);
    }

    let mut batches = Vec::with_capacity(total.div_ceil(max_batch_size));
    let mut current = ModifyBatch::default();

    for record in saves {
        if current.len() == max_batch_size {
            batches.push(std::mem::take(&mut current));
        }
        current.saves.push(record);
    }
    for id in deletes {
        if current.len() == max_batch_size {
            batches.push(std::mem::take(&mut current));
        }
        current.deletes.push(id);
    }
    if !current.is_empty() {
        batches.push(current);
    }

    debug!(
        "planned {} batches for {} items (max_batch_size={})",
        batches.len(),
        total,
        max_batch_size
    );
    Ok(batches)
}

/// Chunks record ids for fetch requests, keeping their order.
pub fn plan_fetch_batches(ids: Vec<RecordId>, max_batch_size: usize) -> Result<Vec<Vec<RecordId>>> {
    if max_batch_size == 0 {
        return Err(CloudError::InvalidRequest(
            "max_batch_size must be > 0".to_string(),
        ));
    }
    if ids.len() <= max_batch_size {
        return Ok(vec![ids]);
    }
    Ok(ids.chunks(max_batch_size).map(<[RecordId]>::to_vec).collect())
}
