//! Helpers for moving per-step data between path and batch layouts
//!
//! Rows are `Vec<f32>` feature vectors. A path stores each field as
//! `[T][D]`; the flat batch layout concatenates paths into `[sum T][D]`; the
//! padded layout right-pads every path to `[P][T_max][D]`.

use std::collections::BTreeMap;

use crate::error::{PipelineError, Result};

/// Diagnostics reported for a single step, keyed by name
pub type InfoDict = BTreeMap<String, Vec<f32>>;

/// Per-step diagnostics for a sequence of steps, keyed by name (`[T][D]`)
pub type TensorDict = BTreeMap<String, Vec<Vec<f32>>>;

/// Stack per-step info mappings into one column per key
///
/// Every step must report the same keys.
pub fn stack_info_dicts(infos: &[InfoDict]) -> Result<TensorDict> {
    let mut stacked = TensorDict::new();
    let Some(first) = infos.first() else {
        return Ok(stacked);
    };

    for key in first.keys() {
        stacked.insert(key.clone(), Vec::with_capacity(infos.len()));
    }

    for (t, info) in infos.iter().enumerate() {
        if info.len() != first.len() {
            return Err(PipelineError::Precondition(format!(
                "info keys changed at step {}: expected {:?}, got {:?}",
                t,
                first.keys().collect::<Vec<_>>(),
                info.keys().collect::<Vec<_>>()
            )));
        }
        for (key, value) in info {
            let column = stacked.get_mut(key).ok_or_else(|| {
                PipelineError::Precondition(format!("unexpected info key `{}` at step {}", key, t))
            })?;
            column.push(value.clone());
        }
    }

    Ok(stacked)
}

/// Concatenate several `[T_i][D]` row lists into one `[sum T_i][D]` list
pub fn concat_rows<'a, I>(parts: I) -> Vec<Vec<f32>>
where
    I: IntoIterator<Item = &'a [Vec<f32>]>,
{
    parts.into_iter().flat_map(|rows| rows.iter().cloned()).collect()
}

/// Concatenate scalar sequences
pub fn concat_scalars<'a, I>(parts: I) -> Vec<f32>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    parts.into_iter().flat_map(|xs| xs.iter().copied()).collect()
}

/// Concatenate tensor dictionaries key by key
///
/// All dictionaries must carry the same key set.
pub fn concat_tensor_dicts<'a, I>(dicts: I) -> Result<TensorDict>
where
    I: IntoIterator<Item = &'a TensorDict>,
{
    let mut iter = dicts.into_iter();
    let Some(first) = iter.next() else {
        return Ok(TensorDict::new());
    };
    let mut out = first.clone();

    for dict in iter {
        if dict.len() != out.len() || !dict.keys().all(|k| out.contains_key(k)) {
            return Err(PipelineError::Precondition(format!(
                "cannot concatenate info dicts with different keys: {:?} vs {:?}",
                out.keys().collect::<Vec<_>>(),
                dict.keys().collect::<Vec<_>>()
            )));
        }
        for (key, rows) in dict {
            if let Some(column) = out.get_mut(key) {
                column.extend(rows.iter().cloned());
            }
        }
    }

    Ok(out)
}

/// Right-pad scalars to `len` with `pad`
pub fn pad_scalars(xs: &[f32], len: usize, pad: f32) -> Vec<f32> {
    debug_assert!(xs.len() <= len, "cannot pad {} values down to {}", xs.len(), len);
    let mut out = Vec::with_capacity(len);
    out.extend_from_slice(xs);
    out.resize(len, pad);
    out
}

/// Right-pad rows to `len` with rows of `pad`, keeping the row width
pub fn pad_rows(rows: &[Vec<f32>], len: usize, pad: f32) -> Vec<Vec<f32>> {
    debug_assert!(rows.len() <= len, "cannot pad {} rows down to {}", rows.len(), len);
    let width = rows.first().map_or(0, Vec::len);
    let mut out = Vec::with_capacity(len);
    out.extend(rows.iter().cloned());
    out.resize(len, vec![pad; width]);
    out
}

/// Pad every column of a tensor dictionary to `len`
pub fn pad_tensor_dict(dict: &TensorDict, len: usize, pad: f32) -> TensorDict {
    dict.iter().map(|(k, rows)| (k.clone(), pad_rows(rows, len, pad))).collect()
}

/// Stack padded per-path dictionaries into `[P][T_max][D]` columns
pub fn stack_padded_dicts(dicts: &[TensorDict]) -> Result<BTreeMap<String, Vec<Vec<Vec<f32>>>>> {
    let mut out: BTreeMap<String, Vec<Vec<Vec<f32>>>> = BTreeMap::new();
    let Some(first) = dicts.first() else {
        return Ok(out);
    };
    for dict in dicts {
        if dict.len() != first.len() || !dict.keys().all(|k| first.contains_key(k)) {
            return Err(PipelineError::Precondition(
                "cannot stack info dicts with different keys".to_string(),
            ));
        }
        for (key, rows) in dict {
            out.entry(key.clone()).or_default().push(rows.clone());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(pairs: &[(&str, f32)]) -> InfoDict {
        pairs.iter().map(|(k, v)| (k.to_string(), vec![*v])).collect()
    }

    #[test]
    fn test_stack_info_dicts() {
        let infos = vec![info(&[("mean", 0.1), ("log_std", -1.0)]), info(&[("mean", 0.2), ("log_std", -0.5)])];
        let stacked = stack_info_dicts(&infos).unwrap();

        assert_eq!(stacked["mean"], vec![vec![0.1], vec![0.2]]);
        assert_eq!(stacked["log_std"], vec![vec![-1.0], vec![-0.5]]);
    }

    #[test]
    fn test_stack_info_dicts_rejects_changing_keys() {
        let infos = vec![info(&[("mean", 0.1)]), info(&[("other", 0.2)])];
        assert!(stack_info_dicts(&infos).is_err());
    }

    #[test]
    fn test_concat_tensor_dicts() {
        let a: TensorDict = [("x".to_string(), vec![vec![1.0], vec![2.0]])].into();
        let b: TensorDict = [("x".to_string(), vec![vec![3.0]])].into();
        let out = concat_tensor_dicts([&a, &b]).unwrap();
        assert_eq!(out["x"], vec![vec![1.0], vec![2.0], vec![3.0]]);
    }

    #[test]
    fn test_padding_keeps_width() {
        let rows = vec![vec![1.0, 2.0]];
        let padded = pad_rows(&rows, 3, 0.0);
        assert_eq!(padded, vec![vec![1.0, 2.0], vec![0.0, 0.0], vec![0.0, 0.0]]);

        assert_eq!(pad_scalars(&[1.0, 2.0], 4, -1.0), vec![1.0, 2.0, -1.0, -1.0]);
    }
}
