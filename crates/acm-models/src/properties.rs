// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deep merge of property trees.
//!
//! Maps merge key by key; lists merge position by position and are extended
//! by the overlay's tail, never truncated; any other pairing is overwritten.

use serde_json::{Map, Value};

/// Merge `overlay` into `base` in place.
pub fn recursive_merge(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match base.get_mut(key) {
            Some(existing) => merge_value(existing, value),
            None => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Merge one overlay value into a base value in place.
pub fn merge_value(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => recursive_merge(base, overlay),
        (Value::Array(base), Value::Array(overlay)) => merge_list(base, overlay),
        (base, overlay) => *base = overlay.clone(),
    }
}

fn merge_list(base: &mut Vec<Value>, overlay: &[Value]) {
    let shared = base.len().min(overlay.len());
    for (existing, value) in base.iter_mut().zip(&overlay[..shared]) {
        merge_value(existing, value);
    }
    base.extend(overlay[shared..].iter().cloned());
}

/// Return `base` with `overlay` merged on top, leaving both inputs untouched.
pub fn merged(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut result = base.clone();
    recursive_merge(&mut result, overlay);
    result
}
