use std::collections::BTreeMap;

/// Inputs and outputs that share a grouping key.
#[derive(Debug)]
pub struct RecordGroup<'a, T, K> {
    pub key: K,
    pub inputs: Vec<&'a T>,
    pub outputs: Vec<&'a T>,
}

/// Groups records by structural equality of `key`, ordered by key.
pub fn group_records<'a, T, K: Ord + Clone>(inputs: &[&'a T], outputs: &[&'a T], key: impl Fn(&T) -> K) -> Vec<RecordGroup<'a, T, K>> {
    let mut groups: BTreeMap<K, RecordGroup<'a, T, K>> = BTreeMap::new();
    for input in inputs {
        let k = key(*input);
        groups.entry(k.clone()).or_insert_with(|| RecordGroup { key: k, inputs: Vec::new(), outputs: Vec::new() }).inputs.push(*input);
    }
    for output in outputs {
        let k = key(*output);
        groups.entry(k.clone()).or_insert_with(|| RecordGroup { key: k, inputs: Vec::new(), outputs: Vec::new() }).outputs.push(*output);
    }
    groups.into_values().collect()
}
