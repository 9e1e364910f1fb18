use stevedore_types::Parameters;

/// Parameters that must be sent to move `current` to `desired`.
///
/// Every desired key whose value is absent from or different in `current` is
/// included. Keys only present in `current` are left alone.
pub fn diff_parameters(desired: &Parameters, current: &Parameters) -> Parameters {
    desired
        .iter()
        .filter(|(key, value)| current.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
