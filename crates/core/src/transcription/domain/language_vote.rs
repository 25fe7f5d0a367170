use std::collections::HashMap;

/// Picks the language detected by the most chunks.
///
/// `detected` must be ordered by chunk index. Chunks without a detection do
/// not vote. On a tie, the tied language seen at the lowest chunk index wins.
pub fn majority_language<S: AsRef<str>>(detected: &[Option<S>]) -> Option<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, language) in detected.iter().enumerate() {
        if let Some(language) = language {
            let entry = counts.entry(language.as_ref()).or_insert((0, position));
            entry.0 += 1;
        }
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(language, _)| language.to_string())
}
