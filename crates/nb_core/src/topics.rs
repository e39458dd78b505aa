use std::collections::HashMap;

/// Parses a stored topic list. Accepts a JSON array or a comma-separated
/// string; blank entries are dropped.
pub fn parse_topics(raw: &str) -> Vec<String> {
    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(raw) {
        return items
            .iter()
            .map(value_to_string)
            .filter(|t| !t.trim().is_empty())
            .collect();
    }
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Renders a JSON value the way it should appear as a label.
pub fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The `n` most frequent topics. Ties keep first-seen order.
pub fn top_topics<'a, I>(topics: I, n: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut order: Vec<&'a str> = Vec::new();
    let mut counts: HashMap<&'a str, usize> = HashMap::new();
    for topic in topics {
        let topic = topic.as_str();
        if topic.is_empty() {
            continue;
        }
        let count = counts.entry(topic).or_insert(0);
        if *count == 0 {
            order.push(topic);
        }
        *count += 1;
    }
    // stable sort keeps first-seen order among equal counts
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order.into_iter().take(n).map(str::to_string).collect()
}
