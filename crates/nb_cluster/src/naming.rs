use nb_core::topics::top_topics;

/// Display name and description derived from member topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterLabel {
    pub name: String,
    pub description: String,
}

/// Names a cluster after its three most frequent member topics.
/// `member_topics` holds one topic list per member.
pub fn name_cluster(label: i32, member_topics: &[&[String]]) -> ClusterLabel {
    let members = member_topics.len();
    let top = top_topics(member_topics.iter().flat_map(|topics| topics.iter()), 3);

    if top.is_empty() {
        return ClusterLabel {
            name: format!("Cluster {}", label),
            description: format!("Group of {} articles", members),
        };
    }

    let description = if members == 1 {
        format!("Single article on {}", top[0])
    } else {
        format!("Group of {} articles about {}", members, top.join(", "))
    };
    ClusterLabel {
        name: top.join(" / "),
        description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_name_from_frequent_topics() {
        let a = topics(&["economy", "rates", "inflation"]);
        let b = topics(&["rates", "housing"]);
        let c = topics(&["rates", "economy"]);
        let label = name_cluster(0, &[a.as_slice(), b.as_slice(), c.as_slice()]);
        assert_eq!(label.name, "rates / economy / inflation");
        assert_eq!(label.description, "Group of 3 articles about rates, economy, inflation");
    }

    #[test]
    fn test_single_member() {
        let a = topics(&["space", "launch"]);
        let label = name_cluster(4, &[a.as_slice()]);
        assert_eq!(label.name, "space / launch");
        assert_eq!(label.description, "Single article on space");
    }

    #[test]
    fn test_no_topics() {
        let empty: Vec<String> = Vec::new();
        let label = name_cluster(2, &[empty.as_slice(), empty.as_slice()]);
        assert_eq!(label.name, "Cluster 2");
        assert_eq!(label.description, "Group of 2 articles");
    }
}
