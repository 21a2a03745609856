//! Cross-sample statistics.

use std::collections::{BTreeMap, HashSet};

use super::link::{AggregatedLink, CollectionLinks, ResolvedLink};

#[derive(Default)]
struct PathStats {
    samples: usize,
    targets: Vec<String>,
}

/// Fold per-document resolved links into per-path statistics.
///
/// Each outer element is one sampled document. A path counts at most once
/// per document, however many array elements produced it, and a document
/// without the path simply does not count towards it. Targets are merged in
/// first-seen order without duplicates.
pub fn reduce_links(samples: &[Vec<ResolvedLink>]) -> CollectionLinks {
    let mut stats: BTreeMap<&str, PathStats> = BTreeMap::new();

    for links in samples {
        let mut seen = HashSet::new();
        for link in links {
            let entry = stats.entry(link.path()).or_default();
            if seen.insert(link.path()) {
                entry.samples += 1;
            }
            for target in &link.matched_targets {
                if !entry.targets.contains(target) {
                    entry.targets.push(target.clone());
                }
            }
        }
    }

    let total = samples.len() as f64;
    stats
        .into_iter()
        .map(|(path, s)| {
            let link = AggregatedLink {
                path: path.to_string(),
                matched_targets: s.targets,
                confidence: s.samples as f64 / total,
            };
            (path.to_string(), link)
        })
        .collect()
}
