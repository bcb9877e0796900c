use crate::model::Scores;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Class names indexed by model output position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Labels {
    names: BTreeMap<usize, String>,
}

impl Labels {
    /// Reads a label file. Lines are either `name` (index taken from line
    /// order) or `index name`.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let labels = Self::parse(&text);
        debug!(path = %path.display(), count = labels.names.len(), "labels loaded");
        Ok(labels)
    }

    pub fn parse(text: &str) -> Self {
        let mut names = BTreeMap::new();
        let mut next = 0usize;
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (index, name) = match line.split_once(char::is_whitespace) {
                Some((idx, rest)) => match idx.parse::<usize>() {
                    Ok(i) => (i, rest.trim()),
                    Err(_) => (next, line),
                },
                None => (next, line),
            };
            if names.insert(index, name.to_string()).is_some() {
                warn!(index, "duplicate label index");
            }
            next = index.saturating_add(1);
        }
        Self { names }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(&index).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub score: f32,
}

/// Pairs each score with its label, keeping the model's output order.
pub fn predictions(scores: &Scores, labels: Option<&Labels>) -> Vec<Prediction> {
    scores
        .as_slice()
        .iter()
        .enumerate()
        .map(|(i, &score)| Prediction {
            label: labels
                .and_then(|l| l.get(i))
                .map(str::to_string)
                .unwrap_or_else(|| format!("Class {i}")),
            score,
        })
        .collect()
}

pub fn render_lines(predictions: &[Prediction]) -> Vec<String> {
    std::iter::once("Predictions:".to_string())
        .chain(
            predictions
                .iter()
                .map(|p| format!("{}: {:.2}", p.label, p.score)),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mixed_label_forms() {
        let labels = Labels::parse("normal\n\n3 robbery\nfighting\n");
        assert_eq!(labels.get(0), Some("normal"));
        assert_eq!(labels.get(1), None);
        assert_eq!(labels.get(3), Some("robbery"));
        assert_eq!(labels.get(4), Some("fighting"));
        assert_eq!(labels.get(5), None);
    }

    #[test]
    fn largest_index_does_not_overflow() {
        let labels = Labels::parse("18446744073709551615 last\nnext\n");
        assert_eq!(labels.get(usize::MAX), Some("last"));
    }

    #[test]
    fn names_with_spaces_keep_their_text() {
        let labels = Labels::parse("street fight\n");
        assert_eq!(labels.get(0), Some("street fight"));
    }

    #[test]
    fn unlabeled_classes_fall_back_to_index() {
        let labels = Labels::parse("normal\n");
        let scores = Scores::new(vec![0.25, 0.75]);
        let preds = predictions(&scores, Some(&labels));
        assert_eq!(preds[0].label, "normal");
        assert_eq!(preds[1].label, "Class 1");
        assert_eq!(
            render_lines(&preds),
            vec!["Predictions:", "normal: 0.25", "Class 1: 0.75"]
        );
    }
}
