//! Class-based TF-IDF keyword extraction
//!
//! Every topic's documents are concatenated into one class document. Term
//! counts are L1-normalised per class and weighted by
//! `ln(1 + average words per class / total frequency of the term)`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::utils::content_words;

/// One ranked keyword
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub term: String,
    pub score: f64,
}

/// Top `top_n` keywords for every class
///
/// `classes` maps a class key to the texts of its documents. Classes without
/// any content word get an empty list. Ties rank alphabetically.
pub fn class_tfidf<K>(classes: &BTreeMap<K, Vec<&str>>, top_n: usize) -> BTreeMap<K, Vec<Keyword>>
where
    K: Ord + Clone,
{
    let counts: Vec<(K, HashMap<String, f64>)> = classes
        .iter()
        .map(|(key, texts)| {
            let mut tf: HashMap<String, f64> = HashMap::new();
            for text in texts {
                for word in content_words(text) {
                    *tf.entry(word).or_insert(0.0) += 1.0;
                }
            }
            (key.clone(), tf)
        })
        .collect();

    let mut term_totals: HashMap<&str, f64> = HashMap::new();
    let mut total_words = 0.0;
    for (_, tf) in &counts {
        for (term, count) in tf {
            *term_totals.entry(term.as_str()).or_insert(0.0) += count;
            total_words += count;
        }
    }

    if counts.is_empty() {
        return BTreeMap::new();
    }
    // Whole words per class
    let avg_words = (total_words / counts.len() as f64).floor();

    counts
        .iter()
        .map(|(key, tf)| {
            let class_total: f64 = tf.values().sum();
            let mut ranked: Vec<Keyword> = tf
                .iter()
                .map(|(term, count)| {
                    let idf = (1.0 + avg_words / term_totals[term.as_str()]).ln();
                    Keyword {
                        term: term.clone(),
                        score: count / class_total * idf,
                    }
                })
                .filter(|k| k.score > 0.0)
                .collect();

            ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.term.cmp(&b.term)));
            ranked.truncate(top_n);
            (key.clone(), ranked)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinctive_terms_rank_first() {
        let mut classes: BTreeMap<i32, Vec<&str>> = BTreeMap::new();
        classes.insert(0, vec!["quantum qubits entanglement", "quantum error correction learning"]);
        classes.insert(1, vec!["protein folding structure", "protein design learning"]);

        let keywords = class_tfidf(&classes, 3);
        assert_eq!(keywords[&0][0].term, "quantum");
        assert_eq!(keywords[&1][0].term, "protein");
        assert!(keywords[&0].iter().all(|k| k.term != "protein"));
        assert_eq!(keywords[&0].len(), 3);
    }

    #[test]
    fn test_shared_terms_score_lower() {
        let mut classes: BTreeMap<i32, Vec<&str>> = BTreeMap::new();
        classes.insert(0, vec!["graphs learning"]);
        classes.insert(1, vec!["proteins learning"]);

        let keywords = class_tfidf(&classes, 10);
        let score = |class: i32, term: &str| {
            keywords[&class]
                .iter()
                .find(|k| k.term == term)
                .map(|k| k.score)
                .unwrap()
        };
        assert!(score(0, "graphs") > score(0, "learning"));
    }

    #[test]
    fn test_average_words_per_class_is_truncated() {
        let mut classes: BTreeMap<i32, Vec<&str>> = BTreeMap::new();
        classes.insert(0, vec!["graphs learning"]);
        classes.insert(1, vec!["proteins"]);

        // Three words over two classes average to one whole word
        let keywords = class_tfidf(&classes, 10);
        let graphs = keywords[&0].iter().find(|k| k.term == "graphs").unwrap();
        assert!((graphs.score - 0.5 * 2f64.ln()).abs() < 1e-12);
        assert!((keywords[&1][0].score - 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_stop_words_only() {
        let mut classes: BTreeMap<i32, Vec<&str>> = BTreeMap::new();
        classes.insert(0, vec!["the and of"]);
        assert!(class_tfidf(&classes, 5)[&0].is_empty());
        assert!(class_tfidf::<i32>(&BTreeMap::new(), 5).is_empty());
    }
}
