//! Common test utilities

use chrono::NaiveDate;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use trendscope::models::PaperRecord;

/// First day of the `offset`-th month after January 2018
#[allow(dead_code)]
pub fn month(offset: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2018 + (offset / 12) as i32, offset % 12 + 1, 1).unwrap()
}

/// Papers whose monthly counts in `category` follow `counts`
#[allow(dead_code)]
pub fn papers_with_counts(category: &str, counts: &[usize]) -> Vec<PaperRecord> {
    let mut papers = Vec::new();
    for (offset, &count) in counts.iter().enumerate() {
        for k in 0..count {
            papers.push(
                PaperRecord::new(format!("{category}-{offset}-{k}"), format!("{category} paper"))
                    .with_date(month(offset as u32))
                    .with_categories(category),
            );
        }
    }
    papers
}

/// Three papers written by the same three authors
#[allow(dead_code)]
pub fn author_clique() -> Vec<PaperRecord> {
    (0..3)
        .map(|i| {
            PaperRecord::new(format!("paper-{i}"), format!("Joint work {i}"))
                .with_date(month(i))
                .with_categories("cs.SI")
                .with_authors(["Ada Lovelace", "Alan Turing", "Grace Hopper"])
        })
        .collect()
}

/// Unit vector along `axis` plus small uniform noise
#[allow(dead_code)]
pub fn clustered_embedding(rng: &mut ChaCha8Rng, dim: usize, axis: usize) -> Vec<f32> {
    noisy_embedding(rng, dim, axis, 0.05)
}

/// Unit vector along `axis` plus uniform noise in `[-noise, noise)`
#[allow(dead_code)]
pub fn noisy_embedding(rng: &mut ChaCha8Rng, dim: usize, axis: usize, noise: f32) -> Vec<f32> {
    let mut v: Vec<f32> = (0..dim).map(|_| rng.gen_range(-noise..noise)).collect();
    v[axis] += 1.0;
    v
}
