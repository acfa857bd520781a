//! Builds the startup pool from rating files.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use hudup_core::config::DataConfig;
use hudup_core::text::TextParsable;
use hudup_core::types::RatingTriple;
use hudup_data::pointer::NullPointer;
use hudup_data::snapshot::Snapshot;
use hudup_data::{DatasetPair, DatasetPool, SharedDataset};

use crate::TRACING_TARGET_STARTUP;
use crate::config::SeedConfig;

/// The pool described by the seed configuration; empty without ratings.
pub async fn seed_pool(config: &SeedConfig) -> anyhow::Result<DatasetPool> {
    let Some(ratings) = &config.ratings else {
        return Ok(DatasetPool::new());
    };

    let training = load_snapshot(ratings).await?;
    let testing = match &config.testing_ratings {
        Some(path) => load_snapshot(path).await?,
        None => Arc::new(NullPointer::default()) as SharedDataset,
    };

    Ok(DatasetPool::from_pairs([DatasetPair::new(training, testing)]))
}

async fn load_snapshot(path: &Path) -> anyhow::Result<SharedDataset> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read ratings from {}", path.display()))?;
    let triples = parse_triples(&text)
        .with_context(|| format!("malformed ratings in {}", path.display()))?;

    tracing::info!(
        target: TRACING_TARGET_STARTUP,
        path = %path.display(),
        ratings = triples.len(),
        "ratings loaded"
    );

    let config = DataConfig::with_store_uri(format!("file://{}", path.display()));
    Ok(Arc::new(Snapshot::from_triples(Some(config), triples)))
}

/// One triple per line; blank lines and `#` comments are skipped.
fn parse_triples(text: &str) -> hudup_core::Result<Vec<RatingTriple>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(RatingTriple::parse_text)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use hudup_data::DatasetKind;

    use super::*;

    fn seed(ratings: Option<PathBuf>, testing_ratings: Option<PathBuf>) -> SeedConfig {
        SeedConfig {
            pool_name: "test".to_owned(),
            ratings,
            testing_ratings,
        }
    }

    #[test]
    fn skips_blank_lines_and_comments() {
        let triples = parse_triples("# user,item,rating\n1,10,4\n\n2, 20, 3.5\n").unwrap();
        assert_eq!(triples, vec![RatingTriple::new(1, 10, 4.0), RatingTriple::new(2, 20, 3.5)]);

        assert!(parse_triples("1,10").is_err());
    }

    #[tokio::test]
    async fn no_ratings_no_pairs() {
        let pool = seed_pool(&seed(None, None)).await.unwrap();
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn training_only_tests_against_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratings.csv");
        tokio::fs::write(&path, "1,10,4\n2,10,5\n").await.unwrap();

        let pool = seed_pool(&seed(Some(path), None)).await.unwrap();
        let pair = pool.get(0).unwrap();

        let training = pair.training.as_ref().unwrap();
        assert_eq!(training.kind(), DatasetKind::Snapshot);
        assert!(training.rating(2, 10).await.unwrap().is_some());

        let testing = pair.testing.as_ref().unwrap();
        assert!(testing.as_any().downcast_ref::<NullPointer>().is_some());
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let result = seed_pool(&seed(Some(PathBuf::from("/nonexistent/ratings.csv")), None)).await;
        assert!(result.is_err());
    }
}
