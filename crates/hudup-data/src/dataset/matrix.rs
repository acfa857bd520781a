use hudup_core::Result;
use hudup_core::fetcher::drain_boxed;
use hudup_core::types::{MatrixOrientation, RatingMatrix, RatingMatrixMetadata};

use super::Dataset;

/// Materializes every rating of a dataset into a dense matrix.
///
/// Rows and columns follow the id order of the dataset's fetchers.
pub async fn create_matrix<D>(dataset: &D, orientation: MatrixOrientation) -> Result<RatingMatrix>
where
    D: Dataset + ?Sized,
{
    let config = dataset.config().await.unwrap_or_default();
    let metadata = RatingMatrixMetadata {
        min_rating: config.min_rating(),
        max_rating: config.max_rating(),
        orientation,
    };

    let user_ids = drain_boxed(dataset.fetch_user_ids().await?).await?;
    let item_ids = drain_boxed(dataset.fetch_item_ids().await?).await?;

    let (rows, columns, vectors) = match orientation {
        MatrixOrientation::UserItem => {
            let vectors = drain_boxed(dataset.fetch_user_ratings().await?).await?;
            (user_ids, item_ids, vectors)
        }
        MatrixOrientation::ItemUser => {
            let vectors = drain_boxed(dataset.fetch_item_ratings().await?).await?;
            (item_ids, user_ids, vectors)
        }
    };

    let mut matrix = RatingMatrix::new(rows, columns, metadata);
    for vector in vectors {
        for (field_id, rating) in vector.iter().filter(|(_, r)| r.is_rated()) {
            matrix.set(vector.id(), field_id, Some(rating.value));
        }
    }

    Ok(matrix)
}
