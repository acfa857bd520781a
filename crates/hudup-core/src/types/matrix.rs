//! Dense rating matrices materialized from a dataset.

use serde::{Deserialize, Serialize};

use super::{Id, RatingTriple};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixOrientation {
    /// Rows are users, columns are items.
    UserItem,
    /// Rows are items, columns are users.
    ItemUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingMatrixMetadata {
    pub min_rating: f64,
    pub max_rating: f64,
    pub orientation: MatrixOrientation,
}

/// Dense matrix of rating values with gaps for missing ratings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingMatrix {
    pub row_ids: Vec<Id>,
    pub column_ids: Vec<Id>,
    pub values: Vec<Vec<Option<f64>>>,
    pub metadata: RatingMatrixMetadata,
}

impl RatingMatrix {
    /// Creates an empty matrix over the given ids.
    pub fn new(row_ids: Vec<Id>, column_ids: Vec<Id>, metadata: RatingMatrixMetadata) -> Self {
        let values = vec![vec![None; column_ids.len()]; row_ids.len()];
        Self {
            row_ids,
            column_ids,
            values,
            metadata,
        }
    }

    pub fn get(&self, row_id: Id, column_id: Id) -> Option<f64> {
        let row = self.row_ids.iter().position(|id| *id == row_id)?;
        let column = self.column_ids.iter().position(|id| *id == column_id)?;
        self.values[row][column]
    }

    pub fn set(&mut self, row_id: Id, column_id: Id, value: Option<f64>) -> bool {
        let Some(row) = self.row_ids.iter().position(|id| *id == row_id) else {
            return false;
        };
        let Some(column) = self.column_ids.iter().position(|id| *id == column_id) else {
            return false;
        };
        self.values[row][column] = value;
        true
    }

    pub fn rows(&self) -> usize {
        self.row_ids.len()
    }

    pub fn columns(&self) -> usize {
        self.column_ids.len()
    }

    /// Every present rating as a `(user, item, value)` triple.
    pub fn triples(&self) -> Vec<RatingTriple> {
        let mut triples = Vec::new();
        for (row, row_id) in self.row_ids.iter().enumerate() {
            for (column, column_id) in self.column_ids.iter().enumerate() {
                let Some(value) = self.values[row][column] else {
                    continue;
                };
                let (user_id, item_id) = match self.metadata.orientation {
                    MatrixOrientation::UserItem => (*row_id, *column_id),
                    MatrixOrientation::ItemUser => (*column_id, *row_id),
                };
                triples.push(RatingTriple::new(user_id, item_id, value));
            }
        }
        triples
    }
}
