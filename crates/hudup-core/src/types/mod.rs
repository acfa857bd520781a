//! Value containers consumed by datasets: ratings, contexts, profiles and
//! their supporting records.

mod attribute;
mod context;
mod matrix;
mod profile;
mod rating;
mod record;

pub use attribute::{Attribute, AttributeList, AttributeType, AttributeValue};
pub use context::{
    Context, ContextList, ContextTemplate, ContextTemplateSchema, ContextValue, CtsProfiles,
};
pub use matrix::{MatrixOrientation, RatingMatrix, RatingMatrixMetadata};
pub use profile::{MemProfiles, Profile};
pub use rating::{Rating, RatingTriple, RatingVector, VectorKind};
pub use record::ExternalRecord;

/// Identifier of a user, item, profile or context template.
///
/// Identifiers are non-negative; each entity kind has its own namespace.
pub type Id = i32;

/// Sentinel returned where an identifier is absent or invalid.
pub const INVALID_ID: Id = -1;
