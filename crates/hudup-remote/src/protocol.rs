//! Frames exchanged with an exported dataset.

use hudup_core::config::DataConfig;
use hudup_core::export::Stub;
use hudup_core::types::{
    AttributeList, AttributeValue, Context, ContextList, ContextTemplateSchema, ExternalRecord,
    Id, MemProfiles, Profile, Rating, RatingMatrix, RatingVector,
};
use hudup_core::{Error, ErrorKind};
use hudup_data::DatasetKind;
use hudup_data::snapshot::SnapshotData;
use serde::{Deserialize, Serialize};

/// One dataset operation.
///
/// Fetch operations are answered with every element at once; the caller
/// gets a fresh in-memory fetcher over them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "args", rename_all = "snake_case")]
pub enum DatasetRequest {
    Kind,
    Config,
    SetConfig(Option<DataConfig>),
    IsExclusive,
    SetExclusive(bool),
    FetchUserIds,
    UserId(AttributeValue),
    UserExternalRecord(Id),
    FetchItemIds,
    ItemId(AttributeValue),
    ItemExternalRecord(Id),
    Rating { user_id: Id, item_id: Id },
    UserRating(Id),
    FetchUserRatings,
    ItemRating(Id),
    FetchItemRatings,
    CreateUserMatrix,
    CreateItemMatrix,
    UserProfile(Id),
    FetchUserProfiles,
    UserAttributes,
    ItemProfile(Id),
    FetchItemProfiles,
    ItemAttributes,
    ProfileOf(Context),
    ProfilesOf(Id),
    FetchSample,
    CtSchema,
    Catchup,
    SelectByContexts(ContextList),
    CloneDataset,
    /// Clears the dataset behind the stub.
    Clear,
    /// Withdraws the dataset's own export without clearing it.
    Unexport,
}

impl DatasetRequest {
    /// Operation name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Kind => "kind",
            Self::Config => "config",
            Self::SetConfig(_) => "set_config",
            Self::IsExclusive => "is_exclusive",
            Self::SetExclusive(_) => "set_exclusive",
            Self::FetchUserIds => "fetch_user_ids",
            Self::UserId(_) => "user_id",
            Self::UserExternalRecord(_) => "user_external_record",
            Self::FetchItemIds => "fetch_item_ids",
            Self::ItemId(_) => "item_id",
            Self::ItemExternalRecord(_) => "item_external_record",
            Self::Rating { .. } => "rating",
            Self::UserRating(_) => "user_rating",
            Self::FetchUserRatings => "fetch_user_ratings",
            Self::ItemRating(_) => "item_rating",
            Self::FetchItemRatings => "fetch_item_ratings",
            Self::CreateUserMatrix => "create_user_matrix",
            Self::CreateItemMatrix => "create_item_matrix",
            Self::UserProfile(_) => "user_profile",
            Self::FetchUserProfiles => "fetch_user_profiles",
            Self::UserAttributes => "user_attributes",
            Self::ItemProfile(_) => "item_profile",
            Self::FetchItemProfiles => "fetch_item_profiles",
            Self::ItemAttributes => "item_attributes",
            Self::ProfileOf(_) => "profile_of",
            Self::ProfilesOf(_) => "profiles_of",
            Self::FetchSample => "fetch_sample",
            Self::CtSchema => "ct_schema",
            Self::Catchup => "catchup",
            Self::SelectByContexts(_) => "select_by_contexts",
            Self::CloneDataset => "clone_dataset",
            Self::Clear => "clear",
            Self::Unexport => "unexport",
        }
    }
}

/// A dataset crossing the registry as the result of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetTransfer {
    /// A snapshot, copied whole.
    Value {
        config: Option<DataConfig>,
        data: Box<SnapshotData>,
    },
    /// Any other dataset, exported on the serving side.
    Exported { stub: Stub },
}

/// The answer to a [`DatasetRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DatasetResponse {
    Done,
    Kind(DatasetKind),
    Config(Option<DataConfig>),
    Flag(bool),
    Id(Id),
    Ids(Vec<Id>),
    Record(Option<ExternalRecord>),
    Rating(Option<Rating>),
    Vector(Option<RatingVector>),
    Vectors(Vec<RatingVector>),
    Matrix(Option<RatingMatrix>),
    Profile(Option<Profile>),
    Profiles(Vec<Profile>),
    Attributes(AttributeList),
    ProfileTable(Option<MemProfiles>),
    Schema(Option<ContextTemplateSchema>),
    /// `None` when the dataset is already in memory and stays where it is.
    Dataset(Option<DatasetTransfer>),
    /// The operation itself failed on the serving side.
    Failed {
        kind: ErrorKind,
        message: Option<String>,
    },
}

impl DatasetResponse {
    pub fn failed(error: &Error) -> Self {
        Self::Failed {
            kind: error.kind(),
            message: error.message.clone(),
        }
    }

    /// Turns a [`DatasetResponse::Failed`] back into an error.
    pub fn into_result(self) -> Result<Self, Error> {
        match self {
            Self::Failed { kind, message } => {
                let error = Error::new(kind);
                Err(match message {
                    Some(message) => error.with_message(message),
                    None => error,
                })
            }
            response => Ok(response),
        }
    }
}

/// Error for a well-formed reply to a different question.
pub(crate) fn unexpected(request: &'static str, response: &DatasetResponse) -> Error {
    Error::transport().with_message(format!("unexpected reply to {request}: {response:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_keeps_kind_and_message() {
        let error = Error::unsupported().with_message("pointer");
        let response = DatasetResponse::failed(&error);

        let frame = serde_json::to_value(&response).unwrap();
        let decoded: DatasetResponse = serde_json::from_value(frame).unwrap();
        let error = decoded.into_result().unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Unsupported);
        assert_eq!(error.message.as_deref(), Some("pointer"));
    }

    #[test]
    fn request_frame_names_the_operation() {
        let frame = serde_json::to_value(DatasetRequest::Rating {
            user_id: 1,
            item_id: 2,
        })
        .unwrap();

        assert_eq!(frame["op"], "rating");
        assert_eq!(frame["args"]["item_id"], 2);
        assert_eq!(DatasetRequest::FetchSample.name(), "fetch_sample");
    }

    #[test]
    fn snapshot_transfer_survives_the_frame() {
        let mut data = SnapshotData::default();
        data.put_rating(1, 100, Rating::new(4.0));
        data.put_rating(2, 100, Rating::new(5.0));
        let response = DatasetResponse::Dataset(Some(DatasetTransfer::Value {
            config: Some(DataConfig::with_store_uri("mem://fixture")),
            data: Box::new(data),
        }));

        let frame = serde_json::to_value(&response).unwrap();
        let decoded: DatasetResponse = serde_json::from_value(frame).unwrap();

        assert_eq!(decoded, response);
    }
}
