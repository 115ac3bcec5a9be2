pub mod database;
pub mod dataset;

pub use database::{DatabaseDetails, DbPlatform, SecretString};
pub use dataset::{
    DatasetId, DatasetMeta, ImportDetails, InstallDataRequest, InstallMetaRequest, ProjectId,
    UninstallRequest,
};
