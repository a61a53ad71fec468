use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "files")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub bucket_name: String,
    pub object_name: String,
    pub owner: String,
    pub created_at: DateTimeUtc,
    pub updated_at: Option<DateTimeUtc>,
    pub expires_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::file_thumbnails::Entity")]
    FileThumbnails,
    #[sea_orm(has_one = "super::virus_scans::Entity")]
    VirusScans,
    #[sea_orm(has_many = "super::share_links::Entity")]
    ShareLinks,
}

impl Related<super::file_thumbnails::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FileThumbnails.def()
    }
}

impl Related<super::virus_scans::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VirusScans.def()
    }
}

impl Related<super::share_links::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShareLinks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
