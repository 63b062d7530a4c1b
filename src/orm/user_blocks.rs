//! SeaORM Entity for user_blocks table

use sea_orm::entity::prelude::*;

/// Directed block edge. A block in either direction between two users removes
/// mutual visibility and interaction regardless of who blocked whom.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "user_blocks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub blocker_id: i32,
    pub blocked_id: i32,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::BlockerId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Blocker,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::BlockedId",
        to = "super::users::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Blocked,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Blocker.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
