use sea_orm::entity::prelude::*;

/// Global client block: one draft awaiting its activation code, at most one active row.
/// `ux_blocks_single_active` (partial unique index on `active WHERE active`) keeps
/// a second active row from ever being committed.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "blocks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub active: bool,
    /// Operator notice shown to clients (`{"title", "message"}`).
    pub notice: Json,
    /// Id of the `one_time_codes` row gating activation; null once active.
    pub pending_code_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
