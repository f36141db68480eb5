use crate::model;
use sea_orm::{ConnectionTrait, DbErr, Schema};

pub type DbConnection = sea_orm::DatabaseConnection;

/// Creates the `organization`, `user` and `group` tables if they are missing. The
/// identity platform owns the schema; this only serves local setups and
/// tests.
pub async fn init_table(pool: &DbConnection) -> Result<(), DbErr> {
    let builder = pool.get_database_backend();
    let schema = Schema::new(builder);
    pool.execute(
        builder.build(
            schema
                .create_table_from_entity(model::Organization)
                .if_not_exists(),
        ),
    )
    .await?;
    pool.execute(
        builder.build(schema.create_table_from_entity(model::User).if_not_exists()),
    )
    .await?;
    pool.execute(
        builder.build(schema.create_table_from_entity(model::Group).if_not_exists()),
    )
    .await?;
    Ok(())
}
