use sea_orm_migration::{prelude::*, schema::*, sea_orm::sea_query::extension::postgres::Type};

use super::m20240601_000002_create_users::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(Comfort::Enum)
                    .values([Comfort::Standard, Comfort::Premium, Comfort::Luxury])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Car::Table)
                    .if_not_exists()
                    .col(uuid(Car::Id).primary_key())
                    .col(uuid(Car::DriverId).not_null())
                    .col(string_len(Car::Brand, 50).not_null())
                    .col(string_len(Car::Model, 50).not_null())
                    .col(integer(Car::Year).not_null())
                    .col(string_len(Car::Registration, 20).not_null().unique_key())
                    .col(integer(Car::Seats).not_null())
                    .col(ColumnDef::new(Car::Comfort).custom(Comfort::Enum).not_null())
                    .col(
                        timestamp_with_time_zone(Car::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_car_driver")
                            .from(Car::Table, Car::DriverId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Car::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(Comfort::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Car {
    Table,
    Id,
    DriverId,
    Brand,
    Model,
    Year,
    Registration,
    Seats,
    Comfort,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum Comfort {
    #[sea_orm(iden = "comfort")]
    Enum,
    #[sea_orm(iden = "standard")]
    Standard,
    #[sea_orm(iden = "premium")]
    Premium,
    #[sea_orm(iden = "luxury")]
    Luxury,
}
