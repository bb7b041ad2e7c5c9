use sea_orm_migration::{prelude::*, schema::*, sea_orm::sea_query::extension::postgres::Type};

use super::m20240601_000001_create_cities::City;
use super::m20240601_000002_create_users::User;
use super::m20240601_000003_create_cars::Car;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(RideStatus::Enum)
                    .values([
                        RideStatus::Opened,
                        RideStatus::Completed,
                        RideStatus::Canceled,
                        RideStatus::Full,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Ride::Table)
                    .if_not_exists()
                    .col(uuid(Ride::Id).primary_key())
                    .col(uuid(Ride::DriverId).not_null())
                    .col(uuid(Ride::CarId).not_null())
                    .col(integer(Ride::DepartureCityId).not_null())
                    .col(integer(Ride::ArrivalCityId).not_null())
                    .col(string_len(Ride::CollectionPoint, 255).not_null())
                    .col(string_len(Ride::DropOffPoint, 255).not_null())
                    .col(date(Ride::Date).not_null())
                    .col(string_len(Ride::HourOfDeparture, 5).not_null())
                    .col(string_len(Ride::HourOfArrival, 5).not_null())
                    .col(integer(Ride::Duration).not_null())
                    .col(decimal_len(Ride::Price, 10, 2).not_null())
                    .col(integer(Ride::AvailableSeats).not_null())
                    .col(
                        ColumnDef::new(Ride::Status)
                            .custom(RideStatus::Enum)
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(Ride::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_driver")
                            .from(Ride::Table, Ride::DriverId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_car")
                            .from(Ride::Table, Ride::CarId)
                            .to(Car::Table, Car::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_departure_city")
                            .from(Ride::Table, Ride::DepartureCityId)
                            .to(City::Table, City::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_arrival_city")
                            .from(Ride::Table, Ride::ArrivalCityId)
                            .to(City::Table, City::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Ride::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(RideStatus::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Ride {
    Table,
    Id,
    DriverId,
    CarId,
    DepartureCityId,
    ArrivalCityId,
    CollectionPoint,
    DropOffPoint,
    Date,
    HourOfDeparture,
    HourOfArrival,
    Duration,
    Price,
    AvailableSeats,
    Status,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum RideStatus {
    #[sea_orm(iden = "ride_status")]
    Enum,
    #[sea_orm(iden = "opened")]
    Opened,
    #[sea_orm(iden = "completed")]
    Completed,
    #[sea_orm(iden = "canceled")]
    Canceled,
    #[sea_orm(iden = "full")]
    Full,
}
