pub use sea_orm_migration::prelude::*;

mod m20240601_000001_create_cities;
mod m20240601_000002_create_users;
mod m20240601_000003_create_cars;
mod m20240601_000004_create_rides;
mod m20240601_000005_create_bookings;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_cities::Migration),
            Box::new(m20240601_000002_create_users::Migration),
            Box::new(m20240601_000003_create_cars::Migration),
            Box::new(m20240601_000004_create_rides::Migration),
            Box::new(m20240601_000005_create_bookings::Migration),
        ]
    }
}
