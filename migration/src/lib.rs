pub use sea_orm_migration::prelude::*;

pub mod entities;
mod m20260601_000001_initial_tables;
mod m20260601_000002_subscriptions;
mod m20260615_000001_scan_logs;
mod m20260715_000001_user_agents;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260601_000001_initial_tables::Migration),
            Box::new(m20260601_000002_subscriptions::Migration),
            Box::new(m20260615_000001_scan_logs::Migration),
            Box::new(m20260715_000001_user_agents::Migration),
        ]
    }
}
