pub use sea_orm_migration::prelude::*;

mod m20250820_115221_create_local_kv_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20250820_115221_create_local_kv_table::Migration)]
    }
}
