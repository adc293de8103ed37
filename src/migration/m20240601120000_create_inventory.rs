//! Initial inventory schema: machines, products, stock levels and the stock ledger.

use super::error::MigrationError;
use super::migration::Migration;
use super::schema_manager::SchemaManager;
use sea_query::{ColumnDef, Expr, ExprTrait, ForeignKey, ForeignKeyAction, Index, Table};

pub struct CreateInventory;

impl Migration for CreateInventory {
    fn name(&self) -> &str {
        "create_inventory"
    }

    fn version(&self) -> i64 {
        20240601120000
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        manager.create_table(
            Table::create()
                .table("vending_machines")
                .if_not_exists()
                .col(ColumnDef::new("id").integer().not_null().auto_increment().primary_key())
                .col(ColumnDef::new("name").string_len(100).not_null().unique_key())
                .col(ColumnDef::new("location").string_len(100).not_null())
                .col(ColumnDef::new("is_active").boolean().not_null().default(true))
                .to_owned(),
        )?;

        manager.create_table(
            Table::create()
                .table("products")
                .if_not_exists()
                .col(ColumnDef::new("id").integer().not_null().auto_increment().primary_key())
                .col(ColumnDef::new("name").string_len(100).not_null().unique_key())
                .col(
                    ColumnDef::new("cost")
                        .decimal_len(10, 2)
                        .not_null()
                        .check(Expr::col("cost").gte(0)),
                )
                .to_owned(),
        )?;

        manager.create_table(
            Table::create()
                .table("stocks")
                .if_not_exists()
                .col(ColumnDef::new("id").integer().not_null().auto_increment().primary_key())
                .col(ColumnDef::new("vending_machine_id").integer().not_null())
                .col(ColumnDef::new("product_id").integer().not_null())
                .col(
                    ColumnDef::new("quantity")
                        .integer()
                        .not_null()
                        .check(Expr::col("quantity").gte(0)),
                )
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_stocks_vending_machine")
                        .from("stocks", "vending_machine_id")
                        .to("vending_machines", "id")
                        .on_delete(ForeignKeyAction::Cascade),
                )
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_stocks_product")
                        .from("stocks", "product_id")
                        .to("products", "id")
                        .on_delete(ForeignKeyAction::Cascade),
                )
                .index(
                    Index::create()
                        .name("vending_machine_product")
                        .col("vending_machine_id")
                        .col("product_id")
                        .unique(),
                )
                .to_owned(),
        )?;

        // Ledger rows outlive their machine and product, so no foreign keys here.
        manager.create_table(
            Table::create()
                .table("stock_timelines")
                .if_not_exists()
                .col(ColumnDef::new("id").integer().not_null().auto_increment().primary_key())
                .col(ColumnDef::new("vending_machine_id").integer().not_null())
                .col(ColumnDef::new("product_id").integer().not_null())
                .col(
                    ColumnDef::new("quantity")
                        .integer()
                        .not_null()
                        .check(Expr::col("quantity").gte(0)),
                )
                .col(
                    ColumnDef::new("timestamp")
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp()),
                )
                .to_owned(),
        )?;

        for column in ["vending_machine_id", "product_id"] {
            manager.create_index(
                Index::create()
                    .if_not_exists()
                    .name(format!("idx_stock_timelines_{column}"))
                    .table("stock_timelines")
                    .col(column)
                    .to_owned(),
            )?;
        }

        Ok(())
    }

    fn down(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
        for table in ["stock_timelines", "stocks", "products", "vending_machines"] {
            manager.drop_table(Table::drop().table(table).if_exists().to_owned())?;
        }
        Ok(())
    }
}
