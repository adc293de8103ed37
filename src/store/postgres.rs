use super::{EntityStore, StoreError, StoreTx};
use crate::config::DatabaseConfig;
use crate::connection::check_connection_health;
use crate::executor::{ExecError, MayPostgresExecutor};
use crate::model::{
    product, stock, stock_timeline, vending_machine, NewProduct, NewStock, NewStockTimeline,
    NewVendingMachine, Product, Stock, StockTimeline, VendingMachine,
};
use crate::pool::{ConnectionPool, PoolError, PooledConnection};
use crate::query::{execute_built, fetch_all, fetch_one, fetch_optional, is_integrity_violation, FromRow};
use crate::transaction::{Transaction, TransactionError};
use sea_query::{
    DeleteStatement, Expr, ExprTrait, InsertStatement, Order, PostgresQueryBuilder, Query,
    SelectStatement, UpdateStatement,
};

const MACHINE_COLUMNS: [&str; 4] = ["id", "name", "location", "is_active"];
const PRODUCT_COLUMNS: [&str; 3] = ["id", "name", "cost"];
const STOCK_COLUMNS: [&str; 4] = ["id", "vending_machine_id", "product_id", "quantity"];
const TIMELINE_COLUMNS: [&str; 5] = ["id", "vending_machine_id", "product_id", "quantity", "timestamp"];

/// PostgreSQL-backed store. Each transaction holds one pooled connection.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: ConnectionPool,
}

impl PgStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Open the connection pool described by `config`.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, PoolError> {
        let pool = ConnectionPool::open(&config.url, config.max_connections, config.pool_timeout())?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Run `f` with an executor on a pooled connection, e.g. for migrations.
    pub fn with_executor<T>(
        &self,
        f: impl FnOnce(&MayPostgresExecutor) -> T,
    ) -> Result<T, StoreError> {
        let conn = self.pool.acquire().map_err(pool_error)?;
        let executor = MayPostgresExecutor::new((*conn).clone());
        Ok(f(&executor))
    }
}

impl EntityStore for PgStore {
    fn begin(&self) -> Result<Box<dyn StoreTx + '_>, StoreError> {
        let conn = self.pool.acquire().map_err(pool_error)?;
        let tx = match Transaction::new((*conn).clone()) {
            Ok(tx) => tx,
            Err(err) => {
                conn.mark_broken();
                return Err(transaction_error(err));
            }
        };
        Ok(Box::new(PgTx { tx, conn }))
    }

    fn check_health(&self) -> Result<(), StoreError> {
        let conn = self.pool.acquire().map_err(pool_error)?;
        match check_connection_health(&conn) {
            Ok(true) => Ok(()),
            Ok(false) => {
                conn.mark_broken();
                Err(StoreError::Backend("unexpected health check result".to_string()))
            }
            Err(e) => {
                conn.mark_broken();
                Err(StoreError::Backend(e.to_string()))
            }
        }
    }
}

/// Field order matters: the transaction must finish before the connection
/// goes back to the pool.
struct PgTx {
    tx: Transaction,
    conn: PooledConnection,
}

fn pool_error(err: PoolError) -> StoreError {
    match err {
        PoolError::Timeout(_) => StoreError::PoolTimeout(err.to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}

fn transaction_error(err: TransactionError) -> StoreError {
    store_error(err.into())
}

fn store_error(err: ExecError) -> StoreError {
    if is_integrity_violation(&err) {
        StoreError::Integrity(err.to_string())
    } else {
        log::error!("store query failed: {err}");
        StoreError::Backend(err.to_string())
    }
}

fn query_error(err: sea_query::error::Error) -> StoreError {
    StoreError::Backend(format!("could not build query: {err}"))
}

impl PgTx {
    /// Map a failed statement, flagging the connection unless the database
    /// merely rejected the row.
    fn failed(&self, err: ExecError) -> StoreError {
        let err = store_error(err);
        if matches!(err, StoreError::Backend(_)) {
            self.conn.mark_broken();
        }
        err
    }

    fn all<M: FromRow>(&self, select: &SelectStatement) -> Result<Vec<M>, StoreError> {
        let (sql, values) = select.build(PostgresQueryBuilder);
        fetch_all(&self.tx, &sql, &values).map_err(|e| self.failed(e))
    }

    fn optional<M: FromRow>(&self, select: &SelectStatement) -> Result<Option<M>, StoreError> {
        let (sql, values) = select.build(PostgresQueryBuilder);
        fetch_optional(&self.tx, &sql, &values).map_err(|e| self.failed(e))
    }

    fn insert<M: FromRow>(&self, insert: &InsertStatement) -> Result<M, StoreError> {
        let (sql, values) = insert.build(PostgresQueryBuilder);
        fetch_one(&self.tx, &sql, &values).map_err(|e| self.failed(e))
    }

    fn update<M: FromRow>(&self, update: &UpdateStatement) -> Result<Option<M>, StoreError> {
        let (sql, values) = update.build(PostgresQueryBuilder);
        fetch_optional(&self.tx, &sql, &values).map_err(|e| self.failed(e))
    }

    fn delete(&self, delete: &DeleteStatement) -> Result<bool, StoreError> {
        let (sql, values) = delete.build(PostgresQueryBuilder);
        execute_built(&self.tx, &sql, &values)
            .map(|affected| affected > 0)
            .map_err(|e| self.failed(e))
    }
}

fn select_all(table: &'static str, columns: &[&'static str]) -> SelectStatement {
    Query::select()
        .columns(columns.iter().copied())
        .from(table)
        .order_by("id", Order::Asc)
        .to_owned()
}

fn select_by(table: &'static str, columns: &[&'static str], column: &'static str, value: impl Into<sea_query::Value>) -> SelectStatement {
    Query::select()
        .columns(columns.iter().copied())
        .from(table)
        .and_where(Expr::col(column).eq(value.into()))
        .to_owned()
}

fn delete_by_id(table: &'static str, id: i32) -> DeleteStatement {
    Query::delete()
        .from_table(table)
        .and_where(Expr::col("id").eq(id))
        .to_owned()
}

impl StoreTx for PgTx {
    fn list_machines(&mut self) -> Result<Vec<VendingMachine>, StoreError> {
        self.all(&select_all(vending_machine::TABLE, &MACHINE_COLUMNS))
    }

    fn get_machine(&mut self, id: i32) -> Result<Option<VendingMachine>, StoreError> {
        self.optional(&select_by(vending_machine::TABLE, &MACHINE_COLUMNS, "id", id))
    }

    fn find_machine_by_name(&mut self, name: &str) -> Result<Option<VendingMachine>, StoreError> {
        self.optional(&select_by(vending_machine::TABLE, &MACHINE_COLUMNS, "name", name))
    }

    fn insert_machine(&mut self, new: &NewVendingMachine) -> Result<VendingMachine, StoreError> {
        let mut insert = Query::insert();
        insert
            .into_table(vending_machine::TABLE)
            .columns(["name", "location", "is_active"]);
        insert
            .values([
                new.name.clone().into(),
                new.location.clone().into(),
                new.is_active.into(),
            ])
            .map_err(query_error)?;
        self.insert(insert.returning_all())
    }

    fn update_machine(
        &mut self,
        id: i32,
        fields: &NewVendingMachine,
    ) -> Result<Option<VendingMachine>, StoreError> {
        self.update(
            Query::update()
                .table(vending_machine::TABLE)
                .value("name", fields.name.clone())
                .value("location", fields.location.clone())
                .value("is_active", fields.is_active)
                .and_where(Expr::col("id").eq(id))
                .returning_all(),
        )
    }

    fn delete_machine(&mut self, id: i32) -> Result<bool, StoreError> {
        // Stock rows go with it through ON DELETE CASCADE.
        self.delete(&delete_by_id(vending_machine::TABLE, id))
    }

    fn list_products(&mut self) -> Result<Vec<Product>, StoreError> {
        self.all(&select_all(product::TABLE, &PRODUCT_COLUMNS))
    }

    fn get_product(&mut self, id: i32) -> Result<Option<Product>, StoreError> {
        self.optional(&select_by(product::TABLE, &PRODUCT_COLUMNS, "id", id))
    }

    fn find_product_by_name(&mut self, name: &str) -> Result<Option<Product>, StoreError> {
        self.optional(&select_by(product::TABLE, &PRODUCT_COLUMNS, "name", name))
    }

    fn insert_product(&mut self, new: &NewProduct) -> Result<Product, StoreError> {
        let mut insert = Query::insert();
        insert.into_table(product::TABLE).columns(["name", "cost"]);
        insert
            .values([new.name.clone().into(), new.cost.into()])
            .map_err(query_error)?;
        self.insert(insert.returning_all())
    }

    fn update_product(&mut self, id: i32, fields: &NewProduct) -> Result<Option<Product>, StoreError> {
        self.update(
            Query::update()
                .table(product::TABLE)
                .value("name", fields.name.clone())
                .value("cost", fields.cost)
                .and_where(Expr::col("id").eq(id))
                .returning_all(),
        )
    }

    fn delete_product(&mut self, id: i32) -> Result<bool, StoreError> {
        self.delete(&delete_by_id(product::TABLE, id))
    }

    fn list_stocks(&mut self) -> Result<Vec<Stock>, StoreError> {
        self.all(&select_all(stock::TABLE, &STOCK_COLUMNS))
    }

    fn get_stock(&mut self, id: i32) -> Result<Option<Stock>, StoreError> {
        self.optional(&select_by(stock::TABLE, &STOCK_COLUMNS, "id", id))
    }

    fn find_stock_by_pair(
        &mut self,
        vending_machine: i32,
        product: i32,
    ) -> Result<Option<Stock>, StoreError> {
        self.optional(
            Query::select()
                .columns(STOCK_COLUMNS)
                .from(stock::TABLE)
                .and_where(Expr::col("vending_machine_id").eq(vending_machine))
                .and_where(Expr::col("product_id").eq(product)),
        )
    }

    fn insert_stock(&mut self, new: &NewStock) -> Result<Stock, StoreError> {
        let mut insert = Query::insert();
        insert
            .into_table(stock::TABLE)
            .columns(["vending_machine_id", "product_id", "quantity"]);
        insert
            .values([
                new.vending_machine.into(),
                new.product.into(),
                new.quantity.into(),
            ])
            .map_err(query_error)?;
        self.insert(insert.returning_all())
    }

    fn update_stock(&mut self, id: i32, fields: &NewStock) -> Result<Option<Stock>, StoreError> {
        self.update(
            Query::update()
                .table(stock::TABLE)
                .value("vending_machine_id", fields.vending_machine)
                .value("product_id", fields.product)
                .value("quantity", fields.quantity)
                .and_where(Expr::col("id").eq(id))
                .returning_all(),
        )
    }

    fn delete_stock(&mut self, id: i32) -> Result<bool, StoreError> {
        self.delete(&delete_by_id(stock::TABLE, id))
    }

    fn list_timelines(&mut self) -> Result<Vec<StockTimeline>, StoreError> {
        self.all(&select_all(stock_timeline::TABLE, &TIMELINE_COLUMNS))
    }

    fn get_timeline(&mut self, id: i32) -> Result<Option<StockTimeline>, StoreError> {
        self.optional(&select_by(stock_timeline::TABLE, &TIMELINE_COLUMNS, "id", id))
    }

    fn insert_timeline(&mut self, new: &NewStockTimeline) -> Result<StockTimeline, StoreError> {
        let mut insert = Query::insert();
        insert.into_table(stock_timeline::TABLE).columns([
            "vending_machine_id",
            "product_id",
            "quantity",
            "timestamp",
        ]);
        insert
            .values([
                new.vending_machine.into(),
                new.product.into(),
                new.quantity.into(),
                new.timestamp.into(),
            ])
            .map_err(query_error)?;
        self.insert(insert.returning_all())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgTx { tx, conn } = *self;
        let result = tx.commit().map_err(transaction_error);
        if matches!(result, Err(StoreError::Backend(_))) {
            conn.mark_broken();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_all_orders_by_id() {
        let (sql, _) = select_all(stock::TABLE, &STOCK_COLUMNS).build(PostgresQueryBuilder);
        assert_eq!(
            sql,
            r#"SELECT "id", "vending_machine_id", "product_id", "quantity" FROM "stocks" ORDER BY "id" ASC"#
        );
    }

    #[test]
    fn test_select_by_binds_value() {
        let (sql, values) =
            select_by(vending_machine::TABLE, &MACHINE_COLUMNS, "name", "VM1").build(PostgresQueryBuilder);
        assert!(sql.ends_with(r#"WHERE "name" = $1"#), "{sql}");
        assert_eq!(values.0.len(), 1);
    }

    #[test]
    fn test_pool_timeout_maps_to_unavailable() {
        let err = pool_error(PoolError::Timeout(std::time::Duration::from_secs(1)));
        assert!(matches!(err, StoreError::PoolTimeout(_)));
        assert!(matches!(pool_error(PoolError::EmptyPool), StoreError::Backend(_)));
    }

    #[test]
    fn test_non_constraint_errors_are_backend_errors() {
        let err = store_error(ExecError::QueryError("syntax".to_string()));
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
