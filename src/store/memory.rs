use super::{EntityStore, StoreError, StoreTx};
use crate::model::{
    NewProduct, NewStock, NewStockTimeline, NewVendingMachine, Product, Stock, StockTimeline,
    VendingMachine,
};
use may::sync::{Mutex, MutexGuard};
use std::collections::BTreeMap;

/// In-process store with the same constraints as the PostgreSQL schema.
///
/// Transactions are serialised behind one lock and write the shared rows in
/// place, keeping an undo log that is replayed if the transaction is dropped
/// without committing. Id sequences are not part of the log, so ids handed
/// out by a rolled-back transaction are not reused.
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    rows: Rows,
    sequences: Sequences,
}

#[derive(Debug, Default)]
struct Rows {
    machines: BTreeMap<i32, VendingMachine>,
    products: BTreeMap<i32, Product>,
    stocks: BTreeMap<i32, Stock>,
    timelines: BTreeMap<i32, StockTimeline>,
}

#[derive(Debug, Default)]
struct Sequences {
    machine: i32,
    product: i32,
    stock: i32,
    timeline: i32,
}

fn next(sequence: &mut i32) -> Result<i32, StoreError> {
    *sequence = sequence
        .checked_add(1)
        .ok_or_else(|| StoreError::Backend("id sequence exhausted".to_string()))?;
    Ok(*sequence)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl EntityStore for MemoryStore {
    fn begin(&self) -> Result<Box<dyn StoreTx + '_>, StoreError> {
        let guard = self
            .state
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))?;
        Ok(Box::new(MemoryTx {
            guard,
            undo: Vec::new(),
        }))
    }

    fn check_health(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct MemoryTx<'a> {
    guard: MutexGuard<'a, State>,
    undo: Vec<Undo>,
}

/// Prior state of one row; `None` means the row did not exist.
#[derive(Debug)]
enum Undo {
    Machine(i32, Option<VendingMachine>),
    Product(i32, Option<Product>),
    Stock(i32, Option<Stock>),
    Timeline(i32),
}

fn restore<T>(table: &mut BTreeMap<i32, T>, id: i32, previous: Option<T>) {
    match previous {
        Some(row) => {
            table.insert(id, row);
        }
        None => {
            table.remove(&id);
        }
    }
}

impl Drop for MemoryTx<'_> {
    fn drop(&mut self) {
        let rows = &mut self.guard.rows;
        for undo in self.undo.drain(..).rev() {
            match undo {
                Undo::Machine(id, previous) => restore(&mut rows.machines, id, previous),
                Undo::Product(id, previous) => restore(&mut rows.products, id, previous),
                Undo::Stock(id, previous) => restore(&mut rows.stocks, id, previous),
                Undo::Timeline(id) => restore(&mut rows.timelines, id, None),
            }
        }
    }
}

impl MemoryTx<'_> {
    fn rows(&self) -> &Rows {
        &self.guard.rows
    }

    fn put_machine(&mut self, machine: VendingMachine) {
        let id = machine.id;
        let previous = self.guard.rows.machines.insert(id, machine);
        self.undo.push(Undo::Machine(id, previous));
    }

    fn put_product(&mut self, product: Product) {
        let id = product.id;
        let previous = self.guard.rows.products.insert(id, product);
        self.undo.push(Undo::Product(id, previous));
    }

    fn put_stock(&mut self, stock: Stock) {
        let id = stock.id;
        let previous = self.guard.rows.stocks.insert(id, stock);
        self.undo.push(Undo::Stock(id, previous));
    }

    fn take_stock(&mut self, id: i32) -> bool {
        match self.guard.rows.stocks.remove(&id) {
            Some(previous) => {
                self.undo.push(Undo::Stock(id, Some(previous)));
                true
            }
            None => false,
        }
    }

    fn unique_machine_name(&self, name: &str, except: Option<i32>) -> Result<(), StoreError> {
        if self
            .rows()
            .machines
            .values()
            .any(|m| m.name == name && Some(m.id) != except)
        {
            return Err(unique_violation("vending_machines_name_key"));
        }
        Ok(())
    }

    fn unique_product_name(&self, name: &str, except: Option<i32>) -> Result<(), StoreError> {
        if self
            .rows()
            .products
            .values()
            .any(|p| p.name == name && Some(p.id) != except)
        {
            return Err(unique_violation("products_name_key"));
        }
        Ok(())
    }

    fn check_stock(&self, new: &NewStock, except: Option<i32>) -> Result<(), StoreError> {
        if !self.rows().machines.contains_key(&new.vending_machine) {
            return Err(StoreError::Integrity(format!(
                "insert or update on table \"stocks\" violates foreign key constraint \
                 \"fk_stocks_vending_machine\": vending_machine_id={} is not present",
                new.vending_machine
            )));
        }
        if !self.rows().products.contains_key(&new.product) {
            return Err(StoreError::Integrity(format!(
                "insert or update on table \"stocks\" violates foreign key constraint \
                 \"fk_stocks_product\": product_id={} is not present",
                new.product
            )));
        }
        if self.rows().stocks.values().any(|s| {
            s.pair() == (new.vending_machine, new.product) && Some(s.id) != except
        }) {
            return Err(unique_violation(crate::model::stock::PAIR_CONSTRAINT));
        }
        non_negative("stocks", new.quantity)
    }

    fn remove_stocks_where(&mut self, matches: impl Fn(&Stock) -> bool) {
        let ids: Vec<i32> = self
            .rows()
            .stocks
            .values()
            .filter(|stock| matches(stock))
            .map(|stock| stock.id)
            .collect();
        for id in ids {
            self.take_stock(id);
        }
    }
}

fn unique_violation(constraint: &str) -> StoreError {
    StoreError::Integrity(format!(
        "duplicate key value violates unique constraint \"{constraint}\""
    ))
}

fn non_negative(table: &str, quantity: i32) -> Result<(), StoreError> {
    if quantity < 0 {
        return Err(StoreError::Integrity(format!(
            "new row for relation \"{table}\" violates check constraint \"{table}_quantity_check\""
        )));
    }
    Ok(())
}

impl StoreTx for MemoryTx<'_> {
    fn list_machines(&mut self) -> Result<Vec<VendingMachine>, StoreError> {
        Ok(self.rows().machines.values().cloned().collect())
    }

    fn get_machine(&mut self, id: i32) -> Result<Option<VendingMachine>, StoreError> {
        Ok(self.rows().machines.get(&id).cloned())
    }

    fn find_machine_by_name(&mut self, name: &str) -> Result<Option<VendingMachine>, StoreError> {
        Ok(self.rows().machines.values().find(|m| m.name == name).cloned())
    }

    fn insert_machine(&mut self, new: &NewVendingMachine) -> Result<VendingMachine, StoreError> {
        self.unique_machine_name(&new.name, None)?;
        let id = next(&mut self.guard.sequences.machine)?;
        let machine = VendingMachine::from_new(id, new.clone());
        self.put_machine(machine.clone());
        Ok(machine)
    }

    fn update_machine(
        &mut self,
        id: i32,
        fields: &NewVendingMachine,
    ) -> Result<Option<VendingMachine>, StoreError> {
        if !self.rows().machines.contains_key(&id) {
            return Ok(None);
        }
        self.unique_machine_name(&fields.name, Some(id))?;
        let machine = VendingMachine::from_new(id, fields.clone());
        self.put_machine(machine.clone());
        Ok(Some(machine))
    }

    fn delete_machine(&mut self, id: i32) -> Result<bool, StoreError> {
        let Some(previous) = self.guard.rows.machines.remove(&id) else {
            return Ok(false);
        };
        self.undo.push(Undo::Machine(id, Some(previous)));
        self.remove_stocks_where(|s| s.vending_machine == id);
        Ok(true)
    }

    fn list_products(&mut self) -> Result<Vec<Product>, StoreError> {
        Ok(self.rows().products.values().cloned().collect())
    }

    fn get_product(&mut self, id: i32) -> Result<Option<Product>, StoreError> {
        Ok(self.rows().products.get(&id).cloned())
    }

    fn find_product_by_name(&mut self, name: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.rows().products.values().find(|p| p.name == name).cloned())
    }

    fn insert_product(&mut self, new: &NewProduct) -> Result<Product, StoreError> {
        self.unique_product_name(&new.name, None)?;
        if new.cost.is_sign_negative() && !new.cost.is_zero() {
            return Err(StoreError::Integrity(
                "new row for relation \"products\" violates check constraint \"products_cost_check\""
                    .to_string(),
            ));
        }
        let id = next(&mut self.guard.sequences.product)?;
        let product = Product::from_new(id, new.clone());
        self.put_product(product.clone());
        Ok(product)
    }

    fn update_product(&mut self, id: i32, fields: &NewProduct) -> Result<Option<Product>, StoreError> {
        if !self.rows().products.contains_key(&id) {
            return Ok(None);
        }
        self.unique_product_name(&fields.name, Some(id))?;
        let product = Product::from_new(id, fields.clone());
        self.put_product(product.clone());
        Ok(Some(product))
    }

    fn delete_product(&mut self, id: i32) -> Result<bool, StoreError> {
        let Some(previous) = self.guard.rows.products.remove(&id) else {
            return Ok(false);
        };
        self.undo.push(Undo::Product(id, Some(previous)));
        self.remove_stocks_where(|s| s.product == id);
        Ok(true)
    }

    fn list_stocks(&mut self) -> Result<Vec<Stock>, StoreError> {
        Ok(self.rows().stocks.values().cloned().collect())
    }

    fn get_stock(&mut self, id: i32) -> Result<Option<Stock>, StoreError> {
        Ok(self.rows().stocks.get(&id).cloned())
    }

    fn find_stock_by_pair(
        &mut self,
        vending_machine: i32,
        product: i32,
    ) -> Result<Option<Stock>, StoreError> {
        Ok(self
            .rows()
            .stocks
            .values()
            .find(|s| s.pair() == (vending_machine, product))
            .cloned())
    }

    fn insert_stock(&mut self, new: &NewStock) -> Result<Stock, StoreError> {
        self.check_stock(new, None)?;
        let id = next(&mut self.guard.sequences.stock)?;
        let stock = Stock::from_new(id, *new);
        self.put_stock(stock.clone());
        Ok(stock)
    }

    fn update_stock(&mut self, id: i32, fields: &NewStock) -> Result<Option<Stock>, StoreError> {
        if !self.rows().stocks.contains_key(&id) {
            return Ok(None);
        }
        self.check_stock(fields, Some(id))?;
        let stock = Stock::from_new(id, *fields);
        self.put_stock(stock.clone());
        Ok(Some(stock))
    }

    fn delete_stock(&mut self, id: i32) -> Result<bool, StoreError> {
        Ok(self.take_stock(id))
    }

    fn list_timelines(&mut self) -> Result<Vec<StockTimeline>, StoreError> {
        Ok(self.rows().timelines.values().cloned().collect())
    }

    fn get_timeline(&mut self, id: i32) -> Result<Option<StockTimeline>, StoreError> {
        Ok(self.rows().timelines.get(&id).cloned())
    }

    fn insert_timeline(&mut self, new: &NewStockTimeline) -> Result<StockTimeline, StoreError> {
        non_negative("stock_timelines", new.quantity)?;
        let id = next(&mut self.guard.sequences.timeline)?;
        let entry = StockTimeline::from_new(id, *new);
        self.guard.rows.timelines.insert(id, entry.clone());
        self.undo.push(Undo::Timeline(id));
        Ok(entry)
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.undo.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn machine(name: &str) -> NewVendingMachine {
        NewVendingMachine {
            name: name.to_string(),
            location: "Lobby".to_string(),
            is_active: true,
        }
    }

    fn product(name: &str) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            cost: Decimal::new(150, 2),
        }
    }

    #[test]
    fn test_commit_makes_writes_visible() {
        let store = MemoryStore::new();
        let mut tx = store.begin().expect("begin");
        tx.insert_machine(&machine("VM1")).expect("insert");
        tx.commit().expect("commit");

        let mut tx = store.begin().expect("begin");
        assert_eq!(tx.list_machines().expect("list").len(), 1);
    }

    #[test]
    fn test_drop_discards_writes_but_not_ids() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().expect("begin");
            let first = tx.insert_machine(&machine("VM1")).expect("insert");
            assert_eq!(first.id, 1);
        }

        let mut tx = store.begin().expect("begin");
        assert!(tx.list_machines().expect("list").is_empty());
        let second = tx.insert_machine(&machine("VM1")).expect("insert");
        assert_eq!(second.id, 2);
    }

    #[test]
    fn test_reads_leave_nothing_to_undo() {
        let store = MemoryStore::new();
        let mut tx = store.begin().expect("begin");
        tx.insert_machine(&machine("VM1")).expect("insert");
        tx.commit().expect("commit");

        let mut tx = MemoryTx {
            guard: store.state.lock().expect("lock"),
            undo: Vec::new(),
        };
        assert_eq!(tx.list_machines().expect("list").len(), 1);
        assert!(tx.find_machine_by_name("VM1").expect("find").is_some());
        assert!(tx.undo.is_empty());
    }

    #[test]
    fn test_drop_restores_updated_and_deleted_rows() {
        let store = MemoryStore::new();
        let mut tx = store.begin().expect("begin");
        let vm = tx.insert_machine(&machine("VM1")).expect("machine");
        let cola = tx.insert_product(&product("Cola")).expect("product");
        let stock = tx
            .insert_stock(&NewStock {
                vending_machine: vm.id,
                product: cola.id,
                quantity: 3,
            })
            .expect("stock");
        tx.commit().expect("commit");

        {
            let mut tx = store.begin().expect("begin");
            tx.update_machine(vm.id, &machine("VM2")).expect("rename");
            // Reads inside the transaction see its own writes.
            assert_eq!(tx.get_machine(vm.id).expect("get").map(|m| m.name), Some("VM2".to_string()));
            assert!(tx.delete_machine(vm.id).expect("delete"));
            assert_eq!(tx.get_stock(stock.id).expect("get"), None);
        }

        let mut tx = store.begin().expect("begin");
        assert_eq!(tx.get_machine(vm.id).expect("get"), Some(vm));
        assert_eq!(tx.get_stock(stock.id).expect("get"), Some(stock));
    }

    #[test]
    fn test_unique_names() {
        let store = MemoryStore::new();
        let mut tx = store.begin().expect("begin");
        let vm = tx.insert_machine(&machine("VM1")).expect("insert");
        assert!(matches!(
            tx.insert_machine(&machine("VM1")),
            Err(StoreError::Integrity(_))
        ));
        // Renaming a row to its own name is fine.
        assert!(tx.update_machine(vm.id, &machine("VM1")).expect("update").is_some());

        tx.insert_product(&product("Cola")).expect("insert");
        assert!(matches!(
            tx.insert_product(&product("Cola")),
            Err(StoreError::Integrity(_))
        ));
    }

    #[test]
    fn test_stock_constraints() {
        let store = MemoryStore::new();
        let mut tx = store.begin().expect("begin");
        let vm = tx.insert_machine(&machine("VM1")).expect("machine");
        let cola = tx.insert_product(&product("Cola")).expect("product");

        let new = NewStock {
            vending_machine: vm.id,
            product: cola.id,
            quantity: 3,
        };
        tx.insert_stock(&new).expect("first pair");
        assert!(matches!(tx.insert_stock(&new), Err(StoreError::Integrity(_))));

        let dangling = NewStock {
            vending_machine: 99,
            ..new
        };
        assert!(matches!(tx.insert_stock(&dangling), Err(StoreError::Integrity(_))));
    }

    #[test]
    fn test_delete_machine_cascades_to_stock_but_not_timeline() {
        let store = MemoryStore::new();
        let mut tx = store.begin().expect("begin");
        let vm = tx.insert_machine(&machine("VM1")).expect("machine");
        let cola = tx.insert_product(&product("Cola")).expect("product");
        let stock = tx
            .insert_stock(&NewStock {
                vending_machine: vm.id,
                product: cola.id,
                quantity: 3,
            })
            .expect("stock");
        tx.insert_timeline(&NewStockTimeline {
            vending_machine: vm.id,
            product: cola.id,
            quantity: 3,
            timestamp: Utc::now(),
        })
        .expect("timeline");

        assert!(tx.delete_machine(vm.id).expect("delete"));
        assert_eq!(tx.get_stock(stock.id).expect("get"), None);
        assert_eq!(tx.list_timelines().expect("list").len(), 1);
        assert!(!tx.delete_machine(vm.id).expect("second delete"));
    }
}
