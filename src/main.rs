use std::sync::Arc;

use heapstore::buffer::BufferPool;
use heapstore::catalog::Catalog;
use heapstore::common::{BufferPoolConfig, TransactionId};
use heapstore::tuple::{DataType, Schema, TupleBuilder};

fn main() {
    println!("Heapstore - a transactional heap-file storage core in Rust");
    println!("===========================================================\n");

    // Create a temporary table file for demonstration
    let db_path = "demo.dat";

    let schema = Schema::builder()
        .column("id", DataType::Integer)
        .column("name", DataType::Text(32))
        .nullable_column("score", DataType::Double)
        .build_arc();
    println!("Schema: {}", schema);

    let catalog = Arc::new(Catalog::new());
    let table_id = catalog
        .create_table(db_path, "players", schema.clone(), "id")
        .expect("Failed to create table");
    println!("Created table 'players' ({}) in {}", table_id, db_path);

    // Buffer pool with room for 10 pages
    let pool = BufferPool::new(BufferPoolConfig::new(10), catalog.clone())
        .expect("Failed to create buffer pool");
    println!("Created buffer pool with {} pages\n", pool.capacity());

    // Insert some tuples and commit
    let writer = TransactionId::new();
    let rows = [(1, "Ada", Some(92.5)), (2, "Grace", None), (3, "Edsger", Some(88.0))];
    for (id, name, score) in rows {
        let builder = TupleBuilder::new(schema.clone()).value(id).value(name);
        let tuple = match score {
            Some(score) => builder.value(score).build(),
            None => builder.null().build(),
        };
        let pages = pool
            .insert_tuple(writer, table_id, tuple)
            .expect("Failed to insert tuple");
        println!("{} inserted row {} into {:?}", writer, id, pages);
    }
    pool.transaction_complete(writer, true)
        .expect("Failed to commit");
    println!("{} committed\n", writer);

    // Insert a row and roll it back
    let doomed = TransactionId::new();
    let tuple = TupleBuilder::new(schema.clone())
        .value(4)
        .value("Nobody")
        .null()
        .build();
    pool.insert_tuple(doomed, table_id, tuple)
        .expect("Failed to insert tuple");
    pool.transaction_complete(doomed, false)
        .expect("Failed to abort");
    println!("{} aborted\n", doomed);

    // Read the committed rows back
    let reader = TransactionId::new();
    let file = catalog.table(table_id).expect("Table not found");
    println!("Scanning {} ({} pages):", file.path().display(), file.num_pages());
    for tuple in file.iter(&pool, reader) {
        let tuple = tuple.expect("Failed to read tuple");
        let rid = tuple.record_id().expect("Stored tuple has a record id");
        println!("  - {}: {}", rid, tuple);
    }
    pool.transaction_complete(reader, true)
        .expect("Failed to commit");

    // Clean up
    drop(pool);
    catalog.clear();
    drop(file);
    std::fs::remove_file(db_path).ok();
    println!("\nDemo completed successfully!");
}
