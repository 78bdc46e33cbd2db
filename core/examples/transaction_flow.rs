// catena_core/examples/transaction_flow.rs

use catena::{
  CatenaResult, Driver, Session, SqlType, SqlValue, Statement, StatementOutcome, TransactionOutcome, WorkFailure,
};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::info;

/// Stands in for a real database connection.
#[derive(Default)]
struct InMemoryDriver {
  next_id: AtomicI64,
}

impl Driver for InMemoryDriver {
  fn execute(&self, statement: &Statement<'_>) -> Result<StatementOutcome, WorkFailure> {
    info!(sql = statement.sql, parameters = ?statement.parameters, "driver executing");
    if statement.sql.contains("fail") {
      return Err(WorkFailure::new("syntax error").with_sql_state("42601").with_position(1));
    }
    let mut outcome = StatementOutcome::rows(1);
    if statement.out_parameters.contains_key("id") {
      outcome = outcome.with_out_value("id", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
    }
    Ok(outcome)
  }

  fn end_transaction(&self, commit: bool) -> Result<(), WorkFailure> {
    info!(commit, "driver ending transaction");
    Ok(())
  }
}

#[tokio::main]
async fn main() -> CatenaResult<()> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Transaction Flow Example ---");
  let session = Session::builder()
    .name("orders")
    .driver(InMemoryDriver::default())
    .build()?;
  let transaction = session.transaction_completion();

  let insert = session.operation::<i64>("INSERT INTO orders (customer) VALUES (:customer) RETURNING :id")?;
  insert
    .set("customer", "ACME")?
    .out_parameter("id", SqlType::Integer)?
    .apply(|outcome| {
      outcome
        .out_value("id")
        .and_then(SqlValue::as_i64)
        .ok_or_else(|| WorkFailure::new("no id returned").into())
    })?;
  let order_id = insert.submit()?;

  let audit = session.operation::<u64>("INSERT INTO audit (order_id) VALUES (:order)")?;
  let id_for_audit = order_id.completion();
  audit
    .set_deferred("order", async move { id_for_audit.await.map(SqlValue::from) })?
    .apply(|outcome| Ok(outcome.row_count))?;
  audit.submit()?;

  let end = session.end_transaction_operation::<TransactionOutcome>(&transaction)?;
  let ended = end.submit()?;

  info!("Order id: {}", order_id.await?);
  info!("Transaction: {:?}", ended.await?);

  // Application code may force a rollback while the transaction is in flight.
  let second = session.transaction_completion();
  let op = session.operation::<u64>("DELETE FROM orders")?;
  op.apply(|outcome| Ok(outcome.row_count))?;
  op.submit()?;
  second.mark_rollback_only();
  let end = session.end_transaction_operation::<TransactionOutcome>(&second)?;
  info!("Second transaction: {:?}", end.submit()?.await?);

  info!("--- Transaction Flow Example Finished ---");
  Ok(())
}
