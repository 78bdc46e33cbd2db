// catena_core/examples/conditional_group.rs

use catena::{CatenaError, CatenaResult, Collector, Operation, Session, WorkFailure};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> CatenaResult<()> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Conditional & Independent Group Example ---");
  let session = Session::builder().name("conditional").build()?;

  // A feature flag that is looked up asynchronously decides whether the
  // group's members run at all.
  let feature_enabled = async {
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    Ok::<bool, CatenaError>(false)
  };

  let optional = session.operation_group::<String, Vec<String>>()?;
  optional.conditional(feature_enabled)?.collect(Collector::to_vec())?;
  let op = optional.local_operation()?;
  op.on_execution(|_ctx| Ok("expensive work".to_string()))?;
  let skipped = op.submit()?;
  let optional_result = optional.submit()?;
  optional.close()?;

  info!("Conditional group result: {:?}", optional_result.await?);
  info!("Its member was skipped: {}", matches!(skipped.await, Err(ref e) if e.is_skip()));

  // An independent group may fail without failing the operations after it.
  let best_effort = session.operation_group::<(), ()>()?;
  best_effort.independent()?;
  best_effort.on_error(|err: &CatenaError| warn!("best-effort group failed: {}", err))?;
  let op = best_effort.local_operation()?;
  op.on_execution(|_ctx| Err(WorkFailure::new("cache server unreachable").into()))?;
  op.submit()?;

  // A catch member always runs and lets the chain continue.
  let catch = best_effort.catch_operation()?;
  catch.on_error(|err: &CatenaError| info!("catch saw: {}", err))?;
  catch.submit()?;
  best_effort.submit()?;
  best_effort.close()?;

  let after = session.local_operation::<&'static str>()?;
  after.on_execution(|_ctx| Ok("main work done"))?;
  info!("After the independent group: {}", after.submit()?.await?);

  info!("--- Conditional & Independent Group Example Finished ---");
  Ok(())
}
