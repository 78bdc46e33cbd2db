// catena_core/examples/basic_group.rs

use catena::{CatenaResult, Collector, Operation, Session};
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> CatenaResult<()> {
  // Initialize tracing (optional, for demonstration)
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Basic Group Example ---");

  // 1. A session is the ordered resource every operation runs against.
  let session = Session::builder().name("basic").build()?;

  // 2. A sequential group summing its members' results.
  let group = session.operation_group::<u32, u32>()?;
  group.collect(Collector::summing())?;

  // 3. Members run one after another, in the order they were submitted.
  for (name, value) in [("alpha", 1_u32), ("beta", 2), ("gamma", 3)] {
    let op = group.local_operation()?;
    op.timeout(Duration::from_secs(1))?.on_execution(move |ctx| {
      info!(operation = %ctx.id(), "{} executed", name);
      Ok(value)
    })?;
    op.submit()?;
  }

  // 4. Submit and close; the group finishes after its last member.
  let submission = group.submit()?;
  group.close()?;

  let total = submission.await?;
  info!("Group result: {:?}", total);
  assert_eq!(total, Some(6));

  // 5. A parallel group: members start together once the group's turn arrives.
  let fan_out = session.operation_group::<u32, Vec<u32>>()?;
  fan_out.parallel()?.collect(Collector::to_vec())?;
  for value in [10_u32, 20, 30] {
    let op = fan_out.local_operation()?;
    op.on_execution(move |_ctx| {
      std::thread::sleep(Duration::from_millis(u64::from(40 - value)));
      Ok(value)
    })?;
    op.submit()?;
  }
  let fan_out_result = fan_out.submit()?;
  fan_out.close()?;
  info!("Parallel results (completion order): {:?}", fan_out_result.await?);

  session.close()?;
  info!("--- Basic Group Example Finished ---");
  Ok(())
}
