// catena/src/group/collector.rs

//! Accumulation policies that reduce member results into a group result.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// A reduction over member results: `supplier` seeds the accumulator,
/// `accumulator` folds one result in, `combiner` merges two partial
/// accumulators (parallel groups) and `finisher` produces the group result.
///
/// For parallel groups the order in which results arrive is undefined, so the
/// policy should be order-independent if the result must be.
pub struct Collector<S, A, T> {
  supplier: Arc<dyn Fn() -> A + Send + Sync>,
  accumulator: Arc<dyn Fn(&mut A, S) + Send + Sync>,
  combiner: Arc<dyn Fn(A, A) -> A + Send + Sync>,
  finisher: Arc<dyn Fn(A) -> T + Send + Sync>,
}

impl<S, A, T> Clone for Collector<S, A, T> {
  fn clone(&self) -> Self {
    Self {
      supplier: self.supplier.clone(),
      accumulator: self.accumulator.clone(),
      combiner: self.combiner.clone(),
      finisher: self.finisher.clone(),
    }
  }
}

impl<S, A, T> fmt::Debug for Collector<S, A, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Collector")
      .field("member_type", &std::any::type_name::<S>())
      .field("accumulator_type", &std::any::type_name::<A>())
      .field("result_type", &std::any::type_name::<T>())
      .finish()
  }
}

impl<S, A, T> Collector<S, A, T> {
  pub fn new(
    supplier: impl Fn() -> A + Send + Sync + 'static,
    accumulator: impl Fn(&mut A, S) + Send + Sync + 'static,
    combiner: impl Fn(A, A) -> A + Send + Sync + 'static,
    finisher: impl Fn(A) -> T + Send + Sync + 'static,
  ) -> Self {
    Self {
      supplier: Arc::new(supplier),
      accumulator: Arc::new(accumulator),
      combiner: Arc::new(combiner),
      finisher: Arc::new(finisher),
    }
  }
}

impl<S> Collector<S, S, S>
where
  S: std::ops::Add<Output = S> + Default + Clone + 'static,
{
  /// Sums member results.
  pub fn summing() -> Self {
    Collector::new(
      S::default,
      |acc: &mut S, value: S| *acc = acc.clone() + value,
      |a: S, b: S| a + b,
      |acc: S| acc,
    )
  }
}

impl<S> Collector<S, Option<S>, S>
where
  S: Default + 'static,
{
  /// Keeps the most recently accumulated result (`S::default()` if none).
  pub fn last() -> Self {
    Collector::new(
      || None,
      |acc: &mut Option<S>, value: S| *acc = Some(value),
      |a: Option<S>, b: Option<S>| b.or(a),
      |acc: Option<S>| acc.unwrap_or_default(),
    )
  }
}

impl<S: 'static> Collector<S, Vec<S>, Vec<S>> {
  /// Collects member results in accumulation order.
  pub fn to_vec() -> Self {
    Collector::new(
      Vec::new,
      |acc: &mut Vec<S>, value: S| acc.push(value),
      |mut a: Vec<S>, mut b: Vec<S>| {
        a.append(&mut b);
        a
      },
      |acc: Vec<S>| acc,
    )
  }
}

impl<S: 'static> Collector<S, usize, usize> {
  /// Counts member results.
  pub fn counting() -> Self {
    Collector::new(
      || 0,
      |acc: &mut usize, _value: S| *acc += 1,
      |a: usize, b: usize| a + b,
      |acc: usize| acc,
    )
  }
}

/// A collector bound to its running accumulator, with the accumulator type erased.
pub(crate) trait Accumulation<S, T>: Send + Sync {
  /// Replaces the accumulator with a fresh seed.
  fn seed(&self);
  /// Folds one result in place (sequential groups).
  fn accumulate(&self, value: S);
  /// Folds one result into a fresh partial accumulator and combines it in
  /// (parallel groups).
  fn merge(&self, value: S);
  fn finish(&self) -> Option<T>;
}

pub(crate) struct CollectorState<S, A, T> {
  collector: Collector<S, A, T>,
  current: Mutex<Option<A>>,
}

impl<S, A, T> CollectorState<S, A, T> {
  pub(crate) fn new(collector: Collector<S, A, T>) -> Self {
    Self {
      collector,
      current: Mutex::new(None),
    }
  }
}

impl<S, A, T> Accumulation<S, T> for CollectorState<S, A, T>
where
  S: Send + 'static,
  A: Send + 'static,
  T: Send + 'static,
{
  fn seed(&self) {
    *self.current.lock() = Some((self.collector.supplier)());
  }

  fn accumulate(&self, value: S) {
    let mut current = self.current.lock();
    let acc = current.get_or_insert_with(|| (self.collector.supplier)());
    (self.collector.accumulator)(acc, value);
  }

  fn merge(&self, value: S) {
    let mut partial = (self.collector.supplier)();
    (self.collector.accumulator)(&mut partial, value);
    let mut current = self.current.lock();
    let merged = match current.take() {
      Some(existing) => (self.collector.combiner)(existing, partial),
      None => partial,
    };
    *current = Some(merged);
  }

  fn finish(&self) -> Option<T> {
    let acc = self
      .current
      .lock()
      .take()
      .unwrap_or_else(|| (self.collector.supplier)());
    Some((self.collector.finisher)(acc))
  }
}

/// Used when no collector was configured: results are ignored and the group
/// result is empty.
pub(crate) struct NoAccumulation;

impl<S, T> Accumulation<S, T> for NoAccumulation {
  fn seed(&self) {}
  fn accumulate(&self, _value: S) {}
  fn merge(&self, _value: S) {}
  fn finish(&self) -> Option<T> {
    None
  }
}
