// catena/src/group/config.rs

//! One-shot configuration of an operation group, tracked as a single phase
//! tag instead of scattered flags.

use crate::error::{CatenaError, CatenaResult};

/// Why a group stopped accepting configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeCause {
  Submitted,
  MemberCreated,
}

/// Configuration phase of a group.
///
/// ```text
/// Configuring --submit / first member--> Frozen --close--> Closed
/// Configuring --------------------close------------------> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPhase {
  Configuring,
  Frozen(FreezeCause),
  Closed,
}

/// The group settings that may each be applied at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSetting {
  Parallel,
  Independent,
  Conditional,
  Collect,
}

impl GroupSetting {
  fn bit(self) -> u8 {
    match self {
      GroupSetting::Parallel => 1,
      GroupSetting::Independent => 1 << 1,
      GroupSetting::Conditional => 1 << 2,
      GroupSetting::Collect => 1 << 3,
    }
  }
}

#[derive(Debug)]
pub(crate) struct GroupConfig {
  phase: GroupPhase,
  applied: u8,
  submitted: bool,
}

impl GroupConfig {
  pub(crate) fn new() -> Self {
    Self {
      phase: GroupPhase::Configuring,
      applied: 0,
      submitted: false,
    }
  }

  pub(crate) fn phase(&self) -> GroupPhase {
    self.phase
  }

  pub(crate) fn is_applied(&self, setting: GroupSetting) -> bool {
    self.applied & setting.bit() != 0
  }

  pub(crate) fn assert_open(&self) -> CatenaResult<()> {
    if self.phase == GroupPhase::Closed {
      return Err(CatenaError::illegal_state("OperationGroup is closed."));
    }
    Ok(())
  }

  /// Records `setting`, failing unless the group is still configurable and
  /// the setting was not applied before.
  pub(crate) fn apply(&mut self, setting: GroupSetting) -> CatenaResult<()> {
    match self.phase {
      GroupPhase::Closed => return Err(CatenaError::illegal_state("OperationGroup is closed.")),
      GroupPhase::Frozen(FreezeCause::Submitted) => {
        return Err(CatenaError::illegal_state("OperationGroup is submitted."))
      }
      GroupPhase::Frozen(FreezeCause::MemberCreated) => {
        return Err(CatenaError::illegal_state("OperationGroup has created members."))
      }
      GroupPhase::Configuring => {}
    }
    if self.is_applied(setting) {
      return Err(CatenaError::illegal_state(format!("Multiple calls to {:?}", setting)));
    }
    self.applied |= setting.bit();
    Ok(())
  }

  pub(crate) fn on_submit(&mut self) -> CatenaResult<()> {
    self.assert_open()?;
    if self.submitted {
      return Err(CatenaError::illegal_state("OperationGroup is submitted."));
    }
    self.submitted = true;
    self.freeze(FreezeCause::Submitted);
    Ok(())
  }

  pub(crate) fn on_member_created(&mut self) -> CatenaResult<()> {
    self.assert_open()?;
    self.freeze(FreezeCause::MemberCreated);
    Ok(())
  }

  pub(crate) fn close(&mut self) -> CatenaResult<()> {
    self.assert_open()?;
    self.phase = GroupPhase::Closed;
    Ok(())
  }

  fn freeze(&mut self, cause: FreezeCause) {
    if self.phase == GroupPhase::Configuring {
      self.phase = GroupPhase::Frozen(cause);
    }
  }
}
