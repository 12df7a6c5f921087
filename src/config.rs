//! Runtime configuration: placement policy and scribble fill.
//!
//! Both switches are read from the process environment on every allocating
//! entry point, so changing them between calls takes effect immediately.
//! Lookup goes through `libc::getenv` rather than `std::env::var` because the
//! latter copies the value into a heap `String`, and the entry points must
//! never allocate through the heap they implement.

use std::ffi::CStr;
use std::fmt;
use std::str::FromStr;

use log::warn;
use thiserror::Error;

/// Environment variable selecting the placement policy.
pub const ALGORITHM_ENV: &CStr = c"ALLOCATOR_ALGORITHM";

/// Environment variable toggling the `0xAA` fill of fresh payloads.
pub const SCRIBBLE_ENV: &CStr = c"ALLOCATOR_SCRIBBLE";

/// Errors produced when parsing configuration values.
///
/// Carries no payload so that parsing on the allocation-free entry paths
/// never touches the heap; the offending value is reported by the caller's
/// log line instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
  #[error("unrecognized placement policy value")]
  UnknownPolicy,
}

/// Strategy used to pick a reusable block for a new request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
  /// First candidate in registry order.
  FirstFit,
  /// Candidate with the least free slack; earlier block wins ties.
  BestFit,
  /// Candidate with the most free slack; earlier block wins ties.
  WorstFit,
}

impl Policy {
  /// Policy used when the environment does not name one.
  pub const DEFAULT: Policy = Policy::FirstFit;

  /// The environment-variable spelling of this policy.
  pub fn name(self) -> &'static str {
    match self {
      Policy::FirstFit => "first_fit",
      Policy::BestFit => "best_fit",
      Policy::WorstFit => "worst_fit",
    }
  }
}

impl fmt::Display for Policy {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Policy {
  type Err = ConfigError;

  /// Parses the `ALLOCATOR_ALGORITHM` spelling of a policy.
  ///
  /// # Examples
  ///
  /// ```
  /// use mallocator::Policy;
  ///
  /// let policy: Policy = "best_fit".parse().unwrap();
  /// assert_eq!(policy, Policy::BestFit);
  /// assert!("buddy".parse::<Policy>().is_err());
  /// ```
  fn from_str(raw: &str) -> Result<Self, ConfigError> {
    match raw {
      "first_fit" => Ok(Policy::FirstFit),
      "best_fit" => Ok(Policy::BestFit),
      "worst_fit" => Ok(Policy::WorstFit),
      _ => Err(ConfigError::UnknownPolicy),
    }
  }
}

/// Switches consulted by the allocator on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
  /// Placement policy for block reuse.
  pub policy: Policy,

  /// When set, fresh payloads are filled with `0xAA` before being handed
  /// out, exposing client reads of uninitialized memory.
  pub scribble: bool,
}

impl Config {
  /// Default configuration: first-fit placement, no scribble.
  pub const fn new() -> Self {
    Config {
      policy: Policy::FirstFit,
      scribble: false,
    }
  }

  /// Reads the configuration from the process environment.
  ///
  /// Unknown policy values log a warning and fall back to
  /// [`Policy::DEFAULT`]; a scribble value that does not parse as an integer
  /// counts as off. Never allocates.
  pub fn from_env() -> Self {
    Self::from_lookups(getenv(ALGORITHM_ENV), getenv(SCRIBBLE_ENV))
  }

  fn from_lookups(
    algorithm: Option<&str>,
    scribble: Option<&str>,
  ) -> Self {
    let policy = match algorithm {
      Some(raw) => raw.parse::<Policy>().unwrap_or_else(|_| {
        warn!(
          "{ALGORITHM_ENV:?}: unrecognized value {raw:?}, using {}",
          Policy::DEFAULT
        );
        Policy::DEFAULT
      }),
      None => Policy::DEFAULT,
    };

    let scribble = scribble
      .and_then(|raw| raw.trim().parse::<i64>().ok())
      .is_some_and(|flag| flag != 0);

    Config { policy, scribble }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self::new()
  }
}

/// Allocation-free environment lookup.
fn getenv(name: &CStr) -> Option<&'static str> {
  // SAFETY: getenv returns either NULL or a NUL-terminated string owned by
  // the environment. The 'static lifetime holds as long as nobody mutates
  // the environment concurrently, which the allocator itself never does.
  let raw = unsafe { libc::getenv(name.as_ptr()) };
  if raw.is_null() {
    return None;
  }
  unsafe { CStr::from_ptr(raw) }.to_str().ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn policy_spellings_round_trip() {
    for policy in [Policy::FirstFit, Policy::BestFit, Policy::WorstFit] {
      assert_eq!(policy.name().parse::<Policy>(), Ok(policy));
    }
    assert_eq!("buddy".parse::<Policy>(), Err(ConfigError::UnknownPolicy));
    assert_eq!("".parse::<Policy>(), Err(ConfigError::UnknownPolicy));
  }

  // The environment itself is never mutated by the test suite (getenv and
  // setenv race across threads); the lookup plumbing is exercised through
  // the parsed-value path instead.
  #[test]
  fn lookups_map_onto_switches() {
    let config = Config::from_lookups(None, None);
    assert_eq!(config.policy, Policy::FirstFit);
    assert!(!config.scribble);

    let config = Config::from_lookups(Some("worst_fit"), Some("1"));
    assert_eq!(config.policy, Policy::WorstFit);
    assert!(config.scribble);

    let config = Config::from_lookups(Some("best_fit"), Some(" 2 "));
    assert_eq!(config.policy, Policy::BestFit);
    assert!(config.scribble);

    // Unknown policies fall back; zero or garbage scribble stays off.
    let config = Config::from_lookups(Some("next_fit"), Some("0"));
    assert_eq!(config.policy, Policy::FirstFit);
    assert!(!config.scribble);
    assert!(!Config::from_lookups(None, Some("not a number")).scribble);
  }
}
