use std::time::Duration;

/// Throttle and debounce windows for one request slot.
///
/// - `throttle`: fire immediately when the slot has not fired within this
///   window (bounds the request rate during continuous interaction).
/// - `debounce`: fire once with the latest parameters after this much quiet
///   time (guarantees a final, accurate request once interaction settles).
///
/// With neither set, every schedule fires immediately.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct GateTiming {
    pub throttle: Option<Duration>,
    pub debounce: Option<Duration>,
}

impl GateTiming {
    pub const fn immediate() -> Self {
        Self {
            throttle: None,
            debounce: None,
        }
    }

    pub const fn debounced(window: Duration) -> Self {
        Self {
            throttle: None,
            debounce: Some(window),
        }
    }

    pub const fn throttled_and_debounced(throttle: Duration, debounce: Duration) -> Self {
        Self {
            throttle: Some(throttle),
            debounce: Some(debounce),
        }
    }

    pub const fn is_immediate(&self) -> bool {
        self.throttle.is_none() && self.debounce.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimingError {
    ZeroThrottle,
    /// A debounce window is shorter than one it must not undercut.
    Ordering {
        longer: &'static str,
        shorter: &'static str,
    },
}

impl std::fmt::Display for TimingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimingError::ZeroThrottle => write!(f, "base throttle window must be non-zero"),
            TimingError::Ordering { longer, shorter } => {
                write!(f, "{longer} must be at least as long as {shorter}")
            }
        }
    }
}

impl std::error::Error for TimingError {}

/// Every tunable window of the engine.
///
/// The exact values are configuration; the relative ordering
/// `url_sync_debounce >= query_debounce >= base_debounce` is not, and
/// [`EngineTiming::validate`] enforces it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EngineTiming {
    pub base_throttle: Duration,
    pub base_debounce: Duration,
    /// Connectivity overlays and name completion.
    pub query_debounce: Duration,
    pub url_sync_debounce: Duration,
    pub fly_to_transition: Duration,
    pub fly_to_zoom: f64,
}

impl Default for EngineTiming {
    fn default() -> Self {
        Self {
            base_throttle: Duration::from_millis(2000),
            base_debounce: Duration::from_millis(100),
            query_debounce: Duration::from_millis(300),
            url_sync_debounce: Duration::from_millis(750),
            fly_to_transition: Duration::from_millis(2000),
            fly_to_zoom: 16.0,
        }
    }
}

impl EngineTiming {
    pub fn validate(&self) -> Result<(), TimingError> {
        if self.base_throttle.is_zero() {
            return Err(TimingError::ZeroThrottle);
        }
        if self.url_sync_debounce < self.query_debounce {
            return Err(TimingError::Ordering {
                longer: "url_sync_debounce",
                shorter: "query_debounce",
            });
        }
        if self.query_debounce < self.base_debounce {
            return Err(TimingError::Ordering {
                longer: "query_debounce",
                shorter: "base_debounce",
            });
        }
        Ok(())
    }

    pub fn base_data(&self) -> GateTiming {
        GateTiming::throttled_and_debounced(self.base_throttle, self.base_debounce)
    }

    pub fn query(&self) -> GateTiming {
        GateTiming::debounced(self.query_debounce)
    }

    pub fn url_sync(&self) -> GateTiming {
        GateTiming::debounced(self.url_sync_debounce)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{EngineTiming, TimingError};

    #[test]
    fn defaults_are_valid() {
        assert_eq!(EngineTiming::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_url_sync_shorter_than_query() {
        let t = EngineTiming {
            url_sync_debounce: Duration::from_millis(200),
            ..EngineTiming::default()
        };
        assert_eq!(
            t.validate(),
            Err(TimingError::Ordering {
                longer: "url_sync_debounce",
                shorter: "query_debounce",
            })
        );
    }

    #[test]
    fn rejects_query_shorter_than_base() {
        let t = EngineTiming {
            base_debounce: Duration::from_millis(400),
            ..EngineTiming::default()
        };
        assert!(matches!(t.validate(), Err(TimingError::Ordering { .. })));
    }

    #[test]
    fn rejects_zero_throttle() {
        let t = EngineTiming {
            base_throttle: Duration::ZERO,
            ..EngineTiming::default()
        };
        assert_eq!(t.validate(), Err(TimingError::ZeroThrottle));
    }
}
