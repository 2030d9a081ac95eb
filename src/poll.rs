//! Waiting for a sensor to finish something.
//!
//! Datasheets describe these waits as "check the busy bit until it clears". That is an unbounded
//! loop, and a sensor that has fallen off the bus will keep it spinning forever. [`poll_until`]
//! makes the bound the caller's choice.

use embedded_hal::delay::DelayNs;

use crate::Error;

/// How long [`poll_until`] keeps asking before it gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub enum Deadline {
    /// Keep polling until the condition holds.
    Unbounded,
    /// Give up with [`Error::Timeout`] after this many not-ready answers.
    Polls(u32),
}

/// Call `ready` until it returns `true`, waiting `interval_ms` between attempts.
///
/// The first attempt happens immediately. `ready` gets the delay lent to it, for checks that
/// need one themselves. Errors returned by `ready` end the wait and are passed through unchanged.
pub fn poll_until<D, E>(
    delay: &mut D,
    interval_ms: u32,
    deadline: Deadline,
    mut ready: impl FnMut(&mut D) -> Result<bool, Error<E>>,
) -> Result<(), Error<E>>
where
    D: DelayNs,
{
    let mut not_ready: u32 = 0;
    while !ready(delay)? {
        not_ready = not_ready.saturating_add(1);
        if let Deadline::Polls(limit) = deadline {
            if not_ready >= limit {
                return Err(Error::Timeout);
            }
        }
        delay.delay_ms(interval_ms);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{poll_until, Deadline};
    use crate::Error;
    use embedded_hal_mock::eh1::delay::NoopDelay as MockDelay;

    /// Ready on the first attempt means one call and no waiting.
    #[test]
    fn ready_immediately() {
        let mut calls = 0;
        let mut mock_delay = MockDelay::new();
        let result: Result<(), Error<()>> =
            poll_until(&mut mock_delay, 10, Deadline::Polls(1), |_| {
                calls += 1;
                Ok(true)
            });
        assert_eq!(result, Ok(()));
        assert_eq!(calls, 1);
    }

    /// An unbounded wait keeps going until the condition holds.
    #[test]
    fn unbounded_waits_for_ready() {
        let mut calls = 0;
        let mut mock_delay = MockDelay::new();
        let result: Result<(), Error<()>> =
            poll_until(&mut mock_delay, 10, Deadline::Unbounded, |_| {
                calls += 1;
                Ok(calls == 50)
            });
        assert_eq!(result, Ok(()));
        assert_eq!(calls, 50);
    }

    /// A bounded wait stops after the given number of not-ready answers.
    #[test]
    fn bounded_times_out() {
        let mut calls = 0;
        let mut mock_delay = MockDelay::new();
        let result: Result<(), Error<()>> =
            poll_until(&mut mock_delay, 10, Deadline::Polls(3), |_| {
                calls += 1;
                Ok(false)
            });
        assert_eq!(result, Err(Error::Timeout));
        assert_eq!(calls, 3);
    }

    /// Errors from the condition are not swallowed.
    #[test]
    fn error_propagates() {
        let mut mock_delay = MockDelay::new();
        let result: Result<(), Error<u8>> =
            poll_until(&mut mock_delay, 10, Deadline::Unbounded, |_| Err(Error::Read(7)));
        assert_eq!(result, Err(Error::Read(7)));
    }
}
