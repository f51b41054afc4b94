//! Change-set execution: authorize, short-circuit, serialize, dispatch,
//! reset-on-success.
//!
//! Managers funnel every dispatch through [`execute`] so the contract lives
//! in exactly one place:
//!
//! 1. The authorization pre-flight runs first; a rejection aborts the whole
//!    batch with no network traffic and no state change.
//! 2. An empty dirty set short-circuits to [`Outcome::Skipped`] — synthetic
//!    success, no round-trip.
//! 3. Otherwise the diff payload is built and handed to the transport.
//! 4. A structurally successful dispatch clears the staged state *here*,
//!    never in per-manager success handlers; a failed one leaves the buffer
//!    intact for inspection and retry.

use std::time::Duration;

use tracing::{debug, warn};

use crate::buffer::PendingChangeBuffer;
use crate::diff::build_payload;
use crate::error::UpdateError;
use crate::fields::FieldDescriptor;
use crate::transport::{RawResponse, Route, Transport};

/// How a dispatch concluded.
#[derive(Debug)]
pub enum Outcome {
    /// Nothing was dirty; the transport was never contacted.
    Skipped,
    /// The diff was dispatched and accepted.
    Applied(RawResponse),
}

impl Outcome {
    pub fn was_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped)
    }
}

/// One pending batch, ready for dispatch.
pub struct ChangeSet<'a> {
    pub route: Route,
    pub descriptors: &'a [FieldDescriptor],
    pub buffer: &'a mut PendingChangeBuffer,
    /// Give up after this long; the transport discards any late response.
    pub deadline: Option<Duration>,
}

/// Run one batch to completion, blocking until the transport answers.
///
/// `authorize` is evaluated fresh at this call, not at manager construction.
/// `live_value` supplies current values for required wire fields.
/// `on_commit` clears any manager-side staged state (overwrite lists,
/// auth secrets) and runs only on success, together with the buffer reset.
pub fn execute<A, L, C>(
    changeset: ChangeSet<'_>,
    transport: &dyn Transport,
    authorize: A,
    live_value: L,
    on_commit: C,
) -> Result<Outcome, UpdateError>
where
    A: FnOnce() -> Result<(), UpdateError>,
    L: FnMut(&FieldDescriptor) -> Option<serde_json::Value>,
    C: FnOnce(),
{
    authorize()?;

    if !changeset.buffer.any() {
        debug!(route = %changeset.route.route_key, "no dirty fields, skipping dispatch");
        return Ok(Outcome::Skipped);
    }

    let payload = build_payload(changeset.descriptors, changeset.buffer, live_value);
    debug!(route = %changeset.route.route_key, "dispatching change set");

    let response = transport
        .dispatch(&changeset.route, Some(&payload), changeset.deadline)
        .map_err(|e| {
            warn!(route = %changeset.route.route_key, error = %e, "dispatch failed, staged edits retained");
            UpdateError::Transport(e)
        })?;

    // Reset-after-success: the single place staged state is cleared.
    changeset.buffer.reset_all();
    on_commit();

    Ok(Outcome::Applied(response))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::StagedValue;
    use crate::fields::{Encoding, FieldKey};
    use crate::permissions::Permissions;
    use crate::transport::TransportError;
    use std::cell::RefCell;

    const NAME: FieldKey = FieldKey::new(0, "name");

    const DESCRIPTORS: [FieldDescriptor; 1] = [FieldDescriptor {
        key: NAME,
        wire_name: "name",
        required: false,
        readback: true,
        validate: FieldDescriptor::accept_any,
        encoding: Encoding::Scalar,
    }];

    /// Records every dispatch; answers with a canned result.
    struct StubTransport {
        calls: RefCell<Vec<serde_json::Value>>,
        fail: bool,
    }

    impl StubTransport {
        fn ok() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                fail: true,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl Transport for StubTransport {
        fn dispatch(
            &self,
            _route: &Route,
            payload: Option<&serde_json::Value>,
            _deadline: Option<Duration>,
        ) -> Result<RawResponse, TransportError> {
            self.calls
                .borrow_mut()
                .push(payload.cloned().unwrap_or(serde_json::Value::Null));
            if self.fail {
                Err(TransportError::Network("boom".into()))
            } else {
                Ok(RawResponse {
                    status: 200,
                    body: b"{}".to_vec(),
                })
            }
        }
    }

    fn no_live(_: &FieldDescriptor) -> Option<serde_json::Value> {
        None
    }

    #[test]
    fn empty_batch_never_contacts_transport() {
        let transport = StubTransport::ok();
        let mut buffer = PendingChangeBuffer::new();
        let outcome = execute(
            ChangeSet {
                route: Route::modify_guild(1),
                descriptors: &DESCRIPTORS,
                buffer: &mut buffer,
                deadline: None,
            },
            &transport,
            || Ok(()),
            no_live,
            || {},
        )
        .unwrap();
        assert!(outcome.was_skipped());
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn auth_rejection_aborts_atomically() {
        let _guard = crate::auth::checks_lock();
        let transport = StubTransport::ok();
        let mut buffer = PendingChangeBuffer::new();
        buffer
            .stage(&DESCRIPTORS[0], StagedValue::Text("X".into()))
            .unwrap();

        let err = execute(
            ChangeSet {
                route: Route::modify_guild(1),
                descriptors: &DESCRIPTORS,
                buffer: &mut buffer,
                deadline: None,
            },
            &transport,
            || Err(UpdateError::InsufficientCapability(Permissions::MANAGE_SERVER)),
            no_live,
            || {},
        )
        .unwrap_err();

        assert!(matches!(err, UpdateError::InsufficientCapability(_)));
        assert_eq!(transport.call_count(), 0);
        // The staged name survives for a retry once the capability is granted.
        assert!(buffer.is_dirty(NAME));

        let outcome = execute(
            ChangeSet {
                route: Route::modify_guild(1),
                descriptors: &DESCRIPTORS,
                buffer: &mut buffer,
                deadline: None,
            },
            &transport,
            || Ok(()),
            no_live,
            || {},
        )
        .unwrap();
        assert!(!outcome.was_skipped());
        assert_eq!(transport.calls.borrow()[0]["name"], "X");
    }

    #[test]
    fn success_resets_and_second_dispatch_is_noop() {
        let transport = StubTransport::ok();
        let mut buffer = PendingChangeBuffer::new();
        buffer
            .stage(&DESCRIPTORS[0], StagedValue::Text("Foo".into()))
            .unwrap();

        let committed = RefCell::new(false);
        execute(
            ChangeSet {
                route: Route::modify_guild(1),
                descriptors: &DESCRIPTORS,
                buffer: &mut buffer,
                deadline: None,
            },
            &transport,
            || Ok(()),
            no_live,
            || *committed.borrow_mut() = true,
        )
        .unwrap();

        assert!(*committed.borrow());
        assert!(!buffer.is_dirty(NAME));

        let outcome = execute(
            ChangeSet {
                route: Route::modify_guild(1),
                descriptors: &DESCRIPTORS,
                buffer: &mut buffer,
                deadline: None,
            },
            &transport,
            || Ok(()),
            no_live,
            || {},
        )
        .unwrap();
        assert!(outcome.was_skipped());
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn transport_failure_keeps_the_buffer() {
        let transport = StubTransport::failing();
        let mut buffer = PendingChangeBuffer::new();
        buffer
            .stage(&DESCRIPTORS[0], StagedValue::Text("Foo".into()))
            .unwrap();

        let err = execute(
            ChangeSet {
                route: Route::modify_guild(1),
                descriptors: &DESCRIPTORS,
                buffer: &mut buffer,
                deadline: None,
            },
            &transport,
            || Ok(()),
            no_live,
            || panic!("commit must not run on failure"),
        )
        .unwrap_err();

        assert!(matches!(err, UpdateError::Transport(_)));
        assert!(buffer.is_dirty(NAME));
    }
}
