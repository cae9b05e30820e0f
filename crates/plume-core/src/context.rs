//! Per-inbound-packet request context and handler chain.
//!
//! A [`Context`] is short-lived and single-use: it is built right before the
//! handler chain runs, is owned by exactly one execution path, and must not
//! outlive the request it represents. Handlers run strictly sequentially and
//! advance the chain cooperatively by calling [`Context::next`]; a handler
//! that does not call it halts the chain, which is the intended escape hatch
//! for authorization/validation failures.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::bodies::ErrorResponse;
use crate::dispatcher::Dispatcher;
use crate::error::PlumeResult;
use crate::location::Location;
use crate::packet::{Flag, Header, Packet, Status, META_DEST_SERVER};
use crate::session::{Session, TAG_AUTO_GENERATED};

/// One step of the packet-processing pipeline.
pub type HandlerFunc = Arc<dyn Fn(&mut Context) + Send + Sync>;

/// Execution object for one inbound packet: the packet, its lazily resolved
/// session, the handler chain and a cursor into it, plus reply/fan-out
/// helpers backed by a [`Dispatcher`].
pub struct Context {
    dispatcher: Arc<dyn Dispatcher>,
    handlers: Vec<HandlerFunc>,
    index: usize,
    request: Packet,
    session: Option<Session>,
}

impl Context {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, request: Packet, handlers: Vec<HandlerFunc>) -> Self {
        Self {
            dispatcher,
            handlers,
            index: 0,
            request,
            session: None,
        }
    }

    /// Attach the session resolved by the gateway. When absent, [`session`]
    /// synthesizes one on first use.
    ///
    /// [`session`]: Context::session
    pub fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    /// Rebind a pooled context to a fresh request, clearing all per-request
    /// state (cursor, chain, cached session).
    pub fn rebind(&mut self, request: Packet, handlers: Vec<HandlerFunc>) {
        self.request = request;
        self.handlers = handlers;
        self.index = 0;
        self.session = None;
    }

    /// Advance the chain by one position: invoke the handler at the cursor,
    /// moving the cursor past it first so a nested `next()` continues at the
    /// following entry. Calling past the chain end is a safe no-op.
    pub fn next(&mut self) {
        if self.index >= self.handlers.len() {
            return;
        }
        let handler = self.handlers[self.index].clone();
        self.index += 1;
        handler(self);
    }

    pub fn header(&self) -> &Header {
        &self.request.header
    }

    /// Decode the request body into a typed message; errors are propagated
    /// verbatim from the codec.
    pub fn read_body<T: serde::de::DeserializeOwned>(&self) -> PlumeResult<T> {
        self.request.read_body()
    }

    /// The session behind the request, resolved lazily exactly once.
    ///
    /// If the packet carried no session, one is synthesized from its channel
    /// id and the `dest_server` meta entry, tagged [`TAG_AUTO_GENERATED`].
    /// Repeat calls return the identical cached value.
    pub fn session(&mut self) -> &Session {
        let request = &self.request;
        self.session.get_or_insert_with(|| {
            let gate_id = request
                .get_meta(META_DEST_SERVER)
                .unwrap_or_default()
                .to_string();
            let mut session = Session::new(String::new(), gate_id, request.channel_id.clone());
            session.tags.push(TAG_AUTO_GENERATED.to_string());
            session
        })
    }

    /// Unicast reply to the request's origin: exactly one destination, the
    /// session's `{gate_id, channel_id}`. The dispatcher error is returned
    /// unchanged.
    pub fn resp<T: Serialize>(&mut self, status: Status, body: &T) -> PlumeResult<()> {
        let mut packet = Packet::new_from(&self.request.header);
        packet.header.status = status;
        packet.header.flag = Flag::Response;
        packet.write_body(body)?;

        let origin = self.session().location();
        debug!(
            command = %packet.header.command,
            sequence = packet.header.sequence,
            status = ?status,
            gate = %origin.gate_id,
            channel = %origin.channel_id,
            "sending response"
        );
        self.dispatcher
            .push(&origin.gate_id, &[origin.channel_id], &packet)
    }

    /// Convenience reply wrapping an error's display into a generic
    /// [`ErrorResponse`] body.
    pub fn resp_with_error(
        &mut self,
        status: Status,
        err: impl std::fmt::Display,
    ) -> PlumeResult<()> {
        self.resp(
            status,
            &ErrorResponse {
                message: err.to_string(),
            },
        )
    }

    /// Fan a Push packet out to an arbitrary recipient set, grouped by
    /// gateway.
    ///
    /// No-op on an empty set. Recipients whose channel id equals the current
    /// session's channel id are skipped, so a sender never receives its own
    /// broadcast echo. Remaining recipients are partitioned by gate id (group
    /// order unspecified; in-group order follows input order, duplicates
    /// preserved) and each distinct gateway gets exactly one dispatcher call.
    ///
    /// Fail-fast: the first per-gateway failure aborts the remaining groups
    /// and is returned immediately. Callers must treat the error as
    /// "delivery status unknown for not-yet-attempted groups"; see
    /// [`dispatch_all`] for the strict alternative.
    ///
    /// [`dispatch_all`]: Context::dispatch_all
    pub fn dispatch<T: Serialize>(&mut self, body: &T, recipients: &[Location]) -> PlumeResult<()> {
        let Some((packet, groups)) = self.prepare_push(body, recipients)? else {
            return Ok(());
        };
        for (gate_id, channel_ids) in &groups {
            if let Err(err) = self.dispatcher.push(gate_id, channel_ids, &packet) {
                error!(gate = %gate_id, error = %err, "push failed, aborting remaining groups");
                return Err(err);
            }
        }
        Ok(())
    }

    /// Strict variant of [`dispatch`]: every group is attempted and all
    /// per-gateway failures are reported in a single error. Delivery still
    /// has no ordering guarantee across gateways.
    ///
    /// [`dispatch`]: Context::dispatch
    pub fn dispatch_all<T: Serialize>(
        &mut self,
        body: &T,
        recipients: &[Location],
    ) -> PlumeResult<()> {
        let Some((packet, groups)) = self.prepare_push(body, recipients)? else {
            return Ok(());
        };
        let mut failures = Vec::new();
        for (gate_id, channel_ids) in &groups {
            if let Err(err) = self.dispatcher.push(gate_id, channel_ids, &packet) {
                warn!(gate = %gate_id, error = %err, "push failed, continuing with remaining groups");
                failures.push(format!("{gate_id}: {err}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(crate::PlumeError::Dispatch(failures.join("; ")))
        }
    }

    /// Build the Push packet and the per-gateway recipient groups.
    /// Returns `None` when there is nothing to send.
    fn prepare_push<T: Serialize>(
        &mut self,
        body: &T,
        recipients: &[Location],
    ) -> PlumeResult<Option<(Packet, HashMap<String, Vec<String>>)>> {
        if recipients.is_empty() {
            return Ok(None);
        }
        let mut packet = Packet::new_from(&self.request.header);
        packet.header.flag = Flag::Push;
        packet.write_body(body)?;

        let own_channel = self.session().channel_id.clone();
        let mut groups: HashMap<String, Vec<String>> = HashMap::new();
        for recv in recipients {
            if recv.channel_id == own_channel {
                continue;
            }
            groups
                .entry(recv.gate_id.clone())
                .or_default()
                .push(recv.channel_id.clone());
        }
        debug!(
            recipients = recipients.len(),
            gateways = groups.len(),
            command = %packet.header.command,
            "dispatching push"
        );
        Ok(Some((packet, groups)))
    }
}
