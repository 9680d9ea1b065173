//! ## nfproxy-pipeline::dispatch
//! **Packet dispatcher**
//!
//! Evaluates a [`Pipeline`] against one packet of one connection and returns
//! exactly one [`Decision`]. Derived values are memoized in the context's
//! per-packet cache so each extractor runs at most once per dispatch, and the
//! first handler to return a terminal action ends the dispatch.
//!
//! Before any handler runs, every reconstruction buffer the pipeline reads is
//! fed the packet. A handler skipped for missing data therefore never costs a
//! buffer its bytes. When an extractor completes several values with one
//! packet (two lines, two pipelined requests), the handler runs once per
//! value, in stream order.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use nfproxy_core::action::Action;
use nfproxy_core::context::{Cached, StreamContext};
use nfproxy_core::datatype::{DataType, DataValue};
use nfproxy_core::decision::Decision;
use nfproxy_core::error::DispatchError;
use nfproxy_core::extract::{Extracted, TerminalCause};
use nfproxy_core::packet::RawPacket;
use tracing::trace;

use crate::builder::{FilterHandler, Pipeline};
use crate::filter::{FilterCall, FilterReturn};

/// Outcome of resolving one handler's parameters.
enum Resolved {
    /// Candidate values per parameter, in declaration order.
    Ready(Vec<Vec<DataValue>>),
    Skip,
    Stop(Decision),
}

/// Outcome of invoking one handler.
enum Verdict {
    Continue,
    Stop(Decision),
}

pub fn dispatch(
    pipeline: &Pipeline,
    ctx: &mut StreamContext,
    packet: RawPacket,
) -> Result<Decision, DispatchError> {
    ctx.begin_packet(packet);
    feed(pipeline, ctx)?;

    for handler in pipeline.handlers() {
        let candidates = match resolve(handler, ctx)? {
            Resolved::Ready(candidates) => candidates,
            Resolved::Skip => {
                trace!(handler = handler.name(), "data not ready, handler skipped");
                continue;
            }
            Resolved::Stop(decision) => return Ok(decision),
        };

        match invoke(handler, ctx, &candidates)? {
            Verdict::Continue => {}
            Verdict::Stop(decision) => {
                trace!(handler = handler.name(), action = %decision.action, "terminal decision");
                return Ok(decision);
            }
        }
    }

    Ok(Decision::accept())
}

fn feed(pipeline: &Pipeline, ctx: &mut StreamContext) -> Result<(), DispatchError> {
    for buffer in pipeline.feeds() {
        let ingest = buffer.ingest;
        panic::catch_unwind(AssertUnwindSafe(|| ingest(ctx))).map_err(|payload| {
            let reason = format!("buffer feed for {} panicked: {}", buffer.tag, panic_message(&payload));
            invalid(&buffer.owner, reason)
        })?;
    }
    Ok(())
}

fn resolve(handler: &FilterHandler, ctx: &mut StreamContext) -> Result<Resolved, DispatchError> {
    let mut candidates = Vec::with_capacity(handler.params().len());

    for param in handler.params() {
        if let Cached::Missing = ctx.cache().lookup(param.tag) {
            let extractor = param.extractor;
            let extracted = panic::catch_unwind(AssertUnwindSafe(|| extractor(ctx))).map_err(
                |payload| {
                    let reason = format!("extractor for {} panicked: {}", param.tag, panic_message(&payload));
                    invalid(handler.name(), reason)
                },
            )?;

            match extracted {
                Extracted::Value(value) => ctx.cache_mut().insert(param.tag, value),
                Extracted::Values(values) => ctx.cache_mut().insert_all(param.tag, values),
                Extracted::NotReady => ctx.cache_mut().mark_unavailable(param.tag),
                Extracted::Terminal(terminal) => {
                    let action = Action::from(terminal.action);
                    let decision = match terminal.cause {
                        TerminalCause::StreamFull => Decision::stream_full(action),
                        TerminalCause::Protocol => Decision::block(action, handler.name()),
                    };
                    trace!(handler = handler.name(), tag = %param.tag, cause = ?terminal.cause, "extractor ended dispatch");
                    return Ok(Resolved::Stop(decision));
                }
            }
        }

        match ctx.cache().lookup(param.tag) {
            Cached::Values(values) => candidates.push(values.to_vec()),
            Cached::Unavailable | Cached::Missing => return Ok(Resolved::Skip),
        }
    }

    Ok(Resolved::Ready(candidates))
}

/// Calls the handler once per combination of candidate values. `RawPacket`
/// arguments always carry the packet as left by the previous call.
fn invoke(
    handler: &FilterHandler,
    ctx: &mut StreamContext,
    candidates: &[Vec<DataValue>],
) -> Result<Verdict, DispatchError> {
    let mut position = vec![0usize; candidates.len()];
    loop {
        let args = handler
            .params()
            .iter()
            .zip(candidates)
            .zip(&position)
            .map(|((param, values), &i)| match param.tag {
                DataType::RawPacket => DataValue::Packet(ctx.packet().clone()),
                _ => values[i].clone(),
            })
            .collect();

        if let Verdict::Stop(decision) = call(handler, ctx, args)? {
            return Ok(Verdict::Stop(decision));
        }
        if !advance(&mut position, candidates) {
            return Ok(Verdict::Continue);
        }
    }
}

/// Steps `position` to the next combination, last parameter fastest.
/// Returns false once every combination has been visited.
fn advance(position: &mut [usize], candidates: &[Vec<DataValue>]) -> bool {
    for (slot, values) in position.iter_mut().zip(candidates).rev() {
        *slot += 1;
        if *slot < values.len() {
            return true;
        }
        *slot = 0;
    }
    false
}

fn call(
    handler: &FilterHandler,
    ctx: &mut StreamContext,
    args: Vec<DataValue>,
) -> Result<Verdict, DispatchError> {
    let filter = handler.filter();
    let outcome = {
        let mut call = FilterCall::new(args, ctx.packet_mut());
        panic::catch_unwind(AssertUnwindSafe(|| filter.call(&mut call)))
    };

    let returned = match outcome {
        Ok(Ok(returned)) => returned,
        Ok(Err(err)) => return Err(invalid(handler.name(), err.0)),
        Err(payload) => {
            return Err(invalid(handler.name(), format!("panicked: {}", panic_message(&payload))))
        }
    };

    match returned {
        FilterReturn::Nothing | FilterReturn::Action(Action::Accept) => {
            trace!(handler = handler.name(), "accepted");
            ctx.refresh_packet();
            Ok(Verdict::Continue)
        }
        FilterReturn::Action(action @ (Action::Drop | Action::Reject)) => {
            Ok(Verdict::Stop(Decision::block(action, handler.name())))
        }
        FilterReturn::Action(Action::Mangle) => Ok(Verdict::Stop(Decision::mangle(
            handler.name(),
            ctx.packet().raw().clone(),
        ))),
        FilterReturn::Other(description) => Err(invalid(
            handler.name(),
            format!("expected an action, got {description}"),
        )),
    }
}

fn invalid(handler: &str, reason: String) -> DispatchError {
    DispatchError::InvalidFilterResult {
        handler: handler.to_string(),
        reason,
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
