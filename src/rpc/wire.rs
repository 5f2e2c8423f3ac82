//! The request/reply envelope codec (§4.1, §4.4, §4.5).
//!
//! Every frame the pipeline hands up carries exactly one envelope: a
//! request `[0, channel_id, request_id, method_id, args]` or a reply
//! `[1, channel_id, request_id, outcome]` where `outcome` is
//! `[0, value]` on success or `[1, [category_index, value]]` on failure.
//! The leading discriminant is what lets one duplex byte stream carry both
//! directions of traffic interleaved, the way the teacher's RPC wire module
//! tags call vs. reply records inside one fragment stream.

use crate::codec::stream::{SliceSource, VecSink};
use crate::codec::{ByteSink, ByteSource, CodecError, StreamContext, Value};
use crate::error::ErrorCode;

use super::client::{ChannelId, RequestId};
use super::server::MethodId;

const KIND_REQUEST: u64 = 0;
const KIND_REPLY: u64 = 1;

const OUTCOME_OK: u64 = 0;
const OUTCOME_ERR: u64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request { channel_id: ChannelId, request_id: RequestId, method_id: MethodId, args: Vec<Value> },
    Reply { channel_id: ChannelId, request_id: RequestId, result: Result<Value, ErrorCode> },
}

pub fn encode_request(
    channel_id: ChannelId,
    request_id: RequestId,
    method_id: MethodId,
    args: Vec<Value>,
) -> Vec<u8> {
    let value = Value::Array(vec![
        Value::UInt(KIND_REQUEST),
        Value::UInt(channel_id),
        Value::UInt(request_id),
        Value::UInt(method_id as u64),
        Value::Array(args),
    ]);
    encode_value(&value)
}

pub fn encode_reply(channel_id: ChannelId, request_id: RequestId, result: Result<Value, ErrorCode>) -> Vec<u8> {
    let outcome = match result {
        Ok(v) => Value::Array(vec![Value::UInt(OUTCOME_OK), v]),
        Err(code) => Value::Array(vec![
            Value::UInt(OUTCOME_ERR),
            Value::Array(vec![Value::UInt(code.category_index as u64), Value::Int(code.value as i64)]),
        ]),
    };
    let value = Value::Array(vec![
        Value::UInt(KIND_REPLY),
        Value::UInt(channel_id),
        Value::UInt(request_id),
        outcome,
    ]);
    encode_value(&value)
}

fn encode_value(value: &Value) -> Vec<u8> {
    let ctx = StreamContext::default();
    let mut sink = VecSink::new();
    // Infallible: `VecSink` never runs out of room.
    value.encode(&mut sink, &ctx).expect("encoding to an in-memory sink cannot fail");
    sink.into_inner()
}

pub fn decode_envelope(payload: &[u8]) -> Result<Envelope, CodecError> {
    let ctx = StreamContext::default();
    let mut src = SliceSource::new(payload);
    let value = Value::decode(&mut src, &ctx)?;
    let fields = match value {
        Value::Array(fields) => fields,
        other => return Err(CodecError::TypeError { expected: "array envelope", found: value_typecode(&other) }),
    };

    let kind = take_uint(&fields, 0)?;
    match kind {
        KIND_REQUEST => {
            let channel_id = take_uint(&fields, 1)?;
            let request_id = take_uint(&fields, 2)?;
            let method_id = take_uint(&fields, 3)? as MethodId;
            let args = match fields.get(4) {
                Some(Value::Array(a)) => a.clone(),
                _ => return Err(CodecError::MemberCountError { expected: 5, actual: fields.len() }),
            };
            Ok(Envelope::Request { channel_id, request_id, method_id, args })
        }
        KIND_REPLY => {
            let channel_id = take_uint(&fields, 1)?;
            let request_id = take_uint(&fields, 2)?;
            let outcome = match fields.get(3) {
                Some(Value::Array(o)) => o,
                _ => return Err(CodecError::MemberCountError { expected: 4, actual: fields.len() }),
            };
            let tag = take_uint(outcome, 0)?;
            let result = match tag {
                OUTCOME_OK => Ok(outcome.get(1).cloned().unwrap_or(Value::Nil)),
                OUTCOME_ERR => {
                    let code_fields = match outcome.get(1) {
                        Some(Value::Array(c)) => c,
                        _ => return Err(CodecError::MemberCountError { expected: 2, actual: outcome.len() }),
                    };
                    let category_index = take_uint(code_fields, 0)? as u32;
                    let value = match code_fields.get(1) {
                        Some(Value::Int(i)) => *i as i32,
                        other => {
                            let found = other.map(value_typecode).unwrap_or(crate::codec::typecode::NIL);
                            return Err(CodecError::TypeError { expected: "int", found });
                        }
                    };
                    Err(ErrorCode::new(category_index, value))
                }
                _ => return Err(CodecError::TypeError { expected: "outcome tag 0 or 1", found: crate::codec::typecode::NIL }),
            };
            Ok(Envelope::Reply { channel_id, request_id, result })
        }
        _ => Err(CodecError::TypeError { expected: "envelope kind 0 or 1", found: crate::codec::typecode::NIL }),
    }
}

fn take_uint(fields: &[Value], idx: usize) -> Result<u64, CodecError> {
    match fields.get(idx) {
        Some(Value::UInt(u)) => Ok(*u),
        Some(other) => Err(CodecError::TypeError { expected: "uint", found: value_typecode(other) }),
        None => Err(CodecError::MemberCountError { expected: idx + 1, actual: fields.len() }),
    }
}

/// A representative typecode byte for a decoded [`Value`], used only to
/// populate [`CodecError::TypeError`]'s diagnostic `found` field when the
/// envelope shape itself (not a raw typecode) is what didn't match.
fn value_typecode(v: &Value) -> u8 {
    use crate::codec::typecode::*;
    match v {
        Value::Nil => NIL,
        Value::Bool(false) => FALSE,
        Value::Bool(true) => TRUE,
        Value::Int(_) => INT64,
        Value::UInt(_) => UINT64,
        Value::Float32(_) => FLOAT32,
        Value::Float64(_) => FLOAT64,
        Value::Str(_) => STR32,
        Value::Bin(_) => BIN32,
        Value::Array(_) => ARRAY32,
        Value::Map(_) => MAP32,
        Value::FixExt(..) => FIXEXT16,
        Value::Ext(..) => EXT32,
        Value::Ptr { .. } => ARRAY32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let bytes = encode_request(3, 7, 2, vec![Value::UInt(1), Value::Str("a".into())]);
        match decode_envelope(&bytes).unwrap() {
            Envelope::Request { channel_id, request_id, method_id, args } => {
                assert_eq!(channel_id, 3);
                assert_eq!(request_id, 7);
                assert_eq!(method_id, 2);
                assert_eq!(args, vec![Value::UInt(1), Value::Str("a".into())]);
            }
            other => panic!("expected a request, got {other:?}"),
        }
    }

    #[test]
    fn successful_reply_round_trips() {
        let bytes = encode_reply(3, 7, Ok(Value::UInt(42)));
        match decode_envelope(&bytes).unwrap() {
            Envelope::Reply { channel_id, request_id, result } => {
                assert_eq!(channel_id, 3);
                assert_eq!(request_id, 7);
                assert_eq!(result.unwrap(), Value::UInt(42));
            }
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[test]
    fn failed_reply_round_trips() {
        let bytes = encode_reply(3, 7, Err(ErrorCode::new(1, 12)));
        match decode_envelope(&bytes).unwrap() {
            Envelope::Reply { result, .. } => {
                let code = result.unwrap_err();
                assert_eq!(code.category_index, 1);
                assert_eq!(code.value, 12);
            }
            other => panic!("expected a reply, got {other:?}"),
        }
    }
}
