//! BER decoder built on `asn1-rs`

use std::ops::Range;

use asn1_rs::{Any, Class, FromBer, Sequence, Tag};
use nom::{Err, IResult};

use crate::proto::{
    CommunityMessage, ErrorStatus, HeaderData, Oid, Pdu, PduType, ScopedPdu, ScopedPduData,
    SnmpMessage, SnmpPdu, TrapV1Pdu, UsmSecurityParams, V3Message, Value, VarBind,
};
use crate::{Error, Result};

/// Decoder-level failures; mapped to `Error::Decode` at the public
/// boundary, where the engine counts them as `snmpInASNParseErrs`.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("invalid message structure")]
    InvalidMessage,
    #[error("unsupported protocol version")]
    InvalidVersion,
    #[error("unknown or invalid PDU type")]
    InvalidPduType,
    #[error("invalid PDU contents")]
    InvalidPdu,
    #[error("invalid value encoding")]
    InvalidValue,
    #[error("invalid v3 header data")]
    InvalidHeaderData,
    #[error("invalid scoped PDU")]
    InvalidScopedPdu,
    #[error("invalid USM security parameters")]
    InvalidSecurityParams,
    #[error("BER error: {0}")]
    Ber(#[from] asn1_rs::Error),
    #[error("incomplete or malformed data")]
    Incomplete,
}

impl<I> nom::error::ParseError<I> for CodecError {
    fn from_error_kind(_input: I, _kind: nom::error::ErrorKind) -> Self {
        CodecError::Incomplete
    }

    fn append(_input: I, _kind: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}

type ParseResult<'a, T> = IResult<&'a [u8], T, CodecError>;

fn ber_any(i: &[u8]) -> ParseResult<Any> {
    Any::from_ber(i).map_err(Err::convert)
}

fn ber_octets(i: &[u8]) -> ParseResult<&[u8]> {
    <&[u8]>::from_ber(i).map_err(Err::convert)
}

fn ber_u32(i: &[u8]) -> ParseResult<u32> {
    u32::from_ber(i).map_err(Err::convert)
}

fn ber_i32(i: &[u8]) -> ParseResult<i32> {
    i32::from_ber(i).map_err(Err::convert)
}

fn decode_i32_content(data: &[u8]) -> std::result::Result<i32, CodecError> {
    if data.is_empty() || data.len() > 4 {
        return Err(CodecError::InvalidValue);
    }
    let mut v: i32 = if data[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in data {
        v = (v << 8) | b as i32;
    }
    Ok(v)
}

fn decode_u32_content(data: &[u8]) -> std::result::Result<u32, CodecError> {
    if data.is_empty() || data.len() > 5 || (data.len() == 5 && data[0] != 0) {
        return Err(CodecError::InvalidValue);
    }
    if data[0] & 0x80 != 0 {
        return Err(CodecError::InvalidValue);
    }
    let mut v: u64 = 0;
    for &b in data {
        v = (v << 8) | b as u64;
    }
    u32::try_from(v).map_err(|_| CodecError::InvalidValue)
}

fn decode_u64_content(data: &[u8]) -> std::result::Result<u64, CodecError> {
    if data.is_empty() || data.len() > 9 || (data.len() == 9 && data[0] != 0) {
        return Err(CodecError::InvalidValue);
    }
    if data[0] & 0x80 != 0 && data.len() == 9 {
        return Err(CodecError::InvalidValue);
    }
    let mut v: u64 = 0;
    for &b in data {
        v = v.checked_shl(8).ok_or(CodecError::InvalidValue)? | b as u64;
    }
    Ok(v)
}

fn decode_oid_content(data: &[u8]) -> std::result::Result<Oid, CodecError> {
    if data.is_empty() {
        return Err(CodecError::InvalidValue);
    }
    let mut subids = Vec::new();
    let mut cur: u64 = 0;
    let mut in_progress = false;
    for &b in data {
        cur = (cur << 7) | (b & 0x7f) as u64;
        if cur > u32::MAX as u64 {
            return Err(CodecError::InvalidValue);
        }
        if b & 0x80 == 0 {
            if subids.is_empty() {
                // first octet packs the two leading arcs
                let first = cur as u32;
                let (a, b2) = match first {
                    0..=39 => (0, first),
                    40..=79 => (1, first - 40),
                    _ => (2, first - 80),
                };
                subids.push(a);
                subids.push(b2);
            } else {
                subids.push(cur as u32);
            }
            cur = 0;
            in_progress = false;
        } else {
            in_progress = true;
        }
    }
    if in_progress {
        return Err(CodecError::InvalidValue);
    }
    Ok(Oid::new(subids))
}

fn parse_oid(i: &[u8]) -> ParseResult<Oid> {
    let (rem, any) = ber_any(i)?;
    if any.class() != Class::Universal || any.tag() != Tag::Oid {
        return Err(Err::Error(CodecError::InvalidValue));
    }
    let oid = decode_oid_content(any.data).map_err(Err::Error)?;
    Ok((rem, oid))
}

fn parse_value(i: &[u8]) -> ParseResult<Value> {
    let (rem, any) = ber_any(i)?;
    let value = match (any.class(), any.tag().0) {
        (Class::Universal, 2) => Value::Integer(decode_i32_content(any.data).map_err(Err::Error)?),
        (Class::Universal, 4) => Value::OctetString(any.data.to_vec()),
        (Class::Universal, 5) => Value::Null,
        (Class::Universal, 6) => {
            Value::ObjectIdentifier(decode_oid_content(any.data).map_err(Err::Error)?)
        }
        (Class::Application, 0) => {
            let addr: [u8; 4] = any
                .data
                .try_into()
                .map_err(|_| Err::Error(CodecError::InvalidValue))?;
            Value::IpAddress(addr)
        }
        (Class::Application, 1) => {
            Value::Counter32(decode_u32_content(any.data).map_err(Err::Error)?)
        }
        (Class::Application, 2) => {
            Value::Gauge32(decode_u32_content(any.data).map_err(Err::Error)?)
        }
        (Class::Application, 3) => {
            Value::TimeTicks(decode_u32_content(any.data).map_err(Err::Error)?)
        }
        (Class::Application, 4) => Value::Opaque(any.data.to_vec()),
        (Class::Application, 6) => {
            Value::Counter64(decode_u64_content(any.data).map_err(Err::Error)?)
        }
        (Class::ContextSpecific, 0) => Value::NoSuchObject,
        (Class::ContextSpecific, 1) => Value::NoSuchInstance,
        (Class::ContextSpecific, 2) => Value::EndOfMibView,
        _ => return Err(Err::Error(CodecError::InvalidValue)),
    };
    Ok((rem, value))
}

fn parse_var_bind(i: &[u8]) -> ParseResult<VarBind> {
    let (rem, any) = ber_any(i)?;
    if any.tag() != Tag::Sequence {
        return Err(Err::Error(CodecError::InvalidPdu));
    }
    let (j, name) = parse_oid(any.data)?;
    let (_, value) = parse_value(j)?;
    Ok((rem, VarBind { name, value }))
}

fn parse_var_bind_list(i: &[u8]) -> ParseResult<Vec<VarBind>> {
    let (rem, any) = ber_any(i)?;
    if any.tag() != Tag::Sequence {
        return Err(Err::Error(CodecError::InvalidPdu));
    }
    let mut content = any.data;
    let mut out = Vec::new();
    while !content.is_empty() {
        let (rest, vb) = parse_var_bind(content)?;
        out.push(vb);
        content = rest;
    }
    Ok((rem, out))
}

fn parse_generic_pdu_content(i: &[u8], pdu_type: PduType) -> std::result::Result<Pdu, Err<CodecError>> {
    let (i, request_id) = ber_i32(i)?;
    let (i, field1) = ber_i32(i)?;
    let (i, field2) = ber_i32(i)?;
    let (_, var_binds) = parse_var_bind_list(i)?;

    let mut pdu = Pdu::new(pdu_type, request_id, var_binds);
    if pdu_type == PduType::GetBulkRequest {
        // negative wire values are clamped (RFC 3416 §4.2.3)
        pdu.non_repeaters = field1.max(0) as u32;
        pdu.max_repetitions = field2.max(0) as u32;
    } else {
        pdu.error_status =
            ErrorStatus::from_i32(field1).ok_or(Err::Error(CodecError::InvalidPdu))?;
        pdu.error_index = field2.max(0) as u32;
    }
    Ok(pdu)
}

fn parse_trap_v1_content(i: &[u8]) -> std::result::Result<TrapV1Pdu, Err<CodecError>> {
    let (i, enterprise) = parse_oid(i)?;
    let (i, addr_any) = ber_any(i)?;
    if addr_any.class() != Class::Application || addr_any.tag().0 != 0 {
        return Err(Err::Error(CodecError::InvalidPdu));
    }
    let agent_addr: [u8; 4] = addr_any
        .data
        .try_into()
        .map_err(|_| Err::Error(CodecError::InvalidPdu))?;
    let (i, generic_trap) = ber_i32(i)?;
    let (i, specific_trap) = ber_i32(i)?;
    let (i, ts_any) = ber_any(i)?;
    let timestamp = decode_u32_content(ts_any.data).map_err(Err::Error)?;
    let (_, var_binds) = parse_var_bind_list(i)?;
    Ok(TrapV1Pdu {
        enterprise,
        agent_addr,
        generic_trap,
        specific_trap,
        timestamp,
        var_binds,
    })
}

fn parse_snmp_pdu(i: &[u8]) -> ParseResult<SnmpPdu> {
    let (rem, any) = ber_any(i)?;
    if any.class() != Class::ContextSpecific {
        return Err(Err::Error(CodecError::InvalidPduType));
    }
    let pdu_type = u8::try_from(any.tag().0)
        .ok()
        .and_then(PduType::from_u8)
        .ok_or(Err::Error(CodecError::InvalidPduType))?;
    let pdu = match pdu_type {
        PduType::TrapV1 => SnmpPdu::TrapV1(parse_trap_v1_content(any.data)?),
        _ => SnmpPdu::Generic(parse_generic_pdu_content(any.data, pdu_type)?),
    };
    Ok((rem, pdu))
}

fn parse_community_content(i: &[u8], version: u32) -> ParseResult<CommunityMessage> {
    let (i, community) = ber_octets(i)?;
    let (rem, pdu) = parse_snmp_pdu(i)?;
    Ok((
        rem,
        CommunityMessage {
            version,
            community: community.to_vec(),
            pdu,
        },
    ))
}

fn parse_header_data(i: &[u8]) -> ParseResult<HeaderData> {
    Sequence::from_ber_and_then(i, |i| {
        let (i, msg_id) = ber_u32(i)?;
        let (i, msg_max_size) = ber_u32(i)?;
        let (i, flags) = ber_octets(i)?;
        if flags.len() != 1 {
            return Err(Err::Error(CodecError::InvalidHeaderData));
        }
        let (i, security_model) = ber_u32(i)?;
        Ok((
            i,
            HeaderData {
                msg_id,
                msg_max_size,
                msg_flags: flags[0],
                security_model,
            },
        ))
    })
}

fn parse_scoped_pdu(i: &[u8]) -> ParseResult<ScopedPdu> {
    Sequence::from_ber_and_then(i, |i| {
        let (i, context_engine_id) = ber_octets(i)?;
        let (i, context_name) = ber_octets(i)?;
        let (i, pdu) = parse_snmp_pdu(i)?;
        let pdu = match pdu {
            SnmpPdu::Generic(pdu) => pdu,
            SnmpPdu::TrapV1(_) => return Err(Err::Error(CodecError::InvalidScopedPdu)),
        };
        Ok((
            i,
            ScopedPdu {
                context_engine_id: context_engine_id.to_vec(),
                context_name: context_name.to_vec(),
                pdu,
            },
        ))
    })
}

fn parse_v3_content(i: &[u8]) -> ParseResult<V3Message> {
    let (i, header) = parse_header_data(i)?;
    let (i, security_params) = ber_octets(i)?;
    let (rem, data) = if header.is_encrypted() {
        let (rem, octets) = ber_octets(i)?;
        (rem, ScopedPduData::Encrypted(octets.to_vec()))
    } else {
        let (rem, scoped) = parse_scoped_pdu(i)?;
        (rem, ScopedPduData::Plaintext(scoped))
    };
    Ok((
        rem,
        V3Message {
            header,
            security_params: security_params.to_vec(),
            data,
        },
    ))
}

fn parse_message(i: &[u8]) -> ParseResult<SnmpMessage> {
    let (rem, any) = ber_any(i)?;
    if any.tag() != Tag::Sequence {
        return Err(Err::Error(CodecError::InvalidMessage));
    }
    let (r, version) = ber_u32(any.data)?;
    let msg = match version {
        0 | 1 => {
            let (_, msg) = parse_community_content(r, version)?;
            SnmpMessage::Community(msg)
        }
        3 => {
            let (_, msg) = parse_v3_content(r)?;
            SnmpMessage::V3(Box::new(msg))
        }
        _ => return Err(Err::Error(CodecError::InvalidVersion)),
    };
    Ok((rem, msg))
}

/// Decode one whole inbound message.
pub fn decode_message(octets: &[u8]) -> Result<SnmpMessage> {
    match parse_message(octets) {
        Ok((_, msg)) => Ok(msg),
        Err(e) => Err(Error::decode(e.to_string())),
    }
}

/// Decode a plaintext scoped PDU, e.g. after decryption.
pub fn decode_scoped_pdu(octets: &[u8]) -> Result<ScopedPdu> {
    match parse_scoped_pdu(octets) {
        Ok((_, scoped)) => Ok(scoped),
        Err(e) => Err(Error::decode(e.to_string())),
    }
}

fn parse_usm_security_params(i: &[u8]) -> ParseResult<UsmSecurityParams> {
    Sequence::from_ber_and_then(i, |i| {
        let (i, engine_id) = ber_octets(i)?;
        let (i, boots) = ber_u32(i)?;
        let (i, time) = ber_u32(i)?;
        let (i, user_name) = ber_octets(i)?;
        let (i, auth_params) = ber_octets(i)?;
        let (i, priv_params) = ber_octets(i)?;
        Ok((
            i,
            UsmSecurityParams {
                authoritative_engine_id: engine_id.to_vec(),
                authoritative_engine_boots: boots,
                authoritative_engine_time: time,
                user_name: user_name.to_vec(),
                auth_params: auth_params.to_vec(),
                priv_params: priv_params.to_vec(),
            },
        ))
    })
}

/// Decode the octets carried in msgSecurityParameters under USM.
pub fn decode_usm_security_params(octets: &[u8]) -> Result<UsmSecurityParams> {
    match parse_usm_security_params(octets) {
        Ok((_, params)) => Ok(params),
        Err(e) => Err(Error::decode(e.to_string())),
    }
}

/// Locate the msgAuthenticationParameters value inside a whole v3
/// message, as a byte range into `msg`. HMAC computation needs those
/// bytes zeroed in place (RFC 3414 §6.3.1).
pub fn locate_usm_auth_params(msg: &[u8]) -> Result<Range<usize>> {
    fn walk(msg: &[u8]) -> std::result::Result<Range<usize>, Err<CodecError>> {
        let base = msg.as_ptr() as usize;
        let (_, any) = ber_any(msg)?;
        if any.tag() != Tag::Sequence {
            return Err(Err::Error(CodecError::InvalidMessage));
        }
        let (i, _version) = ber_u32(any.data)?;
        let (i, _header) = ber_any(i)?;
        let (_, sp) = ber_octets(i)?;
        let (_, sp_any) = ber_any(sp)?;
        if sp_any.tag() != Tag::Sequence {
            return Err(Err::Error(CodecError::InvalidSecurityParams));
        }
        let (j, _engine_id) = ber_octets(sp_any.data)?;
        let (j, _boots) = ber_u32(j)?;
        let (j, _time) = ber_u32(j)?;
        let (j, _user) = ber_octets(j)?;
        let (_, auth_params) = ber_octets(j)?;
        let start = auth_params.as_ptr() as usize - base;
        Ok(start..start + auth_params.len())
    }
    walk(msg).map_err(|e| Error::decode(e.to_string()))
}
