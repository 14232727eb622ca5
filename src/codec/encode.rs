//! Definite-length BER writer

use crate::proto::{
    CommunityMessage, Oid, Pdu, PduType, ScopedPdu, ScopedPduData, SnmpPdu, TrapV1Pdu,
    UsmSecurityParams, V3Message, Value,
};
use crate::{Error, Result};

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_IP_ADDRESS: u8 = 0x40;
const TAG_COUNTER32: u8 = 0x41;
const TAG_GAUGE32: u8 = 0x42;
const TAG_TIMETICKS: u8 = 0x43;
const TAG_OPAQUE: u8 = 0x44;
const TAG_COUNTER64: u8 = 0x46;
const TAG_NO_SUCH_OBJECT: u8 = 0x80;
const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
const TAG_END_OF_MIB_VIEW: u8 = 0x82;
const TAG_CONTEXT_CONSTRUCTED: u8 = 0xa0;

fn length_octets(len: usize) -> usize {
    if len < 0x80 {
        1
    } else {
        let mut n = 0;
        let mut l = len;
        while l > 0 {
            n += 1;
            l >>= 8;
        }
        1 + n
    }
}

/// Tag byte plus length octets preceding a value of `content_len` bytes.
fn header_octets(content_len: usize) -> usize {
    1 + length_octets(content_len)
}

fn push_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let mut n = 0;
        let mut l = len;
        while l > 0 {
            n += 1;
            l >>= 8;
        }
        out.push(0x80 | n as u8);
        for i in (0..n).rev() {
            out.push((len >> (8 * i)) as u8);
        }
    }
}

fn push_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    push_length(out, content.len());
    out.extend_from_slice(content);
}

/// Minimal two's-complement big-endian representation.
fn int_content(v: i64) -> Vec<u8> {
    let mut bytes = v.to_be_bytes().to_vec();
    while bytes.len() > 1 {
        let redundant = (bytes[0] == 0x00 && bytes[1] & 0x80 == 0)
            || (bytes[0] == 0xff && bytes[1] & 0x80 != 0);
        if redundant {
            bytes.remove(0);
        } else {
            break;
        }
    }
    bytes
}

/// Minimal non-negative representation with a leading zero octet when
/// the top bit would read as a sign.
fn uint_content(v: u64) -> Vec<u8> {
    let mut bytes = v.to_be_bytes().to_vec();
    while bytes.len() > 1 && bytes[0] == 0 {
        bytes.remove(0);
    }
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0);
    }
    bytes
}

fn push_integer(out: &mut Vec<u8>, v: i64) {
    push_tlv(out, TAG_INTEGER, &int_content(v));
}

fn push_unsigned(out: &mut Vec<u8>, tag: u8, v: u64) {
    push_tlv(out, tag, &uint_content(v));
}

fn push_subid(out: &mut Vec<u8>, v: u32) {
    let mut tmp = [0u8; 5];
    let mut n = 0;
    let mut v = v;
    loop {
        tmp[n] = (v & 0x7f) as u8;
        v >>= 7;
        n += 1;
        if v == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        out.push(tmp[i] | if i > 0 { 0x80 } else { 0 });
    }
}

fn oid_content(oid: &Oid) -> Result<Vec<u8>> {
    let c = oid.components();
    if c.len() < 2 {
        return Err(Error::encode(format!("OID needs at least two arcs: {}", oid)));
    }
    if c[0] > 2 || c[1] > 39 {
        return Err(Error::encode(format!("OID has invalid leading arcs: {}", oid)));
    }
    let mut out = Vec::with_capacity(c.len() + 1);
    push_subid(&mut out, c[0] * 40 + c[1]);
    for &sub in &c[2..] {
        push_subid(&mut out, sub);
    }
    Ok(out)
}

fn push_oid(out: &mut Vec<u8>, oid: &Oid) -> Result<()> {
    let content = oid_content(oid)?;
    push_tlv(out, TAG_OID, &content);
    Ok(())
}

fn push_value(out: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::Integer(v) => push_integer(out, *v as i64),
        Value::OctetString(v) => push_tlv(out, TAG_OCTET_STRING, v),
        Value::Null => push_tlv(out, TAG_NULL, &[]),
        Value::ObjectIdentifier(oid) => push_oid(out, oid)?,
        Value::IpAddress(a) => push_tlv(out, TAG_IP_ADDRESS, a),
        Value::Counter32(v) => push_unsigned(out, TAG_COUNTER32, *v as u64),
        Value::Gauge32(v) => push_unsigned(out, TAG_GAUGE32, *v as u64),
        Value::TimeTicks(v) => push_unsigned(out, TAG_TIMETICKS, *v as u64),
        Value::Opaque(v) => push_tlv(out, TAG_OPAQUE, v),
        Value::Counter64(v) => push_unsigned(out, TAG_COUNTER64, *v),
        Value::NoSuchObject => push_tlv(out, TAG_NO_SUCH_OBJECT, &[]),
        Value::NoSuchInstance => push_tlv(out, TAG_NO_SUCH_INSTANCE, &[]),
        Value::EndOfMibView => push_tlv(out, TAG_END_OF_MIB_VIEW, &[]),
    }
    Ok(())
}

fn var_bind_list_content(var_binds: &[crate::proto::VarBind]) -> Result<Vec<u8>> {
    let mut list = Vec::new();
    for vb in var_binds {
        let mut item = Vec::new();
        push_oid(&mut item, &vb.name)?;
        push_value(&mut item, &vb.value)?;
        push_tlv(&mut list, TAG_SEQUENCE, &item);
    }
    Ok(list)
}

/// Encode a v2-form PDU as its context-tagged TLV.
pub fn encode_pdu(pdu: &Pdu) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    push_integer(&mut content, pdu.request_id as i64);
    if pdu.pdu_type == PduType::GetBulkRequest {
        push_integer(&mut content, pdu.non_repeaters as i64);
        push_integer(&mut content, pdu.max_repetitions as i64);
    } else {
        push_integer(&mut content, pdu.error_status.as_i32() as i64);
        push_integer(&mut content, pdu.error_index as i64);
    }
    let list = var_bind_list_content(&pdu.var_binds)?;
    push_tlv(&mut content, TAG_SEQUENCE, &list);

    let mut out = Vec::new();
    push_tlv(&mut out, TAG_CONTEXT_CONSTRUCTED | pdu.pdu_type.as_u8(), &content);
    Ok(out)
}

fn encode_trap_v1(pdu: &TrapV1Pdu) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    push_oid(&mut content, &pdu.enterprise)?;
    push_tlv(&mut content, TAG_IP_ADDRESS, &pdu.agent_addr);
    push_integer(&mut content, pdu.generic_trap as i64);
    push_integer(&mut content, pdu.specific_trap as i64);
    push_unsigned(&mut content, TAG_TIMETICKS, pdu.timestamp as u64);
    let list = var_bind_list_content(&pdu.var_binds)?;
    push_tlv(&mut content, TAG_SEQUENCE, &list);

    let mut out = Vec::new();
    push_tlv(
        &mut out,
        TAG_CONTEXT_CONSTRUCTED | PduType::TrapV1.as_u8(),
        &content,
    );
    Ok(out)
}

pub fn encode_snmp_pdu(pdu: &SnmpPdu) -> Result<Vec<u8>> {
    match pdu {
        SnmpPdu::Generic(pdu) => encode_pdu(pdu),
        SnmpPdu::TrapV1(pdu) => encode_trap_v1(pdu),
    }
}

/// Encode a whole SNMPv1/v2c message.
pub fn encode_community_message(msg: &CommunityMessage) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    push_integer(&mut content, msg.version as i64);
    push_tlv(&mut content, TAG_OCTET_STRING, &msg.community);
    content.extend_from_slice(&encode_snmp_pdu(&msg.pdu)?);

    let mut out = Vec::new();
    push_tlv(&mut out, TAG_SEQUENCE, &content);
    Ok(out)
}

/// Encode a plaintext scoped PDU (the unit of v3 encryption).
pub fn encode_scoped_pdu(scoped: &ScopedPdu) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    push_tlv(&mut content, TAG_OCTET_STRING, &scoped.context_engine_id);
    push_tlv(&mut content, TAG_OCTET_STRING, &scoped.context_name);
    content.extend_from_slice(&encode_pdu(&scoped.pdu)?);

    let mut out = Vec::new();
    push_tlv(&mut out, TAG_SEQUENCE, &content);
    Ok(out)
}

/// Encode USM security parameters. Returns the octets together with the
/// offset of the msgAuthenticationParameters value inside them, so the
/// caller can splice a freshly computed digest in place.
pub fn encode_usm_security_params(params: &UsmSecurityParams) -> Result<(Vec<u8>, usize)> {
    let mut content = Vec::new();
    push_tlv(&mut content, TAG_OCTET_STRING, &params.authoritative_engine_id);
    push_integer(&mut content, params.authoritative_engine_boots as i64);
    push_integer(&mut content, params.authoritative_engine_time as i64);
    push_tlv(&mut content, TAG_OCTET_STRING, &params.user_name);

    let auth_tlv_start = content.len();
    push_tlv(&mut content, TAG_OCTET_STRING, &params.auth_params);
    let auth_value_offset = auth_tlv_start + header_octets(params.auth_params.len());
    push_tlv(&mut content, TAG_OCTET_STRING, &params.priv_params);

    let mut out = Vec::new();
    push_tlv(&mut out, TAG_SEQUENCE, &content);
    Ok((out, header_octets(content.len()) + auth_value_offset))
}

/// Encode a whole SNMPv3 message. Returns the octets together with the
/// offset at which the msgSecurityParameters value (the octets passed in
/// `msg.security_params`) begins, so offsets inside them stay meaningful.
pub fn encode_v3_message(msg: &V3Message) -> Result<(Vec<u8>, usize)> {
    let mut content = Vec::new();
    push_integer(&mut content, 3);

    let mut header = Vec::new();
    push_integer(&mut header, msg.header.msg_id as i64);
    push_integer(&mut header, msg.header.msg_max_size as i64);
    push_tlv(&mut header, TAG_OCTET_STRING, &[msg.header.msg_flags]);
    push_integer(&mut header, msg.header.security_model as i64);
    push_tlv(&mut content, TAG_SEQUENCE, &header);

    let sp_tlv_start = content.len();
    push_tlv(&mut content, TAG_OCTET_STRING, &msg.security_params);
    let sp_value_offset = sp_tlv_start + header_octets(msg.security_params.len());

    match &msg.data {
        ScopedPduData::Plaintext(scoped) => {
            content.extend_from_slice(&encode_scoped_pdu(scoped)?);
        }
        ScopedPduData::Encrypted(octets) => {
            push_tlv(&mut content, TAG_OCTET_STRING, octets);
        }
    }

    let mut out = Vec::new();
    push_tlv(&mut out, TAG_SEQUENCE, &content);
    Ok((out, header_octets(content.len()) + sp_value_offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_content_minimal() {
        assert_eq!(int_content(0), vec![0x00]);
        assert_eq!(int_content(127), vec![0x7f]);
        assert_eq!(int_content(128), vec![0x00, 0x80]);
        assert_eq!(int_content(-1), vec![0xff]);
        assert_eq!(int_content(-129), vec![0xff, 0x7f]);
        assert_eq!(int_content(42), vec![0x2a]);
    }

    #[test]
    fn test_uint_content_sign_guard() {
        assert_eq!(uint_content(0), vec![0x00]);
        assert_eq!(uint_content(0x80), vec![0x00, 0x80]);
        assert_eq!(uint_content(0xff), vec![0x00, 0xff]);
        assert_eq!(uint_content(0x7f), vec![0x7f]);
        assert_eq!(
            uint_content(u64::MAX),
            vec![0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn test_length_forms() {
        let mut out = Vec::new();
        push_length(&mut out, 0x7f);
        assert_eq!(out, vec![0x7f]);
        out.clear();
        push_length(&mut out, 0x80);
        assert_eq!(out, vec![0x81, 0x80]);
        out.clear();
        push_length(&mut out, 300);
        assert_eq!(out, vec![0x82, 0x01, 0x2c]);
    }

    #[test]
    fn test_oid_first_arcs() {
        let content = oid_content(&Oid::parse("1.3.6.1").unwrap()).unwrap();
        assert_eq!(content, vec![0x2b, 0x06, 0x01]);
        // multi-byte subid: 8072 = 0x3f * 128 + 0x08
        let content = oid_content(&Oid::parse("1.3.6.1.4.1.8072").unwrap()).unwrap();
        assert_eq!(content, vec![0x2b, 0x06, 0x01, 0x04, 0x01, 0xbf, 0x08]);
        assert!(oid_content(&Oid::new(vec![1])).is_err());
        assert!(oid_content(&Oid::new(vec![3, 1])).is_err());
    }
}
