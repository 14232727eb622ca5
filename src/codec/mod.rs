//! ASN.1 BER codec for SNMP messages
//!
//! The engine proper treats this module as a collaborator with two entry
//! points per direction: whole messages and scoped PDUs. Decoding is
//! built on `asn1-rs`; encoding is a small definite-length BER writer.

mod decode;
mod encode;

pub use decode::{
    decode_message, decode_scoped_pdu, decode_usm_security_params, locate_usm_auth_params,
    CodecError,
};
pub use encode::{
    encode_community_message, encode_pdu, encode_scoped_pdu, encode_snmp_pdu,
    encode_usm_security_params, encode_v3_message,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::msg::{MSG_FLAG_AUTH, MSG_FLAG_REPORTABLE};
    use crate::proto::{
        CommunityMessage, ErrorStatus, HeaderData, Oid, Pdu, PduType, ScopedPdu, ScopedPduData,
        SnmpMessage, SnmpPdu, TrapV1Pdu, UsmSecurityParams, V3Message, Value, VarBind,
    };
    use pretty_assertions::assert_eq;

    fn sys_descr_get(request_id: i32) -> CommunityMessage {
        CommunityMessage {
            version: 1,
            community: b"public".to_vec(),
            pdu: SnmpPdu::Generic(Pdu::new(
                PduType::GetRequest,
                request_id,
                vec![VarBind::null(Oid::parse("1.3.6.1.2.1.1.1.0").unwrap())],
            )),
        }
    }

    #[test]
    fn test_v2c_get_wire_format() {
        let octets = encode_community_message(&sys_descr_get(42)).unwrap();
        let expected = [
            0x30, 0x26, // SEQUENCE
            0x02, 0x01, 0x01, // version = 1 (v2c)
            0x04, 0x06, b'p', b'u', b'b', b'l', b'i', b'c', // community
            0xa0, 0x19, // GetRequest-PDU
            0x02, 0x01, 0x2a, // request-id = 42
            0x02, 0x01, 0x00, // error-status
            0x02, 0x01, 0x00, // error-index
            0x30, 0x0e, // var-bind list
            0x30, 0x0c, // var-bind
            0x06, 0x08, 0x2b, 0x06, 0x01, 0x02, 0x01, 0x01, 0x01, 0x00, // 1.3.6.1.2.1.1.1.0
            0x05, 0x00, // NULL
        ];
        assert_eq!(octets, expected);
    }

    #[test]
    fn test_community_roundtrip_all_syntaxes() {
        let vbs = vec![
            VarBind::new(Oid::parse("1.3.6.1.2.1.1.1.0").unwrap(), Value::Integer(-42)),
            VarBind::new(
                Oid::parse("1.3.6.1.2.1.1.2.0").unwrap(),
                Value::OctetString(b"hello".to_vec()),
            ),
            VarBind::new(Oid::parse("1.3.6.1.2.1.1.3.0").unwrap(), Value::Null),
            VarBind::new(
                Oid::parse("1.3.6.1.2.1.1.4.0").unwrap(),
                Value::ObjectIdentifier(Oid::parse("1.3.6.1.4.1.8072.3.2.10").unwrap()),
            ),
            VarBind::new(
                Oid::parse("1.3.6.1.2.1.1.5.0").unwrap(),
                Value::IpAddress([192, 168, 1, 1]),
            ),
            VarBind::new(Oid::parse("1.3.6.1.2.1.1.6.0").unwrap(), Value::Counter32(4294967295)),
            VarBind::new(Oid::parse("1.3.6.1.2.1.1.7.0").unwrap(), Value::Gauge32(128)),
            VarBind::new(Oid::parse("1.3.6.1.2.1.1.8.0").unwrap(), Value::TimeTicks(123456)),
            VarBind::new(
                Oid::parse("1.3.6.1.2.1.1.9.0").unwrap(),
                Value::Opaque(vec![0xde, 0xad]),
            ),
            VarBind::new(
                Oid::parse("1.3.6.1.2.1.31.1.1.1.6.1").unwrap(),
                Value::Counter64(u64::MAX),
            ),
            VarBind::new(Oid::parse("1.3.6.1.2.1.1.10.0").unwrap(), Value::NoSuchObject),
            VarBind::new(Oid::parse("1.3.6.1.2.1.1.11.0").unwrap(), Value::NoSuchInstance),
            VarBind::new(Oid::parse("1.3.6.1.2.1.1.12.0").unwrap(), Value::EndOfMibView),
        ];
        let msg = CommunityMessage {
            version: 1,
            community: b"private".to_vec(),
            pdu: SnmpPdu::Generic(Pdu::new(PduType::Response, i32::MAX, vbs)),
        };
        let octets = encode_community_message(&msg).unwrap();
        match decode_message(&octets).unwrap() {
            SnmpMessage::Community(decoded) => assert_eq!(decoded, msg),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_get_bulk_field_mapping() {
        let msg = CommunityMessage {
            version: 1,
            community: b"public".to_vec(),
            pdu: SnmpPdu::Generic(Pdu::get_bulk(
                7,
                1,
                10,
                vec![
                    VarBind::null(Oid::parse("1.3.6.1.2.1.1").unwrap()),
                    VarBind::null(Oid::parse("1.3.6.1.2.1.2").unwrap()),
                ],
            )),
        };
        let octets = encode_community_message(&msg).unwrap();
        match decode_message(&octets).unwrap() {
            SnmpMessage::Community(decoded) => {
                let pdu = match decoded.pdu {
                    SnmpPdu::Generic(pdu) => pdu,
                    other => panic!("unexpected PDU: {:?}", other),
                };
                assert_eq!(pdu.pdu_type, PduType::GetBulkRequest);
                assert_eq!(pdu.non_repeaters, 1);
                assert_eq!(pdu.max_repetitions, 10);
                assert_eq!(pdu.error_status, ErrorStatus::NoError);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_trap_v1_roundtrip() {
        let msg = CommunityMessage {
            version: 0,
            community: b"public".to_vec(),
            pdu: SnmpPdu::TrapV1(TrapV1Pdu {
                enterprise: Oid::parse("1.3.6.1.4.1.8072").unwrap(),
                agent_addr: [10, 0, 0, 1],
                generic_trap: 6,
                specific_trap: 17,
                timestamp: 5000,
                var_binds: vec![VarBind::new(
                    Oid::parse("1.3.6.1.4.1.8072.1.1").unwrap(),
                    Value::Integer(1),
                )],
            }),
        };
        let octets = encode_community_message(&msg).unwrap();
        match decode_message(&octets).unwrap() {
            SnmpMessage::Community(decoded) => assert_eq!(decoded, msg),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_v3_roundtrip_plaintext() {
        let scoped = ScopedPdu {
            context_engine_id: vec![0x80, 0x00, 0x1f, 0x88, 0x04, b'e', b'n', b'g'],
            context_name: b"".to_vec(),
            pdu: Pdu::new(
                PduType::GetRequest,
                99,
                vec![VarBind::null(Oid::parse("1.3.6.1.2.1.1.1.0").unwrap())],
            ),
        };
        let (sp_octets, _) = encode_usm_security_params(&UsmSecurityParams {
            authoritative_engine_id: scoped.context_engine_id.clone(),
            authoritative_engine_boots: 3,
            authoritative_engine_time: 1234,
            user_name: b"usr-md5-none".to_vec(),
            auth_params: vec![0u8; 12],
            priv_params: Vec::new(),
        })
        .unwrap();
        let msg = V3Message {
            header: HeaderData {
                msg_id: 0x01020304,
                msg_max_size: 65507,
                msg_flags: MSG_FLAG_AUTH | MSG_FLAG_REPORTABLE,
                security_model: 3,
            },
            security_params: sp_octets,
            data: ScopedPduData::Plaintext(scoped),
        };
        let (octets, _) = encode_v3_message(&msg).unwrap();
        match decode_message(&octets).unwrap() {
            SnmpMessage::V3(decoded) => assert_eq!(*decoded, msg),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_usm_params_roundtrip_and_auth_offset() {
        let params = UsmSecurityParams {
            authoritative_engine_id: vec![0x80, 0x00, 0x1f, 0x88, 0x80, 1, 2, 3, 4],
            authoritative_engine_boots: 42,
            authoritative_engine_time: 99999,
            user_name: b"operator".to_vec(),
            auth_params: vec![0xaa; 12],
            priv_params: vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08],
        };
        let (octets, auth_offset) = encode_usm_security_params(&params).unwrap();
        assert_eq!(&octets[auth_offset..auth_offset + 12], &[0xaa; 12]);
        assert_eq!(decode_usm_security_params(&octets).unwrap(), params);
    }

    #[test]
    fn test_locate_auth_params_in_whole_message() {
        let (sp_octets, _) = encode_usm_security_params(&UsmSecurityParams {
            authoritative_engine_id: b"engine-1".to_vec(),
            authoritative_engine_boots: 1,
            authoritative_engine_time: 2,
            user_name: b"usr".to_vec(),
            auth_params: vec![0x5a; 12],
            priv_params: Vec::new(),
        })
        .unwrap();
        let msg = V3Message {
            header: HeaderData {
                msg_id: 77,
                msg_max_size: 65507,
                msg_flags: MSG_FLAG_AUTH,
                security_model: 3,
            },
            security_params: sp_octets,
            data: ScopedPduData::Plaintext(ScopedPdu {
                context_engine_id: b"engine-1".to_vec(),
                context_name: Vec::new(),
                pdu: Pdu::new(PduType::GetRequest, 5, Vec::new()),
            }),
        };
        let (octets, _) = encode_v3_message(&msg).unwrap();
        let range = locate_usm_auth_params(&octets).unwrap();
        assert_eq!(&octets[range], &[0x5a; 12]);
    }

    #[test]
    fn test_truncated_input_rejected() {
        let octets = encode_community_message(&sys_descr_get(1)).unwrap();
        assert!(decode_message(&octets[..octets.len() - 3]).is_err());
        assert!(decode_message(&[]).is_err());
        assert!(decode_message(&[0x02, 0x01, 0x00]).is_err());
    }

    #[test]
    fn test_long_form_lengths() {
        // 300 octets of string payload forces two-byte length encoding
        let msg = CommunityMessage {
            version: 1,
            community: b"public".to_vec(),
            pdu: SnmpPdu::Generic(Pdu::new(
                PduType::Response,
                1,
                vec![VarBind::new(
                    Oid::parse("1.3.6.1.2.1.1.1.0").unwrap(),
                    Value::OctetString(vec![0x55; 300]),
                )],
            )),
        };
        let octets = encode_community_message(&msg).unwrap();
        match decode_message(&octets).unwrap() {
            SnmpMessage::Community(decoded) => assert_eq!(decoded, msg),
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
