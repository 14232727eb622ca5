//! SNMPv1 ↔ SNMPv2 PDU translation (RFC 2576 §3, §4)

use crate::proto::{oids, ErrorStatus, Oid, Pdu, PduType, TrapV1Pdu, Value, VarBind};
use crate::{Error, Result};

/// RFC 2576 §3.1: rewrite a v1 Trap-PDU into an SNMPv2-Trap-PDU with
/// sysUpTime.0 and snmpTrapOID.0 prepended and snmpTrapEnterprise.0
/// appended.
pub fn v1_trap_to_v2(trap: &TrapV1Pdu) -> Pdu {
    let trap_oid = match trap.generic_trap {
        g @ 0..=5 => oids::SNMP_TRAPS.child(g as u32 + 1),
        _ => trap.enterprise.extend(&[0, trap.specific_trap.max(0) as u32]),
    };

    let mut var_binds = Vec::with_capacity(trap.var_binds.len() + 3);
    var_binds.push(VarBind::new(
        oids::SYS_UPTIME.clone(),
        Value::TimeTicks(trap.timestamp),
    ));
    var_binds.push(VarBind::new(
        oids::SNMP_TRAP_OID.clone(),
        Value::ObjectIdentifier(trap_oid),
    ));
    var_binds.extend(trap.var_binds.iter().cloned());
    var_binds.push(VarBind::new(
        oids::SNMP_TRAP_ENTERPRISE.clone(),
        Value::ObjectIdentifier(trap.enterprise.clone()),
    ));

    Pdu::new(PduType::TrapV2, 0, var_binds)
}

/// RFC 2576 §3.2: map an SNMPv2-Trap back onto the v1 Trap-PDU shape
/// for delivery to a v1 destination.
pub fn v2_trap_to_v1(pdu: &Pdu, agent_addr: [u8; 4]) -> Result<TrapV1Pdu> {
    let timestamp = match pdu.var_binds.first() {
        Some(vb) if vb.name == *oids::SYS_UPTIME => match &vb.value {
            Value::TimeTicks(t) => *t,
            _ => return Err(Error::protocol("sysUpTime.0 must be TimeTicks")),
        },
        _ => return Err(Error::protocol("v2 trap lacks leading sysUpTime.0")),
    };
    let trap_oid = match pdu.var_binds.get(1) {
        Some(vb) if vb.name == *oids::SNMP_TRAP_OID => match &vb.value {
            Value::ObjectIdentifier(oid) => oid.clone(),
            _ => return Err(Error::protocol("snmpTrapOID.0 must be an OID")),
        },
        _ => return Err(Error::protocol("v2 trap lacks snmpTrapOID.0")),
    };

    // standard traps live at snmpTraps.N with N = generic + 1
    let (enterprise, generic_trap, specific_trap) = if trap_oid.starts_with(&oids::SNMP_TRAPS)
        && trap_oid.len() == oids::SNMP_TRAPS.len() + 1
    {
        let generic = trap_oid.components()[trap_oid.len() - 1] as i32 - 1;
        (oids::SNMP_TRAPS.clone(), generic, 0)
    } else {
        // enterpriseSpecific: strip a trailing [0, specific] pair
        let comps = trap_oid.components();
        let enterprise = if comps.len() > 2 && comps[comps.len() - 2] == 0 {
            Oid::new(comps[..comps.len() - 2].to_vec())
        } else {
            trap_oid.clone()
        };
        let specific = comps.last().copied().unwrap_or(0) as i32;
        (enterprise, 6, specific)
    };

    // Counter64 cannot travel in v1 (RFC 2576 §3.2 (4))
    let var_binds: Vec<VarBind> = pdu.var_binds[2..]
        .iter()
        .filter(|vb| !vb.value.is_counter64())
        .filter(|vb| vb.name != *oids::SNMP_TRAP_ENTERPRISE)
        .cloned()
        .collect();

    Ok(TrapV1Pdu {
        enterprise,
        agent_addr,
        generic_trap,
        specific_trap,
        timestamp,
        var_binds,
    })
}

/// RFC 2576 §4.3: downgrade a v2 Response for a v1 manager. SNMPv2
/// exception values and Counter64 bindings cannot be expressed in v1;
/// they turn into noSuchName with the errorIndex of the first offender,
/// and the VarBinds revert to the original request's.
pub fn v2_to_v1_response(pdu: &Pdu, orig_request: Option<&Pdu>) -> Pdu {
    let mut out = pdu.clone();

    let offender = pdu.var_binds.iter().position(|vb| {
        vb.value.is_exception() || vb.value.is_counter64()
    });
    if let Some(idx) = offender {
        out.error_status = ErrorStatus::NoSuchName;
        out.error_index = idx as u32 + 1;
        if let Some(orig) = orig_request {
            out.var_binds = orig.var_binds.clone();
        }
    }

    out.error_status = out.error_status.to_v1();
    if out.error_status != ErrorStatus::NoError {
        if let Some(orig) = orig_request {
            out.var_binds = orig.var_binds.clone();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1_trap(generic: i32, specific: i32) -> TrapV1Pdu {
        TrapV1Pdu {
            enterprise: Oid::parse("1.3.6.1.4.1.424242").unwrap(),
            agent_addr: [10, 1, 2, 3],
            generic_trap: generic,
            specific_trap: specific,
            timestamp: 4200,
            var_binds: vec![VarBind::new(
                Oid::parse("1.3.6.1.4.1.424242.1.1").unwrap(),
                Value::Integer(5),
            )],
        }
    }

    #[test]
    fn test_v1_cold_start_maps_to_standard_trap() {
        let pdu = v1_trap_to_v2(&v1_trap(0, 0));
        assert_eq!(pdu.pdu_type, PduType::TrapV2);
        assert_eq!(pdu.var_binds[0].name, *oids::SYS_UPTIME);
        assert_eq!(pdu.var_binds[0].value, Value::TimeTicks(4200));
        assert_eq!(pdu.var_binds[1].name, *oids::SNMP_TRAP_OID);
        assert_eq!(
            pdu.var_binds[1].value,
            Value::ObjectIdentifier(Oid::parse("1.3.6.1.6.3.1.1.5.1").unwrap())
        );
        // payload binding and trailing snmpTrapEnterprise.0
        assert_eq!(pdu.var_binds.len(), 4);
        assert_eq!(pdu.var_binds[3].name, *oids::SNMP_TRAP_ENTERPRISE);
    }

    #[test]
    fn test_v1_enterprise_specific_trap() {
        let pdu = v1_trap_to_v2(&v1_trap(6, 17));
        assert_eq!(
            pdu.var_binds[1].value,
            Value::ObjectIdentifier(Oid::parse("1.3.6.1.4.1.424242.0.17").unwrap())
        );
    }

    #[test]
    fn test_trap_translation_roundtrip() {
        let orig = v1_trap(6, 17);
        let v2 = v1_trap_to_v2(&orig);
        let back = v2_trap_to_v1(&v2, [10, 1, 2, 3]).unwrap();
        assert_eq!(back.enterprise, orig.enterprise);
        assert_eq!(back.generic_trap, 6);
        assert_eq!(back.specific_trap, 17);
        assert_eq!(back.timestamp, orig.timestamp);
        assert_eq!(back.var_binds, orig.var_binds);
    }

    #[test]
    fn test_response_exception_downgrade() {
        let request = Pdu::new(
            PduType::GetRequest,
            9,
            vec![
                VarBind::null(Oid::parse("1.3.6.1.2.1.1.1.0").unwrap()),
                VarBind::null(Oid::parse("1.3.6.1.2.1.1.9.0").unwrap()),
            ],
        );
        let mut response = request.response_to();
        response.var_binds[0].value = Value::OctetString(b"ok".to_vec());
        response.var_binds[1].value = Value::NoSuchObject;

        let v1 = v2_to_v1_response(&response, Some(&request));
        assert_eq!(v1.error_status, ErrorStatus::NoSuchName);
        assert_eq!(v1.error_index, 2);
        assert_eq!(v1.var_binds, request.var_binds);
    }

    #[test]
    fn test_response_counter64_downgrade() {
        let request = Pdu::new(
            PduType::GetRequest,
            9,
            vec![VarBind::null(Oid::parse("1.3.6.1.2.1.31.1.1.1.6.1").unwrap())],
        );
        let mut response = request.response_to();
        response.var_binds[0].value = Value::Counter64(1);
        let v1 = v2_to_v1_response(&response, Some(&request));
        assert_eq!(v1.error_status, ErrorStatus::NoSuchName);
        assert_eq!(v1.error_index, 1);
    }

    #[test]
    fn test_response_error_status_clamp() {
        let request = Pdu::new(
            PduType::SetRequest,
            3,
            vec![VarBind::new(
                Oid::parse("1.3.6.1.2.1.1.4.0").unwrap(),
                Value::Integer(1),
            )],
        );
        let mut response = request.response_to();
        response.error_status = ErrorStatus::WrongType;
        response.error_index = 1;
        let v1 = v2_to_v1_response(&response, Some(&request));
        assert_eq!(v1.error_status, ErrorStatus::BadValue);
        assert_eq!(v1.error_index, 1);
    }
}
