//! PDU variants (RFC 1157 Trap-PDU, RFC 3416 v2 PDUs)

use super::smi::{Oid, VarBind};

/// PDU tags as they appear on the wire (context-specific class).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PduType {
    GetRequest = 0,
    GetNextRequest = 1,
    Response = 2,
    SetRequest = 3,
    /// Obsolete SNMPv1 Trap-PDU; translated at ingress (RFC 2576)
    TrapV1 = 4,
    GetBulkRequest = 5,
    InformRequest = 6,
    TrapV2 = 7,
    Report = 8,
}

impl PduType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::GetRequest),
            1 => Some(Self::GetNextRequest),
            2 => Some(Self::Response),
            3 => Some(Self::SetRequest),
            4 => Some(Self::TrapV1),
            5 => Some(Self::GetBulkRequest),
            6 => Some(Self::InformRequest),
            7 => Some(Self::TrapV2),
            8 => Some(Self::Report),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Read-class or write-class PDU (RFC 3411 §2.8); the kinds a
    /// command responder may legally receive.
    pub fn is_request_class(&self) -> bool {
        matches!(
            self,
            Self::GetRequest | Self::GetNextRequest | Self::GetBulkRequest | Self::SetRequest
        )
    }

    /// Expects a Response PDU back from the peer.
    pub fn is_confirmed_class(&self) -> bool {
        matches!(
            self,
            Self::GetRequest
                | Self::GetNextRequest
                | Self::GetBulkRequest
                | Self::SetRequest
                | Self::InformRequest
        )
    }

    pub fn is_notification_class(&self) -> bool {
        matches!(self, Self::TrapV1 | Self::TrapV2 | Self::InformRequest)
    }
}

/// PDU-level error status (RFC 3416 §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    NoError,
    TooBig,
    NoSuchName,
    BadValue,
    ReadOnly,
    GenErr,
    NoAccess,
    WrongType,
    WrongLength,
    WrongEncoding,
    WrongValue,
    NoCreation,
    InconsistentValue,
    ResourceUnavailable,
    CommitFailed,
    UndoFailed,
    AuthorizationError,
    NotWritable,
    InconsistentName,
}

impl ErrorStatus {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::NoError),
            1 => Some(Self::TooBig),
            2 => Some(Self::NoSuchName),
            3 => Some(Self::BadValue),
            4 => Some(Self::ReadOnly),
            5 => Some(Self::GenErr),
            6 => Some(Self::NoAccess),
            7 => Some(Self::WrongType),
            8 => Some(Self::WrongLength),
            9 => Some(Self::WrongEncoding),
            10 => Some(Self::WrongValue),
            11 => Some(Self::NoCreation),
            12 => Some(Self::InconsistentValue),
            13 => Some(Self::ResourceUnavailable),
            14 => Some(Self::CommitFailed),
            15 => Some(Self::UndoFailed),
            16 => Some(Self::AuthorizationError),
            17 => Some(Self::NotWritable),
            18 => Some(Self::InconsistentName),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> i32 {
        match self {
            Self::NoError => 0,
            Self::TooBig => 1,
            Self::NoSuchName => 2,
            Self::BadValue => 3,
            Self::ReadOnly => 4,
            Self::GenErr => 5,
            Self::NoAccess => 6,
            Self::WrongType => 7,
            Self::WrongLength => 8,
            Self::WrongEncoding => 9,
            Self::WrongValue => 10,
            Self::NoCreation => 11,
            Self::InconsistentValue => 12,
            Self::ResourceUnavailable => 13,
            Self::CommitFailed => 14,
            Self::UndoFailed => 15,
            Self::AuthorizationError => 16,
            Self::NotWritable => 17,
            Self::InconsistentName => 18,
        }
    }

    /// Downgrade a v2 error status for transport in a v1 Response
    /// (RFC 2576 §4.3).
    pub fn to_v1(&self) -> Self {
        match self {
            Self::WrongValue
            | Self::WrongEncoding
            | Self::WrongType
            | Self::WrongLength
            | Self::InconsistentValue => Self::BadValue,
            Self::NoAccess
            | Self::NotWritable
            | Self::NoCreation
            | Self::InconsistentName
            | Self::AuthorizationError => Self::NoSuchName,
            Self::ResourceUnavailable | Self::CommitFailed | Self::UndoFailed => Self::GenErr,
            other => *other,
        }
    }
}

impl std::fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NoError => "noError",
            Self::TooBig => "tooBig",
            Self::NoSuchName => "noSuchName",
            Self::BadValue => "badValue",
            Self::ReadOnly => "readOnly",
            Self::GenErr => "genErr",
            Self::NoAccess => "noAccess",
            Self::WrongType => "wrongType",
            Self::WrongLength => "wrongLength",
            Self::WrongEncoding => "wrongEncoding",
            Self::WrongValue => "wrongValue",
            Self::NoCreation => "noCreation",
            Self::InconsistentValue => "inconsistentValue",
            Self::ResourceUnavailable => "resourceUnavailable",
            Self::CommitFailed => "commitFailed",
            Self::UndoFailed => "undoFailed",
            Self::AuthorizationError => "authorizationError",
            Self::NotWritable => "notWritable",
            Self::InconsistentName => "inconsistentName",
        };
        f.write_str(s)
    }
}

/// A v2-form PDU. For GetBulk the `error_status`/`error_index` wire
/// slots carry `non_repeaters`/`max_repetitions`; they are kept as
/// separate fields here and the codec maps them by PDU type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub pdu_type: PduType,
    pub request_id: i32,
    pub error_status: ErrorStatus,
    pub error_index: u32,
    pub non_repeaters: u32,
    pub max_repetitions: u32,
    pub var_binds: Vec<VarBind>,
}

impl Pdu {
    pub fn new(pdu_type: PduType, request_id: i32, var_binds: Vec<VarBind>) -> Self {
        Self {
            pdu_type,
            request_id,
            error_status: ErrorStatus::NoError,
            error_index: 0,
            non_repeaters: 0,
            max_repetitions: 0,
            var_binds,
        }
    }

    pub fn get_bulk(
        request_id: i32,
        non_repeaters: u32,
        max_repetitions: u32,
        var_binds: Vec<VarBind>,
    ) -> Self {
        Self {
            pdu_type: PduType::GetBulkRequest,
            request_id,
            error_status: ErrorStatus::NoError,
            error_index: 0,
            non_repeaters,
            max_repetitions,
            var_binds,
        }
    }

    /// Response skeleton mirroring this request (RFC 3413 §3.2.4): same
    /// request-id, empty error fields, request var-binds carried over.
    pub fn response_to(&self) -> Self {
        Self {
            pdu_type: PduType::Response,
            request_id: self.request_id,
            error_status: ErrorStatus::NoError,
            error_index: 0,
            non_repeaters: 0,
            max_repetitions: 0,
            var_binds: self.var_binds.clone(),
        }
    }
}

/// The original SNMPv1 Trap-PDU shape (RFC 1157 §4.1.6); only ever seen
/// at the v1 message boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrapV1Pdu {
    pub enterprise: Oid,
    pub agent_addr: [u8; 4],
    pub generic_trap: i32,
    pub specific_trap: i32,
    pub timestamp: u32,
    pub var_binds: Vec<VarBind>,
}

/// Either a generic (v2-form) PDU or a v1 trap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpPdu {
    Generic(Pdu),
    TrapV1(TrapV1Pdu),
}

impl SnmpPdu {
    pub fn pdu_type(&self) -> PduType {
        match self {
            SnmpPdu::Generic(pdu) => pdu.pdu_type,
            SnmpPdu::TrapV1(_) => PduType::TrapV1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdu_type_tags() {
        assert_eq!(PduType::from_u8(5), Some(PduType::GetBulkRequest));
        assert_eq!(PduType::from_u8(9), None);
        assert_eq!(PduType::Report.as_u8(), 8);
    }

    #[test]
    fn test_pdu_classes() {
        assert!(PduType::GetRequest.is_request_class());
        assert!(!PduType::Response.is_request_class());
        assert!(PduType::InformRequest.is_confirmed_class());
        assert!(!PduType::TrapV2.is_confirmed_class());
        assert!(PduType::TrapV2.is_notification_class());
    }

    #[test]
    fn test_error_status_v1_mapping() {
        assert_eq!(ErrorStatus::WrongType.to_v1(), ErrorStatus::BadValue);
        assert_eq!(ErrorStatus::NotWritable.to_v1(), ErrorStatus::NoSuchName);
        assert_eq!(ErrorStatus::CommitFailed.to_v1(), ErrorStatus::GenErr);
        assert_eq!(ErrorStatus::TooBig.to_v1(), ErrorStatus::TooBig);
    }

    #[test]
    fn test_response_skeleton() {
        let req = Pdu::new(
            PduType::GetRequest,
            42,
            vec![VarBind::null(Oid::parse("1.3.6.1.2.1.1.1.0").unwrap())],
        );
        let rsp = req.response_to();
        assert_eq!(rsp.pdu_type, PduType::Response);
        assert_eq!(rsp.request_id, 42);
        assert_eq!(rsp.var_binds.len(), 1);
    }
}
