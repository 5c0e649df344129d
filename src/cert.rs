//! Certificate helpers for middleware replies.
//!
//! The middleware answers in flat strings. This module decodes the ones
//! the operation surface returns:
//!
//! | Type | Source |
//! |------|--------|
//! | [`UserInfo`] | `SOF_GetUserList`: `name||certId&&&name||certId&&&` |
//! | [`CertKind`] | numeric field codes accepted by `SOF_GetCertInfo` |
//! | [`CertInfo`] | several `SOF_GetCertInfo` answers keyed by field |
//! | [`DeviceType`] | `GetDeviceInfo` code 7: `HARD` or `SOFT` |

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::warn;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Separator between user list entries.
const ENTRY_SEPARATOR: &str = "&&&";

/// Separator between name and cert id inside an entry.
const FIELD_SEPARATOR: &str = "||";

// ============================================================================
// UserInfo
// ============================================================================

/// One key holder reported by the middleware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    /// Key identifier used by subsequent calls.
    pub cert_id: String,
    /// Display name of the holder.
    pub username: String,
}

/// Parses a `SOF_GetUserList` reply.
///
/// Input without any `&&&` yields nothing. Entries that do not split into
/// exactly two `||` fields are logged and skipped.
#[must_use]
pub fn parse_cert_list(raw: &str) -> Vec<UserInfo> {
    if raw.is_empty() || !raw.contains(ENTRY_SEPARATOR) {
        return Vec::new();
    }

    raw.split(ENTRY_SEPARATOR)
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| {
            let fields: Vec<&str> = entry.split(FIELD_SEPARATOR).collect();
            match fields.as_slice() {
                [username, cert_id] => Some(UserInfo {
                    cert_id: (*cert_id).to_string(),
                    username: (*username).to_string(),
                }),
                _ => {
                    warn!(entry = %entry, "Skipping malformed user list entry");
                    None
                }
            }
        })
        .collect()
}

// ============================================================================
// DeviceType
// ============================================================================

/// Storage backing a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceType {
    /// Hardware USB key.
    #[default]
    Hard,
    /// Software certificate store.
    Soft,
}

impl DeviceType {
    /// Returns the middleware spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            DeviceType::Hard => "HARD",
            DeviceType::Soft => "SOFT",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "HARD" => Ok(DeviceType::Hard),
            "SOFT" => Ok(DeviceType::Soft),
            other => Err(Error::protocol(format!("invalid device type: {other:?}"))),
        }
    }
}

// ============================================================================
// CertKind
// ============================================================================

/// Certificate field selectable through `SOF_GetCertInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum CertKind {
    /// `V1`, `V2` or `V3`.
    Version = 1,
    /// Serial number.
    Serial = 2,
    /// Key algorithm, RSA or SM2.
    SignMethod = 3,
    /// Issuer country; several joined by `&&&`.
    IssuerC = 4,
    /// Issuer organization.
    IssuerO = 5,
    /// Issuer organizational unit.
    IssuerOu = 6,
    /// Issuer state or province.
    IssuerSt = 7,
    /// Issuer common name.
    IssuerCn = 8,
    /// Issuer locality.
    IssuerL = 9,
    /// Issuer email.
    IssuerE = 10,
    /// Validity start, `YYYYMMDDHHMMSS`.
    NotBefore = 11,
    /// Validity end, `YYYYMMDDHHMMSS`.
    NotAfter = 12,
    /// Subject country.
    SubjectC = 13,
    /// Subject organization.
    SubjectO = 14,
    /// Subject organizational unit.
    SubjectOu = 15,
    /// Subject state or province.
    SubjectSt = 16,
    /// Subject common name.
    SubjectCn = 17,
    /// Subject locality.
    SubjectL = 18,
    /// Subject email.
    SubjectE = 19,
    /// Public key.
    Pubkey = 20,
    /// Subject distinguished name.
    SubjectDn = 33,
    /// Issuer distinguished name.
    IssuerDn = 34,
    /// Unique entity id.
    UniqueId = 35,
}

impl CertKind {
    /// All fields, in code order.
    pub const ALL: [CertKind; 23] = [
        CertKind::Version,
        CertKind::Serial,
        CertKind::SignMethod,
        CertKind::IssuerC,
        CertKind::IssuerO,
        CertKind::IssuerOu,
        CertKind::IssuerSt,
        CertKind::IssuerCn,
        CertKind::IssuerL,
        CertKind::IssuerE,
        CertKind::NotBefore,
        CertKind::NotAfter,
        CertKind::SubjectC,
        CertKind::SubjectO,
        CertKind::SubjectOu,
        CertKind::SubjectSt,
        CertKind::SubjectCn,
        CertKind::SubjectL,
        CertKind::SubjectE,
        CertKind::Pubkey,
        CertKind::SubjectDn,
        CertKind::IssuerDn,
        CertKind::UniqueId,
    ];

    /// Numeric code sent as the second parameter.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Looks up a field by code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        CertKind::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Field name used when serializing [`CertInfo`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            CertKind::Version => "version",
            CertKind::Serial => "serial",
            CertKind::SignMethod => "sign_method",
            CertKind::IssuerC => "issuer_c",
            CertKind::IssuerO => "issuer_o",
            CertKind::IssuerOu => "issuer_ou",
            CertKind::IssuerSt => "issuer_st",
            CertKind::IssuerCn => "issuer_cn",
            CertKind::IssuerL => "issuer_l",
            CertKind::IssuerE => "issuer_e",
            CertKind::NotBefore => "not_before",
            CertKind::NotAfter => "not_after",
            CertKind::SubjectC => "subject_c",
            CertKind::SubjectO => "subject_o",
            CertKind::SubjectOu => "subject_ou",
            CertKind::SubjectSt => "subject_st",
            CertKind::SubjectCn => "subject_cn",
            CertKind::SubjectL => "subject_l",
            CertKind::SubjectE => "subject_e",
            CertKind::Pubkey => "pubkey",
            CertKind::SubjectDn => "subject_dn",
            CertKind::IssuerDn => "issuer_dn",
            CertKind::UniqueId => "uniqueid",
        }
    }
}

impl fmt::Display for CertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// CertInfo
// ============================================================================

/// Certificate fields collected from `SOF_GetCertInfo` calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertInfo {
    fields: BTreeMap<CertKind, String>,
}

impl CertInfo {
    /// Creates an empty set of fields.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns one field, if it was queried.
    #[inline]
    #[must_use]
    pub fn get(&self, kind: CertKind) -> Option<&str> {
        self.fields.get(&kind).map(String::as_str)
    }

    /// Stores one field.
    pub fn insert(&mut self, kind: CertKind, value: impl Into<String>) {
        self.fields.insert(kind, value.into());
    }

    /// Iterates fields in code order.
    pub fn iter(&self) -> impl Iterator<Item = (CertKind, &str)> {
        self.fields.iter().map(|(kind, value)| (*kind, value.as_str()))
    }

    /// Number of fields present.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if no field is present.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(CertKind, String)> for CertInfo {
    fn from_iter<I: IntoIterator<Item = (CertKind, String)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl Serialize for CertInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (kind, value) in &self.fields {
            map.serialize_entry(kind.name(), value)?;
        }
        map.end()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_cert_list() {
        let users = parse_cert_list("alice||12345&&&bob||999000100150181/5303201610000567&&&");
        assert_eq!(
            users,
            vec![
                UserInfo {
                    cert_id: "12345".into(),
                    username: "alice".into()
                },
                UserInfo {
                    cert_id: "999000100150181/5303201610000567".into(),
                    username: "bob".into()
                },
            ]
        );
    }

    #[test]
    fn test_parse_cert_list_rejects_unterminated() {
        assert!(parse_cert_list("").is_empty());
        assert!(parse_cert_list("alice||12345").is_empty());
    }

    #[test]
    fn test_parse_cert_list_skips_bad_entries() {
        let users = parse_cert_list("alice&&&  &&&bob||1||2&&&carol||7&&&");
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "carol");
        assert_eq!(users[0].cert_id, "7");
    }

    #[test]
    fn test_device_type() {
        assert_eq!("HARD".parse::<DeviceType>().expect("parse"), DeviceType::Hard);
        assert_eq!("SOFT".parse::<DeviceType>().expect("parse"), DeviceType::Soft);
        assert!("hard".parse::<DeviceType>().is_err());
        assert_eq!(DeviceType::default(), DeviceType::Hard);
    }

    #[test]
    fn test_cert_kind_codes() {
        assert_eq!(CertKind::Version.code(), 1);
        assert_eq!(CertKind::SubjectCn.code(), 17);
        assert_eq!(CertKind::UniqueId.code(), 35);
        assert_eq!(CertKind::from_code(12), Some(CertKind::NotAfter));
        assert_eq!(CertKind::from_code(21), None);

        for kind in CertKind::ALL {
            assert_eq!(CertKind::from_code(kind.code()), Some(kind));
        }
    }

    #[test]
    fn test_cert_info_serialization() {
        let info: CertInfo = [
            (CertKind::NotAfter, "20301231235959".to_string()),
            (CertKind::NotBefore, "20200101000000".to_string()),
        ]
        .into_iter()
        .collect();

        assert_eq!(info.get(CertKind::NotBefore), Some("20200101000000"));
        assert_eq!(info.get(CertKind::Serial), None);
        assert_eq!(
            serde_json::to_value(&info).expect("serialize"),
            json!({ "not_before": "20200101000000", "not_after": "20301231235959" })
        );
    }

    #[test]
    fn test_user_info_serialization() {
        let user = UserInfo {
            cert_id: "1".into(),
            username: "alice".into(),
        };
        assert_eq!(
            serde_json::to_value(&user).expect("serialize"),
            json!({ "certId": "1", "username": "alice" })
        );
    }
}
