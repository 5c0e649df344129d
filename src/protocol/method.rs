//! Remote method names and call parameters.
//!
//! Every request names one middleware function in `xtx_func_name` and
//! carries its arguments positionally as `param_1..param_N`.
//!
//! # Methods
//!
//! | Variant | Wire name |
//! |---------|-----------|
//! | [`Method::ChangeUserPin`] | `SOF_ChangePassWd` |
//! | [`Method::GenRandom`] | `SOF_GenRandom` |
//! | [`Method::GetCertEntity`] | `SOF_GetCertEntity` |
//! | [`Method::GetCertInfo`] | `SOF_GetCertInfo` |
//! | [`Method::GetDeviceInfo`] | `GetDeviceInfo` |
//! | [`Method::GetSignCert`] | `SOF_ExportUserCert` |
//! | [`Method::GetUserList`] | `SOF_GetUserList` |
//! | [`Method::GetUserPinRetryCount`] | `SOF_GetPinRetryCount` |
//! | [`Method::GetVersion`] | `SOF_GetVersion` |
//! | [`Method::SignData`] | `SOF_SignData` |
//! | [`Method::ValidateCert`] | `SOF_ValidateCert` |
//! | [`Method::VerifySignedData`] | `SOF_VerifySignedData` |
//! | [`Method::VerifyUserPin`] | `SOF_Login` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::{Error, Result};

// ============================================================================
// Method
// ============================================================================

/// Middleware function invoked by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Change the PIN protecting a certificate.
    ChangeUserPin,
    /// Random string generated by the middleware.
    GenRandom,
    /// Unique entity identifier of a certificate.
    GetCertEntity,
    /// One field of a certificate, selected by numeric code.
    GetCertInfo,
    /// Device information, selected by numeric code.
    GetDeviceInfo,
    /// Export the signing certificate of a key.
    GetSignCert,
    /// List of `name||certId` entries for present keys.
    GetUserList,
    /// Remaining PIN attempts.
    GetUserPinRetryCount,
    /// Middleware version; also the keep-alive no-op.
    GetVersion,
    /// Sign data with a key.
    SignData,
    /// Basic certificate validity check.
    ValidateCert,
    /// Verify a signature against a certificate.
    VerifySignedData,
    /// Verify the PIN of a key.
    VerifyUserPin,
}

impl Method {
    /// All methods in declaration order.
    pub const ALL: [Method; 13] = [
        Method::ChangeUserPin,
        Method::GenRandom,
        Method::GetCertEntity,
        Method::GetCertInfo,
        Method::GetDeviceInfo,
        Method::GetSignCert,
        Method::GetUserList,
        Method::GetUserPinRetryCount,
        Method::GetVersion,
        Method::SignData,
        Method::ValidateCert,
        Method::VerifySignedData,
        Method::VerifyUserPin,
    ];

    /// Returns the name sent in `xtx_func_name`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::ChangeUserPin => "SOF_ChangePassWd",
            Method::GenRandom => "SOF_GenRandom",
            Method::GetCertEntity => "SOF_GetCertEntity",
            Method::GetCertInfo => "SOF_GetCertInfo",
            Method::GetDeviceInfo => "GetDeviceInfo",
            Method::GetSignCert => "SOF_ExportUserCert",
            Method::GetUserList => "SOF_GetUserList",
            Method::GetUserPinRetryCount => "SOF_GetPinRetryCount",
            Method::GetVersion => "SOF_GetVersion",
            Method::SignData => "SOF_SignData",
            Method::ValidateCert => "SOF_ValidateCert",
            Method::VerifySignedData => "SOF_VerifySignedData",
            Method::VerifyUserPin => "SOF_Login",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::invalid_argument(format!("unknown method: {s}")))
    }
}

impl Serialize for Method {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Param
// ============================================================================

/// A single positional argument: a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Param {
    /// String argument.
    Str(String),
    /// Numeric argument.
    Num(i64),
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Str(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Str(value)
    }
}

impl From<&String> for Param {
    fn from(value: &String) -> Self {
        Param::Str(value.clone())
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Num(value)
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Param::Num(i64::from(value))
    }
}

impl From<u32> for Param {
    fn from(value: u32) -> Self {
        Param::Num(i64::from(value))
    }
}

impl From<u8> for Param {
    fn from(value: u8) -> Self {
        Param::Num(i64::from(value))
    }
}

// ============================================================================
// Params
// ============================================================================

/// Arguments of one call.
///
/// A list flattens into `param_1..param_N`; a single value fills `param_1`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Params {
    /// No arguments.
    #[default]
    None,
    /// One scalar argument.
    One(Param),
    /// Positional argument list.
    List(Vec<Param>),
}

impl Params {
    /// Builds a positional argument list.
    #[must_use]
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Param>,
    {
        Params::List(items.into_iter().map(Into::into).collect())
    }

    /// Iterates over the arguments in wire order.
    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        let slice: &[Param] = match self {
            Params::None => &[],
            Params::One(param) => std::slice::from_ref(param),
            Params::List(items) => items,
        };
        slice.iter()
    }

    /// Number of positional slots this produces.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns `true` if no arguments are sent.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::None
    }
}

impl<T: Into<Param>> From<Vec<T>> for Params {
    fn from(items: Vec<T>) -> Self {
        Params::list(items)
    }
}

impl From<Param> for Params {
    fn from(param: Param) -> Self {
        Params::One(param)
    }
}

impl From<&str> for Params {
    fn from(value: &str) -> Self {
        Params::One(value.into())
    }
}

impl From<String> for Params {
    fn from(value: String) -> Self {
        Params::One(value.into())
    }
}

impl From<&String> for Params {
    fn from(value: &String) -> Self {
        Params::One(value.into())
    }
}

impl From<i64> for Params {
    fn from(value: i64) -> Self {
        Params::One(value.into())
    }
}

impl From<u32> for Params {
    fn from(value: u32) -> Self {
        Params::One(value.into())
    }
}

// ============================================================================
// Tests
// ============================================================================
