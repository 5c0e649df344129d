//! Named middleware operations.
//!
//! Thin wrappers over [`Client::call`] that pick the method, lay out the
//! positional params and decode the reply.

// ============================================================================
// Imports
// ============================================================================

use futures_util::future::try_join_all;
use tracing::{debug, warn};

use crate::cert::{CertInfo, CertKind, DeviceType, UserInfo, parse_cert_list};
use crate::error::{Error, Result};
use crate::protocol::{Action, Event, Method, Param};

use super::core::Client;

// ============================================================================
// Constants
// ============================================================================

/// `GetDeviceInfo` code that reports the device type.
pub const DEVICE_TYPE_INFO_CODE: u32 = 7;

/// Default length requested by [`Client::gen_random`].
pub const DEFAULT_RANDOM_LEN: u32 = 32;

// ============================================================================
// Client - Device & Users
// ============================================================================

impl Client {
    /// Returns the middleware version.
    ///
    /// # Errors
    ///
    /// Any error of [`Client::call`].
    pub async fn get_version(&self) -> Result<String> {
        self.call(Method::GetVersion, ()).await
    }

    /// Lists key holders whose device is of `device_type`.
    ///
    /// Device types are queried concurrently. A failure is also published
    /// as an `exception` event.
    ///
    /// # Errors
    ///
    /// Any error of [`Client::call`], or [`Error::Protocol`] if a device
    /// type reply is not `HARD`/`SOFT`.
    pub async fn get_user_list(&self, device_type: DeviceType) -> Result<Vec<UserInfo>> {
        let result = self.filter_user_list(device_type).await;

        if let Err(e) = &result {
            warn!(error = %e, device_type = %device_type, "get_user_list failed");
            self.emit(Event::new(Action::Exception).with_message(format!("get_user_list: {e}")));
        }

        result
    }

    async fn filter_user_list(&self, device_type: DeviceType) -> Result<Vec<UserInfo>> {
        let raw = self.call(Method::GetUserList, ()).await?;
        let users = parse_cert_list(&raw);

        let checked = try_join_all(users.into_iter().map(|user| async move {
            let kind = self.get_device_type(&user.cert_id).await?;
            Ok::<_, Error>((kind == device_type).then_some(user))
        }))
        .await?;

        let users: Vec<UserInfo> = checked.into_iter().flatten().collect();
        debug!(count = users.len(), device_type = %device_type, "User list filtered");
        Ok(users)
    }

    /// Collects certificate fields for every key holder of `device_type`.
    ///
    /// `kinds` selects the fields; `None` requests all of them.
    ///
    /// # Errors
    ///
    /// Any error of [`Client::get_user_list`], [`Client::get_sign_cert`] or
    /// [`Client::get_cert_info`].
    pub async fn get_user_list_info(
        &self,
        device_type: DeviceType,
        kinds: Option<&[CertKind]>,
    ) -> Result<Vec<CertInfo>> {
        let users = self.get_user_list(device_type).await?;

        try_join_all(users.iter().map(|user| async move {
            let cert = self.get_sign_cert(&user.cert_id).await?;
            self.get_cert_info(&cert, kinds).await
        }))
        .await
    }

    /// Queries one device attribute by numeric code.
    ///
    /// # Errors
    ///
    /// Any error of [`Client::call`].
    pub async fn get_device_info(&self, cert_id: &str, code: u32) -> Result<String> {
        let params = vec![Param::from(cert_id), Param::from(code)];
        self.call(Method::GetDeviceInfo, params).await
    }

    /// Returns whether the key is hardware or software backed.
    ///
    /// # Errors
    ///
    /// Any error of [`Client::call`], or [`Error::Protocol`] if the reply is
    /// not `HARD`/`SOFT`.
    pub async fn get_device_type(&self, cert_id: &str) -> Result<DeviceType> {
        self.get_device_info(cert_id, DEVICE_TYPE_INFO_CODE)
            .await?
            .parse()
    }
}

// ============================================================================
// Client - Certificates
// ============================================================================

impl Client {
    /// Exports the signing certificate of a key (base64).
    ///
    /// # Errors
    ///
    /// Any error of [`Client::call`].
    pub async fn get_sign_cert(&self, cert_id: &str) -> Result<String> {
        self.call(Method::GetSignCert, cert_id).await
    }

    /// Returns the certificate's unique identifier.
    ///
    /// # Errors
    ///
    /// Any error of [`Client::call`].
    pub async fn get_cert_entity(&self, cert: &str) -> Result<String> {
        self.call(Method::GetCertEntity, cert).await
    }

    /// Returns one certificate field.
    ///
    /// # Errors
    ///
    /// Any error of [`Client::call`].
    pub async fn get_cert_basic_info(&self, cert: &str, kind: CertKind) -> Result<String> {
        let params = vec![Param::from(cert), Param::from(kind.code())];
        self.call(Method::GetCertInfo, params).await
    }

    /// Returns several certificate fields, one call per field, concurrently.
    ///
    /// `kinds` selects the fields; `None` requests all of them.
    ///
    /// # Errors
    ///
    /// The first error of any field call.
    pub async fn get_cert_info(&self, cert: &str, kinds: Option<&[CertKind]>) -> Result<CertInfo> {
        let kinds = kinds.unwrap_or(&CertKind::ALL);

        let values = try_join_all(kinds.iter().map(|&kind| async move {
            let value = self.get_cert_basic_info(cert, kind).await?;
            Ok::<_, Error>((kind, value))
        }))
        .await?;

        Ok(values.into_iter().collect())
    }

    /// Checks certificate validity.
    ///
    /// The middleware answers `"0"` or `"true"` for a valid certificate.
    ///
    /// # Errors
    ///
    /// Any error of [`Client::call`].
    pub async fn validate_cert(&self, cert: &str) -> Result<bool> {
        let reply = self.call(Method::ValidateCert, cert).await?;
        Ok(reply == "0" || reply.eq_ignore_ascii_case("true"))
    }

    /// Requests a random string of `len` characters
    /// (default [`DEFAULT_RANDOM_LEN`]).
    ///
    /// # Errors
    ///
    /// Any error of [`Client::call`].
    pub async fn gen_random(&self, len: Option<u32>) -> Result<String> {
        self.call(Method::GenRandom, len.unwrap_or(DEFAULT_RANDOM_LEN)).await
    }
}

// ============================================================================
// Client - PIN & Signatures
// ============================================================================

impl Client {
    /// Verifies the key's PIN.
    ///
    /// # Errors
    ///
    /// Any error of [`Client::call`].
    pub async fn verify_user_pin(&self, cert_id: &str, pin: &str) -> Result<bool> {
        let params = vec![cert_id, pin];
        self.call(Method::VerifyUserPin, params).await.map(is_true)
    }

    /// Verifies `signature` over `plain` against `cert`.
    ///
    /// # Errors
    ///
    /// Any error of [`Client::call`].
    pub async fn verify_signed_data(
        &self,
        cert: &str,
        plain: &str,
        signature: &str,
    ) -> Result<bool> {
        let params = vec![cert, plain, signature];
        self.call(Method::VerifySignedData, params).await.map(is_true)
    }

    /// Signs `plain` with the key and returns the encoded signature.
    ///
    /// # Errors
    ///
    /// Any error of [`Client::call`].
    pub async fn sign_data(&self, cert_id: &str, plain: &str) -> Result<String> {
        let params = vec![cert_id, plain];
        self.call(Method::SignData, params).await
    }

    /// Changes the key's PIN.
    ///
    /// # Errors
    ///
    /// Any error of [`Client::call`].
    pub async fn change_user_pin(
        &self,
        cert_id: &str,
        old_pin: &str,
        new_pin: &str,
    ) -> Result<bool> {
        let params = vec![cert_id, old_pin, new_pin];
        self.call(Method::ChangeUserPin, params).await.map(is_true)
    }

    /// Returns how many PIN attempts remain.
    ///
    /// # Errors
    ///
    /// Any error of [`Client::call`], or [`Error::Protocol`] if the reply is
    /// not an integer.
    pub async fn get_user_pin_retry_count(&self, cert_id: &str) -> Result<u32> {
        let reply = self.call(Method::GetUserPinRetryCount, cert_id).await?;
        reply
            .trim()
            .parse()
            .map_err(|_| Error::protocol(format!("invalid PIN retry count: {reply:?}")))
    }
}

// ============================================================================
// Helpers
// ============================================================================

#[inline]
fn is_true(reply: String) -> bool {
    reply == "true"
}
