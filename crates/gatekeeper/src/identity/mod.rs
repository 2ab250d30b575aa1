//! Self-provisioned TLS identity.
//!
//! A fresh ECDSA P-256 key pair and a self-signed X.509 certificate are minted
//! at every process start. Nothing is written to disk; restarting the process
//! rotates the identity.
//!
//! # Certificate profile
//!
//! - issuer == subject == `O=<organization>`
//! - serial drawn uniformly from the 160-bit range
//! - SAN: the loopback IP only
//! - validity: `[issued_at, issued_at + 365 days)`
//! - key usage: digitalSignature, keyEncipherment
//! - extended key usage: serverAuth
//! - basicConstraints present with `CA:FALSE`

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SanType, SerialNumber,
};
use rustls::pki_types::CertificateDer;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

use crate::crypto::{fill_random, CipherError};

/// Fixed subject/issuer organization name.
pub const ORGANIZATION: &str = "Gatekeeper Self-Signed";

/// Validity window of every generated certificate.
pub const VALIDITY: Duration = Duration::days(365);

/// Serial numbers are drawn from `[0, 2^160)`.
pub const SERIAL_LEN: usize = 20;

/// Errors produced while minting the server identity. All are fatal at startup.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// The OS random source could not supply a serial number.
    #[error("failed to draw certificate serial: {0}")]
    Random(#[from] CipherError),

    /// Key generation or certificate assembly failed.
    #[error("certificate generation failed: {0}")]
    Certificate(#[from] rcgen::Error),

    /// The system clock produced a timestamp outside the representable range.
    #[error("system clock out of range: {0}")]
    Clock(String),
}

/// The generated key pair and self-signed certificate used for TLS termination.
pub struct ServerIdentity {
    cert_der: CertificateDer<'static>,
    cert_pem: String,
    key_pem: String,
    serial: Vec<u8>,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
}

impl ServerIdentity {
    /// DER-encoded certificate.
    pub fn certificate(&self) -> &CertificateDer<'static> {
        &self.cert_der
    }

    /// PEM-encoded certificate.
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// PEM-encoded PKCS#8 private key.
    pub fn key_pem(&self) -> &str {
        &self.key_pem
    }

    /// Big-endian serial number bytes, without leading zeroes.
    pub fn serial(&self) -> &[u8] {
        &self.serial
    }

    /// Serial number as lowercase hex, for logs.
    pub fn serial_hex(&self) -> String {
        hex(&self.serial)
    }

    /// SHA-256 over the DER certificate as lowercase hex, for logs.
    pub fn fingerprint(&self) -> String {
        hex(&Sha256::digest(self.certificate()))
    }

    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }
}

impl fmt::Debug for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerIdentity")
            .field("serial_len", &self.serial.len())
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Mints [`ServerIdentity`] values.
#[derive(Debug, Clone)]
pub struct CertificateProvisioner {
    organization: String,
    address: IpAddr,
}

impl Default for CertificateProvisioner {
    fn default() -> Self {
        Self {
            organization: ORGANIZATION.into(),
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

impl CertificateProvisioner {
    /// Generate a fresh identity valid from now.
    ///
    /// # Errors
    ///
    /// Fails only if the random source or key generation is unavailable.
    pub fn provision(&self) -> Result<ServerIdentity, ProvisioningError> {
        // X.509 times have one-second resolution; truncate so the encoded
        // window is exactly [`VALIDITY`].
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let issued_at = OffsetDateTime::from_unix_timestamp(now)
            .map_err(|e| ProvisioningError::Clock(e.to_string()))?;
        self.provision_at(issued_at)
    }

    /// Generate a fresh identity whose validity window starts at `issued_at`.
    pub fn provision_at(
        &self,
        issued_at: OffsetDateTime,
    ) -> Result<ServerIdentity, ProvisioningError> {
        let serial = random_serial()?;
        let params = self.params(issued_at, serial.clone());
        let (not_before, not_after) = (params.not_before, params.not_after);

        let key_pair = KeyPair::generate()?;
        let cert = params.self_signed(&key_pair)?;

        Ok(ServerIdentity {
            cert_der: cert.der().clone(),
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
            serial,
            not_before,
            not_after,
        })
    }

    fn params(&self, issued_at: OffsetDateTime, serial: Vec<u8>) -> CertificateParams {
        let mut distinguished_name = DistinguishedName::new();
        distinguished_name.push(DnType::OrganizationName, self.organization.as_str());

        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name;
        params.serial_number = Some(SerialNumber::from(serial));
        params.subject_alt_names = vec![SanType::IpAddress(self.address)];
        params.not_before = issued_at;
        params.not_after = issued_at + VALIDITY;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.is_ca = IsCa::ExplicitNoCa;
        params
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Draw a positive serial uniformly from the 160-bit range, minimally encoded.
fn random_serial() -> Result<Vec<u8>, CipherError> {
    loop {
        let mut bytes = [0u8; SERIAL_LEN];
        fill_random(&mut bytes)?;
        let first = bytes.iter().position(|b| *b != 0);
        // Zero is not a valid serial; redraw.
        if let Some(first) = first {
            return Ok(bytes[first..].to_vec());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rustls::client::danger::ServerCertVerifier;
    use rustls::client::WebPkiServerVerifier;
    use rustls::pki_types::{ServerName, UnixTime};
    use rustls::RootCertStore;

    fn provision() -> ServerIdentity {
        CertificateProvisioner::default().provision().unwrap()
    }

    #[test]
    fn validity_is_one_year() {
        let id = provision();
        assert_eq!(id.not_after() - id.not_before(), Duration::days(365));
    }

    #[test]
    fn provision_at_records_requested_window() {
        let issued_at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let id = CertificateProvisioner::default()
            .provision_at(issued_at)
            .unwrap();
        assert_eq!(id.not_before(), issued_at);
        assert_eq!(id.not_after(), issued_at + VALIDITY);
    }

    #[test]
    fn fingerprint_is_sha256_of_der() {
        let id = provision();
        let fingerprint = id.fingerprint();
        assert_eq!(fingerprint.len(), 64);
        assert_eq!(fingerprint, hex(&Sha256::digest(id.certificate())));
        assert_ne!(fingerprint, provision().fingerprint());
    }

    #[test]
    fn encoded_certificate_round_trips_profile() {
        let id = provision();
        let parsed = CertificateParams::from_ca_cert_der(id.certificate()).unwrap();

        assert_eq!(parsed.not_after - parsed.not_before, Duration::days(365));
        assert_eq!(parsed.not_before, id.not_before());
        assert_eq!(
            parsed.subject_alt_names,
            vec![SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST))]
        );
        assert!(matches!(parsed.is_ca, IsCa::ExplicitNoCa));
    }

    #[test]
    fn params_restrict_usages() {
        let params = CertificateProvisioner::default()
            .params(OffsetDateTime::UNIX_EPOCH, vec![0x01]);
        assert_eq!(
            params.key_usages,
            vec![
                KeyUsagePurpose::DigitalSignature,
                KeyUsagePurpose::KeyEncipherment
            ]
        );
        assert_eq!(
            params.extended_key_usages,
            vec![ExtendedKeyUsagePurpose::ServerAuth]
        );
        assert_eq!(
            params.not_after,
            OffsetDateTime::UNIX_EPOCH + Duration::days(365)
        );
    }

    #[test]
    fn certificate_verifies_as_self_signed() {
        let id = provision();
        let mut roots = RootCertStore::empty();
        roots.add(id.certificate().clone()).unwrap();

        let verifier = WebPkiServerVerifier::builder_with_provider(
            Arc::new(roots),
            Arc::new(rustls::crypto::ring::default_provider()),
        )
        .build()
        .unwrap();

        let name = ServerName::from(IpAddr::V4(Ipv4Addr::LOCALHOST));
        verifier
            .verify_server_cert(id.certificate(), &[], &name, &[], UnixTime::now())
            .expect("certificate must verify against its own public key");
    }

    #[test]
    fn certificate_is_not_valid_for_other_hosts() {
        let id = provision();
        let mut roots = RootCertStore::empty();
        roots.add(id.certificate().clone()).unwrap();

        let verifier = WebPkiServerVerifier::builder_with_provider(
            Arc::new(roots),
            Arc::new(rustls::crypto::ring::default_provider()),
        )
        .build()
        .unwrap();

        let name = ServerName::try_from("example.com").unwrap();
        assert!(verifier
            .verify_server_cert(id.certificate(), &[], &name, &[], UnixTime::now())
            .is_err());
    }

    #[test]
    fn serials_are_positive_and_bounded() {
        for _ in 0..32 {
            let serial = random_serial().unwrap();
            assert!(!serial.is_empty() && serial.len() <= SERIAL_LEN);
            assert_ne!(serial[0], 0);
        }
    }

    #[test]
    fn each_provision_is_fresh() {
        let a = provision();
        let b = provision();
        assert_ne!(a.serial(), b.serial());
        assert_ne!(a.key_pem(), b.key_pem());
    }

    #[test]
    fn debug_redacts_key() {
        let id = provision();
        let out = format!("{id:?}");
        assert!(!out.contains("PRIVATE KEY"));
    }

    #[test]
    fn serial_hex_is_two_digits_per_byte() {
        let id = provision();
        let hex = id.serial_hex();
        assert_eq!(hex.len(), id.serial().len() * 2);
        assert!(hex.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    }
}
