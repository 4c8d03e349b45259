//! `tls-certificates`: certificate requests and their answers
//!
//! The requirer keeps one private key in the unit's private state, publishes
//! a CSR for the application hostname in its unit data bag and picks the
//! provider's certificate for that CSR out of the provider's app data bag.
//! [`LocalCa`] is a minimal provider that signs requests itself.

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CertificateSigningRequestParams,
    DistinguishedName, DnType, IsCa, KeyPair, KeyUsagePurpose,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

use crate::controller::collector::{collect_relation, parse_databag};
use crate::controller::tls::{TlsConfig, TlsConfigProvider};
use crate::error::{Error, Result};
use crate::model::{encode_databag, Databag, DatabagEncoding, Model};

pub const CERTIFICATES: &str = "certificates";

const PRIVATE_KEY_STATE: &str = "tls-private-key";
const CSR_STATE: &str = "tls-csr";
const CSR_ATTRIBUTES_STATE: &str = "tls-csr-attributes";

/// Validity of certificates issued by [`LocalCa::sign`]
pub const DEFAULT_VALIDITY_DAYS: i64 = 90;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRequestAttributes {
    pub common_name: String,
    pub sans_dns: Vec<String>,
}

impl CertificateRequestAttributes {
    /// The app hostname as CN, plus the unit's own pod hostname as a SAN
    pub fn for_model(model: &Model) -> Self {
        let app_hostname = model.app_hostname();
        Self {
            common_name: app_hostname.clone(),
            sans_dns: vec![app_hostname, model.unit_hostname()],
        }
    }

    fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.common_name.as_bytes());
        for san in &self.sans_dns {
            hasher.update([0]);
            hasher.update(san.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEntry {
    pub certificate_signing_request: String,
    #[serde(default)]
    pub ca: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct RequirerUnitData {
    certificate_signing_requests: Vec<RequestEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCertificate {
    pub certificate_signing_request: String,
    pub certificate: String,
    pub ca: String,
    #[serde(default)]
    pub chain: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct ProviderAppData {
    certificates: Vec<ProviderCertificate>,
}

fn private_key(model: &mut Model) -> Result<KeyPair> {
    if let Some(pem) = model.unit_state.get(PRIVATE_KEY_STATE) {
        return Ok(KeyPair::from_pem(pem)?);
    }
    let key = KeyPair::generate()?;
    model
        .unit_state
        .insert(PRIVATE_KEY_STATE.to_string(), key.serialize_pem());
    info!("Generated TLS private key for {}", model.unit_name);
    Ok(key)
}

fn build_csr(key: &KeyPair, attributes: &CertificateRequestAttributes) -> Result<String> {
    let mut params = CertificateParams::new(attributes.sans_dns.clone())?;
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, attributes.common_name.clone());
    params.distinguished_name = name;
    Ok(params.serialize_request(key)?.pem()?)
}

/// Make sure a CSR for `attributes` is published on every certificates relation
///
/// Returns whether a certificates relation exists. The CSR is regenerated
/// only when the attributes change.
pub fn sync_request(model: &mut Model, attributes: &CertificateRequestAttributes) -> Result<bool> {
    if !model.is_related(CERTIFICATES) {
        return Ok(false);
    }

    let key = private_key(model)?;
    let fingerprint = attributes.fingerprint();
    let csr = match (
        model.unit_state.get(CSR_STATE),
        model.unit_state.get(CSR_ATTRIBUTES_STATE),
    ) {
        (Some(csr), Some(current)) if *current == fingerprint => csr.clone(),
        _ => {
            let csr = build_csr(&key, attributes)?;
            model
                .unit_state
                .insert(CSR_STATE.to_string(), csr.clone());
            model
                .unit_state
                .insert(CSR_ATTRIBUTES_STATE.to_string(), fingerprint);
            info!("Generated CSR for {}", attributes.common_name);
            csr
        }
    };

    let databag = encode_databag(
        &RequirerUnitData {
            certificate_signing_requests: vec![RequestEntry {
                certificate_signing_request: csr,
                ca: false,
            }],
        },
        DatabagEncoding::Json,
    )?;
    for relation in model.relations_mut(CERTIFICATES) {
        relation.local_unit_data.extend(databag.clone());
    }
    Ok(true)
}

/// Expiry (`notAfter`) of a PEM certificate as a unix timestamp
pub fn certificate_not_after(pem: &str) -> Result<i64> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem.as_bytes())
        .map_err(|e| Error::CertificateError(format!("invalid PEM: {e}")))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| Error::CertificateError(format!("invalid certificate: {e}")))?;
    Ok(cert.validity().not_after.timestamp())
}

fn is_expired(pem: &str, now: i64) -> bool {
    match certificate_not_after(pem) {
        Ok(not_after) => not_after <= now,
        Err(e) => {
            warn!("Ignoring unreadable certificate: {}", e);
            true
        }
    }
}

/// Live view of the certificate issued for this unit's CSR
#[derive(Clone, Copy, Debug, Default)]
pub struct TlsCertificatesRequirer;

impl TlsConfigProvider for TlsCertificatesRequirer {
    fn tls_config(&self, model: &Model) -> Option<TlsConfig> {
        let private_key = model.unit_state.get(PRIVATE_KEY_STATE)?;
        let csr = model.unit_state.get(CSR_STATE)?;
        let now = chrono::Utc::now().timestamp();

        model
            .relations(CERTIFICATES)
            .filter_map(|relation| collect_relation::<ProviderAppData>(relation, DatabagEncoding::Json))
            .flat_map(|data| data.certificates)
            .filter(|c| c.certificate_signing_request.trim() == csr.trim())
            .find(|c| {
                let expired = is_expired(&c.certificate, now);
                if expired {
                    debug!("Certificate for {} has expired", model.unit_name);
                }
                !expired
            })
            .map(|c| TlsConfig {
                server_cert: c.certificate,
                private_key: private_key.clone(),
                ca_cert: c.ca,
            })
    }
}

/// Self-contained certificate authority
pub struct LocalCa {
    cert: Certificate,
    key: KeyPair,
}

impl LocalCa {
    pub fn new(common_name: &str) -> Result<Self> {
        let mut params = CertificateParams::new(Vec::<String>::new())?;
        let mut name = DistinguishedName::new();
        name.push(DnType::CommonName, common_name.to_string());
        params.distinguished_name = name;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let key = KeyPair::generate()?;
        let cert = params.self_signed(&key)?;
        Ok(Self { cert, key })
    }

    pub fn ca_pem(&self) -> String {
        self.cert.pem()
    }

    pub fn sign(&self, csr_pem: &str) -> Result<String> {
        self.sign_with_expiry(
            csr_pem,
            OffsetDateTime::now_utc() + Duration::days(DEFAULT_VALIDITY_DAYS),
        )
    }

    pub fn sign_with_expiry(&self, csr_pem: &str, not_after: OffsetDateTime) -> Result<String> {
        let mut csr = CertificateSigningRequestParams::from_pem(csr_pem)?;
        csr.params.not_before = not_after.min(OffsetDateTime::now_utc()) - Duration::days(1);
        csr.params.not_after = not_after;
        let cert = csr.signed_by(&self.cert, &self.key)?;
        Ok(cert.pem())
    }

    /// Answer every request in a requirer's unit data bag
    ///
    /// The result is the provider app data bag.
    pub fn respond(&self, requirer_unit_data: &Databag) -> Result<Databag> {
        let requests = parse_databag::<RequirerUnitData>(requirer_unit_data, DatabagEncoding::Json)
            .map(|data| data.certificate_signing_requests)
            .unwrap_or_default();
        let ca = self.ca_pem();
        let certificates = requests
            .into_iter()
            .map(|request| {
                Ok(ProviderCertificate {
                    certificate: self.sign(&request.certificate_signing_request)?,
                    ca: ca.clone(),
                    chain: vec![ca.clone()],
                    certificate_signing_request: request.certificate_signing_request,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        encode_databag(&ProviderAppData { certificates }, DatabagEncoding::Json)
    }
}
